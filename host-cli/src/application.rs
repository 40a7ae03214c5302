use crate::commands;
use crate::error::HostError;
use crate::transport::loopback::LoopbackTransport;
use crate::transport::BleTransport;
use crate::Cli;

/// Run the selected command against an already-constructed transport.
/// Tests call this directly with scripted or loopback transports.
pub fn execute<T>(cli: Cli, transport: &mut T) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    commands::run(cli, transport)
}

/// Pick a transport for this invocation. The BLE GATT backend is a platform
/// collaborator linked by downstream packaging; this build ships the
/// in-process simulator behind `--sim`.
pub fn run_cli(cli: Cli) -> Result<(), HostError> {
    if cli.sim {
        let mut transport = LoopbackTransport::new();
        execute(cli, &mut transport)
    } else {
        Err(HostError::Config(
            "no BLE backend is linked into this build; run with --sim or install a platform \
             transport package"
                .into(),
        ))
    }
}
