use crate::commands::connect;
use crate::error::HostError;
use crate::keystore::KeyStore;
use crate::session::ClientSession;
use crate::transport::BleTransport;
use crate::SendKeyArgs;

pub fn run<T>(transport: &mut T, store: &mut KeyStore, args: &SendKeyArgs) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    let appkey = store.get_appkey(&args.to).ok_or_else(|| {
        HostError::Config(format!(
            "no APPKEY stored for {}; provision the dongle first",
            args.to
        ))
    })?;

    connect(transport, store, &args.to, false)?;
    {
        let mut session = ClientSession::new(transport);
        let hello = session.wait_hello()?;
        session.handshake(&hello, &appkey)?;
        session.enable_fast_keys()?;
        session.send_key_tap(args.usage, args.mods, args.repeat)?;
    }
    transport.disconnect();
    println!(
        "Sent usage 0x{:02X} (mods 0x{:02X}, repeat {}).",
        args.usage,
        args.mods,
        args.repeat.max(1)
    );
    Ok(())
}
