use std::io::{self, Write};

use crate::error::HostError;
use crate::keystore::KeyStore;
use crate::transport::BleTransport;
use crate::{Cli, Command};

pub mod list;
pub mod provision;
pub mod send_key;
pub mod send_string;

pub fn run<T>(cli: Cli, transport: &mut T) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    let mut store = KeyStore::load(cli.store_path())?;
    match cli.command {
        Command::List => list::run(transport),
        Command::Provision(args) => provision::run(transport, &mut store, &args),
        Command::SendString(args) => send_string::run(transport, &mut store, &args),
        Command::SendKey(args) => send_key::run(transport, &mut store, &args),
    }
}

/// Connect to a dongle, reusing any cached GATT handle paths.
pub(crate) fn connect<T>(
    transport: &mut T,
    store: &KeyStore,
    address: &str,
    ensure_paired: bool,
) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    let handles = store.cached_handles(address);
    println!("Connecting to {address}…");
    transport.connect(address, ensure_paired, handles.as_ref())
}

/// Refresh the cached handle paths after a successful connect.
pub(crate) fn remember_handles<T>(
    transport: &T,
    store: &mut KeyStore,
    address: &str,
) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    if let Some(handles) = transport.resolved_handles() {
        store.set_cached_handles(address, &handles)?;
    }
    Ok(())
}

pub(crate) fn prompt_password() -> Result<String, HostError> {
    print!("Setup password (chosen on the dongle's setup portal): ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
