use std::thread;

use crate::commands::{connect, prompt_password, remember_handles};
use crate::constants::RECONNECT_DELAY;
use crate::error::HostError;
use crate::keystore::KeyStore;
use crate::session::ClientSession;
use crate::transport::BleTransport;
use crate::ProvisionArgs;

pub fn run<T>(transport: &mut T, store: &mut KeyStore, args: &ProvisionArgs) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    let password = match &args.password {
        Some(password) => password.clone(),
        None => prompt_password()?,
    };
    if password.is_empty() {
        return Err(HostError::Config("setup password must not be empty".into()));
    }

    // First connection: pair if needed, then run the APPKEY exchange.
    // Unprovisioned controllers still see a HELLO before A0.
    connect(transport, store, &args.to, true)?;
    let appkey = {
        let mut session = ClientSession::new(transport);
        session.wait_hello()?;
        session.provision(&password)?
    };
    store.put_appkey(&args.to, &appkey)?;
    remember_handles(transport, store, &args.to)?;
    println!("APPKEY stored for {}", args.to);
    transport.disconnect();

    // Reconnect and prove the key works with a full handshake, then cache
    // the layout the dongle reports.
    thread::sleep(RECONNECT_DELAY);
    connect(transport, store, &args.to, true)?;
    {
        let mut session = ClientSession::new(transport);
        let hello = session.wait_hello()?;
        session.handshake(&hello, &appkey)?;
        match session.get_info() {
            Ok(info) => {
                println!("Dongle reports: {info}");
                if let Some(layout) = parse_layout(&info) {
                    store.set_layout(&args.to, layout)?;
                }
            }
            Err(err) => println!("Provisioned, but the info query failed: {err}"),
        }
    }
    transport.disconnect();
    println!("Provisioning complete.");
    Ok(())
}

/// Extract the layout token from an info string such as
/// `LAYOUT=UK_WINLIN; PROTO=1.2; FW=0.4.0`.
pub(crate) fn parse_layout(info: &str) -> Option<&str> {
    let start = info.find("LAYOUT=")? + "LAYOUT=".len();
    let rest = &info[start..];
    let end = rest
        .find(|c: char| c == ';' || c.is_ascii_whitespace())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}
