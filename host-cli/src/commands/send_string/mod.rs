use crate::commands::connect;
use crate::error::HostError;
use crate::keystore::KeyStore;
use crate::session::ClientSession;
use crate::transport::BleTransport;
use crate::SendStringArgs;

pub fn run<T>(
    transport: &mut T,
    store: &mut KeyStore,
    args: &SendStringArgs,
) -> Result<(), HostError>
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
    let typed = {
        let mut session = ClientSession::new(transport);
        let hello = session.wait_hello()?;
        session.handshake(&hello, &appkey)?;
        session.send_string(&args.text, args.newline)?
    };
    transport.disconnect();
    println!("Typed {typed} bytes.");
    Ok(())
}
