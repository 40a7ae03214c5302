use crate::constants::SCAN_TIMEOUT;
use crate::error::HostError;
use crate::transport::BleTransport;

pub fn run<T>(transport: &mut T) -> Result<(), HostError>
where
    T: BleTransport + ?Sized,
{
    let devices = transport.scan(SCAN_TIMEOUT)?;
    if devices.is_empty() {
        println!("No dongles found.");
        return Ok(());
    }
    for device in devices {
        println!("{}  {}", device.address, device.name);
    }
    Ok(())
}
