mod application;
mod commands;
mod constants;
mod error;
mod keystore;
mod session;
mod transport;

#[cfg(test)]
mod tests_provision;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::error::HostError;

#[derive(Parser, Debug)]
#[command(author, version, about = "BluKey host command line interface")]
pub struct Cli {
    /// Path to the key-store file holding per-dongle APPKEYs.
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Drive an in-process simulated dongle instead of a BLE link.
    #[arg(long)]
    pub sim: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan for nearby dongles and print address and name.
    List,
    /// Exchange the long-term APPKEY using the dongle's setup password.
    Provision(ProvisionArgs),
    /// Type a UTF-8 string on the computer the dongle is plugged into.
    SendString(SendStringArgs),
    /// Tap a raw HID usage code on the computer the dongle is plugged into.
    SendKey(SendKeyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    /// Dongle BLE address.
    #[arg(long, value_name = "ADDR")]
    pub to: String,
    /// Setup password; prompted for interactively when omitted.
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SendStringArgs {
    /// Text to type.
    pub text: String,
    /// Dongle BLE address.
    #[arg(long, value_name = "ADDR")]
    pub to: String,
    /// Append a newline after the text.
    #[arg(long)]
    pub newline: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SendKeyArgs {
    /// HID usage code to tap (e.g. 4 for 'A').
    pub usage: u8,
    /// Dongle BLE address.
    #[arg(long, value_name = "ADDR")]
    pub to: String,
    /// Modifier bit mask sent with the usage code.
    #[arg(long, default_value_t = 0)]
    pub mods: u8,
    /// Number of taps; 0 is treated as 1.
    #[arg(long, default_value_t = 1)]
    pub repeat: u8,
}

impl Cli {
    pub fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_STORE_FILE))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = application::run_cli(cli) {
        match &err {
            HostError::Transport(_) => eprintln!("Transport failure: {err}"),
            HostError::Timeout(_) => eprintln!("Timed out: {err}"),
            HostError::Auth(_) | HostError::Protocol(_) => eprintln!("Protocol failure: {err}"),
            _ => eprintln!("Error: {err}"),
        }
        return Err(anyhow::Error::from(err));
    }

    Ok(())
}
