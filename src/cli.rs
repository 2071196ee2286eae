use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "netsentry")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Network monitoring engine: ICMP/SNMP probing, reachability tracking, threshold alerting")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long = "config", default_value = "netsentry.toml")]
    pub config: PathBuf,

    /// Validate the configuration and inventory, then exit without running
    #[arg(long = "check-config")]
    pub check_config: bool,

    /// Print the current reachability status of every monitored node and exit
    #[arg(long = "status")]
    pub status: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
