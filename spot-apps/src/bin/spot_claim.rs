use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use spot_apps::utils::{get_driver_config, init_tracing};
use spot_driver::{SpotDriver, SpotDriverConfig};
use tracing::info;

/// Claim a robot and hold the session: authenticate, keep the lease
/// alive, and stay the sole e-stop authority.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_BIN_NAME"))]
struct SpotClaimArgs {
    /// Path to the setting file.
    #[arg(short, long)]
    config_path: Option<PathBuf>,
    /// Robot hostname. Takes priority over the setting file.
    #[arg(long)]
    hostname: Option<String>,
    /// User name. Takes priority over the setting file.
    #[arg(long)]
    username: Option<String>,
    /// Password. Takes priority over the setting file.
    #[arg(long)]
    password: Option<String>,
    /// Hold the claim this long and release it, instead of holding until
    /// the process is killed.
    #[arg(long)]
    duration_sec: Option<f64>,
    /// Prints the default setting as TOML.
    #[arg(long)]
    show_default_config: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = SpotClaimArgs::parse();
    info!("ParsedArgs {args:?}");

    if args.show_default_config {
        print!("{}", toml::to_string(&SpotDriverConfig::default())?);
        return Ok(());
    }

    let mut config = match get_driver_config(args.config_path) {
        Some(config_path) => SpotDriverConfig::new(config_path)?,
        None => SpotDriverConfig::default(),
    };
    if let Some(hostname) = args.hostname {
        config.hostname = hostname;
    }
    if let Some(username) = args.username {
        config.username = username;
    }
    if let Some(password) = args.password {
        config.password = password;
    }

    let mut driver = SpotDriver::try_new(config)?;
    driver.claim()?;
    info!("Success");

    match args.duration_sec {
        Some(sec) => std::thread::sleep(Duration::from_secs_f64(sec)),
        None => loop {
            std::thread::sleep(Duration::from_secs(1));
        },
    }
    driver.release();
    info!("released the claim");
    Ok(())
}
