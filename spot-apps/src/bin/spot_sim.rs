use anyhow::Result;
use clap::Parser;
use spot_apps::utils::init_tracing;
use spot_sim::SimRobot;
use tracing::info;

/// Serve a simulated robot for spot_claim to talk to.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_BIN_NAME"))]
struct SpotSimArgs {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 7530)]
    port: u16,
    /// Accepted user name.
    #[arg(long, default_value = "user")]
    username: String,
    /// Accepted password.
    #[arg(long, default_value = "password")]
    password: String,
}

fn main() -> Result<()> {
    init_tracing();
    let args = SpotSimArgs::parse();

    let sim = SimRobot::new(args.port);
    {
        let mut state = sim.state.lock().unwrap();
        state.username = args.username;
        state.password = args.password;
    }
    info!("serving simulated robot on {}", sim.url());
    sim.start()?;
    Ok(())
}
