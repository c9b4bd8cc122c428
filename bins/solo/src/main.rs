//! Solo - command line for solo deployments
//!
//! Usage:
//!   solo up --config solo.json --set solo.profiles.ci.namespace=nightly
//!   solo wait <container> --timeout 600
//!   solo logs <container> --tail 200
//!   solo down <container>

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "solo")]
#[command(version)]
#[command(about = "Provision a single-container Helios deployment on a Docker daemon")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the solo container and print its handle as JSON
    Up(commands::UpArgs),

    /// Block until a container exits
    Wait(commands::WaitArgs),

    /// Stop and remove a container
    Down(commands::DownArgs),

    /// Print the tail of a container's logs
    Logs(commands::LogsArgs),
}

/// Logs go to stderr so stdout stays machine readable.
fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("solo=info".parse()?)
                .add_directive("solo_deployment=info".parse()?)
                .add_directive("bollard=warn".parse()?),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Up(args) => commands::up(args).await,
        Commands::Wait(args) => commands::wait(args).await,
        Commands::Down(args) => commands::down(args).await,
        Commands::Logs(args) => commands::logs(args).await,
    }
}
