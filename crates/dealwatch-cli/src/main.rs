use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dealwatch-cli", version, about = "Dealwatch tracking engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Great-circle distance between two coordinates
    Distance(commands::distance::DistanceArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Inspect persisted voucher claims
    Vouchers {
        #[command(subcommand)]
        action: commands::vouchers::VouchersAction,
    },
    /// Run proximity checks against a JSON fixture
    Simulate(commands::simulate::SimulateArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Distance(args) => commands::distance::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Vouchers { action } => commands::vouchers::run(action),
        Commands::Simulate(args) => commands::simulate::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
