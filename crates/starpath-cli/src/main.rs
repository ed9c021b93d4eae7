use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "starpath-cli", version, about = "Starpath CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play-session control (lockout gate + countdown)
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Routine catalog and interactive runs
    Routine {
        #[command(subcommand)]
        action: commands::routine::RoutineAction,
    },
    /// Star ledger inspection
    Stars {
        #[command(subcommand)]
        action: commands::stars::StarsAction,
    },
    /// Reward-service credential management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Routine { action } => commands::routine::run(action),
        Commands::Stars { action } => commands::stars::run(action),
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
