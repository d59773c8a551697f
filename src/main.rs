use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use cortex_coach::cli::{self, CommandStatus};
use cortex_coach::Result;
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cortex-coach")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Project governance lock and rollout mode ledger", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the rollout mode, or transition it with --set-mode
    #[command(name = "rollout-mode")]
    RolloutMode(cli::rollout_mode::RolloutModeArgs),

    /// Audit the rollout transition ledger and write the report
    #[command(name = "rollout-mode-audit")]
    RolloutModeAudit(cli::rollout_audit::RolloutAuditArgs),

    /// Show who holds the project lock
    #[command(name = "lock-status")]
    LockStatus(cli::lock_status::LockStatusArgs),

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            eprintln!("{}", format!("Error: {:#}", e).red());
            std::process::exit(cli::EXIT_FAILURE);
        }
    }
}

fn init_tracing(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(cli::log_filter(verbose, rust_log.as_deref()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<CommandStatus> {
    match cli.command {
        Commands::RolloutMode(args) => cli::rollout_mode::run(&args),
        Commands::RolloutModeAudit(args) => cli::rollout_audit::run(&args),
        Commands::LockStatus(args) => cli::lock_status::run(&args),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "cortex-coach", &mut io::stdout());
            Ok(CommandStatus::Pass)
        }
    }
}
