use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use netrec_reconcile::{ApprovalDecision, ReconcileMode};

mod commands;

#[derive(Parser)]
#[command(name = "netrec")]
#[command(about = "Network state reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve telemetry, compare it with the inventory and act on the drift
    Reconcile {
        /// Layered config paths in merge order (base -> site -> overrides)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Telemetry dump, one observation per line
        #[arg(long)]
        observations: String,

        /// Inventory file (JSON array of records)
        #[arg(long)]
        inventory: String,

        /// Overrides engine.mode from config
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Write the report here instead of stdout
        #[arg(long)]
        out: Option<String>,

        /// Run id (default: random UUID)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Inspect and answer pending approvals (needs reconcile.state_dir)
    Approvals {
        #[command(subcommand)]
        cmd: ApprovalsCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum ApprovalsCmd {
    /// Print every pending approval
    List {
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Approve one pending diff and apply its correction
    Approve {
        #[arg(long = "config")]
        config_paths: Vec<String>,
        #[arg(long)]
        inventory: String,
        #[arg(long)]
        id: String,
    },

    /// Reject one pending diff; the inventory is left alone
    Reject {
        #[arg(long = "config")]
        config_paths: Vec<String>,
        #[arg(long)]
        inventory: String,
        #[arg(long)]
        id: String,
    },

    /// Reject every approval past its deadline with reason `timeout`
    Expire {
        #[arg(long = "config")]
        config_paths: Vec<String>,
        #[arg(long)]
        inventory: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit log
    Verify { path: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    DryRun,
    Live,
}

impl From<ModeArg> for ReconcileMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::DryRun => ReconcileMode::DryRun,
            ModeArg::Live => ReconcileMode::Live,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent when absent.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Reconcile {
            config_paths,
            observations,
            inventory,
            mode,
            format,
            out,
            run_id,
        } => {
            commands::reconcile::run(commands::reconcile::ReconcileArgs {
                config_paths,
                observations,
                inventory,
                mode: mode.map(Into::into),
                json: format == Format::Json,
                out,
                run_id,
            })
            .await?;
        }

        Commands::Approvals { cmd } => match cmd {
            ApprovalsCmd::List { config_paths } => commands::approvals::list(&config_paths)?,
            ApprovalsCmd::Approve {
                config_paths,
                inventory,
                id,
            } => commands::approvals::decide(&config_paths, &inventory, &id, ApprovalDecision::Approve)?,
            ApprovalsCmd::Reject {
                config_paths,
                inventory,
                id,
            } => commands::approvals::decide(&config_paths, &inventory, &id, ApprovalDecision::Reject)?,
            ApprovalsCmd::Expire {
                config_paths,
                inventory,
            } => commands::approvals::expire(&config_paths, &inventory)?,
        },

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => commands::verify_audit(&path)?,
        },
    }

    Ok(())
}

/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
