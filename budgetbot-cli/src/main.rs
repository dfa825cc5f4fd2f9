//! budgetbot CLI
//!
//! Command-line front end for balances, operations and recurring
//! subscription charges.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "budgetbot")]
#[command(about = "budgetbot - balances, operations and subscription charges", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory (can also be set via BUDGETBOT_DIR env var)
    #[arg(long, global = true, env = "BUDGETBOT_DIR")]
    storage_dir: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the scheduler poll interval
    #[arg(long, global = true)]
    poll_interval_secs: Option<u64>,

    /// Override the number of materialization workers
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Owner recorded on new balances and categories
    #[arg(long, global = true, default_value = "local")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a balance
    BalanceAdd {
        /// Display name
        name: String,

        /// Currency code (e.g. USD)
        #[arg(short, long)]
        currency: String,

        /// Opening amount
        #[arg(short, long)]
        initial: Option<String>,
    },

    /// List balances
    Balances,

    /// Create a category
    CategoryAdd {
        /// Category name
        name: String,
    },

    /// List categories
    Categories,

    /// Create a recurring subscription charged to a balance
    Subscribe {
        /// Balance to charge
        #[arg(short, long)]
        balance: String,

        /// Category for the charges
        #[arg(short = 'k', long)]
        category: String,

        /// Subscription name
        name: String,

        /// Amount per charge
        #[arg(short, long)]
        amount: String,

        /// Billing period (weekly, monthly, yearly)
        #[arg(short, long, default_value = "monthly")]
        period: String,

        /// First charge date (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(short, long)]
        start: Option<String>,
    },

    /// List subscriptions
    Subscriptions,

    /// Delete a subscription and its pending charges
    Unsubscribe {
        /// Subscription ID
        subscription_id: String,
    },

    /// Record income on a balance
    Income {
        /// Balance ID
        balance: String,

        /// Amount received
        amount: String,

        /// Category ID
        #[arg(short = 'k', long)]
        category: Option<String>,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Record spending from a balance
    Spend {
        /// Balance ID
        balance: String,

        /// Amount spent
        amount: String,

        /// Category ID
        #[arg(short = 'k', long)]
        category: Option<String>,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Move money between balances
    Transfer {
        /// Source balance ID
        from: String,

        /// Destination balance ID
        to: String,

        /// Amount sent
        amount: String,

        /// Exchange rate (destination units per source unit)
        #[arg(short, long)]
        rate: Option<String>,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Change the amount of a recorded operation
    EditOperation {
        /// Operation ID
        operation_id: String,

        /// New amount
        amount: String,
    },

    /// Show the operations of a balance
    Operations {
        /// Balance ID
        balance: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Materialize the charges due today and exit
    Tick,

    /// Run the subscription scheduler until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over the defaults
    let default_filter = if cli.verbose {
        "budgetbot=debug,budgetbot_engine=debug"
    } else {
        "budgetbot=info,budgetbot_engine=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli).await {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Setup storage directory
    let storage_dir = cli.storage_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("budgetbot")
    });
    tracing::debug!(storage_dir = %storage_dir.display(), "using storage directory");

    let config = commands::load_config(cli.config.as_deref(), cli.poll_interval_secs, cli.workers)?;
    let engine = commands::open_engine(&storage_dir, config)?;
    let user = cli.user.as_str();

    // Dispatch commands
    match cli.command {
        Commands::BalanceAdd {
            name,
            currency,
            initial,
        } => {
            commands::balances::add(&engine, user, &name, &currency, initial.as_deref()).await?;
        }
        Commands::Balances => {
            commands::balances::list(&engine).await?;
        }
        Commands::CategoryAdd { name } => {
            commands::balances::add_category(&engine, user, &name).await?;
        }
        Commands::Categories => {
            commands::balances::list_categories(&engine).await?;
        }
        Commands::Subscribe {
            balance,
            category,
            name,
            amount,
            period,
            start,
        } => {
            commands::subscriptions::subscribe(
                &engine,
                &balance,
                &category,
                &name,
                &amount,
                &period,
                start.as_deref(),
            )
            .await?;
        }
        Commands::Subscriptions => {
            commands::subscriptions::list(&engine).await?;
        }
        Commands::Unsubscribe { subscription_id } => {
            commands::subscriptions::unsubscribe(&engine, &subscription_id).await?;
        }
        Commands::Income {
            balance,
            amount,
            category,
            description,
        } => {
            commands::operations::income(
                &engine,
                &balance,
                &amount,
                category.as_deref(),
                &description,
            )
            .await?;
        }
        Commands::Spend {
            balance,
            amount,
            category,
            description,
        } => {
            commands::operations::spend(
                &engine,
                &balance,
                &amount,
                category.as_deref(),
                &description,
            )
            .await?;
        }
        Commands::Transfer {
            from,
            to,
            amount,
            rate,
            description,
        } => {
            commands::operations::transfer(
                &engine,
                &from,
                &to,
                &amount,
                rate.as_deref(),
                &description,
            )
            .await?;
        }
        Commands::EditOperation {
            operation_id,
            amount,
        } => {
            commands::operations::edit(&engine, &operation_id, &amount).await?;
        }
        Commands::Operations { balance, json } => {
            commands::operations::list(&engine, &balance, json).await?;
        }
        Commands::Tick => {
            commands::scheduler::tick(&engine).await?;
        }
        Commands::Run => {
            commands::scheduler::run(&engine).await?;
        }
    }

    Ok(())
}
