//! Fanledger CLI - credit ledger operations from command line
//!
//! Usage:
//! ```bash
//! fanledger init
//! fanledger grant fan_1 500 --type purchase
//! fanledger tip fan_1 creator_1 100 --chatter chatter_7
//! fanledger payment complete stripe cs_123 fan_1 500 --usd 9.99
//! fanledger queue sweep
//! fanledger replay fan_1
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use fanledger_core::{GrantType, PaymentProvider, QueueStatus, RecipientType, SpendType};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod db;

use commands::{actions, collaborators, ledger, payments, queue};

/// Fanledger - fan credit ledger with earning distribution
#[derive(Parser)]
#[command(name = "fanledger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML config file; defaults apply when it does not exist
    #[arg(long, default_value = "fanledger.toml", global = true)]
    pub config: PathBuf,

    /// Override `database.url` from the config
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and run migrations
    Init,

    /// Show database status
    Status,

    /// Show a user's credit balances
    Balance {
        user_id: String,
    },

    /// Show a user's most recent credit transactions
    History {
        user_id: String,
        #[arg(long, short, default_value_t = 20)]
        limit: i64,
    },

    /// Grant credits to a user
    Grant {
        user_id: String,
        amount: i64,
        #[arg(long = "type", default_value = "admin-grant")]
        grant_type: GrantTypeArg,
        /// Grant as bonus credits whatever the grant type
        #[arg(long)]
        bonus: bool,
        #[arg(long)]
        description: Option<String>,
    },

    /// Spend credits on a platform feature
    Spend {
        user_id: String,
        amount: i64,
        #[arg(long = "type", default_value = "ai-message")]
        spend_type: SpendTypeArg,
        /// Refuse to draw bonus credits
        #[arg(long)]
        paid_only: bool,
        #[arg(long)]
        media: Option<String>,
    },

    /// Tip a creator
    Tip {
        fan_id: String,
        creator_id: String,
        amount: i64,
        #[command(flatten)]
        attribution: AttributionArgs,
    },

    /// Unlock a PPV message
    Unlock {
        fan_id: String,
        creator_id: String,
        message_id: String,
        price: i64,
        #[command(flatten)]
        attribution: AttributionArgs,
    },

    /// Subscribe to a creator
    Subscribe {
        fan_id: String,
        creator_id: String,
        price: i64,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Payment intake
    Payment {
        #[command(subcommand)]
        action: PaymentAction,
    },

    /// Accounting export queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Rebuild a user's balance from the transaction log and compare
    Replay {
        user_id: String,
    },

    /// Show earnings of a creator, agency or chatter
    Earnings {
        #[arg(value_enum)]
        recipient: RecipientArg,
        recipient_id: String,
    },

    /// Register agencies, creators, chatters and AI personas
    Collaborator {
        #[command(subcommand)]
        action: CollaboratorAction,
    },
}

#[derive(clap::Args, Clone, Default)]
pub struct AttributionArgs {
    /// Human chatter who made the sale
    #[arg(long)]
    pub chatter: Option<String>,
    /// AI persona who made the sale
    #[arg(long, conflicts_with = "chatter")]
    pub ai_persona: Option<String>,
    /// Chat message the sale is attributed to
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Subcommand)]
pub enum PaymentAction {
    /// Record a pending payment before the provider confirms it
    Create {
        #[command(flatten)]
        payment: PaymentArgs,
    },
    /// Apply a provider confirmation (safe to repeat)
    Complete {
        #[command(flatten)]
        payment: PaymentArgs,
        /// Unlock this PPV message with the purchased credits
        #[arg(long, requires = "creator")]
        unlock_message: Option<String>,
        /// Activate a subscription for this many days with the purchased credits
        #[arg(long, requires = "creator", conflicts_with = "unlock_message")]
        subscribe_days: Option<i64>,
        #[arg(long)]
        creator: Option<String>,
    },
    /// Mark a pending payment failed
    Fail {
        #[arg(value_enum)]
        provider: ProviderArg,
        provider_tx_id: String,
    },
    /// List a user's payments
    List {
        user_id: String,
    },
}

#[derive(clap::Args, Clone)]
pub struct PaymentArgs {
    #[arg(value_enum)]
    pub provider: ProviderArg,
    pub provider_tx_id: String,
    pub user_id: String,
    pub credits: i64,
    #[arg(long, default_value = "0")]
    pub usd: Decimal,
    #[arg(long, requires = "currency")]
    pub crypto: Option<Decimal>,
    #[arg(long)]
    pub currency: Option<String>,
    /// Raw JSON metadata
    #[arg(long, default_value = "{}")]
    pub metadata: String,
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// Show entry counts per status
    Status,
    /// List entries with a given status
    List {
        #[arg(value_enum, default_value = "pending")]
        status: QueueStatusArg,
    },
    /// Retry every due entry once
    Sweep,
    /// Keep sweeping on the configured interval until interrupted
    Run,
}

#[derive(Subcommand)]
pub enum CollaboratorAction {
    Agency {
        id: String,
        name: String,
        rate: Decimal,
    },
    Creator {
        id: String,
        slug: String,
        #[arg(long)]
        agency: Option<String>,
    },
    Chatter {
        id: String,
        agency: String,
        rate: Decimal,
    },
    Persona {
        id: String,
        agency: String,
        rate: Decimal,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum GrantTypeArg {
    Purchase,
    PpvSale,
    AdminGrant,
    Refund,
    Promo,
}

impl GrantTypeArg {
    pub fn to_core_type(&self) -> GrantType {
        match self {
            GrantTypeArg::Purchase => GrantType::Purchase,
            GrantTypeArg::PpvSale => GrantType::PpvSale,
            GrantTypeArg::AdminGrant => GrantType::AdminGrant,
            GrantTypeArg::Refund => GrantType::Refund,
            GrantTypeArg::Promo => GrantType::Promo,
        }
    }
}

/// Spends that do not pay a creator; creator spends go through tip/unlock/subscribe
#[derive(Clone, Copy, ValueEnum)]
pub enum SpendTypeArg {
    AiMessage,
    MediaGeneration,
}

impl SpendTypeArg {
    pub fn to_core_type(&self) -> SpendType {
        match self {
            SpendTypeArg::AiMessage => SpendType::AiMessage,
            SpendTypeArg::MediaGeneration => SpendType::MediaGeneration,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    Stripe,
    Moonpay,
    Paygate,
    Mixpay,
    Manual,
}

impl ProviderArg {
    pub fn to_core_type(&self) -> PaymentProvider {
        match self {
            ProviderArg::Stripe => PaymentProvider::Stripe,
            ProviderArg::Moonpay => PaymentProvider::MoonPay,
            ProviderArg::Paygate => PaymentProvider::PayGate,
            ProviderArg::Mixpay => PaymentProvider::MixPay,
            ProviderArg::Manual => PaymentProvider::Manual,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum QueueStatusArg {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatusArg {
    pub fn to_core_type(&self) -> QueueStatus {
        match self {
            QueueStatusArg::Pending => QueueStatus::Pending,
            QueueStatusArg::Processing => QueueStatus::Processing,
            QueueStatusArg::Completed => QueueStatus::Completed,
            QueueStatusArg::Failed => QueueStatus::Failed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RecipientArg {
    Creator,
    Agency,
    Chatter,
}

impl RecipientArg {
    pub fn to_core_type(&self) -> RecipientType {
        match self {
            RecipientArg::Creator => RecipientType::Creator,
            RecipientArg::Agency => RecipientType::Agency,
            RecipientArg::Chatter => RecipientType::Chatter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = db::load_config(&cli.config, cli.db.as_deref())?;

    match cli.command {
        Commands::Init => {
            db::init(&config).await?;
        }

        Commands::Status => {
            db::show_status(&config).await?;
        }

        Commands::Balance { user_id } => {
            let ctx = db::open(config).await?;
            ledger::balance(&ctx, &user_id).await?;
        }

        Commands::History { user_id, limit } => {
            let ctx = db::open(config).await?;
            ledger::history(&ctx, &user_id, limit).await?;
        }

        Commands::Grant {
            user_id,
            amount,
            grant_type,
            bonus,
            description,
        } => {
            let ctx = db::open(config).await?;
            ledger::grant(&ctx, &user_id, amount, grant_type, bonus, description).await?;
        }

        Commands::Spend {
            user_id,
            amount,
            spend_type,
            paid_only,
            media,
        } => {
            let ctx = db::open(config).await?;
            ledger::spend(&ctx, &user_id, amount, spend_type, paid_only, media).await?;
        }

        Commands::Tip {
            fan_id,
            creator_id,
            amount,
            attribution,
        } => {
            let ctx = db::open(config).await?;
            actions::tip(&ctx, &fan_id, &creator_id, amount, &attribution).await?;
        }

        Commands::Unlock {
            fan_id,
            creator_id,
            message_id,
            price,
            attribution,
        } => {
            let ctx = db::open(config).await?;
            actions::unlock(&ctx, &fan_id, &creator_id, &message_id, price, &attribution).await?;
        }

        Commands::Subscribe {
            fan_id,
            creator_id,
            price,
            days,
        } => {
            let ctx = db::open(config).await?;
            actions::subscribe(&ctx, &fan_id, &creator_id, price, days).await?;
        }

        Commands::Payment { action } => {
            let ctx = db::open(config).await?;
            payments::handle(&ctx, action).await?;
        }

        Commands::Queue { action } => {
            let ctx = db::open(config).await?;
            queue::handle(ctx, action).await?;
        }

        Commands::Replay { user_id } => {
            let ctx = db::open(config).await?;
            ledger::replay(&ctx, &user_id).await?;
        }

        Commands::Earnings {
            recipient,
            recipient_id,
        } => {
            let ctx = db::open(config).await?;
            collaborators::earnings(&ctx, recipient, &recipient_id).await?;
        }

        Commands::Collaborator { action } => {
            let ctx = db::open(config).await?;
            collaborators::handle(&ctx, action).await?;
        }
    }

    Ok(())
}
