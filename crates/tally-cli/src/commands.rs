//! CLI command definitions.

use clap::{Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum Commands {
    /// Show a user's balance and daily-claim status
    Balance {
        /// User ID
        user: String,
    },

    /// Spend credits on a metered action
    Debit {
        /// User ID
        user: String,

        /// Action to charge for
        #[arg(short, long, value_enum, default_value_t = ActionArg::Image)]
        action: ActionArg,

        /// Charge an explicit cost instead of the action's price
        #[arg(short, long)]
        cost: Option<u64>,
    },

    /// Add credits to a user
    Credit {
        /// User ID
        user: String,

        /// Credits to add
        #[arg(short, long, default_value_t = 100)]
        amount: u64,
    },

    /// Claim the daily free credits
    Claim {
        /// User ID
        user: String,

        /// Claim as of this date (YYYY-MM-DD) instead of today
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Apply a purchased plan, once per event
    Grant {
        /// Checkout session or event ID
        event: String,

        /// User ID
        user: String,

        /// Plan ID or price ID
        plan: String,
    },

    /// List purchasable plans
    Plans,

    /// Check the ledger store
    Health,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Image,
    Video,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the default configuration file path
    Path,
}
