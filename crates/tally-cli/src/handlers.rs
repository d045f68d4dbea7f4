//! Command handlers.

use crate::commands::ActionArg;
use crate::settings::Settings;
use anyhow::Result;
use console::style;
use serde::Serialize;
use std::sync::Arc;
use tally_billing::{Authorization, EntitlementReconciler, MeteredAction, MeteringFacade};
use tally_core::{Credits, EventId, UserId, parse_date};
use tally_ledger::CreditLedger;
use tally_store::open_store;
use tally_trace::{grant_span, ledger_span};
use tracing::Instrument;

/// Wired ledger components for one CLI invocation.
pub struct App {
    pub ledger: Arc<CreditLedger>,
    pub facade: MeteringFacade,
    pub reconciler: EntitlementReconciler,
    json: bool,
}

impl App {
    pub async fn open(settings: Settings, json: bool) -> Result<Self> {
        let store = open_store(&settings.store).await?;
        let ledger = Arc::new(CreditLedger::with_config(store, settings.ledger.clone()));
        let facade = MeteringFacade::new(ledger.clone())
            .with_costs(settings.metering.costs)
            .with_refund_on_failure(settings.metering.refund_on_failure);
        let reconciler = EntitlementReconciler::new(ledger.clone(), settings.plans.clone());

        Ok(Self {
            ledger,
            facade,
            reconciler,
            json,
        })
    }

    fn emit<T: Serialize>(&self, value: &T) -> Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(self.json)
    }
}

/// Show a user's balance.
pub async fn balance(app: &App, user: &str) -> Result<()> {
    let user_id = UserId::new(user)?;
    let view = app
        .facade
        .balance(&user_id)
        .instrument(ledger_span("balance", user))
        .await?;
    if app.emit(&view)? {
        return Ok(());
    }

    println!("{} {}", style("User:").bold(), view.user_id);
    println!("  Balance: {}", style(view.balance).cyan());
    match view.last_claim_date {
        Some(date) => println!("  Last claim: {date}"),
        None => println!("  Last claim: {}", style("never").dim()),
    }
    if view.can_claim_daily {
        println!("  {} Daily credits available", style("✓").green());
    } else {
        println!("  {} Daily credits already claimed", style("-").dim());
    }
    Ok(())
}

/// Charge a metered action.
pub async fn debit(app: &App, user: &str, action: ActionArg, cost: Option<Credits>) -> Result<()> {
    let user_id = UserId::new(user)?;
    let action = match (cost, action) {
        (Some(cost), _) => MeteredAction::Custom(cost),
        (None, ActionArg::Image) => MeteredAction::Image,
        (None, ActionArg::Video) => MeteredAction::Video,
    };

    let auth = app
        .facade
        .authorize(&user_id, action)
        .instrument(ledger_span("debit", user))
        .await?;
    if app.emit(&auth)? {
        return Ok(());
    }

    match auth {
        Authorization::Proceed { charged, remaining } => println!(
            "{} Charged {} for {} (remaining {})",
            style("✓").green(),
            charged,
            action,
            style(remaining).cyan()
        ),
        Authorization::InsufficientCredits { required, balance } => println!(
            "{} Insufficient credits: {} required, {} available",
            style("✗").red(),
            required,
            balance
        ),
    }
    Ok(())
}

/// Add credits as an operator.
pub async fn credit(app: &App, user: &str, amount: Credits) -> Result<()> {
    let user_id = UserId::new(user)?;
    let balance = app
        .facade
        .grant_admin(&user_id, amount)
        .instrument(ledger_span("credit", user))
        .await?;

    #[derive(Serialize)]
    struct Credited<'a> {
        user_id: &'a str,
        amount: Credits,
        balance: Credits,
    }
    if app.emit(&Credited {
        user_id: user,
        amount,
        balance,
    })? {
        return Ok(());
    }

    println!(
        "{} Added {} credits to {} (balance {})",
        style("✓").green(),
        amount,
        style(user).bold(),
        style(balance).cyan()
    );
    Ok(())
}

/// Claim daily credits, optionally as of a given date.
pub async fn claim(app: &App, user: &str, date: Option<&str>) -> Result<()> {
    let user_id = UserId::new(user)?;
    let span = ledger_span("claim", user);
    let receipt = match date {
        Some(date) => {
            app.ledger
                .claim_daily(&user_id, parse_date(date)?)
                .instrument(span)
                .await?
        }
        None => app.facade.claim_daily(&user_id).instrument(span).await?,
    };
    if app.emit(&receipt)? {
        return Ok(());
    }

    if receipt.granted {
        println!(
            "{} Claimed {} daily credits (balance {})",
            style("✓").green(),
            receipt.credits_added,
            style(receipt.balance_after).cyan()
        );
    } else {
        println!(
            "{} Already claimed today (balance {})",
            style("!").yellow(),
            receipt.balance_after
        );
    }
    Ok(())
}

/// Apply a purchased plan.
pub async fn grant(app: &App, event: &str, user: &str, plan: &str) -> Result<()> {
    let event_id = EventId::new(event)?;
    let user_id = UserId::new(user)?;
    let receipt = app
        .reconciler
        .apply_grant(&event_id, &user_id, plan)
        .instrument(grant_span(event, plan))
        .await?;
    if app.emit(&receipt)? {
        return Ok(());
    }

    if receipt.applied {
        println!(
            "{} Granted {} credits for plan {} (balance {})",
            style("✓").green(),
            receipt.credits_granted,
            style(&receipt.plan_id).bold(),
            style(receipt.balance_after).cyan()
        );
    } else {
        println!(
            "{} Event {} was already applied ({} credits, balance then {})",
            style("i").blue(),
            receipt.event_id,
            receipt.credits_granted,
            receipt.balance_after
        );
    }
    Ok(())
}

/// List plans.
pub fn plans(app: &App) -> Result<()> {
    let catalog = app.reconciler.catalog();
    if app.emit(catalog)? {
        return Ok(());
    }

    println!("{}", style("Plans").bold());
    for plan in catalog.iter() {
        println!(
            "  {:<12} {:>6} credits  {}",
            plan.id.as_str(),
            plan.credits,
            style(plan.price_id.as_deref().unwrap_or("-")).dim()
        );
    }
    Ok(())
}

/// Check the configured store.
pub async fn health(app: &App) -> Result<()> {
    let backend = app.ledger.backend();
    let result = app.ledger.health_check().await;

    #[derive(Serialize)]
    struct Health {
        backend: String,
        healthy: bool,
        error: Option<String>,
    }
    let report = Health {
        backend: backend.to_string(),
        healthy: result.is_ok(),
        error: result.as_ref().err().map(|e| e.to_string()),
    };
    if !app.emit(&report)? {
        match &result {
            Ok(()) => println!("{} {} store healthy", style("✓").green(), backend),
            Err(e) => println!("{} {} store unhealthy: {}", style("✗").red(), backend, e),
        }
    }

    result?;
    Ok(())
}

/// Show the effective configuration.
pub fn show_config(settings: &Settings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
    } else {
        print!("{}", settings.to_yaml()?);
    }
    Ok(())
}

/// Print the default configuration path.
pub fn config_path() -> Result<()> {
    println!("{}", Settings::default_path()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::StoreConfig;

    async fn app(dir: &std::path::Path) -> App {
        let settings = Settings {
            store: StoreConfig::local(dir),
            ..Default::default()
        };
        App::open(settings, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_commands_share_one_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        credit(&app, "u1", 10).await.unwrap();
        debit(&app, "u1", ActionArg::Image, None).await.unwrap();
        claim(&app, "u1", Some("2024-06-01")).await.unwrap();
        grant(&app, "cs_1", "u1", "pro").await.unwrap();
        grant(&app, "cs_1", "u1", "pro").await.unwrap();

        let view = app
            .ledger
            .balance(&UserId::new("u1").unwrap(), parse_date("2024-06-01").unwrap())
            .await
            .unwrap();
        assert_eq!(view.balance, 1024);
        assert!(!view.can_claim_daily);
    }

    #[tokio::test]
    async fn test_state_persists_between_invocations() {
        let dir = tempfile::tempdir().unwrap();
        credit(&app(dir.path()).await, "u1", 42).await.unwrap();

        let reopened = app(dir.path()).await;
        let view = reopened.facade.balance(&UserId::new("u1").unwrap()).await.unwrap();
        assert_eq!(view.balance, 42);
    }

    #[tokio::test]
    async fn test_bad_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        assert!(credit(&app, "u1", 0).await.is_err());
        assert!(claim(&app, "u1", Some("June 1st")).await.is_err());
        assert!(grant(&app, "cs_1", "u1", "gold").await.is_err());
        assert!(balance(&app, " ").await.is_err());
    }

    #[tokio::test]
    async fn test_health_on_local_store() {
        let dir = tempfile::tempdir().unwrap();
        health(&app(dir.path()).await).await.unwrap();
    }
}
