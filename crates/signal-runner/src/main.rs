//! Signal runner
//!
//! Loads engine configuration, runs a built-in checkout signal against an
//! in-memory store and prints the completed trace as JSON.
//!
//! ```text
//! signal-runner [config.yaml]
//! ```

use anyhow::{Context, Result};
use serde_json::json;
use signal_config::EngineConfig;
use signal_engine::{Action, Chain, Engine, Outcome, Signal};
use signal_state_store::{StatePath, StateStore, TreeStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn load_config() -> Result<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load engine configuration from {}", path)),
        None => Ok(EngineConfig::default()),
    }
}

/// Validates the cart, then reserves stock and charges the card concurrently
fn checkout(engine: &Engine) -> Result<Signal> {
    let validate = Action::sync("validate_cart", |args, state| {
        let items = args
            .get("items")
            .and_then(|items| items.as_array())
            .cloned()
            .unwrap_or_default();
        if items.is_empty() {
            return Ok(Outcome::error(json!({"reason": "empty cart"})));
        }
        state.set(["cart", "items"], items.clone())?;
        Ok(Outcome::success(json!({"item_count": items.len()})))
    })
    .with_outputs(["success", "error"]);

    let reserve = Action::asynchronous("reserve_stock", |args, state| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let reserved = state.get(["cart", "items"]).unwrap_or_else(|| json!([]));
        Ok(Outcome::next()
            .with("reserved", reserved)
            .with("order_for", args.get("user").cloned().unwrap_or_default()))
    });

    let charge = Action::asynchronous("charge_card", |args, _| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let count = args.get("item_count").and_then(|c| c.as_u64()).unwrap_or(0);
        Ok(Outcome::success(json!({"charged": count * 1000})))
    })
    .with_outputs(["success", "declined"]);

    let receipt = Action::sync("write_receipt", |args, state| {
        state.push("receipts", json!({"charged": args.get("charged").cloned()}))?;
        Ok(Outcome::next())
    });

    let reject = Action::sync("reject_cart", |args, state| {
        state.set("last_error", args.get("reason").cloned().unwrap_or_default())?;
        Ok(Outcome::next())
    });

    let definition = vec![
        validate.into(),
        Chain::paths([
            (
                "success",
                vec![Chain::parallel([
                    reserve.into(),
                    charge.into(),
                    Chain::paths([("success", vec![receipt.into()])]),
                ])],
            ),
            ("error", vec![reject.into()]),
        ]),
    ];

    Ok(engine.create("checkout", &definition)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    let level: Level = config
        .log_level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", config.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(policy = ?config.on_step_error, "Starting signal runner");

    let store = Arc::new(TreeStore::new());
    let engine = Engine::new(store.clone(), config);
    let signal = checkout(&engine)?;

    let trace = signal
        .run(&json!({"user": "ada", "items": ["book", "lamp"]}))
        .await?;

    info!(
        run_id = %trace.id,
        duration_ms = trace.duration,
        receipts = %store.get(&StatePath::from("receipts")).unwrap_or_default(),
        "Checkout finished"
    );

    println!("{}", serde_json::to_string_pretty(&trace)?);
    Ok(())
}
