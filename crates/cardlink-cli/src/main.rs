//! Simulated card reader transaction.
//!
//! Connects to the simulated reader, optionally searches for readers, then
//! runs one transaction and releases the reader.
//!
//! Run with defaults:
//!   cargo run -p cardlink-cli
//!
//! Run a declined transaction with a failing battery and verbose logs:
//!   echo '{"battery_level_error": true}' > mock.json
//!   RUST_LOG=debug cargo run -p cardlink-cli -- --mock mock.json --amount 20.61
//!
//! Flags: `--mock <json>`, `--config <json>`, `--amount <major units>`,
//! `--currency <code>`, `--account <id>`, `--email <address>`, `--search`.

mod host;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use cardlink_core::{CurrencyCode, PaymentInfo};
use cardlink_hardware::discovery::SearchOptions;
use cardlink_hardware::driver::run_for;
use cardlink_hardware::{MockConfig, ReaderSession, SessionConfig};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use host::{ChannelHandler, HostEvent, LoggingListener};

/// Logical time applied per loop iteration.
const STEP: Duration = Duration::from_millis(100);

/// Give up on connecting after this long.
const CONNECT_DEADLINE: Duration = Duration::from_secs(5);

/// Give up on the transaction after this long.
const TRANSACTION_DEADLINE: Duration = Duration::from_secs(30);

struct Order {
    amount: f64,
    currency: CurrencyCode,
    account_id: i64,
    email: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cardlink_hardware=info".parse()?)
                .add_directive("cardlink=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mock: MockConfig = match parse_arg_string(&args, "--mock") {
        Some(path) => load_json(&path).await?,
        None => MockConfig::default(),
    };
    let config: SessionConfig = match parse_arg_string(&args, "--config") {
        Some(path) => load_json(&path).await?,
        None => SessionConfig::default(),
    };
    let order = Order {
        amount: parse_arg(&args, "--amount").unwrap_or(21.61),
        currency: parse_arg(&args, "--currency").unwrap_or(CurrencyCode::Usd),
        account_id: parse_arg(&args, "--account").unwrap_or(1234),
        email: parse_arg_string(&args, "--email"),
    };
    let search = args.iter().any(|a| a == "--search");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ReaderSession::new(ChannelHandler::new(tx), config);
    let release_after = session.config().latencies.release();
    let discovery_after = session.config().latencies.discovery().complete_after;
    session.initialize(mock)?;

    if search {
        session.search(Box::new(LoggingListener), SearchOptions::default());
    }
    connect(&mut session).await?;
    if search {
        run_for(&mut session, discovery_after).await;
        if let Some(device) = session.discovery().found().first().cloned() {
            session.select_reader(&device)?;
        }
    }

    session.get_battery_level();
    session.start_transaction()?;
    let outcome = transact(&mut session, &mut rx, &order).await;

    session.release(Some(Box::new(|| info!("Reader released"))))?;
    run_for(&mut session, release_after).await;

    let payment = outcome?;
    println!(
        "Approved {} {} on {} ({} {})",
        payment.amount,
        payment.currency,
        payment.payment_description,
        payment.first_name,
        payment.last_name
    );
    Ok(())
}

/// Run the timeline until the reader is ready.
async fn connect(session: &mut ReaderSession<ChannelHandler>) -> anyhow::Result<()> {
    let started = Instant::now();
    while !session.is_ready() {
        if started.elapsed() > CONNECT_DEADLINE {
            bail!("card reader did not connect within {:?}", CONNECT_DEADLINE);
        }
        run_for(session, STEP).await;
    }
    info!("Reader ready after {:?}", started.elapsed());
    Ok(())
}

/// Answer every host request until the transaction resolves.
async fn transact(
    session: &mut ReaderSession<ChannelHandler>,
    rx: &mut mpsc::UnboundedReceiver<HostEvent>,
    order: &Order,
) -> anyhow::Result<PaymentInfo> {
    let started = Instant::now();
    loop {
        while let Ok(event) = rx.try_recv() {
            match event {
                HostEvent::Status(status) => info!("Reader status: {}", status),
                HostEvent::Battery(Ok(level)) => info!("Battery at {}%", level),
                HostEvent::Battery(Err(error)) => {
                    warn!("Battery unavailable: {}", error.description())
                }
                HostEvent::ResetRequested(ticket) => session.reset_card_reader(&ticket, true)?,
                HostEvent::InfoRequested(ticket) => session.use_transaction_info(
                    &ticket,
                    order.amount,
                    order.currency,
                    order.account_id,
                )?,
                HostEvent::EmailRequested(ticket) => {
                    session.insert_payer_email(&ticket, order.email.clone())?
                }
                HostEvent::Success(payment) => return Ok(payment),
                HostEvent::Error(error) => {
                    bail!("transaction failed: {} ({})", error.description(), error.code())
                }
            }
        }
        if started.elapsed() > TRANSACTION_DEADLINE {
            bail!("transaction did not resolve within {:?}", TRANSACTION_DEADLINE);
        }
        run_for(session, STEP).await;
    }
}

async fn load_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let text = tokio::fs::read_to_string(Path::new(path))
        .await
        .with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {path}"))
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
