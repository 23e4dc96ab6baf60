//! Options Trade Journal
//!
//! Records option trades through an open -> closed lifecycle, computes
//! exact realized P&L, and compares implied volatility against realized
//! volatility from daily price history.

mod api;
mod config;
mod db;
mod error;
mod journal;
mod metrics;
mod models;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{Bar, ChartClient, MarketDataSource, PriceRequest, RetryingSource};
use crate::config::Settings;
use crate::db::Database;
use crate::journal::TradeLifecycle;
use crate::metrics::{VolatilityEstimator, VolatilitySnapshot};
use crate::models::{
    Direction, EntryAction, EntryFilter, EntryPatch, EntryStatus, NewEntry, Tags, TradeEntry,
};

/// Options trade journal CLI.
#[derive(Parser)]
#[command(name = "optjournal")]
#[command(about = "Journal option trades and compare implied vs. realized volatility", long_about = None)]
struct Cli {
    /// Database URL (overrides DATABASE_URL)
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new journal entry
    Add {
        /// Underlying ticker
        #[arg(short, long)]
        symbol: String,

        /// Strategy label (e.g. CSP, long call, iron condor)
        #[arg(long, default_value = "")]
        strategy: String,

        /// Opening action (BTO or STO)
        #[arg(short, long)]
        action: EntryAction,

        /// Per-contract premium
        #[arg(short, long)]
        price: Decimal,

        /// Number of contracts
        #[arg(long, default_value = "1")]
        size: u32,

        /// Entry date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Market view (long, short, neutral)
        #[arg(long, default_value = "neutral")]
        direction: Direction,

        #[arg(short, long, default_value = "")]
        notes: String,

        /// Comma-separated tags
        #[arg(short, long)]
        tags: Option<String>,

        /// Stop level
        #[arg(long)]
        stop: Option<Decimal>,

        /// Target level
        #[arg(long)]
        target: Option<Decimal>,

        /// Implied volatility as a decimal (0.35 = 35%); appends an IV/HV note
        #[arg(long)]
        iv: Option<f64>,

        /// HV lookback in trading days (defaults to HV_WINDOW)
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// Update fields of an entry
    Update {
        id: i64,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        price: Option<Decimal>,

        #[arg(long)]
        size: Option<u32>,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        direction: Option<Direction>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Replace tags (comma-separated)
        #[arg(short, long)]
        tags: Option<String>,

        #[arg(long, conflicts_with = "clear_stop")]
        stop: Option<Decimal>,

        #[arg(long, conflicts_with = "clear_target")]
        target: Option<Decimal>,

        /// Remove the stop level
        #[arg(long)]
        clear_stop: bool,

        /// Remove the target level
        #[arg(long)]
        clear_target: bool,

        /// JSON patch, e.g. '{"notes": "rolled", "stop_price": null}'
        #[arg(long, conflicts_with_all = ["symbol", "strategy", "price", "size", "date", "direction", "notes", "tags", "stop", "target", "clear_stop", "clear_target"])]
        json: Option<String>,
    },

    /// Close an open entry
    Close {
        id: i64,

        /// Per-contract exit premium
        #[arg(short, long)]
        price: Decimal,

        /// Exit date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Delete an entry
    Delete { id: i64 },

    /// List entries, newest first
    List {
        /// Only entries carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Only open or closed entries
        #[arg(short, long)]
        status: Option<EntryStatus>,
    },

    /// Show one entry in full
    Show { id: i64 },

    /// Show win rate and realized P&L
    Stats,

    /// Compare implied volatility with realized volatility
    Vol {
        symbol: String,

        /// Implied volatility as a decimal (0.35 = 35%)
        #[arg(long)]
        iv: f64,

        /// HV lookback in trading days (defaults to HV_WINDOW)
        #[arg(short, long)]
        window: Option<usize>,

        #[arg(short, long, default_value = "3mo")]
        period: String,

        #[arg(short, long, default_value = "1d")]
        interval: String,
    },

    /// Show recent price history
    History {
        symbol: String,

        #[arg(short, long, default_value = "1mo")]
        period: String,

        #[arg(short, long, default_value = "1d")]
        interval: String,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut settings = Settings::from_env()?;
    if let Some(url) = cli.database {
        settings.database_url = url;
    }

    match cli.command {
        Commands::Add {
            symbol,
            strategy,
            action,
            price,
            size,
            date,
            direction,
            notes,
            tags,
            stop,
            target,
            iv,
            window,
        } => {
            let mut new = NewEntry::new(symbol, strategy, action, price, size)
                .direction(direction)
                .notes(notes);
            if let Some(date) = date {
                new = new.on(date);
            }
            new.tags = tags.as_deref().map(Tags::from_csv).unwrap_or_default();
            new.stop_price = stop;
            new.target_price = target;

            if let Some(iv) = iv {
                VolatilitySnapshot::check_iv(iv)?;
                let window = window.unwrap_or(settings.hv_window);
                let request = PriceRequest::new(&new.symbol).with_period("3mo")?;

                // Market data is best-effort; the trade is journaled regardless.
                match snapshot(&settings, &request, iv, window).await {
                    Ok(snap) => new.append_note(&snap.context_line()),
                    Err(e) => warn!(symbol = %request.symbol, error = %e, "Skipping volatility context"),
                }
            }

            let journal = open_journal(&settings).await?;
            let entry = journal.create(new).await?;

            println!("Opened entry #{}", entry.id);
            print_entry(&entry);
        }

        Commands::Update {
            id,
            symbol,
            strategy,
            price,
            size,
            date,
            direction,
            notes,
            tags,
            stop,
            target,
            clear_stop,
            clear_target,
            json,
        } => {
            let patch = match json {
                Some(raw) => EntryPatch::from_json(&raw)?,
                None => EntryPatch {
                    symbol,
                    strategy,
                    notes,
                    tags: tags.as_deref().map(Tags::from_csv),
                    direction,
                    entry_price: price,
                    size,
                    entry_date: date,
                    stop_price: risk_level(stop, clear_stop),
                    target_price: risk_level(target, clear_target),
                },
            };

            if patch.is_empty() {
                bail!("Nothing to update. Pass at least one field flag or --json.");
            }

            let journal = open_journal(&settings).await?;
            let entry = journal.update(id, patch).await?;

            println!("Updated entry #{}", entry.id);
            print_entry(&entry);
        }

        Commands::Close { id, price, date } => {
            let journal = open_journal(&settings).await?;
            let entry = journal.close(id, price, date).await?;

            println!(
                "Closed entry #{} ({} {} @ {})",
                entry.id,
                entry.expected_exit_action(),
                entry.symbol,
                price
            );
            if let Some(pnl) = entry.realized_pnl() {
                println!("Realized P&L: ${}", pnl);
            }
        }

        Commands::Delete { id } => {
            let journal = open_journal(&settings).await?;
            journal.delete(id).await?;
            println!("Deleted entry #{}", id);
        }

        Commands::List { tag, status } => {
            let journal = open_journal(&settings).await?;
            let entries = match (tag.as_deref(), status) {
                (tag, None) => journal.list_by_tag(tag).await?,
                (None, Some(status)) => journal.list_by_status(status).await?,
                (Some(tag), Some(status)) => {
                    journal
                        .list(&EntryFilter {
                            tag: Some(tag.trim().to_string()),
                            status: Some(status),
                        })
                        .await?
                }
            };

            if entries.is_empty() {
                println!("No journal entries. Use 'optjournal add' to record a trade.");
                return Ok(());
            }

            println!(
                "\n{:>5} {:<10} {:<6} {:<4} {:>5} {:>10} {:>10} {:>12} {:<16} {:<20}",
                "ID", "DATE", "SYMBOL", "ACT", "SIZE", "ENTRY", "EXIT", "P&L", "STRATEGY", "TAGS"
            );
            println!("{}", "-".repeat(108));

            for entry in &entries {
                println!(
                    "{:>5} {:<10} {:<6} {:<4} {:>5} {:>10} {:>10} {:>12} {:<16} {:<20}",
                    entry.id,
                    entry.entry_date,
                    truncate(&entry.symbol, 6),
                    entry.entry_action,
                    entry.size,
                    entry.entry_price,
                    entry
                        .exit_price()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    entry
                        .realized_pnl()
                        .map(|p| format!("${}", p))
                        .unwrap_or_else(|| "open".to_string()),
                    truncate(&entry.strategy, 16),
                    truncate(&entry.tags.to_string(), 20)
                );
            }
        }

        Commands::Show { id } => {
            let journal = open_journal(&settings).await?;
            let entry = journal.get(id).await?;
            print_entry(&entry);
        }

        Commands::Stats => {
            let db = Database::new(&settings.database_url).await?;
            let (open, closed) = db.count_by_status().await?;
            let journal = TradeLifecycle::new(db);
            let stats = journal.stats().await?;

            println!("\n=== Journal ===");
            println!("Open Entries:     {}", open);
            println!("Closed Entries:   {}", closed);
            println!("\n{}", stats);
        }

        Commands::Vol {
            symbol,
            iv,
            window,
            period,
            interval,
        } => {
            VolatilitySnapshot::check_iv(iv)?;
            let window = window.unwrap_or(settings.hv_window);
            let request = PriceRequest::new(&symbol)
                .with_period(&period)?
                .with_interval(&interval)?;

            info!(symbol = %request.symbol, window, "Comparing IV with realized volatility");
            let snap = snapshot(&settings, &request, iv, window).await?;

            println!("\n=== {} Volatility ({}d window) ===", snap.symbol, snap.window);
            println!("Implied Vol:      {:.2}%", snap.iv() * 100.0);
            match snap.hv().value() {
                Some(hv) => println!("Realized Vol:     {:.2}%", hv * 100.0),
                None => println!("Realized Vol:     n/a (insufficient data)"),
            }
            if let Some(diff) = snap.diff_percent() {
                println!("Spread:           {:+.1}%", diff);
            }
            println!("Pricing:          {}", snap.pricing());
            println!("\n{}", snap.comparison);
        }

        Commands::History {
            symbol,
            period,
            interval,
        } => {
            let request = PriceRequest::new(&symbol)
                .with_period(&period)?
                .with_interval(&interval)?;
            let source = market_data(&settings)?;
            let bars = source.fetch(&request).await?;

            println!(
                "\n=== {} ({} / {}) ===",
                request.symbol, request.period, request.interval
            );
            println!(
                "{:<17} {:>10} {:>10} {:>10} {:>10} {:>12}",
                "TIME", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
            );
            println!("{}", "-".repeat(74));

            let skip = bars.len().saturating_sub(30);
            for bar in &bars[skip..] {
                print_bar(bar);
            }
            println!("\n{} bars total", bars.len());
        }

        Commands::Config => {
            println!("\n{}", settings);
        }
    }

    Ok(())
}

async fn open_journal(settings: &Settings) -> Result<TradeLifecycle<Database>> {
    let db = Database::new(&settings.database_url).await?;
    Ok(TradeLifecycle::new(db))
}

fn market_data(settings: &Settings) -> Result<RetryingSource<ChartClient>> {
    let client = ChartClient::new(&settings.market_data_url)?;
    let source = RetryingSource::new(client, settings.retry_policy());
    let policy = source.policy();
    info!(
        attempts = policy.max_attempts,
        backoff_ms = policy.initial.as_millis() as u64,
        "Market data source ready"
    );
    Ok(source)
}

async fn snapshot(
    settings: &Settings,
    request: &PriceRequest,
    iv: f64,
    window: usize,
) -> Result<VolatilitySnapshot> {
    let source = market_data(settings)?;
    let bars = source.fetch(request).await?;
    let hv = VolatilityEstimator::estimate_from_bars(&bars, window);
    if hv.is_insufficient() {
        warn!(
            symbol = %request.symbol,
            bars = bars.len(),
            window,
            "Not enough history for the requested window"
        );
    }
    Ok(VolatilitySnapshot::new(&request.symbol, window, iv, hv)?)
}

/// Patch value for an optional price: set, clear, or leave untouched.
fn risk_level(value: Option<Decimal>, clear: bool) -> Option<Option<Decimal>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn print_entry(entry: &TradeEntry) {
    println!("\n=== Entry #{}: {} ===", entry.id, entry.symbol);
    println!("Status:         {}", entry.status());
    println!("Strategy:       {}", entry.strategy);
    println!("Direction:      {}", entry.direction);
    println!(
        "Opened:         {} {} x{} @ {}",
        entry.entry_date, entry.entry_action, entry.size, entry.entry_price
    );
    if let Some(stop) = entry.stop_price {
        println!("Stop:           {}", stop);
    }
    if let Some(target) = entry.target_price {
        println!("Target:         {}", target);
    }
    if let Some(exit) = &entry.exit {
        println!(
            "Closed:         {} {} @ {}",
            exit.date,
            entry.expected_exit_action(),
            exit.price
        );
    }
    if let Some(pnl) = entry.realized_pnl() {
        println!("Realized P&L:   ${}", pnl);
    }
    if let Some(days) = entry.holding_days() {
        println!("Held:           {} days", days);
    }
    if !entry.tags.is_empty() {
        println!("Tags ({}):       {}", entry.tags.len(), entry.tags);
    }
    if !entry.notes.is_empty() {
        println!("\nNotes:\n{}", entry.notes);
    }
}

fn print_bar(bar: &Bar) {
    let cell = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string());
    println!(
        "{:<17} {:>10} {:>10} {:>10} {:>10} {:>12}",
        bar.timestamp.format("%Y-%m-%d %H:%M"),
        cell(bar.open),
        cell(bar.high),
        cell(bar.low),
        cell(bar.close),
        bar.volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
