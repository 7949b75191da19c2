//! Read-only commands. They open the ledger file directly, so they work whether or not a daemon
//! is running.

use std::{fmt::Display, path::Path};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};
use serde::Serialize;

use crate::daemon::{
    config::TrackerConfig,
    proof::proof_inputs,
    storage::ledger::{LedgerStore, SqliteLedger},
};

use super::{daemon_path::current_daemon_path, output, process::daemon_running, Args};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct DayArgs {
    #[arg(
        default_value = "today",
        help = "Day to show. Examples are \"today\", \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    day: String,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl DayArgs {
    pub fn resolve(&self) -> Result<NaiveDate> {
        parse_day(&self.day, self.date_style)
    }
}

/// Local calendar day named by a free-form expression.
pub fn parse_day(expression: &str, style: DateStyle) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(expression, "%Y-%m-%d") {
        return Ok(date);
    }
    match parse_date_string(expression, Local::now(), style.into()) {
        Ok(v) => Ok(v.with_timezone(&Local).date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {expression:?}: {e}"),
            )
            .into()),
    }
}

fn open_ledger(app_dir: &Path) -> Result<SqliteLedger> {
    let config = TrackerConfig::load(app_dir)?;
    Ok(SqliteLedger::open(app_dir.join(config.ledger_file))?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LedgerStatus {
    daemon_running: bool,
    today: Option<crate::daemon::storage::entities::DailyAggregate>,
    samples_today: u64,
    last_screenshot_hash: Option<String>,
}

pub async fn status(app_dir: &Path, json: bool) -> Result<()> {
    let ledger = open_ledger(app_dir)?;
    let today = Local::now().date_naive();
    let status = LedgerStatus {
        daemon_running: daemon_running(&current_daemon_path()?)?,
        today: ledger.get_daily(today).await?,
        samples_today: ledger.sample_count_for(today).await?,
        last_screenshot_hash: ledger
            .last_screenshot_hash()
            .await?
            .map(|record| record.hash.to_string()),
    };
    if json {
        return print_json(&status);
    }

    println!(
        "Daemon: {}",
        if status.daemon_running {
            ansi_term::Colour::Green.paint("running")
        } else {
            ansi_term::Colour::Red.paint("not running")
        }
    );
    match &status.today {
        Some(aggregate) => output::print_aggregate(aggregate),
        None => println!("No activity recorded today"),
    }
    println!("Samples today: {}", status.samples_today);
    if let Some(hash) = &status.last_screenshot_hash {
        println!("Last screenshot hash: {hash}");
    }
    Ok(())
}

pub async fn history(app_dir: &Path, limit: usize, json: bool) -> Result<()> {
    let history = open_ledger(app_dir)?.recent_daily(limit).await?;
    if json {
        return print_json(&history);
    }
    output::print_history(&history);
    Ok(())
}

pub async fn summary(app_dir: &Path, day: NaiveDate, json: bool) -> Result<()> {
    let aggregate = open_ledger(app_dir)?.get_daily(day).await?;
    if json {
        return print_json(&aggregate);
    }
    match aggregate {
        Some(aggregate) => output::print_aggregate(&aggregate),
        None => println!("No summary for {day}"),
    }
    Ok(())
}

pub async fn hashes(app_dir: &Path, day: NaiveDate, json: bool) -> Result<()> {
    let hashes = open_ledger(app_dir)?.screenshot_hashes_for(day).await?;
    if json {
        return print_json(&hashes);
    }
    output::print_hashes(&hashes);
    Ok(())
}

pub async fn proof(app_dir: &Path, day: NaiveDate, json: bool) -> Result<()> {
    let ledger = open_ledger(app_dir)?;
    let inputs = proof_inputs(&ledger, day, chrono::Utc::now()).await?;
    if json {
        return print_json(&inputs);
    }
    match inputs {
        Some(inputs) => output::print_proof(&inputs),
        None => println!("Nothing to prove for {day}"),
    }
    Ok(())
}
