use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a ledger key in workchain.
pub fn date_to_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn key_to_date(key: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_KEY_FORMAT)
        .with_context(|| format!("'{key}' is not a valid ledger date"))
}

/// Calendar date of `moment` on this device. Days are always split by local time.
pub fn local_date(moment: DateTime<Utc>) -> NaiveDate {
    moment.with_timezone(&Local).date_naive()
}
