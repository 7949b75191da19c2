//!  Storage is organized through [ledger::SqliteLedger].
//!  The basic idea is:
//!   - There is one ledger file per installation.
//!   - Raw activity samples are appended as encrypted envelopes, never in clear.
//!   - Screenshot hashes are appended in clear, they carry nothing confidential.
//!   - Daily aggregates are derived data, one row per local calendar day, replaced wholesale on
//!     every update.

pub mod entities;
pub mod ledger;
pub mod merkle;
pub mod migrations;
pub mod record_event;
