//! Background agent that keeps a private, tamper-evident ledger of your work activity.
//! Window activity is sampled, classified and encrypted with a device-bound key before it
//! touches disk, folded into per-day totals, and forwarded to off-device storage.
//!

pub mod cli;
pub mod daemon;
pub mod utils;
pub mod window_api;
