use ansi_term::{Colour, Style};
use chrono::Local;

use crate::{
    daemon::{
        proof::ProofInputs,
        storage::entities::{DailyAggregate, ScreenshotHashRecord},
    },
    utils::hash::short,
};

pub fn format_minutes(minutes: f64) -> String {
    let total = (minutes * 60.).round() as i64;
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn heading(text: &str) -> String {
    Style::new().bold().paint(text).to_string()
}

pub fn print_aggregate(aggregate: &DailyAggregate) {
    println!(
        "{}\t{}",
        heading(&aggregate.date.format("%Y-%m-%d").to_string()),
        Colour::Green.paint(format_minutes(aggregate.total_active_minutes))
    );
    let categories = [
        ("coding", aggregate.coding_minutes),
        ("meeting", aggregate.meeting_minutes),
        ("browser", aggregate.browser_minutes),
        ("communication", aggregate.communication_minutes),
        ("productivity", aggregate.productivity_minutes),
        ("other", aggregate.other_minutes),
    ];
    for (name, minutes) in categories.into_iter().filter(|(_, minutes)| *minutes > 0.) {
        println!("  {name:<14}{}", format_minutes(minutes));
    }
    if let Some(root) = &aggregate.merkle_root {
        println!("  {:<14}{}", "root", Colour::Cyan.paint(short(root)));
    }
    if let Some(blob_id) = &aggregate.blob_id {
        println!("  {:<14}{}", "blob", blob_id);
    }
}

pub fn print_history(history: &[DailyAggregate]) {
    if history.is_empty() {
        println!("No activity recorded yet");
        return;
    }
    for aggregate in history {
        println!(
            "{}\t{:>8}\t{}",
            aggregate.date.format("%Y-%m-%d"),
            format_minutes(aggregate.total_active_minutes),
            if aggregate.merkle_root.is_some() {
                Colour::Cyan.paint("sealed")
            } else {
                Colour::Yellow.paint("open")
            }
        );
    }
}

pub fn print_hashes(hashes: &[ScreenshotHashRecord]) {
    for record in hashes {
        println!(
            "{}\t{}",
            record.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            record.hash
        );
    }
}

pub fn print_proof(proof: &ProofInputs) {
    println!("{}", heading("Proof inputs"));
    println!("  duration      {}s", proof.duration_seconds);
    println!("  timestamp     {}", proof.timestamp.timestamp());
    println!("  activity hash {}", proof.activity_hash);
}
