//! Utility functions and helpers

use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Create a safe filename from a string
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Keep the first `max_chars` characters, appending `...` when anything was cut
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}

/// Human label for how long ago `timestamp` was, in local calendar days
pub fn relative_day_label(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let then = timestamp.with_timezone(&Local).date_naive();
    let today = now.with_timezone(&Local).date_naive();
    match (today - then).num_days() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        days @ 2..=6 => format!("{} days ago", days),
        _ => then.format("%Y-%m-%d").to_string(),
    }
}
