//! Countdown timers started from the popup or the schedule planner.

pub mod badge;
pub mod registry;

use chrono::{DateTime, Utc};
use rand::{distributions::Uniform, Rng};

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Ids look like `timer_<epoch-ms>_<9 base-36 chars>`.
pub fn generate_timer_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Uniform::from(0..BASE36.len()))
        .take(ID_SUFFIX_LEN)
        .map(|i| BASE36[i] as char)
        .collect();
    format!("timer_{}_{suffix}", now.timestamp_millis())
}

/// Coarse duration used in completion messages, rounded to the nearest unit.
pub fn format_rounded(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h", (seconds as f64 / 3600.).round())
    } else if seconds >= 60 {
        format!("{}m", (seconds as f64 / 60.).round())
    } else {
        format!("{seconds}s")
    }
}
