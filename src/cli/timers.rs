use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;

use crate::{
    storage::{entities::Timer, file_store::JsonFileStore, StoreExt, TIMERS_KEY},
    timers::badge::format_remaining,
};

use super::application_dir;

#[derive(Debug, Parser)]
pub struct TimersCommand {
    #[arg(
        long,
        help = "Application directory. By default reads from $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

pub async fn process_timers_command(command: TimersCommand) -> Result<()> {
    let store = JsonFileStore::open_in(&application_dir(command.dir)?).await?;
    let timers: Vec<Timer> = store.get_typed(TIMERS_KEY).await?.unwrap_or_default();
    for line in describe_timers(&timers, Utc::now()) {
        println!("{line}");
    }
    Ok(())
}

fn describe_timers(timers: &[Timer], now: DateTime<Utc>) -> Vec<String> {
    if timers.is_empty() {
        return vec!["No timers".into()];
    }
    timers
        .iter()
        .map(|timer| {
            let remaining = timer.remaining(now).num_milliseconds().max(0) as u64;
            let status = if timer.is_running() { "running" } else { "paused" };
            format!(
                "{}\t{status}\t{} left of {}",
                timer.id,
                format_remaining(remaining.div_ceil(1000)),
                format_remaining(timer.original_duration)
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::storage::entities::{Timer, TimerStatus};

    use super::describe_timers;

    #[test]
    fn lists_running_and_paused_timers() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        let timers = [
            Timer {
                id: "timer_1_a".into(),
                status: TimerStatus::Running,
                end_time: Some(now + Duration::seconds(90)),
                duration: 300,
                original_duration: 300,
                remaining_on_pause: None,
            },
            Timer {
                id: "timer_2_b".into(),
                status: TimerStatus::Paused,
                end_time: None,
                duration: 60,
                original_duration: 60,
                remaining_on_pause: Some(Duration::seconds(20)),
            },
        ];
        assert_eq!(
            describe_timers(&timers, now),
            vec![
                "timer_1_a\trunning\t2m left of 5m",
                "timer_2_b\tpaused\t20s left of 1m",
            ]
        );
        assert_eq!(describe_timers(&[], now), vec!["No timers"]);
    }
}
