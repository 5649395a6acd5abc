use chrono::{DateTime, Utc};

use crate::{
    storage::entities::Timer,
    surface::{Badge, PAUSED_BADGE_COLOR, RUNNING_BADGE_COLOR},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeView {
    Show(Badge),
    /// The timer that should be displayed has already run out. It has to be finished before a
    /// badge can be shown.
    Expired(String),
}

/// Badge for the soonest ending running timer. Ties go to the timer started first.
pub fn badge_view(timers: &[Timer], now: DateTime<Utc>) -> BadgeView {
    let next = timers
        .iter()
        .filter(|timer| timer.is_running())
        .min_by_key(|timer| timer.end_time);

    if let Some(next) = next {
        let millis = next.remaining(now).num_milliseconds();
        let remaining = (millis + 999) / 1000;
        if remaining <= 0 {
            return BadgeView::Expired(next.id.clone());
        }
        let mut text = format_remaining(remaining as u64);
        if timers.len() > 1 {
            text = format!("{}·{text}", timers.len());
        }
        return BadgeView::Show(Badge {
            text,
            color: Some(RUNNING_BADGE_COLOR),
        });
    }

    let paused = timers.iter().filter(|timer| timer.is_paused()).count();
    if paused > 0 {
        BadgeView::Show(Badge {
            text: format!("⏸{paused}"),
            color: Some(PAUSED_BADGE_COLOR),
        })
    } else {
        BadgeView::Show(Badge::cleared())
    }
}

/// Rounds up at the largest unit that fits.
pub fn format_remaining(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h", seconds.div_ceil(3600))
    } else if seconds >= 60 {
        format!("{}m", seconds.div_ceil(60))
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::{
        storage::entities::{Timer, TimerStatus},
        surface::{Badge, PAUSED_BADGE_COLOR, RUNNING_BADGE_COLOR},
    };

    use super::{badge_view, format_remaining, BadgeView};

    fn running(id: &str, remaining: Duration) -> Timer {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        Timer {
            id: id.into(),
            status: TimerStatus::Running,
            end_time: Some(now + remaining),
            duration: 600,
            original_duration: 600,
            remaining_on_pause: None,
        }
    }

    fn paused(id: &str) -> Timer {
        Timer {
            id: id.into(),
            status: TimerStatus::Paused,
            end_time: None,
            duration: 600,
            original_duration: 600,
            remaining_on_pause: Some(Duration::seconds(30)),
        }
    }

    fn shown(text: &str, color: &'static str) -> BadgeView {
        BadgeView::Show(Badge {
            text: text.into(),
            color: Some(color),
        })
    }

    #[test]
    fn remaining_time_rounds_up_per_unit() {
        assert_eq!(format_remaining(45), "45s");
        assert_eq!(format_remaining(60), "1m");
        assert_eq!(format_remaining(125), "3m");
        assert_eq!(format_remaining(3600), "1h");
        assert_eq!(format_remaining(3605), "2h");
    }

    #[test]
    fn shows_soonest_timer_with_count() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        let timers = [
            running("a", Duration::seconds(3605)),
            running("b", Duration::milliseconds(44_200)),
        ];
        assert_eq!(badge_view(&timers, now), shown("2·45s", RUNNING_BADGE_COLOR));
        assert_eq!(
            badge_view(&timers[..1], now),
            shown("2h", RUNNING_BADGE_COLOR)
        );
    }

    #[test]
    fn paused_timers_count_towards_prefix() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        let timers = [paused("a"), running("b", Duration::seconds(125))];
        assert_eq!(badge_view(&timers, now), shown("2·3m", RUNNING_BADGE_COLOR));
        assert_eq!(
            badge_view(&[paused("a"), paused("b")], now),
            shown("⏸2", PAUSED_BADGE_COLOR)
        );
        assert_eq!(badge_view(&[], now), BadgeView::Show(Badge::cleared()));
    }

    #[test]
    fn expired_timer_is_reported() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        let timers = [
            running("late", Duration::seconds(-3)),
            running("on_time", Duration::seconds(90)),
        ];
        assert_eq!(badge_view(&timers, now), BadgeView::Expired("late".into()));
    }

    #[test]
    fn ties_pick_the_earlier_timer() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        let timers = [
            running("first", Duration::seconds(-1)),
            running("second", Duration::seconds(-1)),
        ];
        assert_eq!(badge_view(&timers, now), BadgeView::Expired("first".into()));
    }
}
