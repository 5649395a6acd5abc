//! Passive time tracking. [router::EventRouter] decides which domain is current and
//! [clock::ActivityClock] turns the time spent on it into daily totals.

pub mod clock;
pub mod router;
