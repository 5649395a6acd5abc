//! Native messaging host and cli for tracking time spent on websites.
//! The browser extension forwards tab, window and idle signals to the host, which attributes the
//! time to domains, runs countdown timers and wakes the extension up for reminders. The cli reads
//! the same store to print reports.
//!

pub mod alarms;
pub mod browser;
pub mod cli;
pub mod domain;
pub mod host;
pub mod storage;
pub mod surface;
pub mod timers;
pub mod tracking;
pub mod utils;
