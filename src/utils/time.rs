use chrono::{DateTime, Days, Local, NaiveDate, Utc};

/// This is the standard way of converting a date to a string in webtime.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Calendar day of `time` in the local time zone. Daily buckets are keyed by it.
pub fn local_date(time: DateTime<Utc>) -> NaiveDate {
    time.with_timezone(&Local).date_naive()
}

/// Minutes since local midnight.
pub fn local_minute_of_day(time: DateTime<Utc>) -> u32 {
    use chrono::Timelike;
    let local = time.with_timezone(&Local);
    local.hour() * 60 + local.minute()
}

/// Seven days ending at `end` (inclusive), newest first.
pub fn week_ending(end: NaiveDate) -> Vec<NaiveDate> {
    (0..7)
        .filter_map(|offset| end.checked_sub_days(Days::new(offset)))
        .collect()
}
