use std::collections::HashMap;

use crate::{
    domain::is_sentinel,
    storage::entities::DailyStats,
    utils::percentage::{seconds_percentage, Percentage},
};

#[derive(Debug, Clone, PartialEq)]
pub struct DomainUsage {
    pub domain: String,
    pub seconds: f64,
    pub percentage: Percentage,
}

/// Sums the days per domain. Returns the `top` domains by time together with the total time of
/// every domain, so percentages stay relative to the whole range.
pub fn analyze_domains<'a>(
    days: impl IntoIterator<Item = &'a DailyStats>,
    top: usize,
) -> (Vec<DomainUsage>, f64) {
    let mut totals = HashMap::<&str, f64>::new();
    for day in days {
        for (domain, seconds) in day {
            if is_sentinel(domain) || !seconds.is_finite() || *seconds <= 0. {
                continue;
            }
            *totals.entry(domain.as_str()).or_insert(0.) += seconds;
        }
    }

    let total: f64 = totals.values().sum();
    let mut usages = totals
        .into_iter()
        .map(|(domain, seconds)| DomainUsage {
            domain: domain.to_string(),
            seconds,
            percentage: seconds_percentage(seconds, total),
        })
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| {
        b.seconds
            .total_cmp(&a.seconds)
            .then_with(|| a.domain.cmp(&b.domain))
    });
    usages.truncate(top);
    (usages, total)
}

/// Formats whole seconds as `XhYmZs`, leaving out leading zero units.
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.).round() as u64;
    let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::entities::DailyStats;

    use super::{analyze_domains, format_duration};

    fn day(entries: &[(&str, f64)]) -> DailyStats {
        entries
            .iter()
            .map(|(domain, seconds)| (domain.to_string(), *seconds))
            .collect()
    }

    #[test]
    fn sums_sorts_and_limits() {
        let days = [
            day(&[("docs.rs", 600.), ("github.com", 300.), ("null", 999.)]),
            day(&[("github.com", 400.), ("leetcode.com", 100.), ("undefined", 5.)]),
        ];
        let (usages, total) = analyze_domains(&days, 2);
        assert_eq!(total, 1400.);
        let names: Vec<_> = usages.iter().map(|u| u.domain.as_str()).collect();
        assert_eq!(names, vec!["github.com", "docs.rs"]);
        assert_eq!(usages[0].seconds, 700.);
        assert_eq!(*usages[0].percentage, 50.);
    }

    #[test]
    fn empty_range_has_no_usage() {
        let (usages, total) = analyze_domains(&Vec::<DailyStats>::new(), 10);
        assert!(usages.is_empty());
        assert_eq!(total, 0.);
    }

    #[test]
    fn durations_drop_leading_units() {
        assert_eq!(format_duration(42.4), "42s");
        assert_eq!(format_duration(125.), "2m5s");
        assert_eq!(format_duration(3725.), "1h2m5s");
        assert_eq!(format_duration(-3.), "0s");
    }
}
