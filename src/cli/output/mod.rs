pub mod analysis;

use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use futures::{stream, Stream, StreamExt};
use tracing::error;

use crate::storage::{
    entities::{parse_stats_key, stats_key, DailyStats},
    KeyValueStore, StoreExt,
};

/// Which daily buckets a report covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRange {
    Days(Vec<NaiveDate>),
    AllTime,
}

/// Loads the requested daily buckets. Days without data are skipped, buckets that can't be read
/// are reported once and skipped as well.
pub fn extract_days(
    store: Arc<dyn KeyValueStore>,
    range: ReportRange,
) -> impl Stream<Item = (NaiveDate, DailyStats)> {
    let days = match range {
        ReportRange::Days(days) => stream::iter(days).boxed(),
        ReportRange::AllTime => {
            let store = store.clone();
            stream::once(async move { all_days(store.as_ref()).await })
                .flat_map(stream::iter)
                .boxed()
        }
    };

    days.map(move |day| {
        let store = store.clone();
        async move { (day, store.get_typed::<DailyStats>(&stats_key(day)).await) }
    })
    .buffered(4)
    .filter_map(|(day, stats)| async move {
        match stats {
            Ok(stats) => stats.map(|stats| (day, stats)),
            Err(e) => {
                error!("Failed to read stats for {day} {e:?}");
                None
            }
        }
    })
}

async fn all_days(store: &dyn KeyValueStore) -> Vec<NaiveDate> {
    match store.get_all().await {
        Ok(values) => days_in(&values),
        Err(e) => {
            error!("Failed to list stored days {e:?}");
            vec![]
        }
    }
}

fn days_in<V>(values: &BTreeMap<String, V>) -> Vec<NaiveDate> {
    values.keys().filter_map(|key| parse_stats_key(key)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::NaiveDate;
    use futures::StreamExt;
    use serde_json::json;

    use crate::storage::{memory::MemoryStore, KeyValueStore};

    use super::{extract_days, ReportRange};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    async fn store() -> Result<Arc<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store
            .set(vec![
                ("stats_2025-01-02".into(), json!({ "docs.rs": 60. })),
                ("stats_2025-01-03".into(), json!("broken")),
                ("stats_2025-01-05".into(), json!({ "github.com": 5. })),
                ("timers".into(), json!([])),
            ])
            .await?;
        Ok(store)
    }

    #[tokio::test]
    async fn loads_requested_days_in_order() -> Result<()> {
        let days: Vec<_> = extract_days(
            store().await?,
            ReportRange::Days(vec![date(5), date(4), date(3), date(2)]),
        )
        .collect()
        .await;
        let dates: Vec<_> = days.iter().map(|(day, _)| *day).collect();
        assert_eq!(dates, vec![date(5), date(2)]);
        assert_eq!(days[1].1.get("docs.rs"), Some(&60.));
        Ok(())
    }

    #[tokio::test]
    async fn all_time_finds_every_bucket() -> Result<()> {
        let days: Vec<_> = extract_days(store().await?, ReportRange::AllTime)
            .collect()
            .await;
        let dates: Vec<_> = days.iter().map(|(day, _)| *day).collect();
        assert_eq!(dates, vec![date(2), date(5)]);
        Ok(())
    }
}
