//! Period-windowed mood statistics.
//!
//! Everything is computed from [`MoodEventLog::events_since`] on each call,
//! so every backend yields the same snapshot for the same events.

use chrono::{Local, NaiveDateTime, NaiveTime};
use common::mood::Mood;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::state::{MoodEventLog, StateStorageError, TIMESTAMP_FORMAT};

pub mod snapshot;

pub use snapshot::{AnalyticsSnapshot, Period, TOP_N};

pub struct MoodAnalytics {
    log: Arc<dyn MoodEventLog>,
}

impl MoodAnalytics {
    pub fn new(log: Arc<dyn MoodEventLog>) -> Self {
        Self { log }
    }

    pub async fn compute(
        &self,
        user_id: &str,
        period: Period,
        mood: Option<&str>,
    ) -> Result<AnalyticsSnapshot, StateStorageError> {
        self.compute_at(user_id, period, mood, Local::now().naive_local())
            .await
    }

    /// Same as [`compute`](Self::compute) with an explicit "now", which only
    /// matters for [`Period::Today`].
    pub async fn compute_at(
        &self,
        user_id: &str,
        period: Period,
        mood: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<AnalyticsSnapshot, StateStorageError> {
        let since = match period {
            Period::All => None,
            Period::Today => Some(now.date().and_time(NaiveTime::MIN)),
        };
        let events = self.log.events_since(user_id, since).await?;

        let mut snapshot = AnalyticsSnapshot::empty(period);
        for event in &events {
            *snapshot.counts.entry(event.mood).or_insert(0) += 1;
        }

        if let Some(mood) = mood.and_then(Mood::from_label) {
            let only = snapshot.counts.get(&mood).copied().unwrap_or(0);
            for (label, count) in snapshot.counts.iter_mut() {
                if *label != mood {
                    *count = 0;
                }
            }
            snapshot.total = only;
            snapshot.mood = Some(mood);
            debug!(user_id = %user_id, period = %period, mood = %mood, count = only, "filtered mood snapshot");
            return Ok(snapshot);
        }

        snapshot.total = snapshot.counts.values().sum();
        snapshot.top_3_most = rank(&snapshot, true);
        snapshot.top_3_least = rank(&snapshot, false);
        snapshot.first_timestamp = events
            .iter()
            .map(|e| e.occurred_at)
            .min()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string());
        snapshot.last_timestamp = events
            .iter()
            .map(|e| e.occurred_at)
            .max()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string());

        let active_days: BTreeSet<_> = events.iter().map(|e| e.occurred_at.date()).collect();
        snapshot.average_per_active_day = if active_days.is_empty() {
            0.0
        } else {
            round2(snapshot.total as f64 / active_days.len() as f64)
        };

        debug!(
            user_id = %user_id,
            period = %period,
            total = snapshot.total,
            active_days = active_days.len(),
            "computed mood snapshot"
        );
        Ok(snapshot)
    }
}

/// Labels with a positive count, ordered by count. Ties keep canonical order.
fn rank(snapshot: &AnalyticsSnapshot, most_first: bool) -> Vec<(Mood, u64)> {
    let mut ranked: Vec<(Mood, u64)> = snapshot
        .counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(mood, count)| (*mood, *count))
        .collect();
    if most_first {
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
    } else {
        ranked.sort_by(|a, b| a.1.cmp(&b.1));
    }
    ranked.truncate(TOP_N);
    ranked
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::flat_file::FlatFileMoodLog;
    use crate::state::memory::MemoryMoodLog;
    use crate::state::MoodEvent;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn ts(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).unwrap()
    }

    async fn seeded(events: &[(&str, Mood, &str)]) -> Arc<MemoryMoodLog> {
        let log = Arc::new(MemoryMoodLog::new());
        for (user, mood, at) in events {
            log.append(MoodEvent::new(*user, *mood, ts(at))).await.unwrap();
        }
        log
    }

    #[tokio::test]
    async fn test_history_scenario_all_period() {
        let log = seeded(&[
            ("u1", Mood::Happy, "2024-01-01 10:00:00"),
            ("u1", Mood::Sad, "2024-01-01 11:00:00"),
            ("u1", Mood::Happy, "2024-01-02 09:00:00"),
        ])
        .await;
        let analytics = MoodAnalytics::new(log);

        let snapshot = analytics
            .compute_at("u1", Period::All, None, ts("2024-01-02 12:00:00"))
            .await
            .unwrap();

        assert_eq!(snapshot.counts[&Mood::Happy], 2);
        assert_eq!(snapshot.counts[&Mood::Sad], 1);
        assert_eq!(
            snapshot.counts.values().filter(|c| **c == 0).count(),
            8
        );
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.average_per_active_day, 1.5);
        assert_eq!(snapshot.top_3_most, vec![(Mood::Happy, 2), (Mood::Sad, 1)]);
        assert_eq!(snapshot.top_3_least, vec![(Mood::Sad, 1), (Mood::Happy, 2)]);
        assert_eq!(snapshot.first_timestamp.as_deref(), Some("2024-01-01 10:00:00"));
        assert_eq!(snapshot.last_timestamp.as_deref(), Some("2024-01-02 09:00:00"));
        assert_eq!(
            snapshot.summary(),
            "Mutlu 2 times, Üzgün 1 time. 3 records in total. \
             1.5 moods per active day on average. Most frequent: Mutlu (2), Üzgün (1). \
             First record: 2024-01-01, last record: 2024-01-02."
        );
    }

    #[tokio::test]
    async fn test_today_starts_at_local_midnight() {
        let log = seeded(&[
            ("u1", Mood::Happy, "2024-01-01 23:59:59"),
            ("u1", Mood::Tired, "2024-01-02 00:00:00"),
            ("u1", Mood::Curious, "2024-01-02 08:30:00"),
            ("u2", Mood::Angry, "2024-01-02 09:00:00"),
        ])
        .await;
        let analytics = MoodAnalytics::new(log);

        let snapshot = analytics
            .compute_at("u1", Period::Today, None, ts("2024-01-02 12:00:00"))
            .await
            .unwrap();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.counts[&Mood::Happy], 0);
        assert_eq!(snapshot.average_per_active_day, 2.0);
        assert_eq!(snapshot.first_timestamp.as_deref(), Some("2024-01-02 00:00:00"));
        assert_eq!(snapshot.period, Period::Today);
    }

    #[tokio::test]
    async fn test_ties_follow_canonical_order() {
        let log = seeded(&[
            ("u1", Mood::Tired, "2024-01-01 10:00:00"),
            ("u1", Mood::Angry, "2024-01-01 11:00:00"),
            ("u1", Mood::Curious, "2024-01-01 12:00:00"),
            ("u1", Mood::Sad, "2024-01-01 13:00:00"),
            ("u1", Mood::Sad, "2024-01-01 14:00:00"),
        ])
        .await;
        let snapshot = MoodAnalytics::new(log)
            .compute_at("u1", Period::All, None, ts("2024-01-01 15:00:00"))
            .await
            .unwrap();

        assert_eq!(
            snapshot.top_3_most,
            vec![(Mood::Sad, 2), (Mood::Angry, 1), (Mood::Curious, 1)]
        );
        assert_eq!(
            snapshot.top_3_least,
            vec![(Mood::Angry, 1), (Mood::Curious, 1), (Mood::Tired, 1)]
        );
    }

    #[tokio::test]
    async fn test_mood_filter_short_circuits() {
        let log = seeded(&[
            ("u1", Mood::Happy, "2024-01-01 10:00:00"),
            ("u1", Mood::Sad, "2024-01-01 11:00:00"),
            ("u1", Mood::Happy, "2024-01-02 09:00:00"),
        ])
        .await;
        let analytics = MoodAnalytics::new(log);
        let now = ts("2024-01-02 12:00:00");

        let snapshot = analytics
            .compute_at("u1", Period::All, Some("mutlu"), now)
            .await
            .unwrap();
        assert_eq!(snapshot.mood, Some(Mood::Happy));
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.counts[&Mood::Sad], 0);
        assert_eq!(snapshot.counts.len(), 10);
        assert!(snapshot.top_3_most.is_empty());
        assert_eq!(snapshot.first_timestamp, None);
        assert_eq!(snapshot.average_per_active_day, 0.0);
        assert_eq!(snapshot.summary(), "Mutlu was recorded 2 times in total.");

        // an unrecognised filter is ignored
        let full = analytics
            .compute_at("u1", Period::All, Some("Heyecanlı"), now)
            .await
            .unwrap();
        assert_eq!(full.mood, None);
        assert_eq!(full.total, 3);
    }

    #[tokio::test]
    async fn test_no_events() {
        let analytics = MoodAnalytics::new(Arc::new(MemoryMoodLog::new()));
        let snapshot = analytics.compute("nobody", Period::All, None).await.unwrap();
        assert_eq!(snapshot, AnalyticsSnapshot::empty(Period::All));
    }

    #[tokio::test]
    async fn test_backends_produce_identical_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let flat = Arc::new(FlatFileMoodLog::open(dir.path().join("moods.jsonl")).await.unwrap());
        let memory = Arc::new(MemoryMoodLog::new());

        let day = |d: u32, h: u32, m: u32| {
            NaiveDate::from_ymd_opt(2024, 3, d)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        let history = [
            ("u1", Mood::Anxious, day(1, 8, 0)),
            ("u1", Mood::Happy, day(1, 9, 15)),
            ("u2", Mood::Sad, day(1, 9, 30)),
            ("u1", Mood::Happy, day(3, 22, 5)),
            ("u1", Mood::Flirty, day(4, 0, 0)),
            ("u1", Mood::Smiling, day(4, 7, 45)),
            ("u1", Mood::Embarrassed, day(4, 11, 10)),
            ("u1", Mood::Anxious, day(4, 11, 11)),
        ];
        // appended out of order on purpose
        for (user, mood, at) in history.iter().rev() {
            flat.append(MoodEvent::new(*user, *mood, *at)).await.unwrap();
        }
        for (user, mood, at) in history.iter() {
            memory.append(MoodEvent::new(*user, *mood, *at)).await.unwrap();
        }

        let flat = MoodAnalytics::new(flat);
        let memory = MoodAnalytics::new(memory);
        let now = day(4, 12, 0);

        for period in [Period::All, Period::Today] {
            for mood in [None, Some("endiseli")] {
                let a = flat.compute_at("u1", period, mood, now).await.unwrap();
                let b = memory.compute_at("u1", period, mood, now).await.unwrap();
                assert_eq!(
                    serde_json::to_string(&a).unwrap(),
                    serde_json::to_string(&b).unwrap()
                );
            }
        }

        let today = memory.compute_at("u1", Period::Today, None, now).await.unwrap();
        assert_eq!(today.total, 4);
        assert_eq!(today.average_per_active_day, 4.0);
    }
}
