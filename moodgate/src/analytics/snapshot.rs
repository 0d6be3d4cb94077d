use common::mood::Mood;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Number of labels listed in each ranking.
pub const TOP_N: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    All,
    Today,
}

impl Period {
    /// Lenient parse used for query strings; anything unrecognised is
    /// treated as `All`.
    pub fn from_param(raw: Option<&str>) -> Period {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("today") => Period::Today,
            _ => Period::All,
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::All => write!(f, "all"),
            Period::Today => write!(f, "today"),
        }
    }
}

/// Mood statistics for one user over one period.
///
/// `counts` always holds every canonical label, in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub counts: BTreeMap<Mood, u64>,
    pub total: u64,
    pub top_3_most: Vec<(Mood, u64)>,
    pub top_3_least: Vec<(Mood, u64)>,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub average_per_active_day: f64,
    pub period: Period,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mood: Option<Mood>,
}

impl AnalyticsSnapshot {
    pub fn empty(period: Period) -> Self {
        Self {
            counts: Mood::ALL.into_iter().map(|m| (m, 0)).collect(),
            total: 0,
            top_3_most: Vec::new(),
            top_3_least: Vec::new(),
            first_timestamp: None,
            last_timestamp: None,
            average_per_active_day: 0.0,
            period,
            mood: None,
        }
    }

    pub fn summary(&self) -> String {
        let window = match self.period {
            Period::All => "in total",
            Period::Today => "today",
        };

        if let Some(mood) = self.mood {
            let count = self.counts.get(&mood).copied().unwrap_or(0);
            return format!("{} was recorded {} {} {}.", mood, count, times(count), window);
        }

        if self.total == 0 {
            return match self.period {
                Period::All => "No mood records yet.".to_string(),
                Period::Today => "No mood records today yet.".to_string(),
            };
        }

        let per_mood = self
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(mood, count)| format!("{} {} {}", mood, count, times(*count)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut parts = vec![
            per_mood,
            format!("{} records {}", self.total, window),
        ];
        if self.average_per_active_day > 0.0 {
            parts.push(format!(
                "{} moods per active day on average",
                self.average_per_active_day
            ));
        }
        if !self.top_3_most.is_empty() {
            let most = self
                .top_3_most
                .iter()
                .map(|(mood, count)| format!("{} ({})", mood, count))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("Most frequent: {}", most));
        }
        if let (Some(first), Some(last)) = (&self.first_timestamp, &self.last_timestamp) {
            match self.period {
                Period::Today => parts.push(format!("First record today at {}", first)),
                Period::All => parts.push(format!(
                    "First record: {}, last record: {}",
                    date_part(first),
                    date_part(last)
                )),
            }
        }
        format!("{}.", parts.join(". "))
    }
}

fn times(count: u64) -> &'static str {
    if count == 1 {
        "time"
    } else {
        "times"
    }
}

fn date_part(timestamp: &str) -> &str {
    timestamp.split(' ').next().unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_period_from_param() {
        assert_eq!(Period::from_param(Some("Today")), Period::Today);
        assert_eq!(Period::from_param(Some("all")), Period::All);
        assert_eq!(Period::from_param(Some("weekly")), Period::All);
        assert_eq!(Period::from_param(None), Period::All);
    }

    #[test]
    fn test_empty_snapshot_has_every_label() {
        let snapshot = AnalyticsSnapshot::empty(Period::Today);
        assert_eq!(snapshot.counts.len(), 10);
        assert!(snapshot.counts.values().all(|c| *c == 0));
        assert_eq!(snapshot.summary(), "No mood records today yet.");

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["period"], "today");
        assert_eq!(json["counts"]["Mutlu"], 0);
        assert!(json.get("mood").is_none());
    }

    #[test]
    fn test_counts_serialize_in_canonical_order() {
        let snapshot = AnalyticsSnapshot::empty(Period::All);
        let json = serde_json::to_string(&snapshot.counts).unwrap();
        assert!(json.starts_with(r#"{"Mutlu":0,"Üzgün":0,"Öfkeli":0"#));
        assert!(json.ends_with(r#""Yorgun":0}"#));
    }
}
