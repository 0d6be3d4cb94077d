//! Canonical mood vocabulary and the label normalizer.
//!
//! Storage and analytics only ever see one of the ten [`Mood`] labels. Noisy
//! generator output is mapped onto them with [`Mood::from_label`] (exact match
//! plus the misspelling table); emoji selection additionally accepts a loose
//! substring match through [`normalize_loose`].

use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mood {
    #[serde(rename = "Mutlu")]
    Happy,
    #[serde(rename = "Üzgün")]
    Sad,
    #[serde(rename = "Öfkeli")]
    Angry,
    #[serde(rename = "Şaşkın")]
    Surprised,
    #[serde(rename = "Utanmış")]
    Embarrassed,
    #[serde(rename = "Endişeli")]
    Anxious,
    #[serde(rename = "Gülümseyen")]
    Smiling,
    #[serde(rename = "Flörtöz")]
    Flirty,
    #[serde(rename = "Sorgulayıcı")]
    Curious,
    #[serde(rename = "Yorgun")]
    Tired,
}

impl Mood {
    /// All labels in canonical order. Analytics key order and ranking
    /// tie-breaks follow this order.
    pub const ALL: [Mood; 10] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Angry,
        Mood::Surprised,
        Mood::Embarrassed,
        Mood::Anxious,
        Mood::Smiling,
        Mood::Flirty,
        Mood::Curious,
        Mood::Tired,
    ];

    /// Moods picked from at random when a turn's mood cannot be extracted.
    pub const FALLBACK: [Mood; 3] = [Mood::Happy, Mood::Sad, Mood::Surprised];

    pub fn label(&self) -> &'static str {
        match self {
            Mood::Happy => "Mutlu",
            Mood::Sad => "Üzgün",
            Mood::Angry => "Öfkeli",
            Mood::Surprised => "Şaşkın",
            Mood::Embarrassed => "Utanmış",
            Mood::Anxious => "Endişeli",
            Mood::Smiling => "Gülümseyen",
            Mood::Flirty => "Flörtöz",
            Mood::Curious => "Sorgulayıcı",
            Mood::Tired => "Yorgun",
        }
    }

    /// Strict lookup used before anything is stored: case-insensitive exact
    /// match, then the misspelling table.
    pub fn from_label(raw: &str) -> Option<Mood> {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }

        Mood::ALL
            .iter()
            .copied()
            .find(|mood| mood.label().to_lowercase() == lowered)
            .or_else(|| lookup_variant(&lowered))
    }
}

impl Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// keys are lower-cased
const VARIANTS: &[(&str, Mood)] = &[
    ("mutlu", Mood::Happy),
    ("üzgün", Mood::Sad),
    ("uzgun", Mood::Sad),
    ("öfkeli", Mood::Angry),
    ("ofkeli", Mood::Angry),
    ("şaşkın", Mood::Surprised),
    ("şaşkin", Mood::Surprised),
    ("saskin", Mood::Surprised),
    ("utanmış", Mood::Embarrassed),
    ("utanmiş", Mood::Embarrassed),
    ("utanmis", Mood::Embarrassed),
    ("utangaç", Mood::Embarrassed),
    ("utangac", Mood::Embarrassed),
    ("endişeli", Mood::Anxious),
    ("endiseli", Mood::Anxious),
    ("gülümseyen", Mood::Smiling),
    ("güllümseyen", Mood::Smiling),
    ("gullumseyen", Mood::Smiling),
    ("gulumseyen", Mood::Smiling),
    ("gulumsyen", Mood::Smiling),
    ("flörtöz", Mood::Flirty),
    ("flortoz", Mood::Flirty),
    ("flörtoz", Mood::Flirty),
    ("flortöz", Mood::Flirty),
    ("sorgulayıcı", Mood::Curious),
    ("sorgulayici", Mood::Curious),
    ("sorgulayıci", Mood::Curious),
    ("yorgun", Mood::Tired),
];

fn lookup_variant(lowered: &str) -> Option<Mood> {
    VARIANTS
        .iter()
        .find(|(variant, _)| *variant == lowered)
        .map(|(_, mood)| *mood)
}

/// Maps a noisy label onto its canonical spelling, or returns the trimmed
/// input unchanged when nothing matches.
pub fn normalize(raw: &str) -> String {
    match Mood::from_label(raw) {
        Some(mood) => mood.label().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Like [`Mood::from_label`] but also accepts a substring match in either
/// direction. Only used to pick a display emoji, never for storage.
pub fn normalize_loose(raw: &str) -> Option<Mood> {
    if let Some(mood) = Mood::from_label(raw) {
        return Some(mood);
    }

    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    Mood::ALL.iter().copied().find(|mood| {
        let label = mood.label().to_lowercase();
        label.contains(&lowered) || lowered.contains(&label)
    })
}
