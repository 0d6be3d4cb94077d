const ZERO_WIDTH_JOINER: char = '\u{200D}';
const VARIATION_SELECTOR_16: char = '\u{FE0F}';

const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F), // emoticons
    (0x1F300, 0x1F5FF), // symbols & pictographs, skin tones
    (0x1F680, 0x1F6FF), // transport & map
    (0x1F1E0, 0x1F1FF), // regional indicators
    (0x2702, 0x27B0),
    (0x24C2, 0x24C2),
    (0x1F170, 0x1F251), // enclosed alphanumerics & ideographs
    (0x1F900, 0x1F9FF),
    (0x1FA00, 0x1FAFF),
    (0x2600, 0x26FF),
    (0x2700, 0x27BF),
];

pub fn is_emoji(ch: char) -> bool {
    let cp = ch as u32;
    EMOJI_RANGES
        .iter()
        .any(|(lo, hi)| (*lo..=*hi).contains(&cp))
}

enum Segment {
    Text(String),
    Run(String),
}

fn segments(text: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<Segment> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let in_run = matches!(out.last(), Some(Segment::Run(_)));

        let extends_run = is_emoji(ch)
            || (in_run && ch == VARIATION_SELECTOR_16)
            || (in_run
                && ch == ZERO_WIDTH_JOINER
                && chars.get(i + 1).copied().is_some_and(is_emoji));

        match (extends_run, out.last_mut()) {
            (true, Some(Segment::Run(run))) => run.push(ch),
            (true, _) => out.push(Segment::Run(ch.to_string())),
            (false, Some(Segment::Text(t))) => t.push(ch),
            (false, _) => out.push(Segment::Text(ch.to_string())),
        }
        i += 1;
    }

    out
}

pub fn count_emoji_runs(text: &str) -> usize {
    segments(text)
        .iter()
        .filter(|s| matches!(s, Segment::Run(_)))
        .count()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps at most `max_runs` emoji runs in `text`.
///
/// When the limit is exceeded every run is removed from its position and the
/// first `max_runs` are appended, in order, after a single space. Whitespace
/// is collapsed and the ends trimmed in every case.
pub fn limit_emoji_runs(text: &str, max_runs: usize) -> String {
    let segments = segments(text);
    let run_count = segments
        .iter()
        .filter(|s| matches!(s, Segment::Run(_)))
        .count();

    if run_count <= max_runs {
        return collapse_whitespace(text);
    }

    let mut cleaned = String::with_capacity(text.len());
    let mut kept = String::new();
    let mut taken = 0;
    for segment in &segments {
        match segment {
            Segment::Text(t) => cleaned.push_str(t),
            Segment::Run(run) => {
                if taken < max_runs {
                    kept.push_str(run);
                    taken += 1;
                }
                // keeps "a😀b" from fusing into "ab"
                cleaned.push(' ');
            }
        }
    }

    collapse_whitespace(&format!("{} {}", cleaned, kept))
}
