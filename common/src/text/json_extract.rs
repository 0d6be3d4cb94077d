use serde_json::Value;

const FENCE_MARKERS: [&str; 2] = ["```json", "```"];

/// Returns the first balanced `{...}` object found in `text`, parsed as JSON.
///
/// Generator output often wraps the object in code fences or surrounds it with
/// commentary. Braces inside quoted strings do not count towards depth. `None`
/// means no complete object was found or the candidate did not parse.
pub fn extract_first_object(text: &str) -> Option<Value> {
    let mut cleaned = text.to_string();
    for marker in FENCE_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned = cleaned.trim();

    let start = cleaned.find('{')?;
    let end = matching_close(&cleaned[start..])?;
    let candidate = &cleaned[start..start + end + 1];

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Byte offset of the brace closing the one at offset 0.
fn matching_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fenced_object_with_trailing_text() {
        let raw = "```json\n{\"ruh_hali\": \"Mutlu\"}\n``` extra text";
        assert_eq!(extract_first_object(raw), Some(json!({"ruh_hali": "Mutlu"})));
    }

    #[test]
    fn test_brace_inside_string_does_not_close() {
        assert_eq!(extract_first_object(r#"{"a":"}"}"#), Some(json!({"a": "}"})));
        assert_eq!(
            extract_first_object(r#"noise {"a":"{{", "b": {"c": 1}} tail }"#),
            Some(json!({"a": "{{", "b": {"c": 1}}))
        );
    }

    #[test]
    fn test_escaped_quote_stays_in_string() {
        let raw = r#"prefix {"a":"say \"}\" now"} suffix"#;
        assert_eq!(extract_first_object(raw), Some(json!({"a": "say \"}\" now"})));
    }

    #[test]
    fn test_unbalanced_or_invalid_is_none() {
        assert_eq!(extract_first_object("{\"ruh_hali\": \"Mutlu\""), None);
        assert_eq!(extract_first_object("no object here"), None);
        assert_eq!(extract_first_object("{ruh_hali: Mutlu}"), None);
        assert_eq!(extract_first_object(""), None);
    }

    #[test]
    fn test_only_first_object_is_taken() {
        assert_eq!(
            extract_first_object(r#"{"a":1} {"b":2}"#),
            Some(json!({"a": 1}))
        );
    }

    proptest! {
        #[test]
        fn prop_serialized_object_is_recovered(
            entries in prop::collection::btree_map("[^`]{0,8}", "[^`]{0,12}", 0..4),
            prefix in "[^{`]{0,10}",
            suffix in "[^`]{0,10}",
        ) {
            let value = serde_json::to_value(&entries).unwrap();
            let text = format!("{}{}{}", prefix, value, suffix);
            prop_assert_eq!(extract_first_object(&text), Some(value));
        }

        #[test]
        fn prop_result_is_always_an_object(text in "\\PC{0,40}") {
            if let Some(value) = extract_first_object(&text) {
                prop_assert!(value.is_object());
            }
        }
    }
}
