//! Page and typed-text context.
//!
//! The engine treats context as a trigger: it only compares signatures to
//! decide whether ambient audio should be refreshed, and derives one short
//! line for supportive messages.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Opt-in page context (host, title, visible snippet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContext {
    pub host: String,
    pub title: String,
    pub snippet: String,
}

/// Mood inferred from typed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Tired,
}

/// Cues extracted from typed text. Only the derived values are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextCues {
    pub sleep_hours: Option<u32>,
    pub mood: Option<Mood>,
}

impl TextCues {
    pub fn is_empty(&self) -> bool {
        self.sleep_hours.is_none() && self.mood.is_none()
    }
}

fn sleep_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(slept|sleep)\b.*?\b(\d{1,2})\s*(h|hr|hrs|hours)\b")
            .expect("static sleep pattern is valid")
    })
}

const HAPPY_PHRASES: [&str; 3] = ["so happy", "feeling great", "good mood"];
const TIRED_PHRASES: [&str; 4] = ["so tired", "exhausted", "burned out", "low energy"];

/// Extract cues from a buffer of typed text. Happy wins over tired.
pub fn extract_cues(text: &str) -> TextCues {
    let lower = text.to_lowercase();

    let sleep_hours = sleep_pattern()
        .captures(&lower)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok());

    let mood = if HAPPY_PHRASES.iter().any(|p| lower.contains(p)) {
        Some(Mood::Happy)
    } else if TIRED_PHRASES.iter().any(|p| lower.contains(p)) {
        Some(Mood::Tired)
    } else {
        None
    };

    TextCues { sleep_hours, mood }
}

/// Collapse whitespace and truncate to `limit` characters.
pub fn preview_text(value: &str, limit: usize) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(limit)
        .collect()
}

/// 32-bit rolling string hash rendered as hex.
fn hash_string(input: &str) -> String {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    format!("{hash:x}")
}

/// Signature of a page context; empty when there is no context.
pub fn page_signature(page: Option<&PageContext>) -> String {
    match page {
        None => String::new(),
        Some(page) => hash_string(&format!(
            "{}|{}|{}",
            page.host,
            preview_text(&page.title, 80),
            preview_text(&page.snippet, 160)
        )),
    }
}

/// Signature of typed cues; empty when there are none.
pub fn cue_signature(cues: Option<&TextCues>) -> String {
    match cues {
        None => String::new(),
        Some(cues) => {
            let mood = match cues.mood {
                Some(Mood::Happy) => "happy",
                Some(Mood::Tired) => "tired",
                None => "none",
            };
            let sleep = cues
                .sleep_hours
                .map_or_else(|| "na".to_string(), |h| h.to_string());
            hash_string(&format!("{mood}|{sleep}"))
        }
    }
}

/// One line of context for supportive messages. Cues take precedence.
pub fn context_line(page: Option<&PageContext>, cues: Option<&TextCues>) -> Option<String> {
    if let Some(cues) = cues {
        if let Some(hours) = cues.sleep_hours.filter(|h| *h <= 3) {
            return Some(format!(
                "Running on {hours} hours of sleep, adding energizing drums."
            ));
        }
        match cues.mood {
            Some(Mood::Tired) => {
                return Some("Feeling the fatigue, boosting the energy a little.".to_string())
            }
            Some(Mood::Happy) => {
                return Some("Mood is bright, keeping the soundtrack upbeat but focused.".to_string())
            }
            None => {}
        }
    }

    let page = page?;
    let snippet = preview_text(&page.snippet, 110);
    if !snippet.is_empty() {
        return Some(format!("I see \"{snippet}\"."));
    }
    let title = preview_text(&page.title, 60);
    if !title.is_empty() {
        return Some(format!("Locked on {title}."));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sleep_and_mood() {
        let cues = extract_cues("Ugh, I slept maybe 3 hrs last night and I'm so tired");
        assert_eq!(cues.sleep_hours, Some(3));
        assert_eq!(cues.mood, Some(Mood::Tired));

        let cues = extract_cues("Feeling GREAT today, so happy but exhausted");
        assert_eq!(cues.mood, Some(Mood::Happy));
        assert_eq!(cues.sleep_hours, None);

        assert!(extract_cues("just a regular sentence").is_empty());
    }

    #[test]
    fn test_signatures_track_content() {
        let page = PageContext {
            host: "docs.rs".to_string(),
            title: "tokio".to_string(),
            snippet: "A runtime for writing reliable network applications".to_string(),
        };
        let same = page.clone();
        let other = PageContext {
            title: "serde".to_string(),
            ..page.clone()
        };

        assert_eq!(page_signature(Some(&page)), page_signature(Some(&same)));
        assert_ne!(page_signature(Some(&page)), page_signature(Some(&other)));
        assert_eq!(page_signature(None), "");

        let happy = TextCues {
            mood: Some(Mood::Happy),
            sleep_hours: None,
        };
        assert_ne!(cue_signature(Some(&happy)), cue_signature(Some(&TextCues::default())));
        assert_eq!(cue_signature(None), "");
    }

    #[test]
    fn test_hash_matches_rolling_hash() {
        assert_eq!(hash_string(""), "0");
        assert_eq!(hash_string("a"), "61");
        assert_eq!(hash_string("ab"), "c21");
    }

    #[test]
    fn test_context_line_precedence() {
        let page = PageContext {
            host: "example.com".to_string(),
            title: "Example".to_string(),
            snippet: "   lots   of\nspace ".to_string(),
        };
        let low_sleep = TextCues {
            sleep_hours: Some(2),
            mood: Some(Mood::Happy),
        };

        let line = context_line(Some(&page), Some(&low_sleep)).unwrap();
        assert!(line.contains("2 hours of sleep"));

        let line = context_line(Some(&page), None).unwrap();
        assert_eq!(line, "I see \"lots of space\".");

        assert_eq!(context_line(None, None), None);
    }
}
