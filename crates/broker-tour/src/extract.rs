//! Regex extraction of tour details from free text.
//!
//! Dates and times are captured verbatim (no calendar parsing) so the
//! confirmation can repeat exactly what the visitor wrote. For each
//! category the first pattern that matches wins.

use std::sync::LazyLock;

use regex::Regex;

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
        r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}(?:st|nd|rd|th)?,?\s*\d{0,4}\b",
        r"(?i)\b(?:tomorrow|today|next\s+\w+day)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid date regex"))
    .collect()
});

static TIME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b\d{1,2}:\d{2}\s*(?:am|pm)?\b",
        r"(?i)\b\d{1,2}\s*(?:am|pm)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid time regex"))
    .collect()
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Invalid email regex")
});

// The introducer is case-insensitive; the name itself must be capitalized.
static NAME_INTRO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:my name is|i['’]m|i am|name['’]s|call me)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
    )
    .expect("Invalid name regex")
});

static BARE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)[.!]?$").expect("Invalid bare name regex")
});

/// Single words that look like a bare name line but are replies.
const NOT_NAMES: &[&str] = &[
    "yes", "no", "yeah", "yep", "nope", "sure", "ok", "okay", "thanks", "thank you", "hello",
    "hi", "hey", "great", "perfect", "sounds good", "tomorrow", "today",
];

/// Tour details found in one message. Missing values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TourDetails {
    pub date: Option<String>,
    pub time: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    /// The name followed an introducer such as "my name is".
    pub name_stated: bool,
}

impl TourDetails {
    /// Whether the message carried any scheduling detail at all.
    pub fn has_any(&self) -> bool {
        self.date.is_some() || self.time.is_some() || self.name.is_some() || self.email.is_some()
    }
}

fn first_match(patterns: &[Regex], message: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.find(message))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract a date and a time, each independently.
pub fn extract_date_time(message: &str) -> TourDetails {
    TourDetails {
        date: first_match(&DATE_PATTERNS, message),
        time: first_match(&TIME_PATTERNS, message),
        ..TourDetails::default()
    }
}

/// Extract a name and an email address.
///
/// The name comes from an introductory phrase ("my name is", "I'm", ...) or,
/// failing that, from a message that is nothing but one or two capitalized
/// words.
pub fn extract_contact(message: &str) -> TourDetails {
    let email = EMAIL_PATTERN
        .find(message)
        .map(|m| m.as_str().to_string());

    let stated = NAME_INTRO_PATTERN
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    let name_stated = stated.is_some();

    TourDetails {
        name: stated.or_else(|| bare_name(message)),
        email,
        name_stated,
        ..TourDetails::default()
    }
}

fn bare_name(message: &str) -> Option<String> {
    let trimmed = message.trim();
    let candidate = BARE_NAME_PATTERN
        .captures(trimmed)
        .and_then(|c| c.get(1))?
        .as_str()
        .to_string();
    if NOT_NAMES.contains(&candidate.to_lowercase().as_str()) {
        return None;
    }
    Some(candidate)
}

/// Everything a single message says about the tour.
///
/// A bare capitalized line that also reads as a date or time ("Next
/// Friday") is not taken as a name.
pub fn extract_details(message: &str) -> TourDetails {
    let when = extract_date_time(message);
    let who = extract_contact(message);
    let is_schedule = when.date.is_some() || when.time.is_some();
    let name = if who.name_stated || !is_schedule {
        who.name
    } else {
        None
    };
    TourDetails {
        date: when.date,
        time: when.time,
        name,
        email: who.email,
        name_stated: who.name_stated,
    }
}
