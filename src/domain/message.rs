//! Canonical provider-agnostic message shape.
//!
//! Every adapter maps its wire format into [`CanonicalMessage`] so the
//! aggregation and classification layers never see provider-specific JSON or
//! RFC 5322 structures. Messages are ephemeral: they are produced per fetch
//! and never persisted by this crate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Classification, Provider};

/// Maximum plain-text body length kept on a canonical message.
pub const BODY_MAX_CHARS: usize = 2_000;

/// Length of the short preview excerpt.
pub const PREVIEW_CHARS: usize = 200;

/// One normalized email message from any connected mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Source-prefixed identifier, unique within a fetch result
    /// (e.g. `google_18c2...`, `imap_4711_1714659200`).
    pub id: String,
    /// Message subject; empty when the provider omits it.
    pub subject: String,
    /// Bare sender address, extracted from any `Display Name <addr>` form.
    pub sender: String,
    /// Receive date, normalized to UTC. Falls back to "now" when the
    /// provider value is unparseable.
    pub date: DateTime<Utc>,
    /// Short plain-text excerpt.
    pub preview: String,
    /// Plain-text body, HTML stripped and capped at [`BODY_MAX_CHARS`].
    pub body: String,
    /// Which provider this message came from.
    pub source: Provider,
    /// The connected mailbox that produced this message.
    pub account_email: String,
    /// Attached by the classification router after the fetch; `None` until
    /// classification completes.
    pub category: Option<Classification>,
}

impl CanonicalMessage {
    /// Key used for cross-source deduplication: (subject, sender, calendar day).
    ///
    /// Heuristic on purpose: two genuinely distinct messages sharing subject,
    /// sender and day will be merged. Callers rely on this imprecision being
    /// stable rather than exact.
    pub fn dedup_key(&self) -> (String, String, NaiveDate) {
        (
            self.subject.clone(),
            self.sender.clone(),
            self.date.date_naive(),
        )
    }
}

/// Extracts the bare address from a header value like `Name <addr@host>`.
///
/// Values without angle brackets are returned trimmed as-is.
pub fn extract_bare_address(value: &str) -> String {
    let value = value.trim();
    if let Some(start) = value.find('<') {
        if let Some(end) = value.rfind('>') {
            if end > start {
                return value[start + 1..end].trim().to_string();
            }
        }
    }
    value.trim_matches('"').to_string()
}

/// Strips HTML tags and entities into readable plain text.
///
/// Block-level closers become newlines so paragraphs survive; everything
/// else between `<` and `>` is dropped.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut tag = String::new();

    for ch in input.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let lowered = tag.to_ascii_lowercase();
                if lowered.starts_with("br")
                    || lowered.starts_with("/p")
                    || lowered.starts_with("/div")
                    || lowered.starts_with("/tr")
                    || lowered.starts_with("/li")
                {
                    out.push('\n');
                }
            }
            c if in_tag => tag.push(c),
            c => out.push(c),
        }
    }

    collapse_blank_lines(&decode_entities(&out))
}

/// Decodes HTML entities: numeric (`&#233;`, `&#xE9;`) and the named forms
/// common in French email bodies. Unknown entities pass through unchanged.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let decoded = after
            .find(';')
            .filter(|&end| end > 1 && end <= 10)
            .and_then(|end| entity_char(&after[1..end]).map(|ch| (ch, end)));

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity_char(entity: &str) -> Option<char> {
    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    let ch = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "eacute" => 'é',
        "egrave" => 'è',
        "ecirc" => 'ê',
        "agrave" => 'à',
        "acirc" => 'â',
        "ccedil" => 'ç',
        "ugrave" => 'ù',
        "ucirc" => 'û',
        "ocirc" => 'ô',
        "icirc" => 'î',
        "euml" => 'ë',
        "iuml" => 'ï',
        "uuml" => 'ü',
        "oelig" => 'œ',
        _ => return None,
    };
    Some(ch)
}

/// Collapses runs of blank lines and trims surrounding whitespace.
pub fn collapse_blank_lines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut blank_run = 0usize;

    for line in input.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(trimmed);
            out.push('\n');
        }
    }

    out.trim().to_string()
}

/// Truncates to a character budget without splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

/// Builds the preview excerpt from an already-cleaned body.
pub fn preview_of(body: &str) -> String {
    truncate_chars(body.split_whitespace().collect::<Vec<_>>().join(" ").as_str(), PREVIEW_CHARS)
}
