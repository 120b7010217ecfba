//! Header lookup and date parsing shared by the provider clients.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::MailError;

/// A trailing parenthetical zone label, e.g. `" (COT)"` or `" (UTC)"`.
fn zone_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([A-Za-z0-9 +\-:/_]*\)\s*$").unwrap())
}

/// Case-insensitive header lookup. A missing header yields an empty string.
pub fn header_value<'a, I>(headers: I, name: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .find(|(n, _)| n.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default()
}

/// Parse an RFC 2822 `Date` header, tolerating a trailing zone label.
///
/// `Wed, 29 Jan 2025 15:20:41 -0500 (COT)` parses as `2025-01-29T20:20:41Z`.
pub fn parse_date_header(value: &str) -> Result<DateTime<Utc>, MailError> {
    let normalized = zone_label_re().replace(value.trim(), "");
    DateTime::parse_from_rfc2822(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MailError::InvalidDate {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = [("SUBJECT", "Hola"), ("from", "nu@nu.com.co")];
        assert_eq!(header_value(headers, "Subject"), "Hola");
        assert_eq!(header_value(headers, "From"), "nu@nu.com.co");
    }

    #[test]
    fn missing_header_is_empty() {
        let headers = [("Subject", "Hola")];
        assert_eq!(header_value(headers, "To"), "");
    }

    #[test]
    fn parses_date_with_zone_label() {
        let parsed = parse_date_header("Wed, 29 Jan 2025 15:20:41 -0500 (COT)").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 29, 20, 20, 41).unwrap());
    }

    #[test]
    fn parses_plain_rfc2822_date() {
        let parsed = parse_date_header("Mon, 3 Feb 2025 08:00:00 +0000").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 2, 3, 8, 0, 0).unwrap());
    }

    #[test]
    fn rejects_unparseable_date() {
        let err = parse_date_header("yesterday at noon").unwrap_err();
        assert!(matches!(err, MailError::InvalidDate { .. }));
    }
}
