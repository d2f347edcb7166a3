//! Date normalizers for RSS (RFC 822) and Atom (RFC 3339) timestamps.
//!
//! Both parsers render the same canonical, human-readable form:
//!
//! ```text
//! Jan  2, 2006 (15:04 -07:00)
//! Jan  2, 2006 (15:04 ----)      timezone unknown
//! ```
//!
//! Malformed input yields an empty string, which callers treat as "no date".

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

/// Minimum length of an RFC 3339 timestamp (`YYYY-MM-DDTHH:MM:SSZ`).
const RFC3339_MIN_LEN: usize = 20;
/// Minimum length of an RFC 822 timestamp (`Mon, 2 Jan 2006 15:04:05 GMT`, minus slack).
const RFC822_MIN_LEN: usize = 26;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Named zones understood in RFC 822 dates, matched on their first three characters.
const NAMED_ZONES: [(&str, i32); 7] = [
    ("GMT", 0),
    ("CDT", -5),
    ("CST", -6),
    ("EDT", -4),
    ("EST", -5),
    ("PDT", -7),
    ("PST", -8),
];

/// A parsed timestamp with an optional zone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalDate {
    pub local: NaiveDateTime,
    /// `None` when the source zone could not be identified.
    pub offset: Option<FixedOffset>,
}

impl fmt::Display for CanonicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let month = MONTHS[self.local.month0() as usize];
        write!(
            f,
            "{} {:2}, {} ({:02}:{:02} ",
            month,
            self.local.day(),
            self.local.year(),
            self.local.hour(),
            self.local.minute()
        )?;
        match self.offset {
            Some(offset) => {
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let secs = secs.abs();
                write!(f, "{}{:02}:{:02})", sign, secs / 3600, (secs % 3600) / 60)
            }
            None => f.write_str("----)"),
        }
    }
}

/// Normalizes an Atom (RFC 3339) timestamp. Returns `""` on malformed input.
pub fn parse_rfc3339(text: &str) -> String {
    rfc3339(text).map(|d| d.to_string()).unwrap_or_default()
}

/// Normalizes an RSS (RFC 822) timestamp. Returns `""` on malformed input.
///
/// An unrecognized zone token does not fail the parse; the zone is rendered
/// as unknown instead.
pub fn parse_rfc822(text: &str) -> String {
    rfc822(text).map(|d| d.to_string()).unwrap_or_default()
}

pub fn rfc3339(text: &str) -> Option<CanonicalDate> {
    let b = text.as_bytes();
    if b.len() < RFC3339_MIN_LEN {
        return None;
    }

    // YYYY-MM-DDTHH:MM
    let year = digits(b, 0, 4)?;
    expect(b, 4, b'-')?;
    let month = digits(b, 5, 2)?;
    expect(b, 7, b'-')?;
    let day = digits(b, 8, 2)?;
    expect(b, 10, b'T')?;
    let hour = digits(b, 11, 2)?;
    expect(b, 13, b':')?;
    let minute = digits(b, 14, 2)?;

    // Seconds are not rendered; skip straight past them and any fraction.
    let mut pos = 19;
    if b.get(pos) == Some(&b'.') {
        pos += 1;
        while pos < b.len() && !matches!(b[pos], b'Z' | b'+' | b'-') {
            pos += 1;
        }
    }

    let offset = match b.get(pos)? {
        b'Z' => 0,
        sign @ (b'+' | b'-') => {
            let hours = digits(b, pos + 1, 2)? as i32;
            expect(b, pos + 3, b':')?;
            let minutes = digits(b, pos + 4, 2)? as i32;
            let secs = hours * 3600 + minutes * 60;
            if *sign == b'-' {
                -secs
            } else {
                secs
            }
        }
        _ => return None,
    };

    Some(CanonicalDate {
        local: datetime(year, month, day, hour, minute)?,
        offset: Some(FixedOffset::east_opt(offset)?),
    })
}

pub fn rfc822(text: &str) -> Option<CanonicalDate> {
    let b = text.as_bytes();
    if b.len() < RFC822_MIN_LEN {
        return None;
    }

    // "Mon, " is skipped unread; the day may have one or two digits.
    let mut pos = 5;
    let day = leading_number(b, pos)?;
    if b.get(pos + 1).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    pos += 2;

    let month_token = b.get(pos..pos + 3)?;
    let month = MONTHS
        .iter()
        .position(|m| m.as_bytes().eq_ignore_ascii_case(month_token))? as u32
        + 1;
    pos += 4;

    let year = leading_number(b, pos)?;
    pos += 5;
    let hour = leading_number(b, pos)?;
    pos += 3;
    let minute = leading_number(b, pos)?;
    pos += 6;

    Some(CanonicalDate {
        local: datetime(year, month, day, hour, minute)?,
        offset: rfc822_zone(b.get(pos..).unwrap_or_default()),
    })
}

/// Resolves the zone token of an RFC 822 date: a signed `HHMM` offset first,
/// then the named-zone table.
fn rfc822_zone(token: &[u8]) -> Option<FixedOffset> {
    if token.get(1).is_some_and(u8::is_ascii_digit) {
        let hours = digits(token, 1, 2)? as i32;
        let minutes = digits(token, 3, 2)? as i32;
        let secs = hours * 3600 + minutes * 60;
        return match token[0] {
            b'-' => FixedOffset::west_opt(secs),
            _ => FixedOffset::east_opt(secs),
        };
    }

    let prefix = token.get(..3)?;
    NAMED_ZONES
        .iter()
        .find(|(name, _)| name.as_bytes() == prefix)
        .and_then(|(_, hours)| FixedOffset::east_opt(hours * 3600))
}

fn datetime(year: u32, month: u32, day: u32, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(date.and_time(time))
}

/// Exactly `len` ASCII digits at `start`.
fn digits(b: &[u8], start: usize, len: usize) -> Option<u32> {
    let field = b.get(start..start + len)?;
    if !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(field.iter().fold(0, |acc, d| acc * 10 + u32::from(d - b'0')))
}

/// One or more ASCII digits starting at `start`.
fn leading_number(b: &[u8], start: usize) -> Option<u32> {
    let rest = b.get(start..)?;
    let len = rest.iter().take_while(|c| c.is_ascii_digit()).count();
    if len == 0 || len > 9 {
        return None;
    }
    digits(rest, 0, len)
}

fn expect(b: &[u8], pos: usize, want: u8) -> Option<()> {
    (b.get(pos) == Some(&want)).then_some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rfc822_gmt_is_zero_offset() {
        assert_eq!(
            parse_rfc822("Mon, 02 Jan 2006 15:04:05 GMT"),
            "Jan  2, 2006 (15:04 +00:00)"
        );
    }

    #[test]
    fn test_rfc822_numeric_offset_preserved() {
        assert_eq!(
            parse_rfc822("Mon, 02 Jan 2006 15:04:05 -0700"),
            "Jan  2, 2006 (15:04 -07:00)"
        );
        assert_eq!(
            parse_rfc822("Mon, 02 Jan 2006 15:04:05 +0530"),
            "Jan  2, 2006 (15:04 +05:30)"
        );
    }

    #[test]
    fn test_rfc822_named_zones() {
        assert_eq!(
            parse_rfc822("Tue, 10 Jun 2003 04:00:00 EST"),
            "Jun 10, 2003 (04:00 -05:00)"
        );
        assert_eq!(
            parse_rfc822("Tue, 10 Jun 2003 04:00:00 PDT"),
            "Jun 10, 2003 (04:00 -07:00)"
        );
    }

    #[test]
    fn test_rfc822_unknown_zone_marker() {
        assert_eq!(
            parse_rfc822("Mon, 02 Jan 2006 15:04:05 XYZ"),
            "Jan  2, 2006 (15:04 ----)"
        );
    }

    #[test]
    fn test_rfc822_single_digit_day() {
        assert_eq!(
            parse_rfc822("Mon, 2 Jan 2006 15:04:05 GMT"),
            "Jan  2, 2006 (15:04 +00:00)"
        );
    }

    #[test]
    fn test_rfc822_month_case_insensitive() {
        assert_eq!(
            parse_rfc822("Sat, 31 DEC 2011 23:59:00 GMT"),
            "Dec 31, 2011 (23:59 +00:00)"
        );
    }

    #[test]
    fn test_rfc822_rejects_short_and_garbage() {
        assert_eq!(parse_rfc822("Mon, 02 Jan 2006"), "");
        assert_eq!(parse_rfc822("Mon, 02 Foo 2006 15:04:05 GMT"), "");
        assert_eq!(parse_rfc822("this is not a date at all!!"), "");
    }

    #[test]
    fn test_rfc3339_utc() {
        assert_eq!(
            parse_rfc3339("2006-01-02T15:04:05Z"),
            "Jan  2, 2006 (15:04 +00:00)"
        );
    }

    #[test]
    fn test_rfc3339_offset() {
        assert_eq!(
            parse_rfc3339("2006-01-02T15:04:05+02:00"),
            "Jan  2, 2006 (15:04 +02:00)"
        );
        assert_eq!(
            parse_rfc3339("2006-01-02T15:04:05-08:30"),
            "Jan  2, 2006 (15:04 -08:30)"
        );
    }

    #[test]
    fn test_rfc3339_fractional_seconds() {
        assert_eq!(
            parse_rfc3339("2006-01-02T15:04:05.123456Z"),
            "Jan  2, 2006 (15:04 +00:00)"
        );
        assert_eq!(
            parse_rfc3339("2006-01-02T15:04:05.5-03:00"),
            "Jan  2, 2006 (15:04 -03:00)"
        );
    }

    #[test]
    fn test_rfc3339_too_short_is_empty() {
        assert_eq!(parse_rfc3339("2006-01-02T15:04"), "");
        assert_eq!(parse_rfc3339(""), "");
    }

    #[test]
    fn test_rfc3339_missing_zone_is_empty() {
        assert_eq!(parse_rfc3339("2006-01-02T15:04:05.000"), "");
    }

    #[test]
    fn test_rfc3339_invalid_calendar_date_is_empty() {
        assert_eq!(parse_rfc3339("2006-13-02T15:04:05Z"), "");
    }

    proptest! {
        #[test]
        fn test_parsers_never_panic(s in "\\PC{0,40}") {
            let _ = parse_rfc3339(&s);
            let _ = parse_rfc822(&s);
        }

        #[test]
        fn test_rfc3339_accepts_any_valid_utc(
            y in 1970u32..2100, mo in 1u32..=12, d in 1u32..=28, h in 0u32..24, mi in 0u32..60
        ) {
            let input = format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:00Z");
            let out = parse_rfc3339(&input);
            let expected_suffix = format!("({h:02}:{mi:02} +00:00)");
            prop_assert!(out.ends_with(&expected_suffix), "{}", out);
        }
    }
}
