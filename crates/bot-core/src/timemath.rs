//! Pure date/time arithmetic: timezone alias resolution, local/UTC
//! conversion, and recurrence advancement.
//!
//! No I/O happens here. Everything that can fail returns a value the caller
//! can act on (re-prompt the user, skip recurrence) instead of panicking.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::TimeError;

/// Recurrence rule for a reminder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    /// Fire once, no follow-up occurrence.
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Repeat {
    /// Wire representation, shared with storage and the NLU contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            Repeat::None => "none",
            Repeat::Hourly => "hourly",
            Repeat::Daily => "daily",
            Repeat::Weekly => "weekly",
            Repeat::Monthly => "monthly",
            Repeat::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Repeat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Repeat::None),
            "hourly" => Ok(Repeat::Hourly),
            "daily" => Ok(Repeat::Daily),
            "weekly" => Ok(Repeat::Weekly),
            "monthly" => Ok(Repeat::Monthly),
            "yearly" => Ok(Repeat::Yearly),
            _ => Err(()),
        }
    }
}

/// Static alias table: normalized city/country names to canonical zones.
///
/// Matched as substrings of the normalized user text; first hit wins.
const TZ_ALIASES: &[(&str, &[&str])] = &[
    (
        "Asia/Jerusalem",
        &[
            "тель авив",
            "тель авиве",
            "tel aviv",
            "telaviv",
            "израиль",
            "israel",
            "jerusalem",
            "иерусалим",
        ],
    ),
    (
        "Europe/Moscow",
        &["москва", "москве", "moscow"],
    ),
    (
        "Europe/Kyiv",
        &["киев", "киеве", "kyiv", "kiev"],
    ),
    (
        "Europe/London",
        &["лондон", "лондоне", "london"],
    ),
    (
        "Europe/Berlin",
        &["берлин", "берлине", "berlin", "германия", "germany"],
    ),
    (
        "America/New_York",
        &["нью йорк", "нью йорке", "new york", "newyork", "nyc"],
    ),
];

/// Extract a timezone name from free text.
///
/// An explicit IANA-style `Region/City` token wins; otherwise the text is
/// normalized (lowercased, punctuation stripped) and matched against the
/// alias table. Returns the candidate name without validating it against
/// the zone database; [`local_to_utc`] is where invalid names surface.
pub fn resolve_timezone_alias(user_text: &str) -> Option<String> {
    let candidate = user_text.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Some(token) = extract_iana_token(candidate) {
        return Some(token);
    }

    let normalized = normalize(candidate);
    if normalized.is_empty() {
        return None;
    }
    for (tz_name, aliases) in TZ_ALIASES {
        for alias in *aliases {
            if normalized.contains(alias) {
                return Some((*tz_name).to_string());
            }
        }
    }
    None
}

/// Scan for an `Ascii/Ascii_With_Underscores` token.
fn extract_iana_token(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'/' {
            continue;
        }
        // Walk left over ASCII letters.
        let mut start = i;
        while start > 0 && bytes[start - 1].is_ascii_alphabetic() {
            start -= 1;
        }
        // Walk right over ASCII letters and underscores.
        let mut end = i + 1;
        while end < bytes.len() && (bytes[end].is_ascii_alphabetic() || bytes[end] == b'_') {
            end += 1;
        }
        if start < i && end > i + 1 {
            return Some(text[start..end].to_string());
        }
    }
    None
}

/// Lowercase and collapse everything but Latin/Cyrillic letters and digits
/// into single spaces.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || ('а'..='я').contains(&c) || c == 'ё' {
            out.push(c);
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

/// Is the name a valid IANA zone identifier?
pub fn is_valid_timezone(name: &str) -> bool {
    name.parse::<Tz>().is_ok()
}

/// Parse an ISO local datetime string (`2026-03-01T09:30` or with seconds,
/// `T` or space separated) into a naive local time.
pub fn parse_local_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Convert a timezone-naive local wall-clock time to a UTC instant.
///
/// Ambiguous local times (DST fold) resolve to the earliest valid instant;
/// nonexistent local times (DST gap) are an error.
pub fn local_to_utc(local: NaiveDateTime, tz_name: &str) -> Result<DateTime<Utc>, TimeError> {
    let tz: Tz = tz_name
        .parse()
        .map_err(|_| TimeError::UnknownTimezone(tz_name.to_string()))?;
    let zoned = tz
        .from_local_datetime(&local)
        .earliest()
        .ok_or_else(|| TimeError::InvalidLocalDatetime(local.to_string()))?;
    Ok(zoned.with_timezone(&Utc))
}

/// Advance a UTC instant by one recurrence unit, in local wall-clock terms.
///
/// The instant is converted to local time in `tz_name`, one unit is added
/// (calendar arithmetic for months/years, clamping the day-of-month), and
/// the result converted back to UTC. Returns `None` for [`Repeat::None`]
/// or an invalid zone.
pub fn advance_by_recurrence(
    at_utc: DateTime<Utc>,
    repeat: Repeat,
    tz_name: &str,
) -> Option<DateTime<Utc>> {
    let tz: Tz = tz_name.parse().ok()?;
    let local = at_utc.with_timezone(&tz).naive_local();
    let next_local = match repeat {
        Repeat::None => return None,
        Repeat::Hourly => local + Duration::hours(1),
        Repeat::Daily => local + Duration::days(1),
        Repeat::Weekly => local + Duration::weeks(1),
        Repeat::Monthly => add_months(local, 1),
        Repeat::Yearly => add_months(local, 12),
    };
    Some(resolve_local(tz, next_local).with_timezone(&Utc))
}

/// Attach a zone to a naive local time, tolerating DST edges: ambiguous
/// times take the earliest instant, gap times shift forward an hour.
fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&local).earliest() {
        Some(zoned) => zoned,
        None => {
            let shifted = local + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&local))
        }
    }
}

/// Add whole calendar months, clamping the day to the target month's length.
pub fn add_months(dt: NaiveDateTime, months: u32) -> NaiveDateTime {
    let zero_based = dt.month0() + months;
    let year = dt.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    let day = dt.day().min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
        .unwrap_or_else(|| dt.date());
    date.and_time(dt.time())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
