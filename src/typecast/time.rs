//! Time parsing and encoding.
//!
//! Parsing accepts ISO-8601 style stamps (`-` or `/` date separators, `T` or
//! space before the clock, optional fraction, optional `Z` / `±hh:mm` zone).
//! Stamps without a zone are UTC. A `+` that arrived URL-decoded as a space
//! still counts as a positive offset.
//!
//! Encoding always uses the xmlschema form with a configurable number of
//! fractional digits, so documents saved within the same second keep their
//! order.
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO8601: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4})[-/](\d{2})[-/](\d{2})[T\s](\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)(Z| ?([+\s-])?(\d{2}):?(\d{2}))?",
    )
    .expect("ISO-8601 pattern is valid")
});

static ZONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?)(\d{2}):?(\d{2})$").expect("zone pattern is valid")
});

/// Broken-down time with a fixed UTC offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanos: u32,
    pub offset_secs: i32,
}

impl Parts {
    pub fn build(&self) -> Option<DateTime<FixedOffset>> {
        let naive = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_nano_opt(self.hour, self.minute, self.second, self.nanos)?;
        let offset = FixedOffset::east_opt(self.offset_secs)?;
        offset.from_local_datetime(&naive).single()
    }
}

/// `"123"` → 123_000_000 ns; digits past nanoseconds are dropped.
fn fraction_to_nanos(digits: &str) -> u32 {
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().unwrap_or(0)
}

/// `±hh:mm` / `hhmm` → offset seconds east of UTC.
pub fn parse_zone(zone: &str) -> Option<i32> {
    let caps = ZONE.captures(zone.trim())?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    let sign = if &caps[1] == "-" { -1 } else { 1 };
    Some(sign * (hours * 3600 + minutes * 60))
}

pub fn parse_iso8601(text: &str) -> Option<DateTime<FixedOffset>> {
    let caps = ISO8601.captures(text)?;
    let (second, nanos) = match caps[6].split_once('.') {
        Some((whole, frac)) => (whole.parse().ok()?, fraction_to_nanos(frac)),
        None => (caps[6].parse().ok()?, 0),
    };
    let offset_secs = match caps.get(7).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(_) => {
            let hours: i32 = caps.get(9)?.as_str().parse().ok()?;
            let minutes: i32 = caps.get(10)?.as_str().parse().ok()?;
            let sign = match caps.get(8).map(|m| m.as_str()) {
                Some("-") => -1,
                _ => 1,
            };
            sign * (hours * 3600 + minutes * 60)
        }
    };
    Parts {
        year: caps[1].parse().ok()?,
        month: caps[2].parse().ok()?,
        day: caps[3].parse().ok()?,
        hour: caps[4].parse().ok()?,
        minute: caps[5].parse().ok()?,
        second,
        nanos,
        offset_secs,
    }
    .build()
}

/// ISO-8601 first, then RFC 3339 / RFC 2822, then a bare date at midnight UTC.
pub fn parse(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    parse_iso8601(text)
        .or_else(|| DateTime::parse_from_rfc3339(text).ok())
        .or_else(|| DateTime::parse_from_rfc2822(text).ok())
        .or_else(|| {
            let naive = parse_bare_date(text)?.and_hms_opt(0, 0, 0)?;
            FixedOffset::east_opt(0)?.from_local_datetime(&naive).single()
        })
}

fn parse_bare_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
}

/// A calendar date from `YYYY-MM-DD`, `YYYY/MM/DD`, or the date part of a time stamp.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    parse_bare_date(text).or_else(|| parse(text).map(|t| t.date_naive()))
}

/// xmlschema form: `2011-04-01T18:50:32.000+02:00`, or `...Z` at UTC.
pub fn format_time(time: &DateTime<FixedOffset>, fraction_digits: usize) -> String {
    let mut out = time.format("%Y-%m-%dT%H:%M:%S").to_string();
    if fraction_digits > 0 {
        // leap seconds report nanos >= 1e9
        let nanos = format!("{:09}", time.nanosecond() % 1_000_000_000);
        out.push('.');
        out.push_str(&nanos[..fraction_digits.min(9)]);
        for _ in 9..fraction_digits {
            out.push('0');
        }
    }
    if time.offset().local_minus_utc() == 0 {
        out.push('Z');
    } else {
        out.push_str(&time.format("%:z").to_string());
    }
    out
}

// ------------------------------- Tests ------------------------------------ //
