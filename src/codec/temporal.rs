//! Temporal pattern library and the per-load runtime cache.
//!
//! A library of candidate patterns is built once at process start: the cross
//! product of date shapes (dashed, slashed, compact, month-name variants and
//! a two-digit-year form), date/time separators, 24h/12h time shapes,
//! optional fractional seconds, and optional zone specifiers. Parsing tries
//! the live set in insertion order; the first match wins and is recorded
//! into a runtime cache that replaces the live set once it has proven itself
//! (see [`PatternCache::compact_if_due`]), so homogeneous data settles into
//! an O(1) amortized parse.
//!
//! Resolution is lenient for day-of-month overflow: `2023-02-30` rolls
//! forward to `2023-03-02` the way the shapes here would resolve it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike,
    TimeZone,
};
use once_cell::sync::Lazy;

/// Result of parsing a value against the date-time library.
#[derive(Debug, Clone, PartialEq)]
pub enum TemporalParts {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

/// Result of parsing against the time-only library.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeParts {
    Local(NaiveTime),
    Offset(NaiveTime, FixedOffset),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DateOrder {
    Ymd,
    Mdy,
    Dmy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MonthStyle {
    Digits,
    Abbrev,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TimeStyle {
    H24,
    H12,
}

/// Zone suffix form: extended (`+05:00` or `Z`) or compact (`+0500`).
#[derive(Debug, Clone, Copy, PartialEq)]
enum ZoneStyle {
    Extended,
    Compact,
}

#[derive(Debug, Clone, Copy)]
struct ZoneSpec {
    leading_space: bool,
    style: ZoneStyle,
}

#[derive(Debug, Clone)]
struct DateShape {
    order: DateOrder,
    month: MonthStyle,
    sep: Option<char>,
    two_digit_year: bool,
}

/// One candidate pattern. `Shaped` patterns treat time, fraction, and zone
/// as optional suffixes; `Chrono` patterns are pinned strftime strings.
#[derive(Debug, Clone)]
pub struct TemporalPattern {
    key: String,
    spec: PatternSpec,
}

#[derive(Debug, Clone)]
enum PatternSpec {
    Shaped {
        date: DateShape,
        datetime_sep: Option<char>,
        time: Option<TimeStyle>,
        frac: bool,
        zone: Option<ZoneSpec>,
    },
    Chrono(String),
}

/// One candidate time-only pattern.
#[derive(Debug, Clone)]
pub struct TimePattern {
    key: String,
    spec: TimeSpec,
}

#[derive(Debug, Clone)]
enum TimeSpec {
    Shaped {
        time: TimeStyle,
        frac: bool,
        zone: Option<ZoneSpec>,
    },
    Chrono(String),
}

impl TemporalPattern {
    /// Pin a strftime pattern, keyed by the pattern string itself.
    pub fn chrono(fmt: &str) -> Self {
        Self {
            key: fmt.to_string(),
            spec: PatternSpec::Chrono(fmt.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parse(&self, input: &str) -> Option<TemporalParts> {
        match &self.spec {
            PatternSpec::Chrono(fmt) => {
                if let Ok(dt) = DateTime::parse_from_str(input, fmt) {
                    return Some(TemporalParts::Zoned(dt));
                }
                if let Ok(ndt) = NaiveDateTime::parse_from_str(input, fmt) {
                    return Some(TemporalParts::DateTime(ndt));
                }
                NaiveDate::parse_from_str(input, fmt)
                    .ok()
                    .map(TemporalParts::Date)
            }
            PatternSpec::Shaped {
                date,
                datetime_sep,
                time,
                frac,
                zone,
            } => {
                let (day, rest) = parse_date_component(input, date)?;
                if rest.is_empty() {
                    return Some(TemporalParts::Date(day));
                }

                let mut rest = rest;
                let mut tod: Option<NaiveTime> = None;
                if let (Some(sep), Some(style)) = (datetime_sep, time) {
                    if let Some(after) = rest.strip_prefix(*sep) {
                        let (mut t, mut after_time) = parse_time_component(after, *style)?;
                        if *frac {
                            if let Some((nanos, tail)) = parse_fraction(after_time) {
                                t = t.with_nanosecond(nanos)?;
                                after_time = tail;
                            }
                        }
                        tod = Some(t);
                        rest = after_time;
                    }
                }

                let offset = match zone {
                    Some(spec) if !rest.is_empty() => {
                        let (off, tail) = parse_zone(rest, spec)?;
                        if !tail.is_empty() {
                            return None;
                        }
                        Some(off)
                    }
                    _ => {
                        if !rest.is_empty() {
                            return None;
                        }
                        None
                    }
                };

                let naive = NaiveDateTime::new(day, tod.unwrap_or(NaiveTime::MIN));
                match offset {
                    Some(off) => off
                        .from_local_datetime(&naive)
                        .single()
                        .map(TemporalParts::Zoned),
                    None if tod.is_some() => Some(TemporalParts::DateTime(naive)),
                    None => Some(TemporalParts::Date(day)),
                }
            }
        }
    }
}

impl TimePattern {
    pub fn chrono(fmt: &str) -> Self {
        Self {
            key: fmt.to_string(),
            spec: TimeSpec::Chrono(fmt.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parse(&self, input: &str) -> Option<TimeParts> {
        match &self.spec {
            TimeSpec::Chrono(fmt) => NaiveTime::parse_from_str(input, fmt)
                .ok()
                .map(TimeParts::Local),
            TimeSpec::Shaped { time, frac, zone } => {
                let (mut t, mut rest) = parse_time_component(input, *time)?;
                if *frac {
                    if let Some((nanos, tail)) = parse_fraction(rest) {
                        t = t.with_nanosecond(nanos)?;
                        rest = tail;
                    }
                }
                match zone {
                    Some(spec) if !rest.is_empty() => {
                        let (off, tail) = parse_zone(rest, spec)?;
                        if !tail.is_empty() {
                            return None;
                        }
                        Some(TimeParts::Offset(t, off))
                    }
                    _ => rest.is_empty().then_some(TimeParts::Local(t)),
                }
            }
        }
    }
}

fn parse_date_component<'a>(input: &'a str, shape: &DateShape) -> Option<(NaiveDate, &'a str)> {
    let mut rest = input;
    let mut year: Option<i32> = None;
    let mut month: Option<i64> = None;
    let mut day: Option<i64> = None;

    let fields: [DateField; 3] = match shape.order {
        DateOrder::Ymd => [DateField::Year, DateField::Month, DateField::Day],
        DateOrder::Mdy => [DateField::Month, DateField::Day, DateField::Year],
        DateOrder::Dmy => [DateField::Day, DateField::Month, DateField::Year],
    };

    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            if let Some(sep) = shape.sep {
                rest = rest.strip_prefix(sep)?;
            }
        }
        match field {
            DateField::Year => {
                if shape.two_digit_year {
                    let (digits, tail) = take_digits(rest, 2, 2)?;
                    year = Some(sliding_window_year(digits.parse().ok()?));
                    rest = tail;
                } else {
                    let (digits, tail) = take_digits(rest, 4, 4)?;
                    year = Some(digits.parse().ok()?);
                    rest = tail;
                }
            }
            DateField::Month => match shape.month {
                MonthStyle::Digits => {
                    let (min, max) = if shape.sep.is_none() { (2, 2) } else { (1, 2) };
                    let (digits, tail) = take_digits(rest, min, max)?;
                    month = Some(digits.parse().ok()?);
                    rest = tail;
                }
                MonthStyle::Abbrev => {
                    let (name, tail) = take_alpha(rest, 3)?;
                    month = Some(month_from_abbrev(name)? as i64);
                    rest = tail;
                }
            },
            DateField::Day => {
                let (min, max) = if shape.sep.is_none() { (2, 2) } else { (1, 2) };
                let (digits, tail) = take_digits(rest, min, max)?;
                day = Some(digits.parse().ok()?);
                rest = tail;
            }
        }
    }

    let date = build_date(year?, month?, day?)?;
    Some((date, rest))
}

enum DateField {
    Year,
    Month,
    Day,
}

/// Roll month and day overflow forward instead of failing.
fn build_date(mut year: i32, month: i64, day: i64) -> Option<NaiveDate> {
    if !(1..=99).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    year += ((month - 1).div_euclid(12)) as i32;
    let month = ((month - 1).rem_euclid(12) + 1) as u32;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_add_days(Days::new((day - 1) as u64))
}

/// Resolve a two-digit year against a window starting fifty years back.
fn sliding_window_year(two_digits: i32) -> i32 {
    let base = Local::now().year() - 50;
    let mut candidate = base - base.rem_euclid(100) + two_digits;
    if candidate < base {
        candidate += 100;
    }
    candidate
}

fn parse_time_component(input: &str, style: TimeStyle) -> Option<(NaiveTime, &str)> {
    let (hh, rest) = take_digits(input, 1, 2)?;
    let rest = rest.strip_prefix(':')?;
    let (mm, rest) = take_digits(rest, 2, 2)?;
    let rest = rest.strip_prefix(':')?;
    let (ss, mut rest) = take_digits(rest, 2, 2)?;

    let mut hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    let second: u32 = ss.parse().ok()?;

    match style {
        TimeStyle::H24 => {
            if hour > 23 {
                return None;
            }
        }
        TimeStyle::H12 => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            let after = rest.strip_prefix(' ')?;
            let marker = after.get(..2)?;
            hour %= 12;
            if marker.eq_ignore_ascii_case("PM") {
                hour += 12;
            } else if !marker.eq_ignore_ascii_case("AM") {
                return None;
            }
            rest = &after[2..];
        }
    }

    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some((time, rest))
}

/// `.d` through `.ddddddddd` → nanoseconds.
fn parse_fraction(input: &str) -> Option<(u32, &str)> {
    let rest = input.strip_prefix('.')?;
    let (digits, tail) = take_digits(rest, 1, 9)?;
    let nanos: u32 = digits.parse().ok()?;
    Some((nanos * 10u32.pow(9 - digits.len() as u32), tail))
}

fn parse_zone<'a>(input: &'a str, spec: &ZoneSpec) -> Option<(FixedOffset, &'a str)> {
    let rest = if spec.leading_space {
        input.strip_prefix(' ')?
    } else {
        input
    };

    if let Some(tail) = rest.strip_prefix(['Z', 'z']) {
        return Some((FixedOffset::east_opt(0)?, tail));
    }

    let (sign, rest) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hh, rest) = take_digits(rest, 2, 2)?;
    let hours: i32 = hh.parse().ok()?;
    let (minutes, rest) = match spec.style {
        ZoneStyle::Extended => match rest.strip_prefix(':') {
            Some(tail) => {
                let (mm, tail) = take_digits(tail, 2, 2)?;
                (mm.parse::<i32>().ok()?, tail)
            }
            None => (0, rest),
        },
        ZoneStyle::Compact => match take_digits(rest, 2, 2) {
            Some((mm, tail)) => (mm.parse::<i32>().ok()?, tail),
            None => (0, rest),
        },
    };
    let offset = sign * (hours * 3600 + minutes * 60);
    Some((FixedOffset::east_opt(offset)?, rest))
}

fn take_digits(input: &str, min: usize, max: usize) -> Option<(&str, &str)> {
    let len = input
        .bytes()
        .take(max)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if len < min {
        return None;
    }
    Some((&input[..len], &input[len..]))
}

fn take_alpha(input: &str, len: usize) -> Option<(&str, &str)> {
    if input.len() < len || !input.bytes().take(len).all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    // Reject a longer alphabetic run; `March` must not half-match as `Mar`.
    if input.as_bytes().get(len).is_some_and(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((&input[..len], &input[len..]))
}

fn month_from_abbrev(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

fn date_shapes() -> Vec<(String, DateShape)> {
    let mut shapes = Vec::new();
    for month in [MonthStyle::Digits, MonthStyle::Abbrev] {
        let mon = match month {
            MonthStyle::Digits => "MM",
            MonthStyle::Abbrev => "MMM",
        };
        for (order, sep) in [
            (DateOrder::Ymd, Some('-')),
            (DateOrder::Mdy, Some('-')),
            (DateOrder::Dmy, Some('-')),
            (DateOrder::Ymd, Some('/')),
            (DateOrder::Mdy, Some('/')),
            (DateOrder::Dmy, Some('/')),
            (DateOrder::Ymd, None),
        ] {
            let s = sep.map(String::from).unwrap_or_default();
            let key = match order {
                DateOrder::Ymd => format!("yyyy{s}{mon}{s}dd"),
                DateOrder::Mdy => format!("{mon}{s}dd{s}yyyy"),
                DateOrder::Dmy => format!("dd{s}{mon}{s}yyyy"),
            };
            shapes.push((
                key,
                DateShape {
                    order,
                    month,
                    sep,
                    two_digit_year: false,
                },
            ));
        }
    }
    shapes.push((
        "dd-MMM-yy".to_string(),
        DateShape {
            order: DateOrder::Dmy,
            month: MonthStyle::Abbrev,
            sep: Some('-'),
            two_digit_year: true,
        },
    ));
    shapes
}

fn zone_variants() -> [(String, ZoneSpec); 4] {
    [
        (
            "X".into(),
            ZoneSpec {
                leading_space: false,
                style: ZoneStyle::Extended,
            },
        ),
        (
            "Z".into(),
            ZoneSpec {
                leading_space: false,
                style: ZoneStyle::Compact,
            },
        ),
        (
            " X".into(),
            ZoneSpec {
                leading_space: true,
                style: ZoneStyle::Extended,
            },
        ),
        (
            " Z".into(),
            ZoneSpec {
                leading_space: true,
                style: ZoneStyle::Compact,
            },
        ),
    ]
}

/// Candidate date-time patterns, built once.
static DATETIME_LIBRARY: Lazy<Vec<Arc<TemporalPattern>>> = Lazy::new(|| {
    let mut patterns = Vec::new();
    for (date_key, shape) in date_shapes() {
        for (zone_key, zone) in zone_variants() {
            patterns.push(Arc::new(TemporalPattern {
                key: format!("{date_key}{zone_key}"),
                spec: PatternSpec::Shaped {
                    date: shape.clone(),
                    datetime_sep: None,
                    time: None,
                    frac: false,
                    zone: Some(zone),
                },
            }));
            for dt_sep in [' ', 'T'] {
                for (time_key, time) in [("HH:mm:ss", TimeStyle::H24), ("hh:mm:ss a", TimeStyle::H12)]
                {
                    patterns.push(Arc::new(TemporalPattern {
                        key: format!("{date_key}{dt_sep}{time_key}.f{zone_key}"),
                        spec: PatternSpec::Shaped {
                            date: shape.clone(),
                            datetime_sep: Some(dt_sep),
                            time: Some(time),
                            frac: true,
                            zone: Some(zone),
                        },
                    }));
                }
            }
        }
    }
    patterns
});

/// Candidate time-only patterns, built once.
static TIME_LIBRARY: Lazy<Vec<Arc<TimePattern>>> = Lazy::new(|| {
    let mut patterns = Vec::new();
    for (zone_key, zone) in zone_variants() {
        for (time_key, time) in [("HH:mm:ss", TimeStyle::H24), ("hh:mm:ss a", TimeStyle::H12)] {
            patterns.push(Arc::new(TimePattern {
                key: format!("{time_key}.f{zone_key}"),
                spec: TimeSpec::Shaped {
                    time,
                    frac: true,
                    zone: Some(zone),
                },
            }));
        }
    }
    patterns
});

/// Ordered live pattern set plus the runtime cache of patterns that have
/// actually matched. When the live set is larger than a handful of pinned
/// entries, the runtime cache replaces it after enough hits.
#[derive(Debug, Clone)]
pub struct PatternCache<P> {
    live: Vec<Arc<P>>,
    runtime: Vec<Arc<P>>,
    runtime_keys: HashSet<String>,
    hits: u32,
    rebuild_pending: bool,
}

impl<P> PatternCache<P> {
    fn new(live: Vec<Arc<P>>) -> Self {
        let rebuild_pending = live.len() > 5;
        Self {
            live,
            runtime: Vec::new(),
            runtime_keys: HashSet::new(),
            hits: 0,
            rebuild_pending,
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Swap the live set for the runtime cache once it has 100 recorded
    /// matches. Call between rows; returns true when the swap happened.
    pub fn compact_if_due(&mut self) -> bool {
        if self.rebuild_pending && self.hits >= 100 {
            self.live = std::mem::take(&mut self.runtime);
            self.runtime_keys.clear();
            self.hits = 0;
            self.rebuild_pending = false;
            true
        } else {
            false
        }
    }

    fn record(&mut self, index: usize, key: &str) {
        if self.rebuild_pending {
            if !self.runtime_keys.contains(key) {
                self.runtime_keys.insert(key.to_string());
                self.runtime.push(self.live[index].clone());
            }
            self.hits += 1;
        }
    }
}

pub type DateTimeCache = PatternCache<TemporalPattern>;
pub type TimeCache = PatternCache<TimePattern>;

impl PatternCache<TemporalPattern> {
    /// The full candidate library.
    pub fn library() -> Self {
        Self::new(DATETIME_LIBRARY.clone())
    }

    /// Pinned formats from configuration. Fewer than three pins fall back to
    /// the library appended after the pins.
    pub fn from_formats(
        date: Option<&str>,
        timestamp: Option<&str>,
        timestamptz: Option<&str>,
    ) -> Self {
        let mut live: Vec<Arc<TemporalPattern>> = Vec::new();
        for fmt in [date, timestamp, timestamptz].into_iter().flatten() {
            live.push(Arc::new(TemporalPattern::chrono(fmt)));
        }
        if live.len() < 3 {
            live.extend(DATETIME_LIBRARY.iter().cloned());
        }
        Self::new(live)
    }

    /// Try every live pattern in insertion order; record the winner.
    pub fn parse(&mut self, input: &str) -> Option<TemporalParts> {
        for i in 0..self.live.len() {
            if let Some(parts) = self.live[i].parse(input) {
                let key = self.live[i].key().to_string();
                self.record(i, &key);
                return Some(parts);
            }
        }
        None
    }
}

impl PatternCache<TimePattern> {
    pub fn library() -> Self {
        Self::new(TIME_LIBRARY.clone())
    }

    pub fn parse(&mut self, input: &str) -> Option<TimeParts> {
        for i in 0..self.live.len() {
            if let Some(parts) = self.live[i].parse(input) {
                let key = self.live[i].key().to_string();
                self.record(i, &key);
                return Some(parts);
            }
        }
        None
    }
}
