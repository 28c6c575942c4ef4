//! Parser for the hand-written event list.
//!
//! Events are separated by blank lines. Each event is:
//!
//! ```text
//! 2018 January 19
//! 7:00pm – 9:00pm
//! Summary
//! optional description line 1
//! optional description line 2
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, FixedOffset, Local, Month, NaiveDate, NaiveDateTime, NaiveTime,
    SecondsFormat, TimeZone, Weekday,
};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, warn};

const EN_DASH: char = '\u{2013}';

/// A parsed event, ready to be sent to the calendar service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub summary: String,
    /// Remaining lines of the block joined with `\n`; empty when absent.
    pub description: String,
}

impl EventDraft {
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Time zone the wall-clock times in the file are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventZone {
    Local,
    Named(Tz),
}

impl EventZone {
    /// Accepts `local` or an IANA zone name such as `America/New_York`.
    pub fn parse(name: &str) -> Result<Self, String> {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(EventZone::Local);
        }
        trimmed
            .parse::<Tz>()
            .map(EventZone::Named)
            .map_err(|_| format!("unknown time zone '{trimmed}'"))
    }

    pub fn name(&self) -> String {
        match self {
            EventZone::Local => "local".to_string(),
            EventZone::Named(tz) => tz.name().to_string(),
        }
    }

    fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            EventZone::Local => Local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.fixed_offset()),
            EventZone::Named(tz) => tz
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.fixed_offset()),
        }
    }
}

/// Inputs that are not part of the file itself.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub zone: EventZone,
    /// Used for date lines that omit the year.
    pub default_year: i32,
}

impl ParseContext {
    pub fn new(zone: EventZone) -> Self {
        Self {
            zone,
            default_year: Local::now().year(),
        }
    }

    pub fn with_default_year(mut self, year: i32) -> Self {
        self.default_year = year;
        self
    }
}

#[derive(Debug, Error)]
pub enum EventFileError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("event {block}: too few lines, need date, time range and summary: {text:?}")]
    TooFewLines { block: usize, text: String },
    #[error("event {block}: bad time line: {line:?}")]
    BadTimeLine { block: usize, line: String },
    #[error("event {block}: unrecognized date: {line:?}")]
    BadDate { block: usize, line: String },
    #[error("event {block}: unrecognized time: {input:?}")]
    BadTime { block: usize, input: String },
    #[error("event {block}: {input:?} does not exist or is ambiguous in zone {zone}")]
    InvalidLocalTime {
        block: usize,
        input: String,
        zone: String,
    },
    #[error("event {block}: end {end} is not after start {start}")]
    EndBeforeStart {
        block: usize,
        start: String,
        end: String,
    },
}

pub fn read_event_file(
    path: &Path,
    ctx: &ParseContext,
) -> Result<Vec<EventDraft>, EventFileError> {
    let contents = fs::read_to_string(path).map_err(|source| EventFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let events = parse_event_file(&contents, ctx)?;
    debug!(path = %path.display(), count = events.len(), "Parsed event file");
    Ok(events)
}

/// Parse every event in `contents`, stopping at the first malformed block.
pub fn parse_event_file(
    contents: &str,
    ctx: &ParseContext,
) -> Result<Vec<EventDraft>, EventFileError> {
    split_blocks(contents)
        .iter()
        .enumerate()
        .map(|(idx, lines)| parse_block_lines(idx + 1, lines, ctx))
        .collect()
}

/// Parse a single event block. `block` is the 1-based position used in errors.
pub fn parse_event_block(
    block: usize,
    text: &str,
    ctx: &ParseContext,
) -> Result<EventDraft, EventFileError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    parse_block_lines(block, &lines, ctx)
}

fn split_blocks(contents: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in contents.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_block_lines(
    block: usize,
    lines: &[&str],
    ctx: &ParseContext,
) -> Result<EventDraft, EventFileError> {
    let [date_line, time_line, summary, description @ ..] = lines else {
        return Err(EventFileError::TooFewLines {
            block,
            text: lines.join("\n"),
        });
    };

    let (date, weekday) =
        parse_date_line(date_line, ctx.default_year).ok_or_else(|| EventFileError::BadDate {
            block,
            line: date_line.to_string(),
        })?;
    if let Some(weekday) = weekday {
        if weekday != date.weekday() {
            warn!(
                block,
                line = %date_line,
                actual = %date.weekday(),
                "Weekday in date line does not match the date"
            );
        }
    }

    let normalized = time_line.replace(EN_DASH, "-");
    let times: Vec<&str> = normalized.split('-').collect();
    let [start_text, end_text] = times.as_slice() else {
        return Err(EventFileError::BadTimeLine {
            block,
            line: time_line.to_string(),
        });
    };

    let start = zoned(block, date, start_text, ctx.zone)?;
    let end = zoned(block, date, end_text, ctx.zone)?;
    if end <= start {
        return Err(EventFileError::EndBeforeStart {
            block,
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }

    Ok(EventDraft {
        start,
        end,
        summary: summary.to_string(),
        description: description.join("\n"),
    })
}

fn zoned(
    block: usize,
    date: NaiveDate,
    time_text: &str,
    zone: EventZone,
) -> Result<DateTime<FixedOffset>, EventFileError> {
    let time = parse_time(time_text).ok_or_else(|| EventFileError::BadTime {
        block,
        input: time_text.trim().to_string(),
    })?;
    zone.resolve(date.and_time(time))
        .ok_or_else(|| EventFileError::InvalidLocalTime {
            block,
            input: format!("{date} {}", time_text.trim()),
            zone: zone.name(),
        })
}

/// Parse a date line such as `2018 January 19`, `Friday January 19` or
/// `Fri, Jan 19 2018`. A missing year falls back to `default_year`.
pub fn parse_date(line: &str, default_year: i32) -> Option<NaiveDate> {
    parse_date_line(line, default_year).map(|(date, _)| date)
}

fn parse_date_line(line: &str, default_year: i32) -> Option<(NaiveDate, Option<Weekday>)> {
    let mut tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .collect();

    let weekday = match tokens.first().map(|token| Weekday::from_str(token)) {
        Some(Ok(weekday)) => {
            tokens.remove(0);
            Some(weekday)
        }
        _ => None,
    };

    let (year, month, day) = match tokens.as_slice() {
        [year, month, day] if is_year(year) => (parse_year(year)?, *month, *day),
        [month, day, year] if is_year(year) => (parse_year(year)?, *month, *day),
        [month, day] => (default_year, *month, *day),
        _ => return None,
    };

    let month = Month::from_str(month).ok()?.number_from_month();
    let day = day.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|date| (date, weekday))
}

fn is_year(token: &str) -> bool {
    token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit())
}

fn parse_year(token: &str) -> Option<i32> {
    token.parse().ok()
}

/// Parse a 12-hour clock time, `7pm` first, then `7:30pm`.
///
/// The suffix is case-insensitive and may be preceded by one space.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let lowered = text.trim().to_ascii_lowercase();
    let (clock, pm) = if let Some(rest) = lowered.strip_suffix("pm") {
        (rest, true)
    } else if let Some(rest) = lowered.strip_suffix("am") {
        (rest, false)
    } else {
        return None;
    };
    let clock = clock.strip_suffix(' ').unwrap_or(clock);

    let (hour, minute) = match clock.split_once(':') {
        None => (parse_hour(clock)?, 0),
        Some((hour, minute)) => (parse_hour(hour)?, parse_minute(minute)?),
    };

    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (hour, false) => hour,
        (hour, true) => hour + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_hour(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour = text.parse::<u32>().ok()?;
    (1..=12).contains(&hour).then_some(hour)
}

fn parse_minute(text: &str) -> Option<u32> {
    if text.len() != 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minute = text.parse::<u32>().ok()?;
    (minute < 60).then_some(minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_york() -> ParseContext {
        ParseContext::new(EventZone::Named(chrono_tz::America::New_York)).with_default_year(2018)
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_parse_time_without_minutes() {
        assert_eq!(parse_time("7pm"), Some(time(19, 0)));
        assert_eq!(parse_time("12am"), Some(time(0, 0)));
        assert_eq!(parse_time("12pm"), Some(time(12, 0)));
        assert_eq!(parse_time(" 9am "), Some(time(9, 0)));
    }

    #[test]
    fn test_parse_time_with_minutes() {
        assert_eq!(parse_time("5:30pm"), Some(time(17, 30)));
        assert_eq!(parse_time("10:05am"), Some(time(10, 5)));
        assert_eq!(parse_time("7:00 PM"), Some(time(19, 0)));
    }

    #[test]
    fn test_parse_time_rejects_malformed() {
        assert_eq!(parse_time("19:00"), None);
        assert_eq!(parse_time("13pm"), None);
        assert_eq!(parse_time("0am"), None);
        assert_eq!(parse_time("7:5pm"), None);
        assert_eq!(parse_time("7:60pm"), None);
        assert_eq!(parse_time("pm"), None);
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2018, 1, 19).unwrap();
        assert_eq!(parse_date("2018 January 19", 2000), Some(expected));
        assert_eq!(parse_date("Friday January 19", 2018), Some(expected));
        assert_eq!(parse_date("Friday, 2018 January 19", 1999), Some(expected));
        assert_eq!(parse_date("Fri, Jan 19 2018", 1999), Some(expected));
        assert_eq!(parse_date("january 19", 2018), Some(expected));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date("2018 Smarch 19", 2018), None);
        assert_eq!(parse_date("2018 February 30", 2018), None);
        assert_eq!(parse_date("tomorrow", 2018), None);
    }

    #[test]
    fn test_parse_block_with_en_dash_and_description() {
        let block = "2018 January 19\n7:00pm \u{2013} 9:00pm\nBoard meeting\nRoom 4\nBring slides";
        let event = parse_event_block(1, block, &new_york()).unwrap();
        assert_eq!(event.start_rfc3339(), "2018-01-19T19:00:00-05:00");
        assert_eq!(event.end_rfc3339(), "2018-01-19T21:00:00-05:00");
        assert_eq!(event.summary, "Board meeting");
        assert_eq!(event.description, "Room 4\nBring slides");
    }

    #[test]
    fn test_parse_block_without_description() {
        let block = "2018 July 4\n1pm-3:30pm\nPicnic";
        let event = parse_event_block(1, block, &new_york()).unwrap();
        assert_eq!(event.start_rfc3339(), "2018-07-04T13:00:00-04:00");
        assert_eq!(event.end_rfc3339(), "2018-07-04T15:30:00-04:00");
        assert!(event.description.is_empty());
    }

    #[test]
    fn test_parse_block_too_few_lines() {
        let err = parse_event_block(3, "2018 July 4\n1pm-3pm", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::TooFewLines { block: 3, .. }));
    }

    #[test]
    fn test_parse_block_bad_time_line() {
        let err = parse_event_block(1, "2018 July 4\n1pm-2pm-3pm\nPicnic", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::BadTimeLine { .. }));

        let err = parse_event_block(1, "2018 July 4\n1pm to 3pm\nPicnic", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::BadTimeLine { .. }));
    }

    #[test]
    fn test_parse_block_bad_time_and_date() {
        let err = parse_event_block(1, "2018 July 4\n1pm-15:00\nPicnic", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::BadTime { ref input, .. } if input == "15:00"));

        let err = parse_event_block(1, "July the 4th\n1pm-3pm\nPicnic", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::BadDate { .. }));
    }

    #[test]
    fn test_parse_block_end_before_start() {
        let err = parse_event_block(1, "2018 July 4\n9pm-1am\nLate show", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::EndBeforeStart { .. }));
    }

    #[test]
    fn test_parse_block_nonexistent_local_time() {
        // 2:30am does not exist on the spring-forward day.
        let err =
            parse_event_block(1, "2018 March 11\n2:30am-4am\nGap", &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::InvalidLocalTime { .. }));
    }

    #[test]
    fn test_parse_file_splits_on_blank_lines() {
        let contents = "2018 January 19\n7pm-9pm\nFirst\n\n\n   \n2018 January 20\r\n10am-11am\r\nSecond\r\nNotes\r\n\n";
        let events = parse_event_file(contents, &new_york()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].summary, "First");
        assert_eq!(events[1].summary, "Second");
        assert_eq!(events[1].description, "Notes");
    }

    #[test]
    fn test_parse_file_reports_block_number() {
        let contents = "2018 January 19\n7pm-9pm\nFirst\n\n2018 January 20\n10am\nSecond\n";
        let err = parse_event_file(contents, &new_york()).unwrap_err();
        assert!(matches!(err, EventFileError::BadTimeLine { block: 2, .. }));
    }

    #[test]
    fn test_parse_empty_file() {
        let events = parse_event_file("\n\n  \n", &new_york()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_en_dash_kept_outside_time_line() {
        let block = "2018 January 19\n7pm\u{2013}9pm\nQ1 \u{2013} review\nPages 3\u{2013}7";
        let events = parse_event_file(block, &new_york()).unwrap();
        assert_eq!(events[0].summary, "Q1 \u{2013} review");
        assert_eq!(events[0].description, "Pages 3\u{2013}7");
    }

    #[test]
    fn test_event_zone_parse() {
        assert_eq!(EventZone::parse("Local").unwrap(), EventZone::Local);
        assert_eq!(
            EventZone::parse("Europe/Berlin").unwrap(),
            EventZone::Named(chrono_tz::Europe::Berlin)
        );
        assert!(EventZone::parse("Mars/Olympus").is_err());
    }
}
