//! Free-text weekly time range parsing.
//!
//! Registrar time text looks like `"MW 09:00AM-10:15AM"`, but scraped rows are
//! inconsistent: verbose day names, `TTh`/`TuTh` for Tuesday+Thursday, missing
//! meridiem on one side, en dashes. Parsing never fails; input it cannot make
//! sense of yields an empty map, which callers treat as "no schedule".

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::day::Day;

/// Time-of-day bounds in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockRange {
    #[serde(alias = "startMin")]
    pub start_minute: u32,
    #[serde(alias = "endMin")]
    pub end_minute: u32,
}

/// Parsed time text: each meeting day mapped to its clock range.
pub type DayTimeMap = BTreeMap<Day, ClockRange>;

/// Substrings that mark a scraped row as a non-meeting placeholder.
const PLACEHOLDER_MARKERS: [&str; 2] = ["PM 11", "11PM"];

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(
        r"([0-2]?\d)(?::([0-5]\d))?\s*(am|pm)?\s*-\s*([0-2]?\d)(?::([0-5]\d))?\s*(am|pm)?",
    )
    .case_insensitive(true)
    .build()
    .unwrap()
});

/// Verbose day tokens and their canonical letters, applied in order.
static DAY_WORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bmondays?\b|\bmon\b", "M"),
        (r"\btuesdays?\b|\btues\b|\btue\b|\btu\b", "T"),
        (r"\bwednesdays?\b|\bwed\b", "W"),
        (r"\bthursdays?\b|\bthurs\b|\bthur\b|\bthu\b|\bth\b", "R"),
        (r"\bfridays?\b|\bfri\b", "F"),
        (r"\bsaturdays?\b|\bsat\b|\bsa\b", "S"),
        (r"\bsundays?\b|\bsun\b", "U"),
        (r"tth", "TR"),
        (r"tuth", "TR"),
        (r"tu", "T"),
    ]
    .into_iter()
    .map(|(pattern, letter)| {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap();
        (re, letter)
    })
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn parse(token: Option<&str>) -> Option<Self> {
        match token?.to_ascii_lowercase().as_str() {
            "am" => Some(Self::Am),
            "pm" => Some(Self::Pm),
            _ => None,
        }
    }
}

/// Parses a single time record such as `"TR 1:30-2:45PM"`.
///
/// Every recognized day letter maps to the same clock range. A meridiem given
/// on one side only applies to both; a side without any meridiem is read as
/// 24-hour time.
pub fn parse_time_range(text: &str) -> DayTimeMap {
    let normalized = text.trim().replace(['\u{2013}', '\u{2014}'], "-");
    let Some(caps) = RANGE_RE.captures(&normalized) else {
        tracing::debug!(text, "no clock range in time text");
        return DayTimeMap::new();
    };
    let Some(whole) = caps.get(0) else {
        return DayTimeMap::new();
    };

    let number = |index: usize| -> Option<u32> {
        caps.get(index).map_or(Some(0), |m| m.as_str().parse().ok())
    };
    let (Some(start_hour), Some(start_min), Some(end_hour), Some(end_min)) =
        (number(1), number(2), number(4), number(5))
    else {
        return DayTimeMap::new();
    };
    let start_meridiem = Meridiem::parse(caps.get(3).map(|m| m.as_str()));
    let end_meridiem = Meridiem::parse(caps.get(6).map(|m| m.as_str()));

    let end_minute = to_minutes(end_hour, end_min, end_meridiem.or(start_meridiem));
    let mut start_minute = to_minutes(start_hour, start_min, start_meridiem.or(end_meridiem));
    // "11:00-12:15PM": the inherited PM belongs to the end only
    if start_meridiem.is_none() && end_meridiem == Some(Meridiem::Pm) && start_minute > end_minute
    {
        start_minute = start_minute.saturating_sub(12 * 60);
    }

    let days = parse_days(&normalized[..whole.start()]);
    if days.is_empty() {
        tracing::debug!(text, "no day letters in time text");
    }
    let range = ClockRange {
        start_minute,
        end_minute,
    };
    days.into_iter().map(|day| (day, range)).collect()
}

/// Parses time text that may hold several `"; "`-joined records.
///
/// Merged sessions carry text like `"MW 09:00AM-09:50AM; F 02:00PM-03:15PM"`.
/// A day already mapped by an earlier record keeps that earlier range.
pub fn parse_time_text(text: &str) -> DayTimeMap {
    let mut map = DayTimeMap::new();
    for record in text.split(';') {
        for (day, range) in parse_time_range(record) {
            map.entry(day).or_insert(range);
        }
    }
    map
}

/// Whether scraped time text is a non-meeting placeholder slot.
pub fn is_placeholder_time(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| upper.contains(marker))
}

/// Normalizes a day prefix to canonical letters and returns the distinct days.
fn parse_days(prefix: &str) -> Vec<Day> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Vec::new();
    }
    let mut normalized = prefix.to_lowercase();
    for (re, letter) in DAY_WORDS.iter() {
        normalized = re.replace_all(&normalized, *letter).into_owned();
    }

    let mut days: Vec<Day> = normalized
        .to_uppercase()
        .chars()
        .filter_map(Day::from_letter)
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

fn to_minutes(hour: u32, minute: u32, meridiem: Option<Meridiem>) -> u32 {
    match meridiem {
        Some(Meridiem::Am) => (hour % 12) * 60 + minute,
        Some(Meridiem::Pm) => (hour % 12 + 12) * 60 + minute,
        None => hour * 60 + minute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start_minute: u32, end_minute: u32) -> ClockRange {
        ClockRange {
            start_minute,
            end_minute,
        }
    }

    #[test]
    fn parses_letter_days_with_meridiem_on_both_sides() {
        let map = parse_time_range("MW 09:00AM-10:15AM");
        assert_eq!(map.len(), 2);
        assert_eq!(map[&Day::Monday], range(540, 615));
        assert_eq!(map[&Day::Wednesday], range(540, 615));
    }

    #[test]
    fn single_meridiem_is_inherited() {
        let map = parse_time_range("F 1:30-2:45PM");
        assert_eq!(map[&Day::Friday], range(13 * 60 + 30, 14 * 60 + 45));

        let map = parse_time_range("F 1:30PM-2:45");
        assert_eq!(map[&Day::Friday], range(13 * 60 + 30, 14 * 60 + 45));
    }

    #[test]
    fn explicit_meridiem_on_each_side_is_kept() {
        let map = parse_time_range("T 11:00AM-12:15PM");
        assert_eq!(map[&Day::Tuesday], range(660, 735));
    }

    #[test]
    fn inherited_pm_does_not_push_start_past_end() {
        let map = parse_time_range("R 11:00-12:15PM");
        assert_eq!(map[&Day::Thursday], range(660, 735));
    }

    #[test]
    fn missing_meridiem_reads_as_24_hour() {
        let map = parse_time_range("S 13:00-14:30");
        assert_eq!(map[&Day::Saturday], range(780, 870));
    }

    #[test]
    fn collapses_tuesday_thursday_abbreviations() {
        for text in ["TTh 10:30AM-11:45AM", "TuTh 10:30AM-11:45AM", "Tu Th 10:30AM-11:45AM"] {
            let map = parse_time_range(text);
            let days: Vec<Day> = map.keys().copied().collect();
            assert_eq!(days, vec![Day::Tuesday, Day::Thursday], "input: {text}");
        }
    }

    #[test]
    fn verbose_day_names() {
        let map = parse_time_range("Monday Wednesday Friday 8:00AM - 8:50AM");
        let days: Vec<Day> = map.keys().copied().collect();
        assert_eq!(days, vec![Day::Monday, Day::Wednesday, Day::Friday]);
        assert_eq!(map[&Day::Friday], range(480, 530));
    }

    #[test]
    fn sunday_is_recognized_by_the_parser() {
        let map = parse_time_range("Sun 10:00AM-11:00AM");
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![Day::Sunday]);
    }

    #[test]
    fn en_dash_is_accepted() {
        let map = parse_time_range("M 09:00AM\u{2013}10:00AM");
        assert_eq!(map[&Day::Monday], range(540, 600));
    }

    #[test]
    fn malformed_input_yields_empty_map() {
        assert!(parse_time_range("").is_empty());
        assert!(parse_time_range("TBA").is_empty());
        assert!(parse_time_range("09:00AM-10:00AM").is_empty());
        assert!(parse_time_range("XYZ 09:00AM-10:00AM").is_empty());
    }

    #[test]
    fn merged_text_unions_records() {
        let map = parse_time_text("MW 09:00AM-09:50AM; F 02:00PM-03:15PM");
        assert_eq!(map.len(), 3);
        assert_eq!(map[&Day::Wednesday], range(540, 590));
        assert_eq!(map[&Day::Friday], range(840, 915));
    }

    #[test]
    fn first_record_wins_a_repeated_day() {
        let map = parse_time_text("M 09:00AM-09:50AM; M 01:00PM-01:50PM");
        assert_eq!(map[&Day::Monday], range(540, 590));
    }

    #[test]
    fn placeholder_markers() {
        assert!(is_placeholder_time("S 11:00PM-11:00PM 11"));
        assert!(is_placeholder_time("M 12:00 PM 11:59"));
        assert!(!is_placeholder_time("MW 09:00AM-10:15AM"));
    }

    #[test]
    fn time_map_serde_uses_day_indexes() {
        let map = parse_time_range("MW 09:00AM-10:15AM");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"0":{"startMinute":540,"endMinute":615},"2":{"startMinute":540,"endMinute":615}}"#
        );
        let parsed: DayTimeMap =
            serde_json::from_str(r#"{"4":{"startMin":600,"endMin":650}}"#).unwrap();
        assert_eq!(parsed[&Day::Friday], range(600, 650));
    }
}
