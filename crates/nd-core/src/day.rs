//! Day-of-week enum shared by the parser, the codec and the calendar.

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// A day of the week, Monday first.
///
/// Only Monday through Saturday are part of the modeled week; Sunday can
/// appear in parsed time text but never occupies a bitmask slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    /// The six days covered by a weekly bitmask, in bit order.
    pub const MODELED: [Self; 6] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
    ];

    /// Zero-based index with Monday = 0.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Looks up a day by zero-based index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Monday),
            1 => Some(Self::Tuesday),
            2 => Some(Self::Wednesday),
            3 => Some(Self::Thursday),
            4 => Some(Self::Friday),
            5 => Some(Self::Saturday),
            6 => Some(Self::Sunday),
            _ => None,
        }
    }

    /// Whether this day has slots in the weekly bitmask.
    #[must_use]
    pub const fn is_modeled(self) -> bool {
        !matches!(self, Self::Sunday)
    }

    /// Canonical single-letter code (`R` is Thursday, `U` is Sunday).
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Monday => 'M',
            Self::Tuesday => 'T',
            Self::Wednesday => 'W',
            Self::Thursday => 'R',
            Self::Friday => 'F',
            Self::Saturday => 'S',
            Self::Sunday => 'U',
        }
    }

    /// Parses a canonical day letter.
    #[must_use]
    pub const fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'M' => Some(Self::Monday),
            'T' => Some(Self::Tuesday),
            'W' => Some(Self::Wednesday),
            'R' => Some(Self::Thursday),
            'F' => Some(Self::Friday),
            'S' => Some(Self::Saturday),
            'U' => Some(Self::Sunday),
            _ => None,
        }
    }

    #[must_use]
    pub const fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Day {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => Self::from_letter(letter.to_ascii_uppercase()),
            _ => None,
        }
        .ok_or_else(|| ValidationError::UnknownDay {
            value: s.to_string(),
        })
    }
}

impl TryFrom<u8> for Day {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(usize::from(value)).ok_or(ValidationError::DayOutOfRange { value })
    }
}

impl From<Day> for u8 {
    fn from(day: Day) -> Self {
        day as Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_roundtrip() {
        for index in 0..7 {
            let day = Day::from_index(index).unwrap();
            assert_eq!(Day::from_letter(day.letter()), Some(day));
            assert_eq!(day.index(), index);
        }
    }

    #[test]
    fn sunday_is_not_modeled() {
        assert!(!Day::Sunday.is_modeled());
        assert!(Day::MODELED.iter().all(|day| day.is_modeled()));
        assert_eq!(Day::MODELED.len(), 6);
    }

    #[test]
    fn serializes_as_index() {
        assert_eq!(serde_json::to_string(&Day::Thursday).unwrap(), "3");
        let parsed: Day = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, Day::Saturday);
        assert!(serde_json::from_str::<Day>("7").is_err());
    }

    #[test]
    fn maps_chrono_weekdays() {
        assert_eq!(Day::from_weekday(Weekday::Mon), Day::Monday);
        assert_eq!(Day::from_weekday(Weekday::Sun), Day::Sunday);
    }
}
