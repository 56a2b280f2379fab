//! Fixed-size weekly occupancy bitmask.
//!
//! The modeled week is Monday through Saturday, 08:00 to 24:00, cut into
//! 30-minute slots: 32 slots per day, 192 bits in total. Bit `day * 32 + slot`
//! lives in byte `bit >> 3` at position `bit & 7`. The 24 raw bytes are the
//! canonical form for storage and network transfer (as standard base64).
//!
//! Encoding quantizes to the slot grid, so `decode(encode(x))` covers `x` but
//! only equals it when `x` was already 30-minute aligned.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::day::Day;

/// Number of days covered by the mask (Monday..=Saturday).
pub const DAYS: usize = 6;
/// Number of 30-minute slots per modeled day.
pub const SLOTS_PER_DAY: usize = 32;
/// Size of the serialized mask in bytes.
pub const MASK_BYTES: usize = DAYS * SLOTS_PER_DAY / 8;
/// Minutes from midnight of the first slot (08:00).
pub const DAY_START_MINUTE: u32 = 8 * 60;
/// Minutes from midnight where the last slot ends (24:00).
pub const DAY_END_MINUTE: u32 = 24 * 60;
/// Length of one slot in minutes.
pub const SLOT_MINUTES: u32 = 30;

const LAST_SLOT: i64 = SLOTS_PER_DAY as i64 - 1;

/// Errors decoding a serialized mask.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BitmaskError {
    /// The input was not valid base64.
    #[error("invalid base64 bitmask: {0}")]
    Base64(String),
    /// The decoded payload had the wrong size.
    #[error("expected {MASK_BYTES} bitmask bytes, got {0}")]
    Length(usize),
}

/// One maximal run of occupied time on a single day.
///
/// Minutes are measured from local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub day: Day,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl Interval {
    /// First slot covered by this interval.
    #[must_use]
    pub fn start_slot(&self) -> usize {
        start_slot(self.start_minute)
    }

    /// Slot one past the last slot covered by this interval.
    #[must_use]
    pub fn end_slot(&self) -> usize {
        end_slot(self.end_minute, self.start_slot())
    }
}

/// Slot containing `minute`, clamped to the modeled day.
#[must_use]
pub fn start_slot(minute: u32) -> usize {
    let slot = (i64::from(minute) - i64::from(DAY_START_MINUTE)).div_euclid(i64::from(SLOT_MINUTES));
    clamp_slot(slot.clamp(0, LAST_SLOT))
}

/// Exclusive end slot for a range starting at `start_slot`.
///
/// Always at least one slot past `start_slot` and never past the end of the day.
#[must_use]
pub fn end_slot(minute: u32, start_slot: usize) -> usize {
    let offset = i64::from(minute) - i64::from(DAY_START_MINUTE);
    let ceil = -((-offset).div_euclid(i64::from(SLOT_MINUTES)));
    let capped = clamp_slot(ceil.clamp(0, SLOTS_PER_DAY as i64));
    capped.max(start_slot + 1)
}

/// Minute from midnight at which `slot` begins.
#[must_use]
pub fn slot_minute(slot: usize) -> u32 {
    // slot <= 32, so the product always fits
    DAY_START_MINUTE + SLOT_MINUTES * u32::try_from(slot).unwrap_or(0)
}

fn clamp_slot(slot: i64) -> usize {
    usize::try_from(slot).unwrap_or(0)
}

/// A 192-bit weekly occupancy mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeeklyBitmask([u8; MASK_BYTES]);

impl WeeklyBitmask {
    /// The mask with no occupied slots.
    pub const EMPTY: Self = Self([0; MASK_BYTES]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; MASK_BYTES]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MASK_BYTES] {
        &self.0
    }

    /// Builds a mask from a byte slice, which must be exactly 24 bytes long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, BitmaskError> {
        let array: [u8; MASK_BYTES] = bytes
            .try_into()
            .map_err(|_| BitmaskError::Length(bytes.len()))?;
        Ok(Self(array))
    }

    /// Encodes one time range repeated on each of `days`.
    ///
    /// Sunday is outside the modeled week and contributes nothing.
    #[must_use]
    pub fn encode(days: impl IntoIterator<Item = Day>, start_minute: u32, end_minute: u32) -> Self {
        let mut mask = Self::EMPTY;
        for day in days {
            mask.insert_range(day, start_minute, end_minute);
        }
        mask
    }

    /// Adds `[start_minute, end_minute)` on `day`, quantized to the slot grid.
    pub fn insert_range(&mut self, day: Day, start_minute: u32, end_minute: u32) {
        if !day.is_modeled() {
            return;
        }
        let first = start_slot(start_minute);
        let last = end_slot(end_minute, first);
        self.insert_slots(day, first, last);
    }

    /// Sets slots `[first, last)` on `day`.
    pub fn insert_slots(&mut self, day: Day, first: usize, last: usize) {
        if !day.is_modeled() {
            return;
        }
        let offset = day.index() * SLOTS_PER_DAY;
        for slot in first..last.min(SLOTS_PER_DAY) {
            let bit = offset + slot;
            self.0[bit >> 3] |= 1 << (bit & 7);
        }
    }

    /// Whether the slot at `slot` on `day` is occupied.
    #[must_use]
    pub fn contains(&self, day: Day, slot: usize) -> bool {
        if !day.is_modeled() || slot >= SLOTS_PER_DAY {
            return false;
        }
        let bit = day.index() * SLOTS_PER_DAY + slot;
        (self.0[bit >> 3] >> (bit & 7)) & 1 == 1
    }

    /// The 32 slots of `day` as an integer, slot 0 in the lowest bit.
    #[must_use]
    pub fn day_bits(&self, day: Day) -> u32 {
        if !day.is_modeled() {
            return 0;
        }
        let start = day.index() * SLOTS_PER_DAY / 8;
        u32::from_le_bytes([
            self.0[start],
            self.0[start + 1],
            self.0[start + 2],
            self.0[start + 3],
        ])
    }

    /// Run-length extraction of occupied time, ascending by day then start.
    #[must_use]
    pub fn decode(&self) -> Vec<Interval> {
        let mut intervals = Vec::new();
        for day in Day::MODELED {
            let mut slot = 0;
            while slot < SLOTS_PER_DAY {
                if !self.contains(day, slot) {
                    slot += 1;
                    continue;
                }
                let run_start = slot;
                while slot < SLOTS_PER_DAY && self.contains(day, slot) {
                    slot += 1;
                }
                intervals.push(Interval {
                    day,
                    start_minute: slot_minute(run_start),
                    end_minute: slot_minute(slot),
                });
            }
        }
        intervals
    }

    /// Byte-wise OR of two masks.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.union_with(other);
        out
    }

    pub fn union_with(&mut self, other: &Self) {
        for (byte, other) in self.0.iter_mut().zip(other.0) {
            *byte |= other;
        }
    }

    /// Whether any slot is occupied in both masks.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0).any(|(a, b)| a & b != 0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn count_slots(&self) -> u32 {
        self.0.iter().map(|byte| byte.count_ones()).sum()
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decodes the base64 form. An empty string is the empty mask.
    pub fn from_base64(encoded: &str) -> Result<Self, BitmaskError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Ok(Self::EMPTY);
        }
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|err| BitmaskError::Base64(err.to_string()))?;
        Self::try_from_slice(&bytes)
    }

    /// Builds a mask from absolute local date-time spans.
    ///
    /// Each span is cut at midnight; Sunday pieces are skipped and the rest are
    /// clamped to 08:00–24:00. Unlike [`WeeklyBitmask::insert_range`], a piece
    /// that falls entirely outside the modeled hours adds nothing.
    #[must_use]
    pub fn from_spans(spans: impl IntoIterator<Item = (NaiveDateTime, NaiveDateTime)>) -> Self {
        let mut mask = Self::EMPTY;
        for (start, end) in spans {
            let mut cursor = start;
            while cursor < end {
                let day_start = cursor.date().and_time(NaiveTime::MIN);
                let next_day = day_start + Duration::days(1);
                let piece_end = end.min(next_day);

                let day = Day::from_weekday(cursor.weekday());
                let start_minute = minute_of_day(cursor).max(DAY_START_MINUTE);
                let end_minute = if piece_end == next_day {
                    DAY_END_MINUTE
                } else {
                    minute_of_day(piece_end).min(DAY_END_MINUTE)
                };

                if day.is_modeled() && end_minute > start_minute {
                    let first = start_slot(start_minute);
                    let offset = i64::from(end_minute - DAY_START_MINUTE);
                    let last = clamp_slot(
                        (-((-offset).div_euclid(i64::from(SLOT_MINUTES))))
                            .min(SLOTS_PER_DAY as i64),
                    );
                    mask.insert_slots(day, first, last);
                }
                cursor = next_day;
            }
        }
        mask
    }
}

fn minute_of_day(at: NaiveDateTime) -> u32 {
    at.hour() * 60 + at.minute()
}

impl fmt::Debug for WeeklyBitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for interval in self.decode() {
            list.entry(&format_args!(
                "{}{:02}:{:02}-{:02}:{:02}",
                interval.day,
                interval.start_minute / 60,
                interval.start_minute % 60,
                interval.end_minute / 60,
                interval.end_minute % 60,
            ));
        }
        list.finish()
    }
}

impl Serialize for WeeklyBitmask {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WeeklyBitmask {
    /// Accepts the base64 string form, a raw array of 24 byte values (as the
    /// scraper writes it), or null for the empty mask.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MaskVisitor;

        impl<'de> Visitor<'de> for MaskVisitor {
            type Value = WeeklyBitmask;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a base64 string or an array of {MASK_BYTES} bytes")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                WeeklyBitmask::from_base64(value).map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = Vec::with_capacity(MASK_BYTES);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                WeeklyBitmask::try_from_slice(&bytes).map_err(de::Error::custom)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(WeeklyBitmask::EMPTY)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(WeeklyBitmask::EMPTY)
            }
        }

        deserializer.deserialize_any(MaskVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        // 2025-09-01 is a Monday
        NaiveDate::from_ymd_opt(2025, 9, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn set_bits(mask: &WeeklyBitmask) -> Vec<usize> {
        (0..DAYS * SLOTS_PER_DAY)
            .filter(|bit| (mask.as_bytes()[bit >> 3] >> (bit & 7)) & 1 == 1)
            .collect()
    }

    #[test]
    fn encode_monday_wednesday_morning() {
        let mask = WeeklyBitmask::encode([Day::Monday, Day::Wednesday], 540, 615);
        assert_eq!(set_bits(&mask), vec![2, 3, 4, 66, 67, 68]);
    }

    #[test]
    fn decode_emits_grid_bounds_covering_input() {
        let mask = WeeklyBitmask::encode([Day::Tuesday, Day::Friday], 545, 610);
        let intervals = mask.decode();
        assert_eq!(
            intervals,
            vec![
                Interval {
                    day: Day::Tuesday,
                    start_minute: 540,
                    end_minute: 630
                },
                Interval {
                    day: Day::Friday,
                    start_minute: 540,
                    end_minute: 630
                },
            ]
        );
        for interval in &intervals {
            assert!(interval.start_minute <= 545 && interval.end_minute >= 610);
        }
    }

    #[test]
    fn aligned_ranges_roundtrip_exactly() {
        let mask = WeeklyBitmask::encode([Day::Saturday], 600, 720);
        assert_eq!(
            mask.decode(),
            vec![Interval {
                day: Day::Saturday,
                start_minute: 600,
                end_minute: 720
            }]
        );
    }

    #[test]
    fn short_and_inverted_ranges_still_occupy_one_slot() {
        let short = WeeklyBitmask::encode([Day::Monday], 600, 610);
        assert_eq!(short.count_slots(), 1);

        let inverted = WeeklyBitmask::encode([Day::Monday], 700, 600);
        assert_eq!(set_bits(&inverted), vec![start_slot(700)]);
    }

    #[test]
    fn out_of_range_times_clamp_to_the_day() {
        let early = WeeklyBitmask::encode([Day::Monday], 6 * 60, 8 * 60 + 30);
        assert_eq!(set_bits(&early), vec![0]);

        let late = WeeklyBitmask::encode([Day::Monday], 23 * 60 + 45, 26 * 60);
        assert_eq!(set_bits(&late), vec![31]);
    }

    #[test]
    fn sunday_contributes_nothing() {
        let mask = WeeklyBitmask::encode([Day::Sunday], 600, 720);
        assert!(mask.is_empty());
    }

    #[test]
    fn union_is_commutative_associative_idempotent() {
        let a = WeeklyBitmask::encode([Day::Monday], 540, 615);
        let b = WeeklyBitmask::encode([Day::Monday, Day::Thursday], 600, 700);
        let c = WeeklyBitmask::encode([Day::Saturday], 480, 1440);

        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        assert_eq!(a.union(&a), a);
    }

    #[test]
    fn decode_merges_adjacent_slots_into_one_run() {
        let mut mask = WeeklyBitmask::encode([Day::Thursday], 540, 600);
        mask.union_with(&WeeklyBitmask::encode([Day::Thursday], 600, 660));
        assert_eq!(mask.decode().len(), 1);
        assert_eq!(mask.decode()[0].end_minute, 660);
    }

    #[test]
    fn day_bits_matches_slot_layout() {
        let mask = WeeklyBitmask::encode([Day::Wednesday], 480, 600);
        assert_eq!(mask.day_bits(Day::Wednesday), 0b1111);
        assert_eq!(mask.day_bits(Day::Monday), 0);
    }

    #[test]
    fn base64_roundtrip_and_validation() {
        let mask = WeeklyBitmask::encode([Day::Friday], 780, 870);
        let encoded = mask.to_base64();
        assert_eq!(WeeklyBitmask::from_base64(&encoded).unwrap(), mask);
        assert_eq!(WeeklyBitmask::from_base64("").unwrap(), WeeklyBitmask::EMPTY);
        assert!(matches!(
            WeeklyBitmask::from_base64("AAAA"),
            Err(BitmaskError::Length(3))
        ));
        assert!(matches!(
            WeeklyBitmask::from_base64("not base64!"),
            Err(BitmaskError::Base64(_))
        ));
    }

    #[test]
    fn deserializes_byte_arrays_and_strings() {
        let mask = WeeklyBitmask::encode([Day::Monday], 540, 615);
        let from_str: WeeklyBitmask =
            serde_json::from_str(&serde_json::to_string(&mask).unwrap()).unwrap();
        assert_eq!(from_str, mask);

        let bytes = serde_json::to_string(&mask.as_bytes().to_vec()).unwrap();
        let from_array: WeeklyBitmask = serde_json::from_str(&bytes).unwrap();
        assert_eq!(from_array, mask);

        let from_null: WeeklyBitmask = serde_json::from_str("null").unwrap();
        assert!(from_null.is_empty());
    }

    #[test]
    fn spans_split_at_midnight_and_skip_sunday() {
        // Saturday 22:00 through Monday 09:00
        let mask = WeeklyBitmask::from_spans([(at(6, 22, 0), at(8, 9, 0))]);
        assert_eq!(
            mask.decode(),
            vec![
                Interval {
                    day: Day::Monday,
                    start_minute: 480,
                    end_minute: 540
                },
                Interval {
                    day: Day::Saturday,
                    start_minute: 1320,
                    end_minute: 1440
                },
            ]
        );
    }

    #[test]
    fn spans_outside_modeled_hours_add_nothing() {
        let mask = WeeklyBitmask::from_spans([(at(2, 6, 0), at(2, 7, 30))]);
        assert!(mask.is_empty());
    }

    #[test]
    fn debug_lists_intervals() {
        let mask = WeeklyBitmask::encode([Day::Monday], 540, 600);
        assert_eq!(format!("{mask:?}"), "[M09:00-10:00]");
    }
}
