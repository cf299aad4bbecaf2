//! Weekly schedule patterns and their expansion into dated classes.
//!
//! Weekdays are numbered 0=Sunday .. 6=Saturday. Callers using another
//! convention translate before building a [`SchedulePattern`].

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const MIN_DURATION_MINUTES: u32 = 30;
pub const MAX_DURATION_MINUTES: u32 = 240;
/// A class must end by 23:59; crossing midnight is rejected rather than wrapped.
const LAST_MINUTE_OF_DAY: u32 = 23 * 60 + 59;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEntry {
    pub weekday: u8,
    pub start_time: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePattern {
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    #[serde(default)]
    pub entries: Vec<PatternEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub weekday: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A pattern whose range and entries have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPattern {
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub teacher_id: String,
}

impl SchedulePattern {
    pub fn validate(&self) -> EngineResult<ValidatedPattern> {
        if self.range_end < self.range_start {
            return Err(EngineError::validation(format!(
                "rangeEnd {} is before rangeStart {}",
                self.range_end, self.range_start
            )));
        }
        let slots = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| entry_slot(index, entry))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(ValidatedPattern {
            range_start: self.range_start,
            range_end: self.range_end,
            slots,
        })
    }
}

fn entry_slot(index: usize, entry: &PatternEntry) -> EngineResult<Slot> {
    let invalid = |reason: String| EngineError::InvalidPatternEntry { index, reason };
    if entry.weekday > 6 {
        return Err(invalid(format!(
            "weekday {} outside 0 (Sunday) ..= 6 (Saturday)",
            entry.weekday
        )));
    }
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&entry.duration_minutes) {
        return Err(invalid(format!(
            "durationMinutes {} outside {}..={}",
            entry.duration_minutes, MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
        )));
    }
    let start = parse_time(&entry.start_time).map_err(|e| invalid(e.to_string()))?;
    let end = add_minutes(start, entry.duration_minutes).ok_or_else(|| {
        invalid(format!(
            "{} + {} minutes must end by 23:59",
            format_time(start),
            entry.duration_minutes
        ))
    })?;
    Ok(Slot {
        weekday: entry.weekday,
        start,
        end,
    })
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Accepts `HH:MM` or `HH:MM:SS`; seconds are dropped.
pub fn parse_time(raw: &str) -> EngineResult<NaiveTime> {
    let t = raw.trim();
    let parsed = NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .map_err(|_| EngineError::validation(format!("time must be HH:MM, got {:?}", raw)))?;
    Ok(parsed.with_second(0).unwrap_or(parsed))
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

pub fn minute_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

/// `None` when the result would land after 23:59.
pub fn add_minutes(start: NaiveTime, minutes: u32) -> Option<NaiveTime> {
    let end = minute_of_day(start) + minutes;
    if end > LAST_MINUTE_OF_DAY {
        return None;
    }
    NaiveTime::from_num_seconds_from_midnight_opt(end * 60, 0)
}

/// Expand a pattern into dated class drafts, date-major and in entry order.
pub fn materialize<'a>(pattern: &'a ValidatedPattern, teacher_id: &'a str) -> Materialization<'a> {
    Materialization {
        slots: &pattern.slots,
        teacher_id,
        cursor: Some(pattern.range_start),
        end: pattern.range_end,
        slot_idx: 0,
    }
}

/// Lazy walk over the pattern's range. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Materialization<'a> {
    slots: &'a [Slot],
    teacher_id: &'a str,
    cursor: Option<NaiveDate>,
    end: NaiveDate,
    slot_idx: usize,
}

impl Materialization<'_> {
    /// Skip every date before `floor`.
    pub fn starting_from(mut self, floor: NaiveDate) -> Self {
        if let Some(cursor) = self.cursor {
            if floor > cursor {
                self.cursor = Some(floor);
                self.slot_idx = 0;
            }
        }
        self
    }
}

impl Iterator for Materialization<'_> {
    type Item = SessionDraft;

    fn next(&mut self) -> Option<SessionDraft> {
        loop {
            let date = self.cursor?;
            if date > self.end || self.slots.is_empty() {
                self.cursor = None;
                return None;
            }
            let weekday = weekday_index(date);
            while self.slot_idx < self.slots.len() {
                let slot = self.slots[self.slot_idx];
                self.slot_idx += 1;
                if slot.weekday == weekday {
                    return Some(SessionDraft {
                        date,
                        start: slot.start,
                        end: slot.end,
                        teacher_id: self.teacher_id.to_string(),
                    });
                }
            }
            self.slot_idx = 0;
            self.cursor = date.succ_opt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    fn entry(weekday: u8, start: &str, minutes: u32) -> PatternEntry {
        PatternEntry {
            weekday,
            start_time: start.to_string(),
            duration_minutes: minutes,
        }
    }

    fn pattern(start: NaiveDate, end: NaiveDate, entries: Vec<PatternEntry>) -> ValidatedPattern {
        SchedulePattern {
            range_start: start,
            range_end: end,
            entries,
        }
        .validate()
        .expect("valid pattern")
    }

    #[test]
    fn two_mondays_in_two_weeks() {
        let p = pattern(d(2024, 1, 1), d(2024, 1, 14), vec![entry(1, "10:00", 60)]);
        let drafts: Vec<_> = materialize(&p, "t1").collect();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].date, d(2024, 1, 1));
        assert_eq!(drafts[1].date, d(2024, 1, 8));
        for draft in &drafts {
            assert_eq!(format_time(draft.start), "10:00");
            assert_eq!(format_time(draft.end), "11:00");
            assert_eq!(draft.teacher_id, "t1");
        }
    }

    #[test]
    fn count_matches_weekday_occurrences() {
        // 2024-02 has 29 days starting on a Thursday: 5 Thursdays, 4 Tuesdays, 4 Saturdays.
        let p = pattern(
            d(2024, 2, 1),
            d(2024, 2, 29),
            vec![entry(2, "09:00", 90), entry(4, "18:30", 120), entry(6, "08:00", 30)],
        );
        let drafts: Vec<_> = materialize(&p, "t").collect();
        assert_eq!(drafts.iter().filter(|s| weekday_index(s.date) == 2).count(), 4);
        assert_eq!(drafts.iter().filter(|s| weekday_index(s.date) == 4).count(), 5);
        assert_eq!(drafts.iter().filter(|s| weekday_index(s.date) == 6).count(), 4);
        assert_eq!(drafts.len(), 13);
        assert!(drafts.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn sunday_is_zero() {
        assert_eq!(weekday_index(d(2024, 1, 7)), 0);
        assert_eq!(weekday_index(d(2024, 1, 13)), 6);
    }

    #[test]
    fn single_day_range() {
        let p = pattern(d(2024, 1, 7), d(2024, 1, 7), vec![entry(0, "10:00", 60)]);
        assert_eq!(materialize(&p, "t").count(), 1);
        let p = pattern(d(2024, 1, 7), d(2024, 1, 7), vec![entry(3, "10:00", 60)]);
        assert_eq!(materialize(&p, "t").count(), 0);
    }

    #[test]
    fn no_entries_is_empty_not_error() {
        let p = pattern(d(2024, 1, 1), d(2024, 12, 31), vec![]);
        assert_eq!(materialize(&p, "t").count(), 0);
    }

    #[test]
    fn duplicate_entries_are_not_deduplicated() {
        let p = pattern(
            d(2024, 1, 1),
            d(2024, 1, 1),
            vec![entry(1, "10:00", 60), entry(1, "10:00", 60)],
        );
        assert_eq!(materialize(&p, "t").count(), 2);
    }

    #[test]
    fn restartable_and_clipped() {
        let p = pattern(d(2024, 1, 1), d(2024, 1, 31), vec![entry(1, "10:00", 60)]);
        let walk = materialize(&p, "t");
        let first: Vec<_> = walk.clone().collect();
        let second: Vec<_> = walk.clone().collect();
        assert_eq!(first, second);
        let clipped: Vec<_> = walk.starting_from(d(2024, 1, 10)).map(|s| s.date).collect();
        assert_eq!(clipped, vec![d(2024, 1, 15), d(2024, 1, 22), d(2024, 1, 29)]);
    }

    #[test]
    fn reversed_range_rejected() {
        let err = SchedulePattern {
            range_start: d(2024, 2, 1),
            range_end: d(2024, 1, 1),
            entries: vec![],
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn entry_bounds() {
        let check = |e: PatternEntry| {
            SchedulePattern {
                range_start: d(2024, 1, 1),
                range_end: d(2024, 1, 2),
                entries: vec![e],
            }
            .validate()
        };
        assert!(matches!(
            check(entry(1, "10:00", 29)),
            Err(EngineError::InvalidPatternEntry { index: 0, .. })
        ));
        assert!(check(entry(1, "10:00", 30)).is_ok());
        assert!(check(entry(1, "10:00", 240)).is_ok());
        assert!(check(entry(1, "10:00", 241)).is_err());
        assert!(check(entry(7, "10:00", 60)).is_err());
        assert!(check(entry(1, "25:00", 60)).is_err());
        assert!(check(entry(1, "23:00", 60)).is_err());
        assert!(check(entry(1, "22:59", 60)).is_ok());
        match check(entry(1, "22:00", 120)) {
            Err(EngineError::InvalidPatternEntry { index: 0, reason }) => {
                assert!(reason.contains("must end by 23:59"), "{}", reason);
            }
            other => panic!("expected InvalidPatternEntry, got {:?}", other),
        }
    }

    #[test]
    fn parse_time_accepts_seconds() {
        let t = parse_time("08:15:30").expect("time");
        assert_eq!(format_time(t), "08:15");
        assert_eq!(minute_of_day(t), 8 * 60 + 15);
        assert!(parse_time("8h15").is_err());
    }
}
