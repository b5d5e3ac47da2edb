//! Week-day primitives shared by `@run_on`, `week_start_day`, and the
//! pattern resolver's `{this-week}`/`{last-week}` family.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeekDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl WeekDay {
    pub const ALL: [WeekDay; 7] = [
        WeekDay::Monday,
        WeekDay::Tuesday,
        WeekDay::Wednesday,
        WeekDay::Thursday,
        WeekDay::Friday,
        WeekDay::Saturday,
        WeekDay::Sunday,
    ];

    /// Parse a day name or abbreviation, case-insensitively (`fri`, `Friday`).
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Some(match lower.as_str() {
            "mon" | "monday" => Self::Monday,
            "tue" | "tues" | "tuesday" => Self::Tuesday,
            "wed" | "weds" | "wednesday" => Self::Wednesday,
            "thu" | "thur" | "thurs" | "thursday" => Self::Thursday,
            "fri" | "friday" => Self::Friday,
            "sat" | "saturday" => Self::Saturday,
            "sun" | "sunday" => Self::Sunday,
            _ => return None,
        })
    }

    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }

    /// 0-based index with Monday = 0, used to compute week offsets.
    pub fn index_from_monday(&self) -> i64 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }
}

/// `@run_on` directive value: a day mask, `daily`, or `never`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayMask {
    Daily,
    Never,
    Days(Vec<WeekDay>),
}

impl DayMask {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("daily") {
            return Some(Self::Daily);
        }
        if trimmed.eq_ignore_ascii_case("never") {
            return Some(Self::Never);
        }
        let days: Option<Vec<WeekDay>> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(WeekDay::parse)
            .collect();
        days.map(Self::Days)
    }

    pub fn allows(&self, today: WeekDay) -> bool {
        match self {
            Self::Daily => true,
            Self::Never => false,
            Self::Days(days) => days.contains(&today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_day_abbreviations() {
        assert_eq!(WeekDay::parse("fri"), Some(WeekDay::Friday));
        assert_eq!(WeekDay::parse("Friday"), Some(WeekDay::Friday));
        assert_eq!(WeekDay::parse("bogus"), None);
    }

    #[test]
    fn day_mask_daily_allows_everything() {
        let mask = DayMask::parse("daily").unwrap();
        assert!(mask.allows(WeekDay::Tuesday));
        assert!(mask.allows(WeekDay::Sunday));
    }

    #[test]
    fn day_mask_never_blocks_everything() {
        let mask = DayMask::parse("never").unwrap();
        assert!(!mask.allows(WeekDay::Monday));
    }

    #[test]
    fn day_mask_specific_days() {
        let mask = DayMask::parse("friday").unwrap();
        assert!(mask.allows(WeekDay::Friday));
        assert!(!mask.allows(WeekDay::Tuesday));
    }

    #[test]
    fn day_mask_comma_and_space_separated() {
        let mask = DayMask::parse("mon, wed fri").unwrap();
        assert_eq!(
            mask,
            DayMask::Days(vec![WeekDay::Monday, WeekDay::Wednesday, WeekDay::Friday])
        );
    }
}
