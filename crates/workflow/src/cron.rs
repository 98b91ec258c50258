//! 5-field cron expressions.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

/// A parsed 5-field cron expression: minute hour dom month dow.
///
/// All five fields must match; day-of-month and day-of-week are combined
/// with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>, // 0=Sun, 6=Sat
}

/// How far ahead `next_after` looks before giving up (e.g. `0 0 31 2 *`).
const SEARCH_DAYS: i64 = 366 * 5;

impl CronExpr {
    /// Parse a standard 5-field cron expression.
    ///
    /// Supports: `*`, `*/N` (step), `N` (literal), `N-M` (range), `N,M` (list).
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(format!(
                "Expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        };

        Ok(CronExpr {
            minutes: Self::parse_field(minute, 0, 59)?,
            hours: Self::parse_field(hour, 0, 23)?,
            days_of_month: Self::parse_field(dom, 1, 31)?,
            months: Self::parse_field(month, 1, 12)?,
            days_of_week: Self::parse_field(dow, 0, 6)?,
        })
    }

    fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
        let mut values = Vec::new();

        for part in field.split(',').map(str::trim) {
            if let Some((base, step)) = part.split_once('/') {
                let step: u32 = step.parse().map_err(|_| format!("Invalid step: {step}"))?;
                if step == 0 {
                    return Err("Step cannot be zero".into());
                }
                let (start, end) = if base == "*" {
                    (min, max)
                } else if base.contains('-') {
                    Self::parse_range(base, min, max)?
                } else {
                    (Self::parse_value(base, min, max)?, max)
                };
                values.extend((start..=end).step_by(step as usize));
            } else if part.contains('-') {
                let (start, end) = Self::parse_range(part, min, max)?;
                values.extend(start..=end);
            } else if part == "*" {
                values.extend(min..=max);
            } else {
                values.push(Self::parse_value(part, min, max)?);
            }
        }

        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err("Field produced no values".into());
        }
        Ok(values)
    }

    fn parse_value(s: &str, min: u32, max: u32) -> Result<u32, String> {
        let v: u32 = s.parse().map_err(|_| format!("Invalid number: {s}"))?;
        if v < min || v > max {
            return Err(format!("{v} out of range {min}-{max}"));
        }
        Ok(v)
    }

    fn parse_range(s: &str, min: u32, max: u32) -> Result<(u32, u32), String> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid range: {s}"))?;
        let start: u32 = start
            .parse()
            .map_err(|_| format!("Invalid range start: {start}"))?;
        let end: u32 = end.parse().map_err(|_| format!("Invalid range end: {end}"))?;
        if start < min || end > max || start > end {
            return Err(format!("Range {start}-{end} invalid for {min}-{max}"));
        }
        Ok((start, end))
    }

    /// Check if the given datetime matches this cron expression.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.matches_date(dt.date_naive())
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        self.days_of_month.contains(&date.day())
            && self.months.contains(&date.month())
            && self
                .days_of_week
                .contains(&date.weekday().num_days_from_sunday())
    }

    /// The first matching minute strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let first_day = start.date_naive();

        for offset in 0..SEARCH_DAYS {
            let date = first_day + Duration::days(offset);
            if !self.matches_date(date) {
                continue;
            }
            for &hour in &self.hours {
                for &minute in &self.minutes {
                    let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                        continue;
                    };
                    let candidate = Utc.from_utc_datetime(&naive);
                    if candidate >= start {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}
