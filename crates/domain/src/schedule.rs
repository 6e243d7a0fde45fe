use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bureau_core::{AppError, AppResult};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
};
// 7 is accepted as an alias for Sunday and folded into 0.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
};

/// Set of allowed values of one cron field, stored as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CronField {
    mask: u64,
    restricted: bool,
}

impl CronField {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.mask & (1_u64 << value) != 0
    }

    fn parse(expression: &str, spec: FieldSpec) -> AppResult<Self> {
        let mut mask = 0_u64;
        let restricted = expression != "*";

        for part in expression.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(parse_number(step, spec)?)),
                None => (part, None),
            };

            let (start, end) = if range == "*" {
                (spec.min, spec.max)
            } else if let Some((start, end)) = range.split_once('-') {
                (parse_number(start, spec)?, parse_number(end, spec)?)
            } else {
                let value = parse_number(range, spec)?;
                // "5/15" means every 15 starting at 5 until the field maximum.
                (value, if step.is_some() { spec.max } else { value })
            };

            if start < spec.min || end > spec.max || start > end {
                return Err(invalid(spec, part));
            }

            let step = step.unwrap_or(1);
            if step == 0 || step > spec.max {
                return Err(invalid(spec, part));
            }

            let mut value = start;
            while value <= end {
                mask |= 1_u64 << value;
                value += step;
            }
        }

        if mask == 0 {
            return Err(invalid(spec, expression));
        }

        Ok(Self { mask, restricted })
    }
}

fn parse_number(value: &str, spec: FieldSpec) -> AppResult<u32> {
    value.parse::<u32>().map_err(|_| invalid(spec, value))
}

fn invalid(spec: FieldSpec, value: &str) -> AppError {
    AppError::Validation(format!(
        "invalid cron {} value '{value}' (allowed {}-{})",
        spec.name, spec.min, spec.max
    ))
}

/// Five-field cron expression: `minute hour day-of-month month day-of-week`.
///
/// Fields support `*`, lists, ranges and steps. When both day fields are
/// restricted a time matches if either of them matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronSchedule {
    expression: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronSchedule {
    /// Parses and validates a cron expression.
    pub fn parse(expression: &str) -> AppResult<Self> {
        let fields = expression.split_whitespace().collect::<Vec<_>>();
        let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
            return Err(AppError::Validation(format!(
                "cron expression '{expression}' must have 5 fields"
            )));
        };

        let mut day_of_week = CronField::parse(day_of_week, DAY_OF_WEEK)?;
        if day_of_week.contains(7) {
            day_of_week.mask = (day_of_week.mask & !(1_u64 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minute: CronField::parse(minute, MINUTE)?,
            hour: CronField::parse(hour, HOUR)?,
            day_of_month: CronField::parse(day_of_month, DAY_OF_MONTH)?,
            month: CronField::parse(month, MONTH)?,
            day_of_week,
        })
    }

    /// Returns the normalized expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        self.expression.as_str()
    }

    /// Returns whether the schedule fires in the minute containing `at`.
    #[must_use]
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.minute.contains(at.minute())
            || !self.hour.contains(at.hour())
            || !self.month.contains(at.month())
        {
            return false;
        }

        let day_of_month = self.day_of_month.contains(at.day());
        let day_of_week = self
            .day_of_week
            .contains(at.weekday().num_days_from_sunday());

        if self.day_of_month.restricted && self.day_of_week.restricted {
            day_of_month || day_of_week
        } else {
            day_of_month && day_of_week
        }
    }
}

impl FromStr for CronSchedule {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for CronSchedule {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<CronSchedule> for String {
    fn from(value: CronSchedule) -> Self {
        value.expression
    }
}

impl Display for CronSchedule {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.expression.as_str())
    }
}
