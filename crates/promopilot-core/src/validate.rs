//! Creation-time validation for campaigns and schedule rules.
//!
//! Malformed configuration is rejected here and never persisted.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("campaign_name must be 1..={MAX_NAME_LEN} characters")]
    InvalidName,
    #[error("item_id must not be empty")]
    MissingItemId,
    #[error("discount_percentage must be > 0 and <= 100, got {0}")]
    DiscountOutOfRange(Decimal),
    #[error("end_date must not precede start_date")]
    CampaignWindowInverted,
    #[error("unknown IANA timezone: {0}")]
    UnknownTimezone(String),
    #[error("end_time must be after start_time")]
    ScheduleWindowInverted,
    #[error("day_of_week must be 0 (Monday) through 6 (Sunday), got {0}")]
    InvalidDayOfWeek(i16),
    #[error("invalid time of day: {0}")]
    InvalidTimeOfDay(String),
}

/// Campaign fields as submitted, before persistence.
#[derive(Debug, Clone)]
pub struct CampaignDraft<'a> {
    pub campaign_name: &'a str,
    pub item_id: &'a str,
    pub discount_percentage: Decimal,
    pub timezone: &'a str,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Validate a new or updated campaign, returning the parsed timezone.
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered.
pub fn validate_campaign(draft: &CampaignDraft<'_>) -> Result<Tz, ValidationError> {
    let name = draft.campaign_name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidName);
    }
    if draft.item_id.trim().is_empty() {
        return Err(ValidationError::MissingItemId);
    }
    if draft.discount_percentage <= Decimal::ZERO
        || draft.discount_percentage > Decimal::from(100)
    {
        return Err(ValidationError::DiscountOutOfRange(
            draft.discount_percentage,
        ));
    }
    if draft.end_date < draft.start_date {
        return Err(ValidationError::CampaignWindowInverted);
    }
    draft
        .timezone
        .parse::<Tz>()
        .map_err(|_| ValidationError::UnknownTimezone(draft.timezone.to_string()))
}

/// Validate a schedule's daily window: same-day, end strictly after start.
///
/// # Errors
///
/// Returns [`ValidationError::ScheduleWindowInverted`] when `end <= start`.
pub fn validate_schedule_window(start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::ScheduleWindowInverted);
    }
    Ok(())
}

/// Parse an `HH:MM[:SS]` time of day. `24:00` is accepted as shorthand for
/// end-of-day and mapped to `23:59:59`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimeOfDay`] for unparseable input.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ValidationError> {
    if raw == "24:00" || raw == "24:00:00" {
        return Ok(NaiveTime::from_hms_opt(23, 59, 59)
            .unwrap_or(NaiveTime::MIN));
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ValidationError::InvalidTimeOfDay(raw.to_string()))
}

/// Map a stored day index (0 = Monday .. 6 = Sunday) to a weekday.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDayOfWeek`] for values outside 0..=6.
pub fn weekday_from_index(index: i16) -> Result<Weekday, ValidationError> {
    match index {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(ValidationError::InvalidDayOfWeek(other)),
    }
}

#[must_use]
pub fn weekday_index(day: Weekday) -> i16 {
    i16::try_from(day.num_days_from_monday()).unwrap_or(0)
}
