//! Reporting date windows.
//!
//! All windows are inclusive UTC calendar-date ranges; the default is
//! the last 7 days through today.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use beacon_core::limits::DEFAULT_WINDOW_DAYS;
use beacon_core::{Error, Result};

/// Today's UTC calendar date.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// An inclusive `[from, to]` UTC date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// The last `days` calendar dates through `today` (inclusive).
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        let days = days.max(1);
        Self {
            from: today - Days::new(u64::from(days - 1)),
            to: today,
        }
    }

    /// Window starting at the UTC date of an epoch-millisecond instant.
    pub fn since_ms(since_ms: i64, today: NaiveDate) -> Result<Self> {
        let from = DateTime::from_timestamp_millis(since_ms)
            .ok_or_else(|| Error::validation(format!("since {} out of range", since_ms)))?
            .date_naive();
        Ok(Self { from, to: today })
    }

    /// Resolve explicit `date_from`/`date_to` bounds, defaulting to the
    /// last [`DEFAULT_WINDOW_DAYS`] through today.
    pub fn resolve(from: Option<&str>, to: Option<&str>, today: NaiveDate) -> Result<Self> {
        let to = match to {
            Some(s) => parse_date(s)?,
            None => today,
        };
        let from = match from {
            Some(s) => parse_date(s)?,
            None => to - Days::new(u64::from(DEFAULT_WINDOW_DAYS - 1)),
        };
        if from > to {
            return Err(Error::validation("date_from is after date_to"));
        }
        Ok(Self { from, to })
    }

    pub fn from_str(&self) -> String {
        self.from.format("%Y-%m-%d").to_string()
    }

    pub fn to_str(&self) -> String {
        self.to.format("%Y-%m-%d").to_string()
    }

    /// Epoch milliseconds of the window start (00:00:00 UTC on `from`).
    pub fn start_ms(&self) -> i64 {
        self.from.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    /// Epoch milliseconds of the first instant after the window.
    pub fn end_ms_exclusive(&self) -> i64 {
        (self.to + Days::new(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis()
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::validation(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}

/// Reporting period as echoed back in responses.
#[derive(Debug, Clone, Serialize)]
pub struct Period {
    pub from: String,
    pub to: String,
    pub days: i64,
}

impl From<&DateWindow> for Period {
    fn from(window: &DateWindow) -> Self {
        Self {
            from: window.from_str(),
            to: window.to_str(),
            days: window.days(),
        }
    }
}
