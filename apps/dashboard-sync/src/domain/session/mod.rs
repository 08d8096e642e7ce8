//! Market Session Clock
//!
//! Pure mapping from a UTC timestamp to the trading window of the reference
//! market (NASDAQ, America/New_York):
//!
//! - Pre-market: 04:00-09:30
//! - Regular: 09:30-16:00
//! - After-market: 16:00-20:00
//! - Closed: otherwise, and all day on weekends
//!
//! Windows are half-open: the start instant belongs to the window, the end
//! instant belongs to the next one. Exchange holidays are not modelled.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Time zone of the reference market.
pub const MARKET_TZ: Tz = chrono_tz::America::New_York;

/// Time zone of the operator.
pub const OPERATOR_TZ: Tz = chrono_tz::Asia::Seoul;

const PRE_MARKET_OPEN: u32 = 4 * 3600;
const REGULAR_OPEN: u32 = 9 * 3600 + 30 * 60;
const REGULAR_CLOSE: u32 = 16 * 3600;
const AFTER_MARKET_CLOSE: u32 = 20 * 3600;

/// Trading window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No trading.
    Closed,
    /// Extended hours before the open.
    PreMarket,
    /// Regular trading hours.
    Regular,
    /// Extended hours after the close.
    AfterMarket,
}

impl SessionState {
    /// Label for logs and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::PreMarket => "pre-market",
            Self::Regular => "regular",
            Self::AfterMarket => "after-market",
        }
    }

    /// Whether regular-session orders can be placed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Regular)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session state together with the local times it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The trading window.
    pub state: SessionState,
    /// Wall clock at the reference market.
    pub market_time: DateTime<Tz>,
    /// Wall clock of the operator.
    pub operator_time: DateTime<Tz>,
}

impl SessionSnapshot {
    /// Calendar date in UTC, which keys the date-scoped order lists.
    #[must_use]
    pub fn utc_date(&self) -> NaiveDate {
        self.market_time.with_timezone(&Utc).date_naive()
    }
}

/// Derive the session state at `now`.
#[must_use]
pub fn session_state(now: DateTime<Utc>) -> SessionSnapshot {
    let market_time = now.with_timezone(&MARKET_TZ);
    SessionSnapshot {
        state: classify(market_time.weekday(), market_time.num_seconds_from_midnight()),
        market_time,
        operator_time: now.with_timezone(&OPERATOR_TZ),
    }
}

const fn classify(weekday: Weekday, seconds: u32) -> SessionState {
    if matches!(weekday, Weekday::Sat | Weekday::Sun) {
        return SessionState::Closed;
    }
    if seconds >= PRE_MARKET_OPEN && seconds < REGULAR_OPEN {
        SessionState::PreMarket
    } else if seconds >= REGULAR_OPEN && seconds < REGULAR_CLOSE {
        SessionState::Regular
    } else if seconds >= REGULAR_CLOSE && seconds < AFTER_MARKET_CLOSE {
        SessionState::AfterMarket
    } else {
        SessionState::Closed
    }
}
