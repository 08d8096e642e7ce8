//! Dashboard Resources
//!
//! Catalog of the read endpoints the trading dashboard polls, with the
//! canonical cache keys and default refresh cadences for each, plus the
//! remote paths of the scheduler actions.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::action::SchedulerAction;
use super::cache::{CacheKey, FetchError};

/// Exchange code used when none is configured.
pub const DEFAULT_EXCHANGE: &str = "NASD";

/// Query parameter carrying the overseas exchange code.
pub const EXCHANGE_PARAM: &str = "ovrs_excg_cd";

/// Query parameter carrying the first inquiry date (YYYYMMDD).
pub const INQUIRY_START_PARAM: &str = "inqr_strt_dt";

/// Query parameter carrying the last inquiry date (YYYYMMDD).
pub const INQUIRY_END_PARAM: &str = "inqr_end_dt";

// =============================================================================
// Endpoints
// =============================================================================

/// Read resource exposed by the trading backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Overseas account balance and holdings.
    OverseasBalance,
    /// Cash deposit.
    Deposit,
    /// Buy candidates with technical and sentiment scoring.
    RecommendedCombined,
    /// Sell candidates.
    SellCandidates,
    /// Buy/sell scheduler status.
    SchedulerStatus,
    /// Unfilled overseas orders.
    UnfilledOrders,
    /// Reserved overseas orders.
    ReservedOrders,
}

impl Endpoint {
    /// Request path relative to the backend base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::OverseasBalance => "/balance/overseas",
            Self::Deposit => "/balance/deposit",
            Self::RecommendedCombined => {
                "/stocks/recommendations/recommended-stocks/with-technical-and-sentiment"
            }
            Self::SellCandidates => "/stocks/recommendations/sell-candidates",
            Self::SchedulerStatus => "/stocks/recommendations/scheduler/status",
            Self::UnfilledOrders => "/balance/nccs",
            Self::ReservedOrders => "/balance/order-resv-list",
        }
    }

    /// Default refresh cadence.
    #[must_use]
    pub const fn default_refresh_interval(self) -> Duration {
        match self {
            Self::OverseasBalance | Self::UnfilledOrders => Duration::from_secs(10),
            Self::Deposit
            | Self::RecommendedCombined
            | Self::SellCandidates
            | Self::ReservedOrders => Duration::from_secs(30),
            Self::SchedulerStatus => Duration::from_secs(5),
        }
    }

    /// Cache key of a parameterless endpoint.
    #[must_use]
    pub fn key(self) -> CacheKey {
        CacheKey::new(self.path())
    }
}

/// Key of the unfilled-orders resource for one exchange.
#[must_use]
pub fn unfilled_orders_key(exchange: &str) -> CacheKey {
    CacheKey::builder(Endpoint::UnfilledOrders.path())
        .param(EXCHANGE_PARAM, exchange)
        .build()
}

/// Key of the reserved-orders resource for an inclusive date range.
#[must_use]
pub fn reserved_orders_key(exchange: &str, from: NaiveDate, to: NaiveDate) -> CacheKey {
    CacheKey::builder(Endpoint::ReservedOrders.path())
        .param(EXCHANGE_PARAM, exchange)
        .param(INQUIRY_START_PARAM, from.format("%Y%m%d").to_string())
        .param(INQUIRY_END_PARAM, to.format("%Y%m%d").to_string())
        .build()
}

/// Key of the reserved-orders resource for a single day.
#[must_use]
pub fn reserved_orders_for_day(exchange: &str, day: NaiveDate) -> CacheKey {
    reserved_orders_key(exchange, day, day)
}

/// Remote path that performs a scheduler action.
#[must_use]
pub const fn action_path(action: SchedulerAction) -> &'static str {
    match action {
        SchedulerAction::BuyNow => "/stocks/recommendations/purchase/trigger",
        SchedulerAction::SellNow => "/stocks/recommendations/sell/trigger",
        SchedulerAction::StartBuy => "/stocks/recommendations/purchase/scheduler/start",
        SchedulerAction::StopBuy => "/stocks/recommendations/purchase/scheduler/stop",
        SchedulerAction::StartSell => "/stocks/recommendations/sell/scheduler/start",
        SchedulerAction::StopSell => "/stocks/recommendations/sell/scheduler/stop",
    }
}

// =============================================================================
// Widgets
// =============================================================================

/// Dashboard panel that polls one resource.
///
/// Several widgets may read the same endpoint; they then share one cache
/// entry and one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Widget {
    /// Overseas holdings and balance.
    Balance,
    /// Cash deposit.
    Deposit,
    /// Recommendation overview.
    Recommendations,
    /// Buy candidate list.
    BuyCandidates,
    /// Sell candidate list.
    SellCandidates,
    /// Buy/sell scheduler status and controls.
    SchedulerStatus,
    /// Unfilled order list.
    UnfilledOrders,
    /// Reserved order list.
    ReservedOrders,
}

impl Widget {
    /// Every widget on the dashboard.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Balance,
            Self::Deposit,
            Self::Recommendations,
            Self::BuyCandidates,
            Self::SellCandidates,
            Self::SchedulerStatus,
            Self::UnfilledOrders,
            Self::ReservedOrders,
        ]
    }

    /// Endpoint the widget reads.
    #[must_use]
    pub const fn endpoint(self) -> Endpoint {
        match self {
            Self::Balance => Endpoint::OverseasBalance,
            Self::Deposit => Endpoint::Deposit,
            Self::Recommendations | Self::BuyCandidates => Endpoint::RecommendedCombined,
            Self::SellCandidates => Endpoint::SellCandidates,
            Self::SchedulerStatus => Endpoint::SchedulerStatus,
            Self::UnfilledOrders => Endpoint::UnfilledOrders,
            Self::ReservedOrders => Endpoint::ReservedOrders,
        }
    }

    /// Label for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Deposit => "deposit",
            Self::Recommendations => "recommendations",
            Self::BuyCandidates => "buy_candidates",
            Self::SellCandidates => "sell_candidates",
            Self::SchedulerStatus => "scheduler_status",
            Self::UnfilledOrders => "unfilled_orders",
            Self::ReservedOrders => "reserved_orders",
        }
    }

    /// Upper-case name used in `SYNC_REFRESH_<NAME>_MS`.
    #[must_use]
    pub const fn env_name(self) -> &'static str {
        match self {
            Self::Balance => "BALANCES",
            Self::Deposit => "DEPOSIT",
            Self::Recommendations => "RECOMMENDATIONS",
            Self::BuyCandidates => "BUY_CANDIDATES",
            Self::SellCandidates => "SELL_CANDIDATES",
            Self::SchedulerStatus => "SCHEDULER_STATUS",
            Self::UnfilledOrders => "UNFILLED_ORDERS",
            Self::ReservedOrders => "RESERVED_ORDERS",
        }
    }

    /// Default refresh cadence.
    #[must_use]
    pub const fn default_refresh_interval(self) -> Duration {
        self.endpoint().default_refresh_interval()
    }

    /// Cache key for the widget's resource.
    ///
    /// `exchange` and `today` fill in the parameters of the order lists.
    #[must_use]
    pub fn key(self, exchange: &str, today: NaiveDate) -> CacheKey {
        match self {
            Self::UnfilledOrders => unfilled_orders_key(exchange),
            Self::ReservedOrders => reserved_orders_for_day(exchange, today),
            other => other.endpoint().key(),
        }
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Scheduler Status
// =============================================================================

/// Status of the remote buy/sell schedulers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the periodic buy job is running.
    pub buy_running: bool,
    /// Whether the periodic sell job is running.
    pub sell_running: bool,
    /// Next buy run, as reported by the server.
    #[serde(default)]
    pub buy_next_run_time: Option<String>,
    /// Next sell run, as reported by the server.
    #[serde(default)]
    pub sell_next_run_time: Option<String>,
    /// Free-form server message.
    #[serde(default)]
    pub message: Option<String>,
}

impl SchedulerStatus {
    /// Decode from a raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] if the body does not have the expected shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, FetchError> {
        Self::deserialize(value).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Whether the scheduler for `action` already reflects it, in which case
    /// the action is redundant.
    #[must_use]
    pub const fn already_applied(&self, action: SchedulerAction) -> bool {
        match action {
            SchedulerAction::StartBuy => self.buy_running,
            SchedulerAction::StopBuy => !self.buy_running,
            SchedulerAction::StartSell => self.sell_running,
            SchedulerAction::StopSell => !self.sell_running,
            SchedulerAction::BuyNow | SchedulerAction::SellNow => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_are_canonical() {
        assert_eq!(Endpoint::Deposit.key(), CacheKey::new("/balance/deposit"));
        assert_eq!(
            unfilled_orders_key("NASD").to_string(),
            "/balance/nccs?ovrs_excg_cd=NASD"
        );
    }

    #[test]
    fn reserved_orders_dates_are_compact() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let key = reserved_orders_for_day("NASD", day);

        assert_eq!(key.param(INQUIRY_START_PARAM), Some("20250311"));
        assert_eq!(key.param(INQUIRY_END_PARAM), Some("20250311"));
        assert_eq!(key.param(EXCHANGE_PARAM), Some("NASD"));
    }

    #[test]
    fn cadences() {
        assert_eq!(
            Endpoint::SchedulerStatus.default_refresh_interval(),
            Duration::from_secs(5)
        );
        assert_eq!(
            Endpoint::OverseasBalance.default_refresh_interval(),
            Duration::from_secs(10)
        );
        assert_eq!(
            Endpoint::SellCandidates.default_refresh_interval(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn every_action_has_a_distinct_path() {
        let mut paths: Vec<_> = SchedulerAction::all().iter().map(|a| action_path(*a)).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), SchedulerAction::all().len());
    }

    #[test]
    fn decodes_scheduler_status() {
        let status = SchedulerStatus::from_value(&json!({
            "buy_running": true,
            "sell_running": false,
            "buy_next_run_time": "2025-03-11T10:00:00",
        }))
        .unwrap();

        assert!(status.buy_running);
        assert_eq!(status.sell_next_run_time, None);
        assert!(status.already_applied(SchedulerAction::StartBuy));
        assert!(status.already_applied(SchedulerAction::StopSell));
        assert!(!status.already_applied(SchedulerAction::BuyNow));
    }

    #[test]
    fn rejects_malformed_scheduler_status() {
        let err = SchedulerStatus::from_value(&json!({ "buy_running": "yes" })).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn recommendation_widgets_share_a_key() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert_eq!(
            Widget::Recommendations.key("NASD", today),
            Widget::BuyCandidates.key("NASD", today)
        );
        assert_ne!(
            Widget::Recommendations.key("NASD", today),
            Widget::SellCandidates.key("NASD", today)
        );
    }

    #[test]
    fn widget_keys_carry_parameters() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert_eq!(
            Widget::UnfilledOrders.key("NYSE", today).param(EXCHANGE_PARAM),
            Some("NYSE")
        );
        assert_eq!(
            Widget::ReservedOrders.key("NASD", today).param(INQUIRY_END_PARAM),
            Some("20250311")
        );
        assert_eq!(
            Widget::SchedulerStatus.default_refresh_interval(),
            Duration::from_secs(5)
        );
    }
}
