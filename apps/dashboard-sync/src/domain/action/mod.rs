//! Remote Actions
//!
//! Identities of the operator actions that drive the remote buy/sell
//! schedulers, and the guard that refuses to start a second invocation of
//! an action while the first is still outstanding.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

// =============================================================================
// Scheduler Actions
// =============================================================================

/// Operator action on the remote buy/sell schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerAction {
    /// Run the buy job immediately.
    BuyNow,
    /// Run the sell job immediately.
    SellNow,
    /// Start the periodic buy scheduler.
    StartBuy,
    /// Stop the periodic buy scheduler.
    StopBuy,
    /// Start the periodic sell scheduler.
    StartSell,
    /// Stop the periodic sell scheduler.
    StopSell,
}

impl SchedulerAction {
    /// All scheduler actions.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::BuyNow,
            Self::SellNow,
            Self::StartBuy,
            Self::StopBuy,
            Self::StartSell,
            Self::StopSell,
        ]
    }

    /// Stable identity string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuyNow => "buyNow",
            Self::SellNow => "sellNow",
            Self::StartBuy => "startBuy",
            Self::StopBuy => "stopBuy",
            Self::StartSell => "startSell",
            Self::StopSell => "stopSell",
        }
    }

    /// Message shown to the operator after the action succeeds.
    #[must_use]
    pub const fn success_message(self) -> &'static str {
        match self {
            Self::BuyNow => "Buy job triggered",
            Self::SellNow => "Sell job triggered",
            Self::StartBuy => "Buy scheduler started",
            Self::StopBuy => "Buy scheduler stopped",
            Self::StartSell => "Sell scheduler started",
            Self::StopSell => "Sell scheduler stopped",
        }
    }
}

impl fmt::Display for SchedulerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// In-Flight Guard
// =============================================================================

/// Set of action identities that are currently running.
///
/// Keyed by identity rather than fixed fields, so new actions need no
/// change here.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::domain::action::{InFlightActions, SchedulerAction};
///
/// let guard = InFlightActions::new();
///
/// let permit = guard.try_begin(SchedulerAction::StartBuy).unwrap();
/// assert!(guard.try_begin(SchedulerAction::StartBuy).is_none());
/// assert!(guard.try_begin(SchedulerAction::StopBuy).is_some());
///
/// drop(permit);
/// assert!(!guard.is_busy(&SchedulerAction::StartBuy));
/// ```
#[derive(Debug)]
pub struct InFlightActions<A = SchedulerAction> {
    active: Arc<Mutex<HashSet<A>>>,
}

impl<A> Default for InFlightActions<A> {
    fn default() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<A> Clone for InFlightActions<A> {
    fn clone(&self) -> Self {
        Self {
            active: Arc::clone(&self.active),
        }
    }
}

impl<A: Eq + Hash + Clone> InFlightActions<A> {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `action` as running.
    ///
    /// Returns `None` if the same action is already running. The returned
    /// permit clears the mark when dropped.
    #[must_use]
    pub fn try_begin(&self, action: A) -> Option<ActionPermit<A>> {
        if !self.active.lock().insert(action.clone()) {
            return None;
        }
        Some(ActionPermit {
            action,
            active: Arc::clone(&self.active),
        })
    }

    /// Whether `action` is currently running.
    #[must_use]
    pub fn is_busy(&self, action: &A) -> bool {
        self.active.lock().contains(action)
    }

    /// All actions currently running.
    #[must_use]
    pub fn busy(&self) -> Vec<A> {
        self.active.lock().iter().cloned().collect()
    }
}

/// Proof that an action is running. Dropping it ends the action.
#[derive(Debug)]
pub struct ActionPermit<A: Eq + Hash> {
    action: A,
    active: Arc<Mutex<HashSet<A>>>,
}

impl<A: Eq + Hash> ActionPermit<A> {
    /// The action this permit covers.
    pub const fn action(&self) -> &A {
        &self.action
    }
}

impl<A: Eq + Hash> Drop for ActionPermit<A> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.action);
    }
}
