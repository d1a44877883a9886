//! In-flight close tracking.
//!
//! A close command is fire-and-forget: the agent picks it up from the store
//! and the position disappearing is the only confirmation. The marker keeps
//! the operator from sending a second close while the first is pending.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mirror_core::Instrument;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DashboardError, DashboardResult};

#[derive(Debug, Clone)]
pub struct CloseMarker {
    pub request_id: Uuid,
    pub pair: Instrument,
    pub requested_at: DateTime<Utc>,
    /// Set once the store accepted the command.
    pub command_id: Option<String>,
}

/// Close markers keyed by trade id.
#[derive(Debug, Default)]
pub struct CloseTracker {
    markers: Mutex<HashMap<String, CloseMarker>>,
}

impl CloseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the marker for a trade. Fails if a close is already pending.
    pub fn begin(&self, trade_id: &str, pair: &Instrument) -> DashboardResult<Uuid> {
        let mut markers = self.markers.lock();
        if markers.contains_key(trade_id) {
            return Err(DashboardError::CloseInFlight(trade_id.to_string()));
        }
        let request_id = Uuid::new_v4();
        markers.insert(
            trade_id.to_string(),
            CloseMarker {
                request_id,
                pair: pair.clone(),
                requested_at: Utc::now(),
                command_id: None,
            },
        );
        Ok(request_id)
    }

    pub fn record_sent(&self, trade_id: &str, command_id: Option<String>) {
        if let Some(marker) = self.markers.lock().get_mut(trade_id) {
            marker.command_id = command_id;
        }
    }

    /// Drop the marker so the operator can retry.
    pub fn clear(&self, trade_id: &str) {
        self.markers.lock().remove(trade_id);
    }

    pub fn is_pending(&self, trade_id: &str) -> bool {
        self.markers.lock().contains_key(trade_id)
    }

    pub fn marker(&self, trade_id: &str) -> Option<CloseMarker> {
        self.markers.lock().get(trade_id).cloned()
    }

    /// Remove markers for trades that are no longer open.
    pub fn prune<'a>(&self, open_ids: impl IntoIterator<Item = &'a str>) -> usize {
        let open: HashSet<&str> = open_ids.into_iter().collect();
        let mut markers = self.markers.lock();
        let before = markers.len();
        markers.retain(|id, _| open.contains(id.as_str()));
        let pruned = before - markers.len();
        if pruned > 0 {
            debug!(pruned, "Closed positions cleared from in-flight markers");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.markers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_conflicts() {
        let tracker = CloseTracker::new();
        let pair = Instrument::from("BTCUSD");
        tracker.begin("1", &pair).unwrap();
        assert!(matches!(tracker.begin("1", &pair), Err(DashboardError::CloseInFlight(_))));
        assert!(tracker.begin("2", &pair).is_ok());
    }

    #[test]
    fn test_clear_allows_retry() {
        let tracker = CloseTracker::new();
        let pair = Instrument::from("BTCUSD");
        let first = tracker.begin("1", &pair).unwrap();
        tracker.clear("1");
        let second = tracker.begin("1", &pair).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_prune_keeps_open_trades() {
        let tracker = CloseTracker::new();
        let pair = Instrument::from("ETH/USDT");
        tracker.begin("1", &pair).unwrap();
        tracker.begin("2", &pair).unwrap();
        tracker.record_sent("2", Some("99".to_string()));

        assert_eq!(tracker.prune(["2", "3"]), 1);
        assert!(!tracker.is_pending("1"));
        assert_eq!(tracker.marker("2").unwrap().command_id.as_deref(), Some("99"));
    }
}
