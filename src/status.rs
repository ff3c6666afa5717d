//! Platform status state machine.
//!
//! ```text
//! NORMAL ──▶ SAFE_MODE ──▶ SHUTDOWN
//!   ▲  │         │            ▲
//!   │  └─────────┼────────────┘
//!   └────────────┘
//! ```
//!
//! `SHUTDOWN` is terminal for the running process. Requesting the current
//! state again (`NORMAL` while `NORMAL`, `SAFE_MODE` while `SAFE_MODE`) is
//! accepted and leaves `changed_at` / `changed_by_ip` untouched.
//!
//! The status lives in a `tokio::sync::watch` channel: the gateway mutates
//! it under the channel's lock, every other subsystem reads or subscribes.

use crate::protocol::models::OverrideAction;
use crate::GatewayError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Platform-wide operating status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformStatus {
    /// Accepting normal traffic.
    Normal,
    /// Degraded safe mode.
    SafeMode,
    /// Shut down; no way back without a restart.
    Shutdown,
}

/// Effect of a permitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Status moved to a different state.
    Changed,
    /// Target equals the current state; nothing recorded on the status.
    Unchanged,
}

impl PlatformStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformStatus::Normal => "NORMAL",
            PlatformStatus::SafeMode => "SAFE_MODE",
            PlatformStatus::Shutdown => "SHUTDOWN",
        }
    }

    /// Whether `self -> target` is allowed, and what it does.
    pub fn transition_to(self, target: PlatformStatus) -> Option<TransitionKind> {
        use PlatformStatus::*;
        match (self, target) {
            (Normal, Normal) | (SafeMode, SafeMode) => Some(TransitionKind::Unchanged),
            (Normal, SafeMode) | (Normal, Shutdown) => Some(TransitionKind::Changed),
            (SafeMode, Normal) | (SafeMode, Shutdown) => Some(TransitionKind::Changed),
            (Shutdown, _) => None,
        }
    }
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the platform status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Current state.
    pub current: PlatformStatus,
    /// When the state last changed (process start for the initial `NORMAL`).
    pub changed_at: DateTime<Utc>,
    /// Who caused the last change; `None` until the first transition.
    pub changed_by_ip: Option<IpAddr>,
}

/// Result of applying an authorized action.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    /// State before the action.
    pub previous: PlatformStatus,
    /// Snapshot after the action.
    pub status: SystemStatus,
    /// Whether the state actually changed.
    pub kind: TransitionKind,
}

/// Shared handle to the process-wide status.
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<SystemStatus>>,
}

impl StatusHandle {
    /// Create the status as `NORMAL`, started at `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        let (tx, _rx) = watch::channel(SystemStatus {
            current: PlatformStatus::Normal,
            changed_at: started_at,
            changed_by_ip: None,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn current(&self) -> SystemStatus {
        self.tx.borrow().clone()
    }

    /// Current state only.
    pub fn platform_status(&self) -> PlatformStatus {
        self.tx.borrow().current
    }

    /// Receive every future change.
    pub fn subscribe(&self) -> watch::Receiver<SystemStatus> {
        self.tx.subscribe()
    }

    /// Apply an authorized action atomically.
    ///
    /// Check and mutation happen under the channel's write lock, so two
    /// concurrent successful overrides are serialized.
    ///
    /// # Errors
    /// * `TransitionRejected` - the action is not legal from the current state
    pub(crate) fn apply(
        &self,
        action: OverrideAction,
        by: IpAddr,
        at: DateTime<Utc>,
    ) -> Result<AppliedTransition, GatewayError> {
        let target = action.target_status();
        let mut outcome = Err(GatewayError::TransitionRejected {
            from: PlatformStatus::Shutdown,
            to: target,
        });

        self.tx.send_if_modified(|state| {
            let previous = state.current;
            match previous.transition_to(target) {
                None => {
                    outcome = Err(GatewayError::TransitionRejected {
                        from: previous,
                        to: target,
                    });
                    false
                }
                Some(TransitionKind::Unchanged) => {
                    outcome = Ok(AppliedTransition {
                        previous,
                        status: state.clone(),
                        kind: TransitionKind::Unchanged,
                    });
                    false
                }
                Some(TransitionKind::Changed) => {
                    state.current = target;
                    state.changed_at = at;
                    state.changed_by_ip = Some(by);
                    outcome = Ok(AppliedTransition {
                        previous,
                        status: state.clone(),
                        kind: TransitionKind::Changed,
                    });
                    true
                }
            }
        });

        outcome
    }
}

impl fmt::Debug for StatusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusHandle")
            .field("status", &*self.tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::net::Ipv4Addr;

    const OPERATOR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_starts_normal() {
        let status = StatusHandle::new(t(0));
        let snapshot = status.current();
        assert_eq!(snapshot.current, PlatformStatus::Normal);
        assert_eq!(snapshot.changed_at, t(0));
        assert_eq!(snapshot.changed_by_ip, None);
    }

    #[test]
    fn test_transition_table() {
        use PlatformStatus::*;
        assert_eq!(Normal.transition_to(SafeMode), Some(TransitionKind::Changed));
        assert_eq!(Normal.transition_to(Shutdown), Some(TransitionKind::Changed));
        assert_eq!(SafeMode.transition_to(Normal), Some(TransitionKind::Changed));
        assert_eq!(SafeMode.transition_to(Shutdown), Some(TransitionKind::Changed));
        assert_eq!(Normal.transition_to(Normal), Some(TransitionKind::Unchanged));
        assert_eq!(SafeMode.transition_to(SafeMode), Some(TransitionKind::Unchanged));
        assert_eq!(Shutdown.transition_to(Normal), None);
        assert_eq!(Shutdown.transition_to(SafeMode), None);
        assert_eq!(Shutdown.transition_to(Shutdown), None);
    }

    #[test]
    fn test_apply_records_actor_and_time() {
        let status = StatusHandle::new(t(0));
        let applied = status.apply(OverrideAction::SafeMode, OPERATOR, t(5)).unwrap();

        assert_eq!(applied.previous, PlatformStatus::Normal);
        assert_eq!(applied.kind, TransitionKind::Changed);
        assert_eq!(status.platform_status(), PlatformStatus::SafeMode);
        assert_eq!(status.current().changed_at, t(5));
        assert_eq!(status.current().changed_by_ip, Some(OPERATOR));
    }

    #[test]
    fn test_normal_while_normal_keeps_changed_at() {
        let status = StatusHandle::new(t(0));
        let applied = status.apply(OverrideAction::Normal, OPERATOR, t(7)).unwrap();

        assert_eq!(applied.kind, TransitionKind::Unchanged);
        assert_eq!(status.current().changed_at, t(0));
        assert_eq!(status.current().changed_by_ip, None);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let status = StatusHandle::new(t(0));
        status.apply(OverrideAction::Shutdown, OPERATOR, t(1)).unwrap();

        let result = status.apply(OverrideAction::Normal, OPERATOR, t(2));
        assert!(matches!(
            result,
            Err(GatewayError::TransitionRejected {
                from: PlatformStatus::Shutdown,
                to: PlatformStatus::Normal
            })
        ));
        assert_eq!(status.platform_status(), PlatformStatus::Shutdown);
        assert_eq!(status.current().changed_at, t(1));
    }

    #[test]
    fn test_subscribers_see_changes() {
        let status = StatusHandle::new(t(0));
        let mut rx = status.subscribe();
        assert!(!rx.has_changed().unwrap());

        status.apply(OverrideAction::Normal, OPERATOR, t(1)).unwrap();
        assert!(!rx.has_changed().unwrap());

        status.apply(OverrideAction::SafeMode, OPERATOR, t(2)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().current, PlatformStatus::SafeMode);
    }
}
