//! Managed-instance entity and lifecycle state

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::routing::RouteTarget;

/// Lifecycle state of a managed instance
///
/// `Registering → Ready` on the first successful probe; `Offline` is
/// terminal and always followed by removal; there is no resurrection path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Registering,
    Ready,
    Offline,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registering => write!(f, "registering"),
            Self::Ready => write!(f, "ready"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A game-server instance whose routing entry this engine owns
#[derive(Debug, Clone)]
pub struct ManagedInstance {
    /// Provider-assigned opaque identifier
    pub instance_id: String,
    /// Game type, e.g. "bedwars"
    pub game_type: String,
    /// Unique routing-table key derived from the name template
    pub display_name: String,
    /// Address registered into the routing table
    pub target: RouteTarget,
    /// Lifecycle state
    pub state: InstanceState,
    /// Wall-clock registration time, for operator display
    pub registered_at: DateTime<Utc>,
    /// Monotonic registration instant, for the grace window
    registered_instant: Instant,
    /// Player count from the most recent successful probe
    pub players_online: u32,
}

impl ManagedInstance {
    pub fn new(
        instance_id: impl Into<String>,
        game_type: impl Into<String>,
        display_name: impl Into<String>,
        target: RouteTarget,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            game_type: game_type.into(),
            display_name: display_name.into(),
            target,
            state: InstanceState::Registering,
            registered_at: Utc::now(),
            registered_instant: Instant::now(),
            players_online: 0,
        }
    }

    /// Whether failed probes are still tolerated for this instance.
    /// Recomputed from the registration instant; no timer is scheduled.
    pub fn in_grace_period(&self, grace: Duration) -> bool {
        self.registered_instant.elapsed() < grace
    }

    /// Seconds of grace remaining, clamped at zero
    pub fn remaining_grace_secs(&self, grace: Duration) -> u64 {
        grace
            .saturating_sub(self.registered_instant.elapsed())
            .as_secs()
    }

    /// Seconds since registration
    pub fn age_secs(&self) -> u64 {
        self.registered_instant.elapsed().as_secs()
    }

    pub fn is_ready(&self) -> bool {
        self.state == InstanceState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ManagedInstance {
        ManagedInstance::new(
            "42",
            "bedwars",
            "bedwars-42",
            RouteTarget::new("10.0.0.5", 25565),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_window() {
        let inst = instance();
        let grace = Duration::from_secs(30);

        assert!(inst.in_grace_period(grace));
        assert!(inst.remaining_grace_secs(grace) > 25);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!inst.in_grace_period(grace));
        assert_eq!(inst.remaining_grace_secs(grace), 0);
    }

    #[test]
    fn test_initial_state() {
        let inst = instance();
        assert_eq!(inst.state, InstanceState::Registering);
        assert!(!inst.is_ready());
        assert_eq!(inst.players_online, 0);
    }
}
