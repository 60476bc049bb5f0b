//! Instance selection for player routing
//!
//! Given a requested game type, picks one ready managed instance by the
//! configured strategy. When nothing is available the balancer can ask the
//! provisioning controller for a fresh instance instead of blocking.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fleet::{FleetRegistry, ManagedInstance};
use crate::nats::messages::SpawnRequest;
use crate::nats::EventSink;
use crate::routing::RouteTarget;

/// Player capacity requested for auto-spawned instances
const DEFAULT_SPAWN_PLAYERS: u32 = 8;

/// Load-balancing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fewest currently reported players
    LeastPlayers,
    /// Uniform random choice
    Random,
    /// Rotating index, advancing per call
    RoundRobin,
    /// First candidate in name order; also the fallback for unrecognized
    /// strategy strings
    First,
}

impl Strategy {
    pub fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "LEAST_PLAYERS" => Self::LeastPlayers,
            "RANDOM" => Self::Random,
            "ROUND_ROBIN" => Self::RoundRobin,
            _ => Self::First,
        }
    }
}

/// A selected routing target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub display_name: String,
    pub target: RouteTarget,
}

/// Picks ready instances for incoming players
pub struct LoadBalancer {
    registry: Arc<FleetRegistry>,
    /// Outbound channel for spawn requests; absent when the transport is
    /// down, in which case auto-spawn silently does nothing
    sink: Option<Arc<dyn EventSink>>,
    strategy: Strategy,
    auto_spawn: bool,
    /// Advances per call; not persisted across restarts
    round_robin: AtomicUsize,
}

impl LoadBalancer {
    pub fn new(
        registry: Arc<FleetRegistry>,
        sink: Option<Arc<dyn EventSink>>,
        strategy: Strategy,
        auto_spawn: bool,
    ) -> Self {
        Self {
            registry,
            sink,
            strategy,
            auto_spawn,
            round_robin: AtomicUsize::new(0),
        }
    }

    /// Ready managed instances for a game type, in deterministic name order
    fn candidates(&self, game_type: &str) -> Vec<ManagedInstance> {
        let prefix = format!("{}-", game_type.to_lowercase());

        let mut candidates: Vec<ManagedInstance> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|i| i.display_name.to_lowercase().starts_with(&prefix))
            .filter(|i| i.is_ready())
            .collect();

        candidates.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        candidates
    }

    /// Select an instance for a player, or request one when none is ready
    pub async fn select_instance(&self, game_type: &str) -> Option<Selection> {
        let candidates = self.candidates(game_type);

        if candidates.is_empty() {
            debug!(game_type = %game_type, "No ready instances available");
            self.request_spawn(game_type).await;
            return None;
        }

        let chosen = match self.strategy {
            Strategy::LeastPlayers => candidates
                .iter()
                .min_by_key(|i| (i.players_online, i.display_name.clone()))?,
            Strategy::Random => {
                let index = rand::thread_rng().gen_range(0..candidates.len());
                &candidates[index]
            }
            Strategy::RoundRobin => {
                let index = self.round_robin.fetch_add(1, Ordering::SeqCst);
                &candidates[index % candidates.len()]
            }
            Strategy::First => &candidates[0],
        };

        debug!(
            game_type = %game_type,
            name = %chosen.display_name,
            players = chosen.players_online,
            strategy = ?self.strategy,
            "Selected instance"
        );

        Some(Selection {
            display_name: chosen.display_name.clone(),
            target: chosen.target.clone(),
        })
    }

    /// Game types with at least one ready instance, for the selection
    /// command's no-argument listing
    pub fn available_game_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|i| i.is_ready())
            .map(|i| i.game_type)
            .collect();

        types.sort();
        types.dedup();
        types
    }

    /// Publish a spawn request so the controller starts a fresh instance.
    /// Callers report "no server available" right away rather than waiting
    /// for it to appear.
    async fn request_spawn(&self, game_type: &str) {
        if !self.auto_spawn {
            return;
        }

        let Some(sink) = &self.sink else {
            return;
        };

        if !sink.is_writable() {
            return;
        }

        let request = SpawnRequest::new(game_type, DEFAULT_SPAWN_PLAYERS);
        let payload = match request.to_bytes() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to serialize spawn request");
                return;
            }
        };

        match sink.publish(SpawnRequest::subject(), payload).await {
            Ok(()) => {
                info!(game_type = %game_type, "Requested a fresh instance from the controller");
            }
            Err(e) => {
                warn!(game_type = %game_type, error = %e, "Failed to publish spawn request");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::RegistryConfig;
    use crate::health::testing::ScriptedProber;
    use crate::health::Prober;
    use crate::nats::testing::RecordingSink;
    use crate::notify::WebhookNotifier;
    use crate::routing::{ProxyRoutingTable, RoutingTable};
    use std::collections::HashSet;

    fn make_registry() -> Arc<FleetRegistry> {
        Arc::new(FleetRegistry::new(
            RegistryConfig {
                burst_attempts: 0,
                ..RegistryConfig::default()
            },
            Arc::new(ProxyRoutingTable::new()) as Arc<dyn RoutingTable>,
            Arc::new(ScriptedProber::new()) as Arc<dyn Prober>,
            Arc::new(WebhookNotifier::disabled()),
        ))
    }

    fn make_balancer(
        registry: Arc<FleetRegistry>,
        strategy: Strategy,
        auto_spawn: bool,
    ) -> (LoadBalancer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let balancer = LoadBalancer::new(
            registry,
            Some(sink.clone() as Arc<dyn EventSink>),
            strategy,
            auto_spawn,
        );
        (balancer, sink)
    }

    fn add_ready(registry: &Arc<FleetRegistry>, id: &str, game_type: &str, players: u32) {
        registry.register(id, game_type, "10.0.0.5", 25565 + id.parse::<u16>().unwrap());
        let name = registry.format_display_name(game_type, id);
        registry.mark_ready(&name);
        registry.record_players(&name, players);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(Strategy::parse("least_players"), Strategy::LeastPlayers);
        assert_eq!(Strategy::parse("RANDOM"), Strategy::Random);
        assert_eq!(Strategy::parse("Round_Robin"), Strategy::RoundRobin);
        assert_eq!(Strategy::parse("whatever"), Strategy::First);
    }

    #[tokio::test]
    async fn test_only_ready_matching_instances_are_candidates() {
        let registry = make_registry();
        add_ready(&registry, "1", "bedwars", 0);
        // Registered but never probed: not routable
        registry.register("2", "bedwars", "10.0.0.5", 25599);
        // Different game type
        add_ready(&registry, "3", "skywars", 0);

        let (balancer, _) = make_balancer(registry, Strategy::First, false);

        let selection = balancer.select_instance("bedwars").await.unwrap();
        assert_eq!(selection.display_name, "bedwars-1");
    }

    #[tokio::test]
    async fn test_prefix_requires_separator() {
        let registry = make_registry();
        add_ready(&registry, "1", "bedwarsx", 0);

        let (balancer, _) = make_balancer(registry, Strategy::First, false);
        assert!(balancer.select_instance("bedwars").await.is_none());
    }

    #[tokio::test]
    async fn test_least_players_picks_minimum() {
        let registry = make_registry();
        add_ready(&registry, "1", "bedwars", 9);
        add_ready(&registry, "2", "bedwars", 2);
        add_ready(&registry, "3", "bedwars", 5);

        let (balancer, _) = make_balancer(registry, Strategy::LeastPlayers, false);

        let selection = balancer.select_instance("bedwars").await.unwrap();
        assert_eq!(selection.display_name, "bedwars-2");
    }

    #[tokio::test]
    async fn test_round_robin_visits_each_candidate_once_per_lap() {
        let registry = make_registry();
        add_ready(&registry, "1", "bedwars", 0);
        add_ready(&registry, "2", "bedwars", 0);
        add_ready(&registry, "3", "bedwars", 0);

        let (balancer, _) = make_balancer(registry, Strategy::RoundRobin, false);

        let mut lap = HashSet::new();
        for _ in 0..3 {
            let selection = balancer.select_instance("bedwars").await.unwrap();
            lap.insert(selection.display_name);
        }
        assert_eq!(lap.len(), 3);

        // The next lap starts over at the first candidate
        let selection = balancer.select_instance("bedwars").await.unwrap();
        assert_eq!(selection.display_name, "bedwars-1");
    }

    #[tokio::test]
    async fn test_random_stays_within_candidates() {
        let registry = make_registry();
        add_ready(&registry, "1", "bedwars", 0);
        add_ready(&registry, "2", "bedwars", 0);

        let (balancer, _) = make_balancer(registry, Strategy::Random, false);

        for _ in 0..20 {
            let selection = balancer.select_instance("bedwars").await.unwrap();
            assert!(selection.display_name.starts_with("bedwars-"));
        }
    }

    #[tokio::test]
    async fn test_no_candidates_with_auto_spawn_publishes_request() {
        let registry = make_registry();
        let (balancer, sink) = make_balancer(registry, Strategy::LeastPlayers, true);

        let selection = balancer.select_instance("arcade").await;
        assert!(selection.is_none());

        let published = sink.published_on(SpawnRequest::subject());
        assert_eq!(published.len(), 1);

        let request = SpawnRequest::from_bytes(&published[0]).unwrap();
        assert_eq!(request.game_type, "arcade");
        assert_eq!(request.players, 8);
        assert!(request.timestamp > 0);
    }

    #[tokio::test]
    async fn test_auto_spawn_disabled_publishes_nothing() {
        let registry = make_registry();
        let (balancer, sink) = make_balancer(registry, Strategy::LeastPlayers, false);

        assert!(balancer.select_instance("arcade").await.is_none());
        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_auto_spawn_skipped_when_sink_unwritable() {
        let registry = make_registry();
        let (balancer, sink) = make_balancer(registry, Strategy::LeastPlayers, true);
        sink.set_writable(false);

        assert!(balancer.select_instance("arcade").await.is_none());
        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_available_game_types_lists_ready_only() {
        let registry = make_registry();
        add_ready(&registry, "1", "bedwars", 0);
        add_ready(&registry, "2", "bedwars", 0);
        add_ready(&registry, "3", "skywars", 0);
        registry.register("4", "arcade", "10.0.0.5", 25569);

        let (balancer, _) = make_balancer(registry, Strategy::First, false);

        assert_eq!(balancer.available_game_types(), vec!["bedwars", "skywars"]);
    }
}
