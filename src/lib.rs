//! fleetsync - dynamic game-server fleet management for a routing proxy
//!
//! Ephemeral game-server instances are provisioned externally and announce
//! themselves over NATS. fleetsync registers them into the proxy routing
//! table, probes them until they are confirmed ready, keeps monitoring them
//! while they serve players, and removes them when they go empty or stop
//! answering.
//!
//! ## Services
//!
//! - **Fleet registry**: authoritative map of managed instances and their
//!   lifecycle state
//! - **Health monitor**: periodic probing, ready promotion, eviction
//! - **Reconciler**: one-way drift detection against the endpoint directory
//! - **Load balancer**: ready-instance selection and auto-spawn requests
//! - **Event consumer**: `server_ready` / `server_empty` work queues

pub mod admin;
pub mod balancer;
pub mod config;
pub mod directory;
pub mod fleet;
pub mod health;
pub mod nats;
pub mod notify;
pub mod panel;
pub mod reconcile;
pub mod routing;
pub mod types;

pub use config::Args;
pub use types::{FleetError, Result};
