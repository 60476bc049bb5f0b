//! Fleet registry: managed instances and their lifecycle

mod instance;
mod registry;

pub use instance::{InstanceState, ManagedInstance};
pub use registry::{FleetRegistry, RegisterOutcome, RegistryConfig, UnregisterOutcome};
