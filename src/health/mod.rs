//! Health probing and monitoring

mod monitor;
mod probe;

pub use monitor::{HealthConfig, HealthMonitor};
pub use probe::{ProbeReply, Prober, StatusProber};

#[cfg(test)]
pub use probe::testing;
