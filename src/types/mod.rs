//! Shared types for fleetsync

mod error;

pub use error::{FleetError, Result};
