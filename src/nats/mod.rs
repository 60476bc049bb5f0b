//! NATS transport: client wrapper, message types, event consumers

mod client;
mod consumer;
pub mod messages;
mod select;

pub use client::{EventSink, NatsClient};
pub use consumer::{EventConsumer, EventHandler};
pub use select::SelectionService;

#[cfg(test)]
pub use client::testing;
