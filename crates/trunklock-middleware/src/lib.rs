//! `trunklock-middleware` – State push plumbing
//!
//! Carries state confirmations from the coordinator to whatever protocol
//! adapter is listening, without caring about the protocol.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`sink`] – [`StateSink`][sink::StateSink], the push boundary the
//!   coordinator reports to, and [`BusStateSink`][sink::BusStateSink], which
//!   forwards every push onto the [`EventBus`].

pub mod bus;
pub mod sink;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use sink::{BusStateSink, StateSink};
