//! OpenFlow controller core.
//!
//! Owns every switch-facing connection: negotiates a version, runs the features
//! exchange, dispatches decoded messages, keeps per-switch state, correlates
//! multipart statistics replies and publishes everything as named [`Event`]s.
//!
//! ```no_run
//! use ofcore_controller::{Controller, ControllerConfig, ControllerListener, PollScheduler};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> ofcore_controller::Result<()> {
//! let config = ControllerConfig::default();
//! let controller = Controller::new(config.clone())?;
//! let listener = ControllerListener::bind("0.0.0.0:6653".parse().unwrap(), controller.clone()).await?;
//! let shutdown = CancellationToken::new();
//!
//! let scheduler = PollScheduler::new(config.stats_interval);
//! let poll = tokio::spawn({
//!     let controller = controller.clone();
//!     let shutdown = shutdown.clone();
//!     async move { scheduler.run(controller, shutdown).await }
//! });
//! listener.run(shutdown).await?;
//! let _ = poll.await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod events;
pub mod listener;
pub mod negotiation;
mod ports;
pub mod priority;
mod reactor;
pub mod scheduler;
pub mod sequencing;
pub mod stats;
pub mod switch;
#[cfg(test)]
mod testing;

pub use config::ControllerConfig;
pub use connection::{Connection, ConnectionState, Outbound, ProtocolState};
pub use controller::Controller;
pub use error::{ControllerError, Result};
pub use events::{pattern_matches, Event, EventBus, InterfaceChange};
pub use listener::{serve_connection, ControllerListener};
pub use negotiation::select_version;
pub use priority::priority_of;
pub use scheduler::PollScheduler;
pub use sequencing::SequenceGuard;
pub use stats::{FragmentOutcome, PollDecision, StatKind, StatsBatch, StatsCorrelator};
pub use switch::{Interface, Switch, SwitchRegistry};
