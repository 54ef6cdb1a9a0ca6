//! # Event subscribers for the appvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Watcher / control loop ── publish(Event) ──► Bus ──► subscriber listener
//!                                                          │
//!                                                   SubscriberSet::emit
//!                                                          │
//!                                          ┌───────────────┼───────────────┐
//!                                          ▼               ▼               ▼
//!                                      LogWriter        Custom A        Custom B
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
