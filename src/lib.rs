//! Whereabouts – infers which room a cat is in from beacon signal strengths.
//!
//! One beacon sits in every room and periodically reports the signal
//! strengths (RSSI) it measured for the cat's tag. The service keeps the
//! latest batch of every room and, once all rooms have reported within a
//! short window, picks the room with the strongest average signal:
//! * a [`inference::Decision::Found`] when no room was known before,
//! * a [`inference::Decision::Moved`] when the strongest room changed,
//! * a [`inference::Decision::Lost`] when no room saw the cat at all.
//!
//! ## Modules
//! * [`persist`] – SQLite storage for readings, the device directory and the last known room.
//! * [`inference`] – The exclusive ingest, aggregate, decide and record transaction.
//! * [`tracker`] – Async front serializing transactions and dispatching
//!   notifications after commit.
//! * [`notify`] – The [`notify::Notifier`] seam and its webhook implementation.
//! * [`server`] – axum routes for beacons, boot reports and health checks.
//! * [`settings`] – Configuration from file and environment.
//!
//! ## Rounds
//! A round is complete when at least [`inference::Round::expected_rooms`]
//! distinct rooms hold a reading captured within [`inference::Round::window`]
//! of now. Until then batches are stored but nothing is decided. A beacon
//! that saw nothing sends an empty batch, which is stored as a single
//! reading without a signal: the room has reported, but ranks below every
//! room that observed something. Equal averages go to the room whose name
//! sorts first.
//!
//! ## Quick Start
//! ```
//! use whereabouts::persist::{PersistenceMode, Persistor};
//! use whereabouts::inference::{Decision, Round};
//! let mut store = Persistor::new(&PersistenceMode::InMemory).unwrap();
//! store.assign_device("aa:bb", "kitchen").unwrap();
//! let round = Round { expected_rooms: 1, ..Round::default() };
//! let decision = store.infer("aa:bb", &[-60, -50], chrono::Utc::now(), &round).unwrap();
//! assert_eq!(decision, Decision::Found { room: "kitchen".into(), average: -55.0 });
//! ```
//!
//! ## Notifications
//! Notifications are sent once, after the transaction that produced them
//! has committed, and are never retried.

pub mod error;
pub mod inference;
pub mod notify;
pub mod persist;
pub mod server;
pub mod settings;
pub mod tracker;
