//! elmdiag-core - Core types and collaborator traits for the elmdiag scan engine
//!
//! This crate holds the data model shared by the engine and its consumers
//! (ECU modules, trouble codes, scan snapshots) together with the traits the
//! engine uses to reach its external collaborators: persistence, progress
//! observation, audit logging and change notification.

pub mod error;
pub mod models;
pub mod observer;
pub mod store;

pub use error::{CoreError, CoreResult};
pub use models::*;
pub use observer::{DiffNotifier, LogBuffer, NoopObserver, ScanLog, ScanObserver};
pub use store::ScanStore;
