//! Per-activity deposit status flags
//!
//! A process-local map from activity id to a pair of booleans tracking
//! whether a security deposit was returned or transferred to a new studio.
//! Lookups of unknown ids yield the all-false default; updates replace the
//! whole record and stamp `updatedAt`. Nothing is persisted.

pub mod error;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use record::{DepositRecord, DepositUpdate};
pub use store::DepositStore;
