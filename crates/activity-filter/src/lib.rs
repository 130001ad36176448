//! Activity filtering policies
//!
//! A deployment picks one [`FilterMode`]. The proxy applies it to activity
//! pages returned by the upstream list endpoint (rewriting the page envelope)
//! and to single activities fetched by id. Activities are handled as raw
//! JSON so fields the proxy does not know about pass through untouched.

pub mod mode;
pub mod page;

pub use mode::{Admission, CLEANING_TYPE, FilterMode, INVENTORY_CHECK_DEPARTURE};
pub use page::apply_to_page;
