//! Works out which release first shipped each merged merge request and when issues were really
//! closed.

pub mod association;
pub mod changelog;
pub mod closed_dates;
pub mod errors;
pub mod settings;
pub mod tags;

pub use crate::changelog::Changelog;
pub use crate::errors::{ChangelogErrors, ChangelogResult};
