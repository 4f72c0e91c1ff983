//! DocTrack - correspondence tracking for a registry office
//!
//! Documents move between staff and the registry through a fixed workflow.
//! Every step is recorded, files can be attached, and the whole store can be
//! backed up or exported.

pub mod db;
pub mod models;
pub mod services;
pub mod utils;
pub mod web;

#[cfg(test)]
mod test_support;

pub use db::Database;
pub use web::{router, AppState};
