//! Holdoff Storage crate - SQLite persistence for deferred actions.
//!
//! Provides a WAL-mode SQLite database with migrations, the pending-change
//! store and the key-value store that holds the delay policy.

pub mod actions;
pub mod db;
pub mod migrations;
pub mod settings;

pub use actions::ActionStore;
pub use db::Database;
pub use settings::SettingsStore;
