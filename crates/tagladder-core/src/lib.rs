// Library root: re-exports all modules so the CLI and integration tests can
// reach the crate's public API.

pub mod challenge;
pub mod config;
pub mod db;
pub mod ledger;
pub mod player;
pub mod reconcile;
pub mod roster;
pub mod service;
pub mod validate;
