//! Terminal logger for workouts and daily habits.
//!
//! Edits are applied to local state immediately and written to storage in the background, with
//! bursts of edits to the same set or activity coalesced into one write. Dashboards are computed
//! from per-day counts over fixed windows.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod gateway;
pub mod tracking;
pub mod utils;
