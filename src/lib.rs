//! Keeps a roster of students in sync with their Codeforces activity.

pub mod activity;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod pacing;
pub mod remote;
pub mod report;
pub mod repository;
pub mod sync;
