//! simexpiry library
//!
//! Tracks SIM card expiry dates and raises a daily local reminder for
//! cards that have expired or are about to.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
