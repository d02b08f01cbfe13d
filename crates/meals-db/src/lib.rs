//! Persistence layer for the meal ordering service.
//!
//! One module per table under [`queries`]; every cascade is an explicit
//! multi-statement delete inside a single transaction.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
