//! # Retry Module
//!
//! Failure classification and timer-based retry scheduling.

pub mod policy;
pub mod strategy;

pub use policy::{RetryMatcher, RetryPolicy, RetryRule};
pub use strategy::RetryStrategy;
