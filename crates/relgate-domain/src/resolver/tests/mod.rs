//! Tests for the access resolver module.
//!
//! Organized by functionality:
//! - Rule matching and fail-open behaviour
//! - Group, category and product rules
//! - Warm-up on rule installation
//! - Interaction with the change ingestor


#[cfg(test)]
mod warmup_tests;
