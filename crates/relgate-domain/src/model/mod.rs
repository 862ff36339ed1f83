//! Core value types: users, access rules and relationship changes.

mod types;

pub use types::*;
