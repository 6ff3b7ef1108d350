//! Domain models for Arbor.
//!
//! These are the core types shared across all crates.

pub mod account;
pub mod changeset;
pub mod closure;
pub mod entity;
pub mod group;
pub mod membership;
pub mod profile;
pub mod quota;
pub mod role;
