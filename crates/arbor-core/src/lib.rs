//! Arbor core: domain models, error taxonomy and the repository
//! seams shared by the storage and engine crates.

pub mod batch;
pub mod clock;
pub mod error;
pub mod models;
pub mod repository;
pub mod task;
