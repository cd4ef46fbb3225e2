//! Business logic services.

pub mod import;
pub mod registry;
pub mod verify;
