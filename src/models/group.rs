//! Group model.

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A named group of users. Groups own packages, hold download permissions
/// and carry capabilities such as `add_package`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
}

/// Capability granting a group the right to create new packages.
pub const ADD_PACKAGE: &str = "add_package";
