//! Common type definitions shared by the API and database layers.
//!
//! # ID Types
//!
//! Both entities use SQLite rowids, wrapped in type aliases so signatures say
//! which table an integer belongs to:
//!
//! - [`UserId`]: User account identifier
//! - [`SleepRecordId`]: Sleep record identifier
//!
//! # Operations
//!
//! [`Operation`] names the action a caller attempted; it shows up in
//! permission errors.

use serde_with::DeserializeFromStr;
use std::fmt;
use std::str::FromStr;

// Type aliases for IDs
pub type UserId = i64;
pub type SleepRecordId = i64;

// Common types for path parameters

/// Designed to allow routes like /users/current and /users/{id} to hit the same handler.
///
/// Path segments always arrive as strings, so this parses from the segment text rather than
/// relying on an untagged enum (which would refuse to read "3" as an integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr)]
pub enum UserIdOrCurrent {
    Current,
    Id(UserId),
}

impl FromStr for UserIdOrCurrent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "current" {
            return Ok(UserIdOrCurrent::Current);
        }
        s.parse::<UserId>()
            .map(UserIdOrCurrent::Id)
            .map_err(|_| format!("expected a user id or 'current', got '{s}'"))
    }
}

impl UserIdOrCurrent {
    /// Resolve the path parameter against the authenticated user's id.
    pub fn resolve(&self, current: UserId) -> UserId {
        match self {
            UserIdOrCurrent::Current => current,
            UserIdOrCurrent::Id(id) => *id,
        }
    }
}

// Operations that can be performed on resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}
