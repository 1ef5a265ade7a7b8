use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Legacy remora user profile, written by the old system out of band.
/// This crate only reads profiles; it never creates or mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    /// Opaque legacy password hash. Copied verbatim into the cake-side
    /// record; never parsed or verified here.
    pub password: String,
    pub created: DateTime<Utc>,
}

/// Cake-side user record, materialized from a [`UserProfile`] on the first
/// successful cross-system login. The email doubles as the username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub date_joined: DateTime<Utc>,
}
