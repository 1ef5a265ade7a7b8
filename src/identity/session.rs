use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Legacy remora session row, keyed by an opaque 32-hex token presented in
/// the `AMOv3` cookie. Created by the legacy system out of band; this crate
/// reads it and removes it when validation fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub valid: bool,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is live when the legacy validity flag is still set and the
    /// expiry window has not passed.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.valid && self.expires_at > now
    }
}
