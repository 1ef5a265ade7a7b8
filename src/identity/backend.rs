use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::store::{SharedStore, StoreError};
use crate::tprintln;

use super::adapters::user_from_profile;
use super::user::User;

// Shape of a remora session key: 32 lowercase hex chars.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{32}$").unwrap());

/// Authentication backend for legacy remora sessions.
///
/// Validation failure is destructive: a stale session row, or one pointing at
/// a user that no longer exists, is removed during the failed lookup. A second
/// lookup of the same token therefore reports no-such-session, never stale.
/// All failure shapes surface as `None`; errors are reserved for store I/O.
#[derive(Debug, Clone, Default)]
pub struct SessionBackend;

impl SessionBackend {
    /// Resolve a session token to a cake-side user, materializing the user
    /// record from the legacy profile on first login.
    pub fn authenticate(&self, store: &SharedStore, token: &str) -> Result<Option<User>, StoreError> {
        if !TOKEN_RE.is_match(token) {
            tprintln!("auth.denied reason=malformed token={}", token);
            return Ok(None);
        }
        let Some(session) = store.find_session(token)? else {
            tprintln!("auth.denied reason=unknown token={}", token);
            return Ok(None);
        };
        if !session.is_live(Utc::now()) {
            store.delete_session(token)?;
            tprintln!("auth.denied reason=stale token={} row_removed=true", token);
            return Ok(None);
        }
        let Some(profile) = store.find_profile(session.user_id)? else {
            // Session points at a user the legacy system has since deleted.
            store.delete_session(token)?;
            tprintln!(
                "auth.denied reason=dangling token={} user_id={} row_removed=true",
                token, session.user_id
            );
            return Ok(None);
        };
        let user = match store.find_user(profile.id)? {
            Some(existing) => existing,
            None => {
                let user = user_from_profile(&profile);
                store.upsert_user(&user)?;
                user
            }
        };
        tprintln!("auth.granted user={} token={}", user.id, token);
        Ok(Some(user))
    }

    /// Direct cake-side user lookup. An absent id is a normal outcome, not an
    /// error.
    pub fn get_user(&self, store: &SharedStore, id: i64) -> Result<Option<User>, StoreError> {
        store.find_user(id)
    }
}
