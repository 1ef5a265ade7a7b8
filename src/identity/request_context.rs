use std::collections::HashMap;

use super::user::User;

/// Per-request view of the caller: the resolved user (None is the anonymous
/// case), the raw cookie set, and a request id for log correlation.
///
/// Built once per inbound request and passed explicitly to everything that
/// needs the current user or cookies.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<User>,
    pub cookies: HashMap<String, String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            cookies: HashMap::new(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}
