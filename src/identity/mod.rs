//! Identity layer for the remora → cake session bridge.
//! Keep the public surface thin and split implementation across sub-modules.

mod adapters;
mod backend;
mod request_context;
mod session;
mod user;

pub use adapters::user_from_profile;
pub use backend::SessionBackend;
pub use request_context::RequestContext;
pub use session::Session;
pub use user::{User, UserProfile};
