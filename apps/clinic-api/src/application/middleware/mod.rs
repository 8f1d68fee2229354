pub mod auth;
pub mod subscription;

pub use auth::{AuthenticatedUser, session_auth};
pub use subscription::subscription_gate;
