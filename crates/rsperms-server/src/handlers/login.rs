//! Session bootstrap.
//!
//! Turns a platform login event (platform id plus username) into a loaded
//! user with a computed snapshot:
//!
//! 1. **Identity**: look up the canonical id (by username, or the platform
//!    id itself) and detect first logins
//! 2. **Mapping**: persist `username -> canonical id`
//! 3. **Load**: read the user (one retry) and every inherited group
//! 4. **Defaults**: apply default assignments, saving the user if changed
//! 5. **Compute**: resolve the initial context immediately
//!
//! Logins slower than the configured threshold are logged as warnings.

mod handler;
mod types;

pub use handler::LoginHandler;
pub use types::{LoginError, LoginOutcome, LoginResult};
