//! Authentication layer (§6): JWT bearer tokens over a file-backed user
//! store with bcrypt-compatible password hashes.

pub mod jwt;
pub mod password;
pub mod users;

pub use jwt::{create_access_token, verify_token, Claims};
pub use users::{GeneratedCredential, UserStore};
