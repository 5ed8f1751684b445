//! Authentication primitives: credential hashing, recovery codes, admin tokens

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod recovery;

pub use jwt::{Claims, JwtService};
pub use middleware::{extract_token, jwt_auth_middleware, require_admin_middleware, AuthContext};
pub use password::{CredentialHash, PasswordHasher};
