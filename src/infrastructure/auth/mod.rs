mod claims;
mod jwt;

pub use claims::Claims;
pub use jwt::JwtValidator;

use crate::error::AppError;

/// Resolves a bearer credential to the user identity it was issued for.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<String, AppError>;
}
