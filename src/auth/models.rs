use serde::{Deserialize, Serialize};

use crate::models::UserRole;

/// JWT token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // Subject (user ID)
    pub email: String,  // User email
    pub role: UserRole, // User role
    pub exp: usize,     // Expiration time
    pub iat: usize,     // Issued at
    pub jti: String,    // JWT ID
}

/// Authenticated caller, as carried in request extensions
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: i64,
    pub email: String,
    pub role: UserRole,
    pub jti: String,
}

impl UserSession {
    pub fn from_claims(claims: &Claims) -> Result<Self, std::num::ParseIntError> {
        Ok(Self {
            user_id: claims.sub.parse()?,
            email: claims.email.clone(),
            role: claims.role,
            jti: claims.jti.clone(),
        })
    }
}
