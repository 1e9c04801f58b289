use crate::auth::{AuthError, JwtService, UserSession};
use crate::models::User;

/// Token validation front for the API middleware. Credentials and token
/// issuance live with the identity provider; this service only has to
/// verify what arrives on the wire.
#[derive(Debug, Clone)]
pub struct AuthService {
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            jwt_service: JwtService::new(jwt_secret),
        }
    }

    /// Validate a bearer token and resolve the caller it identifies
    pub fn validate_session(&self, token: &str) -> Result<UserSession, AuthError> {
        self.jwt_service.extract_user_session(token)
    }

    /// Mint an access token for a known user. Used by operational tooling
    /// and the test suite.
    pub fn issue_access_token(&self, user: &User) -> Result<String, AuthError> {
        self.jwt_service.create_access_token(user)
    }
}
