use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::{AuthError, Claims, UserSession};
use crate::models::User;

/// Signs and verifies the HS256 bearer tokens the API accepts.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expires_in: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .field("access_token_expires_in", &self.access_token_expires_in)
            .finish()
    }
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expires_in: Duration::minutes(15),
        }
    }

    /// Mint a short-lived access token carrying the user's id, email and role
    pub fn create_access_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now + self.access_token_expires_in;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AuthError::Jwt)
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|token_data| token_data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Resolve the caller a token identifies. A subject that does not parse
    /// back to a numeric user id is treated as an invalid token.
    pub fn extract_user_session(&self, token: &str) -> Result<UserSession, AuthError> {
        let claims = self.validate_token(token)?;
        UserSession::from_claims(&claims).map_err(|_| AuthError::InvalidToken)
    }
}

/// Extract bearer token from authorization header
pub fn extract_bearer_token(auth_header: &str) -> Result<&str, AuthError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeaderFormat)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeaderFormat);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user(id: i64, role: UserRole, email: &str) -> User {
        User {
            id,
            role,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            phone_number: "+1-555-0199".to_string(),
        }
    }

    #[test]
    fn test_tokens_round_trip_their_claims() {
        let jwt_service = JwtService::new("test_secret");

        let token = jwt_service
            .create_access_token(&user(42, UserRole::Admin, "admin@example.com"))
            .unwrap();
        let claims = jwt_service.validate_token(&token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn test_bearer_extraction_requires_the_scheme_and_a_token() {
        assert_eq!(
            extract_bearer_token("Bearer test_token").unwrap(),
            "test_token"
        );

        assert!(extract_bearer_token("Invalid header").is_err());
        assert!(extract_bearer_token("Bearer ").is_err());
    }

    #[test]
    fn test_sessions_resolve_back_to_the_numeric_user() {
        let jwt_service = JwtService::new("test_secret");

        let token = jwt_service
            .create_access_token(&user(7, UserRole::Driver, "driver@example.com"))
            .unwrap();
        let session = jwt_service.extract_user_session(&token).unwrap();

        assert_eq!(session.user_id, 7);
        assert_eq!(session.email, "driver@example.com");
        assert_eq!(session.role, UserRole::Driver);
    }

    #[test]
    fn test_tokens_from_another_secret_are_rejected() {
        let issuing = JwtService::new("first_secret");
        let verifying = JwtService::new("second_secret");

        let token = issuing
            .create_access_token(&user(1, UserRole::Rider, "rider@example.com"))
            .unwrap();

        assert!(matches!(
            verifying.validate_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}
