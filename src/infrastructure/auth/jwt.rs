use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::{Claims, TokenVerifier};

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}

impl TokenVerifier for JwtValidator {
    fn verify(&self, token: &str) -> Result<String, AppError> {
        let claims = self.validate(token)?;
        claims
            .user_id()
            .map(str::to_string)
            .ok_or_else(|| AppError::Auth("username not found in token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-for-testing";

    fn create_test_config() -> JwtConfig {
        JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        }
    }

    fn claims_for(username: &str) -> Claims {
        Claims {
            username: Some(username.to_string()),
            sub: None,
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: None,
            extra: HashMap::new(),
        }
    }

    fn create_test_token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let token = create_test_token(&claims_for("user-123"), &config.secret);

        let identity = validator.verify(&token).unwrap();
        assert_eq!(identity, "user-123");
    }

    #[test]
    fn test_subject_used_without_username() {
        let validator = JwtValidator::new(&create_test_config());
        let mut claims = claims_for("ignored");
        claims.username = None;
        claims.sub = Some("alice".to_string());

        let token = create_test_token(&claims, SECRET);
        assert_eq!(validator.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn test_invalid_token() {
        let validator = JwtValidator::new(&create_test_config());
        assert!(validator.verify("invalid-token").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let validator = JwtValidator::new(&create_test_config());
        let token = create_test_token(&claims_for("mallory"), "another-secret");
        assert!(matches!(validator.verify(&token), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let validator = JwtValidator::new(&create_test_config());
        let mut claims = claims_for("late");
        claims.exp = chrono::Utc::now().timestamp() - 3600;
        let token = create_test_token(&claims, SECRET);
        assert!(validator.verify(&token).is_err());
    }

    #[test]
    fn test_token_without_identity_rejected() {
        let validator = JwtValidator::new(&create_test_config());
        let mut claims = claims_for("nobody");
        claims.username = None;
        let token = create_test_token(&claims, SECRET);
        assert!(validator.verify(&token).is_err());
    }
}
