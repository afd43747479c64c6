//! Authenticator: JWT-then-shared-key bearer scheme, plus an api-key scheme
//! Grounded in the pack's `JwtVerifier`/`HmacVerifier`
//! pair (`ThirdKeyAI-Symbiont`'s `http_input::webhook_verify`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub authenticated: bool,
    pub method: AuthMethod,
    pub user_id: String,
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    Jwt,
    SharedKey,
    ApiKey,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("jwt expired")]
    JwtExpired,
    #[error("invalid credential")]
    Invalid,
}

#[derive(Debug, serde::Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    permissions: Vec<String>,
}

pub struct Authenticator {
    enabled: bool,
    jwt_signing_key: Option<Vec<u8>>,
    shared_key_digest: Option<[u8; 32]>,
    api_keys: Vec<(String, String)>,
}

impl Authenticator {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            jwt_signing_key: None,
            shared_key_digest: None,
            api_keys: Vec::new(),
        }
    }

    pub fn new(jwt_signing_key: Option<Vec<u8>>, shared_key: Option<&str>, api_keys: Vec<(String, String)>) -> Self {
        Self {
            enabled: true,
            jwt_signing_key,
            shared_key_digest: shared_key.map(digest_of),
            api_keys,
        }
    }

    /// Parse the `Authorization` header (bearer or api-key scheme) and
    /// produce an `AuthContext`.
    pub fn authenticate(&self, authorization_header: Option<&str>) -> Result<AuthContext, AuthError> {
        if !self.enabled {
            return Ok(AuthContext {
                authenticated: true,
                method: AuthMethod::None,
                user_id: "anonymous".to_string(),
                permissions: vec!["*".to_string()],
                expires_at: None,
            });
        }

        let header = authorization_header.ok_or(AuthError::Missing)?;

        if let Some(token) = header.strip_prefix("Bearer ") {
            if let Some(ctx) = self.try_jwt(token) {
                return ctx;
            }
            return self.try_shared_key(token);
        }

        if let Some(key) = header.strip_prefix("ApiKey ") {
            return self.try_api_key(key);
        }

        Err(AuthError::Invalid)
    }

    fn try_jwt(&self, token: &str) -> Option<Result<AuthContext, AuthError>> {
        let signing_key = self.jwt_signing_key.as_ref()?;
        let decoding_key = jsonwebtoken::DecodingKey::from_secret(signing_key);
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_aud = false;
        validation.required_spec_claims = std::collections::HashSet::new();

        match jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation) {
            Ok(data) => Some(Ok(AuthContext {
                authenticated: true,
                method: AuthMethod::Jwt,
                user_id: data.claims.sub,
                permissions: data.claims.permissions,
                expires_at: data.claims.exp.map(|e| e as i64 * 1000),
            })),
            Err(e) if *e.kind() == jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Some(Err(AuthError::JwtExpired))
            }
            Err(_) => None,
        }
    }

    fn try_shared_key(&self, presented: &str) -> Result<AuthContext, AuthError> {
        let expected = self.shared_key_digest.ok_or(AuthError::Invalid)?;
        let presented_digest = digest_of(presented);
        if presented_digest.ct_eq(&expected).unwrap_u8() == 1 {
            Ok(AuthContext {
                authenticated: true,
                method: AuthMethod::SharedKey,
                user_id: "shared-key".to_string(),
                permissions: vec!["*".to_string()],
                expires_at: None,
            })
        } else {
            Err(AuthError::Invalid)
        }
    }

    fn try_api_key(&self, key: &str) -> Result<AuthContext, AuthError> {
        self.api_keys
            .iter()
            .find(|(_, k)| k.as_bytes().ct_eq(key.as_bytes()).unwrap_u8() == 1)
            .map(|(user_id, _)| AuthContext {
                authenticated: true,
                method: AuthMethod::ApiKey,
                user_id: user_id.clone(),
                permissions: vec!["*".to_string()],
                expires_at: None,
            })
            .ok_or(AuthError::Invalid)
    }
}

fn digest_of(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_authenticator_accepts_everything() {
        let auth = Authenticator::disabled();
        let ctx = auth.authenticate(None).unwrap();
        assert_eq!(ctx.user_id, "anonymous");
        assert!(ctx.authenticated);
    }

    #[test]
    fn enabled_authenticator_rejects_missing_header() {
        let auth = Authenticator::new(None, Some("sekret"), vec![]);
        assert!(matches!(auth.authenticate(None), Err(AuthError::Missing)));
    }

    #[test]
    fn shared_key_bearer_is_accepted() {
        let auth = Authenticator::new(None, Some("sekret"), vec![]);
        let ctx = auth.authenticate(Some("Bearer sekret")).unwrap();
        assert_eq!(ctx.method, AuthMethod::SharedKey);
    }

    #[test]
    fn wrong_shared_key_is_rejected() {
        let auth = Authenticator::new(None, Some("sekret"), vec![]);
        let err = auth.authenticate(Some("Bearer wrong")).unwrap_err();
        assert!(matches!(err, AuthError::Invalid));
    }

    #[test]
    fn api_key_scheme_is_accepted() {
        let auth = Authenticator::new(None, None, vec![("svc-a".to_string(), "key-123".to_string())]);
        let ctx = auth.authenticate(Some("ApiKey key-123")).unwrap();
        assert_eq!(ctx.user_id, "svc-a");
        assert_eq!(ctx.method, AuthMethod::ApiKey);
    }
}
