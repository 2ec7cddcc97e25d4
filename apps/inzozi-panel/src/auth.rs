use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::LedgerError;
use crate::workflow::Principal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // member id
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    name: Option<&str>,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow::anyhow!("token lifetime out of range"))?
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.max(0) as usize,
        name: name.map(str::to_string),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Principal, LedgerError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| LedgerError::Unauthorized("Invalid or expired session token".to_string()))?;

    let user_id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| LedgerError::Unauthorized("Session token has no member id".to_string()))?;

    Ok(Principal {
        user_id,
        display_name: token_data.claims.name,
    })
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, LedgerError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| LedgerError::Unauthorized("Missing bearer token".to_string()))?;

    let principal = verify_token(&state.config.session_secret, token)?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let user_id = Uuid::new_v4();
        let token = issue_token("secret", user_id, Some("Aline"), chrono::Duration::hours(1)).unwrap();

        let principal = verify_token("secret", &token).unwrap();

        assert_eq!(principal.user_id, user_id);
        assert_eq!(principal.display_name.as_deref(), Some("Aline"));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = issue_token("secret", Uuid::new_v4(), None, chrono::Duration::hours(1)).unwrap();
        assert!(matches!(
            verify_token("other", &token),
            Err(LedgerError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let token = issue_token("secret", Uuid::new_v4(), None, chrono::Duration::hours(-2)).unwrap();
        assert!(matches!(
            verify_token("secret", &token),
            Err(LedgerError::Unauthorized(_))
        ));
    }
}
