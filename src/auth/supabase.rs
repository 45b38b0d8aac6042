//! Supabase Auth token verification

use super::{AuthError, AuthProvider, UserId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Verifies tokens with `GET /auth/v1/user`
pub struct SupabaseAuth {
    base_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseAuth {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthUser = response.json().await?;
                debug!("Authenticated user {}", user.id);
                Ok(user.id)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AuthError::Service(format!("{}: {}", status, body)))
            }
        }
    }
}
