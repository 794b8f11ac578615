//! OAuth2 client-credentials grant against the Microsoft identity platform.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::{Credentials, Endpoints},
    error::{Error, Result},
};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A bearer token and the lifetime the identity service reported for it.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            secret: secret.into(),
            expires_in,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token endpoint response. Success and error bodies share one shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchanges application credentials for a Graph bearer token.
#[derive(Debug, Clone)]
pub struct TokenAcquirer {
    http: Client,
    endpoints: Endpoints,
}

impl TokenAcquirer {
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.endpoints.authority,
            urlencoding::encode(tenant_id)
        )
    }

    /// Performs one client-credentials grant. No retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the endpoint answers with a non-success
    /// status or the body has no `access_token`, and [`Error::Http`] if the
    /// request cannot be sent.
    pub async fn acquire(&self, credentials: &Credentials) -> Result<AccessToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", self.endpoints.scope.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url(&credentials.tenant_id))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "token response");

        let parsed = serde_json::from_str::<TokenResponse>(&body);

        if !status.is_success() {
            let detail = match parsed {
                Ok(TokenResponse {
                    error_description: Some(description),
                    ..
                }) => description,
                Ok(TokenResponse {
                    error: Some(error), ..
                }) => error,
                _ => body,
            };
            return Err(Error::Auth(format!("{status}: {detail}")));
        }

        let parsed = parsed.map_err(|e| Error::Auth(format!("invalid token response: {e}")))?;
        let secret = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                Error::Auth("token response did not contain an access_token".to_string())
            })?;

        debug!(token_len = secret.len(), "access token received");
        Ok(AccessToken::new(
            secret,
            parsed.expires_in.map(Duration::from_secs),
        ))
    }

    /// Like [`TokenAcquirer::acquire`], but serves a still-valid token from
    /// `cache` and stores freshly acquired ones in it.
    ///
    /// # Errors
    ///
    /// Same as [`TokenAcquirer::acquire`] on a cache miss.
    pub async fn acquire_cached(
        &self,
        credentials: &Credentials,
        cache: &TokenCache,
    ) -> Result<AccessToken> {
        if let Some(token) = cache.get(credentials) {
            debug!("using cached access token");
            return Ok(token);
        }
        let token = self.acquire(credentials).await?;
        cache.insert(credentials, token.clone());
        Ok(token)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: Option<Instant>,
}

/// Opt-in token cache keyed by (tenant, client).
///
/// Cheap to clone; clones share entries. Tokens without a reported lifetime
/// are never cached.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: Arc<Mutex<HashMap<(String, String), CachedToken>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(credentials: &Credentials) -> (String, String) {
        (credentials.tenant_id.clone(), credentials.client_id.clone())
    }

    /// Returns the cached token unless it expires within the safety margin.
    pub fn get(&self, credentials: &Credentials) -> Option<AccessToken> {
        self.get_at(credentials, Instant::now())
    }

    fn get_at(&self, credentials: &Credentials, now: Instant) -> Option<AccessToken> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = Self::key(credentials);
        let entry = entries.get(&key)?;
        match entry.expires_at {
            Some(expires_at) if now + EXPIRY_MARGIN < expires_at => Some(entry.token.clone()),
            _ => {
                entries.remove(&key);
                None
            }
        }
    }

    pub fn insert(&self, credentials: &Credentials, token: AccessToken) {
        self.insert_at(credentials, token, Instant::now());
    }

    fn insert_at(&self, credentials: &Credentials, token: AccessToken, now: Instant) {
        let Some(lifetime) = token.expires_in else {
            return;
        };
        let entry = CachedToken {
            token,
            expires_at: now.checked_add(lifetime),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(credentials), entry);
    }

    /// Drops the entry for these credentials, if any.
    pub fn invalidate(&self, credentials: &Credentials) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(credentials));
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
