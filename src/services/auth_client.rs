//! Auth API client.
//!
//! Consumes the hosted identity service: who the caller is, passwordless
//! sign-in links, and sign out. Token issuance and verification stay on the
//! server; this client only forwards tokens it was given.

use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::services::postgrest::ErrorBody;

/// Auth API client configuration.
#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    /// Base URL of the backend.
    pub base_url: String,

    /// Public anonymous key.
    pub anon_key: String,

    /// Where the sign-in link sends the user back to.
    pub redirect_to: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl From<&AppConfig> for AuthClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.backend_url.clone(),
            anon_key: config.anon_key.clone(),
            redirect_to: config.sign_in_redirect(),
            timeout_secs: config.timeout_secs,
        }
    }
}

/// Body of a passwordless sign-in request.
#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
}

/// Auth API client.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    config: AuthClientConfig,
}

impl AuthClient {
    /// Create a new auth client.
    pub fn new(config: AuthClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        let key_value = header::HeaderValue::from_str(&config.anon_key)
            .map_err(|_| AppError::config("Invalid anon key format"))?;
        headers.insert("apikey", key_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn auth_url(&self, path: &str) -> String {
        format!(
            "{}/auth/v1{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// The redirect the sign-in link uses.
    pub fn redirect_to(&self) -> &str {
        &self.config.redirect_to
    }

    async fn error_from_response(response: Response, endpoint: &str) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        map_auth_error(status, &body, endpoint)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else {
            Err(Self::error_from_response(response, endpoint).await)
        }
    }

    /// Send a passwordless sign-in link to `email`.
    pub async fn send_magic_link(&self, email: &str) -> Result<(), AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::invalid_input_field("Email is required", "email"));
        }

        let endpoint = "/otp";
        let response = self
            .client
            .post(self.auth_url(endpoint))
            .bearer_auth(&self.config.anon_key)
            .query(&[("redirect_to", self.config.redirect_to.as_str())])
            .json(&OtpRequest {
                email,
                create_user: true,
            })
            .send()
            .await?;

        if response.status().is_success() {
            log::info!("[auth] Sign-in link sent, redirecting to {}", self.config.redirect_to);
            Ok(())
        } else {
            Err(Self::error_from_response(response, endpoint).await)
        }
    }

    /// Fetch the identity the access token belongs to.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, AppError> {
        let endpoint = "/user";
        let response = self
            .client
            .get(self.auth_url(endpoint))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::handle_response(response, endpoint).await
    }

    /// Build the caller session for an optional access token.
    ///
    /// No token, or one the auth API rejects, gives an anonymous session.
    /// Any other failure is returned.
    pub async fn resolve_session(&self, access_token: Option<&str>) -> Result<Session, AppError> {
        let Some(token) = access_token else {
            return Ok(Session::anonymous());
        };

        session_from_lookup(token, self.get_user(token).await)
    }

    /// Revoke the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let endpoint = "/logout";
        let response = self
            .client
            .post(self.auth_url(endpoint))
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response, endpoint).await)
        }
    }
}

/// Map a failed auth API response to an error. 401 and 403 mean the token was rejected.
fn map_auth_error(status: StatusCode, body: &str, endpoint: &str) -> AppError {
    let parsed = ErrorBody::parse(body);
    let message = parsed
        .message()
        .unwrap_or_else(|| format!("Request failed ({}): {}", status.as_u16(), body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::authentication(message),
        _ => AppError::backend_full(message, parsed.code(), status.as_u16(), endpoint),
    }
}

/// Session for `token` given the outcome of the identity lookup.
fn session_from_lookup(token: &str, lookup: Result<AuthUser, AppError>) -> Result<Session, AppError> {
    match lookup {
        Ok(user) => Ok(Session::authenticated(token, user)),
        Err(AppError::Authentication { message }) => {
            log::info!("[auth] Stored session rejected: {}", message);
            Ok(Session::anonymous())
        }
        Err(e) => Err(e),
    }
}
