//! Application configuration read from the environment.

use crate::error::AppError;

const BACKEND_URL_VAR: &str = "TICKETDESK_BACKEND_URL";
const ANON_KEY_VAR: &str = "TICKETDESK_ANON_KEY";
const SITE_ORIGIN_VAR: &str = "TICKETDESK_SITE_ORIGIN";
const AUTH_REDIRECT_VAR: &str = "TICKETDESK_AUTH_REDIRECT_URL";
const TIMEOUT_VAR: &str = "TICKETDESK_TIMEOUT_SECS";

/// Origin the front end is served from when none is configured.
pub const DEFAULT_SITE_ORIGIN: &str = "http://localhost:5173";

/// Path the sign-in link lands on, relative to the redirect base.
pub const SIGN_IN_LANDING_PATH: &str = "/tickets";

/// Settings shared by the data and auth clients.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the hosted backend (e.g., `https://xyz.supabase.co`).
    pub backend_url: String,

    /// Public anonymous API key.
    pub anon_key: String,

    /// The front end's own origin.
    pub site_origin: String,

    /// Override for the sign-in redirect base.
    pub auth_redirect_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            site_origin: DEFAULT_SITE_ORIGIN.to_string(),
            auth_redirect_url: None,
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_url = get(BACKEND_URL_VAR)
            .ok_or_else(|| AppError::config(format!("{} is not set", BACKEND_URL_VAR)))?;
        let anon_key = get(ANON_KEY_VAR)
            .ok_or_else(|| AppError::config(format!("{} is not set", ANON_KEY_VAR)))?;

        let timeout_secs = match get(TIMEOUT_VAR) {
            Some(raw) => raw.parse().map_err(|_| {
                AppError::config(format!("{} must be a number of seconds, got '{}'", TIMEOUT_VAR, raw))
            })?,
            None => 30,
        };

        Ok(Self {
            backend_url: normalize_url(&backend_url),
            anon_key,
            site_origin: get(SITE_ORIGIN_VAR)
                .map(|o| normalize_url(&o))
                .unwrap_or_else(|| DEFAULT_SITE_ORIGIN.to_string()),
            auth_redirect_url: get(AUTH_REDIRECT_VAR).map(|u| normalize_url(&u)),
            timeout_secs,
        })
    }

    /// Base the sign-in redirect is built on: the override if set, else the site origin.
    pub fn redirect_base(&self) -> &str {
        self.auth_redirect_url
            .as_deref()
            .unwrap_or(&self.site_origin)
    }

    /// Full URL the passwordless sign-in link redirects to.
    pub fn sign_in_redirect(&self) -> String {
        format!("{}{}", self.redirect_base(), SIGN_IN_LANDING_PATH)
    }
}

/// Normalize a URL by removing trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
