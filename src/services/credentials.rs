//! Session token storage in the OS keychain.
//!
//! Keeps the caller's access token between runs (Keychain on macOS,
//! Credential Manager on Windows, Secret Service on Linux), keyed by the
//! backend URL it was issued for.

use crate::error::AppError;
use crate::models::Session;
use crate::services::auth_client::AuthClient;
use keyring::Entry;

/// Service name used in the keychain.
const SERVICE_NAME: &str = "ticketdesk";

/// Access token storage keyed by backend URL.
pub struct SessionVault;

impl SessionVault {
    /// Store the access token issued by `backend_url`.
    pub fn store_token(backend_url: &str, token: &str) -> Result<(), AppError> {
        let entry = Self::get_entry(backend_url)?;

        entry
            .set_password(token)
            .map_err(|e| AppError::credential_storage(format!("Failed to store session: {}", e)))
    }

    /// Load the stored access token, if there is one.
    pub fn get_token(backend_url: &str) -> Result<Option<String>, AppError> {
        let entry = Self::get_entry(backend_url)?;

        match entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::credential_storage(format!(
                "Failed to load session: {}",
                e
            ))),
        }
    }

    /// Remove the stored access token. Removing a missing one succeeds.
    pub fn delete_token(backend_url: &str) -> Result<(), AppError> {
        let entry = Self::get_entry(backend_url)?;

        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppError::credential_storage(format!(
                "Failed to delete session: {}",
                e
            ))),
        }
    }

    /// Whether an access token is stored for `backend_url`.
    pub fn has_token(backend_url: &str) -> Result<bool, AppError> {
        Ok(Self::get_token(backend_url)?.is_some())
    }

    /// Rebuild the caller session from the stored token.
    ///
    /// A token the auth API no longer accepts is dropped from the keychain
    /// and the session comes back anonymous.
    pub async fn restore_session(
        backend_url: &str,
        auth: &AuthClient,
    ) -> Result<Session, AppError> {
        let token = Self::get_token(backend_url)?;
        let session = auth.resolve_session(token.as_deref()).await?;

        if token.is_some() && !session.is_authenticated() {
            log::info!("[auth] Discarding expired session for {}", backend_url);
            Self::delete_token(backend_url)?;
        }

        Ok(session)
    }

    /// Revoke the remote session and forget the stored token.
    pub async fn sign_out(backend_url: &str, auth: &AuthClient) -> Result<(), AppError> {
        if let Some(token) = Self::get_token(backend_url)? {
            if let Err(e) = auth.sign_out(&token).await {
                if !e.is_authentication() {
                    return Err(e);
                }
            }
        }
        Self::delete_token(backend_url)
    }

    fn get_entry(backend_url: &str) -> Result<Entry, AppError> {
        let account = normalize_account(backend_url);

        Entry::new(SERVICE_NAME, &account).map_err(|e| {
            AppError::credential_storage(format!("Failed to create keyring entry: {}", e))
        })
    }
}

/// Keychain account name for a backend URL: no trailing slashes, lowercase.
fn normalize_account(url: &str) -> String {
    url.trim_end_matches('/').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_account() {
        assert_eq!(
            normalize_account("https://xyz.supabase.co/"),
            "https://xyz.supabase.co"
        );
        assert_eq!(
            normalize_account("HTTPS://XYZ.Supabase.CO"),
            "https://xyz.supabase.co"
        );
        assert_eq!(
            normalize_account("http://localhost:54321///"),
            "http://localhost:54321"
        );
    }
}
