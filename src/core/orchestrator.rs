use crate::core::cipher::CredentialCipher;
use crate::core::driver::PortalDriver;
use crate::domain::model::{
    CredentialBundle, DataType, FetchOutcome, PlaintextCredentials, PortalData, PortalResponse,
};
use crate::domain::ports::{BrowserLauncher, CredentialStore};
use crate::utils::error::{PortalError, Result};
use std::sync::Arc;

/// Entry point for callers: look up the user's stored Portal login, sign in and return one
/// dataset. Stateless between calls; safe to share across tasks.
pub struct PortalService<S: CredentialStore, L: BrowserLauncher> {
    store: S,
    cipher: Arc<CredentialCipher>,
    driver: PortalDriver<L>,
}

impl<S: CredentialStore, L: BrowserLauncher> PortalService<S, L> {
    pub fn new(store: S, cipher: Arc<CredentialCipher>, driver: PortalDriver<L>) -> Self {
        Self {
            store,
            cipher,
            driver,
        }
    }

    pub async fn fetch_portal_data(&self, user_id: &str, data_type: &str) -> Result<PortalResponse> {
        let data_type: DataType = data_type.parse()?;
        if user_id.trim().is_empty() {
            return Err(PortalError::InvalidRequest {
                message: "user id is required".to_string(),
            });
        }

        let result = self.fetch(user_id, data_type).await;
        if let Err(e) = &result {
            tracing::warn!(
                user_id,
                %data_type,
                kind = ?e.kind(),
                "Portal fetch failed: {}",
                e
            );
        }
        result
    }

    async fn fetch(&self, user_id: &str, data_type: DataType) -> Result<PortalResponse> {
        let profile =
            self.store
                .load_profile(user_id)
                .await?
                .ok_or_else(|| PortalError::ProfileNotFound {
                    user_id: user_id.to_string(),
                })?;

        let bundle = match profile.portal {
            Some(bundle) if bundle.connected => bundle,
            _ => return Err(PortalError::NotConnected),
        };

        let credentials = self.decrypt_bundle(&bundle)?;
        tracing::info!(user_id, %data_type, "Fetching from Portal");

        match self.driver.authenticate_and_fetch(&credentials).await? {
            FetchOutcome::Success {
                averages,
                transcript,
            } => {
                let data = match data_type {
                    DataType::Averages => PortalData::Averages(averages),
                    DataType::Transcript => PortalData::Transcript(transcript),
                };
                Ok(PortalResponse { data })
            }
            FetchOutcome::AuthenticationFailed { reason } => {
                tracing::info!(
                    user_id,
                    reason = reason.as_deref().unwrap_or("none"),
                    "Portal login rejected"
                );
                Err(PortalError::AuthenticationFailed)
            }
            FetchOutcome::TransientFailure { cause } => {
                Err(PortalError::TransientFailure { cause })
            }
        }
    }

    fn decrypt_bundle(&self, bundle: &CredentialBundle) -> Result<PlaintextCredentials> {
        let portal_url = self.decrypt_field("portalUrl", bundle.portal_url.as_deref())?;
        let username = self.decrypt_field("username", bundle.username.as_deref())?;
        let password = self.decrypt_field("password", bundle.password.as_deref())?;
        Ok(PlaintextCredentials::new(portal_url, username, password))
    }

    fn decrypt_field(
        &self,
        field: &'static str,
        token: Option<&str>,
    ) -> Result<zeroize::Zeroizing<String>> {
        let token = token.ok_or(PortalError::CredentialsCorrupted { field })?;
        self.cipher
            .decrypt(token)
            .map_err(|_| PortalError::CredentialsCorrupted { field })
    }
}
