use crate::domain::model::{CredentialBundle, ProfileRecord};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Starts a fresh, isolated browser session. Implementations must not share cookies or
/// pages between sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session>;
}

/// One live browser session. Elements are addressed by their `id` attribute.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the page to finish loading.
    async fn goto(&mut self, url: &str) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Serialized HTML of the current page.
    async fn content(&mut self) -> Result<String>;

    async fn has_element(&mut self, id: &str) -> Result<bool>;

    /// Replace the value of the input with the given id.
    async fn fill(&mut self, id: &str, value: &str) -> Result<()>;

    async fn click(&mut self, id: &str) -> Result<()>;

    /// Press Enter while the element with the given id has focus.
    async fn press_enter(&mut self, id: &str) -> Result<()>;

    /// Resolve once a navigation triggered by the last action has settled. May never resolve
    /// if no navigation happens; callers bound it with a timeout.
    async fn wait_for_navigation(&mut self) -> Result<()>;

    /// Orderly shutdown.
    async fn close(&mut self) -> Result<()>;

    /// Synchronous teardown for paths that cannot await (drop on cancellation or panic).
    fn abort(&mut self);
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_profile(&self, user_id: &str) -> Result<Option<ProfileRecord>>;

    /// Used by the connect tooling, never by the fetch path.
    async fn save_bundle(&self, user_id: &str, bundle: CredentialBundle) -> Result<()>;
}
