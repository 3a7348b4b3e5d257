pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;
pub use config::PortalConfig;

pub use adapters::http_browser::HttpBrowser;
pub use adapters::store::{JsonFileStore, MemoryStore};
pub use core::cipher::{CipherKey, CredentialCipher};
pub use core::driver::{DriverSettings, PortalDriver};
pub use core::orchestrator::PortalService;
pub use utils::error::{ErrorKind, PortalError, Result};
