pub mod cipher;
pub mod driver;
pub mod orchestrator;
pub mod parse;
pub mod routes;

pub use crate::domain::model::{
    AveragesResult, CredentialBundle, DataType, FetchOutcome, PlaintextCredentials, PortalData,
    PortalResponse, ProfileRecord, TranscriptField, TranscriptResult,
};
pub use crate::domain::ports::{BrowserLauncher, BrowserSession, CredentialStore};
pub use crate::utils::error::Result;
