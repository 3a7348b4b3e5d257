use crate::utils::error::PortalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Encrypted Portal login as stored on the user's profile. Every field is a cipher token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub connected: bool,
}

/// The part of a user profile this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<CredentialBundle>,
}

/// Decrypted Portal login. Buffers are wiped on drop and `Debug` never prints them.
pub struct PlaintextCredentials {
    portal_url: Zeroizing<String>,
    username: Zeroizing<String>,
    password: Zeroizing<String>,
}

impl PlaintextCredentials {
    pub fn new(
        portal_url: impl Into<Zeroizing<String>>,
        username: impl Into<Zeroizing<String>>,
        password: impl Into<Zeroizing<String>>,
    ) -> Self {
        Self {
            portal_url: portal_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for PlaintextCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextCredentials")
            .field("portal_url", &"[REDACTED]")
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Course name to average, formatted exactly as the Portal shows it.
pub type AveragesResult = BTreeMap<String, String>;

/// Transcript summary values keyed by a well-known label.
pub type TranscriptResult = BTreeMap<TranscriptField, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptField {
    WeightedGpa,
    UnweightedGpa,
    ClassRank,
}

impl TranscriptField {
    pub const ALL: [TranscriptField; 3] = [
        TranscriptField::WeightedGpa,
        TranscriptField::UnweightedGpa,
        TranscriptField::ClassRank,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TranscriptField::WeightedGpa => "weighted_gpa",
            TranscriptField::UnweightedGpa => "unweighted_gpa",
            TranscriptField::ClassRank => "class_rank",
        }
    }
}

/// Result of one driver session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        averages: AveragesResult,
        transcript: TranscriptResult,
    },
    AuthenticationFailed {
        reason: Option<String>,
    },
    TransientFailure {
        cause: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Averages,
    Transcript,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Averages => "averages",
            DataType::Transcript => "transcript",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "averages" => Ok(DataType::Averages),
            "transcript" => Ok(DataType::Transcript),
            other => Err(PortalError::InvalidRequest {
                message: format!(
                    "Unknown data type '{}', expected 'averages' or 'transcript'",
                    other
                ),
            }),
        }
    }
}

/// The requested slice of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PortalData {
    Averages(AveragesResult),
    Transcript(TranscriptResult),
}

impl PortalData {
    pub fn data_type(&self) -> DataType {
        match self {
            PortalData::Averages(_) => DataType::Averages,
            PortalData::Transcript(_) => DataType::Transcript,
        }
    }
}

/// Wire shape returned to callers: `{ "data": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalResponse {
    pub data: PortalData,
}
