use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a managed signer as seen by the approval flow.
///
/// `Unknown` is only produced while recovering a persisted record and is
/// resolved by a reconciliation fetch before any decision is made on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerStatus {
    Generated,
    PendingApproval,
    Approved,
    /// Provider reported the signer as revoked, failed or rejected
    Revoked,
    Unknown,
}

impl SignerStatus {
    /// Map a provider status string. Unrecognised or empty strings yield
    /// `None` so they never move the local status.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generated" => Some(SignerStatus::Generated),
            "pending_approval" => Some(SignerStatus::PendingApproval),
            "approved" => Some(SignerStatus::Approved),
            "revoked" | "failed" | "rejected" => Some(SignerStatus::Revoked),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignerStatus::Generated => "generated",
            SignerStatus::PendingApproval => "pending_approval",
            SignerStatus::Approved => "approved",
            SignerStatus::Revoked => "revoked",
            SignerStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SignerStatus::Approved)
    }
}

impl fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-managed signer owned by the current flow session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub id: String,
    #[serde(default)]
    pub public_key: String,
    pub status: SignerStatus,
    #[serde(default)]
    pub approval_url: Option<String>,
    #[serde(default)]
    pub owner_fid: Option<u64>,
}

/// What the provider reported about one signer in a single response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerUpdate {
    /// Id the response is keyed to; may differ from the id that was sent
    pub id: String,
    pub public_key: Option<String>,
    pub status: Option<SignerStatus>,
    pub approval_url: Option<String>,
    pub fid: Option<u64>,
}

impl SignerUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: SignerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_approval_url(mut self, url: impl Into<String>) -> Self {
        self.approval_url = Some(url.into());
        self
    }

    pub fn with_fid(mut self, fid: u64) -> Self {
        self.fid = Some(fid);
        self
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

impl Signer {
    pub fn generated(id: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public_key: public_key.into(),
            status: SignerStatus::Generated,
            approval_url: None,
            owner_fid: None,
        }
    }

    /// Approval deep link, if one has ever been obtained
    pub fn approval_url(&self) -> Option<&str> {
        non_empty(self.approval_url.as_deref())
    }

    pub fn is_approved(&self) -> bool {
        self.status == SignerStatus::Approved
    }

    /// Fold a provider response into this record.
    ///
    /// A populated approval URL is only ever replaced by another non-empty
    /// URL. Status moves only on an explicit status, and never leaves
    /// `Approved`. The owner fid is taken only once the signer is approved.
    /// Returns `true` when the status changed.
    pub fn merge(&mut self, update: &SignerUpdate) -> bool {
        if let Some(url) = non_empty(update.approval_url.as_deref()) {
            self.approval_url = Some(url.to_string());
        }

        if let Some(key) = non_empty(update.public_key.as_deref()) {
            self.public_key = key.to_string();
        }

        let previous = self.status;
        if let Some(status) = update.status {
            if previous != SignerStatus::Approved {
                self.status = status;
            }
        }

        if self.status == SignerStatus::Approved {
            if let Some(fid) = update.fid {
                self.owner_fid = Some(fid);
            }
        }

        self.status != previous
    }
}
