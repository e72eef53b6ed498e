use serde::{Deserialize, Serialize};

use crate::signer::{Signer, SignerStatus, SignerUpdate};

/// Signer object as returned by the signer endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NeynarSigner {
    #[serde(default)]
    pub signer_uuid: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub signer_approval_url: Option<String>,
    #[serde(default)]
    pub fid: Option<u64>,
}

/// The signer lookup answers either with the object itself or wrapped
/// in `result`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignerEnvelope {
    Wrapped { result: NeynarSigner },
    Bare(NeynarSigner),
}

impl SignerEnvelope {
    pub fn into_inner(self) -> NeynarSigner {
        match self {
            SignerEnvelope::Wrapped { result } => result,
            SignerEnvelope::Bare(signer) => signer,
        }
    }
}

impl From<NeynarSigner> for SignerUpdate {
    fn from(signer: NeynarSigner) -> Self {
        SignerUpdate {
            status: signer.status.as_deref().and_then(SignerStatus::from_provider),
            id: signer.signer_uuid,
            public_key: signer.public_key,
            approval_url: signer.signer_approval_url,
            fid: signer.fid,
        }
    }
}

impl From<NeynarSigner> for Signer {
    fn from(signer: NeynarSigner) -> Self {
        let status = signer
            .status
            .as_deref()
            .and_then(SignerStatus::from_provider)
            .unwrap_or(SignerStatus::Generated);
        Signer {
            id: signer.signer_uuid,
            public_key: signer.public_key.unwrap_or_default(),
            status,
            approval_url: signer.signer_approval_url.filter(|url| !url.is_empty()),
            owner_fid: signer.fid.filter(|_| status == SignerStatus::Approved),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeynarUser {
    pub fid: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub pfp_url: Option<String>,
    #[serde(default)]
    pub custody_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkUsersResponse {
    #[serde(default)]
    pub users: Vec<NeynarUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustodyUserResponse {
    pub user: NeynarUser,
}

/// Who pays for the on-chain key registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sponsor {
    pub sponsored_by_neynar: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fid: Option<u64>,
}

impl Sponsor {
    pub fn neynar() -> Self {
        Self {
            sponsored_by_neynar: true,
            signature: None,
            fid: None,
        }
    }

    pub fn app(fid: u64, signature: String) -> Self {
        Self {
            sponsored_by_neynar: false,
            signature: Some(signature),
            fid: Some(fid),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterSignedKeyRequest {
    pub signer_uuid: String,
    pub app_fid: u64,
    pub deadline: u64,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<Sponsor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateProfileRequest {
    pub signer_uuid: String,
    pub pfp_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_accepts_both_shapes() {
        let wrapped: SignerEnvelope = serde_json::from_str(
            r#"{"result":{"signer_uuid":"abc","status":"approved","fid":77}}"#,
        )
        .unwrap();
        let bare: SignerEnvelope =
            serde_json::from_str(r#"{"signer_uuid":"abc","status":"pending_approval"}"#).unwrap();

        let wrapped = SignerUpdate::from(wrapped.into_inner());
        assert_eq!(wrapped.id, "abc");
        assert_eq!(wrapped.status, Some(SignerStatus::Approved));
        assert_eq!(wrapped.fid, Some(77));

        let bare = SignerUpdate::from(bare.into_inner());
        assert_eq!(bare.status, Some(SignerStatus::PendingApproval));
    }

    #[test]
    fn test_unknown_status_maps_to_none() {
        let signer: NeynarSigner =
            serde_json::from_str(r#"{"signer_uuid":"abc","status":"mystery"}"#).unwrap();
        assert_eq!(SignerUpdate::from(signer).status, None);
    }

    #[test]
    fn test_neynar_sponsor_serialization() {
        let body = serde_json::to_value(Sponsor::neynar()).unwrap();
        assert_eq!(body, serde_json::json!({"sponsored_by_neynar": true}));

        let body = serde_json::to_value(Sponsor::app(9, "0xsig".into())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"sponsored_by_neynar": false, "signature": "0xsig", "fid": 9})
        );
    }
}
