use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::signed_key::{AppSigner, SignedKeyRequest};
use super::types::{
    BulkUsersResponse, CustodyUserResponse, NeynarSigner, NeynarUser, OperationResponse,
    RegisterSignedKeyRequest, SignerEnvelope, Sponsor, UpdateProfileRequest,
};
use crate::config::NeynarConfig;
use crate::http::{ProviderError, RateLimitedHttpClient, RetryConfig, RetryHandler};
use crate::profile::ProfileApi;
use crate::signer::{Signer, SignerProvider, SignerStatus, SignerUpdate};

/// Neynar REST client for managed signers and user profiles
#[derive(Debug, Clone)]
pub struct NeynarClient {
    http: RateLimitedHttpClient,
    retry: RetryHandler,
    base_url: String,
    api_key: String,
    app_signer: Option<Arc<AppSigner>>,
    app_fid: Arc<OnceCell<u64>>,
    sponsor: bool,
    self_sponsor: bool,
}

impl NeynarClient {
    pub fn new(config: &NeynarConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::Config("NEYNAR_API_KEY is not set".to_string()))?;

        let app_signer = match config.app_private_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Some(Arc::new(AppSigner::from_hex(key)?)),
            _ => None,
        };

        let app_fid = Arc::new(OnceCell::new_with(config.app_fid));

        Ok(Self {
            http: RateLimitedHttpClient::new("neynar", config.requests_per_second)?,
            retry: RetryHandler::default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            app_signer,
            app_fid,
            sponsor: config.sponsor,
            self_sponsor: config.self_sponsor,
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = RetryHandler::new(retry);
        self
    }

    pub fn app_address(&self) -> Option<String> {
        self.app_signer.as_ref().map(|signer| signer.address())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .http()
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-api-key", &self.api_key)
            .header("accept", "application/json")
    }

    async fn create_signer_once(&self) -> Result<NeynarSigner, ProviderError> {
        self.http
            .send_json(self.request(Method::POST, "/signer"), None)
            .await
    }

    /// POST /signer
    pub async fn create_signer(&self) -> Result<Signer, ProviderError> {
        let created = self
            .retry
            .execute("create_signer", || self.create_signer_once())
            .await?;
        if created.signer_uuid.is_empty() {
            return Err(ProviderError::Decode {
                service: "neynar",
                reason: "signer response has no signer_uuid".to_string(),
            });
        }
        info!(signer_id = %created.signer_uuid, "Neynar signer created");
        Ok(Signer::from(created))
    }

    /// GET /signer?signer_uuid=
    pub async fn lookup_signer(&self, signer_uuid: &str) -> Result<NeynarSigner, ProviderError> {
        let request = self
            .request(Method::GET, "/signer")
            .query(&[("signer_uuid", signer_uuid)]);
        let envelope: SignerEnvelope = self.http.send_json(request, None).await?;
        Ok(envelope.into_inner())
    }

    /// POST /signer/signed_key
    pub async fn register_signed_key(
        &self,
        body: &RegisterSignedKeyRequest,
    ) -> Result<NeynarSigner, ProviderError> {
        self.retry
            .execute("register_signed_key", || {
                self.http
                    .send_json(self.request(Method::POST, "/signer/signed_key").json(body), None)
            })
            .await
    }

    /// GET /user/bulk?fids=
    pub async fn fetch_user(&self, fid: u64) -> Result<Option<NeynarUser>, ProviderError> {
        let cache_key = format!("user:{fid}");
        let response: BulkUsersResponse = self
            .retry
            .execute("fetch_user", || {
                let request = self
                    .request(Method::GET, "/user/bulk")
                    .query(&[("fids", fid.to_string())]);
                self.http.send_json(request, Some(cache_key.as_str()))
            })
            .await?;
        Ok(response.users.into_iter().find(|user| user.fid == fid))
    }

    /// GET /user/custody-address?custody_address=
    pub async fn lookup_user_by_custody_address(
        &self,
        custody_address: &str,
    ) -> Result<NeynarUser, ProviderError> {
        let cache_key = format!("custody:{}", custody_address.to_lowercase());
        let response: CustodyUserResponse = self
            .retry
            .execute("lookup_custody_address", || {
                let request = self
                    .request(Method::GET, "/user/custody-address")
                    .query(&[("custody_address", custody_address)]);
                self.http.send_json(request, Some(cache_key.as_str()))
            })
            .await?;
        Ok(response.user)
    }

    /// PATCH /user with a new profile picture
    pub async fn update_pfp(
        &self,
        signer_uuid: &str,
        pfp_url: &str,
        fid: u64,
    ) -> Result<OperationResponse, ProviderError> {
        let body = UpdateProfileRequest {
            signer_uuid: signer_uuid.to_string(),
            pfp_url: pfp_url.to_string(),
        };
        let response: OperationResponse = self
            .http
            .send_json(self.request(Method::PATCH, "/user").json(&body), None)
            .await?;
        self.http.invalidate(&format!("user:{fid}")).await;
        info!(fid, pfp_url, "Profile picture updated");
        Ok(response)
    }

    /// FID owning the app key, from config or looked up by custody address
    pub async fn app_fid(&self) -> Result<u64, ProviderError> {
        let app_signer = self.require_app_signer()?;
        self.app_fid
            .get_or_try_init(|| async {
                let address = app_signer.address();
                debug!(custody_address = %address, "Looking up app FID");
                let user = self.lookup_user_by_custody_address(&address).await?;
                Ok::<u64, ProviderError>(user.fid)
            })
            .await
            .copied()
    }

    fn require_app_signer(&self) -> Result<&AppSigner, ProviderError> {
        self.app_signer.as_deref().ok_or_else(|| {
            ProviderError::Config(
                "FARCASTER_APP_PRIVATE_KEY is required to register signers".to_string(),
            )
        })
    }

    /// Create a fresh signer, sign a key request for it with the app key
    /// and register it. The result carries the approval URL.
    pub async fn create_signed_key(&self) -> Result<NeynarSigner, ProviderError> {
        let app_signer = self.require_app_signer()?;
        let app_fid = self.app_fid().await?;
        let signer = self.create_signer().await?;

        let deadline = SignedKeyRequest::deadline_from(Utc::now());
        let request = SignedKeyRequest::new(app_fid, &signer.public_key, deadline)?;
        let signature = app_signer.sign_key_request(&request)?;

        let sponsor = match (self.sponsor, self.self_sponsor) {
            (false, _) => None,
            (true, false) => Some(Sponsor::neynar()),
            (true, true) => {
                let sponsor_signature = app_signer.sign_message(signature.as_bytes())?;
                Some(Sponsor::app(app_fid, sponsor_signature))
            }
        };

        debug!(
            signer_id = %signer.id,
            app_fid,
            deadline,
            sponsored = self.sponsor,
            self_sponsored = self.self_sponsor,
            "Registering signed key"
        );

        let body = RegisterSignedKeyRequest {
            signer_uuid: signer.id.clone(),
            app_fid,
            deadline,
            signature,
            sponsor,
        };
        let mut registered = self.register_signed_key(&body).await?;
        if registered.signer_uuid.is_empty() {
            registered.signer_uuid = signer.id;
        }
        Ok(registered)
    }
}

#[async_trait]
impl SignerProvider for NeynarClient {
    async fn create_signer(&self) -> Result<Signer, ProviderError> {
        NeynarClient::create_signer(self).await
    }

    async fn register_signer(&self, signer_id: &str) -> Result<SignerUpdate, ProviderError> {
        let registered = self.create_signed_key().await?;
        if registered.signer_uuid != signer_id {
            info!(
                requested_id = signer_id,
                signer_id = %registered.signer_uuid,
                "Registration issued a new signer"
            );
        }
        let mut update = SignerUpdate::from(registered);
        if update.status.is_none() {
            update.status = Some(SignerStatus::PendingApproval);
        }
        Ok(update)
    }

    async fn fetch_signer(&self, signer_id: &str) -> Result<SignerUpdate, ProviderError> {
        let signer = self.lookup_signer(signer_id).await?;
        let mut update = SignerUpdate::from(signer);
        if update.id.is_empty() {
            update.id = signer_id.to_string();
        }
        Ok(update)
    }

    async fn fetch_profile_picture(&self, fid: u64) -> Result<Option<String>, ProviderError> {
        match self.fetch_user(fid).await? {
            Some(user) => Ok(user.pfp_url.filter(|url| !url.is_empty())),
            None => {
                warn!(fid, "User not found");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ProfileApi for NeynarClient {
    async fn update_pfp(&self, signer_id: &str, pfp_url: &str, fid: u64) -> Result<(), ProviderError> {
        let response = NeynarClient::update_pfp(self, signer_id, pfp_url, fid).await?;
        if let Some(message) = response.message.filter(|m| !m.is_empty()) {
            debug!(fid, message = %message, "Profile update response");
        }
        Ok(())
    }

    async fn current_pfp(&self, fid: u64) -> Result<Option<String>, ProviderError> {
        SignerProvider::fetch_profile_picture(self, fid).await
    }
}
