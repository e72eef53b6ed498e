// Scripted provider for coordinator tests - no network

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::http::ProviderError;
use crate::signer::provider::SignerProvider;
use crate::signer::store::{MemorySignerStore, PersistedSigner, SignerStore, StoreError};
use crate::signer::types::{Signer, SignerStatus, SignerUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Create,
    Register(String),
    Fetch(String),
    Profile(u64),
}

/// One scripted answer to `fetch_signer`
pub enum FetchStep {
    Respond(Result<SignerUpdate, ProviderError>),
    /// Wait for the notify before answering
    Hold(Arc<Notify>, SignerUpdate),
    Panic,
}

/// Provider that answers from queues and records every call.
///
/// When the fetch script runs out, `steady` answers every poll; with no
/// steady answer the provider reports itself unavailable.
#[derive(Default)]
pub struct ScriptedProvider {
    creates: Mutex<VecDeque<Result<Signer, ProviderError>>>,
    registrations: Mutex<VecDeque<Result<SignerUpdate, ProviderError>>>,
    fetches: Mutex<VecDeque<FetchStep>>,
    steady: Mutex<Option<SignerUpdate>>,
    profile_picture: Mutex<Option<String>>,
    calls: Mutex<Vec<ProviderCall>>,
}

pub fn unavailable() -> ProviderError {
    ProviderError::Unavailable("scripted outage".to_string())
}

pub fn status_update(status: SignerStatus) -> SignerUpdate {
    SignerUpdate {
        status: Some(status),
        ..Default::default()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_create(&self, result: Result<Signer, ProviderError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn push_register(&self, result: Result<SignerUpdate, ProviderError>) {
        self.registrations.lock().unwrap().push_back(result);
    }

    pub fn push_fetch(&self, step: FetchStep) {
        self.fetches.lock().unwrap().push_back(step);
    }

    /// Answer every unscripted poll with `update`, keyed to the polled id
    pub fn set_steady(&self, update: Option<SignerUpdate>) {
        *self.steady.lock().unwrap() = update;
    }

    pub fn set_profile_picture(&self, url: &str) {
        *self.profile_picture.lock().unwrap() = Some(url.to_string());
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ProviderCall::Fetch(_)))
            .count()
    }

    pub fn fetches_for(&self, signer_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ProviderCall::Fetch(id) if id == signer_id))
            .count()
    }

    pub fn profile_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ProviderCall::Profile(_)))
            .count()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SignerProvider for ScriptedProvider {
    async fn create_signer(&self) -> Result<Signer, ProviderError> {
        self.record(ProviderCall::Create);
        self.creates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }

    async fn register_signer(&self, signer_id: &str) -> Result<SignerUpdate, ProviderError> {
        self.record(ProviderCall::Register(signer_id.to_string()));
        self.registrations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }

    async fn fetch_signer(&self, signer_id: &str) -> Result<SignerUpdate, ProviderError> {
        self.record(ProviderCall::Fetch(signer_id.to_string()));
        let step = self.fetches.lock().unwrap().pop_front();
        match step {
            Some(FetchStep::Respond(result)) => result,
            Some(FetchStep::Hold(notify, update)) => {
                notify.notified().await;
                Ok(update)
            }
            Some(FetchStep::Panic) => panic!("scripted provider panic"),
            None => {
                let steady = self.steady.lock().unwrap().clone();
                steady
                    .map(|update| SignerUpdate {
                        id: signer_id.to_string(),
                        ..update
                    })
                    .ok_or_else(unavailable)
            }
        }
    }

    async fn fetch_profile_picture(&self, fid: u64) -> Result<Option<String>, ProviderError> {
        self.record(ProviderCall::Profile(fid));
        Ok(self.profile_picture.lock().unwrap().clone())
    }
}

/// Memory store whose first save waits for `release`
pub struct GatedStore {
    pub inner: MemorySignerStore,
    pub release: Arc<Notify>,
    armed: AtomicBool,
}

impl GatedStore {
    pub fn with_signer(signer: &Signer) -> Self {
        Self {
            inner: MemorySignerStore::with_signer(signer).unwrap(),
            release: Arc::new(Notify::new()),
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SignerStore for GatedStore {
    async fn load(&self) -> Result<Option<PersistedSigner>, StoreError> {
        self.inner.load().await
    }

    async fn save(&self, signer: &Signer) -> Result<(), StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.inner.save(signer).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }
}
