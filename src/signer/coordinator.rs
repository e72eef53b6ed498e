use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument, Span};

use super::provider::SignerProvider;
use super::store::{SignerStore, StoreError};
use super::types::{Signer, SignerStatus, SignerUpdate};
use crate::config::SignerConfig;
use crate::http::ProviderError;
use crate::observability::{create_flow_span, provider_metrics};

const MIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Failed to create signer: {0}")]
    Create(#[source] ProviderError),

    #[error("Failed to register signer: {0}")]
    Registration(#[source] ProviderError),

    #[error("Registration of signer {signer_id} returned no approval URL")]
    MissingApprovalUrl { signer_id: String },

    #[error("Signer {signer_id} was superseded while the request was in flight")]
    Superseded { signer_id: String },

    #[error("Signer store error: {0}")]
    Store(#[from] StoreError),

    #[error("No signer in the current flow")]
    NoSigner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub health_check_interval: Duration,
    /// Consecutive poll failures before the provider is reported unreachable
    pub error_threshold: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(5),
            error_threshold: 10,
        }
    }
}

impl From<&SignerConfig> for CoordinatorConfig {
    fn from(config: &SignerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            health_check_interval: Duration::from_millis(config.health_check_interval_ms),
            error_threshold: config.error_threshold,
        }
    }
}

/// What the user can do about a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    CreateSigner,
    RetryRegistration,
    RescanApproval,
}

/// User-facing event published on the flow's watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowNotice {
    SignerCreated { signer_id: String },
    AwaitingApproval { approval_url: String },
    Approved { fid: Option<u64> },
    CreateFailed { reason: String },
    RegistrationFailed { reason: String },
    SignerRejected,
    ProviderUnreachable { consecutive_errors: u32 },
    Reset,
}

impl FlowNotice {
    pub fn retry_action(&self) -> Option<RetryAction> {
        match self {
            FlowNotice::CreateFailed { .. } => Some(RetryAction::CreateSigner),
            FlowNotice::RegistrationFailed { .. } => Some(RetryAction::RetryRegistration),
            FlowNotice::SignerRejected | FlowNotice::ProviderUnreachable { .. } => {
                Some(RetryAction::RescanApproval)
            }
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.retry_action().is_some()
    }
}

impl fmt::Display for FlowNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowNotice::SignerCreated { signer_id } => write!(f, "Signer {signer_id} created"),
            FlowNotice::AwaitingApproval { approval_url } => {
                write!(f, "Waiting for approval: {approval_url}")
            }
            FlowNotice::Approved { fid: Some(fid) } => write!(f, "Signer approved for FID {fid}"),
            FlowNotice::Approved { fid: None } => write!(f, "Signer approved"),
            FlowNotice::CreateFailed { reason } => write!(f, "Could not create signer: {reason}"),
            FlowNotice::RegistrationFailed { reason } => {
                write!(f, "Could not get an approval link: {reason}")
            }
            FlowNotice::SignerRejected => {
                write!(f, "Signer was rejected. Scan the approval link again or start over")
            }
            FlowNotice::ProviderUnreachable { consecutive_errors } => write!(
                f,
                "Cannot reach the signer service ({consecutive_errors} failed checks), still retrying"
            ),
            FlowNotice::Reset => write!(f, "Flow reset"),
        }
    }
}

/// Point-in-time view of the flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub signer: Option<Signer>,
    pub notice: Option<FlowNotice>,
    pub polling: bool,
    pub consecutive_errors: u32,
    pub current_pfp_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep ticking
    Continue,
    /// The tick belonged to a superseded generation or id
    Stale,
    /// Signer is approved; polling is over
    Finished,
    /// No signer to poll
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Restarted { signer_id: String },
    Idle,
    Finished,
}

#[derive(Debug)]
struct PollTask {
    signer_id: String,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct FlowSession {
    signer: Option<Signer>,
    authoritative_id: Option<String>,
    generation: u64,
    poll_task: Option<PollTask>,
    supervisor_task: Option<JoinHandle<()>>,
    consecutive_errors: u32,
    approval_handled: bool,
    current_pfp_url: Option<String>,
    notice: Option<FlowNotice>,
    polls_started: u64,
}

impl FlowSession {
    fn is_polling(&self) -> bool {
        self.poll_task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    fn is_current(&self, signer_id: &str, generation: u64) -> bool {
        self.generation == generation && self.authoritative_id.as_deref() == Some(signer_id)
    }

    fn approval_url(&self) -> Option<String> {
        self.signer
            .as_ref()
            .and_then(|s| s.approval_url())
            .map(str::to_string)
    }

    /// Point the session signer at `signer_id`. A different id starts over
    /// as `Generated` with no fid, keeping the approval link.
    fn rekey_signer(&mut self, signer_id: &str) -> bool {
        let Some(signer) = self.signer.as_mut() else {
            return false;
        };
        if signer.id == signer_id {
            return false;
        }
        info!(previous_id = %signer.id, signer_id, "Re-keying session signer");
        *signer = Signer {
            id: signer_id.to_string(),
            public_key: signer.public_key.clone(),
            status: SignerStatus::Generated,
            approval_url: signer.approval_url.take(),
            owner_fid: None,
        };
        self.approval_handled = false;
        self.current_pfp_url = None;
        true
    }

    /// Forget the poll task without aborting it. The task sees the new
    /// generation on its next tick and exits.
    fn detach_poll_task(&mut self) {
        self.poll_task = None;
        self.generation += 1;
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.handle.abort();
        }
        if let Some(supervisor) = self.supervisor_task.take() {
            supervisor.abort();
        }
        self.generation += 1;
    }

    fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            signer: self.signer.clone(),
            notice: self.notice.clone(),
            polling: self.is_polling(),
            consecutive_errors: self.consecutive_errors,
            current_pfp_url: self.current_pfp_url.clone(),
        }
    }
}

struct Inner {
    provider: Arc<dyn SignerProvider>,
    store: Arc<dyn SignerStore>,
    config: CoordinatorConfig,
    session: Mutex<FlowSession>,
    persist_lock: Mutex<()>,
    snapshot_tx: watch::Sender<FlowSnapshot>,
    span: Span,
}

/// Drives a managed signer from creation to approval.
///
/// Cloning yields another handle to the same flow. Background tasks hold
/// only weak references; dropping the last handle cancels them.
#[derive(Clone)]
pub struct SignerCoordinator {
    inner: Arc<Inner>,
}

impl SignerCoordinator {
    pub fn new(
        provider: Arc<dyn SignerProvider>,
        store: Arc<dyn SignerStore>,
        config: CoordinatorConfig,
    ) -> Self {
        let flow_id = uuid::Uuid::new_v4().to_string();
        let (snapshot_tx, _) = watch::channel(FlowSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                config,
                session: Mutex::new(FlowSession::default()),
                persist_lock: Mutex::new(()),
                snapshot_tx,
                span: create_flow_span(&flow_id),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Create a new signer and immediately try to register it.
    ///
    /// A registration failure is not fatal: the signer is kept, polling
    /// starts, and a `RegistrationFailed` notice offers a retry.
    pub async fn create(&self) -> Result<Signer, CoordinatorError> {
        let span = self.inner.span.clone();
        self.inner.create().instrument(span).await
    }

    /// Request an approval URL for `signer_id`, adopting whatever id the
    /// provider answers with.
    pub async fn register(&self, signer_id: &str) -> Result<Signer, CoordinatorError> {
        let span = self.inner.span.clone();
        self.inner.register(signer_id).instrument(span).await
    }

    /// Re-run registration for the current signer
    pub async fn retry_registration(&self) -> Result<Signer, CoordinatorError> {
        let signer_id = {
            let session = self.inner.session.lock().await;
            session
                .authoritative_id
                .clone()
                .or_else(|| session.signer.as_ref().map(|s| s.id.clone()))
                .ok_or(CoordinatorError::NoSigner)?
        };
        info!(signer_id = %signer_id, "Retrying signer registration");
        self.register(&signer_id).await
    }

    /// Start polling `signer_id`. Returns `false` when a live poll task for
    /// that id already exists.
    pub async fn start_polling(&self, signer_id: &str) -> bool {
        let mut session = self.inner.session.lock().await;
        let rekeyed = if session.signer.is_none() {
            session.signer = Some(Signer::generated(signer_id, ""));
            false
        } else {
            session.rekey_signer(signer_id)
        };
        let started = self.inner.start_polling_locked(&mut session, signer_id);
        self.inner.publish(&session);
        drop(session);

        if rekeyed {
            self.inner.persist().await;
        }
        started
    }

    pub async fn stop_polling(&self) {
        let mut session = self.inner.session.lock().await;
        let was_polling = session.is_polling();
        session.abort_tasks();
        self.inner.publish(&session);
        if was_polling {
            info!(generation = session.generation, "Polling stopped");
        }
    }

    /// Run one poll cycle against the current authoritative id
    pub async fn poll_once(&self) -> PollOutcome {
        let current = {
            let session = self.inner.session.lock().await;
            session
                .authoritative_id
                .clone()
                .map(|id| (id, session.generation))
        };
        match current {
            Some((signer_id, generation)) => {
                let span = self.inner.span.clone();
                self.inner
                    .poll_cycle(&signer_id, generation)
                    .instrument(span)
                    .await
            }
            None => PollOutcome::Idle,
        }
    }

    /// Resume the flow from the persisted record, if any.
    pub async fn recover_from_storage(&self) -> Result<Option<Signer>, CoordinatorError> {
        let span = self.inner.span.clone();
        self.inner.recover_from_storage().instrument(span).await
    }

    /// Restart polling when a pending signer has no live poll task
    pub async fn health_check(&self) -> HealthStatus {
        let span = self.inner.span.clone();
        self.inner.health_check().instrument(span).await
    }

    /// Stop everything, forget the signer and delete the persisted record
    pub async fn reset(&self) -> Result<(), CoordinatorError> {
        let _guard = self.inner.persist_lock.lock().await;
        {
            let mut session = self.inner.session.lock().await;
            session.abort_tasks();
            let generation = session.generation;
            let polls_started = session.polls_started;
            *session = FlowSession {
                generation,
                polls_started,
                notice: Some(FlowNotice::Reset),
                ..Default::default()
            };
            self.inner.publish(&session);
        }
        self.inner.store.clear().await?;
        info!("Approval flow reset");
        Ok(())
    }

    /// Cancel the poll task and the supervisor together
    pub async fn shutdown(&self) {
        let mut session = self.inner.session.lock().await;
        session.abort_tasks();
        self.inner.publish(&session);
        debug!("Signer coordinator shut down");
    }

    pub async fn signer(&self) -> Option<Signer> {
        self.inner.session.lock().await.signer.clone()
    }

    pub async fn is_polling(&self) -> bool {
        self.inner.session.lock().await.is_polling()
    }

    /// Number of poll tasks spawned over the coordinator's lifetime
    pub async fn polls_started(&self) -> u64 {
        self.inner.session.lock().await.polls_started
    }
}

impl Inner {
    fn publish(&self, session: &FlowSession) {
        self.snapshot_tx.send_replace(session.snapshot());
    }

    /// Save the session signer as it is now. Writes are serialized, and an
    /// empty session writes nothing.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let Some(signer) = self.session.lock().await.signer.clone() else {
            debug!("No session signer to persist");
            return;
        };
        if let Err(e) = self.store.save(&signer).await {
            warn!(signer_id = %signer.id, error = %e, "Failed to persist signer");
        }
    }

    async fn create(self: &Arc<Self>) -> Result<Signer, CoordinatorError> {
        info!("Creating signer");
        let signer = match self.provider.create_signer().await {
            Ok(signer) => signer,
            Err(e) => {
                error!(error = %e, "Signer creation failed");
                let mut session = self.session.lock().await;
                session.notice = Some(FlowNotice::CreateFailed {
                    reason: e.to_string(),
                });
                self.publish(&session);
                return Err(CoordinatorError::Create(e));
            }
        };

        {
            let mut session = self.session.lock().await;
            session.abort_tasks();
            session.signer = Some(signer.clone());
            session.authoritative_id = Some(signer.id.clone());
            session.consecutive_errors = 0;
            session.approval_handled = false;
            session.current_pfp_url = None;
            session.notice = Some(FlowNotice::SignerCreated {
                signer_id: signer.id.clone(),
            });
            self.publish(&session);
        }
        info!(signer_id = %signer.id, "Signer created");
        self.persist().await;

        match self.register(&signer.id).await {
            Ok(registered) => Ok(registered),
            Err(e) => {
                warn!(signer_id = %signer.id, error = %e, "Registration failed after create, polling anyway");
                let mut session = self.session.lock().await;
                if session.signer.is_some() {
                    if let Some(signer_id) = session.authoritative_id.clone() {
                        self.start_polling_locked(&mut session, &signer_id);
                        self.publish(&session);
                    }
                }
                Ok(session.signer.clone().unwrap_or(signer))
            }
        }
    }

    async fn register(self: &Arc<Self>, signer_id: &str) -> Result<Signer, CoordinatorError> {
        info!(signer_id, "Registering signer for approval");
        let result = self.provider.register_signer(signer_id).await;

        let mut session = self.session.lock().await;
        let superseded = session.authoritative_id.as_deref() != Some(signer_id)
            || session.signer.as_ref().map_or(true, |s| s.is_approved());
        if superseded {
            provider_metrics().record_stale_response();
            debug!(signer_id, "Discarding registration result for superseded signer");
            return Err(CoordinatorError::Superseded {
                signer_id: signer_id.to_string(),
            });
        }

        let update = match result {
            Ok(update) => update,
            Err(e) => {
                warn!(signer_id, error = %e, "Signer registration failed");
                session.notice = Some(FlowNotice::RegistrationFailed {
                    reason: e.to_string(),
                });
                self.publish(&session);
                return Err(CoordinatorError::Registration(e));
            }
        };

        let adopted_id = if update.id.trim().is_empty() {
            signer_id.to_string()
        } else {
            update.id.clone()
        };

        session.rekey_signer(&adopted_id);
        let registered = {
            let Some(signer) = session.signer.as_mut() else {
                return Err(CoordinatorError::NoSigner);
            };
            let has_url = update
                .approval_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty());
            let update = SignerUpdate {
                id: adopted_id.clone(),
                status: update
                    .status
                    .or(has_url.then_some(SignerStatus::PendingApproval)),
                ..update
            };
            signer.merge(&update);
            signer.clone()
        };

        self.start_polling_locked(&mut session, &adopted_id);

        let result = match registered.approval_url() {
            Some(url) => {
                info!(signer_id = %adopted_id, status = %registered.status, "Signer registered, awaiting approval");
                session.notice = Some(FlowNotice::AwaitingApproval {
                    approval_url: url.to_string(),
                });
                Ok(registered.clone())
            }
            None => {
                warn!(signer_id = %adopted_id, "Registration returned no approval URL");
                session.notice = Some(FlowNotice::RegistrationFailed {
                    reason: "no approval URL returned".to_string(),
                });
                Err(CoordinatorError::MissingApprovalUrl {
                    signer_id: adopted_id.clone(),
                })
            }
        };
        self.publish(&session);
        drop(session);

        self.persist().await;
        result
    }

    fn start_polling_locked(self: &Arc<Self>, session: &mut FlowSession, signer_id: &str) -> bool {
        if let Some(task) = &session.poll_task {
            if task.signer_id == signer_id
                && !task.handle.is_finished()
                && session.authoritative_id.as_deref() == Some(signer_id)
            {
                debug!(signer_id, "Poll task already running");
                return false;
            }
        }

        session.detach_poll_task();
        session.authoritative_id = Some(signer_id.to_string());
        session.consecutive_errors = 0;

        let handle = self.spawn_poll_task(signer_id.to_string(), session.generation);
        session.poll_task = Some(PollTask {
            signer_id: signer_id.to_string(),
            handle,
        });
        session.polls_started += 1;

        if !session
            .supervisor_task
            .as_ref()
            .is_some_and(|supervisor| !supervisor.is_finished())
        {
            session.supervisor_task = Some(self.spawn_supervisor());
        }

        info!(signer_id, generation = session.generation, "Polling started");
        true
    }

    fn spawn_poll_task(self: &Arc<Self>, signer_id: String, generation: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.poll_interval.max(MIN_INTERVAL);

        tokio::spawn(
            async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    match inner.poll_cycle(&signer_id, generation).await {
                        PollOutcome::Continue => {}
                        outcome => {
                            debug!(signer_id = %signer_id, generation, ?outcome, "Poll task exiting");
                            break;
                        }
                    }
                }
            }
            .instrument(self.span.clone()),
        )
    }

    fn spawn_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.health_check_interval.max(MIN_INTERVAL);

        tokio::spawn(
            async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if inner.health_check().await == HealthStatus::Finished {
                        break;
                    }
                }
            }
            .instrument(self.span.clone()),
        )
    }

    async fn poll_cycle(self: &Arc<Self>, signer_id: &str, generation: u64) -> PollOutcome {
        {
            let session = self.session.lock().await;
            if !session.is_current(signer_id, generation) {
                return PollOutcome::Stale;
            }
            match &session.signer {
                None => return PollOutcome::Idle,
                Some(signer) if signer.is_approved() => return PollOutcome::Finished,
                Some(_) => {}
            }
        }

        let result = self.provider.fetch_signer(signer_id).await;

        let mut session = self.session.lock().await;
        if !session.is_current(signer_id, generation) {
            provider_metrics().record_stale_response();
            debug!(signer_id, generation, "Discarding response for superseded poll");
            return PollOutcome::Stale;
        }

        let update = match result {
            Ok(update) => update,
            Err(e) => {
                self.record_poll_error(&mut session, signer_id, &e);
                return PollOutcome::Continue;
            }
        };

        if !update.id.is_empty() && update.id != signer_id {
            provider_metrics().record_stale_response();
            warn!(signer_id, response_id = %update.id, "Discarding response keyed to another signer");
            return PollOutcome::Continue;
        }

        if session.consecutive_errors > 0 {
            info!(signer_id, after_errors = session.consecutive_errors, "Signer status poll recovered");
            session.consecutive_errors = 0;
        }
        if matches!(session.notice, Some(FlowNotice::ProviderUnreachable { .. })) {
            session.notice = session
                .approval_url()
                .map(|approval_url| FlowNotice::AwaitingApproval { approval_url });
        }

        let Some(signer) = session.signer.as_mut() else {
            return PollOutcome::Idle;
        };
        let changed = signer.merge(&update);
        let current = signer.clone();
        if changed {
            info!(signer_id, status = %current.status, "Signer status changed");
        }

        match current.status {
            SignerStatus::Approved => {
                let fire = self.approve_locked(&mut session);
                drop(session);
                self.persist().await;
                if fire {
                    self.run_approval_side_effect(current.owner_fid).await;
                }
                return PollOutcome::Finished;
            }
            SignerStatus::Revoked if changed => {
                warn!(signer_id, "Signer was rejected, keeping approval link");
                session.notice = Some(FlowNotice::SignerRejected);
            }
            SignerStatus::PendingApproval if changed => {
                if let Some(url) = current.approval_url() {
                    session.notice = Some(FlowNotice::AwaitingApproval {
                        approval_url: url.to_string(),
                    });
                }
            }
            _ => {}
        }
        self.publish(&session);
        drop(session);

        if changed {
            self.persist().await;
        }

        if update.status == Some(SignerStatus::Generated) {
            info!(signer_id, "Signer still generated, registering before next tick");
            if let Err(e) = self.register(signer_id).await {
                warn!(signer_id, error = %e, "Inline registration failed");
            }
            let session = self.session.lock().await;
            if !session.is_current(signer_id, generation) {
                return PollOutcome::Stale;
            }
        }

        PollOutcome::Continue
    }

    fn record_poll_error(&self, session: &mut FlowSession, signer_id: &str, err: &ProviderError) {
        session.consecutive_errors += 1;
        let consecutive_errors = session.consecutive_errors;

        if consecutive_errors >= self.config.error_threshold {
            warn!(signer_id, consecutive_errors, error = %err, "Signer status provider unreachable");
            session.notice = Some(FlowNotice::ProviderUnreachable { consecutive_errors });
        } else {
            debug!(signer_id, consecutive_errors, error = %err, "Signer status poll failed");
        }
        self.publish(session);
    }

    /// Stop both tasks and mark the flow approved. Returns whether the
    /// profile side effect still has to run.
    fn approve_locked(&self, session: &mut FlowSession) -> bool {
        session.detach_poll_task();
        if let Some(supervisor) = session.supervisor_task.take() {
            supervisor.abort();
        }
        session.consecutive_errors = 0;

        let fid = session.signer.as_ref().and_then(|s| s.owner_fid);
        session.notice = Some(FlowNotice::Approved { fid });
        let fire = fid.is_some() && !session.approval_handled;
        if fire {
            session.approval_handled = true;
        }
        self.publish(session);
        info!(fid = ?fid, "Signer approved");
        fire
    }

    async fn run_approval_side_effect(&self, fid: Option<u64>) {
        let Some(fid) = fid else {
            return;
        };

        match self.provider.fetch_profile_picture(fid).await {
            Ok(pfp_url) => {
                let mut session = self.session.lock().await;
                let same_flow = session
                    .signer
                    .as_ref()
                    .is_some_and(|s| s.is_approved() && s.owner_fid == Some(fid));
                if same_flow {
                    debug!(fid, pfp_url = ?pfp_url, "Fetched current profile picture");
                    session.current_pfp_url = pfp_url;
                    self.publish(&session);
                }
            }
            Err(e) => warn!(fid, error = %e, "Failed to fetch current profile picture"),
        }
    }

    async fn recover_from_storage(self: &Arc<Self>) -> Result<Option<Signer>, CoordinatorError> {
        let Some(record) = self.store.load().await? else {
            debug!("No signer to recover");
            return Ok(None);
        };

        let mut signer = record.signer;
        info!(signer_id = %signer.id, status = %signer.status, saved_at = %record.saved_at, "Recovering signer from storage");

        let needs_reconcile = signer.status == SignerStatus::Unknown
            || (signer.is_approved() && signer.owner_fid.is_none());
        if needs_reconcile {
            match self.provider.fetch_signer(&signer.id).await {
                Ok(update) if update.id.is_empty() || update.id == signer.id => {
                    signer.merge(&update);
                }
                Ok(update) => {
                    warn!(signer_id = %signer.id, response_id = %update.id, "Reconciliation answered for another signer");
                }
                Err(e) => {
                    warn!(signer_id = %signer.id, error = %e, "Reconciliation fetch failed");
                    signer.status = fallback_status(&signer);
                }
            }
            if signer.status == SignerStatus::Unknown {
                signer.status = fallback_status(&signer);
            }
        }

        let mut session = self.session.lock().await;
        let keep_session = session
            .signer
            .as_ref()
            .is_some_and(|current| current.id == signer.id);
        if !keep_session {
            session.signer = Some(signer.clone());
            session.authoritative_id = Some(signer.id.clone());
            session.approval_handled = false;
        }
        let current = session.signer.clone().unwrap_or(signer);
        let signer_id = session
            .authoritative_id
            .clone()
            .unwrap_or_else(|| current.id.clone());

        let fire = match current.status {
            SignerStatus::Approved => self.approve_locked(&mut session),
            SignerStatus::Revoked => {
                session.notice = Some(FlowNotice::SignerRejected);
                self.publish(&session);
                false
            }
            SignerStatus::PendingApproval | SignerStatus::Generated | SignerStatus::Unknown => {
                if let Some(url) = current.approval_url() {
                    session.notice = Some(FlowNotice::AwaitingApproval {
                        approval_url: url.to_string(),
                    });
                }
                self.start_polling_locked(&mut session, &signer_id);
                self.publish(&session);
                false
            }
        };
        drop(session);

        if needs_reconcile {
            self.persist().await;
        }
        if fire {
            self.run_approval_side_effect(current.owner_fid).await;
        }

        Ok(Some(current))
    }

    async fn health_check(self: &Arc<Self>) -> HealthStatus {
        let mut session = self.session.lock().await;
        if session.is_polling() {
            return HealthStatus::Healthy;
        }

        match session.signer.as_ref().map(|s| (s.status, s.id.clone())) {
            Some((SignerStatus::Approved, _)) => return HealthStatus::Finished,
            Some((SignerStatus::PendingApproval, id)) => {
                let signer_id = session.authoritative_id.clone().unwrap_or(id);
                warn!(signer_id = %signer_id, "Poll task not running, restarting");
                self.start_polling_locked(&mut session, &signer_id);
                self.publish(&session);
                return HealthStatus::Restarted { signer_id };
            }
            Some(_) => return HealthStatus::Idle,
            None => {}
        }
        drop(session);

        let record = match self.store.load().await {
            Ok(Some(record)) => record,
            Ok(None) => return HealthStatus::Idle,
            Err(e) => {
                warn!(error = %e, "Health check could not read persisted signer");
                return HealthStatus::Idle;
            }
        };
        if record.signer.status != SignerStatus::PendingApproval {
            return HealthStatus::Idle;
        }

        let mut session = self.session.lock().await;
        if session.signer.is_some() {
            return HealthStatus::Idle;
        }
        let signer_id = record.signer.id.clone();
        warn!(signer_id = %signer_id, "Restarting polling from persisted signer");
        if let Some(url) = record.signer.approval_url() {
            session.notice = Some(FlowNotice::AwaitingApproval {
                approval_url: url.to_string(),
            });
        }
        session.signer = Some(record.signer);
        self.start_polling_locked(&mut session, &signer_id);
        self.publish(&session);
        HealthStatus::Restarted { signer_id }
    }
}

/// Status assumed for a record whose provider state could not be confirmed
fn fallback_status(signer: &Signer) -> SignerStatus {
    if signer.approval_url().is_some() {
        SignerStatus::PendingApproval
    } else {
        SignerStatus::Generated
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.session.get_mut().abort_tasks();
    }
}
