use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::machine::{FailureKind, PipelineMachine, PipelineSnapshot, Stage, Ticket, TransitionError};
use super::review::MenuItemEdit;
use crate::{
    ai::{FoodDetector, NutritionAnalyzer},
    error::AppError,
    media::{self, MediaUploader, UploadFile},
    scans::{
        model::{NutritionField, Scan, ScanDraft},
        store::ScanStore,
    },
    storage::StorageClient,
};

/// One user's pipeline: the state machine plus that user's upload adapter.
struct PipelineSession {
    machine: PipelineMachine,
    uploader: Arc<MediaUploader>,
}

/// Runs upload -> detection -> nutrition -> review -> save, one machine per user.
///
/// Session entries are never held across an `.await`; each step re-enters the map
/// and applies its result only if its ticket is still current. The network part of
/// a run or save executes in its own task, so a dropped request still settles it.
#[derive(Clone)]
pub struct ScanPipeline {
    sessions: Arc<DashMap<Uuid, PipelineSession>>,
    /// Highest sequence of any evicted session. New sessions start above it.
    seq_floor: Arc<AtomicU64>,
    storage: Arc<dyn StorageClient>,
    detector: Arc<dyn FoodDetector>,
    nutrition: Arc<dyn NutritionAnalyzer>,
    store: Arc<dyn ScanStore>,
}

/// Awaits a spawned step; the task keeps running if the caller goes away.
async fn detached<T>(task: JoinHandle<Result<T, AppError>>) -> Result<T, AppError> {
    task.await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("scan task")))?
}

impl ScanPipeline {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        detector: Arc<dyn FoodDetector>,
        nutrition: Arc<dyn NutritionAnalyzer>,
        store: Arc<dyn ScanStore>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            seq_floor: Arc::new(AtomicU64::new(0)),
            storage,
            detector,
            nutrition,
            store,
        }
    }

    fn with_session<R>(&self, user_id: Uuid, f: impl FnOnce(&mut PipelineSession) -> R) -> R {
        let mut entry = self.sessions.entry(user_id).or_insert_with(|| PipelineSession {
            machine: PipelineMachine::starting_after(self.seq_floor.load(Ordering::Acquire)),
            uploader: Arc::new(MediaUploader::new(self.storage.clone())),
        });
        f(entry.value_mut())
    }

    fn with_machine<R>(&self, user_id: Uuid, f: impl FnOnce(&mut PipelineMachine) -> R) -> R {
        self.with_session(user_id, |s| f(&mut s.machine))
    }

    /// Applies a step result. A missing session means the run was abandoned.
    fn apply<R>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut PipelineMachine) -> Result<R, TransitionError>,
    ) -> Result<R, TransitionError> {
        match self.sessions.get_mut(&user_id) {
            Some(mut s) => f(&mut s.machine),
            None => Err(TransitionError::Stale),
        }
    }

    /// Drops an idle session. Its sequence is folded into the floor first.
    fn evict_if_idle(&self, user_id: Uuid) {
        let evicted = self.sessions.remove_if(&user_id, |_, s| {
            let idle = s.machine.stage() == Stage::Idle && !s.uploader.is_uploading();
            if idle {
                self.seq_floor.fetch_max(s.machine.seq(), Ordering::AcqRel);
            }
            idle
        });
        if evicted.is_some() {
            debug!(%user_id, "idle pipeline session evicted");
        }
    }

    pub fn snapshot(&self, user_id: Uuid) -> PipelineSnapshot {
        self.sessions
            .get(&user_id)
            .map(|s| s.machine.snapshot())
            .unwrap_or_else(|| {
                PipelineMachine::starting_after(self.seq_floor.load(Ordering::Acquire)).snapshot()
            })
    }

    pub fn draft(&self, user_id: Uuid) -> Option<ScanDraft> {
        self.sessions
            .get(&user_id)
            .and_then(|s| s.machine.draft().cloned())
    }

    fn record_failure(&self, user_id: Uuid, ticket: Ticket, kind: FailureKind, err: &AppError) {
        match self.apply(user_id, |m| m.fail(ticket, kind, err.to_string())) {
            Ok(()) => warn!(%user_id, seq = ticket.seq(), ?kind, error = %err, "scan run failed"),
            Err(e) => debug!(%user_id, seq = ticket.seq(), error = %e, "dropping late failure"),
        }
    }

    /// Full run from a client file. Validation happens before any state change.
    #[instrument(skip(self, file), fields(file = %file.file_name))]
    pub async fn run_upload(
        &self,
        user_id: Uuid,
        file: UploadFile,
    ) -> Result<PipelineSnapshot, AppError> {
        media::validate(&file)?;
        let (ticket, uploader) = self.with_session(user_id, |s| {
            s.machine.begin_upload().map(|t| (t, s.uploader.clone()))
        })?;
        info!(%user_id, seq = ticket.seq(), "scan run started");

        let this = self.clone();
        detached(tokio::spawn(
            async move {
                let image_url = match uploader.upload(file).await {
                    Ok(url) => url,
                    Err(e) => {
                        this.record_failure(user_id, ticket, FailureKind::Upload, &e);
                        return Err(e);
                    }
                };
                this.apply(user_id, |m| m.upload_succeeded(ticket, image_url.clone()))?;
                this.detect_and_analyze(user_id, ticket, image_url).await
            }
            .in_current_span(),
        ))
        .await
    }

    /// Run that starts at detection for an image already in storage.
    #[instrument(skip(self))]
    pub async fn run_analysis(
        &self,
        user_id: Uuid,
        image_url: String,
    ) -> Result<PipelineSnapshot, AppError> {
        if image_url.trim().is_empty() {
            return Err(AppError::Validation("Image URL is required".into()));
        }
        let ticket = self.with_machine(user_id, |m| m.begin_analysis(image_url.clone()))?;
        info!(%user_id, seq = ticket.seq(), "analysis run started");

        let this = self.clone();
        detached(tokio::spawn(
            async move { this.detect_and_analyze(user_id, ticket, image_url).await }
                .in_current_span(),
        ))
        .await
    }

    async fn detect_and_analyze(
        &self,
        user_id: Uuid,
        ticket: Ticket,
        image_url: String,
    ) -> Result<PipelineSnapshot, AppError> {
        let items = match self.detector.detect(&image_url).await {
            Ok(items) => items,
            Err(e) => {
                self.record_failure(user_id, ticket, FailureKind::Detection, &e);
                return Err(e);
            }
        };
        self.apply(user_id, |m| m.detection_succeeded(ticket, items.clone()))?;
        debug!(%user_id, seq = ticket.seq(), count = items.len(), "detection applied");

        let facts = match self.nutrition.analyze(&items).await {
            Ok(facts) => facts,
            Err(e) => {
                self.record_failure(user_id, ticket, FailureKind::NutritionComputation, &e);
                return Err(e);
            }
        };
        self.apply(user_id, |m| m.nutrition_succeeded(ticket, facts))?;
        info!(%user_id, seq = ticket.seq(), "scan ready for review");
        Ok(self.snapshot(user_id))
    }

    pub fn edit_menu_item(
        &self,
        user_id: Uuid,
        index: usize,
        edit: MenuItemEdit,
    ) -> Result<(bool, ScanDraft), AppError> {
        self.with_machine(user_id, |m| {
            let draft = m.draft_mut()?;
            let applied = draft.update_menu_item(index, edit)?;
            Ok((applied, draft.clone()))
        })
    }

    pub fn edit_nutrition_item(
        &self,
        user_id: Uuid,
        index: usize,
        field: NutritionField,
        value: f64,
    ) -> Result<(bool, ScanDraft), AppError> {
        self.with_machine(user_id, |m| {
            let draft = m.draft_mut()?;
            let applied = draft.update_nutrition_item(index, field, value)?;
            Ok((applied, draft.clone()))
        })
    }

    /// Reviewing -> Saving -> Saved. On store failure the draft goes back to review.
    #[instrument(skip(self))]
    pub async fn save(&self, user_id: Uuid) -> Result<Scan, AppError> {
        let (ticket, payload) = self.with_machine(user_id, |m| -> Result<_, AppError> {
            if let Some(draft) = m.draft() {
                draft.validate().map_err(AppError::Validation)?;
            }
            Ok(m.begin_save()?)
        })?;

        let this = self.clone();
        detached(tokio::spawn(
            async move { this.persist(user_id, ticket, payload).await }.in_current_span(),
        ))
        .await
    }

    async fn persist(&self, user_id: Uuid, ticket: Ticket, payload: ScanDraft) -> Result<Scan, AppError> {
        match self.store.insert(user_id, &payload).await {
            Ok(scan) => {
                if let Err(e) = self.apply(user_id, |m| m.save_succeeded(ticket, scan.clone())) {
                    debug!(%user_id, seq = ticket.seq(), error = %e, "session moved on after save");
                }
                info!(%user_id, scan_id = %scan.id, "scan saved");
                Ok(scan)
            }
            Err(e) => {
                let err = AppError::Persistence(format!("{:#}", e));
                if let Err(te) = self.apply(user_id, |m| m.save_failed(ticket, err.to_string())) {
                    debug!(%user_id, error = %te, "dropping late save failure");
                }
                Err(err)
            }
        }
    }

    /// Reviewing -> Idle. The emptied session is evicted.
    pub fn cancel(&self, user_id: Uuid) -> Result<PipelineSnapshot, AppError> {
        let snap = self.with_machine(user_id, |m| -> Result<_, AppError> {
            m.cancel()?;
            Ok(m.snapshot())
        })?;
        self.evict_if_idle(user_id);
        Ok(snap)
    }

    /// Saved/Failed -> Idle. Releases the saved scan along with the session.
    pub fn reset(&self, user_id: Uuid) -> Result<PipelineSnapshot, AppError> {
        let snap = self.with_machine(user_id, |m| -> Result<_, AppError> {
            m.reset()?;
            Ok(m.snapshot())
        })?;
        self.evict_if_idle(user_id);
        Ok(snap)
    }

    /// Session teardown. Outstanding tickets go stale and the session is evicted.
    pub fn abandon(&self, user_id: Uuid) -> PipelineSnapshot {
        let snap = self.with_machine(user_id, |m| {
            let prev = m.abandon();
            info!(%user_id, ?prev, seq = m.seq(), "pipeline abandoned");
            m.snapshot()
        });
        self.evict_if_idle(user_id);
        snap
    }
}
