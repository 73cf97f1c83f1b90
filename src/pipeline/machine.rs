//! Per-user scan pipeline state machine.
//!
//! Every run started with `begin_upload`/`begin_analysis` (and every save attempt) gets a
//! fresh [`Ticket`]. Results are applied only when their ticket is still current, so a
//! late response from an abandoned run can never overwrite newer state.

use serde::Serialize;
use thiserror::Error;

use crate::{
    error::AppError,
    scans::model::{MenuItem, NutritionFacts, Scan, ScanDraft},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Uploading,
    Detecting,
    ComputingNutrition,
    Reviewing,
    Saving,
    Saved,
    Failed,
}

impl Stage {
    /// Stages from which a new run may start.
    pub fn accepts_new_run(self) -> bool {
        matches!(self, Stage::Idle | Stage::Saved | Stage::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Upload,
    Detection,
    NutritionComputation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
enum Phase {
    #[default]
    Idle,
    Uploading,
    Detecting {
        image_url: String,
    },
    ComputingNutrition {
        image_url: String,
        menu_items: Vec<MenuItem>,
    },
    Reviewing {
        draft: ScanDraft,
        error: Option<String>,
    },
    Saving {
        draft: ScanDraft,
    },
    Saved {
        scan: Scan,
    },
    Failed {
        failure: Failure,
        image_url: Option<String>,
    },
}

impl Phase {
    fn stage(&self) -> Stage {
        match self {
            Phase::Idle => Stage::Idle,
            Phase::Uploading => Stage::Uploading,
            Phase::Detecting { .. } => Stage::Detecting,
            Phase::ComputingNutrition { .. } => Stage::ComputingNutrition,
            Phase::Reviewing { .. } => Stage::Reviewing,
            Phase::Saving { .. } => Stage::Saving,
            Phase::Saved { .. } => Stage::Saved,
            Phase::Failed { .. } => Stage::Failed,
        }
    }
}

/// Identifies one in-flight run or save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Ticket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("a scan is already in progress ({0:?})")]
    Busy(Stage),
    #[error("cannot {action} while {stage:?}")]
    Illegal { action: &'static str, stage: Stage },
    #[error("scan run was superseded")]
    Stale,
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::Conflict(e.to_string())
    }
}

/// Client-observable view of the machine.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub stage: Stage,
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_items: Option<Vec<MenuItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<ScanDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<Scan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

#[derive(Debug, Default)]
pub struct PipelineMachine {
    phase: Phase,
    seq: u64,
}

impl PipelineMachine {
    /// An idle machine whose tickets all lie above `seq`.
    pub fn starting_after(seq: u64) -> Self {
        Self {
            phase: Phase::Idle,
            seq,
        }
    }

    pub fn stage(&self) -> Stage {
        self.phase.stage()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn next_ticket(&mut self) -> Ticket {
        self.seq += 1;
        Ticket(self.seq)
    }

    fn start(&mut self, phase: Phase) -> Result<Ticket, TransitionError> {
        let stage = self.stage();
        if !stage.accepts_new_run() {
            return Err(TransitionError::Busy(stage));
        }
        self.phase = phase;
        Ok(self.next_ticket())
    }

    fn check(&self, ticket: Ticket) -> Result<(), TransitionError> {
        if ticket.0 != self.seq {
            return Err(TransitionError::Stale);
        }
        Ok(())
    }

    fn illegal(&self, action: &'static str) -> TransitionError {
        TransitionError::Illegal {
            action,
            stage: self.stage(),
        }
    }

    /// Idle/Saved/Failed -> Uploading.
    pub fn begin_upload(&mut self) -> Result<Ticket, TransitionError> {
        self.start(Phase::Uploading)
    }

    /// Idle/Saved/Failed -> Detecting, for an image that is already stored.
    pub fn begin_analysis(&mut self, image_url: String) -> Result<Ticket, TransitionError> {
        self.start(Phase::Detecting { image_url })
    }

    pub fn upload_succeeded(
        &mut self,
        ticket: Ticket,
        image_url: String,
    ) -> Result<(), TransitionError> {
        self.check(ticket)?;
        match self.phase {
            Phase::Uploading => {
                self.phase = Phase::Detecting { image_url };
                Ok(())
            }
            _ => Err(self.illegal("finish upload")),
        }
    }

    pub fn detection_succeeded(
        &mut self,
        ticket: Ticket,
        menu_items: Vec<MenuItem>,
    ) -> Result<(), TransitionError> {
        self.check(ticket)?;
        match std::mem::take(&mut self.phase) {
            Phase::Detecting { image_url } => {
                self.phase = Phase::ComputingNutrition {
                    image_url,
                    menu_items,
                };
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.illegal("finish detection"))
            }
        }
    }

    pub fn nutrition_succeeded(
        &mut self,
        ticket: Ticket,
        facts: NutritionFacts,
    ) -> Result<(), TransitionError> {
        self.check(ticket)?;
        match std::mem::take(&mut self.phase) {
            Phase::ComputingNutrition {
                image_url,
                menu_items,
            } => {
                self.phase = Phase::Reviewing {
                    draft: ScanDraft::new(image_url, menu_items, facts),
                    error: None,
                };
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.illegal("finish nutrition analysis"))
            }
        }
    }

    /// Uploading/Detecting/ComputingNutrition -> Failed.
    pub fn fail(
        &mut self,
        ticket: Ticket,
        kind: FailureKind,
        message: String,
    ) -> Result<(), TransitionError> {
        self.check(ticket)?;
        let image_url = match &self.phase {
            Phase::Uploading => None,
            Phase::Detecting { image_url } | Phase::ComputingNutrition { image_url, .. } => {
                Some(image_url.clone())
            }
            _ => return Err(self.illegal("fail")),
        };
        self.phase = Phase::Failed {
            failure: Failure { kind, message },
            image_url,
        };
        Ok(())
    }

    pub fn draft(&self) -> Option<&ScanDraft> {
        match &self.phase {
            Phase::Reviewing { draft, .. } | Phase::Saving { draft } => Some(draft),
            _ => None,
        }
    }

    /// Mutable draft; only while reviewing.
    pub fn draft_mut(&mut self) -> Result<&mut ScanDraft, TransitionError> {
        let stage = self.stage();
        match &mut self.phase {
            Phase::Reviewing { draft, error } => {
                *error = None;
                Ok(draft)
            }
            _ => Err(TransitionError::Illegal {
                action: "edit draft",
                stage,
            }),
        }
    }

    /// Reviewing -> Saving. Returns the confirmed payload to persist.
    pub fn begin_save(&mut self) -> Result<(Ticket, ScanDraft), TransitionError> {
        match std::mem::take(&mut self.phase) {
            Phase::Reviewing { draft, .. } => {
                let payload = draft.confirm();
                self.phase = Phase::Saving { draft };
                Ok((self.next_ticket(), payload))
            }
            other => {
                self.phase = other;
                Err(self.illegal("save"))
            }
        }
    }

    pub fn save_succeeded(&mut self, ticket: Ticket, scan: Scan) -> Result<(), TransitionError> {
        self.check(ticket)?;
        match self.phase {
            Phase::Saving { .. } => {
                self.phase = Phase::Saved { scan };
                Ok(())
            }
            _ => Err(self.illegal("finish save")),
        }
    }

    /// Saving -> Reviewing, keeping the draft and surfacing the error.
    pub fn save_failed(&mut self, ticket: Ticket, message: String) -> Result<(), TransitionError> {
        self.check(ticket)?;
        match std::mem::take(&mut self.phase) {
            Phase::Saving { draft } => {
                self.phase = Phase::Reviewing {
                    draft,
                    error: Some(message),
                };
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.illegal("fail save"))
            }
        }
    }

    /// Reviewing -> Idle, discarding the draft.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            Phase::Reviewing { .. } => {
                self.phase = Phase::Idle;
                self.seq += 1;
                Ok(())
            }
            _ => Err(self.illegal("cancel")),
        }
    }

    /// Saved/Failed -> Idle ("new scan" / "try again").
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            Phase::Idle | Phase::Saved { .. } | Phase::Failed { .. } => {
                self.phase = Phase::Idle;
                Ok(())
            }
            _ => Err(self.illegal("reset")),
        }
    }

    /// Drops whatever is in progress. Outstanding tickets become stale.
    pub fn abandon(&mut self) -> Stage {
        let prev = self.stage();
        self.phase = Phase::Idle;
        self.seq += 1;
        prev
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let mut snap = PipelineSnapshot {
            stage: self.stage(),
            seq: self.seq,
            image_url: None,
            menu_items: None,
            draft: None,
            scan: None,
            error: None,
            failure_kind: None,
        };
        match &self.phase {
            Phase::Idle | Phase::Uploading => {}
            Phase::Detecting { image_url } => snap.image_url = Some(image_url.clone()),
            Phase::ComputingNutrition {
                image_url,
                menu_items,
            } => {
                snap.image_url = Some(image_url.clone());
                snap.menu_items = Some(menu_items.clone());
            }
            Phase::Reviewing { draft, error } => {
                snap.image_url = Some(draft.image_url.clone());
                snap.draft = Some(draft.clone());
                snap.error = error.clone();
            }
            Phase::Saving { draft } => {
                snap.image_url = Some(draft.image_url.clone());
                snap.draft = Some(draft.clone());
            }
            Phase::Saved { scan } => {
                snap.image_url = Some(scan.image_url.clone());
                snap.scan = Some(scan.clone());
            }
            Phase::Failed { failure, image_url } => {
                snap.image_url = image_url.clone();
                snap.error = Some(failure.message.clone());
                snap.failure_kind = Some(failure.kind);
            }
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scans::fixtures::{draft, menu_item, scan};
    use uuid::Uuid;

    const URL: &str = "https://cdn.test/food-images/1-abc.jpg";

    fn reviewing() -> PipelineMachine {
        let mut m = PipelineMachine::default();
        let t = m.begin_analysis(URL.into()).unwrap();
        m.detection_succeeded(t, vec![menu_item("Nasi", 150.0)]).unwrap();
        m.nutrition_succeeded(t, draft(&["Nasi"]).nutrition_facts).unwrap();
        m
    }

    #[test]
    fn happy_path_reaches_saved() {
        let mut m = PipelineMachine::default();
        let t = m.begin_upload().unwrap();
        assert_eq!(m.stage(), Stage::Uploading);
        m.upload_succeeded(t, URL.into()).unwrap();
        assert_eq!(m.stage(), Stage::Detecting);
        m.detection_succeeded(t, vec![menu_item("Nasi", 150.0)]).unwrap();
        assert_eq!(m.stage(), Stage::ComputingNutrition);
        m.nutrition_succeeded(t, draft(&["Nasi"]).nutrition_facts).unwrap();
        assert_eq!(m.stage(), Stage::Reviewing);
        assert_eq!(m.draft().unwrap().image_url, URL);

        let (st, payload) = m.begin_save().unwrap();
        assert_eq!(payload.menu_items.len(), 1);
        assert_eq!(m.stage(), Stage::Saving);
        m.save_succeeded(st, scan(Uuid::new_v4(), &["Nasi"], 0)).unwrap();
        assert_eq!(m.stage(), Stage::Saved);
        m.reset().unwrap();
        assert_eq!(m.stage(), Stage::Idle);
    }

    #[test]
    fn new_run_rejected_while_busy_or_reviewing() {
        let mut m = PipelineMachine::default();
        m.begin_upload().unwrap();
        assert_eq!(m.begin_upload(), Err(TransitionError::Busy(Stage::Uploading)));

        let mut m = reviewing();
        assert!(matches!(
            m.begin_analysis(URL.into()),
            Err(TransitionError::Busy(Stage::Reviewing))
        ));
        m.begin_save().unwrap();
        assert!(matches!(m.begin_upload(), Err(TransitionError::Busy(Stage::Saving))));
    }

    #[test]
    fn new_run_allowed_from_saved_and_failed() {
        let mut m = PipelineMachine::default();
        let t = m.begin_upload().unwrap();
        m.fail(t, FailureKind::Upload, "Upload failed: boom".into()).unwrap();
        let snap = m.snapshot();
        assert_eq!(snap.stage, Stage::Failed);
        assert_eq!(snap.failure_kind, Some(FailureKind::Upload));
        assert!(m.begin_upload().is_ok());
    }

    #[test]
    fn stale_ticket_cannot_overwrite_newer_run() {
        let mut m = PipelineMachine::default();
        let old = m.begin_analysis(URL.into()).unwrap();
        assert_eq!(m.abandon(), Stage::Detecting);
        let fresh = m.begin_analysis("https://cdn.test/other.jpg".into()).unwrap();
        assert_ne!(old, fresh);

        assert_eq!(
            m.detection_succeeded(old, vec![menu_item("Stale", 1.0)]),
            Err(TransitionError::Stale)
        );
        assert_eq!(m.fail(old, FailureKind::Detection, "x".into()), Err(TransitionError::Stale));
        assert_eq!(m.stage(), Stage::Detecting);
        assert_eq!(m.snapshot().image_url.as_deref(), Some("https://cdn.test/other.jpg"));
    }

    #[test]
    fn save_failure_returns_to_review_with_draft() {
        let mut m = reviewing();
        let (t, _) = m.begin_save().unwrap();
        m.save_failed(t, "Failed to save scan: timeout".into()).unwrap();
        let snap = m.snapshot();
        assert_eq!(snap.stage, Stage::Reviewing);
        assert!(snap.draft.is_some());
        assert_eq!(snap.error.as_deref(), Some("Failed to save scan: timeout"));

        // editing clears the surfaced error
        m.draft_mut().unwrap();
        assert!(m.snapshot().error.is_none());
    }

    #[test]
    fn cancel_only_from_reviewing() {
        let mut m = PipelineMachine::default();
        assert!(matches!(m.cancel(), Err(TransitionError::Illegal { .. })));
        let mut m = reviewing();
        m.cancel().unwrap();
        assert_eq!(m.stage(), Stage::Idle);
        assert!(m.draft().is_none());
    }

    #[test]
    fn reset_refused_mid_run() {
        let mut m = PipelineMachine::default();
        m.begin_upload().unwrap();
        assert!(matches!(m.reset(), Err(TransitionError::Illegal { .. })));
        assert!(matches!(reviewing().reset(), Err(TransitionError::Illegal { .. })));
    }

    #[test]
    fn transition_errors_are_conflicts() {
        let e: AppError = TransitionError::Busy(Stage::Detecting).into();
        assert!(matches!(e, AppError::Conflict(_)));
    }
}
