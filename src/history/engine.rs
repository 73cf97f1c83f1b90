use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::view::HistoryView;
use crate::{error::AppError, scans::store::ScanStore};

/// A user's history: the store-backed source list plus its derived view.
///
/// Deletes are confirmed by the store before anything changes locally; the list
/// is then reloaded in full.
pub struct HistoryEngine {
    store: Arc<dyn ScanStore>,
    user_id: Uuid,
    view: HistoryView,
}

impl HistoryEngine {
    pub fn new(store: Arc<dyn ScanStore>, user_id: Uuid, page_size: usize) -> Self {
        Self {
            store,
            user_id,
            view: HistoryView::new(page_size),
        }
    }

    pub fn view(&self) -> &HistoryView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut HistoryView {
        &mut self.view
    }

    /// Fetches every scan owned by the user, newest first.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn load(&mut self) -> Result<(), AppError> {
        let scans = self
            .store
            .list_by_user(self.user_id)
            .await
            .context("load scan history")?;
        self.view.set_scans(scans);
        Ok(())
    }

    /// Owner-scoped delete followed by a reload. A scan the user does not own is
    /// `NotFound`; on any failure the current list is left as it was.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn delete(&mut self, scan_id: Uuid) -> Result<(), AppError> {
        let removed = self
            .store
            .delete(self.user_id, scan_id)
            .await
            .context("delete scan")?;
        if !removed {
            warn!(%scan_id, "delete matched no owned scan");
            return Err(AppError::NotFound("Scan"));
        }
        info!(%scan_id, "scan deleted");
        self.load().await
    }
}
