use async_trait::async_trait;
use uuid::Uuid;

use super::model::{MenuItem, NutritionFacts, Scan, ScanDraft};

/// Relational store collaborator for scans. Every call is scoped to the owning user;
/// a scan owned by someone else behaves exactly like a missing one.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Single atomic insert of image reference, items and facts together.
    async fn insert(&self, user_id: Uuid, draft: &ScanDraft) -> anyhow::Result<Scan>;

    /// All scans of the user, newest `created_at` first.
    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Scan>>;

    async fn get(&self, user_id: Uuid, scan_id: Uuid) -> anyhow::Result<Option<Scan>>;

    async fn update(
        &self,
        user_id: Uuid,
        scan_id: Uuid,
        menu_items: &[MenuItem],
        facts: &NutritionFacts,
    ) -> anyhow::Result<Option<Scan>>;

    /// Returns whether a row owned by `user_id` was removed.
    async fn delete(&self, user_id: Uuid, scan_id: Uuid) -> anyhow::Result<bool>;
}
