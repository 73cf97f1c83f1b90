use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{MenuItem, NutritionFacts, Scan, ScanDraft};
use super::store::ScanStore;

#[derive(Debug, FromRow)]
struct ScanRow {
    id: Uuid,
    user_id: Uuid,
    image_url: String,
    scan_date: OffsetDateTime,
    menu_items: Json<Vec<MenuItem>>,
    nutrition_facts: Json<NutritionFacts>,
    created_at: OffsetDateTime,
}

impl From<ScanRow> for Scan {
    fn from(r: ScanRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            image_url: r.image_url,
            scan_date: r.scan_date,
            menu_items: r.menu_items.0,
            nutrition_facts: r.nutrition_facts.0,
            created_at: r.created_at,
        }
    }
}

/// `nutrition_scans` table in Postgres.
#[derive(Clone)]
pub struct PgScanStore {
    db: PgPool,
}

impl PgScanStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn insert(&self, user_id: Uuid, draft: &ScanDraft) -> anyhow::Result<Scan> {
        let row = sqlx::query_as::<_, ScanRow>(
            r#"
            INSERT INTO nutrition_scans (user_id, image_url, scan_date, menu_items, nutrition_facts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, image_url, scan_date, menu_items, nutrition_facts, created_at
            "#,
        )
        .bind(user_id)
        .bind(&draft.image_url)
        .bind(draft.scan_date)
        .bind(Json(&draft.menu_items))
        .bind(Json(&draft.nutrition_facts))
        .fetch_one(&self.db)
        .await
        .context("insert nutrition scan")?;
        Ok(row.into())
    }

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Scan>> {
        let rows = sqlx::query_as::<_, ScanRow>(
            r#"
            SELECT id, user_id, image_url, scan_date, menu_items, nutrition_facts, created_at
              FROM nutrition_scans
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list nutrition scans")?;
        Ok(rows.into_iter().map(Scan::from).collect())
    }

    async fn get(&self, user_id: Uuid, scan_id: Uuid) -> anyhow::Result<Option<Scan>> {
        let row = sqlx::query_as::<_, ScanRow>(
            r#"
            SELECT id, user_id, image_url, scan_date, menu_items, nutrition_facts, created_at
              FROM nutrition_scans
             WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(scan_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get nutrition scan")?;
        Ok(row.map(Scan::from))
    }

    async fn update(
        &self,
        user_id: Uuid,
        scan_id: Uuid,
        menu_items: &[MenuItem],
        facts: &NutritionFacts,
    ) -> anyhow::Result<Option<Scan>> {
        let row = sqlx::query_as::<_, ScanRow>(
            r#"
            UPDATE nutrition_scans
               SET menu_items = $3, nutrition_facts = $4
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, image_url, scan_date, menu_items, nutrition_facts, created_at
            "#,
        )
        .bind(scan_id)
        .bind(user_id)
        .bind(Json(menu_items))
        .bind(Json(facts))
        .fetch_optional(&self.db)
        .await
        .context("update nutrition scan")?;
        Ok(row.map(Scan::from))
    }

    async fn delete(&self, user_id: Uuid, scan_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"DELETE FROM nutrition_scans WHERE id = $1 AND user_id = $2"#)
            .bind(scan_id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete nutrition scan")?;
        Ok(res.rows_affected() > 0)
    }
}
