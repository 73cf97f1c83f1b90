use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{SppgInput, UpdateProfileRequest};
use crate::error::AppError;

/// A kitchen (Satuan Pelayanan Pemenuhan Gizi) a profile can be linked to.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Sppg {
    pub id: Uuid,
    pub name: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub position: Option<String>,
    pub avatar_url: Option<String>,
    pub sppg_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileWithSppg {
    #[serde(flatten)]
    pub profile: Profile,
    pub sppg: Option<Sppg>,
}

impl ProfileWithSppg {
    /// Name printed on share cards: the SPPG name, else the person's name.
    pub fn attribution(&self) -> Option<&str> {
        let named = |s: &&str| !s.trim().is_empty();
        self.sppg
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .filter(named)
            .or_else(|| self.profile.full_name.as_deref().filter(named))
    }
}

const PROFILE_COLUMNS: &str = "id, user_id, full_name, position, avatar_url, sppg_id, created_at";

impl Sppg {
    async fn find(db: &PgPool, id: Uuid) -> Result<Option<Sppg>, AppError> {
        let sppg = sqlx::query_as::<_, Sppg>(
            r#"SELECT id, name, address, region, district, created_at FROM sppg WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(sppg)
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, input: &SppgInput) -> Result<Uuid, AppError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO sppg (name, address, region, district)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.region)
        .bind(&input.district)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    async fn update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        input: &SppgInput,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sppg
               SET name = $2, address = $3, region = $4, district = $5
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.region)
        .bind(&input.district)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

impl Profile {
    pub async fn find_by_user(db: &PgPool, user_id: Uuid) -> Result<Option<ProfileWithSppg>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {} FROM profiles WHERE user_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        let Some(profile) = profile else {
            return Ok(None);
        };
        let sppg = match profile.sppg_id {
            Some(id) => Sppg::find(db, id).await?,
            None => None,
        };
        Ok(Some(ProfileWithSppg { profile, sppg }))
    }

    /// Creates or updates the caller's profile and linked SPPG in one transaction.
    /// An SPPG id that is not linked to the caller's profile is `NotFound`.
    pub async fn save(
        db: &PgPool,
        user_id: Uuid,
        req: &UpdateProfileRequest,
        avatar_url: Option<String>,
    ) -> Result<ProfileWithSppg, AppError> {
        let mut tx = db.begin().await?;

        let linked: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT sppg_id FROM profiles WHERE user_id = $1 FOR UPDATE"#)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .flatten();

        let sppg_id = match &req.sppg {
            Some(input) => match input.id {
                Some(id) if Some(id) == linked => {
                    Sppg::update(&mut tx, id, input).await?;
                    Some(id)
                }
                Some(_) => return Err(AppError::NotFound("SPPG")),
                None => Some(Sppg::insert(&mut tx, input).await?),
            },
            None => None,
        };

        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (user_id, full_name, position, avatar_url, sppg_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
               SET full_name  = COALESCE(EXCLUDED.full_name, profiles.full_name),
                   position   = COALESCE(EXCLUDED.position, profiles.position),
                   avatar_url = COALESCE(EXCLUDED.avatar_url, profiles.avatar_url),
                   sppg_id    = COALESCE(EXCLUDED.sppg_id, profiles.sppg_id)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(&req.full_name)
        .bind(&req.position)
        .bind(avatar_url.or_else(|| req.avatar_url.clone()))
        .bind(sppg_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let sppg = match profile.sppg_id {
            Some(id) => Sppg::find(db, id).await?,
            None => None,
        };
        Ok(ProfileWithSppg { profile, sppg })
    }
}

/// Attribution for a user's share cards: SPPG name, full name, then email.
pub async fn display_name(db: &PgPool, user_id: Uuid) -> Result<Option<String>, AppError> {
    if let Some(p) = Profile::find_by_user(db, user_id).await? {
        if let Some(name) = p.attribution() {
            return Ok(Some(name.to_string()));
        }
    }
    let email: Option<String> = sqlx::query_scalar(r#"SELECT email FROM users WHERE id = $1"#)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(email)
}
