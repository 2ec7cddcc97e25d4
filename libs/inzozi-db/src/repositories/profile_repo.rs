use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::profile::{NewProfile, Profile};
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the existing row untouched when the member already has a profile.
    pub async fn create(&self, new: &NewProfile) -> StoreResult<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, user_id, full_name, phone, is_approved)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = profiles.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.full_name)
        .bind(new.phone.as_deref())
        .bind(new.is_approved)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create profile")?;
        Ok(profile)
    }

    pub async fn get_by_user_id(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch profile")?;
        Ok(profile)
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Profile>> {
        let profiles =
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch profiles")?;
        Ok(profiles)
    }

    pub async fn update_details(
        &self,
        user_id: Uuid,
        full_name: &str,
        phone: Option<&str>,
    ) -> StoreResult<Profile> {
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET full_name = $2, phone = $3, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(full_name)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update profile")?
        .ok_or(StoreError::NotFound {
            entity: "profile",
            id: user_id,
        })
    }

    pub async fn set_approved(&self, user_id: Uuid, approved: bool) -> StoreResult<Profile> {
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET is_approved = $2, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update profile approval")?
        .ok_or(StoreError::NotFound {
            entity: "profile",
            id: user_id,
        })
    }
}
