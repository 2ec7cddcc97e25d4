pub mod contribution_repo;
pub mod fine_repo;
pub mod loan_repo;
pub mod profile_repo;
pub mod role_repo;

use anyhow::Context;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::store::StoreError;

/// Turns a guarded write that matched no row into the right error: the row
/// is either absent or in a state the guard rejected.
pub(crate) async fn missing_or_conflict(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
    reason: &str,
) -> StoreError {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table);
    let exists = sqlx::query_scalar::<_, bool>(&sql)
        .bind(id)
        .fetch_one(conn)
        .await
        .with_context(|| format!("Failed to look up {} {}", entity, id));

    match exists {
        Ok(true) => StoreError::Conflict {
            entity,
            id,
            reason: reason.to_string(),
        },
        Ok(false) => StoreError::NotFound { entity, id },
        Err(e) => StoreError::Backend(e),
    }
}
