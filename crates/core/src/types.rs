/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// 1-based position of a data row in the source file, header excluded.
pub type RowIndex = usize;

/// Already-authenticated caller context used to scope every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActorContext {
    pub organization_id: DbId,
    pub actor_id: DbId,
}

impl ActorContext {
    pub fn new(organization_id: DbId, actor_id: DbId) -> Self {
        Self {
            organization_id,
            actor_id,
        }
    }
}
