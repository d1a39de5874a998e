/// All database primary keys are PostgreSQL BIGSERIAL.
///
/// Detached (never persisted) instances use negative ids, see
/// [`crate::instance::DetachedIdAllocator`].
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
