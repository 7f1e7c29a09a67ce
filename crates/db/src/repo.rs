//! Repository for module records.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ModuleRecord, ModuleRow};
use crate::version;
use exn::ResultExt;
use sqlx::SqlitePool;

/// Outcome of [`ModuleRepository::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// The module was unknown; a record was created.
    Created,
    /// The version was strictly newer; the record moved forward.
    Advanced,
    /// The version was equal to or older than the known one; nothing changed.
    Unchanged,
}

/// Repository for managing [`ModuleRecord`]s.
///
/// Records map a module path to the newest version the proxy knows about.
/// The version only ever moves forward. Writers compare by semantic-version
/// precedence, then write only if the stored version is still the one they
/// compared against, retrying otherwise.
#[derive(Debug, Clone)]
pub struct ModuleRepository {
    pool: SqlitePool,
}
impl From<&Database> for ModuleRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl ModuleRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the record for a module path.
    pub async fn get(&self, path: &str) -> Result<Option<ModuleRecord>> {
        let row: Option<ModuleRow> = sqlx::query_as(include_str!("../queries/get_module.sql"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ModuleRecord::try_from).transpose()
    }

    /// Insert or overwrite a record, unconditionally.
    ///
    /// Only for seeding; every other write goes through [`record`](Self::record)
    /// or [`advance_if_known`](Self::advance_if_known).
    pub async fn upsert(&self, record: &ModuleRecord) -> Result<()> {
        let row = ModuleRow::from(record);
        sqlx::query(include_str!("../queries/upsert_module.sql"))
            .bind(row.path)
            .bind(row.version)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Record that `version` of the module at `path` exists.
    ///
    /// Creates the record if the module is unknown, and advances it if
    /// `version` is strictly newer than the stored version. A stored version
    /// that does not parse is replaced.
    ///
    /// # Errors
    /// [`InvalidVersion`](ErrorKind::InvalidVersion) if `version` does not parse.
    pub async fn record(&self, path: &str, version: &str) -> Result<Recorded> {
        version::parse(version)?;
        loop {
            let known = self.get(path).await?;
            let outcome = match &known {
                None => Recorded::Created,
                Some(known) => match version::is_newer(version, &known.version) {
                    Ok(true) => Recorded::Advanced,
                    Ok(false) => return Ok(Recorded::Unchanged),
                    Err(err) => {
                        tracing::warn!(path, stored = %known.version, error = %err, "Replacing unparseable stored version");
                        Recorded::Advanced
                    },
                },
            };
            if self.swap(path, known.as_ref().map(|known| known.version.as_str()), version).await? {
                return Ok(outcome);
            }
            tracing::debug!(path, version, "Record changed underneath, comparing again");
        }
    }

    /// Advance the record of an already known module to `version` if it is
    /// strictly newer. Returns `None` for unknown modules, which are left
    /// unrecorded.
    ///
    /// # Errors
    /// [`InvalidVersion`](ErrorKind::InvalidVersion) if either `version` or
    /// the stored version does not parse.
    pub async fn advance_if_known(&self, path: &str, version: &str) -> Result<Option<Recorded>> {
        version::parse(version)?;
        loop {
            let Some(known) = self.get(path).await? else {
                return Ok(None);
            };
            if !version::is_newer(version, &known.version)? {
                return Ok(Some(Recorded::Unchanged));
            }
            if self.swap(path, Some(&known.version), version).await? {
                return Ok(Some(Recorded::Advanced));
            }
            tracing::debug!(path, version, "Record changed underneath, comparing again");
        }
    }

    /// Write `version` only if the stored version is still `expected` (or,
    /// for `None`, if there is no record yet). `false` means another writer
    /// got there first.
    async fn swap(&self, path: &str, expected: Option<&str>, version: &str) -> Result<bool> {
        let row = ModuleRow::from(&ModuleRecord::new(path, version));
        let query = match expected {
            None => sqlx::query(include_str!("../queries/insert_module.sql"))
                .bind(row.path)
                .bind(row.version)
                .bind(row.updated_at),
            Some(expected) => sqlx::query(include_str!("../queries/swap_module.sql"))
                .bind(row.path)
                .bind(row.version)
                .bind(row.updated_at)
                .bind(expected),
        };
        let result = query.execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() == 1)
    }

    /// Number of tracked modules.
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../queries/count_modules.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }
}
