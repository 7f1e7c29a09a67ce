use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// The last known published version of a module path.
///
/// Created the first time a versioned artifact of the module is served, and
/// only ever moved forward (by semantic-version ordering) after that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Decoded module path, e.g. `github.com/BurntSushi/toml`.
    pub path: String,
    pub version: String,
    pub updated_at: UtcDateTime,
}
impl ModuleRecord {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            updated_at: UtcDateTime::now(),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ModuleRow {
    pub(crate) path: String,
    pub(crate) version: String,
    pub(crate) updated_at: i64,
}
impl From<&ModuleRecord> for ModuleRow {
    fn from(record: &ModuleRecord) -> Self {
        Self {
            path: record.path.clone(),
            version: record.version.clone(),
            updated_at: record.updated_at.unix_timestamp(),
        }
    }
}
impl TryFrom<ModuleRow> for ModuleRecord {
    type Error = Error;
    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.path,
            version: row.version,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("updated at"))?,
        })
    }
}
