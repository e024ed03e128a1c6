pub mod sqlite;
pub mod traits;

pub use sqlite::SqlitePostStore;
pub use traits::{EventStore, PostRecord};

use std::path::Path;
use std::sync::Arc;

/// Open the configured post store.
pub fn open_store(path: &Path) -> anyhow::Result<Arc<dyn EventStore>> {
    Ok(Arc::new(SqlitePostStore::open(path)?))
}
