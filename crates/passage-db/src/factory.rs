//! Opens databases with shared, injected options.

use passage_index::VectorIndex;
use passage_types::Settings;

use crate::database::VectorDatabase;
use crate::error::DatabaseError;
use crate::options::{DatabaseOptions, PersistenceMode};

/// Holds the options every database it opens is built with.
#[derive(Debug, Clone, Default)]
pub struct DatabaseFactory {
    options: DatabaseOptions,
}

impl DatabaseFactory {
    pub fn new(options: DatabaseOptions) -> Self {
        Self { options }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(DatabaseOptions::from_settings(settings))
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Open `key` with the factory's options.
    pub fn open(&self, key: &str) -> Result<VectorDatabase, DatabaseError> {
        VectorDatabase::open(key, self.options.clone())
    }

    /// Open `key` with a specific persistence mode.
    pub fn open_with_mode(
        &self,
        key: &str,
        mode: PersistenceMode,
    ) -> Result<VectorDatabase, DatabaseError> {
        VectorDatabase::open(key, self.options.clone().with_mode(mode))
    }

    /// Open `key` backed by a different index engine.
    pub fn open_with_index<I: VectorIndex + 'static>(
        &self,
        key: &str,
    ) -> Result<VectorDatabase<I>, DatabaseError> {
        VectorDatabase::open(key, self.options.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passage_index::HnswIndex;
    use tempfile::TempDir;

    #[test]
    fn test_factory_injects_options() {
        let temp = TempDir::new().unwrap();
        let factory = DatabaseFactory::new(DatabaseOptions::in_memory().with_base_folder(temp.path()));

        let db = factory.open("alpha").unwrap();
        assert!(db.is_persistent());
        assert_eq!(db.key(), "alpha");

        let db = factory.open_with_index::<HnswIndex>("beta").unwrap();
        assert_eq!(db.stats().vectors, 0);
    }

    #[test]
    fn test_factory_mode_override() {
        let factory = DatabaseFactory::default();
        let db = factory
            .open_with_mode(
                "tx",
                PersistenceMode::Transactional {
                    collection_version: 2,
                    transaction_id: "t".to_string(),
                },
            )
            .unwrap();
        assert!(!db.is_persistent());
        assert_eq!(factory.options().mode, PersistenceMode::Versioned { version: 1 });
    }
}
