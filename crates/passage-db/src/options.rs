//! Database construction options.

use std::path::PathBuf;
use std::time::Duration;

use passage_store::DEFAULT_FLUSH_DELAY;
use passage_types::{ScoreWeights, SearchSettings, Settings};

/// Which snapshot format a database reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Full snapshot (index, documents, spans, raw vectors) at
    /// `vector-{key}-{version}.bin`.
    Versioned { version: u64 },

    /// Index-only snapshot at `vector-{key}.bin`, usable only when both the
    /// transaction id and collection version match.
    Transactional {
        collection_version: u32,
        transaction_id: String,
    },
}

impl Default for PersistenceMode {
    fn default() -> Self {
        PersistenceMode::Versioned { version: 1 }
    }
}

/// Options injected into every database a factory opens.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Snapshot directory. `None` keeps the database memory-only.
    pub base_folder: Option<PathBuf>,
    /// Quiet period before a dirty database is written
    pub flush_delay: Duration,
    pub mode: PersistenceMode,
    pub search: SearchSettings,
    pub weights: ScoreWeights,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            base_folder: None,
            flush_delay: DEFAULT_FLUSH_DELAY,
            mode: PersistenceMode::default(),
            search: SearchSettings::default(),
            weights: ScoreWeights::default(),
        }
    }
}

impl DatabaseOptions {
    /// Options for a memory-only database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Options taken from loaded settings, persisting under the configured
    /// base folder.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_folder: Some(settings.expanded_base_folder()),
            flush_delay: settings.flush_delay(),
            mode: PersistenceMode::default(),
            search: settings.search.clone(),
            weights: settings.weights.clone(),
        }
    }

    pub fn with_base_folder(mut self, base_folder: impl Into<PathBuf>) -> Self {
        self.base_folder = Some(base_folder.into());
        self
    }

    pub fn with_flush_delay(mut self, flush_delay: Duration) -> Self {
        self.flush_delay = flush_delay;
        self
    }

    pub fn with_mode(mut self, mode: PersistenceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_version(self, version: u64) -> Self {
        self.with_mode(PersistenceMode::Versioned { version })
    }

    /// Validate search and scoring settings.
    pub fn validate(&self) -> Result<(), String> {
        self.search.validate()?;
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DatabaseOptions::default();
        assert!(options.base_folder.is_none());
        assert_eq!(options.flush_delay, Duration::from_secs(30));
        assert_eq!(options.mode, PersistenceMode::Versioned { version: 1 });
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            base_folder: "/tmp/passage".to_string(),
            flush_delay_ms: 250,
            ..Default::default()
        };
        let options = DatabaseOptions::from_settings(&settings);
        assert_eq!(options.base_folder, Some(PathBuf::from("/tmp/passage")));
        assert_eq!(options.flush_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_builders() {
        let options = DatabaseOptions::in_memory()
            .with_base_folder("/data")
            .with_version(7)
            .with_flush_delay(Duration::ZERO);
        assert_eq!(options.mode, PersistenceMode::Versioned { version: 7 });
        assert_eq!(options.flush_delay, Duration::ZERO);
    }
}
