//! Configuration loading for passage-db.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/passage-db/config.toml`.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;

/// Tuning knobs for clustered search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Raw candidates fetched per requested result (`k × oversample`).
    #[serde(default = "default_oversample")]
    pub oversample: usize,

    /// Number of strongest candidates probed for neighbors (`k × expansion_factor`).
    #[serde(default = "default_expansion_factor")]
    pub expansion_factor: usize,

    /// Upper bound applied to each label gap when averaging gaps.
    #[serde(default = "default_max_gap")]
    pub max_gap: usize,

    /// Multiplier applied to the mean label gap.
    #[serde(default = "default_gap_scale")]
    pub gap_scale: f32,

    /// Minimum centroid similarity for the post-ranking merge.
    #[serde(default = "default_merge_similarity")]
    pub merge_similarity: f32,

    /// Members below this query similarity get squared weights in the centroid.
    #[serde(default = "default_weak_similarity")]
    pub weak_similarity: f32,
}

fn default_oversample() -> usize {
    50
}

fn default_expansion_factor() -> usize {
    3
}

fn default_max_gap() -> usize {
    15
}

fn default_gap_scale() -> f32 {
    1.5
}

fn default_merge_similarity() -> f32 {
    0.1
}

fn default_weak_similarity() -> f32 {
    0.1
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            oversample: default_oversample(),
            expansion_factor: default_expansion_factor(),
            max_gap: default_max_gap(),
            gap_scale: default_gap_scale(),
            merge_similarity: default_merge_similarity(),
            weak_similarity: default_weak_similarity(),
        }
    }
}

impl SearchSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.oversample == 0 {
            return Err("oversample must be > 0".to_string());
        }
        if self.gap_scale <= 0.0 {
            return Err(format!("gap_scale must be > 0, got {}", self.gap_scale));
        }
        if !(-1.0..=1.0).contains(&self.merge_similarity) {
            return Err(format!(
                "merge_similarity must be -1.0-1.0, got {}",
                self.merge_similarity
            ));
        }
        Ok(())
    }
}

/// Weights of the combined relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of centroid-to-query cosine similarity
    #[serde(default = "default_centroid_weight")]
    pub centroid: f32,

    /// Weight of the keyword hit fraction
    #[serde(default = "default_keyword_weight")]
    pub keyword: f32,

    /// Weight of the size-aware consistency score
    #[serde(default = "default_diversity_weight")]
    pub diversity: f32,
}

fn default_centroid_weight() -> f32 {
    0.6
}

fn default_keyword_weight() -> f32 {
    0.3
}

fn default_diversity_weight() -> f32 {
    0.1
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            centroid: default_centroid_weight(),
            keyword: default_keyword_weight(),
            diversity: default_diversity_weight(),
        }
    }
}

impl ScoreWeights {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [
            ("centroid", self.centroid),
            ("keyword", self.keyword),
            ("diversity", self.diversity),
        ] {
            if weight < 0.0 {
                return Err(format!("{} weight must be >= 0, got {}", name, weight));
            }
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding persisted snapshots
    #[serde(default = "default_base_folder")]
    pub base_folder: String,

    /// Quiet period before a dirty database is written to disk (ms)
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Clustered search tuning
    #[serde(default)]
    pub search: SearchSettings,

    /// Relevance score weights
    #[serde(default)]
    pub weights: ScoreWeights,
}

fn default_base_folder() -> String {
    ProjectDirs::from("", "", "passage-db")
        .map(|p| p.data_local_dir().join("snapshots"))
        .unwrap_or_else(|| PathBuf::from("./snapshots"))
        .to_string_lossy()
        .to_string()
}

fn default_flush_delay_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_folder: default_base_folder(),
            flush_delay_ms: default_flush_delay_ms(),
            log_level: default_log_level(),
            search: SearchSettings::default(),
            weights: ScoreWeights::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/passage-db/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (PASSAGE_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "passage-db")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");
        let search = SearchSettings::default();
        let weights = ScoreWeights::default();

        let mut builder = Config::builder()
            .set_default("base_folder", default_base_folder())?
            .set_default("flush_delay_ms", default_flush_delay_ms() as i64)?
            .set_default("log_level", default_log_level())?
            .set_default("search.oversample", search.oversample as i64)?
            .set_default("search.expansion_factor", search.expansion_factor as i64)?
            .set_default("search.max_gap", search.max_gap as i64)?
            .set_default("search.gap_scale", search.gap_scale as f64)?
            .set_default("search.merge_similarity", search.merge_similarity as f64)?
            .set_default("search.weak_similarity", search.weak_similarity as f64)?
            .set_default("weights.centroid", weights.centroid as f64)?
            .set_default("weights.keyword", weights.keyword as f64)?
            .set_default("weights.diversity", weights.diversity as f64)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: PASSAGE_BASE_FOLDER, PASSAGE_SEARCH__MAX_GAP, ...
        builder = builder.add_source(
            Environment::with_prefix("PASSAGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every nested section.
    pub fn validate(&self) -> Result<(), TypesError> {
        self.search.validate().map_err(TypesError::Config)?;
        self.weights.validate().map_err(TypesError::Config)?;
        Ok(())
    }

    /// Expand `~` in base_folder to the home directory
    pub fn expanded_base_folder(&self) -> PathBuf {
        if let Some(rest) = self.base_folder.strip_prefix("~/") {
            if let Some(dirs) = BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.base_folder)
    }

    /// Flush delay as a `Duration`.
    pub fn flush_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_delay_ms)
    }
}
