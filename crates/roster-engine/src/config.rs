//! Typed application configuration, persisted as `app_config.json`.

use std::path::{Path, PathBuf};

use roster_backup::SecurityLevel;
use roster_model::{
    fold, CanonicalColumns, ColumnAliases, ColumnResolver, LoadOptions, SemanticField,
    ValidationError, MAX_SCORE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "app_config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Number of questions on the test; correct-answer counts above this are rejected.
    pub max_questions: u32,
    pub score_per_question: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_questions: 40,
            score_per_question: 0.25,
        }
    }
}

impl ScoringConfig {
    /// Spread [`MAX_SCORE`] evenly over `max_questions`, rounding the per-question value to
    /// two decimals.
    pub fn for_question_count(max_questions: u32) -> Result<Self, ConfigError> {
        if max_questions == 0 {
            return Err(ConfigError::Invalid {
                field: "scoring.max_questions",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(Self {
            max_questions,
            score_per_question: round2(MAX_SCORE / f64::from(max_questions)),
        })
    }

    /// Score for `correct` right answers, rounded to two decimals.
    pub fn score_for(&self, correct: u32) -> Result<f64, ValidationError> {
        if correct > self.max_questions {
            return Err(ValidationError::CorrectCountOutOfRange {
                count: correct,
                max: self.max_questions,
            });
        }
        let score = round2(f64::from(correct) * self.score_per_question);
        if score > MAX_SCORE {
            return Err(ValidationError::ScoreOutOfRange(score));
        }
        Ok(score)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub encrypt_backups: bool,
    pub backup_encryption_level: SecurityLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub chunked: bool,
    pub chunk_size: usize,
    pub header_scan_rows: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        let defaults = LoadOptions::default();
        Self {
            chunked: defaults.chunked,
            chunk_size: defaults.chunk_size,
            header_scan_rows: defaults.header_scan_rows,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub columns: CanonicalColumns,
    pub aliases: ColumnAliases,
    pub scoring: ScoringConfig,
    /// Exam variants offered for quick entry.
    pub exam_codes: Vec<String>,
    pub security: SecurityConfig,
    pub ingestion: IngestionConfig,
    /// Write an automatic backup when the roster is closed.
    pub auto_backup: bool,
    /// Write the roster back to its source file after every edit.
    pub persist_on_edit: bool,
    pub app_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            columns: CanonicalColumns::default(),
            aliases: ColumnAliases::default(),
            scoring: ScoringConfig::default(),
            exam_codes: ["701", "702", "703", "704"].map(String::from).to_vec(),
            security: SecurityConfig::default(),
            ingestion: IngestionConfig::default(),
            auto_backup: false,
            persist_on_edit: false,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`EngineConfig::load`], but any failure yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                log::warn!("{err}; using default configuration");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let json = serde_json::to_vec_pretty(self)?;
        roster_fs::atomic_write_bytes(path, &json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut labels: Vec<String> = Vec::new();
        for field in SemanticField::ALL {
            let label = fold(self.columns.label(field).trim());
            if label.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "columns",
                    reason: format!("{field} label is empty"),
                });
            }
            if labels.contains(&label) {
                return Err(ConfigError::Invalid {
                    field: "columns",
                    reason: format!("{field} label duplicates another column label"),
                });
            }
            labels.push(label);
        }

        if self.scoring.max_questions == 0 {
            return Err(ConfigError::Invalid {
                field: "scoring.max_questions",
                reason: "must be greater than 0".into(),
            });
        }
        let spq = self.scoring.score_per_question;
        if !spq.is_finite() || spq <= 0.0 || spq > MAX_SCORE {
            return Err(ConfigError::Invalid {
                field: "scoring.score_per_question",
                reason: format!("{spq} is not in (0, {MAX_SCORE}]"),
            });
        }

        if let Some(code) = self
            .exam_codes
            .iter()
            .find(|code| code.trim().parse::<u64>().is_err())
        {
            return Err(ConfigError::Invalid {
                field: "exam_codes",
                reason: format!("{code:?} is not numeric"),
            });
        }

        if self.ingestion.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "ingestion.chunk_size",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn resolver(&self) -> ColumnResolver {
        ColumnResolver::new(self.columns.clone(), self.aliases.clone())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            chunked: self.ingestion.chunked,
            chunk_size: self.ingestion.chunk_size,
            header_scan_rows: self.ingestion.header_scan_rows,
            ..LoadOptions::default()
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
