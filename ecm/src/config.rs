use serde::{Deserialize, Serialize};
use std::env;

use crate::decay::{DecayConfig, DecayShape};

/// Reads a single environment variable through `config`'s layered-source
/// builder rather than `std::env::var` directly, so env-var lookups go
/// through the same source machinery the rest of the stack is built on.
/// Rebuilt on every call (cheap, startup-only) so tests that set or clear
/// a var mid-run still observe the change, same as `std::env::var` would.
fn read_env_var(var: &str) -> Option<String> {
    let settings = config::Config::builder()
        .add_source(config::Environment::default())
        .build()
        .ok()?;
    settings.get_string(&var.to_lowercase()).ok()
}

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match read_env_var(var) {
        Some(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        None => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match read_env_var(var) {
        Some(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        None => None,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub decay: DecayConfigSettings,
    pub clustering: ClusteringConfig,
    pub retrieval: RetrievalConfig,
    pub maintenance: MaintenanceConfig,
    pub embeddings: EmbeddingsConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub db_path: String,
    pub vector_path: String,
}

/// Raw config knobs (`decay.shape`, `decay.weightPerStep`, ...) resolved into
/// a [`DecayConfig`] via [`DecayConfigSettings::resolve`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecayConfigSettings {
    pub shape: String,
    pub weight_per_step: f64,
    pub decay_per_step: f64,
    pub hold_steps: f64,
    pub min_weight: f64,
}

impl DecayConfigSettings {
    pub fn resolve(&self) -> DecayConfig {
        let shape = match self.shape.as_str() {
            "linear" => DecayShape::Linear {
                decay_per_step: self.decay_per_step,
            },
            "delayed-linear" => DecayShape::DelayedLinear {
                hold_steps: self.hold_steps,
                decay_per_step: self.decay_per_step,
            },
            "multi-linear" => DecayShape::MultiLinear { tiers: vec![] },
            _ => DecayShape::Exponential {
                weight_per_step: self.weight_per_step,
            },
        };
        DecayConfig {
            shape,
            min_weight: self.min_weight,
        }
    }
}

impl Default for DecayConfigSettings {
    fn default() -> Self {
        Self {
            shape: "exponential".to_string(),
            weight_per_step: 0.9,
            decay_per_step: 0.05,
            hold_steps: 1.0,
            min_weight: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    Angular,
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "angular" => Ok(Self::Angular),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusteringConfig {
    pub min_cluster_size: usize,
    pub metric: Metric,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    pub k: usize,
    pub vector_candidates: usize,
    pub keyword_candidates: usize,
    pub expansion_alpha: f64,
    pub rrf_constant: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceConfig {
    pub vector_ttl_days: u32,
    pub vector_max_count: u64,
    pub recluster_threshold: u64,
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    Full,
    CodeFocused,
}

impl std::str::FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "code-focused" => Ok(Self::CodeFocused),
            other => Err(format!("unknown render mode: {other}")),
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::CodeFocused => write!(f, "code-focused"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    pub render_mode: RenderMode,
    /// Soft cap, in characters, on a chunk's joined turn text before a new
    /// chunk starts.
    pub chunk_char_budget: usize,
    /// Gap after which a transition is penalised as a likely topic break.
    pub short_gap_minutes: i64,
    pub long_gap_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                db_path: parse_env_or("ECM_STORAGE_DB_PATH", "ecm.db".to_string()),
                vector_path: parse_env_or("ECM_STORAGE_VECTOR_PATH", "ecm-vectors".to_string()),
            },
            decay: DecayConfigSettings {
                shape: parse_env_or("ECM_DECAY_SHAPE", "exponential".to_string()),
                weight_per_step: parse_env_or("ECM_DECAY_WEIGHT_PER_STEP", 0.9),
                decay_per_step: parse_env_or("ECM_DECAY_PER_STEP", 0.05),
                hold_steps: parse_env_or("ECM_DECAY_HOLD_STEPS", 1.0),
                min_weight: parse_env_or("ECM_DECAY_MIN_WEIGHT", 0.05),
            },
            clustering: ClusteringConfig {
                min_cluster_size: parse_env_or("ECM_CLUSTERING_MIN_SIZE", 4),
                metric: parse_env_opt("ECM_CLUSTERING_METRIC").unwrap_or(Metric::Angular),
            },
            retrieval: RetrievalConfig {
                k: parse_env_or("ECM_RETRIEVAL_K", 10),
                vector_candidates: parse_env_or("ECM_RETRIEVAL_VECTOR_CANDIDATES", 40),
                keyword_candidates: parse_env_or("ECM_RETRIEVAL_KEYWORD_CANDIDATES", 40),
                expansion_alpha: parse_env_or("ECM_RETRIEVAL_EXPANSION_ALPHA", 0.5),
                rrf_constant: parse_env_or("ECM_RETRIEVAL_RRF_CONSTANT", 60.0),
            },
            maintenance: MaintenanceConfig {
                vector_ttl_days: parse_env_or("ECM_MAINTENANCE_VECTOR_TTL_DAYS", 180),
                vector_max_count: parse_env_or("ECM_MAINTENANCE_VECTOR_MAX_COUNT", 500_000),
                recluster_threshold: parse_env_or("ECM_MAINTENANCE_RECLUSTER_THRESHOLD", 500),
                check_interval_secs: parse_env_or("ECM_MAINTENANCE_INTERVAL_SECS", 86400),
            },
            embeddings: EmbeddingsConfig {
                model: parse_env_or("ECM_EMBEDDINGS_MODEL", "bge-small-en-v1.5".to_string()),
                dimensions: parse_env_or("ECM_EMBEDDINGS_DIMENSIONS", 384),
                batch_size: parse_env_or("ECM_EMBEDDINGS_BATCH_SIZE", 32),
            },
            ingestion: IngestionConfig {
                render_mode: parse_env_opt("ECM_INGESTION_RENDER_MODE").unwrap_or(RenderMode::Full),
                chunk_char_budget: parse_env_or("ECM_INGESTION_CHUNK_CHAR_BUDGET", 2000),
                short_gap_minutes: parse_env_or("ECM_INGESTION_SHORT_GAP_MINUTES", 10),
                long_gap_minutes: parse_env_or("ECM_INGESTION_LONG_GAP_MINUTES", 30),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Guards env-mutating tests so they don't race on shared process env vars.
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_uses_exponential_decay() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let cfg = Config::default();
        assert_eq!(cfg.decay.shape, "exponential");
    }

    #[test]
    fn decay_settings_resolve_to_matching_shape() {
        let settings = DecayConfigSettings {
            shape: "linear".to_string(),
            weight_per_step: 0.9,
            decay_per_step: 0.1,
            hold_steps: 0.0,
            min_weight: 0.05,
        };
        let resolved = settings.resolve();
        assert!(matches!(resolved.shape, DecayShape::Linear { .. }));
    }

    #[test]
    fn parse_env_or_falls_back_on_invalid_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        env::set_var("ECM_TEST_PARSE_OR", "not-a-number");
        let value: u32 = parse_env_or("ECM_TEST_PARSE_OR", 7);
        assert_eq!(value, 7);
        env::remove_var("ECM_TEST_PARSE_OR");
    }

    #[test]
    fn parse_env_opt_returns_none_when_unset() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        env::remove_var("ECM_TEST_PARSE_OPT");
        let value: Option<u32> = parse_env_opt("ECM_TEST_PARSE_OPT");
        assert!(value.is_none());
    }
}
