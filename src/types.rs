use serde::{Deserialize, Serialize};

/// Identifier of a vector within an instance.
pub type VectorId = i64;

/// A single search hit: the matched id and its inner-product score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identifier of the matched vector.
    pub id: VectorId,
    /// Inner product between the query and the matched vector (higher is closer).
    pub score: f32,
}

/// k-means training parameters used when an instance is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Fixed seed for reproducible training. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            epsilon: default_epsilon(),
            seed: None,
        }
    }
}

fn default_max_iterations() -> usize {
    25
}
fn default_epsilon() -> f64 {
    1e-4
}

/// Construction parameters of one instance, persisted in its `conf.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceParams {
    /// Vector dimensionality.
    pub dim: usize,
    /// Number of IVF clusters.
    #[serde(default = "default_nlist")]
    pub nlist: usize,
    /// Snapshot file name inside a version directory.
    #[serde(default = "default_fif")]
    pub fif: String,
    /// Primary log file name inside a version directory.
    #[serde(default = "default_aof")]
    pub aof: String,
    /// Buffer log file name inside a version directory.
    #[serde(default = "default_buffer")]
    pub buffer: String,
    /// Content directory name inside a version directory.
    #[serde(default = "default_dumps_dir")]
    pub dumps_dir: String,
    #[serde(default)]
    pub kmeans: KMeansParams,
}

impl InstanceParams {
    pub fn new(dim: usize, nlist: usize) -> Self {
        Self {
            dim,
            nlist,
            fif: default_fif(),
            aof: default_aof(),
            buffer: default_buffer(),
            dumps_dir: default_dumps_dir(),
            kmeans: KMeansParams::default(),
        }
    }

    pub fn with_kmeans(mut self, kmeans: KMeansParams) -> Self {
        self.kmeans = kmeans;
        self
    }
}

fn default_nlist() -> usize {
    128
}
fn default_fif() -> String {
    "FIF".to_string()
}
fn default_aof() -> String {
    "AOF".to_string()
}
fn default_buffer() -> String {
    "BUFFER".to_string()
}
fn default_dumps_dir() -> String {
    "data".to_string()
}

/// Snapshot of an instance's state as reported by `get_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Number of vectors in the live index.
    pub count: usize,
    pub built: bool,
    pub data_dir: String,
    pub version: String,
    pub memory_lock: bool,
    pub aof_lock: bool,
    pub params: InstanceParams,
}
