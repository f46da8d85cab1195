#![allow(dead_code)]

pub mod server;
pub mod vectors;

use std::path::Path;

use ant::instance::Instance;
use ant::types::{InstanceParams, KMeansParams};

pub const V1: &str = "20240101000000000000";

/// Params with a fixed k-means seed so runs are reproducible.
pub fn params(dim: usize, nlist: usize) -> InstanceParams {
    InstanceParams::new(dim, nlist).with_kmeans(KMeansParams {
        seed: Some(7),
        ..KMeansParams::default()
    })
}

/// Open and recover an instance on `dir` at version `V1`.
pub fn open(dir: &Path, dim: usize, nlist: usize) -> Instance {
    let instance = Instance::open(dir, V1, params(dim, nlist)).unwrap();
    instance.rebuild().unwrap();
    instance
}

pub fn sorted_ids(instance: &Instance) -> Vec<i64> {
    let mut ids = instance.ids().unwrap();
    ids.sort_unstable();
    ids
}
