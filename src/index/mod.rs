//! Vector index for Ant.
//!
//! Provides the similarity kernels and the IVF-Flat index that every
//! instance keeps in memory.

pub mod distance;
pub mod ivf_flat;

pub use ivf_flat::{InvertedList, IvfFlatIndex};
