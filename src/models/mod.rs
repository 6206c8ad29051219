pub mod base_model;
pub mod hbos;
pub mod iforest;
pub mod knn;
pub mod lof;
mod neighbors;
pub mod ocsvm;

pub use base_model::{BaseDetector, Capabilities, Capability};
pub use hbos::HBOS;
pub use iforest::{IForest, MaxSamples};
pub use knn::{KnnMethod, KNN};
pub use lof::LOF;
pub use ocsvm::{Gamma, OCSVM};
