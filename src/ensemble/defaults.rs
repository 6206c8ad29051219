//! Default detector panel used when the caller supplies no ensemble.

use crate::error::Result;
use crate::models::{BaseDetector, IForest, KnnMethod, HBOS, KNN, LOF, OCSVM};

use super::{Ensemble, Origin};

/// Neighbor counts tried by KNN (largest, mean) and LOF.
pub const K_RANGE: [usize; 13] = [1, 3, 5, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

/// Bin counts tried by HBOS.
pub const N_BINS_RANGE: [usize; 10] = [3, 5, 7, 9, 12, 15, 20, 25, 30, 50];

/// Margin parameters tried by the one-class SVM.
pub const NU_RANGE: [f64; 11] = [0.01, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.99];

/// Tree counts tried by the isolation forest.
pub const N_TREES_RANGE: [usize; 8] = [10, 20, 50, 70, 100, 150, 200, 250];

/// Number of members [`init_detectors`] produces for `n_samples` rows.
pub fn default_ensemble_size(n_samples: usize) -> usize {
    let n_k = K_RANGE.iter().filter(|&&k| k < n_samples).count();
    3 * n_k + N_BINS_RANGE.len() + NU_RANGE.len() + N_TREES_RANGE.len()
}

/// Builds the default panel for a training set with `n_samples` rows.
///
/// Neighbor counts not strictly below `n_samples` are skipped, so small
/// datasets get a smaller panel.
pub fn init_detectors(n_samples: usize, random_state: u64) -> Result<Ensemble> {
    let mut estimators: Vec<Box<dyn BaseDetector>> = Vec::with_capacity(default_ensemble_size(n_samples));
    let mut flags = Vec::with_capacity(estimators.capacity());

    for k in K_RANGE.iter().copied().filter(|&k| k < n_samples) {
        estimators.push(Box::new(KNN::new(k, KnnMethod::Largest)));
        estimators.push(Box::new(KNN::new(k, KnnMethod::Mean)));
        estimators.push(Box::new(LOF::new(k)));
        flags.extend([true, true, true]);
    }

    for n_bins in N_BINS_RANGE {
        estimators.push(Box::new(HBOS::new(n_bins)));
        flags.push(false);
    }

    for nu in NU_RANGE {
        estimators.push(Box::new(OCSVM::new(nu).with_random_state(random_state)));
        flags.push(true);
    }

    for n in N_TREES_RANGE {
        estimators.push(Box::new(IForest::new(n).with_random_state(random_state)));
        flags.push(false);
    }

    Ensemble::with_origin(estimators, Some(flags), Origin::Default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_panel_for_large_dataset() {
        let ensemble = init_detectors(1000, 0).unwrap();
        assert_eq!(ensemble.len(), 3 * 13 + 10 + 11 + 8);
        assert_eq!(ensemble.len(), default_ensemble_size(1000));
    }

    #[test]
    fn test_k_filtered_by_sample_count() {
        // k in {1, 3, 5} only
        let ensemble = init_detectors(10, 0).unwrap();
        assert_eq!(ensemble.len(), 3 * 3 + 29);
    }

    #[test]
    fn test_order_and_flags() {
        let ensemble = init_detectors(4, 0).unwrap();
        let names = ensemble.names();
        assert_eq!(names[0], "KNN(n_neighbors=1, method=largest)");
        assert_eq!(names[1], "KNN(n_neighbors=1, method=mean)");
        assert_eq!(names[2], "LOF(n_neighbors=1)");
        assert_eq!(names[6], "HBOS(n_bins=3)");
        assert_eq!(names[16], "OCSVM(nu=0.01)");
        assert_eq!(names[27], "IForest(n_estimators=10)");
        assert_eq!(names.last().unwrap(), "IForest(n_estimators=250)");

        let flags = ensemble.standardization_flags();
        assert!(flags[..6].iter().all(|&f| f));
        assert!(flags[6..16].iter().all(|&f| !f));
        assert!(flags[16..27].iter().all(|&f| f));
        assert!(flags[27..].iter().all(|&f| !f));
    }
}
