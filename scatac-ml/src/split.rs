//! Stratified train / validation partitioning.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scatac_core::{Result, ScatacError};

/// Disjoint index sets into the sample list; together they cover it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TrainValidationSplit {
    /// Training indices, ascending.
    pub train: Vec<usize>,
    /// Validation indices, ascending.
    pub validation: Vec<usize>,
}

/// Partition samples so each class contributes `round(fraction · n_c)`
/// members to the training set, clamped to `[1, n_c − 1]`, chosen at random
/// under `seed`.
///
/// # Errors
///
/// `InvalidInput` if `labels` is empty or `fraction` is outside `(0, 1)`;
/// `Partition` if any class has fewer than two members.
pub fn stratified_split(labels: &[usize], fraction: f64, seed: u64) -> Result<TrainValidationSplit> {
    if labels.is_empty() {
        return Err(ScatacError::InvalidInput("empty label vector".into()));
    }
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ScatacError::InvalidInput(format!(
            "split fraction {fraction} must lie in (0, 1)"
        )));
    }

    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut class_indices: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        class_indices[label].push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();
    for (class, group) in class_indices.iter_mut().enumerate() {
        if group.is_empty() {
            continue;
        }
        let n_c = group.len();
        if n_c < 2 {
            return Err(ScatacError::Partition(format!(
                "class {class} has {n_c} member; at least 2 are needed to split"
            )));
        }
        let n_train = ((fraction * n_c as f64).round() as usize).clamp(1, n_c - 1);
        group.shuffle(&mut rng);
        train.extend_from_slice(&group[..n_train]);
        validation.extend_from_slice(&group[n_train..]);
    }
    train.sort_unstable();
    validation.sort_unstable();

    Ok(TrainValidationSplit { train, validation })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_class_counts() {
        // 10 of class 0, 5 of class 1 at 0.8 -> 8 + 4 train
        let mut labels = vec![0; 10];
        labels.extend(vec![1; 5]);
        let split = stratified_split(&labels, 0.8, 42).unwrap();
        let train0 = split.train.iter().filter(|&&i| labels[i] == 0).count();
        let train1 = split.train.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!((train0, train1), (8, 4));
        assert_eq!(split.validation.len(), 3);
    }

    #[test]
    fn clamped_to_leave_one_each_side() {
        let labels = vec![0, 0, 1, 1];
        let split = stratified_split(&labels, 0.9, 1).unwrap();
        assert_eq!(split.train.len(), 2);
        assert_eq!(split.validation.len(), 2);
        let small = stratified_split(&labels, 0.1, 1).unwrap();
        assert_eq!(small.train.len(), 2);
    }

    #[test]
    fn singleton_class_is_partition_error() {
        let labels = vec![0, 0, 0, 1];
        let err = stratified_split(&labels, 0.8, 42).unwrap_err();
        assert!(matches!(err, ScatacError::Partition(_)));
    }

    #[test]
    fn bad_fraction_rejected() {
        assert!(stratified_split(&[0, 0, 1, 1], 1.0, 0).is_err());
        assert!(stratified_split(&[0, 0, 1, 1], 0.0, 0).is_err());
        assert!(stratified_split(&[], 0.5, 0).is_err());
    }

    #[test]
    fn seed_changes_partition_deterministically() {
        let labels: Vec<usize> = (0..40).map(|i| i % 2).collect();
        let a = stratified_split(&labels, 0.5, 3).unwrap();
        let b = stratified_split(&labels, 0.5, 3).unwrap();
        assert_eq!(a, b);
    }
}
