//! Joining embeddings, clusters and ground-truth labels by cell identifier.

use std::collections::{BTreeMap, BTreeSet};

use scatac_core::{Result, ScatacError};
use serde::{Deserialize, Serialize};

use crate::sc_cluster::ClusterAssignment;
use crate::sc_embed::Embedding2D;

/// How many offending identifiers a mismatch error names.
const MAX_REPORTED_IDS: usize = 5;

// ── Rename table ───────────────────────────────────────────────────────────

/// Explicit label aliases applied before labels are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelRenames(pub BTreeMap<String, String>);

impl Default for LabelRenames {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert("Oligodendrocytes".to_string(), "Oligo".to_string());
        Self(table)
    }
}

impl LabelRenames {
    /// No renames at all.
    pub fn none() -> Self {
        Self(BTreeMap::new())
    }

    /// The renamed form of `label`, or `label` itself if it has no entry.
    pub fn apply(&self, label: &str) -> String {
        self.0.get(label).cloned().unwrap_or_else(|| label.to_string())
    }
}

// ── Join ───────────────────────────────────────────────────────────────────

/// One cell with its embedding coordinates and ground truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRecord {
    pub cell_id: String,
    pub coords: Vec<f64>,
    pub label: String,
    pub cluster: Option<usize>,
}

/// Pair a label table from Input B with cells in matrix column order.
///
/// # Errors
///
/// [`ScatacError::JoinMismatch`] if the counts differ.
pub fn labels_by_position(cell_ids: &[String], labels: Vec<String>) -> Result<BTreeMap<String, String>> {
    if labels.len() != cell_ids.len() {
        return Err(ScatacError::JoinMismatch(format!(
            "{} labels for {} cells",
            labels.len(),
            cell_ids.len()
        )));
    }
    Ok(cell_ids.iter().cloned().zip(labels).collect())
}

/// Check that two identifier collections hold exactly the same ids.
pub fn check_universe<'a>(
    left_name: &str,
    left: impl IntoIterator<Item = &'a String>,
    right_name: &str,
    right: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    let left: BTreeSet<&str> = left.into_iter().map(String::as_str).collect();
    let right: BTreeSet<&str> = right.into_iter().map(String::as_str).collect();
    let mut offending: Vec<&str> = left.symmetric_difference(&right).copied().collect();
    if offending.is_empty() {
        return Ok(());
    }
    offending.sort_unstable();
    let n = offending.len();
    let shown = offending[..n.min(MAX_REPORTED_IDS)].join(", ");
    let more = if n > MAX_REPORTED_IDS {
        format!(" and {} more", n - MAX_REPORTED_IDS)
    } else {
        String::new()
    };
    Err(ScatacError::JoinMismatch(format!(
        "{n} cell ids not shared by {left_name} and {right_name}: {shown}{more}"
    )))
}

/// Join embedding coordinates, optional clusters and labels by cell id.
///
/// Records follow the embedding's row order and labels go through
/// `renames`.
///
/// # Errors
///
/// [`ScatacError::JoinMismatch`] unless the embedding, the clusters (when
/// given) and the label table cover exactly the same cell ids.
pub fn join(
    emb2d: &Embedding2D,
    clusters: Option<&ClusterAssignment>,
    labels: &BTreeMap<String, String>,
    renames: &LabelRenames,
) -> Result<Vec<LabeledRecord>> {
    if emb2d.cell_ids.len() != emb2d.n_cells() {
        return Err(ScatacError::InvalidInput(format!(
            "{} cell ids for {} embedding rows",
            emb2d.cell_ids.len(),
            emb2d.n_cells()
        )));
    }
    check_universe("embedding", &emb2d.cell_ids, "labels", labels.keys())?;

    let cluster_of: Option<BTreeMap<&str, usize>> = match clusters {
        Some(c) => {
            check_universe("embedding", &emb2d.cell_ids, "clusters", &c.cell_ids)?;
            Some(
                c.cell_ids
                    .iter()
                    .map(String::as_str)
                    .zip(c.ids.iter().copied())
                    .collect(),
            )
        }
        None => None,
    };

    emb2d
        .cell_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let label = labels
                .get(id)
                .ok_or_else(|| ScatacError::JoinMismatch(format!("no label for cell '{id}'")))?;
            Ok(LabeledRecord {
                cell_id: id.clone(),
                coords: emb2d.point(i),
                label: renames.apply(label),
                cluster: cluster_of.as_ref().and_then(|m| m.get(id.as_str()).copied()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn emb() -> Embedding2D {
        Embedding2D {
            cell_ids: ids(&["a", "b", "c"]),
            coords: array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]],
            kl_divergence: 0.1,
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn joins_in_embedding_order() {
        let table = labels(&[("c", "Astrocytes"), ("a", "Oligodendrocytes"), ("b", "Microglia")]);
        let clusters = ClusterAssignment {
            cell_ids: ids(&["b", "a", "c"]),
            ids: vec![0, 1, 1],
            modularity: 0.0,
        };
        let records = join(&emb(), Some(&clusters), &table, &LabelRenames::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].cell_id, "a");
        assert_eq!(records[0].label, "Oligo");
        assert_eq!(records[0].cluster, Some(1));
        assert_eq!(records[1].coords, vec![2.0, 3.0]);
        assert_eq!(records[1].cluster, Some(0));
        assert_eq!(records[2].label, "Astrocytes");
    }

    #[test]
    fn without_clusters() {
        let table = labels(&[("a", "x"), ("b", "y"), ("c", "z")]);
        let records = join(&emb(), None, &table, &LabelRenames::none()).unwrap();
        assert!(records.iter().all(|r| r.cluster.is_none()));
    }

    #[test]
    fn mismatch_names_offenders() {
        let table = labels(&[("a", "x"), ("b", "y"), ("zz", "z")]);
        let err = join(&emb(), None, &table, &LabelRenames::default()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ScatacError::JoinMismatch(_)));
        assert!(msg.contains("c"));
        assert!(msg.contains("zz"));
    }

    #[test]
    fn mismatch_lists_at_most_five() {
        let left = ids(&["a", "b", "c", "d", "e", "f", "g"]);
        let right = ids(&[]);
        let err = check_universe("x", &left, "y", &right).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("7 cell ids"));
        assert!(msg.contains("and 2 more"));
        assert!(!msg.contains("f,"));
    }

    #[test]
    fn positional_labels() {
        let cells = ids(&["a", "b"]);
        let table = labels_by_position(&cells, ids(&["x", "y"])).unwrap();
        assert_eq!(table["b"], "y");
        let err = labels_by_position(&cells, ids(&["x"])).unwrap_err();
        assert!(matches!(err, ScatacError::JoinMismatch(_)));
    }

    #[test]
    fn renames_apply() {
        let renames = LabelRenames::default();
        assert_eq!(renames.apply("Oligodendrocytes"), "Oligo");
        assert_eq!(renames.apply("Astrocytes"), "Astrocytes");
        let parsed: LabelRenames = serde_json::from_str(r#"{"OPCs": "OPC"}"#).unwrap();
        assert_eq!(parsed.apply("OPCs"), "OPC");
    }
}
