//! Cell-identified data types and pipeline stages for scATAC-seq analysis.
//!
//! This crate layers cell identifiers on top of the numerics in
//! `scatac-ml`:
//!
//! - **Counts** — [`SparseMatrix`] in COO format, [`CountMatrix`] (peaks × cells) and per-cell QC
//! - **Normalization** — TF-IDF weighting ([`sc_normalize::tfidf`])
//! - **Reduction** — LSI via randomized SVD ([`sc_reduce::reduce`])
//! - **Clustering** — kNN graph, multi-level Louvain, NMI / ARI ([`sc_cluster`])
//! - **Embedding** — t-SNE projection ([`sc_embed::project`])
//! - **Labels** — identifier joins and rename tables ([`sc_labels`])
//! - **Classification** — target-vs-rest benchmark and validation ([`sc_classify`])
//! - **Pipeline** — [`pipeline::run`] chains all of the above
//!
//! # Quick start
//!
//! ```
//! use scatac_omics::CountMatrix;
//! use scatac_core::Summarizable;
//!
//! let counts = CountMatrix::from_rows(
//!     vec![vec![1.0, 0.0], vec![2.0, 3.0]],
//!     vec!["chr1:100-600".into(), "chr1:900-1400".into()],
//!     vec!["AAAC-1".into(), "AAAG-1".into()],
//! ).unwrap();
//!
//! assert_eq!(counts.shape(), (2, 2));
//! assert_eq!(counts.n_count(), vec![3.0, 3.0]);
//! assert_eq!(counts.summary(), "CountMatrix: 2 peaks \u{00d7} 2 cells, 3 nonzeros");
//! ```

pub mod counts;
pub mod network;
pub mod pipeline;
pub mod sc_classify;
pub mod sc_cluster;
pub mod sc_embed;
pub mod sc_labels;
pub mod sc_normalize;
pub mod sc_reduce;
pub mod sparse;

pub use counts::{CountMatrix, Distribution, QcSummary};
pub use network::{Community, Graph};
pub use pipeline::{run, run_positional, PipelineConfig, PipelineOutput};
pub use sc_classify::{Classification, ClassifyConfig};
pub use sc_cluster::{ClusterAssignment, ClusterComposition, ClusterConfig, NeighborGraph, NeighborsConfig};
pub use sc_embed::Embedding2D;
pub use sc_labels::{LabelRenames, LabeledRecord};
pub use sc_normalize::NormalizedMatrix;
pub use sc_reduce::LatentEmbedding;
pub use sparse::SparseMatrix;
