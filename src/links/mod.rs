//! Online clustering of embedding streams.
//!
//! Vectors arrive one at a time and are grouped into a two-level hierarchy:
//! tight subclusters (running centroids) joined into clusters by similarity
//! edges. Each cluster is one connected component of that edge graph, so a
//! cluster can stretch along a slowly drifting identity while staying apart
//! from unrelated ones.
//!
//! # Architecture
//! - [`LinksCluster`] owns every cluster and makes all structural decisions
//! - [`Cluster`] holds its subclusters by position
//! - [`Subcluster`] refers to neighbours through [`SubclusterId`] handles, so
//!   the graph has no shared ownership
//! - [`Conversation`] windows record when each part of the hierarchy was active

mod cluster;
mod conversation;
mod engine;
mod similarity;
mod subcluster;
mod types;

// Re-export core types for public API
pub use cluster::Cluster;
pub use conversation::{Conversation, merge_conversation_list};
pub use engine::LinksCluster;
pub use similarity::{cosine_similarity, evidence_threshold};
pub use subcluster::Subcluster;
pub use types::{ClusterIndex, SubclusterId, Timestamp, VectorDimension};
