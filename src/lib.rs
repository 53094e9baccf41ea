/// The main library module for links-cluster
pub mod config;
pub mod error;
pub mod exit_code;
pub mod links;
pub mod simulate;

// Explicit exports for better API clarity
pub use config::{ClusteringConfig, Settings};
pub use error::{ClusterError, ClusterResult, ConfigError};
pub use links::{
    Cluster, ClusterIndex, Conversation, LinksCluster, Subcluster, SubclusterId, Timestamp,
    VectorDimension,
};
pub use simulate::{StreamEvent, StreamGenerator};
