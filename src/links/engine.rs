//! Online clustering engine that assigns each incoming vector to a cluster.
//!
//! This module provides the main entry point for clustering, coordinating
//! subcluster membership, the similarity-edge graph and cluster maintenance.
//!
//! # Algorithm
//! For every vector:
//! 1. Find the subcluster whose centroid is most similar to the vector
//! 2. Above the subcluster threshold: fold the vector into that subcluster
//!    and re-check its edges (merging neighbours that became near-identical,
//!    severing edges that no longer hold, splitting the cluster if it fell
//!    apart)
//! 3. Above the cluster threshold: open a new subcluster in the same cluster,
//!    wired in with validated edges
//! 4. Otherwise: open a new cluster

use tracing::{debug, info, warn};

use super::cluster::Cluster;
use super::conversation::Conversation;
use super::similarity::evidence_threshold;
use super::subcluster::Subcluster;
use super::types::{ClusterIndex, SubclusterId, Timestamp, VectorDimension};
use crate::config::ClusteringConfig;
use crate::error::{ClusterError, ClusterResult};

/// Edge validity rule derived from the configuration.
#[derive(Debug, Clone, Copy)]
struct EdgePolicy {
    cluster_threshold: f64,
    pair_maximum: f64,
}

impl EdgePolicy {
    fn threshold(&self, k1: usize, k2: usize) -> f64 {
        evidence_threshold(k1, k2, self.cluster_threshold, self.pair_maximum)
    }

    /// Install or remove the edge between `a` and `b` depending on whether
    /// their centroids are still similar enough. Returns whether it holds.
    fn refresh(&self, a: &mut Subcluster, b: &mut Subcluster) -> bool {
        let similarity = a.similarity(b);
        let threshold = self.threshold(a.vector_count(), b.vector_count());

        if similarity >= threshold {
            LinksCluster::add_edge(a, b);
            true
        } else {
            a.disconnect(b.id());
            b.disconnect(a.id());
            false
        }
    }
}

/// Incremental two-level clusterer.
///
/// Holds every cluster in memory and has no internal locking; callers that
/// feed it from several threads must serialize access themselves.
#[derive(Debug, Clone)]
pub struct LinksCluster {
    clusters: Vec<Cluster>,
    config: ClusteringConfig,
    edges: EdgePolicy,
    /// Fixed by the first vector
    dimension: Option<VectorDimension>,
    /// `None` once every handle has been handed out
    next_subcluster_id: Option<SubclusterId>,
}

impl LinksCluster {
    /// Creates an empty engine.
    ///
    /// # Errors
    /// `InvalidConfig` when the parameters fail [`ClusteringConfig::validate`].
    pub fn new(config: ClusteringConfig) -> ClusterResult<Self> {
        config.validate()?;

        if config.cluster_similarity_threshold >= config.subcluster_similarity_threshold {
            warn!(
                "cluster_similarity_threshold ({}) is not below subcluster_similarity_threshold ({}); vectors will never open a subcluster inside an existing cluster",
                config.cluster_similarity_threshold, config.subcluster_similarity_threshold
            );
        }

        let edges = EdgePolicy {
            cluster_threshold: config.cluster_similarity_threshold,
            pair_maximum: config.pair_similarity_maximum,
        };

        Ok(Self {
            clusters: Vec::new(),
            config,
            edges,
            dimension: None,
            next_subcluster_id: SubclusterId::new(1),
        })
    }

    /// Assigns a vector to a cluster.
    ///
    /// # Arguments
    /// * `vector` - Embedding of one observation
    /// * `timestamp` - When it was observed, if conversation tracking is wanted
    ///
    /// # Returns
    /// The position of the assigned cluster, or `None` on the very first call
    /// when there is nothing to compare against yet.
    ///
    /// # Errors
    /// `EmptyVector` for a zero-length first vector, `ShapeMismatch` when the
    /// dimension differs from the first vector's, `NonFiniteVector` for NaN or
    /// infinite components, `SubclusterIdExhausted` when no handle is left for
    /// a new subcluster. The engine is unchanged on error.
    pub fn predict(
        &mut self,
        vector: &[f32],
        timestamp: Option<Timestamp>,
    ) -> ClusterResult<Option<ClusterIndex>> {
        let Some(dimension) = self.dimension else {
            let dimension = VectorDimension::new(vector.len())?;
            dimension.validate_vector(vector)?;
            let subcluster = self.create_subcluster(vector.to_vec(), timestamp)?;
            self.dimension = Some(dimension);
            self.clusters
                .push(Cluster::new(subcluster, self.config.conversation_threshold));
            info!("Clustering engine bootstrapped with dimension {}", dimension.get());
            return Ok(None);
        };
        dimension.validate_vector(vector)?;

        let Some((cluster_index, subcluster_index, similarity)) = self.nearest_subcluster(vector)
        else {
            let subcluster = self.create_subcluster(vector.to_vec(), timestamp)?;
            return Ok(Some(self.open_cluster(subcluster)));
        };

        if similarity >= self.config.subcluster_similarity_threshold {
            let threshold = self.config.conversation_threshold;
            let cluster = &mut self.clusters[cluster_index];
            let len = cluster.len();
            let subcluster = cluster
                .subcluster_mut(subcluster_index)
                .ok_or_else(|| ClusterError::subcluster_out_of_range(subcluster_index, len))?;
            subcluster.add(vector)?;
            if let Some(instant) = timestamp {
                subcluster.record_activity(instant, threshold);
            }
            let updated = subcluster.id();
            self.update_cluster(cluster_index, updated)?;
            return Ok(Some(ClusterIndex::new(cluster_index)));
        }

        let mut candidate = self.create_subcluster(vector.to_vec(), timestamp)?;
        if similarity >= self.config.cluster_similarity_threshold {
            match self.attach_subcluster(cluster_index, subcluster_index, candidate) {
                None => return Ok(Some(ClusterIndex::new(cluster_index))),
                Some(rejected) => candidate = rejected,
            }
        }

        Ok(Some(self.open_cluster(candidate)))
    }

    /// Unconditionally connects `a` and `b`.
    ///
    /// Bypasses the similarity check; meant for building graphs by hand.
    pub fn add_edge(a: &mut Subcluster, b: &mut Subcluster) {
        let (a_id, b_id) = (a.id(), b.id());
        a.connect(b_id);
        b.connect(a_id);
    }

    /// Re-evaluates the edge between `a` and `b`.
    ///
    /// Installs the edge when the centroid similarity reaches
    /// [`sim_threshold`](Self::sim_threshold) for their vector counts and
    /// removes it otherwise. Returns whether the edge is valid.
    pub fn update_edge(&self, a: &mut Subcluster, b: &mut Subcluster) -> bool {
        self.edges.refresh(a, b)
    }

    /// Similarity two centroids need to stay connected, given how many
    /// vectors back each of them.
    pub fn sim_threshold(&self, k1: usize, k2: usize) -> f64 {
        self.edges.threshold(k1, k2)
    }

    /// Every stored vector, cluster by cluster then subcluster by subcluster.
    ///
    /// Empty when the engine was configured without `store_vectors`.
    pub fn get_all_vectors(&self) -> Vec<&[f32]> {
        self.clusters.iter().flat_map(Cluster::vectors).collect()
    }

    /// Merges subcluster `j` into subcluster `i` inside one cluster.
    ///
    /// # Errors
    /// `IndexOutOfRange` for an unknown cluster or subcluster position,
    /// `SelfMerge` when `i == j`. Nothing is modified on error.
    pub fn merge_subclusters(&mut self, cluster_index: usize, i: usize, j: usize) -> ClusterResult<()> {
        let len = self.clusters.len();
        let cluster = self
            .clusters
            .get_mut(cluster_index)
            .ok_or_else(|| ClusterError::cluster_out_of_range(cluster_index, len))?;
        cluster.merge_subclusters(i, j)?;
        debug!("Merged subcluster {j} into {i} in cluster {cluster_index}");
        Ok(())
    }

    /// Merges cluster `j` into cluster `i`.
    ///
    /// `j`'s subclusters are appended to `i` and the most similar pair across
    /// the two is connected so the result stays one connected component.
    /// Clusters above `j` shift down by one.
    ///
    /// # Errors
    /// `IndexOutOfRange` for an unknown position, `SelfMerge` when `i == j`.
    pub fn merge_clusters(&mut self, i: usize, j: usize) -> ClusterResult<()> {
        let len = self.clusters.len();
        for index in [i, j] {
            if index >= len {
                return Err(ClusterError::cluster_out_of_range(index, len));
            }
        }
        if i == j {
            return Err(ClusterError::SelfMerge { index: i });
        }

        let mut removed = self.clusters.remove(j);
        let survivor_index = if i > j { i - 1 } else { i };
        let survivor = &mut self.clusters[survivor_index];

        let mut best: Option<(usize, usize, f64)> = None;
        for (a, left) in survivor.subclusters().iter().enumerate() {
            for (b, right) in removed.subclusters().iter().enumerate() {
                let similarity = left.similarity(right);
                if best.is_none_or(|(_, _, s)| similarity > s) {
                    best = Some((a, b, similarity));
                }
            }
        }

        if let Some((a, b, _)) = best {
            if let (Some(left), Some(right)) = (survivor.subcluster_mut(a), removed.subcluster_mut(b)) {
                Self::add_edge(left, right);
            }
        }
        survivor.append(removed);

        info!("Merged cluster {j} into cluster {i}");
        Ok(())
    }

    /// Conversation windows of one cluster, merged across its subclusters.
    pub fn conversation_list(&self, cluster_index: usize) -> ClusterResult<Vec<Conversation>> {
        self.clusters
            .get(cluster_index)
            .map(Cluster::calculate_conversation_list)
            .ok_or_else(|| ClusterError::cluster_out_of_range(cluster_index, self.clusters.len()))
    }

    /// Builds a detached subcluster with a fresh handle.
    ///
    /// Useful for wiring graphs by hand with [`add_edge`](Self::add_edge) and
    /// [`update_edge`](Self::update_edge).
    ///
    /// # Errors
    /// `SubclusterIdExhausted` once `u32::MAX` handles have been allocated.
    pub fn create_subcluster(
        &mut self,
        vector: Vec<f32>,
        timestamp: Option<Timestamp>,
    ) -> ClusterResult<Subcluster> {
        let id = self
            .next_subcluster_id
            .ok_or(ClusterError::SubclusterIdExhausted)?;
        self.next_subcluster_id = id.next();

        let mut subcluster = Subcluster::new(id, vector, self.config.store_vectors);
        if let Some(instant) = timestamp {
            subcluster.record_activity(instant, self.config.conversation_threshold);
        }
        Ok(subcluster)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, index: usize) -> Option<&Cluster> {
        self.clusters.get(index)
    }

    /// Mutable access to one cluster, e.g. to edit conversation windows.
    pub fn cluster_mut(&mut self, index: usize) -> Option<&mut Cluster> {
        self.clusters.get_mut(index)
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn subcluster_count(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }

    pub fn dimension(&self) -> Option<VectorDimension> {
        self.dimension
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Position and similarity of the subcluster closest to `vector`.
    fn nearest_subcluster(&self, vector: &[f32]) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (cluster_index, cluster) in self.clusters.iter().enumerate() {
            for (subcluster_index, subcluster) in cluster.subclusters().iter().enumerate() {
                let similarity = subcluster.similarity_to_vector(vector);
                if similarity.is_nan() {
                    continue;
                }
                if best.is_none_or(|(_, _, s)| similarity > s) {
                    best = Some((cluster_index, subcluster_index, similarity));
                }
            }
        }
        best
    }

    fn open_cluster(&mut self, subcluster: Subcluster) -> ClusterIndex {
        self.clusters
            .push(Cluster::new(subcluster, self.config.conversation_threshold));
        let index = self.clusters.len() - 1;
        debug!("Opened cluster {index}");
        ClusterIndex::new(index)
    }

    /// Adds `candidate` to the cluster holding the anchor.
    ///
    /// The candidate is only admitted if its edge to the anchor holds; it is
    /// also connected to every other member it has a valid edge with. A
    /// rejected candidate is handed back untouched.
    fn attach_subcluster(
        &mut self,
        cluster_index: usize,
        anchor_index: usize,
        mut candidate: Subcluster,
    ) -> Option<Subcluster> {
        let edges = self.edges;
        let cluster = &mut self.clusters[cluster_index];

        let Some(anchor) = cluster.subcluster_mut(anchor_index) else {
            return Some(candidate);
        };
        if !edges.refresh(anchor, &mut candidate) {
            debug!(
                "Edge to anchor {} rejected; opening a new cluster instead",
                anchor.id()
            );
            return Some(candidate);
        }

        for index in (0..cluster.len()).filter(|&index| index != anchor_index) {
            if let Some(member) = cluster.subcluster_mut(index) {
                edges.refresh(member, &mut candidate);
            }
        }

        debug!(
            "Opened subcluster {} in cluster {cluster_index} with {} edges",
            candidate.id(),
            candidate.connected_subclusters().len()
        );
        cluster.add_subcluster(candidate);
        None
    }

    /// Re-checks the edges of a subcluster that just absorbed a vector.
    ///
    /// Neighbours that became near-identical are merged into it, edges that
    /// no longer hold are dropped, and if the cluster fell apart the parts
    /// not containing `updated` move to new clusters at the end.
    fn update_cluster(&mut self, cluster_index: usize, updated: SubclusterId) -> ClusterResult<()> {
        let edges = self.edges;
        let merge_threshold = self.config.subcluster_similarity_threshold;
        let cluster = &mut self.clusters[cluster_index];

        let neighbours: Vec<SubclusterId> = cluster
            .position(updated)
            .and_then(|position| cluster.subcluster(position))
            .map(|sc| sc.connected_subclusters().iter().copied().collect())
            .unwrap_or_default();

        let mut severed = false;
        for neighbour in neighbours {
            let (Some(u), Some(n)) = (cluster.position(updated), cluster.position(neighbour))
            else {
                continue;
            };

            let (target, other) = cluster.pair_mut(u, n);
            if target.similarity(other) >= merge_threshold {
                cluster.merge_subclusters(u, n)?;
                debug!("Merged subcluster {neighbour} into {updated}");
            } else if !edges.refresh(target, other) {
                debug!("Severed edge {updated} - {neighbour}");
                severed = true;
            }
        }

        if severed {
            let split_off = cluster.split_disconnected(updated);
            for part in split_off {
                self.clusters.push(part);
                info!(
                    "Cluster {cluster_index} split; detached part is now cluster {}",
                    self.clusters.len() - 1
                );
            }
        }

        Ok(())
    }
}
