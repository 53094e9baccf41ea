//! Subclusters: the finest-grained clustering unit.
//!
//! A subcluster keeps a running centroid of every vector folded into it, the
//! handles of the subclusters it shares a valid similarity edge with, and its
//! conversation windows.

use std::collections::BTreeSet;

use super::conversation::{self, Conversation};
use super::similarity::cosine_similarity;
use super::types::{SubclusterId, Timestamp, VectorDimension};
use crate::error::ClusterResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Subcluster {
    id: SubclusterId,
    centroid: Vec<f32>,
    vector_count: usize,
    store_vectors: bool,
    /// Raw vectors, only kept when `store_vectors` is set
    vectors: Vec<Vec<f32>>,
    connected_subclusters: BTreeSet<SubclusterId>,
    current_conversation: Option<Conversation>,
    /// Closed windows, sorted by start
    conversations: Vec<Conversation>,
}

impl Subcluster {
    /// Create a subcluster seeded with one vector.
    pub fn new(id: SubclusterId, vector: Vec<f32>, store_vectors: bool) -> Self {
        let vectors = if store_vectors {
            vec![vector.clone()]
        } else {
            Vec::new()
        };

        Self {
            id,
            centroid: vector,
            vector_count: 1,
            store_vectors,
            vectors,
            connected_subclusters: BTreeSet::new(),
            current_conversation: None,
            conversations: Vec::new(),
        }
    }

    /// Fold a vector into the running centroid.
    ///
    /// Uses `c' = c + (v - c) / (n + 1)`, which stays stable for large `n`.
    pub fn add(&mut self, vector: &[f32]) -> ClusterResult<()> {
        VectorDimension::new(self.centroid.len())?.validate_vector(vector)?;

        let weight = 1.0 / (self.vector_count + 1) as f64;
        for (c, &v) in self.centroid.iter_mut().zip(vector) {
            let current = f64::from(*c);
            *c = (current + (f64::from(v) - current) * weight) as f32;
        }
        self.vector_count += 1;

        if self.store_vectors {
            self.vectors.push(vector.to_vec());
        }
        Ok(())
    }

    /// Record activity at `instant`, extending or rolling the open window.
    pub fn record_activity(&mut self, instant: Timestamp, conversation_threshold: f64) {
        conversation::record_activity(
            &mut self.current_conversation,
            &mut self.conversations,
            instant,
            conversation_threshold,
        );
    }

    /// Fold `other` into `self`.
    ///
    /// The centroid becomes the count-weighted mean of both centroids, raw
    /// vectors are concatenated with `self`'s first, edges are united without
    /// either side's own handle, and conversation windows are combined.
    pub(crate) fn absorb(&mut self, other: Subcluster, conversation_threshold: f64) {
        let (n_self, n_other) = (self.vector_count as f64, other.vector_count as f64);
        let total = n_self + n_other;
        for (c, &o) in self.centroid.iter_mut().zip(&other.centroid) {
            *c = ((f64::from(*c) * n_self + f64::from(o) * n_other) / total) as f32;
        }
        self.vector_count += other.vector_count;
        self.vectors.extend(other.vectors);

        self.connected_subclusters.extend(other.connected_subclusters);
        self.connected_subclusters.remove(&self.id);
        self.connected_subclusters.remove(&other.id);

        let (current, history) = conversation::merge_temporal_state(
            self.current_conversation.take(),
            std::mem::take(&mut self.conversations),
            other.current_conversation,
            other.conversations,
            conversation_threshold,
        );
        self.current_conversation = current;
        self.conversations = history;
    }

    /// Cosine similarity between the two centroids.
    pub fn similarity(&self, other: &Subcluster) -> f64 {
        cosine_similarity(&self.centroid, &other.centroid)
    }

    /// Cosine similarity between the centroid and a raw vector.
    pub fn similarity_to_vector(&self, vector: &[f32]) -> f64 {
        cosine_similarity(&self.centroid, vector)
    }

    pub(crate) fn connect(&mut self, other: SubclusterId) {
        if other != self.id {
            self.connected_subclusters.insert(other);
        }
    }

    pub(crate) fn disconnect(&mut self, other: SubclusterId) -> bool {
        self.connected_subclusters.remove(&other)
    }

    /// Point an edge at `replacement` instead of `removed`.
    pub(crate) fn redirect_edge(&mut self, removed: SubclusterId, replacement: SubclusterId) {
        if self.connected_subclusters.remove(&removed) {
            self.connect(replacement);
        }
    }

    pub fn id(&self) -> SubclusterId {
        self.id
    }

    pub fn centroid(&self) -> &[f32] {
        &self.centroid
    }

    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    pub fn stores_vectors(&self) -> bool {
        self.store_vectors
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn connected_subclusters(&self) -> &BTreeSet<SubclusterId> {
        &self.connected_subclusters
    }

    pub fn is_connected_to(&self, other: SubclusterId) -> bool {
        self.connected_subclusters.contains(&other)
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current_conversation.as_ref()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Replace the open window, e.g. when replaying recorded activity.
    pub fn set_current_conversation(&mut self, conversation: Option<Conversation>) {
        self.current_conversation = conversation;
    }

    /// Replace the closed history. The list is re-sorted by start.
    pub fn set_conversations(&mut self, mut conversations: Vec<Conversation>) {
        conversation::sort_by_start(&mut conversations);
        self.conversations = conversations;
    }
}
