//! Clusters: connected groups of subclusters.
//!
//! Subclusters are addressed by their position in the cluster. Positions above
//! a removed subcluster shift down after a merge, so callers must re-read
//! them; edges use [`SubclusterId`] handles and are unaffected.

use std::collections::{HashMap, VecDeque};

use super::conversation::{Conversation, merge_conversation_list};
use super::subcluster::Subcluster;
use super::types::SubclusterId;
use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    subclusters: Vec<Subcluster>,
    conversation_threshold: f64,
}

impl Cluster {
    /// Create a cluster holding a single subcluster.
    pub fn new(subcluster: Subcluster, conversation_threshold: f64) -> Self {
        Self {
            subclusters: vec![subcluster],
            conversation_threshold,
        }
    }

    /// Append a subcluster. Wiring its edges is the caller's job.
    pub fn add_subcluster(&mut self, subcluster: Subcluster) {
        self.subclusters.push(subcluster);
    }

    pub fn subclusters(&self) -> &[Subcluster] {
        &self.subclusters
    }

    pub fn subcluster(&self, index: usize) -> Option<&Subcluster> {
        self.subclusters.get(index)
    }

    /// Mutable access for folding vectors or editing conversation windows.
    ///
    /// Edges can only be changed through the engine.
    pub fn subcluster_mut(&mut self, index: usize) -> Option<&mut Subcluster> {
        self.subclusters.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.subclusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subclusters.is_empty()
    }

    /// Current position of the subcluster with handle `id`.
    pub fn position(&self, id: SubclusterId) -> Option<usize> {
        self.subclusters.iter().position(|sc| sc.id() == id)
    }

    pub fn vector_count(&self) -> usize {
        self.subclusters.iter().map(Subcluster::vector_count).sum()
    }

    /// Every stored raw vector, subcluster by subcluster.
    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.subclusters
            .iter()
            .flat_map(|sc| sc.vectors().iter().map(Vec::as_slice))
    }

    pub fn conversation_threshold(&self) -> f64 {
        self.conversation_threshold
    }

    /// Merge the subcluster at `j` into the one at `i`.
    ///
    /// # Errors
    /// `IndexOutOfRange` if either index is invalid, `SelfMerge` if `i == j`.
    /// Nothing is modified on error.
    pub fn merge_subclusters(&mut self, i: usize, j: usize) -> ClusterResult<()> {
        let len = self.subclusters.len();
        for index in [i, j] {
            if index >= len {
                return Err(ClusterError::subcluster_out_of_range(index, len));
            }
        }
        if i == j {
            return Err(ClusterError::SelfMerge { index: i });
        }

        let removed = self.subclusters.remove(j);
        let survivor_index = if i > j { i - 1 } else { i };
        let (removed_id, survivor_id) = (removed.id(), self.subclusters[survivor_index].id());

        self.subclusters[survivor_index].absorb(removed, self.conversation_threshold);
        for (index, sc) in self.subclusters.iter_mut().enumerate() {
            if index != survivor_index {
                sc.redirect_edge(removed_id, survivor_id);
            }
        }

        Ok(())
    }

    /// Merge every subcluster's conversation windows into one sequence.
    ///
    /// Collects each subcluster's history plus its open window, sorts by
    /// start and merges neighbours closer than the conversation threshold.
    pub fn calculate_conversation_list(&self) -> Vec<Conversation> {
        let all = self.subclusters.iter().flat_map(|sc| {
            sc.conversations()
                .iter()
                .copied()
                .chain(sc.current_conversation().copied())
        });
        merge_conversation_list(all, self.conversation_threshold)
    }

    /// Two distinct subclusters borrowed mutably at once.
    pub(crate) fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Subcluster, &mut Subcluster) {
        assert_ne!(a, b, "pair_mut needs two distinct positions");
        if a < b {
            let (left, right) = self.subclusters.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.subclusters.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Groups of positions that are mutually reachable through edges.
    ///
    /// Components are ordered by their lowest position and positions inside a
    /// component are ascending.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let positions: HashMap<SubclusterId, usize> = self
            .subclusters
            .iter()
            .enumerate()
            .map(|(index, sc)| (sc.id(), index))
            .collect();

        let mut component_of = vec![usize::MAX; self.subclusters.len()];
        let mut components: Vec<Vec<usize>> = Vec::new();

        for start in 0..self.subclusters.len() {
            if component_of[start] != usize::MAX {
                continue;
            }
            let label = components.len();
            let mut members = Vec::new();
            let mut queue = VecDeque::from([start]);
            component_of[start] = label;

            while let Some(index) = queue.pop_front() {
                members.push(index);
                for neighbour in self.subclusters[index].connected_subclusters() {
                    let Some(&next) = positions.get(neighbour) else {
                        continue;
                    };
                    if component_of[next] == usize::MAX {
                        component_of[next] = label;
                        queue.push_back(next);
                    }
                }
            }

            members.sort_unstable();
            components.push(members);
        }

        components
    }

    /// Split off every component that does not contain `keep`.
    ///
    /// `self` retains the component holding `keep`; the others come back as
    /// new clusters, in order of their lowest original position.
    pub(crate) fn split_disconnected(&mut self, keep: SubclusterId) -> Vec<Cluster> {
        let components = self.connected_components();
        if components.len() <= 1 {
            return Vec::new();
        }

        let Some(keep_position) = self.position(keep) else {
            return Vec::new();
        };

        let mut label = vec![0usize; self.subclusters.len()];
        for (component, members) in components.iter().enumerate() {
            for &member in members {
                label[member] = component;
            }
        }
        let keep_label = label[keep_position];

        let mut buckets: Vec<Vec<Subcluster>> = vec![Vec::new(); components.len()];
        for (index, sc) in std::mem::take(&mut self.subclusters).into_iter().enumerate() {
            buckets[label[index]].push(sc);
        }

        let mut split_off = Vec::with_capacity(components.len() - 1);
        for (component, subclusters) in buckets.into_iter().enumerate() {
            if component == keep_label {
                self.subclusters = subclusters;
            } else {
                split_off.push(Cluster {
                    subclusters,
                    conversation_threshold: self.conversation_threshold,
                });
            }
        }
        split_off
    }

    /// Move every subcluster of `other` to the end of `self`.
    pub(crate) fn append(&mut self, other: Cluster) {
        self.subclusters.extend(other.subclusters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const DIM: usize = 256;
    const THRESHOLD: f64 = 30.0;

    fn random_vec() -> Vec<f32> {
        let mut rng = rand::rng();
        (0..DIM).map(|_| rng.random::<f32>()).collect()
    }

    fn subcluster(n: u32) -> Subcluster {
        Subcluster::new(SubclusterId::new_unchecked(n), random_vec(), true)
    }

    fn link(cluster: &mut Cluster, a: usize, b: usize) {
        let (left, right) = cluster.pair_mut(a, b);
        let (left_id, right_id) = (left.id(), right.id());
        left.connect(right_id);
        right.connect(left_id);
    }

    #[test]
    fn test_new_cluster() {
        let cluster = Cluster::new(subcluster(1), THRESHOLD);
        assert_eq!(cluster.len(), 1);
        assert!(!cluster.is_empty());
        assert_eq!(cluster.vector_count(), 1);
    }

    #[test]
    fn test_merge_subclusters() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));
        link(&mut cluster, 0, 1);

        assert_eq!(cluster.len(), 2);
        cluster.merge_subclusters(0, 1).unwrap();

        assert_eq!(cluster.len(), 1);
        let merged = &cluster.subclusters()[0];
        assert_eq!(merged.vector_count(), 2);
        assert_eq!(merged.vectors().len(), 2);
        assert!(merged.connected_subclusters().is_empty());
    }

    #[test]
    fn test_merge_subclusters_connections() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));
        cluster.add_subcluster(subcluster(3));
        link(&mut cluster, 0, 1);
        link(&mut cluster, 0, 2);
        link(&mut cluster, 1, 2);

        cluster.merge_subclusters(0, 2).unwrap();

        assert_eq!(cluster.len(), 2);
        let survivor = &cluster.subclusters()[0];
        assert_eq!(survivor.vector_count(), 2);
        assert_eq!(survivor.vectors().len(), 2);
        let edges: Vec<u32> = survivor.connected_subclusters().iter().map(|i| i.get()).collect();
        assert_eq!(edges, vec![2]);

        // The third party now points at the survivor only
        let other = &cluster.subclusters()[1];
        let edges: Vec<u32> = other.connected_subclusters().iter().map(|i| i.get()).collect();
        assert_eq!(edges, vec![1]);
    }

    #[test]
    fn test_merge_into_later_index() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));
        cluster.add_subcluster(subcluster(3));
        link(&mut cluster, 0, 2);
        link(&mut cluster, 1, 2);

        // Merge position 0 into position 2; survivor shifts to position 1
        cluster.merge_subclusters(2, 0).unwrap();
        assert_eq!(cluster.len(), 2);
        assert_eq!(cluster.subclusters()[1].id().get(), 3);
        assert_eq!(cluster.subclusters()[1].vector_count(), 2);
        assert!(cluster.subclusters()[0].is_connected_to(SubclusterId::new_unchecked(3)));
    }

    #[test]
    fn test_merge_rejects_bad_indices_without_mutation() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));
        let before = cluster.clone();

        assert_eq!(
            cluster.merge_subclusters(0, 5),
            Err(ClusterError::IndexOutOfRange {
                target: "subcluster",
                index: 5,
                len: 2
            })
        );
        assert_eq!(
            cluster.merge_subclusters(1, 1),
            Err(ClusterError::SelfMerge { index: 1 })
        );
        assert_eq!(cluster, before);
    }

    #[test]
    fn test_merge_conversation_windows() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));
        cluster
            .subcluster_mut(0)
            .unwrap()
            .set_current_conversation(Some(Conversation::new(1.0, 3.0)));
        cluster
            .subcluster_mut(1)
            .unwrap()
            .set_current_conversation(Some(Conversation::new(200.0, 400.0)));

        cluster.merge_subclusters(0, 1).unwrap();
        let merged = &cluster.subclusters()[0];
        assert_eq!(
            merged.current_conversation(),
            Some(&Conversation::new(200.0, 400.0))
        );
        assert_eq!(merged.conversations(), &[Conversation::new(1.0, 3.0)]);
    }

    #[test]
    fn test_calculate_conversation_list() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));

        let mut rng = rand::rng();
        let mut times: Vec<u32> = rand::seq::index::sample(&mut rng, 30_000, 400)
            .into_iter()
            .map(|t| t as u32)
            .collect();
        times.sort_unstable();

        let mut first = Vec::new();
        let mut second = Vec::new();
        for chunk in times.chunks(4) {
            first.push(Conversation::new(f64::from(chunk[0]), f64::from(chunk[2])));
            second.push(Conversation::new(f64::from(chunk[1]), f64::from(chunk[3])));
        }
        cluster.subcluster_mut(0).unwrap().set_conversations(first);
        cluster.subcluster_mut(1).unwrap().set_conversations(second);
        cluster
            .subcluster_mut(1)
            .unwrap()
            .set_current_conversation(Some(Conversation::new(30_100.0, 30_200.0)));

        let conversations = cluster.calculate_conversation_list();
        assert!(!conversations.is_empty());
        assert_eq!(
            conversations.last(),
            Some(&Conversation::new(30_100.0, 30_200.0))
        );
        for pair in conversations.windows(2) {
            assert!(pair[1].start() >= pair[0].end() + THRESHOLD);
        }
    }

    #[test]
    fn test_connected_components_and_split() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        for n in 2..=5 {
            cluster.add_subcluster(subcluster(n));
        }
        link(&mut cluster, 0, 2);
        link(&mut cluster, 1, 3);
        // 4 is isolated

        assert_eq!(
            cluster.connected_components(),
            vec![vec![0, 2], vec![1, 3], vec![4]]
        );

        let split_off = cluster.split_disconnected(SubclusterId::new_unchecked(2));
        let kept: Vec<u32> = cluster.subclusters().iter().map(|sc| sc.id().get()).collect();
        assert_eq!(kept, vec![2, 4]);
        assert_eq!(split_off.len(), 2);
        let first: Vec<u32> = split_off[0].subclusters().iter().map(|sc| sc.id().get()).collect();
        assert_eq!(first, vec![1, 3]);
        assert_eq!(split_off[1].subclusters()[0].id().get(), 5);
    }

    #[test]
    fn test_split_connected_cluster_is_noop() {
        let mut cluster = Cluster::new(subcluster(1), THRESHOLD);
        cluster.add_subcluster(subcluster(2));
        link(&mut cluster, 0, 1);
        assert!(cluster.split_disconnected(SubclusterId::new_unchecked(1)).is_empty());
        assert_eq!(cluster.len(), 2);
    }
}
