#![allow(dead_code)]

use links_cluster::{LinksCluster, StreamEvent};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Feed every event through the engine. The bootstrap vector lands in
/// cluster 0, so it is reported as such.
pub fn replay(engine: &mut LinksCluster, events: &[StreamEvent]) -> Vec<usize> {
    events
        .iter()
        .map(|event| {
            engine
                .predict(&event.vector, event.timestamp)
                .expect("predict failed")
                .map_or(0, |index| index.get())
        })
        .collect()
}

/// Clusters each ground-truth identity was assigned to.
pub fn clusters_per_identity(
    events: &[StreamEvent],
    assignments: &[usize],
) -> BTreeMap<usize, BTreeSet<usize>> {
    let mut map: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (event, &cluster) in events.iter().zip(assignments) {
        if let Some(identity) = event.identity {
            map.entry(identity).or_default().insert(cluster);
        }
    }
    map
}

/// Unit vector in the x-y plane of a 3-dimensional space.
pub fn planar(degrees: f64) -> Vec<f32> {
    let radians = degrees.to_radians();
    vec![radians.cos() as f32, radians.sin() as f32, 0.0]
}

pub mod sample_settings {
    pub const CUSTOM: &str = r#"
version = 1
debug = false

[clustering]
cluster_similarity_threshold = 0.5
subcluster_similarity_threshold = 0.9
conversation_threshold = 10.0
store_vectors = true
"#;

    pub const INVALID_THRESHOLD: &str = r#"
[clustering]
cluster_similarity_threshold = 1.5
"#;
}
