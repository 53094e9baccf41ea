//! Type-safe wrappers and core types for the clustering engine.
//!
//! This module provides newtypes that keep subcluster handles, cluster
//! positions and vector dimensions from being mixed up with plain integers.

use std::num::NonZeroU32;

use crate::error::ClusterError;

/// Seconds on whatever clock the producer of the stream uses.
pub type Timestamp = f64;

/// Stable handle for a subcluster.
///
/// Uses `NonZeroU32` internally so `Option<SubclusterId>` costs nothing and
/// zero never shows up as a valid handle. Handles are never reused, so an edge
/// set can never point at the wrong subcluster after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubclusterId(NonZeroU32);

impl SubclusterId {
    /// Creates a new `SubclusterId` from a non-zero u32.
    ///
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Creates a new `SubclusterId` from a non-zero u32, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u32) -> Self {
        Self(NonZeroU32::new(id).expect("SubclusterId cannot be zero"))
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// The handle allocated after this one, or `None` once `u32` runs out.
    #[must_use]
    pub(crate) fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for SubclusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sc{}", self.0)
    }
}

/// Position of a cluster inside the engine.
///
/// This is what `predict` hands back. It is positional: a later
/// [`merge_clusters`](crate::links::LinksCluster::merge_clusters) shifts
/// every cluster above the removed one down by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterIndex(usize);

impl ClusterIndex {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ClusterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ClusterIndex> for usize {
    fn from(index: ClusterIndex) -> usize {
        index.0
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// The first vector an engine sees fixes its dimension; every later vector is
/// checked against it before any state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, ClusterError> {
        if dim == 0 {
            return Err(ClusterError::EmptyVector);
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension and only finite
    /// components.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), ClusterError> {
        if vector.len() != self.0 {
            return Err(ClusterError::ShapeMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
            return Err(ClusterError::NonFiniteVector { index });
        }
        Ok(())
    }
}
