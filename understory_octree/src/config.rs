// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tuning knobs for splitting, collapsing, and neighbor discovery.

/// When an internal node folds its subtree back into a single leaf.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MergePolicy {
    /// Collapse only subtrees holding no entries at all.
    #[default]
    Empty,
    /// Also collapse subtrees holding at most `capacity` entries, moving
    /// those entries into the resulting leaf.
    Compact,
}

/// Configuration for an [`Octree`][crate::Octree].
///
/// ```rust
/// use understory_octree::{MergePolicy, OctreeConfig};
///
/// let config = OctreeConfig::default()
///     .with_capacity(16)
///     .with_merge_policy(MergePolicy::Compact);
/// assert_eq!(config.capacity, 16);
/// assert_eq!(config.max_hops, 3);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OctreeConfig {
    /// A leaf holding more entries than this splits into eight octants.
    pub capacity: usize,
    /// Leaves at this depth never split, whatever their entry count.
    ///
    /// Guards against unbounded subdivision when more than `capacity` entries
    /// share (almost) the same position. The root is at depth 0.
    pub max_depth: u8,
    /// Adjacency hops followed by [`Octree::neighbors_of`][crate::Octree::neighbors_of].
    pub max_hops: usize,
    /// Collapse rule applied by the resize pass.
    pub merge_policy: MergePolicy,
}

impl OctreeConfig {
    /// Default leaf capacity.
    pub const DEFAULT_CAPACITY: usize = 7;
    /// Default depth guard.
    pub const DEFAULT_MAX_DEPTH: u8 = 24;
    /// Default hop limit for neighbor queries.
    pub const DEFAULT_MAX_HOPS: usize = 3;

    /// Create the default configuration.
    pub const fn new() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            max_hops: Self::DEFAULT_MAX_HOPS,
            merge_policy: MergePolicy::Empty,
        }
    }

    /// Set the leaf capacity. Clamped to at least 1.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Set the depth guard.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the default hop limit for neighbor queries.
    #[must_use]
    pub const fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Set the collapse rule.
    #[must_use]
    pub const fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self::new()
    }
}
