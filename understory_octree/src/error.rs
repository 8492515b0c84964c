// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by all fallible octree operations.

use core::fmt;

use crate::types::{Region, Vector3};

/// Why an octree operation failed.
///
/// Operations returning this error leave the octree exactly as it was.
#[derive(Clone, Debug, PartialEq)]
pub enum OctreeError {
    /// A position lies outside the region it was routed into.
    ///
    /// Usually a mismatch between the caller's world and the octree's world
    /// region. Remember that regions are half-open: a point on the world's
    /// `max` boundary is outside.
    OutOfBounds {
        /// The rejected position.
        position: Vector3,
    },
    /// The entry is not tracked by this octree.
    NotFound,
    /// The entry is already tracked by this octree.
    Duplicate,
    /// A slot position inside a leaf does not exist.
    IndexOutOfRange {
        /// The requested slot.
        index: usize,
        /// Number of slots in the leaf.
        len: usize,
    },
    /// The world region does not satisfy `min < max` on every axis.
    InvalidRegion(Region),
    /// A structural invariant does not hold; reported by `Octree::validate`.
    InvariantViolation(&'static str),
}

impl fmt::Display for OctreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { position } => write!(
                f,
                "position ({}, {}, {}) is outside the octree's region",
                position.x, position.y, position.z
            ),
            Self::NotFound => f.write_str("entry is not tracked by the octree"),
            Self::Duplicate => f.write_str("entry is already tracked by the octree"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "leaf slot {index} is out of range for {len} entries")
            }
            Self::InvalidRegion(region) => write!(
                f,
                "region {:?}..{:?} must have min < max on every axis",
                region.min, region.max
            ),
            Self::InvariantViolation(what) => write!(f, "octree invariant violated: {what}"),
        }
    }
}

impl core::error::Error for OctreeError {}
