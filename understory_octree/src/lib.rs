// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_octree --heading-base-level=0

//! Understory Octree: a mutable 3D spatial index over moving entries.
//!
//! Understory Octree keeps a set of positioned entries filed by where they are,
//! so that "who is near me?" does not require scanning everything.
//!
//! - Build from a world region and an initial set of entries, then insert,
//!   remove, and relocate entries as they move.
//! - Leaves split into eight octants once they hold more than a configured
//!   capacity; emptied subtrees fold back into a single leaf.
//! - Every node keeps a link to the nearest node across each of its six faces,
//!   so neighbor queries walk outward from an entry's own leaf instead of
//!   starting at the root.
//! - A reverse map from entry to leaf makes removal and relocation direct.
//!
//! Regions are half-open (`min <= p < max` on every axis): a point on a shared
//! boundary belongs to exactly one leaf, the one that has it as its `min`.
//!
//! Entries are any handle type implementing [`Positioned`], [`Clone`], [`Eq`]
//! and [`Hash`]. Identity comes from `Eq`/`Hash`, so it must not depend on the
//! position; cheap ids or reference-counted handles work well.
//!
//! ## Features
//!
//! - `std` *(default)*: float math from the standard library.
//! - `libm`: float math from `libm`, for `no_std` builds. One of `std` or
//!   `libm` must be enabled.
//! - `tracing`: emit `tracing` spans and events for splits and collapses, and
//!   provide [`TracingObserver`].
//!
//! # Example
//!
//! ```rust
//! use understory_octree::{Octree, OctreeConfig, Positioned, Region, Vector3};
//!
//! /// A boid handle; its starting position is derived from the id.
//! #[derive(Clone, Debug, PartialEq, Eq, Hash)]
//! struct Boid(u32);
//!
//! impl Positioned for Boid {
//!     fn position(&self) -> Vector3 {
//!         Vector3::new(f64::from(self.0) - 6.0, 0.0, 0.0)
//!     }
//! }
//!
//! let world = Region::from_bounds([-16.0, 16.0, -16.0, 16.0, -16.0, 16.0]);
//! let flock: Vec<Boid> = (0..12).map(Boid).collect();
//!
//! let mut tree = Octree::with_config(world, flock.iter().cloned(), OctreeConfig::default())
//!     .unwrap();
//! assert_eq!(tree.size(), 12);
//!
//! // The boid at the origin sees itself and the boids one unit to either side.
//! let near = tree.neighbors_of(&flock[6], 1.0).unwrap();
//! assert_eq!(near.len(), 3);
//!
//! // Move a boid far away; the tree re-files it.
//! tree.relocate(&flock[0], Vector3::new(12.0, 12.0, 12.0)).unwrap();
//! assert_eq!(tree.position_of(&flock[0]), Some(Vector3::new(12.0, 12.0, 12.0)));
//! tree.validate().unwrap();
//! ```
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs in positions or regions. A NaN coordinate fails
//! every containment test, so such an entry is rejected as out of bounds.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("understory_octree requires either the `std` or `libm` feature");

mod config;
mod error;
mod node;
mod observer;
mod octree;
mod types;
pub(crate) mod util;

pub use config::{MergePolicy, OctreeConfig};
pub use error::OctreeError;
pub use node::NodeId;
#[cfg(feature = "tracing")]
pub use observer::TracingObserver;
pub use observer::{Event, NoObserver, Observer};
pub use octree::{Octree, Positioned};
pub use types::{Axis, Face, Octant, Region, Vector3};
