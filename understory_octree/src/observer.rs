// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural event sink.
//!
//! The octree reports every split and collapse to an [`Observer`]. The
//! default [`NoObserver`] discards them; callers who want visibility plug in
//! their own sink (a `Vec<Event>` works out of the box) or, with the
//! `tracing` feature, [`TracingObserver`].

use alloc::vec::Vec;

use crate::node::NodeId;
use crate::types::Region;

/// A structural change to the tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A leaf turned into an internal node with eight fresh children.
    Split {
        /// The node that split.
        node: NodeId,
        /// Its region.
        region: Region,
        /// Its depth (root is 0).
        depth: u8,
    },
    /// An internal node folded its subtree back into a single leaf.
    Collapse {
        /// The node that is now a leaf.
        node: NodeId,
        /// Its region.
        region: Region,
        /// Its depth (root is 0).
        depth: u8,
        /// Number of descendant nodes released.
        reclaimed: usize,
        /// Entries moved into the node (zero under `MergePolicy::Empty`).
        entries: usize,
    },
}

/// Receives [`Event`]s as the tree changes shape.
pub trait Observer {
    /// Called once per structural change, after the change is applied.
    fn on_event(&mut self, event: &Event);
}

/// Observer that ignores every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoObserver;

impl Observer for NoObserver {
    #[inline(always)]
    fn on_event(&mut self, _event: &Event) {}
}

impl Observer for Vec<Event> {
    fn on_event(&mut self, event: &Event) {
        self.push(event.clone());
    }
}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn on_event(&mut self, event: &Event) {
        (**self).on_event(event);
    }
}

/// Observer that forwards events to `tracing` at debug level.
#[cfg(feature = "tracing")]
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl Observer for TracingObserver {
    fn on_event(&mut self, event: &Event) {
        match event {
            Event::Split {
                node,
                region,
                depth,
            } => tracing::debug!(?node, ?region, depth, "octree node split"),
            Event::Collapse {
                node,
                region,
                depth,
                reclaimed,
                entries,
            } => tracing::debug!(
                ?node,
                ?region,
                depth,
                reclaimed,
                entries,
                "octree node collapsed"
            ),
        }
    }
}
