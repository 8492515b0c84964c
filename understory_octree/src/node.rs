// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for octree nodes.
//!
//! Nodes live in a flat vector and refer to each other by [`NodeId`]. Parent
//! and adjacency links are plain handles, so they never own anything; freeing
//! a subtree returns its slots to a free list.

use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;

use crate::error::OctreeError;
use crate::types::{Region, Vector3};

/// Identifier for a node in the octree (generational).
///
/// A handle stays valid until the node is released by a collapse; after that
/// every accessor treats it as dead, even if the slot is reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32, u32);

impl NodeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Node ids are intentionally 32-bit; an octree never holds 2^32 nodes."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// An entry handle together with the position the tree filed it under.
#[derive(Clone, Debug)]
pub(crate) struct Slot<E> {
    pub(crate) entry: E,
    pub(crate) position: Vector3,
}

/// Leaf storage. Sized so a default-capacity leaf about to split stays inline.
pub(crate) type Slots<E> = SmallVec<[Slot<E>; 8]>;

/// A node is exactly one of these.
#[derive(Clone, Debug)]
pub(crate) enum Kind<E> {
    Leaf(Slots<E>),
    Internal([NodeId; 8]),
}

#[derive(Clone, Debug)]
pub(crate) struct Node<E> {
    generation: u32,
    pub(crate) region: Region,
    pub(crate) depth: u8,
    pub(crate) parent: Option<NodeId>,
    /// Nearest same-depth-or-coarser node across each face, indexed by `Face::index`.
    pub(crate) adjacent: [Option<NodeId>; 6],
    pub(crate) kind: Kind<E>,
}

impl<E> Node<E> {
    fn new(generation: u32, region: Region, depth: u8, parent: Option<NodeId>) -> Self {
        Self {
            generation,
            region,
            depth,
            parent,
            adjacent: [None; 6],
            kind: Kind::Leaf(SmallVec::new()),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf(_))
    }

    pub(crate) fn slots(&self) -> Option<&Slots<E>> {
        match &self.kind {
            Kind::Leaf(slots) => Some(slots),
            Kind::Internal(_) => None,
        }
    }

    pub(crate) fn slots_mut(&mut self) -> Option<&mut Slots<E>> {
        match &mut self.kind {
            Kind::Leaf(slots) => Some(slots),
            Kind::Internal(_) => None,
        }
    }

    pub(crate) fn children(&self) -> Option<&[NodeId; 8]> {
        match &self.kind {
            Kind::Leaf(_) => None,
            Kind::Internal(children) => Some(children),
        }
    }

    /// Remove the slot at `index` from a leaf. Slot order is not preserved.
    pub(crate) fn remove_at(&mut self, index: usize) -> Result<Slot<E>, OctreeError> {
        let Some(slots) = self.slots_mut() else {
            return Err(OctreeError::InvariantViolation(
                "slot removal on an internal node",
            ));
        };
        if index >= slots.len() {
            return Err(OctreeError::IndexOutOfRange {
                index,
                len: slots.len(),
            });
        }
        Ok(slots.swap_remove(index))
    }
}

/// Slot arena with generational reuse, in the style of the box tree's node storage.
pub(crate) struct Arena<E> {
    nodes: Vec<Option<Node<E>>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl<E> fmt::Debug for Arena<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("nodes_total", &self.nodes.len())
            .field("nodes_alive", &self.len())
            .field("free_list", &self.free_list.len())
            .finish_non_exhaustive()
    }
}

impl<E> Arena<E> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Allocate an empty leaf.
    pub(crate) fn alloc(&mut self, region: Region, depth: u8, parent: Option<NodeId>) -> NodeId {
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, region, depth, parent));
            NodeId::new(idx, generation)
        } else {
            let generation = 1_u32;
            self.nodes
                .push(Some(Node::new(generation, region, depth, parent)));
            self.generations.push(generation);
            NodeId::new(self.nodes.len() - 1, generation)
        }
    }

    /// Release a node, returning its contents. Children are not touched.
    pub(crate) fn free(&mut self, id: NodeId) -> Option<Node<E>> {
        let slot = self.nodes.get_mut(id.idx())?;
        if slot.as_ref()?.generation != id.1 {
            return None;
        }
        let node = slot.take();
        self.free_list.push(id.idx());
        node
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<E>> {
        let node = self.nodes.get(id.idx())?.as_ref()?;
        (node.generation == id.1).then_some(node)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<E>> {
        let node = self.nodes.get_mut(id.idx())?.as_mut()?;
        (node.generation == id.1).then_some(node)
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Release every node. Generations survive, so old ids stay dead.
    pub(crate) fn clear(&mut self) {
        self.free_list.clear();
        for (idx, slot) in self.nodes.iter_mut().enumerate().rev() {
            *slot = None;
            self.free_list.push(idx);
        }
    }
}
