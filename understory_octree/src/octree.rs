// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public `Octree` API: routing, resizing, and neighbor discovery.

use alloc::vec::Vec;
use core::fmt;
use core::hash::Hash;
use core::mem;

use hashbrown::{HashMap, HashSet};
use smallvec::{SmallVec, smallvec};

use crate::config::{MergePolicy, OctreeConfig};
use crate::error::OctreeError;
use crate::node::{Arena, Kind, Node, NodeId, Slot, Slots};
use crate::observer::{Event, NoObserver, Observer};
use crate::types::{Face, Octant, Region, Vector3};

/// Anything the octree can file by position.
///
/// The octree reads the position once, when the entry is inserted, and
/// caches it. Moving an entry afterwards requires [`Octree::relocate`].
pub trait Positioned {
    /// Current position of the entry.
    fn position(&self) -> Vector3;
}

impl<T: Positioned + ?Sized> Positioned for &T {
    fn position(&self) -> Vector3 {
        (**self).position()
    }
}

/// Mutable octree over a bounded world.
///
/// Entries are handles (`E`) whose [`Eq`] and [`Hash`] define identity; they
/// must not depend on position. The octree keeps a reverse map from every
/// handle to the leaf holding it, so removal and relocation never search from
/// the root.
///
/// Leaves split into eight octants once they hold more than
/// [`OctreeConfig::capacity`] entries, and internal nodes fold back into a
/// leaf when their subtree empties (see [`MergePolicy`]). Structural changes
/// are reported to the observer `O`, which defaults to [`NoObserver`].
///
/// ## Example
///
/// ```rust
/// use understory_octree::{Octree, Positioned, Region, Vector3};
///
/// #[derive(Clone, PartialEq, Eq, Hash)]
/// struct Bead(u32);
///
/// impl Positioned for Bead {
///     fn position(&self) -> Vector3 {
///         Vector3::new(f64::from(self.0) * 0.5, 0.0, 0.0)
///     }
/// }
///
/// let world = Region::from_bounds([-10.0, 10.0, -10.0, 10.0, -10.0, 10.0]);
/// let mut tree = Octree::new(world, (0..10).map(Bead)).unwrap();
///
/// // Ten entries exceed the default capacity of seven.
/// assert_eq!(tree.is_leaf(tree.root()), Some(false));
/// assert_eq!(tree.size(), 10);
///
/// tree.remove(&Bead(0)).unwrap();
/// assert_eq!(tree.len(), 9);
/// assert!(tree.neighbors_of(&Bead(4), 0.5).unwrap().len() >= 2);
/// ```
pub struct Octree<E, O = NoObserver>
where
    E: Positioned + Clone + Eq + Hash,
    O: Observer,
{
    arena: Arena<E>,
    root: NodeId,
    world: Region,
    locate: HashMap<E, NodeId>,
    config: OctreeConfig,
    observer: O,
}

impl<E, O> fmt::Debug for Octree<E, O>
where
    E: Positioned + Clone + Eq + Hash,
    O: Observer,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Octree")
            .field("world", &self.world)
            .field("config", &self.config)
            .field("entries", &self.locate.len())
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

impl<E> Octree<E>
where
    E: Positioned + Clone + Eq + Hash,
{
    /// Build an octree over `world` holding `entries`, with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`Octree::with_observer`].
    pub fn new(world: Region, entries: impl IntoIterator<Item = E>) -> Result<Self, OctreeError> {
        Self::with_config(world, entries, OctreeConfig::default())
    }

    /// Build an octree over `world` holding `entries`.
    ///
    /// # Errors
    ///
    /// See [`Octree::with_observer`].
    pub fn with_config(
        world: Region,
        entries: impl IntoIterator<Item = E>,
        config: OctreeConfig,
    ) -> Result<Self, OctreeError> {
        Self::with_observer(world, entries, config, NoObserver)
    }
}

impl<E, O> Octree<E, O>
where
    E: Positioned + Clone + Eq + Hash,
    O: Observer,
{
    /// Build an octree that reports structural changes to `observer`.
    ///
    /// All entries are seeded into a single root leaf, which is then resized;
    /// this is where the initial split cascade happens.
    ///
    /// # Errors
    ///
    /// - [`OctreeError::InvalidRegion`] if `world` is empty or inverted.
    /// - [`OctreeError::OutOfBounds`] if an entry lies outside `world`.
    /// - [`OctreeError::Duplicate`] if the same handle appears twice.
    pub fn with_observer(
        world: Region,
        entries: impl IntoIterator<Item = E>,
        config: OctreeConfig,
        observer: O,
    ) -> Result<Self, OctreeError> {
        if !world.is_valid() {
            return Err(OctreeError::InvalidRegion(world));
        }
        let mut arena = Arena::new();
        let root = arena.alloc(world, 0, None);

        let mut slots = Slots::new();
        let mut locate = HashMap::new();
        for entry in entries {
            let position = entry.position();
            if !world.contains(position) {
                return Err(OctreeError::OutOfBounds { position });
            }
            if locate.insert(entry.clone(), root).is_some() {
                return Err(OctreeError::Duplicate);
            }
            slots.push(Slot { entry, position });
        }
        if let Some(root_slots) = arena.get_mut(root).and_then(Node::slots_mut) {
            *root_slots = slots;
        }

        let mut tree = Self {
            arena,
            root,
            world,
            locate,
            config,
            observer,
        };
        tree.resize_node(root);
        Ok(tree)
    }

    /// The region covered by the root.
    pub fn world(&self) -> Region {
        self.world
    }

    /// The active configuration.
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// The structural event sink.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Mutable access to the structural event sink.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// The root node. Stable for the lifetime of the octree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of tracked entries, from the reverse map.
    pub fn len(&self) -> usize {
        self.locate.len()
    }

    /// Whether no entries are tracked.
    pub fn is_empty(&self) -> bool {
        self.locate.is_empty()
    }

    /// Number of entries held by the leaves, counted by walking the whole tree.
    ///
    /// Always equal to [`Octree::len`]; meant as a consistency check.
    pub fn size(&self) -> usize {
        self.count_capped(self.root, usize::MAX)
    }

    /// Whether `entry` is tracked.
    pub fn contains(&self, entry: &E) -> bool {
        self.locate.contains_key(entry)
    }

    /// The leaf currently holding `entry`.
    pub fn leaf_of(&self, entry: &E) -> Option<NodeId> {
        self.locate.get(entry).copied()
    }

    /// The position `entry` is filed under.
    pub fn position_of(&self, entry: &E) -> Option<Vector3> {
        let leaf = self.leaf_of(entry)?;
        let slots = self.arena.get(leaf)?.slots()?;
        slots
            .iter()
            .find(|s| s.entry == *entry)
            .map(|s| s.position)
    }

    /// Whether `id` is a leaf. `None` if `id` is dead.
    pub fn is_leaf(&self, id: NodeId) -> Option<bool> {
        self.arena.get(id).map(Node::is_leaf)
    }

    /// The eight children of an internal node, indexed by [`Octant::index`].
    ///
    /// `None` for leaves and dead ids.
    pub fn children_of(&self, id: NodeId) -> Option<[NodeId; 8]> {
        self.arena.get(id)?.children().copied()
    }

    /// The parent of `id`. `None` for the root and dead ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id)?.parent
    }

    /// The nearest same-depth-or-coarser node across `face` of `id`.
    ///
    /// `None` on the world boundary and for dead ids. The returned node may be
    /// shallower than `id` and may itself be internal.
    pub fn adjacent(&self, id: NodeId, face: Face) -> Option<NodeId> {
        self.arena.get(id)?.adjacent[face.index()]
    }

    /// The region of `id`.
    pub fn region_of(&self, id: NodeId) -> Option<Region> {
        self.arena.get(id).map(|n| n.region)
    }

    /// Depth of `id`; the root is at depth 0.
    pub fn depth_of(&self, id: NodeId) -> Option<u8> {
        self.arena.get(id).map(|n| n.depth)
    }

    /// Number of entries below `id` (recursive, not cached).
    pub fn node_size(&self, id: NodeId) -> Option<usize> {
        self.arena
            .get(id)
            .map(|_| self.count_capped(id, usize::MAX))
    }

    /// Entries held directly by the leaf `id`, with their filed positions.
    ///
    /// Empty for internal nodes and dead ids.
    pub fn entries_of(&self, id: NodeId) -> impl Iterator<Item = (&E, Vector3)> + '_ {
        self.arena
            .get(id)
            .and_then(Node::slots)
            .into_iter()
            .flatten()
            .map(|s| (&s.entry, s.position))
    }

    /// Number of live nodes, leaves and internal.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        let mut leaves = 0;
        let mut stack: SmallVec<[NodeId; 32]> = smallvec![self.root];
        while let Some(id) = stack.pop() {
            match &self.node(id).kind {
                Kind::Leaf(_) => leaves += 1,
                Kind::Internal(children) => stack.extend(children.iter().copied()),
            }
        }
        leaves
    }

    /// The leaf whose region claims `point`.
    ///
    /// # Errors
    ///
    /// [`OctreeError::OutOfBounds`] if `point` is outside the world.
    pub fn locate_point(&self, point: Vector3) -> Result<NodeId, OctreeError> {
        if !self.world.contains(point) {
            return Err(OctreeError::OutOfBounds { position: point });
        }
        Ok(self.descend(point))
    }

    /// Start tracking `entry` at its current position.
    ///
    /// # Errors
    ///
    /// - [`OctreeError::OutOfBounds`] if the position is outside the world.
    /// - [`OctreeError::Duplicate`] if `entry` is already tracked.
    pub fn insert(&mut self, entry: E) -> Result<(), OctreeError> {
        let position = entry.position();
        if !self.world.contains(position) {
            return Err(OctreeError::OutOfBounds { position });
        }
        if self.locate.contains_key(&entry) {
            return Err(OctreeError::Duplicate);
        }
        let leaf = self.descend(position);
        self.push_slot(leaf, Slot { entry, position });
        self.resize_node(leaf);
        Ok(())
    }

    /// Stop tracking `entry`, returning the stored handle.
    ///
    /// Ancestors left without entries are collapsed.
    ///
    /// # Errors
    ///
    /// [`OctreeError::NotFound`] if `entry` is not tracked.
    pub fn remove(&mut self, entry: &E) -> Result<E, OctreeError> {
        let leaf = self.leaf_of(entry).ok_or(OctreeError::NotFound)?;
        let index = self.slot_index(leaf, entry)?;
        let slot = self.node_mut(leaf).remove_at(index)?;
        self.locate.remove(entry);
        self.collapse_upward(leaf);
        Ok(slot.entry)
    }

    /// Move `entry` to `position`.
    ///
    /// Equivalent to removing and reinserting with the new position, except
    /// that the entry is never observable as missing. A move that stays in
    /// the same leaf only updates the filed position.
    ///
    /// # Errors
    ///
    /// - [`OctreeError::OutOfBounds`] if `position` is outside the world.
    /// - [`OctreeError::NotFound`] if `entry` is not tracked.
    ///
    /// On error the entry keeps its previous position.
    pub fn relocate(&mut self, entry: &E, position: Vector3) -> Result<(), OctreeError> {
        if !self.world.contains(position) {
            return Err(OctreeError::OutOfBounds { position });
        }
        let leaf = self.leaf_of(entry).ok_or(OctreeError::NotFound)?;
        let index = self.slot_index(leaf, entry)?;

        let node = self.node_mut(leaf);
        if node.region.contains(position) {
            if let Some(slot) = node.slots_mut().and_then(|s| s.get_mut(index)) {
                slot.position = position;
            }
            return Ok(());
        }

        let mut slot = node.remove_at(index)?;
        slot.position = position;
        let target = self.descend(position);
        self.push_slot(target, slot);
        self.resize_node(target);
        self.collapse_upward(leaf);
        Ok(())
    }

    /// Drop every entry and reset to a single empty root leaf.
    ///
    /// Old node ids become dead; the root gets a fresh id.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.locate.clear();
        self.root = self.arena.alloc(self.world, 0, None);
    }

    /// Run a full resize pass from the root.
    ///
    /// Splits over-full leaves and collapses subtrees the merge policy allows.
    /// Every mutating operation already keeps the tree in shape, so this is a
    /// no-op unless the configuration changed; running it twice in a row never
    /// changes anything the second time.
    pub fn resize(&mut self) {
        self.resize_node(self.root);
    }

    /// Replace the configuration and reshape the tree to match it.
    pub fn set_config(&mut self, config: OctreeConfig) {
        self.config = config;
        self.resize();
    }

    /// Entries within `max_distance` of `entry`, using the configured hop limit.
    ///
    /// See [`Octree::visit_neighbors`] for the search contract.
    ///
    /// # Errors
    ///
    /// [`OctreeError::NotFound`] if `entry` is not tracked.
    pub fn neighbors_of(&self, entry: &E, max_distance: f64) -> Result<Vec<&E>, OctreeError> {
        self.neighbors_within_hops(entry, max_distance, self.config.max_hops)
    }

    /// Entries within `max_distance` of `entry`, following at most `hops` adjacency links.
    ///
    /// # Errors
    ///
    /// [`OctreeError::NotFound`] if `entry` is not tracked.
    pub fn neighbors_within_hops(
        &self,
        entry: &E,
        max_distance: f64,
        hops: usize,
    ) -> Result<Vec<&E>, OctreeError> {
        let mut out = Vec::new();
        self.visit_neighbors(entry, max_distance, hops, |e, _| out.push(e))?;
        Ok(out)
    }

    /// Entries within `max_distance` of an arbitrary in-world `point`.
    ///
    /// The search starts from the leaf claiming `point` and follows the
    /// configured hop limit.
    ///
    /// # Errors
    ///
    /// [`OctreeError::OutOfBounds`] if `point` is outside the world.
    pub fn neighbors_at(&self, point: Vector3, max_distance: f64) -> Result<Vec<&E>, OctreeError> {
        let leaf = self.locate_point(point)?;
        let mut out = Vec::new();
        self.visit_from(leaf, point, max_distance, self.config.max_hops, |e, _| {
            out.push(e);
        });
        Ok(out)
    }

    /// Visit entries within `max_distance` of `entry` (does not allocate result storage).
    ///
    /// Calls `f(entry, position)` once per match, in no particular order.
    /// `entry` itself is always reported, since it is at distance zero.
    ///
    /// The search starts in the leaf holding `entry` and then walks face
    /// adjacency outward for up to `hops` rounds. Adjacent nodes may be
    /// coarser than the starting leaf; their subtrees are descended and pruned
    /// by distance. Only nodes that lie within `max_distance` are expanded.
    /// Entries farther away than the walk reaches are not reported, so the
    /// result is exact only when `max_distance` stays within the explored
    /// neighborhood.
    ///
    /// # Errors
    ///
    /// [`OctreeError::NotFound`] if `entry` is not tracked.
    pub fn visit_neighbors<'a, F>(
        &'a self,
        entry: &E,
        max_distance: f64,
        hops: usize,
        f: F,
    ) -> Result<(), OctreeError>
    where
        F: FnMut(&'a E, Vector3),
    {
        let leaf = self.leaf_of(entry).ok_or(OctreeError::NotFound)?;
        let index = self.slot_index(leaf, entry)?;
        let origin = self
            .node(leaf)
            .slots()
            .and_then(|s| s.get(index))
            .map(|s| s.position)
            .ok_or(OctreeError::InvariantViolation(
                "reverse map points at a slot that does not exist",
            ))?;
        self.visit_from(leaf, origin, max_distance, hops, f);
        Ok(())
    }

    /// Check every structural invariant.
    ///
    /// # Errors
    ///
    /// [`OctreeError::InvariantViolation`] describing the first broken invariant.
    pub fn validate(&self) -> Result<(), OctreeError> {
        use OctreeError::InvariantViolation as Broken;

        let root = self.arena.get(self.root).ok_or(Broken("root is dead"))?;
        if root.parent.is_some() || root.depth != 0 {
            return Err(Broken("root has a parent or nonzero depth"));
        }
        if root.region != self.world {
            return Err(Broken("root region differs from the world"));
        }
        if root.adjacent.iter().any(Option::is_some) {
            return Err(Broken("root has adjacency links"));
        }

        let limit = self.collapse_limit();
        let mut entries = 0;
        let mut visited = 0;
        let mut stack: Vec<NodeId> = alloc::vec![self.root];
        while let Some(id) = stack.pop() {
            visited += 1;
            let node = self.arena.get(id).ok_or(Broken("child link to a dead node"))?;
            for adjacent in node.adjacent.iter().flatten() {
                let other = self
                    .arena
                    .get(*adjacent)
                    .ok_or(Broken("adjacency link to a dead node"))?;
                if other.depth > node.depth {
                    return Err(Broken("adjacency link to a finer node"));
                }
            }
            match &node.kind {
                Kind::Leaf(slots) => {
                    if slots.len() > self.config.capacity && node.depth < self.config.max_depth {
                        return Err(Broken("leaf holds more entries than its capacity"));
                    }
                    for slot in slots {
                        if !node.region.contains(slot.position) {
                            return Err(Broken("leaf holds an entry outside its region"));
                        }
                        if self.locate.get(&slot.entry) != Some(&id) {
                            return Err(Broken("reverse map disagrees with leaf contents"));
                        }
                    }
                    entries += slots.len();
                }
                Kind::Internal(children) => {
                    if self.count_capped(id, limit) <= limit {
                        return Err(Broken("internal node is eligible for collapse"));
                    }
                    for octant in Octant::ALL {
                        let child_id = children[octant.index()];
                        let child = self
                            .arena
                            .get(child_id)
                            .ok_or(Broken("child link to a dead node"))?;
                        if child.parent != Some(id) || child.depth != node.depth + 1 {
                            return Err(Broken("child does not link back to its parent"));
                        }
                        if child.region != node.region.octant_region(octant) {
                            return Err(Broken("child region does not tile its parent"));
                        }
                        for face in Face::ALL {
                            let expected = if octant.is_outward(face) {
                                node.adjacent[face.index()]
                            } else {
                                Some(children[octant.flip(face.axis()).index()])
                            };
                            if child.adjacent[face.index()] != expected {
                                return Err(Broken("child adjacency is miswired"));
                            }
                        }
                        stack.push(child_id);
                    }
                }
            }
        }

        if entries != self.locate.len() {
            return Err(Broken("leaf entry total differs from the reverse map"));
        }
        if visited != self.arena.len() {
            return Err(Broken("arena holds nodes unreachable from the root"));
        }
        Ok(())
    }

    fn node(&self, id: NodeId) -> &Node<E> {
        self.arena
            .get(id)
            .expect("octree invariant violated: link to a dead node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<E> {
        self.arena
            .get_mut(id)
            .expect("octree invariant violated: link to a dead node")
    }

    /// Route an in-world point to its leaf.
    ///
    /// Each step picks the child by comparing against the node's center, so a
    /// point on a shared boundary goes to the child that owns it as `min`, and
    /// routing cannot fall between children.
    fn descend(&self, point: Vector3) -> NodeId {
        let mut id = self.root;
        loop {
            let node = self.node(id);
            match &node.kind {
                Kind::Leaf(_) => return id,
                Kind::Internal(children) => {
                    id = children[node.region.octant_of(point).index()];
                }
            }
        }
    }

    fn push_slot(&mut self, leaf: NodeId, slot: Slot<E>) {
        self.locate.insert(slot.entry.clone(), leaf);
        self.node_mut(leaf)
            .slots_mut()
            .expect("octree invariant violated: entries routed to an internal node")
            .push(slot);
    }

    fn slot_index(&self, leaf: NodeId, entry: &E) -> Result<usize, OctreeError> {
        self.arena
            .get(leaf)
            .and_then(Node::slots)
            .and_then(|slots| slots.iter().position(|s| s.entry == *entry))
            .ok_or(OctreeError::InvariantViolation(
                "reverse map points at a leaf that does not hold the entry",
            ))
    }

    /// Count entries below `id`, stopping early once the count exceeds `cap`.
    fn count_capped(&self, id: NodeId, cap: usize) -> usize {
        let mut total = 0_usize;
        let mut stack: SmallVec<[NodeId; 32]> = smallvec![id];
        while let Some(id) = stack.pop() {
            match &self.node(id).kind {
                Kind::Leaf(slots) => {
                    total += slots.len();
                    if total > cap {
                        return total;
                    }
                }
                Kind::Internal(children) => stack.extend(children.iter().copied()),
            }
        }
        total
    }

    /// Largest subtree population an internal node may fold into one leaf.
    fn collapse_limit(&self) -> usize {
        match self.config.merge_policy {
            MergePolicy::Empty => 0,
            MergePolicy::Compact => self.config.capacity,
        }
    }

    fn should_collapse(&self, id: NodeId) -> bool {
        let limit = self.collapse_limit();
        !self.node(id).is_leaf() && self.count_capped(id, limit) <= limit
    }

    /// Enforce the capacity and merge rules on the subtree rooted at `id`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, level = "trace", name = "octree::resize")
    )]
    fn resize_node(&mut self, id: NodeId) {
        let node = self.node(id);
        match node.kind {
            Kind::Leaf(ref slots) => {
                if slots.len() > self.config.capacity && node.depth < self.config.max_depth {
                    self.split(id);
                }
            }
            Kind::Internal(children) => {
                if self.should_collapse(id) {
                    self.collapse(id);
                } else {
                    for child in children {
                        self.resize_node(child);
                    }
                }
            }
        }
    }

    /// Turn the leaf `id` into an internal node and re-home its entries.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, level = "debug", name = "octree::split")
    )]
    fn split(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        let Some(slots) = node.slots_mut().map(mem::take) else {
            return;
        };
        let (region, depth, outer) = (node.region, node.depth, node.adjacent);

        let children = Octant::ALL.map(|octant| {
            self.arena
                .alloc(region.octant_region(octant), depth + 1, Some(id))
        });
        // Faces shared with a sibling link to it; faces on this node's
        // boundary inherit this node's link, which may be coarser.
        for octant in Octant::ALL {
            let mut adjacent = [None; 6];
            for face in Face::ALL {
                adjacent[face.index()] = if octant.is_outward(face) {
                    outer[face.index()]
                } else {
                    Some(children[octant.flip(face.axis()).index()])
                };
            }
            self.node_mut(children[octant.index()]).adjacent = adjacent;
        }
        self.node_mut(id).kind = Kind::Internal(children);

        for slot in slots {
            let child = children[region.octant_of(slot.position).index()];
            self.push_slot(child, slot);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(?id, depth, "split");
        self.observer.on_event(&Event::Split {
            node: id,
            region,
            depth,
        });

        for child in children {
            self.resize_node(child);
        }
    }

    /// Release every descendant of `id` and make it a leaf holding their entries.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, level = "debug", name = "octree::collapse")
    )]
    fn collapse(&mut self, id: NodeId) {
        let Some(children) = self.node(id).children().copied() else {
            return;
        };
        let mut gathered: Slots<E> = Slots::new();
        let mut reclaimed = 0;
        let mut stack: SmallVec<[NodeId; 32]> = SmallVec::from_slice(&children);
        while let Some(child) = stack.pop() {
            let Some(freed) = self.arena.free(child) else {
                continue;
            };
            reclaimed += 1;
            match freed.kind {
                Kind::Leaf(slots) => gathered.extend(slots),
                Kind::Internal(grandchildren) => stack.extend(grandchildren),
            }
        }
        for slot in &gathered {
            if let Some(leaf) = self.locate.get_mut(&slot.entry) {
                *leaf = id;
            }
        }

        let entries = gathered.len();
        let node = self.node_mut(id);
        node.kind = Kind::Leaf(gathered);
        let (region, depth) = (node.region, node.depth);

        #[cfg(feature = "tracing")]
        tracing::debug!(?id, depth, reclaimed, entries, "collapse");
        self.observer.on_event(&Event::Collapse {
            node: id,
            region,
            depth,
            reclaimed,
            entries,
        });
    }

    /// Collapse the highest ancestor of `from` that the merge policy allows.
    fn collapse_upward(&mut self, from: NodeId) {
        let mut target = None;
        let mut cursor = self.node(from).parent;
        while let Some(id) = cursor {
            if !self.should_collapse(id) {
                break;
            }
            target = Some(id);
            cursor = self.node(id).parent;
        }
        if let Some(id) = target {
            self.collapse(id);
        }
    }

    fn visit_from<'a, F>(
        &'a self,
        leaf: NodeId,
        origin: Vector3,
        max_distance: f64,
        hops: usize,
        mut f: F,
    ) where
        F: FnMut(&'a E, Vector3),
    {
        if max_distance.is_nan() || max_distance < 0.0 {
            return;
        }
        let r2 = max_distance * max_distance;
        let mut seen: HashSet<&'a E> = HashSet::new();
        let mut expanded: HashSet<NodeId> = HashSet::new();
        expanded.insert(leaf);
        self.collect_within(leaf, origin, r2, &mut seen, &mut f);

        let mut frontier: SmallVec<[NodeId; 8]> = smallvec![leaf];
        for _ in 0..hops {
            let mut next: SmallVec<[NodeId; 8]> = SmallVec::new();
            for &id in &frontier {
                let Some(node) = self.arena.get(id) else {
                    continue;
                };
                for neighbor in node.adjacent.iter().flatten().copied() {
                    if !expanded.insert(neighbor) {
                        continue;
                    }
                    let Some(other) = self.arena.get(neighbor) else {
                        continue;
                    };
                    if other.region.distance_squared_to(origin) > r2 {
                        continue;
                    }
                    self.collect_within(neighbor, origin, r2, &mut seen, &mut f);
                    next.push(neighbor);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
    }

    /// Report entries of the subtree at `id` within `sqrt(r2)` of `origin`, descending
    /// only into children that can hold such entries.
    fn collect_within<'a, F>(
        &'a self,
        id: NodeId,
        origin: Vector3,
        r2: f64,
        seen: &mut HashSet<&'a E>,
        f: &mut F,
    ) where
        F: FnMut(&'a E, Vector3),
    {
        let mut stack: SmallVec<[NodeId; 32]> = smallvec![id];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match &node.kind {
                Kind::Leaf(slots) => {
                    for slot in slots {
                        if slot.position.distance_squared(origin) <= r2 && seen.insert(&slot.entry)
                        {
                            f(&slot.entry, slot.position);
                        }
                    }
                }
                Kind::Internal(children) => {
                    for &child in children {
                        if self.node(child).region.distance_squared_to(origin) <= r2 {
                            stack.push(child);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Axis;
    use alloc::vec;

    /// Entry whose identity is its id; position is carried along for insertion.
    #[derive(Clone, Debug)]
    struct Agent {
        id: u32,
        at: Vector3,
    }

    impl Agent {
        fn new(id: u32, x: f64, y: f64, z: f64) -> Self {
            Self {
                id,
                at: Vector3::new(x, y, z),
            }
        }
    }

    impl PartialEq for Agent {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for Agent {}

    impl Hash for Agent {
        fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl Positioned for Agent {
        fn position(&self) -> Vector3 {
            self.at
        }
    }

    fn world() -> Region {
        Region::from_bounds([-10.0, 10.0, -10.0, 10.0, -10.0, 10.0])
    }

    fn diagonal() -> Vec<Agent> {
        // -3.5, -3.0, ..., 3.5
        (0..15)
            .map(|i| {
                let v = -3.5 + f64::from(i) * 0.5;
                Agent::new(i, v, v, v)
            })
            .collect()
    }

    #[test]
    fn diagonal_entries_split_root() {
        let agents = diagonal();
        let tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        assert_eq!(tree.is_leaf(tree.root()), Some(false));
        assert!(tree.children_of(tree.root()).is_some());
        assert_eq!(tree.size(), agents.len());
        assert_eq!(tree.len(), agents.len());
        tree.validate().unwrap();
    }

    #[test]
    fn small_set_stays_a_single_leaf() {
        let agents: Vec<Agent> = (0..7).map(|i| Agent::new(i, 0.0, 0.0, 0.0)).collect();
        let tree = Octree::new(world(), agents).unwrap();
        assert_eq!(tree.is_leaf(tree.root()), Some(true));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.size(), 7);
    }

    #[test]
    fn construction_rejects_bad_input() {
        let inverted = Region::from_bounds([1.0, -1.0, 0.0, 1.0, 0.0, 1.0]);
        assert!(matches!(
            Octree::<Agent>::new(inverted, []),
            Err(OctreeError::InvalidRegion(_))
        ));

        let outside = vec![Agent::new(0, 0.0, 0.0, 0.0), Agent::new(1, 10.0, 0.0, 0.0)];
        assert_eq!(
            Octree::new(world(), outside).unwrap_err(),
            OctreeError::OutOfBounds {
                position: Vector3::new(10.0, 0.0, 0.0)
            }
        );

        let twice = vec![Agent::new(3, 0.0, 0.0, 0.0), Agent::new(3, 1.0, 1.0, 1.0)];
        assert_eq!(
            Octree::new(world(), twice).unwrap_err(),
            OctreeError::Duplicate
        );
    }

    #[test]
    fn split_wires_sibling_and_inherited_adjacency() {
        let agents: Vec<Agent> = (0..8)
            .map(|i| {
                let o = Octant::ALL[i as usize];
                let s = |axis| if o.is_positive(axis) { 5.0 } else { -5.0 };
                Agent::new(i, s(Axis::X), s(Axis::Y), s(Axis::Z))
            })
            .collect();
        let tree = Octree::new(world(), agents).unwrap();
        let children = tree.children_of(tree.root()).unwrap();

        let nnn = children[Octant::new(false, false, false).index()];
        let pnn = children[Octant::new(true, false, false).index()];
        let npn = children[Octant::new(false, true, false).index()];
        let nnp = children[Octant::new(false, false, true).index()];
        assert_eq!(tree.adjacent(nnn, Face::PosX), Some(pnn));
        assert_eq!(tree.adjacent(nnn, Face::PosY), Some(npn));
        assert_eq!(tree.adjacent(nnn, Face::PosZ), Some(nnp));
        assert_eq!(tree.adjacent(pnn, Face::NegX), Some(nnn));
        // The root has no neighbors, so outward faces are open.
        assert_eq!(tree.adjacent(nnn, Face::NegX), None);
        assert_eq!(tree.adjacent(pnn, Face::PosX), None);
        tree.validate().unwrap();
    }

    #[test]
    fn grandchildren_inherit_coarser_neighbors() {
        // Crowd the -X-Y-Z octant so it splits again.
        let agents: Vec<Agent> = (0..9)
            .map(|i| Agent::new(i, -9.0 + f64::from(i), -9.0 + f64::from(i), -9.0))
            .collect();
        let tree = Octree::new(world(), agents).unwrap();
        let children = tree.children_of(tree.root()).unwrap();
        let nnn = children[0];
        let pnn = children[Octant::new(true, false, false).index()];
        let grandchildren = tree.children_of(nnn).unwrap();

        // A +X grandchild's +X face inherits the -X-Y-Z child's link, one level coarser.
        let g = grandchildren[Octant::new(true, false, false).index()];
        assert_eq!(tree.adjacent(g, Face::PosX), Some(pnn));
        assert_eq!(tree.depth_of(g), Some(2));
        assert_eq!(tree.depth_of(pnn), Some(1));
        tree.validate().unwrap();
    }

    #[test]
    fn insert_routes_and_splits() {
        let mut tree = Octree::new(world(), Vec::<Agent>::new()).unwrap();
        for i in 0..8 {
            tree.insert(Agent::new(i, 1.0 + f64::from(i) * 0.1, 1.0, 1.0))
                .unwrap();
        }
        assert_eq!(tree.is_leaf(tree.root()), Some(false));
        let leaf = tree.leaf_of(&Agent::new(0, 0.0, 0.0, 0.0)).unwrap();
        assert!(
            tree.region_of(leaf)
                .unwrap()
                .contains(Vector3::new(1.0, 1.0, 1.0))
        );
        tree.validate().unwrap();
    }

    #[test]
    fn insert_rejects_outside_and_duplicates() {
        let mut tree = Octree::new(world(), [Agent::new(1, 0.0, 0.0, 0.0)]).unwrap();
        assert_eq!(
            tree.insert(Agent::new(2, 0.0, 10.0, 0.0)),
            Err(OctreeError::OutOfBounds {
                position: Vector3::new(0.0, 10.0, 0.0)
            })
        );
        assert_eq!(
            tree.insert(Agent::new(1, 2.0, 2.0, 2.0)),
            Err(OctreeError::Duplicate)
        );
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.position_of(&Agent::new(1, 0.0, 0.0, 0.0)), Some(Vector3::ZERO));
    }

    #[test]
    fn removing_everything_collapses_to_empty_root_leaf() {
        let agents = diagonal();
        let mut tree: Octree<Agent, Vec<Event>> = Octree::with_observer(
            world(),
            agents.iter().cloned(),
            OctreeConfig::default(),
            Vec::new(),
        )
        .unwrap();
        for a in &agents {
            tree.remove(a).unwrap();
            tree.validate().unwrap();
        }
        assert_eq!(tree.is_leaf(tree.root()), Some(true));
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.node_count(), 1);
        assert!(
            tree.observer()
                .iter()
                .any(|e| matches!(e, Event::Collapse { depth: 0, .. }))
        );
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let mut tree = Octree::new(world(), diagonal()).unwrap();
        assert_eq!(
            tree.remove(&Agent::new(99, 0.0, 0.0, 0.0)),
            Err(OctreeError::NotFound)
        );
        assert_eq!(tree.size(), 15);
    }

    #[test]
    fn relocate_within_leaf_updates_position_only() {
        let mut tree = Octree::new(world(), [Agent::new(1, 1.0, 1.0, 1.0)]).unwrap();
        let before = tree.node_count();
        let handle = Agent::new(1, 0.0, 0.0, 0.0);
        tree.relocate(&handle, Vector3::new(-3.0, 2.0, 9.5)).unwrap();
        assert_eq!(tree.node_count(), before);
        assert_eq!(tree.position_of(&handle), Some(Vector3::new(-3.0, 2.0, 9.5)));
    }

    #[test]
    fn relocate_across_leaves_moves_entry() {
        let agents = diagonal();
        let mut tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        let mover = &agents[0];
        let from = tree.leaf_of(mover).unwrap();
        tree.relocate(mover, Vector3::new(9.0, 9.0, 9.0)).unwrap();
        let to = tree.leaf_of(mover).unwrap();
        assert_ne!(from, to);
        assert!(
            tree.region_of(to)
                .unwrap()
                .contains(Vector3::new(9.0, 9.0, 9.0))
        );
        assert_eq!(tree.size(), agents.len());
        tree.validate().unwrap();
    }

    #[test]
    fn relocate_failures_leave_entry_in_place() {
        let agents = diagonal();
        let mut tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        let mover = &agents[3];
        let at = tree.position_of(mover);
        assert_eq!(
            tree.relocate(mover, Vector3::new(0.0, 0.0, 10.0)),
            Err(OctreeError::OutOfBounds {
                position: Vector3::new(0.0, 0.0, 10.0)
            })
        );
        assert_eq!(tree.position_of(mover), at);
        assert_eq!(
            tree.relocate(&Agent::new(77, 0.0, 0.0, 0.0), Vector3::ZERO),
            Err(OctreeError::NotFound)
        );
    }

    #[test]
    fn resize_is_idempotent() {
        let mut tree = Octree::new(world(), diagonal()).unwrap();
        let shape = |t: &Octree<Agent>| (t.node_count(), t.leaf_count(), t.size());
        let before = shape(&tree);
        tree.resize();
        assert_eq!(shape(&tree), before);
        tree.resize();
        assert_eq!(shape(&tree), before);
    }

    #[test]
    fn max_depth_stops_coincident_cascade() {
        let agents: Vec<Agent> = (0..20).map(|i| Agent::new(i, 1.0, 1.0, 1.0)).collect();
        let config = OctreeConfig::default().with_max_depth(3);
        let tree = Octree::with_config(world(), agents, config).unwrap();
        let leaf = tree.leaf_of(&Agent::new(0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(tree.depth_of(leaf), Some(3));
        assert_eq!(tree.entries_of(leaf).count(), 20);
        tree.validate().unwrap();
    }

    #[test]
    fn compact_policy_folds_sparse_subtrees() {
        let agents = diagonal();
        let config = OctreeConfig::default().with_merge_policy(MergePolicy::Compact);
        let mut tree = Octree::with_config(world(), agents.iter().cloned(), config).unwrap();
        for a in &agents[..8] {
            tree.remove(a).unwrap();
        }
        // Seven entries left: everything fits in the root again.
        assert_eq!(tree.is_leaf(tree.root()), Some(true));
        assert_eq!(tree.entries_of(tree.root()).count(), 7);
        for a in &agents[8..] {
            assert_eq!(tree.leaf_of(a), Some(tree.root()));
        }
        tree.validate().unwrap();
    }

    #[test]
    fn set_config_reshapes() {
        let mut tree = Octree::new(world(), diagonal()).unwrap();
        tree.set_config(OctreeConfig::default().with_capacity(32));
        // Empty policy keeps the populated subtree even though it would now fit.
        assert_eq!(tree.is_leaf(tree.root()), Some(false));
        tree.set_config(
            OctreeConfig::default()
                .with_capacity(32)
                .with_merge_policy(MergePolicy::Compact),
        );
        assert_eq!(tree.is_leaf(tree.root()), Some(true));
        tree.set_config(OctreeConfig::default());
        assert_eq!(tree.is_leaf(tree.root()), Some(false));
        tree.validate().unwrap();
    }

    #[test]
    fn neighbors_include_self_and_respect_distance() {
        let agents = diagonal();
        let tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        let origin_agent = &agents[7]; // at the origin
        let hits = tree.neighbors_of(origin_agent, 0.0).unwrap();
        assert_eq!(hits, vec![origin_agent]);

        // Neighbors on the diagonal are sqrt(3) * 0.5 ≈ 0.87 apart.
        let mut ids: Vec<u32> = tree
            .neighbors_of(origin_agent, 0.9)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, [6, 7, 8]);
    }

    #[test]
    fn neighbors_of_negative_distance_is_empty() {
        let tree = Octree::new(world(), diagonal()).unwrap();
        let hits = tree
            .neighbors_of(&Agent::new(7, 0.0, 0.0, 0.0), -1.0)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn neighbors_at_point_and_hop_limit() {
        let agents = diagonal();
        let tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        let hits = tree.neighbors_at(Vector3::new(3.5, 3.5, 3.5), 0.1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 14);

        // With zero hops only the starting leaf is searched.
        let origin_agent = &agents[7];
        let leaf = tree.leaf_of(origin_agent).unwrap();
        let local = tree.entries_of(leaf).count();
        let zero_hop = tree.neighbors_within_hops(origin_agent, 100.0, 0).unwrap();
        assert_eq!(zero_hop.len(), local);
        let wide = tree.neighbors_within_hops(origin_agent, 100.0, 8).unwrap();
        assert_eq!(wide.len(), agents.len());
    }

    #[test]
    fn validate_reports_corrupted_leaf() {
        let agents = diagonal();
        let mut tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        tree.validate().unwrap();

        let leaf = tree.leaf_of(&agents[0]).unwrap();
        let center = tree.region_of(leaf).unwrap().center();
        let stray = Slot {
            entry: Agent::new(99, center.x, center.y, center.z),
            position: center,
        };
        tree.arena
            .get_mut(leaf)
            .and_then(Node::slots_mut)
            .unwrap()
            .push(stray);
        assert!(matches!(
            tree.validate(),
            Err(OctreeError::InvariantViolation(_))
        ));
    }

    #[test]
    fn validate_reports_miswired_adjacency() {
        let agents = diagonal();
        let mut tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        let child = tree.children_of(tree.root()).unwrap()[0];
        let node = tree.arena.get_mut(child).unwrap();
        let face = Face::ALL
            .into_iter()
            .find(|f| node.adjacent[f.index()].is_some())
            .unwrap();
        node.adjacent[face.index()] = None;
        assert_eq!(
            tree.validate(),
            Err(OctreeError::InvariantViolation("child adjacency is miswired"))
        );
    }

    #[test]
    fn clear_resets_to_single_leaf() {
        let agents = diagonal();
        let mut tree = Octree::new(world(), agents.iter().cloned()).unwrap();
        let old_root = tree.root();
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert_ne!(tree.root(), old_root);
        assert_eq!(tree.is_leaf(old_root), None);
        tree.insert(agents[0].clone()).unwrap();
        tree.validate().unwrap();
    }
}
