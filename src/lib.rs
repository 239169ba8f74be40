//! A loose octree over the triangles of a deforming mesh
//!
//! Faces are stored in the deepest node whose *loose* bounds, the node's cube enlarged by
//! [`Config::looseness`], contain them. Because the loose bounds of a node extend past its
//! cube, a face that moves a little after being inserted usually still fits where it is, so
//! [`Octree::realign`] is cheap for the small per-step motion of interactive editing.
//!
//! ```
//! use loose_octree::{Octree, Ray, Sphere, Triangle, Vec3};
//!
//! let mut tree = Octree::<()>::new();
//! tree.initialize(Vec3::ZERO, 10.0);
//! let face = tree.insert(
//!     Triangle::new(Vec3::new(-1.0, -1.0, 1.0), Vec3::new(1.0, -1.0, 1.0), Vec3::new(0.0, 1.0, 1.0)),
//!     (),
//! );
//!
//! let hit = tree.intersect_ray(&Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z)).unwrap();
//! assert_eq!(hit.face, face);
//! assert!(tree.intersect_sphere(&Sphere::new(Vec3::ZERO, 1.0)).contains(&face));
//!
//! // Nudging a face keeps it in place
//! let moved = Triangle::new(Vec3::new(-1.0, -1.0, 1.1), Vec3::new(1.0, -1.0, 1.1), Vec3::new(0.0, 1.0, 1.1));
//! assert!(!tree.realign(face, moved));
//! ```

use core::{array, mem};
use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

use arrayvec::ArrayVec;
use log::{debug, trace};
use slab::Slab;

mod config;
mod geometry;
mod id;
mod node;
pub mod traversal;

pub use config::{Config, ConfigError};
pub use geometry::{Aabb, FaceIntersection, Ray, Sphere, Triangle};
pub use glam::Vec3;
pub use id::{FaceId, NodeId};
pub use node::{FaceEntry, Node, NodeRef};

use id::IdAllocator;
use traversal::{Exclusive, Faces, Nodes, Shared};

const NOT_INITIALIZED: &str = "octree root is not initialized";

/// A loose octree of triangles, each carrying a value of type `T`
#[derive(Debug)]
pub struct Octree<T = ()> {
    config: Config,
    root: Option<usize>,
    nodes: Slab<Node<T>>,
    node_index: HashMap<NodeId, usize>,
    face_index: HashMap<FaceId, FaceSlot>,
    ids: IdAllocator,
}

/// Where a face entry lives
#[derive(Debug, Copy, Clone)]
struct FaceSlot {
    /// Arena key of the owning node
    node: usize,
    /// Index into the owning node's faces
    slot: usize,
}

impl<T> Octree<T> {
    /// Create an uninitialized tree with the default [`Config`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an uninitialized tree with a custom split policy
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            root: None,
            nodes: Slab::new(),
            node_index: HashMap::new(),
            face_index: HashMap::new(),
            ids: IdAllocator::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the root node, a cube of edge length `width` around `center`
    ///
    /// Panics if the tree is already initialized; call [`reset`](Self::reset) first.
    pub fn initialize(&mut self, center: Vec3, width: f32) {
        assert!(
            self.root.is_none(),
            "octree is already initialized; reset it first"
        );
        assert!(
            center.is_finite() && width.is_finite() && width > 0.0,
            "octree root must have a finite center and positive width, got {center} and {width}"
        );
        let root = self.alloc_node(center, width, 0, None);
        self.root = Some(root);
        debug!("initialized octree root {} at {center}, width {width}", self.nodes[root].id);
    }

    pub fn is_initialized(&self) -> bool {
        self.root.is_some()
    }

    /// Discard every node and face, returning to the uninitialized state
    ///
    /// Identifiers issued before the reset are never reissued.
    pub fn reset(&mut self) {
        debug!(
            "resetting octree with {} nodes and {} faces",
            self.nodes.len(),
            self.face_index.len()
        );
        self.root = None;
        self.nodes.clear();
        self.node_index.clear();
        self.face_index.clear();
    }

    /// Number of faces in the tree
    pub fn len(&self) -> usize {
        self.face_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.face_index.is_empty()
    }

    /// Loose bounds of the root, which contain every face
    pub fn bounds(&self) -> Option<Aabb> {
        self.root.map(|root| self.nodes[root].loose_bounds())
    }

    pub fn root(&self) -> Option<NodeRef<'_, T>> {
        self.root.map(|root| NodeRef::new(self, root))
    }

    /// Insert a face, returning an ID that can be used to access it directly
    ///
    /// Grows the root if `triangle` falls outside of it. Panics if the tree is not initialized or
    /// `triangle` is not finite.
    pub fn insert(&mut self, triangle: Triangle, value: T) -> FaceId {
        assert!(triangle.is_finite(), "triangle must be finite: {triangle:?}");
        let root = self.root_containing(&triangle.bounds());
        let id = self.ids.face();
        self.place(
            root,
            FaceEntry {
                id,
                triangle,
                value,
            },
        );
        id
    }

    /// Replace the cached geometry of face `id`, moving it to a different node if necessary
    ///
    /// Returns whether the face was relocated. A face whose new geometry still fits the loose
    /// bounds of its current node stays there. Otherwise it is moved up to the nearest ancestor
    /// that can hold it and reinserted from there, so the cost scales with the distance moved.
    ///
    /// Panics if `id` is not in the tree or `triangle` is not finite.
    pub fn realign(&mut self, id: FaceId, triangle: Triangle) -> bool {
        assert!(triangle.is_finite(), "triangle must be finite: {triangle:?}");
        let FaceSlot { node: owner, slot } = self.slot(id);
        let bounds = triangle.bounds();
        if self.nodes[owner].loose_bounds().contains(&bounds) {
            self.nodes[owner].faces[slot].triangle = triangle;
            return false;
        }

        let (_, mut entry) = self.unlink(id);
        entry.triangle = triangle;
        let mut cursor = self.nodes[owner].parent;
        let ancestor = loop {
            match cursor {
                Some(key) if self.nodes[key].loose_bounds().contains(&bounds) => break key,
                Some(key) => cursor = self.nodes[key].parent,
                None => break self.root_containing(&bounds),
            }
        };
        trace!(
            "relocating {id} from {} via {}",
            self.nodes[owner].id,
            self.nodes[ancestor].id
        );
        self.place(ancestor, entry);
        self.collapse_empty(owner);
        true
    }

    /// Remove face `id`, returning its value
    ///
    /// Frees the children of any node whose subtree no longer holds faces. Panics if `id` is not
    /// in the tree.
    pub fn remove(&mut self, id: FaceId) -> T {
        let (owner, entry) = self.unlink(id);
        self.collapse_empty(owner);
        entry.value
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.face_index.contains_key(&id)
    }

    /// Borrow face `id`
    pub fn get(&self, id: FaceId) -> Option<&FaceEntry<T>> {
        let FaceSlot { node, slot } = *self.face_index.get(&id)?;
        Some(&self.nodes[node].faces[slot])
    }

    /// Uniquely borrow face `id`
    pub fn get_mut(&mut self, id: FaceId) -> Option<&mut FaceEntry<T>> {
        let FaceSlot { node, slot } = *self.face_index.get(&id)?;
        Some(&mut self.nodes[node].faces[slot])
    }

    /// The node currently storing face `id`
    pub fn face_node(&self, id: FaceId) -> Option<NodeRef<'_, T>> {
        let slot = self.face_index.get(&id)?;
        Some(NodeRef::new(self, slot.node))
    }

    /// Look up a node by ID in constant time
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_, T>> {
        let key = *self.node_index.get(&id)?;
        Some(NodeRef::new(self, key))
    }

    /// Look up a node by ID by visiting every node in the tree
    ///
    /// Linear in the number of nodes. Unlike [`node`](Self::node), this does not rely on the
    /// node index.
    pub fn node_slow(&self, id: NodeId) -> Option<NodeRef<'_, T>> {
        self.nodes().find(|node| node.id == id)
    }

    /// Nearest face hit by `ray`
    ///
    /// Panics if the tree is not initialized.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<FaceIntersection> {
        let root = self.root.expect(NOT_INITIALIZED);
        self.intersect_ray_from(root, ray)
    }

    /// Faces that intersect `sphere`
    ///
    /// Panics if the tree is not initialized.
    pub fn intersect_sphere(&self, sphere: &Sphere) -> HashSet<FaceId> {
        let root = self.root.expect(NOT_INITIALIZED);
        NodeRef::new(self, root).intersect_sphere(sphere)
    }

    /// Vertices of the faces that intersect `sphere`, without duplicates
    ///
    /// `vertices` maps a face to its three vertices, typically by consulting the mesh through the
    /// face's value. Panics if the tree is not initialized.
    pub fn intersect_sphere_vertices<V, F>(&self, sphere: &Sphere, vertices: F) -> HashSet<V>
    where
        V: Eq + Hash,
        F: FnMut(&FaceEntry<T>) -> [V; 3],
    {
        let root = self.root.expect(NOT_INITIALIZED);
        NodeRef::new(self, root).intersect_sphere_vertices(sphere, vertices)
    }

    /// Double the root's width, extending it toward `toward`
    ///
    /// The old root becomes a child of the new one, so every existing node gets one level deeper.
    /// Panics if the tree is not initialized.
    pub fn grow_root(&mut self, toward: Vec3) {
        let old = self.root.expect(NOT_INITIALIZED);
        let (center, width, subtree_faces) = {
            let node = &self.nodes[old];
            (node.center, node.width, node.subtree_faces)
        };
        let direction = Vec3::select(toward.cmpge(center), Vec3::ONE, Vec3::NEG_ONE);
        let new_center = center + direction * (width * 0.5);
        let new_width = width * 2.0;

        for (_, node) in self.nodes.iter_mut() {
            node.depth += 1;
        }
        let root = self.alloc_node(new_center, new_width, 0, None);
        let old_octant = octant(new_center, center);
        let children: [usize; 8] = array::from_fn(|i| {
            if i == old_octant {
                old
            } else {
                self.alloc_node(octant_center(new_center, new_width, i), width, 1, Some(root))
            }
        });
        self.nodes[old].parent = Some(root);
        let node = &mut self.nodes[root];
        node.children = Some(children);
        node.subtree_faces = subtree_faces;
        self.root = Some(root);
        debug!(
            "grew octree root to {} at {new_center}, width {new_width}",
            self.nodes[root].id
        );
    }

    /// Replace the root with its only non-empty child for as long as the root stores no faces
    /// itself
    ///
    /// Returns whether the root changed. Panics if the tree is not initialized.
    pub fn shrink_root(&mut self) -> bool {
        self.root.expect(NOT_INITIALIZED);
        let mut shrunk = false;
        while let Some(root) = self.root {
            let node = &self.nodes[root];
            let Some(children) = node.children else {
                break;
            };
            if !node.faces.is_empty() {
                break;
            }
            let occupied = children
                .into_iter()
                .filter(|&child| self.nodes[child].subtree_faces > 0)
                .collect::<ArrayVec<usize, 8>>();
            let &[child] = occupied.as_slice() else {
                break;
            };

            for sibling in children {
                if sibling != child {
                    self.free_subtree(sibling);
                }
            }
            let old = self.nodes.remove(root);
            self.node_index.remove(&old.id);
            for (_, node) in self.nodes.iter_mut() {
                node.depth -= 1;
            }
            self.nodes[child].parent = None;
            self.root = Some(child);
            shrunk = true;
            debug!(
                "shrank octree root to {}, width {}",
                self.nodes[child].id, self.nodes[child].width
            );
        }
        shrunk
    }

    /// Walk every node, parents before children
    pub fn nodes(&self) -> Nodes<Shared<'_, T>> {
        Nodes::new(Shared::new(self), self.root)
    }

    /// Walk every node, parents before children, allowing their faces' values to be modified
    ///
    /// Visits nodes in the same order as [`nodes`](Self::nodes).
    pub fn nodes_mut(&mut self) -> Nodes<Exclusive<'_, T>> {
        let root = self.root;
        Nodes::new(Exclusive::new(&mut self.nodes), root)
    }

    /// Walk every face along with the depth of the node storing it
    pub fn faces(&self) -> Faces<Shared<'_, T>> {
        Faces::new(self.nodes())
    }

    /// Walk every face along with the depth of the node storing it, allowing values to be modified
    ///
    /// Visits faces in the same order as [`faces`](Self::faces).
    pub fn faces_mut(&mut self) -> Faces<Exclusive<'_, T>> {
        Faces::new(self.nodes_mut())
    }

    pub(crate) fn intersect_ray_from(&self, start: usize, ray: &Ray) -> Option<FaceIntersection> {
        let mut best: Option<FaceIntersection> = None;
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if node.subtree_faces == 0 {
                continue;
            }
            // Loose bounds overlap, so a node can only be skipped once a closer hit is known
            let Some(entry) = node.loose_bounds().ray_entry(ray) else {
                continue;
            };
            if best.is_some_and(|best| entry > best.distance) {
                continue;
            }
            for face in &node.faces {
                let Some(distance) = ray.intersect_triangle(&face.triangle) else {
                    continue;
                };
                if best.map_or(true, |best| distance < best.distance) {
                    best = Some(FaceIntersection {
                        face: face.id,
                        point: ray.point_at(distance),
                        distance,
                    });
                }
            }
            if let Some(children) = node.children {
                let mut order = children
                    .into_iter()
                    .filter_map(|child| {
                        let child_node = &self.nodes[child];
                        if child_node.subtree_faces == 0 {
                            return None;
                        }
                        let entry = child_node.loose_bounds().ray_entry(ray)?;
                        Some((entry, child))
                    })
                    .collect::<ArrayVec<(f32, usize), 8>>();
                // Farthest first, so the nearest child is popped next
                order.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));
                stack.extend(order.into_iter().map(|(_, child)| child));
            }
        }
        best
    }

    pub(crate) fn visit_sphere_from(
        &self,
        start: usize,
        sphere: &Sphere,
        mut visit: impl FnMut(&FaceEntry<T>),
    ) {
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if node.subtree_faces == 0 || !sphere.intersects_aabb(&node.loose_bounds()) {
                continue;
            }
            for face in &node.faces {
                if sphere.intersects_triangle(&face.triangle) {
                    visit(face);
                }
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    fn slot(&self, id: FaceId) -> FaceSlot {
        match self.face_index.get(&id) {
            Some(&slot) => slot,
            None => panic!("{id} is not in the octree"),
        }
    }

    /// Root of the tree, grown until its loose bounds contain `bounds`
    fn root_containing(&mut self, bounds: &Aabb) -> usize {
        loop {
            let root = self.root.expect(NOT_INITIALIZED);
            if self.nodes[root].loose_bounds().contains(bounds) {
                return root;
            }
            self.grow_root(bounds.center());
        }
    }

    fn alloc_node(&mut self, center: Vec3, width: f32, depth: u32, parent: Option<usize>) -> usize {
        let id = self.ids.node();
        let key = self.nodes.insert(Node::new(
            id,
            center,
            width,
            depth,
            self.config.looseness,
            parent,
        ));
        self.node_index.insert(id, key);
        key
    }

    /// Store `entry` in the deepest existing node under `start` that can hold it, splitting that
    /// node if it becomes overfull
    ///
    /// `start`'s loose bounds must contain the entry.
    fn place(&mut self, start: usize, entry: FaceEntry<T>) {
        let bounds = entry.triangle.bounds();
        let mut key = start;
        while let Some(children) = self.nodes[key].children {
            match self.fitting_child(&children, self.nodes[key].center, &bounds) {
                Some(child) => key = child,
                None => break,
            }
        }
        self.link(key, entry);
        if self.nodes[key].should_split(self.config.capacity, self.config.max_depth) {
            self.split(key);
        }
    }

    /// Child whose loose bounds contain `bounds`, preferring the octant holding its center
    fn fitting_child(&self, children: &[usize; 8], center: Vec3, bounds: &Aabb) -> Option<usize> {
        let first = octant(center, bounds.center());
        (0..8)
            .map(|i| children[(first + i) % 8])
            .find(|&child| self.nodes[child].loose_bounds().contains(bounds))
    }

    /// Give `node` eight children and move every face that fits one of them down a level
    fn split(&mut self, key: usize) {
        let (center, width, depth) = {
            let node = &self.nodes[key];
            (node.center, node.width, node.depth)
        };
        let children: [usize; 8] = array::from_fn(|i| {
            self.alloc_node(octant_center(center, width, i), width * 0.5, depth + 1, Some(key))
        });
        let node = &mut self.nodes[key];
        node.children = Some(children);
        let faces = mem::take(&mut node.faces);
        let total = faces.len();
        let mut migrated = 0;
        for entry in faces {
            match self.fitting_child(&children, center, &entry.triangle.bounds()) {
                Some(child) => {
                    self.attach(child, entry);
                    self.nodes[child].subtree_faces += 1;
                    migrated += 1;
                }
                None => self.attach(key, entry),
            }
        }
        debug!(
            "split {} at depth {depth}, moved {migrated} of {total} faces down",
            self.nodes[key].id
        );
    }

    /// Free the children of the highest ancestor of `key`, inclusive, whose subtree holds no faces
    fn collapse_empty(&mut self, key: usize) {
        let mut highest = None;
        let mut cursor = Some(key);
        while let Some(key) = cursor {
            let node = &self.nodes[key];
            if node.subtree_faces == 0 && node.children.is_some() {
                highest = Some(key);
            }
            cursor = node.parent;
        }
        let Some(key) = highest else {
            return;
        };
        if let Some(children) = self.nodes[key].children.take() {
            for child in children {
                self.free_subtree(child);
            }
            debug!("collapsed empty children of {}", self.nodes[key].id);
        }
    }

    /// Remove `key` and all of its descendants from the arena
    fn free_subtree(&mut self, key: usize) {
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            let node = self.nodes.remove(key);
            debug_assert!(node.faces.is_empty(), "freed a node holding faces");
            self.node_index.remove(&node.id);
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    /// Add `entry` to `key` without updating subtree counts
    fn attach(&mut self, key: usize, entry: FaceEntry<T>) {
        let node = &mut self.nodes[key];
        self.face_index.insert(
            entry.id,
            FaceSlot {
                node: key,
                slot: node.faces.len(),
            },
        );
        node.faces.push(entry);
    }

    /// Add `entry` to `key`
    fn link(&mut self, key: usize, entry: FaceEntry<T>) {
        self.attach(key, entry);
        let mut cursor = Some(key);
        while let Some(key) = cursor {
            let node = &mut self.nodes[key];
            node.subtree_faces += 1;
            cursor = node.parent;
        }
    }

    /// Remove face `id` from its node, returning the node's key and the entry
    fn unlink(&mut self, id: FaceId) -> (usize, FaceEntry<T>) {
        let FaceSlot { node: key, slot } = self.slot(id);
        self.face_index.remove(&id);
        let node = &mut self.nodes[key];
        let entry = node.faces.swap_remove(slot);
        if let Some(moved) = node.faces.get(slot) {
            self.face_index.insert(moved.id, FaceSlot { node: key, slot });
        }
        let mut cursor = Some(key);
        while let Some(key) = cursor {
            let node = &mut self.nodes[key];
            node.subtree_faces -= 1;
            cursor = node.parent;
        }
        (key, entry)
    }
}

impl<T> Default for Octree<T> {
    fn default() -> Self {
        Self {
            config: Config::default(),
            root: None,
            nodes: Slab::new(),
            node_index: HashMap::new(),
            face_index: HashMap::new(),
            ids: IdAllocator::default(),
        }
    }
}

/// Index of the octant of `center` containing `point`: bit 0 for +x, bit 1 for +y, bit 2 for +z
fn octant(center: Vec3, point: Vec3) -> usize {
    usize::from(point.x >= center.x)
        | usize::from(point.y >= center.y) << 1
        | usize::from(point.z >= center.z) << 2
}

/// Center of child `octant` of the cube of edge length `width` at `center`
fn octant_center(center: Vec3, width: f32, octant: usize) -> Vec3 {
    let offset = |bit: usize| if octant & bit != 0 { 0.25 } else { -0.25 };
    center + Vec3::new(offset(1), offset(2), offset(4)) * width
}
