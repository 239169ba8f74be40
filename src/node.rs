use core::{fmt, ops::Deref, slice};
use std::{collections::HashSet, hash::Hash};

use glam::Vec3;

use crate::{
    traversal::{Nodes, Shared},
    Aabb, FaceId, FaceIntersection, NodeId, Octree, Ray, Sphere, Triangle,
};

/// A face as last reported to the tree
#[derive(Debug)]
pub struct FaceEntry<T> {
    pub(crate) id: FaceId,
    pub(crate) triangle: Triangle,
    pub(crate) value: T,
}

impl<T> FaceEntry<T> {
    pub fn id(&self) -> FaceId {
        self.id
    }

    /// Geometry the face was last inserted or realigned with
    pub fn triangle(&self) -> &Triangle {
        &self.triangle
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// A cube of space, owning the faces that fit its loose bounds but none of its children's
#[derive(Debug)]
pub struct Node<T> {
    pub(crate) id: NodeId,
    pub(crate) center: Vec3,
    pub(crate) width: f32,
    pub(crate) depth: u32,
    pub(crate) looseness: f32,
    pub(crate) parent: Option<usize>,
    /// Arena keys, indexed by octant
    pub(crate) children: Option<[usize; 8]>,
    pub(crate) faces: Vec<FaceEntry<T>>,
    /// Faces stored in this node and all of its descendants
    pub(crate) subtree_faces: usize,
}

impl<T> Node<T> {
    pub(crate) fn new(
        id: NodeId,
        center: Vec3,
        width: f32,
        depth: u32,
        looseness: f32,
        parent: Option<usize>,
    ) -> Self {
        Self {
            id,
            center,
            width,
            depth,
            looseness,
            parent,
            children: None,
            faces: Vec::new(),
            subtree_faces: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Distance from the root, which has depth 0
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Edge length of the node's cube
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Edge length of the enlarged cube used for containment tests
    pub fn loose_width(&self) -> f32 {
        self.width * self.looseness
    }

    pub fn looseness(&self) -> f32 {
        self.looseness
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_width(self.center, self.width)
    }

    pub fn loose_bounds(&self) -> Aabb {
        Aabb::from_center_width(self.center, self.loose_width())
    }

    /// Number of faces stored directly in this node
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Whether this node has children
    pub fn is_split(&self) -> bool {
        self.children.is_some()
    }

    /// Faces stored directly in this node, excluding descendants
    pub fn faces(&self) -> slice::Iter<'_, FaceEntry<T>> {
        self.faces.iter()
    }

    /// Faces stored directly in this node, excluding descendants
    ///
    /// Visits faces in the same order as [`faces`](Self::faces).
    pub fn faces_mut(&mut self) -> slice::IterMut<'_, FaceEntry<T>> {
        self.faces.iter_mut()
    }

    pub(crate) fn should_split(&self, capacity: usize, max_depth: u32) -> bool {
        self.children.is_none() && self.faces.len() > capacity && self.depth < max_depth
    }
}

/// Read-only handle to a node which can reach the rest of the tree
pub struct NodeRef<'a, T> {
    tree: &'a Octree<T>,
    key: usize,
}

impl<'a, T> NodeRef<'a, T> {
    pub(crate) fn new(tree: &'a Octree<T>, key: usize) -> Self {
        Self { tree, key }
    }

    pub fn get(&self) -> &'a Node<T> {
        &self.tree.nodes[self.key]
    }

    pub fn parent(&self) -> Option<Self> {
        self.get().parent.map(|key| Self::new(self.tree, key))
    }

    /// Children indexed by octant: bit 0 set for +x, bit 1 for +y, bit 2 for +z
    pub fn children(&self) -> Option<[Self; 8]> {
        let tree = self.tree;
        self.get()
            .children
            .map(|children| children.map(|key| Self::new(tree, key)))
    }

    /// Faces stored directly in this node, borrowed for as long as the tree is
    pub fn faces(&self) -> slice::Iter<'a, FaceEntry<T>> {
        self.get().faces.iter()
    }

    /// Nearest face hit by `ray` in this node or its descendants
    pub fn intersect_ray(&self, ray: &Ray) -> Option<FaceIntersection> {
        self.tree.intersect_ray_from(self.key, ray)
    }

    /// Faces in this node or its descendants that intersect `sphere`
    pub fn intersect_sphere(&self, sphere: &Sphere) -> HashSet<FaceId> {
        let mut out = HashSet::new();
        self.tree
            .visit_sphere_from(self.key, sphere, |face| {
                out.insert(face.id);
            });
        out
    }

    /// Vertices of the faces in this node or its descendants that intersect `sphere`
    ///
    /// `vertices` maps a face to its three vertices.
    pub fn intersect_sphere_vertices<V, F>(&self, sphere: &Sphere, mut vertices: F) -> HashSet<V>
    where
        V: Eq + Hash,
        F: FnMut(&FaceEntry<T>) -> [V; 3],
    {
        let mut out = HashSet::new();
        self.tree
            .visit_sphere_from(self.key, sphere, |face| out.extend(vertices(face)));
        out
    }

    /// Find the node identified by `id` in this subtree by visiting every node
    ///
    /// Linear in the size of the subtree. Does not consult the tree's node index, so it remains
    /// correct even if the index does not.
    pub fn node_slow(&self, id: NodeId) -> Option<Self> {
        Nodes::new(Shared::new(self.tree), Some(self.key)).find(|node| node.id == id)
    }
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<T> Deref for NodeRef<'_, T> {
    type Target = Node<T>;

    fn deref(&self) -> &Node<T> {
        self.get()
    }
}

impl<T> fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.get();
        f.debug_struct("NodeRef")
            .field("id", &node.id)
            .field("depth", &node.depth)
            .field("center", &node.center)
            .field("width", &node.width)
            .field("faces", &node.faces.len())
            .finish()
    }
}

impl<T> PartialEq for NodeRef<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.key == other.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        let mut ids = crate::id::IdAllocator::default();
        let node = Node::<()>::new(ids.node(), Vec3::ONE, 4.0, 1, 1.5, None);
        assert_eq!(node.loose_width(), 6.0);
        assert_eq!(node.bounds().min, Vec3::splat(-1.0));
        assert_eq!(node.loose_bounds().max, Vec3::splat(4.0));
        assert!(!node.is_split());
        assert_eq!(node.num_faces(), 0);
    }

    #[test]
    fn split_policy() {
        let mut ids = crate::id::IdAllocator::default();
        let mut node = Node::new(ids.node(), Vec3::ZERO, 1.0, 3, 2.0, None);
        let triangle = Triangle::new(Vec3::ZERO, Vec3::X * 0.1, Vec3::Y * 0.1);
        for _ in 0..3 {
            node.faces.push(FaceEntry {
                id: ids.face(),
                triangle,
                value: (),
            });
        }
        assert!(node.should_split(2, 4));
        assert!(!node.should_split(3, 4));
        // Too deep
        assert!(!node.should_split(2, 3));
        node.children = Some([0; 8]);
        assert!(!node.should_split(2, 4));
    }
}
