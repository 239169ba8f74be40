//! Depth-first walks over the nodes and faces of an [`Octree`]
//!
//! Shared and exclusive walks are the same walk, differing only in the [`Access`] they are
//! given, so they visit the same elements in the same order.

use core::{array, ops::Deref, slice};

use slab::Slab;

use crate::{FaceEntry, Node, NodeRef, Octree};

/// How a walk borrows the nodes and faces it yields
pub trait Access {
    /// Payload type of the tree being walked
    type Value;
    /// Node handle yielded by [`Nodes`]
    type Node: Deref<Target = Node<Self::Value>>;
    /// Iterator over the faces stored directly in one node
    type Faces: Iterator;

    /// Borrow the node stored under `key`, at most once per key
    fn take(&mut self, key: usize) -> Option<Self::Node>;

    fn faces(node: Self::Node) -> Self::Faces;
}

/// Yields [`NodeRef`]s and `&FaceEntry`s
pub struct Shared<'a, T> {
    tree: &'a Octree<T>,
}

impl<'a, T> Shared<'a, T> {
    pub(crate) fn new(tree: &'a Octree<T>) -> Self {
        Self { tree }
    }
}

impl<'a, T> Access for Shared<'a, T> {
    type Value = T;
    type Node = NodeRef<'a, T>;
    type Faces = slice::Iter<'a, FaceEntry<T>>;

    fn take(&mut self, key: usize) -> Option<NodeRef<'a, T>> {
        self.tree
            .nodes
            .contains(key)
            .then(|| NodeRef::new(self.tree, key))
    }

    fn faces(node: NodeRef<'a, T>) -> Self::Faces {
        node.get().faces.iter()
    }
}

/// Yields `&mut Node`s and `&mut FaceEntry`s
pub struct Exclusive<'a, T> {
    /// Every node in the arena, indexed by key, until it's handed out
    slots: Vec<Option<&'a mut Node<T>>>,
}

impl<'a, T> Exclusive<'a, T> {
    pub(crate) fn new(nodes: &'a mut Slab<Node<T>>) -> Self {
        let mut slots = Vec::new();
        for (key, node) in nodes.iter_mut() {
            if slots.len() <= key {
                slots.resize_with(key + 1, || None);
            }
            slots[key] = Some(node);
        }
        Self { slots }
    }
}

impl<'a, T> Access for Exclusive<'a, T> {
    type Value = T;
    type Node = &'a mut Node<T>;
    type Faces = slice::IterMut<'a, FaceEntry<T>>;

    fn take(&mut self, key: usize) -> Option<&'a mut Node<T>> {
        self.slots.get_mut(key)?.take()
    }

    fn faces(node: &'a mut Node<T>) -> Self::Faces {
        node.faces.iter_mut()
    }
}

/// Pre-order walk over the nodes of a subtree, visiting children in octant order
pub struct Nodes<A> {
    access: A,
    /// Node to yield before consulting `queue`
    start: Option<usize>,
    // By tracking groups of children, rather than individual nodes, we can keep the stack size
    // to O(depth), whereas a naive depth-first traversal would require O(depth * 8).
    queue: Vec<array::IntoIter<usize, 8>>,
}

impl<A: Access> Nodes<A> {
    pub(crate) fn new(access: A, start: Option<usize>) -> Self {
        Self {
            access,
            start,
            queue: Vec::new(),
        }
    }
}

impl<A: Access> Iterator for Nodes<A> {
    type Item = A::Node;

    fn next(&mut self) -> Option<A::Node> {
        let key = match self.start.take() {
            Some(key) => key,
            None => loop {
                let group = self.queue.last_mut()?;
                match group.next() {
                    Some(key) => break key,
                    None => {
                        self.queue.pop();
                    }
                }
            },
        };
        let node = self
            .access
            .take(key)
            .expect("node missing from arena");
        if let Some(children) = node.children {
            self.queue.push(children.into_iter());
        }
        Some(node)
    }
}

/// Walk over every face of a subtree, paired with the depth of the node storing it
///
/// Nodes are visited in the order of [`Nodes`], and each node's faces in the order of
/// [`Node::faces`].
pub struct Faces<A: Access> {
    nodes: Nodes<A>,
    current: Option<(u32, A::Faces)>,
}

impl<A: Access> Faces<A> {
    pub(crate) fn new(nodes: Nodes<A>) -> Self {
        Self {
            nodes,
            current: None,
        }
    }
}

impl<A: Access> Iterator for Faces<A> {
    type Item = (u32, <A::Faces as Iterator>::Item);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((depth, faces)) = &mut self.current {
                if let Some(face) = faces.next() {
                    return Some((*depth, face));
                }
            }
            let node = self.nodes.next()?;
            let depth = node.depth;
            self.current = Some((depth, A::faces(node)));
        }
    }
}
