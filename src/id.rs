use core::fmt;

/// Identifies a face inserted into an [`Octree`](crate::Octree)
///
/// Stays the same for as long as the face is in the tree, no matter how often it is realigned.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FaceId(u64);

/// Identifies a node of an [`Octree`](crate::Octree)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(u64);

impl FaceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Source of identifiers for both faces and nodes
///
/// Never hands out the same value twice, so a stale identifier can't alias a newer entity.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn face(&mut self) -> FaceId {
        FaceId(self.bump())
    }

    pub fn node(&mut self) -> NodeId {
        NodeId(self.bump())
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next = id.checked_add(1).expect("identifier space exhausted");
        id
    }
}
