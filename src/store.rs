//! Node store: an index-addressed arena of trie nodes.
//!
//! Vacant slots form an intrusive free list, so freeing a node never
//! allocates and a freed slot is the first one handed out again. Nodes refer
//! to their children by [`NodeId`]; the parent/child relation is the only
//! ownership edge, which keeps the structure acyclic.

use std::num::NonZeroU32;

use crate::error::StoreError;

/// Index of a node in the store. One-based so `Option<NodeId>` stays 4 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeId(NonZeroU32);

impl NodeId {
    #[inline]
    fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index + 1)
            .ok()
            .and_then(NonZeroU32::new)
            .map(NodeId)
    }

    #[inline]
    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// A trie node.
///
/// `children[0]` is taken for branch bit 0, `children[1]` for branch bit 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Node {
    pub children: [Option<NodeId>; 2],
    /// Leaf: the address is allocated. Internal: every leaf below is.
    pub full: bool,
}

impl Node {
    #[inline]
    pub fn is_childless(&self) -> bool {
        self.children[0].is_none() && self.children[1].is_none()
    }

    /// Childless and not allocated: holds nothing and may be reclaimed.
    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.is_childless() && !self.full
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Occupied(Node),
    Vacant { next: Option<NodeId> },
}

#[derive(Clone, Debug)]
pub(crate) struct NodeStore {
    slots: Vec<Slot>,
    free_head: Option<NodeId>,
    live: usize,
    limit: Option<usize>,
}

impl NodeStore {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            live: 0,
            limit,
        }
    }

    /// Make room for `additional` more nodes without reallocating.
    ///
    /// Vacant slots count towards the request.
    pub fn reserve(&mut self, additional: usize) -> Result<(), StoreError> {
        let vacant = self.slots.len() - self.live;
        if additional > vacant {
            self.slots
                .try_reserve(additional - vacant)
                .map_err(|_| StoreError::OutOfMemory)?;
        }
        Ok(())
    }

    /// Hand out an empty, non-full node with no children.
    pub fn create_node(&mut self) -> Result<NodeId, StoreError> {
        if let Some(limit) = self.limit {
            if self.live >= limit {
                return Err(StoreError::LimitReached { limit });
            }
        }

        if let Some(id) = self.free_head {
            let slot = &mut self.slots[id.index()];
            let Slot::Vacant { next } = *slot else {
                panic!("free list points at live node {id:?}");
            };
            *slot = Slot::Occupied(Node::default());
            self.free_head = next;
            self.live += 1;
            return Ok(id);
        }

        let id = NodeId::from_index(self.slots.len()).ok_or(StoreError::OutOfMemory)?;
        self.slots
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory)?;
        self.slots.push(Slot::Occupied(Node::default()));
        self.live += 1;
        Ok(id)
    }

    /// Return a node's slot to the free list. The node's children are not
    /// touched; callers free them first.
    pub fn free_node(&mut self, id: NodeId) {
        let slot = &mut self.slots[id.index()];
        debug_assert!(
            matches!(slot, Slot::Occupied(_)),
            "double free of node {id:?}"
        );
        *slot = Slot::Vacant {
            next: self.free_head,
        };
        self.free_head = Some(id);
        self.live -= 1;
    }

    /// Free `id` and everything below it, children before parents.
    /// Returns the number of nodes freed.
    pub fn destroy(&mut self, id: NodeId) -> usize {
        let node = *self.get(id);
        let mut freed = 0;
        for child in node.children.into_iter().flatten() {
            freed += self.destroy(child);
        }
        self.free_node(id);
        freed + 1
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        match &self.slots[id.index()] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("access to freed node {id:?}"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.slots[id.index()] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("access to freed node {id:?}"),
        }
    }

    /// Number of occupied slots.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Bytes reserved by the arena.
    pub fn memory_usage(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Slot>()
    }

    pub fn shrink_to_fit(&mut self) {
        self.slots.shrink_to_fit();
    }
}
