//! # fullness-trie
//!
//! An address allocator over fixed-width unsigned keys, built as a binary
//! trie that records per subtree whether every address below it is taken.
//! A full subtree is rejected at its root, so allocation, release and lookup
//! all cost O(width) regardless of how much of the space is in use.
//!
//! ## Example
//!
//! ```rust
//! use fullness_trie::{AllocError, FullnessTrie};
//!
//! let mut trie: FullnessTrie<u32> = FullnessTrie::new(2).unwrap();
//! assert_eq!(trie.allocate(0), Ok(0));
//! // Address 0 is taken, so the request moves to its sibling.
//! assert_eq!(trie.allocate(0), Ok(1));
//! assert_eq!(trie.count(), 2);
//!
//! trie.release(0).unwrap();
//! assert_eq!(trie.count(), 1);
//! assert_eq!(trie.allocate(0), Ok(0));
//!
//! assert_eq!(trie.allocate(2), Ok(2));
//! assert_eq!(trie.allocate(3), Ok(3));
//! assert_eq!(trie.allocate(0), Err(AllocError::AlreadyFull));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

use std::marker::PhantomData;

use smallvec::SmallVec;
use tracing::{trace, warn};

mod error;
mod key;
mod store;

pub use error::{AllocError, ConfigError, ReleaseError, StoreError};
pub use key::Key;

use key::{branch_bit, low_mask, round_up_at};
use store::{NodeId, NodeStore};

// =============================================================================
// Configuration
// =============================================================================

/// Construction options beyond the width.
#[derive(Debug, Clone, Default)]
pub struct TrieOptions {
    /// Upper bound on live nodes, root included. `None` means unbounded.
    pub node_limit: Option<usize>,
    /// Nodes to reserve up front.
    pub initial_capacity: usize,
}

// =============================================================================
// FullnessTrie
// =============================================================================

/// Allocator of `W`-bit addresses.
///
/// The root always exists. Everything below it is created on the first
/// allocation that passes through and reclaimed once the last allocation
/// under it is released.
///
/// Not thread-safe on its own; wrap it in a lock to share it.
#[derive(Clone)]
pub struct FullnessTrie<K: Key = u32> {
    store: NodeStore,
    root: NodeId,
    width: u32,
    _marker: PhantomData<K>,
}

impl<K: Key> FullnessTrie<K> {
    /// An empty trie over `2^width` addresses.
    pub fn new(width: u32) -> Result<Self, ConfigError> {
        Self::with_options(width, TrieOptions::default())
    }

    pub fn with_options(width: u32, options: TrieOptions) -> Result<Self, ConfigError> {
        if width > K::BITS {
            return Err(ConfigError::WidthTooLarge {
                width,
                max: K::BITS,
            });
        }

        let mut store = NodeStore::new(options.node_limit);
        store.reserve(options.initial_capacity.max(1))?;
        let root = store.create_node()?;

        Ok(Self {
            store,
            root,
            width,
            _marker: PhantomData,
        })
    }

    /// Bit width `W` fixed at construction.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of addresses in the space, `2^W`.
    ///
    /// Saturates at `u128::MAX` for `W = 128`.
    pub fn capacity(&self) -> u128 {
        low_mask(self.width).saturating_add(1)
    }

    /// True once every address is allocated.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.store.get(self.root).full
    }

    /// Nodes currently held, root included.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.store.live()
    }

    /// Bytes reserved for nodes.
    pub fn memory_usage(&self) -> usize {
        self.store.memory_usage()
    }

    pub fn shrink_to_fit(&mut self) {
        self.store.shrink_to_fit();
    }

    /// Release every address, keeping only the root.
    pub fn clear(&mut self) {
        let root = *self.store.get(self.root);
        for child in root.children.into_iter().flatten() {
            self.store.destroy(child);
        }
        *self.store.get_mut(self.root) = Default::default();
    }

    /// Tear the trie down, freeing every node children-first.
    ///
    /// Returns the number of nodes freed, which always equals
    /// [`node_count`](Self::node_count) beforehand.
    pub fn destroy(mut self) -> usize {
        let freed = self.store.destroy(self.root);
        debug_assert_eq!(self.store.live(), 0);
        freed
    }

    #[inline]
    fn truncate(&self, key: K) -> u128 {
        key.to_u128() & low_mask(self.width)
    }
}

// =============================================================================
// Allocate
// =============================================================================

impl<K: Key> FullnessTrie<K> {
    /// Allocate `key`, or a nearby free address when `key` is taken.
    ///
    /// The search prefers `key` itself. Where the path to it is exhausted at
    /// a level whose bit in `key` is 0, the request is retried once in the
    /// sibling subtree, starting at the lowest address there. No retry happens
    /// at levels where the bit is 1, so `AlreadyFull` does not imply the
    /// whole space is in use; check [`is_full`](Self::is_full) for that.
    ///
    /// Bits of `key` above the trie width are ignored.
    ///
    /// On `AllocationFailed` the trie is left exactly as it was.
    pub fn allocate(&mut self, key: K) -> Result<K, AllocError> {
        let key = self.truncate(key);

        // A successful descent creates at most one fresh path below the root.
        if let Err(err) = self.store.reserve(self.width as usize) {
            warn!(?err, key, "could not reserve trie nodes");
            return Err(err.into());
        }

        let result = allocate_at(&mut self.store, self.root, key, self.width);
        match result {
            Ok(addr) => trace!(key, addr, "allocated"),
            Err(AllocError::AlreadyFull) => trace!(key, "no free address on path"),
            Err(AllocError::AllocationFailed) => warn!(
                key,
                nodes = self.store.live(),
                "node store exhausted during allocation"
            ),
        }
        result.map(K::from_u128)
    }
}

fn allocate_at(
    store: &mut NodeStore,
    id: NodeId,
    key: u128,
    level: u32,
) -> Result<u128, AllocError> {
    if store.get(id).full {
        return Err(AllocError::AlreadyFull);
    }

    if level == 0 {
        store.get_mut(id).full = true;
        return Ok(key);
    }

    let bit = branch_bit(key, level);
    let mut result = allocate_in_child(store, id, bit, key, level);
    if result == Err(AllocError::AlreadyFull) && bit == 0 {
        let key = round_up_at(key, level);
        trace!(level, key, "zero branch full, trying one branch");
        result = allocate_in_child(store, id, 1, key, level);
    }

    let node = store.get(id);
    let full = match node.children {
        [Some(zero), Some(one)] => store.get(zero).full && store.get(one).full,
        _ => false,
    };
    store.get_mut(id).full = full;

    result
}

fn allocate_in_child(
    store: &mut NodeStore,
    parent: NodeId,
    bit: usize,
    key: u128,
    level: u32,
) -> Result<u128, AllocError> {
    let child = match store.get(parent).children[bit] {
        Some(child) => child,
        None => {
            let child = store.create_node()?;
            store.get_mut(parent).children[bit] = Some(child);
            child
        }
    };

    let result = allocate_at(store, child, key, level - 1);

    // Undo nodes created on a path that could not be completed.
    if result == Err(AllocError::AllocationFailed) && store.get(child).is_vacant() {
        store.free_node(child);
        store.get_mut(parent).children[bit] = None;
    }

    result
}

// =============================================================================
// Release
// =============================================================================

impl<K: Key> FullnessTrie<K> {
    /// Return `addr` to the free space.
    ///
    /// Nodes left without children are reclaimed on the way back up.
    pub fn release(&mut self, addr: K) -> Result<(), ReleaseError> {
        let addr = self.truncate(addr);
        let result = release_at(&mut self.store, Some(self.root), addr, self.width);
        match result {
            Ok(()) => trace!(addr, "released"),
            Err(ReleaseError::DoubleRelease) => trace!(addr, "release of unallocated address"),
        }
        result
    }
}

fn release_at(
    store: &mut NodeStore,
    id: Option<NodeId>,
    key: u128,
    level: u32,
) -> Result<(), ReleaseError> {
    let Some(id) = id else {
        return Err(ReleaseError::DoubleRelease);
    };

    if level == 0 {
        let node = store.get_mut(id);
        if !node.full {
            return Err(ReleaseError::DoubleRelease);
        }
        node.full = false;
        return Ok(());
    }

    let bit = branch_bit(key, level);
    let child = store.get(id).children[bit];
    let result = release_at(store, child, key, level - 1);

    if let (Ok(()), Some(child)) = (result, child) {
        if store.get(child).is_childless() {
            store.free_node(child);
            store.get_mut(id).children[bit] = None;
        }
    }

    // Cleared even when the release failed.
    store.get_mut(id).full = false;

    result
}

// =============================================================================
// Count and lookup
// =============================================================================

impl<K: Key> FullnessTrie<K> {
    /// Number of allocated addresses.
    pub fn count(&self) -> usize {
        count_at(&self.store, Some(self.root), self.width)
    }

    pub fn is_allocated(&self, addr: K) -> bool {
        let addr = self.truncate(addr);
        let mut id = self.root;
        for level in (1..=self.width).rev() {
            let node = self.store.get(id);
            if node.full {
                return true;
            }
            match node.children[branch_bit(addr, level)] {
                Some(child) => id = child,
                None => return false,
            }
        }
        self.store.get(id).full
    }

    /// Allocated addresses in ascending order.
    pub fn iter(&self) -> Iter<'_, K> {
        let mut stack = SmallVec::new();
        stack.push((self.root, self.width, 0u128));
        Iter {
            store: &self.store,
            stack,
            _marker: PhantomData,
        }
    }
}

fn count_at(store: &NodeStore, id: Option<NodeId>, level: u32) -> usize {
    let Some(id) = id else {
        return 0;
    };
    let node = store.get(id);
    if level == 0 {
        return usize::from(node.full);
    }
    node.children
        .iter()
        .map(|&child| count_at(store, child, level - 1))
        .sum()
}

impl<K: Key> Default for FullnessTrie<K> {
    /// A trie spanning the full width of `K`.
    ///
    /// # Panics
    ///
    /// If the root node cannot be allocated. Use [`FullnessTrie::new`] to
    /// handle that as an error.
    fn default() -> Self {
        let mut store = NodeStore::new(None);
        let root = match store.create_node() {
            Ok(root) => root,
            Err(err) => panic!("cannot allocate trie root: {err}"),
        };
        Self {
            store,
            root,
            width: K::BITS,
            _marker: PhantomData,
        }
    }
}

impl<K: Key> std::fmt::Debug for FullnessTrie<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullnessTrie")
            .field("width", &self.width)
            .field("allocated", &self.count())
            .field("nodes", &self.store.live())
            .finish()
    }
}

impl<'a, K: Key> IntoIterator for &'a FullnessTrie<K> {
    type Item = K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over allocated addresses, see [`FullnessTrie::iter`].
pub struct Iter<'a, K> {
    store: &'a NodeStore,
    /// (node, level, address bits resolved so far)
    stack: SmallVec<[(NodeId, u32, u128); 36]>,
    _marker: PhantomData<K>,
}

impl<'a, K: Key> Iterator for Iter<'a, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        while let Some((id, level, prefix)) = self.stack.pop() {
            let node = self.store.get(id);
            if level == 0 {
                if node.full {
                    return Some(K::from_u128(prefix));
                }
                continue;
            }
            // One-child first so the zero-child is popped first.
            for bit in [1usize, 0] {
                if let Some(child) = node.children[bit] {
                    self.stack
                        .push((child, level - 1, (prefix << 1) | bit as u128));
                }
            }
        }
        None
    }
}


#[cfg(test)]
mod proptests;
