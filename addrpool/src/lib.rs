//! # addrpool - Shared Address Pool
//!
//! A thread-safe pool of 32-bit addresses (an IPv4-sized space, or any
//! prefix of it) backed by a [`FullnessTrie`].
//!
//! ## Features
//!
//! - **Hinted allocation**: ask for a specific address and get it, or a
//!   nearby free one when it is taken
//! - **O(width) operations**: exhausted subtrees are skipped at their root
//! - **Shared access**: one exclusive lock around the trie; share the pool
//!   through an `Arc`
//!
//! ## Example
//!
//! ```rust
//! use addrpool::{AddrPool, Config};
//!
//! // A /24: 256 host addresses.
//! let pool = AddrPool::with_config(Config { width: 8, ..Config::default() }).unwrap();
//!
//! let a = pool.allocate(10).unwrap();
//! assert_eq!(a, 10);
//! // 10 is taken, so its sibling is handed out.
//! assert_eq!(pool.allocate(10).unwrap(), 11);
//!
//! pool.release(a).unwrap();
//! assert!(!pool.is_allocated(10));
//! assert_eq!(pool.allocated(), 1);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

use parking_lot::Mutex;
use tracing::{debug, info};

use fullness_trie::{FullnessTrie, TrieOptions};

pub use fullness_trie::{AllocError, ConfigError, ReleaseError};

/// Usage statistics for the pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Addresses currently allocated
    pub allocated: usize,
    /// Addresses in the pool
    pub capacity: u64,
    /// Trie nodes held, root included
    pub nodes: usize,
    /// Bytes reserved for trie nodes
    pub node_bytes: usize,
    /// Fraction of the pool in use (calculated)
    pub utilization: f64,
}

/// Configuration for an [`AddrPool`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Address width in bits, at most 32. The pool holds `2^width` addresses.
    pub width: u32,
    /// Cap on trie nodes. Allocations that would exceed it fail with
    /// [`AllocError::AllocationFailed`].
    pub node_limit: Option<usize>,
    /// Trie nodes to reserve up front
    pub initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 32,
            node_limit: None,
            initial_capacity: 0,
        }
    }
}

/// A pool of `2^width` addresses safe to share between threads.
///
/// Every operation takes the same exclusive lock, so at most one mutation is
/// in flight at a time.
pub struct AddrPool {
    inner: Mutex<FullnessTrie<u32>>,
    config: Config,
}

impl AddrPool {
    /// Create a pool over the whole 32-bit space.
    ///
    /// # Panics
    ///
    /// If the trie root cannot be allocated. [`with_config`](Self::with_config)
    /// reports that as an error instead.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FullnessTrie::default()),
            config: Config::default(),
        }
    }

    /// Create a pool with the given configuration.
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        let options = TrieOptions {
            node_limit: config.node_limit,
            initial_capacity: config.initial_capacity,
        };
        let trie = FullnessTrie::with_options(config.width, options)?;
        info!(width = config.width, "address pool created");
        Ok(Self {
            inner: Mutex::new(trie),
            config,
        })
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocate `hint`, or a nearby free address when it is taken.
    ///
    /// See [`FullnessTrie::allocate`] for the search policy. An
    /// `AlreadyFull` error does not mean the pool is exhausted; use
    /// [`allocate_any`](Self::allocate_any) to take whatever is free.
    pub fn allocate(&self, hint: u32) -> Result<u32, AllocError> {
        self.inner.lock().allocate(hint)
    }

    /// Allocate the first free address the search reaches.
    ///
    /// Fails with `AlreadyFull` only when every address is allocated.
    pub fn allocate_any(&self) -> Result<u32, AllocError> {
        // A request for 0 retries in the one-branch at every level.
        self.allocate(0)
    }

    /// Return `addr` to the pool.
    pub fn release(&self, addr: u32) -> Result<(), ReleaseError> {
        let result = self.inner.lock().release(addr);
        if let Err(err) = result {
            debug!(addr, %err, "rejected release");
        }
        result
    }

    /// Check whether `addr` is currently allocated.
    pub fn is_allocated(&self, addr: u32) -> bool {
        self.inner.lock().is_allocated(addr)
    }

    /// Number of allocated addresses.
    pub fn allocated(&self) -> usize {
        self.inner.lock().count()
    }

    /// Number of addresses in the pool.
    pub fn capacity(&self) -> u64 {
        1u64 << self.config.width
    }

    /// True when no address is left.
    pub fn is_exhausted(&self) -> bool {
        self.inner.lock().is_full()
    }

    /// Allocated addresses in ascending order, taken under one lock.
    pub fn snapshot(&self) -> Vec<u32> {
        self.inner.lock().iter().collect()
    }

    /// Release every address.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Get usage statistics.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let allocated = inner.count();
        let capacity = self.capacity();
        PoolStats {
            allocated,
            capacity,
            nodes: inner.node_count(),
            node_bytes: inner.memory_usage(),
            utilization: allocated as f64 / capacity as f64,
        }
    }
}

impl Default for AddrPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AddrPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddrPool")
            .field("config", &self.config)
            .field("trie", &*self.inner.lock())
            .finish()
    }
}
