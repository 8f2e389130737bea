use thiserror::Error;

/// Why an allocation did not produce an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The requested address and its fallback sibling are taken, or the
    /// whole subtree reached from the root is full. A capacity signal.
    #[error("address space exhausted along the requested path")]
    AlreadyFull,

    /// The node store could not provide a node.
    #[error("node store could not allocate a trie node")]
    AllocationFailed,
}

/// Why a release was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReleaseError {
    /// The address is not currently allocated.
    #[error("address is not allocated")]
    DoubleRelease,
}

/// Rejected trie construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("trie width {width} exceeds the key width of {max} bits")]
    WidthTooLarge { width: u32, max: u32 },

    #[error("cannot allocate the root node: {0}")]
    Store(#[from] StoreError),
}

/// Node store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("node limit of {limit} reached")]
    LimitReached { limit: usize },
}

impl From<StoreError> for AllocError {
    fn from(_: StoreError) -> Self {
        AllocError::AllocationFailed
    }
}
