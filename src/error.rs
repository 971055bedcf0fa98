//! Error types for predecessor structure construction and insertion.

use thiserror::Error;

/// Error variants for predecessor structure operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// More keys were supplied than the structure can hold.
    #[error("capacity exceeded: {len} keys given, at most {max} supported")]
    CapacityExceeded {
        /// Number of keys supplied.
        len: usize,
        /// Maximum number of keys.
        max: usize,
    },

    /// Input keys were expected in ascending order.
    #[error("keys not ascending at index {index}")]
    NotAscending {
        /// Index of the first key that breaks the order.
        index: usize,
    },

    /// A key does not fit into the fixed key universe.
    #[error("key {key} outside of the {bits}-bit universe")]
    KeyOutOfUniverse {
        /// The rejected key.
        key: u64,
        /// Width of the universe in bits.
        bits: u32,
    },

    /// Memory for a bucket or the top-level array could not be reserved.
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed {
        /// Size of the rejected request.
        bytes: usize,
    },
}

/// A specialized Result type for predecessor structures.
pub type Result<T> = std::result::Result<T, Error>;
