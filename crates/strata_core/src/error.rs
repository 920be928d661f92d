//! # Container Error Types
//!
//! Errors surfaced at the API seams of the containers.
//!
//! Lookups that miss are not errors: they return `Option`/`bool`.
//! A full shard is not an error either: the sharded map opens a new one.

use thiserror::Error;

/// Errors that can occur while operating on a container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrataError {
    /// A typed access used an element type that does not match the column.
    #[error(
        "column stride mismatch: column stores `{column}` ({expected} bytes), \
         access used `{requested}` ({actual} bytes)"
    )]
    StrideMismatch {
        /// Type name recorded in the column descriptor.
        column: &'static str,
        /// Type name the caller asked for.
        requested: &'static str,
        /// Stride recorded in the column descriptor.
        expected: usize,
        /// Size of the requested type.
        actual: usize,
    },

    /// Column index past the number of columns.
    #[error("column {index} out of range for {count} columns")]
    ColumnOutOfRange {
        /// Requested column.
        index: usize,
        /// Number of columns in the map.
        count: usize,
    },

    /// Parallel input arrays disagree on length.
    #[error("length mismatch: {keys} keys, {values} values")]
    LengthMismatch {
        /// Number of keys supplied.
        keys: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// A pool handle was returned to a pool that never issued it.
    #[error("instance {index} does not belong to pool {pool}")]
    ForeignInstance {
        /// Pool the handle was presented to.
        pool: u32,
        /// Registry index carried by the handle.
        index: u32,
    },

    /// A pool handle refers to an instance that is currently free.
    #[error("pool instance {index} is not in use")]
    NotInUse {
        /// Registry index carried by the handle.
        index: u32,
    },

    /// A bulk load that requires an empty container found entries.
    #[error("container must be empty, holds {len} entries")]
    NotEmpty {
        /// Current number of entries.
        len: usize,
    },

    /// A bulk load that requires unique keys found a repeat.
    #[error("duplicate key at input position {position}")]
    DuplicateKey {
        /// Position in the input of the second occurrence.
        position: usize,
    },

    /// Requested capacity cannot be represented.
    #[error("capacity overflow: requested {requested} elements of {stride} bytes")]
    CapacityOverflow {
        /// Requested element count.
        requested: usize,
        /// Element stride in bytes.
        stride: usize,
    },

    /// The allocator could not satisfy a request.
    #[error("allocation of {size} bytes (align {align}) failed")]
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment.
        align: usize,
    },

    /// Cross-array bookkeeping is inconsistent.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for container operations.
pub type StrataResult<T> = Result<T, StrataError>;
