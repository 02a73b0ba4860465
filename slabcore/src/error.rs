//! Construction error type.

use std::fmt;
use std::io;

/// Errors that can occur while constructing a [`Slab`](crate::Slab).
#[derive(Debug)]
pub enum SlabInitError {
    /// `obj_size` was outside `[MIN_OBJ_SIZE, MAX_OBJ_SIZE]`.
    InvalidObjSize(usize),
    /// `max_page_count` was zero.
    InvalidPageCount,
    /// The backing region or metadata arrays could not be obtained from the OS.
    Mmap(io::Error),
}

impl fmt::Display for SlabInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidObjSize(size) => write!(f, "invalid obj_size: {size}"),
            Self::InvalidPageCount => write!(f, "max_page_count must be non-zero"),
            Self::Mmap(e) => write!(f, "failed to reserve backing region: {e}"),
        }
    }
}

impl std::error::Error for SlabInitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Mmap(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SlabInitError {
    fn from(e: io::Error) -> Self {
        Self::Mmap(e)
    }
}
