//! Fixed-size batching of an ordered object list.

use crate::errors::RelayError;
use std::slice::Chunks;

/// Contiguous batches of at most `batch_size` items, in original order; the
/// last batch may be shorter.
pub fn partition<T>(items: &[T], batch_size: usize) -> Result<Chunks<'_, T>, RelayError> {
    if batch_size == 0 {
        return Err(RelayError::config("batch_size must be greater than zero"));
    }
    Ok(items.chunks(batch_size))
}

/// Number of batches `partition` yields for `len` items.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        len.div_ceil(batch_size)
    }
}
