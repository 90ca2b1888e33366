// Lox VM Allocator Facade
// Every growable buffer in the runtime is sized through `reallocate`

use crate::error::AllocError;

/// Smallest capacity a growing buffer jumps to
pub const MIN_CAPACITY: usize = 8;

/// Next capacity for a full buffer: 8 from empty or small, then doubling.
pub fn grow_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        capacity * 2
    }
}

/// Resize a block of storage in place.
///
/// The four cases follow the size pair:
/// * `(_, 0)` releases the block, leaving an empty vector
/// * `(0, n)` replaces the block with a fresh one with room for `n` elements
/// * `(old, n)` with `n < old` shrinks, keeping the first `n` elements
/// * `(old, n)` with `n > old` grows, keeping every element
///
/// Failure to obtain memory is reported as [`AllocError`] and leaves the
/// block untouched; callers decide whether that is fatal (see
/// [`out_of_memory`]).
pub fn reallocate<T>(
    block: &mut Vec<T>,
    old_capacity: usize,
    new_capacity: usize,
) -> Result<(), AllocError> {
    if new_capacity == 0 {
        *block = Vec::new();
        return Ok(());
    }

    if old_capacity == 0 {
        let mut fresh = Vec::new();
        fresh.try_reserve_exact(new_capacity)?;
        *block = fresh;
        return Ok(());
    }

    if new_capacity < block.len() {
        block.truncate(new_capacity);
        block.shrink_to(new_capacity);
    } else if new_capacity < block.capacity() {
        block.shrink_to(new_capacity);
    } else {
        block.try_reserve_exact(new_capacity - block.len())?;
    }
    Ok(())
}

/// Fallible buffer for string contents of a known length.
pub fn allocate_string(len: usize) -> Result<String, AllocError> {
    let mut buffer = String::new();
    buffer.try_reserve_exact(len)?;
    Ok(buffer)
}

/// Default top-level policy for allocation failure: report and terminate
/// the process without unwinding.
pub fn out_of_memory(err: &AllocError) -> ! {
    tracing::error!("fatal allocation failure: {}", err);
    eprintln!("{}", err);
    std::process::exit(1)
}
