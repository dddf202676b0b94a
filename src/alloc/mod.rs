//! Allocates executable buffers for generated shim code
//!
//! Buffers are carved out of read-, write- & executable pages. Pages are never returned to the OS; a buffer's bytes go
//! back to their page's pool when its [`ExecutableCode`] handle is dropped.

use std::ops::Deref;
use std::slice;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::debug;
use region::Protection;
use slice_pool::sync::{SliceBox, SlicePool};
use thiserror::Error;

/// Minimum size of a newly mapped pool
pub const POOL_SIZE: usize = 0x10000;

/// Errors while allocating executable memory
#[derive(Debug, Error)]
pub enum AllocError {
    /// Error while mapping pages
    #[error("Error mapping executable memory")]
    RegionError(#[from] region::Error),
    /// Nothing to allocate
    #[error("Cannot allocate an empty code buffer")]
    Empty,
    /// A fresh pool could not satisfy the request
    #[error("Ran out of executable memory")]
    OutOfMemory,
}

/// A wrapper for making a region allocation compatible with `SlicePool`.
struct SliceableAllocation(region::Allocation);

impl AsRef<[u8]> for SliceableAllocation {
    fn as_ref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.0.as_ptr::<u8>(), self.0.len()) }
    }
}

impl AsMut<[u8]> for SliceableAllocation {
    fn as_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.0.as_mut_ptr::<u8>(), self.0.len()) }
    }
}

// the mapping is owned exclusively by its pool
unsafe impl Send for SliceableAllocation {}
unsafe impl Sync for SliceableAllocation {}

/// Executable memory pools shared by every generated shim
#[derive(Default)]
pub struct CodePool {
    /// Pools, each backed by its own mapping
    pools: Vec<SlicePool<u8>>,
}

impl CodePool {
    /// Allocates `size` executable bytes, mapping a new pool when the existing ones are full
    pub fn allocate(&mut self, size: usize) -> Result<SliceBox<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError::Empty);
        }
        if let Some(data) = self.pools.iter_mut().find_map(|pool| pool.alloc(size)) {
            return Ok(data);
        }

        let len = size.max(POOL_SIZE);
        let mapping = region::alloc(len, Protection::READ_WRITE_EXECUTE)?;
        debug!(
            "mapped {} bytes of executable memory at {:p}",
            mapping.len(),
            mapping.as_ptr::<u8>()
        );
        let pool = SlicePool::new(SliceableAllocation(mapping));
        let data = pool.alloc(size).ok_or(AllocError::OutOfMemory)?;
        self.pools.push(pool);
        Ok(data)
    }
}

lazy_static! {
    static ref POOL: Mutex<CodePool> = Mutex::new(CodePool::default());
}

/// A handle for generated code living in executable memory.
pub struct ExecutableCode {
    /// Pool allocation holding the code
    data: SliceBox<u8>,
}

impl ExecutableCode {
    /// Address of the first instruction
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl Deref for ExecutableCode {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.deref()
    }
}

/// Copies `code` into executable memory
pub fn allocate_executable(code: &[u8]) -> Result<ExecutableCode, AllocError> {
    let mut data = POOL.lock().unwrap().allocate(code.len())?;
    data.copy_from_slice(code);
    Ok(ExecutableCode { data })
}

#[cfg(test)]
mod tests {
    use super::{allocate_executable, AllocError, CodePool, POOL_SIZE};

    #[test]
    /// Code is copied verbatim and allocations do not overlap
    fn test_allocate() {
        let a = allocate_executable(&[0xc3]).unwrap();
        let b = allocate_executable(&[0x90, 0xc3]).unwrap();
        assert_eq!(a.to_vec(), vec![0xc3]);
        assert_eq!(b.to_vec(), vec![0x90, 0xc3]);

        let (a, b) = (a.as_ptr() as usize, b.as_ptr() as usize);
        assert!(a + 1 <= b || b + 2 <= a);
    }

    #[test]
    /// Requests larger than a pool get their own mapping
    fn test_large_and_empty() {
        let mut pool = CodePool::default();
        let big = pool.allocate(POOL_SIZE * 2).unwrap();
        assert_eq!(big.len(), POOL_SIZE * 2);
        assert!(matches!(pool.allocate(0), Err(AllocError::Empty)));
    }
}
