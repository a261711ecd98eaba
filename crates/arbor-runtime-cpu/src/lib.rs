//! Reference [`Runtime`] implementation backed by the system allocator.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use arbor::{Runtime, ARENA_ALIGNMENT};

/// Host-memory runtime; every allocation comes straight from the global
/// allocator at arena alignment.
#[derive(Debug, Default)]
pub struct CpuRuntime;

impl CpuRuntime {
    pub fn new() -> Self {
        CpuRuntime
    }

    /// Convenience constructor for the common `Arc<dyn Runtime>` shape.
    pub fn shared() -> Arc<dyn Runtime> {
        Arc::new(CpuRuntime)
    }
}

impl Runtime for CpuRuntime {
    fn alloc(&self, nbytes: usize) -> NonNull<u8> {
        let layout = cpu_layout(nbytes);
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, nbytes: usize) {
        dealloc(ptr.as_ptr(), cpu_layout(nbytes));
    }

    fn name(&self) -> &str {
        "cpu"
    }
}

fn cpu_layout(nbytes: usize) -> Layout {
    // The arena never requests zero bytes; alignment is the fixed arena
    // granularity.
    Layout::from_size_align(nbytes, ARENA_ALIGNMENT)
        .expect("arena allocation size overflows Layout")
}
