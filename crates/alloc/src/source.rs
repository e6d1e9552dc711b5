//! The allocator's one external collaborator: a source of raw, contiguous
//! memory (the "page/heap source" the design brief explicitly keeps out of
//! scope). This module only defines the trait boundary — modelled on the
//! pack's `PageAllocator` shape (`alloc_page`/`free_page`) — plus a
//! std-backed implementation used by the test suite.

use core::ptr::NonNull;

/// A source of raw, contiguous byte regions.
///
/// `Allocator::init` calls `obtain` exactly once, at construction; the
/// allocator's `Drop` impl calls `release` exactly once, at teardown. A
/// `MemorySource` is not required to be `Send`/`Sync` — concurrent access
/// to the allocator built on top of one is the caller's concern (see the
/// crate-level docs on the `Non-goals` boundary).
pub trait MemorySource {
    /// Obtain `bytes` contiguous bytes, or `None` if unavailable.
    fn obtain(&mut self, bytes: usize) -> Option<NonNull<u8>>;

    /// Release a region previously returned by `obtain` with the same
    /// `bytes` length.
    ///
    /// # Safety
    /// `ptr` must be the exact pointer most recently returned by `obtain`
    /// on this source, with the same `bytes` value.
    unsafe fn release(&mut self, ptr: NonNull<u8>, bytes: usize);
}

#[cfg(any(test, feature = "std"))]
pub mod std_vec {
    //! A heap-backed `MemorySource` for tests and host tooling only. Not
    //! part of the crate's production surface.

    use super::MemorySource;
    use alloc::alloc::{alloc_zeroed, dealloc, Layout};
    use core::ptr::NonNull;

    /// Hands out a single allocation per instance via the host's global
    /// allocator. Suitable for unit tests; not a production `MemorySource`.
    pub struct VecSource {
        layout: Option<Layout>,
    }

    impl VecSource {
        #[must_use]
        pub const fn new() -> Self {
            Self { layout: None }
        }
    }

    impl Default for VecSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemorySource for VecSource {
        fn obtain(&mut self, bytes: usize) -> Option<NonNull<u8>> {
            // 16-byte alignment: enough for the widest in-band field we
            // ever write (two pointer-width link words).
            let layout = Layout::from_size_align(bytes, 16).ok()?;
            // SAFETY: layout has non-zero size whenever `bytes` does; the
            // allocator rejects a zero-byte arena before this is reached.
            let ptr = unsafe { alloc_zeroed(layout) };
            self.layout = Some(layout);
            NonNull::new(ptr)
        }

        unsafe fn release(&mut self, ptr: NonNull<u8>, _bytes: usize) {
            if let Some(layout) = self.layout.take() {
                // SAFETY: caller guarantees `ptr`/`bytes` match the prior
                // `obtain` call, and `layout` was recorded from that call.
                unsafe { dealloc(ptr.as_ptr(), layout) };
            }
        }
    }
}
