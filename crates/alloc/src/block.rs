//! In-band block metadata.
//!
//! A block is, at any moment, in exactly one of free/split/allocated state.
//! The allocated-block header and the free-block link node are two views
//! over the *same* first bytes of a block — a tagged union gated by the
//! state the allocator already tracks via which bank list the block is on.
//! This module only does the raw reads/writes; it trusts the caller to
//! know which view is valid.

use core::ptr::NonNull;

/// Bit 63 of an allocated block's header word.
const LIVE_BIT: u64 = 1 << 63;

/// Write the allocated-block header: liveness bit set, low bits the order.
///
/// # Safety
/// `block` must point to at least 8 writable, properly aligned bytes
/// inside the arena.
pub(crate) unsafe fn write_header(block: NonNull<u8>, order: u32) {
    debug_assert!(order < 63, "order must fit in the header's low 63 bits");
    let word = LIVE_BIT | u64::from(order);
    unsafe { block.cast::<u64>().write(word) };
}

/// Read the order encoded in an allocated block's header.
///
/// # Safety
/// `block` must currently be an allocated block's start address.
pub(crate) unsafe fn read_order(block: NonNull<u8>) -> u32 {
    let word = unsafe { block.cast::<u64>().read() };
    (word & !LIVE_BIT) as u32
}

/// Probe whether the word at `block`'s first 8 bytes has the liveness bit
/// set. Used by the coalescer, which does not know in advance whether the
/// buddy it is inspecting is allocated or free.
///
/// # Safety
/// `block` must point to at least 8 readable bytes inside the arena.
pub(crate) unsafe fn is_allocated(block: NonNull<u8>) -> bool {
    let word = unsafe { block.cast::<u64>().read() };
    word & LIVE_BIT != 0
}

/// A free block's first 16 bytes: two pointer-width link fields. Each is
/// either absent (null) or the address of another free block on the same
/// order's list.
#[derive(Clone, Copy)]
pub(crate) struct Links {
    pub prev: Option<NonNull<u8>>,
    pub next: Option<NonNull<u8>>,
}

impl Links {
    pub(crate) const NULL: Links = Links {
        prev: None,
        next: None,
    };
}

/// Read the link fields at `block`.
///
/// # Safety
/// `block` must currently be a free block's start address (its first 16
/// bytes must be valid `prev`/`next` fields).
pub(crate) unsafe fn read_links(block: NonNull<u8>) -> Links {
    unsafe {
        let prev = block.cast::<*mut u8>().read();
        let next = block.cast::<*mut u8>().add(1).read();
        Links {
            prev: NonNull::new(prev),
            next: NonNull::new(next),
        }
    }
}

/// Write the link fields at `block`, overwriting whatever was there
/// (including a stale allocated-block header — this is how a freed block
/// becomes a valid free-list node again).
///
/// # Safety
/// `block` must point to at least 16 writable, properly aligned bytes
/// inside the arena.
pub(crate) unsafe fn write_links(block: NonNull<u8>, links: Links) {
    unsafe {
        block
            .cast::<*mut u8>()
            .write(links.prev.map_or(core::ptr::null_mut(), NonNull::as_ptr));
        block
            .cast::<*mut u8>()
            .add(1)
            .write(links.next.map_or(core::ptr::null_mut(), NonNull::as_ptr));
    }
}
