//! The allocator facade: arena lifecycle, the split cascade (`allocate`)
//! and the coalesce cascade (`free`).

use crate::bank::OrderBank;
use crate::block::{self, Links};
use crate::error::{AllocError, ConfigError, FreeError, InitError};
use crate::source::MemorySource;
use crate::{HEADER_BYTES, MAX_ORDER, MIN_ORDER};
use core::ptr::NonNull;

/// A buddy allocator over a single arena obtained from `S` at `init` and
/// returned to `S` at teardown.
///
/// Not `Send`/`Sync`: concurrent access to one instance is the caller's
/// responsibility, same as the pack's own physical allocators are only
/// made thread-safe by a lock one layer above them, never inside.
pub struct Allocator<S: MemorySource> {
    base: NonNull<u8>,
    size: usize,
    /// Order of the whole arena (`size == 1 << k`).
    k: u32,
    bank: OrderBank,
    source: S,
    stats: Stats,
}

impl<S: MemorySource> Allocator<S> {
    /// Obtain an arena of at least `requested` usable bytes from `source`
    /// and initialize it as a single free block.
    ///
    /// `requested` is rounded up (after reserving `HEADER_BYTES` for the
    /// eventual top-level header) to the next power of two; the result
    /// must land in `[16, 2^MAX_ORDER]`.
    pub fn init(mut source: S, requested: u64) -> Result<Self, InitError> {
        let padded = requested
            .checked_add(HEADER_BYTES as u64)
            .ok_or(InitError::Config(ConfigError::SizeOverflow))?;
        let size_u64 = padded
            .checked_next_power_of_two()
            .ok_or(InitError::Config(ConfigError::SizeOverflow))?;

        if size_u64 < 16 || size_u64 > (1u64 << MAX_ORDER) {
            return Err(InitError::Config(ConfigError::SizeOutOfRange));
        }

        let size =
            usize::try_from(size_u64).map_err(|_| InitError::Config(ConfigError::SizeOutOfRange))?;
        let k = size_u64.trailing_zeros();

        let base = source.obtain(size).ok_or(InitError::SourceExhausted)?;

        // SAFETY: `base` was just obtained as a fresh `size`-byte region,
        // uniquely owned by this allocator.
        unsafe { core::ptr::write_bytes(base.as_ptr(), 0, size) };

        let mut bank = OrderBank::new(k);
        // SAFETY: `base` is the sole, whole-arena free block at order `k`.
        unsafe { bank.list(k).insert(base) };
        bank.mark_free(k, 0);

        log::debug!("buddy_alloc: init {size} byte arena at order {k}");

        Ok(Self {
            base,
            size,
            k,
            bank,
            source,
            stats: Stats::new(size),
        })
    }

    /// Allocate a block able to hold at least `requested` bytes.
    pub fn allocate(&mut self, requested: usize) -> Result<NonNull<u8>, AllocError> {
        let padded = requested
            .max(16)
            .checked_add(HEADER_BYTES)
            .ok_or(AllocError::CapacityExceeded)?;
        let served = padded
            .checked_next_power_of_two()
            .ok_or(AllocError::CapacityExceeded)?;
        let order = served.trailing_zeros().max(MIN_ORDER);

        if order > self.k {
            log::warn!(
                "buddy_alloc: allocate({requested}) needs order {order}, arena tops out at {}",
                self.k
            );
            return Err(AllocError::CapacityExceeded);
        }

        if self.bank.list(order).is_empty() {
            let donor = (order + 1..=self.k).find(|&p| !self.bank.list(p).is_empty());
            let Some(donor) = donor else {
                log::warn!("buddy_alloc: allocate({requested}) found no donor at or above order {order}");
                return Err(AllocError::OutOfMemory);
            };
            self.split_cascade(donor, order);
        }

        let block = self
            .bank
            .list(order)
            .detach_head()
            .expect("order list was just ensured non-empty");
        let index = self.block_index(block, order);
        self.bank.mark_used(order, index);

        // SAFETY: `block` is a fresh, order-`order` block not referenced
        // anywhere else; writing its header is the transition to allocated.
        unsafe { block::write_header(block, order) };

        self.stats.on_allocate(served);
        log::trace!(
            "buddy_alloc: allocate({requested}) -> order {order} at offset {}",
            self.offset_of(block)
        );

        // SAFETY: the block holds at least `served >= requested + HEADER_BYTES`
        // bytes, so offsetting by `HEADER_BYTES` yields a pointer to at least
        // `requested` usable, in-arena bytes.
        Ok(unsafe { NonNull::new_unchecked(block.as_ptr().add(HEADER_BYTES)) })
    }

    /// Repeatedly split an order-`p` block down to order-`o` buddy pairs,
    /// leaving every sibling but the last on its free list.
    fn split_cascade(&mut self, p: u32, o: u32) {
        let donor = self
            .bank
            .list(p)
            .detach_head()
            .expect("caller found a non-empty donor list");
        self.bank.mark_used(p, self.block_index(donor, p));

        let mut current = donor;
        for j in (o + 1..=p).rev() {
            let child_order = j - 1;
            let first_offset = self.offset_of(current);
            let second_offset = first_offset + (1usize << child_order);
            // SAFETY: `current` was a valid order-`j` block, so
            // `second_offset < first_offset + 2^j <= size`.
            let second = unsafe { self.block_ptr_at(second_offset) };

            // SAFETY: `current` and `second` are the two halves of a block
            // just removed from every list; neither is aliased elsewhere.
            unsafe {
                self.bank.list(child_order).insert(current);
                self.bank.list(child_order).insert(second);
            }
            self.bank.mark_free(child_order, first_offset >> child_order);
            self.bank.mark_free(child_order, second_offset >> child_order);
            log::trace!(
                "buddy_alloc: split order {j} at offset {first_offset} into order {child_order} buddies"
            );

            if j > o + 1 {
                current = self
                    .bank
                    .list(child_order)
                    .detach_head()
                    .expect("buddy pair was just inserted");
                self.bank
                    .mark_used(child_order, self.block_index(current, child_order));
            }
        }
    }

    /// Return a block previously returned by `allocate` to the allocator.
    ///
    /// # Safety
    /// `ptr` must be a value previously returned by `Allocator::allocate`
    /// on this same allocator, not already freed.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) -> Result<(), FreeError> {
        // SAFETY: caller guarantees `ptr` is a live allocation from this
        // allocator, so `ptr - HEADER_BYTES` is that block's start.
        let block = unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(HEADER_BYTES)) };

        // SAFETY: `block` is the start of a currently-allocated block.
        let order = unsafe { block::read_order(block) };

        #[cfg(debug_assertions)]
        if order < MIN_ORDER || order > self.k {
            return Err(FreeError::CorruptHeader);
        }

        self.stats.on_free(1usize << order);

        // SAFETY: `block` is exactly an order-`order` block inside the
        // arena, currently allocated; overwriting its header with link
        // fields is the transition back to free.
        unsafe {
            block::write_links(block, Links::NULL);
            self.bank.list(order).insert(block);
        }
        self.bank.mark_free(order, self.block_index(block, order));

        log::trace!(
            "buddy_alloc: free order {order} block at offset {}",
            self.offset_of(block)
        );

        self.coalesce_cascade(block, order);
        Ok(())
    }

    /// Repeatedly merge `block` (order `order`) with its buddy while the
    /// buddy is a whole free block at the same order, climbing orders.
    fn coalesce_cascade(&mut self, mut block: NonNull<u8>, mut order: u32) {
        while order < self.k {
            let offset = self.offset_of(block);
            let buddy_offset = offset ^ (1usize << order);
            // SAFETY: flipping bit `order` (< k) of an in-arena offset
            // stays within `[0, size)`.
            let buddy = unsafe { self.block_ptr_at(buddy_offset) };

            // SAFETY: `buddy` is an in-arena address; its first 8 bytes are
            // always either a live header or a link field, both readable.
            if unsafe { block::is_allocated(buddy) } {
                break;
            }

            let buddy_index = buddy_offset >> order;
            if !self.bank.is_free_member(order, buddy_index) {
                // Buddy reads as free (MSB clear) but is not a whole
                // order-`order` free node — it was itself split into
                // smaller pieces. Stop short rather than merge into a
                // region that is not actually free.
                break;
            }

            let own_index = offset >> order;
            // SAFETY: both `block` and `buddy` are members of `bank[order]`.
            unsafe {
                self.bank.list(order).splice(block);
                self.bank.list(order).splice(buddy);
            }
            self.bank.mark_used(order, own_index);
            self.bank.mark_used(order, buddy_index);

            let merged_offset = offset.min(buddy_offset);
            // SAFETY: `merged_offset < size`.
            block = unsafe { self.block_ptr_at(merged_offset) };
            order += 1;

            // SAFETY: `block` is the sole whole order-`order` free node
            // formed by this merge, not referenced anywhere else.
            unsafe { self.bank.list(order).insert(block) };
            self.bank.mark_free(order, merged_offset >> order);

            log::trace!("buddy_alloc: coalesced into order {order} at offset {merged_offset}");
        }
    }

    /// Snapshot of the arena's current occupancy.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Highest order with at least one whole free block, or `None` if the
    /// arena is fully allocated.
    #[must_use]
    pub fn largest_free_order(&self) -> Option<u32> {
        (MIN_ORDER..=self.k).rev().find(|&o| !self.bank.is_order_empty(o))
    }

    /// The arena's base address, useful for debugging and for translating
    /// allocator-relative offsets back to real pointers.
    #[must_use]
    pub fn base_ptr(&self) -> NonNull<u8> {
        self.base
    }

    /// Tear the allocator down explicitly, returning the arena to its
    /// `MemorySource`. Equivalent to dropping the allocator, spelled out
    /// for callers that want teardown to be visible at the call site.
    pub fn deinit(self) {
        drop(self);
    }

    fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        // SAFETY: `ptr` always points inside `[base, base + size)` in every
        // call site within this module.
        unsafe { ptr.as_ptr().byte_offset_from(self.base.as_ptr()) as usize }
    }

    fn block_index(&self, ptr: NonNull<u8>, order: u32) -> usize {
        self.offset_of(ptr) >> order
    }

    /// # Safety
    /// `offset` must be `< self.size`.
    unsafe fn block_ptr_at(&self, offset: usize) -> NonNull<u8> {
        // SAFETY: caller guarantees `offset < self.size`, so the resulting
        // pointer stays within the arena allocation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }
}

impl<S: MemorySource> Drop for Allocator<S> {
    fn drop(&mut self) {
        // SAFETY: `self.base`/`self.size` are exactly the values this
        // allocator received from `self.source.obtain` at `init`, and this
        // runs at most once.
        unsafe { self.source.release(self.base, self.size) };
    }
}

/// Arena occupancy, read with `Allocator::stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total_bytes: usize,
    pub allocated_bytes: usize,
    pub free_bytes: usize,
}

impl Stats {
    fn new(total: usize) -> Self {
        Self {
            total_bytes: total,
            allocated_bytes: 0,
            free_bytes: total,
        }
    }

    fn on_allocate(&mut self, served: usize) {
        self.allocated_bytes += served;
        self.free_bytes -= served;
    }

    fn on_free(&mut self, served: usize) {
        self.allocated_bytes -= served;
        self.free_bytes += served;
    }
}
