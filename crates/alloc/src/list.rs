//! Free-list node discipline.
//!
//! Each order's free list is a doubly-linked list with no sentinel; the
//! bank slot itself holds the head pointer (or `None`). This mirrors the
//! shape of the pack's intrusive `SlabList`/`ListNode` pair, adapted to
//! operate on raw in-band link fields (the node lives inside the free
//! block itself, not in an external descriptor struct) and to the spec's
//! insertion rule: everything but the very first node in an empty list is
//! attached *after* the head, not pushed in front of it.

use crate::block::{self, Links};
use core::ptr::NonNull;

/// One order's free list. Holds just the head; `None` means empty.
pub(crate) struct FreeList {
    head: Option<NonNull<u8>>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn head(&self) -> Option<NonNull<u8>> {
        self.head
    }

    /// detach-head: remove the current head and return it. The returned
    /// node's own link fields are left as-is — callers that hand the block
    /// to a different list, or turn it into an allocated-block header,
    /// overwrite them anyway.
    pub(crate) fn detach_head(&mut self) -> Option<NonNull<u8>> {
        let head = self.head?;
        // SAFETY: `head` is this list's head, so its links are valid.
        let links = unsafe { block::read_links(head) };
        self.head = links.next;
        if let Some(new_head) = self.head {
            // SAFETY: `new_head` is a free node on this list.
            let mut new_links = unsafe { block::read_links(new_head) };
            new_links.prev = None;
            unsafe { block::write_links(new_head, new_links) };
        }
        Some(head)
    }

    /// splice: remove `node` from wherever it sits in this list, fixing up
    /// its neighbors. Handles `node` being the head transparently (falls
    /// back to the detach-head update of the bank slot).
    ///
    /// # Safety
    /// `node` must currently be a member of this list.
    pub(crate) unsafe fn splice(&mut self, node: NonNull<u8>) {
        // SAFETY: caller guarantees `node` is on this list.
        let links = unsafe { block::read_links(node) };
        match links.prev {
            Some(prev) => {
                // SAFETY: `prev` is a free node on this list.
                let mut prev_links = unsafe { block::read_links(prev) };
                prev_links.next = links.next;
                unsafe { block::write_links(prev, prev_links) };
            }
            None => self.head = links.next,
        }
        if let Some(next) = links.next {
            // SAFETY: `next` is a free node on this list.
            let mut next_links = unsafe { block::read_links(next) };
            next_links.prev = links.prev;
            unsafe { block::write_links(next, next_links) };
        }
        unsafe { block::write_links(node, Links::NULL) };
    }

    /// Insert `entry` into this list. On an empty list `entry` becomes the
    /// head with null links; otherwise it is attached after the current
    /// head (attach-after-head).
    ///
    /// # Safety
    /// `entry` must point to a block not currently on any free list.
    pub(crate) unsafe fn insert(&mut self, entry: NonNull<u8>) {
        match self.head {
            None => {
                unsafe { block::write_links(entry, Links::NULL) };
                self.head = Some(entry);
            }
            Some(head) => unsafe { self.attach_after_head(head, entry) },
        }
    }

    /// attach-after(head, entry): insert `entry` between `head` and
    /// `head.next`. `head` must be this list's current (non-null) head.
    ///
    /// # Safety
    /// `head` must be this list's current head and `entry` must not
    /// already be a member of any free list.
    unsafe fn attach_after_head(&mut self, head: NonNull<u8>, entry: NonNull<u8>) {
        // SAFETY: `head` is this list's head.
        let mut head_links = unsafe { block::read_links(head) };
        let old_next = head_links.next;
        unsafe {
            block::write_links(
                entry,
                Links {
                    prev: Some(head),
                    next: old_next,
                },
            );
        }
        if let Some(next) = old_next {
            // SAFETY: `next` is a free node on this list.
            let mut next_links = unsafe { block::read_links(next) };
            next_links.prev = Some(entry);
            unsafe { block::write_links(next, next_links) };
        }
        head_links.next = Some(entry);
        unsafe { block::write_links(head, head_links) };
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    extern crate std;
    use std::alloc::{alloc_zeroed, Layout};
    use std::vec::Vec;

    /// Allocates `n` 16-byte blocks so free-list tests have real, aligned,
    /// in-band storage to read/write link fields into.
    fn blocks(n: usize) -> Vec<NonNull<u8>> {
        (0..n)
            .map(|_| {
                let layout = Layout::from_size_align(16, 16).unwrap();
                // SAFETY: non-zero size/align.
                let ptr = unsafe { alloc_zeroed(layout) };
                NonNull::new(ptr).unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_list_insert_becomes_head() {
        let mut list = FreeList::new();
        let b = blocks(1);
        unsafe { list.insert(b[0]) };
        assert_eq!(list.head(), Some(b[0]));
        let links = unsafe { block::read_links(b[0]) };
        assert!(links.prev.is_none());
        assert!(links.next.is_none());
    }

    #[test]
    fn second_insert_attaches_after_head_not_before() {
        let mut list = FreeList::new();
        let b = blocks(3);
        unsafe {
            list.insert(b[0]);
            list.insert(b[1]);
        }
        // head is still b[0]; b[1] is second.
        assert_eq!(list.head(), Some(b[0]));
        let head_links = unsafe { block::read_links(b[0]) };
        assert_eq!(head_links.next, Some(b[1]));
        let second_links = unsafe { block::read_links(b[1]) };
        assert_eq!(second_links.prev, Some(b[0]));
        assert!(second_links.next.is_none());

        unsafe { list.insert(b[2]) };
        // b[2] becomes the new second element, between b[0] and b[1].
        assert_eq!(list.head(), Some(b[0]));
        let head_links = unsafe { block::read_links(b[0]) };
        assert_eq!(head_links.next, Some(b[2]));
        let third_links = unsafe { block::read_links(b[2]) };
        assert_eq!(third_links.prev, Some(b[0]));
        assert_eq!(third_links.next, Some(b[1]));
    }

    #[test]
    fn detach_head_returns_head_and_advances() {
        let mut list = FreeList::new();
        let b = blocks(2);
        unsafe {
            list.insert(b[0]);
            list.insert(b[1]);
        }
        let popped = list.detach_head().unwrap();
        assert_eq!(popped, b[0]);
        assert_eq!(list.head(), Some(b[1]));
        let links = unsafe { block::read_links(b[1]) };
        assert!(links.prev.is_none());
    }

    #[test]
    fn splice_middle_node_fixes_neighbors() {
        let mut list = FreeList::new();
        let b = blocks(3);
        unsafe {
            list.insert(b[0]);
            list.insert(b[1]); // head, b[1]
            list.insert(b[2]); // head, b[2], b[1]
            list.splice(b[2]);
        }
        assert_eq!(list.head(), Some(b[0]));
        let head_links = unsafe { block::read_links(b[0]) };
        assert_eq!(head_links.next, Some(b[1]));
        let tail_links = unsafe { block::read_links(b[1]) };
        assert_eq!(tail_links.prev, Some(b[0]));
    }

    #[test]
    fn splice_head_updates_list_head() {
        let mut list = FreeList::new();
        let b = blocks(2);
        unsafe {
            list.insert(b[0]);
            list.insert(b[1]);
            list.splice(b[0]);
        }
        assert_eq!(list.head(), Some(b[1]));
        let links = unsafe { block::read_links(b[1]) };
        assert!(links.prev.is_none());
    }
}
