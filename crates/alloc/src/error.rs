//! Allocator error types, built with the shared `define_buddy_error!`
//! macro from the sibling `buddy_alloc_error` crate: four failure kinds,
//! all reported synchronously.

use buddy_alloc_error::define_buddy_error;

define_buddy_error! {
    /// `init`'s arena-size validation failed ("configuration-invalid").
    pub enum ConfigError(0x01) {
        /// `requested + HEADER_BYTES` overflowed before it could be
        /// rounded up to a power of two.
        SizeOverflow = 0x01 => "requested arena size overflows before rounding",
        /// The rounded size falls outside `[16, 2^32]`.
        SizeOutOfRange = 0x02 => "requested arena size is outside the supported range",
    }
}

define_buddy_error! {
    /// `init` failed: either the requested configuration was invalid, or
    /// the memory source refused to hand out the arena.
    pub enum InitError(0x02) {
        Config(ConfigError) = 0x01 => "invalid init configuration",
        SourceExhausted = 0x02 => "memory source refused to hand out the arena",
    }
}

define_buddy_error! {
    /// `allocate` failed. The spec does not distinguish genuine exhaustion
    /// from fragmentation-induced failure at the API level, so neither
    /// does this type.
    pub enum AllocError(0x03) {
        CapacityExceeded = 0x01 => "requested size exceeds the arena's maximum order",
        OutOfMemory = 0x02 => "no free block available at or above the required order",
    }
}

define_buddy_error! {
    /// Debug-only sentinel check on `free`'s recovered header ("a
    /// hardened implementation MAY add a debug-only sentinel check on the
    /// header word"). Only ever returned under `cfg(debug_assertions)`;
    /// release builds trust the header unconditionally — `free` on a
    /// foreign pointer is undefined behavior either way.
    pub enum FreeError(0x04) {
        CorruptHeader = 0x01 => "recovered block order is outside the arena's valid range",
    }
}
