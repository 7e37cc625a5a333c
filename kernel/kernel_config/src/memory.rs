//! Memory constants for targets that use 4 KiB base pages.

/// The lower 12 bits of an address are the offset into its page.
pub const PAGE_SHIFT: usize = 12;
/// Page size is 4096 bytes, 4KiB pages.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
