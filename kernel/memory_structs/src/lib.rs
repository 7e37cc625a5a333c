//! This crate contains the basic address types used by the NIC driver crates.
//!
//! The types of interest are:
//! 1. addresses: `VirtualAddress` and `PhysicalAddress`.
//! 2. the [`TranslateAddress`] capability, which the hosting kernel supplies
//!    so that DMA memory can be described to a device by its physical address.

#![no_std]

#[cfg(test)]
mod test;

use core::fmt;
use paste::paste;

/// A macro for defining `VirtualAddress` and `PhysicalAddress` structs
/// and implementing their common traits, which are generally identical.
macro_rules! implement_address {
    ($TypeName:ident, $desc:literal, $prefix:literal, $is_canonical:ident, $canonicalize:ident) => {
        paste! { // using the paste crate's macro for easy concatenation

            #[doc = "A " $desc " memory address, which is a `usize` under the hood."]
            #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
            #[repr(transparent)]
            pub struct $TypeName(usize);

            impl $TypeName {
                #[doc = "Creates a new `" $TypeName "`, returning `None` if the address is not canonical."]
                pub fn new(addr: usize) -> Option<$TypeName> {
                    if $is_canonical(addr) { Some($TypeName(addr)) } else { None }
                }

                #[doc = "Creates a new `" $TypeName "` that is guaranteed to be canonical."]
                pub const fn new_canonical(addr: usize) -> $TypeName {
                    $TypeName($canonicalize(addr))
                }

                #[doc = "Returns the underlying `usize` value for this `" $TypeName "`."]
                #[inline]
                pub const fn value(&self) -> usize {
                    self.0
                }

                /// Returns the lower 32 bits of this address, as written into a `*BAL` register.
                pub const fn low_u32(&self) -> u32 {
                    self.0 as u32
                }

                /// Returns the upper 32 bits of this address, as written into a `*BAH` register.
                pub const fn high_u32(&self) -> u32 {
                    ((self.0 as u64) >> 32) as u32
                }
            }
            impl fmt::Debug for $TypeName {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, concat!($prefix, "{:#X}"), self.0)
                }
            }
            impl fmt::Display for $TypeName {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{:?}", self)
                }
            }
        }
    };
}

#[cfg(target_arch = "x86_64")]
mod canonical_address {
    use bit_field::BitField;

    #[inline]
    pub fn is_canonical_virtual_address(virt_addr: usize) -> bool {
        matches!(virt_addr.get_bits(47..64), 0 | 0b1_1111_1111_1111_1111)
    }

    #[inline]
    pub const fn canonicalize_virtual_address(virt_addr: usize) -> usize {
        // sign-extend bit 47 into the upper 16 bits
        ((virt_addr << 16) as isize >> 16) as usize
    }

    #[inline]
    pub fn is_canonical_physical_address(phys_addr: usize) -> bool {
        matches!(phys_addr.get_bits(52..64), 0)
    }

    #[inline]
    pub const fn canonicalize_physical_address(phys_addr: usize) -> usize {
        phys_addr & 0x000F_FFFF_FFFF_FFFF
    }
}

#[cfg(target_arch = "aarch64")]
mod canonical_address {
    use bit_field::BitField;

    /// With an ASID of zero, a canonical VA has the 16 most significant bits cleared.
    #[inline]
    pub fn is_canonical_virtual_address(virt_addr: usize) -> bool {
        matches!(virt_addr.get_bits(48..64), 0)
    }

    #[inline]
    pub const fn canonicalize_virtual_address(virt_addr: usize) -> usize {
        virt_addr & 0x0000_FFFF_FFFF_FFFF
    }

    /// The MMU is configured for 48-bit physical addresses.
    #[inline]
    pub fn is_canonical_physical_address(phys_addr: usize) -> bool {
        matches!(phys_addr.get_bits(48..64), 0)
    }

    #[inline]
    pub const fn canonicalize_physical_address(phys_addr: usize) -> usize {
        phys_addr & 0x0000_FFFF_FFFF_FFFF
    }
}

use canonical_address::*;

implement_address!(
    VirtualAddress,
    "virtual",
    "v",
    is_canonical_virtual_address,
    canonicalize_virtual_address
);

implement_address!(
    PhysicalAddress,
    "physical",
    "p",
    is_canonical_physical_address,
    canonicalize_physical_address
);

impl VirtualAddress {
    /// Returns the virtual address of the given pointer.
    pub fn from_ptr<T>(ptr: *const T) -> VirtualAddress {
        VirtualAddress::new_canonical(ptr as usize)
    }
}


/// The capability to find the physical address behind a range of virtual memory.
///
/// Devices only understand physical addresses, so every ring and packet buffer
/// handed to a NIC must be described by one. The hosting kernel owns the page
/// tables and therefore supplies this capability; the driver never assumes a
/// fixed offset between virtual and physical memory.
pub trait TranslateAddress {
    /// Returns the physical address that backs `vaddr`.
    ///
    /// Returns `None` if `vaddr` is unmapped, or if the `size_in_bytes` bytes
    /// starting at `vaddr` are not contiguous in physical memory.
    fn translate(&self, vaddr: VirtualAddress, size_in_bytes: usize) -> Option<PhysicalAddress>;
}

impl<T: TranslateAddress + ?Sized> TranslateAddress for &T {
    fn translate(&self, vaddr: VirtualAddress, size_in_bytes: usize) -> Option<PhysicalAddress> {
        (**self).translate(vaddr, size_in_bytes)
    }
}

/// Translation for identity-mapped memory, in which every virtual address
/// equals its physical address.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTranslation;

impl TranslateAddress for IdentityTranslation {
    fn translate(&self, vaddr: VirtualAddress, _size_in_bytes: usize) -> Option<PhysicalAddress> {
        PhysicalAddress::new(vaddr.value())
    }
}
