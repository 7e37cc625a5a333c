//! Tests for the address types and the identity translation.

extern crate std;

use self::std::format;
use super::*;

#[test]
fn physical_address_halves() {
    let paddr = PhysicalAddress::new(0x0000_0001_2345_6000).unwrap();
    assert_eq!(paddr.low_u32(), 0x2345_6000);
    assert_eq!(paddr.high_u32(), 0x1);
}

#[test]
fn non_canonical_physical_address() {
    assert!(PhysicalAddress::new(usize::MAX).is_none());
    let canonical = PhysicalAddress::new_canonical(usize::MAX);
    assert!(PhysicalAddress::new(canonical.value()).is_some());
}

#[test]
fn address_formatting() {
    let paddr = PhysicalAddress::new(0xABC0).unwrap();
    assert_eq!(format!("{:?}", paddr), "p0xABC0");
    assert_eq!(format!("{}", paddr), "p0xABC0");
    let vaddr = VirtualAddress::new(0x10).unwrap();
    assert_eq!(format!("{}", vaddr), "v0x10");
}

#[test]
fn identity_translation() {
    let buf = [0u8; 64];
    let vaddr = VirtualAddress::from_ptr(buf.as_ptr());
    let paddr = IdentityTranslation.translate(vaddr, buf.len()).unwrap();
    assert_eq!(paddr.value(), buf.as_ptr() as usize);

    // translation through a reference works the same way
    let by_ref: &dyn TranslateAddress = &IdentityTranslation;
    assert_eq!(by_ref.translate(vaddr, 1), Some(paddr));
}
