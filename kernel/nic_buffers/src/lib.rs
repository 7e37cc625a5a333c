//! Defines the DMA memory that NIC descriptor rings and packet buffers live in.
//!
//! Every region is allocated once, zeroed, and described to the device by the
//! physical address obtained from the host's [`TranslateAddress`] capability.
//! Packet data is always copied into and out of these buffers; they are never
//! lent to code outside the driver, so a buffer the device is currently
//! DMA-ing into can never be aliased by someone else.

#![no_std]

extern crate alloc;
#[macro_use] extern crate log;


use core::{
    alloc::Layout,
    fmt,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};
use alloc::vec::Vec;
use kernel_config::memory::PAGE_SIZE;
use memory_structs::{PhysicalAddress, TranslateAddress, VirtualAddress};
use volatile::Volatile;
use zerocopy::FromBytes;


/// Possible reasons for failing to set up DMA memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaError {
    /// The requested size was zero, or the alignment was not a power of two.
    InvalidLayout,
    /// The heap could not satisfy the allocation.
    OutOfMemory,
    /// The host could not translate the region to one contiguous physical range.
    TranslationFailed(VirtualAddress),
    /// A typed view would not fit in the region or would be misaligned.
    InvalidView,
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmaError::InvalidLayout => f.write_str("invalid DMA region size or alignment"),
            DmaError::OutOfMemory => f.write_str("out of memory for DMA region"),
            DmaError::TranslationFailed(vaddr) => write!(f, "couldn't translate DMA region at {} to a physical address", vaddr),
            DmaError::InvalidView => f.write_str("typed view doesn't fit the DMA region"),
        }
    }
}

impl From<DmaError> for &'static str {
    fn from(error: DmaError) -> Self {
        match error {
            DmaError::InvalidLayout => "invalid DMA region size or alignment",
            DmaError::OutOfMemory => "out of memory for DMA region",
            DmaError::TranslationFailed(_) => "couldn't translate DMA region to a physical address",
            DmaError::InvalidView => "typed view doesn't fit the DMA region",
        }
    }
}


/// A zeroed, aligned region of memory that a device may access via DMA.
/// Auto-dereferences into a byte slice that represents its underlying memory.
pub struct DmaBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    phys_addr: PhysicalAddress,
}

// The region is uniquely owned by this object.
unsafe impl Send for DmaBuffer {}

impl DmaBuffer {
    /// Allocates a new zeroed region of `size_in_bytes` bytes aligned to `align`
    /// and looks up its physical address through `translator`.
    pub fn new<T: TranslateAddress + ?Sized>(
        size_in_bytes: usize,
        align: usize,
        translator: &T,
    ) -> Result<DmaBuffer, DmaError> {
        if size_in_bytes == 0 {
            return Err(DmaError::InvalidLayout);
        }
        let layout = Layout::from_size_align(size_in_bytes, align).map_err(|_| DmaError::InvalidLayout)?;
        let ptr = NonNull::new(unsafe { alloc::alloc::alloc_zeroed(layout) }).ok_or(DmaError::OutOfMemory)?;

        let vaddr = VirtualAddress::from_ptr(ptr.as_ptr());
        match translator.translate(vaddr, size_in_bytes) {
            Some(phys_addr) => Ok(DmaBuffer { ptr, layout, phys_addr }),
            None => {
                unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) };
                error!("DmaBuffer::new(): couldn't translate {} ({} bytes)", vaddr, size_in_bytes);
                Err(DmaError::TranslationFailed(vaddr))
            }
        }
    }

    /// Allocates a page-aligned region, as required for descriptor rings.
    pub fn new_page_aligned<T: TranslateAddress + ?Sized>(size_in_bytes: usize, translator: &T) -> Result<DmaBuffer, DmaError> {
        DmaBuffer::new(size_in_bytes, PAGE_SIZE, translator)
    }

    /// The physical address of the first byte of this region.
    pub fn phys_addr(&self) -> PhysicalAddress {
        self.phys_addr
    }

    /// The virtual address of the first byte of this region.
    pub fn start_address(&self) -> VirtualAddress {
        VirtualAddress::from_ptr(self.ptr.as_ptr())
    }

    pub fn size_in_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Views the start of this region as `count` volatile cells of type `T`.
    ///
    /// Every access through the returned slice is a volatile read or write,
    /// which is required for memory that the device also reads and writes.
    pub fn as_volatile_slice_mut<T: FromBytes + Copy>(&mut self, count: usize) -> Result<&mut [Volatile<T>], DmaError> {
        self.check_view::<T>(count)?;
        // SAFETY: bounds and alignment were checked above, `Volatile<T>` has the
        // same layout as `T`, and any bit pattern is a valid `T`.
        Ok(unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut Volatile<T>, count) })
    }

    /// The read-only version of [`DmaBuffer::as_volatile_slice_mut()`].
    pub fn as_volatile_slice<T: FromBytes + Copy>(&self, count: usize) -> Result<&[Volatile<T>], DmaError> {
        self.check_view::<T>(count)?;
        Ok(unsafe { core::slice::from_raw_parts(self.ptr.as_ptr() as *const Volatile<T>, count) })
    }

    fn check_view<T>(&self, count: usize) -> Result<(), DmaError> {
        let size = count.checked_mul(core::mem::size_of::<T>()).ok_or(DmaError::InvalidView)?;
        if size > self.size_in_bytes() || (self.ptr.as_ptr() as usize) % core::mem::align_of::<T>() != 0 {
            return Err(DmaError::InvalidView);
        }
        Ok(())
    }
}

impl Deref for DmaBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl DerefMut for DmaBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        unsafe { alloc::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DmaBuffer {{ vaddr: {}, paddr: {}, size: {} }}", self.start_address(), self.phys_addr, self.size_in_bytes())
    }
}


/// A fixed set of equally-sized packet buffers, one per descriptor in a ring.
///
/// The buffer at index `i` always belongs to descriptor `i`; buffers are never
/// swapped, handed out, or freed while the ring exists.
pub struct BufferPool {
    buffers: Vec<DmaBuffer>,
    buffer_size: usize,
}

impl BufferPool {
    /// Allocates `num_buffers` zeroed buffers of `buffer_size` bytes each.
    ///
    /// Each buffer is aligned to the next power of two of its size (capped at
    /// one page), so a buffer no larger than a page never straddles a page
    /// boundary and is described by a single physical address.
    pub fn new<T: TranslateAddress + ?Sized>(num_buffers: usize, buffer_size: usize, translator: &T) -> Result<BufferPool, DmaError> {
        let align = buffer_size.checked_next_power_of_two().ok_or(DmaError::InvalidLayout)?.min(PAGE_SIZE);
        let mut buffers = Vec::with_capacity(num_buffers);
        for _ in 0..num_buffers {
            buffers.push(DmaBuffer::new(buffer_size, align, translator)?);
        }
        Ok(BufferPool { buffers, buffer_size })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// The capacity in bytes of every buffer in this pool.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The physical address of the buffer at `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn phys_addr(&self, index: usize) -> PhysicalAddress {
        self.buffers[index].phys_addr()
    }

    /// Copies `data` into the start of the buffer at `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds or `data` is longer than [`BufferPool::buffer_size()`].
    pub fn copy_in(&mut self, index: usize, data: &[u8]) {
        self.buffers[index][..data.len()].copy_from_slice(data);
    }

    /// Copies the first `length` bytes of the buffer at `index` into `dst`,
    /// truncated to whichever of the two is shorter. Returns the number of bytes copied.
    pub fn copy_out(&self, index: usize, length: usize, dst: &mut [u8]) -> usize {
        let len = length.min(self.buffer_size).min(dst.len());
        dst[..len].copy_from_slice(&self.buffers[index][..len]);
        len
    }

    /// Iterates over the physical addresses of all buffers, in ring order.
    pub fn phys_addrs(&self) -> impl Iterator<Item = PhysicalAddress> + '_ {
        self.buffers.iter().map(DmaBuffer::phys_addr)
    }
}
