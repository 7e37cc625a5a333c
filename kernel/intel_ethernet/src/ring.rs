use core::marker::PhantomData;
use memory_structs::{PhysicalAddress, TranslateAddress};
use nic_buffers::{DmaBuffer, DmaError};
use volatile::Volatile;
use zerocopy::{AsBytes, FromBytes};

/// A circular array of `D` descriptors in page-aligned DMA memory.
///
/// The memory is shared with the device, so every descriptor is read and
/// written as a whole with a single volatile access.
pub struct DescriptorRing<D> {
    memory: DmaBuffer,
    num_descs: u16,
    _descriptor: PhantomData<D>,
}

impl<D: FromBytes + AsBytes + Copy> DescriptorRing<D> {
    /// Allocates a zeroed ring of `num_descs` descriptors.
    pub fn new<T: TranslateAddress + ?Sized>(num_descs: u16, translator: &T) -> Result<DescriptorRing<D>, DmaError> {
        let size_in_bytes = num_descs as usize * core::mem::size_of::<D>();
        let memory = DmaBuffer::new_page_aligned(size_in_bytes, translator)?;
        // make sure the whole ring can be viewed as descriptors before handing it out
        memory.as_volatile_slice::<D>(num_descs as usize)?;
        debug!("DescriptorRing::new(): {} descriptors at {:?}", num_descs, memory);
        Ok(DescriptorRing { memory, num_descs, _descriptor: PhantomData })
    }

    /// The number of descriptors in this ring.
    pub fn len(&self) -> u16 {
        self.num_descs
    }

    pub fn is_empty(&self) -> bool {
        self.num_descs == 0
    }

    /// The physical address of the first descriptor, for the base address registers.
    pub fn phys_addr(&self) -> PhysicalAddress {
        self.memory.phys_addr()
    }

    /// The length of the ring in bytes, for the descriptor length register.
    pub fn size_in_bytes(&self) -> u32 {
        (self.num_descs as usize * core::mem::size_of::<D>()) as u32
    }

    /// Volatile read of the whole descriptor at `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn read(&self, index: u16) -> D {
        self.descs()[index as usize].read()
    }

    /// Volatile write of the whole descriptor at `index`.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn write(&mut self, index: u16, desc: D) {
        self.descs_mut()[index as usize].write(desc)
    }

    /// Reads the descriptor at `index`, lets `f` modify it, and writes it back.
    pub fn update<F: FnOnce(&mut D)>(&mut self, index: u16, f: F) {
        let mut desc = self.read(index);
        f(&mut desc);
        self.write(index, desc);
    }

    fn descs(&self) -> &[Volatile<D>] {
        // SAFETY: `new()` checked that `num_descs` descriptors fit in `memory` with proper alignment.
        unsafe { core::slice::from_raw_parts(self.memory.as_ptr() as *const Volatile<D>, self.num_descs as usize) }
    }

    fn descs_mut(&mut self) -> &mut [Volatile<D>] {
        let num_descs = self.num_descs as usize;
        unsafe { core::slice::from_raw_parts_mut(self.memory.as_mut_ptr() as *mut Volatile<D>, num_descs) }
    }
}
