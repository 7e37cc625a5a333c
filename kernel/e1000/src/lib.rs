//! Driver for the Intel 8254x (e1000) family of ethernet cards.
//!
//! The driver owns one transmit queue and one receive queue, each a descriptor
//! ring paired with driver-owned packet buffers. Packets are always copied into
//! and out of those buffers, and neither [`E1000Nic::transmit()`] nor
//! [`E1000Nic::receive()`] ever blocks.
//!
//! Everything outside of the device itself is supplied by the host through a
//! few traits: [`E1000Device`] for bus setup and register mapping,
//! [`TranslateAddress`] for DMA addresses, [`InterruptController`] for the IRQ line,
//! and [`ReceiveCompletion`] for waking a consumer that blocked on receive.

#![no_std]

extern crate alloc;
#[macro_use] extern crate log;
#[macro_use] extern crate static_assertions;

pub mod regs;
pub mod eeprom;

use core::fmt;
use alloc::{vec, vec::Vec};
use bit_field::BitField;
use spin::{Mutex, Once};
use kernel_config::network::{
    CONFIG_E1000_BUFFER_SIZE_IN_BYTES, CONFIG_E1000_MAX_TX_PACKET_SIZE,
    CONFIG_E1000_NUM_RX_DESC, CONFIG_E1000_NUM_TX_DESC,
};
use memory_structs::TranslateAddress;
use intel_ethernet::descriptors::{LegacyRxDescriptor, LegacyTxDescriptor};
use nic_initialization::{init_rx_queue, init_tx_queue, NicInitError};
use nic_queues::{QueueStats, RxError, RxQueue, RxQueueRegisters, TxError, TxQueue, TxQueueRegisters};
use regs::*;

pub use regs::{MmioRegisters, RegisterAccess, RegisterFile};

/// Vendor ID for Intel
pub const INTEL_VEND:           u16 = 0x8086;
/// Device ID for the e1000 Qemu, Bochs, and VirtualBox emulated NICs
pub const E1000_DEV:            u16 = 0x100E;

// RCTL is programmed for 2048-byte receive buffers.
const_assert_eq!(CONFIG_E1000_BUFFER_SIZE_IN_BYTES, 2048);
const_assert!(CONFIG_E1000_MAX_TX_PACKET_SIZE <= CONFIG_E1000_BUFFER_SIZE_IN_BYTES as usize);


/// Errors that can occur while bringing up or driving the e1000.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum E1000Error {
    /// The register block couldn't be mapped, or the mapped window is too small.
    DeviceMappingFailure,
    /// The device didn't complete an EEPROM read in time.
    DeviceNotResponding,
    /// Another consumer is already blocked waiting for a packet.
    ReceiverBusy,
    /// A receive was rejected; see [`RxError`].
    Receive(RxError),
    /// The transmit or receive queue couldn't be set up.
    Init(NicInitError),
    /// The e1000 singleton was already initialized.
    AlreadyInitialized,
}

impl From<NicInitError> for E1000Error {
    fn from(error: NicInitError) -> Self {
        E1000Error::Init(error)
    }
}

impl fmt::Display for E1000Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            E1000Error::DeviceMappingFailure => f.write_str("couldn't map the e1000 register block"),
            E1000Error::DeviceNotResponding => f.write_str("e1000 didn't respond to an EEPROM read"),
            E1000Error::ReceiverBusy => f.write_str("another consumer is already waiting to receive"),
            E1000Error::Receive(e) => write!(f, "{}", e),
            E1000Error::Init(e) => write!(f, "e1000 queue setup failed: {}", e),
            E1000Error::AlreadyInitialized => f.write_str("e1000 was already initialized"),
        }
    }
}

impl From<E1000Error> for &'static str {
    fn from(error: E1000Error) -> Self {
        match error {
            E1000Error::DeviceMappingFailure => "couldn't map the e1000 register block",
            E1000Error::DeviceNotResponding => "e1000 didn't respond to an EEPROM read",
            E1000Error::ReceiverBusy => "another consumer is already waiting to receive",
            E1000Error::Receive(e) => e.into(),
            E1000Error::Init(e) => e.into(),
            E1000Error::AlreadyInitialized => "e1000 was already initialized",
        }
    }
}


/// Identifies the consumer (e.g., a task) that is blocked waiting for a received packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub usize);

/// The outcome of [`E1000Nic::receive_or_block()`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A packet of this many bytes was copied into the destination.
    Received(usize),
    /// No packet was available, so the consumer is now registered as blocked.
    /// It is woken through [`ReceiveCompletion`] once a packet arrives.
    Blocked,
}

/// Counters kept by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NicStats {
    pub tx: QueueStats,
    pub rx: QueueStats,
    /// Interrupts that found a consumer waiting on the receive path.
    pub interrupts: u64,
}


/// The bus-level view of an e1000 device, provided by whoever discovered it (e.g., PCI).
pub trait E1000Device {
    /// The register window produced by [`E1000Device::map_registers()`].
    type Registers: RegisterAccess;

    /// Allows the device to perform DMA by setting its bus mastering bit.
    fn enable_bus_mastering(&mut self);

    /// Maps the device's register block (BAR0) into the current address space.
    fn map_registers(&mut self) -> Result<Self::Registers, &'static str>;

    /// The platform interrupt line the device raises.
    fn interrupt_line(&self) -> u8;
}

/// The platform interrupt controller.
pub trait InterruptController {
    /// Allows the given interrupt line to be delivered.
    fn unmask(&mut self, interrupt_line: u8);
}

/// Completes a receive that a consumer blocked on.
pub trait ReceiveCompletion {
    /// Wakes `consumer`, handing it `frame` as the result of its blocked receive.
    /// Called from interrupt context with the device lock held, so it must not block.
    fn receive_completed(&self, consumer: ConsumerId, frame: &[u8]);
}


/// A struct which contains the receive queue registers and implements the `RxQueueRegisters` trait,
/// which is required to store the registers in an `RxQueue` object.
pub struct E1000RxQueueRegisters<A: RegisterAccess>(RegisterFile<A>);

impl<A: RegisterAccess> RxQueueRegisters for E1000RxQueueRegisters<A> {
    fn set_rdbal(&mut self, value: u32) {
        self.0.write(REG_RDBAL, value);
    }
    fn set_rdbah(&mut self, value: u32) {
        self.0.write(REG_RDBAH, value);
    }
    fn set_rdlen(&mut self, value: u32) {
        self.0.write(REG_RDLEN, value);
    }
    fn set_rdh(&mut self, value: u32) {
        self.0.write(REG_RDH, value);
    }
    fn set_rdt(&mut self, value: u32) {
        self.0.write(REG_RDT, value);
    }
    fn rdt(&self) -> u32 {
        self.0.read(REG_RDT)
    }
}

/// A struct which contains the transmit queue registers and implements the `TxQueueRegisters` trait,
/// which is required to store the registers in a `TxQueue` object.
pub struct E1000TxQueueRegisters<A: RegisterAccess>(RegisterFile<A>);

impl<A: RegisterAccess> TxQueueRegisters for E1000TxQueueRegisters<A> {
    fn set_tdbal(&mut self, value: u32) {
        self.0.write(REG_TDBAL, value);
    }
    fn set_tdbah(&mut self, value: u32) {
        self.0.write(REG_TDBAH, value);
    }
    fn set_tdlen(&mut self, value: u32) {
        self.0.write(REG_TDLEN, value);
    }
    fn set_tdh(&mut self, value: u32) {
        self.0.write(REG_TDH, value);
    }
    fn set_tdt(&mut self, value: u32) {
        self.0.write(REG_TDT, value);
    }
    fn tdt(&self) -> u32 {
        self.0.read(REG_TDT)
    }
}


/// Struct representing an e1000 network interface card.
pub struct E1000Nic<A: RegisterAccess> {
    /// The interrupt line the device raises.
    interrupt_line: u8,
    /// The MAC address burned into the EEPROM.
    mac_hardware: [u8; 6],
    /// Receive queue with descriptors
    rx_queue: RxQueue<E1000RxQueueRegisters<A>, LegacyRxDescriptor>,
    /// Transmit queue with descriptors
    tx_queue: TxQueue<E1000TxQueueRegisters<A>, LegacyTxDescriptor>,
    /// The consumer waiting for the next received packet, if any.
    /// Only one consumer may wait at a time.
    blocked_receiver: Option<ConsumerId>,
    /// Where the interrupt handler receives a packet on behalf of the blocked consumer.
    staging_buffer: Vec<u8>,
    interrupts: u64,
    /// The control registers
    regs: RegisterFile<A>,
}

impl<A: RegisterAccess> E1000Nic<A> {
    /// Brings up the given e1000 device.
    ///
    /// The steps are strictly ordered: ring base and length registers are programmed before
    /// the corresponding control enable bits, the station address is valid before the receiver
    /// is enabled, and interrupts are unmasked last.
    ///
    /// # Arguments
    /// * `device`: the bus-level device, whose registers are mapped here
    /// * `translator`: virtual to physical address translation for the rings and packet buffers
    /// * `interrupt_controller`: used to unmask the device's interrupt line once it is ready
    pub fn init<D, T, I>(device: &mut D, translator: &T, interrupt_controller: &mut I) -> Result<E1000Nic<A>, E1000Error>
        where D: E1000Device<Registers = A>,
              T: TranslateAddress + ?Sized,
              I: InterruptController + ?Sized,
    {
        // set the bus mastering bit, which allows the device to use DMA
        device.enable_bus_mastering();
        let access = device.map_registers().map_err(|e| {
            error!("e1000::init(): couldn't map registers: {}", e);
            E1000Error::DeviceMappingFailure
        })?;
        let regs = RegisterFile::new(access)?;
        let interrupt_line = device.interrupt_line();

        Self::start_link(&regs);

        let tx_queue = Self::tx_init(&regs, translator)?;

        let mac_hardware = eeprom::read_station_address(&regs)?;
        Self::set_station_address(&regs, mac_hardware);
        Self::clear_multicast(&regs);

        let rx_queue = Self::rx_init(&regs, translator)?;

        Self::enable_interrupts(&regs);
        interrupt_controller.unmask(interrupt_line);
        info!("e1000::init(): MAC address {:02x?}, interrupt line {}", mac_hardware, interrupt_line);

        Ok(E1000Nic {
            interrupt_line,
            mac_hardware,
            rx_queue,
            tx_queue,
            blocked_receiver: None,
            staging_buffer: vec![0; CONFIG_E1000_BUFFER_SIZE_IN_BYTES as usize],
            interrupts: 0,
            regs,
        })
    }

    /// Sets the link up and takes the device out of any reset state.
    fn start_link(regs: &RegisterFile<A>) {
        regs.set_bits(REG_CTRL, CTRL_SLU);
        regs.clear_bits(REG_CTRL, CTRL_LRST | CTRL_ILOS | CTRL_VME | CTRL_PHY_RST);
        debug!("e1000::start_link(): REG_CTRL: {:#X}", regs.read(REG_CTRL));
    }

    /// Initializes the transmit ring, then enables the transmitter for full-duplex operation.
    fn tx_init<T: TranslateAddress + ?Sized>(
        regs: &RegisterFile<A>,
        translator: &T,
    ) -> Result<TxQueue<E1000TxQueueRegisters<A>, LegacyTxDescriptor>, E1000Error> {
        let tx_queue = init_tx_queue(
            CONFIG_E1000_NUM_TX_DESC,
            CONFIG_E1000_BUFFER_SIZE_IN_BYTES as usize,
            CONFIG_E1000_MAX_TX_PACKET_SIZE,
            translator,
            E1000TxQueueRegisters(regs.clone()),
        )?;

        regs.write_field(REG_TCTL, TCTL_CT_MASK, TCTL_CT_SHIFT, TCTL_CT_FULL_DUPLEX);
        regs.write_field(REG_TCTL, TCTL_COLD_MASK, TCTL_COLD_SHIFT, TCTL_COLD_FULL_DUPLEX);
        regs.set_bits(REG_TCTL, TCTL_EN | TCTL_PSP);

        let mut tipg = 0u32;
        tipg.set_bits(0..10, TIPG_IPGT);
        tipg.set_bits(TIPG_IPGR1_SHIFT as usize..(TIPG_IPGR1_SHIFT + 10) as usize, TIPG_IPGR1);
        tipg.set_bits(TIPG_IPGR2_SHIFT as usize..(TIPG_IPGR2_SHIFT + 10) as usize, TIPG_IPGR2);
        regs.write(REG_TIPG, tipg);

        debug!("e1000::tx_init(): TCTL: {:#X}, TIPG: {:#X}", regs.read(REG_TCTL), tipg);
        Ok(tx_queue)
    }

    /// Programs receive address 0 with the given MAC address and marks it valid.
    fn set_station_address(regs: &RegisterFile<A>, mac_addr: [u8; 6]) {
        let low = u32::from_le_bytes([mac_addr[0], mac_addr[1], mac_addr[2], mac_addr[3]]);
        let high = u16::from_le_bytes([mac_addr[4], mac_addr[5]]) as u32;
        regs.write(REG_RAL0, low);
        regs.write(REG_RAH0, high | RAH_AV);
    }

    /// Clears the multicast table so that no multicast frames are accepted.
    fn clear_multicast(regs: &RegisterFile<A>) {
        for i in 0..MTA_NUM_ENTRIES {
            regs.write(REG_MTA + i * 4, 0);
        }
    }

    /// Initializes the receive ring, offering every buffer to the device, then enables the receiver.
    fn rx_init<T: TranslateAddress + ?Sized>(
        regs: &RegisterFile<A>,
        translator: &T,
    ) -> Result<RxQueue<E1000RxQueueRegisters<A>, LegacyRxDescriptor>, E1000Error> {
        let rx_queue = init_rx_queue(
            CONFIG_E1000_NUM_RX_DESC,
            CONFIG_E1000_BUFFER_SIZE_IN_BYTES as usize,
            translator,
            E1000RxQueueRegisters(regs.clone()),
        )?;

        // accept broadcast, strip the CRC, and use 2048-byte buffers
        regs.write(REG_RCTL, RCTL_EN | RCTL_LBM_NONE | RCTL_RDMTS_HALF | RCTL_BAM | RCTL_SECRC | RCTL_BSIZE_2048);
        debug!("e1000::rx_init(): RCTL: {:#X}", regs.read(REG_RCTL));
        Ok(rx_queue)
    }

    /// Unmasks the receive timer interrupt and discards any stale interrupt causes.
    fn enable_interrupts(regs: &RegisterFile<A>) {
        regs.write(REG_IMS, INT_RXT0);
        regs.read(REG_ICR);
    }

    /// Copies `packet` into the transmit ring and notifies the device.
    pub fn transmit(&mut self, packet: &[u8]) -> Result<(), TxError> {
        self.tx_queue.transmit(packet)
    }

    /// Copies the next received packet into `dst`, returning its length.
    pub fn receive(&mut self, dst: &mut [u8]) -> Result<usize, RxError> {
        self.rx_queue.receive(dst)
    }

    /// Receives a packet into `dst` if one is available; otherwise registers `consumer`
    /// as blocked, to be completed by the interrupt handler once a packet arrives.
    ///
    /// Only one consumer may be blocked at a time. While one is, any further call
    /// returns [`E1000Error::ReceiverBusy`] without touching the receive ring.
    pub fn receive_or_block(&mut self, consumer: ConsumerId, dst: &mut [u8]) -> Result<ReceiveOutcome, E1000Error> {
        if let Some(blocked) = self.blocked_receiver {
            warn!("e1000: {:?} tried to receive while {:?} is already blocked", consumer, blocked);
            return Err(E1000Error::ReceiverBusy);
        }
        match self.rx_queue.receive(dst) {
            Ok(length) => Ok(ReceiveOutcome::Received(length)),
            Err(RxError::RingEmpty) => {
                self.blocked_receiver = Some(consumer);
                Ok(ReceiveOutcome::Blocked)
            }
            Err(e) => Err(E1000Error::Receive(e)),
        }
    }

    /// The main interrupt handling routine for the e1000 NIC.
    /// This should be invoked from the actual interrupt handler entry point.
    ///
    /// Reading the interrupt cause register clears every cause accumulated since the
    /// last read, so rather than acting on individual causes this re-checks the receive
    /// ring whenever a consumer is waiting. Returns the interrupt causes that were read.
    pub fn handle_interrupt<W: ReceiveCompletion + ?Sized>(&mut self, completion: &W) -> u32 {
        let cause = self.regs.read(REG_ICR);

        let consumer = match self.blocked_receiver {
            Some(consumer) => consumer,
            None => return cause,
        };
        self.interrupts += 1;

        match self.rx_queue.receive(&mut self.staging_buffer) {
            Ok(length) => {
                self.blocked_receiver = None;
                completion.receive_completed(consumer, &self.staging_buffer[..length]);
            }
            Err(RxError::RingEmpty) => { }
            Err(e) => error!("e1000::handle_interrupt(): receive into staging buffer failed: {}", e),
        }
        cause
    }

    /// Makes the device raise a receive timer interrupt.
    pub fn generate_test_interrupt(&self) {
        self.regs.write(REG_ICS, INT_RXT0);
    }

    /// The MAC address read from the EEPROM at initialization.
    pub fn mac_address(&self) -> [u8; 6] {
        self.mac_hardware
    }

    /// Returns true if no received packet is waiting. Doesn't modify the receive ring.
    pub fn is_receive_ring_empty(&self) -> bool {
        self.rx_queue.is_empty()
    }

    /// Returns true if the device reports that the link is up.
    pub fn link_up(&self) -> bool {
        self.regs.read(REG_STATUS).get_bit(STATUS_LU_BIT)
    }

    /// The consumer currently blocked on receive, if any.
    pub fn blocked_receiver(&self) -> Option<ConsumerId> {
        self.blocked_receiver
    }

    pub fn interrupt_line(&self) -> u8 {
        self.interrupt_line
    }

    pub fn stats(&self) -> NicStats {
        NicStats {
            tx: self.tx_queue.stats(),
            rx: self.rx_queue.stats(),
            interrupts: self.interrupts,
        }
    }
}


/// The single instance of the E1000 NIC, along with the sink that wakes
/// consumers blocked on its receive path.
struct E1000Singleton {
    nic: Mutex<E1000Nic<MmioRegisters>>,
    completion: &'static (dyn ReceiveCompletion + Sync),
}

static E1000_NIC: Once<E1000Singleton> = Once::new();

/// Initializes the single e1000 instance from the given device.
///
/// The returned lock is shared with [`e1000_interrupt_handler()`],
/// which backs off rather than spinning if the lock is already held.
pub fn init_e1000_nic<D, T, I>(
    device: &mut D,
    translator: &T,
    interrupt_controller: &mut I,
    completion: &'static (dyn ReceiveCompletion + Sync),
) -> Result<&'static Mutex<E1000Nic<MmioRegisters>>, E1000Error>
    where D: E1000Device<Registers = MmioRegisters>,
          T: TranslateAddress + ?Sized,
          I: InterruptController + ?Sized,
{
    if E1000_NIC.is_completed() {
        return Err(E1000Error::AlreadyInitialized);
    }
    let nic = E1000Nic::init(device, translator, interrupt_controller)?;

    let mut newly_initialized = false;
    let singleton = E1000_NIC.call_once(|| {
        newly_initialized = true;
        E1000Singleton { nic: Mutex::new(nic), completion }
    });
    if newly_initialized {
        Ok(&singleton.nic)
    } else {
        Err(E1000Error::AlreadyInitialized)
    }
}

/// Returns a reference to the E1000Nic wrapped in a Mutex,
/// if it exists and has been initialized.
pub fn get_e1000_nic() -> Option<&'static Mutex<E1000Nic<MmioRegisters>>> {
    E1000_NIC.get().map(|singleton| &singleton.nic)
}

/// The e1000 interrupt entry point, to be called by the platform's interrupt dispatcher.
/// The dispatcher is responsible for acknowledging the interrupt at the controller.
pub fn e1000_interrupt_handler() {
    match E1000_NIC.get() {
        Some(singleton) => {
            let _ = try_handle_interrupt(&singleton.nic, singleton.completion);
        }
        None => error!("BUG: e1000_interrupt_handler(): E1000 NIC hasn't yet been initialized!"),
    }
}

/// Runs [`E1000Nic::handle_interrupt()`] unless `nic` is already locked,
/// returning the interrupt causes that were read.
///
/// If the lock is held, e.g., by a system call interrupted on this core,
/// spinning on it would never return. ICR is left unread in that case,
/// so its causes stay pending and the device raises the interrupt again.
fn try_handle_interrupt<A, W>(nic: &Mutex<E1000Nic<A>>, completion: &W) -> Option<u32>
    where A: RegisterAccess,
          W: ReceiveCompletion + ?Sized,
{
    match nic.try_lock() {
        Some(mut nic) => Some(nic.handle_interrupt(completion)),
        None => {
            debug!("e1000_interrupt_handler(): NIC is busy, leaving the interrupt pending");
            None
        }
    }
}
