//! Descriptor definitions shared by Intel ethernet drivers.
//!
//! Only the legacy descriptor format of the 8254x family is supported.

#![no_std]

#[macro_use] extern crate log;
#[macro_use] extern crate static_assertions;

pub mod descriptors;
mod ring;
#[cfg(test)]
mod test;

pub use ring::DescriptorRing;
