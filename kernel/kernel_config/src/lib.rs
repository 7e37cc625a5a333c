//! Compile-time configuration for the NIC driver crates.
//!
//! Everything in here is a constant, so changing a value means rebuilding
//! the crates that depend on it. Nothing is resized at runtime.

#![no_std]

extern crate cfg_if;

pub mod network;

cfg_if::cfg_if!{

if #[cfg(any(target_arch="x86_64", target_arch="aarch64"))] {
    pub mod memory;
} else {
    compile_error!("kernel_config: unsupported target architecture");
}

}
