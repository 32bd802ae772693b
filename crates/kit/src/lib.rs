//! Provision and tear down single libvirt/KVM virtual machines from
//! cloud images, configured on first boot through cloud-init.
//!
//! The binary is a thin wrapper over [`run::run`]; everything host-facing
//! goes through external tools described by [`tools::Toolchain`].

pub mod cloudinit;
pub mod cmdext;
pub mod config;
pub mod disk;
pub mod errors;
pub mod images;
pub mod lease;
pub mod libvirt;
pub mod run;
pub mod tools;
pub mod workspace;

pub(crate) mod utils;

#[cfg(test)]
mod testutil;
