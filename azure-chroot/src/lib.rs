//! Azure chroot image builder.
//!
//! Builds Azure managed images and shared image versions without booting a
//! second VM: a disk is attached to the VM the build runs on, its root
//! filesystem (plain or LVM) is mounted into a chroot, provisioned, then
//! detached and captured.
//!
//! - `resource` - resource ids and disksets
//! - `lvm` - LVM discovery and activation
//! - `azure` - control-plane interfaces, metadata, disk attachment
//! - `config` - build configuration and validation
//! - `pipeline` - build state, ordered cleanup, step runner
//! - `steps` - the individual build steps and step list assembly
//! - `builder` - the façade tying it together

pub mod azure;
pub mod builder;
pub mod config;
pub mod lvm;
pub mod pipeline;
pub mod resource;
pub mod steps;
pub mod util;

pub use azure_chroot_shared::{ChrootError, ChrootResult};
pub use builder::{Artifact, Builder};
pub use config::BuildConfig;
pub use pipeline::{BuildState, BuildStep, Services, StepRunner};
pub use resource::{Diskset, ResourceId};
