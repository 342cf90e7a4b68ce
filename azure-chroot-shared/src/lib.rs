//! azure-chroot shared code
//!
//! Error taxonomy and constants used by the builder library and its
//! command-line front end.

pub mod constants;
pub mod errors;

pub use errors::{ChrootError, ChrootResult};
