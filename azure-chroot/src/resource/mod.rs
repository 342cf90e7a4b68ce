//! Resource identifiers and disksets.

mod diskset;
mod id;

pub use diskset::Diskset;
pub use id::{ResourceId, ResourceIdError};
