pub mod lvm;
pub mod metadata;
pub mod plan;
pub mod validate;
