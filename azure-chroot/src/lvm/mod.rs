//! LVM discovery and activation.
//!
//! - `parse` - `pvs` / `lvs` report parsing and volume classification
//! - `naming` - device path to VG/LV resolution, override validation
//! - `select` - root volume selection policy
//! - `tools` - the only place system tools are invoked
//! - `discovery` - the retrying discovery/activation algorithm

pub mod discovery;
pub mod naming;
pub mod parse;
pub mod select;
pub mod tools;

pub use discovery::{LvmActivation, LvmDiscovery, DISCOVERY_ATTEMPTS, DISCOVERY_BACKOFF};
pub use naming::{resolve_vg_lv_heuristic, split_mapper_name_heuristic, validate_root_device_override};
pub use parse::{is_mountable_lv, LvInfo, LvKind};
pub use select::{select_root_lv, Selection, SelectionReason, ROOT_LV_NAMES};
pub use tools::LvmTools;
