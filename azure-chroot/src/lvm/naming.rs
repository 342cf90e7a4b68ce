//! Device path to volume group / logical volume resolution.
//!
//! Two path shapes name a logical volume:
//! - `/dev/mapper/<vg>-<lv>`, where literal dashes inside either name are
//!   doubled and a single dash separates the two.
//! - `/dev/<vg>/<lv>`.

const MAPPER_PREFIX: &str = "/dev/mapper/";

/// Undo device-mapper dash doubling.
fn unescape(part: &str) -> String {
    part.replace("--", "-")
}

/// Split a device-mapper name into `(vg, lv)` without asking `dmsetup`.
///
/// Dashes are consumed left to right: a doubled dash is an escaped literal,
/// a single dash is a separator. The right-most separator wins. Returns
/// `None` when no separator exists or either side would be empty.
pub fn split_mapper_name_heuristic(name: &str) -> Option<(String, String)> {
    let bytes = name.as_bytes();
    let mut separator = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'-' {
            if bytes.get(i + 1) == Some(&b'-') {
                i += 2;
                continue;
            }
            separator = Some(i);
        }
        i += 1;
    }

    let idx = separator?;
    let (vg, lv) = (&name[..idx], &name[idx + 1..]);
    if vg.is_empty() || lv.is_empty() {
        return None;
    }
    Some((unescape(vg), unescape(lv)))
}

/// Name under `/dev/mapper/`, if `path` has that shape.
pub fn mapper_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix(MAPPER_PREFIX)?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name)
}

/// Resolve `(vg, lv)` from a device path using naming conventions only.
///
/// Anything that is neither a mapper path nor `/dev/<vg>/<lv>` (for example
/// a raw `/dev/sdc1` partition) yields `None`.
pub fn resolve_vg_lv_heuristic(path: &str) -> Option<(String, String)> {
    if path.starts_with(MAPPER_PREFIX) {
        return mapper_name(path).and_then(split_mapper_name_heuristic);
    }

    if !path.starts_with("/dev/") {
        return None;
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 4 {
        return None;
    }
    let vg = segments[segments.len() - 2];
    let lv = segments[segments.len() - 1];
    if vg.is_empty() || lv.is_empty() {
        return None;
    }
    Some((vg.to_string(), lv.to_string()))
}

/// Validate a user-supplied LVM root device path.
///
/// The path must be absolute under `/dev/`, contain no `..` component and no
/// control characters. Dots inside a file name (`/dev/mapper/a..b`) are fine.
pub fn validate_root_device_override(path: &str) -> Result<(), String> {
    if path.chars().any(char::is_control) {
        return Err(format!(
            "lvm_root_device {:?} must not contain control characters",
            path
        ));
    }
    if !path.starts_with("/dev/") || path.len() == "/dev/".len() {
        return Err(format!(
            "lvm_root_device '{}' must be an absolute path under /dev/",
            path
        ));
    }
    if path.split('/').any(|component| component == "..") {
        return Err(format!(
            "lvm_root_device '{}' must not contain '..' path components",
            path
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pair(vg: &str, lv: &str) -> Option<(String, String)> {
        Some((vg.to_string(), lv.to_string()))
    }

    #[test]
    fn splits_simple_mapper_names() {
        assert_eq!(split_mapper_name_heuristic("rhel-root"), pair("rhel", "root"));
        assert_eq!(
            split_mapper_name_heuristic("my--vg-my--lv"),
            pair("my-vg", "my-lv")
        );
        assert_eq!(
            split_mapper_name_heuristic("rootvg-usr--local"),
            pair("rootvg", "usr-local")
        );
    }

    #[test]
    fn rejects_names_without_separator() {
        assert_eq!(split_mapper_name_heuristic("nodash"), None);
        assert_eq!(split_mapper_name_heuristic("only--escaped"), None);
        assert_eq!(split_mapper_name_heuristic("-lv"), None);
        assert_eq!(split_mapper_name_heuristic("vg-"), None);
        assert_eq!(split_mapper_name_heuristic(""), None);
    }

    #[test]
    fn resolves_both_path_shapes() {
        assert_eq!(
            resolve_vg_lv_heuristic("/dev/mapper/rhel-root"),
            pair("rhel", "root")
        );
        assert_eq!(
            resolve_vg_lv_heuristic("/dev/rootvg/rootlv"),
            pair("rootvg", "rootlv")
        );
    }

    #[test]
    fn other_paths_resolve_to_nothing() {
        for path in ["/dev/sda1", "/dev/foo", "", "/", "/dev/", "/dev/mapper/", "/dev/mapper/x/y", "/tmp/vg/lv", "/dev//lv"] {
            assert_eq!(resolve_vg_lv_heuristic(path), None, "{path:?}");
        }
    }

    #[test]
    fn override_validation() {
        assert!(validate_root_device_override("/dev/mapper/rootvg-rootlv").is_ok());
        assert!(validate_root_device_override("/dev/rootvg/rootlv").is_ok());
        assert!(validate_root_device_override("/dev/mapper/a..b").is_ok());

        assert!(validate_root_device_override("/dev/mapper/../../etc/passwd").is_err());
        assert!(validate_root_device_override("/dev/../etc/shadow").is_err());
        assert!(validate_root_device_override("dev/sda1").is_err());
        assert!(validate_root_device_override("/etc/passwd").is_err());
        assert!(validate_root_device_override("/dev/").is_err());
        assert!(validate_root_device_override("/dev/sda1\n").is_err());
        assert!(validate_root_device_override("/dev/sda\r1").is_err());
        assert!(validate_root_device_override("/dev/sd\x07a").is_err());
    }

    fn encode(name: &str) -> String {
        name.replace('-', "--")
    }

    proptest! {
        #[test]
        fn mapper_names_round_trip(
            vg in "[a-zA-Z0-9_.+][a-zA-Z0-9_.+-]{0,12}",
            lv in "[a-zA-Z0-9_.+][a-zA-Z0-9_.+-]{0,12}",
        ) {
            let mapper = format!("/dev/mapper/{}-{}", encode(&vg), encode(&lv));
            prop_assert_eq!(resolve_vg_lv_heuristic(&mapper), Some((vg, lv)));
        }
    }
}
