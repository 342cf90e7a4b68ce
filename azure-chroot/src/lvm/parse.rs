//! Parsers for `pvs` / `lvs` report output.
//!
//! Both tools are invoked with `--noheadings --separator '|'` so every line
//! is a `|`-separated record with optional leading whitespace.

use serde::Serialize;

/// Field separator passed to `pvs` and `lvs`.
pub const REPORT_SEPARATOR: &str = "|";

/// One `pvs` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvInfo {
    pub pv_name: String,
    /// Empty for an orphan physical volume.
    pub vg_name: String,
}

/// One logical volume as reported by `lvs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LvInfo {
    pub name: String,
    pub vg_name: String,
    pub path: String,
    /// Raw `lv_attr` string, e.g. `-wi-a-----`.
    pub attr: String,
}

impl LvInfo {
    pub fn kind(&self) -> LvKind {
        LvKind::from_attr(&self.attr)
    }
}

/// Volume type encoded in the first character of `lv_attr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvKind {
    Snapshot,
    Virtual,
    ThinPool,
    /// RAID or pool metadata (and metadata spares).
    Metadata,
    /// VDO pool and pool data sub-volumes.
    Internal,
    MirrorLog,
    /// Mirror or RAID image.
    MirrorImage,
    Pvmove,
    Normal,
}

impl LvKind {
    pub fn from_attr(attr: &str) -> Self {
        match attr.chars().next() {
            Some('s' | 'S') => LvKind::Snapshot,
            Some('v') => LvKind::Virtual,
            Some('t' | 'T') => LvKind::ThinPool,
            Some('e') => LvKind::Metadata,
            Some('d' | 'D') => LvKind::Internal,
            Some('l') => LvKind::MirrorLog,
            Some('i' | 'I') => LvKind::MirrorImage,
            Some('p') => LvKind::Pvmove,
            _ => LvKind::Normal,
        }
    }
}

/// Whether a volume with this attribute string can hold a mountable filesystem.
pub fn is_mountable_lv(attr: &str) -> bool {
    LvKind::from_attr(attr) == LvKind::Normal
}

fn fields(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(line.split(REPORT_SEPARATOR).map(str::trim).collect())
}

/// Parse `pvs -o pv_name,vg_name` output.
pub fn parse_pvs(output: &str) -> Vec<PvInfo> {
    output
        .lines()
        .filter_map(fields)
        .filter(|f| !f[0].is_empty())
        .map(|f| PvInfo {
            pv_name: f[0].to_string(),
            vg_name: f.get(1).copied().unwrap_or_default().to_string(),
        })
        .collect()
}

/// Distinct volume groups whose physical volumes live on `device`, in report order.
pub fn volume_groups_on_device(pvs: &[PvInfo], device: &str) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for pv in pvs {
        if pv.vg_name.is_empty() || !pv.pv_name.starts_with(device) {
            continue;
        }
        if !groups.contains(&pv.vg_name) {
            groups.push(pv.vg_name.clone());
        }
    }
    groups
}

/// Parse `lvs -o lv_name,vg_name,lv_path,lv_attr` output.
///
/// Inactive volumes report an empty `lv_path`; the conventional
/// `/dev/<vg>/<lv>` path is filled in for them.
pub fn parse_lvs(output: &str) -> Vec<LvInfo> {
    output
        .lines()
        .filter_map(fields)
        .filter(|f| f.len() >= 2 && !f[0].is_empty() && !f[1].is_empty())
        .map(|f| {
            let name = f[0].to_string();
            let vg_name = f[1].to_string();
            let path = match f.get(2) {
                Some(p) if !p.is_empty() => p.to_string(),
                _ => format!("/dev/{}/{}", vg_name, name),
            };
            LvInfo {
                name,
                vg_name,
                path,
                attr: f.get(3).copied().unwrap_or_default().to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_mountable_attribute_prefixes() {
        for attr in ["s", "S", "v", "t", "T", "e", "i", "I", "l", "d", "D", "p"] {
            assert!(!is_mountable_lv(&format!("{attr}wi-a-----")), "{attr}");
        }
    }

    #[test]
    fn mountable_attribute_prefixes() {
        for attr in ["-wi-ao----", "Vwi-a-tz--", "owi-a-s---", "rwi-a-r---", "mwi-a-m---", "C", ""] {
            assert!(is_mountable_lv(attr), "{attr:?}");
        }
    }

    #[test]
    fn classifies_kinds() {
        assert_eq!(LvKind::from_attr("twi-aotz--"), LvKind::ThinPool);
        assert_eq!(LvKind::from_attr("ewi-------"), LvKind::Metadata);
        assert_eq!(LvKind::from_attr("iwi-aor---"), LvKind::MirrorImage);
        assert_eq!(LvKind::from_attr("lwi-aom---"), LvKind::MirrorLog);
        assert_eq!(LvKind::from_attr("pwi-a-----"), LvKind::Pvmove);
        assert_eq!(LvKind::from_attr("-wi-ao----"), LvKind::Normal);
    }

    #[test]
    fn parses_pvs_and_filters_by_device() {
        let out = "  /dev/sdc2|rootvg\n  /dev/sdc3|rootvg\n  /dev/sdd1|datavg\n  /dev/sdc4|\n\n  /dev/sdc5|homevg\n";
        let pvs = parse_pvs(out);
        assert_eq!(pvs.len(), 5);
        assert_eq!(
            volume_groups_on_device(&pvs, "/dev/sdc"),
            vec!["rootvg".to_string(), "homevg".to_string()]
        );
        assert!(volume_groups_on_device(&pvs, "/dev/sde").is_empty());
    }

    #[test]
    fn parses_lvs_and_fills_missing_path() {
        let out = "  rootlv|rootvg|/dev/rootvg/rootlv|-wi-a-----\n  swaplv|rootvg||-wi-------\n";
        let lvs = parse_lvs(out);
        assert_eq!(lvs.len(), 2);
        assert_eq!(lvs[0].path, "/dev/rootvg/rootlv");
        assert_eq!(lvs[1].path, "/dev/rootvg/swaplv");
        assert_eq!(lvs[1].kind(), LvKind::Normal);
    }

    #[test]
    fn ignores_garbage_lines() {
        assert!(parse_lvs("  \n|\n onlyname\n").is_empty());
        assert!(parse_pvs("\n   \n").is_empty());
    }
}
