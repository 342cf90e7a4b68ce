//! Root logical volume selection policy.

use super::parse::LvInfo;

/// Names that unambiguously identify a root volume (compared case-insensitively).
pub const ROOT_LV_NAMES: &[&str] = &["root", "lv_root", "rootlv", "lvroot"];

/// Why a candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    OnlyCandidate,
    ExactName,
    NameContainsRoot,
    /// No naming signal; first candidate in enumeration order.
    FirstCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub lv: &'a LvInfo,
    pub reason: SelectionReason,
}

impl Selection<'_> {
    /// The choice was a guess the operator should confirm.
    pub fn is_ambiguous(&self) -> bool {
        self.reason == SelectionReason::FirstCandidate
    }
}

/// Pick the logical volume to mount as `/`.
///
/// Exact name matches outrank substring matches, which outrank input order.
pub fn select_root_lv(candidates: &[LvInfo]) -> Option<Selection<'_>> {
    match candidates {
        [] => None,
        [only] => Some(Selection {
            lv: only,
            reason: SelectionReason::OnlyCandidate,
        }),
        _ => {
            if let Some(lv) = candidates.iter().find(|lv| {
                ROOT_LV_NAMES
                    .iter()
                    .any(|name| lv.name.eq_ignore_ascii_case(name))
            }) {
                return Some(Selection {
                    lv,
                    reason: SelectionReason::ExactName,
                });
            }

            if let Some(lv) = candidates
                .iter()
                .find(|lv| lv.name.to_ascii_lowercase().contains("root"))
            {
                return Some(Selection {
                    lv,
                    reason: SelectionReason::NameContainsRoot,
                });
            }

            Some(Selection {
                lv: &candidates[0],
                reason: SelectionReason::FirstCandidate,
            })
        }
    }
}
