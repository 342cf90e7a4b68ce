//! LUN-indexed sets of disks or snapshots.

use super::ResourceId;
use azure_chroot_shared::constants::azure::OS_DISK_LUN;
use std::collections::BTreeMap;

/// Map from LUN to resource id. LUN `-1` is the OS disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diskset(BTreeMap<i32, ResourceId>);

impl Diskset {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Diskset holding only an OS disk.
    pub fn with_os_disk(id: ResourceId) -> Self {
        let mut set = Self::new();
        set.insert(OS_DISK_LUN, id);
        set
    }

    /// Insert or replace the entry for `lun`, returning the previous id.
    pub fn insert(&mut self, lun: i32, id: ResourceId) -> Option<ResourceId> {
        self.0.insert(lun, id)
    }

    pub fn get(&self, lun: i32) -> Option<&ResourceId> {
        self.0.get(&lun)
    }

    pub fn os_disk(&self) -> Option<&ResourceId> {
        self.get(OS_DISK_LUN)
    }

    /// Data disks in ascending LUN order.
    pub fn data_disks(&self) -> impl Iterator<Item = (i32, &ResourceId)> {
        self.0
            .iter()
            .filter(|(lun, _)| **lun != OS_DISK_LUN)
            .map(|(lun, id)| (*lun, id))
    }

    pub fn has_data_disks(&self) -> bool {
        self.data_disks().next().is_some()
    }

    /// Every entry, OS disk first.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &ResourceId)> {
        self.0.iter().map(|(lun, id)| (*lun, id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(name: &str) -> ResourceId {
        ResourceId::compute("s", "rg", "disks", name)
    }

    #[test]
    fn os_only_set_has_no_data_disks() {
        let set = Diskset::with_os_disk(disk("os"));
        assert_eq!(set.os_disk(), Some(&disk("os")));
        assert!(!set.has_data_disks());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn data_disks_are_lun_ordered() {
        let mut set = Diskset::new();
        set.insert(3, disk("d3"));
        set.insert(OS_DISK_LUN, disk("os"));
        set.insert(0, disk("d0"));
        let luns: Vec<i32> = set.data_disks().map(|(lun, _)| lun).collect();
        assert_eq!(luns, vec![0, 3]);
        assert_eq!(set.iter().next().map(|(lun, _)| lun), Some(OS_DISK_LUN));
    }

    #[test]
    fn insert_replaces_existing_lun() {
        let mut set = Diskset::new();
        assert!(set.insert(1, disk("a")).is_none());
        assert_eq!(set.insert(1, disk("b")), Some(disk("a")));
        assert_eq!(set.len(), 1);
    }
}
