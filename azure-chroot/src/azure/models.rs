//! Request and response models for the compute control plane.
//!
//! These carry only the fields the builder reads or writes; an API client
//! maps them onto the full ARM payloads.

use crate::resource::ResourceId;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsType {
    Linux,
    Windows,
}

/// Host caching mode for disks and image disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachingType {
    None,
    ReadOnly,
    ReadWrite,
}

impl FromStr for CachingType {
    type Err = ChrootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(CachingType::None),
            "ReadOnly" => Ok(CachingType::ReadOnly),
            "ReadWrite" => Ok(CachingType::ReadWrite),
            _ => Err(ChrootError::Config(format!(
                "unknown cache type '{}'; expected one of None, ReadOnly, ReadWrite",
                s
            ))),
        }
    }
}

/// Managed disk SKU names accepted by Azure.
pub const STORAGE_ACCOUNT_TYPES: &[&str] = &[
    "Standard_LRS",
    "Premium_LRS",
    "StandardSSD_LRS",
    "UltraSSD_LRS",
    "Premium_ZRS",
    "StandardSSD_ZRS",
    "PremiumV2_LRS",
];

pub const HYPERV_GENERATIONS: &[&str] = &["V1", "V2"];

/// Platform image reference `publisher:offer:sku:version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformImage {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl PlatformImage {
    pub fn is_latest(&self) -> bool {
        self.version.eq_ignore_ascii_case("latest")
    }

    /// Subscription-scoped id of a resolved platform image version.
    pub fn version_resource_id(&self, subscription: &str, location: &str) -> String {
        format!(
            "/Subscriptions/{}/Providers/Microsoft.Compute/Locations/{}/Publishers/{}/ArtifactTypes/VMImage/Offers/{}/Skus/{}/Versions/{}",
            subscription, location, self.publisher, self.offer, self.sku, self.version
        )
    }
}

impl FromStr for PlatformImage {
    type Err = ChrootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(ChrootError::Config(format!(
                "'{}' is not a platform image URN (publisher:offer:sku:version)",
                s
            )));
        }
        Ok(Self {
            publisher: parts[0].to_string(),
            offer: parts[1].to_string(),
            sku: parts[2].to_string(),
            version: parts[3].to_string(),
        })
    }
}

impl fmt::Display for PlatformImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.publisher, self.offer, self.sku, self.version
        )
    }
}

/// Order image versions the way Azure does: dotted numeric components.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<Option<u64>> { v.split('.').map(|p| p.parse().ok()).collect() };
    let (pa, pb) = (parse(a), parse(b));
    for (x, y) in pa.iter().zip(pb.iter()) {
        let ord = match (x, y) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    pa.len().cmp(&pb.len()).then_with(|| a.cmp(b))
}

/// A resolved platform image version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformImageVersion {
    pub id: String,
    pub hyper_v_generation: Option<String>,
}

/// How a new managed disk gets its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskCreation {
    Empty,
    Copy { source: ResourceId },
    FromPlatformImage { image_version_id: String },
    FromGalleryImage { version_id: ResourceId, lun: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub location: String,
    pub sku: String,
    pub size_gb: Option<i32>,
    pub hyper_v_generation: Option<String>,
    pub os_type: Option<OsType>,
    pub creation: DiskCreation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub id: ResourceId,
    pub location: String,
    pub size_gb: Option<i32>,
    pub hyper_v_generation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSpec {
    pub location: String,
    pub source: ResourceId,
    pub incremental: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDisk {
    pub managed_disk: ResourceId,
    pub caching: CachingType,
    pub storage_account_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub location: String,
    pub hyper_v_generation: String,
    pub os_disk: ImageDisk,
    /// (lun, disk), ascending LUN.
    pub data_disks: Vec<(i32, ImageDisk)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub id: ResourceId,
    pub location: String,
    pub os_type: OsType,
    pub hyper_v_generation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImageVersion {
    pub id: ResourceId,
    pub location: String,
    /// LUNs of the data disk images, in image order.
    pub data_disk_luns: Vec<i32>,
    /// Regions the version is replicated to.
    pub target_regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegion {
    pub name: String,
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub storage_account_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImageVersionSpec {
    pub location: String,
    pub os_snapshot: ResourceId,
    pub os_caching: CachingType,
    /// (lun, snapshot), ascending LUN.
    pub data_snapshots: Vec<(i32, ResourceId)>,
    pub data_caching: CachingType,
    pub target_regions: Vec<TargetRegion>,
    pub replica_count: Option<i32>,
    pub exclude_from_latest: bool,
    pub end_of_life_date: Option<String>,
}

/// A data disk attached to a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDisk {
    pub lun: i32,
    pub managed_disk: ResourceId,
    pub caching: CachingType,
}

/// Normalise a location for comparison (`West US 2` == `westus2`).
pub fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Parse a `V1`/`V2` generation string.
pub fn parse_hyperv_generation(value: &str) -> ChrootResult<String> {
    HYPERV_GENERATIONS
        .iter()
        .find(|g| g.eq_ignore_ascii_case(value))
        .map(|g| g.to_string())
        .ok_or_else(|| {
            ChrootError::Config(format!(
                "unknown HyperV generation '{}'; expected V1 or V2",
                value
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_platform_urn() {
        let pi: PlatformImage = "Canonical:UbuntuServer:18.04-LTS:latest".parse().unwrap();
        assert_eq!(pi.publisher, "Canonical");
        assert_eq!(pi.sku, "18.04-LTS");
        assert!(pi.is_latest());
        assert_eq!(pi.to_string(), "Canonical:UbuntuServer:18.04-LTS:latest");
    }

    #[test]
    fn rejects_bad_urns() {
        assert!("a:b:c".parse::<PlatformImage>().is_err());
        assert!("a:b::d".parse::<PlatformImage>().is_err());
        assert!("/subscriptions/x".parse::<PlatformImage>().is_err());
    }

    #[test]
    fn version_ordering_is_numeric() {
        assert_eq!(compare_versions("18.04.202001010", "18.04.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "2.0.0"), Ordering::Equal);
    }

    #[test]
    fn normalizes_locations() {
        assert_eq!(normalize_location("West US 2"), "westus2");
        assert_eq!(normalize_location("westus2"), "westus2");
    }

    #[test]
    fn hyperv_generation_is_case_insensitive() {
        assert_eq!(parse_hyperv_generation("v2").unwrap(), "V2");
        assert!(parse_hyperv_generation("V3").is_err());
    }
}
