use crate::Journal;
use async_trait::async_trait;
use azure_chroot::azure::{
    ComputeApi, DataDisk, Disk, DiskSpec, GalleryImage, GalleryImageVersion,
    GalleryImageVersionSpec, ImageSpec, PlatformImage, PlatformImageVersion, SnapshotSpec,
};
use azure_chroot::resource::ResourceId;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    disks: BTreeMap<String, Disk>,
    snapshots: BTreeMap<String, SnapshotSpec>,
    images: BTreeMap<String, ImageSpec>,
    gallery_images: BTreeMap<String, GalleryImage>,
    gallery_versions: BTreeMap<String, GalleryImageVersion>,
    version_specs: BTreeMap<String, GalleryImageVersionSpec>,
    platform_versions: Vec<String>,
    platform_hyperv: Option<String>,
    vms: HashMap<String, Vec<DataDisk>>,
    failures: HashMap<&'static str, ChrootError>,
    delayed_failures: HashMap<&'static str, (usize, ChrootError)>,
    ops: Vec<String>,
}

fn key(id: &ResourceId) -> String {
    id.to_string().to_ascii_lowercase()
}

fn not_found(id: &ResourceId) -> ChrootError {
    ChrootError::Cloud(format!("ResourceNotFound: {}", id))
}

/// In-memory [`ComputeApi`].
///
/// Long-running operations complete immediately. VMs must be registered
/// with [`FakeCompute::with_vm`]; unknown VM ids fail like ARM's 404.
#[derive(Default)]
pub struct FakeCompute {
    inner: Mutex<Inner>,
    journal: Option<Journal>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_vm(self, vm: &ResourceId) -> Self {
        self.inner.lock().vms.insert(key(vm), Vec::new());
        self
    }

    pub fn with_disk(self, disk: Disk) -> Self {
        self.inner.lock().disks.insert(key(&disk.id), disk);
        self
    }

    pub fn with_gallery_image(self, image: GalleryImage) -> Self {
        self.inner.lock().gallery_images.insert(key(&image.id), image);
        self
    }

    pub fn with_gallery_version(self, version: GalleryImageVersion) -> Self {
        self.inner
            .lock()
            .gallery_versions
            .insert(key(&version.id), version);
        self
    }

    pub fn with_platform_versions(self, versions: &[&str], hyperv: Option<&str>) -> Self {
        {
            let mut inner = self.inner.lock();
            inner.platform_versions = versions.iter().map(|v| v.to_string()).collect();
            inner.platform_hyperv = hyperv.map(str::to_string);
        }
        self
    }

    /// Make every call to `op` fail with `error` until [`FakeCompute::heal`].
    pub fn fail_on(&self, op: &'static str, error: ChrootError) {
        self.inner.lock().failures.insert(op, error);
    }

    /// Let `successes` calls to `op` through, then fail every later one.
    pub fn fail_after(&self, op: &'static str, successes: usize, error: ChrootError) {
        self.inner
            .lock()
            .delayed_failures
            .insert(op, (successes, error));
    }

    pub fn heal(&self, op: &'static str) {
        let mut inner = self.inner.lock();
        inner.failures.remove(op);
        inner.delayed_failures.remove(op);
    }

    /// Operations in call order, as `"<op> <id>"`.
    pub fn ops(&self) -> Vec<String> {
        self.inner.lock().ops.clone()
    }

    pub fn disk_exists(&self, id: &ResourceId) -> bool {
        self.inner.lock().disks.contains_key(&key(id))
    }

    pub fn disk_count(&self) -> usize {
        self.inner.lock().disks.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.lock().snapshots.len()
    }

    pub fn image(&self, id: &ResourceId) -> Option<ImageSpec> {
        self.inner.lock().images.get(&key(id)).cloned()
    }

    pub fn version_spec(&self, id: &ResourceId) -> Option<GalleryImageVersionSpec> {
        self.inner.lock().version_specs.get(&key(id)).cloned()
    }

    pub fn vm_data_disks(&self, vm: &ResourceId) -> Vec<DataDisk> {
        self.inner.lock().vms.get(&key(vm)).cloned().unwrap_or_default()
    }

    /// Record the call and apply injected failures.
    fn enter(&self, inner: &mut Inner, op: &'static str, subject: &str) -> ChrootResult<()> {
        let entry = format!("{} {}", op, subject);
        inner.ops.push(entry.clone());
        if let Some(journal) = &self.journal {
            journal.push(format!("compute: {}", entry));
        }
        if let Some((remaining, e)) = inner.delayed_failures.get_mut(op) {
            if *remaining == 0 {
                return Err(e.clone());
            }
            *remaining -= 1;
        }
        match inner.failures.get(op) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn get_disk(&self, id: &ResourceId) -> ChrootResult<Disk> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "get_disk", &id.to_string())?;
        inner.disks.get(&key(id)).cloned().ok_or_else(|| not_found(id))
    }

    async fn create_disk(&self, id: &ResourceId, spec: &DiskSpec) -> ChrootResult<Disk> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "create_disk", &id.to_string())?;
        let disk = Disk {
            id: id.clone(),
            location: spec.location.clone(),
            size_gb: spec.size_gb,
            hyper_v_generation: spec.hyper_v_generation.clone(),
        };
        inner.disks.insert(key(id), disk.clone());
        Ok(disk)
    }

    async fn delete_disk(&self, id: &ResourceId) -> ChrootResult<()> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "delete_disk", &id.to_string())?;
        inner.disks.remove(&key(id));
        Ok(())
    }

    async fn create_snapshot(&self, id: &ResourceId, spec: &SnapshotSpec) -> ChrootResult<()> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "create_snapshot", &id.to_string())?;
        inner.snapshots.insert(key(id), spec.clone());
        Ok(())
    }

    async fn delete_snapshot(&self, id: &ResourceId) -> ChrootResult<()> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "delete_snapshot", &id.to_string())?;
        inner.snapshots.remove(&key(id));
        Ok(())
    }

    async fn create_image(&self, id: &ResourceId, spec: &ImageSpec) -> ChrootResult<()> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "create_image", &id.to_string())?;
        inner.images.insert(key(id), spec.clone());
        Ok(())
    }

    async fn get_gallery_image(&self, id: &ResourceId) -> ChrootResult<GalleryImage> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "get_gallery_image", &id.to_string())?;
        inner
            .gallery_images
            .get(&key(id))
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn get_gallery_image_version(&self, id: &ResourceId) -> ChrootResult<GalleryImageVersion> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "get_gallery_image_version", &id.to_string())?;
        inner
            .gallery_versions
            .get(&key(id))
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list_gallery_image_versions(
        &self,
        image: &ResourceId,
    ) -> ChrootResult<Vec<GalleryImageVersion>> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "list_gallery_image_versions", &image.to_string())?;
        Ok(inner
            .gallery_versions
            .values()
            .filter(|v| v.id.parent().is_some_and(|p| p.eq_ignore_case(image)))
            .cloned()
            .collect())
    }

    async fn create_gallery_image_version(
        &self,
        id: &ResourceId,
        spec: &GalleryImageVersionSpec,
    ) -> ChrootResult<GalleryImageVersion> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "create_gallery_image_version", &id.to_string())?;
        let version = GalleryImageVersion {
            id: id.clone(),
            location: spec.location.clone(),
            data_disk_luns: spec.data_snapshots.iter().map(|(lun, _)| *lun).collect(),
            target_regions: spec.target_regions.iter().map(|r| r.name.clone()).collect(),
        };
        inner.gallery_versions.insert(key(id), version.clone());
        inner.version_specs.insert(key(id), spec.clone());
        Ok(version)
    }

    async fn list_platform_image_versions(
        &self,
        location: &str,
        image: &PlatformImage,
    ) -> ChrootResult<Vec<String>> {
        let mut inner = self.inner.lock();
        self.enter(
            &mut inner,
            "list_platform_image_versions",
            &format!("{} {}", location, image),
        )?;
        Ok(inner.platform_versions.clone())
    }

    async fn get_platform_image_version(
        &self,
        location: &str,
        image: &PlatformImage,
    ) -> ChrootResult<PlatformImageVersion> {
        let mut inner = self.inner.lock();
        self.enter(
            &mut inner,
            "get_platform_image_version",
            &format!("{} {}", location, image),
        )?;
        if !inner.platform_versions.iter().any(|v| *v == image.version) {
            return Err(ChrootError::Cloud(format!(
                "platform image version {} not found",
                image
            )));
        }
        Ok(PlatformImageVersion {
            id: image.version_resource_id("sub", location),
            hyper_v_generation: inner.platform_hyperv.clone(),
        })
    }

    async fn get_vm_data_disks(&self, vm: &ResourceId) -> ChrootResult<Vec<DataDisk>> {
        let mut inner = self.inner.lock();
        self.enter(&mut inner, "get_vm_data_disks", &vm.to_string())?;
        inner.vms.get(&key(vm)).cloned().ok_or_else(|| not_found(vm))
    }

    async fn set_vm_data_disks(&self, vm: &ResourceId, disks: Vec<DataDisk>) -> ChrootResult<()> {
        let mut inner = self.inner.lock();
        let luns: Vec<i32> = disks.iter().map(|d| d.lun).collect();
        self.enter(&mut inner, "set_vm_data_disks", &format!("{} {:?}", vm, luns))?;
        let slot = inner.vms.get_mut(&key(vm)).ok_or_else(|| not_found(vm))?;
        *slot = disks;
        Ok(())
    }
}
