//! Step lists produced for each source and destination combination.

use azure_chroot::config::SharedImageDestination;
use azure_chroot::pipeline::{find_step, step_position, BuildStep};
use azure_chroot::steps::{
    AttachDisk, CreateDiskset, CreateImage, CreateSharedImageVersion, CreateSnapshotset,
    DisksetSource, EarlyCleanup, MountDevice, ResolvePlatformImageVersion, SetupLvm, SkipCapture,
    VerifySharedImageDestination, VerifySharedImageSource, VerifySourceDisk,
};
use azure_chroot::{BuildConfig, Builder, ResourceId};
use azure_chroot_test_utils::{test_vm, RecordingUi};

const IMAGE_ID: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/images/out";
const SOURCE_DISK: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/golden";

fn steps_for(config: BuildConfig) -> Vec<Box<dyn BuildStep>> {
    let mut builder = Builder::new(config);
    builder.prepare().expect("configuration should be valid");
    builder
        .steps(&test_vm(), &RecordingUi::new())
        .expect("step assembly should succeed")
}

fn names(steps: &[Box<dyn BuildStep>]) -> Vec<&'static str> {
    steps.iter().map(|s| s.name()).collect()
}

fn destination() -> SharedImageDestination {
    SharedImageDestination {
        resource_group: "rg".into(),
        gallery_name: "gallery".into(),
        image_name: "ubuntu".into(),
        image_version: "1.0.0".into(),
        ..Default::default()
    }
}

#[test]
fn platform_image_source_is_resolved_before_disk_creation() {
    let steps = steps_for(BuildConfig {
        source: "publisher:offer:sku:version".into(),
        image_resource_id: IMAGE_ID.into(),
        ..Default::default()
    });

    let resolve = step_position::<ResolvePlatformImageVersion>(&steps).unwrap();
    let create = step_position::<CreateDiskset>(&steps).unwrap();
    assert!(resolve < create);

    let step = find_step::<ResolvePlatformImageVersion>(&steps).unwrap();
    assert_eq!(step.image.publisher, "publisher");
    assert_eq!(step.image.version, "version");

    let diskset = find_step::<CreateDiskset>(&steps).unwrap();
    assert!(
        matches!(&diskset.source, DisksetSource::PlatformImage(image) if image.offer == "offer")
    );
    assert!(step_position::<VerifySourceDisk>(&steps).is_none());
}

#[test]
fn managed_disk_source_is_verified_before_disk_creation() {
    let steps = steps_for(BuildConfig {
        source: SOURCE_DISK.into(),
        image_resource_id: IMAGE_ID.into(),
        ..Default::default()
    });

    let verify = step_position::<VerifySourceDisk>(&steps).unwrap();
    let create = step_position::<CreateDiskset>(&steps).unwrap();
    assert!(verify < create);

    let expected: ResourceId = SOURCE_DISK.parse().unwrap();
    let diskset = find_step::<CreateDiskset>(&steps).unwrap();
    assert_eq!(diskset.source, DisksetSource::Disk(expected));
    assert!(step_position::<ResolvePlatformImageVersion>(&steps).is_none());
}

#[test]
fn from_scratch_creates_an_empty_disk() {
    let steps = steps_for(BuildConfig {
        from_scratch: true,
        os_disk_size_gb: 30,
        pre_mount_commands: vec!["parted {{.Device}} mklabel gpt".into()],
        image_resource_id: IMAGE_ID.into(),
        ..Default::default()
    });

    let diskset = find_step::<CreateDiskset>(&steps).unwrap();
    assert_eq!(diskset.source, DisksetSource::Empty);
    assert_eq!(diskset.os_disk_size_gb, Some(30));
    assert_eq!(step_position::<CreateDiskset>(&steps), Some(0));
}

#[test]
fn chroot_lifecycle_runs_in_fixed_order() {
    let steps = steps_for(BuildConfig {
        source: "Canonical:UbuntuServer:18.04-LTS:latest".into(),
        image_resource_id: IMAGE_ID.into(),
        ..Default::default()
    });

    assert_eq!(
        names(&steps),
        vec![
            "ResolvePlatformImageVersion",
            "CreateDiskset",
            "AttachDisk",
            "SetupLvm",
            "PreMountCommands",
            "MountDevice",
            "PostMountCommands",
            "MountExtra",
            "CopyFiles",
            "ChrootProvision",
            "PreUnmountCommands",
            "EarlyCleanup",
            "CreateImage",
        ]
    );
}

#[test]
fn skip_create_image_replaces_capture() {
    let steps = steps_for(BuildConfig {
        source: "Canonical:UbuntuServer:18.04-LTS:latest".into(),
        skip_create_image: true,
        ..Default::default()
    });

    assert_eq!(steps.last().map(|s| s.name()), Some("SkipCapture"));
    assert!(find_step::<SkipCapture>(&steps).is_some());
    assert!(step_position::<CreateImage>(&steps).is_none());
    assert!(step_position::<CreateSnapshotset>(&steps).is_none());
}

#[test]
fn gallery_destination_is_verified_first_and_published_last() {
    let steps = steps_for(BuildConfig {
        source: "Canonical:UbuntuServer:18.04-LTS:latest".into(),
        shared_image_destination: Some(destination()),
        ..Default::default()
    });

    assert_eq!(step_position::<VerifySharedImageDestination>(&steps), Some(0));
    let early = step_position::<EarlyCleanup>(&steps).unwrap();
    let snapshot = step_position::<CreateSnapshotset>(&steps).unwrap();
    let publish = step_position::<CreateSharedImageVersion>(&steps).unwrap();
    assert!(early < snapshot && snapshot < publish);
    assert_eq!(publish, steps.len() - 1);
    assert!(step_position::<CreateImage>(&steps).is_none());
}

#[test]
fn image_and_gallery_can_both_be_produced() {
    let steps = steps_for(BuildConfig {
        source: "Canonical:UbuntuServer:18.04-LTS:latest".into(),
        image_resource_id: IMAGE_ID.into(),
        shared_image_destination: Some(destination()),
        ..Default::default()
    });

    let image = step_position::<CreateImage>(&steps).unwrap();
    let snapshot = step_position::<CreateSnapshotset>(&steps).unwrap();
    assert!(image < snapshot);
}

#[test]
fn shared_image_source_is_verified() {
    let source =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/galleries/g/images/i/versions/1.2.3"
            .to_string();
    let steps = steps_for(BuildConfig {
        source: source.clone(),
        image_resource_id: IMAGE_ID.into(),
        ..Default::default()
    });

    let verify = step_position::<VerifySharedImageSource>(&steps).unwrap();
    let create = step_position::<CreateDiskset>(&steps).unwrap();
    assert!(verify < create);
    let diskset = find_step::<CreateDiskset>(&steps).unwrap();
    assert_eq!(
        diskset.source,
        DisksetSource::SharedImageVersion(source.parse().unwrap())
    );
}

#[test]
fn lvm_override_and_mount_settings_reach_their_steps() {
    let steps = steps_for(BuildConfig {
        source: "Canonical:UbuntuServer:18.04-LTS:latest".into(),
        image_resource_id: IMAGE_ID.into(),
        lvm_root_device: "/dev/mapper/rootvg-rootlv".into(),
        mount_partition: "2".into(),
        device_link_dir: "/tmp/links".into(),
        ..Default::default()
    });

    let lvm = find_step::<SetupLvm>(&steps).unwrap();
    assert_eq!(
        lvm.root_device_override.as_deref(),
        Some("/dev/mapper/rootvg-rootlv")
    );
    let mount = find_step::<MountDevice>(&steps).unwrap();
    assert_eq!(mount.mount_partition, "2");
    let attach = find_step::<AttachDisk>(&steps).unwrap();
    assert_eq!(attach.device_link_dir, std::path::Path::new("/tmp/links"));
}
