//! Shared constants
//!
//! Host tool names, default paths and naming conventions used by both the
//! library and the command-line front end.

/// System tools shelled out to by the builder.
pub mod tools {
    pub const PARTPROBE: &str = "partprobe";
    pub const UDEVADM: &str = "udevadm";
    pub const PVSCAN: &str = "pvscan";
    pub const VGSCAN: &str = "vgscan";
    pub const VGCHANGE: &str = "vgchange";
    pub const PVS: &str = "pvs";
    pub const LVS: &str = "lvs";
    pub const BLKID: &str = "blkid";
    pub const DMSETUP: &str = "dmsetup";
    pub const LVCHANGE: &str = "lvchange";
    pub const MOUNT: &str = "mount";
    pub const UMOUNT: &str = "umount";
    pub const CHROOT: &str = "chroot";
    pub const SHELL: &str = "/bin/sh";
}

/// Azure naming and topology conventions.
pub mod azure {
    /// LUN reserved for the OS disk inside a diskset.
    pub const OS_DISK_LUN: i32 = -1;

    /// Data disk slots scanned when looking for a free LUN.
    pub const MAX_DATA_DISK_LUNS: i32 = 64;

    /// Directory where the Azure udev rules publish `lun<N>` links for attached data disks.
    pub const DEVICE_LINK_DIR: &str = "/dev/disk/azure/scsi1";

    /// Prefix used for temporary disks and snapshots.
    pub const TEMP_NAME_PREFIX: &str = "PackerTemp";
}

/// Defaults applied to an empty build configuration.
pub mod defaults {
    pub const MOUNT_PATH: &str = "/mnt/packer-azure-chroot-disks/{{.Device}}";
    pub const MOUNT_PARTITION: &str = "1";
    pub const COMMAND_WRAPPER: &str = "{{.Command}}";
    pub const COPY_FILES: &[&str] = &["/etc/resolv.conf"];

    /// (fstype, device, path) triples mounted inside the chroot.
    pub const CHROOT_MOUNTS: &[(&str, &str, &str)] = &[
        ("proc", "proc", "/proc"),
        ("sysfs", "sysfs", "/sys"),
        ("bind", "/dev", "/dev"),
        ("devpts", "devpts", "/dev/pts"),
        ("binfmt_misc", "binfmt_misc", "/proc/sys/fs/binfmt_misc"),
    ];

    pub const STORAGE_ACCOUNT_TYPE: &str = "Standard_LRS";
    pub const CACHE_TYPE: &str = "ReadOnly";
    pub const HYPERV_GENERATION: &str = "V1";

    /// Upper bound for a single remote call, in seconds.
    pub const POLLING_DURATION_TIMEOUT_SECS: u64 = 15 * 60;

    /// Upper bound for shared image version creation, in seconds.
    pub const SHARED_IMAGE_GALLERY_TIMEOUT_SECS: u64 = 60 * 60;
}
