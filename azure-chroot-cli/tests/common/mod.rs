#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub const IMAGE_ID: &str =
    "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/packer/providers/Microsoft.Compute/images/out";

pub struct TestContext {
    pub dir: TempDir,
}

impl TestContext {
    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_azure-chroot");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(30));
        cmd.env_remove("AZURE_CHROOT_COMMAND_WRAPPER");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Write `contents` to `name` inside the scratch directory.
    pub fn config(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write test config");
        path
    }
}

pub fn azure_chroot() -> TestContext {
    TestContext {
        dir: TempDir::new().expect("Failed to create temp dir"),
    }
}
