use predicates::prelude::*;

mod common;

use common::IMAGE_ID;

fn platform_config() -> String {
    format!(
        r#"{{
  "source": "Canonical:UbuntuServer:18.04-LTS:latest",
  "image_resource_id": "{}"
}}"#,
        IMAGE_ID
    )
}

#[test]
fn test_validate_accepts_config() {
    let ctx = common::azure_chroot();
    let path = ctx.config("build.json", &platform_config());

    ctx.new_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration is valid"));
}

#[test]
fn test_validate_accepts_yaml() {
    let ctx = common::azure_chroot();
    let path = ctx.config(
        "build.yaml",
        &format!(
            "from_scratch: true\nos_disk_size_gb: 30\npre_mount_commands:\n  - \"parted {{{{.Device}}}} mklabel gpt\"\nimage_resource_id: {}\n",
            IMAGE_ID
        ),
    );

    ctx.new_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration is valid"));
}

#[test]
fn test_validate_show_fills_defaults() {
    let ctx = common::azure_chroot();
    let path = ctx.config("build.json", &platform_config());

    ctx.new_cmd()
        .args(["validate", "--show"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mount_path\""))
        .stdout(predicate::str::contains("\"chroot_mounts\""));
}

#[test]
fn test_validate_reports_every_error() {
    let ctx = common::azure_chroot();
    let path = ctx.config(
        "build.json",
        r#"{ "os_disk_cache_type": "Sometimes" }"#,
    );

    ctx.new_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"))
        .stderr(predicate::str::contains("source is required"))
        .stderr(predicate::str::contains("os_disk_cache_type"));
}

#[test]
fn test_validate_rejects_unknown_fields() {
    let ctx = common::azure_chroot();
    let path = ctx.config("build.json", r#"{ "sauce": "oops" }"#);

    ctx.new_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("sauce"));
}

#[test]
fn test_validate_missing_file() {
    let ctx = common::azure_chroot();

    ctx.new_cmd()
        .args(["validate", "/nonexistent/build.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_plan_lists_steps() {
    let ctx = common::azure_chroot();
    let path = ctx.config("build.json", &platform_config());

    ctx.new_cmd()
        .arg("plan")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Steps on buildvm (westus):"))
        .stdout(predicate::str::contains("ResolvePlatformImageVersion"))
        .stdout(predicate::str::contains("AttachDisk"))
        .stdout(predicate::str::contains("CreateImage"));
}

#[test]
fn test_plan_json() {
    let ctx = common::azure_chroot();
    let path = ctx.config("build.json", &platform_config());

    let output = ctx
        .new_cmd()
        .args(["plan", "--json", "--vm-name", "worker"])
        .arg(&path)
        .output()
        .expect("Failed to run plan");
    assert!(output.status.success());

    let plan: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("plan output should be JSON");
    assert_eq!(plan["vm"]["name"], "worker");
    let steps: Vec<&str> = plan["steps"]
        .as_array()
        .expect("steps should be an array")
        .iter()
        .filter_map(|s| s.as_str())
        .collect();
    assert_eq!(steps.first(), Some(&"ResolvePlatformImageVersion"));
    assert_eq!(steps.last(), Some(&"CreateImage"));
}

#[test]
fn test_lvm_resolve_device_path() {
    let ctx = common::azure_chroot();

    ctx.new_cmd()
        .args(["lvm", "resolve", "/dev/rootvg/rootlv"])
        .assert()
        .success()
        .stdout(predicate::str::diff("rootvg/rootlv\n"));
}

#[test]
fn test_lvm_resolve_rejects_traversal() {
    let ctx = common::azure_chroot();

    ctx.new_cmd()
        .args(["lvm", "resolve", "/dev/../etc/passwd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'..'"));
}

#[test]
fn test_help_lists_commands() {
    let ctx = common::azure_chroot();

    ctx.new_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("lvm"));
}
