//! LVM discovery and activation against scripted host tools.

use azure_chroot::lvm::{LvmDiscovery, LvmTools, DISCOVERY_ATTEMPTS};
use azure_chroot::util::process::CommandOutput;
use azure_chroot_shared::ChrootError;
use azure_chroot_test_utils::{FakeRunner, RecordingUi};
use tokio_util::sync::CancellationToken;

// ============================================================================
// TEST FIXTURES
// ============================================================================

const DEVICE: &str = "/dev/sdc";

struct TestContext {
    runner: FakeRunner,
    ui: RecordingUi,
    cancel: CancellationToken,
}

impl TestContext {
    fn new() -> Self {
        Self {
            runner: FakeRunner::new(),
            ui: RecordingUi::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn discovery(&self) -> LvmDiscovery<'_> {
        LvmDiscovery::new(LvmTools::new(&self.runner), &self.ui, &self.cancel)
    }

    fn pvs_calls(&self) -> usize {
        self.runner.calls_starting_with("pvs ").len()
    }
}

// ============================================================================
// VOLUME GROUP DISCOVERY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn volume_groups_found_after_udev_catches_up() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout("pvs", "")
        .stdout("pvs", "")
        .stdout("pvs", "  /dev/sdc2|rootvg\n  /dev/sdd1|othervg\n");

    let groups = ctx.discovery().find_volume_groups(DEVICE).await.unwrap();

    assert_eq!(groups, vec!["rootvg".to_string()]);
    assert_eq!(ctx.pvs_calls(), 3);
    // Every attempt is preceded by a partition re-read.
    assert_eq!(ctx.runner.calls_starting_with("partprobe /dev/sdc").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn disk_without_lvm_gives_up_after_all_attempts() {
    let ctx = TestContext::new();
    ctx.runner.stdout("pvs", "  /dev/sda1|osvg\n");

    let groups = ctx.discovery().find_volume_groups(DEVICE).await.unwrap();

    assert!(groups.is_empty());
    assert_eq!(ctx.pvs_calls(), DISCOVERY_ATTEMPTS as usize);
    assert!(ctx.runner.calls_starting_with("vgchange").is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_pvs_is_retried_not_fatal() {
    let ctx = TestContext::new();
    ctx.runner
        .fail("pvs", "  Device /dev/sdc not found")
        .stdout("pvs", "  /dev/sdc1|rootvg\n");

    let groups = ctx.discovery().find_volume_groups(DEVICE).await.unwrap();
    assert_eq!(groups, vec!["rootvg".to_string()]);
}

#[tokio::test]
async fn cancellation_interrupts_the_retry_backoff() {
    let ctx = TestContext::new();
    ctx.cancel.cancel();

    let err = ctx.discovery().find_volume_groups(DEVICE).await.unwrap_err();
    assert!(err.is_cancelled());
}

// ============================================================================
// OVERRIDE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn override_falls_back_to_device_name() {
    let ctx = TestContext::new();

    let groups = ctx
        .discovery()
        .override_volume_groups(DEVICE, "/dev/mapper/rhel-root")
        .await
        .unwrap();

    assert_eq!(groups, vec!["rhel".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn override_group_follows_device_mapper_split() {
    let ctx = TestContext::new();
    ctx.runner.stdout("dmsetup splitname", "  rootvg:root-lv:\n");

    let groups = ctx
        .discovery()
        .override_volume_groups(DEVICE, "/dev/mapper/rootvg-root-lv")
        .await
        .unwrap();

    assert_eq!(groups, vec!["rootvg".to_string()]);
}

#[tokio::test]
async fn override_prefers_groups_on_the_device() {
    let ctx = TestContext::new();
    ctx.runner.stdout("pvs", "  /dev/sdc2|datavg\n");

    let groups = ctx
        .discovery()
        .override_volume_groups(DEVICE, "/dev/mapper/rhel-root")
        .await
        .unwrap();

    assert_eq!(groups, vec!["datavg".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn override_without_a_known_group_is_refused() {
    let ctx = TestContext::new();

    let err = ctx
        .discovery()
        .override_volume_groups(DEVICE, "/dev/sdc1")
        .await
        .unwrap_err();

    assert!(matches!(err, ChrootError::Lvm(msg) if msg.contains("/dev/sdc1")));
}

// ============================================================================
// ACTIVATION
// ============================================================================

#[tokio::test]
async fn activation_is_scoped_to_the_groups() {
    let ctx = TestContext::new();
    ctx.discovery()
        .activate(&["rootvg".to_string()])
        .await
        .unwrap();

    assert_eq!(
        ctx.runner.calls_starting_with("vgchange"),
        vec!["vgchange -ay rootvg".to_string()]
    );
    assert_eq!(ctx.runner.calls_starting_with("vgscan").len(), 1);
}

#[tokio::test]
async fn activation_failure_is_fatal() {
    let ctx = TestContext::new();
    ctx.runner.fail("vgchange", "  Volume group \"rootvg\" not found");

    let err = ctx
        .discovery()
        .activate(&["rootvg".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ChrootError::Lvm(msg) if msg.contains("not found")));
}

#[tokio::test]
async fn failing_vgscan_is_only_advisory() {
    let ctx = TestContext::new();
    ctx.runner.fail("vgscan", "boom");

    ctx.discovery()
        .activate(&["rootvg".to_string()])
        .await
        .unwrap();
}

// ============================================================================
// ROOT SELECTION
// ============================================================================

#[tokio::test]
async fn swap_volumes_are_never_chosen() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout(
            "lvs",
            "  swaplv|rootvg|/dev/rootvg/swaplv|-wi-a-----\n  homelv|rootvg|/dev/rootvg/homelv|-wi-a-----\n",
        )
        .stdout("blkid -o value -s TYPE /dev/rootvg/swaplv", "swap\n")
        .stdout("blkid -o value -s TYPE /dev/rootvg/homelv", "xfs\n");

    let root = ctx
        .discovery()
        .select_root(&["rootvg".to_string()])
        .await
        .unwrap();
    assert_eq!(root, "/dev/rootvg/homelv");
}

#[tokio::test]
async fn root_named_volume_wins_over_order() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout(
            "lvs",
            "  homelv|rootvg|/dev/rootvg/homelv|-wi-a-----\n  rootlv|rootvg|/dev/rootvg/rootlv|-wi-a-----\n",
        )
        .stdout("blkid", "xfs\n");

    let root = ctx
        .discovery()
        .select_root(&["rootvg".to_string()])
        .await
        .unwrap();
    assert_eq!(root, "/dev/rootvg/rootlv");
    assert!(!ctx.ui.contains("WARNING"));
}

#[tokio::test]
async fn ambiguous_choice_is_reported() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout(
            "lvs",
            "  data1|vg|/dev/vg/data1|-wi-a-----\n  data2|vg|/dev/vg/data2|-wi-a-----\n",
        )
        .stdout("blkid", "ext4\n");

    let root = ctx.discovery().select_root(&["vg".to_string()]).await.unwrap();
    assert_eq!(root, "/dev/vg/data1");
    assert!(ctx.ui.contains("multiple logical volumes"));
}

#[tokio::test]
async fn pools_and_snapshots_are_filtered() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout(
            "lvs",
            "  pool|vg|/dev/vg/pool|twi-aotz--\n  snap|vg|/dev/vg/snap|swi-a-s---\n  data|vg|/dev/vg/data|Vwi-aotz--\n",
        )
        .stdout("blkid", "ext4\n");

    let root = ctx.discovery().select_root(&["vg".to_string()]).await.unwrap();
    assert_eq!(root, "/dev/vg/data");
}

#[tokio::test]
async fn no_mountable_volume_is_an_error() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout("lvs", "  pool|vg|/dev/vg/pool|twi-aotz--\n");

    let err = ctx
        .discovery()
        .select_root(&["vg".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ChrootError::Lvm(_)));
}

#[tokio::test]
async fn unreadable_root_is_refreshed_once() {
    let ctx = TestContext::new();
    ctx.runner
        .stdout("lvs", "  root|rhel|/dev/mapper/rhel-root|-wi-a-----\n")
        .on("blkid", CommandOutput::failed(2, ""))
        .stdout("dmsetup splitname", "  rhel:root:\n");

    let root = ctx
        .discovery()
        .select_root(&["rhel".to_string()])
        .await
        .unwrap();

    assert_eq!(root, "/dev/mapper/rhel-root");
    assert_eq!(
        ctx.runner.calls_starting_with("lvchange"),
        vec!["lvchange --refresh rhel/root".to_string()]
    );
    assert!(ctx.ui.contains("still has no readable filesystem"));
}

// ============================================================================
// DEVICE NAME RESOLUTION
// ============================================================================

#[tokio::test]
async fn mapper_names_fall_back_to_heuristic_without_dmsetup() {
    let ctx = TestContext::new();
    ctx.runner.fail("dmsetup", "dmsetup: command not found");
    let tools = LvmTools::new(&ctx.runner);

    assert_eq!(
        tools.resolve_vg_lv("/dev/mapper/rhel-root").await,
        Some(("rhel".to_string(), "root".to_string()))
    );
    assert_eq!(
        tools.resolve_vg_lv("/dev/mapper/my--vg-root--lv").await,
        Some(("my-vg".to_string(), "root-lv".to_string()))
    );
    assert_eq!(tools.resolve_vg_lv("/dev/sdc1").await, None);
}

#[tokio::test]
async fn dmsetup_answer_is_preferred() {
    let ctx = TestContext::new();
    ctx.runner.stdout("dmsetup splitname", "  vg-with-dash:lv:\n");
    let tools = LvmTools::new(&ctx.runner);

    assert_eq!(
        tools.resolve_vg_lv("/dev/mapper/vg--with--dash-lv").await,
        Some(("vg-with-dash".to_string(), "lv".to_string()))
    );
}
