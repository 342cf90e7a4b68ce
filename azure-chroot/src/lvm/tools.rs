//! LVM and device-manager tool boundary.
//!
//! All text output from `pvs`, `lvs`, `blkid` and `dmsetup` is parsed here;
//! callers only see typed results.

use super::naming::{mapper_name, resolve_vg_lv_heuristic};
use super::parse::{self, LvInfo, REPORT_SEPARATOR};
use crate::util::process::{args, command_line, CommandRunner};
use azure_chroot_shared::constants::tools;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};

/// Thin wrapper over the system LVM tools.
#[derive(Clone, Copy)]
pub struct LvmTools<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> LvmTools<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Run a command whose failure is only worth a warning.
    async fn advisory(&self, program: &str, cmd_args: Vec<String>) {
        match self.runner.run(program, &cmd_args).await {
            Ok(output) if output.success() => {}
            Ok(output) => tracing::warn!(
                command = %command_line(program, &cmd_args),
                code = ?output.code,
                stderr = %output.stderr.trim(),
                "Advisory command failed, continuing"
            ),
            Err(e) => tracing::warn!(
                command = %command_line(program, &cmd_args),
                "Advisory command could not run, continuing: {}",
                e
            ),
        }
    }

    /// Run a command whose failure is fatal, returning stdout.
    async fn required(&self, program: &str, cmd_args: Vec<String>) -> ChrootResult<String> {
        let output = self.runner.run(program, &cmd_args).await?;
        if !output.success() {
            return Err(ChrootError::Lvm(format!(
                "'{}' failed ({:?}): {}",
                command_line(program, &cmd_args),
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Wait for pending udev events.
    pub async fn settle(&self) {
        self.advisory(tools::UDEVADM, args(["settle"])).await;
    }

    /// Re-read partitions, settle udev and refresh the PV cache.
    pub async fn refresh(&self, device: &str) {
        self.advisory(tools::PARTPROBE, args([device])).await;
        self.settle().await;
        self.advisory(tools::PVSCAN, args(["--cache"])).await;
    }

    /// Volume groups with at least one physical volume on `device`.
    pub async fn volume_groups_on(&self, device: &str) -> ChrootResult<Vec<String>> {
        let stdout = self
            .required(
                tools::PVS,
                args([
                    "--noheadings",
                    "-o",
                    "pv_name,vg_name",
                    "--separator",
                    REPORT_SEPARATOR,
                ]),
            )
            .await?;
        Ok(parse::volume_groups_on_device(
            &parse::parse_pvs(&stdout),
            device,
        ))
    }

    /// Activate exactly `groups` and create their device nodes.
    pub async fn activate(&self, groups: &[String]) -> ChrootResult<()> {
        let mut cmd_args = args(["-ay"]);
        cmd_args.extend(groups.iter().cloned());
        self.required(tools::VGCHANGE, cmd_args).await?;
        self.advisory(tools::VGSCAN, args(["--mknodes"])).await;
        self.settle().await;
        Ok(())
    }

    /// Deactivate exactly `groups`.
    pub async fn deactivate(&self, groups: &[String]) -> ChrootResult<()> {
        let mut cmd_args = args(["-an"]);
        cmd_args.extend(groups.iter().cloned());
        self.required(tools::VGCHANGE, cmd_args).await?;
        Ok(())
    }

    /// Logical volumes inside `groups`, in `lvs` order.
    pub async fn logical_volumes(&self, groups: &[String]) -> ChrootResult<Vec<LvInfo>> {
        let mut cmd_args = args([
            "--noheadings",
            "-o",
            "lv_name,vg_name,lv_path,lv_attr",
            "--separator",
            REPORT_SEPARATOR,
        ]);
        cmd_args.extend(groups.iter().cloned());
        let stdout = self.required(tools::LVS, cmd_args).await?;
        Ok(parse::parse_lvs(&stdout))
    }

    /// Filesystem type reported by `blkid`, `None` when unreadable.
    pub async fn filesystem_type(&self, device: &str) -> Option<String> {
        let output = self
            .runner
            .run(tools::BLKID, &args(["-o", "value", "-s", "TYPE", device]))
            .await
            .ok()?;
        let fs_type = output.stdout.trim();
        if !output.success() || fs_type.is_empty() {
            return None;
        }
        Some(fs_type.to_string())
    }

    /// Ask device-mapper to split a mapper name into `(vg, lv)`.
    pub async fn split_mapper_name(&self, name: &str) -> Option<(String, String)> {
        let output = self
            .runner
            .run(
                tools::DMSETUP,
                &args(["splitname", "--noheadings", "--separator", ":", name, "LVM"]),
            )
            .await
            .ok()?;
        if !output.success() {
            return None;
        }
        let line = output.stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
        let mut parts = line.split(':');
        let vg = parts.next()?.trim();
        let lv = parts.next()?.trim();
        if vg.is_empty() || lv.is_empty() {
            return None;
        }
        Some((vg.to_string(), lv.to_string()))
    }

    /// Resolve the `(vg, lv)` behind a device path.
    ///
    /// Mapper names are split by `dmsetup` when it is available and by the
    /// naming heuristic otherwise.
    pub async fn resolve_vg_lv(&self, path: &str) -> Option<(String, String)> {
        if let Some(name) = mapper_name(path) {
            if let Some(pair) = self.split_mapper_name(name).await {
                return Some(pair);
            }
            tracing::debug!(path, "dmsetup splitname unavailable, using naming heuristic");
        }
        resolve_vg_lv_heuristic(path)
    }

    /// `lvchange --refresh vg/lv`.
    pub async fn refresh_lv(&self, vg: &str, lv: &str) -> ChrootResult<()> {
        self.required(tools::LVCHANGE, args(["--refresh".to_string(), format!("{}/{}", vg, lv)]))
            .await?;
        Ok(())
    }

    /// Log volume and device-mapper tables for post-mortem analysis.
    pub async fn dump_diagnostics(&self, groups: &[String]) {
        let mut lvs_args = args(["-a", "-o", "+devices"]);
        lvs_args.extend(groups.iter().cloned());
        let probes = [
            (tools::LVS, lvs_args),
            (tools::DMSETUP, args(["table"])),
        ];
        for (program, cmd_args) in probes {
            match self.runner.run(program, &cmd_args).await {
                Ok(output) => tracing::warn!(
                    command = %command_line(program, &cmd_args),
                    "Diagnostics:\n{}{}",
                    output.stdout,
                    output.stderr
                ),
                Err(e) => tracing::warn!(
                    command = %command_line(program, &cmd_args),
                    "Diagnostics unavailable: {}",
                    e
                ),
            }
        }
    }
}
