//! Builder façade: validate, assemble, run, report.

use crate::azure::InstanceMetadata;
use crate::config::BuildConfig;
use crate::pipeline::{BuildState, BuildStep, Services, StepRunner};
use crate::resource::ResourceId;
use crate::steps::{build_steps, CommandProvisioner, ProvisionHook};
use crate::util::Ui;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub image_id: Option<ResourceId>,
    pub shared_image_version_id: Option<ResourceId>,
    pub source_image_name: Option<String>,
    pub generated: BTreeMap<String, String>,
}

impl Artifact {
    /// Nothing was captured (`skip_create_image`).
    pub fn is_empty(&self) -> bool {
        self.image_id.is_none() && self.shared_image_version_id.is_none()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no image captured");
        }
        let mut sep = "";
        if let Some(id) = &self.image_id {
            write!(f, "managed image: {}", id)?;
            sep = ", ";
        }
        if let Some(id) = &self.shared_image_version_id {
            write!(f, "{}shared image version: {}", sep, id)?;
        }
        Ok(())
    }
}

pub struct Builder {
    config: BuildConfig,
    prepared: bool,
}

impl Builder {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            prepared: false,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Fill defaults and validate. Returns warnings.
    pub fn prepare(&mut self) -> ChrootResult<Vec<String>> {
        let warnings = self.config.prepare()?;
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        self.prepared = true;
        Ok(warnings)
    }

    /// Step list this configuration produces on `vm`.
    pub fn steps(
        &self,
        vm: &InstanceMetadata,
        ui: &dyn Ui,
    ) -> ChrootResult<Vec<Box<dyn BuildStep>>> {
        if !self.prepared {
            return Err(ChrootError::Internal(
                "prepare must be called before assembling steps".into(),
            ));
        }
        build_steps(&self.config, vm, ui)
    }

    /// Provisioner running the configured `provision_commands` in the chroot.
    pub fn command_provisioner(&self, services: &Services) -> CommandProvisioner {
        CommandProvisioner::new(
            services.runner.clone(),
            &self.config.command_wrapper,
            self.config.provision_commands.clone(),
        )
    }

    /// [`Builder::run`] with the configured `provision_commands` as the hook.
    pub async fn run_commands(
        &self,
        services: Services,
        cancel: CancellationToken,
    ) -> ChrootResult<Artifact> {
        let hook = Arc::new(self.command_provisioner(&services));
        self.run(services, hook, cancel).await
    }

    pub async fn run(
        &self,
        services: Services,
        hook: Arc<dyn ProvisionHook>,
        cancel: CancellationToken,
    ) -> ChrootResult<Artifact> {
        let vm = services.metadata.get().await?;
        tracing::info!(
            vm = %vm.name,
            resource_group = %vm.resource_group,
            location = %vm.location,
            "Starting chroot build"
        );

        let steps = self.steps(&vm, services.ui.as_ref())?;
        let mut state = BuildState::new(services, hook, cancel);
        let mut runner = StepRunner::new(steps);
        runner.run(&mut state).await?;

        let artifact = Artifact {
            image_id: state.image_id.take(),
            shared_image_version_id: state.shared_image_version_id.take(),
            source_image_name: state.source_image_name().map(str::to_string),
            generated: state.generated.clone().into_inner(),
        };
        tracing::info!(artifact = %artifact, "Build finished");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_display() {
        let image: ResourceId =
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/images/out"
                .parse()
                .unwrap();
        let artifact = Artifact {
            image_id: Some(image),
            ..Default::default()
        };
        assert_eq!(
            artifact.to_string(),
            "managed image: /subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/images/out"
        );
        assert_eq!(Artifact::default().to_string(), "no image captured");
    }

    #[test]
    fn steps_require_prepare() {
        let builder = Builder::new(BuildConfig::default());
        let vm = InstanceMetadata {
            subscription_id: "s".into(),
            resource_group: "rg".into(),
            name: "vm".into(),
            location: "westus".into(),
            vm_scale_set: None,
        };
        let err = builder.steps(&vm, &crate::util::TracingUi).err().unwrap();
        assert!(matches!(err, ChrootError::Internal(_)));
    }
}
