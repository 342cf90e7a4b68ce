//! Go-style template rendering for paths and user commands.

use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use gtmpl_value::Value;
use std::collections::HashMap;

/// Variables available to a template, e.g. `Device` or `MountPath`.
#[derive(Debug, Default, Clone)]
pub struct TemplateVars(HashMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
}

/// Render `template` with `vars`.
pub fn render(template: &str, vars: &TemplateVars) -> ChrootResult<String> {
    let context: Value = vars.0.clone().into();
    gtmpl::template(template, context).map_err(|e| {
        ChrootError::Config(format!("Failed to render template '{}': {}", template, e))
    })
}

/// Wrap a rendered command with the user's `command_wrapper`.
pub fn wrap_command(wrapper: &str, command: &str) -> ChrootResult<String> {
    render(wrapper, &TemplateVars::new().with("Command", command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_device_variable() {
        let vars = TemplateVars::new().with("Device", "sdc");
        assert_eq!(
            render("/mnt/packer-azure-chroot-disks/{{.Device}}", &vars).unwrap(),
            "/mnt/packer-azure-chroot-disks/sdc"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("echo hi", &TemplateVars::new()).unwrap(), "echo hi");
    }

    #[test]
    fn wrapper_embeds_command() {
        assert_eq!(
            wrap_command("sudo {{.Command}}", "mount /dev/sdc1 /mnt").unwrap(),
            "sudo mount /dev/sdc1 /mnt"
        );
    }

    #[test]
    fn malformed_template_is_config_error() {
        let err = render("{{.Device", &TemplateVars::new()).unwrap_err();
        assert!(matches!(err, ChrootError::Config(_)));
    }
}
