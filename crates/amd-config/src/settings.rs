//! Settings/secrets store (SPEC_FULL.md §6): `settings.yaml` and
//! `secrets.yaml` under `<system_root>/`, seeded from an embedded template
//! the first time the runtime bootstraps against a root that lacks one —
//! the same load-or-seed shape as the teacher's `csa-config::ProjectConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use amd_core::{EngineError, Result};
use amd_gateway::ModelConfig;
use serde::{Deserialize, Serialize};

const SETTINGS_TEMPLATE: &str = include_str!("../templates/settings.yaml");
const SETTINGS_FILE: &str = "settings.yaml";
const SECRETS_FILE: &str = "secrets.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSettings {
    #[serde(default = "default_worker_limit")]
    pub scheduler_worker_limit: u32,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_seconds: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,
}

fn default_worker_limit() -> u32 {
    4
}
fn default_model() -> String {
    "gpt-mini".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_tool_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolToggle {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub settings: CoreSettings,
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub tools: HashMap<String, ToolToggle>,
}

impl Settings {
    /// Load `settings.yaml` from `system_root`, seeding it from the
    /// embedded template on first run.
    pub fn load_or_seed(system_root: &Path) -> Result<Self> {
        let path = system_root.join(SETTINGS_FILE);
        if !path.exists() {
            std::fs::create_dir_all(system_root)?;
            amd_core::atomic_file::write_atomic(&path, SETTINGS_TEMPLATE)?;
            set_mode_600(&path)?;
        }
        let text = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(EngineError::from)
    }
}

/// `secrets.yaml`: `{provider_name: {api_key: "..."}}`. Absent ⇒ seeded as
/// an empty map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secrets {
    #[serde(flatten)]
    pub entries: HashMap<String, SecretEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntry {
    pub api_key: String,
}

impl Secrets {
    pub fn load_or_seed(system_root: &Path) -> Result<Self> {
        let path = system_root.join(SECRETS_FILE);
        if !path.exists() {
            std::fs::create_dir_all(system_root)?;
            amd_core::atomic_file::write_atomic(&path, "{}\n")?;
            set_mode_600(&path)?;
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(EngineError::from)
    }

    pub fn path(system_root: &Path) -> PathBuf {
        system_root.join(SECRETS_FILE)
    }
}

#[cfg(unix)]
fn set_mode_600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode_600(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn seeds_settings_from_template_on_first_load() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load_or_seed(tmp.path()).unwrap();
        assert_eq!(settings.settings.default_model, "gpt-mini");
        assert!(tmp.path().join(SETTINGS_FILE).exists());
    }

    #[test]
    fn second_load_reads_existing_file_unchanged() {
        let tmp = TempDir::new().unwrap();
        Settings::load_or_seed(tmp.path()).unwrap();
        std::fs::write(
            tmp.path().join(SETTINGS_FILE),
            "settings:\n  default_model: custom-model\n",
        )
        .unwrap();
        let settings = Settings::load_or_seed(tmp.path()).unwrap();
        assert_eq!(settings.settings.default_model, "custom-model");
    }

    #[test]
    fn seeds_empty_secrets_map() {
        let tmp = TempDir::new().unwrap();
        let secrets = Secrets::load_or_seed(tmp.path()).unwrap();
        assert!(secrets.entries.is_empty());
    }
}
