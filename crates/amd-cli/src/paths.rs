//! Default data/system root resolution (SPEC_FULL.md §6), mirroring the
//! teacher's `csa-config::paths` XDG lookup shape without the legacy-path
//! migration concerns that crate carries.

use std::path::PathBuf;

const APP_NAME: &str = "amdctl";

/// Default `data_root`: where vault directories live. `$XDG_DATA_HOME/amdctl`
/// (or the platform equivalent) when no `--data-root` override is given.
pub fn default_data_root() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".amdctl/data"))
}

/// Default `system_root`: where `settings.yaml`/`secrets.yaml`/state live.
/// `$XDG_CONFIG_HOME/amdctl` (or the platform equivalent).
pub fn default_system_root() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".amdctl/system"))
}
