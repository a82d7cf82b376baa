// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files that the installer reads
//! but does not own.

use std::{env, path::PathBuf};

/// Environment variable that overrides the settings file location.
pub const SETTINGS_ENV: &str = "LEAFUP_CONFIG";

/// Determine absolute path to installer settings file.
///
/// Uses `$LEAFUP_CONFIG` if set. Otherwise falls back to
/// `$XDG_CONFIG_HOME/leafup/config.toml`, or the platform equivalent. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(SETTINGS_ENV).filter(|path| !path.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|path| path.join("leafup").join("config.toml"))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("LEAFUP_CONFIG", "/etc/leafup.toml")])]
    fn settings_path_from_environment() -> anyhow::Result<()> {
        assert_eq!(default_settings_path()?, PathBuf::from("/etc/leafup.toml"));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("LEAFUP_CONFIG", ""), ("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn settings_path_from_xdg() -> anyhow::Result<()> {
        assert_eq!(
            default_settings_path()?,
            PathBuf::from("/home/blah/.config/leafup/config.toml")
        );
        Ok(())
    }
}
