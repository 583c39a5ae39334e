/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{host::HostCapabilities, tolerance::EPS_BASE};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

static EXAMPLE_CONFIG: &str = include_str!("templates/schedcheck.toml");

// ******** ******** ********
// **    CONFIGURATION     **
// ******** ******** ********
#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub run: Run,
    pub workload: Workload,
    pub control_plane: ControlPlane,
    pub host: Host,
}
impl Config {
    pub fn write_example_to_file(path: &Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path)?;
        File::write_all(&mut file, EXAMPLE_CONFIG.as_bytes())?;
        Ok(file)
    }

    pub fn try_from_path(path: &Path) -> anyhow::Result<Config> {
        let mut config_str = String::new();
        fs::File::open(path)
            .context(format!("Unable to open config file {}", path.display()))?
            .read_to_string(&mut config_str)?;
        Config::try_from_str(&config_str)
    }

    pub fn try_from_str(conf_str: &str) -> anyhow::Result<Config> {
        let config = toml::from_str::<Config>(conf_str)
            .map_err(|e| anyhow::anyhow!("TOML parsing error: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.run.duration_ms == 0 || self.run.duration_ms % 1000 != 0 {
            anyhow::bail!(
                "run.duration_ms must be a positive multiple of 1000, got {}",
                self.run.duration_ms
            );
        }
        if !(self.run.eps_base > 0.0) {
            anyhow::bail!("run.eps_base must be positive, got {}", self.run.eps_base);
        }
        if !(self.run.limit_share > 0.0 && self.run.limit_share <= 1.0) {
            anyhow::bail!(
                "run.limit_share must be in (0, 1], got {}",
                self.run.limit_share
            );
        }
        if self.run.name_prefix.is_empty() {
            anyhow::bail!("run.name_prefix must not be empty");
        }
        Ok(())
    }

    /// Resolves the settings a run needs on the given host.
    pub fn run_settings(&self, host: &HostCapabilities) -> anyhow::Result<RunSettings> {
        let cwd = match &self.workload.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().context("Unable to determine working directory")?,
        };

        Ok(RunSettings {
            duration: Duration::from_millis(self.run.duration_ms),
            eps_base: self.run.eps_base,
            limit_share: self.run.limit_share,
            name_prefix: self.run.name_prefix.clone(),
            stress: self.workload.stress.clone(),
            workers: host.cpu_count.max(1),
            cwd,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.control_plane.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Run {
    pub duration_ms: u64,
    pub eps_base: f64,
    pub limit_share: f64,
    pub name_prefix: String,
}
impl Default for Run {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            eps_base: EPS_BASE,
            limit_share: 0.75,
            name_prefix: "schedcheck".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Workload {
    pub stress: String,
    pub cwd: Option<PathBuf>,
}
impl Default for Workload {
    fn default() -> Self {
        Self {
            stress: "stress".to_string(),
            cwd: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ControlPlane {
    pub portoctl: String,
    pub request_timeout_secs: u64,
}
impl Default for ControlPlane {
    fn default() -> Self {
        Self {
            portoctl: "portoctl".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Host {
    pub rt_accounting_path: PathBuf,
}
impl Default for Host {
    fn default() -> Self {
        Self {
            rt_accounting_path: PathBuf::from(crate::host::RT_ACCOUNTING_PATH),
        }
    }
}

/// Everything the orchestrator needs to build and check containers.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub duration: Duration,
    pub eps_base: f64,
    pub limit_share: f64,
    pub name_prefix: String,
    pub stress: String,
    /// parallel stress workers per container, one per logical core
    pub workers: usize,
    pub cwd: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn can_load_config_file() -> anyhow::Result<()> {
        let cfg = Config::try_from_path(Path::new("./fixtures/schedcheck.success.toml"))?;
        assert_eq!(cfg.run.duration_ms, 2000);
        assert_eq!(cfg.run.eps_base, 0.5);
        assert_eq!(cfg.control_plane.portoctl, "/usr/sbin/portoctl");
        assert_eq!(cfg.workload.cwd, Some(PathBuf::from("/tmp")));
        Ok(())
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() -> anyhow::Result<()> {
        let cfg = Config::try_from_str("[run]\nduration_ms = 3000\n")?;
        assert_eq!(cfg.run.duration_ms, 3000);
        assert_eq!(cfg.run.eps_base, EPS_BASE);
        assert_eq!(cfg.run.limit_share, 0.75);
        assert_eq!(cfg.control_plane, ControlPlane::default());
        assert_eq!(cfg.host, Host::default());

        let cfg = Config::try_from_str("")?;
        assert_eq!(cfg, Config::default());
        Ok(())
    }

    #[test]
    fn example_config_parses_to_the_defaults() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(EXAMPLE_CONFIG)?;
        assert_eq!(cfg, Config::default());
        Ok(())
    }

    #[test]
    fn example_config_is_written_once() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("schedcheck-init-{}.toml", std::process::id()));
        let _ = fs::remove_file(&path);

        Config::write_example_to_file(&path)?;
        let cfg = Config::try_from_path(&path)?;
        assert_eq!(cfg, Config::default());

        // never clobber an existing config
        assert!(Config::write_example_to_file(&path).is_err());

        fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::try_from_path(Path::new("./fixtures/schedcheck.bad_duration.toml")).is_err());
        assert!(Config::try_from_str("[run]\neps_base = 0.0\n").is_err());
        assert!(Config::try_from_str("[run]\nlimit_share = 1.5\n").is_err());
        assert!(Config::try_from_str("[run]\nname_prefix = \"\"\n").is_err());
        assert!(Config::try_from_str("[run]\nduration_ms = \"fast\"\n").is_err());
    }

    #[test]
    fn run_settings_use_one_worker_per_core() -> anyhow::Result<()> {
        let cfg = Config::try_from_path(Path::new("./fixtures/schedcheck.success.toml"))?;
        let settings = cfg.run_settings(&HostCapabilities::new(6, false))?;

        assert_eq!(settings.workers, 6);
        assert_eq!(settings.duration, Duration::from_secs(2));
        assert_eq!(settings.cwd, PathBuf::from("/tmp"));
        Ok(())
    }
}
