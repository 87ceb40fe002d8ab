//! Provider options decoded from the run's YAML configuration.
//!
//! The options name the image build to run, the gateway version, the OS
//! family of the images and the resource limits applied to every launched
//! node. They are loaded once per provisioning call and read-only after.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Default location of the engine provider options, relative to the config root.
pub const DEFAULT_OPTIONS_PATH: &str = "providers/docker/options.yml";

/// OS family of the node images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OsFamily {
    /// Ubuntu 14 images (the default).
    #[default]
    Ubuntu,

    /// CentOS 7 images.
    CentOs,

    /// Windows 2012 images.
    Windows,
}

impl OsFamily {
    /// Returns the configuration spelling of this family.
    pub const fn config_name(self) -> &'static str {
        match self {
            Self::Ubuntu => "ubuntu14",
            Self::CentOs => "centos7",
            Self::Windows => "windows2012",
        }
    }

    /// Returns the build context directory name for this family.
    pub const fn context_dir(self) -> &'static str {
        match self {
            Self::Ubuntu => "Ubuntu14",
            Self::CentOs => "CentOS7",
            Self::Windows => "Windows2012",
        }
    }
}

impl From<String> for OsFamily {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "centos7" => Self::CentOs,
            "windows2012" => Self::Windows,
            _ => Self::Ubuntu,
        }
    }
}

impl From<OsFamily> for String {
    fn from(os: OsFamily) -> Self {
        os.config_name().to_string()
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// Ulimit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    /// Ulimit name (e.g., "nofile", "nproc").
    pub name: String,

    /// Soft limit.
    pub soft: i64,

    /// Hard limit.
    pub hard: i64,
}

impl Ulimit {
    /// Creates a new ulimit.
    pub fn new(name: impl Into<String>, soft: i64, hard: i64) -> Self {
        Self {
            name: name.into(),
            soft,
            hard,
        }
    }

    /// Creates a nofile ulimit.
    pub fn nofile(soft: i64, hard: i64) -> Self {
        Self::new("nofile", soft, hard)
    }
}

/// Options for the engine-backed providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Server build as `<version>-<build number>`.
    pub build: String,

    /// Gateway build as `<version>-<build number>`.
    #[serde(alias = "sync_gateway_version")]
    pub gateway_version: String,

    /// Package URL to build from instead of the default download location.
    pub build_url_override: String,

    /// CPU CFS period in microseconds (0 = engine default).
    #[serde(alias = "cpuperiod")]
    pub cpu_period: i64,

    /// CPU CFS quota in microseconds (0 = engine default).
    #[serde(alias = "cpuquota")]
    pub cpu_quota: i64,

    /// Memory limit in bytes (0 = engine default).
    pub memory: i64,

    /// Memory plus swap limit in bytes (0 = engine default, -1 = unlimited).
    #[serde(alias = "memoryswap")]
    pub memory_swap: i64,

    /// OS family of the images.
    pub os: OsFamily,

    /// Ulimits applied to every container.
    pub ulimits: Vec<Ulimit>,
}

impl ProviderOptions {
    /// Creates options for a server build with everything else defaulted.
    pub fn for_build(build: impl Into<String>) -> Self {
        Self {
            build: build.into(),
            ..Default::default()
        }
    }

    /// Loads options from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options: Self = serde_yaml::from_str(&content)?;
        debug!(
            path = %path.display(),
            build = %options.build,
            os = %options.os,
            "Loaded provider options"
        );
        Ok(options)
    }

    /// Returns the memory limit in megabytes (decimal, bytes / 1 000 000).
    pub fn memory_mb(&self) -> i64 {
        self.memory / 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_os_family_decoding() {
        assert_eq!(OsFamily::from("centos7".to_string()), OsFamily::CentOs);
        assert_eq!(OsFamily::from("Windows2012".to_string()), OsFamily::Windows);
        assert_eq!(OsFamily::from("ubuntu14".to_string()), OsFamily::Ubuntu);
        assert_eq!(OsFamily::from("debian".to_string()), OsFamily::Ubuntu);
        assert_eq!(OsFamily::CentOs.context_dir(), "CentOS7");
    }

    #[test]
    fn test_memory_mb() {
        let options = ProviderOptions {
            memory: 2_000_000_000,
            ..Default::default()
        };
        assert_eq!(options.memory_mb(), 2000);
    }

    #[test]
    fn test_load_legacy_spelling() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
build: 4.5.0-2601
sync_gateway_version: 1.3.0-274
cpuperiod: 100000
cpuquota: 50000
memory: 1000000000
memoryswap: -1
os: centos7
ulimits:
  - name: nofile
    soft: 40960
    hard: 40960
"#
        )
        .unwrap();

        let options = ProviderOptions::from_file(file.path()).unwrap();
        assert_eq!(options.build, "4.5.0-2601");
        assert_eq!(options.gateway_version, "1.3.0-274");
        assert_eq!(options.cpu_period, 100_000);
        assert_eq!(options.cpu_quota, 50_000);
        assert_eq!(options.memory_swap, -1);
        assert_eq!(options.os, OsFamily::CentOs);
        assert_eq!(options.ulimits, vec![Ulimit::nofile(40960, 40960)]);
        assert!(options.build_url_override.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProviderOptions::from_file(Path::new("/nonexistent/options.yml")).unwrap_err();
        assert!(matches!(err, crate::error::ProvisionError::Io(_)));
    }
}
