//! Operating systems, CPU architectures, and the platform a plan targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating system family a tool can be installed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    #[serde(alias = "darwin", alias = "osx")]
    Macos,
    #[serde(alias = "win32")]
    Windows,
}

impl Platform {
    /// The platform this binary was compiled for, if it is one we know.
    pub fn current() -> Option<Self> {
        std::env::consts::OS.parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" | "osx" => Ok(Platform::Macos),
            "windows" | "win32" => Ok(Platform::Windows),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// CPU architecture a tool can be installed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[serde(alias = "x86_64", alias = "amd64")]
    X64,
    #[serde(alias = "aarch64")]
    Arm64,
    #[serde(alias = "i686", alias = "ia32")]
    X86,
    Arm,
}

impl Architecture {
    pub fn current() -> Option<Self> {
        std::env::consts::ARCH.parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X64 => "x64",
            Architecture::Arm64 => "arm64",
            Architecture::X86 => "x86",
            Architecture::Arm => "arm",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Architecture::X64),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            "x86" | "i686" | "ia32" => Ok(Architecture::X86),
            "arm" => Ok(Architecture::Arm),
            other => Err(format!("unknown architecture '{other}'")),
        }
    }
}

/// The platform/architecture pair an installation plan is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetPlatform {
    pub platform: Platform,
    pub arch: Architecture,
}

impl TargetPlatform {
    pub fn new(platform: Platform, arch: Architecture) -> Self {
        Self { platform, arch }
    }

    /// The host platform, falling back to `linux/x64` on unknown hosts.
    pub fn current() -> Self {
        Self {
            platform: Platform::current().unwrap_or(Platform::Linux),
            arch: Architecture::current().unwrap_or(Architecture::X64),
        }
    }
}

impl Default for TargetPlatform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.arch)
    }
}

/// Platforms and architectures a tool supports. Empty lists mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRequirements {
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub architectures: Vec<Architecture>,
}

impl SystemRequirements {
    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&platform)
    }

    pub fn supports_arch(&self, arch: Architecture) -> bool {
        self.architectures.is_empty() || self.architectures.contains(&arch)
    }

    pub fn supports(&self, target: &TargetPlatform) -> bool {
        self.supports_platform(target.platform) && self.supports_arch(target.arch)
    }
}
