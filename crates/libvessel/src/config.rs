//! Invocation-wide runtime configuration.
//!
//! The configuration is built once by the CLI from its global flags and then
//! passed explicitly into every verb. Nothing here is process-global: the
//! same binary re-enters itself for the internal `boot` verb, and the sandbox
//! must see the parent invocation's configuration, not its own defaults.

use std::ffi::OsString;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid platform {0:?}, must be 'ptrace' or 'kvm'")]
    UnknownPlatform(String),
    #[error("invalid network type {0:?}, must be 'sandbox', 'host' or 'none'")]
    UnknownNetwork(String),
    #[error("invalid file access type {0:?}, must be 'proxy' or 'direct'")]
    UnknownFileAccess(String),
}

/// Which backend the sandbox kernel uses to intercept guest syscalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformType {
    #[default]
    Ptrace,
    Kvm,
}

impl FromStr for PlatformType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ptrace" => Ok(PlatformType::Ptrace),
            "kvm" => Ok(PlatformType::Kvm),
            _ => Err(ConfigError::UnknownPlatform(s.to_string())),
        }
    }
}

impl Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformType::Ptrace => write!(f, "ptrace"),
            PlatformType::Kvm => write!(f, "kvm"),
        }
    }
}

/// How the sandbox reaches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkType {
    #[default]
    Sandbox,
    Host,
    None,
}

impl FromStr for NetworkType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(NetworkType::Sandbox),
            "host" => Ok(NetworkType::Host),
            "none" => Ok(NetworkType::None),
            _ => Err(ConfigError::UnknownNetwork(s.to_string())),
        }
    }
}

impl Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkType::Sandbox => write!(f, "sandbox"),
            NetworkType::Host => write!(f, "host"),
            NetworkType::None => write!(f, "none"),
        }
    }
}

/// How the sandbox reaches container filesystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileAccessType {
    #[default]
    Proxy,
    Direct,
}

impl FromStr for FileAccessType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proxy" => Ok(FileAccessType::Proxy),
            "direct" => Ok(FileAccessType::Direct),
            _ => Err(ConfigError::UnknownFileAccess(s.to_string())),
        }
    }
}

impl Display for FileAccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileAccessType::Proxy => write!(f, "proxy"),
            FileAccessType::Direct => write!(f, "direct"),
        }
    }
}

pub const DEFAULT_STRACE_LOG_SIZE: u32 = 1024;

/// Everything a verb needs to know about the invocation it runs in.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for container metadata, one subdirectory per id.
    pub root_dir: PathBuf,
    pub debug: bool,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
    pub debug_log_dir: Option<PathBuf>,
    pub platform: PlatformType,
    pub network: NetworkType,
    pub file_access: FileAccessType,
    pub overlay: bool,
    pub log_packets: bool,
    pub strace: bool,
    pub strace_syscalls: Vec<String>,
    pub strace_log_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/var/run/vessel"),
            debug: false,
            log_file: None,
            log_format: None,
            debug_log_dir: None,
            platform: PlatformType::default(),
            network: NetworkType::default(),
            file_access: FileAccessType::default(),
            overlay: false,
            log_packets: false,
            strace: false,
            strace_syscalls: Vec::new(),
            strace_log_size: DEFAULT_STRACE_LOG_SIZE,
        }
    }
}

impl Config {
    /// Reconstructs the global CLI flags that produced this configuration.
    ///
    /// Used when the runtime re-invokes itself for the internal `boot` verb:
    /// the child must run under the parent invocation's configuration, so the
    /// flags are re-passed on its command line rather than inherited through
    /// any ambient state.
    pub fn global_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--root".into(), self.root_dir.clone().into()];
        if self.debug {
            args.push("--debug".into());
        }
        if let Some(log_file) = &self.log_file {
            args.push("--log".into());
            args.push(log_file.clone().into());
        }
        if let Some(log_format) = &self.log_format {
            args.push("--log-format".into());
            args.push(log_format.clone().into());
        }
        if let Some(debug_log_dir) = &self.debug_log_dir {
            args.push("--debug-log-dir".into());
            args.push(debug_log_dir.clone().into());
        }
        args.push("--platform".into());
        args.push(self.platform.to_string().into());
        args.push("--network".into());
        args.push(self.network.to_string().into());
        args.push("--file-access".into());
        args.push(self.file_access.to_string().into());
        if self.overlay {
            args.push("--overlay".into());
        }
        if self.log_packets {
            args.push("--log-packets".into());
        }
        if self.strace {
            args.push("--strace".into());
        }
        if !self.strace_syscalls.is_empty() {
            args.push("--strace-syscalls".into());
            args.push(self.strace_syscalls.join(",").into());
        }
        args.push("--strace-log-size".into());
        args.push(self.strace_log_size.to_string().into());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform() {
        assert_eq!("ptrace".parse::<PlatformType>().unwrap(), PlatformType::Ptrace);
        assert_eq!("kvm".parse::<PlatformType>().unwrap(), PlatformType::Kvm);
        assert!("qemu".parse::<PlatformType>().is_err());
    }

    #[test]
    fn test_parse_network() {
        assert_eq!("sandbox".parse::<NetworkType>().unwrap(), NetworkType::Sandbox);
        assert_eq!("host".parse::<NetworkType>().unwrap(), NetworkType::Host);
        assert_eq!("none".parse::<NetworkType>().unwrap(), NetworkType::None);
        assert!("bridge".parse::<NetworkType>().is_err());
    }

    #[test]
    fn test_parse_file_access() {
        assert_eq!("proxy".parse::<FileAccessType>().unwrap(), FileAccessType::Proxy);
        assert_eq!("direct".parse::<FileAccessType>().unwrap(), FileAccessType::Direct);
        assert!("nfs".parse::<FileAccessType>().is_err());
    }

    #[test]
    fn test_global_args_round_trip_defaults() {
        let config = Config {
            root_dir: PathBuf::from("/tmp/vessel-test"),
            ..Default::default()
        };
        let args = config.global_args();
        assert!(args.contains(&OsString::from("--root")));
        assert!(args.contains(&OsString::from("/tmp/vessel-test")));
        assert!(args.contains(&OsString::from("ptrace")));
        assert!(!args.contains(&OsString::from("--debug")));
        assert!(!args.contains(&OsString::from("--overlay")));
    }

    #[test]
    fn test_global_args_carries_toggles() {
        let config = Config {
            debug: true,
            overlay: true,
            strace: true,
            strace_syscalls: vec!["read".to_string(), "write".to_string()],
            ..Default::default()
        };
        let args = config.global_args();
        assert!(args.contains(&OsString::from("--debug")));
        assert!(args.contains(&OsString::from("--overlay")));
        assert!(args.contains(&OsString::from("--strace")));
        assert!(args.contains(&OsString::from("read,write")));
    }
}
