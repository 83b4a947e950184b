//! Platform capabilities
//!
//! The engine is written once for every OS. What differs per target (version
//! string, the host identity behind the device fingerprint, biometric support)
//! is supplied through [`PlatformInfo`].

use sha2::{Digest, Sha256};
use std::fs;
use std::sync::Arc;

/// Per-OS capability object supplied to the engine
pub trait PlatformInfo: Send + Sync {
    /// Short lowercase platform name reported in result metadata
    fn name(&self) -> &str;

    /// Human-readable OS version, e.g. `"Linux 6.8.0"`
    fn version(&self) -> String;

    /// Stable host identity components that feed the device fingerprint
    fn identity(&self) -> Vec<String>;

    /// Whether a biometric prompt can be shown on this device
    fn biometric_available(&self) -> bool {
        false
    }

    /// Run the platform biometric prompt.
    ///
    /// Returns the biometric modality on success, or a user-facing error
    /// message.
    fn authenticate_biometric(&self) -> Result<String, String> {
        Err(self.biometric_unavailable_message())
    }

    /// Message reported when no biometric prompt can be shown
    fn biometric_unavailable_message(&self) -> String {
        format!(
            "Biometric authentication not available on {}",
            display_name(self.name())
        )
    }

    /// SHA-256 over the platform name and identity components, hex encoded
    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        for component in self.identity() {
            hasher.update(b"|");
            hasher.update(component.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Linux desktop host
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxPlatform;

impl PlatformInfo for LinuxPlatform {
    fn name(&self) -> &str {
        "linux"
    }

    fn version(&self) -> String {
        match read_trimmed("/proc/sys/kernel/osrelease") {
            Some(release) => format!("Linux {}", release),
            None => "Linux".to_string(),
        }
    }

    fn identity(&self) -> Vec<String> {
        let hostname = read_trimmed("/proc/sys/kernel/hostname")
            .or_else(|| read_trimmed("/etc/hostname"))
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());

        let mut identity = vec![hostname];
        if let Some(machine_id) = read_trimmed("/etc/machine-id") {
            identity.push(machine_id);
        }
        identity
    }
}

/// Windows desktop host
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPlatform;

impl PlatformInfo for WindowsPlatform {
    fn name(&self) -> &str {
        "windows"
    }

    // Supported Rust Windows targets start at Windows 10.
    fn version(&self) -> String {
        "Windows 10+".to_string()
    }

    fn identity(&self) -> Vec<String> {
        let computer_name =
            std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string());
        let mut identity = vec![computer_name];
        if let Ok(domain) = std::env::var("USERDOMAIN") {
            identity.push(domain);
        }
        identity
    }
}

/// Platform described entirely by the host.
///
/// Used by hosts that query their own OS APIs (mobile embedders) and by tests.
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    name: String,
    version: String,
    identity: Vec<String>,
    biometric_type: Option<String>,
}

impl StaticPlatform {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            identity: Vec::new(),
            biometric_type: None,
        }
    }

    pub fn with_identity(mut self, identity: Vec<String>) -> Self {
        self.identity = identity;
        self
    }

    /// Mark biometrics as available, reporting `biometric_type` on success
    pub fn with_biometric(mut self, biometric_type: impl Into<String>) -> Self {
        self.biometric_type = Some(biometric_type.into());
        self
    }
}

impl PlatformInfo for StaticPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn identity(&self) -> Vec<String> {
        self.identity.clone()
    }

    fn biometric_available(&self) -> bool {
        self.biometric_type.is_some()
    }

    fn authenticate_biometric(&self) -> Result<String, String> {
        self.biometric_type
            .clone()
            .ok_or_else(|| self.biometric_unavailable_message())
    }
}

/// Platform for the compilation target
pub fn current_platform() -> Arc<dyn PlatformInfo> {
    if cfg!(target_os = "windows") {
        Arc::new(WindowsPlatform)
    } else if cfg!(target_os = "linux") {
        Arc::new(LinuxPlatform)
    } else {
        Arc::new(StaticPlatform::new(
            std::env::consts::OS,
            std::env::consts::OS,
        ))
    }
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn display_name(name: &str) -> String {
    match name {
        "linux" => "Linux".to_string(),
        "windows" => "Windows".to_string(),
        "macos" => "macOS".to_string(),
        "ios" => "iOS".to_string(),
        "android" => "Android".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let platform = StaticPlatform::new("android", "Android 14")
            .with_identity(vec!["Pixel 8".to_string(), "abc123".to_string()]);

        let first = platform.fingerprint();
        let second = platform.fingerprint();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_known_digest() {
        let platform =
            StaticPlatform::new("linux", "Linux").with_identity(vec!["host-a".to_string()]);
        // sha256("linux|host-a"), lowercase hex
        assert_eq!(
            platform.fingerprint(),
            "1b2570d0dffe65afc455847c53adfaea282baec1be3c54cdecd8f52d64ff8df4"
        );
    }

    #[test]
    fn test_fingerprint_depends_on_identity() {
        let a = StaticPlatform::new("linux", "Linux").with_identity(vec!["host-a".to_string()]);
        let b = StaticPlatform::new("linux", "Linux").with_identity(vec!["host-b".to_string()]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_component_boundaries_matter() {
        let a = StaticPlatform::new("linux", "Linux")
            .with_identity(vec!["ab".to_string(), "c".to_string()]);
        let b = StaticPlatform::new("linux", "Linux")
            .with_identity(vec!["a".to_string(), "bc".to_string()]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_desktop_platforms_lack_biometrics() {
        assert!(!LinuxPlatform.biometric_available());
        assert!(!WindowsPlatform.biometric_available());

        assert_eq!(
            LinuxPlatform.authenticate_biometric(),
            Err("Biometric authentication not available on Linux".to_string())
        );
        assert_eq!(
            WindowsPlatform.authenticate_biometric(),
            Err("Biometric authentication not available on Windows".to_string())
        );
    }

    #[test]
    fn test_static_platform_biometric() {
        let platform = StaticPlatform::new("ios", "iOS 17.2").with_biometric("faceID");
        assert!(platform.biometric_available());
        assert_eq!(platform.authenticate_biometric(), Ok("faceID".to_string()));
    }

    #[test]
    fn test_version_strings() {
        assert!(LinuxPlatform.version().starts_with("Linux"));
        assert_eq!(WindowsPlatform.version(), "Windows 10+");
    }

    #[test]
    fn test_current_platform_has_identity() {
        let platform = current_platform();
        assert!(!platform.name().is_empty());
        assert_eq!(platform.fingerprint().len(), 64);
    }
}
