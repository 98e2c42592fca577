//! Client metadata sniffed from the request user agent.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::version::Version;

/// Client engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    #[default]
    Unknown,
    SingBox,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Unknown => "",
            Platform::SingBox => "sing-box",
        }
    }
}

/// Operating system of a graphical client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum System {
    #[default]
    Unknown,
    Android,
    Ios,
    Macos,
    Tvos,
}

impl System {
    pub fn as_str(&self) -> &'static str {
        match self {
            System::Unknown => "",
            System::Android => "android",
            System::Ios => "ios",
            System::Macos => "macos",
            System::Tvos => "tvos",
        }
    }
}

/// User-agent prefixes of the graphical clients.
const SYSTEM_PREFIXES: [(&str, System); 4] = [
    ("SFA", System::Android),
    ("SFI", System::Ios),
    ("SFM", System::Macos),
    ("SFT", System::Tvos),
];

const ENGINE_MARKER: &str = "sing-box ";

/// What the gateway knows about the requesting client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub user_agent: String,
    pub platform: Platform,
    pub system: System,
    pub version: Option<Version>,
}

impl Metadata {
    /// Metadata for a known engine version, without a user agent.
    pub fn sing_box(version: Option<Version>) -> Self {
        Self {
            platform: Platform::SingBox,
            version,
            ..Default::default()
        }
    }

    /// Sniff platform, system and engine version from a user agent such as
    /// `SFA/1.9.0 (Android 14; sing-box 1.9.0; language zh_CN)`.
    pub fn detect(user_agent: &str) -> Self {
        let system = SYSTEM_PREFIXES
            .iter()
            .find(|(prefix, _)| user_agent.starts_with(prefix))
            .map(|(_, system)| *system)
            .unwrap_or_default();

        let mut platform = Platform::Unknown;
        let mut version = None;
        if let Some((_, rest)) = user_agent.split_once(ENGINE_MARKER) {
            platform = Platform::SingBox;
            let name = match rest.split_once(';') {
                Some((name, _)) => name,
                None => rest.split(')').next().unwrap_or(rest),
            };
            version = Version::parse(name);
        }

        Self {
            user_agent: user_agent.to_string(),
            platform,
            system,
            version,
        }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.platform, &self.version) {
            (Platform::Unknown, _) => f.write_str("unknown client"),
            (platform, Some(version)) => write!(f, "{} {}", platform.as_str(), version),
            (platform, None) => f.write_str(platform.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_graphical_client() {
        let metadata = Metadata::detect("SFA/1.10.1 (Android 14; sing-box 1.10.1; language zh_CN)");
        assert_eq!(metadata.system, System::Android);
        assert_eq!(metadata.platform, Platform::SingBox);
        assert_eq!(metadata.version, Some(Version::new(1, 10, 1)));
    }

    #[test]
    fn test_detect_cli_client() {
        let metadata = Metadata::detect("sing-box 1.11.0-beta.5");
        assert_eq!(metadata.system, System::Unknown);
        assert_eq!(metadata.platform, Platform::SingBox);
        let version = metadata.version.unwrap();
        assert_eq!(version.prerelease.as_deref(), Some("beta.5"));
    }

    #[test]
    fn test_detect_version_cut_at_paren() {
        let metadata = Metadata::detect("SFM/1.9.0 (sing-box 1.9.3)");
        assert_eq!(metadata.system, System::Macos);
        assert_eq!(metadata.version, Some(Version::new(1, 9, 3)));
    }

    #[test]
    fn test_detect_unknown() {
        let metadata = Metadata::detect("curl/8.5.0");
        assert_eq!(metadata.platform, Platform::Unknown);
        assert_eq!(metadata.system, System::Unknown);
        assert!(metadata.version.is_none());
        assert_eq!(metadata.user_agent, "curl/8.5.0");
    }

    #[test]
    fn test_detect_invalid_version() {
        let metadata = Metadata::detect("SFI/1.0 (iOS 17; sing-box unknown)");
        assert_eq!(metadata.system, System::Ios);
        assert_eq!(metadata.platform, Platform::SingBox);
        assert!(metadata.version.is_none());
    }
}
