//! Device capabilities derived from the `VERSION`/`ID` handshake.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

pub const DEFAULT_KEY_COUNT: u16 = 90;
pub const DEFAULT_LAYER_COUNT: u8 = 3;
pub const DEFAULT_PROFILE_COUNT: u8 = 1;

/// Models known to the built-in [`CapabilityTable`], named as `ID` reports them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum DeviceModel {
    #[strum(serialize = "ONE")]
    One,
    #[strum(serialize = "TWO")]
    Two,
    #[strum(serialize = "LITE")]
    Lite,
    #[strum(serialize = "X")]
    X,
    #[strum(serialize = "ENGINE")]
    Engine,
    #[strum(serialize = "M4G")]
    M4g,
    #[strum(serialize = "M4GR")]
    M4gr,
    #[strum(serialize = "T4G")]
    T4g,
    #[strum(serialize = "ZERO")]
    Zero,
}

impl DeviceModel {
    pub fn key_count(self) -> u16 {
        match self {
            Self::One | Self::Two | Self::M4g | Self::M4gr => 90,
            Self::Lite => 67,
            Self::X | Self::Engine | Self::Zero => 256,
            Self::T4g => 7,
        }
    }
}

/// Identity triple reported by `ID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub company: String,
    pub device: String,
    pub chipset: String,
}

impl DeviceIdentity {
    /// Reads the first three tokens of an `ID` payload.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Option<Self> {
        let [company, device, chipset, ..] = tokens else {
            return None;
        };
        Some(Self {
            company: company.as_ref().to_string(),
            device: device.as_ref().to_string(),
            chipset: chipset.as_ref().to_string(),
        })
    }

    pub fn model(&self) -> Option<DeviceModel> {
        self.device.parse().ok()
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.company, self.device, self.chipset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub key_count: u16,
    pub layer_count: u8,
    pub profile_count: u8,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            key_count: DEFAULT_KEY_COUNT,
            layer_count: DEFAULT_LAYER_COUNT,
            profile_count: DEFAULT_PROFILE_COUNT,
        }
    }
}

/// A count that grows once the firmware reaches `min_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGate {
    pub min_version: String,
    /// Count for firmware older than `min_version`.
    pub fallback: u8,
    /// Count on chipsets listed in [`CapabilityTable::limited_chipsets`].
    pub limited: u8,
    pub full: u8,
}

impl CapabilityGate {
    pub fn resolve(&self, version: Option<&str>, limited_chipset: bool) -> u8 {
        match version {
            Some(version) if version_gte(version, &self.min_version) => {
                if limited_chipset {
                    self.limited
                } else {
                    self.full
                }
            }
            _ => self.fallback,
        }
    }
}

/// Static model and firmware tables used to derive [`Capabilities`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityTable {
    pub key_counts: BTreeMap<String, u16>,
    pub default_key_count: u16,
    pub limited_chipsets: Vec<String>,
    pub profiles: CapabilityGate,
    pub layers: CapabilityGate,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self {
            key_counts: DeviceModel::iter()
                .map(|model| (model.to_string(), model.key_count()))
                .collect(),
            default_key_count: DEFAULT_KEY_COUNT,
            limited_chipsets: vec!["M0".to_string()],
            profiles: CapabilityGate {
                min_version: "2.2.0-beta.4".to_string(),
                fallback: DEFAULT_PROFILE_COUNT,
                limited: 2,
                full: 3,
            },
            layers: CapabilityGate {
                min_version: "2.2.0-beta.20".to_string(),
                fallback: DEFAULT_LAYER_COUNT,
                limited: 3,
                full: 4,
            },
        }
    }
}

impl CapabilityTable {
    pub fn key_count(&self, device: &str) -> u16 {
        self.key_counts
            .get(device)
            .copied()
            .unwrap_or(self.default_key_count)
    }

    pub fn resolve(&self, version: Option<&str>, identity: &DeviceIdentity) -> Capabilities {
        let limited = self.limited_chipsets.contains(&identity.chipset);
        Capabilities {
            key_count: self.key_count(&identity.device),
            layer_count: self.layers.resolve(version, limited),
            profile_count: self.profiles.resolve(version, limited),
        }
    }
}

/// Returns whether `current >= target`, comparing up to three numeric components.
///
/// Anything from the first character that is neither a digit nor a dot is
/// ignored, so pre-release suffixes never influence the result. Components
/// past the third are ignored and missing ones count as zero; an empty or
/// non-numeric component among the first three makes the version malformed,
/// which compares as not satisfied.
pub fn version_gte(current: &str, target: &str) -> bool {
    let (Some(current), Some(target)) = (numeric_version(current), numeric_version(target))
    else {
        return false;
    };

    for i in 0..3 {
        let c = current.get(i).copied().unwrap_or(0);
        let t = target.get(i).copied().unwrap_or(0);
        match c.cmp(&t) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }

    true
}

fn numeric_version(version: &str) -> Option<Vec<u64>> {
    let end = version
        .find(|c: char| c != '.' && !c.is_ascii_digit())
        .unwrap_or(version.len());

    version[..end]
        .split('.')
        .take(3)
        .map(|component| component.parse::<u64>().ok())
        .collect()
}

/// Handshake progress of a session.
///
/// Capabilities only exist in [`SessionState::Initialized`], so a handshake
/// that stops half way never exposes partial device details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    VersionFetched {
        version: String,
    },
    Initialized(DeviceDetails),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDetails {
    pub version: String,
    pub identity: DeviceIdentity,
    pub capabilities: Capabilities,
}

impl SessionState {
    /// Starts a new handshake from the `VERSION` reply, whatever came before.
    pub fn version_fetched(version: impl Into<String>) -> Self {
        Self::VersionFetched {
            version: version.into(),
        }
    }

    /// Completes the handshake. States other than `VersionFetched` are returned unchanged.
    pub fn identified(self, identity: DeviceIdentity, table: &CapabilityTable) -> Self {
        match self {
            Self::VersionFetched { version } => {
                let capabilities = table.resolve(Some(&version), &identity);
                Self::Initialized(DeviceDetails {
                    version,
                    identity,
                    capabilities,
                })
            }
            other => other,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Uninitialized => None,
            Self::VersionFetched { version } => Some(version),
            Self::Initialized(details) => Some(&details.version),
        }
    }

    pub fn details(&self) -> Option<&DeviceDetails> {
        match self {
            Self::Initialized(details) => Some(details),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(device: &str, chipset: &str) -> DeviceIdentity {
        DeviceIdentity {
            company: "CHARACHORDER".to_string(),
            device: device.to_string(),
            chipset: chipset.to_string(),
        }
    }

    #[test]
    fn compares_versions() {
        assert!(version_gte("2.2.0-beta.20", "2.2.0-beta.4"));
        assert!(!version_gte("2.1.9", "2.2.0"));
        assert!(version_gte("2.2.0", "2.2.0"));
        assert!(version_gte("2.10", "2.9.9"));
        assert!(version_gte("3", "2.9.9"));
        assert!(!version_gte("2.1", "2.1.1"));
        assert!(version_gte("2.2.1.7", "2.2.1.9"));
    }

    #[test]
    fn ignores_components_past_the_third() {
        assert!(version_gte("2.2.0.", "2.2.0"));
        assert!(version_gte("2.2.0.x", "2.2.0"));
        assert!(version_gte("2.2.0.rc1", "2.2.0"));
        assert!(version_gte("2.2.0", "2.2.0..9"));
        assert!(!version_gte("2.2.", "2.2.0"));
        assert!(!version_gte("2..1", "2.0.0"));
        assert!(!version_gte("", "2.2.0"));
    }

    #[test]
    fn suffix_ends_at_any_non_dot_separator() {
        assert!(version_gte("2.2.0+build.5", "2.2.0"));
        assert!(version_gte("2.2.0 beta", "2.2.0"));
    }

    #[test]
    fn malformed_versions_are_not_satisfied() {
        assert!(!version_gte("", "1.0.0"));
        assert!(!version_gte("v2.2.0", "1.0.0"));
        assert!(!version_gte("2..0", "1.0.0"));
        assert!(!version_gte("2.2.0", "x"));
        assert!(!version_gte("99999999999999999999999", "1"));
    }

    #[test]
    fn parses_device_models() {
        assert_eq!("M4GR".parse::<DeviceModel>(), Ok(DeviceModel::M4gr));
        assert_eq!(DeviceModel::T4g.to_string(), "T4G");
        assert!("THREE".parse::<DeviceModel>().is_err());
    }

    #[test]
    fn default_table_knows_every_model() {
        let table = CapabilityTable::default();
        assert_eq!(table.key_count("LITE"), 67);
        assert_eq!(table.key_count("ENGINE"), 256);
        assert_eq!(table.key_count("T4G"), 7);
        assert_eq!(table.key_count("PROTOTYPE"), 90);
        assert_eq!(table.key_counts.len(), DeviceModel::iter().count());
    }

    #[test]
    fn capabilities_follow_firmware_gates() {
        let table = CapabilityTable::default();

        let old = table.resolve(Some("2.1.0"), &identity("ONE", "M0"));
        assert_eq!(old, Capabilities::default());

        let m0 = table.resolve(Some("2.2.0-beta.20"), &identity("ONE", "M0"));
        assert_eq!(m0.profile_count, 2);
        assert_eq!(m0.layer_count, 3);

        let s3 = table.resolve(Some("2.2.0"), &identity("LITE", "S3"));
        assert_eq!(
            s3,
            Capabilities {
                key_count: 67,
                layer_count: 4,
                profile_count: 3,
            }
        );

        let unknown = table.resolve(None, &identity("X", "S3"));
        assert_eq!(unknown.profile_count, 1);
        assert_eq!(unknown.layer_count, 3);
        assert_eq!(unknown.key_count, 256);
    }

    #[test]
    fn synthetic_table_loads_from_json() {
        let table: CapabilityTable = serde_json::from_str(
            r#"{
                "key_counts": { "PROTO": 12 },
                "default_key_count": 40,
                "layers": { "min_version": "1.0", "fallback": 1, "limited": 2, "full": 5 }
            }"#,
        )
        .unwrap();

        assert_eq!(table.key_count("PROTO"), 12);
        assert_eq!(table.key_count("ONE"), 40);
        assert_eq!(table.limited_chipsets, vec!["M0"]);

        let caps = table.resolve(Some("1.2"), &identity("PROTO", "S2"));
        assert_eq!(caps.layer_count, 5);
        assert_eq!(caps.profile_count, 1);
    }

    #[test]
    fn handshake_transitions() {
        let table = CapabilityTable::default();

        let state = SessionState::Uninitialized.identified(identity("ONE", "M0"), &table);
        assert_eq!(state, SessionState::Uninitialized);

        let state = SessionState::version_fetched("2.2.0");
        assert_eq!(state.version(), Some("2.2.0"));
        assert!(state.details().is_none());

        let state = state.identified(identity("TWO", "S3"), &table);
        assert!(state.is_initialized());
        let details = state.details().unwrap();
        assert_eq!(details.identity.to_string(), "CHARACHORDER TWO S3");
        assert_eq!(details.capabilities.layer_count, 4);
    }

    #[test]
    fn identity_needs_three_tokens() {
        assert!(DeviceIdentity::from_tokens(&["CHARACHORDER", "ONE"]).is_none());
        let id = DeviceIdentity::from_tokens(&["CHARACHORDER", "LITE", "S2", "extra"]).unwrap();
        assert_eq!(id.model(), Some(DeviceModel::Lite));
    }
}
