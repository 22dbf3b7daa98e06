//! Provider registry: the ordered candidate providers for each [`Role`].
//!
//! Providers are declared in configuration either as a bare name or as a
//! name with per-device limits:
//!
//! ```toml
//! summarizer = [
//!     "mixtral",                                   # device 0, unlimited
//!     { name = "llama", devices = [2, 2] },        # devices 0 and 1, two leases each
//!     { name = "gpt", devices = ["3:1", "5:4"] },  # device 3 limit 1, device 5 limit 4
//! ]
//! ```
//!
//! An integer device entry takes its device index from its position in the
//! list. A string entry of the form `"index:limit"` names the device index
//! explicitly, which supports non-contiguous device sets. A limit of `0`
//! means unlimited.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceLimit, ProviderSpec, Role};

/// Default device class used to build device names (`"cuda:0"`).
pub const DEFAULT_DEVICE_CLASS: &str = "cuda";

/// A provider declaration as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        devices: Vec<DeviceEntry>,
    },
}

/// One device limit as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceEntry {
    Limit(u32),
    Indexed(String),
}

impl ProviderEntry {
    pub fn name(&self) -> &str {
        match self {
            ProviderEntry::Name(name) => name,
            ProviderEntry::Detailed { name, .. } => name,
        }
    }

    /// Resolve the declaration into a [`ProviderSpec`].
    pub fn to_spec(&self) -> Result<ProviderSpec> {
        let (name, devices) = match self {
            ProviderEntry::Name(name) => (name, &[][..]),
            ProviderEntry::Detailed { name, devices } => (name, devices.as_slice()),
        };
        if name.trim().is_empty() {
            bail!("provider name must not be empty");
        }
        if devices.is_empty() {
            return Ok(ProviderSpec::unlimited(name.clone()));
        }

        let mut device_limits = Vec::with_capacity(devices.len());
        for (position, device) in devices.iter().enumerate() {
            let limit = parse_device(position as u32, device)
                .with_context(|| format!("invalid device entry for provider '{}'", name))?;
            device_limits.push(limit);
        }
        Ok(ProviderSpec {
            name: name.clone(),
            device_limits,
        })
    }
}

fn parse_device(position: u32, entry: &DeviceEntry) -> Result<DeviceLimit> {
    match entry {
        DeviceEntry::Limit(max_concurrent) => Ok(DeviceLimit {
            index: position,
            max_concurrent: *max_concurrent,
        }),
        DeviceEntry::Indexed(raw) => match raw.split_once(':') {
            Some((index, limit)) => Ok(DeviceLimit {
                index: index
                    .trim()
                    .parse()
                    .with_context(|| format!("bad device index in '{}'", raw))?,
                max_concurrent: limit
                    .trim()
                    .parse()
                    .with_context(|| format!("bad device limit in '{}'", raw))?,
            }),
            None => Ok(DeviceLimit {
                index: position,
                max_concurrent: raw
                    .trim()
                    .parse()
                    .with_context(|| format!("bad device limit '{}'", raw))?,
            }),
        },
    }
}

/// Ordered provider candidates per role plus the device class.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    device_class: String,
    roles: BTreeMap<Role, Vec<ProviderSpec>>,
}

impl ProviderRegistry {
    pub fn new(device_class: impl Into<String>) -> Self {
        Self {
            device_class: device_class.into(),
            roles: BTreeMap::new(),
        }
    }

    /// Build a registry from per-role configuration entries.
    pub fn from_entries(
        device_class: &str,
        entries: &BTreeMap<Role, Vec<ProviderEntry>>,
    ) -> Result<Self> {
        let mut registry = Self::new(device_class);
        for (role, list) in entries {
            for entry in list {
                let spec = entry
                    .to_spec()
                    .with_context(|| format!("in {} providers", role))?;
                registry.push(*role, spec);
            }
        }
        Ok(registry)
    }

    /// Append a candidate for `role`, after the existing ones.
    pub fn push(&mut self, role: Role, spec: ProviderSpec) -> &mut Self {
        self.roles.entry(role).or_default().push(spec);
        self
    }

    pub fn candidates(&self, role: Role) -> &[ProviderSpec] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, role: Role, name: &str) -> Option<&ProviderSpec> {
        self.candidates(role).iter().find(|spec| spec.name == name)
    }

    pub fn device_name(&self, index: u32) -> String {
        format!("{}:{}", self.device_class, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Providers {
        summarizer: Vec<ProviderEntry>,
    }

    fn parse(json: &str) -> Vec<ProviderSpec> {
        let providers: Providers = serde_json::from_str(json).unwrap();
        providers
            .summarizer
            .iter()
            .map(|e| e.to_spec().unwrap())
            .collect()
    }

    #[test]
    fn test_bare_name_is_unlimited_on_device_zero() {
        let specs = parse(r#"{"summarizer": ["mixtral"]}"#);
        assert_eq!(specs, vec![ProviderSpec::unlimited("mixtral")]);
    }

    #[test]
    fn test_positional_limits() {
        let specs = parse(r#"{"summarizer": [{"name": "llama", "devices": [2, 0]}]}"#);
        assert_eq!(
            specs[0].device_limits,
            vec![
                DeviceLimit {
                    index: 0,
                    max_concurrent: 2
                },
                DeviceLimit {
                    index: 1,
                    max_concurrent: 0
                },
            ]
        );
        assert!(!specs[0].device_limits[1].is_limited());
    }

    #[test]
    fn test_indexed_limits() {
        let specs = parse(r#"{"summarizer": [{"name": "gpt", "devices": ["3:1", "5:4", "7"]}]}"#);
        assert_eq!(
            specs[0].device_limits,
            vec![
                DeviceLimit {
                    index: 3,
                    max_concurrent: 1
                },
                DeviceLimit {
                    index: 5,
                    max_concurrent: 4
                },
                DeviceLimit {
                    index: 2,
                    max_concurrent: 7
                },
            ]
        );
    }

    #[test]
    fn test_bad_device_entry() {
        let entry = ProviderEntry::Detailed {
            name: "x".into(),
            devices: vec![DeviceEntry::Indexed("a:b".into())],
        };
        assert!(entry.to_spec().is_err());
    }

    #[test]
    fn test_registry_order_and_device_names() {
        let mut entries = BTreeMap::new();
        entries.insert(
            Role::Summarizer,
            vec![
                ProviderEntry::Name("a".into()),
                ProviderEntry::Name("b".into()),
            ],
        );
        let registry = ProviderRegistry::from_entries("rocm", &entries).unwrap();
        let names: Vec<_> = registry
            .candidates(Role::Summarizer)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(registry.candidates(Role::Encoder).is_empty());
        assert!(registry.find(Role::Summarizer, "b").is_some());
        assert_eq!(registry.device_name(2), "rocm:2");
    }
}
