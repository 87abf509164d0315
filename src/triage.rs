//! Client-side triage metadata: a flat key/value snapshot of host identity.
//!
//! Produced either by [`collect`] (reading platform identity locally) or by
//! [`load`] (a JSON object on disk); both feed the transfer client the same
//! way.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Flat mapping of string keys to scalar values attached to one dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriageMetadata(pub BTreeMap<String, Value>);

impl TriageMetadata {
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), Value::String(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Snapshot the host's platform identity.
///
/// The base keys (architecture, processor, hostname, OS) are populated on
/// every platform, from portable sources first and refined by uname where
/// one exists. Distribution keys are populated only on Linux and only when
/// `/etc/os-release` is present; missing values stay absent, never filled
/// with placeholders.
pub fn collect() -> TriageMetadata {
    let mut props = TriageMetadata::default();
    props.set("CLIENT_ARCHITECTURE", std::env::consts::ARCH);
    props.set("CLIENT_OS", std::env::consts::OS);
    if let Some(name) = first_env(&["COMPUTERNAME", "HOSTNAME"]) {
        props.set("CLIENT_NAME", name);
    }
    if let Some(processor) = first_env(&["PROCESSOR_IDENTIFIER"]) {
        props.set("CLIENT_PROCESSOR", processor);
    } else {
        props.set("CLIENT_PROCESSOR", std::env::consts::ARCH);
    }

    #[cfg(unix)]
    if let Ok(uts) = nix::sys::utsname::uname() {
        props.set("CLIENT_ARCHITECTURE", uts.machine().to_string_lossy());
        props.set("CLIENT_PROCESSOR", uts.machine().to_string_lossy());
        props.set("CLIENT_NAME", uts.nodename().to_string_lossy());
        props.set("CLIENT_OS", uts.sysname().to_string_lossy());
        props.set("CLIENT_RELEASE", uts.release().to_string_lossy());
        props.set("CLIENT_VERSION", uts.version().to_string_lossy());
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(model) = std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|s| cpu_model(&s))
        {
            props.set("CLIENT_PROCESSOR", model);
        }
        if let Ok(contents) = std::fs::read_to_string("/etc/os-release") {
            if let Some(name) = os_release_field(&contents, "NAME") {
                props.set("CLIENT_DISTRO", name);
            }
            if let Some(version) = os_release_field(&contents, "VERSION_ID") {
                props.set("CLIENT_DISTRO_VER", version);
            }
            if let Some(id) = os_release_field(&contents, "ID") {
                props.set("CLIENT_DISTRO_ID", id);
            }
        }
    }

    props
}

/// Load a triage document from a JSON file on disk.
pub fn load(path: &Path) -> Result<TriageMetadata> {
    let file = std::fs::File::open(path)?;
    serde_json::from_reader(file).map_err(|e| {
        Error::InvalidArguments(format!("triage file '{}': {}", path.display(), e))
    })
}

/// The distribution id from `/etc/os-release`, if determinable.
pub fn host_distro_id() -> Option<String> {
    let contents = std::fs::read_to_string("/etc/os-release").ok()?;
    os_release_field(&contents, "ID")
}

/// First non-empty value among the named environment variables.
fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Look up one `KEY=value` field, stripping optional quoting.
fn os_release_field(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        if k != key {
            return None;
        }
        Some(v.trim().trim_matches('"').to_string())
    })
}

#[cfg(target_os = "linux")]
fn cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        if k.trim() != "model name" {
            return None;
        }
        Some(v.trim().to_string())
    })
}
