//! YAML loader with includes and environment expansion
//!
//! - A mapping of the form `{ $include: other.yaml }` is replaced by the
//!   contents of that file, resolved relative to the including file.
//! - `${VAR}` and `${VAR:default}` inside strings expand from the process
//!   environment.
//!
//! Documents are converted to JSON before deserialization so that every
//! config type only needs plain serde derives.

use crate::{OrchestratorError, Result};
use agentgraph_core::GraphDefinition;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_yaml::Value as YamlValue;
use std::path::Path;
use std::sync::LazyLock;

const INCLUDE_KEY: &str = "$include";
const MAX_INCLUDE_DEPTH: usize = 16;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").unwrap());

/// Read a YAML file with includes resolved and variables expanded
pub fn load_yaml_file(path: impl AsRef<Path>) -> Result<YamlValue> {
    load_with_depth(path.as_ref(), 0)
}

fn load_with_depth(path: &Path, depth: usize) -> Result<YamlValue> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(OrchestratorError::Config(format!(
            "include depth exceeded at {:?}",
            path
        )));
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        OrchestratorError::Config(format!("failed to read {:?}: {}", path, e))
    })?;
    let mut value: YamlValue = serde_yaml::from_str(&content).map_err(|e| {
        OrchestratorError::Config(format!("failed to parse {:?}: {}", path, e))
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve(&mut value, base_dir, depth)?;
    Ok(value)
}

fn resolve(value: &mut YamlValue, base_dir: &Path, depth: usize) -> Result<()> {
    match value {
        YamlValue::Mapping(map) => {
            if let Some(YamlValue::String(include)) = map.get(INCLUDE_KEY) {
                let included = load_with_depth(&base_dir.join(include), depth + 1)?;
                *value = included;
                return Ok(());
            }
            for (_, v) in map.iter_mut() {
                resolve(v, base_dir, depth)?;
            }
        }
        YamlValue::Sequence(items) => {
            for item in items.iter_mut() {
                resolve(item, base_dir, depth)?;
            }
        }
        YamlValue::String(s) => {
            if s.contains("${") {
                *s = expand_env(s);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Expand `${VAR:default}` references in a string
pub fn expand_env(s: &str) -> String {
    ENV_VAR
        .replace_all(s, |caps: &regex::Captures| {
            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

/// Load a YAML file and deserialize it through JSON
pub fn load_yaml_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let yaml = load_yaml_file(path)?;
    let json = serde_json::to_value(&yaml)
        .map_err(|e| OrchestratorError::Config(format!("{:?} is not JSON-compatible: {}", path, e)))?;
    serde_json::from_value(json)
        .map_err(|e| OrchestratorError::Config(format!("invalid configuration in {:?}: {}", path, e)))
}

/// Load and validate a graph definition file
pub fn load_graph_file(path: impl AsRef<Path>) -> Result<GraphDefinition> {
    let definition: GraphDefinition = load_yaml_config(path)?;
    definition.validate()?;
    Ok(definition)
}
