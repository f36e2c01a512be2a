//! Setup configuration.
//!
//! A setup fully describes one simulation: blocks with scripts and
//! connections, declared variables, and the RNG seed. Setups are plain
//! serde types, JSON on disk.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Maximum held entities; absent means unlimited.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Script source text. May be empty.
    #[serde(default)]
    pub script: String,
    /// Connector name to target block id.
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// A declared variable with its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VariableConfig {
    Boolean {
        name: String,
        #[serde(default)]
        initial: bool,
    },
    Integer {
        name: String,
        #[serde(default)]
        initial: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSetup {
    pub blocks: Vec<BlockConfig>,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
    /// Seed for `delay lo-hi` draws. Same setup, same seed, same run.
    #[serde(default)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_setup() {
        let json = r#"{
            "blocks": [
                {"id": "src", "script": "delay 2\ngo R to sink", "outputs": {"R": "sink"}},
                {"id": "sink", "capacity": 5}
            ],
            "variables": [
                {"kind": "boolean", "name": "door open", "initial": true},
                {"kind": "integer", "name": "count"}
            ]
        }"#;
        let setup: SimulationSetup = serde_json::from_str(json).unwrap();
        assert_eq!(setup.blocks.len(), 2);
        assert_eq!(setup.seed, 0);
        assert_eq!(setup.blocks[1].capacity, Some(5));
        assert_eq!(
            setup.variables[0],
            VariableConfig::Boolean {
                name: "door open".into(),
                initial: true
            }
        );
        assert_eq!(
            setup.variables[1],
            VariableConfig::Integer {
                name: "count".into(),
                initial: 0
            }
        );
    }
}
