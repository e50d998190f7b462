use serde_json::{json, Value};

use crate::engine::types::PluginArgs;

/// Parser-independent intermediate representation of a rule program.
/// Whatever front end produced it, the compiler only ever sees this.
#[derive(Debug, Default, Clone)]
pub struct PluginSpec {
    pub name: String,
    pub args: PluginArgs,
}

#[derive(Debug, Default, Clone)]
pub struct DetectorGroup {
    pub name: String,
    pub detectors: Vec<PluginSpec>,
}

#[derive(Debug, Default, Clone)]
pub struct Ruleset {
    pub name: String,
    pub dgs: Vec<DetectorGroup>,
    pub acts: Vec<PluginSpec>,
}

#[derive(Debug, Default, Clone)]
pub struct Root {
    pub version: String,
    pub rulesets: Vec<Ruleset>,
}

fn plugin_to_json(plugin: &PluginSpec) -> Value {
    let mut arr = vec![json!(plugin.name)];
    let mut keys: Vec<&String> = plugin.args.keys().collect();
    keys.sort();
    for key in keys {
        arr.push(json!(format!("{}={}", key, plugin.args[key])));
    }
    Value::Array(arr)
}

impl Root {
    /// Renders the IR back into the canonical JSON config format.
    pub fn to_json(&self) -> Value {
        json!({
            "version": self.version,
            "rulesets": self.rulesets.iter().map(|ruleset| {
                json!({
                    "name": ruleset.name,
                    "detectors": ruleset.dgs.iter().map(|dg| {
                        let mut arr = vec![json!(dg.name)];
                        arr.extend(dg.detectors.iter().map(plugin_to_json));
                        Value::Array(arr)
                    }).collect::<Vec<_>>(),
                    "actions": ruleset.acts.iter().map(plugin_to_json).collect::<Vec<_>>(),
                })
            }).collect::<Vec<_>>(),
        })
    }
}
