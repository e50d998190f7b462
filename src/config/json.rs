use serde_json::Value;

use crate::config::ir;
use crate::util::error::{OomdError, Result};

/// Front end for the canonical JSON rule-program format:
///
/// ```json
/// { "version": "1.0.0",
///   "rulesets": [
///     { "name": "...",
///       "detectors": [ [ "group-name", [ "plugin", "k=v" ] ] ],
///       "actions":   [ [ "plugin", "k=v" ] ] } ] }
/// ```
pub fn parse(input: &str) -> Result<ir::Root> {
    let json_root: Value = serde_json::from_str(input)?;

    let mut root = ir::Root {
        version: json_root
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        rulesets: Vec::new(),
    };

    if let Some(rulesets) = json_root.get("rulesets").and_then(Value::as_array) {
        for ruleset in rulesets {
            root.rulesets.push(parse_ruleset(ruleset)?);
        }
    }

    Ok(root)
}

fn parse_ruleset(ruleset: &Value) -> Result<ir::Ruleset> {
    let mut ir_ruleset = ir::Ruleset {
        name: ruleset
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        ..Default::default()
    };

    if let Some(detector_groups) = ruleset.get("detectors").and_then(Value::as_array) {
        for dg in detector_groups {
            ir_ruleset.dgs.push(parse_detector_group(dg)?);
        }
    }

    if let Some(actions) = ruleset.get("actions").and_then(Value::as_array) {
        for action in actions {
            ir_ruleset.acts.push(parse_plugin(action)?);
        }
    }

    Ok(ir_ruleset)
}

fn parse_detector_group(detector_group: &Value) -> Result<ir::DetectorGroup> {
    let items = detector_group
        .as_array()
        .ok_or_else(|| OomdError::Config("detector group is not an array".to_string()))?;

    let mut ir_group = ir::DetectorGroup::default();
    for (i, item) in items.iter().enumerate() {
        if i == 0 {
            if let Some(name) = item.as_str() {
                ir_group.name = name.to_string();
                continue;
            }
        }
        ir_group.detectors.push(parse_plugin(item)?);
    }

    Ok(ir_group)
}

fn parse_plugin(plugin: &Value) -> Result<ir::PluginSpec> {
    let items = plugin
        .as_array()
        .ok_or_else(|| OomdError::Config("plugin spec is not an array".to_string()))?;

    let mut spec = ir::PluginSpec::default();
    for (i, item) in items.iter().enumerate() {
        let Some(s) = item.as_str() else {
            continue;
        };

        if i == 0 {
            spec.name = s.to_string();
            continue;
        }

        // All later entries are flat key=value argument strings
        if let Some((key, val)) = s.split_once('=') {
            spec.args.insert(key.to_string(), val.to_string());
        }
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
    {
        "version": "1.0.0",
        "rulesets": [
            {
                "name": "memory pressure protection",
                "detectors": [
                    [
                        "workload is pressured",
                        ["pressure_rising_beyond", "cgroup=workload.slice", "resource=memory", "threshold=80", "duration=60"],
                        ["memory_reclaim", "cgroup=workload.slice", "duration=30"]
                    ],
                    [
                        "system swap depleted",
                        ["swap_free", "threshold_pct=15"]
                    ]
                ],
                "actions": [
                    ["kill_by_memory_size_or_growth", "cgroup=system.slice/*", "post_action_delay=30"]
                ]
            },
            {
                "name": "senpai ruleset",
                "detectors": [
                    ["always", ["exists", "cgroup=workload.slice"]]
                ],
                "actions": [
                    ["senpai", "cgroup=workload.slice", "interval=6"]
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_the_canonical_format() {
        let root = parse(CONFIG).unwrap();
        assert_eq!(root.version, "1.0.0");
        assert_eq!(root.rulesets.len(), 2);

        let first = &root.rulesets[0];
        assert_eq!(first.name, "memory pressure protection");
        assert_eq!(first.dgs.len(), 2);
        assert_eq!(first.dgs[0].name, "workload is pressured");
        assert_eq!(first.dgs[0].detectors.len(), 2);

        let detector = &first.dgs[0].detectors[0];
        assert_eq!(detector.name, "pressure_rising_beyond");
        assert_eq!(detector.args["cgroup"], "workload.slice");
        assert_eq!(detector.args["threshold"], "80");

        assert_eq!(first.acts.len(), 1);
        assert_eq!(first.acts[0].name, "kill_by_memory_size_or_growth");
        assert_eq!(first.acts[0].args["post_action_delay"], "30");

        assert_eq!(root.rulesets[1].acts[0].name, "senpai");
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(parse("{ truncated").is_err());
        assert!(parse(r#"{"rulesets": [{"detectors": ["not-an-array"]}]}"#).is_err());
    }

    #[test]
    fn ir_round_trips_through_to_json() {
        let root = parse(CONFIG).unwrap();
        let rendered = root.to_json().to_string();
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(reparsed.version, root.version);
        assert_eq!(reparsed.rulesets.len(), root.rulesets.len());
        assert_eq!(
            reparsed.rulesets[0].dgs[0].detectors[0].args,
            root.rulesets[0].dgs[0].detectors[0].args
        );
    }
}
