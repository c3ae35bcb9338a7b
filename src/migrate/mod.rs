//! Schema version migration.
//!
//! Walks a document from its declared schema revision up to glTF 2.0 (or a
//! caller-specified target), one revision at a time. Each transition is an
//! ordered, idempotent sequence of rewrites that ends by advancing
//! `asset.version`. Migration is best-effort normalization: unrecognized
//! version strings degrade to "1.0" and never abort the pipeline.

mod remap;
mod v08;
mod v10;

use crate::document::Document;
use serde_json::{json, Map, Value};

/// Options controlling the migration state machine.
#[derive(Debug, Default, Clone)]
pub struct MigrationOptions {
    /// Stop upgrading once this version is reached (e.g. "1.0").
    pub target_version: Option<String>,
}

/// Schema revisions with a defined upgrade transition.
const UPGRADABLE: [&str; 2] = ["0.8", "1.0"];
const KNOWN: [&str; 3] = ["0.8", "1.0", "2.0"];

/// Upgrade the document's schema version until the terminal revision (2.0)
/// or the caller's target version is reached.
pub fn update_version(document: &mut Document, options: &MigrationOptions) {
    ensure_asset(&mut document.root);
    let mut version = detect_version(&document.root);
    while UPGRADABLE.contains(&version.as_str()) {
        if Some(version.as_str()) == options.target_version.as_deref() {
            break;
        }
        match version.as_str() {
            "0.8" => v08::upgrade(document),
            "1.0" => v10::upgrade(document),
            _ => unreachable!(),
        }
        version = detect_version(&document.root);
    }
}

fn ensure_asset(root: &mut Value) {
    let Some(map) = root.as_object_mut() else {
        return;
    };
    map.entry("asset")
        .or_insert_with(|| json!({ "version": "1.0" }));
}

/// Read the declared schema version. A root-level `version` (0.8 form) wins
/// over `asset.version`. Malformed strings are truncated to three characters
/// ("1.0.1" -> "1.0") and anything still unrecognized degrades to "1.0".
fn detect_version(root: &Value) -> String {
    let declared = root
        .get("version")
        .or_else(|| root.get("asset").and_then(|asset| asset.get("version")));
    let mut version = match declared {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => "1.0".to_string(),
    };
    if !KNOWN.contains(&version.as_str()) {
        version = version.chars().take(3).collect();
        if !KNOWN.contains(&version.as_str()) {
            version = "1.0".to_string();
        }
    }
    version
}

/// Flatten `material.instanceTechnique` onto the material. A 0.8 construct,
/// but it shows up in some 1.0 models too, so both transitions run this.
pub(crate) fn update_instance_techniques(root: &mut Value) {
    crate::document::for_each_in(root, "materials", |material| {
        let Some(instance) = material
            .as_object_mut()
            .and_then(|map| map.remove("instanceTechnique"))
        else {
            return;
        };
        let map = material.as_object_mut().expect("material is an object");
        for key in ["technique", "values"] {
            if let Some(value) = instance.get(key) {
                map.insert(key.to_string(), value.clone());
            }
        }
    });
}

/// Add an extension name to a root-level string list, without duplicates.
pub(crate) fn add_extension_to_list(root: &mut Value, list: &str, extension: &str) {
    let Some(map) = root.as_object_mut() else {
        return;
    };
    let entries = map
        .entry(list)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(entries) = entries.as_array_mut() {
        if !entries.iter().any(|e| e.as_str() == Some(extension)) {
            entries.push(Value::String(extension.to_string()));
        }
    }
}

/// Mark an extension as both used and required.
pub(crate) fn add_extension_required(root: &mut Value, extension: &str) {
    add_extension_to_list(root, "extensionsUsed", extension);
    add_extension_to_list(root, "extensionsRequired", extension);
}

pub(crate) fn ensure_object<'a>(parent: &'a mut Value, key: &str) -> &'a mut Map<String, Value> {
    parent
        .as_object_mut()
        .expect("parent is an object")
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("just ensured an object")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_version_defaults_and_truncation() {
        assert_eq!(detect_version(&json!({})), "1.0");
        assert_eq!(detect_version(&json!({ "asset": { "version": "2.0" } })), "2.0");
        assert_eq!(detect_version(&json!({ "asset": { "version": "1.0.1" } })), "1.0");
        assert_eq!(detect_version(&json!({ "asset": { "version": "banana" } })), "1.0");
        // root-level version (0.8 form) wins, including as a bare number
        assert_eq!(detect_version(&json!({ "version": 0.8 })), "0.8");
        assert_eq!(
            detect_version(&json!({ "version": "0.8", "asset": { "version": "1.0" } })),
            "0.8"
        );
    }

    #[test]
    fn test_update_version_reaches_terminal() {
        let mut document = Document::new(json!({}));
        update_version(&mut document, &MigrationOptions::default());
        assert_eq!(document.root["asset"]["version"], "2.0");
    }

    #[test]
    fn test_update_version_honors_target() {
        let mut document = Document::new(json!({ "version": "0.8" }));
        let options = MigrationOptions {
            target_version: Some("1.0".to_string()),
        };
        update_version(&mut document, &options);
        assert_eq!(document.root["asset"]["version"], "1.0");
    }

    #[test]
    fn test_migration_is_idempotent() {
        let source = json!({
            "asset": { "version": "1.0", "profile": { "api": "WebGL" } },
            "scene": "defaultScene",
            "scenes": { "defaultScene": { "nodes": ["node0"] } },
            "nodes": { "node0": { "meshes": ["mesh0"] } },
            "meshes": {
                "mesh0": {
                    "primitives": [ { "attributes": { "POSITION": "acc0" }, "mode": 4 } ]
                }
            },
            "accessors": {
                "acc0": {
                    "bufferView": "view0", "byteOffset": 0, "componentType": 5126,
                    "type": "VEC3", "count": 1, "min": [0,0,0], "max": [0,0,0]
                }
            },
            "bufferViews": {
                "view0": { "buffer": "buf0", "byteOffset": 0, "byteLength": 12 }
            },
            "buffers": { "buf0": { "byteLength": 12, "type": "arraybuffer" } },
            "extensionsUsed": ["KHR_materials_common"]
        });

        let mut once = Document::new(source.clone());
        update_version(&mut once, &MigrationOptions::default());
        let mut twice = Document::new(once.root.clone());
        update_version(&mut twice, &MigrationOptions::default());
        assert_eq!(once.root, twice.root);
    }

    #[test]
    fn test_migrated_document_parses_as_gltf2() {
        let source = json!({
            "asset": { "version": "1.0" },
            "scene": "defaultScene",
            "scenes": { "defaultScene": { "nodes": ["node0"] } },
            "nodes": { "node0": { "meshes": ["mesh0"] } },
            "meshes": {
                "mesh0": {
                    "primitives": [ { "attributes": { "POSITION": "acc0" }, "mode": 4 } ]
                }
            },
            "accessors": {
                "acc0": {
                    "bufferView": "view0", "byteOffset": 0, "componentType": 5126,
                    "type": "VEC3", "count": 1, "min": [0,0,0], "max": [0,0,0]
                }
            },
            "bufferViews": {
                "view0": { "buffer": "buf0", "byteOffset": 0, "byteLength": 12 }
            },
            "buffers": { "buf0": { "byteLength": 12, "type": "arraybuffer" } }
        });
        let mut document = Document::new(source);
        update_version(&mut document, &MigrationOptions::default());
        let parsed: std::result::Result<gltf_json::Root, _> =
            serde_json::from_value(document.root.clone());
        assert!(parsed.is_ok(), "migrated document is not valid glTF 2.0");
    }

    #[test]
    fn test_instance_technique_flattening() {
        let mut root = json!({
            "materials": {
                "mat0": { "instanceTechnique": { "technique": "tech0", "values": { "u": 1 } } }
            }
        });
        update_instance_techniques(&mut root);
        let material = &root["materials"]["mat0"];
        assert_eq!(material["technique"], "tech0");
        assert_eq!(material["values"]["u"], 1);
        assert!(material.get("instanceTechnique").is_none());
    }

    #[test]
    fn test_add_extension_required_dedups() {
        let mut root = json!({ "extensionsUsed": ["KHR_technique_webgl"] });
        add_extension_required(&mut root, "KHR_technique_webgl");
        add_extension_required(&mut root, "KHR_technique_webgl");
        assert_eq!(root["extensionsUsed"].as_array().unwrap().len(), 1);
        assert_eq!(root["extensionsRequired"].as_array().unwrap().len(), 1);
    }
}
