//! The in-memory glTF document and its transient pipeline state.
//!
//! A [`Document`] pairs the untyped JSON tree with an out-of-band map of
//! per-node working state ([`PipelineExtras`]). The tree stays untyped because
//! schema revisions before 2.0 use string-keyed collections and carry nodes
//! (techniques, programs, shaders) that no longer exist in the current schema.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Key under `extras` where a node's pipeline tag is stored.
const PIPELINE_TAG: &str = "_pipeline";

/// Object keys whose contents are not addressable glTF nodes and must not be
/// tagged (primitive attribute maps, morph targets, extension payloads).
const TAG_EXCEPTIONS: [&str; 4] = ["attributes", "targets", "extensions", "extras"];

/// Transient per-node working state. Not part of the persisted schema; it is
/// attached after parse, consulted throughout the pipeline, and stripped
/// before the final document is returned or serialized.
#[derive(Debug, Default)]
pub struct PipelineExtras {
    /// Raw byte source of a buffer, image, or shader.
    pub source: Option<Vec<u8>>,
    /// Output path hint for separate-file writes.
    pub relative_path: Option<String>,
    /// Cached decoded image, if an upstream stage decoded it.
    pub decoded_image: Option<image::DynamicImage>,
    /// Whether the decoded image differs from `source` and must be re-encoded.
    pub image_changed: bool,
    /// A non-object user `extras` value displaced by the tag; put back when
    /// pipeline state is stripped.
    user_extras: Option<Value>,
}

/// Out-of-band store of pipeline extras, keyed by a per-node id.
///
/// The id is written into the node under `extras._pipeline` so it travels
/// with the node through id->index remapping and buffer-view compaction; the
/// payload itself never enters the JSON tree, so stripping cannot leak raw
/// bytes into the persisted output.
#[derive(Debug, Default)]
pub struct ExtrasMap {
    entries: HashMap<u64, PipelineExtras>,
    next_id: u64,
}

impl ExtrasMap {
    /// Read a node's pipeline tag, if it has one.
    pub fn tag_of(node: &Value) -> Option<u64> {
        node.get("extras")?.get(PIPELINE_TAG)?.as_u64()
    }

    /// Tag a node and create its entry if it does not already have one.
    pub fn attach(&mut self, node: &mut Value) -> u64 {
        if let Some(id) = Self::tag_of(node) {
            self.entries.entry(id).or_default();
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        let mut entry = PipelineExtras::default();
        let slot = node
            .as_object_mut()
            .expect("pipeline extras can only be attached to objects")
            .entry("extras")
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            // extras may legally be any JSON value; displace it so the tag
            // has an object to live in, and restore it on strip
            entry.user_extras = Some(slot.take());
            *slot = Value::Object(Map::new());
        }
        slot.as_object_mut()
            .expect("just ensured an object")
            .insert(PIPELINE_TAG.to_string(), Value::from(id));
        self.entries.insert(id, entry);
        id
    }

    /// Get a node's pipeline extras.
    pub fn get(&self, node: &Value) -> Option<&PipelineExtras> {
        self.entries.get(&Self::tag_of(node)?)
    }

    /// Get a node's pipeline extras mutably.
    pub fn get_mut(&mut self, node: &Value) -> Option<&mut PipelineExtras> {
        self.entries.get_mut(&Self::tag_of(node)?)
    }

    /// Tag the node if needed and return its entry mutably.
    pub fn entry(&mut self, node: &mut Value) -> &mut PipelineExtras {
        let id = self.attach(node);
        self.entries.get_mut(&id).expect("entry just attached")
    }

    /// Get an entry directly by tag.
    pub(crate) fn by_tag_mut(&mut self, tag: u64) -> Option<&mut PipelineExtras> {
        self.entries.get_mut(&tag)
    }

    /// Raw byte source attached to a node, if any.
    pub fn source_of(&self, node: &Value) -> Option<&[u8]> {
        self.get(node)?.source.as_deref()
    }

    /// Attach raw bytes to a node, tagging it if needed.
    pub fn set_source(&mut self, node: &mut Value, bytes: Vec<u8>) {
        self.entry(node).source = Some(bytes);
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any node is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A glTF document: the JSON tree plus the transient pipeline side-channel.
#[derive(Debug, Default)]
pub struct Document {
    /// The glTF JSON tree (any supported schema revision).
    pub root: Value,
    /// Transient per-node pipeline state.
    pub extras: ExtrasMap,
}

impl Document {
    /// Wrap a parsed glTF JSON tree.
    pub fn new(root: Value) -> Self {
        Self {
            root,
            extras: ExtrasMap::default(),
        }
    }

    /// Tag every addressable node of the tree with a pipeline entry.
    pub fn add_pipeline_extras(&mut self) {
        let mut root = std::mem::take(&mut self.root);
        attach_recursive(&mut root, &mut self.extras);
        self.root = root;
    }

    /// Remove every pipeline tag from the tree and drop all entries.
    ///
    /// An `extras` object emptied by the removal is deleted as well, so a
    /// node that only ever held pipeline state serializes without `extras`.
    /// Non-object user `extras` displaced when the tag was attached are put
    /// back in place.
    pub fn remove_pipeline_extras(&mut self) {
        let mut root = std::mem::take(&mut self.root);
        strip_recursive(&mut root, &mut self.extras);
        self.root = root;
        self.extras.clear();
    }

    /// Consume the document, stripping pipeline state, and return the tree.
    pub fn into_root(mut self) -> Value {
        self.remove_pipeline_extras();
        self.root
    }
}

fn attach_recursive(value: &mut Value, extras: &mut ExtrasMap) {
    match value {
        Value::Array(items) => {
            for item in items {
                attach_recursive(item, extras);
            }
        }
        Value::Object(_) => {
            extras.attach(value);
            let map = value.as_object_mut().expect("checked object");
            for (key, child) in map.iter_mut() {
                if !TAG_EXCEPTIONS.contains(&key.as_str()) {
                    attach_recursive(child, extras);
                }
            }
        }
        _ => {}
    }
}

fn strip_recursive(value: &mut Value, extras: &mut ExtrasMap) {
    match value {
        Value::Array(items) => {
            for item in items {
                strip_recursive(item, extras);
            }
        }
        Value::Object(_) => {
            let displaced = ExtrasMap::tag_of(value)
                .and_then(|tag| extras.by_tag_mut(tag))
                .and_then(|entry| entry.user_extras.take());
            let map = value.as_object_mut().expect("checked object");
            if let Some(original) = displaced {
                map.insert("extras".to_string(), original);
            } else {
                let mut drop_extras = false;
                if let Some(extras) = map.get_mut("extras").and_then(Value::as_object_mut) {
                    extras.remove(PIPELINE_TAG);
                    drop_extras = extras.is_empty();
                }
                if drop_extras {
                    map.remove("extras");
                }
            }
            for (_, child) in map.iter_mut() {
                strip_recursive(child, extras);
            }
        }
        _ => {}
    }
}

/// Iterate the values of a named collection on `parent`, which may still be a
/// string-keyed map (glTF 1.0 and earlier) or an array (glTF 2.0).
pub fn for_each_in(parent: &mut Value, key: &str, mut f: impl FnMut(&mut Value)) {
    match parent.get_mut(key) {
        Some(Value::Object(map)) => {
            for (_, item) in map.iter_mut() {
                f(item);
            }
        }
        Some(Value::Array(items)) => {
            for item in items.iter_mut() {
                f(item);
            }
        }
        _ => {}
    }
}

/// Look up an entry of a collection by reference value: a string key into a
/// map (legacy) or a numeric index into an array (2.0).
pub fn lookup<'a>(collection: &'a Value, reference: &Value) -> Option<&'a Value> {
    match (collection, reference) {
        (Value::Object(map), Value::String(key)) => map.get(key),
        (Value::Array(items), Value::Number(_)) => items.get(reference.as_u64()? as usize),
        _ => None,
    }
}

/// Read a numeric field as u64, tolerating absence.
pub fn get_u64(node: &Value, key: &str) -> Option<u64> {
    node.get(key)?.as_u64()
}

/// Read a numeric field as f64, tolerating absence.
pub fn get_f64(node: &Value, key: &str) -> Option<f64> {
    node.get(key)?.as_f64()
}

/// Read a string field, tolerating absence.
pub fn get_str<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key)?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attach_tags_every_node() {
        let mut doc = Document::new(json!({
            "asset": { "version": "2.0" },
            "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ]
        }));
        doc.add_pipeline_extras();

        assert!(ExtrasMap::tag_of(&doc.root).is_some());
        assert!(ExtrasMap::tag_of(&doc.root["asset"]).is_some());
        assert!(ExtrasMap::tag_of(&doc.root["meshes"][0]["primitives"][0]).is_some());
    }

    #[test]
    fn test_attach_skips_exception_keys() {
        let mut doc = Document::new(json!({
            "meshes": [ { "primitives": [ { "attributes": { "POSITION": {} } } ] } ],
            "extensions": { "KHR_binary_glTF": {} }
        }));
        doc.add_pipeline_extras();

        let attrs = &doc.root["meshes"][0]["primitives"][0]["attributes"];
        assert!(ExtrasMap::tag_of(&attrs["POSITION"]).is_none());
        assert!(ExtrasMap::tag_of(&doc.root["extensions"]["KHR_binary_glTF"]).is_none());
    }

    #[test]
    fn test_strip_removes_all_tags() {
        let mut doc = Document::new(json!({
            "asset": { "version": "2.0" },
            "buffers": [ { "byteLength": 4 } ]
        }));
        doc.add_pipeline_extras();
        let mut buffer = doc.root["buffers"][0].clone();
        doc.extras.set_source(&mut buffer, vec![1, 2, 3, 4]);
        doc.root["buffers"][0] = buffer;

        doc.remove_pipeline_extras();
        assert!(doc.extras.is_empty());
        let text = serde_json::to_string(&doc.root).unwrap();
        assert!(!text.contains("_pipeline"));
        // extras objects that only held the tag are gone entirely
        assert!(doc.root["buffers"][0].get("extras").is_none());
    }

    #[test]
    fn test_strip_preserves_user_extras() {
        let mut doc = Document::new(json!({
            "nodes": [ { "extras": { "author": "test" } } ]
        }));
        doc.add_pipeline_extras();
        doc.remove_pipeline_extras();
        assert_eq!(doc.root["nodes"][0]["extras"]["author"], "test");
    }

    #[test]
    fn test_attach_wraps_non_object_extras() {
        let mut doc = Document::new(json!({
            "buffers": [ { "byteLength": 4, "extras": "user note" } ]
        }));
        doc.add_pipeline_extras();

        let mut buffer = doc.root["buffers"][0].clone();
        doc.extras.set_source(&mut buffer, vec![1, 2, 3, 4]);
        doc.root["buffers"][0] = buffer;
        assert_eq!(
            doc.extras.source_of(&doc.root["buffers"][0]),
            Some(&[1u8, 2, 3, 4][..])
        );

        doc.remove_pipeline_extras();
        assert_eq!(doc.root["buffers"][0]["extras"], "user note");
        let text = serde_json::to_string(&doc.root).unwrap();
        assert!(!text.contains("_pipeline"));
    }

    #[test]
    fn test_source_round_trip() {
        let mut node = json!({});
        let mut extras = ExtrasMap::default();
        extras.set_source(&mut node, vec![9, 8, 7]);
        assert_eq!(extras.source_of(&node), Some(&[9u8, 8, 7][..]));
    }

    #[test]
    fn test_for_each_in_handles_maps_and_arrays() {
        let mut legacy = json!({ "materials": { "mat0": {"a": 1}, "mat1": {"a": 2} } });
        let mut seen = 0;
        for_each_in(&mut legacy, "materials", |_| seen += 1);
        assert_eq!(seen, 2);

        let mut current = json!({ "materials": [ {"a": 1} ] });
        seen = 0;
        for_each_in(&mut current, "materials", |_| seen += 1);
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_lookup_by_key_and_index() {
        let map = json!({ "buf": { "byteLength": 8 } });
        assert_eq!(lookup(&map, &json!("buf")).unwrap()["byteLength"], 8);
        let arr = json!([ { "byteLength": 8 } ]);
        assert_eq!(lookup(&arr, &json!(0)).unwrap()["byteLength"], 8);
        assert!(lookup(&arr, &json!("buf")).is_none());
    }
}
