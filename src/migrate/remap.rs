//! Top-level id -> index remapping.
//!
//! glTF 1.0 keeps every top-level collection as a string-keyed map; 2.0 uses
//! index-ordered arrays. The conversion runs in two passes: one pass builds a
//! mapping table (collection -> old key -> new index, in first-seen key
//! order), then a second pass rewrites every known reference site from the
//! old key to the new index. Keeping the rewrite in one place is what makes
//! the referential-integrity guarantee checkable.

use crate::document::{for_each_in, get_str, Document};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Every top-level collection subject to the conversion.
const COLLECTIONS: [&str; 16] = [
    "accessors",
    "animations",
    "buffers",
    "bufferViews",
    "cameras",
    "images",
    "materials",
    "meshes",
    "nodes",
    "programs",
    "samplers",
    "scenes",
    "shaders",
    "skins",
    "textures",
    "techniques",
];

#[derive(Default)]
struct Mapping {
    tables: HashMap<&'static str, HashMap<String, usize>>,
}

impl Mapping {
    fn index_of(&self, collection: &str, key: &str) -> Option<usize> {
        self.tables.get(collection)?.get(key).copied()
    }

    /// Rewrite a single reference field from string key to index. A key that
    /// resolves to nothing is dropped rather than left dangling.
    fn remap_field(&self, node: &mut Value, field: &str, collection: &'static str) {
        let Some(map) = node.as_object_mut() else {
            return;
        };
        let Some(key) = map.get(field).and_then(Value::as_str) else {
            return;
        };
        match self.index_of(collection, key) {
            Some(index) => {
                map.insert(field.to_string(), json!(index));
            }
            None => {
                map.remove(field);
            }
        }
    }

    /// Rewrite an array of reference keys in place.
    fn remap_list(&self, node: &mut Value, field: &str, collection: &'static str) {
        let Some(list) = node.get_mut(field).and_then(Value::as_array_mut) else {
            return;
        };
        for entry in list.iter_mut() {
            if let Some(key) = entry.as_str() {
                if let Some(index) = self.index_of(collection, key) {
                    *entry = json!(index);
                }
            }
        }
        list.retain(|entry| !entry.is_string());
    }
}

/// Convert a string-keyed collection into an array, recording old key -> new
/// index in first-insertion order and synthesizing `name` from the old key.
fn object_to_array(entries: Map<String, Value>, table: &mut HashMap<String, usize>) -> Vec<Value> {
    let mut array = Vec::with_capacity(entries.len());
    for (key, mut value) in entries {
        table.insert(key.clone(), array.len());
        if let Some(map) = value.as_object_mut() {
            if !map.contains_key("name") {
                map.insert("name".to_string(), Value::String(key));
            }
        }
        array.push(value);
    }
    array
}

pub(crate) fn objects_to_arrays(document: &mut Document) {
    let root = &mut document.root;
    let mut mapping = Mapping::default();

    // jointName -> node key, resolved to indices once nodes are converted
    let mut joint_name_to_key = HashMap::new();
    if let Some(nodes) = root.get("nodes").and_then(Value::as_object) {
        for (key, node) in nodes {
            if let Some(joint) = get_str(node, "jointName") {
                joint_name_to_key.insert(joint.to_string(), key.clone());
            }
        }
    }

    // Pass one: convert the collections and build the mapping table.
    for collection in COLLECTIONS {
        let Some(slot) = root.get_mut(collection) else {
            continue;
        };
        if let Value::Object(entries) = slot {
            let entries = std::mem::take(entries);
            let mut table = HashMap::new();
            *slot = Value::Array(object_to_array(entries, &mut table));
            mapping.tables.insert(collection, table);
        }
    }

    let joint_name_to_index: HashMap<String, usize> = joint_name_to_key
        .into_iter()
        .filter_map(|(joint, key)| Some((joint, mapping.index_of("nodes", &key)?)))
        .collect();

    // Pass two: rewrite every reference site.
    mapping.remap_field(root, "scene", "scenes");
    for_each_in(root, "bufferViews", |view| {
        mapping.remap_field(view, "buffer", "buffers");
    });
    for_each_in(root, "accessors", |accessor| {
        mapping.remap_field(accessor, "bufferView", "bufferViews");
    });
    for_each_in(root, "shaders", |shader| {
        flatten_binary_gltf_extension(shader, &mapping, false);
    });
    for_each_in(root, "programs", |program| {
        mapping.remap_field(program, "vertexShader", "shaders");
        mapping.remap_field(program, "fragmentShader", "shaders");
    });
    for_each_in(root, "techniques", |technique| {
        mapping.remap_field(technique, "program", "programs");
        for_each_in(technique, "parameters", |parameter| {
            mapping.remap_field(parameter, "node", "nodes");
            texture_value_to_index(parameter, "value", &mapping);
        });
    });
    for_each_in(root, "meshes", |mesh| {
        for_each_in(mesh, "primitives", |primitive| {
            mapping.remap_field(primitive, "indices", "accessors");
            mapping.remap_field(primitive, "material", "materials");
            if let Some(attributes) = primitive
                .get_mut("attributes")
                .and_then(Value::as_object_mut)
            {
                for (_, reference) in attributes.iter_mut() {
                    if let Some(key) = reference.as_str() {
                        if let Some(index) = mapping.index_of("accessors", key) {
                            *reference = json!(index);
                        }
                    }
                }
            }
        });
    });
    remap_nodes(root, &mapping);
    for_each_in(root, "skins", |skin| {
        mapping.remap_field(skin, "inverseBindMatrices", "accessors");
        let Some(joint_names) = skin.as_object_mut().and_then(|map| map.remove("jointNames"))
        else {
            return;
        };
        if let Some(joint_names) = joint_names.as_array() {
            let joints: Vec<Value> = joint_names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|joint| joint_name_to_index.get(joint))
                .map(|index| json!(index))
                .collect();
            skin["joints"] = Value::Array(joints);
        }
    });
    for_each_in(root, "scenes", |scene| {
        mapping.remap_list(scene, "nodes", "nodes");
    });
    for_each_in(root, "animations", |animation| {
        remap_animation(animation, &mapping);
    });
    for_each_in(root, "materials", |material| {
        mapping.remap_field(material, "technique", "techniques");
        remap_material_values(material, &mapping);
        if let Some(common) = material
            .get_mut("extensions")
            .and_then(|extensions| extensions.get_mut("KHR_materials_common"))
        {
            remap_material_values(common, &mapping);
        }
    });
    for_each_in(root, "images", |image| {
        flatten_binary_gltf_extension(image, &mapping, true);
        if let Some(compressed) = image
            .get_mut("extras")
            .and_then(|extras| extras.get_mut("compressedImage3DTiles"))
            .and_then(Value::as_object_mut)
        {
            for (_, variant) in compressed.iter_mut() {
                flatten_binary_gltf_extension(variant, &mapping, true);
            }
        }
    });
    for_each_in(root, "textures", |texture| {
        mapping.remap_field(texture, "sampler", "samplers");
        mapping.remap_field(texture, "source", "images");
    });
}

/// Shaders and images embedded as binary glTF carry a `KHR_binary_glTF`
/// extension holding the buffer view (and MIME type for images); flatten it
/// onto the object and drop an emptied `extensions`.
fn flatten_binary_gltf_extension(object: &mut Value, mapping: &Mapping, with_mime_type: bool) {
    let Some(extensions) = object.get_mut("extensions").and_then(Value::as_object_mut) else {
        return;
    };
    if let Some(binary) = extensions.remove("KHR_binary_glTF") {
        let now_empty = extensions.is_empty();
        let map = object.as_object_mut().expect("object with extensions");
        if let Some(key) = binary.get("bufferView").and_then(Value::as_str) {
            if let Some(index) = mapping.index_of("bufferViews", key) {
                map.insert("bufferView".to_string(), json!(index));
            }
        }
        if with_mime_type {
            if let Some(mime_type) = binary.get("mimeType") {
                map.insert("mimeType".to_string(), mime_type.clone());
            }
        }
        if now_empty {
            map.remove("extensions");
        }
    } else if extensions.is_empty() {
        object
            .as_object_mut()
            .expect("object with extensions")
            .remove("extensions");
    }
}

/// Legacy string material/technique values name a texture directly; 2.0
/// expects `{ "index": <texture> }`.
fn texture_value_to_index(object: &mut Value, field: &str, mapping: &Mapping) {
    let Some(map) = object.as_object_mut() else {
        return;
    };
    let Some(key) = map.get(field).and_then(Value::as_str) else {
        return;
    };
    if let Some(index) = mapping.index_of("textures", key) {
        map.insert(field.to_string(), json!({ "index": index }));
    }
}

fn remap_material_values(material: &mut Value, mapping: &Mapping) {
    let Some(values) = material.get_mut("values").and_then(Value::as_object_mut) else {
        return;
    };
    for (_, value) in values.iter_mut() {
        if let Some(key) = value.as_str() {
            if let Some(index) = mapping.index_of("textures", key) {
                *value = json!({ "index": index });
            }
        }
    }
}

fn remap_animation(animation: &mut Value, mapping: &Mapping) {
    // animation.samplers is its own string-keyed map with a local index space
    let mut sampler_table = HashMap::new();
    if let Some(slot) = animation.get_mut("samplers") {
        if let Value::Object(entries) = slot {
            let entries = std::mem::take(entries);
            *slot = Value::Array(object_to_array(entries, &mut sampler_table));
        }
    }
    for_each_in(animation, "samplers", |sampler| {
        mapping.remap_field(sampler, "input", "accessors");
        mapping.remap_field(sampler, "output", "accessors");
    });
    for_each_in(animation, "channels", |channel| {
        if let Some(map) = channel.as_object_mut() {
            if let Some(key) = map.get("sampler").and_then(Value::as_str) {
                if let Some(index) = sampler_table.get(key) {
                    map.insert("sampler".to_string(), json!(index));
                }
            }
        }
        let Some(target) = channel.get_mut("target") else {
            return;
        };
        if let Some(map) = target.as_object_mut() {
            if let Some(id) = map.remove("id") {
                if let Some(index) = id.as_str().and_then(|key| mapping.index_of("nodes", key)) {
                    map.insert("node".to_string(), json!(index));
                }
            }
        }
    });
}

/// Rewrite node references and split legacy multi-mesh nodes: the first mesh
/// stays on the node, every additional mesh becomes a new child node holding
/// exactly that mesh.
fn remap_nodes(root: &mut Value, mapping: &Mapping) {
    let mut nodes = match root.get_mut("nodes") {
        Some(Value::Array(nodes)) => std::mem::take(nodes),
        _ => return,
    };
    let mut skeleton_assignments = Vec::new();

    for index in 0..nodes.len() {
        mapping.remap_list(&mut nodes[index], "children", "nodes");
        mapping.remap_field(&mut nodes[index], "camera", "cameras");
        mapping.remap_field(&mut nodes[index], "skin", "skins");

        let legacy_meshes = nodes[index]
            .as_object_mut()
            .and_then(|map| map.remove("meshes"))
            .and_then(|meshes| meshes.as_array().cloned());
        if let Some(legacy_meshes) = legacy_meshes {
            let mesh_indices: Vec<usize> = legacy_meshes
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|key| mapping.index_of("meshes", key))
                .collect();
            if let Some((first, rest)) = mesh_indices.split_first() {
                nodes[index]["mesh"] = json!(first);
                let mut new_children = Vec::new();
                for mesh in rest {
                    new_children.push(json!(nodes.len()));
                    nodes.push(json!({ "mesh": mesh }));
                }
                if !new_children.is_empty() {
                    let children = nodes[index]
                        .as_object_mut()
                        .expect("node is an object")
                        .entry("children")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Some(children) = children.as_array_mut() {
                        children.extend(new_children);
                    }
                }
            }
        }

        let skeletons = nodes[index]
            .as_object_mut()
            .and_then(|map| map.remove("skeletons"));
        if let Some(skeletons) = skeletons.as_ref().and_then(Value::as_array) {
            let skin = nodes[index].get("skin").and_then(Value::as_u64);
            if let (Some(first), Some(skin)) = (skeletons.first().and_then(Value::as_str), skin) {
                if let Some(skeleton) = mapping.index_of("nodes", first) {
                    skeleton_assignments.push((skin as usize, skeleton));
                }
            }
        }

        if let Some(map) = nodes[index].as_object_mut() {
            map.remove("jointName");
        }
    }

    root["nodes"] = Value::Array(nodes);
    for (skin, skeleton) in skeleton_assignments {
        if let Some(skin) = root
            .get_mut("skins")
            .and_then(|skins| skins.get_mut(skin))
        {
            skin["skeleton"] = json!(skeleton);
        }
    }
}
