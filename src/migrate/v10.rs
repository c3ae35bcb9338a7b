//! The 1.0 -> 2.0 transition.
//!
//! This is the heavyweight step: string-keyed top-level maps become arrays,
//! `byteStride` moves from accessors onto buffer views (splitting views where
//! accessors disagree), missing `byteLength` and accessor bounds are
//! backfilled, and a long tail of schema cleanups runs over techniques,
//! cameras, and primitive attributes.

use super::{add_extension_required, remap, update_instance_techniques};
use crate::accessor::{effective_byte_stride, find_accessor_min_max};
use crate::document::{for_each_in, get_str, get_u64, Document};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const SCISSOR_TEST: u64 = 3089;

/// Extensions that, when used, the asset cannot render without.
const KNOWN_EXTENSIONS: [&str; 3] = [
    "CESIUM_RTC",
    "KHR_materials_common",
    "WEB3D_quantized_attributes",
];

/// Attribute semantics defined by the 2.0 schema; anything else is
/// application-specific and must be underscore-prefixed.
const KNOWN_SEMANTICS: [&str; 7] = [
    "POSITION", "NORMAL", "TANGENT", "TEXCOORD", "COLOR", "JOINT", "WEIGHTS",
];

pub(crate) fn upgrade(document: &mut Document) {
    document.root["asset"]["version"] = json!("2.0");
    // instanceTechnique is a 0.8 construct but shows up in some 1.0 models
    update_instance_techniques(&mut document.root);
    remove_animation_samplers_indirection(&mut document.root);
    remap::objects_to_arrays(document);
    strip_asset(&mut document.root);
    require_known_extensions(&mut document.root);
    require_byte_length(document);
    move_byte_stride_to_buffer_view(&mut document.root);
    require_accessor_min_max(document);
    remove_buffer_type(&mut document.root);
    require_attribute_set_index(&mut document.root);
    underscore_application_specific_semantics(&mut document.root);
    remove_scissor_from_techniques(&mut document.root);
    clamp_technique_function_states(&mut document.root);
    clamp_camera_parameters(&mut document.root);
    strip_technique_attribute_values(&mut document.root);
    strip_technique_parameter_count(&mut document.root);
    add_khr_technique_extension(&mut document.root);
}

/// Animation samplers referenced accessors through an `animation.parameters`
/// indirection table; resolve the references and drop the table.
fn remove_animation_samplers_indirection(root: &mut Value) {
    for_each_in(root, "animations", |animation| {
        let Some(parameters) = animation
            .as_object_mut()
            .and_then(|map| map.remove("parameters"))
        else {
            return;
        };
        for_each_in(animation, "samplers", |sampler| {
            let Some(map) = sampler.as_object_mut() else {
                return;
            };
            for field in ["input", "output"] {
                if let Some(accessor) = map
                    .get(field)
                    .and_then(Value::as_str)
                    .and_then(|key| parameters.get(key))
                {
                    let accessor = accessor.clone();
                    map.insert(field.to_string(), accessor);
                }
            }
        });
    });
}

/// `asset.profile` no longer exists. `premultipliedAlpha` is kept: assets
/// using KHR_technique_webgl still depend on it.
fn strip_asset(root: &mut Value) {
    if let Some(asset) = root.get_mut("asset").and_then(Value::as_object_mut) {
        asset.remove("profile");
    }
}

fn require_known_extensions(root: &mut Value) {
    let used: Vec<String> = root
        .get("extensionsUsed")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| KNOWN_EXTENSIONS.contains(name))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    for extension in used {
        super::add_extension_to_list(root, "extensionsRequired", &extension);
    }
}

/// `buffer.byteLength` and `bufferView.byteLength` are required in 2.0.
/// Buffers are measured from their attached source; views are grown to cover
/// the furthest end of any accessor that reads from them.
fn require_byte_length(document: &mut Document) {
    let Document { root, extras } = document;
    for_each_in(root, "buffers", |buffer| {
        if buffer.get("byteLength").is_none() {
            if let Some(length) = extras.source_of(buffer).map(|source| source.len()) {
                buffer["byteLength"] = json!(length);
            }
        }
    });

    let mut view_ends = Vec::new();
    if let Some(accessors) = root.get("accessors").and_then(Value::as_array) {
        for accessor in accessors {
            let Some(view) = get_u64(accessor, "bufferView") else {
                continue;
            };
            let Some(stride) = effective_byte_stride(root, accessor) else {
                continue;
            };
            let offset = get_u64(accessor, "byteOffset").unwrap_or(0);
            let count = get_u64(accessor, "count").unwrap_or(0);
            view_ends.push((view as usize, offset + count * stride as u64));
        }
    }
    for (index, end) in view_ends {
        let Some(view) = root
            .get_mut("bufferViews")
            .and_then(|views| views.get_mut(index))
        else {
            continue;
        };
        if get_u64(view, "byteLength").unwrap_or(0) < end {
            view["byteLength"] = json!(end);
        }
    }
}

struct Placement {
    accessor: usize,
    offset: u64,
    stride: u64,
    count: u64,
}

/// `byteStride` lives on the buffer view in 2.0, so a view shared by
/// accessors with different strides must be split. Accessors are grouped by
/// stride in byte-offset order; each group gets its own view cloned from the
/// original, covering exactly the group's byte range, and the group's
/// accessors are rebased onto it. Replaced views are then removed and every
/// buffer-view reference in the document is shifted to the compacted indices.
fn move_byte_stride_to_buffer_view(root: &mut Value) {
    let mut by_view: BTreeMap<usize, Vec<Placement>> = BTreeMap::new();
    if let Some(accessors) = root.get("accessors").and_then(Value::as_array) {
        for (index, accessor) in accessors.iter().enumerate() {
            let Some(view) = get_u64(accessor, "bufferView") else {
                continue;
            };
            let Some(stride) = effective_byte_stride(root, accessor) else {
                continue;
            };
            by_view.entry(view as usize).or_default().push(Placement {
                accessor: index,
                offset: get_u64(accessor, "byteOffset").unwrap_or(0),
                stride: stride as u64,
                count: get_u64(accessor, "count").unwrap_or(0),
            });
        }
    }
    if by_view.is_empty() {
        return;
    }

    let mut views = match root.get_mut("bufferViews") {
        Some(Value::Array(views)) => std::mem::take(views),
        _ => return,
    };
    let original_len = views.len();
    let mut replaced = HashSet::new();

    for (view_index, mut placements) in by_view {
        let Some(template) = views.get(view_index).cloned() else {
            continue;
        };
        replaced.insert(view_index);
        placements.sort_by_key(|placement| placement.offset);

        let mut group_start = 0;
        while group_start < placements.len() {
            let stride = placements[group_start].stride;
            let mut group_end = group_start + 1;
            while group_end < placements.len() && placements[group_end].stride == stride {
                group_end += 1;
            }
            let group = &placements[group_start..group_end];
            let start = group[0].offset;
            let end = group
                .iter()
                .map(|placement| placement.offset + placement.count * placement.stride)
                .max()
                .unwrap_or(start);

            let mut view = template.clone();
            let base = get_u64(&view, "byteOffset").unwrap_or(0);
            view["byteOffset"] = json!(base + start);
            view["byteLength"] = json!(end - start);
            view["byteStride"] = json!(stride);
            let new_index = views.len();
            views.push(view);

            for placement in group {
                let accessor = &mut root["accessors"][placement.accessor];
                accessor["bufferView"] = json!(new_index);
                accessor["byteOffset"] = json!(placement.offset - start);
                if let Some(map) = accessor.as_object_mut() {
                    map.remove("byteStride");
                }
            }
            group_start = group_end;
        }
    }

    // Compact: drop the replaced views, keep everything else in order, and
    // record old index -> new index for every surviving view.
    let mut shift = vec![None; views.len()];
    let mut kept = Vec::with_capacity(views.len());
    for (index, view) in views.into_iter().enumerate() {
        if index < original_len && replaced.contains(&index) {
            continue;
        }
        shift[index] = Some(kept.len());
        kept.push(view);
    }
    root["bufferViews"] = Value::Array(kept);

    for_each_in(root, "accessors", |accessor| {
        shift_buffer_view_ref(&shift, accessor);
    });
    for_each_in(root, "shaders", |shader| {
        shift_buffer_view_ref(&shift, shader);
    });
    for_each_in(root, "images", |image| {
        shift_buffer_view_ref(&shift, image);
        if let Some(compressed) = image
            .get_mut("extras")
            .and_then(|extras| extras.get_mut("compressedImage3DTiles"))
            .and_then(Value::as_object_mut)
        {
            for (_, variant) in compressed.iter_mut() {
                shift_buffer_view_ref(&shift, variant);
            }
        }
    });
}

fn shift_buffer_view_ref(shift: &[Option<usize>], object: &mut Value) {
    let Some(map) = object.as_object_mut() else {
        return;
    };
    let Some(old) = map.get("bufferView").and_then(Value::as_u64) else {
        return;
    };
    match shift.get(old as usize).copied().flatten() {
        Some(new) => {
            map.insert("bufferView".to_string(), json!(new));
        }
        None => {
            map.remove("bufferView");
        }
    }
}

/// Backfill `min`/`max` on accessors missing them, scanning the raw data.
/// Accessors whose data is unreachable are left untouched.
fn require_accessor_min_max(document: &mut Document) {
    let Document { root, extras } = document;
    let count = root
        .get("accessors")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    for index in 0..count {
        let accessor = &root["accessors"][index];
        if accessor.get("min").is_some() && accessor.get("max").is_some() {
            continue;
        }
        let Some((min, max)) = find_accessor_min_max(root, extras, accessor) else {
            continue;
        };
        root["accessors"][index]["min"] = json!(min);
        root["accessors"][index]["max"] = json!(max);
    }
}

fn remove_buffer_type(root: &mut Value) {
    for_each_in(root, "buffers", |buffer| {
        if let Some(map) = buffer.as_object_mut() {
            map.remove("type");
        }
    });
}

/// TEXCOORD and COLOR must carry a set index in 2.0 (TEXCOORD_0, COLOR_0),
/// both as primitive attributes and as technique parameter semantics.
fn require_attribute_set_index(root: &mut Value) {
    for_each_in(root, "meshes", |mesh| {
        for_each_in(mesh, "primitives", |primitive| {
            let Some(attributes) = primitive
                .get_mut("attributes")
                .and_then(Value::as_object_mut)
            else {
                return;
            };
            for (bare, indexed) in [("TEXCOORD", "TEXCOORD_0"), ("COLOR", "COLOR_0")] {
                if let Some(accessor) = attributes.remove(bare) {
                    attributes.insert(indexed.to_string(), accessor);
                }
            }
        });
    });
    for_each_in(root, "techniques", |technique| {
        for_each_in(technique, "parameters", |parameter| {
            let renamed = match get_str(parameter, "semantic") {
                Some("TEXCOORD") => "TEXCOORD_0",
                Some("COLOR") => "COLOR_0",
                _ => return,
            };
            parameter["semantic"] = json!(renamed);
        });
    });
}

/// Cut the semantic at its first `_<digit>` occurrence, so `TEXCOORD_0` and
/// `TEXCOORD_0_1` both reduce to `TEXCOORD`.
fn strip_set_index(semantic: &str) -> &str {
    let position = semantic
        .as_bytes()
        .windows(2)
        .position(|pair| pair[0] == b'_' && pair[1].is_ascii_digit());
    match position {
        Some(position) => &semantic[..position],
        None => semantic,
    }
}

/// Prefix application-specific attribute semantics with an underscore, and
/// rename technique parameters that referenced them by semantic.
fn underscore_application_specific_semantics(root: &mut Value) {
    let mut mapped: HashMap<String, String> = HashMap::new();
    for_each_in(root, "meshes", |mesh| {
        for_each_in(mesh, "primitives", |primitive| {
            let Some(attributes) = primitive.get("attributes").and_then(Value::as_object) else {
                return;
            };
            for semantic in attributes.keys() {
                if semantic.starts_with('_') {
                    continue;
                }
                if !KNOWN_SEMANTICS.contains(&strip_set_index(semantic)) {
                    mapped.insert(semantic.clone(), format!("_{semantic}"));
                }
            }
        });
    });
    if mapped.is_empty() {
        return;
    }
    for_each_in(root, "meshes", |mesh| {
        for_each_in(mesh, "primitives", |primitive| {
            let Some(attributes) = primitive
                .get_mut("attributes")
                .and_then(Value::as_object_mut)
            else {
                return;
            };
            for (semantic, underscored) in &mapped {
                if let Some(accessor) = attributes.remove(semantic) {
                    attributes.insert(underscored.clone(), accessor);
                }
            }
        });
    });
    for_each_in(root, "techniques", |technique| {
        for_each_in(technique, "parameters", |parameter| {
            if let Some(underscored) = get_str(parameter, "semantic").and_then(|s| mapped.get(s)) {
                parameter["semantic"] = json!(underscored);
            }
        });
    });
}

/// The scissor render state did not survive into KHR_technique_webgl.
fn remove_scissor_from_techniques(root: &mut Value) {
    for_each_in(root, "techniques", |technique| {
        let Some(states) = technique.get_mut("states") else {
            return;
        };
        if let Some(functions) = states.get_mut("functions").and_then(Value::as_object_mut) {
            functions.remove("scissor");
        }
        if let Some(enabled) = states.get_mut("enable").and_then(Value::as_array_mut) {
            enabled.retain(|state| state.as_u64() != Some(SCISSOR_TEST));
        }
    });
}

fn clamp_technique_function_states(root: &mut Value) {
    for_each_in(root, "techniques", |technique| {
        let Some(functions) = technique
            .get_mut("states")
            .and_then(|states| states.get_mut("functions"))
        else {
            return;
        };
        if let Some(blend_color) = functions
            .get_mut("blendColor")
            .and_then(Value::as_array_mut)
        {
            for component in blend_color.iter_mut() {
                if let Some(value) = component.as_f64() {
                    *component = json!(value.clamp(0.0, 1.0));
                }
            }
        }
        if let Some(depth_range) = functions
            .get_mut("depthRange")
            .and_then(Value::as_array_mut)
        {
            if depth_range.len() == 2 {
                let far = depth_range[1].as_f64().unwrap_or(1.0).clamp(0.0, 1.0);
                let near = depth_range[0].as_f64().unwrap_or(0.0).clamp(0.0, far);
                depth_range[0] = json!(near);
                depth_range[1] = json!(far);
            }
        }
    });
}

/// A zero aspect ratio means "derive from the viewport" and must be absent in
/// 2.0; a zero yfov is invalid and gets a usable default.
fn clamp_camera_parameters(root: &mut Value) {
    for_each_in(root, "cameras", |camera| {
        let Some(perspective) = camera
            .get_mut("perspective")
            .and_then(Value::as_object_mut)
        else {
            return;
        };
        if perspective.get("aspectRatio").and_then(Value::as_f64) == Some(0.0) {
            perspective.remove("aspectRatio");
        }
        if perspective.get("yfov").and_then(Value::as_f64) == Some(0.0) {
            perspective.insert("yfov".to_string(), json!(1.0));
        }
    });
}

/// A technique parameter wired up as a vertex attribute cannot carry a
/// literal value.
fn strip_technique_attribute_values(root: &mut Value) {
    for_each_in(root, "techniques", |technique| {
        let parameter_names: Vec<String> = technique
            .get("attributes")
            .and_then(Value::as_object)
            .map(|attributes| {
                attributes
                    .values()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        for name in parameter_names {
            if let Some(parameter) = technique
                .get_mut("parameters")
                .and_then(|parameters| parameters.get_mut(&name))
                .and_then(Value::as_object_mut)
            {
                parameter.remove("value");
            }
        }
    });
}

/// Only JOINTMATRIX and application-specific parameters may keep `count`.
fn strip_technique_parameter_count(root: &mut Value) {
    for_each_in(root, "techniques", |technique| {
        for_each_in(technique, "parameters", |parameter| {
            let keep = match get_str(parameter, "semantic") {
                Some(semantic) => semantic == "JOINTMATRIX" || semantic.starts_with('_'),
                None => false,
            };
            if !keep {
                if let Some(map) = parameter.as_object_mut() {
                    map.remove("count");
                }
            }
        });
    });
}

fn add_khr_technique_extension(root: &mut Value) {
    let has_techniques = root
        .get("techniques")
        .and_then(Value::as_array)
        .is_some_and(|techniques| !techniques.is_empty());
    if has_techniques {
        add_extension_required(root, "KHR_technique_webgl");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ExtrasMap;

    fn upgraded(root: Value) -> Document {
        let mut document = Document::new(root);
        upgrade(&mut document);
        document
    }

    #[test]
    fn test_byte_stride_split_produces_disjoint_views() {
        // one view, two stride groups: 12-byte VEC3 then 16-byte VEC3
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "buffers": [ { "byteLength": 56 } ],
            "bufferViews": [ { "buffer": 0, "byteOffset": 0, "byteLength": 56 } ],
            "accessors": [
                { "bufferView": 0, "byteOffset": 0, "byteStride": 12,
                  "componentType": 5126, "type": "VEC3", "count": 2 },
                { "bufferView": 0, "byteOffset": 24, "byteStride": 16,
                  "componentType": 5126, "type": "VEC3", "count": 2 }
            ]
        }));
        let root = &document.root;
        let views = root["bufferViews"].as_array().unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0]["byteOffset"], 0);
        assert_eq!(views[0]["byteLength"], 24);
        assert_eq!(views[0]["byteStride"], 12);
        assert_eq!(views[1]["byteOffset"], 24);
        assert_eq!(views[1]["byteLength"], 32);
        assert_eq!(views[1]["byteStride"], 16);
        let accessors = root["accessors"].as_array().unwrap();
        assert_eq!(accessors[0]["bufferView"], 0);
        assert_eq!(accessors[0]["byteOffset"], 0);
        assert_eq!(accessors[1]["bufferView"], 1);
        assert_eq!(accessors[1]["byteOffset"], 0);
        assert!(accessors.iter().all(|a| a.get("byteStride").is_none()));
    }

    #[test]
    fn test_byte_stride_split_keeps_unrelated_view_references() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "buffers": [ { "byteLength": 100 } ],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 48 },
                { "buffer": 0, "byteOffset": 48, "byteLength": 52 }
            ],
            "accessors": [
                { "bufferView": 0, "byteOffset": 0, "byteStride": 12,
                  "componentType": 5126, "type": "VEC3", "count": 4 }
            ],
            "images": [ { "bufferView": 1, "mimeType": "image/png" } ]
        }));
        let root = &document.root;
        // view 0 was replaced, view 1 shifted down, image follows it
        assert_eq!(root["bufferViews"].as_array().unwrap().len(), 2);
        assert_eq!(root["images"][0]["bufferView"], 0);
        assert_eq!(root["bufferViews"][0]["byteOffset"], 48);
        assert_eq!(root["accessors"][0]["bufferView"], 1);
    }

    #[test]
    fn test_accessor_min_max_backfill() {
        let source: Vec<u8> = [0.0f32, 1.0, 2.0, -1.0, 5.0, 0.5]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut root = json!({
            "asset": { "version": "1.0" },
            "buffers": [ { "byteLength": 24 } ],
            "bufferViews": [ { "buffer": 0, "byteOffset": 0, "byteLength": 24 } ],
            "accessors": [
                { "bufferView": 0, "byteOffset": 0,
                  "componentType": 5126, "type": "VEC3", "count": 2 }
            ]
        });
        let mut extras = ExtrasMap::default();
        let mut buffer = root["buffers"][0].clone();
        extras.set_source(&mut buffer, source);
        root["buffers"][0] = buffer;

        let mut document = Document { root, extras };
        upgrade(&mut document);
        let accessor = &document.root["accessors"][0];
        assert_eq!(accessor["min"], json!([-1.0, 1.0, 0.5]));
        assert_eq!(accessor["max"], json!([0.0, 5.0, 2.0]));
        let min = accessor["min"].as_array().unwrap();
        let max = accessor["max"].as_array().unwrap();
        for (lo, hi) in min.iter().zip(max) {
            assert!(lo.as_f64().unwrap() <= hi.as_f64().unwrap());
        }
    }

    #[test]
    fn test_known_extensions_become_required() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "extensionsUsed": ["KHR_materials_common", "VENDOR_custom"]
        }));
        let required = document.root["extensionsRequired"].as_array().unwrap();
        assert_eq!(required, &vec![json!("KHR_materials_common")]);
    }

    #[test]
    fn test_attribute_set_index_and_underscore_semantics() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "meshes": {
                "mesh0": { "primitives": [ {
                    "attributes": {
                        "POSITION": "acc0", "TEXCOORD": "acc1", "TEMPERATURE": "acc2"
                    }
                } ] }
            },
            "accessors": {
                "acc0": { "componentType": 5126, "type": "VEC3", "count": 1 },
                "acc1": { "componentType": 5126, "type": "VEC2", "count": 1 },
                "acc2": { "componentType": 5126, "type": "SCALAR", "count": 1 }
            },
            "techniques": {
                "tech0": { "parameters": { "t": { "semantic": "TEMPERATURE" } } }
            }
        }));
        let attributes = &document.root["meshes"][0]["primitives"][0]["attributes"];
        assert!(attributes.get("TEXCOORD").is_none());
        assert!(attributes.get("TEXCOORD_0").is_some());
        assert!(attributes.get("TEMPERATURE").is_none());
        assert!(attributes.get("_TEMPERATURE").is_some());
        let parameters = &document.root["techniques"][0]["parameters"];
        assert_eq!(parameters["t"]["semantic"], "_TEMPERATURE");
    }

    #[test]
    fn test_set_index_strips_at_first_digit_group() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "meshes": {
                "mesh0": { "primitives": [ {
                    "attributes": { "TEXCOORD_0_1": "acc0", "WEIGHTS_2_HI": "acc1" }
                } ] }
            },
            "accessors": {
                "acc0": { "componentType": 5126, "type": "VEC2", "count": 1 },
                "acc1": { "componentType": 5126, "type": "VEC4", "count": 1 }
            }
        }));
        // the first digit group ends the semantic name; both reduce to a
        // known semantic and keep their names
        let attributes = &document.root["meshes"][0]["primitives"][0]["attributes"];
        assert!(attributes.get("TEXCOORD_0_1").is_some());
        assert!(attributes.get("WEIGHTS_2_HI").is_some());
    }

    #[test]
    fn test_technique_cleanups() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "techniques": {
                "tech0": {
                    "attributes": { "a_position": "position" },
                    "parameters": {
                        "position": { "semantic": "POSITION", "value": [0, 0, 0] },
                        "joints": { "semantic": "JOINTMATRIX", "count": 16 },
                        "lights": { "count": 4 }
                    },
                    "states": {
                        "enable": [2929, 3089],
                        "functions": {
                            "scissor": [0, 0, 0, 0],
                            "blendColor": [-1.0, 2.0, 0.5, 1.0],
                            "depthRange": [0.5, 0.2]
                        }
                    }
                }
            }
        }));
        let technique = &document.root["techniques"][0];
        assert!(technique["parameters"]["position"].get("value").is_none());
        assert_eq!(technique["parameters"]["joints"]["count"], 16);
        assert!(technique["parameters"]["lights"].get("count").is_none());
        let states = &technique["states"];
        assert_eq!(states["enable"], json!([2929]));
        assert!(states["functions"].get("scissor").is_none());
        assert_eq!(states["functions"]["blendColor"], json!([0.0, 1.0, 0.5, 1.0]));
        assert_eq!(states["functions"]["depthRange"], json!([0.2, 0.2]));
        let required = document.root["extensionsRequired"].as_array().unwrap();
        assert!(required.contains(&json!("KHR_technique_webgl")));
    }

    #[test]
    fn test_camera_clamp() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "cameras": {
                "cam0": { "type": "perspective",
                          "perspective": { "aspectRatio": 0.0, "yfov": 0.0, "znear": 0.01 } }
            }
        }));
        let perspective = &document.root["cameras"][0]["perspective"];
        assert!(perspective.get("aspectRatio").is_none());
        assert_eq!(perspective["yfov"], 1.0);
    }

    #[test]
    fn test_buffer_type_and_profile_removed() {
        let document = upgraded(json!({
            "asset": { "version": "1.0", "profile": { "api": "WebGL" },
                       "premultipliedAlpha": true },
            "buffers": { "buf0": { "byteLength": 4, "type": "arraybuffer" } }
        }));
        assert_eq!(document.root["asset"]["version"], "2.0");
        assert!(document.root["asset"].get("profile").is_none());
        assert_eq!(document.root["asset"]["premultipliedAlpha"], true);
        assert!(document.root["buffers"][0].get("type").is_none());
    }

    #[test]
    fn test_animation_parameters_indirection_removed() {
        let document = upgraded(json!({
            "asset": { "version": "1.0" },
            "accessors": {
                "timeAcc": { "componentType": 5126, "type": "SCALAR", "count": 2 },
                "rotAcc": { "componentType": 5126, "type": "VEC4", "count": 2 }
            },
            "animations": {
                "anim0": {
                    "parameters": { "TIME": "timeAcc", "rotation": "rotAcc" },
                    "samplers": { "s0": { "input": "TIME", "output": "rotation" } },
                    "channels": [ { "sampler": "s0",
                                    "target": { "id": "node0", "path": "rotation" } } ]
                }
            },
            "nodes": { "node0": {} }
        }));
        let animation = &document.root["animations"][0];
        assert!(animation.get("parameters").is_none());
        assert_eq!(animation["samplers"][0]["input"], 0);
        assert_eq!(animation["samplers"][0]["output"], 1);
    }
}
