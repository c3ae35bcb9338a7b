//! glTF 0.8 -> 1.0 rewrites.

use crate::accessor::{component_count_for_type, ComponentType};
use crate::document::{for_each_in, get_str, get_u64, lookup, Document};
use serde_json::{json, Value};
use std::collections::HashSet;

const TRIANGLES: u64 = 4;

pub(crate) fn upgrade(document: &mut Document) {
    update_asset(&mut document.root);
    super::update_instance_techniques(&mut document.root);
    set_primitive_modes(&mut document.root);
    update_nodes(&mut document.root);
    update_animations(document);
    remove_technique_passes(&mut document.root);
    move_lights(&mut document.root);
    move_all_extensions(&mut document.root);
}

fn update_asset(root: &mut Value) {
    // The version property moves from the root onto asset, and profile
    // becomes an object.
    if let Some(map) = root.as_object_mut() {
        map.remove("version");
    }
    let asset = super::ensure_object(root, "asset");
    asset.insert("version".to_string(), json!("1.0"));
    if !asset.get("profile").is_some_and(Value::is_object) {
        asset.insert("profile".to_string(), json!({}));
    }
}

/// `primitive.primitive` becomes `primitive.mode`, defaulting to triangles.
fn set_primitive_modes(root: &mut Value) {
    for_each_in(root, "meshes", |mesh| {
        let Some(primitives) = mesh.get_mut("primitives").and_then(Value::as_array_mut) else {
            return;
        };
        for primitive in primitives {
            let legacy = get_u64(primitive, "primitive").unwrap_or(TRIANGLES);
            let map = primitive.as_object_mut().expect("primitive is an object");
            map.remove("primitive");
            map.entry("mode").or_insert_with(|| json!(legacy));
        }
    });
}

/// Node rotations become quaternions and `node.instanceSkin` is flattened.
fn update_nodes(root: &mut Value) {
    for_each_in(root, "nodes", |node| {
        if let Some(rotation) = node.get("rotation").and_then(Value::as_array) {
            if rotation.len() == 4 {
                let components: Vec<f64> =
                    rotation.iter().filter_map(Value::as_f64).collect();
                if components.len() == 4 {
                    let quat = axis_angle_to_quat(
                        components[0],
                        components[1],
                        components[2],
                        components[3],
                    );
                    node["rotation"] = json!(quat);
                }
            }
        }
        let Some(instance_skin) = node
            .as_object_mut()
            .and_then(|map| map.remove("instanceSkin"))
        else {
            return;
        };
        let map = node.as_object_mut().expect("node is an object");
        for key in ["skeletons", "skin", "meshes"] {
            if let Some(value) = instance_skin.get(key) {
                map.insert(key.to_string(), value.clone());
            }
        }
    });
}

fn axis_angle_to_quat(x: f64, y: f64, z: f64, angle: f64) -> [f64; 4] {
    let axis = glam::DVec3::new(x, y, z);
    if axis.length_squared() == 0.0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let quat = glam::DQuat::from_axis_angle(axis.normalize(), angle);
    [quat.x, quat.y, quat.z, quat.w]
}

struct RotationSamples {
    buffer_ref: Value,
    byte_offset: usize,
    byte_stride: usize,
    component_type: ComponentType,
    count: usize,
}

/// Animation channels targeting "rotation" reference axis-angle sample data;
/// convert the raw samples in place. Each accessor is converted at most once
/// even when several channels target it.
fn update_animations(document: &mut Document) {
    let mut converted = HashSet::new();
    let mut jobs = Vec::new();
    let root = &document.root;

    for_each_ref(root, "animations", |animation| {
        let Some(channels) = animation.get("channels").and_then(Value::as_array) else {
            return;
        };
        for channel in channels {
            let targets_rotation = channel
                .get("target")
                .and_then(|target| get_str(target, "path"))
                == Some("rotation");
            if !targets_rotation {
                continue;
            }
            let accessor_ref = channel
                .get("sampler")
                .and_then(|sampler_ref| {
                    lookup(animation.get("samplers")?, sampler_ref)
                })
                .and_then(|sampler| sampler.get("output"))
                .and_then(|output| lookup(animation.get("parameters")?, output));
            let Some(accessor_ref) = accessor_ref else {
                continue;
            };
            if !converted.insert(accessor_ref.to_string()) {
                continue;
            }
            if let Some(job) = rotation_samples(root, accessor_ref) {
                jobs.push(job);
            }
        }
    });

    let Document { root, extras } = document;
    for job in jobs {
        let Some(buffer) = root
            .get("buffers")
            .and_then(|buffers| lookup(buffers, &job.buffer_ref))
        else {
            continue;
        };
        let Some(source) = extras.get_mut(buffer).and_then(|pe| pe.source.as_mut()) else {
            continue;
        };
        convert_samples(source, &job);
    }
}

fn rotation_samples(root: &Value, accessor_ref: &Value) -> Option<RotationSamples> {
    let accessor = lookup(root.get("accessors")?, accessor_ref)?;
    if component_count_for_type(get_str(accessor, "type")?)? != 4 {
        return None;
    }
    let component_type = ComponentType::from_code(get_u64(accessor, "componentType")?)?;
    let view = lookup(root.get("bufferViews")?, accessor.get("bufferView")?)?;
    let packed = component_type.size_in_bytes() * 4;
    let byte_stride = match get_u64(accessor, "byteStride") {
        Some(stride) if stride != 0 => stride as usize,
        _ => packed,
    };
    Some(RotationSamples {
        buffer_ref: view.get("buffer")?.clone(),
        byte_offset: get_u64(view, "byteOffset").unwrap_or(0) as usize
            + get_u64(accessor, "byteOffset").unwrap_or(0) as usize,
        byte_stride,
        component_type,
        count: get_u64(accessor, "count")? as usize,
    })
}

fn convert_samples(source: &mut [u8], job: &RotationSamples) {
    let size = job.component_type.size_in_bytes();
    for index in 0..job.count {
        let base = job.byte_offset + index * job.byte_stride;
        let mut components = [0.0f64; 4];
        let mut complete = true;
        for (offset, slot) in components.iter_mut().enumerate() {
            match job.component_type.read(source, base + offset * size) {
                Some(value) => *slot = value,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            return;
        }
        let quat = axis_angle_to_quat(components[0], components[1], components[2], components[3]);
        for (offset, value) in quat.iter().enumerate() {
            job.component_type.write(source, base + offset * size, *value);
        }
    }
}

/// Read-only sibling of [`for_each_in`] for collections that may still be
/// string-keyed maps.
fn for_each_ref(parent: &Value, key: &str, mut f: impl FnMut(&Value)) {
    match parent.get(key) {
        Some(Value::Object(map)) => {
            for (_, item) in map {
                f(item);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                f(item);
            }
        }
        _ => {}
    }
}

/// `technique.passes[technique.pass || "defaultPass"].instanceProgram` is
/// flattened onto the technique; `passes`/`pass` are deleted.
fn remove_technique_passes(root: &mut Value) {
    for_each_in(root, "techniques", |technique| {
        let map = technique.as_object_mut().expect("technique is an object");
        let pass_name = map
            .get("pass")
            .and_then(Value::as_str)
            .unwrap_or("defaultPass")
            .to_string();
        let Some(passes) = map.remove("passes") else {
            map.remove("pass");
            return;
        };
        map.remove("pass");
        let Some(pass) = passes.get(&pass_name) else {
            return;
        };
        if let Some(instance_program) = pass.get("instanceProgram") {
            for key in ["attributes", "program", "uniforms"] {
                if let Some(value) = instance_program.get(key) {
                    map.entry(key.to_string()).or_insert_with(|| value.clone());
                }
            }
        }
        if let Some(states) = pass.get("states") {
            map.entry("states".to_string())
                .or_insert_with(|| states.clone());
        }
    });
}

/// `gltf.lights` moves under the KHR_materials_common extension.
fn move_lights(root: &mut Value) {
    let Some(lights) = root.as_object_mut().and_then(|map| map.remove("lights")) else {
        return;
    };
    let extensions = super::ensure_object(root, "extensions");
    let common = extensions
        .entry("KHR_materials_common")
        .or_insert_with(|| json!({}));
    if let Some(common) = common.as_object_mut() {
        common.insert("lights".to_string(), lights);
    }
}

/// `gltf.allExtensions` becomes `extensionsUsed`.
fn move_all_extensions(root: &mut Value) {
    let Some(map) = root.as_object_mut() else {
        return;
    };
    if let Some(extensions) = map.remove("allExtensions") {
        map.insert("extensionsUsed".to_string(), extensions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{update_version, MigrationOptions};

    fn upgrade_to_10(root: Value) -> Value {
        let mut document = Document::new(root);
        let options = MigrationOptions {
            target_version: Some("1.0".to_string()),
        };
        update_version(&mut document, &options);
        document.root
    }

    #[test]
    fn test_axis_angle_rotation_becomes_quaternion() {
        // 0.8-style document: version on the root, asset.version unset.
        let root = upgrade_to_10(json!({
            "version": "0.8",
            "nodes": { "node0": { "rotation": [0.0, 0.0, 1.0, 1.5708] } }
        }));
        let rotation = root["nodes"]["node0"]["rotation"].as_array().unwrap();
        let values: Vec<f64> = rotation.iter().map(|v| v.as_f64().unwrap()).collect();
        let expected = [0.0, 0.0, 0.707, 0.707];
        for (value, expected) in values.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-3, "got {values:?}");
        }
        assert_eq!(root["asset"]["version"], "1.0");
        assert!(root.get("version").is_none());
    }

    #[test]
    fn test_primitive_mode_rename() {
        let root = upgrade_to_10(json!({
            "version": "0.8",
            "meshes": {
                "mesh0": { "primitives": [ { "primitive": 1 }, {} ] }
            }
        }));
        let primitives = root["meshes"]["mesh0"]["primitives"].as_array().unwrap();
        assert_eq!(primitives[0]["mode"], 1);
        assert!(primitives[0].get("primitive").is_none());
        assert_eq!(primitives[1]["mode"], 4);
    }

    #[test]
    fn test_instance_skin_flattening() {
        let root = upgrade_to_10(json!({
            "version": "0.8",
            "nodes": {
                "node0": {
                    "instanceSkin": {
                        "skeletons": ["skel"], "skin": "skin0", "meshes": ["mesh0"]
                    }
                }
            }
        }));
        let node = &root["nodes"]["node0"];
        assert_eq!(node["skin"], "skin0");
        assert_eq!(node["meshes"][0], "mesh0");
        assert!(node.get("instanceSkin").is_none());
    }

    #[test]
    fn test_technique_pass_flattening() {
        let root = upgrade_to_10(json!({
            "version": "0.8",
            "techniques": {
                "tech0": {
                    "pass": "main",
                    "passes": {
                        "main": {
                            "instanceProgram": {
                                "attributes": { "a_position": "position" },
                                "program": "prog0",
                                "uniforms": { "u_mvp": "mvp" }
                            },
                            "states": { "enable": [2929] }
                        }
                    }
                }
            }
        }));
        let technique = &root["techniques"]["tech0"];
        assert_eq!(technique["program"], "prog0");
        assert_eq!(technique["attributes"]["a_position"], "position");
        assert_eq!(technique["states"]["enable"][0], 2929);
        assert!(technique.get("passes").is_none());
        assert!(technique.get("pass").is_none());
    }

    #[test]
    fn test_lights_and_all_extensions_moves() {
        let root = upgrade_to_10(json!({
            "version": "0.8",
            "lights": { "light0": { "type": "point" } },
            "allExtensions": ["KHR_materials_common"]
        }));
        assert_eq!(
            root["extensions"]["KHR_materials_common"]["lights"]["light0"]["type"],
            "point"
        );
        assert_eq!(root["extensionsUsed"][0], "KHR_materials_common");
        assert!(root.get("lights").is_none());
        assert!(root.get("allExtensions").is_none());
    }

    #[test]
    fn test_rotation_animation_samples_converted_once() {
        // one VEC4 f32 accessor with two axis-angle samples, targeted twice
        let samples: Vec<u8> = [0.0f32, 0.0, 1.0, 1.5708, 1.0, 0.0, 0.0, 3.14159]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut document = Document::new(json!({
            "version": "0.8",
            "animations": {
                "anim0": {
                    "channels": [
                        { "sampler": "s0", "target": { "id": "node0", "path": "rotation" } },
                        { "sampler": "s1", "target": { "id": "node1", "path": "rotation" } }
                    ],
                    "samplers": {
                        "s0": { "input": "TIME", "output": "rot" },
                        "s1": { "input": "TIME", "output": "rot" }
                    },
                    "parameters": { "TIME": "accTime", "rot": "accRot" }
                }
            },
            "accessors": {
                "accRot": {
                    "bufferView": "view0", "byteOffset": 0,
                    "componentType": 5126, "type": "VEC4", "count": 2
                }
            },
            "bufferViews": {
                "view0": { "buffer": "buf0", "byteOffset": 0, "byteLength": 32 }
            },
            "buffers": { "buf0": { "byteLength": 32 } }
        }));
        let mut buffer = document.root["buffers"]["buf0"].clone();
        document.extras.set_source(&mut buffer, samples);
        document.root["buffers"]["buf0"] = buffer;

        let options = MigrationOptions {
            target_version: Some("1.0".to_string()),
        };
        update_version(&mut document, &options);

        let buffer = &document.root["buffers"]["buf0"];
        let source = document.extras.source_of(buffer).unwrap();
        let first: Vec<f32> = source[0..16]
            .chunks(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let expected = [0.0f32, 0.0, 0.70709, 0.70712];
        for (value, expected) in first.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-3, "got {first:?}");
        }
        // second sample: rotation about x by pi -> [sin(pi/2), 0, 0, cos(pi/2)]
        let second: Vec<f32> = source[16..32]
            .chunks(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert!((second[0] - 1.0).abs() < 1e-3);
        assert!(second[3].abs() < 1e-3);
    }
}
