//! Resource packing and unpacking.
//!
//! Reading attaches the raw byte source of every buffer, image, and shader to
//! the document's pipeline state, whether it comes from a data URI, an
//! external file, or a slice of an already-loaded buffer. Writing runs the
//! other way: each resource is stored as a separate file, a data URI, or an
//! embedded buffer view (in that priority order, per the caller's options),
//! and all buffers are merged into buffer 0 last so that images and shaders
//! written to new buffers are picked up.

pub mod mime;

use crate::document::{
    for_each_in, get_str, get_u64, lookup, Document, ExtrasMap,
};
use crate::error::{PipelineError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mime::{sniff_image, ImageFormat};
use serde_json::{json, Value};

/// External I/O collaborator for the pipeline: reads resource bytes behind
/// URIs, persists separate files, and re-encodes modified images.
pub trait ResourceIo {
    /// Read the bytes behind a (non-data) URI.
    fn read(&mut self, uri: &str) -> Result<Vec<u8>>;

    /// Persist bytes at a relative path.
    fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<()>;

    /// Re-encode a decoded image into the given format.
    fn transcode_image(
        &mut self,
        pixels: &image::DynamicImage,
        format: ImageFormat,
    ) -> Result<Vec<u8>> {
        let target = match format.mime_type {
            "image/png" => image::ImageFormat::Png,
            "image/jpeg" => image::ImageFormat::Jpeg,
            other => return Err(PipelineError::UnsupportedImageFormat(other.to_string())),
        };
        let mut encoded = std::io::Cursor::new(Vec::new());
        pixels.write_to(&mut encoded, target)?;
        Ok(encoded.into_inner())
    }
}

/// Storage choices for [`write_resources`].
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteOptions {
    /// Save buffer 0 as a separate `.bin` file instead of a data URI.
    pub separate_buffers: bool,
    /// Save images as separate files.
    pub separate_textures: bool,
    /// Save shaders as separate files.
    pub separate_shaders: bool,
    /// Store embedded resources as data URIs instead of buffer views.
    pub data_uris: bool,
    /// Return the merged buffer bytes instead of storing them on buffer 0;
    /// used when the document is headed for a GLB binary chunk.
    pub buffer_storage: bool,
}

/// Run a fallible closure over every entry of a named collection, stopping at
/// the first error.
fn try_for_each_in(
    parent: &mut Value,
    key: &str,
    mut f: impl FnMut(&mut Value) -> Result<()>,
) -> Result<()> {
    let mut result = Ok(());
    for_each_in(parent, key, |node| {
        if result.is_ok() {
            result = f(node);
        }
    });
    result
}

const DATA_URI_MARKER: &str = ";base64,";

/// Decode a node's `uri` into an attached source. Data URIs are decoded
/// in-core; anything else goes through the collaborator and keeps the URI as
/// the relative-path hint for later separate-file writes. Returns whether a
/// URI was consumed.
fn read_uri_source(
    object: &mut Value,
    extras: &mut ExtrasMap,
    io: &mut dyn ResourceIo,
) -> Result<bool> {
    let Some(uri) = get_str(object, "uri").map(str::to_string) else {
        return Ok(false);
    };
    if let Some(encoded) = uri.strip_prefix("data:") {
        let payload = encoded
            .split_once(DATA_URI_MARKER)
            .ok_or_else(|| PipelineError::DataUri("missing base64 marker".to_string()))?
            .1;
        let bytes = BASE64
            .decode(payload)
            .map_err(|error| PipelineError::DataUri(error.to_string()))?;
        extras.set_source(object, bytes);
    } else {
        let bytes = io.read(&uri)?;
        let entry = extras.entry(object);
        entry.source = Some(bytes);
        entry.relative_path = Some(uri.clone());
    }
    if let Some(map) = object.as_object_mut() {
        map.remove("uri");
    }
    Ok(true)
}

/// Attach raw sources to every buffer, image, and shader in the document.
///
/// Buffers come first: buffer-view-backed images and shaders (binary glTF)
/// slice their bytes out of the owning buffer's source afterwards. Objects
/// with neither a URI nor a reachable buffer view are left untouched.
pub fn read_resources(document: &mut Document, io: &mut dyn ResourceIo) -> Result<()> {
    let Document { root, extras } = document;

    try_for_each_in(root, "buffers", |buffer| {
        if extras.source_of(buffer).is_some() {
            return Ok(());
        }
        read_uri_source(buffer, extras, io).map(drop)
    })?;

    // First pass over images and shaders: resolve URIs, queue buffer-view
    // slices for after the walk (slicing needs the whole tree immutably).
    let mut pending: Vec<(u64, Value)> = Vec::new();
    try_for_each_in(root, "shaders", |shader| {
        queue_object_source(shader, extras, io, &mut pending)
    })?;
    try_for_each_in(root, "images", |image| {
        queue_object_source(image, extras, io, &mut pending)?;
        if let Some(compressed) = image
            .get_mut("extras")
            .and_then(|image_extras| image_extras.get_mut("compressedImage3DTiles"))
            .and_then(Value::as_object_mut)
        {
            for (_, variant) in compressed.iter_mut() {
                queue_object_source(variant, extras, io, &mut pending)?;
            }
        }
        Ok(())
    })?;

    for (tag, view_ref) in pending {
        let Some(bytes) = slice_view(root, extras, &view_ref) else {
            continue;
        };
        if let Some(entry) = extras.by_tag_mut(tag) {
            entry.source = Some(bytes);
        }
    }
    Ok(())
}

fn queue_object_source(
    object: &mut Value,
    extras: &mut ExtrasMap,
    io: &mut dyn ResourceIo,
    pending: &mut Vec<(u64, Value)>,
) -> Result<()> {
    if extras.source_of(object).is_some() {
        return Ok(());
    }
    if read_uri_source(object, extras, io)? {
        return Ok(());
    }
    if let Some(view_ref) = object.get("bufferView").cloned() {
        let tag = extras.attach(object);
        pending.push((tag, view_ref));
    }
    Ok(())
}

/// Slice a buffer view's byte range out of its buffer's attached source.
fn slice_view(root: &Value, extras: &ExtrasMap, view_ref: &Value) -> Option<Vec<u8>> {
    let view = lookup(root.get("bufferViews")?, view_ref)?;
    let buffer = lookup(root.get("buffers")?, view.get("buffer")?)?;
    let source = extras.source_of(buffer)?;
    let offset = get_u64(view, "byteOffset").unwrap_or(0) as usize;
    let length = get_u64(view, "byteLength")? as usize;
    let end = offset.checked_add(length)?;
    source.get(offset..end).map(<[u8]>::to_vec)
}

/// Write every resource back out per the options and merge all buffers into
/// buffer 0. Returns the merged bytes when `buffer_storage` is set.
///
/// Documents whose collections are still string-keyed maps (migration stopped
/// before 2.0) cannot host buffer-view embedding or the merge, which need
/// array indices; their resources go back out as data URIs or separate files
/// and the buffers stay keyed, so no attached bytes are ever dropped.
pub fn write_resources(
    document: &mut Document,
    options: &WriteOptions,
    io: &mut dyn ResourceIo,
) -> Result<Option<Vec<u8>>> {
    let Document { root, extras } = document;

    if has_keyed_collections(root) {
        write_keyed_resources(root, extras, options, io)?;
        return Ok(None);
    }

    if let Some(mut images) = take_array(root, "images") {
        for (index, image) in images.iter_mut().enumerate() {
            write_image(root, extras, image, index, options, io)?;
            if let Some(compressed) = image
                .get_mut("extras")
                .and_then(|image_extras| image_extras.get_mut("compressedImage3DTiles"))
                .and_then(Value::as_object_mut)
            {
                for (_, variant) in compressed.iter_mut() {
                    write_image(root, extras, variant, index, options, io)?;
                }
            }
        }
        root["images"] = Value::Array(images);
    }

    if let Some(mut shaders) = take_array(root, "shaders") {
        for (index, shader) in shaders.iter_mut().enumerate() {
            write_resource(
                root,
                extras,
                shader,
                index,
                options.separate_shaders,
                options.data_uris,
                ".glsl",
                "text/plain",
                io,
            )?;
        }
        root["shaders"] = Value::Array(shaders);
    }

    // Buffers last: image and shader writes above may have added new ones.
    merge_buffers(root, extras);

    if options.buffer_storage {
        let merged = root
            .get("buffers")
            .and_then(|buffers| buffers.get(0))
            .and_then(|buffer| extras.source_of(buffer))
            .map(<[u8]>::to_vec);
        return Ok(merged);
    }
    if let Some(mut buffers) = take_array(root, "buffers") {
        for (index, buffer) in buffers.iter_mut().enumerate() {
            write_resource(
                root,
                extras,
                buffer,
                index,
                options.separate_buffers,
                true,
                ".bin",
                "application/octet-stream",
                io,
            )?;
        }
        root["buffers"] = Value::Array(buffers);
    }
    Ok(None)
}

fn take_array(root: &mut Value, key: &str) -> Option<Vec<Value>> {
    match root.get_mut(key) {
        Some(Value::Array(items)) => Some(std::mem::take(items)),
        _ => None,
    }
}

fn has_keyed_collections(root: &Value) -> bool {
    ["buffers", "images", "shaders"]
        .iter()
        .any(|key| root.get(*key).is_some_and(Value::is_object))
}

/// Write path for string-keyed collections: each resource becomes a data URI
/// or a separate file, keyed entries in place.
fn write_keyed_resources(
    root: &mut Value,
    extras: &mut ExtrasMap,
    options: &WriteOptions,
    io: &mut dyn ResourceIo,
) -> Result<()> {
    let mut index = 0;
    try_for_each_in(root, "images", |image| {
        let current = index;
        index += 1;
        write_keyed_image(extras, image, current, options, io)?;
        if let Some(compressed) = image
            .get_mut("extras")
            .and_then(|image_extras| image_extras.get_mut("compressedImage3DTiles"))
            .and_then(Value::as_object_mut)
        {
            for (_, variant) in compressed.iter_mut() {
                write_keyed_image(extras, variant, current, options, io)?;
            }
        }
        Ok(())
    })?;
    let mut index = 0;
    try_for_each_in(root, "shaders", |shader| {
        let current = index;
        index += 1;
        write_keyed_resource(
            extras,
            shader,
            current,
            options.separate_shaders,
            ".glsl",
            "text/plain",
            io,
        )
    })?;
    let mut index = 0;
    try_for_each_in(root, "buffers", |buffer| {
        let current = index;
        index += 1;
        write_keyed_resource(
            extras,
            buffer,
            current,
            options.separate_buffers,
            ".bin",
            "application/octet-stream",
            io,
        )
    })
}

fn write_keyed_image(
    extras: &mut ExtrasMap,
    image: &mut Value,
    index: usize,
    options: &WriteOptions,
    io: &mut dyn ResourceIo,
) -> Result<()> {
    let Some(format) = prepare_image_source(extras, image, io)? else {
        return Ok(());
    };
    write_keyed_resource(
        extras,
        image,
        index,
        options.separate_textures,
        format.extension,
        format.mime_type,
        io,
    )
}

fn write_keyed_resource(
    extras: &mut ExtrasMap,
    object: &mut Value,
    index: usize,
    separate: bool,
    extension: &str,
    mime_type: &str,
    io: &mut dyn ResourceIo,
) -> Result<()> {
    if separate {
        write_file(object, extras, index, extension, io)
    } else {
        write_data_uri(object, extras, mime_type);
        Ok(())
    }
}

/// Sniff an image's format and re-encode its source if the decoded pixels
/// were modified upstream. Returns None when the image has no attached bytes.
fn prepare_image_source(
    extras: &mut ExtrasMap,
    image: &mut Value,
    io: &mut dyn ResourceIo,
) -> Result<Option<ImageFormat>> {
    let format = {
        let Some(source) = extras.source_of(image) else {
            return Ok(None);
        };
        sniff_image(source).ok_or_else(|| {
            PipelineError::UnsupportedImageFormat("unrecognized image signature".to_string())
        })?
    };

    // Re-encode only when the pixels were actually modified upstream.
    let reencoded = match extras.get(image) {
        Some(entry) if entry.image_changed => entry
            .decoded_image
            .as_ref()
            .map(|pixels| io.transcode_image(pixels, format))
            .transpose()?,
        _ => None,
    };
    if let Some(bytes) = reencoded {
        extras.set_source(image, bytes);
    }
    Ok(Some(format))
}

fn write_image(
    root: &mut Value,
    extras: &mut ExtrasMap,
    image: &mut Value,
    index: usize,
    options: &WriteOptions,
    io: &mut dyn ResourceIo,
) -> Result<()> {
    let Some(format) = prepare_image_source(extras, image, io)? else {
        return Ok(());
    };

    write_resource(
        root,
        extras,
        image,
        index,
        options.separate_textures,
        options.data_uris,
        format.extension,
        format.mime_type,
        io,
    )?;
    if image.get("bufferView").is_some() {
        // buffer-view-backed images must declare their MIME type
        image["mimeType"] = json!(format.mime_type);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_resource(
    root: &mut Value,
    extras: &mut ExtrasMap,
    object: &mut Value,
    index: usize,
    separate: bool,
    data_uris: bool,
    extension: &str,
    mime_type: &str,
    io: &mut dyn ResourceIo,
) -> Result<()> {
    if separate {
        write_file(object, extras, index, extension, io)
    } else if data_uris {
        write_data_uri(object, extras, mime_type);
        Ok(())
    } else {
        write_buffer_view(root, extras, object);
        Ok(())
    }
}

fn write_data_uri(object: &mut Value, extras: &ExtrasMap, mime_type: &str) {
    let Some(source) = extras.source_of(object) else {
        return;
    };
    let uri = format!("data:{mime_type};base64,{}", BASE64.encode(source));
    if let Some(map) = object.as_object_mut() {
        map.remove("bufferView");
        map.insert("uri".to_string(), json!(uri));
    }
}

fn write_file(
    object: &mut Value,
    extras: &mut ExtrasMap,
    index: usize,
    extension: &str,
    io: &mut dyn ResourceIo,
) -> Result<()> {
    let name = get_str(object, "name")
        .map(str::to_string)
        .unwrap_or_else(|| index.to_string());
    let relative_path = extras
        .get(object)
        .and_then(|entry| entry.relative_path.clone())
        .unwrap_or_else(|| format!("{name}{extension}"))
        .replace('\\', "/");
    let Some(source) = extras.source_of(object) else {
        return Ok(());
    };
    io.write(&relative_path, source)?;
    if let Some(map) = object.as_object_mut() {
        map.remove("bufferView");
        map.insert("uri".to_string(), json!(relative_path));
    }
    Ok(())
}

/// Embed a resource in a fresh buffer-view/buffer pair; the merge pass will
/// fold the new buffer into buffer 0. Resources that already sit in a buffer
/// view stay where they are.
fn write_buffer_view(root: &mut Value, extras: &mut ExtrasMap, object: &mut Value) {
    if let Some(map) = object.as_object_mut() {
        map.remove("uri");
    }
    if object.get("bufferView").is_some() {
        return;
    }
    let Some(source) = extras.source_of(object).map(<[u8]>::to_vec) else {
        return;
    };
    let byte_length = source.len();

    let buffer_index = root
        .get("buffers")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let view_index = push_to_collection(
        root,
        "bufferViews",
        json!({ "buffer": buffer_index, "byteOffset": 0, "byteLength": byte_length }),
    );
    let mut buffer = json!({ "byteLength": byte_length });
    extras.set_source(&mut buffer, source);
    push_to_collection(root, "buffers", buffer);

    object["bufferView"] = json!(view_index);
}

fn push_to_collection(root: &mut Value, key: &str, value: Value) -> usize {
    let items = root
        .as_object_mut()
        .expect("root is an object")
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .expect("collection is an array");
    items.push(value);
    items.len() - 1
}

/// Concatenate every buffer's source into buffer 0, 4-byte aligned, and
/// rebase all buffer views onto it.
fn merge_buffers(root: &mut Value, extras: &mut ExtrasMap) {
    let Some(buffers) = take_array(root, "buffers") else {
        return;
    };
    if buffers.is_empty() {
        root["buffers"] = Value::Array(Vec::new());
        return;
    }

    let mut merged: Vec<u8> = Vec::new();
    let mut offsets = Vec::with_capacity(buffers.len());
    let mut name = None;
    for buffer in &buffers {
        if name.is_none() {
            name = get_str(buffer, "name").map(str::to_string);
        }
        while merged.len() % 4 != 0 {
            merged.push(0);
        }
        offsets.push(merged.len() as u64);
        if let Some(source) = extras.source_of(buffer) {
            merged.extend_from_slice(source);
        }
    }

    for_each_in(root, "bufferViews", |view| {
        let Some(buffer_index) = get_u64(view, "buffer") else {
            return;
        };
        if let Some(base) = offsets.get(buffer_index as usize) {
            let offset = get_u64(view, "byteOffset").unwrap_or(0);
            view["byteOffset"] = json!(offset + base);
            view["buffer"] = json!(0);
        }
    });

    let mut merged_buffer = json!({ "byteLength": merged.len() });
    if let Some(name) = name {
        merged_buffer["name"] = json!(name);
    }
    extras.set_source(&mut merged_buffer, merged);
    root["buffers"] = json!([merged_buffer]);
}
