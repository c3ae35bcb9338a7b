//! GLB container parsing and serialization.
//!
//! Handles the current version-2 chunked layout and the legacy version-1
//! single-content-block layout. Version-1 input is upgraded to glTF 2.0
//! during parsing so the rest of the pipeline only ever sees one container
//! form.

use crate::document::Document;
use crate::error::{PipelineError, Result};
use crate::migrate::{self, MigrationOptions};
use serde_json::Value;

/// ASCII "glTF".
pub const GLB_MAGIC: [u8; 4] = *b"glTF";
/// Chunk type of the JSON chunk.
pub const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A;
/// Chunk type of the binary chunk.
pub const CHUNK_TYPE_BIN: u32 = 0x004E_4942;

fn read_u32(glb: &[u8], offset: usize) -> Result<u32> {
    let raw = offset
        .checked_add(4)
        .and_then(|end| glb.get(offset..end))
        .ok_or_else(|| PipelineError::Truncated(format!("expected u32 at byte {offset}")))?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn slice(glb: &[u8], start: usize, end: usize) -> Result<&[u8]> {
    glb.get(start..end)
        .ok_or_else(|| PipelineError::Truncated(format!("expected bytes [{start}, {end})")))
}

/// Parse a GLB container into a document with pipeline extras attached.
///
/// The binary chunk (or the version-1 trailing body) becomes the raw source
/// of the binary buffer. Version-1 documents come back already migrated to
/// glTF 2.0 with the `KHR_binary_glTF` marker removed.
pub fn parse_glb(glb: &[u8]) -> Result<Document> {
    if glb.len() < 4 || glb[0..4] != GLB_MAGIC {
        return Err(PipelineError::InvalidMagic);
    }
    let version = read_u32(glb, 4)?;
    match version {
        1 => parse_glb_version1(glb),
        2 => parse_glb_version2(glb),
        other => Err(PipelineError::UnsupportedVersion(other)),
    }
}

/// The header's declared length must not exceed the bytes actually present;
/// trailing bytes beyond it are tolerated and ignored.
fn check_total_length(glb: &[u8], total_length: usize) -> Result<usize> {
    if total_length > glb.len() {
        return Err(PipelineError::Truncated(format!(
            "header declares {total_length} bytes but only {} are present",
            glb.len()
        )));
    }
    Ok(total_length)
}

/// Version 1 layout: (magic, version, length, contentLength, contentFormat)
/// header, JSON content block, then the rest of the file is the binary body.
fn parse_glb_version1(glb: &[u8]) -> Result<Document> {
    let total_length = check_total_length(glb, read_u32(glb, 8)? as usize)?;
    let content_length = read_u32(glb, 12)? as usize;
    let content_format = read_u32(glb, 16)?;
    if content_format != 0 {
        return Err(PipelineError::InvalidContentFormat(content_format));
    }

    let json_start = 20;
    let binary_start = json_start + content_length;
    let content = slice(glb, json_start, binary_start)?;
    let root: Value = serde_json::from_str(std::str::from_utf8(content)?)?;
    let binary = slice(glb, binary_start, total_length)?.to_vec();

    let mut document = Document::new(root);
    attach_legacy_binary_buffer(&mut document, binary);
    // The rest of the pipeline only understands 2.0, so upgrade immediately.
    migrate::update_version(&mut document, &MigrationOptions::default());
    remove_extension_used(&mut document.root, "KHR_binary_glTF");
    document.add_pipeline_extras();
    Ok(document)
}

/// In version-1 binary glTF the embedded body belongs to a buffer with the
/// well-known id `binary_glTF` (or `KHR_binary_glTF` in older exporters).
fn attach_legacy_binary_buffer(document: &mut Document, binary: Vec<u8>) {
    let Some(buffers) = document.root.get_mut("buffers").and_then(Value::as_object_mut) else {
        return;
    };
    let mut binary = Some(binary);
    for id in ["binary_glTF", "KHR_binary_glTF"] {
        if let Some(buffer) = buffers.get_mut(id) {
            if let Some(binary) = binary.take() {
                document.extras.set_source(buffer, binary);
            }
            return;
        }
    }
}

/// Version 2 layout: 12-byte header followed by (length, type, payload)
/// chunks. Unknown chunk types are skipped without error.
fn parse_glb_version2(glb: &[u8]) -> Result<Document> {
    let total_length = check_total_length(glb, read_u32(glb, 8)? as usize)?;
    let mut offset = 12;
    let mut root = None;
    let mut binary = None;
    while offset < total_length {
        let chunk_length = read_u32(glb, offset)? as usize;
        let chunk_type = read_u32(glb, offset + 4)?;
        offset += 8;
        let payload = slice(glb, offset, offset + chunk_length)?;
        offset += chunk_length;
        match chunk_type {
            CHUNK_TYPE_JSON => {
                root = Some(serde_json::from_str(std::str::from_utf8(payload)?)?);
            }
            CHUNK_TYPE_BIN => binary = Some(payload.to_vec()),
            _ => {}
        }
    }

    let mut document = Document::new(root.ok_or(PipelineError::MissingJsonChunk)?);
    if let Some(binary) = binary {
        if let Some(buffer) = document
            .root
            .get_mut("buffers")
            .and_then(Value::as_array_mut)
            .and_then(|buffers| buffers.first_mut())
        {
            document.extras.set_source(buffer, binary);
        }
    }
    document.add_pipeline_extras();
    Ok(document)
}

fn remove_extension_used(root: &mut Value, extension: &str) {
    let mut now_empty = false;
    if let Some(used) = root.get_mut("extensionsUsed").and_then(Value::as_array_mut) {
        used.retain(|value| value.as_str() != Some(extension));
        now_empty = used.is_empty();
    }
    if now_empty {
        root.as_object_mut()
            .expect("glTF root is an object")
            .remove("extensionsUsed");
    }
}

/// Serialize a glTF 2.0 document (pipeline extras already removed) and its
/// merged binary buffer as a version-2 GLB.
///
/// The JSON chunk is right-padded with spaces to a 4-byte boundary; the
/// binary payload is emitted as-is and is expected to come pre-aligned from
/// the buffer merge. A zero-length binary chunk is still emitted unless
/// `omit_empty_binary_chunk` is set.
pub fn encode_glb(root: &Value, binary: &[u8], omit_empty_binary_chunk: bool) -> Result<Vec<u8>> {
    let mut json = serde_json::to_vec(root)?;
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let emit_binary = !(binary.is_empty() && omit_empty_binary_chunk);
    let mut total = 12 + 8 + json.len();
    if emit_binary {
        total += 8 + binary.len();
    }

    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(&GLB_MAGIC);
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());

    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    glb.extend_from_slice(&json);

    if emit_binary {
        glb.extend_from_slice(&(binary.len() as u32).to_le_bytes());
        glb.extend_from_slice(&CHUNK_TYPE_BIN.to_le_bytes());
        glb.extend_from_slice(binary);
    }
    Ok(glb)
}
