//! Fixed linear pipelines composing the container codec, version migration,
//! and resource packing.
//!
//! Every conversion runs the same closed sequence of stages over one
//! [`Document`]; the entry points differ only in how the document enters
//! (parsed GLB vs. plain JSON tree) and leaves (JSON tree vs. encoded GLB).

use crate::document::Document;
use crate::error::Result;
use crate::glb;
use crate::migrate::{self, MigrationOptions};
use crate::resources::{self, ResourceIo, WriteOptions};
use serde_json::Value;
use std::path::PathBuf;

/// Options shared by every pipeline entry point.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineOptions {
    /// Stop migration at this schema version instead of the terminal 2.0.
    pub target_version: Option<String>,
    /// Save buffers as separate `.bin` files.
    pub separate_buffers: bool,
    /// Save images as separate files.
    pub separate_textures: bool,
    /// Save shaders as separate files.
    pub separate_shaders: bool,
    /// Store embedded resources as data URIs instead of buffer views.
    pub data_uris: bool,
    /// Leave out the binary chunk entirely when a GLB has no buffer data.
    pub omit_empty_binary_chunk: bool,
}

/// One step of the pipeline. The set is closed: conversions differ in entry
/// and exit, never in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    UpdateVersion,
    AddPipelineExtras,
    ReadResources,
    WriteResources,
    RemovePipelineExtras,
}

const STAGES: [Stage; 5] = [
    Stage::UpdateVersion,
    Stage::AddPipelineExtras,
    Stage::ReadResources,
    Stage::WriteResources,
    Stage::RemovePipelineExtras,
];

/// Run the stage sequence. Returns the merged buffer bytes when
/// `buffer_storage` is set (the GLB path), None otherwise.
fn run_stages(
    document: &mut Document,
    options: &PipelineOptions,
    buffer_storage: bool,
    io: &mut dyn ResourceIo,
) -> Result<Option<Vec<u8>>> {
    let mut merged = None;
    for stage in STAGES {
        match stage {
            Stage::UpdateVersion => {
                let migration = MigrationOptions {
                    target_version: options.target_version.clone(),
                };
                migrate::update_version(document, &migration);
            }
            Stage::AddPipelineExtras => document.add_pipeline_extras(),
            Stage::ReadResources => resources::read_resources(document, io)?,
            Stage::WriteResources => {
                let write = WriteOptions {
                    separate_buffers: options.separate_buffers,
                    separate_textures: options.separate_textures,
                    separate_shaders: options.separate_shaders,
                    data_uris: options.data_uris,
                    buffer_storage,
                };
                merged = resources::write_resources(document, &write, io)?;
            }
            Stage::RemovePipelineExtras => document.remove_pipeline_extras(),
        }
    }
    Ok(merged)
}

/// Convert binary glTF to a plain glTF JSON tree.
pub fn glb_to_gltf(
    glb: &[u8],
    options: &PipelineOptions,
    io: &mut dyn ResourceIo,
) -> Result<Value> {
    let mut document = glb::parse_glb(glb)?;
    run_stages(&mut document, options, false, io)?;
    Ok(document.root)
}

/// Convert a glTF JSON tree to binary glTF.
pub fn gltf_to_glb(
    root: Value,
    options: &PipelineOptions,
    io: &mut dyn ResourceIo,
) -> Result<Vec<u8>> {
    let mut document = Document::new(root);
    let merged = run_stages(&mut document, options, true, io)?;
    glb::encode_glb(
        &document.root,
        merged.as_deref().unwrap_or(&[]),
        options.omit_empty_binary_chunk,
    )
}

/// Run a glTF JSON tree through the pipeline and return it migrated and
/// repacked.
pub fn process_gltf(
    root: Value,
    options: &PipelineOptions,
    io: &mut dyn ResourceIo,
) -> Result<Value> {
    let mut document = Document::new(root);
    run_stages(&mut document, options, false, io)?;
    Ok(document.root)
}

/// Filesystem-backed [`ResourceIo`]. External resource URIs resolve relative
/// to the read base; separate-file writes land under the write base.
#[derive(Debug, Clone)]
pub struct FsIo {
    read_base: PathBuf,
    write_base: PathBuf,
}

impl FsIo {
    /// Read and write relative to the same base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            read_base: base_path.clone(),
            write_base: base_path,
        }
    }

    /// Read relative to one directory, write relative to another (input next
    /// to the source file, output next to the converted one).
    pub fn with_output(read_base: impl Into<PathBuf>, write_base: impl Into<PathBuf>) -> Self {
        Self {
            read_base: read_base.into(),
            write_base: write_base.into(),
        }
    }
}

impl ResourceIo for FsIo {
    fn read(&mut self, uri: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.read_base.join(uri))?)
    }

    fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<()> {
        let path = self.write_base.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(path, data)?)
    }
}
