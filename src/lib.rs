//! # glTF Convert
//!
//! A Rust library for converting between glTF and binary glTF (GLB), with
//! schema migration from legacy revisions (0.8, 1.0) up to glTF 2.0.
//!
//! ## Overview
//!
//! The library decodes both GLB container layouts (the legacy version-1
//! header and the version-2 chunk table), walks the JSON document through the
//! schema revisions one transition at a time, unpacks and repacks the raw
//! resources (buffers, images, shaders) behind it, and encodes the result
//! back out as GLB or plain glTF.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gltf_convert::{glb_to_gltf, gltf_to_glb, FsIo, PipelineOptions};
//!
//! let glb = std::fs::read("model.glb")?;
//! let mut io = FsIo::new(".");
//! let options = PipelineOptions::default();
//!
//! // GLB -> glTF (migrated to 2.0, resources embedded)
//! let gltf = glb_to_gltf(&glb, &options, &mut io)?;
//!
//! // glTF -> GLB
//! let glb = gltf_to_glb(gltf, &options, &mut io)?;
//! std::fs::write("model.out.glb", glb)?;
//! ```

pub mod accessor;
pub mod document;
pub mod error;
pub mod glb;
pub mod migrate;
pub mod pipeline;
pub mod resources;

// Re-export main types for convenience
pub use document::{Document, ExtrasMap, PipelineExtras};
pub use error::{PipelineError, Result};
pub use glb::{encode_glb, parse_glb};
pub use migrate::{update_version, MigrationOptions};
pub use pipeline::{glb_to_gltf, gltf_to_glb, process_gltf, FsIo, PipelineOptions};
pub use resources::{read_resources, write_resources, ResourceIo, WriteOptions};
