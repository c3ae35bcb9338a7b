//! glTF Convert CLI
//!
//! Convert between glTF and binary glTF (GLB), migrating legacy schema
//! revisions to 2.0 along the way.

use clap::Parser;
use gltf_convert::{glb_to_gltf, gltf_to_glb, process_gltf, FsIo, PipelineOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gltf-convert")]
#[command(author, version, about = "Convert between glTF and binary glTF (GLB)", long_about = None)]
struct Cli {
    /// Input file (.gltf or .glb)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (.gltf or .glb); the conversion direction is inferred
    /// from the extensions
    #[arg(short, long)]
    output: PathBuf,

    /// Save buffers as separate .bin files
    #[arg(long)]
    separate_buffers: bool,

    /// Save images as separate files
    #[arg(long)]
    separate_textures: bool,

    /// Save shaders as separate .glsl files
    #[arg(long)]
    separate_shaders: bool,

    /// Write embedded resources as data URIs instead of buffer views
    #[arg(long)]
    data_uris: bool,

    /// Leave out the binary chunk when the GLB has no buffer data
    #[arg(long)]
    omit_empty_binary_chunk: bool,

    /// Stop schema migration at this version (e.g. "1.0")
    #[arg(long)]
    target_version: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let options = PipelineOptions {
        target_version: cli.target_version.clone(),
        separate_buffers: cli.separate_buffers,
        separate_textures: cli.separate_textures,
        separate_shaders: cli.separate_shaders,
        data_uris: cli.data_uris,
        omit_empty_binary_chunk: cli.omit_empty_binary_chunk,
    };
    let input_dir = cli.input.parent().unwrap_or(Path::new("."));
    let output_dir = cli.output.parent().unwrap_or(Path::new("."));
    let mut io = FsIo::with_output(input_dir, output_dir);

    let input_is_glb = has_extension(&cli.input, "glb");
    let output_is_glb = has_extension(&cli.output, "glb");

    println!(
        "Converting {} -> {}",
        cli.input.display(),
        cli.output.display()
    );

    let gltf = if input_is_glb {
        let glb = fs::read(&cli.input)?;
        glb_to_gltf(&glb, &options, &mut io)?
    } else {
        serde_json::from_slice(&fs::read(&cli.input)?)?
    };

    if output_is_glb {
        let glb = gltf_to_glb(gltf, &options, &mut io)?;
        fs::write(&cli.output, glb)?;
    } else {
        let gltf = if input_is_glb {
            // already been through the pipeline during GLB parsing
            gltf
        } else {
            process_gltf(gltf, &options, &mut io)?
        };
        fs::write(&cli.output, serde_json::to_vec_pretty(&gltf)?)?;
    }

    println!("Wrote {}", cli.output.display());
    Ok(())
}
