//! The `codegen` CLI: wires the analyzer and emitter together per spec.md §6's CLI surface.
//! `codegen --config <path> [--force] [--enable-exception-handlers]` loads a project
//! configuration, runs analysis, emits every discovered function, and writes the generated
//! sources plus build manifest. Exit codes: `0` success, `1` validation failure, `2` I/O error.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Deserialize;

use xenon_recomp::analyzer::hints::AnalyzerHints;
use xenon_recomp::analyzer::{AnalyzerConfig, Image, Segment};
use xenon_recomp::emitter;
use xenon_recomp::manifest;

#[derive(Parser, Debug)]
#[clap(name = "codegen", about = "Static PowerPC-to-Rust recompiler code generator")]
struct Args {
    /// Path to the project configuration (TOML or JSON).
    #[clap(long)]
    config: PathBuf,
    /// Emit past analysis diagnostics instead of refusing.
    #[clap(long)]
    force: bool,
    /// Reserved for a future exception-handler wrapper pass; currently only gates a log line, as
    /// exception-handler code generation is an external collaborator's concern per spec.md §1.
    #[clap(long)]
    enable_exception_handlers: bool,
}

/// One image segment as the config file declares it: a raw flat binary slice loaded at
/// `guest_base`. XEX/ELF container parsing is out of scope (spec.md §1); this crate consumes an
/// already-unpacked set of segments.
#[derive(Debug, Deserialize)]
struct SegmentConfig {
    guest_base: u32,
    path: PathBuf,
    #[serde(default)]
    executable: bool,
}

/// The project configuration `--config` points at.
#[derive(Debug, Deserialize)]
struct ProjectConfig {
    /// Symbol prefix for generated source files and the function-table initializer.
    project: String,
    entry_point: u32,
    #[serde(default)]
    exports: Vec<u32>,
    segments: Vec<SegmentConfig>,
    /// Analyzer hint sidecar, if any.
    hints: Option<PathBuf>,
    /// Directory generated sources, the mapping file, and the manifest are written to.
    out_dir: PathBuf,
    #[serde(default)]
    data_region_threshold: Option<u32>,
    #[serde(default)]
    large_function_threshold: Option<u32>,
}

impl ProjectConfig {
    fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            _ => serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        }
    }
}

fn load_image(config: &ProjectConfig) -> std::io::Result<Image> {
    let mut segments = Vec::with_capacity(config.segments.len());
    for seg in &config.segments {
        let data = std::fs::read(&seg.path)?;
        segments.push(Segment { guest_base: seg.guest_base, data, executable: seg.executable });
    }
    Ok(Image { segments, entry_point: config.entry_point, exports: config.exports.clone() })
}

fn run(args: Args) -> Result<(), ExitCode> {
    let config = ProjectConfig::load(&args.config).map_err(|e| {
        log::error!("failed to read config {:?}: {e}", args.config);
        ExitCode::from(2)
    })?;

    if args.enable_exception_handlers {
        log::info!("exception-handler wrapper generation requested; wrappers are emitted by an external pass");
    }

    let image = load_image(&config).map_err(|e| {
        log::error!("failed to load image segments: {e}");
        ExitCode::from(2)
    })?;

    let hints = match &config.hints {
        Some(path) => AnalyzerHints::load(path).map_err(|e| {
            log::error!("failed to load hints {path:?}: {e}");
            ExitCode::from(2)
        })?,
        None => AnalyzerHints::default(),
    };

    let mut analyzer_config = AnalyzerConfig { force: args.force, ..AnalyzerConfig::default() };
    if let Some(v) = config.data_region_threshold {
        analyzer_config.data_region_threshold = v;
    }
    if let Some(v) = config.large_function_threshold {
        analyzer_config.large_function_threshold = v;
    }

    let graph = xenon_recomp::analyzer::load(&image, &hints, &analyzer_config).map_err(|diagnostics| {
        for err in &diagnostics.0 {
            log::error!("analysis diagnostic: {err}");
        }
        ExitCode::from(1)
    })?;

    let mid_asm_hooks = hints.resolved_mid_asm_hooks().map_err(|e| {
        log::error!("failed to resolve mid_asm_hooks addresses: {e}");
        ExitCode::from(2)
    })?;

    let functions = emitter::emit_all(&image, &graph, &mid_asm_hooks).map_err(|e| {
        log::error!("emission failed: {e}");
        ExitCode::from(1)
    })?;

    let manifest_path = manifest::write_all(&config.out_dir, &config.project, &functions).map_err(|e| {
        log::error!("failed to write generated output: {e}");
        ExitCode::from(2)
    })?;

    let file_count = (functions.len() + manifest::FUNCTIONS_PER_FILE - 1) / manifest::FUNCTIONS_PER_FILE;
    log::info!("emitted {} function(s) across {} file(s); manifest at {:?}", functions.len(), file_count, manifest_path);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
