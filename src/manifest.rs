//! Writes the build manifest described in spec.md §6 ("Persisted state"): the emitter's host
//! source files `<project>_ppc_recomp_*.rs`, the function-table initialization file, and a JSON
//! manifest enumerating both. This is the one piece of persisted state the crate's offline half
//! owns; the runtime itself keeps nothing on disk.
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::emitter::EmittedFunction;

/// How many functions the codegen binary bundles into one generated source file, the same
/// chunking a large translation unit needs to keep any single host file compilable in reasonable
/// time.
pub const FUNCTIONS_PER_FILE: usize = 256;

/// One generated host source file's contribution to the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFileEntry {
    pub path: String,
    pub function_count: usize,
}

/// The full build manifest: every generated source file plus the function-table initializer,
/// serialized as JSON next to the generated sources.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub project: String,
    pub source_files: Vec<SourceFileEntry>,
    pub mapping_file: String,
    pub function_count: usize,
}

/// Splits `functions` into [`FUNCTIONS_PER_FILE`]-sized chunks and renders each chunk's source
/// text, returning `(file_name, source_text)` pairs in the order they should be written.
pub fn render_source_files(project: &str, functions: &[EmittedFunction]) -> Vec<(String, String)> {
    functions
        .chunks(FUNCTIONS_PER_FILE)
        .enumerate()
        .map(|(idx, chunk)| {
            let name = format!("{project}_ppc_recomp_{idx}.rs");
            let mut text = String::new();
            for f in chunk {
                text.push_str(&f.render_source());
                text.push('\n');
            }
            (name, text)
        })
        .collect()
}

/// Renders the function-table initialization file: a `FuncMappings[]` array pairing every guest
/// entry address with the symbol [`render_source_files`] gave it, consumed at startup by
/// [`crate::runtime::dispatch::install_global_table`]'s caller to populate the indirect-dispatch
/// table.
pub fn render_mapping_file(project: &str, functions: &[EmittedFunction]) -> String {
    let mut text = format!(
        "// Generated function-table initializer for {project}. Do not edit by hand.\n\
         // Expected to be `include!`d into the module that also includes the generated\n\
         // `{project}_ppc_recomp_*.rs` source files, so the bare symbol names below resolve.\n\
         pub static FUNC_MAPPINGS: &[(u32, crate::runtime::GuestFn)] = &[\n"
    );
    for f in functions {
        text.push_str(&format!("    (0x{:08x}, {}),\n", f.mapping.address, f.mapping.symbol));
    }
    text.push_str("];\n");
    text
}

/// Builds the manifest describing what [`render_source_files`]/[`render_mapping_file`] would
/// write for `functions`, without touching the filesystem.
pub fn build_manifest(project: &str, functions: &[EmittedFunction]) -> Manifest {
    let source_files = render_source_files(project, functions)
        .into_iter()
        .map(|(name, text)| SourceFileEntry {
            path: name,
            function_count: text.matches("pub unsafe extern \"C\" fn").count(),
        })
        .collect();

    Manifest {
        project: project.to_string(),
        source_files,
        mapping_file: format!("{project}_func_mappings.rs"),
        function_count: functions.len(),
    }
}

/// Writes every generated source file, the mapping file, and the manifest itself (as
/// `<project>_manifest.json`) under `out_dir`.
pub fn write_all(out_dir: &Path, project: &str, functions: &[EmittedFunction]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;

    for (name, text) in render_source_files(project, functions) {
        std::fs::write(out_dir.join(name), text)?;
    }

    let manifest = build_manifest(project, functions);
    std::fs::write(out_dir.join(&manifest.mapping_file), render_mapping_file(project, functions))?;

    let manifest_path = out_dir.join(format!("{project}_manifest.json"));
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&manifest_path, json)?;

    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{graph::FunctionGraph, Image};
    use crate::emitter::emit_all;

    fn word_bytes(instrs: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(instrs.len() * 4);
        for w in instrs {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }

    fn encode_blr() -> u32 {
        (19u32 << 26) | (20 << 21) | (0 << 16) | (16 << 1)
    }

    fn sample_functions() -> Vec<EmittedFunction> {
        let code = word_bytes(&[encode_blr()]);
        let image = Image {
            segments: vec![crate::analyzer::Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = crate::analyzer::hints::AnalyzerHints::default();
        let config = crate::analyzer::AnalyzerConfig::default();
        let graph: FunctionGraph = crate::analyzer::load(&image, &hints, &config).unwrap();
        emit_all(&image, &graph, &std::collections::BTreeMap::new()).unwrap()
    }

    #[test]
    fn manifest_lists_one_function_in_one_file() {
        let functions = sample_functions();
        let manifest = build_manifest("xenon_recomp", &functions);
        assert_eq!(manifest.function_count, 1);
        assert_eq!(manifest.source_files.len(), 1);
        assert_eq!(manifest.source_files[0].function_count, 1);
        assert_eq!(manifest.mapping_file, "xenon_recomp_func_mappings.rs");
    }

    #[test]
    fn mapping_file_contains_the_entry_address() {
        let functions = sample_functions();
        let text = render_mapping_file("xenon_recomp", &functions);
        assert!(text.contains("0x82000000"));
    }

    #[test]
    fn functions_are_chunked_across_files() {
        let mut functions = sample_functions();
        let extra = functions[0].clone();
        for _ in 0..FUNCTIONS_PER_FILE {
            functions.push(extra.clone());
        }
        let files = render_source_files("xenon_recomp", &functions);
        assert_eq!(files.len(), 2);
    }
}
