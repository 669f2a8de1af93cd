//! Static descriptor emission.
//!
//! One JSON object per eligible block, one block per line, in the walker's
//! (function, block) traversal order. The file lands next to the module:
//! `<dirname(module_id)>/bbtrace_static/<basename(module_id)>.bbinfo.jsonl`.
//!
//! Record content comes entirely from the trace plan captured before any
//! rewriting, so instrumented and static-only runs of the pass produce
//! byte-identical files. Failing to create or write the file is a compiler
//! diagnostic, not a compile failure.

use super::walker::{InstKind, InstNote, ModuleTrace};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Serialize)]
struct BlockRecord<'a> {
    func_id: u32,
    func_name: &'a str,
    bb_id: u32,
    bb_name: &'a str,
    header: String,
    insts: Vec<InstRecord<'a>>,
}

#[derive(Serialize)]
struct InstRecord<'a> {
    text: String,
    kind: InstKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    inst_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<&'a [u32]>,
}

impl<'a> InstRecord<'a> {
    fn from_note(note: &'a InstNote) -> Self {
        InstRecord {
            text: format!("  {}", note.text),
            kind: note.kind,
            inst_id: note.inst_id,
            targets: note.targets.as_deref(),
        }
    }
}

/// Where the descriptor for a module id goes. The `bbtrace_static` directory
/// is a sibling of the module, creation is idempotent.
pub fn descriptor_path(module_id: &str) -> PathBuf {
    let module = Path::new(module_id);
    let dir = module.parent().unwrap_or_else(|| Path::new(""));
    let base = module
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    dir.join("bbtrace_static").join(format!("{base}.bbinfo.jsonl"))
}

/// Render the descriptor content: UTF-8, Unix newlines, one record per line.
pub fn render(trace: &ModuleTrace) -> Result<String> {
    let mut out = String::new();
    for func in &trace.funcs {
        for block in &func.blocks {
            let mut insts: Vec<InstRecord<'_>> =
                block.insts.iter().map(InstRecord::from_note).collect();
            insts.push(InstRecord::from_note(&block.terminator));
            let record = BlockRecord {
                func_id: func.func_id,
                func_name: &func.name,
                bb_id: block.bb_id,
                bb_name: &block.name,
                header: format!("{}:", block.name),
                insts,
            };
            out.push_str(
                &serde_json::to_string(&record).context("failed to serialize block record")?,
            );
            out.push('\n');
        }
    }
    Ok(out)
}

/// Write the descriptor file for a module. Returns the path on success and
/// `None` when emission was skipped after an I/O diagnostic.
pub fn emit(module_id: &str, trace: &ModuleTrace) -> Result<Option<PathBuf>> {
    let content = render(trace)?;
    let path = descriptor_path(module_id);
    if let Some(dir) = path.parent() {
        if let Err(err) = fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), %err, "skipping static descriptor emission");
            return Ok(None);
        }
    }
    match fs::write(&path, content) {
        Ok(()) => {
            debug!(path = %path.display(), "wrote static descriptor");
            Ok(Some(path))
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "skipping static descriptor emission");
            Ok(None)
        }
    }
}
