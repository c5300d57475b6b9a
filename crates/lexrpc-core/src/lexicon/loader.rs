//! Lexicon document loading.
//!
//! Reads lexicon JSON documents from a directory tree, or from the default
//! set embedded in the library at build time.

use crate::error::{LexError, Result};
use include_dir::{include_dir, Dir, File};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

static BUNDLED_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/lexicons");

/// The default lexicon documents shipped with lexrpc.
///
/// Parsed fresh on every call; callers pass the result to
/// [`Registry::load`](super::Registry::load) explicitly.
pub fn bundled_documents() -> Result<Vec<Value>> {
    let mut files = Vec::new();
    collect_json_files(&BUNDLED_DIR, &mut files);
    files.sort_by(|a, b| a.path().cmp(b.path()));

    let documents = files
        .into_iter()
        .map(|file| {
            serde_json::from_slice(file.contents()).map_err(|e| LexError::Json {
                message: format!(
                    "Failed to parse bundled lexicon {}: {}",
                    file.path().display(),
                    e
                ),
                source: Some(e),
            })
        })
        .collect::<Result<Vec<Value>>>()?;

    debug!("{} bundled lexicons", documents.len());
    Ok(documents)
}

fn collect_json_files(dir: &'static Dir<'static>, out: &mut Vec<&'static File<'static>>) {
    out.extend(
        dir.files()
            .filter(|file| file.path().extension().is_some_and(|e| e == "json")),
    );
    for sub in dir.dirs() {
        collect_json_files(sub, out);
    }
}

/// Load every `*.json` lexicon document under `dir`, recursively.
///
/// Files are read in sorted path order so that later files deterministically
/// override earlier definitions with the same id.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Value>> {
    let dir = dir.as_ref();
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| LexError::Io {
            message: format!("Failed to read lexicon directory: {}", e),
            path: e.path().map(Path::to_path_buf),
            source: None,
        })?;

        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "json") {
            continue;
        }

        documents.push(load_file(path)?);
    }

    info!("Read {} lexicons from {}", documents.len(), dir.display());
    Ok(documents)
}

/// Load a single lexicon document file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| LexError::io_with_path(e, path))?;

    serde_json::from_str(&content).map_err(|e| LexError::Json {
        message: format!("Failed to parse lexicon from {}: {}", path.display(), e),
        source: Some(e),
    })
}
