// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Import-aware strictness allowlist for one document.
//!
//! Combines the document's `use` statements with the module files found
//! on the search path: explicit sigiled imports are always honoured, and
//! a module's `@EXPORT` list is merged in when the statement imports the
//! defaults (no list at all, or a `:default` tag). Module parses are
//! cached per path and invalidated by file modification time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use perlscope_analysis::exports::{
    collect_use_imports, collect_use_lib_paths, collect_use_modules, collect_use_sigil_imports,
    exported_symbols, find_module_file, has_default_tag,
};
use perlscope_ast::{Document, Ident};
use rustc_hash::{FxHashMap, FxHashSet};

/// Cache of per-module export sets keyed by file path.
#[derive(Default)]
pub struct ModuleExportCache {
    entries: Mutex<FxHashMap<PathBuf, CacheEntry>>,
}

struct CacheEntry {
    mtime: Option<SystemTime>,
    exports: Arc<FxHashSet<Ident>>,
}

impl ModuleExportCache {
    /// Exported sigiled names of the module file, re-parsing only when the
    /// file changed on disk.
    pub fn exports_of(&self, path: &Path) -> Arc<FxHashSet<Ident>> {
        let mtime = std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(path) {
                if entry.mtime.is_some() && entry.mtime == mtime {
                    return Arc::clone(&entry.exports);
                }
            }
        }
        let exports = match std::fs::read_to_string(path) {
            Ok(source) => {
                let doc = perlscope_parser::parse(&source);
                Arc::new(exported_symbols(&doc))
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "module export read failed");
                Arc::new(FxHashSet::default())
            }
        };
        self.entries.lock().insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                exports: Arc::clone(&exports),
            },
        );
        exports
    }
}

/// Module search paths for a file: `use lib` directives, the project's
/// `lib` and `local/lib/perl5`, then the default include roots.
pub fn module_search_paths(
    doc: &Document,
    file_path: &Path,
    base_dir: Option<&Path>,
    inc_roots: &[PathBuf],
) -> Vec<PathBuf> {
    let file_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
    let base = base_dir.unwrap_or(file_dir);
    let mut paths = collect_use_lib_paths(&doc.root, base);
    paths.push(base.join("lib"));
    paths.push(base.join("local").join("lib").join("perl5"));
    paths.extend(inc_roots.iter().cloned());
    unique_existing_dirs(paths)
}

/// The strictness extras for a document: explicit sigiled imports plus
/// default `@EXPORT` sets of the modules it uses.
pub fn exported_strict_vars(
    doc: &Document,
    file_path: &Path,
    base_dir: Option<&Path>,
    inc_roots: &[PathBuf],
    cache: &ModuleExportCache,
) -> FxHashSet<Ident> {
    let use_modules = collect_use_modules(&doc.root);
    if use_modules.is_empty() {
        return FxHashSet::default();
    }
    let (use_imports, explicit) = collect_use_sigil_imports(&doc.root);
    let use_names = collect_use_imports(&doc.root);
    let search_paths = module_search_paths(doc, file_path, base_dir, inc_roots);
    if search_paths.is_empty() {
        return FxHashSet::default();
    }

    let mut out = FxHashSet::default();
    for (name, items) in &use_imports {
        if explicit.contains(name) {
            out.extend(items.iter().cloned());
        }
    }
    for name in &use_modules {
        if explicit.contains(name) && !has_default_tag(use_names.get(name)) {
            continue;
        }
        let Some(mod_path) = find_module_file(name, &search_paths) else {
            tracing::debug!(module = %name, "module export lookup failed");
            continue;
        };
        let exports = cache.exports_of(&mod_path);
        if !exports.is_empty() {
            tracing::debug!(
                module = %name,
                file = %mod_path.display(),
                count = exports.len(),
                "module exports loaded"
            );
            out.extend(exports.iter().cloned());
        }
    }
    out
}

/// Deduplicate and drop paths that are not existing directories.
pub fn unique_existing_dirs(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = FxHashSet::default();
    paths
        .into_iter()
        .filter(|path| !path.as_os_str().is_empty())
        .filter(|path| {
            if !path.is_dir() {
                tracing::debug!(path = %path.display(), "skip missing root");
                return false;
            }
            true
        })
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// Ask the host `perl` for its default include roots.
pub fn perl_inc_paths() -> Vec<PathBuf> {
    let output = match std::process::Command::new("perl")
        .arg("-e")
        .arg("print join(\"\\n\", @INC)")
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::debug!(status = %output.status, "perl @INC lookup failed");
            return Vec::new();
        }
        Err(err) => {
            tracing::debug!(error = %err, "perl @INC lookup failed");
            return Vec::new();
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}
