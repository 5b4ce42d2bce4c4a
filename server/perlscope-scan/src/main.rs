// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Batch scanner: walk Perl distribution trees and print every parse and
//! strict-vars diagnostic as `path:line:col: message`, sorted.
//!
//! Only `lib/` and `t/` under each root are scanned (`blib/` and `share/`
//! hold generated copies). Files are truncated at `__DATA__`/`__END__`
//! before parsing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Parser;
use perlscope_analysis::strict::strict_var_diagnostics_with_extra;
use perlscope_analysis::Index;
use perlscope_ast::span::Span;
use perlscope_lsp::exports::{exported_strict_vars, perl_inc_paths, ModuleExportCache};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "perlscope-scan")]
#[command(version, about = "Scan Perl trees for perlscope diagnostics")]
struct Cli {
    /// Root directories to scan
    #[arg(value_name = "ROOT", default_values_t = default_roots())]
    roots: Vec<String>,
}

fn default_roots() -> Vec<String> {
    vec!["Module-Build".to_string(), "ExtUtils-MakeMaker".to_string()]
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    path: String,
    line: u32,
    col: u32,
    message: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();
    let cli = Cli::parse();

    let base_dir = match std::env::var_os("SCAN_BASE_DIR") {
        Some(base) if !base.is_empty() => PathBuf::from(base),
        _ => match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },
    };

    let inc_roots = perl_inc_paths();
    let cache = ModuleExportCache::default();
    let mut entries = Vec::new();
    let mut visited = HashSet::new();

    for root in &cli.roots {
        if root.is_empty() {
            continue;
        }
        let root = PathBuf::from(root);
        let real_root = root.canonicalize().unwrap_or(root);
        if !visited.insert(real_root.clone()) {
            continue;
        }
        scan_root(&real_root, &base_dir, &inc_roots, &cache, &mut entries);
    }

    entries.sort();
    for entry in entries {
        println!("{}:{}:{}: {}", entry.path, entry.line, entry.col, entry.message);
    }
}

fn scan_root(
    root: &Path,
    base_dir: &Path,
    inc_roots: &[PathBuf],
    cache: &ModuleExportCache,
    entries: &mut Vec<Entry>,
) {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(allowed_entry);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry.path().extension().and_then(|ext| ext.to_str());
        if !matches!(ext, Some("pm") | Some("pl") | Some("t")) {
            continue;
        }
        scan_file(entry.path(), base_dir, inc_roots, cache, entries);
    }
}

/// Keep `lib/` and `t/` under the root, drop hidden directories and the
/// generated `blib/` and `share/` copies.
fn allowed_entry(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() && name.starts_with('.') {
        return false;
    }
    if entry.depth() == 1 {
        return matches!(name.as_ref(), "lib" | "t");
    }
    true
}

fn scan_file(
    path: &Path,
    base_dir: &Path,
    inc_roots: &[PathBuf],
    cache: &ModuleExportCache,
    entries: &mut Vec<Entry>,
) {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("{}: {err}", path.display());
            std::process::exit(1);
        }
    };
    let source = strip_after_data(&data);
    let doc = perlscope_parser::parse(source);
    let display_path = path.display().to_string();

    for diag in &doc.diagnostics {
        push_entry(entries, &display_path, source, diag.offset, &diag.message);
    }

    let index = Index::new(&doc);
    let extra = exported_strict_vars(&doc, path, Some(base_dir), inc_roots, cache);
    for diag in strict_var_diagnostics_with_extra(&doc, &index, Some(&extra)) {
        push_entry(entries, &display_path, source, diag.offset, &diag.message);
    }
}

fn push_entry(entries: &mut Vec<Entry>, path: &str, source: &str, offset: u32, message: &str) {
    let linecol = Span::offset_to_linecol(source, offset);
    entries.push(Entry {
        path: path.to_string(),
        line: linecol.line,
        col: linecol.col,
        message: message.to_string(),
    });
}

/// Truncate the buffer at the first `__DATA__` / `__END__` line.
fn strip_after_data(source: &str) -> &str {
    let mut line_start = 0;
    for (i, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            let line = &source[line_start..i];
            if is_data_marker(line) {
                return &source[..line_start];
            }
            line_start = i + 1;
        }
    }
    if is_data_marker(&source[line_start..]) {
        return &source[..line_start];
    }
    source
}

fn is_data_marker(line: &str) -> bool {
    let trimmed = line.trim_start_matches([' ', '\t']);
    trimmed.starts_with("__DATA__") || trimmed.starts_with("__END__")
}
