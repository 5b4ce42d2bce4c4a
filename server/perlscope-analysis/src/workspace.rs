// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Workspace-wide symbol index.
//!
//! Walks the configured roots once, parses every `.pm` file, and records
//! package and sub definitions. Sub definitions are stored under both the
//! bare name and `package::name`, where the package is the innermost
//! `package` statement preceding the sub. The index is immutable once
//! built; rebuilds swap in a fresh value.

use std::path::{Path, PathBuf};

use perlscope_ast::span::Span;
use perlscope_ast::{Document, Ident, Node, Stmt};
use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use crate::index::SymbolKind;

/// A definition found during the workspace walk.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: Ident,
    pub kind: SymbolKind,
    pub file: PathBuf,
    pub span: Span,
}

/// Map of package and sub definitions across the workspace.
#[derive(Debug, Default)]
pub struct WorkspaceIndex {
    packages: FxHashMap<Ident, Vec<Definition>>,
    subs: FxHashMap<Ident, Vec<Definition>>,
    files: usize,
}

impl WorkspaceIndex {
    /// Build the index by walking each root for `.pm` files.
    ///
    /// Directory symlinks are followed; hidden directories are skipped;
    /// unreadable files are skipped with a debug log.
    pub fn build(roots: &[PathBuf]) -> Self {
        let mut index = Self::default();
        for root in roots {
            if root.as_os_str().is_empty() {
                continue;
            }
            let walker = WalkDir::new(root).follow_links(true).into_iter();
            for entry in walker.filter_entry(|entry| !is_hidden_dir(entry)) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        tracing::debug!(root = %root.display(), error = %err, "workspace walk error");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().extension().and_then(|ext| ext.to_str()) != Some("pm") {
                    continue;
                }
                index.index_file(entry.path());
            }
        }
        index
    }

    fn index_file(&mut self, path: &Path) {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "workspace read failed");
                return;
            }
        };
        let doc = perlscope_parser::parse(&source);
        for def in collect_file_definitions(&doc, path) {
            match def.kind {
                SymbolKind::Package => {
                    self.packages.entry(def.name.clone()).or_default().push(def)
                }
                SymbolKind::Sub => {
                    let qualified =
                        Ident::new(format!("{}::{}", doc.package_at(def.span.start), def.name));
                    self.subs.entry(def.name.clone()).or_default().push(def.clone());
                    self.subs.entry(qualified).or_default().push(def);
                }
                SymbolKind::Var => {}
            }
        }
        self.files += 1;
    }

    /// Number of files indexed.
    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Package definitions with this exact qualified name.
    pub fn find_packages(&self, name: &str, exclude: Option<&Path>) -> Vec<Definition> {
        filter_definitions(self.packages.get(name), exclude)
    }

    /// Sub definitions stored under the bare name.
    pub fn find_subs(&self, name: &str, exclude: Option<&Path>) -> Vec<Definition> {
        filter_definitions(self.subs.get(name), exclude)
    }

    /// Sub definitions stored under a `pkg::name` key.
    pub fn find_subs_full(&self, qualified: &str, exclude: Option<&Path>) -> Vec<Definition> {
        filter_definitions(self.subs.get(qualified), exclude)
    }

    /// Names of subs defined in the given package, for method completion.
    pub fn methods_of_package(&self, package: &str) -> Vec<Ident> {
        let prefix = format!("{package}::");
        let mut out: Vec<Ident> = self
            .subs
            .keys()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.contains("::"))
            .map(Ident::new)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn filter_definitions(defs: Option<&Vec<Definition>>, exclude: Option<&Path>) -> Vec<Definition> {
    let Some(defs) = defs else {
        return Vec::new();
    };
    defs.iter()
        .filter(|def| exclude.map_or(true, |path| def.file != path))
        .cloned()
        .collect()
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Collect named sub and package definitions from a parsed file.
pub fn collect_file_definitions(doc: &Document, path: &Path) -> Vec<Definition> {
    let mut defs = Vec::new();
    doc.root.walk(&mut |node: &Node| {
        let (name, kind) = match node.stmt() {
            Some(Stmt::Sub(sub)) => match &sub.name {
                Some(name) => (name.clone(), SymbolKind::Sub),
                None => return,
            },
            Some(Stmt::Package(pkg)) => (pkg.name.clone(), SymbolKind::Package),
            _ => return,
        };
        let Some(span) = node_name_span(node, &name) else {
            return;
        };
        defs.push(Definition {
            name,
            kind,
            file: path.to_path_buf(),
            span,
        });
    });
    defs
}

/// Span of the token spelling the definition's name, falling back to the
/// node's full range for names split across tokens.
fn node_name_span(node: &Node, name: &str) -> Option<Span> {
    if let Some(tok) = node.tokens.iter().find(|tok| tok.value == name) {
        return Some(tok.span);
    }
    node.token_range()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_module(dir: &Path, rel: &str, source: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, source).expect("write");
        path
    }

    #[test]
    fn test_build_and_lookup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = write_module(
            dir.path(),
            "lib/App/cpm/CLI.pm",
            "package App::cpm::CLI;\nsub new {}\nsub run {}\n1;\n",
        );
        write_module(
            dir.path(),
            "lib/App/cpm/Util.pm",
            "package App::cpm::Util;\nsub run {}\n1;\n",
        );

        let index = WorkspaceIndex::build(&[dir.path().join("lib")]);
        assert_eq!(index.file_count(), 2);

        let pkgs = index.find_packages("App::cpm::CLI", None);
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].file, cli);

        // bare name finds both, qualified name only one
        assert_eq!(index.find_subs("run", None).len(), 2);
        assert_eq!(index.find_subs_full("App::cpm::CLI::run", None).len(), 1);
        assert_eq!(index.find_subs_full("App::cpm::Util::run", None).len(), 1);
    }

    #[test]
    fn test_exclude_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_module(
            dir.path(),
            "lib/P.pm",
            "package P;\nsub f {}\n1;\n",
        );
        let index = WorkspaceIndex::build(&[dir.path().join("lib")]);
        assert_eq!(index.find_subs_full("P::f", None).len(), 1);
        assert!(index.find_subs_full("P::f", Some(&path)).is_empty());
    }

    #[test]
    fn test_subs_before_package_default_to_main() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_module(dir.path(), "lib/Loose.pm", "sub free {}\n1;\n");
        let index = WorkspaceIndex::build(&[dir.path().join("lib")]);
        assert_eq!(index.find_subs_full("main::free", None).len(), 1);
    }

    #[test]
    fn test_hidden_dirs_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_module(dir.path(), "lib/.git/Sneaky.pm", "package Sneaky;\n1;\n");
        write_module(dir.path(), "lib/Seen.pm", "package Seen;\n1;\n");
        let index = WorkspaceIndex::build(&[dir.path().join("lib")]);
        assert_eq!(index.file_count(), 1);
        assert!(index.find_packages("Sneaky", None).is_empty());
        assert_eq!(index.find_packages("Seen", None).len(), 1);
    }

    #[test]
    fn test_methods_of_package() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_module(
            dir.path(),
            "lib/App/X.pm",
            "package App::X;\nsub new {}\nsub process {}\n1;\n",
        );
        let index = WorkspaceIndex::build(&[dir.path().join("lib")]);
        let methods = index.methods_of_package("App::X");
        assert_eq!(methods, vec!["new", "process"]);
    }
}
