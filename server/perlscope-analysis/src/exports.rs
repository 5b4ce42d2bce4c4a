// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Compile-time exports and the import-aware allowlist.
//!
//! Extracts `our @EXPORT = qw(...)` symbol lists from modules, classifies
//! `use` statements by their import lists, and resolves module names to
//! files through the include-root search path. The resulting sigiled-name
//! set feeds the strictness engine as its extras allowlist.

use std::path::{Path, PathBuf};

use perlscope_ast::{
    next_non_trivia, qw_items, Document, Ident, ImportKind, IncludeKeyword, Node, Stmt, Token,
    TokenKind,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Pragmas that never contribute exported symbols.
const PRAGMAS: &[&str] = &["strict", "warnings", "lib", "feature", "utf8", "parent", "base"];

/// Variables exported via `our @EXPORT = qw(...)` or `@Pkg::EXPORT = (...)`.
///
/// Only sigil-prefixed names (`$`, `@`, `%`) inside the qw list count.
pub fn exported_symbols(doc: &Document) -> FxHashSet<Ident> {
    let mut out = FxHashSet::default();
    doc.root.walk(&mut |node: &Node| {
        if node.stmt().is_none() {
            return;
        }
        let tokens = &node.tokens;
        let Some(mut pos) = next_non_trivia(tokens, 0) else {
            return;
        };
        if tokens[pos].is_word("our") {
            let Some(next) = next_non_trivia(tokens, pos + 1) else {
                return;
            };
            pos = next;
        }
        if tokens[pos].kind != TokenKind::Symbol || !is_export_array_symbol(&tokens[pos].value) {
            return;
        }
        let Some(mut pos) = next_non_trivia(tokens, pos + 1) else {
            return;
        };
        if !tokens[pos].is_op("=") {
            return;
        }
        let Some(next) = next_non_trivia(tokens, pos + 1) else {
            return;
        };
        pos = next;
        if tokens[pos].is_op("(") {
            let Some(next) = next_non_trivia(tokens, pos + 1) else {
                return;
            };
            pos = next;
        }
        if tokens[pos].kind != TokenKind::QuoteLike {
            return;
        }
        for item in qw_items(&tokens[pos].value) {
            if item.starts_with(['$', '@', '%']) && item.len() > 1 {
                out.insert(Ident::new(item));
            }
        }
    });
    out
}

fn is_export_array_symbol(name: &str) -> bool {
    name == "@EXPORT" || (name.starts_with('@') && name.ends_with("::EXPORT"))
}

/// Sigiled names in explicit import lists, plus the set of modules whose
/// statement supplied an explicit list at all.
pub fn collect_use_sigil_imports(
    root: &Node,
) -> (FxHashMap<Ident, FxHashSet<Ident>>, FxHashSet<Ident>) {
    let mut imports: FxHashMap<Ident, FxHashSet<Ident>> = FxHashMap::default();
    let mut explicit = FxHashSet::default();
    for_each_use(root, |name, inc| {
        if inc.import_kind.is_explicit() {
            explicit.insert(name.clone());
        }
        if inc.import_list.is_empty() {
            return;
        }
        let items = import_sigil_items(&inc.import_list, inc.import_kind);
        if items.is_empty() {
            return;
        }
        imports.entry(name.clone()).or_default().extend(items);
    });
    (imports, explicit)
}

fn import_sigil_items(tokens: &[Token], kind: ImportKind) -> Vec<Ident> {
    if tokens.is_empty() {
        return Vec::new();
    }
    if kind == ImportKind::Qw && tokens.len() == 1 && tokens[0].kind == TokenKind::QuoteLike {
        return qw_items(&tokens[0].value)
            .into_iter()
            .filter(|item| item.len() > 1 && item.starts_with(['$', '@', '%']))
            .map(Ident::new)
            .collect();
    }
    let mut items = Vec::new();
    for tok in tokens {
        match tok.kind {
            TokenKind::Symbol => {
                if tok.value.len() > 1 && tok.value.starts_with(['$', '@', '%']) {
                    items.push(tok.value.clone());
                }
            }
            TokenKind::Quote => {
                let trimmed = tok.value.trim_matches(|c| matches!(c, '\'' | '"' | '`'));
                if trimmed.len() > 1 && trimmed.starts_with(['$', '@', '%']) {
                    items.push(Ident::new(trimmed));
                }
            }
            _ => {}
        }
    }
    items
}

/// Modules pulled in by `use`, pragmas excluded.
pub fn collect_use_modules(root: &Node) -> FxHashSet<Ident> {
    let mut out = FxHashSet::default();
    for_each_use(root, |name, _| {
        if !PRAGMAS.contains(&name.as_str()) {
            out.insert(name.clone());
        }
    });
    out
}

/// Normalised import names per used module, for definition resolution.
pub fn collect_use_imports(root: &Node) -> FxHashMap<Ident, FxHashSet<Ident>> {
    let mut out: FxHashMap<Ident, FxHashSet<Ident>> = FxHashMap::default();
    for_each_use(root, |name, inc| {
        let mut items = inc.import_items.clone();
        if items.is_empty() {
            items = import_items_from_args(&inc.args);
        }
        if items.is_empty() {
            return;
        }
        let set = out.entry(name.clone()).or_default();
        for item in items {
            if let Some(normalised) = normalize_import_name(&item) {
                set.insert(normalised);
            }
        }
    });
    out
}

/// Strip `&` sigils, quotes, and package qualifiers from an import name.
pub fn normalize_import_name(item: &str) -> Option<Ident> {
    let item = item
        .trim_start_matches('&')
        .trim_matches(|c| matches!(c, '\'' | '"' | '`'));
    if item.is_empty() {
        return None;
    }
    let name = match item.rfind("::") {
        Some(idx) => &item[idx + 2..],
        None => item,
    };
    if name.is_empty() {
        None
    } else {
        Some(Ident::new(name))
    }
}

/// Bareword and quoted names from a raw argument token list.
pub fn import_items_from_args(tokens: &[Token]) -> Vec<Ident> {
    let mut items = Vec::new();
    for tok in tokens {
        match tok.kind {
            TokenKind::Word => items.push(tok.value.clone()),
            TokenKind::Quote => {
                let trimmed = tok.value.trim_matches(|c| matches!(c, '\'' | '"' | '`'));
                if !trimmed.is_empty() {
                    items.push(Ident::new(trimmed));
                }
            }
            _ => {}
        }
    }
    items
}

/// Does an explicit import list ask for the default export set?
pub fn has_default_tag(imports: Option<&FxHashSet<Ident>>) -> bool {
    imports.is_some_and(|set| set.iter().any(|item| item.eq_ignore_ascii_case(":default")))
}

/// `use lib` paths, resolved against the given base directory.
pub fn collect_use_lib_paths(root: &Node, base_dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for_each_include(root, |inc| {
        if inc.keyword != IncludeKeyword::Use {
            return;
        }
        if inc.name.as_deref() != Some("lib") {
            return;
        }
        let mut items = inc.import_items.clone();
        if items.is_empty() {
            items = import_items_from_args(&inc.args);
        }
        for item in items {
            let trimmed = item.trim_matches(|c| matches!(c, '\'' | '"' | '`'));
            if trimmed.is_empty() {
                continue;
            }
            let path = Path::new(trimmed);
            if path.is_absolute() {
                out.push(path.to_path_buf());
            } else {
                out.push(base_dir.join(path));
            }
        }
    });
    out
}

/// Probe `<root>/A/B/C.pm` for module `A::B::C` across the search roots.
pub fn find_module_file(name: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    if name.is_empty() || roots.is_empty() {
        return None;
    }
    let mut rel = PathBuf::new();
    for part in name.split("::") {
        rel.push(part);
    }
    rel.set_extension("pm");
    for root in roots {
        let candidate = root.join(&rel);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn for_each_use(root: &Node, mut f: impl FnMut(&Ident, &perlscope_ast::IncludeStmt)) {
    for_each_include(root, |inc| {
        if inc.keyword != IncludeKeyword::Use {
            return;
        }
        if let Some(name) = &inc.name {
            f(name, inc);
        }
    });
}

fn for_each_include(root: &Node, mut f: impl FnMut(&perlscope_ast::IncludeStmt)) {
    root.walk(&mut |node| {
        if let Some(Stmt::Include(inc)) = node.stmt() {
            f(inc);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exported_symbols() {
        let doc = perlscope_parser::parse("our @EXPORT = qw($FOO @BAR %BAZ);");
        let exports = exported_symbols(&doc);
        assert_eq!(exports.len(), 3);
        for name in ["$FOO", "@BAR", "%BAZ"] {
            assert!(exports.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_exported_symbols_qualified_array() {
        let doc = perlscope_parser::parse("@My::Module::EXPORT = qw($X);");
        let exports = exported_symbols(&doc);
        assert!(exports.contains("$X"));
    }

    #[test]
    fn test_exported_symbols_skips_barewords() {
        let doc = perlscope_parser::parse("our @EXPORT = qw(foo $BAR);");
        let exports = exported_symbols(&doc);
        assert_eq!(exports.len(), 1);
        assert!(exports.contains("$BAR"));
    }

    #[test]
    fn test_collect_use_sigil_imports() {
        let doc =
            perlscope_parser::parse("use My::Module qw($FOO);\nuse Other ();\nuse Plain;\n");
        let (imports, explicit) = collect_use_sigil_imports(&doc.root);
        assert!(imports.get("My::Module").is_some_and(|set| set.contains("$FOO")));
        assert!(explicit.contains("My::Module"));
        assert!(explicit.contains("Other"));
        assert!(!explicit.contains("Plain"));
    }

    #[test]
    fn test_collect_use_modules_skips_pragmas() {
        let doc = perlscope_parser::parse("use strict;\nuse warnings;\nuse My::Module;\n");
        let modules = collect_use_modules(&doc.root);
        assert_eq!(modules.len(), 1);
        assert!(modules.contains("My::Module"));
    }

    #[test]
    fn test_normalize_import_name() {
        assert_eq!(normalize_import_name("&foo").as_deref(), Some("foo"));
        assert_eq!(normalize_import_name("'bar'").as_deref(), Some("bar"));
        assert_eq!(normalize_import_name("A::B::baz").as_deref(), Some("baz"));
        assert_eq!(normalize_import_name(""), None);
    }

    #[test]
    fn test_has_default_tag() {
        let mut set = FxHashSet::default();
        set.insert(Ident::new("$FOO"));
        assert!(!has_default_tag(Some(&set)));
        set.insert(Ident::new(":default"));
        assert!(has_default_tag(Some(&set)));
        assert!(!has_default_tag(None));
    }

    #[test]
    fn test_collect_use_lib_paths() {
        let doc = perlscope_parser::parse("use lib '../lib';\nuse lib \"/abs/lib\";\n");
        let paths = collect_use_lib_paths(&doc.root, Path::new("/proj/bin"));
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], Path::new("/proj/bin/../lib"));
        assert_eq!(paths[1], Path::new("/abs/lib"));
    }

    #[test]
    fn test_find_module_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mod_dir = dir.path().join("App").join("cpm");
        std::fs::create_dir_all(&mod_dir).expect("mkdir");
        let mod_path = mod_dir.join("CLI.pm");
        std::fs::write(&mod_path, "package App::cpm::CLI;\n1;\n").expect("write");

        let roots = vec![dir.path().to_path_buf()];
        assert_eq!(find_module_file("App::cpm::CLI", &roots), Some(mod_path));
        assert_eq!(find_module_file("App::cpm::Missing", &roots), None);
    }
}
