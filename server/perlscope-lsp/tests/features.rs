// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! End-to-end feature checks built from the public pieces: parse, index,
//! workspace, signature types, and completion candidates.

use std::path::{Path, PathBuf};

use perlscope_analysis::sig::{receiver_names_at, var_sig_type};
use perlscope_analysis::strict::strict_var_diagnostics_with_extra;
use perlscope_analysis::workspace::WorkspaceIndex;
use perlscope_analysis::Index;
use perlscope_lsp::complete::{method_completion_items, method_prefix_for_receivers};
use perlscope_lsp::exports::{exported_strict_vars, ModuleExportCache};
use tower_lsp::lsp_types::{Position, Range};

fn write_module(dir: &Path, rel: &str, source: &str) -> PathBuf {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, source).expect("write");
    path
}

/// Method completion after `$app->` offers workspace subs of the class the
/// signature annotation names, and hover sees the class type.
#[test]
fn method_completion_uses_sig_class() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_module(
        dir.path(),
        "lib/App/cpm/CLI.pm",
        "package App::cpm::CLI;\nsub bar {}\n1;\n",
    );
    let workspace = WorkspaceIndex::build(&[dir.path().join("lib")]);

    let cases = [
        "# :SIG(App::cpm::CLI -> void)\nsub foo ($app) {\n    $app->\n}\n",
        "# :SIG(App::cpm::CLI -> void)\nsub foo {\n    my $app = shift;\n    $app->\n}\n",
        "# :SIG(App::cpm::CLI -> void)\nsub foo {\n    my ($app) = shift;\n    $app->\n}\n",
        "sub foo {\n    # SIG(App::cpm::CLI)\n    my $app = shift;\n    $app->\n}\n",
        "sub foo {\n    # SIG(App::cpm::CLI)\n    my ($app) = @_;\n    $app->\n}\n",
    ];
    for src in cases {
        let doc = perlscope_parser::parse(src);
        let index = Index::new(&doc);
        let offset = (src.find("$app->").expect("arrow") + "$app->".len()) as u32;

        let receivers = receiver_names_at(&doc, &index, offset);
        let (prefix, _start, recv) =
            method_prefix_for_receivers(src, offset, &receivers).expect("method context");
        assert_eq!(prefix, "");
        assert_eq!(recv.as_str(), "$app");

        let class = receivers.get(&recv).expect("class");
        assert_eq!(class, "App::cpm::CLI");

        let methods = workspace.methods_of_package(class);
        let range = Range {
            start: Position { line: 0, character: 0 },
            end: Position { line: 0, character: 0 },
        };
        let items = method_completion_items(&methods, prefix, range);
        assert!(
            items.iter().any(|item| item.label == "bar"),
            "expected bar completion for {src:?}, got {:?}",
            items.iter().map(|item| &item.label).collect::<Vec<_>>()
        );
    }
}

/// Without a signature annotation no receiver is known, so `$app->` gets no
/// method completion context.
#[test]
fn no_method_completion_without_sig() {
    let src = "package App::cpm::CLI;\nsub bar {}\nsub foo { my $app = shift; $app-> }\n";
    let doc = perlscope_parser::parse(src);
    let index = Index::new(&doc);
    let offset = (src.find("$app->").expect("arrow") + "$app->".len()) as u32;

    let receivers = receiver_names_at(&doc, &index, offset);
    assert!(method_prefix_for_receivers(src, offset, &receivers).is_none());
}

/// Hover on a variable assigned from an annotated sub call renders the
/// return type.
#[test]
fn hover_type_from_return_value() {
    let src = "# :SIG(any -> App::cpm::CLI)\nsub bar {\n}\n\nmy $x = bar(undef);\n$x;\n";
    let doc = perlscope_parser::parse(src);
    let index = Index::new(&doc);
    let offset = src.find("$x;").expect("use") as u32;
    assert_eq!(
        var_sig_type(&doc, &index, "$x", offset).as_deref(),
        Some("App::cpm::CLI")
    );
}

/// A module's `@EXPORT` makes its variables usable under strict in a file
/// that uses it without an import list; `use M ()` suppresses that.
#[test]
fn exports_gate_strict_diagnostics() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_module(
        dir.path(),
        "lib/M.pm",
        "package M;\nour @EXPORT = qw($FOO);\n1;\n",
    );
    let cache = ModuleExportCache::default();

    let with_defaults = write_module(
        dir.path(),
        "with_defaults.pl",
        "use strict;\nuse M;\n$FOO = 1;\n",
    );
    let doc = perlscope_parser::parse(&std::fs::read_to_string(&with_defaults).expect("read"));
    let index = Index::new(&doc);
    let extra = exported_strict_vars(&doc, &with_defaults, None, &[], &cache);
    assert!(strict_var_diagnostics_with_extra(&doc, &index, Some(&extra)).is_empty());

    let no_imports = write_module(
        dir.path(),
        "no_imports.pl",
        "use strict;\nuse M ();\n$FOO = 1;\n",
    );
    let doc = perlscope_parser::parse(&std::fs::read_to_string(&no_imports).expect("read"));
    let index = Index::new(&doc);
    let extra = exported_strict_vars(&doc, &no_imports, None, &[], &cache);
    let diags = strict_var_diagnostics_with_extra(&doc, &index, Some(&extra));
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("$FOO"));
}

/// The workspace exclude filter never returns definitions from the
/// excluded file.
#[test]
fn workspace_exclude_filter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_module(dir.path(), "lib/P.pm", "package P;\nsub f {}\n1;\n");
    let workspace = WorkspaceIndex::build(&[dir.path().join("lib")]);
    assert_eq!(workspace.find_subs_full("P::f", None).len(), 1);
    assert!(workspace.find_subs_full("P::f", Some(&path)).is_empty());
}
