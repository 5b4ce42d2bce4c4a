// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Strictness diagnostics: uses of undeclared variables under `use strict`.
//!
//! This is a best-effort heuristic over the token stream, not an
//! interpreter. Every `Symbol` token runs through a fixed-order rule
//! pipeline; the first rule that recognises the token as not-a-variable,
//! a dereference form, a special variable, or a declared name ends the
//! check. Only tokens inside a strict region can produce a diagnostic.

use std::sync::LazyLock;

use perlscope_ast::{
    next_non_trivia, prev_non_trivia, Document, Ident, IncludeKeyword, Node, Stmt, Token,
    TokenKind,
};
use rustc_hash::FxHashSet;

use crate::index::Index;

/// An undeclared-variable diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDiagnostic {
    pub message: String,
    pub offset: u32,
}

/// Report undeclared variable usages under `use strict`.
pub fn strict_var_diagnostics(doc: &Document, index: &Index) -> Vec<VarDiagnostic> {
    strict_var_diagnostics_with_extra(doc, index, None)
}

/// Report undeclared variable usages, treating `extra` names as declared.
///
/// `extra` carries the import-derived allowlist of §4.4.
pub fn strict_var_diagnostics_with_extra(
    doc: &Document,
    index: &Index,
    extra: Option<&FxHashSet<Ident>>,
) -> Vec<VarDiagnostic> {
    let allow_class = has_use_module(&doc.root, "Test2::Tools::Target");
    let checker = Checker {
        doc,
        index,
        extra,
        allow_class,
    };
    let tokens = &doc.tokens;
    let mut diags = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.kind != TokenKind::Symbol {
            i += 1;
            continue;
        }
        match checker.verdict(i) {
            Verdict::Ok(next) => i = next,
            Verdict::Violation => {
                diags.push(VarDiagnostic {
                    message: format!(
                        "use strict vars: variable {} is not declared",
                        tok.value
                    ),
                    offset: tok.span.start,
                });
                i += 1;
            }
        }
    }
    diags
}

enum Verdict {
    /// Declared or exempt; resume the walk at this index
    Ok(usize),
    Violation,
}

struct Checker<'a> {
    doc: &'a Document,
    index: &'a Index,
    extra: Option<&'a FxHashSet<Ident>>,
    allow_class: bool,
}

impl Checker<'_> {
    fn verdict(&self, i: usize) -> Verdict {
        let tokens = &self.doc.tokens;
        let tok = &tokens[i];
        let value = tok.value.as_str();
        let offset = tok.span.start;
        let skip = Verdict::Ok(i + 1);

        // hash-size form swallowed into a comment: `$` + `#{$name}…`
        if value == "$" {
            if let Some(next) = tokens.get(i + 1) {
                if next.kind == TokenKind::Comment && next.value.starts_with("#{") {
                    if let Some(name) = hash_size_comment_var(&next.value) {
                        if is_special_var(&name) || self.visible(&name, offset) {
                            return skip;
                        }
                    }
                }
            }
        }

        // typeglobs and subroutine sigils are not variable names
        if value.starts_with('*') || value.starts_with('&') {
            return skip;
        }
        if value == "%" && is_modulo_operator(tokens, i) {
            return skip;
        }

        // `@name{…}` hash slice resolves against `%name`
        if value.starts_with('@') && value.len() > 1 {
            if let Some(next) = next_non_trivia(tokens, i + 1) {
                if tokens[next].is_op("{") {
                    let alt = format!("%{}", &value[1..]);
                    if self.allowed(&alt, offset) {
                        return skip;
                    }
                }
            }
        }

        // lone `@` / `%` before `$`, `{`, or after `->` are dereferences
        if value == "@" || value == "%" {
            if is_post_deref(tokens, i) || is_sigil_deref(tokens, i) {
                return skip;
            }
        }

        if value == "$" {
            if is_hash_size_deref(tokens, i) {
                return skip;
            }
            if let Some(consumed) = composite_special_var(tokens, i) {
                return Verdict::Ok(consumed + 1);
            }
            // scalar dereference `$$x`
            if let Some(next) = next_non_trivia(tokens, i + 1) {
                let next_tok = &tokens[next];
                if next_tok.kind == TokenKind::Symbol && next_tok.value.starts_with('$') {
                    if is_special_var(&next_tok.value) || self.visible(&next_tok.value, offset) {
                        return skip;
                    }
                }
            }
        }

        if value == "$#" {
            if let Some(next) = next_non_trivia(tokens, i + 1) {
                let next_tok = &tokens[next];
                if next_tok.is_op("{") {
                    return skip;
                }
                if next_tok.kind == TokenKind::Symbol
                    && next_tok.value.starts_with('$')
                    && self.visible(&next_tok.value, offset)
                {
                    return skip;
                }
            }
        }

        // `$#name` resolves against `@name`
        if value.starts_with("$#") && value.len() > 2 {
            let alt = format!("@{}", &value[2..]);
            if is_special_var(&alt) || self.visible(&alt, offset) {
                return skip;
            }
        }

        // `${ … }` block dereference
        if value == "$" {
            if let Some(next) = next_non_trivia(tokens, i + 1) {
                if tokens[next].is_op("{") {
                    return skip;
                }
            }
        }

        if !strict_at(&self.doc.root, offset) {
            return skip;
        }
        if self.in_extra(value) {
            return skip;
        }
        if is_special_var(value) {
            return skip;
        }
        if self.allow_class && value == "$CLASS" {
            return skip;
        }
        if value.contains("::") {
            return skip;
        }
        if self.visible(value, offset) {
            return skip;
        }

        // cross-sigil element access: `$name{…}` → `%name`, `$name[…]` → `@name`
        if value.starts_with('$') && value.len() > 1 {
            if let Some(next) = next_non_trivia(tokens, i + 1) {
                let next_tok = &tokens[next];
                if next_tok.kind == TokenKind::Operator {
                    let alt = match next_tok.value.as_str() {
                        "{" => Some(format!("%{}", &value[1..])),
                        "[" => Some(format!("@{}", &value[1..])),
                        _ => None,
                    };
                    if let Some(alt) = alt {
                        if self.allowed(&alt, offset) {
                            return skip;
                        }
                    }
                }
            }
        }

        Verdict::Violation
    }

    fn visible(&self, name: &str, offset: u32) -> bool {
        self.index.is_visible(name, offset)
    }

    fn in_extra(&self, name: &str) -> bool {
        self.extra.is_some_and(|set| set.contains(name))
    }

    /// extras, special set, or declared — the combined alt-name check.
    fn allowed(&self, name: &str, offset: u32) -> bool {
        self.in_extra(name) || is_special_var(name) || self.visible(name, offset)
    }
}

// === strict regions ===

/// The effective `use strict` state at a byte offset.
pub fn strict_at(root: &Node, offset: u32) -> bool {
    strict_in_nodes(&root.children, offset, false)
}

fn strict_in_nodes(nodes: &[Node], offset: u32, mut strict: bool) -> bool {
    for node in nodes {
        let range = node.token_range();
        if let Some(r) = range {
            if offset < r.start {
                return strict;
            }
        }
        // toggles inside a block do not leak outside; the current flag
        // carries in
        if node.is_block() {
            if let Some(r) = range {
                if r.contains(offset) {
                    return strict_in_nodes(&node.children, offset, strict);
                }
            }
        }
        for child in &node.children {
            if !child.is_block() {
                continue;
            }
            if let Some(r) = child.token_range() {
                if r.contains(offset) {
                    return strict_in_nodes(&child.children, offset, strict);
                }
            }
        }
        if is_strict_toggle(node) {
            if let Some(r) = range {
                if offset < r.end {
                    return strict;
                }
            }
            strict = strict_value(node);
        }
    }
    strict
}

fn is_strict_toggle(node: &Node) -> bool {
    let Some(Stmt::Include(inc)) = node.stmt() else {
        return false;
    };
    if inc.keyword == IncludeKeyword::Use {
        if let Some(version) = &inc.version {
            if is_strict_version(version) {
                return true;
            }
        }
    }
    let strict_name = inc
        .name
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case("strict"));
    strict_name && matches!(inc.keyword, IncludeKeyword::Use | IncludeKeyword::No)
}

fn strict_value(node: &Node) -> bool {
    let Some(Stmt::Include(inc)) = node.stmt() else {
        return false;
    };
    if inc.keyword == IncludeKeyword::Use {
        if let Some(version) = &inc.version {
            if is_strict_version(version) {
                return true;
            }
        }
    }
    inc.keyword == IncludeKeyword::Use
}

/// `use VERSION` enables strict from 5.12 on.
pub fn is_strict_version(version: &str) -> bool {
    let Some((major, minor, _patch)) = parse_perl_version(version) else {
        return false;
    };
    if major != 5 {
        return major > 5;
    }
    minor >= 12
}

/// Parse `v5.12.1`, `5.012`, `5.012001`, or a bare integer form.
fn parse_perl_version(version: &str) -> Option<(u32, u32, u32)> {
    let v = version.trim().trim_start_matches('v');
    if v.is_empty() {
        return None;
    }
    if v.contains('.') {
        let mut parts = v.split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        return Some((major, minor, patch));
    }
    let val: u64 = v.parse().ok()?;
    if val < 10 {
        return Some((val as u32, 0, 0));
    }
    if val >= 1_000_000 {
        return Some((
            (val / 1_000_000) as u32,
            ((val / 1000) % 1000) as u32,
            (val % 1000) as u32,
        ));
    }
    if val >= 1000 {
        return Some(((val / 1000) as u32, (val % 1000) as u32, 0));
    }
    None
}

/// Whether the document `use`s the given module anywhere.
pub fn has_use_module(root: &Node, name: &str) -> bool {
    let mut found = false;
    root.walk(&mut |node| {
        if found {
            return;
        }
        if let Some(Stmt::Include(inc)) = node.stmt() {
            if inc.keyword == IncludeKeyword::Use && inc.name.as_deref() == Some(name) {
                found = true;
            }
        }
    });
    found
}

// === token-shape helpers ===

fn is_post_deref(tokens: &[Token], idx: usize) -> bool {
    if idx == 0 {
        return false;
    }
    prev_non_trivia(tokens, idx - 1).is_some_and(|prev| tokens[prev].is_op("->"))
}

fn is_sigil_deref(tokens: &[Token], idx: usize) -> bool {
    let Some(next) = next_non_trivia(tokens, idx + 1) else {
        return false;
    };
    let tok = &tokens[next];
    if tok.kind == TokenKind::Symbol
        && (tok.value.starts_with('$') || tok.value.starts_with('%'))
    {
        return true;
    }
    tok.is_op("{")
}

fn is_hash_size_deref(tokens: &[Token], idx: usize) -> bool {
    let Some(next) = next_non_trivia(tokens, idx + 1) else {
        return false;
    };
    if !tokens[next].is_op("#") {
        return false;
    }
    let Some(after) = next_non_trivia(tokens, next + 1) else {
        return false;
    };
    let tok = &tokens[after];
    tok.is_op("{") || (tok.kind == TokenKind::Symbol && tok.value.starts_with('$'))
}

/// Composite punctuation specials following a lone `$`: `$!`, `$^W`, `$]`, …
/// Returns the index of the last consumed token.
fn composite_special_var(tokens: &[Token], idx: usize) -> Option<usize> {
    let next = next_non_trivia(tokens, idx + 1)?;
    let tok = &tokens[next];
    if !matches!(tok.kind, TokenKind::Operator | TokenKind::Symbol) {
        return None;
    }
    match tok.value.as_str() {
        "^" => {
            let word_idx = next_non_trivia(tokens, next + 1)?;
            let word = &tokens[word_idx];
            if !matches!(word.kind, TokenKind::Word | TokenKind::Operator) {
                return None;
            }
            let name = format!("$^{}", word.value);
            is_special_var(&name).then_some(word_idx)
        }
        "#" => {
            let var_idx = next_non_trivia(tokens, next + 1)?;
            tokens[var_idx].is_op("{").then_some(var_idx)
        }
        "]" | "[" | "?" | "!" | "@" | "$" | "<" | ">" | "|" | "," | ";" | ":" | "-" | "~"
        | "*" | "'" | "\"" | "/" | "=" | "\\" => {
            let name = format!("${}", tok.value);
            is_special_var(&name).then_some(next)
        }
        _ => None,
    }
}

/// Variable name embedded in a `#{…}` comment token, sigil included.
fn hash_size_comment_var(value: &str) -> Option<String> {
    let pos = value.find('$')?;
    let rest = &value[pos + 1..];
    let len = rest
        .bytes()
        .take_while(|&b| b == b'_' || b == b':' || b.is_ascii_alphanumeric())
        .count();
    if len == 0 {
        return None;
    }
    Some(value[pos..pos + 1 + len].to_string())
}

/// Is a lone `%` a modulo operator? Both neighbours must look like operands.
fn is_modulo_operator(tokens: &[Token], idx: usize) -> bool {
    if idx == 0 {
        return false;
    }
    let Some(prev) = prev_non_trivia(tokens, idx - 1) else {
        return false;
    };
    let Some(next) = next_non_trivia(tokens, idx + 1) else {
        return false;
    };
    is_operand_token(&tokens[prev], true) && is_operand_token(&tokens[next], false)
}

fn is_operand_token(tok: &Token, left: bool) -> bool {
    match tok.kind {
        TokenKind::Symbol => !matches!(tok.value.as_str(), "$" | "@" | "%" | "&"),
        TokenKind::Word
        | TokenKind::Number
        | TokenKind::Quote
        | TokenKind::QuoteLike
        | TokenKind::HereDocContent => true,
        TokenKind::Operator => {
            if left {
                matches!(tok.value.as_str(), ")" | "]" | "}")
            } else {
                matches!(tok.value.as_str(), "(" | "[" | "{")
            }
        }
        _ => false,
    }
}

// === special variables ===

/// Names always treated as declared: punctuation variables, their English
/// aliases, and the well-known global arrays and hashes.
static SPECIAL_VARS: LazyLock<FxHashSet<&'static str>> = LazyLock::new(|| {
    [
        "$_", "$.", "$/", "$,", "$\\", "$|", "$%", "$=", "$-", "$~", "$^", "$:", "$?", "$!",
        "$@", "$$", "$<", "$>", "$[", "$]", "$;", "$\"", "$'", "$`", "$^L", "$^A", "$^E",
        "$^F", "$^H", "$^I", "$^M", "$^O", "$^P", "$^R", "$^S", "$^T", "$^V", "$^W", "$^X",
        "$^CHILD_ERROR_NATIVE", "$^C", "$^D", "$ARGV", "$ARGVOUT", "$LAST_PAREN_MATCH",
        "$LAST_SUBMATCH_RESULT", "$INPUT_LINE_NUMBER", "$NR", "$INPUT_RECORD_SEPARATOR",
        "$RS", "$OUTPUT_FIELD_SEPARATOR", "$OFS", "$OUTPUT_RECORD_SEPARATOR", "$ORS",
        "$OUTPUT_AUTOFLUSH", "$OFMT", "$FORMAT_PAGE_NUMBER", "$FORMAT_LINES_PER_PAGE",
        "$FORMAT_LINES_LEFT", "$FORMAT_NAME", "$FORMAT_TOP_NAME",
        "$FORMAT_LINE_BREAK_CHARACTERS", "$FORMAT_FORMFEED", "$ACCUMULATOR", "$CHILD_ERROR",
        "$CHILD_ERROR_NATIVE", "$ENCODING", "$OS_ERROR", "$EVAL_ERROR", "$PROCESS_ID", "$PID",
        "$REAL_USER_ID", "$UID", "$EFFECTIVE_USER_ID", "$EUID", "$REAL_GROUP_ID", "$GID",
        "$EFFECTIVE_GROUP_ID", "$EGID", "$PROGRAM_NAME", "$0", "$SUBSCRIPT_SEPARATOR",
        "$DB::single", "$DB::trace", "$DB::signal", "$DB::deep", "@ARGV", "@INC", "@_",
        "@EXPORT", "@EXPORT_OK", "@ISA", "@F", "%ENV", "%SIG", "%INC", "%ARGV",
        "%EXPORT_TAGS", "%^H",
    ]
    .into_iter()
    .collect()
});

/// Whether `name` is an always-exempt special variable.
pub fn is_special_var(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    if SPECIAL_VARS.contains(name) {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes[0] == b'$' && name.len() == 2 {
        if bytes[1].is_ascii_digit() || bytes[1] == b'a' || bytes[1] == b'b' {
            return true;
        }
    }
    name.starts_with("$^")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diags(src: &str) -> Vec<VarDiagnostic> {
        let doc = perlscope_parser::parse(src);
        let index = Index::new(&doc);
        strict_var_diagnostics(&doc, &index)
    }

    #[test]
    fn test_use_strict_reports_undeclared() {
        let out = diags("use strict; my $x = 1; $x; $y;");
        assert_eq!(out.len(), 1);
        assert!(out[0]
            .message
            .starts_with("use strict vars: variable $y is not declared"));
        assert!(out[0].offset > 0);
    }

    #[test]
    fn test_version_gated_strict() {
        let out = diags("use v5.12; my $x = 1; $x; $y;");
        assert_eq!(out.len(), 1);
        let out = diags("use v5.10; $y;");
        assert_eq!(out.len(), 0);
    }

    #[test]
    fn test_no_strict_disables() {
        assert_eq!(diags("use strict; no strict; $y;").len(), 0);
        assert_eq!(diags("no strict; use strict; $y;").len(), 1);
    }

    #[test]
    fn test_block_scoped_toggle() {
        let out = diags("use strict; { no strict; $y; } $z;");
        assert_eq!(out.len(), 1);
        assert!(out[0].message.contains("$z"));
    }

    #[test]
    fn test_special_variables_exempt() {
        assert_eq!(diags("use strict; $^X; $]; $_; @ARGV; %ENV; $0; $a; $b;").len(), 0);
    }

    #[test]
    fn test_cross_sigil_element_access() {
        assert_eq!(diags("use strict; my @f; my %g; $f[0]; $g{a};").len(), 0);
    }

    #[test]
    fn test_cross_sigil_mismatch() {
        let out = diags("use strict; my @f; my %g; $f{a}; $g[0];");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_deref_sigils() {
        assert_eq!(diags("use strict; my $f; @$f; %$f; @{$f}; %{$f};").len(), 0);
    }

    #[test]
    fn test_post_deref() {
        assert_eq!(diags("use strict; my $f; $f->@*; $f->%*;").len(), 0);
    }

    #[test]
    fn test_hash_slice_resolves_against_hash() {
        assert_eq!(diags("use strict; my %opts; @opts{'a','b'};").len(), 0);
        assert_eq!(diags("use strict; @missing{'a'};").len(), 1);
    }

    #[test]
    fn test_array_last_index() {
        assert_eq!(diags("use strict; my @list; $#list;").len(), 0);
        assert_eq!(diags("use strict; $#nope;").len(), 1);
    }

    #[test]
    fn test_qualified_names_exempt() {
        assert_eq!(diags("use strict; $Foo::Bar::baz = 1;").len(), 0);
    }

    #[test]
    fn test_modulo_not_a_variable() {
        assert_eq!(diags("use strict; my $x = 10 % 3; my $y = $x % 2;").len(), 0);
    }

    #[test]
    fn test_extra_allowlist() {
        let doc = perlscope_parser::parse("use strict; $FOO = 1;");
        let index = Index::new(&doc);
        assert_eq!(strict_var_diagnostics(&doc, &index).len(), 1);
        let mut extra = FxHashSet::default();
        extra.insert(Ident::new("$FOO"));
        assert_eq!(
            strict_var_diagnostics_with_extra(&doc, &index, Some(&extra)).len(),
            0
        );
    }

    #[test]
    fn test_class_var_with_test2_target() {
        assert_eq!(
            diags("use strict; use Test2::Tools::Target; $CLASS->new;").len(),
            0
        );
        assert_eq!(diags("use strict; $CLASS->new;").len(), 1);
    }

    #[test]
    fn test_signature_params_declared() {
        assert_eq!(
            diags("use strict; sub foo ($self, $opt, @rest) { $self; $opt; @rest }").len(),
            0
        );
    }

    #[test]
    fn test_strict_version_parse() {
        assert!(is_strict_version("v5.12"));
        assert!(is_strict_version("5.012"));
        assert!(is_strict_version("v5.36.0"));
        assert!(is_strict_version("7"));
        assert!(!is_strict_version("v5.10"));
        assert!(!is_strict_version("5.008"));
        assert!(!is_strict_version(""));
    }
}
