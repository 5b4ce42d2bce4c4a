// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Signature annotations: `# :SIG(...)` comments above subs and variable
//! declarations.
//!
//! The annotation grammar:
//!
//! ```text
//! type      := "any" | "int" | "undef" | class_name
//!            | "array" "[" type "]"
//!            | "hash"  "[" type "]"
//! type_list := "void" | "(void)" | type | "(" type ("," type)+ ")"
//! sig       := type_list | type_list "->" type_list
//! ```
//!
//! Arrows and commas split at top level only (parens and brackets are
//! balanced first). Besides validation this module resolves the type a
//! signature gives to a variable — through its declaration comment, its
//! position in a sub's parameter list, the `shift`/`@_` unpacking idioms,
//! or assignment from an annotated sub's return value.

use perlscope_ast::{next_non_trivia, Document, Ident, Node, Stmt, Token, TokenKind};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::index::Index;

/// A signature validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigError {
    #[error("empty signature")]
    Empty,
    #[error("empty list")]
    EmptyList,
    #[error("empty type")]
    EmptyType,
    #[error("void not allowed here")]
    VoidNotAllowed,
    #[error("array[] missing type")]
    ArrayMissingType,
    #[error("hash[] missing type")]
    HashMissingType,
    #[error("multiple types require parentheses")]
    MissingParens,
    #[error("not a function signature")]
    NotFunction,
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("invalid args: {0}")]
    Args(Box<SigError>),
    #[error("invalid return: {0}")]
    Return(Box<SigError>),
}

/// Validate the contents inside `:SIG(...)`.
pub fn validate_sig(sig: &str) -> Result<(), SigError> {
    let s = sig.trim();
    if s.is_empty() {
        return Err(SigError::Empty);
    }
    if let Some((left, right)) = split_top_level_arrow(s) {
        parse_type_list(left, true).map_err(|err| SigError::Args(Box::new(err)))?;
        parse_type_list(right, true).map_err(|err| SigError::Return(Box::new(err)))?;
        return Ok(());
    }
    validate_type(s, false)
}

/// Argument types of a function signature; empty for `void`.
pub fn parse_sig_args(sig: &str) -> Result<Vec<String>, SigError> {
    let s = sig.trim();
    if s.is_empty() {
        return Err(SigError::Empty);
    }
    let (left, _) = split_top_level_arrow(s).ok_or(SigError::NotFunction)?;
    parse_type_list(left, true)
}

/// Return types of a function signature; empty for `void`.
pub fn parse_sig_return(sig: &str) -> Result<Vec<String>, SigError> {
    let s = sig.trim();
    if s.is_empty() {
        return Err(SigError::Empty);
    }
    let (_, right) = split_top_level_arrow(s).ok_or(SigError::NotFunction)?;
    parse_type_list(right, true)
}

/// Split at the top-level `->`, balancing `(...)` and `[...]`.
fn split_top_level_arrow(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    let mut parens = 0u32;
    let mut brackets = 0u32;
    for i in 0..bytes.len().saturating_sub(1) {
        match bytes[i] {
            b'(' => parens += 1,
            b')' => parens = parens.saturating_sub(1),
            b'[' => brackets += 1,
            b']' => brackets = brackets.saturating_sub(1),
            b'-' if bytes[i + 1] == b'>' && parens == 0 && brackets == 0 => {
                let left = s[..i].trim();
                let right = s[i + 2..].trim();
                if left.is_empty() || right.is_empty() {
                    return None;
                }
                return Some((left, right));
            }
            _ => {}
        }
    }
    None
}

fn parse_type_list(s: &str, allow_void: bool) -> Result<Vec<String>, SigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SigError::EmptyList);
    }
    if s == "void" || s == "(void)" {
        if !allow_void {
            return Err(SigError::VoidNotAllowed);
        }
        return Ok(Vec::new());
    }
    if let Some(body) = s.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        let body = body.trim();
        if body.is_empty() {
            return Err(SigError::EmptyList);
        }
        let parts = split_top_level(body, b',');
        if parts.len() < 2 {
            let item = body.trim();
            validate_type(item, allow_void)?;
            return Ok(vec![item.to_string()]);
        }
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                return Err(SigError::EmptyType);
            }
            validate_type(part, allow_void)?;
            out.push(part.to_string());
        }
        return Ok(out);
    }
    if s.contains(',') {
        return Err(SigError::MissingParens);
    }
    validate_type(s, allow_void)?;
    Ok(vec![s.to_string()])
}

fn validate_type(s: &str, allow_void: bool) -> Result<(), SigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SigError::EmptyType);
    }
    match s {
        "any" | "int" | "undef" => return Ok(()),
        "void" => {
            return if allow_void {
                Ok(())
            } else {
                Err(SigError::VoidNotAllowed)
            };
        }
        _ => {}
    }
    if let Some(inner) = s.strip_prefix("array[").and_then(|rest| rest.strip_suffix(']')) {
        let inner = inner.trim();
        if inner.is_empty() {
            return Err(SigError::ArrayMissingType);
        }
        return validate_type(inner, allow_void);
    }
    if let Some(inner) = s.strip_prefix("hash[").and_then(|rest| rest.strip_suffix(']')) {
        let inner = inner.trim();
        if inner.is_empty() {
            return Err(SigError::HashMissingType);
        }
        return validate_type(inner, allow_void);
    }
    if is_class_name(s) {
        return Ok(());
    }
    Err(SigError::UnknownType(s.to_string()))
}

/// Split on a separator at top level, balancing parens and brackets.
fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut parens = 0u32;
    let mut brackets = 0u32;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => parens += 1,
            b')' => parens = parens.saturating_sub(1),
            b'[' => brackets += 1,
            b']' => brackets = brackets.saturating_sub(1),
            _ if b == sep && parens == 0 && brackets == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// A well-formed `Ident(::Ident)*` package path.
pub fn is_class_name(s: &str) -> bool {
    !s.is_empty() && s.split("::").all(is_ident)
}

/// A class name that is not one of the builtin leaf types.
pub fn is_class_type(s: &str) -> bool {
    !matches!(s, "any" | "int" | "undef" | "void") && is_class_name(s)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

// === annotation comments ===

/// The `<sig>` text of a `# :SIG(...)` / `# SIG(...)` comment on the line
/// directly above `offset`.
pub fn sig_comment_before_offset(text: &str, offset: u32) -> Option<String> {
    let (line_start, _) = line_bounds(text, offset as usize);
    if line_start == 0 {
        return None;
    }
    let prev_end = line_start - 1;
    let prev_start = text[..prev_end].rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    let line = text[prev_start..prev_end].trim();
    let body = line.strip_prefix('#')?.trim();
    let body = body
        .strip_prefix(":SIG")
        .or_else(|| body.strip_prefix("SIG"))?
        .trim();
    let open = body.find('(')?;
    let close = body.rfind(')')?;
    if close < open + 1 {
        return None;
    }
    Some(body[open + 1..close].trim().to_string())
}

/// Start and end offsets of the line containing `offset`.
pub fn line_bounds(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let start = text[..offset].rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|idx| offset + idx)
        .unwrap_or(text.len());
    (start, end)
}

/// A malformed-signature diagnostic: message plus the comment line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigDiagnostic {
    pub message: String,
    pub start: u32,
    pub end: u32,
}

/// Validate every `# :SIG(...)` comment line in the buffer.
pub fn sig_comment_diagnostics(text: &str) -> Vec<SigDiagnostic> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < text.len() {
        let (line_start, line_end) = line_bounds(text, offset);
        let line = text[line_start..line_end].trim();
        if let Some(body) = line.strip_prefix('#').map(str::trim) {
            if let Some(rest) = body.strip_prefix(":SIG") {
                let open = rest.find('(');
                let close = rest.rfind(')');
                match (open, close) {
                    (Some(open), Some(close)) if close > open => {
                        let sig = rest[open + 1..close].trim();
                        if let Err(err) = validate_sig(sig) {
                            out.push(SigDiagnostic {
                                message: format!("invalid :SIG(...): {err}"),
                                start: line_start as u32,
                                end: line_end as u32,
                            });
                        }
                    }
                    _ => out.push(SigDiagnostic {
                        message: "invalid :SIG(...)".to_string(),
                        start: line_start as u32,
                        end: line_end as u32,
                    }),
                }
            }
        }
        if line_end >= text.len() {
            break;
        }
        offset = line_end + 1;
    }
    out
}

// === call-arity diagnostics ===

/// An argument-count mismatch at a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDiagnostic {
    pub message: String,
    pub offset: u32,
}

/// Check simple calls `name(...)` against the callee's function signature.
///
/// Calls passing arrays, hashes, globs, ranges, or fat commas at the top
/// level are opaque and skipped.
pub fn sig_call_diagnostics(doc: &Document) -> Vec<CallDiagnostic> {
    let mut diags = Vec::new();
    let tokens = &doc.tokens;
    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Word || tok.value.is_empty() {
            continue;
        }
        let Some(node) = find_sub_node(&doc.root, &tok.value) else {
            continue;
        };
        let Some(start) = node.first_code_offset() else {
            continue;
        };
        let Some(sig) = sig_comment_before_offset(&doc.source, start) else {
            continue;
        };
        if !sig.contains("->") {
            continue;
        }
        let Ok(args) = parse_sig_args(&sig) else {
            continue;
        };
        let Some(call_arity) = simple_call_arity(tokens, i + 1) else {
            continue;
        };
        if call_arity != args.len() {
            diags.push(CallDiagnostic {
                message: format!(
                    "call to {}: expected {} args, got {}",
                    tok.value,
                    args.len(),
                    call_arity
                ),
                offset: tok.span.start,
            });
        }
    }
    diags
}

/// Arity of a simple parenthesised call starting at `idx`, or `None` when
/// there is no call or the arguments are opaque.
fn simple_call_arity(tokens: &[Token], idx: usize) -> Option<usize> {
    let open = next_non_trivia(tokens, idx)?;
    if !tokens[open].is_op("(") {
        return None;
    }
    let mut depth = 0u32;
    let mut count = 0usize;
    let mut seen = false;
    let mut opaque = false;
    for tok in &tokens[open..] {
        if tok.kind == TokenKind::Operator {
            match tok.value.as_str() {
                "(" => depth += 1,
                ")" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        if opaque {
                            return None;
                        }
                        if seen {
                            count += 1;
                        }
                        return Some(count);
                    }
                }
                "," if depth == 1 => count += 1,
                "@" | "%" | "*" | ".." | "=>" if depth == 1 => opaque = true,
                _ => {}
            }
        }
        if depth == 1 && tok.kind == TokenKind::Symbol {
            if tok.value.starts_with(['@', '%', '*']) {
                opaque = true;
            }
        }
        if depth == 1 && !tok.is_trivia() {
            if tok.is_op("(") || tok.is_op(",") {
                continue;
            }
            seen = true;
        }
    }
    None
}

/// First sub statement with the given name.
pub fn find_sub_node<'a>(root: &'a Node, name: &str) -> Option<&'a Node> {
    let mut out: Option<&Node> = None;
    root.walk(&mut |node| {
        if out.is_some() {
            return;
        }
        if let Some(Stmt::Sub(sub)) = node.stmt() {
            if sub.name.as_deref() == Some(name) {
                out = Some(node);
            }
        }
    });
    out
}

// === type propagation ===

/// The signature-derived type of variable `name` visible at `offset`.
pub fn var_sig_type(doc: &Document, index: &Index, name: &str, offset: u32) -> Option<String> {
    if !name.starts_with(['$', '@', '%']) {
        return None;
    }
    let decl = index.var_definition_at(name, offset)?;

    // a type literal on the line above the declaration wins
    if let Some(sig) = sig_comment_before_offset(&doc.source, decl.span.start) {
        if !sig.contains("->") && validate_sig(&sig).is_ok() {
            return Some(sig);
        }
    }

    // positional parameter of a sub with a function signature
    if let Some(ty) = signature_param_type(doc, name, decl.span.start) {
        return Some(ty);
    }

    // `my $v = shift;` and friends take the enclosing sub's first arg type
    let stmt = statement_at(&doc.root, decl.span.start)?;
    if is_first_declared_var(stmt, name) {
        if unpacks_first_arg(stmt) {
            let sub = enclosing_sub(&doc.root, decl.span.start)?;
            let sub_start = sub.first_code_offset()?;
            let sig = sig_comment_before_offset(&doc.source, sub_start)?;
            if sig.contains("->") {
                return parse_sig_args(&sig).ok()?.into_iter().next();
            }
            return None;
        }
        // `my $v = name(...)` / `my $v = Pkg->name` takes the return type
        if let Some(callee) = assigned_call_name(stmt) {
            let sub = find_sub_node(&doc.root, &callee)?;
            let sub_start = sub.first_code_offset()?;
            let sig = sig_comment_before_offset(&doc.source, sub_start)?;
            if sig.contains("->") {
                let ret = parse_sig_return(&sig).ok()?;
                if ret.len() == 1 {
                    return ret.into_iter().next();
                }
            }
        }
    }
    None
}

/// Scalar variables at `offset` whose signature-derived type is a class
/// name: the receivers for method completion.
pub fn receiver_names_at(
    doc: &Document,
    index: &Index,
    offset: u32,
) -> FxHashMap<Ident, String> {
    let mut out = FxHashMap::default();
    for sym in index.variables_at(offset) {
        if !sym.name.starts_with('$') {
            continue;
        }
        if let Some(ty) = var_sig_type(doc, index, &sym.name, offset) {
            if is_class_type(&ty) {
                out.insert(sym.name.clone(), ty);
            }
        }
    }
    out
}

/// Type of `name` as a positional signature parameter of the sub starting
/// at `decl_start`.
fn signature_param_type(doc: &Document, name: &str, decl_start: u32) -> Option<String> {
    let mut out = None;
    doc.root.walk(&mut |node| {
        if out.is_some() {
            return;
        }
        let Some(Stmt::Sub(sub)) = node.stmt() else {
            return;
        };
        let Some(span) = node.token_range() else {
            return;
        };
        if span.start != decl_start {
            return;
        }
        let Some(pos) = sub.signature_vars.iter().position(|var| var == name) else {
            return;
        };
        let Some(start) = node.first_code_offset() else {
            return;
        };
        let Some(sig) = sig_comment_before_offset(&doc.source, start) else {
            return;
        };
        if !sig.contains("->") {
            return;
        }
        if let Ok(args) = parse_sig_args(&sig) {
            out = args.into_iter().nth(pos);
        }
    });
    out
}

/// Smallest statement node containing `offset`.
pub fn statement_at(root: &Node, offset: u32) -> Option<&Node> {
    let mut best: Option<(&Node, u32)> = None;
    root.walk(&mut |node| {
        if node.stmt().is_none() {
            return;
        }
        let Some(span) = node.token_range() else {
            return;
        };
        if span.contains(offset) && best.map_or(true, |(_, len)| span.len() < len) {
            best = Some((node, span.len()));
        }
    });
    best.map(|(node, _)| node)
}

/// Innermost sub statement containing `offset`.
pub fn enclosing_sub(root: &Node, offset: u32) -> Option<&Node> {
    let mut best: Option<(&Node, u32)> = None;
    root.walk(&mut |node| {
        if !matches!(node.stmt(), Some(Stmt::Sub(_))) {
            return;
        }
        let Some(span) = node.token_range() else {
            return;
        };
        if span.contains(offset) && best.map_or(true, |(_, len)| span.len() < len) {
            best = Some((node, span.len()));
        }
    });
    best.map(|(node, _)| node)
}

/// Is `name` the first variable declared by this `my` statement?
fn is_first_declared_var(stmt: &Node, name: &str) -> bool {
    let mut saw_my = false;
    for tok in &stmt.tokens {
        if tok.is_trivia() {
            continue;
        }
        if !saw_my {
            if tok.kind == TokenKind::Word && matches!(tok.value.as_str(), "my" | "our" | "state")
            {
                saw_my = true;
            }
            continue;
        }
        if tok.kind == TokenKind::Symbol && tok.value.len() > 1 {
            return tok.value == name;
        }
        if tok.is_op("=") {
            return false;
        }
    }
    false
}

/// Does the declaration unpack the sub's first argument?
/// Matches `= shift`, `= @_`, and `= $_[0]`.
fn unpacks_first_arg(stmt: &Node) -> bool {
    let tokens = &stmt.tokens;
    let Some(assign) = tokens.iter().position(|tok| tok.is_op("=")) else {
        return false;
    };
    let rest: Vec<&Token> = tokens[assign + 1..]
        .iter()
        .filter(|tok| !tok.is_trivia() && !tok.is_op(";"))
        .collect();
    match rest.as_slice() {
        [tok] if tok.is_word("shift") => true,
        [tok] if tok.kind == TokenKind::Symbol && tok.value == "@_" => true,
        [var, open, zero, close]
            if var.kind == TokenKind::Symbol
                && var.value == "$_"
                && open.is_op("[")
                && zero.value == "0"
                && close.is_op("]") =>
        {
            true
        }
        _ => false,
    }
}

/// Callee of `my $v = name(...)` / `my $v = Pkg->name(...)` / `…->name`.
fn assigned_call_name(stmt: &Node) -> Option<Ident> {
    let tokens = &stmt.tokens;
    let assign = tokens.iter().position(|tok| tok.is_op("="))?;
    let rest: Vec<&Token> = tokens[assign + 1..]
        .iter()
        .filter(|tok| !tok.is_trivia() && !tok.is_op(";"))
        .collect();
    let mut cursor = 0;
    // optional `Pkg->` / `__PACKAGE__->` / `Pkg::Sub->` receiver
    let mut last_word: Option<&Token> = None;
    while cursor < rest.len() {
        let tok = rest[cursor];
        match tok.kind {
            TokenKind::Word => {
                last_word = Some(tok);
                cursor += 1;
            }
            TokenKind::Operator if tok.value == "::" || tok.value == "->" => {
                cursor += 1;
                last_word = None;
            }
            _ => break,
        }
    }
    let name = last_word?;
    // a call either ends the statement or opens parens right away
    match rest.get(cursor) {
        None => Some(name.value.clone()),
        Some(tok) if tok.is_op("(") => Some(name.value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_index(src: &str) -> (Document, Index) {
        let doc = perlscope_parser::parse(src);
        let index = Index::new(&doc);
        (doc, index)
    }

    #[test]
    fn test_validate_types() {
        for sig in [
            "any",
            "int",
            "undef",
            "Foo",
            "Foo::Bar",
            "array[any]",
            "hash[int]",
            "array[hash[any]]",
        ] {
            assert!(validate_sig(sig).is_ok(), "expected valid: {sig}");
        }
    }

    #[test]
    fn test_validate_function_signatures() {
        for sig in [
            "void -> void",
            "(void) -> (void)",
            "any -> any",
            "(any) -> (any)",
            "(any, int) -> any",
            "(any, array[int]) -> (any, any)",
        ] {
            assert!(validate_sig(sig).is_ok(), "expected valid: {sig}");
        }
    }

    #[test]
    fn test_validate_invalid() {
        for sig in [
            "",
            "(any, int) ->",
            "-> any",
            "any, int",
            "(any, )",
            "array[]",
            "hash[]",
            "(any, int -> any",
        ] {
            assert!(validate_sig(sig).is_err(), "expected invalid: {sig}");
        }
    }

    #[test]
    fn test_validate_whitespace_idempotent() {
        for sig in ["any", "(any, int) -> void", "array[hash[any]]"] {
            let padded = format!("   {sig}\t ");
            assert_eq!(validate_sig(sig).is_ok(), validate_sig(&padded).is_ok());
        }
    }

    #[test]
    fn test_parse_sig_args() {
        let args = parse_sig_args("(any, int) -> void").unwrap();
        assert_eq!(args, vec!["any", "int"]);
        assert!(parse_sig_args("void -> void").unwrap().is_empty());
        assert_eq!(parse_sig_args("any"), Err(SigError::NotFunction));
    }

    #[test]
    fn test_parse_sig_return() {
        let ret = parse_sig_return("(any, int) -> App::Foo").unwrap();
        assert_eq!(ret, vec!["App::Foo"]);
        assert!(parse_sig_return("(any, int) -> void").unwrap().is_empty());
    }

    #[test]
    fn test_sig_comment_forms() {
        let src = "# :SIG(any -> void)\nsub foo {}\n";
        let offset = src.find("sub foo").unwrap() as u32;
        assert_eq!(
            sig_comment_before_offset(src, offset).as_deref(),
            Some("any -> void")
        );
        let src = "# SIG(App::X)\nmy $app = shift;\n";
        let offset = src.find("my $app").unwrap() as u32;
        assert_eq!(
            sig_comment_before_offset(src, offset).as_deref(),
            Some("App::X")
        );
    }

    #[test]
    fn test_sig_comment_diagnostics() {
        let out = sig_comment_diagnostics("# :SIG(any -> void)\n# :SIG(bogus!)\n# :SIG\n");
        assert_eq!(out.len(), 2);
        assert!(out[0].message.contains("invalid :SIG"));
    }

    #[test]
    fn test_call_arity_diagnostics() {
        let src = "\n# :SIG((any, int) -> void)\nsub foo {\n}\nfoo(1, 2);\nfoo(1);\nfoo(1, 2, 3);\nfoo(@args);\n# :SIG(any -> void)\nsub bar {\n}\nbar();\n";
        let doc = perlscope_parser::parse(src);
        let diags = sig_call_diagnostics(&doc);
        assert_eq!(diags.len(), 3, "got {diags:?}");
        let msgs: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert!(msgs.iter().any(|m| m.contains("expected 2 args")));
        assert!(msgs.iter().any(|m| m.contains("expected 1 args")));
    }

    #[test]
    fn test_var_type_from_signature_param() {
        let src = "# :SIG(App::cpm::CLI -> void)\nsub foo ($app) {\n    $app;\n}\n";
        let (doc, index) = doc_index(src);
        let offset = src.find("$app;").unwrap() as u32;
        assert_eq!(
            var_sig_type(&doc, &index, "$app", offset).as_deref(),
            Some("App::cpm::CLI")
        );
    }

    #[test]
    fn test_var_type_from_shift_idioms() {
        let cases = [
            "# :SIG(App::cpm::CLI -> void)\nsub foo {\n    my $app = shift;\n    $app;\n}\n",
            "# :SIG(App::cpm::CLI -> void)\nsub foo {\n    my ($app) = shift;\n    $app;\n}\n",
            "sub foo {\n    # SIG(App::cpm::CLI)\n    my $app = shift;\n    $app;\n}\n",
            "sub foo {\n    # SIG(App::cpm::CLI)\n    my ($app) = @_;\n    $app;\n}\n",
            "# :SIG(App::cpm::CLI -> void)\nsub foo {\n    my $app = $_[0];\n    $app;\n}\n",
        ];
        for src in cases {
            let (doc, index) = doc_index(src);
            let offset = src.find("$app;").unwrap() as u32;
            assert_eq!(
                var_sig_type(&doc, &index, "$app", offset).as_deref(),
                Some("App::cpm::CLI"),
                "case: {src}"
            );
        }
    }

    #[test]
    fn test_var_type_from_call_return() {
        let src = "# :SIG(any -> App::cpm::CLI)\nsub bar {\n}\n\nmy $x = bar(undef);\nmy $y = __PACKAGE__->bar();\nmy $z = __PACKAGE__->bar;\n$x;\n$y;\n$z;\n";
        let (doc, index) = doc_index(src);
        for name in ["$x", "$y", "$z"] {
            let offset = src.find(&format!("{name};")).unwrap() as u32;
            assert_eq!(
                var_sig_type(&doc, &index, name, offset).as_deref(),
                Some("App::cpm::CLI"),
                "variable {name}"
            );
        }
    }

    #[test]
    fn test_receiver_names() {
        let src = "# :SIG(App::X -> void)\nsub foo ($app) {\n    $app;\n}\n";
        let (doc, index) = doc_index(src);
        let offset = src.find("$app;").unwrap() as u32;
        let receivers = receiver_names_at(&doc, &index, offset);
        assert_eq!(receivers.get("$app").map(String::as_str), Some("App::X"));
    }

    #[test]
    fn test_no_receiver_without_signature() {
        let src = "sub foo { my $app = shift; $app; }\n";
        let (doc, index) = doc_index(src);
        let offset = src.find("$app;").unwrap() as u32;
        assert!(receiver_names_at(&doc, &index, offset).is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn type_strategy() -> impl Strategy<Value = String> {
            let leaf = prop_oneof![
                Just("any".to_string()),
                Just("int".to_string()),
                Just("undef".to_string()),
                "[A-Z][a-zA-Z0-9_]{0,6}(::[A-Z][a-zA-Z0-9_]{0,6}){0,2}",
            ];
            leaf.prop_recursive(3, 16, 2, |inner| {
                prop_oneof![
                    inner.clone().prop_map(|t| format!("array[{t}]")),
                    inner.prop_map(|t| format!("hash[{t}]")),
                ]
            })
        }

        proptest! {
            #[test]
            fn valid_list_roundtrips_as_args(types in prop::collection::vec(type_strategy(), 1..4)) {
                let list = if types.len() == 1 {
                    types[0].clone()
                } else {
                    format!("({})", types.join(", "))
                };
                prop_assert!(validate_sig(&list).is_ok());
                let args = parse_sig_args(&format!("{list} -> void")).unwrap();
                prop_assert_eq!(args.len(), types.len());
            }

            #[test]
            fn void_list_has_zero_arity(_x in 0u8..1) {
                let args = parse_sig_args("void -> void").unwrap();
                prop_assert_eq!(args.len(), 0);
            }

            #[test]
            fn validate_ignores_surrounding_whitespace(ty in type_strategy()) {
                let padded = format!("  {ty}\t");
                prop_assert_eq!(validate_sig(&ty).is_ok(), validate_sig(&padded).is_ok());
            }
        }
    }
}
