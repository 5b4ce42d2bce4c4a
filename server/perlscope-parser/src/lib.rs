// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Statement-tree parser for Perl source buffers.
//!
//! Consumes the flat token stream and produces the document tree the
//! analyses walk: statements classified by their leading keyword
//! (`sub`, `package`, `use`/`no`/`require`, control flow, scheduled
//! blocks, labels) with per-kind attributes, and `{ … }` groups as
//! nested block nodes.
//!
//! The parser is deliberately shallow — it never interprets expressions.
//! Malformed input degrades to expression statements plus a diagnostic;
//! a tree is always produced.

mod classify;

use perlscope_ast::{Document, Node, NodeKind, ParseDiagnostic, Severity, Token, TokenKind};

/// Keywords that introduce a block-taking control statement.
pub(crate) const CONTROL_KEYWORDS: &[&str] = &[
    "if", "unless", "while", "until", "for", "foreach", "given", "when",
];

/// Keywords that may modify a statement in postfix position.
pub(crate) const POSTFIX_KEYWORDS: &[&str] =
    &["if", "unless", "while", "until", "for", "foreach"];

/// Keywords of compile-phase scheduled blocks.
pub(crate) const SCHEDULED_KEYWORDS: &[&str] = &["BEGIN", "CHECK", "UNITCHECK", "INIT", "END"];

/// Continuations that keep a control statement open after a block.
const CONTROL_CONTINUATIONS: &[&str] = &["elsif", "else", "continue"];

/// Parse a source buffer into a document: tokens, tree, diagnostics.
pub fn parse(source: &str) -> Document {
    let (tokens, mut diagnostics) = perlscope_lexer::tokenize(source);
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        diagnostics: &mut diagnostics,
    };
    let (children, trailing) = parser.parse_nodes(true);
    let mut root = Node::new(NodeKind::Document);
    root.children = children;
    root.tokens = trailing;
    Document {
        source: source.to_string(),
        tokens,
        root,
        diagnostics,
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diagnostics: &'a mut Vec<ParseDiagnostic>,
}

impl Parser<'_> {
    /// Parse statements and bare blocks until `}` (or end of input at the
    /// top level). Returns the nodes plus any trailing trivia tokens.
    fn parse_nodes(&mut self, top_level: bool) -> (Vec<Node>, Vec<Token>) {
        let mut nodes = Vec::new();
        let mut stmt_tokens: Vec<Token> = Vec::new();
        let mut stmt_blocks: Vec<Node> = Vec::new();
        // parens/brackets and non-block curlies consumed as plain tokens
        let mut depth = 0u32;
        let mut curly_depth = 0u32;

        while self.pos < self.tokens.len() {
            let tok = self.tokens[self.pos].clone();
            match tok.kind {
                TokenKind::Operator if tok.value == "}" => {
                    if curly_depth > 0 {
                        curly_depth -= 1;
                        stmt_tokens.push(tok);
                        self.pos += 1;
                        continue;
                    }
                    if !top_level {
                        break;
                    }
                    self.diagnostics.push(ParseDiagnostic {
                        message: "unbalanced } without opening brace".to_string(),
                        offset: tok.span.start,
                        severity: Severity::Error,
                    });
                    stmt_tokens.push(tok);
                    self.pos += 1;
                }
                TokenKind::Operator
                    if tok.value == "{"
                        && (depth > 0 || curly_depth > 0 || is_plain_brace(&stmt_tokens)) =>
                {
                    // hash subscript, deref brace, or anonymous hash
                    curly_depth += 1;
                    stmt_tokens.push(tok);
                    self.pos += 1;
                }
                TokenKind::Operator if tok.value == "{" => {
                    if !has_significant(&stmt_tokens) {
                        // bare block statement
                        let mut block = self.parse_block();
                        // leading trivia stays with the block
                        let mut lead = std::mem::take(&mut stmt_tokens);
                        lead.append(&mut block.tokens);
                        block.tokens = lead;
                        nodes.push(block);
                        continue;
                    }
                    let block = self.parse_block();
                    stmt_blocks.push(block);
                    if self.statement_complete_after_block(&stmt_tokens) {
                        nodes.push(classify::classify(
                            std::mem::take(&mut stmt_tokens),
                            std::mem::take(&mut stmt_blocks),
                        ));
                    }
                }
                TokenKind::Operator if tok.value == ";" && depth == 0 => {
                    stmt_tokens.push(tok);
                    self.pos += 1;
                    nodes.push(classify::classify(
                        std::mem::take(&mut stmt_tokens),
                        std::mem::take(&mut stmt_blocks),
                    ));
                }
                TokenKind::Operator if tok.value == ":" && is_label_start(&stmt_tokens) => {
                    stmt_tokens.push(tok);
                    self.pos += 1;
                    nodes.push(classify::classify_label(std::mem::take(&mut stmt_tokens)));
                }
                TokenKind::End => {
                    if has_significant(&stmt_tokens) {
                        nodes.push(classify::classify(
                            std::mem::take(&mut stmt_tokens),
                            std::mem::take(&mut stmt_blocks),
                        ));
                    }
                    stmt_tokens.push(tok);
                    self.pos += 1;
                }
                _ => {
                    match tok.value.as_str() {
                        "(" | "[" => depth += 1,
                        ")" | "]" => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    stmt_tokens.push(tok);
                    self.pos += 1;
                }
            }
        }

        if has_significant(&stmt_tokens) || !stmt_blocks.is_empty() {
            nodes.push(classify::classify(stmt_tokens, stmt_blocks));
            (nodes, Vec::new())
        } else {
            (nodes, stmt_tokens)
        }
    }

    /// Parse a `{ … }` group into a block node. The opening brace must be
    /// the current token.
    fn parse_block(&mut self) -> Node {
        let mut block = Node::new(NodeKind::Block);
        let open = self.tokens[self.pos].clone();
        let open_offset = open.span.start;
        block.tokens.push(open);
        self.pos += 1;

        let (children, trailing) = self.parse_nodes(false);
        block.children = children;
        block.tokens.extend(trailing);

        if self.pos < self.tokens.len() && self.tokens[self.pos].is_op("}") {
            block.tokens.push(self.tokens[self.pos].clone());
            self.pos += 1;
        } else {
            self.diagnostics.push(ParseDiagnostic {
                message: "unbalanced { without closing brace".to_string(),
                offset: open_offset,
                severity: Severity::Error,
            });
        }
        block
    }

    /// After a block child, is the accumulated statement finished?
    fn statement_complete_after_block(&self, stmt_tokens: &[Token]) -> bool {
        let Some(first) = stmt_tokens.iter().find(|tok| !tok.is_trivia()) else {
            return true;
        };
        if first.kind != TokenKind::Word {
            return false;
        }
        match first.value.as_str() {
            "sub" | "package" => true,
            word if SCHEDULED_KEYWORDS.contains(&word) => true,
            word if CONTROL_KEYWORDS.contains(&word) => {
                // `if … { } elsif … { } else { }` stays open
                match perlscope_ast::next_non_trivia(self.tokens, self.pos) {
                    Some(next) => {
                        let next = &self.tokens[next];
                        !(next.kind == TokenKind::Word
                            && CONTROL_CONTINUATIONS.contains(&next.value.as_str()))
                    }
                    None => true,
                }
            }
            _ => false,
        }
    }
}

fn has_significant(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|tok| !tok.is_trivia() && tok.kind != TokenKind::End)
}

/// A `{` after one of these tokens subscripts or constructs rather than
/// opening a block.
fn is_plain_brace(stmt_tokens: &[Token]) -> bool {
    let Some(prev) = stmt_tokens.iter().rev().find(|tok| !tok.is_trivia()) else {
        return false;
    };
    match prev.kind {
        TokenKind::Symbol => true,
        TokenKind::Operator => matches!(prev.value.as_str(), "->" | "]" | "=" | "=>" | ","),
        _ => false,
    }
}

/// A lone bareword followed by `:` opens a label.
fn is_label_start(stmt_tokens: &[Token]) -> bool {
    let mut significant = stmt_tokens.iter().filter(|tok| !tok.is_trivia());
    let first = match significant.next() {
        Some(tok) => tok,
        None => return false,
    };
    if significant.next().is_some() {
        return false;
    }
    first.kind == TokenKind::Word
        && !CONTROL_KEYWORDS.contains(&first.value.as_str())
        && first.value.chars().next().is_some_and(|c| c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use perlscope_ast::{ImportKind, IncludeKeyword, LoopKind, Stmt};

    fn stmts(doc: &Document) -> Vec<&Stmt> {
        let mut out = Vec::new();
        doc.root.walk(&mut |node| {
            if let Some(stmt) = node.stmt() {
                out.push(stmt);
            }
        });
        out
    }

    #[test]
    fn test_sub_statement() {
        let doc = parse("sub foo ($self, $opt, @rest) :method { return 1; }");
        let all = stmts(&doc);
        let sub = all
            .iter()
            .find_map(|stmt| match stmt {
                Stmt::Sub(sub) => Some(sub),
                _ => None,
            })
            .unwrap();
        assert_eq!(sub.name.as_deref(), Some("foo"));
        assert_eq!(
            sub.signature_vars,
            vec!["$self".to_string(), "$opt".to_string(), "@rest".to_string()]
        );
        assert_eq!(sub.attrs.len(), 1);
        assert_eq!(sub.attrs[0].name.as_str(), "method");
        assert!(!sub.reserved);
    }

    #[test]
    fn test_sub_block_nested() {
        let doc = parse("sub foo { my $x = 1; }");
        let sub_node = doc
            .root
            .children
            .iter()
            .find(|node| matches!(node.stmt(), Some(Stmt::Sub(_))))
            .unwrap();
        assert!(sub_node.block_child().is_some());
        // the inner declaration is a child of the block
        let block = sub_node.block_child().unwrap();
        assert_eq!(block.children.len(), 1);
    }

    #[test]
    fn test_package_statement() {
        let doc = parse("package App::cpm::CLI 0.997;\n");
        let all = stmts(&doc);
        match all[0] {
            Stmt::Package(pkg) => {
                assert_eq!(pkg.name.as_str(), "App::cpm::CLI");
                assert_eq!(pkg.version.as_deref(), Some("0.997"));
            }
            other => panic!("expected package statement, got {other:?}"),
        }
    }

    #[test]
    fn test_include_use_strict() {
        let doc = parse("use strict;");
        match stmts(&doc)[0] {
            Stmt::Include(inc) => {
                assert_eq!(inc.keyword, IncludeKeyword::Use);
                assert_eq!(inc.name.as_deref(), Some("strict"));
                assert_eq!(inc.import_kind, ImportKind::None);
            }
            other => panic!("expected include, got {other:?}"),
        }
    }

    #[test]
    fn test_include_version_only() {
        let doc = parse("use v5.12;");
        match stmts(&doc)[0] {
            Stmt::Include(inc) => {
                assert_eq!(inc.name, None);
                assert_eq!(inc.version.as_deref(), Some("v5.12"));
            }
            other => panic!("expected include, got {other:?}"),
        }
    }

    #[test]
    fn test_include_qw_imports() {
        let doc = parse("use List::Util qw(first uniq);");
        match stmts(&doc)[0] {
            Stmt::Include(inc) => {
                assert_eq!(inc.name.as_deref(), Some("List::Util"));
                assert_eq!(inc.import_kind, ImportKind::Qw);
                assert_eq!(inc.import_items, vec!["first", "uniq"]);
            }
            other => panic!("expected include, got {other:?}"),
        }
    }

    #[test]
    fn test_include_empty_list_is_explicit() {
        let doc = parse("use My::Module ();");
        match stmts(&doc)[0] {
            Stmt::Include(inc) => {
                assert_eq!(inc.import_kind, ImportKind::List);
                assert!(inc.import_items.is_empty());
            }
            other => panic!("expected include, got {other:?}"),
        }
    }

    #[test]
    fn test_include_quoted_import() {
        let doc = parse("use My::Module '$FOO';");
        match stmts(&doc)[0] {
            Stmt::Include(inc) => {
                assert_eq!(inc.import_kind, ImportKind::List);
                assert_eq!(inc.import_items, vec!["$FOO"]);
            }
            other => panic!("expected include, got {other:?}"),
        }
    }

    #[test]
    fn test_control_foreach() {
        let doc = parse("foreach my $item (@list) { print $item; }");
        match stmts(&doc)[0] {
            Stmt::Control(ctl) => {
                assert_eq!(ctl.keyword.as_str(), "foreach");
                assert_eq!(ctl.iter_var.as_deref(), Some("$item"));
                assert_eq!(ctl.loop_kind, LoopKind::Plain);
            }
            other => panic!("expected control, got {other:?}"),
        }
    }

    #[test]
    fn test_control_cstyle_for() {
        let doc = parse("for (my $i = 0; $i < 10; $i++) { }");
        match stmts(&doc)[0] {
            Stmt::Control(ctl) => {
                assert_eq!(ctl.loop_kind, LoopKind::CStyle);
                assert!(ctl.header_init.iter().any(|tok| tok.value == "$i"));
                assert!(ctl.header_cond.iter().any(|tok| tok.value == "<"));
                assert!(ctl.header_step.iter().any(|tok| tok.value == "++"));
            }
            other => panic!("expected control, got {other:?}"),
        }
    }

    #[test]
    fn test_if_elsif_else_single_statement() {
        let doc = parse("if ($a) { 1 } elsif ($b) { 2 } else { 3 } my $x;");
        let top: Vec<_> = doc
            .root
            .children
            .iter()
            .filter(|node| node.stmt().is_some())
            .collect();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].children.len(), 3); // three block children
    }

    #[test]
    fn test_postfix_statement() {
        let doc = parse("print \"x\" if $cond;");
        match stmts(&doc)[0] {
            Stmt::Postfix(postfix) => {
                assert_eq!(postfix.keyword.as_str(), "if");
                assert!(postfix.header.iter().any(|tok| tok.value == "$cond"));
            }
            other => panic!("expected postfix, got {other:?}"),
        }
    }

    #[test]
    fn test_scheduled_block() {
        let doc = parse("BEGIN { require Foo; }");
        match stmts(&doc)[0] {
            Stmt::Scheduled { keyword } => assert_eq!(keyword.as_str(), "BEGIN"),
            other => panic!("expected scheduled, got {other:?}"),
        }
    }

    #[test]
    fn test_label_statement() {
        let doc = parse("LOOP: for (@x) { last LOOP; }");
        match stmts(&doc)[0] {
            Stmt::Label { name } => assert_eq!(name.as_str(), "LOOP"),
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_block_is_block_node() {
        let doc = parse("use strict; { no strict; $y; } $z;");
        let kinds: Vec<_> = doc
            .root
            .children
            .iter()
            .map(|node| node.is_block())
            .collect();
        assert_eq!(kinds, vec![false, true, false]);
    }

    #[test]
    fn test_package_at() {
        let src = "package Foo;\nsub a {}\npackage Bar;\nsub b {}\n";
        let doc = parse(src);
        let a_offset = src.find("sub a").unwrap() as u32;
        let b_offset = src.find("sub b").unwrap() as u32;
        assert_eq!(doc.package_at(0).as_str(), "main");
        assert_eq!(doc.package_at(a_offset).as_str(), "Foo");
        assert_eq!(doc.package_at(b_offset).as_str(), "Bar");
    }

    #[test]
    fn test_unbalanced_brace_diagnostic() {
        let doc = parse("sub foo { my $x = 1;");
        assert!(doc
            .diagnostics
            .iter()
            .any(|diag| diag.message.contains("unbalanced")));
    }

    #[test]
    fn test_semicolon_inside_parens_does_not_split() {
        let doc = parse("for (my $i = 0; $i < 3; $i++) { }\n");
        let top: Vec<_> = doc
            .root
            .children
            .iter()
            .filter(|node| node.stmt().is_some())
            .collect();
        assert_eq!(top.len(), 1);
    }
}
