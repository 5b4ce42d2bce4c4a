// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Hover rendering for statements.

use perlscope_ast::{LoopKind, Node, Stmt, Token};

/// Render a short code-fenced header for the statement under the cursor.
///
/// Returns an empty string for statements with nothing useful to show.
pub fn hover_content_for_node(node: &Node) -> String {
    let Some(stmt) = node.stmt() else {
        return String::new();
    };
    match stmt {
        Stmt::Package(pkg) => {
            let mut lines = vec![
                "```perl".to_string(),
                format!("package {};", pkg.name),
                "```".to_string(),
            ];
            if let Some(version) = &pkg.version {
                lines.push(format!("version: {version}"));
            }
            lines.join("\n")
        }
        Stmt::Sub(sub) => {
            let mut header = "sub".to_string();
            if let Some(name) = &sub.name {
                header.push(' ');
                header.push_str(name);
            }
            if let Some(prototype) = &sub.prototype {
                header.push(' ');
                header.push_str(prototype);
            }
            let mut lines = vec!["```perl".to_string(), header, "```".to_string()];
            if sub.reserved {
                lines.push("reserved: true".to_string());
            }
            if !sub.attrs.is_empty() {
                let rendered: Vec<String> = sub
                    .attrs
                    .iter()
                    .map(|attr| match &attr.args {
                        Some(args) => format!("{}({})", attr.name, args),
                        None => attr.name.to_string(),
                    })
                    .collect();
                lines.push(format!("attributes: {}", rendered.join(", ")));
            }
            lines.join("\n")
        }
        Stmt::Include(inc) => {
            let mut parts = vec![inc.keyword.to_string()];
            if let Some(name) = &inc.name {
                parts.push(name.to_string());
            }
            if let Some(version) = &inc.version {
                parts.push(version.to_string());
            }
            let mut lines = vec![
                "```perl".to_string(),
                format!("{};", parts.join(" ")),
                "```".to_string(),
            ];
            if !inc.import_items.is_empty() {
                let items: Vec<&str> = inc.import_items.iter().map(|s| s.as_str()).collect();
                lines.push(format!("imports: {}", items.join(", ")));
            }
            lines.join("\n")
        }
        Stmt::Scheduled { keyword } => {
            if keyword.is_empty() {
                return String::new();
            }
            format!("```perl\n{keyword} {{ ... }}\n```")
        }
        Stmt::Control(ctl) => {
            let header = tokens_to_string(&ctl.header);
            let line = format!("{} {}", ctl.keyword, header).trim().to_string();
            if line.is_empty() {
                return String::new();
            }
            let mut lines = vec!["```perl".to_string(), line, "```".to_string()];
            if let Some(iter_var) = &ctl.iter_var {
                lines.push(format!("iter: {iter_var}"));
            }
            if ctl.loop_kind == LoopKind::CStyle {
                lines.push("loop: cstyle".to_string());
                lines.push(format!(
                    "cstyle: {}; {}; {}",
                    tokens_to_string(&ctl.header_init),
                    tokens_to_string(&ctl.header_cond),
                    tokens_to_string(&ctl.header_step)
                ));
            }
            lines.join("\n")
        }
        Stmt::Postfix(postfix) => {
            let line = format!("{} {}", postfix.keyword, tokens_to_string(&postfix.header))
                .trim()
                .to_string();
            if line.is_empty() {
                return String::new();
            }
            format!("```perl\n{line}\n```")
        }
        Stmt::Label { name } => {
            if name.is_empty() {
                return String::new();
            }
            format!("```perl\n{name}:\n```")
        }
        Stmt::Expression => String::new(),
    }
}

/// Join token texts with minimal spacing.
pub fn tokens_to_string(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev = "";
    for tok in tokens {
        if tok.is_trivia() {
            continue;
        }
        if !out.is_empty() && needs_space(prev, &tok.value) {
            out.push(' ');
        }
        out.push_str(&tok.value);
        prev = &tok.value;
    }
    out
}

fn needs_space(prev: &str, cur: &str) -> bool {
    if prev.is_empty() {
        return false;
    }
    if matches!(cur, ")" | "]" | "}" | "," | ";" | "->") {
        return false;
    }
    !matches!(prev, "(" | "[" | "{" | "->")
}

/// Smallest statement node containing `offset`.
pub fn statement_for_offset(root: &Node, offset: u32) -> Option<&Node> {
    perlscope_analysis::sig::statement_at(root, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement_hover(src: &str, needle: &str) -> String {
        let doc = perlscope_parser::parse(src);
        let offset = src.find(needle).expect("needle") as u32;
        statement_for_offset(&doc.root, offset)
            .map(hover_content_for_node)
            .unwrap_or_default()
    }

    #[test]
    fn test_hover_package() {
        let out = statement_hover("package App::X 1.2;\n", "App");
        assert!(out.contains("package App::X;"));
        assert!(out.contains("version: 1.2"));
    }

    #[test]
    fn test_hover_sub_with_signature() {
        let out = statement_hover("sub foo ($x, $y) { }\n", "foo");
        assert!(out.contains("sub foo ($x, $y)"));
    }

    #[test]
    fn test_hover_include_imports() {
        let out = statement_hover("use List::Util qw(first);\n", "List");
        assert!(out.contains("use List::Util;"));
        assert!(out.contains("imports: first"));
    }

    #[test]
    fn test_hover_cstyle_loop() {
        let out = statement_hover("for (my $i = 0; $i < 3; $i++) { }\n", "for");
        assert!(out.contains("loop: cstyle"));
        assert!(out.contains("cstyle: my $i = 0; $i < 3;"));
    }
}
