// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Statement classification: turn an accumulated token run plus its block
//! children into a typed statement node.

use perlscope_ast::{
    qw_items, signature_vars, AttrMeta, ControlStmt, Ident, ImportKind, IncludeKeyword,
    IncludeStmt, LoopKind, Node, NodeKind, PackageStmt, PostfixStmt, Stmt, SubStmt, Token,
    TokenKind,
};

use crate::{CONTROL_KEYWORDS, POSTFIX_KEYWORDS, SCHEDULED_KEYWORDS};

/// Classify a statement's tokens and attach its block children.
pub(crate) fn classify(tokens: Vec<Token>, blocks: Vec<Node>) -> Node {
    let stmt = match first_significant(&tokens) {
        Some(first) if first.kind == TokenKind::Word => match first.value.as_str() {
            "sub" => parse_sub(&tokens),
            "package" => parse_package(&tokens),
            "use" => parse_include(&tokens, IncludeKeyword::Use),
            "no" => parse_include(&tokens, IncludeKeyword::No),
            "require" => parse_include(&tokens, IncludeKeyword::Require),
            word if SCHEDULED_KEYWORDS.contains(&word) && !blocks.is_empty() => Stmt::Scheduled {
                keyword: first.value.clone(),
            },
            word if CONTROL_KEYWORDS.contains(&word) => parse_control(&tokens),
            _ => expression_or_postfix(&tokens),
        },
        _ => expression_or_postfix(&tokens),
    };
    let mut node = Node::new(NodeKind::Statement(stmt));
    node.tokens = tokens;
    node.children = blocks;
    node
}

/// Build a label statement from `NAME :`.
pub(crate) fn classify_label(tokens: Vec<Token>) -> Node {
    let name = first_significant(&tokens)
        .map(|tok| tok.value.clone())
        .unwrap_or_default();
    let mut node = Node::new(NodeKind::Statement(Stmt::Label { name }));
    node.tokens = tokens;
    node
}

fn first_significant(tokens: &[Token]) -> Option<&Token> {
    tokens.iter().find(|tok| !tok.is_trivia())
}

/// Indices of non-trivia tokens, in order.
fn significant_indices(tokens: &[Token]) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, tok)| !tok.is_trivia())
        .map(|(i, _)| i)
        .collect()
}

fn parse_sub(tokens: &[Token]) -> Stmt {
    let mut sub = SubStmt::default();
    let sig = significant_indices(tokens);

    if let Some(&name_idx) = sig.get(1) {
        if tokens[name_idx].kind == TokenKind::Word {
            let name = tokens[name_idx].value.clone();
            sub.reserved = matches!(name.as_str(), "AUTOLOAD" | "DESTROY");
            sub.name = Some(name);
        }
    }

    if let Some(proto) = tokens.iter().find(|tok| tok.kind == TokenKind::Prototype) {
        sub.prototype = Some(proto.value.clone());
        sub.signature_vars = signature_vars(&proto.value);
    }

    sub.attrs = parse_attrs(tokens);
    Stmt::Sub(sub)
}

/// Collect `:name` / `:name(args)` attributes from a sub header.
fn parse_attrs(tokens: &[Token]) -> Vec<AttrMeta> {
    let mut attrs = Vec::new();
    let sig = significant_indices(tokens);
    let mut i = 0;
    while i + 1 < sig.len() {
        let colon = &tokens[sig[i]];
        let word = &tokens[sig[i + 1]];
        if colon.is_op(":") && word.kind == TokenKind::Word {
            let mut args = None;
            let mut next = i + 2;
            if sig.get(next).is_some_and(|&idx| tokens[idx].is_op("(")) {
                let mut depth = 0u32;
                let mut parts = Vec::new();
                while next < sig.len() {
                    let tok = &tokens[sig[next]];
                    match tok.value.as_str() {
                        "(" => {
                            depth += 1;
                            if depth > 1 {
                                parts.push(tok.value.as_str());
                            }
                        }
                        ")" => {
                            depth -= 1;
                            if depth == 0 {
                                next += 1;
                                break;
                            }
                            parts.push(tok.value.as_str());
                        }
                        _ => parts.push(tok.value.as_str()),
                    }
                    next += 1;
                }
                if !parts.is_empty() {
                    args = Some(Ident::new(parts.concat()));
                }
            }
            attrs.push(AttrMeta {
                name: word.value.clone(),
                args,
            });
            i = next;
            continue;
        }
        i += 1;
    }
    attrs
}

fn parse_package(tokens: &[Token]) -> Stmt {
    let sig = significant_indices(tokens);
    let (name, after) = qualified_name(tokens, &sig, 1);
    let version = sig
        .get(after)
        .filter(|&&idx| tokens[idx].kind == TokenKind::Number)
        .map(|&idx| tokens[idx].value.clone());
    Stmt::Package(PackageStmt {
        name: name.unwrap_or_default(),
        version,
    })
}

fn parse_include(tokens: &[Token], keyword: IncludeKeyword) -> Stmt {
    let sig = significant_indices(tokens);
    let mut cursor = 1;
    let mut name = None;
    let mut version = None;

    if let Some(&idx) = sig.get(cursor) {
        match tokens[idx].kind {
            TokenKind::Word => {
                let (assembled, after) = qualified_name(tokens, &sig, cursor);
                name = assembled;
                cursor = after;
            }
            TokenKind::Number => {
                version = Some(tokens[idx].value.clone());
                cursor += 1;
            }
            _ => {}
        }
    }
    if version.is_none() {
        if let Some(&idx) = sig.get(cursor) {
            if tokens[idx].kind == TokenKind::Number {
                version = Some(tokens[idx].value.clone());
                cursor += 1;
            }
        }
    }

    // everything up to the terminating `;` is the import argument
    let args: Vec<Token> = sig[cursor.min(sig.len())..]
        .iter()
        .map(|&idx| tokens[idx].clone())
        .filter(|tok| !tok.is_op(";"))
        .collect();

    let mut import_kind = ImportKind::None;
    let mut import_list = Vec::new();
    let mut import_items = Vec::new();

    if args.len() == 1
        && args[0].kind == TokenKind::QuoteLike
        && args[0].value.starts_with("qw")
    {
        import_kind = ImportKind::Qw;
        import_items = qw_items(&args[0].value).into_iter().map(Ident::new).collect();
        import_list = args.clone();
    } else if !args.is_empty() {
        import_kind = ImportKind::List;
        for tok in &args {
            match tok.kind {
                TokenKind::Word => import_items.push(tok.value.clone()),
                TokenKind::Quote => {
                    let trimmed = tok.value.trim_matches(|c| matches!(c, '\'' | '"' | '`'));
                    if !trimmed.is_empty() {
                        import_items.push(Ident::new(trimmed));
                    }
                }
                TokenKind::Symbol => import_items.push(tok.value.clone()),
                _ => {}
            }
        }
        import_list = args
            .iter()
            .filter(|tok| !matches!(tok.value.as_str(), "(" | ")" | ","))
            .cloned()
            .collect();
    }

    Stmt::Include(IncludeStmt {
        keyword,
        name,
        version,
        import_kind,
        import_list,
        import_items,
        args,
    })
}

/// Assemble `Word (:: Word)*` starting at significant position `from`.
/// Returns the name and the significant position after it.
fn qualified_name(
    tokens: &[Token],
    sig: &[usize],
    from: usize,
) -> (Option<Ident>, usize) {
    let Some(&first) = sig.get(from) else {
        return (None, from);
    };
    if tokens[first].kind != TokenKind::Word {
        return (None, from);
    }
    let mut parts = vec![tokens[first].value.as_str()];
    let mut cursor = from + 1;
    loop {
        let (Some(&sep), Some(&word)) = (sig.get(cursor), sig.get(cursor + 1)) else {
            break;
        };
        if tokens[sep].is_op("::") && tokens[word].kind == TokenKind::Word {
            parts.push("::");
            parts.push(tokens[word].value.as_str());
            cursor += 2;
        } else {
            break;
        }
    }
    (Some(Ident::new(parts.concat())), cursor)
}

fn parse_control(tokens: &[Token]) -> Stmt {
    let sig = significant_indices(tokens);
    let keyword = tokens[sig[0]].value.clone();

    // `foreach my $item (` iteration variable
    let mut iter_var = None;
    let mut cursor = 1;
    if sig
        .get(cursor)
        .is_some_and(|&idx| matches!(tokens[idx].value.as_str(), "my" | "our" | "state"))
    {
        cursor += 1;
    }
    if let Some(&idx) = sig.get(cursor) {
        let tok = &tokens[idx];
        if tok.kind == TokenKind::Symbol && tok.value.starts_with('$') && tok.value.len() > 1 {
            iter_var = Some(tok.value.clone());
        }
    }

    // first top-level paren group is the header
    let mut header = Vec::new();
    let mut depth = 0u32;
    for tok in tokens {
        match tok.value.as_str() {
            "(" if tok.kind == TokenKind::Operator => {
                depth += 1;
                if depth == 1 {
                    continue;
                }
            }
            ")" if tok.kind == TokenKind::Operator => {
                if depth == 1 {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        if depth >= 1 {
            header.push(tok.clone());
        }
    }

    let mut ctl = ControlStmt {
        keyword: keyword.clone(),
        header,
        iter_var,
        ..Default::default()
    };

    if matches!(keyword.as_str(), "for" | "foreach") {
        let mut parts: Vec<Vec<Token>> = vec![Vec::new()];
        let mut depth = 0u32;
        for tok in &ctl.header {
            match tok.value.as_str() {
                "(" | "[" if tok.kind == TokenKind::Operator => depth += 1,
                ")" | "]" if tok.kind == TokenKind::Operator => depth = depth.saturating_sub(1),
                ";" if tok.kind == TokenKind::Operator && depth == 0 => {
                    parts.push(Vec::new());
                    continue;
                }
                _ => {}
            }
            if let Some(last) = parts.last_mut() {
                last.push(tok.clone());
            }
        }
        if parts.len() >= 3 {
            ctl.loop_kind = LoopKind::CStyle;
            let mut parts = parts.into_iter();
            ctl.header_init = parts.next().unwrap_or_default();
            ctl.header_cond = parts.next().unwrap_or_default();
            ctl.header_step = parts.next().unwrap_or_default();
        }
    }

    Stmt::Control(ctl)
}

/// Expression statement, possibly with a postfix modifier.
fn expression_or_postfix(tokens: &[Token]) -> Stmt {
    let sig = significant_indices(tokens);
    let mut depth = 0u32;
    for (pos, &idx) in sig.iter().enumerate() {
        let tok = &tokens[idx];
        match tok.value.as_str() {
            "(" | "[" | "{" if tok.kind == TokenKind::Operator => depth += 1,
            ")" | "]" | "}" if tok.kind == TokenKind::Operator => {
                depth = depth.saturating_sub(1)
            }
            _ => {}
        }
        if pos == 0 || depth > 0 || tok.kind != TokenKind::Word {
            continue;
        }
        if !POSTFIX_KEYWORDS.contains(&tok.value.as_str()) {
            continue;
        }
        // not a method name: `->if` is a call, not a modifier
        if pos > 0 && tokens[sig[pos - 1]].is_op("->") {
            continue;
        }
        let header: Vec<Token> = sig[pos + 1..]
            .iter()
            .map(|&i| tokens[i].clone())
            .filter(|tok| !tok.is_op(";"))
            .collect();
        return Stmt::Postfix(PostfixStmt {
            keyword: tok.value.clone(),
            header,
        });
    }
    Stmt::Expression
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_vars_extraction() {
        assert_eq!(
            signature_vars("($self, $opt = 0, @rest)"),
            vec!["$self", "$opt", "@rest"]
        );
        assert!(signature_vars("($$;@)").is_empty());
        assert_eq!(signature_vars("(%opts)"), vec!["%opts"]);
    }
}
