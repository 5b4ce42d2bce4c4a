// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Per-document symbol and scope index.
//!
//! Builds a scope tree (document root, one scope per named sub, one per
//! brace block) and attaches every variable declaration to the innermost
//! scope containing it. `our` declarations always attach to the document
//! root. Signature parameters of named and anonymous subs become `my`
//! symbols of the sub's scope, anchored at the sub's start offset so they
//! are visible throughout the body.

use la_arena::{Arena, Idx};
use perlscope_ast::span::Span;
use perlscope_ast::{
    next_non_trivia, qw_items, signature_vars, Document, Ident, Node, Stmt, Token, TokenKind,
};

/// Index into the scope arena.
pub type ScopeId = Idx<Scope>;

/// Kind of an indexed symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Sub,
    Package,
}

/// Declaration storage of a variable symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    #[default]
    None,
    My,
    Our,
    State,
}

impl Storage {
    pub fn as_str(self) -> &'static str {
        match self {
            Storage::None => "",
            Storage::My => "my",
            Storage::Our => "our",
            Storage::State => "state",
        }
    }
}

/// A declared variable, sub, or package.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Symbol name; variables include the sigil
    pub name: Ident,
    pub kind: SymbolKind,
    pub storage: Storage,
    pub span: Span,
}

/// Kind of a scope in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Document,
    Sub,
    Block,
}

/// A lexical scope: a byte range plus the symbols declared in it.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub span: Span,
    /// Symbols in source order of declaration
    pub symbols: Vec<Symbol>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
}

/// The per-document index: scope tree plus sub/package definition lists.
#[derive(Debug)]
pub struct Index {
    scopes: Arena<Scope>,
    root: ScopeId,
    pub subs: Vec<Symbol>,
    pub packages: Vec<Symbol>,
}

impl Index {
    /// Build the index for a parsed document.
    pub fn new(doc: &Document) -> Self {
        let mut scopes = Arena::new();
        let root = scopes.alloc(Scope {
            kind: ScopeKind::Document,
            span: Span::new(0, doc.source.len() as u32),
            symbols: Vec::new(),
            parent: None,
            children: Vec::new(),
        });
        let mut index = Self {
            scopes,
            root,
            subs: Vec::new(),
            packages: Vec::new(),
        };

        index.build_scopes(doc);
        index.collect_definitions(doc);
        index.collect_variables(doc);
        index.collect_signature_params(doc);
        index
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    /// Innermost scope whose range contains `offset`.
    pub fn scope_at(&self, offset: u32) -> ScopeId {
        let mut current = self.root;
        'descend: loop {
            for &child in &self.scopes[current].children {
                let span = self.scopes[child].span;
                // inclusive end, matching the root scope's [0, len] range
                if offset >= span.start && offset <= span.end {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// All variables visible at `offset`, deduplicated by name with inner
    /// declarations shadowing outer ones.
    pub fn variables_at(&self, offset: u32) -> Vec<Symbol> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut out = Vec::new();
        let mut cursor = Some(self.scope_at(offset));
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            for sym in &scope.symbols {
                if sym.span.start > offset {
                    continue;
                }
                if seen.insert(sym.name.clone()) {
                    out.push(sym.clone());
                }
            }
            cursor = scope.parent;
        }
        out
    }

    /// The visible declaration of `name` at `offset`, if any.
    ///
    /// Within a scope the latest declaration at or before the offset wins.
    pub fn var_definition_at(&self, name: &str, offset: u32) -> Option<Symbol> {
        let mut cursor = Some(self.scope_at(offset));
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            let best = scope
                .symbols
                .iter()
                .filter(|sym| {
                    sym.kind == SymbolKind::Var && sym.name == name && sym.span.start <= offset
                })
                .max_by_key(|sym| sym.span.start);
            if let Some(sym) = best {
                return Some(sym.clone());
            }
            cursor = scope.parent;
        }
        None
    }

    /// Whether a variable named `name` is visible at `offset`.
    pub fn is_visible(&self, name: &str, offset: u32) -> bool {
        self.var_definition_at(name, offset).is_some()
    }

    // === construction ===

    /// Collect sub and block scopes from the tree and nest them.
    fn build_scopes(&mut self, doc: &Document) {
        struct Candidate {
            kind: ScopeKind,
            span: Span,
            params: Vec<Ident>,
        }
        let mut candidates: Vec<Candidate> = Vec::new();

        doc.root.walk(&mut |node: &Node| {
            let Some(span) = node.token_range() else {
                return;
            };
            match &node.kind {
                perlscope_ast::NodeKind::Block => candidates.push(Candidate {
                    kind: ScopeKind::Block,
                    span,
                    params: Vec::new(),
                }),
                perlscope_ast::NodeKind::Statement(Stmt::Sub(sub)) if sub.name.is_some() => {
                    // named-sub signature params are attached afterwards
                    candidates.push(Candidate {
                        kind: ScopeKind::Sub,
                        span,
                        params: Vec::new(),
                    })
                }
                _ => {}
            }
        });

        // anonymous subs with a signature: params attach to the body block
        for (brace_span, params) in anon_sub_signatures(&doc.tokens) {
            if let Some(existing) = candidates
                .iter_mut()
                .filter(|cand| cand.span.start == brace_span.start)
                .min_by_key(|cand| cand.span.len())
            {
                existing.params.extend(params);
            } else {
                candidates.push(Candidate {
                    kind: ScopeKind::Block,
                    span: brace_span,
                    params,
                });
            }
        }

        // allocate, then assign each scope to its smallest enclosing parent
        let ids: Vec<ScopeId> = candidates
            .iter()
            .map(|cand| {
                let mut symbols = Vec::new();
                for name in &cand.params {
                    symbols.push(Symbol {
                        name: name.clone(),
                        kind: SymbolKind::Var,
                        storage: Storage::My,
                        span: Span::empty(cand.span.start),
                    });
                }
                self.scopes.alloc(Scope {
                    kind: cand.kind,
                    span: cand.span,
                    symbols,
                    parent: None,
                    children: Vec::new(),
                })
            })
            .collect();

        for (i, &id) in ids.iter().enumerate() {
            let mut parent = self.root;
            let span = candidates[i].span;
            for (j, &other) in ids.iter().enumerate() {
                if i == j {
                    continue;
                }
                let other_span = candidates[j].span;
                if other_span.start <= span.start && other_span.end >= span.end {
                    if parent == self.root || other_span.len() < self.scopes[parent].span.len() {
                        parent = other;
                    }
                }
            }
            self.scopes[id].parent = Some(parent);
            self.scopes[parent].children.push(id);
        }
    }

    /// Collect named sub and package definitions with their full ranges.
    fn collect_definitions(&mut self, doc: &Document) {
        let mut subs = Vec::new();
        let mut packages = Vec::new();
        doc.root.walk(&mut |node: &Node| {
            let Some(span) = node.token_range() else {
                return;
            };
            match node.stmt() {
                Some(Stmt::Sub(sub)) => {
                    if let Some(name) = &sub.name {
                        subs.push(Symbol {
                            name: name.clone(),
                            kind: SymbolKind::Sub,
                            storage: Storage::None,
                            span,
                        });
                    }
                }
                Some(Stmt::Package(pkg)) => {
                    packages.push(Symbol {
                        name: pkg.name.clone(),
                        kind: SymbolKind::Package,
                        storage: Storage::None,
                        span,
                    });
                }
                _ => {}
            }
        });
        self.subs = subs;
        self.packages = packages;
    }

    /// Linear walk over the token stream recording variable declarations.
    fn collect_variables(&mut self, doc: &Document) {
        let tokens = &doc.tokens;
        let mut declaring = false;
        let mut storage = Storage::None;
        let mut depth = 0u32;

        for (i, tok) in tokens.iter().enumerate() {
            match tok.kind {
                TokenKind::Word => match tok.value.as_str() {
                    "my" => {
                        declaring = true;
                        storage = Storage::My;
                    }
                    "our" => {
                        declaring = true;
                        storage = Storage::Our;
                    }
                    "state" => {
                        declaring = true;
                        storage = Storage::State;
                    }
                    "use" => {
                        // `use vars qw($x)` declares package globals
                        if let Some(next) = next_non_trivia(tokens, i + 1) {
                            if tokens[next].is_word("vars") {
                                declaring = true;
                                storage = Storage::Our;
                            }
                        }
                    }
                    _ => {}
                },
                TokenKind::Operator => match tok.value.as_str() {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth = depth.saturating_sub(1),
                    ";" if depth == 0 => {
                        declaring = false;
                        storage = Storage::None;
                    }
                    _ => {}
                },
                _ => {}
            }
            if !declaring {
                continue;
            }
            match tok.kind {
                TokenKind::Symbol if tok.value.len() > 1 => {
                    self.declare(
                        Symbol {
                            name: tok.value.clone(),
                            kind: SymbolKind::Var,
                            storage,
                            span: tok.span,
                        },
                        storage,
                    );
                }
                TokenKind::QuoteLike
                    if storage == Storage::Our && tok.value.starts_with("qw") =>
                {
                    for item in qw_items(&tok.value) {
                        if item.starts_with(['$', '@', '%']) && item.len() > 1 {
                            self.declare(
                                Symbol {
                                    name: Ident::new(item),
                                    kind: SymbolKind::Var,
                                    storage,
                                    span: tok.span,
                                },
                                storage,
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn declare(&mut self, symbol: Symbol, storage: Storage) {
        let scope = if storage == Storage::Our {
            self.root
        } else {
            self.scope_at(symbol.span.start)
        };
        self.scopes[scope].symbols.push(symbol);
    }

    /// Signature parameters of named subs become symbols of the sub scope,
    /// anchored at the sub's start so they are visible in the whole body.
    fn collect_signature_params(&mut self, doc: &Document) {
        let mut pending: Vec<(Span, Vec<Ident>)> = Vec::new();
        doc.root.walk(&mut |node: &Node| {
            if let Some(Stmt::Sub(sub)) = node.stmt() {
                if sub.name.is_some() && !sub.signature_vars.is_empty() {
                    if let Some(span) = node.token_range() {
                        pending.push((span, sub.signature_vars.clone()));
                    }
                }
            }
        });
        for (span, params) in pending {
            let scope = self.sub_scope_with_span(span);
            for name in params {
                let exists = self.scopes[scope]
                    .symbols
                    .iter()
                    .any(|sym| sym.name == name && sym.span.start == span.start);
                if !exists {
                    self.scopes[scope].symbols.push(Symbol {
                        name,
                        kind: SymbolKind::Var,
                        storage: Storage::My,
                        span: Span::empty(span.start),
                    });
                }
            }
        }
    }

    fn sub_scope_with_span(&self, span: Span) -> ScopeId {
        for (id, scope) in self.scopes.iter() {
            if scope.kind == ScopeKind::Sub && scope.span == span {
                return id;
            }
        }
        self.root
    }
}

/// Scan the token stream for `sub` · `Prototype` · `{` — an anonymous sub
/// with a signature — and return the body brace span plus parameter names.
fn anon_sub_signatures(tokens: &[Token]) -> Vec<(Span, Vec<Ident>)> {
    let mut out = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        if !tok.is_word("sub") {
            continue;
        }
        let Some(proto_idx) = next_non_trivia(tokens, i + 1) else {
            continue;
        };
        if tokens[proto_idx].kind != TokenKind::Prototype {
            continue;
        }
        let Some(brace_idx) = next_non_trivia(tokens, proto_idx + 1) else {
            continue;
        };
        if !tokens[brace_idx].is_op("{") {
            continue;
        }
        let params = signature_vars(&tokens[proto_idx].value);
        if params.is_empty() {
            continue;
        }
        let close = matching_brace(tokens, brace_idx);
        let end = close
            .map(|idx| tokens[idx].span.end)
            .unwrap_or_else(|| tokens[tokens.len() - 1].span.end);
        out.push((Span::new(tokens[brace_idx].span.start, end), params));
    }
    out
}

/// Index of the `}` balancing the `{` at `open_idx`.
fn matching_brace(tokens: &[Token], open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate().skip(open_idx) {
        if tok.kind != TokenKind::Operator {
            continue;
        }
        match tok.value.as_str() {
            "{" => depth += 1,
            "}" => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
