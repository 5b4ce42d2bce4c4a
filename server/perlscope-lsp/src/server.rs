// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! The language server: document store, diagnostics publishing, and the
//! hover/definition/completion handlers.
//!
//! Documents are re-parsed whole on every change; a freshly built index is
//! swapped into the store so request handlers always see a consistent
//! (text, tree, index) triple. The workspace index is immutable once
//! built and replaced atomically when `use lib` introduces new roots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use perlscope_analysis::exports::collect_use_imports;
use perlscope_analysis::sig::{
    receiver_names_at, sig_call_diagnostics, sig_comment_diagnostics, var_sig_type,
};
use perlscope_analysis::strict::strict_var_diagnostics_with_extra;
use perlscope_analysis::workspace::{Definition, WorkspaceIndex};
use perlscope_analysis::Index;
use perlscope_ast::{next_non_trivia, Document, Ident, Node, Severity, Stmt, TokenKind};
use rustc_hash::{FxHashMap, FxHashSet};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::complete::{
    completion_items, completion_prefix, method_completion_items, method_prefix_for_receivers,
};
use crate::convert::{
    diagnostic_range, offset_from_position, path_to_uri, range_from_offsets, uri_to_path,
};
use crate::exports::{
    exported_strict_vars, perl_inc_paths, unique_existing_dirs, ModuleExportCache,
};
use crate::hover::{hover_content_for_node, statement_for_offset};

const SERVER_NAME: &str = "perlscope-lsp";

/// Document state tracked per URI.
#[derive(Clone)]
pub struct DocumentData {
    version: Option<i32>,
    doc: Arc<Document>,
    index: Arc<Index>,
}

#[derive(Default)]
struct WorkspaceState {
    workspace_roots: Vec<PathBuf>,
    inc_roots: Vec<PathBuf>,
    extra_roots: FxHashSet<PathBuf>,
    index: Option<Arc<WorkspaceIndex>>,
}

/// The perlscope language server.
pub struct PerlscopeServer {
    client: Client,
    docs: DashMap<Url, DocumentData>,
    workspace: RwLock<WorkspaceState>,
    export_cache: ModuleExportCache,
}

impl PerlscopeServer {
    pub fn new(client: Client) -> Self {
        tracing::debug!(name = SERVER_NAME, version = env!("CARGO_PKG_VERSION"), "server created");
        Self {
            client,
            docs: DashMap::new(),
            workspace: RwLock::new(WorkspaceState::default()),
            export_cache: ModuleExportCache::default(),
        }
    }

    /// Parse `text` and swap the fresh document into the store.
    fn set_document(&self, uri: Url, text: String, version: Option<i32>) -> DocumentData {
        let doc = Arc::new(perlscope_parser::parse(&text));
        let index = Arc::new(Index::new(&doc));
        let data = DocumentData { version, doc, index };
        self.docs.insert(uri, data.clone());
        data
    }

    async fn publish_diagnostics(&self, uri: Url, data: Option<&DocumentData>) {
        let (diagnostics, version) = match data {
            Some(data) => (self.diagnostics_for(&uri, data), data.version),
            None => (Vec::new(), None),
        };
        // never publish for a text version a later change has superseded
        if let (Some(version), Some(current)) = (version, self.docs.get(&uri)) {
            if current.value().version.is_some_and(|v| v > version) {
                tracing::debug!(%uri, version, "diagnostics dropped: stale version");
                return;
            }
        }
        let count = diagnostics.len();
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, version)
            .await;
        tracing::debug!(%uri, count, ?version, "diagnostics published");
    }

    fn diagnostics_for(&self, uri: &Url, data: &DocumentData) -> Vec<Diagnostic> {
        let doc = &data.doc;
        let text = &doc.source;
        let mut out = Vec::new();

        for diag in &doc.diagnostics {
            out.push(Diagnostic {
                range: diagnostic_range(text, diag.offset),
                severity: Some(match diag.severity {
                    Severity::Warning => DiagnosticSeverity::WARNING,
                    Severity::Error => DiagnosticSeverity::ERROR,
                }),
                source: Some("perlscope-parser".to_string()),
                message: diag.message.clone(),
                ..Default::default()
            });
        }

        let extra = uri_to_path(uri).map(|path| {
            let inc_roots = self.workspace.read().inc_roots.clone();
            exported_strict_vars(doc, &path, None, &inc_roots, &self.export_cache)
        });
        for diag in strict_var_diagnostics_with_extra(doc, &data.index, extra.as_ref()) {
            out.push(Diagnostic {
                range: diagnostic_range(text, diag.offset),
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some("perl-lsp".to_string()),
                message: diag.message,
                ..Default::default()
            });
        }

        for diag in sig_comment_diagnostics(text) {
            out.push(Diagnostic {
                range: range_from_offsets(text, diag.start, diag.end),
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some("perl-lsp".to_string()),
                message: diag.message,
                ..Default::default()
            });
        }

        for diag in sig_call_diagnostics(doc) {
            out.push(Diagnostic {
                range: diagnostic_range(text, diag.offset),
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some("perl-lsp".to_string()),
                message: diag.message,
                ..Default::default()
            });
        }

        out
    }

    /// Gather workspace roots at initialise and build the index.
    fn init_workspace_index(&self, params: &InitializeParams) {
        let roots = workspace_roots(params);
        tracing::debug!(?roots, "workspace roots");
        let base_roots = unique_existing_dirs(default_lib_roots(&roots));
        let inc_roots = perl_inc_paths();

        let merged: Vec<PathBuf> = {
            let mut state = self.workspace.write();
            state.workspace_roots = base_roots.clone();
            state.inc_roots = inc_roots.clone();
            base_roots.into_iter().chain(inc_roots).collect()
        };
        if merged.is_empty() {
            tracing::debug!("workspace index skipped: no roots");
            return;
        }
        let index = WorkspaceIndex::build(&merged);
        tracing::info!(roots = merged.len(), files = index.file_count(), "workspace index ready");
        self.workspace.write().index = Some(Arc::new(index));
    }

    /// Record `use lib` paths from the document and rebuild the index when
    /// a new root appears.
    fn ensure_use_lib_paths(&self, doc: &Document, file_path: &Path) {
        let base = file_path.parent().unwrap_or_else(|| Path::new("."));
        let paths = unique_existing_dirs(
            perlscope_analysis::exports::collect_use_lib_paths(&doc.root, base),
        );
        if paths.is_empty() {
            return;
        }
        let roots: Vec<PathBuf> = {
            let mut state = self.workspace.write();
            let mut added = false;
            for path in paths {
                if state.extra_roots.insert(path) {
                    added = true;
                }
            }
            if !added {
                return;
            }
            state
                .workspace_roots
                .iter()
                .chain(state.inc_roots.iter())
                .chain(state.extra_roots.iter())
                .cloned()
                .collect()
        };
        let roots = unique_existing_dirs(roots);
        let index = WorkspaceIndex::build(&roots);
        tracing::info!(roots = roots.len(), files = index.file_count(), "workspace index rebuilt");
        self.workspace.write().index = Some(Arc::new(index));
    }

    fn workspace_index(&self) -> Option<Arc<WorkspaceIndex>> {
        self.workspace.read().index.clone()
    }

    /// Resolve a name against the workspace: packages first for qualified
    /// names, the current package then imported modules otherwise, with a
    /// module-path lookup as the final fallback.
    fn find_workspace_definitions(
        &self,
        name: &str,
        exclude: Option<&Path>,
        package: &str,
        use_imports: &FxHashMap<Ident, FxHashSet<Ident>>,
        qualified: bool,
    ) -> Vec<Definition> {
        let Some(index) = self.workspace_index() else {
            return Vec::new();
        };

        if qualified || name.contains("::") {
            let defs = index.find_packages(name, exclude);
            if !defs.is_empty() {
                return defs;
            }
            return index.find_subs_full(name, exclude);
        }

        if !package.is_empty() && package != "main" {
            let defs = index.find_subs_full(&format!("{package}::{name}"), exclude);
            if !defs.is_empty() {
                return defs;
            }
        }

        for (module, symbols) in use_imports {
            if !symbols.contains(name) {
                continue;
            }
            // only honour imports from modules the workspace knows about
            if index.find_packages(module, exclude).is_empty() {
                continue;
            }
            let defs = index.find_subs_full(&format!("{module}::{name}"), exclude);
            if !defs.is_empty() {
                return defs;
            }
        }

        // last resort: the bareword as a module path
        index.find_packages(name, exclude)
    }

    /// Methods of `class`: workspace definitions plus subs of open
    /// documents whose enclosing package is the class.
    fn methods_of_class(&self, class: &str) -> Vec<Ident> {
        let mut methods: Vec<Ident> = self
            .workspace_index()
            .map(|index| index.methods_of_package(class))
            .unwrap_or_default();
        for entry in self.docs.iter() {
            let doc = &entry.value().doc;
            for sub in &entry.value().index.subs {
                if doc.package_at(sub.span.start) == class {
                    methods.push(sub.name.clone());
                }
            }
        }
        methods.sort_unstable();
        methods.dedup();
        methods
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for PerlscopeServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::debug!("initialize request");
        self.init_workspace_index(&params);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        ..Default::default()
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        "$".to_string(),
                        "@".to_string(),
                        "%".to_string(),
                        ">".to_string(),
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::debug!("initialized notification");
        self.client
            .log_message(MessageType::INFO, "perlscope language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::debug!("shutdown request");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!(%uri, version = params.text_document.version, "didOpen");
        let data = self.set_document(
            uri.clone(),
            params.text_document.text,
            Some(params.text_document.version),
        );
        self.publish_diagnostics(uri, Some(&data)).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!(%uri, version = params.text_document.version, changes = params.content_changes.len(), "didChange");
        // full sync: the last whole-document change wins
        let Some(change) = params
            .content_changes
            .into_iter()
            .rev()
            .find(|change| change.range.is_none())
        else {
            return;
        };
        let data = self.set_document(uri.clone(), change.text, Some(params.text_document.version));
        self.publish_diagnostics(uri, Some(&data)).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!(%uri, "didClose");
        self.docs.remove(&uri);
        self.publish_diagnostics(uri, None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(data) = self.docs.get(&uri).map(|entry| entry.value().clone()) else {
            tracing::debug!(%uri, "hover skipped: no document");
            return Ok(None);
        };
        let doc = &data.doc;
        let offset = offset_from_position(&doc.source, position);
        let Some((_, token)) = doc.token_at(offset) else {
            tracing::debug!(%uri, "hover skipped: no token");
            return Ok(None);
        };
        if matches!(
            token.kind,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::End
        ) {
            return Ok(None);
        }

        let mut content = String::new();
        if token.kind == TokenKind::Symbol {
            if let Some(ty) = var_sig_type(doc, &data.index, &token.value, offset) {
                content = format!("type: {ty}");
            }
        }
        if content.is_empty() {
            if let Some(node) = statement_for_offset(&doc.root, offset) {
                content = hover_content_for_node(node);
            }
        }
        if content.is_empty() {
            content = format!("{}: {}", token.kind, token.value);
        }
        tracing::debug!(%uri, token = %token.value, "hover resolved");

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: content,
            }),
            range: Some(range_from_offsets(&doc.source, token.span.start, token.span.end)),
        }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(data) = self.docs.get(&uri).map(|entry| entry.value().clone()) else {
            tracing::debug!(%uri, "definition skipped: no document");
            return Ok(None);
        };
        let doc = &data.doc;
        let path = uri_to_path(&uri);
        if let Some(path) = &path {
            self.ensure_use_lib_paths(doc, path);
        }

        let offset = offset_from_position(&doc.source, position);
        let Some((token_idx, token)) = doc.token_at(offset) else {
            tracing::debug!(%uri, "definition skipped: no token");
            return Ok(None);
        };
        if token.kind != TokenKind::Word {
            tracing::debug!(%uri, token = %token.value, "definition skipped: non-word token");
            return Ok(None);
        }

        let (name, qualified) = qualified_name_at(&doc.tokens, token_idx);

        if let Some(node) = find_definition_node(&doc.root, &name) {
            let Some(range) = definition_name_range(doc, node, &name) else {
                return Ok(None);
            };
            tracing::debug!(%uri, %name, "definition resolved locally");
            return Ok(Some(GotoDefinitionResponse::Array(vec![Location {
                uri,
                range,
            }])));
        }

        let package = doc.package_at(offset);
        let use_imports = collect_use_imports(&doc.root);
        let defs = self.find_workspace_definitions(
            &name,
            path.as_deref(),
            &package,
            &use_imports,
            qualified,
        );
        if defs.is_empty() {
            tracing::debug!(%uri, %name, "definition not found");
            return Ok(None);
        }
        let mut locations = Vec::new();
        for def in defs {
            let Some(range) = range_from_file(&def.file, def.span.start, def.span.end) else {
                continue;
            };
            let Some(target) = path_to_uri(&def.file) else {
                continue;
            };
            locations.push(Location { uri: target, range });
        }
        if locations.is_empty() {
            return Ok(None);
        }
        tracing::debug!(%uri, %name, count = locations.len(), "definition resolved (workspace)");
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(data) = self.docs.get(&uri).map(|entry| entry.value().clone()) else {
            tracing::debug!(%uri, "completion skipped: no document");
            return Ok(None);
        };
        let doc = &data.doc;
        let offset = offset_from_position(&doc.source, position);

        let receivers = receiver_names_at(doc, &data.index, offset);
        if let Some((prefix, start, recv)) =
            method_prefix_for_receivers(&doc.source, offset, &receivers)
        {
            let class = receivers.get(&recv).cloned().unwrap_or_default();
            let methods = self.methods_of_class(&class);
            let range = range_from_offsets(&doc.source, start, offset);
            let items = method_completion_items(&methods, prefix, range);
            tracing::debug!(%uri, %prefix, %class, count = items.len(), "method completion");
            return Ok(Some(CompletionResponse::List(CompletionList {
                is_incomplete: false,
                items,
            })));
        }

        let prefix = completion_prefix(&doc.source, offset);
        let vars = data.index.variables_at(offset);
        let replace_range = (!prefix.is_empty()).then(|| {
            range_from_offsets(&doc.source, offset - prefix.len() as u32, offset)
        });
        let items = completion_items(doc, &vars, prefix, replace_range);
        tracing::debug!(%uri, %prefix, count = items.len(), "completion resolved");

        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items,
        })))
    }
}

/// Workspace roots from the initialise params: folders, then the root URI,
/// then the deprecated root path.
fn workspace_roots(params: &InitializeParams) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(folders) = &params.workspace_folders {
        for folder in folders {
            if let Some(path) = uri_to_path(&folder.uri) {
                roots.push(path);
            }
        }
    }
    #[allow(deprecated)]
    if roots.is_empty() {
        if let Some(root_uri) = &params.root_uri {
            if let Some(path) = uri_to_path(root_uri) {
                roots.push(path);
            }
        }
    }
    #[allow(deprecated)]
    if roots.is_empty() {
        if let Some(root_path) = &params.root_path {
            roots.push(PathBuf::from(root_path));
        }
    }
    roots
}

/// `<root>/lib` and `<root>/local/lib/perl5` for each workspace root.
fn default_lib_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for root in roots {
        if root.as_os_str().is_empty() {
            continue;
        }
        out.push(root.join("lib"));
        out.push(root.join("local").join("lib").join("perl5"));
    }
    out
}

/// Assemble the qualified name around a word token by walking the
/// surrounding `Word :: Word` pairs.
fn qualified_name_at(tokens: &[perlscope_ast::Token], idx: usize) -> (String, bool) {
    let token = &tokens[idx];
    if token.value.contains("::") {
        return (token.value.to_string(), true);
    }
    let mut parts = vec![token.value.to_string()];
    let mut i = idx;
    while i >= 2 {
        if tokens[i - 1].is_op("::") && tokens[i - 2].kind == TokenKind::Word {
            parts.insert(0, tokens[i - 2].value.to_string());
            i -= 2;
        } else {
            break;
        }
    }
    let mut i = idx;
    while i + 2 < tokens.len() {
        if tokens[i + 1].is_op("::") && tokens[i + 2].kind == TokenKind::Word {
            parts.push(tokens[i + 2].value.to_string());
            i += 2;
        } else {
            break;
        }
    }
    if parts.len() == 1 {
        return (parts.remove(0), false);
    }
    (parts.join("::"), true)
}

/// First sub or package statement named `name` in the document.
fn find_definition_node<'a>(root: &'a Node, name: &str) -> Option<&'a Node> {
    if name.is_empty() {
        return None;
    }
    let mut out: Option<&Node> = None;
    root.walk(&mut |node| {
        if out.is_some() {
            return;
        }
        match node.stmt() {
            Some(Stmt::Sub(sub)) if sub.name.as_deref() == Some(name) => out = Some(node),
            Some(Stmt::Package(pkg)) if pkg.name == name => out = Some(node),
            _ => {}
        }
    });
    out
}

/// Range of the token spelling the definition's name.
fn definition_name_range(doc: &Document, node: &Node, name: &str) -> Option<Range> {
    if let Some(tok) = node.tokens.iter().find(|tok| tok.value == name) {
        return Some(range_from_offsets(&doc.source, tok.span.start, tok.span.end));
    }
    let first = next_non_trivia(&node.tokens, 0)?;
    let tok = &node.tokens[first];
    Some(range_from_offsets(&doc.source, tok.span.start, tok.span.end))
}

/// Read a workspace file and convert a byte range into positions.
fn range_from_file(path: &Path, start: u32, end: u32) -> Option<Range> {
    if end < start {
        return None;
    }
    let text = std::fs::read_to_string(path).ok()?;
    if start as usize > text.len() {
        return None;
    }
    let end = end.min(text.len() as u32);
    Some(range_from_offsets(&text, start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_tokens(src: &str) -> Vec<perlscope_ast::Token> {
        perlscope_parser::parse(src).tokens
    }

    #[test]
    fn test_qualified_name_assembly() {
        let tokens = parse_tokens("App::cpm::CLI->new");
        let idx = tokens.iter().position(|tok| tok.value == "cpm").unwrap();
        let (name, qualified) = qualified_name_at(&tokens, idx);
        assert_eq!(name, "App::cpm::CLI");
        assert!(qualified);
    }

    #[test]
    fn test_unqualified_name() {
        let tokens = parse_tokens("foo(1)");
        let (name, qualified) = qualified_name_at(&tokens, 0);
        assert_eq!(name, "foo");
        assert!(!qualified);
    }

    #[test]
    fn test_find_definition_node() {
        let doc = perlscope_parser::parse("package Foo;\nsub bar {}\n");
        assert!(find_definition_node(&doc.root, "bar").is_some());
        assert!(find_definition_node(&doc.root, "Foo").is_some());
        assert!(find_definition_node(&doc.root, "baz").is_none());
    }

    #[test]
    fn test_default_lib_roots() {
        let roots = default_lib_roots(&[PathBuf::from("/proj")]);
        assert_eq!(roots[0], Path::new("/proj/lib"));
        assert_eq!(roots[1], Path::new("/proj/local/lib/perl5"));
    }
}
