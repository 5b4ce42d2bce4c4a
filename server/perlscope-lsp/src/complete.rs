// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Completion candidates: keywords, builtins, visible variables, document
//! symbols, and receiver method completion.

use perlscope_analysis::Symbol;
use perlscope_ast::{Document, Stmt};
use rustc_hash::{FxHashMap, FxHashSet};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Range, TextEdit,
};

/// Language keywords offered by general completion.
pub const KEYWORDS: &[&str] = &[
    "sub", "package", "use", "require", "my", "our", "state", "local", "if", "elsif", "else",
    "unless", "while", "until", "for", "foreach", "given", "when", "default", "continue", "do",
    "eval", "last", "next", "redo", "goto", "return", "BEGIN", "CHECK", "INIT", "END",
];

/// Builtin function names offered by general completion.
pub const BUILTINS: &[&str] = &[
    "abs", "accept", "alarm", "atan2", "bind", "binmode", "bless", "caller", "chdir", "chmod",
    "chomp", "chop", "chown", "chr", "chroot", "close", "closedir", "connect", "cos", "crypt",
    "dbmclose", "dbmopen", "defined", "delete", "die", "do", "dump", "each", "endgrent",
    "endhostent", "endnetent", "endprotoent", "endpwent", "endservent", "eof", "eval", "exec",
    "exists", "exit", "exp", "fcntl", "fileno", "flock", "fork", "format", "formline", "getc",
    "getgrent", "getgrgid", "getgrnam", "gethostbyaddr", "gethostbyname", "gethostent",
    "getlogin", "getnetbyaddr", "getnetbyname", "getnetent", "getpeername", "getpgrp",
    "getppid", "getpriority", "getprotobyname", "getprotobynumber", "getprotoent", "getpwent",
    "getpwnam", "getpwuid", "getservbyname", "getservbyport", "getservent", "getsockname",
    "getsockopt", "glob", "gmtime", "goto", "grep", "hex", "index", "int", "ioctl", "join",
    "keys", "kill", "last", "lc", "lcfirst", "length", "link", "listen", "local", "localtime",
    "log", "lstat", "map", "mkdir", "msgctl", "msgget", "msgrcv", "msgsnd", "my", "next",
    "oct", "open", "opendir", "ord", "pack", "pipe", "pop", "pos", "print", "printf",
    "prototype", "push", "quotemeta", "rand", "read", "readdir", "readline", "readlink",
    "readpipe", "recv", "redo", "ref", "rename", "require", "reset", "return", "reverse",
    "rewinddir", "rindex", "rmdir", "say", "scalar", "seek", "seekdir", "select", "semctl",
    "semget", "semop", "send", "setgrent", "sethostent", "setnetent", "setpgrp", "setpriority",
    "setprotoent", "setpwent", "setservent", "setsockopt", "shift", "shmctl", "shmget",
    "shmread", "shmwrite", "shutdown", "sin", "sleep", "socket", "socketpair", "sort",
    "splice", "split", "sprintf", "srand", "stat", "state", "study", "substr", "symlink",
    "syscall", "sysopen", "sysread", "sysseek", "system", "syswrite", "tell", "telldir",
    "tie", "tied", "time", "times", "truncate", "uc", "ucfirst", "umask", "undef", "unlink",
    "unpack", "unshift", "untie", "utime", "values", "vec", "wait", "waitpid", "wantarray",
    "warn", "write",
];

/// The maximal identifier-or-sigil run ending at `offset`.
pub fn completion_prefix(text: &str, offset: u32) -> &str {
    let offset = (offset as usize).min(text.len());
    let bytes = text.as_bytes();
    let mut start = offset;
    while start > 0 && is_completion_byte(bytes[start - 1]) {
        start -= 1;
    }
    &text[start..offset]
}

fn is_completion_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'$' | b'@' | b'%')
}

fn is_method_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Detect a method-completion context: a (possibly empty) identifier prefix
/// directly after `RECV->`, where RECV is a known receiver.
///
/// Returns the prefix, its start offset, and the receiver name.
pub fn method_prefix_for_receivers<'a>(
    text: &'a str,
    offset: u32,
    receivers: &FxHashMap<perlscope_ast::Ident, String>,
) -> Option<(&'a str, u32, perlscope_ast::Ident)> {
    if receivers.is_empty() {
        return None;
    }
    let bytes = text.as_bytes();
    let end = (offset as usize).min(text.len());
    let mut start = end;
    while start > 0 && is_method_byte(bytes[start - 1]) {
        start -= 1;
    }
    let prefix = &text[start..end];

    let mut i = start;
    while i > 0 && matches!(bytes[i - 1], b' ' | b'\t') {
        i -= 1;
    }
    if i < 2 || &bytes[i - 2..i] != b"->" {
        return None;
    }
    i -= 2;
    while i > 0 && matches!(bytes[i - 1], b' ' | b'\t') {
        i -= 1;
    }
    let mut j = i;
    while j > 0 && is_method_byte(bytes[j - 1]) {
        j -= 1;
    }
    if j == 0 || bytes[j - 1] != b'$' {
        return None;
    }
    let recv = &text[j - 1..i];
    let (name, _) = receivers.get_key_value(recv)?;
    Some((prefix, start as u32, name.clone()))
}

/// Method completion items replacing the prefix range.
pub fn method_completion_items(
    methods: &[perlscope_ast::Ident],
    prefix: &str,
    replace_range: Range,
) -> Vec<CompletionItem> {
    let mut seen = FxHashSet::default();
    let mut items = Vec::new();
    for name in methods {
        if name.is_empty() || !name.starts_with(prefix) {
            continue;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        items.push(CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::METHOD),
            detail: Some("method".to_string()),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: replace_range,
                new_text: name.to_string(),
            })),
            ..Default::default()
        });
    }
    items
}

/// General completion: keywords, builtins, visible variables, and the
/// document's sub and package names, filtered by prefix.
pub fn completion_items(
    doc: &Document,
    vars: &[Symbol],
    prefix: &str,
    replace_range: Option<Range>,
) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();

    let mut add = |label: &str, kind: CompletionItemKind, detail: String| {
        if label.is_empty() || !label.starts_with(prefix) {
            return;
        }
        if !seen.insert(label.to_string()) {
            return;
        }
        let mut insert_text = None;
        let mut text_edit = None;
        // a lone sigil prefix must not be doubled by the inserted text
        if prefix.len() == 1
            && matches!(prefix, "$" | "@" | "%")
            && label.starts_with(prefix)
            && label.len() > 1
        {
            match replace_range {
                Some(range) => {
                    text_edit = Some(CompletionTextEdit::Edit(TextEdit {
                        range,
                        new_text: label.to_string(),
                    }));
                }
                None => insert_text = Some(label[1..].to_string()),
            }
        }
        items.push(CompletionItem {
            label: label.to_string(),
            kind: Some(kind),
            detail: Some(detail),
            insert_text,
            text_edit,
            ..Default::default()
        });
    };

    for kw in KEYWORDS {
        add(kw, CompletionItemKind::KEYWORD, "keyword".to_string());
    }
    for builtin in BUILTINS {
        add(builtin, CompletionItemKind::FUNCTION, "builtin".to_string());
    }

    for sym in vars {
        let detail = match sym.storage.as_str() {
            "" => "var".to_string(),
            storage => format!("{storage} var"),
        };
        add(&sym.name, CompletionItemKind::VARIABLE, detail.clone());

        // element access: offer `$name` for visible `@name` / `%name`
        if (sym.name.starts_with('@') || sym.name.starts_with('%')) && prefix.starts_with('$') {
            let alt = format!("${}", &sym.name[1..]);
            add(&alt, CompletionItemKind::VARIABLE, format!("{detail} (sigil)"));
        }
    }

    doc.root.walk(&mut |node| {
        match node.stmt() {
            Some(Stmt::Sub(sub)) => {
                if let Some(name) = &sub.name {
                    add(name, CompletionItemKind::FUNCTION, "sub".to_string());
                }
            }
            Some(Stmt::Package(pkg)) => {
                add(&pkg.name, CompletionItemKind::MODULE, "package".to_string());
            }
            _ => {}
        }
    });

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use perlscope_analysis::Index;

    #[test]
    fn test_completion_prefix() {
        assert_eq!(completion_prefix("my $foo", 7), "$foo");
        assert_eq!(completion_prefix("Foo::Ba", 7), "Foo::Ba");
        assert_eq!(completion_prefix("x + ", 4), "");
    }

    #[test]
    fn test_method_prefix_detection() {
        let mut receivers = FxHashMap::default();
        receivers.insert(perlscope_ast::Ident::new("$app"), "App::X".to_string());

        let text = "    $app->ru";
        let got = method_prefix_for_receivers(text, text.len() as u32, &receivers);
        let (prefix, start, recv) = got.expect("method context");
        assert_eq!(prefix, "ru");
        assert_eq!(start, 10);
        assert_eq!(recv.as_str(), "$app");

        // empty prefix right after the arrow
        let text = "$app->";
        let got = method_prefix_for_receivers(text, 6, &receivers);
        assert_eq!(got.expect("method context").0, "");

        // unknown receiver
        let text = "$other->x";
        assert!(method_prefix_for_receivers(text, 9, &receivers).is_none());
    }

    #[test]
    fn test_general_completion_filters_by_prefix() {
        let doc = perlscope_parser::parse("sub frobnicate {}\nmy $x;\n");
        let index = Index::new(&doc);
        let vars = index.variables_at(doc.source.len() as u32);
        let items = completion_items(&doc, &vars, "frob", None);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "frobnicate");
    }

    #[test]
    fn test_sigil_prefix_offers_element_access() {
        let doc = perlscope_parser::parse("my %opts;\nmy @list;\n");
        let index = Index::new(&doc);
        let vars = index.variables_at(doc.source.len() as u32);
        let items = completion_items(&doc, &vars, "$", None);
        let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
        assert!(labels.contains(&"$opts"));
        assert!(labels.contains(&"$list"));
        // inserted text must not double the sigil
        let opts = items.iter().find(|item| item.label == "$opts").unwrap();
        assert_eq!(opts.insert_text.as_deref(), Some("opts"));
    }
}
