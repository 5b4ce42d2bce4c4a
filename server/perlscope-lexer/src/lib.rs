// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Tokeniser for Perl source buffers.
//!
//! Converts a string of characters into the flat token stream consumed by
//! the statement parser and the analyses. The tokeniser handles:
//!
//! - Sigiled variable names (`$x`, `@list`, `%opts`, `$#ends`, `$Foo::bar`)
//!   and the lone-sigil split forms used by dereference syntax
//! - Quote and quote-like constructs with arbitrary delimiters
//!   (`q`, `qq`, `qw`, `qr`, `m`, `s`, `tr`, `y`)
//! - Heredocs, POD blocks, `__END__` / `__DATA__`
//! - Prototypes/signatures directly after `sub`
//!
//! The tokeniser never fails: malformed input produces a best-effort token
//! plus a parse diagnostic, and every byte of the input is covered by
//! exactly one token.

use perlscope_ast::span::Span;
use perlscope_ast::{ParseDiagnostic, Severity, Token, TokenKind};

/// Tokenise a source buffer.
///
/// Returns the token stream in source order together with any diagnostics
/// for unterminated constructs.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<ParseDiagnostic>) {
    let mut lexer = Lexer::new(source);
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

/// Words that open a quote-like construct when followed by a delimiter.
const QUOTE_LIKE_WORDS: &[&str] = &["q", "qq", "qw", "qr", "m", "s", "tr", "y"];

/// Quote-like constructs taking two delimited parts.
const TWO_PART_WORDS: &[&str] = &["s", "tr", "y"];

/// Words after which a `/` starts a match rather than a division.
const REGEX_AFTER_WORDS: &[&str] = &[
    "and", "cmp", "eq", "elsif", "for", "foreach", "ge", "grep", "gt", "if", "join", "le", "lt",
    "map", "ne", "not", "or", "print", "push", "return", "split", "unless", "unshift", "until",
    "when", "while", "x", "xor",
];

struct PendingHereDoc {
    terminator: String,
    /// `<<~` strips leading indentation from the terminator line
    indented: bool,
    opener_offset: u32,
}

struct Lexer<'a> {
    /// Full source bytes; slices taken from this copy keep the `'a`
    /// lifetime independent of `&mut self` borrows.
    src: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<ParseDiagnostic>,
    pending_heredocs: Vec<PendingHereDoc>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            pending_heredocs: Vec::new(),
        }
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            if self.at_line_start() {
                if !self.pending_heredocs.is_empty() {
                    self.lex_heredoc_bodies();
                    continue;
                }
                if self.at_pod_start() {
                    self.lex_pod();
                    continue;
                }
                if self.at_data_marker() {
                    self.lex_end_section();
                    continue;
                }
            }
            let ch = self.src[self.pos];
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => self.lex_whitespace(),
                b'#' => self.lex_line_comment(),
                b'\'' | b'"' | b'`' => self.lex_quote(ch),
                b'$' | b'@' | b'%' | b'&' | b'*' => self.lex_sigil(ch),
                b'0'..=b'9' => self.lex_number(),
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.lex_word(),
                b'(' if self.after_sub_header() => self.lex_prototype(),
                b'/' => self.lex_slash(),
                b'<' => self.lex_angle(),
                _ => self.lex_operator(),
            }
        }
        for heredoc in std::mem::take(&mut self.pending_heredocs) {
            self.error(
                heredoc.opener_offset as usize,
                format!("unterminated heredoc <<{}", heredoc.terminator),
            );
        }
    }

    // === position helpers ===

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src[self.pos - 1] == b'\n'
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn rest_starts_with(&self, text: &str) -> bool {
        self.src[self.pos..].starts_with(text.as_bytes())
    }

    fn line_end(&self, from: usize) -> usize {
        self.src[from..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| from + i)
            .unwrap_or(self.src.len())
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        self.tokens
            .push(Token::new(kind, text, Span::new(start as u32, self.pos as u32)));
    }

    fn error(&mut self, offset: usize, message: impl Into<String>) {
        self.diagnostics.push(ParseDiagnostic {
            message: message.into(),
            offset: offset as u32,
            severity: Severity::Error,
        });
    }

    /// Most recent non-trivia token, skipping back over `skip` extra ones.
    fn prev_significant(&self, skip: usize) -> Option<&Token> {
        self.tokens
            .iter()
            .rev()
            .filter(|tok| !tok.is_trivia())
            .nth(skip)
    }

    // === trivia ===

    fn lex_whitespace(&mut self) {
        let start = self.pos;
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.pos += 1;
                    // A pending heredoc body starts at the next line.
                    if !self.pending_heredocs.is_empty() {
                        break;
                    }
                }
                _ => break,
            }
        }
        self.push(TokenKind::Whitespace, start);
    }

    fn lex_line_comment(&mut self) {
        let start = self.pos;
        self.pos = self.line_end(self.pos);
        self.push(TokenKind::Comment, start);
    }

    fn at_pod_start(&self) -> bool {
        if self.src[self.pos] != b'=' {
            return false;
        }
        matches!(self.peek(1), Some(b) if b.is_ascii_alphabetic())
    }

    /// Consume a POD block, `=word` through the line after `=cut`.
    fn lex_pod(&mut self) {
        let start = self.pos;
        loop {
            let end = self.line_end(self.pos);
            let line = &self.src[self.pos..end];
            let terminal = line.starts_with(b"=cut");
            self.pos = (end + 1).min(self.src.len());
            if terminal || self.pos >= self.src.len() {
                break;
            }
        }
        self.push(TokenKind::Comment, start);
    }

    fn at_data_marker(&self) -> bool {
        self.rest_starts_with("__END__") || self.rest_starts_with("__DATA__")
    }

    fn lex_end_section(&mut self) {
        let start = self.pos;
        self.pos = self.src.len();
        self.push(TokenKind::End, start);
    }

    // === heredocs ===

    fn lex_heredoc_bodies(&mut self) {
        let src = self.src;
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let start = self.pos;
            let mut terminated = false;
            while self.pos < src.len() {
                let end = self.line_end(self.pos);
                let line = std::str::from_utf8(&src[self.pos..end]).unwrap_or_default();
                let candidate = if heredoc.indented { line.trim_start() } else { line };
                self.pos = (end + 1).min(src.len());
                if candidate.trim_end() == heredoc.terminator {
                    terminated = true;
                    break;
                }
            }
            if !terminated {
                self.error(
                    heredoc.opener_offset as usize,
                    format!("unterminated heredoc <<{}", heredoc.terminator),
                );
            }
            if self.pos > start {
                self.push(TokenKind::HereDocContent, start);
            }
        }
    }

    /// Try to read a heredoc opener at `<<`; returns false when the angle
    /// brackets are a shift operator instead.
    fn try_heredoc_opener(&mut self) -> bool {
        let start = self.pos;
        let mut cursor = self.pos + 2;
        let indented = self.src.get(cursor) == Some(&b'~');
        if indented {
            cursor += 1;
        }
        let terminator = match self.src.get(cursor) {
            Some(&quote @ (b'"' | b'\'')) => {
                let term_start = cursor + 1;
                let mut end = term_start;
                while end < self.src.len() && self.src[end] != quote && self.src[end] != b'\n' {
                    end += 1;
                }
                if self.src.get(end) != Some(&quote) {
                    return false;
                }
                cursor = end + 1;
                String::from_utf8_lossy(&self.src[term_start..end]).into_owned()
            }
            Some(&b) if b == b'_' || b.is_ascii_alphabetic() => {
                let term_start = cursor;
                while cursor < self.src.len() && is_word_byte(self.src[cursor]) {
                    cursor += 1;
                }
                String::from_utf8_lossy(&self.src[term_start..cursor]).into_owned()
            }
            _ => return false,
        };
        self.pos = cursor;
        self.push(TokenKind::QuoteLike, start);
        self.pending_heredocs.push(PendingHereDoc {
            terminator,
            indented,
            opener_offset: start as u32,
        });
        true
    }

    // === quotes and quote-likes ===

    fn lex_quote(&mut self, delim: u8) {
        let start = self.pos;
        self.pos += 1;
        let terminated = self.skip_to_delimiter(delim, delim);
        if !terminated {
            self.error(start, "unterminated string");
        }
        self.push(TokenKind::Quote, start);
    }

    /// Advance past a delimited section, honouring backslash escapes and
    /// nesting for paired delimiters. Returns false at end of input.
    fn skip_to_delimiter(&mut self, open: u8, close: u8) -> bool {
        let mut depth = 1u32;
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b == b'\\' {
                self.pos = (self.pos + 2).min(self.src.len());
                continue;
            }
            if b == close {
                depth -= 1;
                self.pos += 1;
                if depth == 0 {
                    return true;
                }
                continue;
            }
            if open != close && b == open {
                depth += 1;
            }
            self.pos += 1;
        }
        false
    }

    fn lex_word(&mut self) {
        let src = self.src;
        let start = self.pos;
        while self.pos < src.len() && is_word_byte(src[self.pos]) {
            self.pos += 1;
        }
        let word = std::str::from_utf8(&src[start..self.pos]).unwrap_or_default();

        // v-strings: v5, v5.12.0
        if word.starts_with('v')
            && word.len() > 1
            && word[1..].bytes().all(|b| b.is_ascii_digit())
        {
            while self.pos + 1 < self.src.len()
                && self.src[self.pos] == b'.'
                && self.src[self.pos + 1].is_ascii_digit()
            {
                self.pos += 1;
                while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
            self.push(TokenKind::Number, start);
            return;
        }

        if QUOTE_LIKE_WORDS.contains(&word) {
            if let Some(open) = self.quote_like_delimiter() {
                self.lex_quote_like(start, word, open);
                return;
            }
        }
        self.push(TokenKind::Word, start);
    }

    /// Delimiter byte for a quote-like construct, or `None` when the word is
    /// an ordinary identifier (`s => 1`, `q, r`).
    fn quote_like_delimiter(&self) -> Option<u8> {
        let mut ahead = 0;
        while matches!(self.peek(ahead), Some(b' ') | Some(b'\t')) {
            ahead += 1;
        }
        let b = self.peek(ahead)?;
        if is_word_byte(b) || b.is_ascii_whitespace() {
            return None;
        }
        if matches!(b, b'=' | b',' | b';' | b')' | b'}' | b']' | b'>') {
            return None;
        }
        Some(b)
    }

    fn lex_quote_like(&mut self, start: usize, word: &str, _open: u8) {
        while matches!(self.peek(0), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
        let open = self.src[self.pos];
        let close = matching_close(open);
        self.pos += 1;
        let mut terminated = self.skip_to_delimiter(open, close);

        if terminated && TWO_PART_WORDS.contains(&word) {
            if open == close {
                // s/a/b/ shares the middle delimiter
                terminated = self.skip_to_delimiter(open, close);
            } else {
                while matches!(self.peek(0), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
                    self.pos += 1;
                }
                if let Some(second) = self.peek(0) {
                    if !is_word_byte(second) {
                        let second_close = matching_close(second);
                        self.pos += 1;
                        terminated = self.skip_to_delimiter(second, second_close);
                    }
                }
            }
        }
        if terminated {
            while matches!(self.peek(0), Some(b) if b.is_ascii_lowercase()) {
                self.pos += 1;
            }
        } else {
            self.error(start, format!("unterminated {} construct", word));
        }
        self.push(TokenKind::QuoteLike, start);
    }

    // === numbers ===

    fn lex_number(&mut self) {
        let start = self.pos;
        if self.src[self.pos] == b'0' && matches!(self.peek(1), Some(b'x' | b'X' | b'b' | b'B')) {
            self.pos += 2;
            while matches!(self.peek(0), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
                self.pos += 1;
            }
            self.push(TokenKind::Number, start);
            return;
        }
        while matches!(self.peek(0), Some(b) if b.is_ascii_digit() || b == b'_') {
            self.pos += 1;
        }
        // Fractional parts, including version-ish numbers like 5.012.34
        while self.peek(0) == Some(b'.') && matches!(self.peek(1), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(0), Some(b) if b.is_ascii_digit() || b == b'_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek(ahead), Some(b'+' | b'-')) {
                ahead += 1;
            }
            if matches!(self.peek(ahead), Some(b) if b.is_ascii_digit()) {
                self.pos += ahead;
                while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        self.push(TokenKind::Number, start);
    }

    // === sigils ===

    fn lex_sigil(&mut self, sigil: u8) {
        let start = self.pos;
        match sigil {
            b'&' => {
                if self.peek(1) == Some(b'&') || self.peek(1) == Some(b'=') {
                    self.lex_operator();
                    return;
                }
                self.pos += 1;
                if self.name_ahead() {
                    self.read_name();
                }
                self.push(TokenKind::Symbol, start);
            }
            b'*' => {
                if matches!(self.peek(1), Some(b'*') | Some(b'=')) {
                    self.lex_operator();
                    return;
                }
                self.pos += 1;
                if self.name_ahead() {
                    self.read_name();
                    self.push(TokenKind::Symbol, start);
                } else {
                    // multiplication
                    self.push(TokenKind::Operator, start);
                }
            }
            b'%' => {
                if self.peek(1) == Some(b'=') {
                    self.lex_operator();
                    return;
                }
                self.pos += 1;
                if self.name_ahead() {
                    self.read_name();
                }
                self.push(TokenKind::Symbol, start);
            }
            b'@' => {
                self.pos += 1;
                if self.name_ahead() {
                    self.read_name();
                }
                self.push(TokenKind::Symbol, start);
            }
            b'$' => {
                self.pos += 1;
                if self.peek(0) == Some(b'#') {
                    // $#array, or lone $# before { / $
                    if matches!(self.peek(1), Some(b) if b == b'_' || b.is_ascii_alphabetic()) {
                        self.pos += 1;
                        self.read_name();
                        self.push(TokenKind::Symbol, start);
                        return;
                    }
                    if matches!(self.peek(1), Some(b'{') | Some(b'$')) {
                        self.pos += 1;
                        self.push(TokenKind::Symbol, start);
                        return;
                    }
                    // `$` then comment to end of line ($#... fallback)
                    self.push(TokenKind::Symbol, start);
                    return;
                }
                if self.name_ahead() {
                    self.read_name();
                }
                self.push(TokenKind::Symbol, start);
            }
            _ => unreachable!(),
        }
    }

    fn name_ahead(&self) -> bool {
        matches!(self.peek(0), Some(b) if b == b'_' || b.is_ascii_alphanumeric())
            || (self.peek(0) == Some(b':') && self.peek(1) == Some(b':'))
    }

    /// Read an identifier with embedded `::` separators.
    fn read_name(&mut self) {
        loop {
            while matches!(self.peek(0), Some(b) if is_word_byte(b)) {
                self.pos += 1;
            }
            if self.peek(0) == Some(b':')
                && self.peek(1) == Some(b':')
                && matches!(self.peek(2), Some(b) if b == b'_' || b.is_ascii_alphabetic())
            {
                self.pos += 2;
                continue;
            }
            break;
        }
    }

    // === prototypes ===

    /// True when a `(` directly follows `sub` or `sub NAME`.
    fn after_sub_header(&self) -> bool {
        match self.prev_significant(0) {
            Some(tok) if tok.is_word("sub") => true,
            Some(tok) if tok.kind == TokenKind::Word => self
                .prev_significant(1)
                .is_some_and(|prev| prev.is_word("sub")),
            _ => false,
        }
    }

    fn lex_prototype(&mut self) {
        let start = self.pos;
        self.pos += 1;
        if !self.skip_to_delimiter(b'(', b')') {
            self.error(start, "unterminated prototype");
        }
        self.push(TokenKind::Prototype, start);
    }

    // === operators ===

    fn lex_slash(&mut self) {
        if self.division_context() {
            self.lex_operator();
            return;
        }
        // bare regex match: /pattern/flags
        let start = self.pos;
        self.pos += 1;
        if self.skip_to_delimiter(b'/', b'/') {
            while matches!(self.peek(0), Some(b) if b.is_ascii_lowercase()) {
                self.pos += 1;
            }
        } else {
            self.error(start, "unterminated regex");
        }
        self.push(TokenKind::QuoteLike, start);
    }

    /// A `/` after an operand is division; anywhere else it opens a match.
    fn division_context(&self) -> bool {
        match self.prev_significant(0) {
            Some(tok) => match tok.kind {
                TokenKind::Number | TokenKind::Quote | TokenKind::QuoteLike => true,
                TokenKind::Word => !REGEX_AFTER_WORDS.contains(&tok.value.as_str()),
                TokenKind::Symbol => tok.value.len() > 1,
                TokenKind::Operator => matches!(tok.value.as_str(), ")" | "]" | "}"),
                _ => false,
            },
            None => false,
        }
    }

    fn lex_angle(&mut self) {
        if self.peek(1) == Some(b'<') {
            let after = self.peek(2);
            let heredoc_ahead = matches!(after, Some(b'~') | Some(b'"') | Some(b'\''))
                || matches!(after, Some(b) if b == b'_' || b.is_ascii_alphabetic());
            if heredoc_ahead && self.try_heredoc_opener() {
                return;
            }
        }
        self.lex_operator();
    }

    fn lex_operator(&mut self) {
        const MULTI: &[&str] = &[
            "<=>", "**=", "||=", "&&=", "//=", "<<=", ">>=", "...", "->", "=>", "::", "++", "--",
            "**", "==", "!=", "<=", ">=", "=~", "!~", "&&", "||", "//", "..", "+=", "-=", "*=",
            "/=", ".=", "%=", "|=", "&=", "^=", "<<", ">>",
        ];
        let start = self.pos;
        for op in MULTI {
            if self.rest_starts_with(op) {
                self.pos += op.len();
                self.push(TokenKind::Operator, start);
                return;
            }
        }
        // single byte, or a full UTF-8 character for non-ASCII input
        let width = utf8_width(self.src[self.pos]);
        self.pos = (self.pos + width).min(self.src.len());
        self.push(TokenKind::Operator, start);
    }
}

fn is_word_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

fn matching_close(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    }
}

fn utf8_width(b: u8) -> usize {
    match b {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        let (tokens, _) = tokenize(source);
        tokens
            .into_iter()
            .filter(|tok| tok.kind != TokenKind::Whitespace)
            .map(|tok| (tok.kind, tok.value.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_declaration() {
        let toks = kinds("my $x = 1;");
        assert_eq!(
            toks,
            vec![
                (TokenKind::Word, "my".into()),
                (TokenKind::Symbol, "$x".into()),
                (TokenKind::Operator, "=".into()),
                (TokenKind::Number, "1".into()),
                (TokenKind::Operator, ";".into()),
            ]
        );
    }

    #[test]
    fn test_sigil_split_forms() {
        let toks = kinds("@$x; %{$y}; $#a;");
        assert_eq!(toks[0], (TokenKind::Symbol, "@".into()));
        assert_eq!(toks[1], (TokenKind::Symbol, "$x".into()));
        assert_eq!(toks[3], (TokenKind::Symbol, "%".into()));
        assert_eq!(toks[4], (TokenKind::Operator, "{".into()));
        assert_eq!(toks[8], (TokenKind::Symbol, "$#a".into()));
    }

    #[test]
    fn test_qualified_symbol() {
        let toks = kinds("$Foo::Bar::baz = 1;");
        assert_eq!(toks[0], (TokenKind::Symbol, "$Foo::Bar::baz".into()));
    }

    #[test]
    fn test_qualified_word_splits() {
        let toks = kinds("Foo::Bar::baz(1)");
        assert_eq!(toks[0], (TokenKind::Word, "Foo".into()));
        assert_eq!(toks[1], (TokenKind::Operator, "::".into()));
        assert_eq!(toks[2], (TokenKind::Word, "Bar".into()));
    }

    #[test]
    fn test_quote_like_qw() {
        let toks = kinds("our @EXPORT = qw($FOO @BAR);");
        let qw = toks
            .iter()
            .find(|(kind, _)| *kind == TokenKind::QuoteLike)
            .unwrap();
        assert_eq!(qw.1, "qw($FOO @BAR)");
    }

    #[test]
    fn test_quote_like_substitution() {
        let toks = kinds("s/foo/bar/g; s{a}{b};");
        assert_eq!(toks[0], (TokenKind::QuoteLike, "s/foo/bar/g".into()));
        assert_eq!(toks[2], (TokenKind::QuoteLike, "s{a}{b}".into()));
    }

    #[test]
    fn test_slash_division_vs_match() {
        let toks = kinds("$x / 2");
        assert_eq!(toks[1], (TokenKind::Operator, "/".into()));
        let toks = kinds("return /foo/");
        assert_eq!(toks[1], (TokenKind::QuoteLike, "/foo/".into()));
    }

    #[test]
    fn test_heredoc_body() {
        let src = "my $t = <<EOF;\nline one\nEOF\nmy $u = 2;\n";
        let (tokens, diags) = tokenize(src);
        assert!(diags.is_empty());
        let body = tokens
            .iter()
            .find(|tok| tok.kind == TokenKind::HereDocContent)
            .unwrap();
        assert_eq!(body.value.as_str(), "line one\nEOF\n");
        // code after the heredoc still lexes
        assert!(tokens.iter().any(|tok| tok.value == "$u"));
    }

    #[test]
    fn test_unterminated_heredoc_diagnostic() {
        let (_, diags) = tokenize("my $t = <<EOF;\nno end\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("unterminated heredoc"));
    }

    #[test]
    fn test_prototype_after_sub() {
        let toks = kinds("sub foo ($self, $opt) { }");
        assert_eq!(toks[2], (TokenKind::Prototype, "($self, $opt)".into()));
        let toks = kinds("my $cb = sub ($x) { $x };");
        assert!(toks.contains(&(TokenKind::Prototype, "($x)".into())));
    }

    #[test]
    fn test_paren_not_prototype_elsewhere() {
        let toks = kinds("foo($x)");
        assert_eq!(toks[1], (TokenKind::Operator, "(".into()));
    }

    #[test]
    fn test_pod_is_comment() {
        let src = "=head1 NAME\n\ntext\n\n=cut\nmy $x;\n";
        let toks = kinds(src);
        assert_eq!(toks[0].0, TokenKind::Comment);
        assert!(toks.iter().any(|(_, v)| v == "$x"));
    }

    #[test]
    fn test_end_marker() {
        let toks = kinds("my $x;\n__END__\nanything at all\n");
        assert_eq!(toks.last().unwrap().0, TokenKind::End);
    }

    #[test]
    fn test_v_string() {
        let toks = kinds("use v5.12;");
        assert_eq!(toks[1], (TokenKind::Number, "v5.12".into()));
    }

    #[test]
    fn test_every_byte_covered() {
        let src = "use strict;\nsub f { my %h = (a => 1); $h{a} =~ /x/ }\n";
        let (tokens, _) = tokenize(src);
        let mut offset = 0u32;
        for tok in &tokens {
            assert_eq!(tok.span.start, offset, "gap before {:?}", tok);
            offset = tok.span.end;
        }
        assert_eq!(offset as usize, src.len());
    }

    #[test]
    fn test_unterminated_string_diagnostic() {
        let (_, diags) = tokenize("my $x = 'oops");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("unterminated string"));
    }
}
