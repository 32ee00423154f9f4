use std::fmt;
use std::ops::Range;

use logos::{Lexer, Logos};

/// Lexical classes of the configuration file.
///
/// Only enough of the language is recognised to walk object and array
/// literals safely: string, template, regex and comment bodies are single
/// tokens so brackets inside them never affect nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Logos)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#![^\n]*")] // Shebang
pub enum TokenKind {
    #[regex(r"//[^\n]*")]
    LineComment,
    #[token("/*", lex_block_comment)]
    BlockComment,
    #[regex(r#""([^"\\\r\n]|\\(.|\r?\n))*""#)]
    #[regex(r"'([^'\\\r\n]|\\(.|\r?\n))*'")]
    Str,
    #[token("`", lex_template)]
    Template,
    /// Produced by [`tokenize`] when a `/` starts a regex literal.
    Regex,
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,
    #[regex(r"[0-9][0-9A-Za-z_.]*")]
    #[regex(r"\.[0-9][0-9A-Za-z_]*")]
    Number,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("...")]
    Spread,
    #[token("=", priority = 3)]
    Assign,
    #[token("/")]
    Slash,
    #[regex(r"[+\-*%&|^!~?<>=@#]+")]
    Operator,
    #[regex(r"[^\x00-\x7F]+")]
    NonAscii,
}

impl TokenKind {
    pub fn is_comment(self) -> bool {
        matches!(self, TokenKind::LineComment | TokenKind::BlockComment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected input at line {}, column {}",
            self.line, self.column
        )
    }
}

impl std::error::Error for LexError {}

/// Split `source` into tokens with absolute byte spans. Comments are kept.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let offset = if source.starts_with('\u{feff}') { 3 } else { 0 };
    let mut lexer = TokenKind::lexer(&source[offset..]);
    let mut tokens: Vec<Token> = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let Ok(mut kind) = result else {
            return Err(error_at(source, offset + span.start));
        };

        if kind == TokenKind::Slash && regex_allowed(&tokens, source) {
            let Some(len) = scan_regex(lexer.remainder().as_bytes()) else {
                return Err(error_at(source, offset + span.start));
            };
            lexer.bump(len);
            kind = TokenKind::Regex;
        }

        let span = lexer.span();
        tokens.push(Token {
            kind,
            span: offset + span.start..offset + span.end,
        });
    }

    Ok(tokens)
}

fn error_at(source: &str, offset: usize) -> LexError {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = offset - before.rfind('\n').map_or(0, |idx| idx + 1) + 1;
    LexError { line, column }
}

/// A `/` begins a regex literal wherever an expression may start.
fn regex_allowed(tokens: &[Token], source: &str) -> bool {
    let Some(prev) = tokens.iter().rev().find(|token| !token.kind.is_comment()) else {
        return true;
    };

    match prev.kind {
        TokenKind::Ident => matches!(
            prev.text(source),
            "return" | "typeof" | "instanceof" | "in" | "of" | "new" | "delete" | "void"
                | "throw" | "case" | "do" | "else" | "yield" | "await"
        ),
        TokenKind::Str
        | TokenKind::Template
        | TokenKind::Regex
        | TokenKind::Number
        | TokenKind::RParen
        | TokenKind::RBracket
        | TokenKind::RBrace
        | TokenKind::NonAscii => false,
        _ => true,
    }
}

fn lex_block_comment(lex: &mut Lexer<TokenKind>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

fn lex_template(lex: &mut Lexer<TokenKind>) -> bool {
    match scan_template(lex.remainder().as_bytes()) {
        Some(len) => {
            lex.bump(len);
            true
        }
        None => false,
    }
}

/// Length of a template body up to and including the closing backtick.
fn scan_template(src: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'\\' => i += 2,
            b'`' => return Some(i + 1),
            b'$' if src.get(i + 1) == Some(&b'{') => {
                i += 2 + scan_substitution(&src[i + 2..])?;
            }
            _ => i += 1,
        }
    }
    None
}

/// Length of a `${ ... }` body up to and including the closing brace.
fn scan_substitution(src: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(i + 1),
            b'}' => depth -= 1,
            b'`' => {
                i += 1 + scan_template(&src[i + 1..])?;
                continue;
            }
            quote @ (b'"' | b'\'') => {
                i += 1 + scan_quoted(&src[i + 1..], quote)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn scan_quoted(src: &[u8], quote: u8) -> Option<usize> {
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Length of a regex body and flags following the opening slash.
fn scan_regex(src: &[u8]) -> Option<usize> {
    let mut in_class = false;
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while i < src.len() && src[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
    None
}

/// Decode the value of a quoted string literal, quotes included in `raw`.
pub fn unescape_string(raw: &str) -> String {
    let body = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        let Some(escaped) = chars.next() else {
            break;
        };

        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(char::is_ascii_digit) => out.push('\0'),
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                push_code_point(&mut out, u32::from_str_radix(&hex, 16).ok());
            }
            'u' => {
                let code = read_unicode_escape(&mut chars);
                match code {
                    Some(high @ 0xD800..=0xDBFF) => {
                        let mut lookahead = chars.clone();
                        let low = if lookahead.next() == Some('\\') && lookahead.next() == Some('u')
                        {
                            read_unicode_escape(&mut lookahead)
                        } else {
                            None
                        };
                        match low {
                            Some(low @ 0xDC00..=0xDFFF) => {
                                chars = lookahead;
                                let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                                push_code_point(&mut out, Some(combined));
                            }
                            _ => out.push(char::REPLACEMENT_CHARACTER),
                        }
                    }
                    other => push_code_point(&mut out, other),
                }
            }
            other => out.push(other),
        }
    }

    out
}

fn read_unicode_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<u32> {
    if chars.peek() == Some(&'{') {
        chars.next();
        let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
        return u32::from_str_radix(&hex, 16).ok();
    }
    let hex: String = chars.by_ref().take(4).collect();
    u32::from_str_radix(&hex, 16).ok()
}

fn push_code_point(out: &mut String, code: Option<u32>) {
    out.push(
        code.and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER),
    );
}

/// The static text of a template literal before its first substitution.
pub fn template_head(raw: &str) -> &str {
    let body = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => return &body[..i],
            _ => i += 1,
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_exports_assignment() {
        let source = "module.exports = { plugins: ['a'] };";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::LBracket,
                TokenKind::Str,
                TokenKind::RBracket,
                TokenKind::RBrace,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn brackets_inside_strings_and_comments_are_opaque() {
        let source = "[\"]\", '[', /* ] */ // ]\n `${ {a: '}'} }]`]";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::LBracket,
                TokenKind::Str,
                TokenKind::Comma,
                TokenKind::Str,
                TokenKind::Comma,
                TokenKind::BlockComment,
                TokenKind::LineComment,
                TokenKind::Template,
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn equality_is_an_operator_and_single_equals_assigns() {
        assert_eq!(
            kinds("a == b"),
            vec![TokenKind::Ident, TokenKind::Operator, TokenKind::Ident]
        );
        assert_eq!(
            kinds("a = b"),
            vec![TokenKind::Ident, TokenKind::Assign, TokenKind::Ident]
        );
        assert_eq!(
            kinds("a => b"),
            vec![TokenKind::Ident, TokenKind::Operator, TokenKind::Ident]
        );
    }

    #[test]
    fn block_comments_are_single_tokens() {
        let source = "/* keep */ [a, /* ] */ b] /**/ /* a * b ** c */";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::BlockComment);
        assert_eq!(tokens[0].text(source), "/* keep */");
        assert_eq!(
            tokens.iter().map(|token| token.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::BlockComment,
                TokenKind::LBracket,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::BlockComment,
                TokenKind::Ident,
                TokenKind::RBracket,
                TokenKind::BlockComment,
                TokenKind::BlockComment,
            ]
        );
        assert_eq!(tokens[8].text(source), "/* a * b ** c */");
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        assert_eq!(
            tokenize("a = 1
/* open").unwrap_err(),
            LexError { line: 2, column: 1 }
        );
    }

    #[test]
    fn spans_cover_exact_bytes() {
        let source = "  x = \"héllo\" ";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[2].text(source), "\"héllo\"");
        assert_eq!(tokens[2].span, 6..14);
    }

    #[test]
    fn slash_is_regex_after_operator_and_division_after_value() {
        assert_eq!(
            kinds("x = /[/]\\//g; y = a / b"),
            vec![
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Regex,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Ident,
                TokenKind::Slash,
                TokenKind::Ident,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = tokenize("a = {\n  b: 'oops\n}").unwrap_err();
        assert_eq!(err, LexError { line: 2, column: 6 });
    }

    #[test]
    fn unterminated_template_is_an_error() {
        assert!(tokenize("x = `abc").is_err());
    }

    #[test]
    fn unescape_handles_common_escapes() {
        assert_eq!(unescape_string(r#""a\"b""#), "a\"b");
        assert_eq!(unescape_string(r"'it\'s'"), "it's");
        assert_eq!(unescape_string(r#""\x41B\u{43}""#), "ABC");
        assert_eq!(unescape_string(r#""\uD83D\uDE00""#), "\u{1F600}");
        assert_eq!(unescape_string("\"a\\\nb\""), "ab");
    }

    #[test]
    fn template_head_stops_at_first_substitution() {
        assert_eq!(template_head("`hyper-foo`"), "hyper-foo");
        assert_eq!(template_head("`hyper-${name}-x`"), "hyper-");
        assert_eq!(template_head(r"`a\${b}`"), r"a\${b}");
    }
}
