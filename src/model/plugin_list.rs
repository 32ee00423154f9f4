use std::fmt;
use std::ops::Range;

use crate::model::lexer::{Token, TokenKind, template_head, unescape_string};

/// Which of the two plugin arrays an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// `plugins`: installed from the registry.
    Tracked,
    /// `localPlugins`: forked into the local plugins directory.
    Local,
}

impl ListKind {
    pub fn field_name(self) -> &'static str {
        match self {
            ListKind::Tracked => "plugins",
            ListKind::Local => "localPlugins",
        }
    }

    /// Suffix for user-facing messages.
    pub fn qualifier(self) -> &'static str {
        match self {
            ListKind::Tracked => "",
            ListKind::Local => " locally",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// The literal encoding of one array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryNode {
    /// `"name"` or `'name'`, holding the decoded value.
    Literal { value: String, quote: char },
    /// `` `name` ``, holding the raw text before the first substitution.
    Template { head: String },
    /// Any other expression. Kept verbatim, never matches an identifier.
    Expression,
}

impl EntryNode {
    pub fn canonical(&self) -> Option<&str> {
        match self {
            EntryNode::Literal { value, .. } => Some(value),
            EntryNode::Template { head } => Some(head),
            EntryNode::Expression => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PluginListEntry {
    pub node: EntryNode,
    /// Byte span of the element expression.
    pub span: Range<usize>,
    /// Byte span of the comma that follows the element, if any.
    pub comma: Option<Range<usize>>,
}

impl PluginListEntry {
    pub fn canonical(&self) -> Option<&str> {
        self.node.canonical()
    }
}

impl PartialEq for PluginListEntry {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

/// A byte-range replacement against the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl TextEdit {
    fn insert(at: usize, text: String) -> Self {
        Self {
            range: at..at,
            replacement: text,
        }
    }

    fn delete(range: Range<usize>) -> Self {
        Self {
            range,
            replacement: String::new(),
        }
    }
}

/// One array-valued field of the exported object, indexed by byte span.
#[derive(Debug, Clone)]
pub struct PluginList {
    open: Range<usize>,
    close: Range<usize>,
    entries: Vec<PluginListEntry>,
}

impl PluginList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Canonical identifiers in list order. Opaque expressions are skipped.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(PluginListEntry::canonical)
            .collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.canonical() == Some(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Edit appending `name` as a plain string literal after the last element.
    pub fn insert_edit(&self, source: &str, name: &str) -> TextEdit {
        let literal = quote_literal(name, self.quote_style());

        let Some(last) = self.entries.last() else {
            let inner = self.open.end..self.close.start;
            let inner_text = &source[inner.clone()];
            if inner_text.trim().is_empty() {
                return TextEdit {
                    range: inner,
                    replacement: literal,
                };
            }

            // Only comments inside the brackets: append after them.
            let content_end = inner.start + inner_text.trim_end().len();
            if inner_text.contains('\n') {
                let indent = line_indent(source, content_end.saturating_sub(1));
                return TextEdit::insert(content_end, format!("\n{indent}{literal}"));
            }
            return TextEdit::insert(content_end, format!(" {literal}"));
        };

        // A line comment after the last element stays attached to it.
        let after = last.comma.as_ref().map_or(last.span.end, |comma| comma.end);
        if let Some(comment_end) = trailing_line_comment(source, after) {
            let indent = line_indent(source, last.span.start);
            let mut replacement = String::new();
            if last.comma.is_none() {
                replacement.push(',');
            }
            replacement.push_str(&source[last.span.end..comment_end]);
            replacement.push('\n');
            replacement.push_str(indent);
            replacement.push_str(&literal);
            if last.comma.is_some() {
                replacement.push(',');
            }
            return TextEdit {
                range: last.span.end..comment_end,
                replacement,
            };
        }

        let separator = self.separator(source);
        TextEdit::insert(last.span.end, format!("{separator}{literal}"))
    }

    /// Edit deleting the element at `index` together with its separator.
    pub fn remove_edit(&self, source: &str, index: usize) -> TextEdit {
        let entry = &self.entries[index];
        let prev = index.checked_sub(1).map(|idx| &self.entries[idx]);
        let is_last = index + 1 == self.entries.len();
        let end = entry
            .comma
            .as_ref()
            .map_or(entry.span.end, |comma| comma.end);

        if prev.is_none()
            && is_last
            && source[self.open.end..entry.span.start].trim().is_empty()
            && source[end..self.close.start].trim().is_empty()
        {
            return TextEdit::delete(self.open.end..self.close.start);
        }

        let line = own_line(source, entry.span.start, end);
        if let Some(line) = &line {
            if entry.comma.is_some() || prev.is_none() {
                return TextEdit::delete(line.clone());
            }
        }

        // Last element: drop the previous comma, keep comments between them.
        if is_last {
            if let Some(prev_comma) = prev.and_then(|prev| prev.comma.as_ref()) {
                if let Some(line) = line {
                    return TextEdit {
                        range: prev_comma.start..line.end,
                        replacement: source[prev_comma.end..line.start].to_string(),
                    };
                }
                let kept = source[prev_comma.end..entry.span.start].trim_end();
                return TextEdit {
                    range: prev_comma.start..entry.span.end,
                    replacement: kept.to_string(),
                };
            }
        }

        let trailing = source[end..]
            .bytes()
            .take_while(|b| *b == b' ' || *b == b'\t')
            .count();
        TextEdit::delete(entry.span.start..end + trailing)
    }

    fn quote_style(&self) -> char {
        self.entries
            .iter()
            .find_map(|entry| match entry.node {
                EntryNode::Literal { quote, .. } => Some(quote),
                _ => None,
            })
            .unwrap_or('"')
    }

    /// Text to place between the current last element and a new one.
    fn separator(&self, source: &str) -> String {
        let count = self.entries.len();
        if count >= 2 {
            let prev = &self.entries[count - 2];
            let last = &self.entries[count - 1];
            let between = &source[prev.span.end..last.span.start];
            if between.chars().all(|c| c == ',' || c.is_whitespace()) {
                return between.to_string();
            }
        }

        let Some(last) = self.entries.last() else {
            return String::new();
        };
        if source[self.open.end..self.close.start].contains('\n') {
            format!(",\n{}", line_indent(source, last.span.start))
        } else {
            ", ".to_string()
        }
    }
}

/// Render `value` as a string literal using `quote`.
pub fn quote_literal(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Leading whitespace of the line containing byte `pos`.
fn line_indent(source: &str, pos: usize) -> &str {
    let start = source[..pos].rfind('\n').map_or(0, |idx| idx + 1);
    let line = &source[start..];
    let width = line
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &line[..width]
}

/// End of a `//` comment that follows `pos` on the same line.
fn trailing_line_comment(source: &str, pos: usize) -> Option<usize> {
    let rest = &source[pos..];
    let gap = rest
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    if !rest[gap..].starts_with("//") {
        return None;
    }
    Some(pos + rest.find('\n').unwrap_or(rest.len()))
}

/// The full line (newline included) when `start..end` is its only content.
fn own_line(source: &str, start: usize, end: usize) -> Option<Range<usize>> {
    let line_start = source[..start].rfind('\n').map_or(0, |idx| idx + 1);
    if !source[line_start..start].trim().is_empty() {
        return None;
    }

    let newline = source[end..].find('\n')?;
    if !source[end..end + newline].trim().is_empty() {
        return None;
    }

    Some(line_start..end + newline + 1)
}

/// The two plugin arrays found in a configuration source.
#[derive(Debug, Clone, Default)]
pub struct ListIndex {
    pub tracked: Option<PluginList>,
    pub local: Option<PluginList>,
}

impl ListIndex {
    /// Locate `module.exports = { ... }` and index its plugin arrays.
    pub fn build(source: &str, tokens: &[Token]) -> Self {
        let significant: Vec<&Token> = tokens
            .iter()
            .filter(|token| !token.kind.is_comment())
            .collect();
        let Some(open) = find_exported_object(source, &significant) else {
            return Self::default();
        };
        let Some(close) = matching_close(&significant, open) else {
            return Self::default();
        };

        let mut index = Self::default();
        for (key, value) in object_members(source, &significant, open, close) {
            let slot = match key.as_str() {
                "plugins" => &mut index.tracked,
                "localPlugins" => &mut index.local,
                _ => continue,
            };
            if slot.is_none() {
                *slot = parse_array(source, &significant, value);
            }
        }
        index
    }

    pub fn get(&self, kind: ListKind) -> Option<&PluginList> {
        match kind {
            ListKind::Tracked => self.tracked.as_ref(),
            ListKind::Local => self.local.as_ref(),
        }
    }
}

/// Index of the `{` opening the first top-level exported object literal.
fn find_exported_object(source: &str, tokens: &[&Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => {
                if depth == 0 && is_exports_assignment(source, tokens, idx) {
                    return Some(idx);
                }
                depth += 1;
            }
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }
    None
}

fn is_exports_assignment(source: &str, tokens: &[&Token], brace: usize) -> bool {
    if tokens[brace].kind != TokenKind::LBrace || brace < 4 {
        return false;
    }
    let window = &tokens[brace - 4..brace];
    window[0].kind == TokenKind::Ident
        && window[0].text(source) == "module"
        && window[1].kind == TokenKind::Dot
        && window[2].kind == TokenKind::Ident
        && window[2].text(source) == "exports"
        && window[3].kind == TokenKind::Assign
        && (brace == 4 || tokens[brace - 5].kind != TokenKind::Dot)
}

fn matching_close(tokens: &[&Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => depth += 1,
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `tokens[start..end]` on commas at nesting depth zero.
fn split_top_level(
    tokens: &[&Token],
    start: usize,
    end: usize,
) -> Vec<(Range<usize>, Option<usize>)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut part_start = start;

    for (idx, token) in tokens.iter().enumerate().take(end).skip(start) {
        match token.kind {
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => depth += 1,
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                depth = depth.saturating_sub(1);
            }
            TokenKind::Comma if depth == 0 => {
                parts.push((part_start..idx, Some(idx)));
                part_start = idx + 1;
            }
            _ => {}
        }
    }
    if part_start < end {
        parts.push((part_start..end, None));
    }
    parts
}

/// `key: value` members of the object between `open` and `close`.
fn object_members(
    source: &str,
    tokens: &[&Token],
    open: usize,
    close: usize,
) -> Vec<(String, Range<usize>)> {
    split_top_level(tokens, open + 1, close)
        .into_iter()
        .filter_map(|(part, _)| {
            if part.len() < 3 || tokens[part.start + 1].kind != TokenKind::Colon {
                return None;
            }
            let key_token = tokens[part.start];
            let key = match key_token.kind {
                TokenKind::Ident => key_token.text(source).to_string(),
                TokenKind::Str => unescape_string(key_token.text(source)),
                _ => return None,
            };
            Some((key, part.start + 2..part.end))
        })
        .collect()
}

fn parse_array(source: &str, tokens: &[&Token], value: Range<usize>) -> Option<PluginList> {
    if tokens[value.start].kind != TokenKind::LBracket {
        return None;
    }
    let close = matching_close(tokens, value.start)?;
    if close + 1 != value.end {
        return None;
    }

    let entries = split_top_level(tokens, value.start + 1, close)
        .into_iter()
        .filter(|(part, _)| !part.is_empty())
        .map(|(part, comma)| {
            let first = tokens[part.start];
            let last = tokens[part.end - 1];
            let node = match (part.len(), first.kind) {
                (1, TokenKind::Str) => {
                    let raw = first.text(source);
                    EntryNode::Literal {
                        value: unescape_string(raw),
                        quote: raw.chars().next().unwrap_or('"'),
                    }
                }
                (1, TokenKind::Template) => EntryNode::Template {
                    head: template_head(first.text(source)).to_string(),
                },
                _ => EntryNode::Expression,
            };
            PluginListEntry {
                node,
                span: first.span.start..last.span.end,
                comma: comma.map(|idx| tokens[idx].span.clone()),
            }
        })
        .collect();

    Some(PluginList {
        open: tokens[value.start].span.clone(),
        close: tokens[close].span.clone(),
        entries,
    })
}
