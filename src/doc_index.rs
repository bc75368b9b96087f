//! Documentation search-index shards.
//!
//! The API reference is searched in the browser through a table of entries,
//! split into shards by the first character of each entry's key. Each shard
//! is a JavaScript file binding a nested array literal to `searchData`:
//!
//! ```text
//! var searchData=
//! [
//!   ['search_5fall_0',['search_all',['../Searcher.html#a1',1,'knncolle::Searcher::search_all()']]],
//!   ['searcher_1',['Searcher',['../Searcher.html',1,'knncolle']]]
//! ];
//! ```
//!
//! Shards are regenerated wholesale from the documented symbols; entries are
//! never edited in place.

use crate::error::{KnnError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

/// Name of the variable that every shard binds.
pub const SEARCH_DATA_VARIABLE: &str = "searchData";

/// A link to one documented symbol or page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    /// URL of the page, possibly with an anchor.
    pub url: String,

    /// Qualifying scope shown next to the label, e.g. the enclosing
    /// namespace or the full signature. May be empty.
    pub scope: String,
}

impl TargetRecord {
    /// Create a target.
    pub fn new(url: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            scope: scope.into(),
        }
    }
}

/// A documented symbol, as produced by the documentation generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub name: String,
    pub url: String,
    pub scope: String,
}

impl SymbolRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            scope: scope.into(),
        }
    }
}

/// One searchable term with all the places it links to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    /// Lower-cased, escaped search key.
    pub key: String,

    /// Label displayed in the search results.
    pub label: String,

    /// Link targets, in order of appearance. Never empty.
    pub targets: Vec<TargetRecord>,
}

impl SearchEntry {
    /// Create an entry keyed by the escaped label.
    pub fn new(label: impl Into<String>, targets: Vec<TargetRecord>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() {
            return Err(KnnError::invalid_argument("search entry label cannot be empty"));
        }
        if targets.is_empty() {
            return Err(KnnError::invalid_argument(format!(
                "search entry '{}' has no targets",
                label
            )));
        }
        Ok(Self {
            key: escape_key(&label),
            label,
            targets,
        })
    }

    fn first_key_char(&self) -> Option<char> {
        self.key.chars().next()
    }
}

/// Convert a symbol name into a search key.
///
/// The name is lower-cased and every byte other than an ASCII letter or digit
/// is written as `_` followed by two hex digits, so `search_all` becomes
/// `search_5fall` and `Searcher.hpp` becomes `searcher_2ehpp`.
pub fn escape_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for byte in name.to_lowercase().bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
            key.push(byte as char);
        } else {
            let _ = write!(key, "_{:02x}", byte);
        }
    }
    key
}

/// Collapse symbols into search entries.
///
/// Symbols whose names match case-insensitively share an entry, with targets
/// in input order. The entry's label is the common name, or the lower-cased
/// name if the spellings differ. Symbols with empty names are skipped.
/// Entries are sorted by key and then by label.
pub fn build_entries(symbols: &[SymbolRecord]) -> Vec<SearchEntry> {
    struct Group {
        label: String,
        mixed_case: bool,
        targets: Vec<TargetRecord>,
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for symbol in symbols.iter().filter(|s| !s.name.is_empty()) {
        let lowered = symbol.name.to_lowercase();
        let target = TargetRecord::new(symbol.url.as_str(), symbol.scope.as_str());
        match positions.get(&lowered) {
            Some(&at) => {
                let group = &mut groups[at];
                group.mixed_case |= group.label != symbol.name;
                group.targets.push(target);
            }
            None => {
                positions.insert(lowered, groups.len());
                groups.push(Group {
                    label: symbol.name.clone(),
                    mixed_case: false,
                    targets: vec![target],
                });
            }
        }
    }

    let mut entries: Vec<SearchEntry> = groups
        .into_iter()
        .map(|group| {
            let label = if group.mixed_case {
                group.label.to_lowercase()
            } else {
                group.label
            };
            SearchEntry {
                key: escape_key(&label),
                label,
                targets: group.targets,
            }
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.label.cmp(&b.label)));
    entries
}

/// A partial, alphabetical slice of the search table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexShard {
    pub shard_id: usize,
    pub entries: Vec<SearchEntry>,
}

/// Group entries into shards by the first character of their keys.
///
/// Shards are ordered by that character and numbered from zero. Entries keep
/// their relative order within each shard.
pub fn shard_entries(entries: Vec<SearchEntry>) -> Vec<SearchIndexShard> {
    let mut by_first: BTreeMap<char, Vec<SearchEntry>> = BTreeMap::new();
    for entry in entries {
        match entry.first_key_char() {
            Some(first) => by_first.entry(first).or_default().push(entry),
            None => tracing::warn!(label = %entry.label, "skipping search entry with an empty key"),
        }
    }

    by_first
        .into_values()
        .enumerate()
        .map(|(shard_id, entries)| SearchIndexShard { shard_id, entries })
        .collect()
}

/// Write each shard to `{dir}/{prefix}_{id:x}.js`.
pub fn write_shards(dir: &Path, prefix: &str, shards: &[SearchIndexShard]) -> Result<()> {
    for shard in shards {
        shard.validate()?;
        let path = dir.join(shard.file_name(prefix));
        std::fs::write(&path, shard.render()).map_err(|e| {
            KnnError::io(format!("failed to write search shard '{}': {}", path.display(), e))
        })?;
    }
    tracing::debug!(shards = shards.len(), prefix, "wrote search index");
    Ok(())
}

impl SearchIndexShard {
    /// File name of this shard, with the id in lower-case hex.
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}_{:x}.js", prefix, self.shard_id)
    }

    /// Render the shard as a JavaScript file.
    pub fn render(&self) -> String {
        let mut out = format!("var {}=\n[\n", SEARCH_DATA_VARIABLE);
        for (position, entry) in self.entries.iter().enumerate() {
            if position > 0 {
                out.push_str(",\n");
            }
            out.push_str("  [");
            push_quoted(&mut out, &format!("{}_{}", entry.key, position));
            out.push_str(",[");
            push_quoted(&mut out, &escape_html(&entry.label));
            for target in &entry.targets {
                out.push_str(",[");
                push_quoted(&mut out, &target.url);
                out.push_str(",1,");
                push_quoted(&mut out, &escape_html(&target.scope));
                out.push(']');
            }
            out.push_str("]]");
        }
        out.push_str("\n];\n");
        out
    }

    /// Parse a shard produced by [`SearchIndexShard::render`].
    ///
    /// The shard id is not part of the file contents and must be supplied.
    pub fn parse(shard_id: usize, text: &str) -> Result<Self> {
        let rest = text
            .trim_start()
            .strip_prefix("var")
            .and_then(|r| r.trim_start().strip_prefix(SEARCH_DATA_VARIABLE))
            .and_then(|r| r.trim_start().strip_prefix('='))
            .ok_or_else(|| {
                KnnError::invalid_argument(format!("search shard does not bind '{}'", SEARCH_DATA_VARIABLE))
            })?;

        let mut parser = LiteralParser::new(rest);
        let table = parser.parse_value()?;
        parser.skip_whitespace();
        parser.consume(';')?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("trailing content after the search table"));
        }

        let rows = table.into_list("search table")?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(parse_entry(row)?);
        }
        Ok(Self { shard_id, entries })
    }

    /// Check that the shard is well-formed.
    pub fn validate(&self) -> Result<()> {
        let first = self.entries.first().and_then(SearchEntry::first_key_char);
        for entry in &self.entries {
            let valid_key = !entry.key.is_empty()
                && entry
                    .key
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
            if !valid_key {
                return Err(KnnError::invalid_argument(format!(
                    "invalid search key '{}'",
                    entry.key
                )));
            }
            if entry.targets.is_empty() {
                return Err(KnnError::invalid_argument(format!(
                    "search entry '{}' has no targets",
                    entry.key
                )));
            }
            if entry.first_key_char() != first {
                return Err(KnnError::invalid_argument(format!(
                    "search entry '{}' does not belong in shard {}",
                    entry.key, self.shard_id
                )));
            }
        }
        Ok(())
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn unescape_html(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
}

fn parse_entry(row: Literal) -> Result<SearchEntry> {
    let mut row = row.into_list("search entry")?.into_iter();
    let numbered = row
        .next()
        .ok_or_else(|| KnnError::invalid_argument("search entry is missing its key"))?
        .into_string("search key")?;
    let key = match numbered.rsplit_once('_') {
        Some((key, position))
            if !key.is_empty() && !position.is_empty() && position.bytes().all(|b| b.is_ascii_digit()) =>
        {
            key.to_string()
        }
        _ => {
            return Err(KnnError::invalid_argument(format!(
                "search key '{}' has no position suffix",
                numbered
            )))
        }
    };

    let body = row
        .next()
        .ok_or_else(|| KnnError::invalid_argument(format!("search entry '{}' has no body", key)))?;
    let mut body = body.into_list("search entry body")?.into_iter();
    let label = body
        .next()
        .ok_or_else(|| KnnError::invalid_argument(format!("search entry '{}' has no label", key)))?
        .into_string("search label")?;

    let mut targets = Vec::new();
    for target in body {
        let fields = target.into_list("search target")?;
        match <[Literal; 3]>::try_from(fields) {
            // The middle field flags a link into the documentation itself.
            Ok([url, Literal::Int(0 | 1), scope]) => targets.push(TargetRecord {
                url: url.into_string("target URL")?,
                scope: unescape_html(&scope.into_string("target scope")?),
            }),
            _ => {
                return Err(KnnError::invalid_argument(format!(
                    "malformed target in search entry '{}'",
                    key
                )))
            }
        }
    }
    if targets.is_empty() {
        return Err(KnnError::invalid_argument(format!(
            "search entry '{}' has no targets",
            key
        )));
    }

    Ok(SearchEntry {
        key,
        label: unescape_html(&label),
        targets,
    })
}

/// Values of the array literals used by search shards.
#[derive(Debug)]
enum Literal {
    Str(String),
    Int(i64),
    List(Vec<Literal>),
}

impl Literal {
    fn into_list(self, what: &str) -> Result<Vec<Literal>> {
        match self {
            Literal::List(items) => Ok(items),
            _ => Err(KnnError::invalid_argument(format!("expected an array for the {}", what))),
        }
    }

    fn into_string(self, what: &str) -> Result<String> {
        match self {
            Literal::Str(s) => Ok(s),
            _ => Err(KnnError::invalid_argument(format!("expected a string for the {}", what))),
        }
    }
}

struct LiteralParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, what: &str) -> KnnError {
        KnnError::invalid_argument(format!("{} at offset {} of the search table", what, self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn consume(&mut self, expected: char) -> Result<()> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_value(&mut self) -> Result<Literal> {
        self.skip_whitespace();
        match self.peek() {
            Some('[') => self.parse_list(),
            Some('\'') => self.parse_string().map(Literal::Str),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_int(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<Literal> {
        self.consume('[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Literal::List(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Literal::List(items)),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        self.consume('\'')?;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some(c) => s.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_int(&mut self) -> Result<Literal> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.text[start..self.pos]
            .parse()
            .map(Literal::Int)
            .map_err(|_| self.error("malformed integer"))
    }
}
