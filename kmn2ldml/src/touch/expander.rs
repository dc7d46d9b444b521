//! Marker and variable expansion for key output strings
//!
//! LDML key outputs and transforms embed a small mini-language:
//!
//! - `\m{name}` marker references (`\m{.}` matches any marker in transforms)
//! - `${id}` references to `<string>` variables
//! - `\u{XXXX}` code point escapes, possibly several space-separated values
//!
//! On the touch surface a marker is encoded as the sentinel `U+FFFF U+0008`
//! followed by the character whose scalar value is the marker index.

use std::collections::HashMap;
use logos::Logos;
use kmn_ldml_core::ldml::{LdmlKeyboard, VariableKind};
use crate::ldml::escape::{escape_output, marker_ref};

pub const MARKER_SENTINEL: &str = "\u{FFFF}\u{0008}";

/// Matches any marker inside transforms.
pub const ANY_MARKER: &str = ".";

/// Nested `${var}` references are followed this many levels deep.
pub const MAX_VARIABLE_DEPTH: usize = 8;

/// One piece of LDML key output or transform text.
///
/// Transform syntax (`($[set])`, `[^$[set]]`, `$1`, `$[1:set]`) is recognised
/// here as well so that both directions read the same tokens.
#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Segment {
    #[regex(r"\\m\{[^}]*\}", |lex| {
        let s = lex.slice();
        s[3..s.len() - 1].to_string()
    })]
    Marker(String),

    #[regex(r"\$\{[A-Za-z0-9_]+\}", |lex| {
        let s = lex.slice();
        s[2..s.len() - 1].to_string()
    })]
    StringVar(String),

    #[regex(r"\\u\{[0-9a-fA-F]+( [0-9a-fA-F]+)*\}", |lex| {
        let s = lex.slice();
        s[3..s.len() - 1]
            .split(' ')
            .map(|hex| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32))
            .collect::<Option<String>>()
    })]
    UnicodeEscape(Option<String>),

    #[regex("\u{FFFF}\u{0008}[^\u{FFFF}]", |lex| {
        lex.slice().chars().nth(2).map(|c| c as usize)
    })]
    EncodedMarker(Option<usize>),

    #[regex(r"\\.", |lex| lex.slice().chars().nth(1))]
    Escaped(char),

    #[regex(r"\(\$\[[^\]]+\]\)", |lex| {
        let s = lex.slice();
        s[3..s.len() - 2].to_string()
    })]
    Capture(String),

    #[regex(r"\[\^\$\[[^\]]+\]\]", |lex| {
        let s = lex.slice();
        s[4..s.len() - 2].to_string()
    })]
    NotInSet(String),

    #[regex(r"\$\[[^\]:]+\]", |lex| {
        let s = lex.slice();
        s[2..s.len() - 1].to_string()
    })]
    InSet(String),

    #[regex(r"\$[0-9]+", |lex| lex.slice()[1..].parse::<usize>().ok())]
    CaptureRef(Option<usize>),

    #[regex(r"\$\[[0-9]+:[^\]]+\]", |lex| {
        let s = lex.slice();
        let (n, set) = s[2..s.len() - 1].split_once(':')?;
        Some((n.parse::<usize>().ok()?, set.to_string()))
    })]
    MappedCapture((usize, String)),

    #[regex("[^\\\\$\u{FFFF}(\\[]+")]
    Text,

    #[token("\\")]
    #[token("$")]
    #[token("\u{FFFF}")]
    #[token("(")]
    #[token("[")]
    Lone,
}

/// Splits `input` into segments paired with their source text. Total: any
/// input that does not lex is passed through as text.
pub fn segments(input: &str) -> Vec<(Option<Segment>, &str)> {
    let mut lexer = Segment::lexer(input);
    let mut result = Vec::new();
    while let Some(segment) = lexer.next() {
        result.push((segment.ok(), lexer.slice()));
    }
    result
}

/// Marker names referenced by `text`, in order of appearance.
pub fn marker_names(text: &str) -> Vec<String> {
    segments(text)
        .into_iter()
        .filter_map(|(segment, _)| match segment {
            Some(Segment::Marker(name)) if name != ANY_MARKER => Some(name),
            _ => None,
        })
        .collect()
}

/// Sorted marker names of a keyboard, numbered from 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerMap {
    names: Vec<String>,
}

impl MarkerMap {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Every marker found in key outputs and transforms.
    pub fn collect(keyboard: &LdmlKeyboard) -> Self {
        let key_texts = keyboard.keys.iter().map(|k| k.output.as_str());
        let transform_texts = keyboard
            .transforms
            .iter()
            .flat_map(|t| t.groups.iter())
            .flat_map(|g| g.transforms.iter())
            .flat_map(|t| [t.from.as_str(), t.to.as_str()]);

        Self::from_names(key_texts.chain(transform_texts).flat_map(marker_names))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name).map(|i| i + 1)
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VariableExpander {
    markers: MarkerMap,
    strings: HashMap<String, String>,
}

impl VariableExpander {
    pub fn new(markers: MarkerMap, strings: HashMap<String, String>) -> Self {
        Self { markers, strings }
    }

    pub fn from_keyboard(keyboard: &LdmlKeyboard) -> Self {
        let strings = keyboard
            .variables
            .iter()
            .filter(|v| v.kind == VariableKind::String)
            .map(|v| (v.id.clone(), v.value.clone()))
            .collect();
        Self::new(MarkerMap::collect(keyboard), strings)
    }

    pub fn markers(&self) -> &MarkerMap {
        &self.markers
    }

    /// Resolves a raw key output into the text the touch layout carries.
    ///
    /// Known markers become sentinel-encoded, `\m{.}` disappears, string variables
    /// and code point escapes are expanded. Unknown markers and variables are left
    /// exactly as written.
    pub fn convert_markers_to_output(&self, raw: &str) -> String {
        self.expand(raw, 0)
    }

    /// Inverse of [`convert_markers_to_output`](Self::convert_markers_to_output):
    /// display text back to an LDML output string. Sentinel-encoded markers
    /// become `\m{name}` again and everything else is escaped as literal text.
    pub fn convert_output_to_markers(&self, output: &str) -> String {
        let mut result = String::with_capacity(output.len());
        for (segment, text) in segments(output) {
            match segment.and_then(|s| match s {
                Segment::EncodedMarker(Some(index)) => self.markers.name_of(index),
                _ => None,
            }) {
                Some(name) => result.push_str(&marker_ref(name)),
                None => result.push_str(&escape_output(text)),
            }
        }
        result
    }

    fn expand(&self, raw: &str, depth: usize) -> String {
        let mut result = String::with_capacity(raw.len());
        for (segment, text) in segments(raw) {
            match segment {
                Some(Segment::Marker(name)) => {
                    if name == ANY_MARKER {
                        continue;
                    }
                    match self.encode_marker(&name) {
                        Some(encoded) => result.push_str(&encoded),
                        None => result.push_str(text),
                    }
                }
                Some(Segment::StringVar(id)) => match self.strings.get(&id) {
                    Some(value) if depth < MAX_VARIABLE_DEPTH => {
                        result.push_str(&self.expand(value, depth + 1))
                    }
                    _ => result.push_str(text),
                },
                Some(Segment::UnicodeEscape(Some(chars))) => result.push_str(&chars),
                _ => result.push_str(text),
            }
        }
        result
    }

    fn encode_marker(&self, name: &str) -> Option<String> {
        let index = self.markers.index_of(name)?;
        let c = u32::try_from(index).ok().and_then(char::from_u32)?;
        Some(format!("{}{}", MARKER_SENTINEL, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> VariableExpander {
        let mut strings = HashMap::new();
        strings.insert("grave".to_string(), "\\u{0300}".to_string());
        strings.insert("nested".to_string(), "x${grave}".to_string());
        VariableExpander::new(MarkerMap::from_names(["b", "a"]), strings)
    }

    #[test]
    fn test_markers_are_numbered_in_sorted_order() {
        let markers = MarkerMap::from_names(["tilde", "acute", "tilde"]);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers.index_of("acute"), Some(1));
        assert_eq!(markers.index_of("tilde"), Some(2));
        assert_eq!(markers.name_of(0), None);
        assert_eq!(markers.name_of(2), Some("tilde"));
    }

    #[test]
    fn test_convert_markers_to_output() {
        let expander = expander();
        assert_eq!(expander.convert_markers_to_output("\\m{a}"), "\u{FFFF}\u{0008}\u{0001}");
        assert_eq!(expander.convert_markers_to_output("x\\m{b}y"), "x\u{FFFF}\u{0008}\u{0002}y");
        assert_eq!(expander.convert_markers_to_output("\\m{.}"), "");
    }

    #[test]
    fn test_unknown_markers_pass_through() {
        let expander = expander();
        assert_eq!(expander.convert_markers_to_output("\\m{zzz}"), "\\m{zzz}");
        assert_eq!(expander.convert_markers_to_output("\\m{open"), "\\m{open");
        assert_eq!(expander.convert_markers_to_output("${missing}"), "${missing}");
        assert_eq!(expander.convert_markers_to_output("$ and \\"), "$ and \\");
    }

    #[test]
    fn test_variables_and_escapes() {
        let expander = expander();
        assert_eq!(expander.convert_markers_to_output("e${grave}"), "e\u{0300}");
        assert_eq!(expander.convert_markers_to_output("${nested}"), "x\u{0300}");
        assert_eq!(expander.convert_markers_to_output("\\u{41 1F600}"), "A\u{1F600}");
    }

    #[test]
    fn test_marker_round_trip() {
        let expander = expander();
        for raw in ["\\m{a}", "q\\m{b}\\m{a}r"] {
            let output = expander.convert_markers_to_output(raw);
            assert_eq!(expander.convert_output_to_markers(&output), raw);
        }
        assert_eq!(
            expander.convert_output_to_markers("$\u{FFFF}\u{0008}\u{0009}"),
            "\\u{0024}\\u{FFFF}\\u{0008}\\u{0009}"
        );
    }

    #[test]
    fn test_transform_syntax_segments() {
        let kinds: Vec<Option<Segment>> = segments("x($[v])[^$[w]]\\.$1$[2:w]$[v]")
            .into_iter()
            .map(|(segment, _)| segment)
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(Segment::Text),
                Some(Segment::Capture("v".to_string())),
                Some(Segment::NotInSet("w".to_string())),
                Some(Segment::Escaped('.')),
                Some(Segment::CaptureRef(Some(1))),
                Some(Segment::MappedCapture((2, "w".to_string()))),
                Some(Segment::InSet("v".to_string())),
            ]
        );
    }

    #[test]
    fn test_unterminated_syntax_is_split() {
        let pieces: Vec<&str> = segments("($[v]").into_iter().map(|(_, text)| text).collect();
        assert_eq!(pieces, vec!["(", "$[v]"]);
        assert_eq!(segments("\\m{open")[0].0, Some(Segment::Escaped('m')));
    }

    #[test]
    fn test_marker_names() {
        assert_eq!(marker_names("\\m{x}a\\m{.}\\m{y}"), vec!["x", "y"]);
    }
}
