//! Escaping of text placed into LDML attribute values

use std::collections::{HashMap, HashSet};

// Characters with special meaning in transform `from` patterns.
const REGEX_META: &[char] = &[
    '\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}',
];

pub fn is_regex_meta(c: char) -> bool {
    REGEX_META.contains(&c)
}

fn is_noncharacter(c: char) -> bool {
    let cp = c as u32;
    (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE
}

fn needs_code_point_escape(c: char) -> bool {
    c.is_control() || is_noncharacter(c)
}

pub fn code_point_escape(c: char) -> String {
    format!("\\u{{{:04X}}}", c as u32)
}

/// Marker reference for an already valid id.
pub fn marker_ref(id: &str) -> String {
    format!("\\m{{{}}}", id)
}

/// Restricts an id to `[0-9A-Za-z_]`, replacing anything else with `_`.
pub fn sanitize_id(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if id.is_empty() {
        "_".to_string()
    } else {
        id
    }
}

/// Collision-free LDML ids for a set of KMN names.
///
/// Names that are already valid ids keep them. Other names are sanitized and
/// get a `_2`, `_3`, ... suffix when the sanitized id is taken.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    ids: HashMap<String, String>,
    taken: HashSet<String>,
}

impl IdMap {
    pub fn new<'n>(names: impl IntoIterator<Item = &'n str>) -> Self {
        let mut names: Vec<&str> = names.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        let (valid, rest): (Vec<&str>, Vec<&str>) =
            names.into_iter().partition(|name| sanitize_id(name) == *name);

        let mut map = Self::default();
        for name in valid.into_iter().chain(rest) {
            let id = map.reserve(name);
            map.ids.insert(name.to_string(), id);
        }
        map
    }

    /// Id assigned to `name`, or its sanitized form for a name the map was
    /// not built with.
    pub fn id(&self, name: &str) -> String {
        self.ids.get(name).cloned().unwrap_or_else(|| sanitize_id(name))
    }

    pub fn marker(&self, name: &str) -> String {
        marker_ref(&self.id(name))
    }

    /// A fresh id based on `name` that no other name maps to.
    pub fn reserve(&mut self, name: &str) -> String {
        let base = sanitize_id(name);
        let mut id = base.clone();
        let mut n = 2;
        while !self.taken.insert(id.clone()) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        id
    }
}

/// Literal text inside a transform `from` pattern.
pub fn escape_from(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if needs_code_point_escape(c) {
            result.push_str(&code_point_escape(c));
        } else if is_regex_meta(c) {
            result.push('\\');
            result.push(c);
        } else {
            result.push(c);
        }
    }
    result
}

/// Literal text inside a key `output` or a transform `to`.
pub fn escape_output(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if needs_code_point_escape(c) || c == '\\' || c == '$' {
            result.push_str(&code_point_escape(c));
        } else {
            result.push(c);
        }
    }
    result
}

/// One item of a space separated `<set>` value.
pub fn escape_set_item(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if needs_code_point_escape(c) || c.is_whitespace() || c == '\\' || c == '$' {
            result.push_str(&code_point_escape(c));
        } else {
            result.push(c);
        }
    }
    result
}

/// Turns an escaped key output into the equivalent `from` pattern text.
///
/// Markers and code point escapes are already valid pattern syntax and are
/// copied; every other character is matched literally.
pub fn output_to_from(output: &str) -> String {
    let mut result = String::with_capacity(output.len());
    let mut rest = output;
    while let Some(c) = rest.chars().next() {
        if rest.starts_with("\\m{") || rest.starts_with("\\u{") {
            if let Some(end) = rest.find('}') {
                result.push_str(&rest[..=end]);
                rest = &rest[end + 1..];
                continue;
            }
        }
        result.push_str(&escape_from(&c.to_string()));
        rest = &rest[c.len_utf8()..];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_from() {
        assert_eq!(escape_from("a.b"), "a\\.b");
        assert_eq!(escape_from("(x)"), "\\(x\\)");
        assert_eq!(escape_from("\u{0007}"), "\\u{0007}");
        assert_eq!(escape_from("ကျ"), "ကျ");
    }

    #[test]
    fn test_escape_output() {
        assert_eq!(escape_output("a$b"), "a\\u{0024}b");
        assert_eq!(escape_output("\\"), "\\u{005C}");
        assert_eq!(escape_output("(x)"), "(x)");
    }

    #[test]
    fn test_escape_set_item() {
        assert_eq!(escape_set_item(" "), "\\u{0020}");
        assert_eq!(escape_set_item("á"), "á");
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("K_A_shift"), "K_A_shift");
        assert_eq!(sanitize_id("my-store"), "my_store");
        assert_eq!(marker_ref("acute_accent"), "\\m{acute_accent}");
    }

    #[test]
    fn test_id_map_keeps_sanitized_names_apart() {
        let mut ids = IdMap::new(["a-b", "a_b", "acute accent", "a_b_2"]);
        assert_eq!(ids.id("a_b"), "a_b");
        assert_eq!(ids.id("a_b_2"), "a_b_2");
        assert_eq!(ids.id("a-b"), "a_b_3");
        assert_eq!(ids.marker("acute accent"), "\\m{acute_accent}");
        assert_eq!(ids.id("never-seen"), "never_seen");

        assert_eq!(ids.reserve("a_b"), "a_b_4");
        assert_eq!(ids.reserve("K_Q"), "K_Q");
        assert_eq!(ids.reserve("K_Q"), "K_Q_2");
    }

    #[test]
    fn test_output_to_from() {
        assert_eq!(output_to_from("\\m{a}."), "\\m{a}\\.");
        assert_eq!(output_to_from("\\u{0024}x"), "\\u{0024}x");
        assert_eq!(output_to_from("+"), "\\+");
    }
}
