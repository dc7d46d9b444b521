//! Reconstruction of KMN source from an LDML keyboard
//!
//! Hardware layer keys become bracket-form key rules, as do keys no layer
//! places whose id still names a KMN key. Transform groups whose every `from`
//! ends in the output of such a key are folded back into the `using keys`
//! group as contextual key rules; the remaining groups become context groups
//! chained after it.

use std::collections::{HashMap, HashSet};
use log::{debug, warn};
use kmn_ldml_core::ldml::{LdmlKey, LdmlKeyboard, LdmlTransform, TransformType, VariableKind};
use kmn_ldml_core::virtual_keys::{is_base_key_id, HARDWARE_ROWS};
use kmn_ldml_core::{KmnError, ModifierSet, Result, TouchLayoutFile, Warning};
use crate::ldml::escape::{is_regex_meta, sanitize_id};
use crate::ldml::options::primary_language;
use crate::touch::compiler::{touch_key_id, TouchLayoutCompiler};
use crate::touch::expander::{segments, Segment, ANY_MARKER, MAX_VARIABLE_DEPTH};

/// `&VERSION` written into generated source.
pub const KMN_VERSION: &str = "10.0";

pub const LAYOUT_FILE_EXTENSION: &str = "keyman-touch-layout";

/// Result of reconstructing KMN from LDML.
#[derive(Debug, Clone)]
pub struct KmnOutput {
    pub kmn: String,
    /// Compiled touch layout, when the keyboard has touch layers.
    pub touch_layout: Option<TouchLayoutFile>,
    pub warnings: Vec<Warning>,
}

/// One element of a reconstructed context or output.
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Char(char),
    Deadkey(String),
    Any(String),
    NotAny(String),
    Index(String, usize),
    Context(usize),
}

// A parsed `from` pattern: its items plus the position and set of each capture.
struct Pattern {
    items: Vec<Item>,
    captures: Vec<(usize, String)>,
}

// A key resolved to its KMN bracket form.
struct PlacedKey<'k> {
    key: &'k LdmlKey,
    modifiers: ModifierSet,
    base: String,
    output: Vec<Item>,
}

impl PlacedKey<'_> {
    fn bracket(&self) -> String {
        key_bracket(self.modifiers, &self.base)
    }

    // A lone marker named after the key itself.
    fn has_placeholder_output(&self) -> bool {
        let Some(name) = self
            .key
            .output
            .strip_prefix("\\m{")
            .and_then(|rest| rest.strip_suffix('}'))
        else {
            return false;
        };
        match name.strip_prefix(sanitize_id(&self.key.id).as_str()) {
            Some("") => true,
            Some(rest) => rest
                .strip_prefix('_')
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())),
            None => false,
        }
    }
}

fn key_bracket(modifiers: ModifierSet, base: &str) -> String {
    let mut tokens = modifiers.kmn_tokens();
    tokens.push(base);
    format!("[{}]", tokens.join(" "))
}

fn transform_construct(transform: &LdmlTransform) -> String {
    format!("<transform from=\"{}\" to=\"{}\">", transform.from, transform.to)
}

/// Generates KMN source from an LDML keyboard.
pub struct KmnGenerator<'a> {
    keyboard: &'a LdmlKeyboard,
    keyboard_id: String,
}

impl<'a> KmnGenerator<'a> {
    pub fn new(keyboard: &'a LdmlKeyboard) -> Self {
        let keyboard_id = sanitize_id(&keyboard.name).to_lowercase();
        Self {
            keyboard,
            keyboard_id,
        }
    }

    /// Sets the id used to name the touch layout file.
    pub fn keyboard_id(mut self, id: impl Into<String>) -> Self {
        self.keyboard_id = id.into();
        self
    }

    pub fn generate(&self) -> Result<KmnOutput> {
        self.reject_unsupported()?;

        let mut out = String::new();
        self.write_header(&mut out);
        self.write_stores(&mut out)?;

        let placed = self.placed_keys()?;
        let catch_alls = self.catch_alls(&placed);
        let mut main = self.key_rules(&placed, &catch_alls)?;

        let mut context_groups: Vec<Vec<String>> = Vec::new();
        if let Some(simple) = self.keyboard.transforms_of(TransformType::Simple) {
            for group in &simple.groups {
                let transforms: Vec<&LdmlTransform> = group
                    .transforms
                    .iter()
                    .filter(|t| !catch_alls.contains_key(t.from.as_str()))
                    .collect();
                if transforms.is_empty() {
                    continue;
                }
                let patterns = transforms
                    .iter()
                    .map(|t| self.parse_from(t))
                    .collect::<Result<Vec<_>>>()?;

                let splits: Option<Vec<_>> = patterns
                    .iter()
                    .map(|p| split_key_output(&p.items, &placed))
                    .collect();

                match splits {
                    Some(splits) => {
                        for ((transform, pattern), (key, context_len)) in
                            transforms.iter().zip(&patterns).zip(splits)
                        {
                            let context = &pattern.items[..context_len];
                            let output = self.parse_to(transform, &pattern.captures)?;
                            main.push(rule_line(context, Some(&key.bracket()), &output));
                        }
                    }
                    None => {
                        let mut rules = Vec::new();
                        for (transform, pattern) in transforms.iter().zip(&patterns) {
                            let output = self.parse_to(transform, &pattern.captures)?;
                            rules.push(rule_line(&pattern.items, None, &output));
                        }
                        context_groups.push(rules);
                    }
                }
            }
        }

        if let Some(backspace) = self.keyboard.transforms_of(TransformType::Backspace) {
            for transform in backspace.groups.iter().flat_map(|g| g.transforms.iter()) {
                let pattern = self.parse_from(transform)?;
                let output = self.parse_to(transform, &pattern.captures)?;
                main.push(rule_line(
                    &pattern.items,
                    Some(&key_bracket(ModifierSet::NONE, "K_BKSP")),
                    &output,
                ));
            }
        }

        out.push_str("begin Unicode > use(main)\n\n");
        write_group(&mut out, "main", true, &main, (!context_groups.is_empty()).then_some(1));
        for (i, rules) in context_groups.iter().enumerate() {
            let next = (i + 1 < context_groups.len()).then_some(i + 2);
            write_group(&mut out, &format!("transforms{}", i + 1), false, rules, next);
        }

        debug!(
            "Reconstructed {} key rules and {} context groups",
            main.len(),
            context_groups.len()
        );

        let (touch_layout, warnings) = if self.keyboard.has_touch_layers() {
            let (layout, warnings) = TouchLayoutCompiler::new(self.keyboard).compile();
            (Some(layout), warnings)
        } else {
            (None, Vec::new())
        };

        Ok(KmnOutput {
            kmn: out,
            touch_layout,
            warnings,
        })
    }

    fn reject_unsupported(&self) -> Result<()> {
        if let Some(path) = self.keyboard.imports.first() {
            return Err(KmnError::reconstruction(
                format!("<import path=\"{}\">", path),
                "imported LDML data cannot be inlined into KMN",
            ));
        }
        if let Some(name) = self.keyboard.unsupported.first() {
            return Err(KmnError::reconstruction(
                format!("<{}>", name),
                "element has no KMN equivalent",
            ));
        }
        let reorder = self
            .keyboard
            .transforms
            .iter()
            .flat_map(|t| t.groups.iter())
            .flat_map(|g| g.reorders.iter())
            .next();
        if let Some(reorder) = reorder {
            return Err(KmnError::reconstruction(
                format!("<reorder from=\"{}\">", reorder.from),
                "reorders have no KMN equivalent",
            ));
        }
        Ok(())
    }

    fn write_header(&self, out: &mut String) {
        let keyboard = self.keyboard;
        out.push_str(&format!("c {} keyboard\n", keyboard.name));
        out.push_str(&format!(
            "c Generated from LDML (locale {}, conformsTo {})\n\n",
            keyboard.locale, keyboard.conforms_to
        ));

        out.push_str(&format!("store(&NAME) {}\n", quote(&keyboard.name)));
        if let Some(version) = &keyboard.version {
            out.push_str(&format!("store(&KEYBOARDVERSION) {}\n", quote(version)));
        }
        if let Some(author) = &keyboard.author {
            out.push_str(&format!("store(&COPYRIGHT) {}\n", quote(author)));
        }
        let language = primary_language(&keyboard.locale);
        if language.len() == 3 {
            out.push_str(&format!("store(&ETHNOLOGUECODE) {}\n", quote(&language)));
        }
        out.push_str(&format!("store(&VERSION) '{}'\n", KMN_VERSION));
        out.push_str("store(&TARGETS) 'any'\n");
        if keyboard.has_touch_layers() {
            let file = format!("{}.{}", self.keyboard_id, LAYOUT_FILE_EXTENSION);
            out.push_str(&format!("store(&LAYOUTFILE) {}\n", quote(&file)));
        }
        out.push('\n');
    }

    fn write_stores(&self, out: &mut String) -> Result<()> {
        let mut written = false;
        for variable in &self.keyboard.variables {
            let construct = || format!("<{} id=\"{}\">", variable.kind.element_name(), variable.id);
            let items = match variable.kind {
                VariableKind::String => self.parse_output(&variable.value, None, 0, &construct())?,
                VariableKind::Set => {
                    let mut items = Vec::new();
                    for value in variable.set_items() {
                        let parsed = self.parse_output(value, None, 0, &construct())?;
                        if parsed.len() != 1 {
                            return Err(KmnError::reconstruction(
                                construct(),
                                format!("set item '{}' is not a single character", value),
                            ));
                        }
                        items.extend(parsed);
                    }
                    items
                }
                VariableKind::UnicodeSet => {
                    return Err(KmnError::reconstruction(
                        construct(),
                        "Unicode sets have no KMN equivalent",
                    ));
                }
            };
            out.push_str(&format!("store({}) {}\n", variable.id, format_items(&items)));
            written = true;
        }
        if written {
            out.push('\n');
        }
        Ok(())
    }

    /// Keys of the hardware layers with their bracket form, in layer order,
    /// followed by the keys no hardware layer places.
    fn placed_keys(&self) -> Result<Vec<PlacedKey<'a>>> {
        let mut placed = Vec::new();
        let mut seen = HashSet::new();
        for layers in self.keyboard.hardware_layers() {
            for layer in &layers.layers {
                let modifiers = layer.modifier_set().ok_or_else(|| {
                    KmnError::reconstruction(
                        format!("<layer modifiers=\"{}\">", layer.modifiers.as_deref().unwrap_or_default()),
                        "modifier set has no KMN equivalent",
                    )
                })?;
                for (row, ids) in layer.rows.iter().enumerate() {
                    for (col, id) in ids.iter().enumerate() {
                        let key = self.keyboard.key(id).ok_or_else(|| {
                            KmnError::reconstruction(
                                format!("<row keys=\"{}\">", ids.join(" ")),
                                format!("key '{}' is not defined", id),
                            )
                        })?;
                        if key.gap || !seen.insert((modifiers, id.as_str())) {
                            continue;
                        }
                        let base = base_key(id, modifiers, row, col).ok_or_else(|| {
                            KmnError::reconstruction(
                                format!("<key id=\"{}\">", id),
                                "key has no KMN virtual key",
                            )
                        })?;
                        let construct = format!("<key id=\"{}\" output=\"{}\">", key.id, key.output);
                        let output = self.parse_output(&key.output, None, 0, &construct)?;
                        placed.push(PlacedKey {
                            key,
                            modifiers,
                            base,
                            output,
                        });
                    }
                }
            }
        }

        let mut bases: HashSet<(ModifierSet, String)> =
            placed.iter().map(|p| (p.modifiers, p.base.clone())).collect();
        for key in &self.keyboard.keys {
            if key.gap || key.output.is_empty() || placed.iter().any(|p| p.key.id == key.id) {
                continue;
            }
            // Touch instances such as `K_E-1` share the KMN key of their base id.
            let id = touch_key_id(&key.id, ModifierSet::NONE);
            let (modifiers, base) = match ModifierSet::split_variant_id(&id) {
                (modifiers, base) if is_base_key_id(base) => (modifiers, base),
                _ if is_base_key_id(&id) => (ModifierSet::NONE, id.as_str()),
                _ => continue,
            };
            let construct = format!("<key id=\"{}\" output=\"{}\">", key.id, key.output);
            let output = self.parse_output(&key.output, None, 0, &construct)?;
            if types_own_character(base, &output) || !bases.insert((modifiers, base.to_string())) {
                continue;
            }
            debug!("Key {} is on no hardware layer, reconstructed as [{}]", key.id, base);
            placed.push(PlacedKey {
                key,
                modifiers,
                base: base.to_string(),
                output,
            });
        }
        Ok(placed)
    }

    /// Placeholder outputs mapped to the `to` of the transform that resolves
    /// them when no contextual rule matched.
    fn catch_alls(&self, placed: &[PlacedKey<'_>]) -> HashMap<&'a str, &'a str> {
        let keyboard: &'a LdmlKeyboard = self.keyboard;
        let transforms: Vec<&'a LdmlTransform> = keyboard
            .transforms_of(TransformType::Simple)
            .into_iter()
            .flat_map(|t| t.groups.iter())
            .flat_map(|g| g.transforms.iter())
            .collect();

        let mut catch_alls = HashMap::new();
        for p in placed.iter().filter(|p| p.has_placeholder_output()) {
            if let Some(t) = transforms.iter().find(|t| t.from == p.key.output) {
                catch_alls.insert(t.from.as_str(), t.to.as_str());
            }
        }
        catch_alls
    }

    fn key_rules(&self, placed: &[PlacedKey<'_>], catch_alls: &HashMap<&str, &str>) -> Result<Vec<String>> {
        let mut rules = Vec::new();
        for p in placed {
            match catch_alls.get(p.key.output.as_str()) {
                Some(to) if to.is_empty() => {}
                Some(to) => {
                    let construct = format!("<transform from=\"{}\" to=\"{}\">", p.key.output, to);
                    let output = self.parse_output(to, None, 0, &construct)?;
                    rules.push(rule_line(&[], Some(&p.bracket()), &output));
                }
                None => rules.push(rule_line(&[], Some(&p.bracket()), &p.output)),
            }
        }
        Ok(rules)
    }

    fn set_variable(&self, id: &str, construct: &str) -> Result<()> {
        match self.keyboard.variable(id) {
            Some(v) if v.kind == VariableKind::Set => Ok(()),
            Some(_) => Err(KmnError::reconstruction(
                construct,
                format!("'{}' is not a <set> and cannot be used with any()", id),
            )),
            None => Err(KmnError::reconstruction(
                construct,
                format!("unknown set '{}'", id),
            )),
        }
    }

    fn string_variable(&self, id: &str, depth: usize, construct: &str) -> Result<Vec<Item>> {
        if depth >= MAX_VARIABLE_DEPTH {
            return Err(KmnError::reconstruction(
                construct,
                format!("string '{}' nests too deeply", id),
            ));
        }
        match self.keyboard.variable(id) {
            Some(v) if v.kind == VariableKind::String => {
                self.parse_output(&v.value, None, depth + 1, construct)
            }
            _ => Err(KmnError::reconstruction(
                construct,
                format!("unknown string '{}'", id),
            )),
        }
    }

    fn marker_item(&self, name: String, construct: &str) -> Result<Item> {
        if name == ANY_MARKER {
            return Err(KmnError::reconstruction(
                construct,
                "\\m{.} (any marker) has no KMN equivalent",
            ));
        }
        Ok(Item::Deadkey(name))
    }

    /// Parses a transform `from` pattern.
    fn parse_from(&self, transform: &LdmlTransform) -> Result<Pattern> {
        let construct = transform_construct(transform);
        let mut items = Vec::new();
        let mut captures = Vec::new();

        for (segment, text) in segments(&transform.from) {
            match segment {
                Some(Segment::Marker(name)) => items.push(self.marker_item(name, &construct)?),
                Some(Segment::UnicodeEscape(chars)) => {
                    items.extend(code_points(chars, text, &construct)?.chars().map(Item::Char))
                }
                Some(Segment::Escaped(c)) => items.push(Item::Char(c)),
                Some(Segment::StringVar(name)) => {
                    items.extend(self.string_variable(&name, 0, &construct)?)
                }
                Some(Segment::Capture(name)) => {
                    self.set_variable(&name, &construct)?;
                    items.push(Item::Any(name.clone()));
                    captures.push((items.len(), name));
                }
                Some(Segment::InSet(name)) => {
                    self.set_variable(&name, &construct)?;
                    items.push(Item::Any(name));
                }
                Some(Segment::NotInSet(name)) => {
                    self.set_variable(&name, &construct)?;
                    items.push(Item::NotAny(name));
                }
                _ => {
                    for c in text.chars() {
                        if is_regex_meta(c) {
                            return Err(KmnError::reconstruction(
                                construct.as_str(),
                                format!("unescaped '{}' has no KMN equivalent", c),
                            ));
                        }
                        items.push(Item::Char(c));
                    }
                }
            }
        }

        Ok(Pattern { items, captures })
    }

    fn parse_to(&self, transform: &LdmlTransform, captures: &[(usize, String)]) -> Result<Vec<Item>> {
        self.parse_output(&transform.to, Some(captures), 0, &transform_construct(transform))
    }

    /// Parses output text: a key output, a string value or a transform `to`.
    /// Capture references are only accepted when `captures` is given.
    fn parse_output(
        &self,
        text: &str,
        captures: Option<&[(usize, String)]>,
        depth: usize,
        construct: &str,
    ) -> Result<Vec<Item>> {
        let capture = |n: usize| -> Result<usize> {
            let captures =
                captures.ok_or_else(|| KmnError::reconstruction(construct, "unknown $ reference"))?;
            n.checked_sub(1)
                .and_then(|i| captures.get(i))
                .map(|(position, _)| *position)
                .ok_or_else(|| {
                    KmnError::reconstruction(construct, format!("capture ${} is out of range", n))
                })
        };

        let mut items = Vec::new();
        for (segment, piece) in segments(text) {
            match segment {
                Some(Segment::Marker(name)) => items.push(self.marker_item(name, construct)?),
                Some(Segment::UnicodeEscape(chars)) => {
                    items.extend(code_points(chars, piece, construct)?.chars().map(Item::Char))
                }
                Some(Segment::Escaped(c)) => items.push(Item::Char(c)),
                Some(Segment::StringVar(name)) => {
                    items.extend(self.string_variable(&name, depth, construct)?)
                }
                Some(Segment::CaptureRef(Some(n))) => items.push(Item::Context(capture(n)?)),
                Some(Segment::MappedCapture((n, set))) => {
                    let position = capture(n)?;
                    self.set_variable(&set, construct)?;
                    items.push(Item::Index(set, position));
                }
                _ if piece.contains('$') => {
                    return Err(KmnError::reconstruction(construct, "unknown $ reference"));
                }
                _ if piece == "\\" => {
                    return Err(KmnError::reconstruction(construct, "unterminated escape"));
                }
                _ => items.extend(piece.chars().map(Item::Char)),
            }
        }

        Ok(items)
    }
}

fn code_points(chars: Option<String>, text: &str, construct: &str) -> Result<String> {
    chars.ok_or_else(|| KmnError::reconstruction(construct, format!("'{}' is not a code point", text)))
}

// `U_XXXX` keys whose output is their own character come from touch long-press
// lists, not from KMN rules.
fn types_own_character(base: &str, output: &[Item]) -> bool {
    let Some(hex) = base.strip_prefix("U_") else {
        return false;
    };
    match output {
        [Item::Char(c)] => u32::from_str_radix(hex, 16).ok() == Some(*c as u32),
        _ => false,
    }
}

/// KMN base key for an LDML key id on a layer with `modifiers`: the id without
/// its variant suffix when that names a key, otherwise the virtual key at the
/// layer position.
fn base_key(id: &str, modifiers: ModifierSet, row: usize, col: usize) -> Option<String> {
    let base = modifiers.base_id(id);
    if is_base_key_id(base) {
        return Some(base.to_string());
    }
    let vkey = HARDWARE_ROWS.get(row).and_then(|keys| keys.get(col))?;
    warn!("Key {} placed by position as {}", id, vkey);
    Some(vkey.to_string())
}

// The placed key whose output is the longest suffix of `items`, with the
// length of the remaining context.
fn split_key_output<'p, 'k>(
    items: &[Item],
    placed: &'p [PlacedKey<'k>],
) -> Option<(&'p PlacedKey<'k>, usize)> {
    let mut best: Option<&'p PlacedKey<'k>> = None;
    for candidate in placed {
        let len = candidate.output.len();
        if len == 0 || !items.ends_with(&candidate.output) {
            continue;
        }
        if best.map_or(true, |b| len > b.output.len()) {
            best = Some(candidate);
        }
    }
    best.map(|key| (key, items.len() - key.output.len()))
}

fn rule_line(context: &[Item], key: Option<&str>, output: &[Item]) -> String {
    let mut line = String::new();
    if !context.is_empty() {
        line.push_str(&format_items(context));
        line.push(' ');
    }
    if let Some(key) = key {
        line.push_str("+ ");
        line.push_str(key);
        line.push(' ');
    }
    line.push_str("> ");
    line.push_str(&format_items(output));
    line
}

fn write_group(out: &mut String, name: &str, using_keys: bool, rules: &[String], next: Option<usize>) {
    if using_keys {
        out.push_str(&format!("group({}) using keys\n\n", name));
    } else {
        out.push_str(&format!("group({})\n\n", name));
    }
    for rule in rules {
        out.push_str(rule);
        out.push('\n');
    }
    if let Some(next) = next {
        out.push_str(&format!("match > use(transforms{})\n", next));
        out.push_str(&format!("nomatch > use(transforms{})\n", next));
    }
    out.push('\n');
}

/// Formats items as KMN: quoted runs of ASCII letters and digits, `U+XXXX`
/// for every other character, `nul` when empty.
fn format_items(items: &[Item]) -> String {
    let mut parts = Vec::new();
    let mut run = String::new();
    for item in items {
        if let Item::Char(c) = item {
            if c.is_ascii_alphanumeric() {
                run.push(*c);
                continue;
            }
        }
        if !run.is_empty() {
            parts.push(format!("'{}'", run));
            run.clear();
        }
        parts.push(match item {
            Item::Char(c) => format!("U+{:04X}", *c as u32),
            Item::Deadkey(name) => format!("dk({})", name),
            Item::Any(store) => format!("any({})", store),
            Item::NotAny(store) => format!("notany({})", store),
            Item::Index(store, offset) => format!("index({}, {})", store, offset),
            Item::Context(offset) => format!("context({})", offset),
        });
    }
    if !run.is_empty() {
        parts.push(format!("'{}'", run));
    }
    if parts.is_empty() {
        "nul".to_string()
    } else {
        parts.join(" ")
    }
}

// System store value in whichever quote it does not contain.
fn quote(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        format_items(&value.chars().map(Item::Char).collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmn_ldml_core::ldml::{LdmlLayer, LdmlLayers, LdmlTransformGroup, LdmlTransforms, LdmlVariable};

    fn keyboard(keys: Vec<LdmlKey>, rows: Vec<(&str, Vec<&str>)>) -> LdmlKeyboard {
        LdmlKeyboard {
            locale: "en".to_string(),
            conforms_to: "45".to_string(),
            name: "Test".to_string(),
            keys,
            layers: vec![LdmlLayers {
                form_id: "us".to_string(),
                min_device_width: None,
                layers: rows
                    .into_iter()
                    .map(|(modifiers, row)| LdmlLayer {
                        id: None,
                        modifiers: Some(modifiers.to_string()),
                        rows: vec![
                            Vec::new(),
                            Vec::new(),
                            row.into_iter().map(str::to_string).collect(),
                        ],
                    })
                    .collect(),
            }],
            ..Default::default()
        }
    }

    fn with_transforms(mut keyboard: LdmlKeyboard, groups: Vec<Vec<(&str, &str)>>) -> LdmlKeyboard {
        keyboard.transforms.push(LdmlTransforms {
            kind: TransformType::Simple,
            groups: groups
                .into_iter()
                .map(|g| LdmlTransformGroup {
                    transforms: g
                        .into_iter()
                        .map(|(from, to)| LdmlTransform {
                            from: from.to_string(),
                            to: to.to_string(),
                        })
                        .collect(),
                    reorders: Vec::new(),
                })
                .collect(),
        });
        keyboard
    }

    fn lines(output: &KmnOutput) -> Vec<&str> {
        output.kmn.lines().collect()
    }

    #[test]
    fn test_format_items() {
        assert_eq!(format_items(&[]), "nul");
        assert_eq!(
            format_items(&[Item::Char('a'), Item::Char('b'), Item::Char('é'), Item::Deadkey("x".into())]),
            "'ab' U+00E9 dk(x)"
        );
        assert_eq!(format_items(&[Item::Char('\u{1F600}')]), "U+1F600");
    }

    #[test]
    fn test_key_rules_use_bracket_form() {
        let kb = keyboard(
            vec![
                LdmlKey::new("K_A", "a"),
                LdmlKey::new("K_A_shift_altR", "\\u{00C6}"),
            ],
            vec![("none", vec!["K_A"]), ("shift altR", vec!["K_A_shift_altR"])],
        );
        let output = KmnGenerator::new(&kb).generate().unwrap();
        let lines = lines(&output);
        assert!(lines.contains(&"+ [K_A] > 'a'"));
        assert!(lines.contains(&"+ [SHIFT RALT K_A] > U+00C6"));
        assert!(!output.kmn.contains("K_A_shift"));
        assert!(output.touch_layout.is_none());
    }

    #[test]
    fn test_keyed_transforms_fold_into_main() {
        let kb = with_transforms(
            keyboard(
                vec![
                    LdmlKey::new("K_E", "e"),
                    LdmlKey::new("K_QUOTE", "\\m{acute}"),
                    LdmlKey::new("K_Q", "\\m{K_Q}"),
                ],
                vec![("none", vec!["K_E", "K_QUOTE", "K_Q"])],
            ),
            vec![vec![
                ("\\m{acute}e", "é"),
                ("x\\m{K_Q}", "y"),
                ("\\m{K_Q}", ""),
            ]],
        );
        let output = KmnGenerator::new(&kb).generate().unwrap();
        let lines = lines(&output);
        assert!(lines.contains(&"+ [K_QUOTE] > dk(acute)"));
        assert!(lines.contains(&"dk(acute) + [K_E] > U+00E9"));
        assert!(lines.contains(&"'x' + [K_Q] > 'y'"));
        assert!(!lines.iter().any(|l| l.starts_with("+ [K_Q]")));
        assert!(!output.kmn.contains("group(transforms1)"));
    }

    #[test]
    fn test_unplaced_keys_are_reconstructed() {
        let kb = keyboard(
            vec![
                LdmlKey::new("K_A", "a"),
                LdmlKey::new("K_ENTER", "z"),
                LdmlKey::new("K_ENTER_shift", "Z"),
                LdmlKey::new("U_0259", "q"),
                LdmlKey::new("U_00E9", "\\u{00E9}"),
            ],
            vec![("none", vec!["K_A"])],
        );
        let output = KmnGenerator::new(&kb).generate().unwrap();
        let lines = lines(&output);
        assert!(lines.contains(&"+ [K_ENTER] > 'z'"));
        assert!(lines.contains(&"+ [SHIFT K_ENTER] > 'Z'"));
        assert!(lines.contains(&"+ [U_0259] > 'q'"));
        assert!(!output.kmn.contains("U_00E9"), "Got:\n{}", output.kmn);
    }

    #[test]
    fn test_shared_output_placeholder_keeps_its_output() {
        let kb = with_transforms(
            keyboard(
                vec![
                    LdmlKey::new("K_E", "e"),
                    LdmlKey::new("K_3", "\\m{K_3}"),
                    LdmlKey::new("K_QUOTE", "\\m{a}"),
                ],
                vec![("none", vec!["K_E", "K_3", "K_QUOTE"])],
            ),
            vec![vec![("\\m{a}\\m{K_3}", "x"), ("\\m{K_3}", "e")]],
        );
        let output = KmnGenerator::new(&kb).generate().unwrap();
        let lines = lines(&output);
        assert!(lines.contains(&"+ [K_E] > 'e'"));
        assert!(lines.contains(&"+ [K_3] > 'e'"));
        assert!(lines.contains(&"dk(a) + [K_3] > 'x'"));
        assert!(!output.kmn.contains("dk(K_3)"), "Got:\n{}", output.kmn);
    }

    #[test]
    fn test_context_groups_are_chained() {
        let mut kb = with_transforms(
            keyboard(vec![LdmlKey::new("K_A", "a")], vec![("none", vec!["K_A"])]),
            vec![vec![("xy", "z")], vec![("($[v])q", "$[1:w]$1")]],
        );
        kb.variables = vec![
            LdmlVariable {
                kind: VariableKind::Set,
                id: "v".to_string(),
                value: "a b".to_string(),
            },
            LdmlVariable {
                kind: VariableKind::Set,
                id: "w".to_string(),
                value: "\\u{0020} c".to_string(),
            },
        ];
        let output = KmnGenerator::new(&kb).generate().unwrap();
        let lines = lines(&output);
        assert!(lines.contains(&"store(v) 'ab'"));
        assert!(lines.contains(&"store(w) U+0020 'c'"));
        assert!(lines.contains(&"group(transforms1)"));
        assert!(lines.contains(&"'xy' > 'z'"));
        assert!(lines.contains(&"any(v) 'q' > index(w, 1) context(1)"));
        assert_eq!(lines.iter().filter(|l| **l == "match > use(transforms1)").count(), 1);
        assert_eq!(lines.iter().filter(|l| **l == "nomatch > use(transforms2)").count(), 1);
    }

    #[test]
    fn test_backspace_transforms() {
        let mut kb = keyboard(vec![LdmlKey::new("K_A", "a")], vec![("none", vec!["K_A"])]);
        kb.transforms.push(LdmlTransforms {
            kind: TransformType::Backspace,
            groups: vec![LdmlTransformGroup {
                transforms: vec![LdmlTransform {
                    from: "ab".to_string(),
                    to: String::new(),
                }],
                reorders: Vec::new(),
            }],
        });
        let output = KmnGenerator::new(&kb).generate().unwrap();
        assert!(lines(&output).contains(&"'ab' + [K_BKSP] > nul"));
    }

    #[test]
    fn test_unrepresentable_patterns_fail() {
        let base = || keyboard(vec![LdmlKey::new("K_A", "a")], vec![("none", vec!["K_A"])]);
        for (from, to) in [("\\m{.}a", "b"), ("a+", "b"), ("a", "$2"), ("a", "$x"), ("${nope}", "b")] {
            let kb = with_transforms(base(), vec![vec![(from, to)]]);
            let result = KmnGenerator::new(&kb).generate();
            assert!(
                matches!(result, Err(KmnError::Reconstruction { .. })),
                "{} > {} should fail",
                from,
                to
            );
        }
    }

    #[test]
    fn test_header_stores() {
        let mut kb = keyboard(vec![LdmlKey::new("K_A", "a")], vec![("none", vec!["K_A"])]);
        kb.locale = "khb-Talu".to_string();
        kb.author = Some("It's me".to_string());
        kb.version = Some("1.2".to_string());
        let output = KmnGenerator::new(&kb).generate().unwrap();
        let lines = lines(&output);
        assert!(lines.contains(&"store(&NAME) 'Test'"));
        assert!(lines.contains(&"store(&COPYRIGHT) \"It's me\""));
        assert!(lines.contains(&"store(&KEYBOARDVERSION) '1.2'"));
        assert!(lines.contains(&"store(&ETHNOLOGUECODE) 'khb'"));
        assert!(lines.contains(&"store(&VERSION) '10.0'"));
        assert!(lines.contains(&"begin Unicode > use(main)"));
        assert!(lines.contains(&"group(main) using keys"));
    }
}
