use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use log::{debug, warn};
use kmn_ldml_core::ldml::{
    LdmlKey, LdmlKeyboard, LdmlLayer, LdmlLayers, LdmlTransform, LdmlTransformGroup,
    LdmlTransforms, LdmlVariable, TransformType, VariableKind,
};
use kmn_ldml_core::virtual_keys::{hardware_position, HARDWARE_ROWS};
use kmn_ldml_core::{KmnError, ModifierSet, Result, TouchLayoutFile, Warning};
use crate::parser::{char_key, Element, Group, KeyPattern, KeySpec, KmnDocument, Rule, Store, StoreItem};
use crate::touch::compiler::{restore_touch_only_fields, TouchLayoutCompiler};
use crate::touch::converter::TouchLayoutConverter;
use crate::touch::expander::VariableExpander;
use super::escape::{escape_from, escape_output, escape_set_item, marker_ref, output_to_from, IdMap};
use super::options::CompilerOptions;
use super::xml;

/// Id of the filler key used for unassigned hardware positions.
pub const GAP_KEY_ID: &str = "gap";

// Upper bound on transforms produced by expanding one rule's any() stores.
const MAX_EXPANSION: usize = 1024;

/// Result of compiling a KMN document to LDML.
#[derive(Debug, Clone)]
pub struct LdmlOutput {
    pub keyboard: LdmlKeyboard,
    pub touch_layout: TouchLayoutFile,
    pub warnings: Vec<Warning>,
}

impl LdmlOutput {
    pub fn to_xml(&self) -> Result<String> {
        xml::write_keyboard(&self.keyboard)
    }
}

// Why a rule could not be resolved as written.
enum Failure {
    // any() stores must be expanded item by item
    Expand,
    Unsupported(String),
}

impl Failure {
    fn reason(self) -> String {
        match self {
            Failure::Expand => "any() and index() stores cannot be mapped".to_string(),
            Failure::Unsupported(reason) => reason,
        }
    }
}

// One context position of a rule.
#[derive(Debug, Clone, Copy)]
enum Slot<'d> {
    Text(&'d str),
    Deadkey(&'d str),
    Any { store: &'d Store, chosen: Option<usize> },
    NotAny(&'d Store),
    Index { store: &'d Store, offset: usize },
}

// A concrete key of a rule, with its item index when it came from any(keystore).
struct KeyVariant {
    spec: KeySpec,
    item: Option<usize>,
}

struct Resolved {
    from: String,
    to: String,
    sets: Vec<String>,
}

pub struct LdmlGenerator<'a> {
    doc: &'a KmnDocument,
    options: &'a CompilerOptions,
    warnings: Vec<Warning>,
    keys: Vec<LdmlKey>,
    key_index: HashMap<String, usize>,
    placements: BTreeMap<ModifierSet, BTreeMap<(usize, usize), String>>,
    used_sets: BTreeSet<String>,
    markers: IdMap,
    store_ids: IdMap,
    ambiguous_outputs: HashSet<String>,
}

impl<'a> LdmlGenerator<'a> {
    pub fn new(doc: &'a KmnDocument, options: &'a CompilerOptions) -> Self {
        Self {
            doc,
            options,
            warnings: Vec::new(),
            keys: Vec::new(),
            key_index: HashMap::new(),
            placements: BTreeMap::new(),
            used_sets: BTreeSet::new(),
            markers: IdMap::new(doc.deadkey_names()),
            store_ids: IdMap::new(
                doc.stores
                    .iter()
                    .filter(|s| !s.kind.reserved)
                    .map(|s| s.name.as_str()),
            ),
            ambiguous_outputs: HashSet::new(),
        }
    }

    pub fn generate(mut self) -> Result<LdmlOutput> {
        self.options.validate()?;

        let mnemonic = self.doc.system_value("MNEMONICLAYOUT");
        if mnemonic.as_deref().map(str::trim) == Some("1") {
            return Err(KmnError::UnsupportedKeyboard {
                name: self.options.keyboard_id.clone(),
                reason: "mnemonic layouts have no positional LDML equivalent".to_string(),
            });
        }

        debug!("Generating LDML keyboard {}", self.options.keyboard_id);

        self.collect_key_rules();
        self.ambiguous_outputs = self.ambiguous_outputs();

        let doc = self.doc;
        let ordered = doc
            .groups
            .iter()
            .filter(|g| g.using_keys)
            .chain(doc.groups.iter().filter(|g| !g.using_keys));

        let mut simple = Vec::new();
        let mut backspace = Vec::new();
        for group in ordered {
            let transforms = self.collect_transforms(group, &mut backspace);
            let transforms: Vec<LdmlTransform> = transforms.into_iter().map(|(_, t)| t).collect();
            if !transforms.is_empty() {
                debug!("Group {} produced {} transforms", group.name, transforms.len());
                simple.push(LdmlTransformGroup {
                    transforms,
                    reorders: Vec::new(),
                });
            }
        }

        let variables = self.collect_variables();
        let hardware = self.hardware_layers();

        let mut keyboard = LdmlKeyboard {
            locale: self.options.locale.clone(),
            conforms_to: self.options.conforms_to.clone(),
            name: self
                .doc
                .system_value("NAME")
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.options.keyboard_id.clone()),
            author: self
                .doc
                .system_value("AUTHOR")
                .or_else(|| self.doc.system_value("COPYRIGHT")),
            version: self.doc.system_value("KEYBOARDVERSION"),
            variables,
            ..Default::default()
        };
        keyboard.layers.extend(hardware);
        keyboard.keys = std::mem::take(&mut self.keys);
        if !simple.is_empty() {
            keyboard.transforms.push(LdmlTransforms {
                kind: TransformType::Simple,
                groups: simple,
            });
        }
        if !backspace.is_empty() {
            backspace.sort_by_key(|(len, _)| Reverse(*len));
            keyboard.transforms.push(LdmlTransforms {
                kind: TransformType::Backspace,
                groups: vec![LdmlTransformGroup {
                    transforms: backspace.into_iter().map(|(_, t)| t).collect(),
                    reorders: Vec::new(),
                }],
            });
        }

        if let Some(source) = &self.options.touch_layout {
            // Markers are numbered before touch keys are added; those only reuse existing markers.
            let expander = VariableExpander::from_keyboard(&keyboard);
            let converted = TouchLayoutConverter::new(&keyboard.keys)
                .with_expander(expander)
                .convert(source);
            keyboard.keys.extend(converted.keys);
            keyboard.flicks = converted.flicks;
            keyboard.layers.extend(converted.layers);
        }

        let (mut touch_layout, touch_warnings) = TouchLayoutCompiler::new(&keyboard).compile();
        if let Some(source) = &self.options.touch_layout {
            restore_touch_only_fields(&mut touch_layout, source);
        }
        self.warnings.extend(touch_warnings);

        Ok(LdmlOutput {
            keyboard,
            touch_layout,
            warnings: self.warnings,
        })
    }

    fn skip(&mut self, line: usize, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Line {}: rule skipped: {}", line, reason);
        self.warnings.push(Warning::SkippedRule { line, reason });
    }

    /// Output elements of a rule that LDML can express, or `None` when the rule
    /// has to be skipped.
    fn prepare_rule(&mut self, rule: &'a Rule) -> Option<Vec<&'a Element>> {
        if let Some(name) = rule.context.iter().chain(&rule.output).find_map(unsupported_element) {
            self.skip(rule.line, format!("{} has no LDML equivalent", name));
            return None;
        }

        let last = rule.output.len().saturating_sub(1);
        let mut output = Vec::new();
        for (i, element) in rule.output.iter().enumerate() {
            match element {
                Element::Beep | Element::Layer(_) => {
                    let name = if matches!(element, Element::Beep) { "beep" } else { "layer()" };
                    warn!("Line {}: {} dropped", rule.line, name);
                    self.warnings.push(Warning::DroppedElement {
                        line: rule.line,
                        element: name.to_string(),
                    });
                }
                // Every transform group runs in turn, so a trailing use() is implied.
                Element::Use(group) if i == last => {
                    debug!("Line {}: use({}) folded into transform order", rule.line, group);
                }
                Element::Use(_) => {
                    self.skip(rule.line, "use() before the end of the output");
                    return None;
                }
                _ => output.push(element),
            }
        }
        Some(output)
    }

    fn key_variants(&self, pattern: &KeyPattern) -> std::result::Result<Vec<KeyVariant>, String> {
        match pattern {
            KeyPattern::Key(spec) => Ok(vec![KeyVariant { spec: spec.clone(), item: None }]),
            KeyPattern::AnyStore(name) => {
                let store = self
                    .doc
                    .store(name)
                    .ok_or_else(|| format!("any() refers to undefined store '{}'", name))?;
                Ok(store
                    .items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let spec = match item {
                            StoreItem::Key(spec) => spec.clone(),
                            StoreItem::Char(c) => char_key(*c, ModifierSet::NONE),
                            _ => return None,
                        };
                        Some(KeyVariant { spec, item: Some(i) })
                    })
                    .collect())
            }
        }
    }

    /// First pass: rules with a key and no context define key outputs.
    fn collect_key_rules(&mut self) {
        let doc = self.doc;
        for group in doc.groups.iter().filter(|g| g.using_keys) {
            for rule in group.rules.iter().filter(|r| r.context.is_empty()) {
                let Some(pattern) = &rule.key else { continue };
                let Some(output) = self.prepare_rule(rule) else { continue };

                let variants = match self.key_variants(pattern) {
                    Ok(variants) => variants,
                    Err(reason) => {
                        self.skip(rule.line, reason);
                        continue;
                    }
                };

                for variant in variants {
                    match self.resolve(&[], Some(&variant), &output) {
                        Ok(resolved) => {
                            self.used_sets.extend(resolved.sets);
                            self.add_key_rule(rule.line, &variant.spec, resolved.to);
                        }
                        Err(failure) => self.skip(rule.line, failure.reason()),
                    }
                }
            }
        }
    }

    fn strip_ncaps(&mut self, line: usize, modifiers: ModifierSet) -> ModifierSet {
        if modifiers.ncaps {
            warn!("Line {}: NCAPS dropped", line);
            self.warnings.push(Warning::DroppedModifier {
                line,
                modifier: "NCAPS".to_string(),
            });
        }
        modifiers.without_ncaps()
    }

    fn add_key_rule(&mut self, line: usize, spec: &KeySpec, output: String) {
        let modifiers = self.strip_ncaps(line, spec.modifiers);
        let id = modifiers.variant_id(&spec.key);
        if self.key_index.contains_key(&id) {
            warn!("Line {}: duplicate rule for key {}", line, id);
            self.warnings.push(Warning::DuplicateKeyRule { line, key_id: id });
            return;
        }

        let position = self.position_of(&spec.key, &id);
        self.insert_key(LdmlKey::new(id, output), modifiers, position);
    }

    // Keys without a hardware position are still defined, but no layer places them.
    fn position_of(&mut self, key: &str, id: &str) -> Option<(usize, usize)> {
        let position = hardware_position(key);
        if position.is_none() {
            warn!("Key {} has no hardware position", id);
            self.warnings.push(Warning::UnplacedKey { key_id: id.to_string() });
        }
        position
    }

    // Outputs that another key's output ends with: a transform matching one of
    // them would also fire after the other key.
    fn ambiguous_outputs(&self) -> HashSet<String> {
        let outputs: Vec<(&str, &str)> = self
            .keys
            .iter()
            .filter(|k| !k.output.is_empty())
            .map(|k| (k.id.as_str(), k.output.as_str()))
            .collect();
        outputs
            .iter()
            .filter(|(id, output)| {
                outputs
                    .iter()
                    .any(|(other, text)| other != id && text.ends_with(output))
            })
            .map(|(_, output)| output.to_string())
            .collect()
    }

    fn insert_key(&mut self, key: LdmlKey, modifiers: ModifierSet, position: Option<(usize, usize)>) {
        if let Some(position) = position {
            self.placements
                .entry(modifiers)
                .or_default()
                .insert(position, key.id.clone());
        }
        self.key_index.insert(key.id.clone(), self.keys.len());
        self.keys.push(key);
    }

    /// `from` text matching the output of a key.
    ///
    /// A key with no output, or with an output another key also ends in, is
    /// given a placeholder marker instead. A catch-all transform turns the
    /// placeholder back into the original output when no rule consumes it.
    fn key_pattern(
        &mut self,
        line: usize,
        spec: &KeySpec,
        catch_alls: &mut Vec<LdmlTransform>,
    ) -> String {
        let modifiers = self.strip_ncaps(line, spec.modifiers);
        let id = modifiers.variant_id(&spec.key);

        if let Some(&index) = self.key_index.get(&id) {
            let output = self.keys[index].output.clone();
            if !output.is_empty() && !self.ambiguous_outputs.contains(&output) {
                return output_to_from(&output);
            }
            let placeholder = marker_ref(&self.markers.reserve(&id));
            debug!("Key {} gets placeholder output {}", id, placeholder);
            self.keys[index].output = placeholder.clone();
            catch_alls.push(LdmlTransform {
                from: placeholder.clone(),
                to: output,
            });
            return placeholder;
        }

        let position = self.position_of(&spec.key, &id);
        let placeholder = marker_ref(&self.markers.reserve(&id));
        debug!("Key {} gets placeholder output {}", id, placeholder);
        self.insert_key(LdmlKey::new(id, placeholder.clone()), modifiers, position);
        placeholder
    }

    /// Second pass: contextual rules of one group become transforms, each with
    /// the length of its context.
    ///
    /// A transform group applies the first transform that matches, so longer
    /// contexts are moved ahead of shorter ones. Source order is kept otherwise.
    fn collect_transforms(
        &mut self,
        group: &'a Group,
        backspace: &mut Vec<(usize, LdmlTransform)>,
    ) -> Vec<(usize, LdmlTransform)> {
        let mut transforms = Vec::new();
        let mut catch_alls = Vec::new();

        for rule in &group.rules {
            if group.using_keys && rule.key.is_some() && rule.context.is_empty() {
                continue;
            }
            let Some(output) = self.prepare_rule(rule) else { continue };

            let slots = match self.context_slots(&rule.context) {
                Ok(slots) => slots,
                Err(reason) => {
                    self.skip(rule.line, reason);
                    continue;
                }
            };

            let variants = match &rule.key {
                None => vec![None],
                Some(pattern) => match self.key_variants(pattern) {
                    Ok(variants) => variants.into_iter().map(Some).collect(),
                    Err(reason) => {
                        self.skip(rule.line, reason);
                        continue;
                    }
                },
            };

            for variant in &variants {
                let is_backspace = variant.as_ref().is_some_and(|v| {
                    v.spec.key == "K_BKSP" && v.spec.modifiers.without_ncaps().is_empty()
                });
                let key_from = match variant {
                    Some(v) if !is_backspace => self.key_pattern(rule.line, &v.spec, &mut catch_alls),
                    _ => String::new(),
                };

                match self.resolve_all(&slots, variant.as_ref(), &output) {
                    Ok(resolved) => {
                        for r in resolved {
                            self.used_sets.extend(r.sets);
                            let transform = LdmlTransform {
                                from: format!("{}{}", r.from, key_from),
                                to: r.to,
                            };
                            if is_backspace {
                                backspace.push((slots.len(), transform));
                            } else {
                                transforms.push((slots.len(), transform));
                            }
                        }
                    }
                    Err(reason) => self.skip(rule.line, reason),
                }
            }
        }

        transforms.sort_by_key(|(len, _)| Reverse(*len));
        transforms.extend(catch_alls.into_iter().map(|t| (0, t)));
        transforms
    }

    fn context_slots(&self, context: &'a [Element]) -> std::result::Result<Vec<Slot<'a>>, String> {
        let doc = self.doc;
        let lookup = |name: &str| {
            doc.store(name)
                .ok_or_else(|| format!("store '{}' is not defined", name))
        };

        let mut slots = Vec::new();
        for element in context {
            match element {
                Element::Text(text) => {
                    slots.extend(
                        text.char_indices()
                            .map(|(i, c)| Slot::Text(&text[i..i + c.len_utf8()])),
                    );
                }
                Element::Deadkey(name) => slots.push(Slot::Deadkey(name)),
                Element::Any(name) => slots.push(Slot::Any {
                    store: lookup(name.as_str())?,
                    chosen: None,
                }),
                Element::NotAny(name) => slots.push(Slot::NotAny(lookup(name.as_str())?)),
                Element::Index { store, offset } => slots.push(Slot::Index {
                    store: lookup(store.as_str())?,
                    offset: *offset,
                }),
                Element::Nul => return Err("nul in context has no LDML equivalent".to_string()),
                other => return Err(format!("{} in context has no LDML equivalent", element_name(other))),
            }
        }
        Ok(slots)
    }

    /// Resolves a rule, expanding its any() stores item by item when they
    /// cannot be mapped as sets.
    fn resolve_all(
        &self,
        slots: &[Slot<'a>],
        variant: Option<&KeyVariant>,
        output: &[&'a Element],
    ) -> std::result::Result<Vec<Resolved>, String> {
        match self.resolve(slots, variant, output) {
            Ok(resolved) => Ok(vec![resolved]),
            Err(Failure::Unsupported(reason)) => Err(reason),
            Err(Failure::Expand) => expand_slots(slots)?
                .iter()
                .map(|expanded| self.resolve(expanded, variant, output).map_err(Failure::reason))
                .collect(),
        }
    }

    fn resolve(
        &self,
        slots: &[Slot<'a>],
        variant: Option<&KeyVariant>,
        output: &[&'a Element],
    ) -> std::result::Result<Resolved, Failure> {
        let mut from = String::new();
        let mut sets = Vec::new();
        let mut captures = vec![None; slots.len()];
        let mut next_capture = 1;

        for (i, slot) in slots.iter().enumerate() {
            match slot {
                Slot::Text(text) => from.push_str(&escape_from(text)),
                Slot::Deadkey(name) => from.push_str(&self.markers.marker(name)),
                Slot::Any { store, chosen: Some(n) } => {
                    from.push_str(&item_pattern(store, *n, &self.markers)?)
                }
                Slot::Any { store, chosen: None } => {
                    ensure_set(store)?;
                    from.push_str(&format!("($[{}])", self.store_ids.id(&store.name)));
                    sets.push(store.name.clone());
                    captures[i] = Some(next_capture);
                    next_capture += 1;
                }
                Slot::NotAny(store) => {
                    ensure_set(store)?;
                    from.push_str(&format!("[^$[{}]]", self.store_ids.id(&store.name)));
                    sets.push(store.name.clone());
                }
                Slot::Index { store, offset } => {
                    let n = chosen_item(slots, *offset)?;
                    from.push_str(&item_pattern(store, n, &self.markers)?);
                }
            }
        }

        let mut to = String::new();
        for element in output {
            match element {
                Element::Text(text) => to.push_str(&escape_output(text)),
                Element::Deadkey(name) => to.push_str(&self.markers.marker(name)),
                Element::Nul => {}
                Element::Outs(name) => {
                    let store = self.store(name)?;
                    for n in 0..store.items.len() {
                        to.push_str(&item_output(store, n, &self.markers)?);
                    }
                }
                Element::Index { store, offset } => {
                    let target = self.store(store)?;
                    let p = offset - 1;
                    if p < slots.len() {
                        match slots[p] {
                            Slot::Any { store: source, chosen: None } => {
                                if !can_map(source, target) {
                                    return Err(Failure::Expand);
                                }
                                let capture = captures[p].unwrap_or_default();
                                to.push_str(&format!("$[{}:{}]", capture, self.store_ids.id(&target.name)));
                                sets.push(target.name.clone());
                            }
                            _ => {
                                let n = chosen_item(slots, *offset)?;
                                to.push_str(&item_output(target, n, &self.markers)?);
                            }
                        }
                    } else if p == slots.len() {
                        match variant.and_then(|v| v.item) {
                            Some(n) => to.push_str(&item_output(target, n, &self.markers)?),
                            None => {
                                return Err(Failure::Unsupported(
                                    "index() refers to a key that is not any()".to_string(),
                                ))
                            }
                        }
                    } else {
                        return Err(Failure::Unsupported(format!(
                            "index() offset {} is beyond the context",
                            offset
                        )));
                    }
                }
                Element::Context(None) => {
                    for p in 0..slots.len() {
                        to.push_str(&slot_output(slots, &captures, p, &self.markers)?);
                    }
                }
                Element::Context(Some(n)) => {
                    if *n > slots.len() {
                        return Err(Failure::Unsupported(format!(
                            "context({}) is beyond the context",
                            n
                        )));
                    }
                    to.push_str(&slot_output(slots, &captures, n - 1, &self.markers)?);
                }
                other => {
                    return Err(Failure::Unsupported(format!(
                        "{} in output has no LDML equivalent",
                        element_name(other)
                    )))
                }
            }
        }

        Ok(Resolved { from, to, sets })
    }

    fn store(&self, name: &str) -> std::result::Result<&'a Store, Failure> {
        self.doc
            .store(name)
            .ok_or_else(|| Failure::Unsupported(format!("store '{}' is not defined", name)))
    }

    fn collect_variables(&mut self) -> Vec<LdmlVariable> {
        let mut variables = Vec::new();
        let mut seen = HashSet::new();
        let doc = self.doc;

        for declared in &doc.stores {
            if declared.kind.reserved || !seen.insert(declared.name.as_str()) {
                continue;
            }
            let Some(store) = doc.store(&declared.name) else { continue };
            if store.is_key_store() {
                continue;
            }

            let id = self.store_ids.id(&store.name);
            if self.used_sets.contains(&store.name) {
                let items: Vec<String> = store
                    .items
                    .iter()
                    .filter_map(|item| match item {
                        StoreItem::Char(c) => Some(escape_set_item(&c.to_string())),
                        StoreItem::Deadkey(name) => Some(self.markers.marker(name)),
                        _ => None,
                    })
                    .collect();
                variables.push(LdmlVariable {
                    kind: VariableKind::Set,
                    id,
                    value: items.join(" "),
                });
            } else if store.kind.option || store.kind.call {
                let reason = if store.kind.call {
                    "call() stores have no LDML equivalent"
                } else {
                    "option stores have no LDML equivalent"
                };
                warn!("Store {} dropped: {}", store.name, reason);
                self.warnings.push(Warning::DroppedStore {
                    name: store.name.clone(),
                    reason: reason.to_string(),
                });
            } else {
                let value = (0..store.items.len())
                    .filter_map(|n| item_output(store, n, &self.markers).ok())
                    .collect::<String>();
                variables.push(LdmlVariable {
                    kind: VariableKind::String,
                    id,
                    value,
                });
            }
        }

        variables
    }

    fn hardware_layers(&mut self) -> Option<LdmlLayers> {
        if self.placements.is_empty() {
            return None;
        }

        let mut needs_gap = false;
        let mut layers = Vec::new();
        for (modifiers, placed) in &self.placements {
            let mut rows: Vec<Vec<String>> = (0..HARDWARE_ROWS.len())
                .map(|row| {
                    let last = placed.keys().filter(|(r, _)| *r == row).map(|(_, c)| *c).max();
                    match last {
                        Some(last) => (0..=last)
                            .map(|col| match placed.get(&(row, col)) {
                                Some(id) => id.clone(),
                                None => {
                                    needs_gap = true;
                                    GAP_KEY_ID.to_string()
                                }
                            })
                            .collect(),
                        None => Vec::new(),
                    }
                })
                .collect();

            while rows.last().is_some_and(|r| r.is_empty()) {
                rows.pop();
            }
            for row in rows.iter_mut().filter(|r| r.is_empty()) {
                row.push(GAP_KEY_ID.to_string());
                needs_gap = true;
            }

            layers.push(LdmlLayer {
                id: None,
                modifiers: Some(modifiers.to_ldml()),
                rows,
            });
        }

        if needs_gap && !self.key_index.contains_key(GAP_KEY_ID) {
            let gap = LdmlKey {
                gap: true,
                ..LdmlKey::new(GAP_KEY_ID, "")
            };
            self.insert_key(gap, ModifierSet::NONE, None);
        }

        Some(LdmlLayers {
            form_id: self.options.hardware_form.as_str().to_string(),
            min_device_width: None,
            layers,
        })
    }
}

fn unsupported_element(element: &Element) -> Option<&'static str> {
    match element {
        Element::If { .. } => Some("if()"),
        Element::Set { .. } => Some("set()"),
        Element::Save(_) => Some("save()"),
        Element::Reset(_) => Some("reset()"),
        Element::Call(_) => Some("call()"),
        Element::Platform(_) => Some("platform()"),
        Element::BaseLayout(_) => Some("baselayout()"),
        _ => None,
    }
}

fn element_name(element: &Element) -> &'static str {
    match element {
        Element::Text(_) => "text",
        Element::Deadkey(_) => "dk()",
        Element::Any(_) => "any()",
        Element::NotAny(_) => "notany()",
        Element::Index { .. } => "index()",
        Element::Outs(_) => "outs()",
        Element::Context(_) => "context",
        Element::Use(_) => "use()",
        Element::Beep => "beep",
        Element::Nul => "nul",
        Element::Layer(_) => "layer()",
        other => unsupported_element(other).unwrap_or("element"),
    }
}

// Stores used as sets hold characters and deadkeys only.
fn ensure_set(store: &Store) -> std::result::Result<(), Failure> {
    if store.items.iter().any(|i| matches!(i, StoreItem::Key(_))) {
        return Err(Failure::Unsupported(format!(
            "key store '{}' cannot be matched as text",
            store.name
        )));
    }
    Ok(())
}

// any(a) ... index(b) maps to a set lookup when both line up item for item.
fn can_map(source: &Store, target: &Store) -> bool {
    let plain = |s: &Store| s.items.iter().all(|i| matches!(i, StoreItem::Char(_) | StoreItem::Deadkey(_)));
    source.len() == target.len() && plain(source) && plain(target)
}

fn chosen_item(slots: &[Slot<'_>], offset: usize) -> std::result::Result<usize, Failure> {
    match offset.checked_sub(1).and_then(|p| slots.get(p)) {
        Some(Slot::Any { chosen: Some(n), .. }) => Ok(*n),
        Some(Slot::Any { chosen: None, .. }) => Err(Failure::Expand),
        _ => Err(Failure::Unsupported(
            "index() must refer to an any() position".to_string(),
        )),
    }
}

fn missing_item(store: &Store, n: usize) -> Failure {
    Failure::Unsupported(format!("store '{}' has no item {}", store.name, n + 1))
}

fn item_pattern(store: &Store, n: usize, markers: &IdMap) -> std::result::Result<String, Failure> {
    match store.items.get(n) {
        Some(StoreItem::Char(c)) => Ok(escape_from(&c.to_string())),
        Some(StoreItem::Deadkey(name)) => Ok(markers.marker(name)),
        Some(StoreItem::Nul) => Ok(String::new()),
        Some(StoreItem::Key(_)) => Err(Failure::Unsupported(format!(
            "key store '{}' cannot be matched as text",
            store.name
        ))),
        None => Err(missing_item(store, n)),
    }
}

fn item_output(store: &Store, n: usize, markers: &IdMap) -> std::result::Result<String, Failure> {
    match store.items.get(n) {
        Some(StoreItem::Char(c)) => Ok(escape_output(&c.to_string())),
        Some(StoreItem::Deadkey(name)) => Ok(markers.marker(name)),
        Some(StoreItem::Nul) => Ok(String::new()),
        Some(StoreItem::Key(_)) => Err(Failure::Unsupported(format!(
            "key store '{}' cannot be output",
            store.name
        ))),
        None => Err(missing_item(store, n)),
    }
}

fn slot_output(
    slots: &[Slot<'_>],
    captures: &[Option<usize>],
    p: usize,
    markers: &IdMap,
) -> std::result::Result<String, Failure> {
    match slots[p] {
        Slot::Text(text) => Ok(escape_output(text)),
        Slot::Deadkey(name) => Ok(markers.marker(name)),
        Slot::Any { store, chosen: Some(n) } => item_output(store, n, markers),
        Slot::Any { chosen: None, .. } => Ok(format!("${}", captures[p].unwrap_or_default())),
        Slot::NotAny(_) => Err(Failure::Unsupported(
            "context() of notany() has no LDML equivalent".to_string(),
        )),
        Slot::Index { store, offset } => item_output(store, chosen_item(slots, offset)?, markers),
    }
}

// Replaces every unchosen any() slot with each of its items in turn.
fn expand_slots<'d>(slots: &[Slot<'d>]) -> std::result::Result<Vec<Vec<Slot<'d>>>, String> {
    let mut expanded = vec![slots.to_vec()];
    for (i, slot) in slots.iter().enumerate() {
        let Slot::Any { store, chosen: None } = *slot else { continue };
        let mut next = Vec::new();
        for partial in &expanded {
            for (n, item) in store.items.iter().enumerate() {
                if matches!(item, StoreItem::Nul) {
                    continue;
                }
                let mut instance = partial.clone();
                instance[i] = Slot::Any { store, chosen: Some(n) };
                next.push(instance);
            }
        }
        if next.len() > MAX_EXPANSION {
            return Err(format!(
                "expanding any({}) produces more than {} transforms",
                store.name, MAX_EXPANSION
            ));
        }
        expanded = next;
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn generate(source: &str) -> LdmlOutput {
        let doc = Parser::new(source, "test.kmn").parse().unwrap();
        let options = CompilerOptions::builder()
            .keyboard_id("test")
            .locale("en")
            .conforms_to("45")
            .build()
            .unwrap();
        LdmlGenerator::new(&doc, &options).generate().unwrap()
    }

    fn simple_transforms(output: &LdmlOutput) -> Vec<(String, String)> {
        output
            .keyboard
            .transforms_of(TransformType::Simple)
            .map(|t| {
                t.groups
                    .iter()
                    .flat_map(|g| g.transforms.iter())
                    .map(|t| (t.from.clone(), t.to.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_key_rules_become_keys_and_layers() {
        let output = generate("+ [K_A] > 'a'\n+ [SHIFT K_A] > 'A'\n");
        let keyboard = &output.keyboard;
        assert_eq!(keyboard.key("K_A").map(|k| k.output.as_str()), Some("a"));
        assert_eq!(keyboard.key("K_A_shift").map(|k| k.output.as_str()), Some("A"));

        let hardware: Vec<_> = keyboard.hardware_layers().collect();
        assert_eq!(hardware.len(), 1);
        assert_eq!(hardware[0].form_id, "us");
        assert_eq!(hardware[0].layers[0].modifiers.as_deref(), Some("none"));
        assert_eq!(hardware[0].layers[1].modifiers.as_deref(), Some("shift"));
        assert_eq!(hardware[0].layers[0].rows.len(), 3);
        assert_eq!(hardware[0].layers[0].rows[2], vec!["K_A"]);
    }

    #[test]
    fn test_holes_are_filled_with_gap_keys() {
        let output = generate("+ [K_S] > 's'\n");
        let layers: Vec<_> = output.keyboard.hardware_layers().collect();
        assert_eq!(layers[0].layers[0].rows[0], vec![GAP_KEY_ID]);
        assert_eq!(layers[0].layers[0].rows[2], vec![GAP_KEY_ID, "K_S"]);
        assert!(output.keyboard.key(GAP_KEY_ID).is_some_and(|k| k.gap));
    }

    #[test]
    fn test_contextual_rule_becomes_transform() {
        let output = generate("+ [K_E] > 'e'\ndk(acute) + [K_E] > 'é'\n+ [K_QUOTE] > dk(acute)\n");
        assert_eq!(
            simple_transforms(&output),
            vec![("\\m{acute}e".to_string(), "é".to_string())]
        );
        assert_eq!(output.keyboard.key("K_QUOTE").map(|k| k.output.as_str()), Some("\\m{acute}"));
    }

    #[test]
    fn test_key_without_plain_rule_gets_placeholder() {
        let output = generate("'x' + [K_Q] > 'y'\n");
        assert_eq!(output.keyboard.key("K_Q").map(|k| k.output.as_str()), Some("\\m{K_Q}"));
        assert_eq!(
            simple_transforms(&output),
            vec![("x\\m{K_Q}".to_string(), "y".to_string())]
        );
    }

    #[test]
    fn test_unplaced_keys_are_kept() {
        let output = generate("+ [K_A] > 'a'\n+ [K_ENTER] > 'z'\n+ 'ə' > 'q'\n");
        let keyboard = &output.keyboard;
        assert_eq!(keyboard.key("K_ENTER").map(|k| k.output.as_str()), Some("z"));
        assert_eq!(keyboard.key("U_0259").map(|k| k.output.as_str()), Some("q"));
        assert!(output.warnings.contains(&Warning::UnplacedKey { key_id: "K_ENTER".to_string() }));
        assert!(output.warnings.contains(&Warning::UnplacedKey { key_id: "U_0259".to_string() }));

        let rows = &keyboard.hardware_layers().next().unwrap().layers[0].rows;
        assert!(rows.iter().flatten().all(|id| id != "K_ENTER" && id != "U_0259"));
    }

    #[test]
    fn test_longer_context_comes_first() {
        let output = generate("+ [K_B] > 'b'\n'a' + [K_B] > 'x'\n'ca' + [K_B] > 'y'\n");
        assert_eq!(
            simple_transforms(&output),
            vec![
                ("cab".to_string(), "y".to_string()),
                ("ab".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_deadkey_names_that_sanitize_alike_stay_distinct() {
        let output = generate("+ [K_A] > dk(a-b)\n+ [K_B] > dk(a_b)\n");
        assert_eq!(output.keyboard.key("K_A").map(|k| k.output.as_str()), Some("\\m{a_b_2}"));
        assert_eq!(output.keyboard.key("K_B").map(|k| k.output.as_str()), Some("\\m{a_b}"));
    }

    #[test]
    fn test_shared_output_gets_placeholder() {
        let source = "+ [K_E] > 'e'\n+ [K_3] > 'e'\n+ [K_QUOTE] > dk(a)\ndk(a) + [K_3] > 'x'\n";
        let output = generate(source);
        assert_eq!(output.keyboard.key("K_E").map(|k| k.output.as_str()), Some("e"));
        assert_eq!(output.keyboard.key("K_3").map(|k| k.output.as_str()), Some("\\m{K_3}"));
        assert_eq!(
            simple_transforms(&output),
            vec![
                ("\\m{a}\\m{K_3}".to_string(), "x".to_string()),
                ("\\m{K_3}".to_string(), "e".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_mapping() {
        let source = "store(a) 'abc'\nstore(b) 'xyz'\nany(a) + [K_Q] > index(b, 1)\n+ [K_Q] > 'q'\n";
        let output = generate(source);
        assert_eq!(
            simple_transforms(&output),
            vec![("($[a])q".to_string(), "$[1:b]".to_string())]
        );
        let kinds: Vec<_> = output.keyboard.variables.iter().map(|v| (v.id.as_str(), v.kind)).collect();
        assert_eq!(kinds, vec![("a", VariableKind::Set), ("b", VariableKind::Set)]);
    }

    #[test]
    fn test_mismatched_stores_expand() {
        let source = "store(a) 'ab'\nstore(b) 'xyz'\nany(a) + [K_Q] > index(b, 1)\n+ [K_Q] > 'q'\n";
        let output = generate(source);
        assert_eq!(
            simple_transforms(&output),
            vec![
                ("aq".to_string(), "x".to_string()),
                ("bq".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn test_any_key_store_expands_to_keys() {
        let source = "store(keys) [K_A] [K_B]\nstore(out) 'αβ'\n+ any(keys) > index(out, 1)\n";
        let output = generate(source);
        assert_eq!(output.keyboard.key("K_A").map(|k| k.output.as_str()), Some("α"));
        assert_eq!(output.keyboard.key("K_B").map(|k| k.output.as_str()), Some("β"));
    }

    #[test]
    fn test_unsupported_rules_warn() {
        let source = "store(opt) '0'\nif(opt = '1') + [K_A] > 'a'\n+ [NCAPS K_B] > 'b'\n+ [K_C] > 'c' beep\n";
        let output = generate(source);
        assert!(output.warnings.contains(&Warning::SkippedRule {
            line: 2,
            reason: "if() has no LDML equivalent".to_string()
        }));
        assert!(output.warnings.contains(&Warning::DroppedModifier {
            line: 3,
            modifier: "NCAPS".to_string()
        }));
        assert!(output.warnings.contains(&Warning::DroppedElement {
            line: 4,
            element: "beep".to_string()
        }));
        assert!(output.warnings.iter().any(|w| matches!(w, Warning::DroppedStore { .. })));
        assert_eq!(output.keyboard.key("K_C").map(|k| k.output.as_str()), Some("c"));
    }

    #[test]
    fn test_backspace_rules() {
        let output = generate("'ab' + [K_BKSP] > 'a'\n");
        let backspace = output.keyboard.transforms_of(TransformType::Backspace).unwrap();
        assert_eq!(backspace.groups[0].transforms[0].from, "ab");
        assert_eq!(backspace.groups[0].transforms[0].to, "a");
    }

    #[test]
    fn test_mnemonic_layout_rejected() {
        let doc = Parser::new("store(&MNEMONICLAYOUT) '1'\n", "m.kmn").parse().unwrap();
        let options = CompilerOptions::builder()
            .keyboard_id("m")
            .locale("en")
            .conforms_to("45")
            .build()
            .unwrap();
        let result = LdmlGenerator::new(&doc, &options).generate();
        assert!(matches!(result, Err(KmnError::UnsupportedKeyboard { .. })));
    }
}
