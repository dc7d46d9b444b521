use crate::lexer::{Lexer, Position, Token};
use kmn_ldml_core::system_stores::system_store_name;
use kmn_ldml_core::virtual_keys::us_key_for_char;
use kmn_ldml_core::{KmnError, ModifierSet};
use super::ast::*;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Option<Token>,
    peek: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, path: &'a str) -> Self {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        Self {
            lexer: Lexer::new(input, path),
            current: None,
            peek: None,
        }
    }

    pub fn parse(&mut self) -> Result<KmnDocument, KmnError> {
        let mut doc = KmnDocument::new(self.lexer.path);
        self.advance()?;

        while let Some(token) = &self.current {
            match token {
                Token::Newline => self.advance()?,
                Token::Store => {
                    let store = self.parse_store(&doc)?;
                    doc.stores.push(store);
                }
                Token::Begin => {
                    let begin = self.parse_begin()?;
                    doc.begins.push(begin);
                }
                Token::Group => {
                    let group = self.parse_group_header()?;
                    doc.groups.push(group);
                }
                Token::Match | Token::Nomatch => self.parse_match(&mut doc)?,
                _ if self.at_bare_comment() => self.advance()?,
                Token::Ident(name)
                    if system_store_name(name).is_some() && self.peek != Some(Token::LParen) =>
                {
                    let store = self.parse_legacy_header()?;
                    doc.stores.push(store);
                }
                _ => {
                    let line = self.lexer.current_line();
                    let rule = self.parse_rule()?;
                    current_group(&mut doc, line).rules.push(rule);
                }
            }
        }

        mark_store_kinds(&mut doc);
        Ok(doc)
    }

    fn advance(&mut self) -> Result<(), KmnError> {
        self.current = self.lexer.next_token()?;
        self.peek = self.lexer.peek();
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<(), KmnError> {
        if self.current.as_ref() != Some(&expected) {
            return Err(self.error(format!(
                "expected {:?}, found {}",
                expected,
                describe(&self.current)
            )));
        }
        self.advance()
    }

    fn error(&self, message: impl Into<String>) -> KmnError {
        self.lexer.error(message)
    }

    // A lone `c` at the end of a line is an empty comment.
    fn at_bare_comment(&self) -> bool {
        matches!(&self.current, Some(Token::Ident(c)) if c == "c" || c == "C")
            && matches!(self.peek, None | Some(Token::Newline))
    }

    fn end_statement(&mut self) -> Result<(), KmnError> {
        match &self.current {
            None => Ok(()),
            Some(Token::Newline) => self.advance(),
            _ if self.at_bare_comment() => self.advance(),
            Some(token) => Err(self.error(format!("unexpected {:?} at end of statement", token))),
        }
    }

    fn parse_store(&mut self, doc: &KmnDocument) -> Result<Store, KmnError> {
        let line = self.lexer.current_line();
        self.expect(Token::Store)?;
        self.expect(Token::LParen)?;
        let (raw, ampersand) = self.parse_raw_name()?;
        self.expect(Token::RParen)?;

        let (name, kind) = match system_store_name(&raw) {
            Some(canonical) => (
                canonical.to_string(),
                StoreKind { reserved: true, ..Default::default() },
            ),
            None => (raw, StoreKind { debug: ampersand, ..Default::default() }),
        };

        let items = self.parse_store_items(doc)?;
        self.end_statement()?;

        Ok(Store { name, kind, items, line })
    }

    /// `NAME "My keyboard"` style header from old keyboards.
    fn parse_legacy_header(&mut self) -> Result<Store, KmnError> {
        let line = self.lexer.current_line();
        let name = match &self.current {
            Some(Token::Ident(n)) => system_store_name(n).unwrap_or_default().to_string(),
            other => return Err(self.error(format!("expected header name, found {}", describe(other)))),
        };

        let raw = self.lexer.rest_of_line().trim();
        let value = strip_quotes(raw);
        self.advance()?;
        self.end_statement()?;

        Ok(Store {
            name,
            kind: StoreKind { reserved: true, ..Default::default() },
            items: value.chars().map(StoreItem::Char).collect(),
            line,
        })
    }

    fn parse_store_items(&mut self, doc: &KmnDocument) -> Result<Vec<StoreItem>, KmnError> {
        let mut items = Vec::new();

        loop {
            if self.at_bare_comment() {
                break;
            }
            let token = self.current.clone();
            match token {
                None | Some(Token::Newline) => break,
                Some(Token::String(s)) => {
                    items.extend(s.chars().map(StoreItem::Char));
                    self.advance()?;
                }
                Some(Token::CodePoint(cp)) => {
                    items.push(StoreItem::Char(self.code_point(cp)?));
                    self.advance()?;
                }
                Some(Token::LBracket) => {
                    items.push(StoreItem::Key(self.parse_key_bracket()?));
                }
                Some(Token::Range) => self.parse_range(&mut items)?,
                Some(Token::Ident(name)) => {
                    if let Some(c) = self.numeric_char(&name)? {
                        items.push(StoreItem::Char(c));
                        self.advance()?;
                        continue;
                    }
                    match name.to_ascii_lowercase().as_str() {
                        "nul" => {
                            items.push(StoreItem::Nul);
                            self.advance()?;
                        }
                        "dk" | "deadkey" => {
                            self.advance()?;
                            let deadkey = self.parse_paren_name(false)?;
                            items.push(StoreItem::Deadkey(deadkey));
                        }
                        "outs" => {
                            self.advance()?;
                            let position = self.lexer.position();
                            let source = self.parse_paren_name(true)?;
                            let store = doc.store(&source).ok_or_else(|| {
                                self.lexer.error_at(
                                    position,
                                    format!("outs() refers to undefined store '{}'", source),
                                )
                            })?;
                            items.extend(store.items.iter().cloned());
                        }
                        _ => {
                            return Err(self.error(format!("unexpected identifier '{}' in store", name)))
                        }
                    }
                }
                Some(other) => {
                    return Err(self.error(format!("unexpected {:?} in store", other)));
                }
            }
        }

        Ok(items)
    }

    fn parse_range(&mut self, items: &mut Vec<StoreItem>) -> Result<(), KmnError> {
        let start = match items.pop() {
            Some(StoreItem::Char(c)) => c,
            _ => return Err(self.error("range must start with a single character")),
        };
        self.advance()?;
        let end = self.parse_single_char()?;

        if end < start {
            return Err(self.error(format!(
                "range end U+{:04X} precedes start U+{:04X}",
                end as u32, start as u32
            )));
        }

        items.extend(
            (start as u32..=end as u32)
                .filter_map(char::from_u32)
                .map(StoreItem::Char),
        );
        Ok(())
    }

    fn parse_single_char(&mut self) -> Result<char, KmnError> {
        let token = self.current.clone();
        let c = match token {
            Some(Token::String(s)) if s.chars().count() == 1 => s.chars().next(),
            Some(Token::CodePoint(cp)) => Some(self.code_point(cp)?),
            Some(Token::Ident(name)) => self.numeric_char(&name)?,
            _ => None,
        };
        let c = c.ok_or_else(|| {
            self.error(format!("expected a single character, found {}", describe(&self.current)))
        })?;
        self.advance()?;
        Ok(c)
    }

    fn parse_begin(&mut self) -> Result<Begin, KmnError> {
        self.expect(Token::Begin)?;

        let mode = match &self.current {
            Some(t) if t.is_ident("unicode") => BeginMode::Unicode,
            Some(t) if t.is_ident("ansi") => BeginMode::Ansi,
            _ => BeginMode::Ansi,
        };
        if matches!(self.current, Some(Token::Ident(_))) {
            self.advance()?;
        }

        self.expect(Token::Arrow)?;
        let output = self.parse_elements(false)?;
        let group = match output.as_slice() {
            [Element::Use(group)] => group.clone(),
            _ => return Err(self.error("begin must be followed by '> use(group)'")),
        };
        self.end_statement()?;

        Ok(Begin { mode, group })
    }

    fn parse_group_header(&mut self) -> Result<Group, KmnError> {
        let line = self.lexer.current_line();
        self.expect(Token::Group)?;
        self.expect(Token::LParen)?;
        let (name, _) = self.parse_raw_name()?;
        self.expect(Token::RParen)?;

        let mut group = Group::new(name, false, line);
        loop {
            match &self.current {
                Some(t) if t.is_ident("using") => {
                    self.advance()?;
                    if !self.current.as_ref().is_some_and(|t| t.is_ident("keys")) {
                        return Err(self.error("expected 'keys' after 'using'"));
                    }
                    self.advance()?;
                    group.using_keys = true;
                }
                Some(t) if t.is_ident("readonly") => {
                    self.advance()?;
                    group.readonly = true;
                }
                _ => break,
            }
        }
        self.end_statement()?;

        Ok(group)
    }

    fn parse_match(&mut self, doc: &mut KmnDocument) -> Result<(), KmnError> {
        let line = self.lexer.current_line();
        let is_match = self.current == Some(Token::Match);
        self.advance()?;
        self.expect(Token::Arrow)?;
        let output = self.parse_elements(false)?;
        self.end_statement()?;

        let group = current_group(doc, line);
        if is_match {
            group.match_output = Some(output);
        } else {
            group.nomatch_output = Some(output);
        }
        Ok(())
    }

    fn parse_rule(&mut self) -> Result<Rule, KmnError> {
        let line = self.lexer.current_line();
        let context = self.parse_elements(true)?;

        let key = if self.current == Some(Token::Plus) {
            self.advance()?;
            Some(self.parse_key_pattern()?)
        } else {
            None
        };

        self.expect(Token::Arrow)?;
        let output = self.parse_elements(false)?;
        self.end_statement()?;

        Ok(Rule { line, context, key, output })
    }

    fn parse_elements(&mut self, in_context: bool) -> Result<Vec<Element>, KmnError> {
        let mut elements = Vec::new();

        loop {
            if self.at_bare_comment() {
                break;
            }
            match &self.current {
                None | Some(Token::Newline) => break,
                Some(Token::Plus) | Some(Token::Arrow) if in_context => break,
                _ => elements.push(self.parse_element()?),
            }
        }

        Ok(elements)
    }

    fn parse_element(&mut self) -> Result<Element, KmnError> {
        let token = self.current.clone();
        match token {
            Some(Token::String(s)) => {
                self.advance()?;
                Ok(Element::Text(s))
            }
            Some(Token::CodePoint(cp)) => {
                let c = self.code_point(cp)?;
                self.advance()?;
                Ok(Element::Text(c.to_string()))
            }
            Some(Token::Ident(name)) => self.parse_ident_element(&name),
            other => Err(self.error(format!("unexpected {} in rule", describe(&other)))),
        }
    }

    fn parse_ident_element(&mut self, name: &str) -> Result<Element, KmnError> {
        if let Some(c) = self.numeric_char(name)? {
            self.advance()?;
            return Ok(Element::Text(c.to_string()));
        }

        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "beep" => {
                self.advance()?;
                Ok(Element::Beep)
            }
            "nul" => {
                self.advance()?;
                Ok(Element::Nul)
            }
            "context" => {
                self.advance()?;
                if self.current != Some(Token::LParen) {
                    return Ok(Element::Context(None));
                }
                self.advance()?;
                let n = self.parse_offset()?;
                self.expect(Token::RParen)?;
                Ok(Element::Context(Some(n)))
            }
            "any" | "notany" | "outs" | "use" | "call" | "save" | "reset" => {
                self.advance()?;
                let arg = self.parse_paren_name(lower != "use")?;
                Ok(match lower.as_str() {
                    "any" => Element::Any(arg),
                    "notany" => Element::NotAny(arg),
                    "outs" => Element::Outs(arg),
                    "use" => Element::Use(arg),
                    "call" => Element::Call(arg),
                    "save" => Element::Save(arg),
                    _ => Element::Reset(arg),
                })
            }
            "dk" | "deadkey" => {
                self.advance()?;
                Ok(Element::Deadkey(self.parse_paren_name(false)?))
            }
            "index" => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let store = self.parse_store_ref()?;
                self.expect(Token::Comma)?;
                let offset = self.parse_offset()?;
                self.expect(Token::RParen)?;
                Ok(Element::Index { store, offset })
            }
            "set" => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let option = self.parse_store_ref()?;
                self.expect(Token::Equals)?;
                let value = self.parse_string()?;
                self.expect(Token::RParen)?;
                Ok(Element::Set { option, value })
            }
            "if" => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let store = self.parse_store_ref()?;
                let negated = match self.current {
                    Some(Token::Equals) => false,
                    Some(Token::NotEquals) => true,
                    _ => return Err(self.error("expected '=' or '!=' in if()")),
                };
                self.advance()?;
                let value = self.parse_string()?;
                self.expect(Token::RParen)?;
                Ok(Element::If { store, negated, value })
            }
            "platform" | "baselayout" | "layer" => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let value = self.parse_string()?;
                self.expect(Token::RParen)?;
                Ok(match lower.as_str() {
                    "platform" => Element::Platform(value),
                    "baselayout" => Element::BaseLayout(value),
                    _ => Element::Layer(value),
                })
            }
            _ => Err(self.error(format!("unexpected identifier '{}'", name))),
        }
    }

    fn parse_key_pattern(&mut self) -> Result<KeyPattern, KmnError> {
        let token = self.current.clone();
        match token {
            Some(Token::LBracket) => Ok(KeyPattern::Key(self.parse_key_bracket()?)),
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case("any") => {
                self.advance()?;
                Ok(KeyPattern::AnyStore(self.parse_paren_name(true)?))
            }
            Some(Token::String(_)) | Some(Token::CodePoint(_)) | Some(Token::Ident(_)) => {
                let c = self.parse_single_char()?;
                Ok(KeyPattern::Key(char_key(c, ModifierSet::NONE)))
            }
            other => Err(self.error(format!("expected a key after '+', found {}", describe(&other)))),
        }
    }

    fn parse_key_bracket(&mut self) -> Result<KeySpec, KmnError> {
        self.expect(Token::LBracket)?;

        let mut items: Vec<(Token, Position)> = Vec::new();
        while self.current != Some(Token::RBracket) {
            match &self.current {
                None | Some(Token::Newline) => {
                    return Err(self.error("unterminated key expression, expected ']'"));
                }
                Some(token) => items.push((token.clone(), self.lexer.position())),
            }
            self.advance()?;
        }
        let close = self.lexer.position();
        self.advance()?;

        let (key_token, key_position) = items
            .pop()
            .ok_or_else(|| self.lexer.error_at(close, "empty key expression"))?;

        let mut modifiers = ModifierSet::NONE;
        for (token, position) in &items {
            let applied = match token {
                Token::Ident(m) => modifiers.apply_kmn_token(m),
                _ => false,
            };
            if !applied {
                return Err(self.lexer.error_at(
                    *position,
                    format!("unrecognized modifier token '{}'", token_text(token)),
                ));
            }
        }

        match &key_token {
            Token::Ident(id) => match normalize_key_id(id) {
                Some(key) => Ok(KeySpec::new(modifiers, key)),
                None => Err(self
                    .lexer
                    .error_at(key_position, format!("'{}' is not a key name", id))),
            },
            Token::String(s) if s.chars().count() == 1 => {
                let c = s.chars().next().unwrap_or_default();
                Ok(char_key(c, modifiers))
            }
            Token::CodePoint(cp) => {
                let c = cp
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.lexer.error_at(key_position, "invalid Unicode code point"))?;
                Ok(char_key(c, modifiers))
            }
            other => Err(self.lexer.error_at(
                key_position,
                format!("'{}' is not a key name", token_text(other)),
            )),
        }
    }

    fn parse_raw_name(&mut self) -> Result<(String, bool), KmnError> {
        let ampersand = self.current == Some(Token::Ampersand);
        if ampersand {
            self.advance()?;
        }
        let name = match &self.current {
            Some(Token::Ident(n)) => n.clone(),
            Some(Token::Number(Some(n))) => n.to_string(),
            other => return Err(self.error(format!("expected a name, found {}", describe(other)))),
        };
        self.advance()?;
        Ok((name, ampersand))
    }

    /// A store reference; System Store names are canonicalised.
    fn parse_store_ref(&mut self) -> Result<String, KmnError> {
        let (name, _) = self.parse_raw_name()?;
        Ok(match system_store_name(&name) {
            Some(canonical) => canonical.to_string(),
            None => name,
        })
    }

    fn parse_paren_name(&mut self, store_ref: bool) -> Result<String, KmnError> {
        self.expect(Token::LParen)?;
        let name = if store_ref {
            self.parse_store_ref()?
        } else {
            self.parse_raw_name()?.0
        };
        self.expect(Token::RParen)?;
        Ok(name)
    }

    fn parse_string(&mut self) -> Result<String, KmnError> {
        match &self.current {
            Some(Token::String(s)) => {
                let s = s.clone();
                self.advance()?;
                Ok(s)
            }
            other => Err(self.error(format!("expected a string, found {}", describe(other)))),
        }
    }

    fn parse_offset(&mut self) -> Result<usize, KmnError> {
        match self.current {
            Some(Token::Number(Some(n))) if n > 0 => {
                self.advance()?;
                Ok(n)
            }
            _ => Err(self.error("expected a positive offset")),
        }
    }

    fn code_point(&self, cp: Option<u32>) -> Result<char, KmnError> {
        cp.and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid Unicode code point"))
    }

    /// `d65` and `x41` character literals.
    fn numeric_char(&self, name: &str) -> Result<Option<char>, KmnError> {
        let Some(first) = name.chars().next() else {
            return Ok(None);
        };
        let rest = &name[first.len_utf8()..];
        let radix = match first {
            'd' | 'D' if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) => 10,
            'x' | 'X' if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit()) => 16,
            _ => return Ok(None),
        };
        u32::from_str_radix(rest, radix)
            .ok()
            .and_then(char::from_u32)
            .map(Some)
            .ok_or_else(|| self.error(format!("'{}' is not a valid character", name)))
    }
}

fn current_group(doc: &mut KmnDocument, line: usize) -> &mut Group {
    if doc.groups.is_empty() {
        doc.groups.push(Group::new("main", true, line));
    }
    let index = doc.groups.len() - 1;
    &mut doc.groups[index]
}

fn mark_store_kinds(doc: &mut KmnDocument) {
    let mut options = Vec::new();
    let mut calls = Vec::new();

    for group in &doc.groups {
        let elements = group
            .rules
            .iter()
            .flat_map(|r| r.context.iter().chain(r.output.iter()))
            .chain(group.match_output.iter().flatten())
            .chain(group.nomatch_output.iter().flatten());
        for element in elements {
            match element {
                Element::If { store, .. } | Element::Save(store) | Element::Reset(store) => {
                    options.push(store.clone())
                }
                Element::Set { option, .. } => options.push(option.clone()),
                Element::Call(store) => calls.push(store.clone()),
                _ => {}
            }
        }
    }

    for store in &mut doc.stores {
        if options.contains(&store.name) {
            store.kind.option = true;
        }
        if calls.contains(&store.name) {
            store.kind.call = true;
        }
    }
}

/// Canonical key id: `K_` and `U_` ids are upper-cased, `T_` ids keep their body.
pub fn normalize_key_id(id: &str) -> Option<String> {
    let upper = id.to_ascii_uppercase();
    if upper.starts_with("K_") || upper.starts_with("U_") {
        Some(upper)
    } else if upper.starts_with("T_") && id.len() > 2 {
        Some(format!("T_{}", &id[2..]))
    } else {
        None
    }
}

/// Key typed by `c`: its US position when it has one, a `U_XXXX` key otherwise.
pub fn char_key(c: char, mut modifiers: ModifierSet) -> KeySpec {
    match us_key_for_char(c) {
        Some((vkey, shifted)) => {
            modifiers.shift |= shifted;
            KeySpec::new(modifiers, vkey)
        }
        None => KeySpec::new(modifiers, format!("U_{:04X}", c as u32)),
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Ident(name) => name.clone(),
        Token::String(s) => format!("'{}'", s),
        other => format!("{:?}", other),
    }
}

fn describe(token: &Option<Token>) -> String {
    match token {
        Some(Token::Newline) => "end of line".to_string(),
        Some(token) => token_text(token),
        None => "end of file".to_string(),
    }
}
