//! Modifier sets shared by KMN bracket expressions and LDML layers

/// The modifier context of a key rule or an LDML layer.
///
/// Each KMN modifier token maps to exactly one LDML token, except `NCAPS` which
/// LDML cannot express:
///
/// | KMN     | LDML    |
/// |---------|---------|
/// | `SHIFT` | `shift` |
/// | `CTRL`  | `ctrl`  |
/// | `LCTRL` | `ctrlL` |
/// | `RCTRL` | `ctrlR` |
/// | `ALT`   | `alt`   |
/// | `LALT`  | `altL`  |
/// | `RALT`  | `altR`  |
/// | `CAPS`  | `caps`  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ModifierSet {
    pub shift: bool,
    pub ctrl: bool,
    pub lctrl: bool,
    pub rctrl: bool,
    pub alt: bool,
    pub lalt: bool,
    pub ralt: bool,
    pub caps: bool,
    pub ncaps: bool,
}

impl ModifierSet {
    pub const NONE: ModifierSet = ModifierSet {
        shift: false,
        ctrl: false,
        lctrl: false,
        rctrl: false,
        alt: false,
        lalt: false,
        ralt: false,
        caps: false,
        ncaps: false,
    };

    /// Applies a KMN modifier token such as `SHIFT` or `ralt`.
    ///
    /// Returns `false` when the token is not a modifier, leaving the set untouched.
    pub fn apply_kmn_token(&mut self, token: &str) -> bool {
        match token.to_ascii_uppercase().as_str() {
            "SHIFT" => self.shift = true,
            "CTRL" => self.ctrl = true,
            "LCTRL" => self.lctrl = true,
            "RCTRL" => self.rctrl = true,
            "ALT" => self.alt = true,
            "LALT" => self.lalt = true,
            "RALT" => self.ralt = true,
            "CAPS" => self.caps = true,
            "NCAPS" => self.ncaps = true,
            _ => return false,
        }
        true
    }

    /// Parses an LDML `modifiers` attribute. `none` and the empty string are the
    /// empty set; unknown tokens yield `None`.
    pub fn from_ldml(value: &str) -> Option<Self> {
        let mut set = ModifierSet::NONE;
        for token in value.split_whitespace() {
            if token != "none" && !set.apply_ldml_token(token) {
                return None;
            }
        }
        Some(set)
    }

    fn apply_ldml_token(&mut self, token: &str) -> bool {
        match token {
            "shift" => self.shift = true,
            "ctrl" => self.ctrl = true,
            "ctrlL" => self.lctrl = true,
            "ctrlR" => self.rctrl = true,
            "alt" => self.alt = true,
            "altL" => self.lalt = true,
            "altR" => self.ralt = true,
            "caps" => self.caps = true,
            _ => return false,
        }
        true
    }

    /// Splits a variant key id into its modifier set and base id, the inverse of
    /// [`variant_id`](Self::variant_id). An id without a well-formed suffix is
    /// its own base under the empty set.
    pub fn split_variant_id(id: &str) -> (ModifierSet, &str) {
        let mut set = ModifierSet::NONE;
        let mut base = id;
        while let Some((rest, token)) = base.rsplit_once('_') {
            if rest.is_empty() || !set.apply_ldml_token(token) {
                break;
            }
            base = rest;
        }
        if set.variant_id(base) == id {
            (set, base)
        } else {
            (ModifierSet::NONE, id)
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ModifierSet::NONE
    }

    /// The same set with `NCAPS` removed.
    pub fn without_ncaps(mut self) -> Self {
        self.ncaps = false;
        self
    }

    pub fn ldml_tokens(&self) -> Vec<&'static str> {
        let mut tokens = Vec::new();
        if self.shift {
            tokens.push("shift");
        }
        if self.ctrl {
            tokens.push("ctrl");
        }
        if self.lctrl {
            tokens.push("ctrlL");
        }
        if self.rctrl {
            tokens.push("ctrlR");
        }
        if self.alt {
            tokens.push("alt");
        }
        if self.lalt {
            tokens.push("altL");
        }
        if self.ralt {
            tokens.push("altR");
        }
        if self.caps {
            tokens.push("caps");
        }
        tokens
    }

    pub fn kmn_tokens(&self) -> Vec<&'static str> {
        let mut tokens = Vec::new();
        if self.shift {
            tokens.push("SHIFT");
        }
        if self.ctrl {
            tokens.push("CTRL");
        }
        if self.lctrl {
            tokens.push("LCTRL");
        }
        if self.rctrl {
            tokens.push("RCTRL");
        }
        if self.alt {
            tokens.push("ALT");
        }
        if self.lalt {
            tokens.push("LALT");
        }
        if self.ralt {
            tokens.push("RALT");
        }
        if self.caps {
            tokens.push("CAPS");
        }
        if self.ncaps {
            tokens.push("NCAPS");
        }
        tokens
    }

    /// LDML `modifiers` attribute value, `none` for the empty set.
    pub fn to_ldml(&self) -> String {
        let tokens = self.ldml_tokens();
        if tokens.is_empty() {
            "none".to_string()
        } else {
            tokens.join(" ")
        }
    }

    /// Suffix appended to a base key id to name this modifier variant, e.g.
    /// `shift_altR`. Empty for the unmodified key.
    pub fn variant_suffix(&self) -> String {
        self.ldml_tokens().join("_")
    }

    /// Variant key id for `base` under this modifier set.
    pub fn variant_id(&self, base: &str) -> String {
        let suffix = self.variant_suffix();
        if suffix.is_empty() {
            base.to_string()
        } else {
            format!("{}_{}", base, suffix)
        }
    }

    /// Strips this set's variant suffix from `variant_id`, if present.
    pub fn base_id<'a>(&self, variant_id: &'a str) -> &'a str {
        let suffix = self.variant_suffix();
        if suffix.is_empty() {
            return variant_id;
        }
        variant_id
            .strip_suffix(suffix.as_str())
            .and_then(|rest| rest.strip_suffix('_'))
            .unwrap_or(variant_id)
    }

    /// Whether this set represents a shift (upper-case) layer.
    pub fn is_shift_only(&self) -> bool {
        *self
            == ModifierSet {
                shift: true,
                ..ModifierSet::NONE
            }
    }
}
