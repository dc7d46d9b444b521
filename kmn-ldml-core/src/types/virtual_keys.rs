use std::fmt;
use std::str::FromStr;

/// Physical keyboard form an LDML hardware layer set is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareForm {
    #[default]
    Us,
    Iso,
    Jis,
    Abnt2,
    Ks,
}

impl HardwareForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareForm::Us => "us",
            HardwareForm::Iso => "iso",
            HardwareForm::Jis => "jis",
            HardwareForm::Abnt2 => "abnt2",
            HardwareForm::Ks => "ks",
        }
    }
}

impl fmt::Display for HardwareForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareForm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(HardwareForm::Us),
            "iso" => Ok(HardwareForm::Iso),
            "jis" => Ok(HardwareForm::Jis),
            "abnt2" => Ok(HardwareForm::Abnt2),
            "ks" => Ok(HardwareForm::Ks),
            other => Err(format!("unknown hardware form '{}'", other)),
        }
    }
}

/// Positional keys of the US layout, row by row, as KMN virtual key names.
pub const HARDWARE_ROWS: [&[&str]; 5] = [
    &[
        "K_BKQUOTE", "K_1", "K_2", "K_3", "K_4", "K_5", "K_6", "K_7", "K_8", "K_9", "K_0",
        "K_HYPHEN", "K_EQUAL",
    ],
    &[
        "K_Q", "K_W", "K_E", "K_R", "K_T", "K_Y", "K_U", "K_I", "K_O", "K_P", "K_LBRKT",
        "K_RBRKT", "K_BKSLASH",
    ],
    &[
        "K_A", "K_S", "K_D", "K_F", "K_G", "K_H", "K_J", "K_K", "K_L", "K_COLON", "K_QUOTE",
    ],
    &[
        "K_Z", "K_X", "K_C", "K_V", "K_B", "K_N", "K_M", "K_COMMA", "K_PERIOD", "K_SLASH",
    ],
    &["K_SPACE"],
];

// Non-positional virtual keys KMN rules may legitimately name.
const OTHER_KEYS: &[&str] = &[
    "K_BKSP", "K_TAB", "K_ENTER", "K_ESC", "K_SHIFT", "K_CONTROL", "K_ALT", "K_CAPS",
    "K_NUMLOCK", "K_SCROLL", "K_PAUSE", "K_INS", "K_DEL", "K_HOME", "K_END", "K_PGUP",
    "K_PGDN", "K_LEFT", "K_RIGHT", "K_UP", "K_DOWN", "K_LSHIFT", "K_RSHIFT", "K_LCONTROL",
    "K_RCONTROL", "K_LALT", "K_RALT", "K_oE2", "K_LOPT", "K_ROPT", "K_NP0", "K_NP1", "K_NP2",
    "K_NP3", "K_NP4", "K_NP5", "K_NP6", "K_NP7", "K_NP8", "K_NP9", "K_NPSTAR", "K_NPPLUS",
    "K_NPMINUS", "K_NPDOT", "K_NPSLASH", "K_F1", "K_F2", "K_F3", "K_F4", "K_F5", "K_F6",
    "K_F7", "K_F8", "K_F9", "K_F10", "K_F11", "K_F12",
];

// Characters produced by the US layout: (char, virtual key, needs shift).
const US_CHARS: &[(char, &str, bool)] = &[
    ('`', "K_BKQUOTE", false), ('~', "K_BKQUOTE", true),
    ('1', "K_1", false), ('!', "K_1", true),
    ('2', "K_2", false), ('@', "K_2", true),
    ('3', "K_3", false), ('#', "K_3", true),
    ('4', "K_4", false), ('$', "K_4", true),
    ('5', "K_5", false), ('%', "K_5", true),
    ('6', "K_6", false), ('^', "K_6", true),
    ('7', "K_7", false), ('&', "K_7", true),
    ('8', "K_8", false), ('*', "K_8", true),
    ('9', "K_9", false), ('(', "K_9", true),
    ('0', "K_0", false), (')', "K_0", true),
    ('-', "K_HYPHEN", false), ('_', "K_HYPHEN", true),
    ('=', "K_EQUAL", false), ('+', "K_EQUAL", true),
    ('[', "K_LBRKT", false), ('{', "K_LBRKT", true),
    (']', "K_RBRKT", false), ('}', "K_RBRKT", true),
    ('\\', "K_BKSLASH", false), ('|', "K_BKSLASH", true),
    (';', "K_COLON", false), (':', "K_COLON", true),
    ('\'', "K_QUOTE", false), ('"', "K_QUOTE", true),
    (',', "K_COMMA", false), ('<', "K_COMMA", true),
    ('.', "K_PERIOD", false), ('>', "K_PERIOD", true),
    ('/', "K_SLASH", false), ('?', "K_SLASH", true),
    (' ', "K_SPACE", false),
];

/// Virtual key and shift state that type `c` on a US keyboard.
///
/// Used to resolve KMN character keys such as `+ 'a'` to a positional key.
pub fn us_key_for_char(c: char) -> Option<(&'static str, bool)> {
    if c.is_ascii_alphabetic() {
        let upper = c.to_ascii_uppercase();
        let rows: &'static [&'static [&'static str]] = &HARDWARE_ROWS;
        let vkey = rows[1..4]
            .iter()
            .flat_map(|row| row.iter().copied())
            .find(|k| k.len() == 3 && k.ends_with(upper))?;
        return Some((vkey, c.is_ascii_uppercase()));
    }
    US_CHARS
        .iter()
        .find(|(ch, _, _)| *ch == c)
        .map(|(_, vkey, shifted)| (*vkey, *shifted))
}

/// Row and column of a positional key on the hardware form.
pub fn hardware_position(vkey: &str) -> Option<(usize, usize)> {
    HARDWARE_ROWS.iter().enumerate().find_map(|(row, keys)| {
        keys.iter()
            .position(|k| k.eq_ignore_ascii_case(vkey))
            .map(|col| (row, col))
    })
}

/// Whether `id` names a KMN virtual key, positional or not.
pub fn is_virtual_key(id: &str) -> bool {
    hardware_position(id).is_some() || OTHER_KEYS.iter().any(|k| k.eq_ignore_ascii_case(id))
}

/// Whether `id` is a base key id a KMN rule can name directly in a bracket
/// expression: a virtual key, a touch-only `T_` key or a `U_XXXX` character key.
pub fn is_base_key_id(id: &str) -> bool {
    if is_virtual_key(id) {
        return true;
    }
    if let Some(rest) = id.strip_prefix("T_") {
        return !rest.is_empty();
    }
    if let Some(hex) = id.strip_prefix("U_") {
        return hex.len() >= 4 && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    false
}
