/// Store names the KMN compiler reserves for keyboard metadata.
///
/// Additions are a compatible extension; removing a name changes how existing
/// sources are classified.
pub const SYSTEM_STORES: [&str; 26] = [
    "NAME",
    "VERSION",
    "COPYRIGHT",
    "MESSAGE",
    "BITMAP",
    "HOTKEY",
    "LANGUAGE",
    "LAYOUT",
    "TARGETS",
    "VISUALKEYBOARD",
    "LAYOUTFILE",
    "KEYBOARDVERSION",
    "KMW_RTL",
    "KMW_HELPFILE",
    "KMW_HELPTEXT",
    "KMW_EMBEDJS",
    "KMW_EMBEDCSS",
    "WINDOWSLANGUAGES",
    "ETHNOLOGUECODE",
    "MNEMONICLAYOUT",
    "CASEDKEYS",
    "AUTHOR",
    "CAPSONONLY",
    "CAPSALWAYSOFF",
    "SHIFTFREESCAPS",
    "INCLUDECODES",
];

/// Canonical upper-case name when `name` (with or without a leading `&`) is a
/// System Store.
pub fn system_store_name(name: &str) -> Option<&'static str> {
    let bare = name.strip_prefix('&').unwrap_or(name);
    SYSTEM_STORES
        .iter()
        .copied()
        .find(|s| s.eq_ignore_ascii_case(bare))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_store_lookup() {
        assert_eq!(system_store_name("&name"), Some("NAME"));
        assert_eq!(system_store_name("KMW_RTL"), Some("KMW_RTL"));
        assert_eq!(system_store_name("&MnemonicLayout"), Some("MNEMONICLAYOUT"));
        assert_eq!(system_store_name("vowels"), None);
        assert_eq!(system_store_name("&platform"), None);
    }
}
