//! Serde model of the `.keyman-touch-layout` JSON artifact
//!
//! Hand-edited layouts store numbers as strings (`"width": "120"`), so numeric
//! fields accept both forms on input and are always written as numbers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchLayoutFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablet: Option<TouchLayoutPlatform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<TouchLayoutPlatform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_underlying: Option<bool>,
}

impl TouchLayoutFile {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.tablet.is_none() && self.phone.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchLayoutPlatform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fontsize: Option<String>,
    #[serde(default)]
    pub layer: Vec<TouchLayoutLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_underlying: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TouchLayoutLayer {
    pub id: String,
    #[serde(default)]
    pub row: Vec<TouchLayoutRow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TouchLayoutRow {
    #[serde(default, deserialize_with = "lenient_index")]
    pub id: u32,
    #[serde(default)]
    pub key: Vec<TouchLayoutKey>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TouchLayoutKey {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp: Option<KeySp>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub width: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub pad: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nextlayer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fontsize: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<Vec<TouchLayoutSubKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multitap: Option<Vec<TouchLayoutSubKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flick: Option<TouchLayoutFlick>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TouchLayoutSubKey {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp: Option<KeySp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nextlayer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fontsize: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

impl TouchLayoutSubKey {
    pub fn is_default(&self) -> bool {
        self.default.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TouchLayoutFlick {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub se: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<TouchLayoutSubKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nw: Option<TouchLayoutSubKey>,
}

/// Flick directions in clockwise order starting north.
pub const FLICK_DIRECTIONS: [&str; 8] = ["n", "ne", "e", "se", "s", "sw", "w", "nw"];

impl TouchLayoutFlick {
    pub fn get(&self, direction: &str) -> Option<&TouchLayoutSubKey> {
        match direction {
            "n" => self.n.as_ref(),
            "ne" => self.ne.as_ref(),
            "e" => self.e.as_ref(),
            "se" => self.se.as_ref(),
            "s" => self.s.as_ref(),
            "sw" => self.sw.as_ref(),
            "w" => self.w.as_ref(),
            "nw" => self.nw.as_ref(),
            _ => None,
        }
    }

    /// Sets the subkey for `direction`. Returns `false` for an unknown direction.
    pub fn set(&mut self, direction: &str, subkey: TouchLayoutSubKey) -> bool {
        let slot = match direction {
            "n" => &mut self.n,
            "ne" => &mut self.ne,
            "e" => &mut self.e,
            "se" => &mut self.se,
            "s" => &mut self.s,
            "sw" => &mut self.sw,
            "w" => &mut self.w,
            "nw" => &mut self.nw,
            _ => return false,
        };
        *slot = Some(subkey);
        true
    }

    pub fn is_empty(&self) -> bool {
        FLICK_DIRECTIONS.iter().all(|d| self.get(d).is_none())
    }
}

/// Visual style of a touch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "u8")]
pub enum KeySp {
    Normal,
    Special,
    SpecialActive,
    CustomSpecial,
    CustomSpecialActive,
    Deadkey,
    Blank,
    Spacer,
}

impl KeySp {
    /// Blank and spacer keys occupy room without producing output.
    pub fn is_gap(&self) -> bool {
        matches!(self, KeySp::Blank | KeySp::Spacer)
    }
}

impl From<KeySp> for u8 {
    fn from(sp: KeySp) -> u8 {
        match sp {
            KeySp::Normal => 0,
            KeySp::Special => 1,
            KeySp::SpecialActive => 2,
            KeySp::CustomSpecial => 3,
            KeySp::CustomSpecialActive => 4,
            KeySp::Deadkey => 8,
            KeySp::Blank => 9,
            KeySp::Spacer => 10,
        }
    }
}

impl TryFrom<u8> for KeySp {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeySp::Normal),
            1 => Ok(KeySp::Special),
            2 => Ok(KeySp::SpecialActive),
            3 => Ok(KeySp::CustomSpecial),
            4 => Ok(KeySp::CustomSpecialActive),
            8 => Ok(KeySp::Deadkey),
            9 => Ok(KeySp::Blank),
            10 => Ok(KeySp::Spacer),
            other => Err(format!("invalid key sp value {}", other)),
        }
    }
}

impl TryFrom<Value> for KeySp {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let number = value_as_f64(&value).ok_or_else(|| format!("invalid key sp value {}", value))?;
        if number < 0.0 || number > u8::MAX as f64 || number.fract() != 0.0 {
            return Err(format!("invalid key sp value {}", value));
        }
        KeySp::try_from(number as u8)
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => value_as_f64(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a number, found {}", v))),
    }
}

fn lenient_index<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.map(|n| n as u32).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_numbers() {
        let json = r#"{"id":"2","key":[{"id":"K_A","width":"120","sp":"1"},{"id":"K_B","sp":10}]}"#;
        let row: TouchLayoutRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.id, 2);
        assert_eq!(row.key[0].width, Some(120.0));
        assert_eq!(row.key[0].sp, Some(KeySp::Special));
        assert_eq!(row.key[1].sp, Some(KeySp::Spacer));
        assert!(row.key[1].sp.unwrap().is_gap());
    }

    #[test]
    fn test_sp_serialises_as_number() {
        let key = TouchLayoutKey {
            id: "K_BKSP".to_string(),
            sp: Some(KeySp::Special),
            ..Default::default()
        };
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"id":"K_BKSP","sp":1}"#);
    }

    #[test]
    fn test_invalid_sp_is_rejected() {
        let result: std::result::Result<TouchLayoutKey, _> =
            serde_json::from_str(r#"{"id":"K_A","sp":7}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_flick_directions() {
        let mut flick = TouchLayoutFlick::default();
        assert!(flick.is_empty());
        assert!(flick.set("ne", TouchLayoutSubKey { id: "U_0061".into(), ..Default::default() }));
        assert!(!flick.set("up", TouchLayoutSubKey::default()));
        assert_eq!(flick.get("ne").map(|k| k.id.as_str()), Some("U_0061"));
    }
}
