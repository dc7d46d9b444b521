use kmn_ldml_core::virtual_keys::HardwareForm;
use kmn_ldml_core::{KmnError, Result, TouchLayoutFile};

/// LDML versions the generator can target.
pub const SUPPORTED_CONFORMS_TO: [&str; 2] = ["45", "46"];

/// Options that identify the generated LDML document.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub keyboard_id: String,
    pub locale: String,
    pub conforms_to: String,
    pub hardware_form: HardwareForm,
    pub touch_layout: Option<TouchLayoutFile>,
}

impl CompilerOptions {
    pub fn builder() -> CompilerOptionsBuilder {
        CompilerOptionsBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyboard_id.trim().is_empty() {
            return Err(KmnError::Configuration("keyboard id is missing".to_string()));
        }
        if self.locale.trim().is_empty() {
            return Err(KmnError::Configuration("locale is missing".to_string()));
        }
        if self.conforms_to.trim().is_empty() {
            return Err(KmnError::Configuration("conformsTo is missing".to_string()));
        }
        if !SUPPORTED_CONFORMS_TO.contains(&self.conforms_to.as_str()) {
            return Err(KmnError::Configuration(format!(
                "unsupported conformsTo '{}', expected one of {}",
                self.conforms_to,
                SUPPORTED_CONFORMS_TO.join(", ")
            )));
        }
        if !is_bcp47_shaped(&self.locale) {
            return Err(KmnError::Configuration(format!(
                "locale '{}' is not a BCP 47 tag",
                self.locale
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CompilerOptionsBuilder {
    options: CompilerOptions,
}

impl CompilerOptionsBuilder {
    pub fn keyboard_id(mut self, id: impl Into<String>) -> Self {
        self.options.keyboard_id = id.into();
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.options.locale = locale.into();
        self
    }

    pub fn conforms_to(mut self, version: impl Into<String>) -> Self {
        self.options.conforms_to = version.into();
        self
    }

    pub fn hardware_form(mut self, form: HardwareForm) -> Self {
        self.options.hardware_form = form;
        self
    }

    pub fn touch_layout(mut self, layout: TouchLayoutFile) -> Self {
        self.options.touch_layout = Some(layout);
        self
    }

    /// Validates and returns the options.
    pub fn build(self) -> Result<CompilerOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

// Primary language subtag of 2-8 letters followed by alphanumeric subtags.
fn is_bcp47_shaped(locale: &str) -> bool {
    let mut subtags = locale.split('-');
    let primary_ok = subtags
        .next()
        .is_some_and(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()));
    primary_ok
        && subtags.all(|s| (1..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Primary language subtag of a locale, lower-cased.
pub fn primary_language(locale: &str) -> String {
    locale.split('-').next().unwrap_or_default().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CompilerOptionsBuilder {
        CompilerOptions::builder()
            .keyboard_id("basic")
            .locale("en-US")
            .conforms_to("45")
    }

    #[test]
    fn test_valid_options() {
        let options = valid().build().unwrap();
        assert_eq!(options.hardware_form, HardwareForm::Us);
        assert!(options.touch_layout.is_none());
    }

    #[test]
    fn test_missing_values_fail() {
        assert!(matches!(
            valid().keyboard_id("").build(),
            Err(KmnError::Configuration(_))
        ));
        assert!(matches!(valid().locale(" ").build(), Err(KmnError::Configuration(_))));
        assert!(matches!(valid().conforms_to("").build(), Err(KmnError::Configuration(_))));
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(matches!(valid().conforms_to("44").build(), Err(KmnError::Configuration(_))));
        assert!(matches!(valid().locale("en_US").build(), Err(KmnError::Configuration(_))));
        assert!(matches!(valid().locale("e").build(), Err(KmnError::Configuration(_))));
    }

    #[test]
    fn test_locale_shapes() {
        assert!(is_bcp47_shaped("my"));
        assert!(is_bcp47_shaped("sr-Latn-RS"));
        assert!(is_bcp47_shaped("es-419"));
        assert!(!is_bcp47_shaped("en--US"));
        assert_eq!(primary_language("KHB-Talu"), "khb");
    }
}
