pub mod lexer;
pub mod parser;
pub mod touch;
pub mod ldml;
pub mod kmn;

pub use kmn_ldml_core::*;

pub use kmn::{KmnGenerator, KmnOutput};
pub use ldml::{CompilerOptions, LdmlGenerator, LdmlOutput};
pub use parser::KmnDocument;

use std::fs::read_to_string;
use std::path::Path;

/// Parses KMN source text.
pub fn parse_kmn(source: &str, path: &str) -> Result<KmnDocument> {
    parser::Parser::new(source, path).parse()
}

/// Compiles KMN source text to an LDML keyboard and touch layout.
pub fn compile_kmn_to_ldml(source: &str, path: &str, options: &CompilerOptions) -> Result<LdmlOutput> {
    let doc = parse_kmn(source, path)?;
    LdmlGenerator::new(&doc, options).generate()
}

pub fn convert_kmn_file(input_path: &Path, options: &CompilerOptions) -> Result<LdmlOutput> {
    let source = read_to_string(input_path)?;
    compile_kmn_to_ldml(&source, &input_path.display().to_string(), options)
}

/// Reconstructs KMN source from LDML XML.
pub fn convert_ldml_to_kmn(xml: &str, keyboard_id: Option<&str>) -> Result<KmnOutput> {
    let keyboard = ldml::read_keyboard(xml)?;
    let mut generator = KmnGenerator::new(&keyboard);
    if let Some(id) = keyboard_id {
        generator = generator.keyboard_id(id);
    }
    generator.generate()
}

pub fn convert_ldml_file(input_path: &Path) -> Result<KmnOutput> {
    let xml = read_to_string(input_path)?;
    let keyboard_id = input_path.file_stem().map(|s| s.to_string_lossy().into_owned());
    convert_ldml_to_kmn(&xml, keyboard_id.as_deref())
}
