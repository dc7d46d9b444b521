use kmn2ldml::{convert_ldml_to_kmn, KmnError};

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<keyboard3 xmlns="https://schemas.unicode.org/cldr/45/keyboard3" locale="en" conformsTo="45">
  <info name="Reader Test" author="Someone"/>
  <keys>
    <key id="K_A" output="a"/>
    <key id="K_B" output="b"/>
  </keys>
  <layers formId="us">
    <layer modifiers="none">
      <row keys="K_A K_B"/>
    </layer>
  </layers>
"#;

fn document(body: &str) -> String {
    format!("{}{}</keyboard3>\n", HEADER, body)
}

fn reconstruction_error(xml: &str) -> (String, String) {
    match convert_ldml_to_kmn(xml, None) {
        Ok(output) => panic!("Expected reconstruction to fail, got:\n{}", output.kmn),
        Err(KmnError::Reconstruction { construct, message }) => (construct, message),
        Err(e) => panic!("Expected a reconstruction error, got {:?}", e),
    }
}

#[test]
fn test_plain_keyboard_converts() {
    let output = convert_ldml_to_kmn(&document(""), None).expect("Conversion failed");
    let lines: Vec<&str> = output.kmn.lines().collect();
    assert!(lines.contains(&"store(&NAME) 'Reader Test'"));
    assert!(lines.contains(&"store(&COPYRIGHT) 'Someone'"));
    assert!(lines.contains(&"+ [K_A] > 'a'"));
    assert!(lines.contains(&"+ [K_B] > 'b'"));
    assert!(output.warnings.is_empty());
}

#[test]
fn test_import_is_rejected() {
    let xml = document(r#"  <import base="cldr" path="45/keys-Latn-implied.xml"/>
"#);
    let (construct, message) = reconstruction_error(&xml);
    assert!(construct.contains("45/keys-Latn-implied.xml"), "Got: {}", construct);
    assert!(message.contains("imported"), "Got: {}", message);
}

#[test]
fn test_unsupported_element_is_rejected() {
    let xml = document(r#"  <displays>
    <display output="a" display="A"/>
  </displays>
"#);
    let (construct, _) = reconstruction_error(&xml);
    assert_eq!(construct, "<displays>");
}

#[test]
fn test_reorder_is_rejected() {
    let xml = document(r#"  <transforms type="simple">
    <transformGroup>
      <reorder from="\u{1031}" order="-1"/>
    </transformGroup>
  </transforms>
"#);
    let (construct, message) = reconstruction_error(&xml);
    assert!(construct.starts_with("<reorder"), "Got: {}", construct);
    assert!(message.contains("reorder"), "Got: {}", message);
}

#[test]
fn test_unicode_set_is_rejected() {
    let xml = document(r#"  <variables>
    <uset id="vowels" value="[aeiou]"/>
  </variables>
"#);
    let (construct, _) = reconstruction_error(&xml);
    assert_eq!(construct, "<uset id=\"vowels\">");
}

#[test]
fn test_any_marker_is_rejected() {
    let xml = document(r#"  <transforms type="simple">
    <transformGroup>
      <transform from="\m{.}a" to="b"/>
    </transformGroup>
  </transforms>
"#);
    reconstruction_error(&xml);
}

#[test]
fn test_set_mapping_becomes_index() {
    let xml = document(r#"  <variables>
    <set id="lower" value="a b"/>
    <set id="upper" value="A B"/>
  </variables>
  <transforms type="simple">
    <transformGroup>
      <transform from="x($[lower])" to="$[1:upper]"/>
    </transformGroup>
  </transforms>
"#);
    let output = convert_ldml_to_kmn(&xml, None).expect("Conversion failed");
    let lines: Vec<&str> = output.kmn.lines().collect();
    assert!(lines.contains(&"store(lower) 'ab'"), "Got:\n{}", output.kmn);
    assert!(lines.contains(&"store(upper) 'AB'"), "Got:\n{}", output.kmn);
    assert!(lines.contains(&"group(transforms1)"), "Got:\n{}", output.kmn);
    assert!(lines.contains(&"'x' any(lower) > index(upper, 2)"), "Got:\n{}", output.kmn);
}

#[test]
fn test_invalid_documents_are_xml_errors() {
    let result = convert_ldml_to_kmn("<keyboard3 locale=\"en\" conformsTo=\"45\"><key output=\"a\"/></keyboard3>", None);
    assert!(matches!(result, Err(KmnError::Xml(_))), "Got: {:?}", result.err());

    let result = convert_ldml_to_kmn("<keyboard locale=\"en\" conformsTo=\"45\"/>", None);
    assert!(matches!(result, Err(KmnError::Xml(_))), "Got: {:?}", result.err());
}
