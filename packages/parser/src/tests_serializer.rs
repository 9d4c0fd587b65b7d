//! Round-trip tests: parse followed by lossless serialization must give the
//! input back byte for byte.
use crate::*;

fn roundtrip(source: &str) {
    let model = parse(source).unwrap_or_else(|e| panic!("Failed to parse {:?}: {}", source, e));
    let serialized = LosslessSerializer::new(source).serialize(&model);
    assert_eq!(serialized, source);
}

#[test]
fn test_roundtrip_minimal() {
    roundtrip("<a/>");
    roundtrip(r#"<a><b x="1"/></a>"#);
}

#[test]
fn test_roundtrip_preserves_whitespace_and_quotes() {
    roundtrip("\n\n<a   x = '1'\n   y=\"2\"  >\n\t<b />\n\n</a>\n\n");
}

#[test]
fn test_roundtrip_prolog_doctype_comments() {
    roundtrip(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE project>\n\
         <!-- licensed -->\n\
         <project>\n  <!-- deps -->\n  <dependencies/>\n</project>\n<!-- trailer -->\n",
    );
}

#[test]
fn test_roundtrip_entities_and_cdata() {
    roundtrip("<a t=\"&lt;&amp;&#x41;\">x &gt; y<![CDATA[ <b> ]]></a>");
}

#[test]
fn test_roundtrip_realistic_descriptor() {
    let source = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>org.acme</groupId>
  <artifactId>widget</artifactId>
  <version>1.0-SNAPSHOT</version>

  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>
"#;
    roundtrip(source);

    let model = parse(source).unwrap();
    let dep = model.find_path(&["dependencies", "dependency"]).unwrap();
    assert_eq!(dep.child_named("scope").and_then(|s| s.text.as_deref()), Some("test"));
}

#[test]
fn test_reparse_of_fresh_serialization_is_structurally_equal() {
    let source = r#"<a k="v"><b>text &amp; more</b><c><d/></c></a>"#;
    let model = parse(source).unwrap();
    let fresh = serialize(&model.root.detached());
    let reparsed = parse(&fresh).unwrap();
    assert_eq!(model, reparsed);
}

#[test]
fn test_model_json_export_skips_text_ranges() {
    let model = parse(r#"<a x="1"><b>t</b></a>"#).unwrap();
    let json = serde_json::to_value(&model).unwrap();

    assert_eq!(json["root"]["name"], "a");
    assert_eq!(json["root"]["attributes"][0]["value"], "1");
    assert_eq!(json["root"]["children"][0]["text"], "t");
    assert!(json["root"].get("span").is_none());
}
