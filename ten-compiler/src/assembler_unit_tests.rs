use super::*;
use crate::tree::Attributes;

fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn expand_substitutes_code_attributes_and_context() {
    let t = CodeTemplate::parse("if (/*@test*/) {/*!code*/} // /*!context*/");
    let out = t.expand("X;", &attrs(&[("test", "a > 1")]), "this");
    assert_eq!(out, "if (a > 1) {X;} // this");
}

#[test]
fn missing_attribute_expands_to_nothing() {
    let t = CodeTemplate::parse("f(/*@missing*/)");
    assert_eq!(t.expand("", &Attributes::new(), "this"), "f()");
}

#[test]
fn substituted_text_is_not_rescanned() {
    let t = CodeTemplate::parse("[/*@a*/][/*!code*/]");
    let out = t.expand("/*@a*/", &attrs(&[("a", "/*!code*/")]), "this");
    assert_eq!(out, "[/*!code*/][/*@a*/]");
}

#[test]
fn splice_keeps_order_of_branches() {
    let mut t = CodeTemplate::parse("if (x) {/*!code*/}");
    t.splice_code("A;".to_string());
    t.splice_code("} else if (y) {B;".to_string());
    assert_eq!(
        t.expand("} else {C;", &Attributes::new(), "this"),
        "if (x) {A;} else if (y) {B;} else {C;}"
    );
}

#[test]
fn default_to_context_rewrites_attribute_markers() {
    let mut t = CodeTemplate::parse("if (/*@test*/) {/*!code*/}");
    t.default_to_context("test");
    assert_eq!(t.expand("", &Attributes::new(), "ctx"), "if (ctx) {}");
}

#[test]
fn identity_and_empty_templates() {
    assert_eq!(CodeTemplate::identity().expand("kept", &Attributes::new(), "this"), "kept");
    assert_eq!(CodeTemplate::parse("").expand("dropped", &Attributes::new(), "this"), "");
}

#[test]
fn finish_wraps_body_with_prologue_once() {
    let registry = Registry::standard();
    let config = Config::default();
    let asm = Assembler::new(&config, None);
    let program = asm.finish(&registry, ["template", "include", "data"], "BODY".to_string());
    assert!(program.starts_with("(function (__units, __stream, __parent) {\n"));
    assert!(program.ends_with("return __output;\n})"));
    assert_eq!(program.matches("var __template = Object.create(__parent || null);").count(), 1);
    assert!(program.contains("  var _data = {};\n"));
    assert!(program.contains("  BODY\n"));
}
