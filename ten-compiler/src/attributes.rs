use pest::Parser;
use pest::iterators::Pair;

use crate::tree::Attributes;

#[derive(pest_derive::Parser)]
#[grammar = "attributes.pest"]
struct AttributeParser;

/// Splits the raw attribute list of an opening tag into lowercased names and
/// entity-decoded values. A repeated name keeps its last value.
pub fn parse_attributes(source: &str) -> Result<Attributes, String> {
    let mut attrs = Attributes::new();
    if source.trim().is_empty() {
        return Ok(attrs);
    }

    let mut pairs =
        AttributeParser::parse(Rule::attributes, source).map_err(|e| e.to_string())?;
    let list = pairs
        .next()
        .ok_or_else(|| "empty attribute list".to_string())?;

    for node in list.into_inner() {
        if node.as_rule() == Rule::attribute {
            let (name, value) = parse_attr(node);
            attrs.insert(name, value);
        }
    }
    Ok(attrs)
}

fn parse_attr(attr: Pair<Rule>) -> (String, String) {
    // attribute = name "=" quoted
    let mut name = String::new();
    let mut value = String::new();

    for part in attr.into_inner() {
        match part.as_rule() {
            Rule::name => name = part.as_str().to_ascii_lowercase(),
            Rule::double_text | Rule::single_text => value = decode_entities(part.as_str()),
            _ => {}
        }
    }
    (name, value)
}

/// Decodes the five predefined XML entities in a single pass, so `&amp;lt;`
/// yields `&lt;`.
pub fn decode_entities(value: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
    ];

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
