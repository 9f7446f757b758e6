//! The standard tag set.
//!
//! Scope-opening templates flush pending text on entry and on exit, so text
//! written inside a nested function or loop body reaches the sink in
//! document order.

use serde_json::Value;

use crate::assembler::{Assembler, CODE_MARKER, CONTEXT_MARKER, CodeTemplate};
use crate::escape::{Escape, Format, string_lit};
use crate::flush;
use crate::registry::{HookContext, Registry, TagDefinition, TagError};
use crate::tree::Node;

/// Tag wrapping a whole unit.
pub const ROOT_TAG: &str = "root";
/// Tag an `&ns.name;` entity stands for.
pub const INLINE_TAG: &str = "echo";

/// Left on an `if`/`unless` node once its `else` branch is open.
const ELSE_MARK: &str = "else";

const FLUSH: &str = flush!();

pub fn register_standard(registry: &mut Registry) {
    registry
        .register(ROOT_TAG, RootTag)
        .register("if", ConditionalTag { negate: false })
        .register("unless", ConditionalTag { negate: true })
        .register("else", ElseTag)
        .register("each", EachTag)
        .register("data", DataTag)
        .register("context", ContextTag)
        .register(INLINE_TAG, EchoTag)
        .register("template", TemplateTag)
        .register("include", IncludeTag)
        .register("comment", CommentTag);
}

/// `FLUSH body FLUSH`
fn scoped(body: &str) -> CodeTemplate {
    CodeTemplate::parse(&format!("{FLUSH}{body}{FLUSH}"))
}

fn required<'n>(node: &'n Node, attribute: &'static str) -> Result<&'n str, TagError> {
    match node.attr(attribute) {
        None => Err(TagError::MissingAttribute(attribute)),
        Some(value) if value.trim().is_empty() => Err(TagError::EmptyAttribute(attribute)),
        Some(value) => Ok(value),
    }
}

/// Subroutine table of the unit, chained to the includer's table.
fn template_table(_asm: &Assembler<'_>) -> Option<String> {
    Some("var __template = Object.create(__parent || null);".to_string())
}

pub struct RootTag;

impl TagDefinition for RootTag {
    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        if cx.node.has_attr("context") {
            cx.node.template =
                CodeTemplate::parse("(function () {/*!code*/}).call(/*@context*/);");
        }
        Ok(())
    }
}

/// `if` and `unless`. Without `test` the current context is tested.
pub struct ConditionalTag {
    negate: bool,
}

impl TagDefinition for ConditionalTag {
    fn template(&self) -> &str {
        if self.negate {
            "if (!(/*@test*/)) {/*!code*/}"
        } else {
            "if (/*@test*/) {/*!code*/}"
        }
    }

    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        if !cx.node.has_attr("test") {
            cx.node.template.default_to_context("test");
        }
        Ok(())
    }
}

/// Self-closing `else` inside `if`/`unless`. With `if="..."` or
/// `unless="..."` it opens an else-if branch; any number of those may
/// precede the single plain `else`.
pub struct ElseTag;

impl TagDefinition for ElseTag {
    fn template(&self) -> &str {
        "} else {"
    }

    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        let Some(parent) = cx
            .parent
            .as_deref_mut()
            .filter(|p| matches!(p.name(), "if" | "unless"))
        else {
            return Err(TagError::MisplacedElse);
        };
        if parent.is_marked(ELSE_MARK) {
            return Err(TagError::DuplicateElse(parent.name().to_string()));
        }
        if !cx.node.is_empty {
            return Err(TagError::ElseNotEmpty);
        }
        if cx.node.has_attr("if") && cx.node.has_attr("unless") {
            return Err(TagError::Exclusive("if", "unless"));
        }

        // code gathered so far belongs to the first branch
        let code = std::mem::take(&mut parent.code);
        parent.template.splice_code(code);

        if cx.node.has_attr("if") {
            cx.node.template = CodeTemplate::parse("} else if (/*@if*/) {");
        } else if cx.node.has_attr("unless") {
            cx.node.template = CodeTemplate::parse("} else if (!(/*@unless*/)) {");
        } else {
            parent.mark(ELSE_MARK);
        }
        Ok(())
    }
}

/// Iterates an array (`array`) or the own properties of an object
/// (`object`); `item` names a variable bound to the current element.
/// `_index` and `_property` are visible to the body.
pub struct EachTag;

impl TagDefinition for EachTag {
    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        let node = &mut *cx.node;
        if let Some(item) = node.attr("item") {
            if !is_identifier(item) {
                return Err(TagError::InvalidValue {
                    attribute: "item",
                    value: item.to_string(),
                });
            }
        }
        let bind = |element: &str| {
            if node.has_attr("item") {
                format!("var /*@item*/ = {element};")
            } else {
                String::new()
            }
        };
        let body = match (node.has_attr("array"), node.has_attr("object")) {
            (true, true) => return Err(TagError::Exclusive("array", "object")),
            (false, false) => return Err(TagError::MissingEither("array", "object")),
            (true, false) => format!(
                "(function (_array) {{var _length = _array.length;var _index = 0;while (_index < _length) {{{bind}{CODE_MARKER}_index++;}}}}).call({CONTEXT_MARKER}, /*@array*/);",
                bind = bind("_array[_index]"),
            ),
            (false, true) => format!(
                "(function (_object) {{for (var _property in _object) {{if (Object.prototype.hasOwnProperty.call(_object, _property)) {{{bind}{CODE_MARKER}}}}}}}).call({CONTEXT_MARKER}, /*@object*/);",
                bind = bind("_object[_property]"),
            ),
        };
        node.template = scoped(&body);
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Stores a value under `name` in the unit-level `_data` table: either the
/// `value` expression or the text rendered by the children.
pub struct DataTag;

impl TagDefinition for DataTag {
    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        let key = string_lit(required(cx.node, "name")?);
        cx.node.template = if cx.node.has_attr("value") {
            CodeTemplate::parse(&format!("_data[{key}] = (/*@value*/);"))
        } else {
            CodeTemplate::parse(&format!(
                "_data[{key}] = (function () {{var __output = \"\";var __text = \"\";var __hasStream = false;{CODE_MARKER}{FLUSH}return __output;}}).call({CONTEXT_MARKER});"
            ))
        };
        Ok(())
    }

    fn start(&self, _asm: &Assembler<'_>) -> Option<String> {
        Some("var _data = {};".to_string())
    }
}

/// Runs its children with `object` as the current value. Without `object`
/// the children are emitted as they are.
pub struct ContextTag;

impl TagDefinition for ContextTag {
    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        if cx.node.has_attr("object") {
            cx.node.template = scoped("(function () {/*!code*/}).call(/*@object*/);");
        }
        Ok(())
    }
}

/// Writes `data` (default, also for a blank value: the current value)
/// converted by `format` and optionally escaped. Literal JSON scalars are
/// converted while compiling.
pub struct EchoTag;

impl TagDefinition for EchoTag {
    fn inline(&self) -> bool {
        true
    }

    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        let node = &mut *cx.node;
        let format = match node.attr("format") {
            None => Format::Text,
            Some(value) => value.parse().map_err(|()| TagError::InvalidValue {
                attribute: "format",
                value: value.to_string(),
            })?,
        };
        let escape = match node.attr("escape") {
            None => None,
            Some(value) => Some(value.parse::<Escape>().map_err(|()| TagError::InvalidValue {
                attribute: "escape",
                value: value.to_string(),
            })?),
        };

        // a blank `data` reads the current value, like a missing one
        let data = node.attr("data").filter(|data| !data.trim().is_empty());
        let folded = data
            .and_then(|data| serde_json::from_str::<Value>(data.trim()).ok())
            .and_then(|value| format.apply(&value));
        if let Some(text) = folded {
            let text = match escape {
                Some(escape) => escape.apply(&text),
                None => text,
            };
            node.template = CodeTemplate::parse(&format!("__text += {};", string_lit(&text)));
            return Ok(());
        }

        let data = if data.is_some() {
            "(/*@data*/)"
        } else {
            CONTEXT_MARKER
        };
        let mut expr = format.wrap(data);
        if let Some(escape) = escape {
            expr = escape.wrap(&expr);
        }
        node.template = CodeTemplate::parse(&format!("__text += {expr};"));
        Ok(())
    }
}

/// Defines a named subroutine callable through `include name="..."`.
pub struct TemplateTag;

impl TagDefinition for TemplateTag {
    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        let key = string_lit(required(cx.node, "name")?);
        cx.node.template = CodeTemplate::parse(&format!(
            "__template[{key}] = function (__stream) {{var __output = \"\";var __text = \"\";var __hasStream = __stream != null && typeof __stream.write === \"function\";{CODE_MARKER}{FLUSH}return __output;}};"
        ));
        Ok(())
    }

    fn start(&self, asm: &Assembler<'_>) -> Option<String> {
        template_table(asm)
    }
}

/// Calls a named template (`name`) or another unit (`src`, resolved against
/// the including unit). Children are ignored.
pub struct IncludeTag;

impl TagDefinition for IncludeTag {
    fn parse(&self, cx: &mut HookContext<'_>) -> Result<(), TagError> {
        let src = cx.node.attr("src").map(str::to_string);
        let name = cx.node.attr("name").map(str::to_string);
        let call = match (src, name) {
            (Some(_), Some(_)) => return Err(TagError::Exclusive("name", "src")),
            (None, None) => return Err(TagError::MissingEither("name", "src")),
            (Some(src), None) => {
                let id = cx.includes.include(&src, cx.unit)?;
                format!(
                    "__output += __units[{}].call({CONTEXT_MARKER}, __units, __hasStream ? __stream : null, __template);",
                    string_lit(&id)
                )
            }
            (None, Some(name)) => format!(
                "__output += __template[{}].call({CONTEXT_MARKER}, __hasStream ? __stream : null);",
                string_lit(&name)
            ),
        };
        cx.node.template = CodeTemplate::parse(&format!("{FLUSH}{call}"));
        Ok(())
    }

    fn start(&self, asm: &Assembler<'_>) -> Option<String> {
        template_table(asm)
    }
}

/// Compiles its children for diagnostics and drops the result.
pub struct CommentTag;

impl TagDefinition for CommentTag {
    fn template(&self) -> &str {
        ""
    }
}
