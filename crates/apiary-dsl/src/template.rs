// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reply template renderer.
//!
//! Deliberately non-Turing-complete: scalar `{{name}}` substitution and
//! a single level of `{{#each list}}...{{/each}}`, no conditionals, no
//! nesting. Implemented as a two-pass string scanner.
//!
//! Scalar rules: strings insert verbatim, numbers via their display
//! form, booleans as `True`/`False`, missing names as the empty string.
//! Inside an each-block the element's own keys shadow the outer scope.

use apiary_core::ApiaryError;
use serde_json::{Map, Value};

/// Render `template` against `scope`.
///
/// When `empty_text` is given and any iterated list is empty or
/// absent, `empty_text` is returned verbatim without rendering.
pub fn render(
    template: &str,
    scope: &Map<String, Value>,
    empty_text: Option<&str>,
) -> Result<String, ApiaryError> {
    let blocks = scan_blocks(template)?;

    if let Some(empty) = empty_text {
        let some_list_empty = blocks.iter().any(|b| {
            !matches!(scope.get(&b.list), Some(Value::Array(items)) if !items.is_empty())
        });
        if !blocks.is_empty() && some_list_empty {
            return Ok(empty.to_string());
        }
    }

    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for block in &blocks {
        out.push_str(&render_scalars(&template[cursor..block.start], scope, None));
        if let Some(Value::Array(items)) = scope.get(&block.list) {
            for item in items {
                let element = item.as_object();
                out.push_str(&render_scalars(&block.body, scope, element));
            }
        }
        cursor = block.end;
    }
    out.push_str(&render_scalars(&template[cursor..], scope, None));
    Ok(out)
}

/// Substitute only `{{name}}` scalars; used by the i18n resolver for
/// placeholder values.
pub fn render_scalars_only(text: &str, scope: &Map<String, Value>) -> String {
    render_scalars(text, scope, None)
}

/// Remove directive blocks and orphan directive tokens, keeping the
/// rest of the template. Scalars are still substituted so the fallback
/// reply after a `template_error` stays useful.
pub fn strip_directives(template: &str, scope: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    while let Some(open) = template[cursor..].find("{{#") {
        let start = cursor + open;
        out.push_str(&template[cursor..start]);
        // Drop everything up to a matching close tag, or just the open
        // tag when no close exists.
        let rest = &template[start..];
        if let Some(close) = rest.find("{{/") {
            match rest[close..].find("}}") {
                Some(end) => cursor = start + close + end + 2,
                None => cursor = template.len(),
            }
        } else {
            match rest.find("}}") {
                Some(end) => cursor = start + end + 2,
                None => cursor = template.len(),
            }
        }
    }
    out.push_str(&template[cursor..]);
    // Orphan close tags are directives too.
    let out = out.replace("{{/each}}", "");
    render_scalars(&out, scope, None)
}

struct EachBlock {
    /// Byte offset of `{{#`.
    start: usize,
    /// Byte offset just past `{{/each}}`.
    end: usize,
    list: String,
    body: String,
}

/// First pass: locate every directive block, rejecting unknown
/// directives, nesting, and unclosed blocks.
fn scan_blocks(template: &str) -> Result<Vec<EachBlock>, ApiaryError> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(found) = template[cursor..].find("{{#") {
        let start = cursor + found;
        let after_hash = &template[start + 3..];
        let tag_end = after_hash
            .find("}}")
            .ok_or_else(|| ApiaryError::Template("unterminated directive".into()))?;
        let tag = after_hash[..tag_end].trim();

        let Some(list) = tag.strip_prefix("each ") else {
            return Err(ApiaryError::Template(format!(
                "unknown directive {{{{#{}}}}}",
                tag.split_whitespace().next().unwrap_or(tag)
            )));
        };
        let list = list.trim().to_string();

        let body_start = start + 3 + tag_end + 2;
        let close = template[body_start..]
            .find("{{/each}}")
            .ok_or_else(|| ApiaryError::Template(format!("unclosed each over {list}")))?;
        let body = &template[body_start..body_start + close];
        if body.contains("{{#") {
            return Err(ApiaryError::Template("nested each blocks".into()));
        }

        let end = body_start + close + "{{/each}}".len();
        blocks.push(EachBlock {
            start,
            end,
            list,
            body: body.to_string(),
        });
        cursor = end;
    }

    if template[cursor..].contains("{{/each}}") {
        return Err(ApiaryError::Template("each close without open".into()));
    }
    Ok(blocks)
}

/// Second pass: replace `{{name}}` with the scalar found in `element`
/// (when inside an each-block) or the outer scope.
fn render_scalars(
    text: &str,
    scope: &Map<String, Value>,
    element: Option<&Map<String, Value>>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find("{{") {
        let start = cursor + found;
        out.push_str(&text[cursor..start]);
        let Some(close) = text[start + 2..].find("}}") else {
            // Unterminated braces stay literal.
            out.push_str(&text[start..]);
            return out;
        };
        let name = text[start + 2..start + 2 + close].trim();
        let value = element
            .and_then(|e| e.get(name))
            .or_else(|| scope.get(name));
        out.push_str(&scalar_to_string(value));
        cursor = start + 2 + close + 2;
    }
    out.push_str(&text[cursor..]);
    out
}

fn scalar_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        // Missing names, null, and non-scalar values render empty.
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn scalars_substitute_with_python_style_booleans() {
        let s = scope(json!({"name": "Ira", "count": 3, "vip": true, "banned": false}));
        let out = render("{{name}}: {{count}} vip={{vip}} banned={{banned}}", &s, None).unwrap();
        assert_eq!(out, "Ira: 3 vip=True banned=False");
    }

    #[test]
    fn missing_names_render_empty() {
        let s = scope(json!({}));
        assert_eq!(render("a{{nope}}b", &s, None).unwrap(), "ab");
    }

    #[test]
    fn each_iterates_with_element_shadowing() {
        let s = scope(json!({
            "sign": "!",
            "rows": [{"service": "massage"}, {"service": "spa"}]
        }));
        let out = render("{{#each rows}}- {{service}}{{sign}}\n{{/each}}", &s, None).unwrap();
        assert_eq!(out, "- massage!\n- spa!\n");
    }

    #[test]
    fn empty_list_returns_empty_text_verbatim() {
        let s = scope(json!({"rows": []}));
        let out = render(
            "{{#each rows}}x{{/each}}",
            &s,
            Some("Пока пусто: {{rows}}"),
        )
        .unwrap();
        // Verbatim: no rendering applied to the empty text.
        assert_eq!(out, "Пока пусто: {{rows}}");
    }

    #[test]
    fn missing_list_counts_as_empty() {
        let s = scope(json!({}));
        let out = render("{{#each rows}}x{{/each}}", &s, Some("none")).unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn empty_list_without_empty_text_renders_nothing() {
        let s = scope(json!({"rows": []}));
        assert_eq!(render("a{{#each rows}}x{{/each}}b", &s, None).unwrap(), "ab");
    }

    #[test]
    fn unknown_directive_is_a_template_error() {
        let s = scope(json!({}));
        let err = render("{{#if x}}y{{/if}}", &s, None).unwrap_err();
        assert_eq!(err.code(), "template_error");
    }

    #[test]
    fn unclosed_each_is_a_template_error() {
        let s = scope(json!({"rows": []}));
        let err = render("{{#each rows}}y", &s, None).unwrap_err();
        assert_eq!(err.code(), "template_error");
    }

    #[test]
    fn nested_each_is_a_template_error() {
        let s = scope(json!({"rows": []}));
        let err = render("{{#each rows}}{{#each rows}}{{/each}}{{/each}}", &s, None).unwrap_err();
        assert_eq!(err.code(), "template_error");
    }

    #[test]
    fn strip_directives_keeps_surrounding_text() {
        let s = scope(json!({"name": "Ira"}));
        let out = strip_directives("Hi {{name}}! {{#if x}}secret{{/if}} bye", &s);
        assert_eq!(out, "Hi Ira!  bye");
    }
}
