//! Completion result formatting.
//!
//! Turns `(name, type)` pairs into editor-facing suggestion records:
//! argument display strings, `${n:name}` snippets for functions, one record
//! per documented overload, and `self` trimmed from `:` accessed methods.

use serde::Serialize;

use crate::analysis::Found;
use crate::typedef::{ArgInfo, DocMeta, TypeArena, TypeContext, TypeDef};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub right_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_more_url: Option<String>,
}

/// All suggestion records for one found member. Functions with documented
/// overloads produce one record per variant.
pub fn suggestions(arena: &TypeArena, ctx: &TypeContext, found: &Found) -> Vec<Suggestion> {
    let typedef = ctx.canonical(found.typedef);
    let TypeDef::Function(function) = typedef else {
        let right_label = match typedef {
            TypeDef::Unknown => "",
            other => other.kind_name(),
        };
        return vec![Suggestion {
            text: found.name.clone(),
            display_text: None,
            snippet: None,
            kind: "variable",
            right_label,
            description: None,
            description_more_url: None,
        }];
    };

    let args = arena.args(ctx, function).to_vec();
    let doc = arena.doc(ctx, function);
    let mut out = vec![function_suggestion(
        &found.name,
        &args,
        doc,
        found.omit_self,
        doc.and_then(|d| d.description.clone()),
        doc.and_then(|d| d.link.clone()),
    )];
    if let Some(doc) = doc {
        for variant in &doc.variants {
            let variant_args = variant.args.clone().unwrap_or_else(|| args.clone());
            let display = if found.omit_self {
                variant.args_display_omit_self.clone()
            } else {
                variant.args_display.clone()
            };
            out.push(build(
                &found.name,
                &variant_args,
                display,
                found.omit_self,
                variant.description.clone().or_else(|| doc.description.clone()),
                variant.link.clone().or_else(|| doc.link.clone()),
            ));
        }
    }
    out
}

fn function_suggestion(
    name: &str,
    args: &[ArgInfo],
    doc: Option<&DocMeta>,
    omit_self: bool,
    description: Option<String>,
    link: Option<String>,
) -> Suggestion {
    let display = doc.and_then(|d| {
        if omit_self {
            d.args_display_omit_self.clone()
        } else {
            d.args_display.clone()
        }
    });
    build(name, args, display, omit_self, description, link)
}

fn build(
    name: &str,
    args: &[ArgInfo],
    args_display: Option<String>,
    omit_self: bool,
    description: Option<String>,
    link: Option<String>,
) -> Suggestion {
    let visible = visible_args(args, omit_self);
    let display = args_display.unwrap_or_else(|| {
        visible
            .iter()
            .map(|arg| arg.display())
            .collect::<Vec<_>>()
            .join(", ")
    });
    Suggestion {
        text: name.to_string(),
        display_text: Some(format!("{name}({display})")),
        snippet: Some(snippet(name, &visible)),
        kind: "function",
        right_label: "function",
        description,
        description_more_url: link,
    }
}

// A colon call supplies the first argument implicitly, whatever its name.
fn visible_args(args: &[ArgInfo], omit_self: bool) -> Vec<ArgInfo> {
    let skip = usize::from(omit_self && !args.is_empty());
    args[skip..].to_vec()
}

fn snippet(name: &str, args: &[ArgInfo]) -> String {
    let mut out = format!("{name}(");
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("${{{}:{}}}", index + 1, arg.display()));
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedef::{DocVariant, FieldKey};

    fn found(name: &str, typedef: TypeDef, omit_self: bool) -> Found {
        Found {
            name: name.to_string(),
            typedef,
            omit_self,
        }
    }

    #[test]
    fn test_non_function_suggestion() {
        let arena = TypeArena::new();
        let ctx = TypeContext::new();
        let out = suggestions(&arena, &ctx, &found("count", TypeDef::Number, false));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "count");
        assert_eq!(out[0].kind, "variable");
        assert_eq!(out[0].right_label, "number");
        assert_eq!(out[0].snippet, None);
    }

    #[test]
    fn test_function_snippet_and_display() {
        let mut arena = TypeArena::new();
        let ctx = TypeContext::new();
        let func = arena.function();
        let id = func.struct_id().unwrap();
        arena.set_args(
            &ctx,
            id,
            vec![ArgInfo::named("bar"), ArgInfo::named("baz")],
        );

        let out = suggestions(&arena, &ctx, &found("foo", func, false));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].display_text.as_deref(), Some("foo(bar, baz)"));
        assert_eq!(out[0].snippet.as_deref(), Some("foo(${1:bar}, ${2:baz})"));
    }

    #[test]
    fn test_colon_access_trims_self() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let func = arena.function();
        let id = func.struct_id().unwrap();
        arena.set(&mut ctx, id, FieldKey::Argument(0), TypeDef::Unknown);
        arena.set_args(
            &ctx,
            id,
            vec![ArgInfo::named("self"), ArgInfo::named("n")],
        );

        let out = suggestions(&arena, &ctx, &found("take", func, true));
        assert_eq!(out[0].display_text.as_deref(), Some("take(n)"));
        assert_eq!(out[0].snippet.as_deref(), Some("take(${1:n})"));
    }

    #[test]
    fn test_variants_produce_extra_records() {
        let mut arena = TypeArena::new();
        let ctx = TypeContext::new();
        let func = arena.function();
        let id = func.struct_id().unwrap();
        arena.set_args(&ctx, id, vec![ArgInfo::named("v")]);
        arena.set_doc(
            &ctx,
            id,
            DocMeta {
                description: Some("stringify".to_string()),
                variants: vec![DocVariant {
                    args: Some(vec![ArgInfo::named("v"), ArgInfo::named("format")]),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        let out = suggestions(&arena, &ctx, &found("tostring", func, false));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].display_text.as_deref(), Some("tostring(v)"));
        assert_eq!(out[1].display_text.as_deref(), Some("tostring(v, format)"));
        assert_eq!(out[1].description.as_deref(), Some("stringify"));
    }
}
