//! デバッガ表示文字列
//!
//! `DebuggerDisplay` 属性のような `"Point({X}, {Y})"` 形式のテンプレートを、
//! インスタンスを暗黙の `this` とするコンテキストで評価します。
//! `\{` `\}` `\\` はそれぞれの文字そのものになります。

use crate::context::EvaluationContext;
use crate::errors::EvalError;
use crate::expression::Value;
use crate::format::{FormatOptions, ObjectFormatter};
use crate::parser::parse_expression;
use crate::Result;
use mirra_target::ObjectHandle;
use tracing::trace;

/// 引用符を外す書式指定子
const NO_QUOTES: &str = ",nq";

/// テンプレートを評価して文字列を返す
pub fn evaluate_display_string(
    ctx: &EvaluationContext,
    instance: ObjectHandle,
    template: &str,
) -> Result<String> {
    render_template(ctx, instance, template, &FormatOptions::default())
}

/// 指定のフォーマットオプションでテンプレートを評価する
///
/// プレースホルダの値を整形する際に再びテンプレートが使われるため、
/// `max_depth` を1段ずつ減らしながら評価します。
pub(crate) fn render_template(
    ctx: &EvaluationContext,
    instance: ObjectHandle,
    template: &str,
    options: &FormatOptions,
) -> Result<String> {
    if options.max_depth == 0 {
        return Err(EvalError::scripting("Display string nesting is too deep."));
    }
    let scoped = ctx.scoped_to(instance);
    let mut nested = *options;
    nested.max_depth -= 1;

    let mut out = String::new();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('{' | '}' | '\\')) => out.push(escaped),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '{' => {
                let mut expr = String::new();
                let mut depth = 0usize;
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' if depth == 0 => {
                            closed = true;
                            break;
                        }
                        '}' => depth -= 1,
                        _ => {}
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(EvalError::scripting(format!(
                        "Unterminated `{{` in display string `{}`.",
                        template
                    )));
                }
                out.push_str(&placeholder(&scoped, &expr, &nested)?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn placeholder(ctx: &EvaluationContext, text: &str, options: &FormatOptions) -> Result<String> {
    let (text, no_quotes) = match text.trim().strip_suffix(NO_QUOTES) {
        Some(stripped) => (stripped, true),
        None => (text.trim(), false),
    };
    trace!("display placeholder `{}`", text);
    let value = parse_expression(text)?.resolve(ctx)?.evaluate(ctx)?;
    let formatted = ObjectFormatter::new(ctx, *options).format_value(&value)?;
    let quoted = formatted.len() >= 2 && formatted.starts_with('"') && formatted.ends_with('"');
    if no_quotes && quoted && !matches!(value, Value::Type(_)) {
        Ok(formatted[1..formatted.len() - 1].to_string())
    } else {
        Ok(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_target::sim::demo::{self, DEMO_THREAD};

    fn origin_ctx() -> (EvaluationContext, ObjectHandle) {
        let target = demo::build().unwrap();
        let ctx = EvaluationContext::for_thread(target, DEMO_THREAD);
        let origin = parse_expression("origin")
            .unwrap()
            .resolve(&ctx)
            .unwrap()
            .evaluate_variable(&ctx)
            .unwrap();
        (ctx, origin)
    }

    #[test]
    fn test_placeholders_use_implicit_this() {
        let (ctx, origin) = origin_ctx();
        assert_eq!(
            evaluate_display_string(&ctx, origin, "Point({X}, {this.Y})").unwrap(),
            "Point(3, 4)"
        );
    }

    #[test]
    fn test_escapes() {
        let (ctx, origin) = origin_ctx();
        assert_eq!(
            evaluate_display_string(&ctx, origin, r"\{X\} = {X} \\").unwrap(),
            r"{X} = 3 \"
        );
    }

    #[test]
    fn test_errors() {
        let (ctx, origin) = origin_ctx();
        assert!(evaluate_display_string(&ctx, origin, "{X").is_err());
        assert!(evaluate_display_string(&ctx, origin, "{Missing}").is_err());
    }

    #[test]
    fn test_recursive_template_is_bounded() {
        let (ctx, origin) = origin_ctx();
        let text = evaluate_display_string(&ctx, origin, "<{this}>").unwrap();
        assert_eq!(text, "<Point(3, 4)>");
        let shallow = FormatOptions {
            max_depth: 0,
            ..FormatOptions::default()
        };
        assert!(render_template(&ctx, origin, "{X}", &shallow).is_err());
    }
}
