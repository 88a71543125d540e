//! コマンド層へ公開する評価インタフェース
//!
//! `parse` で得たハンドルは解決前の式を保持し、評価のたびにコンテキストに対して解決し直します。

use crate::context::EvaluationContext;
use crate::errors::EvalError;
use crate::expression::{ExprKind, Expression, Value};
use crate::format::{FormatOptions, ObjectFormatter};
use crate::parser::{parse_expression, parse_type};
use crate::Result;
use mirra_types::TypeHandle;
use tracing::debug;

/// パース済みの式
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionHandle {
    text: String,
    expression: Expression,
}

impl ExpressionHandle {
    /// 入力されたテキスト
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

/// 式をパースする（式として読めなければ型名として読む）
pub fn parse(text: &str) -> Result<ExpressionHandle> {
    let expression = match parse_expression(text) {
        Ok(expression) => expression,
        Err(e) => parse_type(text).map_err(|_| e)?,
    };
    Ok(ExpressionHandle {
        text: text.trim().to_string(),
        expression,
    })
}

/// 式を解決して評価する
pub fn evaluate_value(ctx: &EvaluationContext, handle: &ExpressionHandle) -> Result<Value> {
    let resolved = handle.expression.resolve(ctx)?;
    debug!("evaluate `{}`", handle.text);
    resolved.evaluate(ctx)
}

/// 式を評価して整形した文字列を返す
pub fn evaluate(
    ctx: &EvaluationContext,
    handle: &ExpressionHandle,
    options: &FormatOptions,
) -> Result<String> {
    let value = evaluate_value(ctx, handle)?;
    ObjectFormatter::new(ctx, *options).format_result(&value)
}

/// `target` に `value` の評価結果を代入する
///
/// 代入先を先に解決し、値を評価してから書き込みます。
pub fn assign(
    ctx: &EvaluationContext,
    target: &ExpressionHandle,
    value: &ExpressionHandle,
) -> Result<()> {
    let lvalue = target.expression.resolve(ctx)?;
    let value = value.expression.resolve(ctx)?;
    let place = lvalue.place(ctx)?;
    let value = value.evaluate(ctx)?;
    debug!("assign to `{}`", target.text);
    lvalue.store(ctx, place, value).map(|_| ())
}

/// 式が表す型（型名・`typeof` ならその型、値なら静的型）
pub fn type_of(ctx: &EvaluationContext, handle: &ExpressionHandle) -> Result<TypeHandle> {
    let resolved = match handle.expression.resolve(ctx) {
        Ok(resolved) => resolved,
        Err(e) => match handle.expression.resolve_as_type(ctx) {
            Ok(ty) => ty,
            Err(_) => return Err(e),
        },
    };
    match &resolved.kind {
        ExprKind::TypeRef(ty) => Ok(*ty),
        ExprKind::TypeOf(inner) => match inner.kind {
            ExprKind::TypeRef(ty) => Ok(ty),
            _ => Err(EvalError::Internal("typeof operand is not a type".to_string())),
        },
        _ => resolved.evaluate_type(ctx),
    }
}

/// 型の宣言を返す（`ptype`）
pub fn describe_type(ctx: &EvaluationContext, handle: &ExpressionHandle) -> Result<String> {
    let ty = type_of(ctx, handle)?;
    ObjectFormatter::new(ctx, FormatOptions::default()).describe_type(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_target::sim::demo::{self, DEMO_THREAD};

    fn demo_ctx() -> EvaluationContext {
        let target = demo::build().unwrap();
        EvaluationContext::for_thread(target, DEMO_THREAD)
    }

    #[test]
    fn test_parse_reports_position() {
        match parse("foo.") {
            Err(EvalError::Syntax { position, .. }) => assert_eq!(position, 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_and_assign() {
        let ctx = demo_ctx();
        let data = parse("foo.Data").unwrap();
        assert_eq!(evaluate(&ctx, &data, &FormatOptions::default()).unwrap(), "(int) 5");
        assign(&ctx, &data, &parse("8").unwrap()).unwrap();
        assert_eq!(evaluate(&ctx, &data, &FormatOptions::default()).unwrap(), "(int) 8");
        let err = assign(&ctx, &data, &parse("2.5").unwrap()).unwrap_err();
        assert!(err.to_string().contains("`double` to `int`"), "{}", err);
    }

    #[test]
    fn test_assign_resolves_target_first() {
        let ctx = demo_ctx();
        assign(&ctx, &parse("numbers[Next()]").unwrap(), &parse("Next()").unwrap()).unwrap();
        let options = FormatOptions::default();
        assert_eq!(evaluate(&ctx, &parse("numbers").unwrap(), &options).unwrap(), "(int[]) [ 2, 20, 30 ]");
    }

    #[test]
    fn test_type_of_accepts_types_and_values() {
        let ctx = demo_ctx();
        let foo = ctx.lookup_type("Foo").unwrap().unwrap();
        assert_eq!(type_of(&ctx, &parse("Demo.Foo").unwrap()).unwrap(), foo);
        assert_eq!(type_of(&ctx, &parse("typeof(Foo)").unwrap()).unwrap(), foo);
        assert_eq!(type_of(&ctx, &parse("foo").unwrap()).unwrap(), foo);
        let array = type_of(&ctx, &parse("int[]").unwrap()).unwrap();
        assert_eq!(ctx.types().unwrap().name_of(array), "int[]");
    }
}
