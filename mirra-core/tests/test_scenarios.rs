//! デモターゲットに対する評価シナリオの統合テスト

use mirra_core::{
    engine, parse_expression, token, DisplayFormat, EvalError, EvaluationContext, FormatOptions,
    Value,
};
use mirra_target::sim::demo::{self, DEMO_THREAD, PUB_MEMBERS};
use mirra_target::sim::SimTarget;
use mirra_types::Scalar;
use std::sync::Arc;

fn demo_ctx() -> (Arc<SimTarget>, EvaluationContext) {
    let target = demo::build().expect("demo target");
    let ctx = EvaluationContext::for_thread(target.clone(), DEMO_THREAD);
    (target, ctx)
}

fn print(ctx: &EvaluationContext, text: &str) -> Result<String, EvalError> {
    let handle = engine::parse(text)?;
    engine::evaluate(ctx, &handle, &FormatOptions::default())
}

#[test]
fn test_literal_five() {
    let tokens = token::tokenize("5");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].1, token::Token::Literal(Scalar::Int32(5)));

    let expr = parse_expression("5").unwrap();
    assert!(expr.is_resolved());
    // リテラルはコンテキストに依存しない
    assert_eq!(
        expr.evaluate(&EvaluationContext::empty()).unwrap(),
        Value::Scalar(Scalar::Int32(5))
    );
    let (_, ctx) = demo_ctx();
    assert_eq!(print(&ctx, "5").unwrap(), "(int) 5");
}

#[test]
fn test_struct_field_and_missing_member() {
    let (_, ctx) = demo_ctx();
    assert_eq!(print(&ctx, "foo.Data").unwrap(), "(int) 5");
    assert_eq!(
        print(&ctx, "foo.Missing").unwrap_err().to_string(),
        "Type Foo has no member Missing."
    );
}

#[test]
fn test_overload_resolution() {
    let (_, ctx) = demo_ctx();
    assert_eq!(print(&ctx, "Overloaded()").unwrap(), "(string) \"Overloaded()\"");
    assert_eq!(print(&ctx, "Overloaded(3)").unwrap(), "(string) \"Overloaded(int)\"");
    assert_eq!(
        print(&ctx, "Tester.Overloaded(root)").unwrap(),
        "(string) \"Overloaded(Root)\""
    );
    let err = print(&ctx, "Overloaded(1.5)").unwrap_err();
    assert_eq!(err.to_string(), "No overload for method `Overloaded` has 1 arguments.");

    // 同じ候補と引数型なら常に同じ結果
    for _ in 0..3 {
        assert_eq!(print(&ctx, "Overloaded(3)").unwrap(), "(string) \"Overloaded(int)\"");
    }
}

#[test]
fn test_flags_enum_reconstructs_value() {
    let (_, ctx) = demo_ctx();
    let text = print(&ctx, "pub").unwrap();
    assert_eq!(
        text,
        "(Demo.Pub) Music | Drinks | Food | Games | Darts | Quiz | Karaoke"
    );
    let names = text.trim_start_matches("(Demo.Pub) ").split(" | ");
    let value = names
        .map(|name| {
            PUB_MEMBERS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v)
                .unwrap()
        })
        .fold(0, |acc, v| acc | v);
    assert_eq!(value, 0x301f);
}

#[test]
fn test_casts_along_hierarchy() {
    let (_, ctx) = demo_ctx();
    assert_eq!(print(&ctx, "((Demo.B) derived).BValue").unwrap(), "(int) 1");
    assert_eq!(print(&ctx, "(B) derived").unwrap(), "(Demo.B) { BValue = 1 }");
    assert_eq!(
        print(&ctx, "(A) derived").unwrap_err().to_string(),
        "Cannot cast from `D` to `A`"
    );
}

#[test]
fn test_assignment_round_trip() {
    let (_, ctx) = demo_ctx();
    let lvalue = engine::parse("foo.Data").unwrap();
    engine::assign(&ctx, &lvalue, &engine::parse("42").unwrap()).unwrap();
    let resolved = lvalue.expression().resolve(&ctx).unwrap();
    let handle = resolved.evaluate_variable(&ctx).unwrap();
    assert_eq!(
        ctx.current_process()
            .unwrap()
            .object(handle)
            .unwrap()
            .as_scalar(),
        Some(&Scalar::Int32(42))
    );

    let err = engine::assign(&ctx, &lvalue, &engine::parse("\"text\"").unwrap()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("`string`") && message.contains("`int`"), "{}", message);
}

#[test]
fn test_object_format_round_trips_literals() {
    let (_, ctx) = demo_ctx();
    let options = FormatOptions::default().with_format(DisplayFormat::Object);
    for literal in ["5", "-3", "2.5", "\"a\\tb\"", "true", "4000000000"] {
        let value = parse_expression(literal).unwrap().evaluate(&ctx).unwrap();
        let text = mirra_core::ObjectFormatter::new(&ctx, options)
            .format_value(&value)
            .unwrap();
        let again = parse_expression(&text).unwrap().evaluate(&ctx).unwrap();
        assert_eq!(value, again, "{} -> {}", literal, text);
    }
}

#[test]
fn test_array_prints_each_element_once() {
    let (_, ctx) = demo_ctx();
    assert_eq!(print(&ctx, "numbers").unwrap(), "(int[]) [ 10, 20, 30 ]");
    assert!(print(&ctx, "numbers[4]").is_err());
    assert_eq!(print(&ctx, "numbers[3]").unwrap(), "(int) 30");
}

#[test]
fn test_stale_values_after_resume() {
    let (target, ctx) = demo_ctx();
    target.resume();
    assert_eq!(print(&ctx, "foo.Data").unwrap_err(), EvalError::NotStopped);
    target.stop();
    let fresh = EvaluationContext::for_thread(target.clone(), DEMO_THREAD);
    assert_eq!(print(&fresh, "foo.Data").unwrap(), "(int) 5");
}
