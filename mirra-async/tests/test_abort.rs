//! 中断・タイムアウト・割り込みの統合テスト

use mirra_async::{AsyncEvaluation, EvaluationResult};
use mirra_core::errors::ERR_ABORTED;
use mirra_core::{engine, EvaluationContext, FormatOptions, InterruptToken};
use mirra_target::sim::demo::{self, DEMO_THREAD};
use mirra_target::sim::SimTarget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(5);

fn demo_ctx() -> (Arc<SimTarget>, EvaluationContext) {
    let target = demo::build().expect("demo target");
    let ctx = EvaluationContext::for_thread(target.clone(), DEMO_THREAD);
    (target, ctx)
}

fn aborted() -> EvaluationResult {
    EvaluationResult::InvalidExpression(ERR_ABORTED.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abort_hanging_call() {
    let (_, ctx) = demo_ctx();
    let eval = AsyncEvaluation::spawn(
        ctx,
        engine::parse("Tester.Hang()").unwrap(),
        FormatOptions::default(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!eval.is_completed());
    eval.abort();
    eval.abort();

    let result = tokio::time::timeout(LIMIT, eval.wait()).await.unwrap();
    assert_eq!(result, aborted());
    assert!(eval.is_completed());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abort_before_start_never_invokes() {
    let (target, mut ctx) = demo_ctx();
    let session = InterruptToken::new();
    session.interrupt();
    ctx.set_interrupt(session);

    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    let eval = AsyncEvaluation::spawn_with_callback(
        ctx,
        engine::parse("Tester.Hang()").unwrap(),
        FormatOptions::default(),
        Some(Box::new(move |result| {
            assert_eq!(*result, aborted());
            flag.store(true, Ordering::SeqCst);
        })),
    )
    .unwrap();

    let result = tokio::time::timeout(LIMIT, eval.wait()).await.unwrap();
    assert_eq!(result, aborted());
    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(target.invocation_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invocation_timeout() {
    let (target, ctx) = demo_ctx();
    target.set_invocation_timeout(Some(Duration::from_millis(20)));
    let eval = AsyncEvaluation::spawn(
        ctx,
        engine::parse("Tester.Hang()").unwrap(),
        FormatOptions::default(),
    )
    .unwrap();
    let result = tokio::time::timeout(LIMIT, eval.wait()).await.unwrap();
    assert_eq!(result, EvaluationResult::Timeout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_interruptible_from_another_task() {
    let (_, mut ctx) = demo_ctx();
    let session = InterruptToken::new();
    ctx.set_interrupt(session.clone());
    let eval = AsyncEvaluation::spawn(
        ctx,
        engine::parse("Tester.Hang()").unwrap(),
        FormatOptions::default(),
    )
    .unwrap();

    let trip = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trip.interrupt();
    });

    let result = tokio::time::timeout(LIMIT, eval.wait_interruptible(&session))
        .await
        .unwrap();
    assert_eq!(result, aborted());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_survives_aborted_call() {
    let (_, ctx) = demo_ctx();
    let hang = AsyncEvaluation::spawn(
        ctx.clone(),
        engine::parse("Tester.Hang()").unwrap(),
        FormatOptions::default(),
    )
    .unwrap();
    hang.abort();
    assert_eq!(tokio::time::timeout(LIMIT, hang.wait()).await.unwrap(), aborted());

    // 中断は子トークンだけに及ぶ
    assert!(!ctx.interrupt().is_interrupted());
    let next = AsyncEvaluation::spawn(
        ctx,
        engine::parse("Add(1, 2)").unwrap(),
        FormatOptions::default(),
    )
    .unwrap();
    assert_eq!(
        tokio::time::timeout(LIMIT, next.wait()).await.unwrap(),
        EvaluationResult::Ok("(int) 3".to_string())
    );
}
