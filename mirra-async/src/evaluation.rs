//! 非同期評価ハンドル
//!
//! ターゲット内のメソッドを呼び出す可能性のある評価は、要求したスレッドではなく
//! ブロッキングワーカー上で実行します。
//!
//! - 完了通知はちょうど1回（`watch` チャネルに `Some` を1度だけ送る）
//! - `abort()` は何度呼んでもよく、完了の前後どちらでもよい
//! - 割り込みに勝った待機も、ワーカーの終了を待ってから戻る

use mirra_core::errors::ERR_ABORTED;
use mirra_core::{engine, EvalError, EvaluationContext, ExpressionHandle, FormatOptions};
use mirra_target::{InterruptToken, ObjectHandle};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// 評価結果の種類
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    /// 整形済みの値
    Ok(String),
    /// ターゲット側で例外が投げられた（例外オブジェクトはそのまま調べられる）
    Exception {
        exception: ObjectHandle,
        type_name: String,
    },
    /// 式が不正、または評価が中断された
    InvalidExpression(String),
    /// 呼び出し層がタイムアウトを報告した
    Timeout,
}

impl EvaluationResult {
    fn from_error(error: EvalError) -> Self {
        match error {
            EvalError::TargetException {
                exception,
                type_name,
            } => EvaluationResult::Exception {
                exception,
                type_name,
            },
            EvalError::Timeout => EvaluationResult::Timeout,
            EvalError::Aborted => EvaluationResult::InvalidExpression(ERR_ABORTED.to_string()),
            other => EvaluationResult::InvalidExpression(other.to_string()),
        }
    }
}

/// 完了時に呼ばれるコールバック
pub type Callback = Box<dyn FnOnce(&EvaluationResult) + Send + 'static>;

/// 非同期評価ハンドル
pub struct AsyncEvaluation {
    text: String,
    abort: InterruptToken,
    completion: watch::Receiver<Option<EvaluationResult>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncEvaluation {
    /// ワーカー上で式を評価する
    ///
    /// 現在の tokio ランタイム上でブロッキングワーカーを起動し、すぐに戻ります。
    pub fn spawn(
        ctx: EvaluationContext,
        handle: ExpressionHandle,
        options: FormatOptions,
    ) -> mirra_core::Result<Self> {
        Self::spawn_with_callback(ctx, handle, options, None)
    }

    /// 完了時のコールバックを指定してワーカーを起動する
    ///
    /// コールバックは完了通知の直前に、ワーカー上で1度だけ呼ばれます。
    pub fn spawn_with_callback(
        mut ctx: EvaluationContext,
        handle: ExpressionHandle,
        options: FormatOptions,
        callback: Option<Callback>,
    ) -> mirra_core::Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EvalError::Internal(format!("no async runtime: {}", e)))?;

        // 呼び出し元のトークン（セッションの Ctrl-C）が割り込まれたらこの評価も中断する
        let abort = ctx.interrupt().child();
        ctx.set_interrupt(abort.clone());

        let (sender, completion) = watch::channel(None);
        let text = handle.text().to_string();
        let worker_abort = abort.clone();
        let worker = runtime.spawn_blocking(move || {
            let result = if worker_abort.is_interrupted() {
                debug!("`{}` aborted before the worker started", handle.text());
                EvaluationResult::InvalidExpression(ERR_ABORTED.to_string())
            } else {
                match engine::evaluate(&ctx, &handle, &options) {
                    Ok(text) => EvaluationResult::Ok(text),
                    Err(e) => EvaluationResult::from_error(e),
                }
            };
            trace!("`{}` completed: {:?}", handle.text(), result);
            if let Some(callback) = callback {
                callback(&result);
            }
            // 受信側がすべて破棄されていても構わない
            let _ = sender.send(Some(result));
        });

        Ok(Self {
            text,
            abort,
            completion,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// 評価中の式
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 評価を中断する（何度呼んでもよい）
    pub fn abort(&self) {
        if !self.abort.is_interrupted() {
            debug!("abort `{}`", self.text);
        }
        self.abort.interrupt();
    }

    pub fn is_completed(&self) -> bool {
        self.completion.borrow().is_some()
    }

    /// 完了していれば結果を返す
    pub fn result(&self) -> Option<EvaluationResult> {
        self.completion.borrow().clone()
    }

    /// 完了を待つ
    pub async fn wait(&self) -> EvaluationResult {
        let mut completion = self.completion.clone();
        let result = match completion.wait_for(Option::is_some).await {
            Ok(result) => result.clone(),
            // 送信側が結果を送らずに破棄された（ワーカーのパニック）
            Err(_) => None,
        };
        self.join_worker().await;
        result.unwrap_or_else(|| {
            EvaluationResult::InvalidExpression(format!(
                "evaluation of `{}` ended without a result",
                self.text
            ))
        })
    }

    /// 完了と割り込みを競わせて待つ
    ///
    /// 割り込みが先なら評価を中断し、そのうえで完了を待ちます。
    pub async fn wait_interruptible(&self, interrupt: &InterruptToken) -> EvaluationResult {
        tokio::select! {
            result = self.wait() => result,
            _ = interrupt.interrupted() => {
                debug!("interrupted while waiting for `{}`", self.text);
                self.abort();
                self.wait().await
            }
        }
    }

    async fn join_worker(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                debug!("evaluation worker for `{}` failed: {}", self.text, e);
            }
        }
    }
}

impl std::fmt::Debug for AsyncEvaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncEvaluation")
            .field("text", &self.text)
            .field("aborted", &self.abort.is_interrupted())
            .field("completed", &self.is_completed())
            .finish()
    }
}
