//! 評価エラーとエラーメッセージ定数

use mirra_target::{ObjectHandle, TargetError};
use thiserror::Error;

/// プロセスに接続されていない場合のエラーメッセージ
pub const ERR_NO_PROCESS: &str = "No target process";

/// スレッドが選択されていない場合のエラーメッセージ
pub const ERR_NO_THREAD: &str = "No current thread";

/// 割り込みにより中断された場合のエラーメッセージ
pub const ERR_ABORTED: &str = "Evaluation aborted.";

/// 呼び出しが無効化されている場合のエラーメッセージ
pub const ERR_INVOCATION_DISABLED: &str = "Invoking methods in the target is disabled.";

/// null 参照を辿った場合のエラーメッセージ
pub const ERR_NULL_REFERENCE: &str = "Object reference not set to an instance of an object.";

/// 配列の範囲外アクセスのエラーメッセージ
pub const ERR_INDEX_OUT_OF_RANGE: &str = "Index was outside the bounds of the array.";

/// 未解決ノードを評価しようとした場合のエラーメッセージ
pub const ERR_NOT_RESOLVED: &str = "Expression evaluated before it was resolved";

/// 評価エラー
///
/// `Internal` 以外はすべてその評価だけの失敗で、セッションは続行できます。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// 字句・構文エラー
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// ユーザの式に起因する解決・評価エラー
    #[error("{0}")]
    Scripting(String),

    /// 呼び出したターゲット側のメソッドが例外を投げた
    #[error("The target threw an exception of type `{type_name}`")]
    TargetException {
        exception: ObjectHandle,
        type_name: String,
    },

    #[error("Evaluation timed out")]
    Timeout,

    #[error("{}", ERR_ABORTED)]
    Aborted,

    #[error("{0}")]
    NoTarget(String),

    #[error("The target thread is not stopped")]
    NotStopped,

    /// 内部不変条件の違反（呼び出し側のバグ）
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Target(TargetError),
}

impl EvalError {
    pub fn scripting(message: impl Into<String>) -> Self {
        EvalError::Scripting(message.into())
    }

    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        EvalError::Syntax {
            position,
            message: message.into(),
        }
    }

    /// セッション全体を中断すべきエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::Internal(_))
    }
}

impl From<TargetError> for EvalError {
    fn from(e: TargetError) -> Self {
        match e {
            TargetError::NotStopped(_) | TargetError::Running => EvalError::NotStopped,
            other => EvalError::Target(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_target::ThreadId;

    #[test]
    fn test_only_internal_is_fatal() {
        assert!(EvalError::Internal("x".into()).is_fatal());
        assert!(!EvalError::scripting("x").is_fatal());
        assert!(!EvalError::Timeout.is_fatal());
    }

    #[test]
    fn test_not_stopped_is_mapped() {
        let e: EvalError = TargetError::NotStopped(ThreadId(3)).into();
        assert_eq!(e, EvalError::NotStopped);
    }
}
