//! プロセス制御層の能力インターフェース

use crate::{InterruptToken, Location, ObjectHandle, Result, StackFrame, TargetObject, ThreadId};
use mirra_types::{FunctionId, Scalar, TypeCatalog, TypeHandle};
use std::fmt;
use thiserror::Error;

/// プロセスID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ターゲット操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// 値の裏付けとなるメモリがもう有効でない（フレームがポップされた等）
    #[error("{0}")]
    LocationInvalid(String),

    /// 以前の停止期間に取得したプロキシを使った
    #[error("{0} was obtained before the target was resumed")]
    Stale(ObjectHandle),

    #[error("The target process is running")]
    Running,

    #[error("Thread {0} is not stopped")]
    NotStopped(ThreadId),

    #[error("No such thread: {0}")]
    NoSuchThread(ThreadId),

    #[error("Thread {0} has no stack frame")]
    NoFrame(ThreadId),

    #[error("Invalid object handle {0}")]
    InvalidHandle(ObjectHandle),

    #[error("Invalid type handle {0}")]
    InvalidType(TypeHandle),

    #[error("Unknown register '{0}'")]
    InvalidRegister(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// 呼び出しフラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvokeFlags {
    /// 呼び出し中のブレークポイントヒットを入れ子の停止状態として扱う
    pub nested_break_states: bool,
}

/// ターゲット内メソッド呼び出しの要求
pub struct InvocationRequest<'a> {
    pub thread: ThreadId,
    pub function: FunctionId,
    pub instance: Option<ObjectHandle>,
    pub args: &'a [ObjectHandle],
    pub flags: InvokeFlags,
    /// 開始前と待機中に確認される割り込みトークン
    pub interrupt: &'a InterruptToken,
}

/// ターゲット内メソッド呼び出しの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// 正常終了（void なら None）
    Returned(Option<ObjectHandle>),
    /// ターゲット側で例外が投げられた
    Exception(ObjectHandle),
    /// 呼び出し層が検出したタイムアウト
    Timeout,
    /// 割り込みにより中断された（ターゲットは一貫した状態に戻されている）
    Aborted,
    /// 入れ子の停止状態が有効な状態でブレークポイントにヒットした
    BreakpointHit,
}

/// プロセス制御層
///
/// 評価器はこのトレイト越しにだけターゲットへ触れます。プロキシ（[`ObjectHandle`]）は
/// スレッドが停止している間だけ有効で、実装はそれ以外の利用を失敗させなければなりません。
pub trait Target: Send + Sync {
    fn process_id(&self) -> ProcessId;

    /// 型カタログ
    fn types(&self) -> &TypeCatalog;

    fn threads(&self) -> Vec<ThreadId>;

    fn is_stopped(&self, thread: ThreadId) -> bool;

    /// 最内フレーム
    fn current_frame(&self, thread: ThreadId) -> Result<StackFrame>;

    fn backtrace(&self, thread: ThreadId) -> Result<Vec<StackFrame>>;

    /// オブジェクトのスナップショットを読み取る
    fn object(&self, handle: ObjectHandle) -> Result<TargetObject>;

    /// 位置に格納された値を読み取る
    fn read(&self, location: &Location) -> Result<ObjectHandle>;

    /// 位置に値を書き込む
    fn write(&self, location: &Location, value: ObjectHandle) -> Result<()>;

    /// スカラー値（列挙型なら列挙値）をターゲット内に作成する
    fn create_scalar(&self, ty: TypeHandle, value: Scalar) -> Result<ObjectHandle>;

    /// 指定の型の null 値を作成する
    fn create_null(&self, ty: TypeHandle) -> Result<ObjectHandle>;

    /// ポインタの参照先を取得する
    fn dereference(&self, pointer: ObjectHandle) -> Result<ObjectHandle>;

    /// オブジェクトを指すポインタを作成する
    fn address_of(&self, object: ObjectHandle) -> Result<ObjectHandle>;

    fn read_register(&self, thread: ThreadId, name: &str) -> Result<u64>;

    fn write_register(&self, thread: ThreadId, name: &str, value: u64) -> Result<()>;

    /// ターゲット内でメソッドを呼び出す
    ///
    /// 呼び出しが終わるまでブロックします。`request.interrupt` が割り込まれたら
    /// 速やかに [`InvocationOutcome::Aborted`] を返さなければなりません。
    fn invoke(&self, request: &InvocationRequest<'_>) -> Result<InvocationOutcome>;
}
