//! Mirra ターゲットプロセス能力インターフェース
//!
//! このクレートは、評価器がプロセス制御層から受け取る能力（停止スレッドの問い合わせ、
//! オブジェクトプロキシの読み書き、レジスタ、ターゲット内メソッド呼び出し）を定義します。
//! テストとデモ用に、メモリ上でターゲットを模倣する [`sim::SimTarget`] も提供します。

pub mod frame;
pub mod interrupt;
pub mod object;
pub mod registers;
pub mod sim;
pub mod target;
pub mod thread;

pub use frame::{Language, LocalVariable, StackFrame};
pub use interrupt::InterruptToken;
pub use object::{ArrayObject, ClassObject, Dimension, Location, ObjectHandle, ObjectKind, TargetObject};
pub use target::{
    InvocationOutcome, InvocationRequest, InvokeFlags, ProcessId, Target, TargetError,
};
pub use thread::ThreadId;

/// ターゲット操作の結果型
pub type Result<T> = std::result::Result<T, TargetError>;
