//! Mirra 非同期評価プロトコル
//!
//! ターゲット内のメソッド呼び出しを伴う評価をワーカーで実行し、
//! 中断・タイムアウト・割り込みとの競合を扱います。

pub mod evaluation;

pub use evaluation::{AsyncEvaluation, Callback, EvaluationResult};
