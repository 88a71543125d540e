//! Mirra 式評価エンジンのコア
//!
//! 停止中のターゲットプロセスに対して C# 風の式を評価します。
//! テキストを字句解析・構文解析して式木を作り、ミラー型システムに対して名前を解決し（第1段階）、
//! ターゲットのメモリとスレッドに対して評価・代入し（第2段階）、結果のオブジェクトグラフを整形します。

pub mod command;
pub mod context;
pub mod display;
pub mod engine;
pub mod errors;
pub mod eval;
pub mod expression;
pub mod format;
pub mod parser;
pub mod resolve;
pub mod token;
pub mod watch;

pub use command::Command;
pub use context::{EvaluationContext, EvaluationFlags};
pub use display::evaluate_display_string;
pub use engine::ExpressionHandle;
pub use errors::EvalError;
pub use expression::{ExprKind, Expression, Value};
pub use format::{DisplayFormat, FormatOptions, ObjectFormatter};
pub use parser::{parse_expression, parse_type};
pub use watch::{DisplayEntry, DisplayList};

// 他のクレートから使用するために再エクスポート
pub use mirra_target::{InterruptToken, Target, ThreadId};

/// 評価の結果型
pub type Result<T> = std::result::Result<T, EvalError>;
