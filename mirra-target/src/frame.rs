//! スタックフレーム

use crate::{Location, ObjectHandle, ThreadId};
use mirra_types::TypeHandle;

/// 型システムの言語
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// マネージドコード（C#系の型システム）
    #[default]
    Managed,
    /// ネイティブコード
    Native,
}

/// ローカル変数・引数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub ty: TypeHandle,
    pub location: Location,
    pub is_parameter: bool,
}

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub thread: ThreadId,
    /// フレームの一意なID
    pub id: u64,
    /// 0 が最内フレーム
    pub level: u32,
    /// 実行中のメソッド名
    pub method: String,
    /// メソッドの宣言型
    pub declaring_type: Option<TypeHandle>,
    /// メソッドのレキシカルスコープの名前空間（外側から順）
    pub namespaces: Vec<String>,
    pub language: Language,
    /// インスタンスメソッドの `this`
    pub this: Option<ObjectHandle>,
    pub locals: Vec<LocalVariable>,
}

impl StackFrame {
    /// 名前でローカル変数・引数を検索する
    pub fn find_local(&self, name: &str) -> Option<&LocalVariable> {
        self.locals.iter().find(|v| v.name == name)
    }
}
