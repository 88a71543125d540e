//! メンバ記述子

use crate::catalog::TypeHandle;
use crate::scalar::Scalar;

/// ターゲット内の関数を識別するID（呼び出しプリミティブに渡す）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// メンバの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
    Event,
    Method,
}

/// メンバ記述子
///
/// メンバ検索の結果です。`index` は宣言型の対応する一覧（fields/properties/events）内の位置です。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMemberInfo {
    pub name: String,
    pub is_static: bool,
    pub kind: MemberKind,
    pub declaring_type: TypeHandle,
    pub index: usize,
    /// メンバの型
    pub ty: TypeHandle,
}

/// フィールド情報
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeHandle,
    pub is_static: bool,
    /// const フィールドの値
    pub const_value: Option<Scalar>,
    /// コンパイラ生成フィールド（`<Foo>k__BackingField` など）
    pub compiler_generated: bool,
    /// `DebuggerBrowsable(Never)` でなければ true
    pub browsable: bool,
}

impl FieldInfo {
    /// 通常のフィールドを作成する
    pub fn new(name: impl Into<String>, ty: TypeHandle) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: false,
            const_value: None,
            compiler_generated: false,
            browsable: true,
        }
    }

    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// プロパティ情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: TypeHandle,
    pub is_static: bool,
    pub getter: Option<FunctionId>,
    pub setter: Option<FunctionId>,
}

/// イベント情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub name: String,
    pub ty: TypeHandle,
    pub is_static: bool,
}

/// 引数情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub ty: TypeHandle,
}

/// メソッド情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub is_static: bool,
    pub parameters: Vec<ParameterInfo>,
    /// 戻り値の型（void なら None）
    pub return_type: Option<TypeHandle>,
    pub function: FunctionId,
    /// 宣言型
    pub declaring_type: Option<TypeHandle>,
}

impl MethodInfo {
    /// 引数の型一覧
    pub fn parameter_types(&self) -> impl Iterator<Item = TypeHandle> + '_ {
        self.parameters.iter().map(|p| p.ty)
    }
}
