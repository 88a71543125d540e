//! ミラー型情報
//!
//! ターゲットの型カタログから写し取った型の記述です。
//! 型同士の参照はすべて [`TypeHandle`] 経由で行い、実体はカタログが所有します。

use crate::catalog::TypeHandle;
use crate::member::{EventInfo, FieldInfo, MethodInfo, PropertyInfo};
use crate::OBJECT_TYPE_NAME;

/// 基本型の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundamentalKind {
    Boolean,
    Char,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    /// 万物の基底型
    Object,
}

impl FundamentalKind {
    /// カタログに事前登録される基本型の一覧
    pub const ALL: [FundamentalKind; 11] = [
        FundamentalKind::Boolean,
        FundamentalKind::Char,
        FundamentalKind::Int32,
        FundamentalKind::UInt32,
        FundamentalKind::Int64,
        FundamentalKind::UInt64,
        FundamentalKind::Single,
        FundamentalKind::Double,
        FundamentalKind::Decimal,
        FundamentalKind::String,
        FundamentalKind::Object,
    ];

    /// 表示用の型名（C#のキーワード表記）
    pub fn name(self) -> &'static str {
        match self {
            FundamentalKind::Boolean => "bool",
            FundamentalKind::Char => "char",
            FundamentalKind::Int32 => "int",
            FundamentalKind::UInt32 => "uint",
            FundamentalKind::Int64 => "long",
            FundamentalKind::UInt64 => "ulong",
            FundamentalKind::Single => "float",
            FundamentalKind::Double => "double",
            FundamentalKind::Decimal => "decimal",
            FundamentalKind::String => "string",
            FundamentalKind::Object => OBJECT_TYPE_NAME,
        }
    }

    /// 完全修飾名（`System.Int32` 形式）
    pub fn full_name(self) -> &'static str {
        match self {
            FundamentalKind::Boolean => "System.Boolean",
            FundamentalKind::Char => "System.Char",
            FundamentalKind::Int32 => "System.Int32",
            FundamentalKind::UInt32 => "System.UInt32",
            FundamentalKind::Int64 => "System.Int64",
            FundamentalKind::UInt64 => "System.UInt64",
            FundamentalKind::Single => "System.Single",
            FundamentalKind::Double => "System.Double",
            FundamentalKind::Decimal => "System.Decimal",
            FundamentalKind::String => "System.String",
            FundamentalKind::Object => "System.Object",
        }
    }

    /// 整数型かどうか
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FundamentalKind::Int32
                | FundamentalKind::UInt32
                | FundamentalKind::Int64
                | FundamentalKind::UInt64
        )
    }

    /// 数値型かどうか
    pub fn is_numeric(self) -> bool {
        self.is_integer()
            || matches!(
                self,
                FundamentalKind::Single | FundamentalKind::Double | FundamentalKind::Decimal
            )
    }
}

/// 型情報
#[derive(Debug, Clone)]
pub enum TargetType {
    /// 基本型
    Fundamental(FundamentalKind),
    /// 構造体型・クラス型
    Class(ClassType),
    /// 列挙型
    Enum(EnumType),
    /// 配列型
    Array(ArrayType),
    /// ポインタ型
    Pointer(PointerType),
    /// Nullable型
    Nullable(NullableType),
}

impl TargetType {
    /// 構造体・クラス型として取得する
    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            TargetType::Class(c) => Some(c),
            _ => None,
        }
    }

    /// 列挙型として取得する
    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            TargetType::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// 基本型の種類を取得する
    pub fn fundamental_kind(&self) -> Option<FundamentalKind> {
        match self {
            TargetType::Fundamental(kind) => Some(*kind),
            _ => None,
        }
    }

    /// 参照型（null になり得る型）かどうか
    pub fn is_reference(&self) -> bool {
        match self {
            TargetType::Fundamental(kind) => {
                matches!(kind, FundamentalKind::String | FundamentalKind::Object)
            }
            TargetType::Class(c) => c.kind == ClassKind::Class,
            TargetType::Array(_) | TargetType::Pointer(_) | TargetType::Nullable(_) => true,
            TargetType::Enum(_) => false,
        }
    }
}

/// 構造体かクラスか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Struct,
    Class,
}

/// 構造体・クラス型
#[derive(Debug, Clone)]
pub struct ClassType {
    /// 完全修飾名（`Namespace.Outer.Name`）
    pub name: String,
    pub kind: ClassKind,
    /// 親クラス
    pub parent: Option<TypeHandle>,
    pub fields: Vec<FieldInfo>,
    pub properties: Vec<PropertyInfo>,
    pub events: Vec<EventInfo>,
    pub methods: Vec<MethodInfo>,
    /// コンストラクタ（`.ctor`）
    pub constructors: Vec<MethodInfo>,
    /// 静的コンストラクタ（`.cctor`）
    pub static_constructors: Vec<MethodInfo>,
    /// デバッガ表示用の書式文字列属性
    pub debugger_display: Option<String>,
}

impl ClassType {
    /// 空の構造体・クラス型を作成する
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            fields: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            static_constructors: Vec::new(),
            debugger_display: None,
        }
    }

    /// 名前空間を除いた短い型名
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// 型名から導出される名前空間（外側から順）
    pub fn namespace(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(ns, _)| ns)
    }

    /// インスタンスフィールドの数（このレベルのみ）
    pub fn instance_field_count(&self) -> usize {
        self.fields.iter().filter(|f| !f.is_static).count()
    }
}

/// 列挙型のメンバ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    /// 値のビットパターン
    pub value: u64,
}

/// 列挙型
#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    /// 基底の整数型
    pub underlying: FundamentalKind,
    /// `[Flags]` 属性付きかどうか
    pub is_flags: bool,
    pub members: Vec<EnumMember>,
}

/// 配列型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayType {
    pub element: TypeHandle,
    pub rank: u32,
}

/// ポインタ型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerType {
    pub target: TypeHandle,
    /// 参照先の型が信頼できる（デリファレンス可能な）ポインタかどうか
    pub type_safe: bool,
}

/// Nullable型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullableType {
    pub inner: TypeHandle,
}
