//! Mirra ミラー型システム
//!
//! このクレートは、停止中のターゲットプロセスの型システムを写し取ったモデルを提供します。
//! 型カタログ（構造体・クラス・列挙型・配列・ポインタ・Nullable）、メンバ記述子、
//! スカラー値（decimalを含む）を扱います。

pub mod catalog;
pub mod member;
pub mod scalar;
pub mod type_info;

pub use catalog::{TypeCatalog, TypeHandle};
pub use member::{
    EventInfo, FieldInfo, FunctionId, MemberKind, MethodInfo, ParameterInfo, PropertyInfo,
    TargetMemberInfo,
};
pub use scalar::{Decimal, ParseDecimalError, Scalar};
pub use type_info::{
    ArrayType, ClassKind, ClassType, EnumMember, EnumType, FundamentalKind, NullableType,
    PointerType, TargetType,
};

/// 万物の基底型の名前
pub const OBJECT_TYPE_NAME: &str = "object";
