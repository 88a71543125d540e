//! メンバ・オーバーロード・キャストの解決
//!
//! メンバ検索は与えられた型だけを見て親クラスはたどりません。継承階層の各レベルは別々の
//! 生きた値なので、階層を下るときは呼び出し側が明示的にたどります。

use crate::errors::EvalError;
use crate::Result;
use mirra_target::{ObjectHandle, Target};
use mirra_types::{
    FundamentalKind, MemberKind, MethodInfo, Scalar, TargetMemberInfo, TargetType, TypeCatalog,
    TypeHandle,
};
use tracing::{debug, trace};

/// コンストラクタの名前
pub const CONSTRUCTOR_NAME: &str = ".ctor";
/// 静的コンストラクタの名前
pub const STATIC_CONSTRUCTOR_NAME: &str = ".cctor";

/// 診断メッセージ用の型名（クラス・列挙型は名前空間を除く）
pub fn short_type_name(types: &TypeCatalog, ty: TypeHandle) -> String {
    match types.get(ty).as_deref() {
        Some(TargetType::Class(c)) => c.short_name().to_string(),
        Some(TargetType::Enum(e)) => e.name.rsplit('.').next().unwrap_or(&e.name).to_string(),
        _ => types.name_of(ty),
    }
}

/// 型のメンバを検索する
///
/// インスタンスフィールド → インスタンスプロパティ → インスタンスイベント → 静的フィールド →
/// 静的プロパティ → 静的イベントの順に探します。`static_only` ならインスタンスメンバは飛ばします。
pub fn find_member(
    types: &TypeCatalog,
    ty: TypeHandle,
    static_only: bool,
    name: &str,
) -> Option<TargetMemberInfo> {
    let info = types.get(ty)?;
    let class = info.as_class()?;

    let member = |kind: MemberKind, is_static: bool, index: usize, member_ty: TypeHandle| TargetMemberInfo {
        name: name.to_string(),
        is_static,
        kind,
        declaring_type: ty,
        index,
        ty: member_ty,
    };

    for want_static in [false, true] {
        if !want_static && static_only {
            continue;
        }
        if let Some((i, f)) = class
            .fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.is_static == want_static && f.name == name)
        {
            return Some(member(MemberKind::Field, want_static, i, f.ty));
        }
        if let Some((i, p)) = class
            .properties
            .iter()
            .enumerate()
            .find(|(_, p)| p.is_static == want_static && p.name == name)
        {
            return Some(member(MemberKind::Property, want_static, i, p.ty));
        }
        if let Some((i, e)) = class
            .events
            .iter()
            .enumerate()
            .find(|(_, e)| e.is_static == want_static && e.name == name)
        {
            return Some(member(MemberKind::Event, want_static, i, e.ty));
        }
    }
    None
}

/// 型と親クラスをたどってメンバを検索する
pub fn find_member_in_chain(
    types: &TypeCatalog,
    ty: TypeHandle,
    static_only: bool,
    name: &str,
) -> Option<TargetMemberInfo> {
    let mut current = Some(ty);
    while let Some(level) = current {
        if let Some(member) = find_member(types, level, static_only, name) {
            return Some(member);
        }
        current = types.parent_of(level);
    }
    None
}

/// メソッド候補を集める
///
/// `.ctor` / `.cctor` はコンストラクタ一覧から、それ以外は（`instance_allowed` なら）インスタンスメソッドと
/// すべての静的メソッドから集めます。候補がなく親クラスがあれば親の型で探し直します。
pub fn find_methods(
    types: &TypeCatalog,
    ty: TypeHandle,
    name: &str,
    instance_allowed: bool,
) -> Vec<MethodInfo> {
    let mut current = Some(ty);
    while let Some(level) = current {
        let Some(info) = types.get(level) else {
            break;
        };
        let Some(class) = info.as_class() else {
            break;
        };
        let candidates: Vec<MethodInfo> = match name {
            CONSTRUCTOR_NAME => class.constructors.clone(),
            STATIC_CONSTRUCTOR_NAME => class.static_constructors.clone(),
            _ => class
                .methods
                .iter()
                .filter(|m| m.name == name && (m.is_static || instance_allowed))
                .cloned()
                .collect(),
        };
        if !candidates.is_empty() {
            return candidates
                .into_iter()
                .map(|mut m| {
                    m.declaring_type.get_or_insert(level);
                    m
                })
                .collect();
        }
        current = class.parent;
    }
    Vec::new()
}

/// オーバーロード解決
///
/// 引数の数で絞り込み、残りが複数なら引数の型と仮引数の型の完全一致を要求します。
/// 暗黙の変換や最適候補の採点は行いません。
pub fn overload_resolve(
    name: &str,
    candidates: &[MethodInfo],
    arg_count: usize,
    arg_types: Option<&[TypeHandle]>,
) -> Result<MethodInfo> {
    let by_arity: Vec<&MethodInfo> = candidates
        .iter()
        .filter(|m| m.parameters.len() == arg_count)
        .collect();

    match by_arity.len() {
        0 => return Err(no_overload(name, arg_count)),
        1 => return Ok(by_arity[0].clone()),
        _ => {}
    }

    let Some(arg_types) = arg_types else {
        return Err(ambiguous(name));
    };

    let exact: Vec<&MethodInfo> = by_arity
        .into_iter()
        .filter(|m| m.parameter_types().eq(arg_types.iter().copied()))
        .collect();
    match exact.as_slice() {
        [] => Err(no_overload(name, arg_count)),
        [method] => {
            debug!("overload of {} selected by exact parameter types", name);
            Ok((*method).clone())
        }
        _ => Err(ambiguous(name)),
    }
}

fn no_overload(name: &str, count: usize) -> EvalError {
    EvalError::scripting(format!(
        "No overload for method `{}` has {} arguments.",
        name, count
    ))
}

fn ambiguous(name: &str) -> EvalError {
    EvalError::scripting(format!("Ambiguous method `{}`; use full name.", name))
}

/// 継承階層を親へたどって指定の型のレベルのプロキシを探す
pub fn level_of(
    target: &dyn Target,
    object: ObjectHandle,
    ty: TypeHandle,
) -> std::result::Result<Option<ObjectHandle>, mirra_target::TargetError> {
    let mut current = Some(object);
    while let Some(handle) = current {
        let obj = target.object(handle)?;
        if obj.ty == ty {
            return Ok(Some(handle));
        }
        current = obj.as_class().and_then(|c| c.parent);
    }
    Ok(None)
}

fn chain_contains(types: &TypeCatalog, from: TypeHandle, ty: TypeHandle) -> bool {
    let mut current = Some(from);
    while let Some(level) = current {
        if level == ty {
            return true;
        }
        current = types.parent_of(level);
    }
    false
}

/// 構造体・クラスの値をキャストする
///
/// 型の同一性 → 静的型の親の連鎖 → 実行時型（最派生）の連鎖の順に調べます。
/// 無関係な型へのキャストは None を返します。
pub fn cast_object(
    target: &dyn Target,
    object: ObjectHandle,
    declared: TypeHandle,
    to: TypeHandle,
) -> std::result::Result<Option<ObjectHandle>, mirra_target::TargetError> {
    let obj = target.object(object)?;
    if obj.ty == to {
        return Ok(Some(object));
    }
    let types = target.types();
    if chain_contains(types, declared, to) {
        if let Some(level) = level_of(target, object, to)? {
            trace!("cast to {} via declared type chain", types.name_of(to));
            return Ok(Some(level));
        }
    }
    let Some(class) = obj.as_class() else {
        return Ok(None);
    };
    let runtime = target.object(class.runtime)?;
    if chain_contains(types, runtime.ty, to) {
        trace!("cast to {} via runtime type chain", types.name_of(to));
        return level_of(target, class.runtime, to);
    }
    Ok(None)
}

/// スカラー値を基本型に変換する
///
/// `explicit` でなければ C# の暗黙の数値変換（値の欠落しない拡大変換）だけを許します。
pub fn convert_scalar(value: &Scalar, to: FundamentalKind, explicit: bool) -> Option<Scalar> {
    if value.kind() == to {
        return Some(value.clone());
    }
    if to == FundamentalKind::Object {
        return Some(value.clone());
    }
    let from = value.kind();
    if !explicit && !is_implicit_numeric(from, to) {
        return None;
    }
    if let Some(i) = value.as_i128() {
        return Some(match to {
            FundamentalKind::Int32 => Scalar::Int32(narrow(i)?),
            FundamentalKind::UInt32 => Scalar::UInt32(narrow(i)?),
            FundamentalKind::Int64 => Scalar::Int64(narrow(i)?),
            FundamentalKind::UInt64 => Scalar::UInt64(narrow(i)?),
            FundamentalKind::Char => Scalar::Char(char::from_u32(narrow(i)?)?),
            FundamentalKind::Single => Scalar::Single(i as f32),
            FundamentalKind::Double => Scalar::Double(i as f64),
            FundamentalKind::Decimal => Scalar::Decimal(mirra_types::Decimal::new(i, 0)),
            _ => return None,
        });
    }
    let real = match value {
        Scalar::Single(v) => f64::from(*v),
        Scalar::Double(v) => *v,
        _ => return None,
    };
    Some(match to {
        FundamentalKind::Single => Scalar::Single(real as f32),
        FundamentalKind::Double => Scalar::Double(real),
        FundamentalKind::Int32 => Scalar::Int32(real as i32),
        FundamentalKind::UInt32 => Scalar::UInt32(real as u32),
        FundamentalKind::Int64 => Scalar::Int64(real as i64),
        FundamentalKind::UInt64 => Scalar::UInt64(real as u64),
        _ => return None,
    })
}

fn narrow<T: TryFrom<i128>>(value: i128) -> Option<T> {
    T::try_from(value).ok()
}

fn is_implicit_numeric(from: FundamentalKind, to: FundamentalKind) -> bool {
    use FundamentalKind::*;
    matches!(
        (from, to),
        (Int32, Int64 | Single | Double | Decimal)
            | (UInt32, Int64 | UInt64 | Single | Double | Decimal)
            | (Int64 | UInt64, Single | Double | Decimal)
            | (Char, Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal)
            | (Single, Double)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_types::{
        ClassKind, ClassType, FieldInfo, FunctionId, ParameterInfo, PropertyInfo,
    };

    fn method(name: &str, params: &[TypeHandle], id: u32) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            is_static: true,
            parameters: params
                .iter()
                .map(|ty| ParameterInfo {
                    name: "p".to_string(),
                    ty: *ty,
                })
                .collect(),
            return_type: None,
            function: FunctionId(id),
            declaring_type: None,
        }
    }

    #[test]
    fn test_find_member_order() {
        let types = TypeCatalog::new();
        let int = types.fundamental(FundamentalKind::Int32);
        let mut class = ClassType::new("T", ClassKind::Class);
        class.fields.push(FieldInfo::new("X", int).static_field());
        class.properties.push(PropertyInfo {
            name: "X".to_string(),
            ty: int,
            is_static: false,
            getter: None,
            setter: None,
        });
        let ty = types.register(TargetType::Class(class));

        let found = find_member(&types, ty, false, "X").unwrap();
        assert_eq!(found.kind, MemberKind::Property);
        assert!(!found.is_static);

        let found = find_member(&types, ty, true, "X").unwrap();
        assert_eq!(found.kind, MemberKind::Field);
        assert!(found.is_static);
        assert!(find_member(&types, ty, false, "Y").is_none());
    }

    #[test]
    fn test_find_member_does_not_walk_parents() {
        let types = TypeCatalog::new();
        let int = types.fundamental(FundamentalKind::Int32);
        let mut parent = ClassType::new("P", ClassKind::Class);
        parent.fields.push(FieldInfo::new("X", int));
        let parent = types.register(TargetType::Class(parent));
        let mut child = ClassType::new("C", ClassKind::Class);
        child.parent = Some(parent);
        let child = types.register(TargetType::Class(child));

        assert!(find_member(&types, child, false, "X").is_none());
        let found = find_member_in_chain(&types, child, false, "X").unwrap();
        assert_eq!(found.declaring_type, parent);
    }

    #[test]
    fn test_find_methods_falls_back_to_parent() {
        let types = TypeCatalog::new();
        let mut parent = ClassType::new("P", ClassKind::Class);
        parent.methods.push(method("Run", &[], 1));
        let mut instance_only = method("Stop", &[], 2);
        instance_only.is_static = false;
        parent.methods.push(instance_only);
        let parent = types.register(TargetType::Class(parent));
        let mut child = ClassType::new("C", ClassKind::Class);
        child.parent = Some(parent);
        let child = types.register(TargetType::Class(child));

        let found = find_methods(&types, child, "Run", false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].declaring_type, Some(parent));
        assert!(find_methods(&types, child, "Stop", false).is_empty());
        assert_eq!(find_methods(&types, child, "Stop", true).len(), 1);
    }

    #[test]
    fn test_overload_resolution() {
        let types = TypeCatalog::new();
        let int = types.fundamental(FundamentalKind::Int32);
        let string = types.fundamental(FundamentalKind::String);
        let root = types.register(TargetType::Class(ClassType::new("Root", ClassKind::Class)));
        let candidates = vec![
            method("Overloaded", &[], 1),
            method("Overloaded", &[int], 2),
            method("Overloaded", &[root], 3),
        ];

        let m = overload_resolve("Overloaded", &candidates, 0, Some(&[])).unwrap();
        assert_eq!(m.function, FunctionId(1));
        let m = overload_resolve("Overloaded", &candidates, 1, Some(&[int])).unwrap();
        assert_eq!(m.function, FunctionId(2));
        let again = overload_resolve("Overloaded", &candidates, 1, Some(&[int])).unwrap();
        assert_eq!(m, again);

        let err = overload_resolve("Overloaded", &candidates, 1, Some(&[string])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No overload for method `Overloaded` has 1 arguments."
        );
        let err = overload_resolve("Overloaded", &candidates, 2, Some(&[int, int])).unwrap_err();
        assert!(err.to_string().contains("has 2 arguments"));
        let err = overload_resolve("Overloaded", &candidates, 1, None).unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }

    #[test]
    fn test_ambiguous_exact_matches_fail() {
        let types = TypeCatalog::new();
        let int = types.fundamental(FundamentalKind::Int32);
        let candidates = vec![method("F", &[int], 1), method("F", &[int], 2)];
        assert!(overload_resolve("F", &candidates, 1, Some(&[int])).is_err());
    }

    #[test]
    fn test_convert_scalar() {
        assert_eq!(
            convert_scalar(&Scalar::Int32(5), FundamentalKind::Int64, false),
            Some(Scalar::Int64(5))
        );
        assert_eq!(convert_scalar(&Scalar::Int64(5), FundamentalKind::Int32, false), None);
        assert_eq!(
            convert_scalar(&Scalar::Int64(5), FundamentalKind::Int32, true),
            Some(Scalar::Int32(5))
        );
        assert_eq!(
            convert_scalar(&Scalar::Double(2.9), FundamentalKind::Int32, true),
            Some(Scalar::Int32(2))
        );
        assert_eq!(
            convert_scalar(&Scalar::String("x".into()), FundamentalKind::Int32, true),
            None
        );
    }
}
