//! 式の抽象構文木
//!
//! パーサーが作る未解決ノードと、解決フェーズが書き換えた解決済みノードを同じ列挙型で表します。
//! 動的な操作（評価・代入）は `resolved` なノードにだけ許されます。

use mirra_target::{LocalVariable, ObjectHandle};
use mirra_types::{MethodInfo, Scalar, TargetMemberInfo, TypeHandle};
use std::fmt;

/// 評価結果の値
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// ホスト側の値（リテラル・レジスタ）
    Scalar(Scalar),
    /// ターゲット内の値
    Object(ObjectHandle),
    /// 型のない null リテラル
    Null,
    /// `typeof(T)` の結果
    Type(TypeHandle),
    /// 戻り値のない呼び出し
    Void,
}

/// 式ノードの種類
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ---- パーサーが作るノード ----
    Literal(Scalar),
    Null,
    This,
    Base,
    /// 単純名
    Identifier(String),
    /// `left.name`
    MemberAccess { left: Box<Expression>, name: String },
    /// `callee(args)`
    Invocation { callee: Box<Expression>, args: Vec<Expression> },
    /// `new T(args)`
    New { ty: Box<Expression>, args: Vec<Expression> },
    /// `(T) operand`
    Cast { ty: Box<Expression>, operand: Box<Expression> },
    /// `array[i, j]`
    Index { array: Box<Expression>, indices: Vec<Expression> },
    /// `*p`
    Deref(Box<Expression>),
    /// `&x`
    AddressOf(Box<Expression>),
    /// `-x`
    Negate(Box<Expression>),
    /// `$rax`
    Register(String),
    /// `target = value`
    Assign { target: Box<Expression>, value: Box<Expression> },
    /// `typeof(T)`
    TypeOf(Box<Expression>),
    /// 型の修飾（`T*`, `T[]`, `T?`）
    PointerType(Box<Expression>),
    ArrayType { element: Box<Expression>, rank: u32 },
    NullableType(Box<Expression>),

    // ---- 解決フェーズが作るノード ----
    /// 型参照
    TypeRef(TypeHandle),
    /// ローカル変数・引数
    Variable(LocalVariable),
    /// フィールド・プロパティ・イベントへのアクセス（静的メンバなら `instance` は None）
    Member {
        instance: Option<Box<Expression>>,
        member: TargetMemberInfo,
    },
    /// 呼び出し前のメソッド候補
    MethodGroup {
        instance: Option<Box<Expression>>,
        name: String,
        methods: Vec<MethodInfo>,
    },
    /// オーバーロード解決済みの呼び出し
    Call {
        instance: Option<Box<Expression>>,
        method: MethodInfo,
        args: Vec<Expression>,
    },
    /// コンストラクタ呼び出し
    Construct {
        ty: TypeHandle,
        ctor: MethodInfo,
        args: Vec<Expression>,
    },
}

/// 式ノード
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    /// 診断に使う表示名
    name: String,
    resolved: bool,
}

impl Expression {
    /// 未解決のノードを作成する
    pub fn new(kind: ExprKind) -> Self {
        let name = display_name(&kind);
        let resolved = matches!(kind, ExprKind::Literal(_) | ExprKind::Null);
        Self {
            kind,
            name,
            resolved,
        }
    }

    /// 解決済みのノードを作成する（表示名は元のノードから引き継ぐ）
    pub(crate) fn resolved(kind: ExprKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            resolved: true,
        }
    }

    /// 表示名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// 型を表すノードか
    pub fn is_type(&self) -> bool {
        matches!(self.kind, ExprKind::TypeRef(_))
    }

    /// `a.b.c` のような単純名の連鎖なら連結した名前を返す
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name.clone()),
            ExprKind::MemberAccess { left, name } => {
                Some(format!("{}.{}", left.dotted_name()?, name))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn join(args: &[Expression]) -> String {
    args.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
}

fn display_name(kind: &ExprKind) -> String {
    match kind {
        ExprKind::Literal(v) => v.to_string(),
        ExprKind::Null => "null".to_string(),
        ExprKind::This => "this".to_string(),
        ExprKind::Base => "base".to_string(),
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::MemberAccess { left, name } => format!("{}.{}", left.name, name),
        ExprKind::Invocation { callee, args } => format!("{}({})", callee.name, join(args)),
        ExprKind::New { ty, args } => format!("new {}({})", ty.name, join(args)),
        ExprKind::Cast { ty, operand } => format!("({}) {}", ty.name, operand.name),
        ExprKind::Index { array, indices } => format!("{}[{}]", array.name, join(indices)),
        ExprKind::Deref(e) => format!("*{}", e.name),
        ExprKind::AddressOf(e) => format!("&{}", e.name),
        ExprKind::Negate(e) => format!("-{}", e.name),
        ExprKind::Register(name) => format!("${}", name),
        ExprKind::Assign { target, value } => format!("{} = {}", target.name, value.name),
        ExprKind::TypeOf(e) => format!("typeof({})", e.name),
        ExprKind::PointerType(e) => format!("{}*", e.name),
        ExprKind::ArrayType { element, rank } => {
            format!("{}[{}]", element.name, ",".repeat(rank.saturating_sub(1) as usize))
        }
        ExprKind::NullableType(e) => format!("{}?", e.name),
        ExprKind::TypeRef(ty) => ty.to_string(),
        ExprKind::Variable(var) => var.name.clone(),
        ExprKind::Member { member, .. } => member.name.clone(),
        ExprKind::MethodGroup { name, .. } => name.clone(),
        ExprKind::Call { method, args, .. } => format!("{}({})", method.name, join(args)),
        ExprKind::Construct { ctor, args, .. } => format!("new {}({})", ctor.name, join(args)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expression {
        Expression::new(ExprKind::Identifier(name.to_string()))
    }

    #[test]
    fn test_literal_is_born_resolved() {
        let e = Expression::new(ExprKind::Literal(Scalar::Int32(5)));
        assert!(e.is_resolved());
        assert!(!ident("x").is_resolved());
    }

    #[test]
    fn test_display_names() {
        let member = Expression::new(ExprKind::MemberAccess {
            left: Box::new(ident("foo")),
            name: "Data".to_string(),
        });
        assert_eq!(member.name(), "foo.Data");
        let call = Expression::new(ExprKind::Invocation {
            callee: Box::new(ident("Add")),
            args: vec![
                Expression::new(ExprKind::Literal(Scalar::Int32(1))),
                ident("x"),
            ],
        });
        assert_eq!(call.to_string(), "Add(1, x)");
    }

    #[test]
    fn test_dotted_name() {
        let e = Expression::new(ExprKind::MemberAccess {
            left: Box::new(Expression::new(ExprKind::MemberAccess {
                left: Box::new(ident("Demo")),
                name: "Tester".to_string(),
            })),
            name: "Counter".to_string(),
        });
        assert_eq!(e.dotted_name().as_deref(), Some("Demo.Tester.Counter"));
    }
}
