//! デモ用のターゲット
//!
//! CLI の `demo` サブコマンドと統合テストが使うシナリオを構築します。
//! スレッド 1 が `Demo.Tester.Main` で停止しており、次のローカル変数を持ちます。
//!
//! | 名前 | 型 | 値 |
//! |------|----|----|
//! | `foo` | `Demo.Foo` | `{ Data = 5 }` |
//! | `derived` | `Demo.D` | `D : C : B` のインスタンス |
//! | `other` | `Demo.A` | 無関係なクラスのインスタンス |
//! | `pub` | `Demo.Pub` | `0x301f`（フラグ列挙型） |
//! | `numbers` | `int[]` | 下限 1、長さ 3 |
//! | `grid` | `int[,]` | 2x2 |
//! | `empty` | `int[]` | 未割り当て |
//! | `ptr` | `int*` | 42 を指す |
//! | `maybe` / `nothing` | `int?` | 7 / null |
//! | `origin` | `Demo.Point` | DebuggerDisplay 付き構造体 |
//! | `greeting` | `string` | `"hello"` |
//! | `root` | `Demo.Root` | null |

use super::{SimFrame, SimTarget};
use crate::{Dimension, InvocationOutcome, Location, Result, Target, ThreadId};
use mirra_types::{
    ClassKind, ClassType, EnumMember, EnumType, FieldInfo, FundamentalKind, MethodInfo,
    ParameterInfo, PropertyInfo, Scalar, TargetType, TypeHandle,
};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// デモのスレッド
pub const DEMO_THREAD: ThreadId = ThreadId(1);

/// フラグ列挙型 `Demo.Pub` のメンバ
pub const PUB_MEMBERS: [(&str, u64); 7] = [
    ("Music", 0x1),
    ("Drinks", 0x2),
    ("Food", 0x4),
    ("Games", 0x8),
    ("Darts", 0x10),
    ("Quiz", 0x1000),
    ("Karaoke", 0x2000),
];

fn method(name: &str, is_static: bool, params: &[(&str, TypeHandle)], ret: Option<TypeHandle>) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        is_static,
        parameters: params
            .iter()
            .map(|(n, ty)| ParameterInfo {
                name: n.to_string(),
                ty: *ty,
            })
            .collect(),
        return_type: ret,
        function: mirra_types::FunctionId(0),
        declaring_type: None,
    }
}

/// デモのターゲットを構築する
pub fn build() -> Result<Arc<SimTarget>> {
    let target = Arc::new(SimTarget::new(4242));
    let types = target.types();
    let int = types.fundamental(FundamentalKind::Int32);
    let string = types.fundamental(FundamentalKind::String);

    // ---- 型 ----
    let root = types.register(TargetType::Class(ClassType::new("Demo.Root", ClassKind::Class)));

    let mut exception = ClassType::new("Demo.DemoException", ClassKind::Class);
    exception.fields.push(FieldInfo::new("Message", string));
    let exception = types.register(TargetType::Class(exception));

    let mut foo = ClassType::new("Demo.Foo", ClassKind::Struct);
    foo.fields.push(FieldInfo::new("Data", int));
    let foo = types.register(TargetType::Class(foo));

    let a = {
        let mut class = ClassType::new("Demo.A", ClassKind::Class);
        class.fields.push(FieldInfo::new("AValue", int));
        types.register(TargetType::Class(class))
    };
    let b = {
        let mut class = ClassType::new("Demo.B", ClassKind::Class);
        class.fields.push(FieldInfo::new("BValue", int));
        let mut limit = FieldInfo::new("Limit", int);
        limit.const_value = Some(Scalar::Int32(100));
        class.fields.push(limit);
        types.register(TargetType::Class(class))
    };
    let c = {
        let mut class = ClassType::new("Demo.C", ClassKind::Class);
        class.parent = Some(b);
        class.fields.push(FieldInfo::new("CValue", int));
        let mut backing = FieldInfo::new("<Name>k__BackingField", string);
        backing.compiler_generated = true;
        class.fields.push(backing);
        types.register(TargetType::Class(class))
    };
    let d = {
        let mut class = ClassType::new("Demo.D", ClassKind::Class);
        class.parent = Some(c);
        class.fields.push(FieldInfo::new("DValue", int));
        let mut hidden = FieldInfo::new("cache", int);
        hidden.browsable = false;
        class.fields.push(hidden);
        types.register(TargetType::Class(class))
    };

    let pub_enum = types.register(TargetType::Enum(EnumType {
        name: "Demo.Pub".to_string(),
        underlying: FundamentalKind::Int32,
        is_flags: true,
        members: PUB_MEMBERS
            .iter()
            .map(|(name, value)| EnumMember {
                name: name.to_string(),
                value: *value,
            })
            .collect(),
    }));

    let point = {
        let mut class = ClassType::new("Demo.Point", ClassKind::Struct);
        class.fields.push(FieldInfo::new("X", int));
        class.fields.push(FieldInfo::new("Y", int));
        class.debugger_display = Some("Point({X}, {Y})".to_string());
        types.register(TargetType::Class(class))
    };

    let tester = {
        let mut class = ClassType::new("Demo.Tester", ClassKind::Class);
        class.fields.push(FieldInfo::new("Counter", int).static_field());
        types.register(TargetType::Class(class))
    };

    // ---- 関数 ----
    let foo_ctor = target.define_function("Demo.Foo..ctor", move |call| {
        let Some(data) = call.args.first().copied() else {
            return InvocationOutcome::Returned(None);
        };
        match call.target.alloc_instance(foo, &[("Data", data)]) {
            Ok(instance) => InvocationOutcome::Returned(Some(instance)),
            Err(_) => InvocationOutcome::Returned(None),
        }
    });
    let foo_twice = target.define_function("Demo.Foo.get_Twice", |call| {
        let value = call
            .instance
            .and_then(|this| call.target.read(&Location::Field { object: this, index: 0 }).ok())
            .and_then(|h| call.target.object(h).ok())
            .and_then(|o| o.as_scalar().and_then(Scalar::as_i128));
        match value {
            Some(v) => call.returns(Scalar::Int32((v * 2) as i32)),
            None => InvocationOutcome::Returned(None),
        }
    });
    let overload0 = target.define_function("Demo.Tester.Overloaded()", |call| {
        call.returns(Scalar::String("Overloaded()".into()))
    });
    let overload_int = target.define_function("Demo.Tester.Overloaded(int)", |call| {
        call.returns(Scalar::String("Overloaded(int)".into()))
    });
    let overload_root = target.define_function("Demo.Tester.Overloaded(Root)", |call| {
        call.returns(Scalar::String("Overloaded(Root)".into()))
    });
    let add = target.define_function("Demo.Tester.Add", |call| {
        match (call.scalar_arg(0), call.scalar_arg(1)) {
            (Some(Scalar::Int32(x)), Some(Scalar::Int32(y))) => call.returns(Scalar::Int32(x.wrapping_add(y))),
            _ => InvocationOutcome::Returned(None),
        }
    });
    let hang = target.define_function("Demo.Tester.Hang", |call| call.block_forever());
    let fail = target.define_function("Demo.Tester.Fail", move |call| {
        let message = call.target.alloc_string("Something went wrong");
        match call.target.alloc_instance(exception, &[("Message", message)]) {
            Ok(e) => InvocationOutcome::Exception(e),
            Err(_) => InvocationOutcome::Returned(None),
        }
    });
    // 呼ばれるたびに 1, 2, 3, ... を返す
    let ticks = Arc::new(AtomicI32::new(0));
    let next = target.define_function("Demo.Tester.Next", move |call| {
        call.returns(Scalar::Int32(ticks.fetch_add(1, Ordering::SeqCst) + 1))
    });
    let stop_here = target.define_function_with_breakpoint("Demo.Tester.StopHere", |call| {
        call.returns(Scalar::Int32(1))
    });

    types.update_class(foo, |class| {
        let mut ctor = method(".ctor", false, &[("data", int)], Some(foo));
        ctor.function = foo_ctor;
        ctor.declaring_type = Some(foo);
        class.constructors.push(ctor);
        class.properties.push(PropertyInfo {
            name: "Twice".to_string(),
            ty: int,
            is_static: false,
            getter: Some(foo_twice),
            setter: None,
        });
    });
    types.update_class(tester, |class| {
        for (info, function) in [
            (method("Overloaded", true, &[], Some(string)), overload0),
            (method("Overloaded", true, &[("x", int)], Some(string)), overload_int),
            (method("Overloaded", true, &[("r", root)], Some(string)), overload_root),
            (method("Add", true, &[("x", int), ("y", int)], Some(int)), add),
            (method("Hang", true, &[], None), hang),
            (method("Fail", true, &[], None), fail),
            (method("Next", true, &[], Some(int)), next),
            (method("StopHere", true, &[], Some(int)), stop_here),
        ] {
            let mut info = info;
            info.function = function;
            info.declaring_type = Some(tester);
            class.methods.push(info);
        }
    });

    // ---- 値 ----
    let five = target.alloc_scalar(Scalar::Int32(5));
    let foo_value = target.alloc_instance(foo, &[("Data", five)])?;

    let derived = target.alloc_instance(
        d,
        &[
            ("BValue", target.alloc_scalar(Scalar::Int32(1))),
            ("CValue", target.alloc_scalar(Scalar::Int32(2))),
            ("DValue", target.alloc_scalar(Scalar::Int32(3))),
        ],
    )?;
    let other = target.alloc_instance(a, &[("AValue", target.alloc_scalar(Scalar::Int32(9)))])?;
    let pub_value = target.alloc_enum(pub_enum, 0x301f);

    let numbers = target.alloc_array(
        int,
        Some(vec![Dimension::new(1, 3)]),
        [10, 20, 30].into_iter().map(|v| target.alloc_scalar(Scalar::Int32(v))).collect(),
    );
    let grid = target.alloc_array(
        int,
        Some(vec![Dimension::new(0, 2), Dimension::new(0, 2)]),
        [1, 2, 3, 4].into_iter().map(|v| target.alloc_scalar(Scalar::Int32(v))).collect(),
    );
    let empty = target.alloc_array(int, None, Vec::new());
    let numbers_ty = target.object(numbers)?.ty;
    let grid_ty = target.object(grid)?.ty;

    let pointee = target.alloc_scalar(Scalar::Int32(42));
    let ptr = target.address_of(pointee)?;
    let ptr_ty = target.object(ptr)?.ty;

    let maybe = target.alloc_nullable(int, Some(target.alloc_scalar(Scalar::Int32(7))));
    let nothing = target.alloc_nullable(int, None);
    let nullable_ty = types.nullable_of(int);

    let origin = target.alloc_instance(
        point,
        &[
            ("X", target.alloc_scalar(Scalar::Int32(3))),
            ("Y", target.alloc_scalar(Scalar::Int32(4))),
        ],
    )?;
    let greeting = target.alloc_string("hello");
    let no_root = target.alloc_null(root);

    target.set_static(tester, "Counter", target.alloc_scalar(Scalar::Int32(0)))?;

    // ---- スレッド ----
    target.add_thread(DEMO_THREAD);
    target.set_register(DEMO_THREAD, "rip", 0x0040_1a2b)?;
    target.set_register(DEMO_THREAD, "rsp", 0x7ffd_e000)?;
    target.push_frame(
        DEMO_THREAD,
        SimFrame {
            method: "Main".to_string(),
            declaring_type: Some(tester),
            namespaces: vec!["Demo".to_string()],
            locals: vec![
                ("foo".into(), foo, foo_value, false),
                ("derived".into(), d, derived, false),
                ("other".into(), a, other, false),
                ("pub".into(), pub_enum, pub_value, false),
                ("numbers".into(), numbers_ty, numbers, false),
                ("grid".into(), grid_ty, grid, false),
                ("empty".into(), numbers_ty, empty, false),
                ("ptr".into(), ptr_ty, ptr, false),
                ("maybe".into(), nullable_ty, maybe, false),
                ("nothing".into(), nullable_ty, nothing, false),
                ("origin".into(), point, origin, false),
                ("greeting".into(), string, greeting, false),
                ("root".into(), root, no_root, false),
            ],
            ..Default::default()
        },
    )?;

    debug!("demo target built with {} types", types.len());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_frame_has_locals() {
        let target = build().unwrap();
        let frame = target.current_frame(DEMO_THREAD).unwrap();
        assert_eq!(frame.method, "Main");
        assert!(frame.find_local("foo").is_some());
        assert!(frame.find_local("derived").is_some());
        assert!(target.is_stopped(DEMO_THREAD));
    }

    #[test]
    fn test_pub_members_reconstruct_value() {
        let all = PUB_MEMBERS.iter().fold(0, |acc, (_, v)| acc | v);
        assert_eq!(all, 0x301f);
    }
}
