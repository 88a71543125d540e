//! 式の解決と評価
//!
//! すべてのノードは2段階の契約に従います。
//! 1. `resolve`: 名前・メンバ・オーバーロードを静的に束縛し、より具体的なノードに書き換える
//! 2. `evaluate` / `evaluate_variable` / `evaluate_type` / `assign`: ターゲットの値を読み書きする
//!
//! ターゲットのメモリに触れる操作は、位置が無効になったエラーを変数名付きの診断に変換します。

use crate::context::EvaluationContext;
use crate::errors::{
    EvalError, ERR_INDEX_OUT_OF_RANGE, ERR_INVOCATION_DISABLED, ERR_NOT_RESOLVED,
    ERR_NULL_REFERENCE,
};
use crate::expression::{ExprKind, Expression, Value};
use crate::resolve::{
    cast_object, convert_scalar, find_member_in_chain, find_methods, level_of, overload_resolve,
    short_type_name, CONSTRUCTOR_NAME,
};
use crate::Result;
use mirra_target::registers::normalize_register_name;
use mirra_target::{
    InvocationOutcome, InvocationRequest, InvokeFlags, Location, ObjectHandle, ObjectKind, Target,
    TargetError,
};
use mirra_types::{
    FunctionId, FundamentalKind, MemberKind, MethodInfo, Scalar, TargetType, TypeCatalog,
    TypeHandle,
};
use std::sync::Arc;
use tracing::{debug, trace};

impl Expression {
    // ================================================================
    // 解決
    // ================================================================

    /// 名前を束縛して解決済みのノードを返す（解決済みなら自身の複製）
    pub fn resolve(&self, ctx: &EvaluationContext) -> Result<Expression> {
        if self.is_resolved() {
            return Ok(self.clone());
        }
        let name = self.name().to_string();
        let resolved = match &self.kind {
            ExprKind::This => {
                if ctx.this_object().is_none() {
                    return Err(EvalError::scripting(
                        "Keyword `this` is not available in the current context.",
                    ));
                }
                ExprKind::This
            }
            ExprKind::Base => {
                let scope = ctx.this_object().and(ctx.scope_type());
                let types = ctx.types()?;
                if scope.and_then(|ty| types.parent_of(ty)).is_none() {
                    return Err(EvalError::scripting(
                        "Keyword `base` is not available in the current context.",
                    ));
                }
                ExprKind::Base
            }
            ExprKind::Identifier(ident) => return self.resolve_identifier(ctx, ident),
            ExprKind::MemberAccess { left, name: member } => {
                return self.resolve_member_access(ctx, left, member)
            }
            ExprKind::Invocation { callee, args } => return self.resolve_invocation(ctx, callee, args),
            ExprKind::New { ty, args } => return self.resolve_new(ctx, ty, args),
            ExprKind::Cast { ty, operand } => ExprKind::Cast {
                ty: Box::new(ty.resolve_as_type(ctx)?),
                operand: Box::new(operand.resolve(ctx)?),
            },
            ExprKind::Index { array, indices } => {
                let array = array.resolve(ctx)?;
                let indices = indices
                    .iter()
                    .map(|i| i.resolve(ctx))
                    .collect::<Result<Vec<_>>>()?;
                let array_ty = array.evaluate_type(ctx)?;
                let types = ctx.types()?;
                match types.get(array_ty).as_deref() {
                    Some(TargetType::Array(a)) if a.rank as usize == indices.len() => {}
                    Some(TargetType::Array(a)) => {
                        return Err(EvalError::scripting(format!(
                            "Wrong number of indices inside []; expected {}.",
                            a.rank
                        )))
                    }
                    _ => {
                        return Err(EvalError::scripting(format!(
                            "Cannot apply indexing with [] to an expression of type `{}`.",
                            types.name_of(array_ty)
                        )))
                    }
                }
                ExprKind::Index {
                    array: Box::new(array),
                    indices,
                }
            }
            ExprKind::Deref(operand) => {
                let operand = operand.resolve(ctx)?;
                let ty = operand.evaluate_type(ctx)?;
                let types = ctx.types()?;
                if !matches!(types.get(ty).as_deref(), Some(TargetType::Pointer(_))) {
                    return Err(EvalError::scripting(format!(
                        "Cannot dereference `{}`: it is of type `{}`, not a pointer.",
                        operand.name(),
                        types.name_of(ty)
                    )));
                }
                ExprKind::Deref(Box::new(operand))
            }
            ExprKind::AddressOf(operand) => ExprKind::AddressOf(Box::new(operand.resolve(ctx)?)),
            ExprKind::Negate(operand) => ExprKind::Negate(Box::new(operand.resolve(ctx)?)),
            ExprKind::Register(reg) => match normalize_register_name(reg) {
                Some(normalized) => ExprKind::Register(normalized),
                None => {
                    return Err(EvalError::scripting(format!("Unknown register `${}`.", reg)))
                }
            },
            ExprKind::Assign { target, value } => {
                let target = target.resolve(ctx)?;
                if !target.is_lvalue() {
                    return Err(not_an_lvalue(&target));
                }
                ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value.resolve(ctx)?),
                }
            }
            ExprKind::TypeOf(ty) => ExprKind::TypeOf(Box::new(ty.resolve_as_type(ctx)?)),
            ExprKind::PointerType(_) | ExprKind::ArrayType { .. } | ExprKind::NullableType(_) => {
                return self.resolve_as_type(ctx)
            }
            other => {
                return Err(EvalError::Internal(format!(
                    "unexpected unresolved node {:?}",
                    other
                )))
            }
        };
        Ok(Expression::resolved(resolved, name))
    }

    /// 解決を試み、失敗したら None を返す
    pub fn try_resolve(&self, ctx: &EvaluationContext) -> Option<Expression> {
        match self.resolve(ctx) {
            Ok(e) => Some(e),
            Err(e) => {
                trace!("speculative resolution of `{}` failed: {}", self.name(), e);
                None
            }
        }
    }

    /// 型が要求される位置（キャスト・`new`・`typeof`）の式を型として解決する
    pub fn resolve_as_type(&self, ctx: &EvaluationContext) -> Result<Expression> {
        let name = self.name().to_string();
        let ty = match &self.kind {
            ExprKind::TypeRef(ty) => *ty,
            ExprKind::Identifier(_) | ExprKind::MemberAccess { .. } => {
                let dotted = self
                    .dotted_name()
                    .ok_or_else(|| not_a_type(self.name()))?;
                ctx.lookup_type(&dotted)?.ok_or_else(|| {
                    EvalError::scripting(format!(
                        "The type or namespace name `{}` could not be found.",
                        dotted
                    ))
                })?
            }
            ExprKind::PointerType(inner) => {
                let inner = inner.resolve_as_type(ctx)?.type_handle()?;
                ctx.types()?.pointer_to(inner, true)
            }
            ExprKind::ArrayType { element, rank } => {
                let element = element.resolve_as_type(ctx)?.type_handle()?;
                ctx.types()?.array_of(element, *rank)
            }
            ExprKind::NullableType(inner) => {
                let inner = inner.resolve_as_type(ctx)?.type_handle()?;
                ctx.types()?.nullable_of(inner)
            }
            _ => return Err(not_a_type(self.name())),
        };
        Ok(Expression::resolved(ExprKind::TypeRef(ty), name))
    }

    fn type_handle(&self) -> Result<TypeHandle> {
        match self.kind {
            ExprKind::TypeRef(ty) => Ok(ty),
            _ => Err(not_a_type(self.name())),
        }
    }

    fn this_expression() -> Expression {
        Expression::resolved(ExprKind::This, "this")
    }

    fn resolve_identifier(&self, ctx: &EvaluationContext, ident: &str) -> Result<Expression> {
        if let Some(local) = ctx.current_frame().and_then(|f| f.find_local(ident)) {
            return Ok(Expression::resolved(
                ExprKind::Variable(local.clone()),
                ident,
            ));
        }

        let has_this = ctx.this_object().is_some();
        if let Some(scope) = ctx.scope_type() {
            let types = ctx.types()?;
            if let Some(member) = find_member_in_chain(types, scope, !has_this, ident) {
                let instance = (!member.is_static).then(|| Box::new(Self::this_expression()));
                trace!("`{}` resolved as member of {}", ident, types.name_of(member.declaring_type));
                return Ok(Expression::resolved(
                    ExprKind::Member { instance, member },
                    ident,
                ));
            }
            let methods = find_methods(types, scope, ident, has_this);
            if !methods.is_empty() {
                return Ok(Expression::resolved(
                    ExprKind::MethodGroup {
                        instance: has_this.then(|| Box::new(Self::this_expression())),
                        name: ident.to_string(),
                        methods,
                    },
                    ident,
                ));
            }
        }

        if ctx.current_process().is_ok() {
            if let Some(ty) = ctx.lookup_type(ident)? {
                return Ok(Expression::resolved(ExprKind::TypeRef(ty), ident));
            }
        }

        Err(EvalError::scripting(format!(
            "The name `{}` does not exist in the current context.",
            ident
        )))
    }

    fn resolve_member_access(
        &self,
        ctx: &EvaluationContext,
        left: &Expression,
        member: &str,
    ) -> Result<Expression> {
        let name = self.name().to_string();
        let left = match left.try_resolve(ctx) {
            Some(left) => left,
            None => {
                // 名前空間で修飾された型名かもしれない
                if let Some(dotted) = self.dotted_name() {
                    if ctx.current_process().is_ok() {
                        if let Some(ty) = ctx.types()?.lookup(&dotted) {
                            return Ok(Expression::resolved(ExprKind::TypeRef(ty), name));
                        }
                    }
                }
                // 元のエラーを報告する
                left.resolve(ctx)?
            }
        };
        let types = ctx.types()?;

        if let ExprKind::TypeRef(ty) = left.kind {
            if let Some(m) = find_member_in_chain(types, ty, true, member) {
                return Ok(Expression::resolved(
                    ExprKind::Member {
                        instance: None,
                        member: m,
                    },
                    name,
                ));
            }
            let methods = find_methods(types, ty, member, false);
            if !methods.is_empty() {
                return Ok(Expression::resolved(
                    ExprKind::MethodGroup {
                        instance: None,
                        name: member.to_string(),
                        methods,
                    },
                    name,
                ));
            }
            if let Some(nested) = types.lookup(&format!("{}.{}", types.name_of(ty), member)) {
                return Ok(Expression::resolved(ExprKind::TypeRef(nested), name));
            }
            return Err(no_member(types, ty, member));
        }

        let ty = left.evaluate_type(ctx)?;
        if let Some(m) = find_member_in_chain(types, ty, false, member) {
            let instance = (!m.is_static).then(|| Box::new(left));
            return Ok(Expression::resolved(
                ExprKind::Member {
                    instance,
                    member: m,
                },
                name,
            ));
        }
        let methods = find_methods(types, ty, member, true);
        if !methods.is_empty() {
            return Ok(Expression::resolved(
                ExprKind::MethodGroup {
                    instance: Some(Box::new(left)),
                    name: member.to_string(),
                    methods,
                },
                name,
            ));
        }
        Err(no_member(types, ty, member))
    }

    fn resolve_arguments(
        ctx: &EvaluationContext,
        args: &[Expression],
    ) -> Result<(Vec<Expression>, Option<Vec<TypeHandle>>)> {
        let args = args
            .iter()
            .map(|a| a.resolve(ctx))
            .collect::<Result<Vec<_>>>()?;
        let arg_types = args
            .iter()
            .map(|a| a.evaluate_type(ctx).ok())
            .collect::<Option<Vec<_>>>();
        Ok((args, arg_types))
    }

    fn resolve_invocation(
        &self,
        ctx: &EvaluationContext,
        callee: &Expression,
        args: &[Expression],
    ) -> Result<Expression> {
        let callee = callee.resolve(ctx)?;
        let ExprKind::MethodGroup {
            instance,
            name: method_name,
            methods,
        } = callee.kind
        else {
            return Err(EvalError::scripting(format!(
                "`{}` is not a method.",
                callee.name()
            )));
        };
        let (args, arg_types) = Self::resolve_arguments(ctx, args)?;
        let method = overload_resolve(&method_name, &methods, args.len(), arg_types.as_deref())?;
        debug!(
            "`{}` resolved to {}({} parameters)",
            self.name(),
            method.name,
            method.parameters.len()
        );
        let instance = if method.is_static {
            None
        } else {
            Some(instance.ok_or_else(|| {
                EvalError::scripting(format!(
                    "An object reference is required for the non-static method `{}`.",
                    method_name
                ))
            })?)
        };
        Ok(Expression::resolved(
            ExprKind::Call {
                instance,
                method,
                args,
            },
            self.name(),
        ))
    }

    fn resolve_new(
        &self,
        ctx: &EvaluationContext,
        ty: &Expression,
        args: &[Expression],
    ) -> Result<Expression> {
        let ty = ty.resolve_as_type(ctx)?.type_handle()?;
        let types = ctx.types()?;
        let ctors = find_methods(types, ty, CONSTRUCTOR_NAME, false);
        if ctors.is_empty() {
            return Err(EvalError::scripting(format!(
                "Type `{}` has no constructor.",
                short_type_name(types, ty)
            )));
        }
        let (args, arg_types) = Self::resolve_arguments(ctx, args)?;
        let ctor = overload_resolve(
            &short_type_name(types, ty),
            &ctors,
            args.len(),
            arg_types.as_deref(),
        )?;
        Ok(Expression::resolved(
            ExprKind::Construct { ty, ctor, args },
            self.name(),
        ))
    }

    /// 代入先になれるノードか
    fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Register(_) => true,
            ExprKind::Member { member, .. } => {
                matches!(member.kind, MemberKind::Field | MemberKind::Property)
            }
            _ => false,
        }
    }

    // ================================================================
    // 評価
    // ================================================================

    fn ensure_resolved(&self) -> Result<()> {
        if self.is_resolved() {
            Ok(())
        } else {
            Err(EvalError::Internal(format!(
                "{}: `{}`",
                ERR_NOT_RESOLVED,
                self.name()
            )))
        }
    }

    /// ターゲットのエラーを診断に変換する
    fn target_error(&self, e: TargetError) -> EvalError {
        match e {
            TargetError::LocationInvalid(detail) => EvalError::scripting(format!(
                "location of variable `{}` is invalid: {}",
                self.name(),
                detail
            )),
            other => other.into(),
        }
    }

    /// 静的な型を求める
    pub fn evaluate_type(&self, ctx: &EvaluationContext) -> Result<TypeHandle> {
        self.ensure_resolved()?;
        match &self.kind {
            ExprKind::Literal(v) => Ok(ctx.types()?.fundamental(v.kind())),
            ExprKind::Null => Ok(ctx.types()?.object_type()),
            ExprKind::This => ctx
                .scope_type()
                .ok_or_else(|| EvalError::scripting("Cannot determine the type of `this`.")),
            ExprKind::Base => ctx
                .scope_type()
                .and_then(|ty| ctx.types().ok()?.parent_of(ty))
                .ok_or_else(|| EvalError::scripting("Cannot determine the type of `base`.")),
            ExprKind::TypeRef(ty) => Ok(*ty),
            ExprKind::TypeOf(inner) => inner.type_handle(),
            ExprKind::Variable(var) => Ok(var.ty),
            ExprKind::Member { member, .. } => Ok(member.ty),
            ExprKind::MethodGroup { name, .. } => Err(method_group_used(name)),
            ExprKind::Call { method, .. } => method.return_type.ok_or_else(|| {
                EvalError::scripting(format!("Method `{}` does not return a value.", method.name))
            }),
            ExprKind::Construct { ty, .. } => Ok(*ty),
            ExprKind::Cast { ty, .. } => ty.type_handle(),
            ExprKind::Index { array, .. } => {
                let array_ty = array.evaluate_type(ctx)?;
                match ctx.types()?.get(array_ty).as_deref() {
                    Some(TargetType::Array(a)) => Ok(a.element),
                    _ => Err(EvalError::Internal(format!("`{}` is not an array", array.name()))),
                }
            }
            ExprKind::Deref(operand) => {
                let ty = operand.evaluate_type(ctx)?;
                match ctx.types()?.get(ty).as_deref() {
                    Some(TargetType::Pointer(p)) => Ok(p.target),
                    _ => Err(EvalError::Internal(format!("`{}` is not a pointer", operand.name()))),
                }
            }
            ExprKind::AddressOf(operand) => {
                let ty = operand.evaluate_type(ctx)?;
                Ok(ctx.types()?.pointer_to(ty, true))
            }
            ExprKind::Negate(operand) => {
                let ty = operand.evaluate_type(ctx)?;
                let types = ctx.types()?;
                // uint の符号反転は long に広がる
                match types.get(ty).and_then(|t| t.fundamental_kind()) {
                    Some(FundamentalKind::UInt32) => Ok(types.fundamental(FundamentalKind::Int64)),
                    _ => Ok(ty),
                }
            }
            ExprKind::Register(_) => Ok(ctx.types()?.fundamental(FundamentalKind::UInt64)),
            ExprKind::Assign { target, .. } => target.evaluate_type(ctx),
            other => Err(EvalError::Internal(format!("no type for node {:?}", other))),
        }
    }

    /// 値を評価する
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<Value> {
        self.ensure_resolved()?;
        match &self.kind {
            ExprKind::Literal(v) => Ok(Value::Scalar(v.clone())),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::This => ctx
                .this_object()
                .map(Value::Object)
                .ok_or_else(|| EvalError::scripting("Keyword `this` is not available in the current context.")),
            ExprKind::Base => self.evaluate_base(ctx).map(Value::Object),
            ExprKind::TypeRef(_) => Err(EvalError::scripting(format!(
                "`{}` is a type, which is not valid in the given context.",
                self.name()
            ))),
            ExprKind::TypeOf(inner) => Ok(Value::Type(inner.type_handle()?)),
            ExprKind::Variable(var) => {
                let process = ctx.current_process()?;
                process
                    .read(&var.location)
                    .map(Value::Object)
                    .map_err(|e| self.target_error(e))
            }
            ExprKind::Member { instance, member } => self.evaluate_member(ctx, instance.as_deref(), member),
            ExprKind::MethodGroup { name, .. } => Err(method_group_used(name)),
            ExprKind::Call {
                instance,
                method,
                args,
            } => {
                let this = match instance {
                    Some(instance) if !method.is_static => {
                        let object = instance.evaluate_instance(ctx)?;
                        let process = ctx.current_process()?;
                        let level = match method.declaring_type {
                            Some(ty) => level_of(&**process, object, ty)
                                .map_err(|e| self.target_error(e))?,
                            None => None,
                        };
                        Some(level.unwrap_or(object))
                    }
                    _ => None,
                };
                let args = self.evaluate_arguments(ctx, method, args)?;
                self.invoke(ctx, method.function, this, &args)
            }
            ExprKind::Construct { ctor, args, .. } => {
                let args = self.evaluate_arguments(ctx, ctor, args)?;
                self.invoke(ctx, ctor.function, None, &args)
            }
            ExprKind::Cast { ty, operand } => self.evaluate_cast(ctx, ty.type_handle()?, operand),
            ExprKind::Index { array, indices } => {
                let (array, index) = self.element_location(ctx, array, indices)?;
                let process = ctx.current_process()?;
                process
                    .read(&Location::ArrayElement { array, index })
                    .map(Value::Object)
                    .map_err(|e| self.target_error(e))
            }
            ExprKind::Deref(operand) => {
                let pointer = operand.evaluate_variable(ctx)?;
                let process = ctx.current_process()?;
                process
                    .dereference(pointer)
                    .map(Value::Object)
                    .map_err(|e| self.target_error(e))
            }
            ExprKind::AddressOf(operand) => {
                let object = operand.evaluate_variable(ctx)?;
                let process = ctx.current_process()?;
                process
                    .address_of(object)
                    .map(Value::Object)
                    .map_err(|e| self.target_error(e))
            }
            ExprKind::Negate(operand) => {
                let value = operand.evaluate(ctx)?;
                let scalar = scalar_of(ctx, &value)?;
                negate(&scalar).map(Value::Scalar).ok_or_else(|| {
                    EvalError::scripting(format!(
                        "Operator `-` cannot be applied to `{}`.",
                        operand.name()
                    ))
                })
            }
            ExprKind::Register(reg) => {
                let process = ctx.current_process()?;
                let thread = ctx.current_thread()?;
                process
                    .read_register(thread, reg)
                    .map(|v| Value::Scalar(Scalar::UInt64(v)))
                    .map_err(|e| self.target_error(e))
            }
            ExprKind::Assign { target, value } => {
                let place = target.place(ctx)?;
                let v = value.evaluate(ctx)?;
                target.store(ctx, place, v)
            }
            other => Err(EvalError::Internal(format!("cannot evaluate node {:?}", other))),
        }
    }

    /// アドレスを持つターゲット内の値として評価する
    pub fn evaluate_variable(&self, ctx: &EvaluationContext) -> Result<ObjectHandle> {
        self.ensure_resolved()?;
        match self.evaluate(ctx)? {
            Value::Object(handle) => Ok(handle),
            _ => Err(EvalError::scripting(format!(
                "`{}` is not a variable.",
                self.name()
            ))),
        }
    }

    /// null でないインスタンスとして評価する
    fn evaluate_instance(&self, ctx: &EvaluationContext) -> Result<ObjectHandle> {
        let handle = self.evaluate_variable(ctx)?;
        let process = ctx.current_process()?;
        let object = process.object(handle).map_err(|e| self.target_error(e))?;
        match object.kind {
            ObjectKind::Null | ObjectKind::Nullable(None) => {
                Err(EvalError::scripting(ERR_NULL_REFERENCE))
            }
            ObjectKind::Nullable(Some(inner)) => Ok(inner),
            _ => Ok(handle),
        }
    }

    fn evaluate_base(&self, ctx: &EvaluationContext) -> Result<ObjectHandle> {
        let this = ctx
            .this_object()
            .ok_or_else(|| EvalError::scripting("Keyword `base` is not available in the current context."))?;
        let process = ctx.current_process()?;
        let level = match ctx.scope_type() {
            Some(ty) => level_of(&**process, this, ty)
                .map_err(|e| self.target_error(e))?
                .unwrap_or(this),
            None => this,
        };
        let object = process.object(level).map_err(|e| self.target_error(e))?;
        object
            .as_class()
            .and_then(|c| c.parent)
            .ok_or_else(|| EvalError::scripting("Keyword `base` is not available in the current context."))
    }

    fn evaluate_member(
        &self,
        ctx: &EvaluationContext,
        instance: Option<&Expression>,
        member: &mirra_types::TargetMemberInfo,
    ) -> Result<Value> {
        let process = ctx.current_process()?;
        let types = process.types();
        let info = types
            .get(member.declaring_type)
            .ok_or_else(|| EvalError::Internal(format!("unknown type {}", member.declaring_type)))?;
        let class = info
            .as_class()
            .ok_or_else(|| EvalError::Internal("member of a non-class type".to_string()))?;

        match member.kind {
            MemberKind::Field => {
                let field = class
                    .fields
                    .get(member.index)
                    .ok_or_else(|| EvalError::Internal(format!("bad field index {}", member.index)))?;
                if let Some(constant) = &field.const_value {
                    return Ok(Value::Scalar(constant.clone()));
                }
                let location = self.field_location(ctx, instance, member)?;
                process
                    .read(&location)
                    .map(Value::Object)
                    .map_err(|e| self.target_error(e))
            }
            MemberKind::Property => {
                let property = class
                    .properties
                    .get(member.index)
                    .ok_or_else(|| EvalError::Internal(format!("bad property index {}", member.index)))?;
                let getter = property.getter.ok_or_else(|| {
                    EvalError::scripting(format!("Property `{}` has no getter.", member.name))
                })?;
                let this = self.member_instance(ctx, instance, member)?;
                self.invoke(ctx, getter, this, &[])
            }
            MemberKind::Event => Err(EvalError::scripting(format!(
                "Event `{}` can only appear on the left hand side of += or -=.",
                member.name
            ))),
            MemberKind::Method => Err(method_group_used(&member.name)),
        }
    }

    /// メンバを宣言したレベルのインスタンス（静的メンバなら None）
    fn member_instance(
        &self,
        ctx: &EvaluationContext,
        instance: Option<&Expression>,
        member: &mirra_types::TargetMemberInfo,
    ) -> Result<Option<ObjectHandle>> {
        if member.is_static {
            return Ok(None);
        }
        let instance = instance.ok_or_else(|| {
            EvalError::scripting(format!(
                "An object reference is required for the non-static member `{}`.",
                member.name
            ))
        })?;
        let object = instance.evaluate_instance(ctx)?;
        let process = ctx.current_process()?;
        let level = level_of(&**process, object, member.declaring_type)
            .map_err(|e| self.target_error(e))?
            .ok_or_else(|| {
                EvalError::Internal(format!(
                    "instance of `{}` has no level for {}",
                    instance.name(),
                    process.types().name_of(member.declaring_type)
                ))
            })?;
        Ok(Some(level))
    }

    fn field_location(
        &self,
        ctx: &EvaluationContext,
        instance: Option<&Expression>,
        member: &mirra_types::TargetMemberInfo,
    ) -> Result<Location> {
        Ok(match self.member_instance(ctx, instance, member)? {
            Some(object) => Location::Field {
                object,
                index: member.index,
            },
            None => Location::StaticField {
                ty: member.declaring_type,
                index: member.index,
            },
        })
    }

    fn element_location(
        &self,
        ctx: &EvaluationContext,
        array: &Expression,
        indices: &[Expression],
    ) -> Result<(ObjectHandle, usize)> {
        let handle = array.evaluate_instance(ctx)?;
        let mut values = Vec::with_capacity(indices.len());
        for index in indices {
            let value = index.evaluate(ctx)?;
            let scalar = scalar_of(ctx, &value)?;
            let i = scalar
                .as_i128()
                .and_then(|i| i64::try_from(i).ok())
                .ok_or_else(|| {
                    EvalError::scripting(format!(
                        "Array index `{}` is not an integer.",
                        index.name()
                    ))
                })?;
            values.push(i);
        }
        let process = ctx.current_process()?;
        let object = process.object(handle).map_err(|e| self.target_error(e))?;
        let ObjectKind::Array(array_obj) = &object.kind else {
            return Err(EvalError::Internal(format!("`{}` is not an array", array.name())));
        };
        let index = array_obj
            .flat_index(&values)
            .ok_or_else(|| EvalError::scripting(ERR_INDEX_OUT_OF_RANGE))?;
        Ok((handle, index))
    }

    fn evaluate_arguments(
        &self,
        ctx: &EvaluationContext,
        method: &MethodInfo,
        args: &[Expression],
    ) -> Result<Vec<ObjectHandle>> {
        args.iter()
            .zip(&method.parameters)
            .map(|(arg, param)| {
                let value = arg.evaluate(ctx)?;
                to_object(ctx, &value, param.ty).map_err(|e| match e {
                    EvalError::Scripting(_) => EvalError::scripting(format!(
                        "Argument `{}` cannot be passed as parameter `{}` of `{}`.",
                        arg.name(),
                        param.name,
                        method.name
                    )),
                    other => other,
                })
            })
            .collect()
    }

    fn invoke(
        &self,
        ctx: &EvaluationContext,
        function: FunctionId,
        instance: Option<ObjectHandle>,
        args: &[ObjectHandle],
    ) -> Result<Value> {
        if !ctx.flags().allow_invocations {
            return Err(EvalError::scripting(ERR_INVOCATION_DISABLED));
        }
        if ctx.interrupt().is_interrupted() {
            debug!("`{}` aborted before invoking the target", self.name());
            return Err(EvalError::Aborted);
        }
        ctx.check_stopped()?;
        let process = ctx.current_process()?;
        let request = InvocationRequest {
            thread: ctx.current_thread()?,
            function,
            instance,
            args,
            flags: InvokeFlags {
                nested_break_states: ctx.flags().nested_break_states,
            },
            interrupt: ctx.interrupt(),
        };
        let outcome = process.invoke(&request).map_err(|e| self.target_error(e))?;
        debug!("invocation for `{}` finished: {:?}", self.name(), outcome);
        match outcome {
            InvocationOutcome::Returned(Some(handle)) => Ok(Value::Object(handle)),
            InvocationOutcome::Returned(None) => Ok(Value::Void),
            InvocationOutcome::Exception(exception) => {
                let type_name = process
                    .object(exception)
                    .map(|o| process.types().name_of(o.ty))
                    .unwrap_or_else(|_| "<unknown>".to_string());
                Err(EvalError::TargetException {
                    exception,
                    type_name,
                })
            }
            InvocationOutcome::Timeout => Err(EvalError::Timeout),
            InvocationOutcome::Aborted => Err(EvalError::Aborted),
            InvocationOutcome::BreakpointHit => Err(EvalError::scripting(format!(
                "The target stopped at a breakpoint while evaluating `{}`.",
                self.name()
            ))),
        }
    }

    fn evaluate_cast(
        &self,
        ctx: &EvaluationContext,
        to: TypeHandle,
        operand: &Expression,
    ) -> Result<Value> {
        let value = operand.evaluate(ctx)?;
        let types = ctx.types()?;
        let to_info = types
            .get(to)
            .ok_or_else(|| EvalError::Internal(format!("unknown type {}", to)))?;
        let cannot_cast = |from: TypeHandle| {
            EvalError::scripting(format!(
                "Cannot cast from `{}` to `{}`",
                short_type_name(types, from),
                short_type_name(types, to)
            ))
        };

        let handle = match value {
            Value::Scalar(s) => {
                let from = types.fundamental(s.kind());
                return match to_info.as_ref() {
                    TargetType::Fundamental(kind) => convert_scalar(&s, *kind, true)
                        .map(Value::Scalar)
                        .ok_or_else(|| cannot_cast(from)),
                    TargetType::Enum(_) if s.as_bits().is_some() => {
                        let process = ctx.current_process()?;
                        process
                            .create_scalar(to, s)
                            .map(Value::Object)
                            .map_err(|e| self.target_error(e))
                    }
                    _ => Err(cannot_cast(from)),
                };
            }
            Value::Null if to_info.is_reference() => return Ok(Value::Null),
            Value::Object(handle) => handle,
            _ => return Err(cannot_cast(operand.evaluate_type(ctx)?)),
        };

        let process = ctx.current_process()?;
        let object = process.object(handle).map_err(|e| self.target_error(e))?;
        if object.ty == to || (object.is_null() && to_info.is_reference()) {
            return Ok(Value::Object(handle));
        }
        let declared = operand.evaluate_type(ctx).unwrap_or(object.ty);
        match (&object.kind, to_info.as_ref()) {
            (ObjectKind::Class(_), _) => {
                match cast_object(&**process, handle, declared, to)
                    .map_err(|e| self.target_error(e))?
                {
                    Some(level) => Ok(Value::Object(level)),
                    None => Err(cannot_cast(declared)),
                }
            }
            (ObjectKind::Fundamental(s), TargetType::Fundamental(kind)) => convert_scalar(s, *kind, true)
                .map(Value::Scalar)
                .ok_or_else(|| cannot_cast(declared)),
            (ObjectKind::Fundamental(s), TargetType::Enum(_)) if s.as_bits().is_some() => process
                .create_scalar(to, s.clone())
                .map(Value::Object)
                .map_err(|e| self.target_error(e)),
            (ObjectKind::Enum(bits), TargetType::Fundamental(kind)) => Scalar::from_bits(*kind, *bits)
                .map(Value::Scalar)
                .ok_or_else(|| cannot_cast(declared)),
            (ObjectKind::Nullable(Some(inner)), _) => {
                let inner_obj = process.object(*inner).map_err(|e| self.target_error(e))?;
                if inner_obj.ty == to {
                    Ok(Value::Object(*inner))
                } else {
                    Err(cannot_cast(declared))
                }
            }
            _ => Err(cannot_cast(declared)),
        }
    }

    // ================================================================
    // 代入
    // ================================================================

    /// 値を書き込む
    ///
    /// 書き込む前に型の互換性を確認し、スレッドが停止していることを確認します。
    pub fn assign(&self, ctx: &EvaluationContext, value: Value) -> Result<()> {
        let place = self.place(ctx)?;
        self.store(ctx, place, value).map(|_| ())
    }

    /// 代入先を評価する
    ///
    /// 受け手とインデックスはここで左から順に評価され、代入する値より先に確定します。
    pub(crate) fn place(&self, ctx: &EvaluationContext) -> Result<Place> {
        self.ensure_resolved()?;
        if !self.is_lvalue() {
            return Err(not_an_lvalue(self));
        }
        ctx.check_stopped()?;
        let process = ctx.current_process()?;

        match &self.kind {
            ExprKind::Register(reg) => Ok(Place::Register(reg.clone())),
            ExprKind::Variable(var) => Ok(Place::Location(var.location.clone())),
            ExprKind::Member { instance, member } => match member.kind {
                MemberKind::Field => {
                    let is_const = process
                        .types()
                        .get(member.declaring_type)
                        .and_then(|t| {
                            t.as_class()
                                .and_then(|c| c.fields.get(member.index).map(|f| f.const_value.is_some()))
                        })
                        .unwrap_or(false);
                    if is_const {
                        return Err(EvalError::scripting(format!(
                            "Cannot assign to `{}` because it is a constant.",
                            member.name
                        )));
                    }
                    let location = self.field_location(ctx, instance.as_deref(), member)?;
                    Ok(Place::Location(location))
                }
                MemberKind::Property => {
                    let setter = process
                        .types()
                        .get(member.declaring_type)
                        .and_then(|t| {
                            t.as_class()
                                .and_then(|c| c.properties.get(member.index).and_then(|p| p.setter))
                        })
                        .ok_or_else(|| {
                            EvalError::scripting(format!(
                                "Property `{}` is read-only.",
                                member.name
                            ))
                        })?;
                    let this = self.member_instance(ctx, instance.as_deref(), member)?;
                    Ok(Place::Setter { setter, this })
                }
                _ => Err(not_an_lvalue(self)),
            },
            ExprKind::Index { array, indices } => {
                let (array, index) = self.element_location(ctx, array, indices)?;
                Ok(Place::Location(Location::ArrayElement { array, index }))
            }
            _ => Err(not_an_lvalue(self)),
        }
    }

    /// 評価済みの代入先に書き込み、代入された値を返す
    pub(crate) fn store(&self, ctx: &EvaluationContext, place: Place, value: Value) -> Result<Value> {
        // 値の評価中にターゲットが再開されていないか
        ctx.check_stopped()?;
        let process = ctx.current_process()?;

        if let Place::Register(reg) = &place {
            let scalar = scalar_of(ctx, &value)?;
            let bits = scalar.as_bits().ok_or_else(|| {
                EvalError::scripting(format!(
                    "Cannot assign a value of type `{}` to register `${}`.",
                    scalar.kind().name(),
                    reg
                ))
            })?;
            let thread = ctx.current_thread()?;
            process
                .write_register(thread, reg, bits)
                .map_err(|e| self.target_error(e))?;
            return Ok(Value::Scalar(Scalar::UInt64(bits)));
        }

        let target_ty = self.evaluate_type(ctx)?;
        check_assignable(ctx, &**process, target_ty, &value)?;
        let handle = to_object(ctx, &value, target_ty)?;
        trace!("assign {} to `{}`", handle, self.name());

        match place {
            Place::Location(location) => process
                .write(&location, handle)
                .map_err(|e| self.target_error(e))?,
            Place::Setter { setter, this } => {
                self.invoke(ctx, setter, this, &[handle])?;
            }
            Place::Register(_) => return Err(not_an_lvalue(self)),
        }
        Ok(Value::Object(handle))
    }
}

/// 評価済みの代入先
#[derive(Debug, Clone)]
pub(crate) enum Place {
    Register(String),
    Location(Location),
    Setter {
        setter: FunctionId,
        this: Option<ObjectHandle>,
    },
}

/// 値の型（ホスト側のスカラーは基本型、null はどの参照型とも互換）
fn value_type(ctx: &EvaluationContext, process: &dyn Target, value: &Value) -> Result<Option<TypeHandle>> {
    Ok(match value {
        Value::Scalar(s) => Some(ctx.types()?.fundamental(s.kind())),
        Value::Object(h) => {
            let object = process.object(*h)?;
            if object.is_null() {
                None
            } else {
                Some(object.ty)
            }
        }
        Value::Null => None,
        Value::Type(_) | Value::Void => {
            return Err(EvalError::scripting("Expression does not produce a value."))
        }
    })
}

fn check_assignable(
    ctx: &EvaluationContext,
    process: &dyn Target,
    target_ty: TypeHandle,
    value: &Value,
) -> Result<()> {
    let types = process.types();
    match value_type(ctx, process, value)? {
        Some(ty) if ty == target_ty => Ok(()),
        None if types.get(target_ty).is_some_and(|t| t.is_reference()) => Ok(()),
        Some(ty) => Err(type_mismatch(types, ty, target_ty)),
        None => Err(type_mismatch(types, types.object_type(), target_ty)),
    }
}

fn type_mismatch(types: &TypeCatalog, from: TypeHandle, to: TypeHandle) -> EvalError {
    EvalError::scripting(format!(
        "Type mismatch: cannot assign a value of type `{}` to `{}`.",
        types.name_of(from),
        types.name_of(to)
    ))
}

/// 値をターゲット内のオブジェクトにする
fn to_object(ctx: &EvaluationContext, value: &Value, ty: TypeHandle) -> Result<ObjectHandle> {
    let process: &Arc<dyn Target> = ctx.current_process()?;
    match value {
        Value::Object(h) => Ok(*h),
        Value::Null => Ok(process.create_null(ty)?),
        Value::Scalar(s) => {
            let converted = match process.types().get(ty).as_deref() {
                Some(TargetType::Fundamental(kind)) => convert_scalar(s, *kind, false),
                Some(TargetType::Enum(_)) if s.as_bits().is_some() => Some(s.clone()),
                _ => None,
            }
            .ok_or_else(|| {
                EvalError::scripting(format!(
                    "Cannot convert `{}` to `{}`.",
                    s,
                    process.types().name_of(ty)
                ))
            })?;
            Ok(process.create_scalar(ty, converted)?)
        }
        Value::Type(_) | Value::Void => {
            Err(EvalError::scripting("Expression does not produce a value."))
        }
    }
}

/// 値をスカラーとして取得する（列挙値は基底の整数型になる）
pub(crate) fn scalar_of(ctx: &EvaluationContext, value: &Value) -> Result<Scalar> {
    match value {
        Value::Scalar(s) => Ok(s.clone()),
        Value::Object(h) => {
            let process = ctx.current_process()?;
            let object = process.object(*h)?;
            match &object.kind {
                ObjectKind::Fundamental(s) => Ok(s.clone()),
                ObjectKind::Enum(bits) => {
                    let underlying = process
                        .types()
                        .get(object.ty)
                        .and_then(|t| t.as_enum().map(|e| e.underlying))
                        .unwrap_or(FundamentalKind::Int64);
                    Scalar::from_bits(underlying, *bits).ok_or_else(|| {
                        EvalError::Internal("enum with non-integer underlying type".to_string())
                    })
                }
                _ => Err(EvalError::scripting(format!(
                    "A value of type `{}` is not a number.",
                    process.types().name_of(object.ty)
                ))),
            }
        }
        _ => Err(EvalError::scripting("Expression does not produce a number.")),
    }
}

fn negate(value: &Scalar) -> Option<Scalar> {
    Some(match value {
        Scalar::Int32(v) => Scalar::Int32(v.checked_neg()?),
        Scalar::Int64(v) => Scalar::Int64(v.checked_neg()?),
        Scalar::UInt32(v) => Scalar::Int64(-i64::from(*v)),
        Scalar::Single(v) => Scalar::Single(-v),
        Scalar::Double(v) => Scalar::Double(-v),
        Scalar::Decimal(d) => Scalar::Decimal(mirra_types::Decimal::new(-d.mantissa(), d.scale())),
        _ => return None,
    })
}

fn not_a_type(name: &str) -> EvalError {
    EvalError::scripting(format!("`{}` is not a type.", name))
}

fn not_an_lvalue(expr: &Expression) -> EvalError {
    EvalError::scripting(format!(
        "Expression `{}` cannot be assigned to.",
        expr.name()
    ))
}

fn method_group_used(name: &str) -> EvalError {
    EvalError::scripting(format!(
        "`{}` is a method group; use `{}()` to call it.",
        name, name
    ))
}

fn no_member(types: &TypeCatalog, ty: TypeHandle, member: &str) -> EvalError {
    EvalError::scripting(format!(
        "Type {} has no member {}.",
        short_type_name(types, ty),
        member
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use mirra_target::sim::demo::{self, DEMO_THREAD};
    use mirra_target::sim::SimTarget;

    fn demo_ctx() -> (Arc<SimTarget>, EvaluationContext) {
        let target = demo::build().unwrap();
        let ctx = EvaluationContext::for_thread(target.clone(), DEMO_THREAD);
        (target, ctx)
    }

    fn eval(ctx: &EvaluationContext, text: &str) -> Result<Value> {
        parse_expression(text)?.resolve(ctx)?.evaluate(ctx)
    }

    fn eval_scalar(target: &SimTarget, ctx: &EvaluationContext, text: &str) -> Scalar {
        match eval(ctx, text).unwrap() {
            Value::Scalar(s) => s,
            Value::Object(h) => target.object(h).unwrap().as_scalar().cloned().unwrap(),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_literal_is_pure() {
        let ctx = EvaluationContext::empty();
        let expr = parse_expression("5").unwrap();
        assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Scalar(Scalar::Int32(5)));
    }

    #[test]
    fn test_unresolved_evaluation_is_internal_error() {
        let ctx = EvaluationContext::empty();
        let expr = Expression::new(ExprKind::Identifier("x".into()));
        let err = expr.evaluate(&ctx).unwrap_err();
        assert!(err.is_fatal());
        assert!(expr.assign(&ctx, Value::Null).unwrap_err().is_fatal());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (_, ctx) = demo_ctx();
        let once = parse_expression("foo.Data").unwrap().resolve(&ctx).unwrap();
        let twice = once.resolve(&ctx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_field_access_and_missing_member() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "foo.Data"), Scalar::Int32(5));
        let err = parse_expression("foo.Missing").unwrap().resolve(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "Type Foo has no member Missing.");
    }

    #[test]
    fn test_unknown_name() {
        let (_, ctx) = demo_ctx();
        let err = parse_expression("nope").unwrap().resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("`nope` does not exist"));
        assert!(parse_expression("nope").unwrap().try_resolve(&ctx).is_none());
    }

    #[test]
    fn test_inherited_fields_through_parent_chain() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "derived.BValue"), Scalar::Int32(1));
        assert_eq!(eval_scalar(&target, &ctx, "derived.DValue"), Scalar::Int32(3));
        assert_eq!(eval_scalar(&target, &ctx, "derived.Limit"), Scalar::Int32(100));
    }

    #[test]
    fn test_static_field_through_type_name() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "Demo.Tester.Counter"), Scalar::Int32(0));
        assert_eq!(eval_scalar(&target, &ctx, "Tester.Counter"), Scalar::Int32(0));
        assert_eq!(eval_scalar(&target, &ctx, "Counter"), Scalar::Int32(0));
    }

    #[test]
    fn test_overload_selection() {
        let (target, ctx) = demo_ctx();
        let s = |text| eval_scalar(&target, &ctx, text);
        assert_eq!(s("Overloaded()"), Scalar::String("Overloaded()".into()));
        assert_eq!(s("Overloaded(3)"), Scalar::String("Overloaded(int)".into()));
        assert_eq!(s("Overloaded(root)"), Scalar::String("Overloaded(Root)".into()));
        let err = eval(&ctx, "Overloaded(\"x\")").unwrap_err();
        assert!(err.to_string().contains("has 1 arguments"), "{}", err);
        let err = eval(&ctx, "Overloaded(1, 2)").unwrap_err();
        assert!(err.to_string().contains("has 2 arguments"), "{}", err);
    }

    #[test]
    fn test_property_getter_and_constructor() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "foo.Twice"), Scalar::Int32(10));
        assert_eq!(eval_scalar(&target, &ctx, "new Foo(21).Twice"), Scalar::Int32(42));
    }

    #[test]
    fn test_invocations_can_be_disabled() {
        let (_, mut ctx) = demo_ctx();
        ctx.set_flags(crate::EvaluationFlags {
            allow_invocations: false,
            ..Default::default()
        });
        let err = eval(&ctx, "Add(1, 2)").unwrap_err();
        assert_eq!(err.to_string(), ERR_INVOCATION_DISABLED);
    }

    #[test]
    fn test_target_exception_is_distinct() {
        let (_, ctx) = demo_ctx();
        match eval(&ctx, "Fail()") {
            Err(EvalError::TargetException { type_name, .. }) => {
                assert_eq!(type_name, "Demo.DemoException")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_breakpoint_in_invocation_respects_nested_break_states() {
        let (target, mut ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "StopHere()"), Scalar::Int32(1));
        ctx.set_flags(crate::EvaluationFlags {
            nested_break_states: true,
            ..Default::default()
        });
        let err = eval(&ctx, "StopHere()").unwrap_err();
        assert!(err.to_string().contains("breakpoint"));
    }

    #[test]
    fn test_casts() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "((Demo.B) derived).BValue"), Scalar::Int32(1));
        let err = parse_expression("((B) derived).DValue").unwrap().resolve(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "Type B has no member DValue.");
        assert_eq!(eval_scalar(&target, &ctx, "((D)(B) derived).DValue"), Scalar::Int32(3));
        let err = eval(&ctx, "(A) derived").unwrap_err();
        assert_eq!(err.to_string(), "Cannot cast from `D` to `A`");
        assert_eq!(eval_scalar(&target, &ctx, "(long) 5"), Scalar::Int64(5));
        assert_eq!(eval_scalar(&target, &ctx, "(int) pub"), Scalar::Int32(0x301f));
    }

    #[test]
    fn test_arrays_honour_lower_bounds() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "numbers[1]"), Scalar::Int32(10));
        assert_eq!(eval_scalar(&target, &ctx, "numbers[3]"), Scalar::Int32(30));
        assert_eq!(eval_scalar(&target, &ctx, "grid[1, 0]"), Scalar::Int32(3));
        let err = eval(&ctx, "numbers[0]").unwrap_err();
        assert_eq!(err.to_string(), ERR_INDEX_OUT_OF_RANGE);
        let err = parse_expression("numbers[1, 1]").unwrap().resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("Wrong number of indices"));
    }

    #[test]
    fn test_pointers() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "*ptr"), Scalar::Int32(42));
        assert_eq!(eval_scalar(&target, &ctx, "*&foo.Data"), Scalar::Int32(5));
        let err = parse_expression("*foo").unwrap().resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("not a pointer"));
    }

    #[test]
    fn test_assignment_round_trip_and_mismatch() {
        let (target, ctx) = demo_ctx();
        eval(&ctx, "foo.Data = 7").unwrap();
        assert_eq!(eval_scalar(&target, &ctx, "foo.Data"), Scalar::Int32(7));

        let lhs = parse_expression("greeting").unwrap().resolve(&ctx).unwrap();
        lhs.assign(&ctx, Value::Scalar(Scalar::String("bye".into()))).unwrap();
        let handle = lhs.evaluate_variable(&ctx).unwrap();
        assert_eq!(
            target.object(handle).unwrap().as_scalar(),
            Some(&Scalar::String("bye".into()))
        );

        let err = eval(&ctx, "foo.Data = \"x\"").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type mismatch: cannot assign a value of type `string` to `int`."
        );
        eval(&ctx, "numbers[2] = 99").unwrap();
        assert_eq!(eval_scalar(&target, &ctx, "numbers[2]"), Scalar::Int32(99));
        eval(&ctx, "root = null").unwrap();
    }

    #[test]
    fn test_negate_unsigned_widens_to_long() {
        let (_, ctx) = demo_ctx();
        let expr = parse_expression("-((uint) foo.Data)")
            .unwrap()
            .resolve(&ctx)
            .unwrap();
        assert!(matches!(expr.kind, ExprKind::Negate(_)));
        let long = ctx.types().unwrap().fundamental(FundamentalKind::Int64);
        assert_eq!(expr.evaluate_type(&ctx).unwrap(), long);
        assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Scalar(Scalar::Int64(-5)));

        let int = ctx.types().unwrap().fundamental(FundamentalKind::Int32);
        let expr = parse_expression("-foo.Data").unwrap().resolve(&ctx).unwrap();
        assert_eq!(expr.evaluate_type(&ctx).unwrap(), int);
    }

    #[test]
    fn test_assignment_evaluates_target_before_value() {
        let (target, ctx) = demo_ctx();
        // Next() は呼ばれた順に 1, 2 を返す
        let result = eval(&ctx, "numbers[Next()] = Next()").unwrap();
        match result {
            Value::Object(h) => {
                assert_eq!(target.object(h).unwrap().as_scalar(), Some(&Scalar::Int32(2)))
            }
            other => panic!("unexpected value {:?}", other),
        }
        assert_eq!(eval_scalar(&target, &ctx, "numbers[1]"), Scalar::Int32(2));
        assert_eq!(eval_scalar(&target, &ctx, "numbers[2]"), Scalar::Int32(20));
    }

    #[test]
    fn test_not_an_lvalue() {
        let (_, ctx) = demo_ctx();
        let err = parse_expression("5 = 3").unwrap().resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("cannot be assigned"));
        let ty = parse_expression("Demo.Foo").unwrap().resolve(&ctx).unwrap();
        assert!(ty.is_type());
        assert!(ty.evaluate_variable(&ctx).is_err());
    }

    #[test]
    fn test_registers() {
        let (target, ctx) = demo_ctx();
        assert_eq!(eval_scalar(&target, &ctx, "$rip"), Scalar::UInt64(0x0040_1a2b));
        eval(&ctx, "$rax = 0x10").unwrap();
        assert_eq!(eval_scalar(&target, &ctx, "%rax"), Scalar::UInt64(0x10));
        assert!(parse_expression("$xmm9").unwrap().resolve(&ctx).is_err());
    }

    #[test]
    fn test_popped_frame_reports_invalid_location() {
        let (target, ctx) = demo_ctx();
        let expr = parse_expression("foo").unwrap().resolve(&ctx).unwrap();
        target.pop_frame(DEMO_THREAD).unwrap();
        let err = expr.evaluate(&ctx).unwrap_err();
        assert!(
            err.to_string().starts_with("location of variable `foo` is invalid:"),
            "{}",
            err
        );
    }

    #[test]
    fn test_stale_proxy_after_resume_fails() {
        let (target, ctx) = demo_ctx();
        let expr = parse_expression("foo.Data").unwrap().resolve(&ctx).unwrap();
        target.resume();
        assert_eq!(expr.evaluate(&ctx).unwrap_err(), EvalError::NotStopped);
        let err = expr.assign(&ctx, Value::Scalar(Scalar::Int32(1))).unwrap_err();
        assert_eq!(err, EvalError::NotStopped);
    }

    #[test]
    fn test_nullable_and_this() {
        let (target, ctx) = demo_ctx();
        let err = eval(&ctx, "this").unwrap_err();
        assert!(err.to_string().contains("`this`"));
        let origin = eval(&ctx, "origin").unwrap();
        let Value::Object(origin) = origin else { panic!() };
        let scoped = ctx.scoped_to(origin);
        assert_eq!(eval_scalar(&target, &scoped, "X"), Scalar::Int32(3));
        assert_eq!(eval_scalar(&target, &scoped, "this.Y"), Scalar::Int32(4));
    }
}
