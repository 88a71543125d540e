//! オブジェクトのフォーマット
//!
//! ターゲット内の値（オブジェクトグラフ）を人間が読みやすい形式に整形します。
//!
//! - 構造体・クラスは親レベルを `<Parent> = { ... }` として先頭に展開する
//! - 配列は次元ごとの下限・上限に従って展開する
//! - フラグ列挙型はメンバ名の `|` 連結に分解する
//! - 型安全なポインタは参照先を `&(T) value` として表示する
//!
//! 区切り（`, `）を出力するたびに桁数を確認し、幅を超えたら直前の区切り位置で改行します。

use crate::context::EvaluationContext;
use crate::display;
use crate::expression::Value;
use crate::Result;
use mirra_target::{ArrayObject, ClassObject, Location, ObjectHandle, ObjectKind, Target};
use mirra_types::{ClassType, EnumType, MethodInfo, Scalar, TargetType, TypeCatalog, TypeHandle};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// 表示形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayFormat {
    /// 通常表示（DebuggerDisplay 属性を優先する）
    #[default]
    Default,
    /// 属性を無視して構造を再帰的に展開する
    Object,
    /// アドレスのみ
    Address,
    /// 数値を16進数で表示する
    HexaDecimal,
}

impl DisplayFormat {
    /// `print/x` のような書式指定文字から変換する
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'o' => Some(DisplayFormat::Object),
            'a' => Some(DisplayFormat::Address),
            'x' => Some(DisplayFormat::HexaDecimal),
            'd' => Some(DisplayFormat::Default),
            _ => None,
        }
    }
}

/// フォーマットオプション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// 折り返し幅（桁）
    pub width: usize,
    /// ネスト1段あたりのインデント幅
    pub indent: usize,
    /// 展開する最大の深さ
    pub max_depth: usize,
    pub format: DisplayFormat,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            width: 80,
            indent: 2,
            max_depth: 16,
            format: DisplayFormat::Default,
        }
    }
}

impl FormatOptions {
    pub fn with_format(mut self, format: DisplayFormat) -> Self {
        self.format = format;
        self
    }
}

/// 折り返しを管理する出力バッファ
struct LineWriter {
    buf: String,
    line_start: usize,
    /// 同じ行の中で最後に出力した区切りの空白の位置とその深さ
    pending: Option<(usize, usize)>,
    width: usize,
    indent: usize,
}

impl LineWriter {
    fn new(options: &FormatOptions) -> Self {
        Self {
            buf: String::new(),
            line_start: 0,
            pending: None,
            width: options.width,
            indent: options.indent,
        }
    }

    fn push(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn column(&self) -> usize {
        self.buf[self.line_start..].chars().count()
    }

    /// 区切りを出力し、幅を超えていれば改行を挿入する
    fn separator(&mut self, depth: usize) {
        if self.column() > self.width {
            if let Some((pos, pending_depth)) = self.pending.take() {
                self.break_at(pos, pending_depth);
            }
        }
        self.buf.push(',');
        let pos = self.buf.len();
        self.buf.push(' ');
        if self.column() > self.width {
            self.break_at(pos, depth);
        } else {
            self.pending = Some((pos, depth));
        }
    }

    /// `pos` の空白を改行とインデントに置き換える
    fn break_at(&mut self, pos: usize, depth: usize) {
        let replacement = format!("\n{}", " ".repeat((depth + 1) * self.indent));
        self.buf.replace_range(pos..pos + 1, &replacement);
        self.line_start = pos + 1;
        self.pending = None;
    }

    fn finish(self) -> String {
        self.buf
    }
}

/// オブジェクトフォーマッター
pub struct ObjectFormatter<'a> {
    ctx: &'a EvaluationContext,
    options: FormatOptions,
    /// 展開中のオブジェクトのアドレス（循環参照の検出用）
    visited: HashSet<u64>,
}

impl<'a> ObjectFormatter<'a> {
    pub fn new(ctx: &'a EvaluationContext, options: FormatOptions) -> Self {
        Self {
            ctx,
            options,
            visited: HashSet::new(),
        }
    }

    /// 評価結果を `(型名) 値` の形式で整形する
    pub fn format_result(&mut self, value: &Value) -> Result<String> {
        match value {
            Value::Scalar(s) => Ok(format!("({}) {}", s.kind().name(), self.format_value(value)?)),
            Value::Object(handle) => {
                let process = self.ctx.current_process()?;
                let object = process.object(*handle)?;
                let type_name = process.types().name_of(object.ty);
                Ok(format!("({}) {}", type_name, self.format_value(value)?))
            }
            Value::Null => Ok("null".to_string()),
            Value::Type(ty) => Ok(format!("(type) {}", self.ctx.types()?.name_of(*ty))),
            Value::Void => Ok("(void)".to_string()),
        }
    }

    /// 値だけを整形する
    pub fn format_value(&mut self, value: &Value) -> Result<String> {
        let mut w = LineWriter::new(&self.options);
        match value {
            Value::Scalar(s) => w.push(&self.scalar_text(s)),
            Value::Object(handle) => self.write_object(&mut w, *handle, 0)?,
            Value::Null => w.push("null"),
            Value::Type(ty) => w.push(&self.ctx.types()?.name_of(*ty)),
            Value::Void => w.push("void"),
        }
        Ok(w.finish())
    }

    fn process(&self) -> Result<&'a Arc<dyn Target>> {
        self.ctx.current_process()
    }

    fn scalar_text(&self, value: &Scalar) -> String {
        if self.options.format == DisplayFormat::HexaDecimal {
            return value.to_hex_string();
        }
        match value {
            Scalar::Single(_) | Scalar::Double(_) => {
                let text = value.to_string();
                if text.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
                    format!("{}.0", text)
                } else {
                    text
                }
            }
            other => other.to_string(),
        }
    }

    fn write_object(&mut self, w: &mut LineWriter, handle: ObjectHandle, depth: usize) -> Result<()> {
        let process = self.process()?;
        let object = process.object(handle)?;

        if object.is_null() {
            w.push("null");
            return Ok(());
        }
        if self.options.format == DisplayFormat::Address {
            w.push(&format!("0x{:016x}", object.address));
            return Ok(());
        }
        if depth > self.options.max_depth {
            w.push("...");
            return Ok(());
        }

        match &object.kind {
            ObjectKind::Null => w.push("null"),
            ObjectKind::Fundamental(s) => w.push(&self.scalar_text(s)),
            ObjectKind::Enum(bits) => {
                let types = process.types();
                let text = match types.get(object.ty).as_deref() {
                    Some(TargetType::Enum(e)) => self.enum_text(e, *bits),
                    _ => bits.to_string(),
                };
                w.push(&text);
            }
            ObjectKind::Nullable(None) => w.push("null"),
            ObjectKind::Nullable(Some(inner)) => self.write_object(w, *inner, depth)?,
            ObjectKind::Pointer { address } => self.write_pointer(w, handle, object.ty, *address, depth)?,
            ObjectKind::Array(array) => self.write_array(w, handle, array, depth)?,
            ObjectKind::Class(class) => {
                if !self.visited.insert(object.address) {
                    w.push("{ ... }");
                    return Ok(());
                }
                let result = self.write_class(w, handle, object.ty, class, depth);
                self.visited.remove(&object.address);
                result?;
            }
        }
        Ok(())
    }

    fn write_pointer(
        &mut self,
        w: &mut LineWriter,
        handle: ObjectHandle,
        ty: TypeHandle,
        address: u64,
        depth: usize,
    ) -> Result<()> {
        let process = self.process()?;
        let types = process.types();
        if let Some(TargetType::Pointer(p)) = types.get(ty).as_deref() {
            if p.type_safe && address != 0 {
                match process.dereference(handle) {
                    Ok(target) => {
                        w.push(&format!("&({}) ", types.name_of(p.target)));
                        return self.write_object(w, target, depth + 1);
                    }
                    Err(e) => debug!("pointer 0x{:x} could not be dereferenced: {}", address, e),
                }
            }
        }
        w.push(&format!("0x{:016x}", address));
        Ok(())
    }

    /// 列挙値の表示名
    ///
    /// 完全一致するメンバがあればその名前、フラグ列挙型ならメンバの論理和への分解、
    /// どちらもできなければ基底型の数値を返します。
    pub fn enum_text(&self, info: &EnumType, bits: u64) -> String {
        let numeric = || {
            let value = Scalar::from_bits(info.underlying, bits).unwrap_or(Scalar::UInt64(bits));
            self.scalar_text(&value)
        };
        if self.options.format == DisplayFormat::HexaDecimal {
            return numeric();
        }
        if let Some(member) = info.members.iter().find(|m| m.value == bits) {
            return member.name.clone();
        }
        if info.is_flags {
            if let Some(names) = decompose_flags(info, bits) {
                return names.join(" | ");
            }
        }
        numeric()
    }

    fn write_array(
        &mut self,
        w: &mut LineWriter,
        handle: ObjectHandle,
        array: &ArrayObject,
        depth: usize,
    ) -> Result<()> {
        let Some(bounds) = &array.bounds else {
            w.push("[ ]");
            return Ok(());
        };
        let mut next = 0usize;
        self.write_rank(w, handle, &bounds[..], &mut next, depth)
    }

    /// 1次元分を `[ e0, e1, ... ]` として出力し、内側の次元へ再帰する
    fn write_rank(
        &mut self,
        w: &mut LineWriter,
        handle: ObjectHandle,
        dims: &[mirra_target::Dimension],
        next: &mut usize,
        depth: usize,
    ) -> Result<()> {
        let Some((dim, inner)) = dims.split_first() else {
            return Ok(());
        };
        if dim.length == 0 {
            w.push("[ ]");
            return Ok(());
        }
        w.push("[ ");
        for i in 0..dim.length {
            if i > 0 {
                w.separator(depth);
            }
            if inner.is_empty() {
                let process = self.process()?;
                let element = process.read(&Location::ArrayElement {
                    array: handle,
                    index: *next,
                })?;
                *next += 1;
                self.write_object(w, element, depth + 1)?;
            } else {
                self.write_rank(w, handle, inner, next, depth + 1)?;
            }
        }
        w.push(" ]");
        Ok(())
    }

    fn write_class(
        &mut self,
        w: &mut LineWriter,
        handle: ObjectHandle,
        ty: TypeHandle,
        class: &ClassObject,
        depth: usize,
    ) -> Result<()> {
        let process = self.process()?;
        let info = process
            .types()
            .get(ty)
            .ok_or_else(|| crate::EvalError::Internal(format!("unknown type {}", ty)))?;
        let Some(class_type) = info.as_class() else {
            return Err(crate::EvalError::Internal(format!("{} is not a class type", ty)));
        };

        if self.options.format != DisplayFormat::Object {
            if let Some(template) = &class_type.debugger_display {
                let mut nested = self.options;
                nested.max_depth = self.options.max_depth.saturating_sub(depth + 1);
                match display::render_template(self.ctx, handle, template, &nested) {
                    Ok(text) => {
                        w.push(&text);
                        return Ok(());
                    }
                    Err(e) => debug!(
                        "debugger display of {} failed, expanding members: {}",
                        class_type.name, e
                    ),
                }
            }
        }
        self.write_members(w, handle, class_type, class, depth)
    }

    /// 親レベルとフィールドを `{ <Parent> = { ... }, name = value }` として出力する
    fn write_members(
        &mut self,
        w: &mut LineWriter,
        handle: ObjectHandle,
        class_type: &ClassType,
        class: &ClassObject,
        depth: usize,
    ) -> Result<()> {
        let process = self.process()?;
        let types = process.types();
        let mut first = true;
        w.push("{ ");

        if let Some(parent) = class.parent {
            let parent_obj = process.object(parent)?;
            if parent_obj.ty != types.object_type() {
                if let (Some(parent_info), ObjectKind::Class(parent_class)) =
                    (types.get(parent_obj.ty), &parent_obj.kind)
                {
                    if let Some(parent_type) = parent_info.as_class() {
                        w.push(&format!("<{}> = ", parent_type.short_name()));
                        self.write_members(w, parent, parent_type, parent_class, depth + 1)?;
                        first = false;
                    }
                }
            }
        }

        for (index, field) in class_type.fields.iter().enumerate() {
            if field.is_static
                || field.const_value.is_some()
                || field.compiler_generated
                || !field.browsable
            {
                continue;
            }
            if !first {
                w.separator(depth);
            }
            first = false;
            w.push(&format!("{} = ", field.name));
            let value = process.read(&Location::Field {
                object: handle,
                index,
            })?;
            self.write_object(w, value, depth + 1)?;
        }

        w.push(if first { "}" } else { " }" });
        Ok(())
    }

    /// 型の宣言を整形する（`ptype`）
    pub fn describe_type(&self, ty: TypeHandle) -> Result<String> {
        let types = self.ctx.types()?;
        let mut out = String::new();
        let mut describing = HashSet::new();
        describe(types, ty, 0, self.options.indent.max(1) * 2, &mut describing, &mut out);
        Ok(out)
    }
}

/// フラグ値を最小個数のメンバに分解する（値の昇順）
///
/// 元の値に含まれるメンバを大きい値から順に選びます。まだ覆われていないビットを持つメンバだけを採り、
/// 選んだメンバの論理和が元の値に一致しなければ None を返します。
pub fn decompose_flags(info: &EnumType, bits: u64) -> Option<Vec<String>> {
    let mut members: Vec<_> = info.members.iter().filter(|m| m.value != 0).collect();
    members.sort_by(|a, b| b.value.cmp(&a.value));
    let mut covered = 0u64;
    let mut picked = Vec::new();
    for member in members {
        if bits & member.value == member.value && member.value & !covered != 0 {
            covered |= member.value;
            picked.push(member);
        }
        if covered == bits {
            break;
        }
    }
    if covered != bits || picked.is_empty() {
        return None;
    }
    picked.sort_by_key(|m| m.value);
    Some(picked.into_iter().map(|m| m.name.clone()).collect())
}

fn method_signature(types: &TypeCatalog, method: &MethodInfo, display_name: &str, is_ctor: bool) -> String {
    let params = method
        .parameters
        .iter()
        .map(|p| format!("{} {}", types.name_of(p.ty), p.name))
        .collect::<Vec<_>>()
        .join(", ");
    let ret = match method.return_type {
        _ if is_ctor => String::new(),
        Some(ty) => format!("{} ", types.name_of(ty)),
        None => "void ".to_string(),
    };
    let prefix = if method.is_static { "static " } else { "" };
    format!("{}{}{}({});", prefix, ret, display_name, params)
}

fn describe(
    types: &TypeCatalog,
    ty: TypeHandle,
    level: usize,
    step: usize,
    describing: &mut HashSet<TypeHandle>,
    out: &mut String,
) {
    let Some(info) = types.get(ty) else {
        out.push_str(&types.name_of(ty));
        return;
    };
    match info.as_ref() {
        TargetType::Class(class) => {
            if !describing.insert(ty) {
                out.push_str(&class.name);
                return;
            }
            let keyword = match class.kind {
                mirra_types::ClassKind::Struct => "struct",
                mirra_types::ClassKind::Class => "class",
            };
            out.push_str(&format!("{} {}", keyword, class.name));
            if let Some(parent) = class.parent.filter(|p| *p != types.object_type()) {
                out.push_str(&format!(" : {}", types.name_of(parent)));
            }
            let pad = " ".repeat((level + 1) * step);
            out.push_str(" {\n");
            for field in &class.fields {
                out.push_str(&pad);
                if let Some(value) = &field.const_value {
                    out.push_str(&format!("const {} {} = {};\n", types.name_of(field.ty), field.name, value));
                    continue;
                }
                if field.is_static {
                    out.push_str("static ");
                }
                // 値型のフィールドはその場で展開する
                let expand = matches!(
                    types.get(field.ty).as_deref(),
                    Some(TargetType::Class(c)) if c.kind == mirra_types::ClassKind::Struct
                ) && !describing.contains(&field.ty);
                if expand {
                    describe(types, field.ty, level + 1, step, describing, out);
                    out.push_str(&format!(" {};\n", field.name));
                } else {
                    out.push_str(&format!("{} {};\n", types.name_of(field.ty), field.name));
                }
            }
            for property in &class.properties {
                let accessors = match (property.getter.is_some(), property.setter.is_some()) {
                    (true, true) => "get; set;",
                    (false, true) => "set;",
                    _ => "get;",
                };
                let prefix = if property.is_static { "static " } else { "" };
                out.push_str(&format!(
                    "{}{}{} {} {{ {} }}\n",
                    pad,
                    prefix,
                    types.name_of(property.ty),
                    property.name,
                    accessors
                ));
            }
            for event in &class.events {
                out.push_str(&format!("{}event {} {};\n", pad, types.name_of(event.ty), event.name));
            }
            for ctor in &class.constructors {
                out.push_str(&pad);
                out.push_str(&method_signature(types, ctor, class.short_name(), true));
                out.push('\n');
            }
            for method in &class.methods {
                out.push_str(&pad);
                out.push_str(&method_signature(types, method, &method.name, false));
                out.push('\n');
            }
            out.push_str(&" ".repeat(level * step));
            out.push('}');
            describing.remove(&ty);
        }
        TargetType::Enum(e) => {
            if e.is_flags {
                out.push_str("[Flags] ");
            }
            out.push_str(&format!("enum {} : {} {{\n", e.name, e.underlying.name()));
            let pad = " ".repeat((level + 1) * step);
            for member in &e.members {
                out.push_str(&format!("{}{} = 0x{:x},\n", pad, member.name, member.value));
            }
            out.push_str(&" ".repeat(level * step));
            out.push('}');
        }
        _ => out.push_str(&types.name_of(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use mirra_target::sim::demo::{self, DEMO_THREAD, PUB_MEMBERS};
    use mirra_types::EnumMember;

    fn demo_ctx() -> EvaluationContext {
        let target = demo::build().unwrap();
        EvaluationContext::for_thread(target, DEMO_THREAD)
    }

    fn print(ctx: &EvaluationContext, text: &str, options: FormatOptions) -> String {
        let value = parse_expression(text)
            .unwrap()
            .resolve(ctx)
            .unwrap()
            .evaluate(ctx)
            .unwrap();
        ObjectFormatter::new(ctx, options).format_result(&value).unwrap()
    }

    fn pub_enum() -> EnumType {
        EnumType {
            name: "Demo.Pub".to_string(),
            underlying: mirra_types::FundamentalKind::Int32,
            is_flags: true,
            members: PUB_MEMBERS
                .iter()
                .map(|(name, value)| EnumMember {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_scalars() {
        let ctx = demo_ctx();
        assert_eq!(print(&ctx, "5", FormatOptions::default()), "(int) 5");
        assert_eq!(print(&ctx, "foo.Data", FormatOptions::default()), "(int) 5");
        assert_eq!(print(&ctx, "greeting", FormatOptions::default()), "(string) \"hello\"");
        assert_eq!(print(&ctx, "2.0", FormatOptions::default()), "(double) 2.0");
        let hex = FormatOptions::default().with_format(DisplayFormat::HexaDecimal);
        assert_eq!(print(&ctx, "255", hex), "(int) 0xff");
    }

    #[test]
    fn test_flags_enum_decomposition() {
        let ctx = demo_ctx();
        assert_eq!(
            print(&ctx, "pub", FormatOptions::default()),
            "(Demo.Pub) Music | Drinks | Food | Games | Darts | Quiz | Karaoke"
        );
    }

    #[test]
    fn test_flags_round_trip() {
        let info = pub_enum();
        for bits in [0x1u64, 0x3, 0x301f, 0x2008] {
            let names = decompose_flags(&info, bits).unwrap();
            let value = names
                .iter()
                .map(|n| info.members.iter().find(|m| &m.name == n).unwrap().value)
                .fold(0, |acc, v| acc | v);
            assert_eq!(value, bits);
        }
        assert!(decompose_flags(&info, 0x40).is_none());
    }

    #[test]
    fn test_flags_with_overlapping_members() {
        let mask = |members: &[(&str, u64)]| EnumType {
            name: "Demo.Mask".to_string(),
            underlying: mirra_types::FundamentalKind::Int32,
            is_flags: true,
            members: members
                .iter()
                .map(|(name, value)| EnumMember {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
        };
        let info = mask(&[("Low", 0x3), ("Odd", 0x5)]);
        assert_eq!(
            decompose_flags(&info, 0x7),
            Some(vec!["Low".to_string(), "Odd".to_string()])
        );
        assert_eq!(decompose_flags(&info, 0x5), Some(vec!["Odd".to_string()]));
        assert!(decompose_flags(&info, 0x8).is_none());

        // 合成メンバがあれば個数の少ない分解になる
        let info = mask(&[("One", 0x1), ("Two", 0x2), ("Both", 0x3), ("Four", 0x4)]);
        assert_eq!(
            decompose_flags(&info, 0x7),
            Some(vec!["Both".to_string(), "Four".to_string()])
        );
    }

    #[test]
    fn test_enum_fallbacks() {
        let ctx = demo_ctx();
        let formatter = ObjectFormatter::new(&ctx, FormatOptions::default());
        let mut info = pub_enum();
        assert_eq!(formatter.enum_text(&info, 0x2000), "Karaoke");
        assert_eq!(formatter.enum_text(&info, 0x40), "64");
        info.is_flags = false;
        assert_eq!(formatter.enum_text(&info, 0x3), "3");
    }

    #[test]
    fn test_struct_and_inheritance() {
        let ctx = demo_ctx();
        assert_eq!(print(&ctx, "foo", FormatOptions::default()), "(Demo.Foo) { Data = 5 }");
        assert_eq!(
            print(&ctx, "derived", FormatOptions::default()),
            "(Demo.D) { <C> = { <B> = { BValue = 1 }, CValue = 2 }, DValue = 3 }"
        );
    }

    #[test]
    fn test_arrays_honour_bounds() {
        let ctx = demo_ctx();
        assert_eq!(print(&ctx, "numbers", FormatOptions::default()), "(int[]) [ 10, 20, 30 ]");
        assert_eq!(print(&ctx, "grid", FormatOptions::default()), "(int[,]) [ [ 1, 2 ], [ 3, 4 ] ]");
        assert_eq!(print(&ctx, "empty", FormatOptions::default()), "(int[]) [ ]");
    }

    #[test]
    fn test_pointer_nullable_and_null() {
        let ctx = demo_ctx();
        assert_eq!(print(&ctx, "ptr", FormatOptions::default()), "(int*) &(int) 42");
        assert_eq!(print(&ctx, "maybe", FormatOptions::default()), "(int?) 7");
        assert_eq!(print(&ctx, "nothing", FormatOptions::default()), "(int?) null");
        assert_eq!(print(&ctx, "root", FormatOptions::default()), "(Demo.Root) null");
    }

    #[test]
    fn test_debugger_display_and_object_format() {
        let ctx = demo_ctx();
        assert_eq!(print(&ctx, "origin", FormatOptions::default()), "(Demo.Point) Point(3, 4)");
        let object = FormatOptions::default().with_format(DisplayFormat::Object);
        assert_eq!(print(&ctx, "origin", object), "(Demo.Point) { X = 3, Y = 4 }");
    }

    #[test]
    fn test_line_wrapping() {
        let ctx = demo_ctx();
        let narrow = FormatOptions {
            width: 6,
            ..FormatOptions::default()
        };
        let text = print(&ctx, "numbers", narrow);
        assert!(text.contains('\n'), "{}", text);
        assert_eq!(text.replace("\n  ", " "), "(int[]) [ 10, 20, 30 ]");
    }

    #[test]
    fn test_line_wrapping_follows_nesting() {
        let ctx = demo_ctx();
        let at = |width| FormatOptions {
            width,
            ..FormatOptions::default()
        };
        let value = |text: &str| {
            parse_expression(text)
                .unwrap()
                .resolve(&ctx)
                .unwrap()
                .evaluate(&ctx)
                .unwrap()
        };

        // 要素が幅を超えたら直前の区切りで折り返す
        let numbers = value("numbers");
        assert_eq!(
            ObjectFormatter::new(&ctx, at(7)).format_value(&numbers).unwrap(),
            "[ 10,\n  20, 30 ]"
        );

        // インデントは入れ子の深さに合わせる
        let grid = value("grid");
        assert_eq!(
            ObjectFormatter::new(&ctx, at(6)).format_value(&grid).unwrap(),
            "[ [ 1,\n    2 ],\n  [ 3,\n    4 ] ]"
        );
        let derived = value("derived");
        assert_eq!(
            ObjectFormatter::new(&ctx, at(30)).format_value(&derived).unwrap(),
            "{ <C> = { <B> = { BValue = 1 },\n    CValue = 2 }, DValue = 3 }"
        );
    }

    #[test]
    fn test_describe_type() {
        let ctx = demo_ctx();
        let ty = ctx.lookup_type("D").unwrap().unwrap();
        let text = ObjectFormatter::new(&ctx, FormatOptions::default())
            .describe_type(ty)
            .unwrap();
        assert!(text.starts_with("class Demo.D : Demo.C {"), "{}", text);
        assert!(text.contains("int DValue;"));
        let foo = ctx.lookup_type("Foo").unwrap().unwrap();
        let text = ObjectFormatter::new(&ctx, FormatOptions::default())
            .describe_type(foo)
            .unwrap();
        assert!(text.contains("int Twice { get; }"), "{}", text);
        assert!(text.contains("Foo(int data);"), "{}", text);
    }
}
