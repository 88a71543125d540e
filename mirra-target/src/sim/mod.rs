//! メモリ上で模倣するターゲット
//!
//! 実プロセスの代わりに、オブジェクトヒープ・スレッド・フレーム・レジスタ・関数を
//! メモリ上に持つターゲットです。評価器のテストと CLI のデモで使います。
//!
//! ヒープ内部ではハンドルのインデックスだけを使い、外へ渡すときに現在の停止期間（epoch）を
//! 刻印します。`resume()` の後は古いハンドルがすべて [`TargetError::Stale`] になります。

pub mod demo;

use crate::{
    ArrayObject, ClassObject, Dimension, InterruptToken, InvocationOutcome, InvocationRequest,
    Language, LocalVariable, Location, ObjectHandle, ObjectKind, ProcessId, Result, StackFrame,
    Target, TargetError, TargetObject, ThreadId,
};
use crate::registers::normalize_register_name;
use mirra_types::{
    ClassKind, Decimal, FunctionId, FundamentalKind, Scalar, TargetType, TypeCatalog, TypeHandle,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// ヒープ上のアドレスの開始位置
const HEAP_BASE: u64 = 0x7f00_0000_1000;
/// オブジェクトごとのアドレス間隔
const OBJECT_STRIDE: u64 = 0x20;
/// 呼び出し待機中に割り込みを確認する間隔
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 模倣関数の本体
pub type SimBody = Arc<dyn Fn(&SimCall<'_>) -> InvocationOutcome + Send + Sync>;

/// 模倣関数の呼び出し環境
pub struct SimCall<'a> {
    pub target: &'a SimTarget,
    pub thread: ThreadId,
    pub instance: Option<ObjectHandle>,
    pub args: &'a [ObjectHandle],
    interrupt: &'a InterruptToken,
    deadline: Option<Instant>,
}

impl SimCall<'_> {
    /// 割り込みを受けたか
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    /// 戻らない呼び出しを模倣する
    ///
    /// 割り込まれるかタイムアウトするまでブロックします。
    pub fn block_forever(&self) -> InvocationOutcome {
        loop {
            if self.interrupt.is_interrupted() {
                return InvocationOutcome::Aborted;
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                return InvocationOutcome::Timeout;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// 引数のスカラー値を取得する
    pub fn scalar_arg(&self, index: usize) -> Option<Scalar> {
        let handle = *self.args.get(index)?;
        self.target.object(handle).ok()?.as_scalar().cloned()
    }

    /// 戻り値を作成して返す
    pub fn returns(&self, value: Scalar) -> InvocationOutcome {
        InvocationOutcome::Returned(Some(self.target.alloc_scalar(value)))
    }
}

struct SimFunction {
    name: String,
    body: SimBody,
    hits_breakpoint: bool,
}

/// 模倣フレームの宣言
#[derive(Debug, Clone, Default)]
pub struct SimFrame {
    pub method: String,
    pub declaring_type: Option<TypeHandle>,
    pub namespaces: Vec<String>,
    pub language: Language,
    pub this: Option<ObjectHandle>,
    /// (名前, 型, 値, 引数かどうか)
    pub locals: Vec<(String, TypeHandle, ObjectHandle, bool)>,
}

struct FrameState {
    id: u64,
    decl: SimFrame,
    slots: Vec<u32>,
}

#[derive(Default)]
struct ThreadState {
    stopped: bool,
    /// 末尾が最内フレーム
    frames: Vec<FrameState>,
    registers: HashMap<String, u64>,
}

struct SimState {
    epoch: u32,
    running: bool,
    heap: Vec<TargetObject>,
    by_address: HashMap<u64, u32>,
    statics: HashMap<(TypeHandle, usize), u32>,
    threads: BTreeMap<ThreadId, ThreadState>,
    next_frame_id: u64,
}

/// メモリ上で模倣するターゲット
pub struct SimTarget {
    pid: ProcessId,
    types: TypeCatalog,
    state: RwLock<SimState>,
    functions: RwLock<HashMap<FunctionId, SimFunction>>,
    invocation_timeout: Mutex<Option<Duration>>,
    invocations: AtomicUsize,
}

impl SimTarget {
    /// 空のターゲットを作成する
    pub fn new(pid: u32) -> Self {
        Self {
            pid: ProcessId(pid),
            types: TypeCatalog::new(),
            state: RwLock::new(SimState {
                epoch: 1,
                running: false,
                heap: Vec::new(),
                by_address: HashMap::new(),
                statics: HashMap::new(),
                threads: BTreeMap::new(),
                next_frame_id: 1,
            }),
            functions: RwLock::new(HashMap::new()),
            invocation_timeout: Mutex::new(None),
            invocations: AtomicUsize::new(0),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SimState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SimState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 現在の停止期間
    pub fn epoch(&self) -> u32 {
        self.read_state().epoch
    }

    /// プロセスを再開する（既存のハンドルはすべて無効になる）
    pub fn resume(&self) {
        let mut state = self.write_state();
        state.running = true;
        state.epoch += 1;
        for thread in state.threads.values_mut() {
            thread.stopped = false;
        }
        debug!("sim target resumed, epoch -> {}", state.epoch);
    }

    /// プロセスを停止する
    pub fn stop(&self) {
        let mut state = self.write_state();
        state.running = false;
        for thread in state.threads.values_mut() {
            thread.stopped = true;
        }
    }

    /// 呼び出し層のタイムアウトを設定する
    pub fn set_invocation_timeout(&self, timeout: Option<Duration>) {
        *self.invocation_timeout.lock().unwrap_or_else(|e| e.into_inner()) = timeout;
    }

    /// 実際に本体が実行された呼び出しの回数
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    // ---- ヒープ ----

    fn stamp(epoch: u32, index: u32) -> ObjectHandle {
        ObjectHandle::new(index, epoch)
    }

    fn stamp_object(object: &TargetObject, epoch: u32) -> TargetObject {
        let restamp = |h: ObjectHandle| Self::stamp(epoch, h.index() as u32);
        let kind = match &object.kind {
            ObjectKind::Class(c) => ObjectKind::Class(ClassObject {
                runtime: restamp(c.runtime),
                parent: c.parent.map(restamp),
                fields: c.fields.iter().map(|f| f.map(restamp)).collect(),
            }),
            ObjectKind::Array(a) => ObjectKind::Array(ArrayObject {
                bounds: a.bounds.clone(),
                elements: a.elements.iter().copied().map(restamp).collect(),
            }),
            ObjectKind::Nullable(v) => ObjectKind::Nullable(v.map(restamp)),
            other => other.clone(),
        };
        TargetObject {
            ty: object.ty,
            address: object.address,
            kind,
        }
    }

    fn check(state: &SimState, handle: ObjectHandle) -> Result<u32> {
        if state.running {
            return Err(TargetError::Running);
        }
        if handle.epoch() != state.epoch {
            return Err(TargetError::Stale(handle));
        }
        if handle.index() >= state.heap.len() {
            return Err(TargetError::InvalidHandle(handle));
        }
        Ok(handle.index() as u32)
    }

    fn push_object(state: &mut SimState, ty: TypeHandle, kind: ObjectKind) -> u32 {
        let index = state.heap.len() as u32;
        let address = match kind {
            ObjectKind::Null => 0,
            _ => HEAP_BASE + u64::from(index) * OBJECT_STRIDE,
        };
        if address != 0 {
            state.by_address.insert(address, index);
        }
        state.heap.push(TargetObject { ty, address, kind });
        index
    }

    /// オブジェクトを確保する
    pub fn alloc(&self, ty: TypeHandle, kind: ObjectKind) -> ObjectHandle {
        let mut state = self.write_state();
        let index = Self::push_object(&mut state, ty, kind);
        Self::stamp(state.epoch, index)
    }

    /// スカラー値を確保する
    pub fn alloc_scalar(&self, value: Scalar) -> ObjectHandle {
        let ty = self.types.fundamental(value.kind());
        self.alloc(ty, ObjectKind::Fundamental(value))
    }

    /// 文字列を確保する
    pub fn alloc_string(&self, value: &str) -> ObjectHandle {
        self.alloc_scalar(Scalar::String(value.to_string()))
    }

    /// null を確保する
    pub fn alloc_null(&self, ty: TypeHandle) -> ObjectHandle {
        self.alloc(ty, ObjectKind::Null)
    }

    /// 列挙値を確保する
    pub fn alloc_enum(&self, ty: TypeHandle, bits: u64) -> ObjectHandle {
        self.alloc(ty, ObjectKind::Enum(bits))
    }

    /// Nullable値を確保する
    pub fn alloc_nullable(&self, inner: TypeHandle, value: Option<ObjectHandle>) -> ObjectHandle {
        let ty = self.types.nullable_of(inner);
        self.alloc(ty, ObjectKind::Nullable(value))
    }

    /// ポインタを確保する
    pub fn alloc_pointer(&self, target: TypeHandle, type_safe: bool, address: u64) -> ObjectHandle {
        let ty = self.types.pointer_to(target, type_safe);
        self.alloc(ty, ObjectKind::Pointer { address })
    }

    /// 配列を確保する
    pub fn alloc_array(
        &self,
        element: TypeHandle,
        bounds: Option<Vec<Dimension>>,
        elements: Vec<ObjectHandle>,
    ) -> ObjectHandle {
        let rank = bounds.as_ref().map_or(1, |b| b.len().max(1) as u32);
        let ty = self.types.array_of(element, rank);
        self.alloc(ty, ObjectKind::Array(ArrayObject { bounds, elements }))
    }

    /// 型の既定値を確保する
    pub fn alloc_default(&self, ty: TypeHandle) -> Result<ObjectHandle> {
        let info = self.types.get(ty).ok_or(TargetError::InvalidType(ty))?;
        Ok(match info.as_ref() {
            TargetType::Fundamental(kind) => match kind {
                FundamentalKind::Boolean => self.alloc_scalar(Scalar::Bool(false)),
                FundamentalKind::Char => self.alloc_scalar(Scalar::Char('\0')),
                FundamentalKind::Int32 => self.alloc_scalar(Scalar::Int32(0)),
                FundamentalKind::UInt32 => self.alloc_scalar(Scalar::UInt32(0)),
                FundamentalKind::Int64 => self.alloc_scalar(Scalar::Int64(0)),
                FundamentalKind::UInt64 => self.alloc_scalar(Scalar::UInt64(0)),
                FundamentalKind::Single => self.alloc_scalar(Scalar::Single(0.0)),
                FundamentalKind::Double => self.alloc_scalar(Scalar::Double(0.0)),
                FundamentalKind::Decimal => self.alloc_scalar(Scalar::Decimal(Decimal::new(0, 0))),
                FundamentalKind::String | FundamentalKind::Object => self.alloc_null(ty),
            },
            TargetType::Class(c) if c.kind == ClassKind::Struct => self.alloc_instance(ty, &[])?,
            TargetType::Enum(_) => self.alloc_enum(ty, 0),
            TargetType::Nullable(_) => self.alloc(ty, ObjectKind::Nullable(None)),
            _ => self.alloc_null(ty),
        })
    }

    /// 構造体・クラスのインスタンスを確保する
    ///
    /// 継承階層の各レベルを別々のプロキシとして作成し、指定のないフィールドは既定値にします。
    pub fn alloc_instance(&self, ty: TypeHandle, values: &[(&str, ObjectHandle)]) -> Result<ObjectHandle> {
        let mut chain = Vec::new();
        let mut current = Some(ty);
        while let Some(level) = current {
            let info = self.types.get(level).ok_or(TargetError::InvalidType(level))?;
            let Some(class) = info.as_class() else {
                break;
            };
            chain.push((level, class.clone()));
            current = class.parent;
        }
        if chain.is_empty() {
            return Err(TargetError::Unsupported(format!(
                "{} is not a struct or class",
                self.types.name_of(ty)
            )));
        }

        // 各レベルのフィールド値を先に用意する
        let mut level_fields = Vec::with_capacity(chain.len());
        for (_, class) in &chain {
            let mut fields = Vec::with_capacity(class.fields.len());
            for field in &class.fields {
                if field.is_static {
                    fields.push(None);
                    continue;
                }
                let value = match values.iter().find(|(name, _)| *name == field.name) {
                    Some((_, v)) => *v,
                    None => self.alloc_default(field.ty)?,
                };
                fields.push(Some(value));
            }
            level_fields.push(fields);
        }

        let mut state = self.write_state();
        let epoch = state.epoch;
        let base = state.heap.len() as u32;
        let runtime = Self::stamp(epoch, base);
        for (i, ((level, _), fields)) in chain.iter().zip(level_fields).enumerate() {
            let parent = (i + 1 < chain.len()).then(|| Self::stamp(epoch, base + i as u32 + 1));
            Self::push_object(
                &mut state,
                *level,
                ObjectKind::Class(ClassObject {
                    runtime,
                    parent,
                    fields,
                }),
            );
        }
        trace!("alloc instance of {} at {}", self.types.name_of(ty), runtime);
        Ok(runtime)
    }

    /// 静的フィールドの値を設定する
    pub fn set_static(&self, ty: TypeHandle, field: &str, value: ObjectHandle) -> Result<()> {
        let info = self.types.get(ty).ok_or(TargetError::InvalidType(ty))?;
        let index = info
            .as_class()
            .and_then(|c| c.fields.iter().position(|f| f.is_static && f.name == field))
            .ok_or_else(|| TargetError::Unsupported(format!("no static field {}", field)))?;
        self.write(&Location::StaticField { ty, index }, value)
    }

    // ---- スレッドとフレーム ----

    /// 停止状態のスレッドを追加する
    pub fn add_thread(&self, thread: ThreadId) {
        let mut state = self.write_state();
        state.threads.entry(thread).or_default().stopped = !state.running;
    }

    /// フレームを積む
    pub fn push_frame(&self, thread: ThreadId, frame: SimFrame) -> Result<u64> {
        let mut state = self.write_state();
        for (_, _, value, _) in &frame.locals {
            Self::check(&state, *value)?;
        }
        let id = state.next_frame_id;
        state.next_frame_id += 1;
        let slots = frame.locals.iter().map(|(_, _, v, _)| v.index() as u32).collect();
        let thread_state = state
            .threads
            .get_mut(&thread)
            .ok_or(TargetError::NoSuchThread(thread))?;
        thread_state.frames.push(FrameState {
            id,
            decl: frame,
            slots,
        });
        Ok(id)
    }

    /// 最内フレームを取り除く
    pub fn pop_frame(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.write_state();
        let thread_state = state
            .threads
            .get_mut(&thread)
            .ok_or(TargetError::NoSuchThread(thread))?;
        thread_state.frames.pop().ok_or(TargetError::NoFrame(thread))?;
        Ok(())
    }

    /// レジスタ値を設定する
    pub fn set_register(&self, thread: ThreadId, name: &str, value: u64) -> Result<()> {
        let name = normalize_register_name(name)
            .ok_or_else(|| TargetError::InvalidRegister(name.to_string()))?;
        let mut state = self.write_state();
        state
            .threads
            .get_mut(&thread)
            .ok_or(TargetError::NoSuchThread(thread))?
            .registers
            .insert(name, value);
        Ok(())
    }

    // ---- 関数 ----

    /// 関数を定義する
    pub fn define_function<F>(&self, name: &str, body: F) -> FunctionId
    where
        F: Fn(&SimCall<'_>) -> InvocationOutcome + Send + Sync + 'static,
    {
        self.define(name, Arc::new(body), false)
    }

    /// 呼び出すとブレークポイントにヒットする関数を定義する
    pub fn define_function_with_breakpoint<F>(&self, name: &str, body: F) -> FunctionId
    where
        F: Fn(&SimCall<'_>) -> InvocationOutcome + Send + Sync + 'static,
    {
        self.define(name, Arc::new(body), true)
    }

    fn define(&self, name: &str, body: SimBody, hits_breakpoint: bool) -> FunctionId {
        let mut functions = self.functions.write().unwrap_or_else(|e| e.into_inner());
        let id = FunctionId(functions.len() as u32 + 1);
        functions.insert(
            id,
            SimFunction {
                name: name.to_string(),
                body,
                hits_breakpoint,
            },
        );
        id
    }

    fn frame_to_public(thread: ThreadId, level: u32, frame: &FrameState, epoch: u32) -> StackFrame {
        let locals = frame
            .decl
            .locals
            .iter()
            .enumerate()
            .map(|(slot, (name, ty, _, is_parameter))| LocalVariable {
                name: name.clone(),
                ty: *ty,
                location: Location::Local {
                    thread,
                    frame_id: frame.id,
                    slot,
                },
                is_parameter: *is_parameter,
            })
            .collect();
        StackFrame {
            thread,
            id: frame.id,
            level,
            method: frame.decl.method.clone(),
            declaring_type: frame.decl.declaring_type,
            namespaces: frame.decl.namespaces.clone(),
            language: frame.decl.language,
            this: frame.decl.this.map(|h| Self::stamp(epoch, h.index() as u32)),
            locals,
        }
    }

    fn thread_state(state: &SimState, thread: ThreadId) -> Result<&ThreadState> {
        state.threads.get(&thread).ok_or(TargetError::NoSuchThread(thread))
    }
}

impl Target for SimTarget {
    fn process_id(&self) -> ProcessId {
        self.pid
    }

    fn types(&self) -> &TypeCatalog {
        &self.types
    }

    fn threads(&self) -> Vec<ThreadId> {
        self.read_state().threads.keys().copied().collect()
    }

    fn is_stopped(&self, thread: ThreadId) -> bool {
        self.read_state()
            .threads
            .get(&thread)
            .is_some_and(|t| t.stopped)
    }

    fn current_frame(&self, thread: ThreadId) -> Result<StackFrame> {
        let state = self.read_state();
        let thread_state = Self::thread_state(&state, thread)?;
        let frame = thread_state.frames.last().ok_or(TargetError::NoFrame(thread))?;
        Ok(Self::frame_to_public(thread, 0, frame, state.epoch))
    }

    fn backtrace(&self, thread: ThreadId) -> Result<Vec<StackFrame>> {
        let state = self.read_state();
        let thread_state = Self::thread_state(&state, thread)?;
        Ok(thread_state
            .frames
            .iter()
            .rev()
            .enumerate()
            .map(|(level, frame)| Self::frame_to_public(thread, level as u32, frame, state.epoch))
            .collect())
    }

    fn object(&self, handle: ObjectHandle) -> Result<TargetObject> {
        let state = self.read_state();
        let index = Self::check(&state, handle)?;
        Ok(Self::stamp_object(&state.heap[index as usize], state.epoch))
    }

    fn read(&self, location: &Location) -> Result<ObjectHandle> {
        if let Location::StaticField { ty, index } = location {
            let existing = self.read_state().statics.get(&(*ty, *index)).copied();
            let raw = match existing {
                Some(raw) => raw,
                None => {
                    let field_ty = self
                        .types
                        .get(*ty)
                        .and_then(|t| t.as_class().and_then(|c| c.fields.get(*index).map(|f| f.ty)))
                        .ok_or_else(|| TargetError::LocationInvalid(format!("no static field #{}", index)))?;
                    let value = self.alloc_default(field_ty)?;
                    let mut state = self.write_state();
                    *state.statics.entry((*ty, *index)).or_insert(value.index() as u32)
                }
            };
            let state = self.read_state();
            if state.running {
                return Err(TargetError::Running);
            }
            return Ok(Self::stamp(state.epoch, raw));
        }

        let state = self.read_state();
        if state.running {
            return Err(TargetError::Running);
        }
        let raw = match location {
            Location::Local {
                thread,
                frame_id,
                slot,
            } => {
                let thread_state = Self::thread_state(&state, *thread)?;
                let frame = thread_state
                    .frames
                    .iter()
                    .find(|f| f.id == *frame_id)
                    .ok_or_else(|| {
                        TargetError::LocationInvalid(format!(
                            "stack frame {} of thread {} is no longer active",
                            frame_id, thread
                        ))
                    })?;
                *frame.slots.get(*slot).ok_or_else(|| {
                    TargetError::LocationInvalid(format!("no local variable in slot {}", slot))
                })?
            }
            Location::Field { object, index } => {
                let i = Self::check(&state, *object)?;
                let class = state.heap[i as usize].as_class().ok_or_else(|| {
                    TargetError::LocationInvalid(format!("{} is not an instance", object))
                })?;
                class
                    .fields
                    .get(*index)
                    .copied()
                    .flatten()
                    .ok_or_else(|| TargetError::LocationInvalid(format!("no instance field #{}", index)))?
                    .index() as u32
            }
            Location::ArrayElement { array, index } => {
                let i = Self::check(&state, *array)?;
                match &state.heap[i as usize].kind {
                    ObjectKind::Array(a) => a
                        .elements
                        .get(*index)
                        .ok_or_else(|| {
                            TargetError::LocationInvalid(format!("array element {} is out of range", index))
                        })?
                        .index() as u32,
                    _ => {
                        return Err(TargetError::LocationInvalid(format!("{} is not an array", array)))
                    }
                }
            }
            Location::StaticField { ty, .. } => {
                return Err(TargetError::Unsupported(format!("static field of {}", ty)))
            }
        };
        Ok(Self::stamp(state.epoch, raw))
    }

    fn write(&self, location: &Location, value: ObjectHandle) -> Result<()> {
        let mut state = self.write_state();
        let raw = Self::check(&state, value)?;
        match location {
            Location::Local {
                thread,
                frame_id,
                slot,
            } => {
                let thread_state = state
                    .threads
                    .get_mut(thread)
                    .ok_or(TargetError::NoSuchThread(*thread))?;
                if !thread_state.stopped {
                    return Err(TargetError::NotStopped(*thread));
                }
                let frame = thread_state
                    .frames
                    .iter_mut()
                    .find(|f| f.id == *frame_id)
                    .ok_or_else(|| {
                        TargetError::LocationInvalid(format!(
                            "stack frame {} of thread {} is no longer active",
                            frame_id, thread
                        ))
                    })?;
                let target = frame.slots.get_mut(*slot).ok_or_else(|| {
                    TargetError::LocationInvalid(format!("no local variable in slot {}", slot))
                })?;
                *target = raw;
            }
            Location::Field { object, index } => {
                let i = Self::check(&state, *object)?;
                let epoch = state.epoch;
                match &mut state.heap[i as usize].kind {
                    ObjectKind::Class(c) => match c.fields.get_mut(*index) {
                        Some(Some(slot)) => *slot = Self::stamp(epoch, raw),
                        _ => {
                            return Err(TargetError::LocationInvalid(format!(
                                "no instance field #{}",
                                index
                            )))
                        }
                    },
                    _ => {
                        return Err(TargetError::LocationInvalid(format!("{} is not an instance", object)))
                    }
                }
            }
            Location::StaticField { ty, index } => {
                state.statics.insert((*ty, *index), raw);
            }
            Location::ArrayElement { array, index } => {
                let i = Self::check(&state, *array)?;
                let epoch = state.epoch;
                match &mut state.heap[i as usize].kind {
                    ObjectKind::Array(a) => {
                        let slot = a.elements.get_mut(*index).ok_or_else(|| {
                            TargetError::LocationInvalid(format!("array element {} is out of range", index))
                        })?;
                        *slot = Self::stamp(epoch, raw);
                    }
                    _ => {
                        return Err(TargetError::LocationInvalid(format!("{} is not an array", array)))
                    }
                }
            }
        }
        Ok(())
    }

    fn create_scalar(&self, ty: TypeHandle, value: Scalar) -> Result<ObjectHandle> {
        let info = self.types.get(ty).ok_or(TargetError::InvalidType(ty))?;
        match info.as_ref() {
            TargetType::Enum(_) => {
                let bits = value.as_bits().ok_or_else(|| {
                    TargetError::Unsupported(format!("{} is not an integer", value))
                })?;
                Ok(self.alloc_enum(ty, bits))
            }
            _ => Ok(self.alloc(ty, ObjectKind::Fundamental(value))),
        }
    }

    fn create_null(&self, ty: TypeHandle) -> Result<ObjectHandle> {
        if self.read_state().running {
            return Err(TargetError::Running);
        }
        Ok(self.alloc_null(ty))
    }

    fn dereference(&self, pointer: ObjectHandle) -> Result<ObjectHandle> {
        let state = self.read_state();
        let i = Self::check(&state, pointer)?;
        match state.heap[i as usize].kind {
            ObjectKind::Pointer { address: 0 } => {
                Err(TargetError::LocationInvalid("null pointer dereference".to_string()))
            }
            ObjectKind::Pointer { address } => state
                .by_address
                .get(&address)
                .map(|raw| Self::stamp(state.epoch, *raw))
                .ok_or_else(|| {
                    TargetError::LocationInvalid(format!("cannot read memory at 0x{:x}", address))
                }),
            _ => Err(TargetError::Unsupported(format!("{} is not a pointer", pointer))),
        }
    }

    fn address_of(&self, object: ObjectHandle) -> Result<ObjectHandle> {
        let (ty, address) = {
            let state = self.read_state();
            let i = Self::check(&state, object)?;
            let obj = &state.heap[i as usize];
            (obj.ty, obj.address)
        };
        if address == 0 {
            return Err(TargetError::LocationInvalid("value has no address".to_string()));
        }
        Ok(self.alloc_pointer(ty, true, address))
    }

    fn read_register(&self, thread: ThreadId, name: &str) -> Result<u64> {
        let reg = normalize_register_name(name)
            .ok_or_else(|| TargetError::InvalidRegister(name.to_string()))?;
        let state = self.read_state();
        let thread_state = Self::thread_state(&state, thread)?;
        if !thread_state.stopped {
            return Err(TargetError::NotStopped(thread));
        }
        Ok(thread_state.registers.get(&reg).copied().unwrap_or_default())
    }

    fn write_register(&self, thread: ThreadId, name: &str, value: u64) -> Result<()> {
        if !self.is_stopped(thread) {
            return Err(TargetError::NotStopped(thread));
        }
        self.set_register(thread, name, value)
    }

    fn invoke(&self, request: &InvocationRequest<'_>) -> Result<InvocationOutcome> {
        {
            let state = self.read_state();
            let thread_state = Self::thread_state(&state, request.thread)?;
            if !thread_state.stopped {
                return Err(TargetError::NotStopped(request.thread));
            }
            if let Some(instance) = request.instance {
                Self::check(&state, instance)?;
            }
            for arg in request.args {
                Self::check(&state, *arg)?;
            }
        }

        if request.interrupt.is_interrupted() {
            debug!("invocation of {:?} aborted before start", request.function);
            return Ok(InvocationOutcome::Aborted);
        }

        let (name, body, hits_breakpoint) = {
            let functions = self.functions.read().unwrap_or_else(|e| e.into_inner());
            let function = functions.get(&request.function).ok_or_else(|| {
                TargetError::Unsupported(format!("unknown function {:?}", request.function))
            })?;
            (function.name.clone(), function.body.clone(), function.hits_breakpoint)
        };

        if hits_breakpoint {
            if request.flags.nested_break_states {
                debug!("breakpoint hit while invoking {}", name);
                return Ok(InvocationOutcome::BreakpointHit);
            }
            trace!("breakpoint in {} suppressed (no nested break states)", name);
        }

        let timeout = *self.invocation_timeout.lock().unwrap_or_else(|e| e.into_inner());
        let call = SimCall {
            target: self,
            thread: request.thread,
            instance: request.instance,
            args: request.args,
            interrupt: request.interrupt,
            deadline: timeout.map(|t| Instant::now() + t),
        };
        self.invocations.fetch_add(1, Ordering::SeqCst);
        debug!("invoking {} on thread {}", name, request.thread);
        Ok((body)(&call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_types::{ClassType, FieldInfo};

    fn point_type(target: &SimTarget) -> TypeHandle {
        let int = target.types().fundamental(FundamentalKind::Int32);
        let mut class = ClassType::new("Demo.Point", ClassKind::Struct);
        class.fields.push(FieldInfo::new("X", int));
        class.fields.push(FieldInfo::new("Y", int));
        target.types().register(TargetType::Class(class))
    }

    #[test]
    fn test_instance_fields_default() {
        let target = SimTarget::new(1);
        let point = point_type(&target);
        let x = target.alloc_scalar(Scalar::Int32(3));
        let p = target.alloc_instance(point, &[("X", x)]).unwrap();
        let y = target.read(&Location::Field { object: p, index: 1 }).unwrap();
        assert_eq!(target.object(y).unwrap().as_scalar(), Some(&Scalar::Int32(0)));
        let x = target.read(&Location::Field { object: p, index: 0 }).unwrap();
        assert_eq!(target.object(x).unwrap().as_scalar(), Some(&Scalar::Int32(3)));
    }

    #[test]
    fn test_handles_go_stale_after_resume() {
        let target = SimTarget::new(1);
        let v = target.alloc_scalar(Scalar::Int32(1));
        target.resume();
        assert_eq!(target.object(v), Err(TargetError::Running));
        target.stop();
        assert_eq!(target.object(v), Err(TargetError::Stale(v)));
    }

    #[test]
    fn test_popped_frame_location_is_invalid() {
        let target = SimTarget::new(1);
        let thread = ThreadId(1);
        target.add_thread(thread);
        let int = target.types().fundamental(FundamentalKind::Int32);
        let v = target.alloc_scalar(Scalar::Int32(1));
        target
            .push_frame(
                thread,
                SimFrame {
                    method: "Main".into(),
                    locals: vec![("x".into(), int, v, false)],
                    ..Default::default()
                },
            )
            .unwrap();
        let frame = target.current_frame(thread).unwrap();
        let location = frame.locals[0].location.clone();
        assert_eq!(target.read(&location).unwrap(), v);
        target.pop_frame(thread).unwrap();
        assert!(matches!(target.read(&location), Err(TargetError::LocationInvalid(_))));
    }

    #[test]
    fn test_pointer_roundtrip() {
        let target = SimTarget::new(1);
        let v = target.alloc_scalar(Scalar::Int32(42));
        let p = target.address_of(v).unwrap();
        assert_eq!(target.dereference(p).unwrap(), v);
        let int = target.types().fundamental(FundamentalKind::Int32);
        let dangling = target.alloc_pointer(int, true, 0xdead);
        assert!(matches!(target.dereference(dangling), Err(TargetError::LocationInvalid(_))));
    }

    #[test]
    fn test_invoke_aborted_before_start_has_no_side_effects() {
        let target = SimTarget::new(1);
        let thread = ThreadId(1);
        target.add_thread(thread);
        let f = target.define_function("Hang", |call| call.block_forever());
        let token = InterruptToken::new();
        token.interrupt();
        let outcome = target
            .invoke(&InvocationRequest {
                thread,
                function: f,
                instance: None,
                args: &[],
                flags: Default::default(),
                interrupt: &token,
            })
            .unwrap();
        assert_eq!(outcome, InvocationOutcome::Aborted);
        assert_eq!(target.invocation_count(), 0);
    }

    #[test]
    fn test_invoke_timeout() {
        let target = SimTarget::new(1);
        let thread = ThreadId(1);
        target.add_thread(thread);
        target.set_invocation_timeout(Some(Duration::from_millis(20)));
        let f = target.define_function("Hang", |call| call.block_forever());
        let token = InterruptToken::new();
        let outcome = target
            .invoke(&InvocationRequest {
                thread,
                function: f,
                instance: None,
                args: &[],
                flags: Default::default(),
                interrupt: &token,
            })
            .unwrap();
        assert_eq!(outcome, InvocationOutcome::Timeout);
    }
}
