//! 評価コンテキスト
//!
//! 1回の評価要求の間だけ使う状態（プロセス・スレッド・フレーム・言語・フラグ・割り込みトークン）を保持します。
//! トップレベルの評価ごとに新しく作り、永続化はしません。

use crate::errors::{EvalError, ERR_NO_PROCESS, ERR_NO_THREAD};
use crate::Result;
use mirra_target::{InterruptToken, Language, ObjectHandle, StackFrame, Target, ThreadId};
use mirra_types::{TypeCatalog, TypeHandle};
use std::sync::Arc;
use tracing::trace;

/// 評価フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationFlags {
    /// 呼び出し中のブレークポイントヒットを入れ子の停止状態として扱う
    pub nested_break_states: bool,
    /// ターゲット内メソッドの呼び出しを許可する
    pub allow_invocations: bool,
}

impl Default for EvaluationFlags {
    fn default() -> Self {
        Self {
            nested_break_states: false,
            allow_invocations: true,
        }
    }
}

/// 評価コンテキスト
#[derive(Clone)]
pub struct EvaluationContext {
    process: Option<Arc<dyn Target>>,
    thread: Option<ThreadId>,
    frame: Option<StackFrame>,
    language: Language,
    flags: EvaluationFlags,
    implicit_instance: Option<ObjectHandle>,
    interrupt: Option<InterruptToken>,
}

impl EvaluationContext {
    /// プロセスのないコンテキスト（リテラルの評価にだけ使える）
    pub fn empty() -> Self {
        Self {
            process: None,
            thread: None,
            frame: None,
            language: Language::default(),
            flags: EvaluationFlags::default(),
            implicit_instance: None,
            interrupt: None,
        }
    }

    /// プロセスを指定してコンテキストを作成する
    pub fn new(process: Arc<dyn Target>) -> Self {
        Self {
            process: Some(process),
            ..Self::empty()
        }
    }

    /// スレッドの最内フレームを選択したコンテキストを作成する
    ///
    /// フレームのないスレッドでもスレッドだけは選択されます。
    pub fn for_thread(process: Arc<dyn Target>, thread: ThreadId) -> Self {
        let frame = process.current_frame(thread).ok();
        let mut ctx = Self::new(process);
        ctx.thread = Some(thread);
        if let Some(frame) = frame {
            ctx.set_current_frame(frame);
        }
        ctx
    }

    /// インスタンスを暗黙の `this` とするコンテキストを作成する（フレームなし）
    pub fn scoped_to(&self, instance: ObjectHandle) -> Self {
        Self {
            process: self.process.clone(),
            thread: self.thread,
            frame: None,
            language: self.language,
            flags: self.flags,
            implicit_instance: Some(instance),
            interrupt: self.interrupt.clone(),
        }
    }

    pub fn current_process(&self) -> Result<&Arc<dyn Target>> {
        self.process
            .as_ref()
            .ok_or_else(|| EvalError::NoTarget(ERR_NO_PROCESS.to_string()))
    }

    pub fn current_thread(&self) -> Result<ThreadId> {
        self.thread
            .ok_or_else(|| EvalError::NoTarget(ERR_NO_THREAD.to_string()))
    }

    pub fn set_current_thread(&mut self, thread: ThreadId) {
        if self.thread != Some(thread) {
            self.frame = None;
        }
        self.thread = Some(thread);
    }

    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.frame.as_ref()
    }

    /// フレームを選択する（スレッドと言語も合わせて切り替わる）
    pub fn set_current_frame(&mut self, frame: StackFrame) {
        trace!("select frame #{} ({}) on thread {}", frame.level, frame.method, frame.thread);
        self.thread = Some(frame.thread);
        self.language = frame.language;
        self.frame = Some(frame);
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn flags(&self) -> EvaluationFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: EvaluationFlags) {
        self.flags = flags;
    }

    pub fn implicit_instance(&self) -> Option<ObjectHandle> {
        self.implicit_instance
    }

    pub fn set_implicit_instance(&mut self, instance: Option<ObjectHandle>) {
        self.implicit_instance = instance;
    }

    /// 割り込みトークン（未指定ならプロセス全体の既定トークン）
    pub fn interrupt(&self) -> &InterruptToken {
        self.interrupt.as_ref().unwrap_or_else(|| InterruptToken::global())
    }

    pub fn set_interrupt(&mut self, token: InterruptToken) {
        self.interrupt = Some(token);
    }

    /// 型カタログ
    pub fn types(&self) -> Result<&TypeCatalog> {
        Ok(self.current_process()?.types())
    }

    /// `this` として使えるオブジェクト
    pub fn this_object(&self) -> Option<ObjectHandle> {
        match &self.frame {
            Some(frame) => frame.this,
            None => self.implicit_instance,
        }
    }

    /// 名前解決の起点となる型（フレームの宣言型か暗黙インスタンスの型）
    pub fn scope_type(&self) -> Option<TypeHandle> {
        match &self.frame {
            Some(frame) => frame.declaring_type,
            None => {
                let instance = self.implicit_instance?;
                let process = self.process.as_ref()?;
                process.object(instance).ok().map(|o| o.ty)
            }
        }
    }

    /// 現在のスコープの名前空間（外側から順）
    ///
    /// フレームがあればメソッドのレキシカルスコープから、なければ暗黙インスタンスの型名から求めます。
    pub fn namespaces(&self) -> Vec<String> {
        if let Some(frame) = &self.frame {
            return frame.namespaces.clone();
        }
        let Some(ty) = self.scope_type() else {
            return Vec::new();
        };
        let Ok(types) = self.types() else {
            return Vec::new();
        };
        let name = types.name_of(ty);
        let mut namespaces = Vec::new();
        let mut prefix = String::new();
        let parts: Vec<&str> = name.split('.').collect();
        for part in parts.iter().take(parts.len().saturating_sub(1)) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            namespaces.push(prefix.clone());
        }
        namespaces
    }

    /// 名前空間を内側から順に試して型を検索する
    pub fn lookup_type(&self, name: &str) -> Result<Option<TypeHandle>> {
        let types = self.types()?;
        for ns in self.namespaces().iter().rev() {
            if let Some(ty) = types.lookup(&format!("{}.{}", ns, name)) {
                return Ok(Some(ty));
            }
        }
        Ok(types.lookup(name))
    }

    /// 現在のスレッドが停止していることを確認する
    pub fn check_stopped(&self) -> Result<()> {
        let thread = self.current_thread()?;
        if self.current_process()?.is_stopped(thread) {
            Ok(())
        } else {
            Err(EvalError::NotStopped)
        }
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("process", &self.process.as_ref().map(|p| p.process_id()))
            .field("thread", &self.thread)
            .field("frame", &self.frame.as_ref().map(|fr| &fr.method))
            .field("language", &self.language)
            .field("flags", &self.flags)
            .field("implicit_instance", &self.implicit_instance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_target::sim::demo::{self, DEMO_THREAD};

    #[test]
    fn test_empty_context_has_no_process() {
        let ctx = EvaluationContext::empty();
        assert!(matches!(ctx.current_process(), Err(EvalError::NoTarget(_))));
        assert!(matches!(ctx.current_thread(), Err(EvalError::NoTarget(_))));
    }

    #[test]
    fn test_frame_selects_thread_and_namespaces() {
        let target = demo::build().unwrap();
        let ctx = EvaluationContext::for_thread(target, DEMO_THREAD);
        assert_eq!(ctx.current_thread().unwrap(), DEMO_THREAD);
        assert_eq!(ctx.namespaces(), vec!["Demo".to_string()]);
        assert!(ctx.lookup_type("Foo").unwrap().is_some());
    }

    #[test]
    fn test_namespaces_from_implicit_instance() {
        let target = demo::build().unwrap();
        let ctx = EvaluationContext::for_thread(target.clone(), DEMO_THREAD);
        let frame = ctx.current_frame().unwrap();
        let origin = target
            .read(&frame.find_local("origin").unwrap().location)
            .unwrap();
        let scoped = ctx.scoped_to(origin);
        assert!(scoped.current_frame().is_none());
        assert_eq!(scoped.this_object(), Some(origin));
        assert_eq!(scoped.namespaces(), vec!["Demo".to_string()]);
    }

    #[test]
    fn test_default_interrupt_is_global() {
        let ctx = EvaluationContext::empty();
        assert!(std::ptr::eq(ctx.interrupt(), InterruptToken::global()));
    }
}
