//! 割り込み（キャンセル）トークン
//!
//! セッション全体の Ctrl-C と個々の評価の abort を同じ仕組みで扱います。
//! 子トークンは親が割り込まれると一緒に割り込まれますが、子を割り込んでも親には伝わりません。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn trip(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(|e| e.into_inner()));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.trip();
        }
    }
}

/// 割り込みトークン
#[derive(Clone, Default)]
pub struct InterruptToken {
    inner: Arc<Inner>,
}

impl InterruptToken {
    /// 新しいトークンを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// プロセス全体で共有される既定のトークン
    ///
    /// 呼び出し側がトークンを指定しなかった評価はこれを使います。
    pub fn global() -> &'static InterruptToken {
        static GLOBAL: OnceLock<InterruptToken> = OnceLock::new();
        GLOBAL.get_or_init(InterruptToken::new)
    }

    /// 子トークンを作成する
    pub fn child(&self) -> InterruptToken {
        let child = InterruptToken::new();
        // フラグはロックを取ってから確認する（`trip` は立ててから子を取り出す）
        let mut children = self.inner.children.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_interrupted() {
            drop(children);
            child.inner.trip();
        } else {
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    /// 割り込む（何度呼んでもよい）
    pub fn interrupt(&self) {
        self.inner.trip();
    }

    /// 割り込まれているか
    pub fn is_interrupted(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// 割り込み状態を解除する
    ///
    /// セッショントークンをコマンドごとに再利用するためのものです。既に作られた子トークンには影響しません。
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
    }

    /// 割り込まれるまで待つ
    pub async fn interrupted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for InterruptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptToken")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_child_follows_parent() {
        let parent = InterruptToken::new();
        let child = parent.child();
        assert!(!child.is_interrupted());
        parent.interrupt();
        assert!(child.is_interrupted());
    }

    #[test]
    fn test_child_does_not_propagate_up() {
        let parent = InterruptToken::new();
        let child = parent.child();
        child.interrupt();
        child.interrupt();
        assert!(!parent.is_interrupted());
    }

    #[test]
    fn test_child_of_interrupted_parent_starts_interrupted() {
        let parent = InterruptToken::new();
        parent.interrupt();
        assert!(parent.child().is_interrupted());
    }

    #[test]
    fn test_children_created_while_interrupting_are_tripped() {
        for _ in 0..200 {
            let parent = InterruptToken::new();
            let trip = parent.clone();
            let interrupter = std::thread::spawn(move || trip.interrupt());
            let children: Vec<_> = (0..50).map(|_| parent.child()).collect();
            interrupter.join().unwrap();
            assert!(children.iter().all(InterruptToken::is_interrupted));
        }
    }

    #[tokio::test]
    async fn test_interrupted_wakes_waiter() {
        let token = InterruptToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.interrupted().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.interrupt();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
