//! 自動表示リスト（`display` コマンド）
//!
//! 式は文字列として保持し、表示のたびにパースし直します。
//! 一時的に解決できなくてもエントリは削除しません。

use crate::context::EvaluationContext;
use crate::engine;
use crate::format::{DisplayFormat, FormatOptions};
use tracing::debug;

/// 自動表示エントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayEntry {
    /// 表示番号（1から始まり、再利用しない）
    pub index: usize,
    pub text: String,
    pub format: DisplayFormat,
}

/// 自動表示リスト
#[derive(Debug, Clone)]
pub struct DisplayList {
    entries: Vec<DisplayEntry>,
    next_index: usize,
}

impl Default for DisplayList {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_index: 1,
        }
    }

    /// エントリを追加して表示番号を返す
    pub fn add(&mut self, text: impl Into<String>, format: DisplayFormat) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.push(DisplayEntry {
            index,
            text: text.into(),
            format,
        });
        index
    }

    /// 表示番号のエントリを削除する
    pub fn remove(&mut self, index: usize) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.index != index);
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1つのエントリを評価して表示行を作る
    pub fn show(ctx: &EvaluationContext, entry: &DisplayEntry, options: &FormatOptions) -> String {
        let options = options.with_format(entry.format);
        let result = engine::parse(&entry.text)
            .and_then(|handle| engine::evaluate(&ctx.clone(), &handle, &options));
        match result {
            Ok(text) => format!("{}: {} = {}", entry.index, entry.text, text),
            Err(e) => {
                debug!("display #{} failed: {}", entry.index, e);
                format!("{}: {} = <error: {}>", entry.index, entry.text, e)
            }
        }
    }

    /// すべてのエントリを評価する（失敗したエントリもエラー文で表示する）
    pub fn show_all(&self, ctx: &EvaluationContext, options: &FormatOptions) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| Self::show(ctx, entry, options))
            .collect()
    }
}
