//! オブジェクトプロキシ
//!
//! ターゲット内の生きた値を指すハンドルと、その時点のスナップショットです。
//! ハンドルは取得した停止期間（epoch）の間だけ有効で、プロセスが再開された後に
//! 使うと [`TargetError::Stale`](crate::TargetError::Stale) になります。

use crate::ThreadId;
use mirra_types::{Scalar, TypeHandle};
use std::fmt;

/// オブジェクトハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    epoch: u32,
}

impl ObjectHandle {
    pub fn new(index: u32, epoch: u32) -> Self {
        Self { index, epoch }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    /// ハンドルを取得した停止期間
    pub fn epoch(self) -> u32 {
        self.epoch
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}.{}", self.index, self.epoch)
    }
}

/// 配列の1次元分の境界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub lower: i64,
    pub length: u64,
}

impl Dimension {
    pub fn new(lower: i64, length: u64) -> Self {
        Self { lower, length }
    }

    /// 上限（含む）
    pub fn upper(&self) -> i64 {
        self.lower + self.length as i64 - 1
    }
}

/// 構造体・クラスのインスタンス
///
/// 継承階層の各レベルが別々のプロキシになっており、`parent` で親レベルをたどれます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassObject {
    /// 最派生レベルのプロキシ
    pub runtime: ObjectHandle,
    /// 親クラスレベルのプロキシ
    pub parent: Option<ObjectHandle>,
    /// このレベルで宣言されたフィールドの値（静的フィールドの位置は None）
    pub fields: Vec<Option<ObjectHandle>>,
}

/// 配列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayObject {
    /// 次元ごとの境界（未割り当てなら None）
    pub bounds: Option<Vec<Dimension>>,
    /// 行優先で平坦化した要素
    pub elements: Vec<ObjectHandle>,
}

impl ArrayObject {
    /// 多次元インデックスを平坦化したインデックスに変換する
    pub fn flat_index(&self, indices: &[i64]) -> Option<usize> {
        let bounds = self.bounds.as_ref()?;
        if indices.len() != bounds.len() {
            return None;
        }
        let mut flat: u64 = 0;
        for (index, dim) in indices.iter().zip(bounds) {
            if *index < dim.lower || *index > dim.upper() {
                return None;
            }
            flat = flat * dim.length + (*index - dim.lower) as u64;
        }
        Some(flat as usize)
    }
}

/// オブジェクトの中身
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// null 参照
    Null,
    Fundamental(Scalar),
    Class(ClassObject),
    Array(ArrayObject),
    Pointer { address: u64 },
    /// 列挙値（ビットパターン）
    Enum(u64),
    Nullable(Option<ObjectHandle>),
}

/// オブジェクトのスナップショット
#[derive(Debug, Clone, PartialEq)]
pub struct TargetObject {
    /// このプロキシの型（継承階層のレベル）
    pub ty: TypeHandle,
    /// ターゲット内のアドレス
    pub address: u64,
    pub kind: ObjectKind,
}

impl TargetObject {
    pub fn is_null(&self) -> bool {
        matches!(self.kind, ObjectKind::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            ObjectKind::Fundamental(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassObject> {
        match &self.kind {
            ObjectKind::Class(c) => Some(c),
            _ => None,
        }
    }
}

/// 書き戻し可能な値の位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// スタックフレーム上のローカル変数・引数
    Local {
        thread: ThreadId,
        /// フレームの一意なID（ポップされたら無効）
        frame_id: u64,
        slot: usize,
    },
    /// インスタンスフィールド
    Field { object: ObjectHandle, index: usize },
    /// 静的フィールド
    StaticField { ty: TypeHandle, index: usize },
    /// 配列要素（平坦化インデックス）
    ArrayElement { array: ObjectHandle, index: usize },
}
