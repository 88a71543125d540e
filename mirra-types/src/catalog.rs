//! 型カタログ
//!
//! 型の実体を所有する追記専用のアリーナです。評価器は [`TypeHandle`] だけを保持し、
//! 型の寿命はカタログ（＝プロセス制御層）が管理します。

use crate::type_info::{
    ArrayType, ClassType, FundamentalKind, NullableType, PointerType, TargetType,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// 型ハンドル（カタログ内のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(u32);

impl TypeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct CatalogInner {
    types: Vec<Arc<TargetType>>,
    by_name: HashMap<String, TypeHandle>,
    pointers: HashMap<(TypeHandle, bool), TypeHandle>,
    arrays: HashMap<(TypeHandle, u32), TypeHandle>,
    nullables: HashMap<TypeHandle, TypeHandle>,
}

/// 型カタログ
pub struct TypeCatalog {
    inner: RwLock<CatalogInner>,
}

impl TypeCatalog {
    /// 基本型を登録済みのカタログを作成する
    pub fn new() -> Self {
        let catalog = Self {
            inner: RwLock::new(CatalogInner::default()),
        };
        for kind in FundamentalKind::ALL {
            let handle = catalog.register(TargetType::Fundamental(kind));
            let mut inner = catalog.write();
            inner.by_name.insert(kind.name().to_string(), handle);
            inner.by_name.insert(kind.full_name().to_string(), handle);
        }
        catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 基本型のハンドルを取得する
    pub fn fundamental(&self, kind: FundamentalKind) -> TypeHandle {
        let index = FundamentalKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        TypeHandle(index as u32)
    }

    /// 万物の基底型
    pub fn object_type(&self) -> TypeHandle {
        self.fundamental(FundamentalKind::Object)
    }

    /// 型を登録する
    ///
    /// 構造体・クラス・列挙型は名前でも引けるようになります。
    pub fn register(&self, ty: TargetType) -> TypeHandle {
        let mut inner = self.write();
        let handle = TypeHandle(inner.types.len() as u32);
        let name = match &ty {
            TargetType::Class(c) => Some(c.name.clone()),
            TargetType::Enum(e) => Some(e.name.clone()),
            _ => None,
        };
        if let Some(name) = name {
            trace!("register type '{}' as {}", name, handle);
            inner.by_name.insert(name, handle);
        }
        inner.types.push(Arc::new(ty));
        handle
    }

    /// 構造体・クラス型を更新する
    ///
    /// 自己参照する型は先に [`register`](Self::register) でハンドルを確保してから
    /// メンバを追加します。
    pub fn update_class<F>(&self, handle: TypeHandle, f: F) -> bool
    where
        F: FnOnce(&mut ClassType),
    {
        let mut inner = self.write();
        let Some(slot) = inner.types.get_mut(handle.index()) else {
            return false;
        };
        match Arc::make_mut(slot) {
            TargetType::Class(class) => {
                f(class);
                true
            }
            _ => false,
        }
    }

    /// 型を取得する
    pub fn get(&self, handle: TypeHandle) -> Option<Arc<TargetType>> {
        self.read().types.get(handle.index()).cloned()
    }

    /// 名前で型を検索する
    pub fn lookup(&self, name: &str) -> Option<TypeHandle> {
        self.read().by_name.get(name).copied()
    }

    /// 登録済みの型の数
    pub fn len(&self) -> usize {
        self.read().types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 親クラスを取得する
    pub fn parent_of(&self, handle: TypeHandle) -> Option<TypeHandle> {
        self.get(handle)?.as_class()?.parent
    }

    /// ポインタ型を取得する（なければ作成する）
    pub fn pointer_to(&self, target: TypeHandle, type_safe: bool) -> TypeHandle {
        if let Some(h) = self.read().pointers.get(&(target, type_safe)) {
            return *h;
        }
        let handle = self.register(TargetType::Pointer(PointerType { target, type_safe }));
        self.write().pointers.insert((target, type_safe), handle);
        handle
    }

    /// 配列型を取得する（なければ作成する）
    pub fn array_of(&self, element: TypeHandle, rank: u32) -> TypeHandle {
        if let Some(h) = self.read().arrays.get(&(element, rank)) {
            return *h;
        }
        let handle = self.register(TargetType::Array(ArrayType { element, rank }));
        self.write().arrays.insert((element, rank), handle);
        handle
    }

    /// Nullable型を取得する（なければ作成する）
    pub fn nullable_of(&self, inner: TypeHandle) -> TypeHandle {
        if let Some(h) = self.read().nullables.get(&inner) {
            return *h;
        }
        let handle = self.register(TargetType::Nullable(NullableType { inner }));
        self.write().nullables.insert(inner, handle);
        handle
    }

    /// 表示用の型名を取得する
    pub fn name_of(&self, handle: TypeHandle) -> String {
        let Some(ty) = self.get(handle) else {
            return format!("<invalid type {}>", handle);
        };
        match ty.as_ref() {
            TargetType::Fundamental(kind) => kind.name().to_string(),
            TargetType::Class(c) => c.name.clone(),
            TargetType::Enum(e) => e.name.clone(),
            TargetType::Array(a) => {
                let commas = ",".repeat(a.rank.saturating_sub(1) as usize);
                format!("{}[{}]", self.name_of(a.element), commas)
            }
            TargetType::Pointer(p) => format!("{}*", self.name_of(p.target)),
            TargetType::Nullable(n) => format!("{}?", self.name_of(n.inner)),
        }
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("types", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_info::ClassKind;

    #[test]
    fn test_fundamentals_registered() {
        let catalog = TypeCatalog::new();
        let int = catalog.fundamental(FundamentalKind::Int32);
        assert_eq!(catalog.lookup("int"), Some(int));
        assert_eq!(catalog.lookup("System.Int32"), Some(int));
        assert_eq!(catalog.name_of(int), "int");
        assert_eq!(catalog.name_of(catalog.object_type()), "object");
    }

    #[test]
    fn test_derived_types_are_interned() {
        let catalog = TypeCatalog::new();
        let int = catalog.fundamental(FundamentalKind::Int32);
        let a = catalog.array_of(int, 2);
        assert_eq!(catalog.array_of(int, 2), a);
        assert_eq!(catalog.name_of(a), "int[,]");
        let p = catalog.pointer_to(int, true);
        assert_eq!(catalog.pointer_to(int, true), p);
        assert_eq!(catalog.name_of(p), "int*");
        assert_eq!(catalog.name_of(catalog.nullable_of(int)), "int?");
    }

    #[test]
    fn test_update_class_self_reference() {
        let catalog = TypeCatalog::new();
        let node = catalog.register(TargetType::Class(ClassType::new("Demo.Node", ClassKind::Class)));
        assert!(catalog.update_class(node, |c| {
            c.fields.push(crate::FieldInfo::new("next", node));
        }));
        let ty = catalog.get(node).unwrap();
        assert_eq!(ty.as_class().unwrap().fields[0].ty, node);
        assert_eq!(catalog.lookup("Demo.Node"), Some(node));
    }
}
