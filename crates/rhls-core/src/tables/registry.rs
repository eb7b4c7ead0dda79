//! 用意済みテーブルの集合

use std::collections::HashMap;

use log::error;

use super::{AddTable, MulTable, RamHints};
use crate::nnet::error::{KernelError, KernelResult};

/// 乗算テーブルのキー（幅 + 実装先ヒント）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MulKey {
    width1: u32,
    width2: u32,
    hints: RamHints,
}

/// 加算テーブルのキー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AddKey {
    width: u32,
    hints: RamHints,
}

/// テーブル集合
///
/// HLS 側では幅とヒントの組ごとにテーブルが特殊化される。
/// 用意されていない組を引いた場合は 0 を返さずにエラーにする。
#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    mul: HashMap<MulKey, MulTable>,
    add: HashMap<AddKey, AddTable>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 乗算テーブルを登録（同じキーは置き換え）
    pub fn insert_mul(&mut self, table: MulTable) {
        let key = MulKey {
            width1: table.width1(),
            width2: table.width2(),
            hints: table.hints(),
        };
        self.mul.insert(key, table);
    }

    /// 加算テーブルを登録（同じキーは置き換え）
    pub fn insert_add(&mut self, table: AddTable) {
        let key = AddKey {
            width: table.width(),
            hints: table.hints(),
        };
        self.add.insert(key, table);
    }

    /// 乗算テーブルを生成して登録
    pub fn provision_mul(&mut self, width1: u32, width2: u32, hints: RamHints) -> KernelResult<()> {
        if !self.has_mul(width1, width2, hints) {
            self.insert_mul(MulTable::generate(width1, width2, hints)?);
        }
        Ok(())
    }

    /// 加算テーブルを生成して登録
    pub fn provision_add(&mut self, width: u32, hints: RamHints) -> KernelResult<()> {
        let key = AddKey { width, hints };
        if !self.add.contains_key(&key) {
            self.insert_add(AddTable::generate(width, hints)?);
        }
        Ok(())
    }

    pub fn has_mul(&self, width1: u32, width2: u32, hints: RamHints) -> bool {
        self.mul.contains_key(&MulKey {
            width1,
            width2,
            hints,
        })
    }

    /// 乗算テーブルを取得
    pub fn mul(&self, width1: u32, width2: u32, hints: RamHints) -> KernelResult<&MulTable> {
        self.mul
            .get(&MulKey {
                width1,
                width2,
                hints,
            })
            .ok_or_else(|| {
                error!(
                    "Undefined RAM multiply table requested for widths {width1}x{width2} ({})",
                    hints.core_name()
                );
                KernelError::TableNotProvisioned { width1, width2 }
            })
    }

    /// 加算テーブルを取得
    pub fn add(&self, width: u32, hints: RamHints) -> KernelResult<&AddTable> {
        self.add.get(&AddKey { width, hints }).ok_or_else(|| {
            error!("Undefined RAM add table requested for width {width} ({})", hints.core_name());
            KernelError::TableNotProvisioned {
                width1: width,
                width2: width,
            }
        })
    }

    /// 登録済み乗算テーブル（幅順）
    pub fn mul_tables(&self) -> Vec<&MulTable> {
        let mut tables: Vec<_> = self.mul.values().collect();
        tables.sort_by_key(|t| (t.width1(), t.width2()));
        tables
    }

    /// 登録済み加算テーブル（幅順）
    pub fn add_tables(&self) -> Vec<&AddTable> {
        let mut tables: Vec<_> = self.add.values().collect();
        tables.sort_by_key(|t| t.width());
        tables
    }

    pub fn is_empty(&self) -> bool {
        self.mul.is_empty() && self.add.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprovisioned_lookup_fails_loudly() {
        let registry = TableRegistry::new();
        let err = registry.mul(4, 4, RamHints::default()).unwrap_err();
        assert!(matches!(err, KernelError::TableNotProvisioned { width1: 4, width2: 4 }));
        assert!(registry.add(4, RamHints::default()).is_err());
    }

    #[test]
    fn test_hints_are_part_of_the_key() {
        let mut registry = TableRegistry::new();
        registry.provision_mul(3, 3, RamHints::default()).unwrap();
        assert!(registry.has_mul(3, 3, RamHints::default()));

        let lut = RamHints {
            lut_ram: true,
            ..RamHints::default()
        };
        assert!(!registry.has_mul(3, 3, lut));
        assert!(registry.mul(3, 3, lut).is_err());
        assert_eq!(registry.mul(3, 3, RamHints::default()).unwrap().lookup(5, 6).unwrap(), 30);
    }

    #[test]
    fn test_tables_are_listed_in_width_order() {
        let mut registry = TableRegistry::new();
        registry.provision_mul(4, 2, RamHints::default()).unwrap();
        registry.provision_mul(2, 2, RamHints::default()).unwrap();
        registry.provision_add(3, RamHints::default()).unwrap();
        let widths: Vec<_> =
            registry.mul_tables().iter().map(|t| (t.width1(), t.width2())).collect();
        assert_eq!(widths, vec![(2, 2), (4, 2)]);
        assert_eq!(registry.add_tables().len(), 1);
        assert!(!registry.is_empty());
    }
}
