//! 乗算テーブル

use super::{RamHints, check_key, check_table_bits};
use crate::nnet::error::{KernelError, KernelResult};

/// 乗算テーブル
///
/// `table[(i << width2) | j] = i * j`、値は `width1 + width2` ビット。
#[derive(Clone, PartialEq, Eq)]
pub struct MulTable {
    width1: u32,
    width2: u32,
    hints: RamHints,
    entries: Vec<u64>,
}

impl MulTable {
    /// テーブルを生成
    pub fn generate(width1: u32, width2: u32, hints: RamHints) -> KernelResult<Self> {
        check_table_bits(width1 + width2)?;
        let mut entries = vec![0u64; 1usize << (width1 + width2)];
        for i in 0..(1u64 << width1) {
            for j in 0..(1u64 << width2) {
                entries[((i << width2) | j) as usize] = i * j;
            }
        }
        Ok(Self {
            width1,
            width2,
            hints,
            entries,
        })
    }

    /// 読み込んだエントリ列からテーブルを作成
    pub fn from_entries(
        width1: u32,
        width2: u32,
        hints: RamHints,
        entries: Vec<u64>,
    ) -> KernelResult<Self> {
        check_table_bits(width1 + width2)?;
        let expected = 1usize << (width1 + width2);
        if entries.len() != expected {
            return Err(KernelError::InvalidTableFile(format!(
                "mul table {width1}x{width2} needs {expected} entries, got {}",
                entries.len()
            )));
        }
        Ok(Self {
            width1,
            width2,
            hints,
            entries,
        })
    }

    /// 表引き
    #[inline]
    pub fn lookup(&self, key1: u64, key2: u64) -> KernelResult<u64> {
        check_key(key1, self.width1)?;
        check_key(key2, self.width2)?;
        Ok(self.entries[((key1 << self.width2) | key2) as usize])
    }

    pub fn width1(&self) -> u32 {
        self.width1
    }

    pub fn width2(&self) -> u32 {
        self.width2
    }

    /// 結果のビット幅
    pub fn result_width(&self) -> u32 {
        self.width1 + self.width2
    }

    pub fn hints(&self) -> RamHints {
        self.hints
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }
}

impl std::fmt::Debug for MulTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulTable")
            .field("width1", &self.width1)
            .field("width2", &self.width2)
            .field("hints", &self.hints)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_mul_table() {
        let table = MulTable::generate(3, 2, RamHints::default()).unwrap();
        assert_eq!(table.entries().len(), 32);
        assert_eq!(table.result_width(), 5);
        for i in 0..8u64 {
            for j in 0..4u64 {
                assert_eq!(table.lookup(i, j).unwrap(), i * j);
            }
        }
        // インデックスは key1 が上位
        assert_eq!(table.entries()[(7 << 2) | 3], 21);
    }

    #[test]
    fn test_lookup_rejects_wide_keys() {
        let table = MulTable::generate(2, 2, RamHints::default()).unwrap();
        assert!(matches!(table.lookup(4, 0), Err(KernelError::KeyOutOfRange { .. })));
    }

    #[test]
    fn test_table_size_limit() {
        assert!(matches!(
            MulTable::generate(16, 16, RamHints::default()),
            Err(KernelError::TableTooLarge { bits: 32, .. })
        ));
    }

    #[test]
    fn test_from_entries_checks_length() {
        let err = MulTable::from_entries(1, 1, RamHints::default(), vec![0, 0, 0]);
        assert!(matches!(err, Err(KernelError::InvalidTableFile(_))));
        let ok = MulTable::from_entries(1, 1, RamHints::default(), vec![0, 0, 0, 1]).unwrap();
        assert_eq!(ok.lookup(1, 1).unwrap(), 1);
    }
}
