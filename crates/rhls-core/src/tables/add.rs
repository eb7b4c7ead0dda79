//! 加算テーブル

use super::{RamHints, check_key, check_table_bits};
use crate::nnet::error::{KernelError, KernelResult};

/// 飽和加算テーブル
///
/// `table[(i << width) | j] = min(i + j, 2^width - 1)`
#[derive(Clone, PartialEq, Eq)]
pub struct AddTable {
    width: u32,
    hints: RamHints,
    entries: Vec<u64>,
}

impl AddTable {
    /// テーブルを生成
    pub fn generate(width: u32, hints: RamHints) -> KernelResult<Self> {
        check_table_bits(2 * width)?;
        let size = 1u64 << width;
        let max = size - 1;
        let mut entries = vec![0u64; 1usize << (2 * width)];
        for i in 0..size {
            for j in 0..size {
                entries[((i << width) | j) as usize] = (i + j).min(max);
            }
        }
        Ok(Self {
            width,
            hints,
            entries,
        })
    }

    /// 読み込んだエントリ列からテーブルを作成
    pub fn from_entries(width: u32, hints: RamHints, entries: Vec<u64>) -> KernelResult<Self> {
        check_table_bits(2 * width)?;
        let expected = 1usize << (2 * width);
        if entries.len() != expected {
            return Err(KernelError::InvalidTableFile(format!(
                "add table {width} needs {expected} entries, got {}",
                entries.len()
            )));
        }
        Ok(Self {
            width,
            hints,
            entries,
        })
    }

    /// 表引き
    #[inline]
    pub fn lookup(&self, key1: u64, key2: u64) -> KernelResult<u64> {
        check_key(key1, self.width)?;
        check_key(key2, self.width)?;
        Ok(self.entries[((key1 << self.width) | key2) as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn hints(&self) -> RamHints {
        self.hints
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }
}

impl std::fmt::Debug for AddTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddTable")
            .field("width", &self.width)
            .field("hints", &self.hints)
            .field("entries", &self.entries.len())
            .finish()
    }
}
