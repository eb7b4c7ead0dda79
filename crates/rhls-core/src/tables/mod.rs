//! ルックアップテーブル資源
//!
//! 2つの符号なしキーを連結したインデックス `(key1 << width2) | key2` で
//! 事前計算済みの結果を引くテーブル。演算器を使わずに乗算・加算を実現する。
//!
//! - `MulTable`: `i * j`
//! - `AddTable`: `min(i + j, 2^w - 1)`（飽和加算）
//! - `TableRegistry`: 用意済みテーブルの集合。未用意の幅を引くとエラーになる。
//!
//! `RamHints` は実装先の選択（ROM のポート数、LUTRAM/BRAM、分割係数）を表すだけで、
//! 論理的な内容には影響しない。

mod add;
pub mod io;
mod mul;
mod registry;

pub use add::AddTable;
pub use mul::MulTable;
pub use registry::TableRegistry;

use serde::{Deserialize, Serialize};

use crate::nnet::error::{KernelError, KernelResult};

/// テーブルのインデックスビット数の上限（2^24 エントリ）
pub const MAX_TABLE_BITS: u32 = 24;

/// テーブルの実装先ヒント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RamHints {
    /// 2ポート ROM（ROM_2P）かどうか
    pub dual_port: bool,
    /// LUTRAM に置くかどうか（false なら BRAM）
    pub lut_ram: bool,
    /// cyclic 分割係数
    pub partition_factor: u32,
}

impl Default for RamHints {
    fn default() -> Self {
        Self {
            dual_port: true,
            lut_ram: false,
            partition_factor: 1,
        }
    }
}

impl RamHints {
    /// HLS のリソースコア名（`ROM_2P_BRAM` など）
    pub fn core_name(&self) -> String {
        format!(
            "ROM_{}P_{}",
            if self.dual_port { 2 } else { 1 },
            if self.lut_ram { "LUTRAM" } else { "BRAM" }
        )
    }
}

/// インデックスビット数を検査
pub(crate) fn check_table_bits(bits: u32) -> KernelResult<()> {
    if bits == 0 || bits > MAX_TABLE_BITS {
        return Err(KernelError::TableTooLarge {
            bits,
            limit: MAX_TABLE_BITS,
        });
    }
    Ok(())
}

/// キーがビット幅に収まるか検査
#[inline]
pub(crate) fn check_key(key: u64, width: u32) -> KernelResult<()> {
    if key >> width != 0 {
        return Err(KernelError::KeyOutOfRange { key, width });
    }
    Ok(())
}
