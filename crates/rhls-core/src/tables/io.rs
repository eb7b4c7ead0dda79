//! テーブルファイルの読み書き
//!
//! 1行にエントリを10進数のカンマ区切りで並べたテキスト形式。
//! ファイル名は `mul_table_{w1}_{w2}.txt` / `add_table_{w}.txt`。

use std::io::{self, BufRead, Write};

use super::{AddTable, MulTable, RamHints};
use crate::nnet::error::{KernelError, KernelResult};

/// 乗算テーブルのファイル名
pub fn mul_table_file_name(width1: u32, width2: u32) -> String {
    format!("mul_table_{width1}_{width2}.txt")
}

/// 加算テーブルのファイル名
pub fn add_table_file_name(width: u32) -> String {
    format!("add_table_{width}.txt")
}

/// エントリ列を書き出し
pub fn write_entries<W: Write>(writer: &mut W, entries: &[u64]) -> io::Result<()> {
    for (i, value) in entries.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",")?;
        }
        write!(writer, "{value}")?;
    }
    Ok(())
}

/// エントリ列を読み込み
///
/// 改行・空白は無視する。数値以外が混ざっていればエラー。
pub fn read_entries<R: BufRead>(reader: &mut R) -> KernelResult<Vec<u64>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|e| KernelError::InvalidTableFile(format!("bad entry {s:?}: {e}")))
        })
        .collect()
}

/// 乗算テーブルを読み込み
pub fn read_mul_table<R: BufRead>(
    reader: &mut R,
    width1: u32,
    width2: u32,
    hints: RamHints,
) -> KernelResult<MulTable> {
    let entries = read_entries(reader)?;
    MulTable::from_entries(width1, width2, hints, entries)
}

/// 加算テーブルを読み込み
pub fn read_add_table<R: BufRead>(
    reader: &mut R,
    width: u32,
    hints: RamHints,
) -> KernelResult<AddTable> {
    let entries = read_entries(reader)?;
    AddTable::from_entries(width, hints, entries)
}
