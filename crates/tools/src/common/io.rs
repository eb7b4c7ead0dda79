//! テーブルファイルの入出力（gzip対応）
//!
//! パスが `.gz` で終わる場合は gzip として読み書きする。

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rhls_core::tables::io::{
    add_table_file_name, mul_table_file_name, read_mul_table, write_entries,
};
use rhls_core::tables::{AddTable, MulTable, RamHints};

const READER_BUF_CAP: usize = 64 * 1024; // 64 KiB

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    let f = File::open(p)?;
    if is_gzip(p) {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush the underlying file.
    pub fn close(self) -> io::Result<()> {
        let inner = match self {
            Writer::Plain(f) => f,
            Writer::Gz(e) => e.finish()?,
        };
        let mut file = inner.into_inner().map_err(|e| e.into_error())?;
        file.flush()
    }
}

pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    let f = BufWriter::new(File::create(p)?);
    if is_gzip(p) {
        let enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        return Ok(Writer::Gz(enc));
    }
    Ok(Writer::Plain(f))
}

/// テーブルファイルのパス（gzip なら `.gz` を付ける）
pub fn table_path(dir: &Path, file_name: &str, gzip: bool) -> PathBuf {
    if gzip {
        dir.join(format!("{file_name}.gz"))
    } else {
        dir.join(file_name)
    }
}

fn write_table_file(path: &Path, entries: &[u64]) -> Result<()> {
    let mut writer =
        open_writer(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_entries(&mut writer, entries)
        .and_then(|_| writer.write_all(b"\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.close().with_context(|| format!("failed to finish {}", path.display()))
}

/// 乗算テーブルを書き出し、書き出したパスを返す
pub fn write_mul_table(dir: &Path, table: &MulTable, gzip: bool) -> Result<PathBuf> {
    let path = table_path(dir, &mul_table_file_name(table.width1(), table.width2()), gzip);
    write_table_file(&path, table.entries())?;
    Ok(path)
}

/// 加算テーブルを書き出し、書き出したパスを返す
pub fn write_add_table(dir: &Path, table: &AddTable, gzip: bool) -> Result<PathBuf> {
    let path = table_path(dir, &add_table_file_name(table.width()), gzip);
    write_table_file(&path, table.entries())?;
    Ok(path)
}

/// `dir` から乗算テーブルを探して読む
///
/// `mul_table_{w1}_{w2}.txt`、`mul_table_{w1}_{w2}.txt.gz` の順に探し、
/// どちらも無ければ `None`。
pub fn find_mul_table(
    dir: &Path,
    width1: u32,
    width2: u32,
    hints: RamHints,
) -> Result<Option<MulTable>> {
    let name = mul_table_file_name(width1, width2);
    for gzip in [false, true] {
        let path = table_path(dir, &name, gzip);
        if !path.is_file() {
            continue;
        }
        let mut reader =
            open_reader(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let table = read_mul_table(&mut reader, width1, width2, hints)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(Some(table));
    }
    Ok(None)
}
