//! ルックアップテーブル生成ツール
//!
//! RAM 乗算・加算用のテーブルを `mul_table_{w1}_{w2}.txt` / `add_table_{w}.txt` として
//! 書き出す。`--gzip` を付けると `.txt.gz` になる。

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use rhls_core::tables::{RamHints, TableRegistry};
use rhls_tools::common::io::{write_add_table, write_mul_table};

#[derive(Parser, Debug)]
#[command(name = "gen_tables")]
#[command(about = "RAM 乗算・加算用のルックアップテーブルを生成する")]
struct Cli {
    /// 乗算テーブルのキー幅（`W1xW2`、複数指定可）
    #[arg(long = "mul", value_parser = parse_width_pair)]
    mul: Vec<(u32, u32)>,

    /// 加算テーブルのキー幅（複数指定可）
    #[arg(long = "add")]
    add: Vec<u32>,

    /// 出力ディレクトリ
    #[arg(long)]
    out_dir: PathBuf,

    /// gzip で書き出す
    #[arg(long, default_value_t = false)]
    gzip: bool,
}

/// `8x6` 形式の幅の組
fn parse_width_pair(s: &str) -> Result<(u32, u32), String> {
    let (a, b) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected W1xW2, got {s:?}"))?;
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("bad width {v:?}: {e}"));
    Ok((parse(a)?, parse(b)?))
}

fn run(cli: &Cli) -> Result<Vec<PathBuf>> {
    if cli.mul.is_empty() && cli.add.is_empty() {
        bail!("nothing to generate: pass --mul W1xW2 and/or --add W");
    }
    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("failed to create {}", cli.out_dir.display()))?;

    // ファイルの内容は実装先ヒントに依存しない
    let hints = RamHints::default();
    let mut registry = TableRegistry::new();
    for &(w1, w2) in &cli.mul {
        registry
            .provision_mul(w1, w2, hints)
            .with_context(|| format!("cannot build {w1}x{w2} multiply table"))?;
    }
    for &w in &cli.add {
        registry
            .provision_add(w, hints)
            .with_context(|| format!("cannot build {w}-bit add table"))?;
    }

    let mut written = Vec::new();
    for table in registry.mul_tables() {
        let path = write_mul_table(&cli.out_dir, table, cli.gzip)?;
        info!(
            "{}x{} multiply table ({} entries) -> {}",
            table.width1(),
            table.width2(),
            table.entries().len(),
            path.display()
        );
        written.push(path);
    }
    for table in registry.add_tables() {
        let path = write_add_table(&cli.out_dir, table, cli.gzip)?;
        info!(
            "{}-bit add table ({} entries) -> {}",
            table.width(),
            table.entries().len(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let written = run(&cli)?;
    eprintln!("{} table(s) written to {}", written.len(), cli.out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_width_pair_accepts_both_separators() {
        assert_eq!(parse_width_pair("8x6"), Ok((8, 6)));
        assert_eq!(parse_width_pair("4X4"), Ok((4, 4)));
        assert!(parse_width_pair("8").is_err());
        assert!(parse_width_pair("8xa").is_err());
    }

    #[test]
    fn run_writes_requested_tables() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("tables");
        let cli = Cli::try_parse_from([
            "gen_tables",
            "--mul",
            "3x2",
            "--mul",
            "2x2",
            "--add",
            "3",
            "--out-dir",
            out_dir.to_str().unwrap(),
        ])
        .unwrap();

        let written = run(&cli).unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["mul_table_2_2.txt", "mul_table_3_2.txt", "add_table_3.txt"]);

        let text = std::fs::read_to_string(out_dir.join("mul_table_2_2.txt")).unwrap();
        assert_eq!(text.trim_end(), "0,0,0,0,0,1,2,3,0,2,4,6,0,3,6,9");
    }

    #[test]
    fn run_rejects_empty_request_and_oversized_tables() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().to_str().unwrap();
        let empty = Cli::try_parse_from(["gen_tables", "--out-dir", out_dir]).unwrap();
        assert!(run(&empty).is_err());

        let huge =
            Cli::try_parse_from(["gen_tables", "--mul", "16x16", "--out-dir", out_dir]).unwrap();
        assert!(run(&huge).is_err());
    }
}
