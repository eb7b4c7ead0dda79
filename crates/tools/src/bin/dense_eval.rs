//! レイヤー評価ツール
//!
//! レイヤーファイル（構成 + 入力 + 重み + バイアス）を読み込んで評価し、
//! 結果を JSON で標準出力に書く。

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rhls_tools::layer_file::{Evaluation, LayerFile, evaluate};

#[derive(Parser, Debug)]
#[command(name = "dense_eval")]
#[command(about = "固定小数点 Dense レイヤーを評価し、結果を JSON で出力")]
struct Cli {
    /// レイヤーファイル（TOML）
    #[arg(long)]
    layer: PathBuf,

    /// RAM 乗算テーブルのディレクトリ（無いテーブルは生成する）
    #[arg(long)]
    tables: Option<PathBuf>,

    /// JSON を整形して出力
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn render(out: &Evaluation, pretty: bool) -> Result<String> {
    Ok(if pretty { serde_json::to_string_pretty(out)? } else { serde_json::to_string(out)? })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let file = LayerFile::load(&cli.layer)?;
    let out = evaluate(&file, cli.tables.as_deref())?;
    println!("{}", render(&out, cli.pretty)?);
    Ok(())
}
