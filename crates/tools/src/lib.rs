//! rhls のコマンドラインツール用の共通処理

pub mod common;
pub mod layer_file;
