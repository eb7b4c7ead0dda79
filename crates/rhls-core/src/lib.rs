//! rhls-core: 固定小数点 Dense レイヤーカーネル
//!
//! HLS 向けに書かれた全結合レイヤーを、ビット単位で同じ結果になるように評価する。
//!
//! - `types`: `ap_fixed` 相当の固定小数点型
//! - `tables`: 乗算・加算のルックアップテーブル
//! - `nnet`: レイヤー構成、積の戦略、カーネル

pub mod nnet;
pub mod tables;
pub mod types;

pub use nnet::{DenseLayer, KernelError, KernelResult, LayerConfig, Multiplier};
pub use types::{ExpWeight, Fixed, FixedType};
