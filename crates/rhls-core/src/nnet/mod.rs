//! 全結合（Dense）レイヤー
//!
//! - `config`: レイヤー構成と検査
//! - `product`: 入力と重みの積の戦略
//! - `sparse`: 非ゼロ重みの詰め込み
//! - `cast`: 累積値から出力型への変換
//! - `dense`: カーネル本体

pub mod cast;
pub mod config;
pub mod dense;
pub mod error;
pub mod product;
pub mod sparse;

pub use cast::{CastKind, ceillog2};
pub use config::{
    AddStrategy, LayerConfig, LayerTypes, MulPartition, MulResource, Strategy, ValidatedConfig,
};
pub use dense::DenseLayer;
pub use error::{ConfigError, KernelError, KernelResult};
pub use product::{
    Mult, Multiplier, Product, Weight, WeightExponential, apply_sign, to_unsigned_fixed,
};
pub use sparse::PackedWeights;
