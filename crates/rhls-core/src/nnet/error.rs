//! Dense カーネルのエラー型
//!
//! - `ConfigError`: レイヤー構成の静的な不整合（評価前に検出して拒否する）
//! - `KernelError`: 評価呼び出し・テーブル参照時のエラー

use crate::types::FixedType;

/// レイヤー構成エラー
///
/// いずれも構成を組み立てる時点で検出され、リトライの概念はない。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 入出力次元が不正（0 または積がオーバーフロー）
    #[error("Invalid layer dimensions: n_in={n_in}, n_out={n_out}")]
    InvalidDimensions { n_in: usize, n_out: usize },

    /// reuse_factor が 0
    #[error("reuse_factor must be at least 1")]
    ZeroReuseFactor,

    /// multiplier_limit が 0
    #[error("multiplier_limit must be at least 1")]
    ZeroMultiplierLimit,

    /// n_zeros が重み総数を超えている
    #[error("n_zeros ({n_zeros}) exceeds the weight count ({n_weights})")]
    TooManyZeros { n_zeros: usize, n_weights: usize },

    /// 乗算器の割り当て数の合計が n_nonzeros と一致しない
    #[error(
        "Multiplier partition does not cover the non-zero weights: \
         default={default} + fabric={fabric} + dsp={dsp} + ram={ram} != n_nonzeros={n_nonzeros}"
    )]
    PartitionMismatch {
        default: usize,
        fabric: usize,
        dsp: usize,
        ram: usize,
        n_nonzeros: usize,
    },

    /// 加算方式のフラグが複数（または0個）指定されている
    #[error("Exactly one accumulation strategy flag must be set, got {count}")]
    AmbiguousAddStrategy { count: usize },

    /// パーティション係数が 0
    #[error("ram_partition_factor must be at least 1")]
    ZeroPartitionFactor,

    /// 型文字列の解析失敗
    #[error("Invalid fixed-point type: {0}")]
    InvalidType(String),

    /// 宣言型のビット幅が対応範囲外
    #[error("Fixed-point type {ty} is out of the supported range ({reason})")]
    TypeOutOfRange { ty: FixedType, reason: &'static str },

    /// 未対応のリソース構成
    #[error("Unsupported resource configuration: {0}")]
    UnsupportedResource(String),
}

/// カーネル評価エラー
#[derive(thiserror::Error, Debug)]
pub enum KernelError {
    /// 構成エラー
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 配列長の不一致
    #[error("{what} length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// オペランドの型が構成と一致しない
    #[error("{what}[{index}] has type {actual}, expected {expected}")]
    TypeMismatch {
        what: &'static str,
        index: usize,
        expected: FixedType,
        actual: FixedType,
    },

    /// 宣言されたスパース性と実際の非ゼロ重み数が一致しない
    #[error("Declared n_nonzeros={declared} but the weight matrix has {actual} non-zero entries")]
    SparsityMismatch { declared: usize, actual: usize },

    /// 要求されたビット幅のテーブルが用意されていない
    #[error("No lookup table provisioned for widths {width1}x{width2}")]
    TableNotProvisioned { width1: u32, width2: u32 },

    /// テーブルのキーがビット幅に収まらない
    #[error("Lookup key {key} does not fit in {width} bits")]
    KeyOutOfRange { key: u64, width: u32 },

    /// テーブルが大きすぎる
    #[error("Lookup table with {bits} index bits exceeds the limit of {limit}")]
    TableTooLarge { bits: u32, limit: u32 },

    /// テーブルファイルの内容が不正
    #[error("Invalid table file: {0}")]
    InvalidTableFile(String),

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
