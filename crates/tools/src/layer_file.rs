//! レイヤーファイル（`dense_eval` の入力）
//!
//! ```toml
//! data = [1.5, -0.75]
//! weights = [0.5, 0.0, -1.25, 1.0]
//! biases = [0.0, 1.0]
//! weight_encoding = "fixed"   # "exponential" なら重みは ±2^k
//!
//! [config]
//! n_in = 2
//! n_out = 2
//!
//! [config.types]
//! input_t = "ap_fixed<8,4>"
//! ...
//! ```
//!
//! 値は実数で書き、構成の型へ量子化してから評価する。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use rhls_core::nnet::{
    DenseLayer, LayerConfig, MulResource, Multiplier, ValidatedConfig, WeightExponential,
};
use rhls_core::tables::TableRegistry;
use rhls_core::types::{ExpWeight, Fixed, FixedType};
use serde::{Deserialize, Serialize};

use crate::common::io::find_mul_table;

/// 重みの表現
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightEncoding {
    /// `weight_t` の固定小数点値
    #[default]
    Fixed,
    /// `±2^exponent`（`weight_t` は指数の型）
    Exponential,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerFile {
    pub config: LayerConfig,
    pub data: Vec<f64>,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
    #[serde(default)]
    pub weight_encoding: WeightEncoding,
}

/// 評価結果（JSON で出力する）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    /// 出力の実数値
    pub res: Vec<f64>,
    /// 出力の生値（`result_t` のビットパターンを符号付きで解釈したもの）
    pub raw: Vec<i64>,
}

impl Evaluation {
    fn from_fixed(res: &[Fixed]) -> Self {
        Self {
            res: res.iter().map(Fixed::to_f64).collect(),
            raw: res.iter().map(|r| r.raw() as i64).collect(),
        }
    }
}

impl LayerFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// 実数列を `ty` に量子化
pub fn quantize(ty: FixedType, values: &[f64]) -> Vec<Fixed> {
    values.iter().map(|&v| Fixed::from_f64(ty, v)).collect()
}

/// `±2^k` の実数列を指数重みに変換
pub fn exponential_weights(values: &[f64], exponent_t: FixedType) -> Result<Vec<ExpWeight>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let log2 = v.abs().log2();
            if !log2.is_finite() || log2.fract() != 0.0 {
                bail!("weights[{i}] = {v} is not a signed power of two");
            }
            // 有限の f64 なら log2 は ±1100 程度に収まり、i64 へは正確に変換できる
            let exponent = i32::try_from(log2 as i64)
                .with_context(|| format!("weights[{i}] = {v}: exponent {log2} exceeds i32"))?;
            let w = ExpWeight::new(v > 0.0, exponent, exponent_t);
            if w.shift() != exponent {
                bail!("weights[{i}] = {v}: exponent {exponent} does not fit {exponent_t}");
            }
            Ok(w)
        })
        .collect()
}

/// RAM 乗算に必要なテーブルを用意する
///
/// `dir` にテーブルファイルがあれば読み込み、無ければ生成する。
/// RAM 乗算を使わない構成では `None`。
pub fn provision_tables(
    config: &ValidatedConfig,
    dir: Option<&Path>,
) -> Result<Option<Arc<TableRegistry>>> {
    if !config.heterogeneous_config || config.partition().count(MulResource::Ram) == 0 {
        return Ok(None);
    }

    let (width1, width2) = (config.types.input_t.width, config.types.weight_t.width);
    let hints = config.mul_hints();
    let mut registry = TableRegistry::new();

    let loaded = match dir {
        Some(dir) => find_mul_table(dir, width1, width2, hints)?,
        None => None,
    };
    match (loaded, dir) {
        (Some(table), Some(dir)) => {
            info!("Loaded {width1}x{width2} multiply table from {}", dir.display());
            registry.insert_mul(table);
        }
        (_, dir) => {
            if let Some(dir) = dir {
                warn!("No {width1}x{width2} multiply table in {}, generating it", dir.display());
            }
            registry
                .provision_mul(width1, width2, hints)
                .with_context(|| format!("failed to generate {width1}x{width2} multiply table"))?;
        }
    }
    Ok(Some(Arc::new(registry)))
}

/// レイヤーファイルを評価
pub fn evaluate(file: &LayerFile, tables_dir: Option<&Path>) -> Result<Evaluation> {
    let config = file.config.clone().validate()?;
    let types = config.types;
    let data = quantize(types.input_t, &file.data);
    let biases = quantize(types.bias_t, &file.biases);

    let res = match file.weight_encoding {
        WeightEncoding::Fixed => {
            let weights = quantize(types.weight_t, &file.weights);
            let tables = provision_tables(&config, tables_dir)?;
            let product = Multiplier::for_config(&config, tables);
            let layer = DenseLayer::<Fixed, _>::from_validated(config, product)?;
            layer.evaluate(&data, &weights, &biases)?
        }
        WeightEncoding::Exponential => {
            let weights = exponential_weights(&file.weights, types.weight_t)?;
            let layer = DenseLayer::<ExpWeight, _>::from_validated(config, WeightExponential)?;
            layer.evaluate(&data, &weights, &biases)?
        }
    };
    Ok(Evaluation::from_fixed(&res))
}
