//! Dense レイヤーカーネル
//!
//! `res = cast(weights · data + biases)` を計算する。構成に応じて2つの経路がある。
//!
//! - 密経路（`heterogeneous_config = false`）: 全ての `(ii, jj)` について積を計算し、
//!   バイアスで初期化した累積値に入力優先（`ii` → `jj`）の順で加算する。
//! - スパース経路（`heterogeneous_config = true`）: 非ゼロ重みだけを詰め込み、
//!   詰め込み順のインデックス範囲ごとに乗算器の実装先を切り替える。
//!   加算は詰め込み順（行優先）で行う。
//!
//! どちらの経路でも積は `accum_t` に変換してから加算し、加算結果も毎回 `accum_t` に戻す。
//! `accum_t` が飽和型の場合、加算順は結果に影響する。
//!
//! 乗算は `multiplier_limit` 個ずつのパスに分けて実行する（結果は変わらない）。

use std::marker::PhantomData;
use std::ops::Range;

use log::debug;
#[cfg(feature = "diagnostics")]
use log::trace;

use super::cast::CastKind;
use super::config::{AddStrategy, LayerConfig, MulResource, ValidatedConfig};
use super::error::{ConfigError, KernelError, KernelResult};
use super::product::{Product, Weight};
use super::sparse::PackedWeights;
use crate::types::{Fixed, FixedType};

/// `0..n` を `limit` 個ずつに分割
fn passes(n: usize, limit: usize) -> impl Iterator<Item = Range<usize>> {
    (0..n).step_by(limit).map(move |start| start..(start + limit).min(n))
}

/// 配列長を検査
fn check_len(what: &'static str, expected: usize, actual: usize) -> KernelResult<()> {
    if expected != actual {
        return Err(KernelError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// 各要素の型を検査
fn check_types(
    what: &'static str,
    expected: FixedType,
    types: impl Iterator<Item = FixedType>,
) -> KernelResult<()> {
    for (index, actual) in types.enumerate() {
        if actual != expected {
            return Err(KernelError::TypeMismatch {
                what,
                index,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// Dense レイヤー
///
/// 構成と積の戦略を構築時に固定する。評価は状態を持たない純粋な関数。
#[derive(Debug, Clone)]
pub struct DenseLayer<W, P> {
    config: ValidatedConfig,
    product: P,
    cast: CastKind,
    _weight: PhantomData<fn(&W)>,
}

impl<W: Weight, P: Product<W>> DenseLayer<W, P> {
    /// 構成を検査してレイヤーを構築
    pub fn new(config: LayerConfig, product: P) -> KernelResult<Self> {
        Self::from_validated(config.validate()?, product)
    }

    /// 検査済み構成からレイヤーを構築
    ///
    /// ヘテロジニアス構成では、戦略が実装先の指定に対応していること、
    /// RAM 乗算があれば該当する幅のテーブルが揃っていることを確認する。
    pub fn from_validated(config: ValidatedConfig, product: P) -> KernelResult<Self> {
        if config.heterogeneous_config && !product.supports_heterogeneous() {
            return Err(ConfigError::UnsupportedResource(format!(
                "heterogeneous_config requires a resource-mapped product, got {}",
                product.name()
            ))
            .into());
        }
        product.check(&config)?;

        let cast = CastKind::select(config.types.input_t, config.types.weight_t);

        if config.heterogeneous_config {
            let partition = config.partition();
            debug!(
                "Creating dense layer heterogeneous resource implementation: {}x{}, n_nonzeros={}, \
                 muls default={} fabric={} dsp={} ram={} ({}), add={}, multiplier_limit={}",
                config.n_in,
                config.n_out,
                config.n_nonzeros(),
                partition.count(MulResource::Default),
                partition.count(MulResource::Fabric),
                partition.count(MulResource::Dsp),
                partition.count(MulResource::Ram),
                config.mul_hints().core_name(),
                config.add_strategy().as_str(),
                config.multiplier_limit(),
            );
        } else {
            debug!(
                "Creating dense layer: {}x{}, product={}, cast={:?}, multiplier_limit={}",
                config.n_in,
                config.n_out,
                product.name(),
                cast,
                config.multiplier_limit(),
            );
        }

        Ok(Self {
            config,
            product,
            cast,
            _weight: PhantomData,
        })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn product(&self) -> &P {
        &self.product
    }

    pub fn cast_kind(&self) -> CastKind {
        self.cast
    }

    /// 評価
    pub fn evaluate(
        &self,
        data: &[Fixed],
        weights: &[W],
        biases: &[Fixed],
    ) -> KernelResult<Vec<Fixed>> {
        let mut res = vec![Fixed::zero(self.config.types.result_t); self.config.n_out];
        self.evaluate_into(data, weights, biases, &mut res)?;
        Ok(res)
    }

    /// 呼び出し側のバッファに評価結果を書き込む
    ///
    /// エラー時は `res` を変更しない。
    pub fn evaluate_into(
        &self,
        data: &[Fixed],
        weights: &[W],
        biases: &[Fixed],
        res: &mut [Fixed],
    ) -> KernelResult<()> {
        self.check_vectors(data, biases, res)?;
        check_len("weights", self.config.n_weights(), weights.len())?;
        check_types("weights", self.config.types.weight_t, weights.iter().map(Weight::fixed_type))?;

        let acc = if self.config.heterogeneous_config {
            let packed = PackedWeights::pack(&self.config, weights)?;
            self.accumulate_packed(data, &packed, biases)?
        } else {
            self.accumulate_dense(data, weights, biases)?
        };
        self.write_results(&acc, res);
        Ok(())
    }

    /// 詰め込み済みの重みで評価（スパース経路のみ）
    ///
    /// 同じ重みで繰り返し評価する場合に詰め込みを1回で済ませる。
    pub fn evaluate_packed(
        &self,
        data: &[Fixed],
        packed: &PackedWeights<W>,
        biases: &[Fixed],
    ) -> KernelResult<Vec<Fixed>> {
        if !self.config.heterogeneous_config {
            return Err(ConfigError::UnsupportedResource(
                "packed evaluation requires heterogeneous_config".to_string(),
            )
            .into());
        }
        let mut res = vec![Fixed::zero(self.config.types.result_t); self.config.n_out];
        self.check_vectors(data, biases, &res)?;
        check_len("packed n_in", self.config.n_in, packed.n_in())?;
        check_len("packed n_out", self.config.n_out, packed.n_out())?;
        if packed.len() != self.config.n_nonzeros() {
            return Err(KernelError::SparsityMismatch {
                declared: self.config.n_nonzeros(),
                actual: packed.len(),
            });
        }
        check_types(
            "weights",
            self.config.types.weight_t,
            packed.weights().iter().map(Weight::fixed_type),
        )?;

        let acc = self.accumulate_packed(data, packed, biases)?;
        self.write_results(&acc, &mut res);
        Ok(res)
    }

    /// 重みを詰め込む
    pub fn pack(&self, weights: &[W]) -> KernelResult<PackedWeights<W>> {
        PackedWeights::pack(&self.config, weights)
    }

    fn check_vectors(&self, data: &[Fixed], biases: &[Fixed], res: &[Fixed]) -> KernelResult<()> {
        let types = &self.config.types;
        check_len("data", self.config.n_in, data.len())?;
        check_len("biases", self.config.n_out, biases.len())?;
        check_len("res", self.config.n_out, res.len())?;
        check_types("data", types.input_t, data.iter().map(Fixed::ty))?;
        check_types("biases", types.bias_t, biases.iter().map(Fixed::ty))
    }

    /// バイアスで初期化した累積値
    fn reset_accum(&self, biases: &[Fixed]) -> Vec<Fixed> {
        let accum_t = self.config.types.accum_t;
        biases.iter().map(|b| b.cast(accum_t)).collect()
    }

    /// 密経路
    fn accumulate_dense(
        &self,
        data: &[Fixed],
        weights: &[W],
        biases: &[Fixed],
    ) -> KernelResult<Vec<Fixed>> {
        let accum_t = self.config.types.accum_t;
        let n_out = self.config.n_out;
        let n_weights = self.config.n_weights();

        let mut mult = Vec::with_capacity(n_weights);
        for (_pass, range) in passes(n_weights, self.config.multiplier_limit()).enumerate() {
            #[cfg(feature = "diagnostics")]
            trace!("dense multiply pass {_pass}: products {}..{}", range.start, range.end);
            for index in range {
                let product = self.product.product(&data[index / n_out], &weights[index])?;
                mult.push(product.cast(accum_t));
            }
        }

        let mut acc = self.reset_accum(biases);
        for (index, m) in mult.iter().enumerate() {
            let jj = index % n_out;
            acc[jj] = acc[jj].add(m).cast(accum_t);
        }
        Ok(acc)
    }

    /// スパース経路
    fn accumulate_packed(
        &self,
        data: &[Fixed],
        packed: &PackedWeights<W>,
        biases: &[Fixed],
    ) -> KernelResult<Vec<Fixed>> {
        let accum_t = self.config.types.accum_t;
        let partition = self.config.partition();
        let hints = self.config.mul_hints();
        let mul_in1 = packed.gather(data);
        let mul_in2 = packed.weights();

        let mut mul_results = Vec::with_capacity(packed.len());
        for (_pass, range) in passes(packed.len(), self.config.multiplier_limit()).enumerate() {
            #[cfg(feature = "diagnostics")]
            trace!("sparse multiply pass {_pass}: products {}..{}", range.start, range.end);
            for i in range {
                let resource = partition.resource_at(i).ok_or(KernelError::SparsityMismatch {
                    declared: self.config.n_nonzeros(),
                    actual: packed.len(),
                })?;
                let product = self.product.product_on(resource, hints, &mul_in1[i], &mul_in2[i])?;
                mul_results.push(product.cast(accum_t));
            }
        }

        let mut acc = self.reset_accum(biases);
        for (&jj, m) in packed.js().iter().zip(&mul_results) {
            // どの加算器でも論理的には同じ和
            let sum = match self.config.add_strategy() {
                AddStrategy::Default | AddStrategy::Fabric | AddStrategy::Dsp => acc[jj].add(m),
            };
            acc[jj] = sum.cast(accum_t);
        }
        Ok(acc)
    }

    fn write_results(&self, acc: &[Fixed], res: &mut [Fixed]) {
        let n_in = self.config.n_in;
        let result_t = self.config.types.result_t;
        for (r, a) in res.iter_mut().zip(acc) {
            *r = self.cast.apply(a, n_in, result_t);
        }
    }
}
