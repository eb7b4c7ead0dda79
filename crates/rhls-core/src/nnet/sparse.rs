//! 非ゼロ重みの詰め込み
//!
//! 重み行列を行優先（入力 `ii` → 出力 `jj`）で1回走査し、非ゼロの重みだけを
//! `(重み, 入力インデックス, 出力インデックス)` の並列配列に詰める。

use super::config::ValidatedConfig;
use super::error::{KernelError, KernelResult};
use super::product::Weight;
use crate::types::Fixed;

/// 詰め込み済みの重み
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedWeights<W> {
    /// `mul_in2`
    weights: Vec<W>,
    /// 各重みに対応する入力インデックス（`mul_in1` を組み立てる）
    is: Vec<usize>,
    /// 各重みに対応する出力インデックス
    js: Vec<usize>,
    /// 詰め込み元の行列の形
    n_in: usize,
    n_out: usize,
}

impl<W: Weight> PackedWeights<W> {
    /// 重み行列を詰め込む
    ///
    /// 非ゼロ数が構成の `n_nonzeros` と一致しなければエラー。
    pub fn pack(config: &ValidatedConfig, weights: &[W]) -> KernelResult<Self> {
        let n_weights = config.n_weights();
        if weights.len() != n_weights {
            return Err(KernelError::DimensionMismatch {
                what: "weights",
                expected: n_weights,
                actual: weights.len(),
            });
        }

        let n_out = config.n_out;
        let capacity = config.n_nonzeros();
        let mut packed = Self {
            weights: Vec::with_capacity(capacity),
            is: Vec::with_capacity(capacity),
            js: Vec::with_capacity(capacity),
            n_in: config.n_in,
            n_out,
        };
        for (index, w) in weights.iter().enumerate() {
            if !w.is_zero() {
                packed.weights.push(*w);
                packed.is.push(index / n_out);
                packed.js.push(index % n_out);
            }
        }

        if packed.len() != config.n_nonzeros() {
            return Err(KernelError::SparsityMismatch {
                declared: config.n_nonzeros(),
                actual: packed.len(),
            });
        }
        Ok(packed)
    }

    /// 詰め込んだ重みの数
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[W] {
        &self.weights
    }

    /// 入力インデックス
    pub fn is(&self) -> &[usize] {
        &self.is
    }

    /// 出力インデックス
    pub fn js(&self) -> &[usize] {
        &self.js
    }

    /// 詰め込み元の入力数
    pub fn n_in(&self) -> usize {
        self.n_in
    }

    /// 詰め込み元の出力数
    pub fn n_out(&self) -> usize {
        self.n_out
    }

    /// 入力を重みの並びに合わせて複製（`mul_in1`）
    pub fn gather(&self, data: &[Fixed]) -> Vec<Fixed> {
        self.is.iter().map(|&ii| data[ii]).collect()
    }
}
