//! 指数表現の重み
//!
//! 重みを `±2^exponent` に量子化したもの。乗算をシフトで置き換えるために使う。

use super::fixed::Fixed;
use super::fixed_type::FixedType;

/// 指数重み（符号ビット + 符号付き指数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpWeight {
    /// 符号（true で正）
    pub positive: bool,
    /// 指数（`ap_int<N>`）
    pub exponent: Fixed,
}

impl ExpWeight {
    /// 指数型 `exponent_type` で重みを作成
    ///
    /// 指数は `exponent_type` に変換される（範囲外は型のオーバーフローモードに従う）。
    pub fn new(positive: bool, exponent: i32, exponent_type: FixedType) -> Self {
        Self {
            positive,
            exponent: Fixed::from_int(exponent_type, exponent as i64),
        }
    }

    /// 指数の整数値
    #[inline]
    pub fn shift(&self) -> i32 {
        // 指数型は整数型として検証済み
        (self.exponent.raw() >> self.exponent.ty().frac_bits().max(0)) as i32
    }

    /// 指数の型
    #[inline]
    pub fn exponent_type(&self) -> FixedType {
        self.exponent.ty()
    }

    /// 実数値 `±2^exponent`
    pub fn to_f64(&self) -> f64 {
        let magnitude = 2f64.powi(self.shift());
        if self.positive { magnitude } else { -magnitude }
    }
}
