//! 入力と重みの積
//!
//! 型の組み合わせごとに積の計算方法を切り替える。
//!
//! | 戦略 | 条件 | 積 |
//! |------|------|----|
//! | `BothBinary` | 入力・重みとも `ap_uint<1>` | `a == w` |
//! | `WeightBinary` | 重みが `ap_uint<1>`（0 が -1 を表す） | `w ? a : -a` |
//! | `DataBinary` | 入力が `ap_uint<1>` | `a ? w : -w` |
//! | `WeightTernary` | 重みが `ap_int<2>`（{-1, 0, +1}） | `0` / `-a` / `a` |
//! | `Mult` | その他 | `a * w` |
//! | `WeightExponential` | 指数重み | `a << e`（符号反転あり） |
//!
//! `Mult` はヘテロジニアス構成では符号と絶対値に分解し、符号なしの積を
//! 実装先（default / fabric / dsp / ram）ごとに計算してから符号を戻す。
//! RAM 乗算は符号なしのキーしか引けないテーブルを使うため、この分解が必要になる。

use std::fmt;
use std::sync::Arc;

use log::error;

use super::config::{MulResource, ValidatedConfig};
use super::error::{ConfigError, KernelError, KernelResult};
use crate::tables::{RamHints, TableRegistry};
use crate::types::{ExpWeight, Fixed, FixedType, INTERNAL_MAX_WIDTH, Overflow, Quantization};

// =============================================================================
// トレイト
// =============================================================================

/// 重みとして使える値
pub trait Weight: Copy + fmt::Debug {
    /// スパース詰め込みで落とす値か
    fn is_zero(&self) -> bool;
    /// 構成の `weight_t` と照合する型
    fn fixed_type(&self) -> FixedType;
}

impl Weight for Fixed {
    #[inline]
    fn is_zero(&self) -> bool {
        Fixed::is_zero(self)
    }

    #[inline]
    fn fixed_type(&self) -> FixedType {
        self.ty()
    }
}

impl Weight for ExpWeight {
    /// `±2^e` は 0 にならない
    #[inline]
    fn is_zero(&self) -> bool {
        false
    }

    #[inline]
    fn fixed_type(&self) -> FixedType {
        self.exponent_type()
    }
}

/// 積の計算方法
pub trait Product<W: Weight> {
    /// ログ用の名前
    fn name(&self) -> &'static str;

    /// 積
    fn product(&self, a: &Fixed, w: &W) -> KernelResult<Fixed>;

    /// 実装先を指定できるか（ヘテロジニアス構成で使えるか）
    fn supports_heterogeneous(&self) -> bool {
        false
    }

    /// 実装先を指定した積
    fn product_on(
        &self,
        resource: MulResource,
        hints: RamHints,
        a: &Fixed,
        w: &W,
    ) -> KernelResult<Fixed> {
        let _ = (hints, a, w);
        Err(ConfigError::UnsupportedResource(format!(
            "{} cannot be mapped onto {resource} multipliers",
            self.name()
        ))
        .into())
    }

    /// 構成に対する事前検査（レイヤー構築時に1回呼ばれる）
    fn check(&self, config: &ValidatedConfig) -> KernelResult<()> {
        let _ = config;
        Ok(())
    }
}

// =============================================================================
// 符号と絶対値
// =============================================================================

/// 絶対値を同じビット配置の符号なし型（`ap_ufixed<W, I, TRN, SAT>`）で返す
///
/// 符号なしの値はそのまま返す。符号付き型の最小値の絶対値も `W` ビットに収まる。
pub fn to_unsigned_fixed(x: &Fixed) -> Fixed {
    if !x.ty().signed {
        return *x;
    }
    let ty = x.ty().as_unsigned().with_modes(Quantization::Truncate, Overflow::Saturate);
    if x.is_negative() {
        x.neg().cast(ty)
    } else {
        x.cast(ty)
    }
}

/// 符号なしの値に符号を戻して `ty` に変換
pub fn apply_sign(magnitude: &Fixed, negative: bool, ty: FixedType) -> Fixed {
    if negative {
        magnitude.neg().cast(ty)
    } else {
        magnitude.cast(ty)
    }
}

// =============================================================================
// 汎用乗算
// =============================================================================

/// 汎用の乗算
#[derive(Debug, Clone)]
pub struct Mult {
    /// 符号と絶対値に分解して計算するか
    pub heterogeneous: bool,
    /// 単体で使うときの実装先
    pub resource: MulResource,
    /// 単体で使うときのテーブルヒント
    pub hints: RamHints,
    tables: Option<Arc<TableRegistry>>,
}

impl Default for Mult {
    fn default() -> Self {
        Self {
            heterogeneous: false,
            resource: MulResource::Default,
            hints: RamHints::default(),
            tables: None,
        }
    }
}

impl Mult {
    /// 通常の `a * w`
    pub fn new() -> Self {
        Self::default()
    }

    /// 実装先を固定した符号・絶対値分解つきの乗算
    pub fn on(resource: MulResource) -> Self {
        Self {
            heterogeneous: true,
            resource,
            ..Self::default()
        }
    }

    pub fn with_tables(mut self, tables: Arc<TableRegistry>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_hints(mut self, hints: RamHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn tables(&self) -> Option<&TableRegistry> {
        self.tables.as_deref()
    }

    /// 積
    pub fn multiply(&self, a: &Fixed, w: &Fixed) -> KernelResult<Fixed> {
        if !self.heterogeneous {
            return Ok(a.mul(w));
        }
        self.multiply_on(self.resource, self.hints, a, w)
    }

    /// 符号と絶対値に分解した積
    ///
    /// 結果型は `a * w` と同じ（どちらかが符号付きなら符号付き）。
    pub fn multiply_on(
        &self,
        resource: MulResource,
        hints: RamHints,
        a: &Fixed,
        w: &Fixed,
    ) -> KernelResult<Fixed> {
        let result_t = FixedType::product_of(a.ty(), w.ty());
        let a_abs = to_unsigned_fixed(a);
        let w_abs = to_unsigned_fixed(w);

        // default / fabric / dsp は論理的には同じ積（実装先が違うだけ）
        let unsigned_result = match resource {
            MulResource::Default | MulResource::Fabric | MulResource::Dsp => a_abs.mul(&w_abs),
            MulResource::Ram => self.lookup(&a_abs, &w_abs, hints)?,
        }
        .cast(result_t);

        Ok(apply_sign(&unsigned_result, a.is_negative() != w.is_negative(), result_t))
    }

    /// 乗算テーブルで絶対値の積を引く
    ///
    /// キーは絶対値のビットパターン。テーブル値は `ap_ufixed<Wa+Wb, Ia+Ib>` として解釈する。
    fn lookup(&self, a_abs: &Fixed, w_abs: &Fixed, hints: RamHints) -> KernelResult<Fixed> {
        let (width1, width2) = (a_abs.ty().width, w_abs.ty().width);
        let Some(tables) = &self.tables else {
            error!("RAM multiply requested for {width1}x{width2} but no tables are attached");
            return Err(KernelError::TableNotProvisioned { width1, width2 });
        };
        let table = tables.mul(width1, width2, hints)?;
        let value = table.lookup(a_abs.to_bits() as u64, w_abs.to_bits() as u64)?;
        let ty = FixedType::ufixed(width1 + width2, a_abs.ty().int_bits + w_abs.ty().int_bits);
        Ok(Fixed::from_raw(ty, value as i128))
    }

    /// RAM 乗算に必要なテーブルが揃っているか
    fn check_tables(&self, width1: u32, width2: u32, hints: RamHints) -> KernelResult<()> {
        match &self.tables {
            Some(tables) => tables.mul(width1, width2, hints).map(|_| ()),
            None => {
                error!("RAM multiplies configured for {width1}x{width2} without tables");
                Err(KernelError::TableNotProvisioned { width1, width2 })
            }
        }
    }
}

// =============================================================================
// 戦略の選択
// =============================================================================

/// 固定小数点重み向けの積の戦略
#[derive(Debug, Clone)]
pub enum Multiplier {
    BothBinary,
    WeightBinary,
    DataBinary,
    WeightTernary,
    Mult(Mult),
}

impl Multiplier {
    /// 型の組み合わせから戦略を選ぶ
    ///
    /// 汎用乗算にはテーブル集合を渡しておく（RAM 乗算で使う）。
    pub fn for_types(
        data_t: FixedType,
        weight_t: FixedType,
        tables: Option<Arc<TableRegistry>>,
    ) -> Self {
        if data_t.is_binary() && weight_t.is_binary() {
            Multiplier::BothBinary
        } else if weight_t.is_binary() {
            Multiplier::WeightBinary
        } else if data_t.is_binary() {
            Multiplier::DataBinary
        } else if weight_t.is_ternary() {
            Multiplier::WeightTernary
        } else {
            let mult = Mult::new();
            Multiplier::Mult(match tables {
                Some(tables) => mult.with_tables(tables),
                None => mult,
            })
        }
    }

    /// 構成の型から戦略を選ぶ
    pub fn for_config(config: &ValidatedConfig, tables: Option<Arc<TableRegistry>>) -> Self {
        let mut multiplier = Self::for_types(config.types.input_t, config.types.weight_t, tables);
        if let Multiplier::Mult(mult) = &mut multiplier {
            mult.heterogeneous = config.heterogeneous_config;
            mult.hints = config.mul_hints();
        }
        multiplier
    }

    fn type_error(&self, data_t: FixedType, weight_t: FixedType) -> KernelError {
        ConfigError::InvalidType(format!(
            "{} cannot multiply {data_t} data by {weight_t} weights",
            Product::<Fixed>::name(self)
        ))
        .into()
    }
}

impl Product<Fixed> for Multiplier {
    fn name(&self) -> &'static str {
        match self {
            Multiplier::BothBinary => "both_binary",
            Multiplier::WeightBinary => "weight_binary",
            Multiplier::DataBinary => "data_binary",
            Multiplier::WeightTernary => "weight_ternary",
            Multiplier::Mult(_) => "mult",
        }
    }

    fn product(&self, a: &Fixed, w: &Fixed) -> KernelResult<Fixed> {
        Ok(match self {
            Multiplier::BothBinary => Fixed::from_int(FixedType::uint(1), a.value_eq(w) as i64),
            Multiplier::WeightBinary => {
                if w.is_zero() {
                    a.neg()
                } else {
                    a.cast(a.ty().negated())
                }
            }
            Multiplier::DataBinary => {
                if a.is_zero() {
                    w.neg()
                } else {
                    w.cast(w.ty().negated())
                }
            }
            Multiplier::WeightTernary => {
                if w.is_zero() {
                    Fixed::zero(a.ty().negated())
                } else if w.raw() == -1 {
                    a.neg()
                } else {
                    a.cast(a.ty().negated())
                }
            }
            Multiplier::Mult(mult) => return mult.multiply(a, w),
        })
    }

    fn supports_heterogeneous(&self) -> bool {
        matches!(self, Multiplier::Mult(_))
    }

    fn product_on(
        &self,
        resource: MulResource,
        hints: RamHints,
        a: &Fixed,
        w: &Fixed,
    ) -> KernelResult<Fixed> {
        match self {
            Multiplier::Mult(mult) => mult.multiply_on(resource, hints, a, w),
            _ => Err(ConfigError::UnsupportedResource(format!(
                "{} cannot be mapped onto {resource} multipliers",
                Product::<Fixed>::name(self)
            ))
            .into()),
        }
    }

    fn check(&self, config: &ValidatedConfig) -> KernelResult<()> {
        let (data_t, weight_t) = (config.types.input_t, config.types.weight_t);
        let fits = match self {
            Multiplier::BothBinary => data_t.is_binary() && weight_t.is_binary(),
            Multiplier::WeightBinary => weight_t.is_binary(),
            Multiplier::DataBinary => data_t.is_binary(),
            Multiplier::WeightTernary => weight_t.is_ternary(),
            Multiplier::Mult(_) => true,
        };
        if !fits {
            return Err(self.type_error(data_t, weight_t));
        }

        match self {
            Multiplier::Mult(mult)
                if config.heterogeneous_config && config.partition().count(MulResource::Ram) > 0 =>
            {
                mult.check_tables(data_t.width, weight_t.width, config.mul_hints())
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// 指数重み
// =============================================================================

/// 指数重みの積（シフト）
///
/// 結果型は `ap_fixed<2(We+Wx), We+Wx>`。負の指数は右シフトになる。
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightExponential;

impl WeightExponential {
    /// 結果型
    pub fn result_type(data_t: FixedType, exponent_t: FixedType) -> FixedType {
        let int_bits = data_t.width + exponent_t.width;
        FixedType::fixed(2 * int_bits, int_bits as i32)
    }
}

impl Product<ExpWeight> for WeightExponential {
    fn name(&self) -> &'static str {
        "weight_exponential"
    }

    fn product(&self, a: &Fixed, w: &ExpWeight) -> KernelResult<Fixed> {
        let r_t = Self::result_type(a.ty(), w.exponent_type());
        if r_t.width > INTERNAL_MAX_WIDTH {
            return Err(ConfigError::TypeOutOfRange {
                ty: r_t,
                reason: "shift product is wider than the internal limit",
            }
            .into());
        }
        let y = a.cast(r_t).shl(w.shift());
        Ok(if w.positive { y } else { y.neg().cast(r_t) })
    }

    fn check(&self, config: &ValidatedConfig) -> KernelResult<()> {
        let exponent_t = config.types.weight_t;
        if !exponent_t.is_integer() || !exponent_t.signed {
            return Err(ConfigError::InvalidType(format!(
                "exponent type must be a signed integer, got {exponent_t}"
            ))
            .into());
        }
        let r_t = Self::result_type(config.types.input_t, exponent_t);
        if r_t.width > INTERNAL_MAX_WIDTH {
            return Err(ConfigError::TypeOutOfRange {
                ty: r_t,
                reason: "shift product is wider than the internal limit",
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(width: u32, value: i64) -> Fixed {
        Fixed::from_int(FixedType::int(width), value)
    }

    fn bit(value: i64) -> Fixed {
        Fixed::from_int(FixedType::uint(1), value)
    }

    #[test]
    fn test_strategy_selection() {
        let b = FixedType::uint(1);
        let t = FixedType::int(2);
        let x = FixedType::fixed(8, 4);
        assert!(matches!(Multiplier::for_types(b, b, None), Multiplier::BothBinary));
        assert!(matches!(Multiplier::for_types(x, b, None), Multiplier::WeightBinary));
        assert!(matches!(Multiplier::for_types(b, x, None), Multiplier::DataBinary));
        assert!(matches!(Multiplier::for_types(x, t, None), Multiplier::WeightTernary));
        assert!(matches!(Multiplier::for_types(x, x, None), Multiplier::Mult(_)));
    }

    #[test]
    fn test_both_binary_is_equality() {
        let m = Multiplier::BothBinary;
        assert_eq!(m.product(&bit(1), &bit(1)).unwrap().raw(), 1);
        assert_eq!(m.product(&bit(0), &bit(0)).unwrap().raw(), 1);
        assert_eq!(m.product(&bit(0), &bit(1)).unwrap().raw(), 0);
    }

    #[test]
    fn test_weight_binary_and_data_binary() {
        let a = int(8, 5);
        let m = Multiplier::WeightBinary;
        assert_eq!(m.product(&a, &bit(1)).unwrap().to_f64(), 5.0);
        assert_eq!(m.product(&a, &bit(0)).unwrap().to_f64(), -5.0);

        let w = Fixed::from_f64(FixedType::fixed(6, 2), -1.25);
        let m = Multiplier::DataBinary;
        assert_eq!(m.product(&bit(1), &w).unwrap().to_f64(), -1.25);
        assert_eq!(m.product(&bit(0), &w).unwrap().to_f64(), 1.25);
    }

    #[test]
    fn test_weight_ternary() {
        let m = Multiplier::WeightTernary;
        let five = int(8, 5);
        assert_eq!(m.product(&five, &int(2, 0)).unwrap().to_f64(), 0.0);
        assert_eq!(m.product(&int(8, -77), &int(2, 0)).unwrap().to_f64(), 0.0);
        assert_eq!(m.product(&five, &int(2, -1)).unwrap().to_f64(), -5.0);
        assert_eq!(m.product(&five, &int(2, 1)).unwrap().to_f64(), 5.0);
    }

    #[test]
    fn test_weight_exponential() {
        let e = FixedType::int(4);
        let a = int(8, 3);
        let p = WeightExponential.product(&a, &ExpWeight::new(true, 2, e)).unwrap();
        assert_eq!(p.to_f64(), 12.0);
        assert_eq!(p.ty(), FixedType::fixed(24, 12));
        let n = WeightExponential.product(&a, &ExpWeight::new(false, 2, e)).unwrap();
        assert_eq!(n.to_f64(), -12.0);

        let half = WeightExponential.product(&a, &ExpWeight::new(true, -1, e)).unwrap();
        assert_eq!(half.to_f64(), 1.5);
    }

    #[test]
    fn test_weight_exponential_with_extreme_exponents() {
        let e = FixedType::int(32);
        let r_t = WeightExponential::result_type(FixedType::int(8), e);
        for a in [int(8, 3), int(8, -3)] {
            let tiny = WeightExponential.product(&a, &ExpWeight::new(true, i32::MIN, e)).unwrap();
            assert_eq!(tiny.ty(), r_t);
            // 右シフトは -∞ 方向に切り捨て
            assert_eq!(tiny.raw(), if a.is_negative() { -1 } else { 0 });

            let huge = WeightExponential.product(&a, &ExpWeight::new(true, i32::MAX, e)).unwrap();
            assert_eq!(huge.ty(), r_t);
            assert!(huge.is_zero());
        }
    }

    #[test]
    fn test_sign_magnitude_roundtrip() {
        let ty = FixedType::fixed(6, 3);
        for raw in ty.min_raw()..=ty.max_raw() {
            let v = Fixed::from_raw(ty, raw);
            let magnitude = to_unsigned_fixed(&v);
            assert!(!magnitude.ty().signed);
            assert_eq!(magnitude.to_f64(), v.to_f64().abs());
            assert_eq!(apply_sign(&magnitude, v.is_negative(), ty), v);
        }

        let u = Fixed::from_int(FixedType::uint(4), 9);
        assert_eq!(to_unsigned_fixed(&u), u);
    }

    #[test]
    fn test_heterogeneous_mult_matches_plain_product() {
        let a_t = FixedType::fixed(5, 2);
        let w_t = FixedType::fixed(4, 1);
        let mut registry = TableRegistry::new();
        registry.provision_mul(5, 4, RamHints::default()).unwrap();
        let registry = Arc::new(registry);

        for a_raw in a_t.min_raw()..=a_t.max_raw() {
            for w_raw in w_t.min_raw()..=w_t.max_raw() {
                let a = Fixed::from_raw(a_t, a_raw);
                let w = Fixed::from_raw(w_t, w_raw);
                let expected = a.mul(&w);
                for resource in MulResource::ALL {
                    let m = Mult::on(resource).with_tables(Arc::clone(&registry));
                    let got = m.multiply(&a, &w).unwrap();
                    assert_eq!(got.ty(), expected.ty());
                    assert_eq!(got.raw(), expected.raw(), "{a} * {w} on {resource}");
                }
            }
        }
    }

    #[test]
    fn test_ram_mult_without_table_fails() {
        let a = int(4, 3);
        let w = int(4, -2);
        let err = Mult::on(MulResource::Ram).multiply(&a, &w).unwrap_err();
        assert!(matches!(err, KernelError::TableNotProvisioned { width1: 4, width2: 4 }));

        let registry = Arc::new(TableRegistry::new());
        let err = Mult::on(MulResource::Ram).with_tables(registry).multiply(&a, &w).unwrap_err();
        assert!(matches!(err, KernelError::TableNotProvisioned { .. }));
    }

    #[test]
    fn test_specialized_strategies_reject_resource_mapping() {
        let m = Multiplier::WeightTernary;
        assert!(!m.supports_heterogeneous());
        let err = m
            .product_on(MulResource::Dsp, RamHints::default(), &int(8, 1), &int(2, 1))
            .unwrap_err();
        assert!(matches!(err, KernelError::Config(ConfigError::UnsupportedResource(_))));
    }
}
