//! 固定小数点値
//!
//! 生値（2の補数）を i128 で保持し、型記述 [`FixedType`] と組で扱う。
//! 算術は HLS の `ap_fixed` と同じく結果型を広げて厳密に計算し、
//! 型変換（[`Fixed::cast`]）の時点でのみ丸めとオーバーフロー処理を行う。

use std::fmt;

use super::fixed_type::{FixedType, Overflow, Quantization};

/// 固定小数点値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixed {
    raw: i128,
    ty: FixedType,
}

/// 左シフトによる桁合わせの結果
enum Aligned {
    /// i128 に収まった
    Exact(i128),
    /// i128 からあふれた（下位ビットと元の符号を保持）
    Overflowed { wrapped: i128, negative: bool },
}

/// これ以上のシフト量は `shift_left` / `shift_right` で同じ結果になる
const SHIFT_SATURATION: i32 = 128;

/// 生値を `width` ビットで折り返す
#[inline]
fn wrap_raw(raw: i128, ty: FixedType) -> i128 {
    let w = ty.width;
    let masked = raw & ((1i128 << w) - 1);
    if ty.signed && (masked >> (w - 1)) & 1 == 1 {
        masked - (1i128 << w)
    } else {
        masked
    }
}

/// 右シフトで小数部を削る（丸めモードに従う）
#[inline]
fn shift_right(raw: i128, shift: u32, quantization: Quantization) -> i128 {
    if shift >= 127 {
        // |raw| < 2^126 なので 1 ulp 未満
        return match quantization {
            Quantization::Truncate => raw >> 127,
            Quantization::TruncateZero | Quantization::Round => 0,
        };
    }
    match quantization {
        Quantization::Truncate => raw >> shift,
        Quantization::TruncateZero => {
            if raw < 0 {
                -((-raw) >> shift)
            } else {
                raw >> shift
            }
        }
        Quantization::Round => (raw + (1i128 << (shift - 1))) >> shift,
    }
}

/// 左シフトで小数部を伸ばす
#[inline]
fn shift_left(raw: i128, shift: u32) -> Aligned {
    if raw == 0 {
        return Aligned::Exact(0);
    }
    if shift >= 127 {
        // 宣言型は 126 ビット以下なので下位ビットはすべて 0
        return Aligned::Overflowed {
            wrapped: 0,
            negative: raw < 0,
        };
    }
    match raw.checked_mul(1i128 << shift) {
        Some(v) => Aligned::Exact(v),
        None => Aligned::Overflowed {
            wrapped: raw.wrapping_shl(shift),
            negative: raw < 0,
        },
    }
}

/// オーバーフローモードに従って型の範囲に収める
fn fit_range(aligned: Aligned, ty: FixedType) -> i128 {
    let (min, max) = (ty.min_raw(), ty.max_raw());
    let (value, negative) = match aligned {
        Aligned::Exact(v) if (min..=max).contains(&v) => return v,
        Aligned::Exact(v) => (v, v < min),
        Aligned::Overflowed { wrapped, negative } => (wrapped, negative),
    };

    match ty.overflow {
        Overflow::Wrap => wrap_raw(value, ty),
        Overflow::Saturate => {
            if negative {
                min
            } else {
                max
            }
        }
        Overflow::SaturateZero => 0,
        Overflow::SaturateSymmetric => {
            if !negative {
                max
            } else if ty.signed {
                -max
            } else {
                0
            }
        }
    }
}

/// `frac_bits` 小数部ビットを持つ生値を `ty` に変換
fn requantize(raw: i128, frac_bits: i32, ty: FixedType) -> i128 {
    let shift = ty.frac_bits() - frac_bits;
    let aligned = if shift >= 0 {
        shift_left(raw, shift as u32)
    } else {
        Aligned::Exact(shift_right(raw, shift.unsigned_abs(), ty.quantization))
    };
    fit_range(aligned, ty)
}

impl Fixed {
    /// 0
    pub const fn zero(ty: FixedType) -> Self {
        Self { raw: 0, ty }
    }

    /// ビットパターンを `ty` として解釈（上位ビットは折り返す）
    pub fn from_raw(ty: FixedType, raw: i128) -> Self {
        Self {
            raw: wrap_raw(raw, ty),
            ty,
        }
    }

    /// 整数値から変換
    pub fn from_int(ty: FixedType, value: i64) -> Self {
        Self {
            raw: requantize(value as i128, 0, ty),
            ty,
        }
    }

    /// 実数値から変換（`ty` の丸め・オーバーフローモードに従う）
    pub fn from_f64(ty: FixedType, value: f64) -> Self {
        if value.is_nan() {
            return Self::zero(ty);
        }
        let scaled = value * 2f64.powi(ty.frac_bits());
        let quantized = match ty.quantization {
            Quantization::Truncate => scaled.floor(),
            Quantization::TruncateZero => scaled.trunc(),
            Quantization::Round => (scaled + 0.5).floor(),
        };
        let aligned = if quantized.abs() < 2f64.powi(120) {
            Aligned::Exact(quantized as i128)
        } else {
            Aligned::Overflowed {
                wrapped: 0,
                negative: quantized < 0.0,
            }
        };
        Self {
            raw: fit_range(aligned, ty),
            ty,
        }
    }

    /// 実数値へ変換
    pub fn to_f64(&self) -> f64 {
        self.raw as f64 * 2f64.powi(-self.ty.frac_bits())
    }

    /// 生値
    #[inline]
    pub const fn raw(&self) -> i128 {
        self.raw
    }

    /// 型
    #[inline]
    pub const fn ty(&self) -> FixedType {
        self.ty
    }

    /// `width` ビットのビットパターン（符号なし）
    #[inline]
    pub fn to_bits(&self) -> u128 {
        (self.raw & ((1i128 << self.ty.width) - 1)) as u128
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.raw == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.raw < 0
    }

    /// 型変換（`(T)x`）
    pub fn cast(&self, ty: FixedType) -> Self {
        Self {
            raw: requantize(self.raw, self.ty.frac_bits(), ty),
            ty,
        }
    }

    /// 厳密な積（`ap_fixed<Wa+Wb, Ia+Ib>`）
    pub fn mul(&self, rhs: &Fixed) -> Fixed {
        let ty = FixedType::product_of(self.ty, rhs.ty);
        debug_assert!(ty.width <= super::fixed_type::INTERNAL_MAX_WIDTH);
        Self {
            raw: self.raw * rhs.raw,
            ty,
        }
    }

    /// 桁を合わせた2つの生値と共通の小数部ビット数
    fn align_pair(&self, rhs: &Fixed) -> (i128, i128, i32) {
        let frac = self.ty.frac_bits().max(rhs.ty.frac_bits());
        let lhs_raw = self.raw << (frac - self.ty.frac_bits());
        let rhs_raw = rhs.raw << (frac - rhs.ty.frac_bits());
        (lhs_raw, rhs_raw, frac)
    }

    /// 厳密な和（整数部を1ビット広げる）
    pub fn add(&self, rhs: &Fixed) -> Fixed {
        let signed = self.ty.signed || rhs.ty.signed;
        let ty = FixedType::sum_of(self.ty, rhs.ty, signed);
        let (a, b, frac) = self.align_pair(rhs);
        debug_assert_eq!(frac, ty.frac_bits());
        Self { raw: a + b, ty }
    }

    /// 厳密な差（結果は常に符号付き）
    pub fn sub(&self, rhs: &Fixed) -> Fixed {
        let ty = FixedType::sum_of(self.ty, rhs.ty, true);
        let (a, b, _) = self.align_pair(rhs);
        Self { raw: a - b, ty }
    }

    /// 厳密な符号反転（`ap_fixed<W+1, I+1>`）
    pub fn neg(&self) -> Fixed {
        Self {
            raw: -self.raw,
            ty: self.ty.negated(),
        }
    }

    /// 同じ型の中でのシフト（負の `amount` は右シフト）
    ///
    /// あふれたビットは型のオーバーフローモードに従う。
    pub fn shl(&self, amount: i32) -> Fixed {
        // 127 ビット以上のシフトは結果が同じ（左はあふれ、右は 1 ulp 未満）
        let amount = amount.clamp(-SHIFT_SATURATION, SHIFT_SATURATION);
        Self {
            raw: requantize(self.raw, self.ty.frac_bits() - amount, self.ty),
            ty: self.ty,
        }
    }

    /// 型を無視した数値としての等価比較
    pub fn value_eq(&self, rhs: &Fixed) -> bool {
        let (a, b, _) = self.align_pair(rhs);
        a == b
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f64_truncates_toward_negative_infinity() {
        let ty = FixedType::fixed(8, 4); // 4 小数ビット、ulp = 1/16
        assert_eq!(Fixed::from_f64(ty, 1.5).raw(), 24);
        assert_eq!(Fixed::from_f64(ty, 0.03).raw(), 0);
        assert_eq!(Fixed::from_f64(ty, -0.03).raw(), -1);
    }

    #[test]
    fn test_from_f64_rounding_modes() {
        let rnd = FixedType::fixed(8, 4).with_modes(Quantization::Round, Overflow::Wrap);
        assert_eq!(Fixed::from_f64(rnd, 0.03125).raw(), 1); // 0.5 ulp は +∞ 方向
        assert_eq!(Fixed::from_f64(rnd, -0.03125).raw(), 0);

        let trn_zero =
            FixedType::fixed(8, 4).with_modes(Quantization::TruncateZero, Overflow::Wrap);
        assert_eq!(Fixed::from_f64(trn_zero, -0.03).raw(), 0);
    }

    #[test]
    fn test_overflow_modes() {
        let wrap = FixedType::int(4);
        assert_eq!(Fixed::from_int(wrap, 9).raw(), -7);

        let sat = FixedType::fixed(4, 4).with_modes(Quantization::Truncate, Overflow::Saturate);
        assert_eq!(Fixed::from_int(sat, 9).raw(), 7);
        assert_eq!(Fixed::from_int(sat, -20).raw(), -8);

        let sat_zero =
            FixedType::fixed(4, 4).with_modes(Quantization::Truncate, Overflow::SaturateZero);
        assert_eq!(Fixed::from_int(sat_zero, 9).raw(), 0);

        let sat_sym =
            FixedType::fixed(4, 4).with_modes(Quantization::Truncate, Overflow::SaturateSymmetric);
        assert_eq!(Fixed::from_int(sat_sym, -20).raw(), -7);

        let usat = FixedType::ufixed(4, 4).with_modes(Quantization::Truncate, Overflow::Saturate);
        assert_eq!(Fixed::from_int(usat, -3).raw(), 0);
        assert_eq!(Fixed::from_int(usat, 100).raw(), 15);
    }

    #[test]
    fn test_mul_is_exact() {
        let a = Fixed::from_f64(FixedType::fixed(8, 4), -2.5);
        let b = Fixed::from_f64(FixedType::fixed(6, 2), 1.25);
        let p = a.mul(&b);
        assert_eq!(p.ty(), FixedType::fixed(14, 6));
        assert_eq!(p.to_f64(), -3.125);
    }

    #[test]
    fn test_add_and_sub_align_fractions() {
        let a = Fixed::from_f64(FixedType::fixed(8, 6), 3.75);
        let b = Fixed::from_f64(FixedType::fixed(8, 2), 0.0625);
        assert_eq!(a.add(&b).to_f64(), 3.8125);
        assert_eq!(b.sub(&a).to_f64(), -3.6875);

        let ua = Fixed::from_int(FixedType::uint(3), 7);
        let ub = Fixed::from_int(FixedType::uint(3), 7);
        let s = ua.add(&ub);
        assert!(!s.ty().signed);
        assert_eq!(s.to_f64(), 14.0);
    }

    #[test]
    fn test_neg_of_minimum_fits() {
        let ty = FixedType::int(8);
        let min = Fixed::from_int(ty, -128);
        let n = min.neg();
        assert_eq!(n.to_f64(), 128.0);
        assert_eq!(n.ty(), FixedType::fixed(9, 9));
    }

    #[test]
    fn test_cast_requantizes() {
        let wide = Fixed::from_f64(FixedType::fixed(16, 8), 5.8125);
        let narrow = wide.cast(FixedType::fixed(8, 6));
        assert_eq!(narrow.to_f64(), 5.75);

        let round = FixedType::fixed(8, 6).with_modes(Quantization::Round, Overflow::Wrap);
        assert_eq!(wide.cast(round).to_f64(), 5.75);
        let up = Fixed::from_f64(FixedType::fixed(16, 8), 5.875);
        assert_eq!(up.cast(round).to_f64(), 6.0);
    }

    #[test]
    fn test_shl_within_type() {
        let ty = FixedType::fixed(16, 8);
        let x = Fixed::from_int(ty, 3);
        assert_eq!(x.shl(2).to_f64(), 12.0);
        assert_eq!(x.shl(-1).to_f64(), 1.5);
        // 8ビット整数部を超えると折り返す
        assert_eq!(x.shl(7).to_f64(), -128.0);
    }

    #[test]
    fn test_to_bits_and_from_raw() {
        let ty = FixedType::fixed(6, 3);
        let x = Fixed::from_raw(ty, -1);
        assert_eq!(x.to_bits(), 0b11_1111);
        assert_eq!(Fixed::from_raw(ty, 0b10_0000).raw(), -32);
    }

    #[test]
    fn test_value_eq_ignores_type() {
        let a = Fixed::from_int(FixedType::uint(1), 1);
        let b = Fixed::from_f64(FixedType::fixed(8, 4), 1.0);
        assert!(a.value_eq(&b));
        assert!(!a.value_eq(&Fixed::zero(FixedType::uint(1))));
    }

    #[test]
    fn test_shl_with_extreme_amounts() {
        let ty = FixedType::fixed(16, 8);
        let v = Fixed::from_f64(ty, -1.5);
        assert_eq!(v.shl(i32::MIN).raw(), -1); // 床関数で -1 ulp
        assert_eq!(Fixed::from_f64(ty, 1.5).shl(i32::MIN).raw(), 0);
        assert_eq!(v.shl(i32::MAX).raw(), 0); // AP_WRAP では下位ビットがすべて 0

        let sat = ty.with_modes(Quantization::Truncate, Overflow::Saturate);
        let v = Fixed::from_f64(sat, 1.5);
        assert_eq!(v.shl(i32::MAX).raw(), sat.max_raw());
        assert_eq!(v.neg().cast(sat).shl(i32::MAX).raw(), sat.min_raw());
    }
}
