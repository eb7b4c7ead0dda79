//! 固定小数点型の型記述
//!
//! HLS の `ap_fixed<W,I,Q,O>` / `ap_ufixed` / `ap_int<W>` / `ap_uint<W>` に相当する
//! ビット幅・整数部ビット数・符号・丸め・オーバーフローの組を表す。
//! 値そのものは [`Fixed`](super::Fixed) が保持する。

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::nnet::error::ConfigError;

/// 宣言型で許容する最大ビット幅
pub const MAX_WIDTH: u32 = 32;

/// 宣言型で許容する小数部ビット数の絶対値の上限
pub const MAX_FRAC_BITS: i32 = 32;

/// 内部演算で扱える最大ビット幅（生値は i128 に収める）
pub const INTERNAL_MAX_WIDTH: u32 = 126;

/// 丸めモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quantization {
    /// AP_TRN: −∞ 方向への切り捨て
    #[default]
    Truncate,
    /// AP_TRN_ZERO: 0 方向への切り捨て
    TruncateZero,
    /// AP_RND: 0.5 を +∞ 方向へ丸める
    Round,
}

impl Quantization {
    /// HLS 表記
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Truncate => "AP_TRN",
            Self::TruncateZero => "AP_TRN_ZERO",
            Self::Round => "AP_RND",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "AP_TRN" => Some(Self::Truncate),
            "AP_TRN_ZERO" => Some(Self::TruncateZero),
            "AP_RND" => Some(Self::Round),
            _ => None,
        }
    }
}

/// オーバーフローモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Overflow {
    /// AP_WRAP: 下位ビットを残して折り返す
    #[default]
    Wrap,
    /// AP_SAT: 最大値/最小値に飽和
    Saturate,
    /// AP_SAT_ZERO: オーバーフロー時は 0
    SaturateZero,
    /// AP_SAT_SYM: 対称範囲（符号付きの最小値は `-max`）に飽和
    SaturateSymmetric,
}

impl Overflow {
    /// HLS 表記
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrap => "AP_WRAP",
            Self::Saturate => "AP_SAT",
            Self::SaturateZero => "AP_SAT_ZERO",
            Self::SaturateSymmetric => "AP_SAT_SYM",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "AP_WRAP" => Some(Self::Wrap),
            "AP_SAT" => Some(Self::Saturate),
            "AP_SAT_ZERO" => Some(Self::SaturateZero),
            "AP_SAT_SYM" => Some(Self::SaturateSymmetric),
            _ => None,
        }
    }
}

/// 固定小数点型
///
/// 値 = 生値 × 2^-(width - int_bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixedType {
    /// 総ビット幅（符号ビットを含む）
    pub width: u32,
    /// 整数部ビット数（符号ビットを含む、負や width 超えも可）
    pub int_bits: i32,
    /// 符号付きかどうか
    pub signed: bool,
    /// 丸めモード
    pub quantization: Quantization,
    /// オーバーフローモード
    pub overflow: Overflow,
}

impl FixedType {
    /// `ap_fixed<width, int_bits>`
    pub const fn fixed(width: u32, int_bits: i32) -> Self {
        Self {
            width,
            int_bits,
            signed: true,
            quantization: Quantization::Truncate,
            overflow: Overflow::Wrap,
        }
    }

    /// `ap_ufixed<width, int_bits>`
    pub const fn ufixed(width: u32, int_bits: i32) -> Self {
        Self {
            width,
            int_bits,
            signed: false,
            quantization: Quantization::Truncate,
            overflow: Overflow::Wrap,
        }
    }

    /// `ap_int<width>`
    pub const fn int(width: u32) -> Self {
        Self::fixed(width, width as i32)
    }

    /// `ap_uint<width>`
    pub const fn uint(width: u32) -> Self {
        Self::ufixed(width, width as i32)
    }

    /// 丸め・オーバーフローモードを差し替える
    pub const fn with_modes(mut self, quantization: Quantization, overflow: Overflow) -> Self {
        self.quantization = quantization;
        self.overflow = overflow;
        self
    }

    /// 小数部ビット数
    #[inline]
    pub const fn frac_bits(&self) -> i32 {
        self.width as i32 - self.int_bits
    }

    /// 生値の最小値
    #[inline]
    pub const fn min_raw(&self) -> i128 {
        if self.signed { -(1i128 << (self.width - 1)) } else { 0 }
    }

    /// 生値の最大値
    #[inline]
    pub const fn max_raw(&self) -> i128 {
        if self.signed {
            (1i128 << (self.width - 1)) - 1
        } else {
            (1i128 << self.width) - 1
        }
    }

    /// 1ビットの符号なし整数（`ap_uint<1>`）かどうか
    ///
    /// バイナリ重み/バイナリ入力の判定に使う。
    #[inline]
    pub const fn is_binary(&self) -> bool {
        !self.signed && self.width == 1 && self.int_bits == 1
    }

    /// 2ビットの符号付き整数（`ap_int<2>`）かどうか
    ///
    /// {-1, 0, +1} の3値重みの判定に使う。
    #[inline]
    pub const fn is_ternary(&self) -> bool {
        self.signed && self.width == 2 && self.int_bits == 2
    }

    /// 整数型（小数部なし）かどうか
    #[inline]
    pub const fn is_integer(&self) -> bool {
        self.frac_bits() == 0
    }

    /// 2つの型の積の型（`decltype(a * b)`）
    ///
    /// `ap_fixed<Wa+Wb, Ia+Ib>`、どちらかが符号付きなら符号付き。
    pub const fn product_of(a: FixedType, b: FixedType) -> FixedType {
        let ty = FixedType::fixed(a.width + b.width, a.int_bits + b.int_bits);
        if a.signed || b.signed { ty } else { ty.as_unsigned() }
    }

    /// 2つの型の和の型
    ///
    /// 小数部は長い方、整数部は長い方 + 1。
    pub fn sum_of(a: FixedType, b: FixedType, signed: bool) -> FixedType {
        let frac = a.frac_bits().max(b.frac_bits());
        let int_bits = a.int_bits.max(b.int_bits) + 1;
        let width = (int_bits + frac).max(1) as u32;
        let ty = FixedType::fixed(width, int_bits);
        if signed { ty } else { ty.as_unsigned() }
    }

    /// 符号反転の結果型（`decltype(-a)`）
    pub const fn negated(&self) -> FixedType {
        FixedType::fixed(self.width + 1, self.int_bits + 1)
    }

    /// 同じビット配置の符号なし型（丸め・オーバーフローは既定値）
    pub const fn as_unsigned(&self) -> FixedType {
        FixedType::ufixed(self.width, self.int_bits)
    }

    /// 宣言型としての妥当性を検査
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.width > MAX_WIDTH {
            return Err(ConfigError::TypeOutOfRange {
                ty: *self,
                reason: "width must be within 1..=32",
            });
        }
        if self.frac_bits().abs() > MAX_FRAC_BITS {
            return Err(ConfigError::TypeOutOfRange {
                ty: *self,
                reason: "fractional bits must be within -32..=32",
            });
        }
        Ok(())
    }
}

fn type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*ap_(fixed|ufixed|int|uint)\s*<\s*(-?\d+)\s*(?:,\s*(-?\d+)\s*)?(?:,\s*(AP_[A-Z_]+)\s*)?(?:,\s*(AP_[A-Z_]+)\s*)?(?:,\s*(\d+)\s*)?>\s*$",
        )
        .expect("type regex is valid")
    })
}

impl FromStr for FixedType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidType(s.to_string());
        let caps = type_regex().captures(s).ok_or_else(invalid)?;

        let kind = &caps[1];
        let width: u32 = caps[2].parse().map_err(|_| invalid())?;
        let second =
            caps.get(3).map(|m| m.as_str().parse::<i32>()).transpose().map_err(|_| invalid())?;

        let mut ty = match (kind, second) {
            ("fixed", Some(int_bits)) => FixedType::fixed(width, int_bits),
            ("ufixed", Some(int_bits)) => FixedType::ufixed(width, int_bits),
            ("int", None) => FixedType::int(width),
            ("uint", None) => FixedType::uint(width),
            _ => return Err(invalid()),
        };

        // ap_int / ap_uint には丸め・オーバーフロー指定を書けない
        let is_integer_kind = matches!(kind, "int" | "uint");
        if let Some(q) = caps.get(4) {
            if is_integer_kind {
                return Err(invalid());
            }
            ty.quantization = Quantization::parse(q.as_str()).ok_or_else(invalid)?;
        }
        if let Some(o) = caps.get(5) {
            ty.overflow = Overflow::parse(o.as_str()).ok_or_else(invalid)?;
        }
        // 飽和ビット数 N は 0 のみ対応
        if let Some(n) = caps.get(6) {
            if n.as_str().parse::<u32>().map_err(|_| invalid())? != 0 {
                return Err(invalid());
            }
        }

        ty.validate()?;
        Ok(ty)
    }
}

impl TryFrom<String> for FixedType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FixedType> for String {
    fn from(ty: FixedType) -> Self {
        ty.to_string()
    }
}

impl fmt::Display for FixedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let default_modes =
            self.quantization == Quantization::Truncate && self.overflow == Overflow::Wrap;
        if self.is_integer() && default_modes {
            let prefix = if self.signed { "ap_int" } else { "ap_uint" };
            return write!(f, "{prefix}<{}>", self.width);
        }

        let prefix = if self.signed { "ap_fixed" } else { "ap_ufixed" };
        write!(f, "{prefix}<{},{}", self.width, self.int_bits)?;
        if self.overflow != Overflow::Wrap {
            write!(f, ",{},{}", self.quantization.as_str(), self.overflow.as_str())?;
        } else if self.quantization != Quantization::Truncate {
            write!(f, ",{}", self.quantization.as_str())?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed() {
        let ty: FixedType = "ap_fixed<16,6>".parse().unwrap();
        assert_eq!(ty, FixedType::fixed(16, 6));
        assert_eq!(ty.frac_bits(), 10);
        assert_eq!(ty.min_raw(), -32768);
        assert_eq!(ty.max_raw(), 32767);
    }

    #[test]
    fn test_parse_modes() {
        let ty: FixedType = "ap_ufixed<8, 0, AP_RND, AP_SAT>".parse().unwrap();
        assert!(!ty.signed);
        assert_eq!(ty.quantization, Quantization::Round);
        assert_eq!(ty.overflow, Overflow::Saturate);
        assert_eq!(ty.to_string(), "ap_ufixed<8,0,AP_RND,AP_SAT>");
    }

    #[test]
    fn test_parse_integer_kinds() {
        let bin: FixedType = "ap_uint<1>".parse().unwrap();
        assert!(bin.is_binary());
        let ternary: FixedType = "ap_int<2>".parse().unwrap();
        assert!(ternary.is_ternary());
        assert_eq!(ternary.to_string(), "ap_int<2>");

        // ap_int に整数部指定は書けない
        assert!("ap_int<8,4>".parse::<FixedType>().is_err());
        assert!("ap_int<8,AP_RND>".parse::<FixedType>().is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(matches!(
            "ap_fixed<40,8>".parse::<FixedType>(),
            Err(ConfigError::TypeOutOfRange { .. })
        ));
        let zero_width = "ap_fixed<0,0>".parse::<FixedType>();
        assert!(matches!(zero_width, Err(ConfigError::TypeOutOfRange { .. })));
        assert!(matches!("ap_float<8>".parse::<FixedType>(), Err(ConfigError::InvalidType(_))));
        assert!("ap_fixed<8,2,AP_TRN,AP_SAT,1>".parse::<FixedType>().is_err());
    }

    #[test]
    fn test_product_and_sum_types() {
        let a = FixedType::fixed(8, 3);
        let b = FixedType::ufixed(6, 1);
        let p = FixedType::product_of(a, b);
        assert_eq!(p, FixedType::fixed(14, 4));
        assert_eq!(p.frac_bits(), a.frac_bits() + b.frac_bits());

        let s = FixedType::sum_of(a, b, true);
        assert_eq!(s.frac_bits(), 5);
        assert_eq!(s.int_bits, 4);
    }

    #[test]
    fn test_display_roundtrip_through_serde_string() {
        let ty = FixedType::fixed(12, 4).with_modes(Quantization::Round, Overflow::Wrap);
        let s: String = ty.into();
        assert_eq!(s, "ap_fixed<12,4,AP_RND>");
        assert_eq!(FixedType::try_from(s).unwrap(), ty);
    }
}
