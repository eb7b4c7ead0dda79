//! 累積値から出力型への変換

use crate::types::{Fixed, FixedType};

/// HLS の `ceillog2`
///
/// `x <= 2` のとき 1、それ以外は `1 + ceillog2((x + 1) / 2)`。
pub const fn ceillog2(x: usize) -> u32 {
    if x <= 2 { 1 } else { 1 + ceillog2(x.div_ceil(2)) }
}

/// 出力変換の種類（入力型と重み型の組み合わせで決まる）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// 入力・重みとも1ビット：一致数から符号付きの値を復元する
    BinaryBinary,
    /// 入力だけ1ビット
    BinaryData,
    /// どちらも1ビットでない
    General,
}

impl CastKind {
    pub fn select(input_t: FixedType, weight_t: FixedType) -> Self {
        match (input_t.is_binary(), weight_t.is_binary()) {
            (true, true) => CastKind::BinaryBinary,
            (true, false) => CastKind::BinaryData,
            (false, _) => CastKind::General,
        }
    }

    /// 累積値を `result_t` に変換
    ///
    /// BinaryBinary では `(acc - n_in/2) * 2` を `ap_int<ceillog2(n_in) + 2>` で計算する。
    pub fn apply(&self, acc: &Fixed, n_in: usize, result_t: FixedType) -> Fixed {
        match self {
            CastKind::BinaryBinary => {
                let ty = FixedType::int(ceillog2(n_in) + 2);
                let half = Fixed::from_int(FixedType::int(64), (n_in / 2) as i64);
                acc.sub(&half).cast(ty).shl(1).cast(result_t)
            }
            CastKind::BinaryData | CastKind::General => acc.cast(result_t),
        }
    }
}
