//! 数値型
//!
//! - `FixedType`: 固定小数点型の型記述（`ap_fixed<W,I,Q,O>` 相当）
//! - `Fixed`: 固定小数点値
//! - `ExpWeight`: 指数表現の重み

mod exp_weight;
mod fixed;
mod fixed_type;

pub use exp_weight::ExpWeight;
pub use fixed::Fixed;
pub use fixed_type::{
    FixedType, INTERNAL_MAX_WIDTH, MAX_FRAC_BITS, MAX_WIDTH, Overflow, Quantization,
};
