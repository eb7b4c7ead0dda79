//! Dense レイヤーの構成
//!
//! HLS の `dense_config` 構造体に相当する静的構成。
//! TOML などから読み込んだ [`LayerConfig`] を [`LayerConfig::validate`] で検査し、
//! 得られた [`ValidatedConfig`] だけがカーネルに渡せる。

use std::fmt;
use std::ops::{Deref, Range};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::tables::RamHints;
use crate::types::FixedType;

// =============================================================================
// 列挙型
// =============================================================================

/// 実装戦略（情報のみ、カーネルは常に latency カーネル）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Latency,
    Resource,
}

/// 乗算器の実装先
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MulResource {
    /// 合成ツールに任せる
    Default,
    /// LUT で組んだ乗算器
    Fabric,
    /// DSP ブロック
    Dsp,
    /// ROM に置いた乗算テーブル
    Ram,
}

impl MulResource {
    /// ディスパッチ順（パーティションの並び順）
    pub const ALL: [MulResource; 4] =
        [MulResource::Default, MulResource::Fabric, MulResource::Dsp, MulResource::Ram];

    pub fn as_str(&self) -> &'static str {
        match self {
            MulResource::Default => "default",
            MulResource::Fabric => "fabric",
            MulResource::Dsp => "dsp",
            MulResource::Ram => "ram",
        }
    }
}

impl fmt::Display for MulResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 部分和の加算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddStrategy {
    Default,
    Fabric,
    Dsp,
}

impl AddStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddStrategy::Default => "default",
            AddStrategy::Fabric => "fabric",
            AddStrategy::Dsp => "dsp",
        }
    }
}

// =============================================================================
// 構成
// =============================================================================

/// レイヤーの数値型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerTypes {
    /// 入力（`data_T`）
    pub input_t: FixedType,
    /// 出力（`res_T`）
    pub result_t: FixedType,
    pub weight_t: FixedType,
    pub bias_t: FixedType,
    /// 積・部分和を保持する型
    pub accum_t: FixedType,
}

impl LayerTypes {
    fn validate(&self) -> Result<(), ConfigError> {
        self.input_t.validate()?;
        self.result_t.validate()?;
        self.weight_t.validate()?;
        self.bias_t.validate()?;
        self.accum_t.validate()
    }
}

fn one() -> usize {
    1
}

fn yes() -> bool {
    true
}

/// Dense レイヤー構成
///
/// 省略されたフィールドは HLS 側の `dense_config` と同じ既定値になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub n_in: usize,
    pub n_out: usize,

    #[serde(default = "one")]
    pub reuse_factor: usize,
    #[serde(default)]
    pub strategy: Strategy,
    /// 重みを BRAM に置くか（情報のみ）
    #[serde(default)]
    pub store_weights_in_bram: bool,
    /// 学習済みモデルで 0 になっている重みの数
    #[serde(default)]
    pub n_zeros: usize,
    /// 同時に使う乗算器数の上限（省略時は reuse_factor から算出）
    #[serde(default)]
    pub multiplier_limit: Option<usize>,

    /// スパース/複数リソース経路を使うか
    #[serde(default)]
    pub heterogeneous_config: bool,
    #[serde(default)]
    pub default_muls: usize,
    #[serde(default)]
    pub fabric_muls: usize,
    #[serde(default)]
    pub dsp_muls: usize,
    #[serde(default)]
    pub ram_muls: usize,
    #[serde(default)]
    pub dual_port_muls: bool,
    #[serde(default)]
    pub lut_ram_muls: bool,
    #[serde(default = "one")]
    pub ram_partition_factor_muls: usize,

    #[serde(default = "yes")]
    pub default_add: bool,
    #[serde(default)]
    pub fabric_add: bool,
    #[serde(default)]
    pub dsp_add: bool,
    #[serde(default)]
    pub ram_add: bool,
    #[serde(default)]
    pub dual_port_add: bool,
    #[serde(default)]
    pub lut_ram_add: bool,
    #[serde(default = "one")]
    pub ram_partition_factor_add: usize,

    pub types: LayerTypes,
}

impl LayerConfig {
    /// 既定値で構成を作成
    pub fn new(n_in: usize, n_out: usize, types: LayerTypes) -> Self {
        Self {
            n_in,
            n_out,
            reuse_factor: 1,
            strategy: Strategy::Latency,
            store_weights_in_bram: false,
            n_zeros: 0,
            multiplier_limit: None,
            heterogeneous_config: false,
            default_muls: 0,
            fabric_muls: 0,
            dsp_muls: 0,
            ram_muls: 0,
            dual_port_muls: false,
            lut_ram_muls: false,
            ram_partition_factor_muls: 1,
            default_add: true,
            fabric_add: false,
            dsp_add: false,
            ram_add: false,
            dual_port_add: false,
            lut_ram_add: false,
            ram_partition_factor_add: 1,
            types,
        }
    }

    pub fn with_reuse_factor(mut self, reuse_factor: usize) -> Self {
        self.reuse_factor = reuse_factor;
        self
    }

    pub fn with_multiplier_limit(mut self, limit: usize) -> Self {
        self.multiplier_limit = Some(limit);
        self
    }

    /// スパース経路に切り替え、乗算器の割り当てを設定
    ///
    /// 割り当ては default, fabric, dsp, ram の順。
    pub fn heterogeneous(mut self, n_zeros: usize, muls: [usize; 4]) -> Self {
        self.heterogeneous_config = true;
        self.n_zeros = n_zeros;
        [self.default_muls, self.fabric_muls, self.dsp_muls, self.ram_muls] = muls;
        self
    }

    /// 乗算テーブルの実装先ヒント
    pub fn mul_hints(&self) -> RamHints {
        RamHints {
            dual_port: self.dual_port_muls,
            lut_ram: self.lut_ram_muls,
            partition_factor: u32::try_from(self.ram_partition_factor_muls).unwrap_or(u32::MAX),
        }
    }

    /// 加算テーブルの実装先ヒント
    pub fn add_hints(&self) -> RamHints {
        RamHints {
            dual_port: self.dual_port_add,
            lut_ram: self.lut_ram_add,
            partition_factor: u32::try_from(self.ram_partition_factor_add).unwrap_or(u32::MAX),
        }
    }

    /// 構成を検査
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let n_weights = self
            .n_in
            .checked_mul(self.n_out)
            .filter(|&n| n > 0)
            .ok_or(ConfigError::InvalidDimensions {
                n_in: self.n_in,
                n_out: self.n_out,
            })?;
        if self.reuse_factor == 0 {
            return Err(ConfigError::ZeroReuseFactor);
        }
        if self.n_zeros > n_weights {
            return Err(ConfigError::TooManyZeros {
                n_zeros: self.n_zeros,
                n_weights,
            });
        }
        if self.ram_partition_factor_muls == 0 || self.ram_partition_factor_add == 0 {
            return Err(ConfigError::ZeroPartitionFactor);
        }
        self.types.validate()?;

        let multiplier_limit = match self.multiplier_limit {
            Some(0) => return Err(ConfigError::ZeroMultiplierLimit),
            Some(limit) => limit,
            None => {
                (n_weights.div_ceil(self.reuse_factor) - self.n_zeros / self.reuse_factor).max(1)
            }
        };

        let add_strategy = self.add_strategy()?;

        let n_nonzeros = n_weights - self.n_zeros;
        let partition = MulPartition::new([
            self.default_muls,
            self.fabric_muls,
            self.dsp_muls,
            self.ram_muls,
        ]);
        if self.heterogeneous_config && partition.total() != Some(n_nonzeros) {
            return Err(ConfigError::PartitionMismatch {
                default: self.default_muls,
                fabric: self.fabric_muls,
                dsp: self.dsp_muls,
                ram: self.ram_muls,
                n_nonzeros,
            });
        }

        Ok(ValidatedConfig {
            config: self,
            n_nonzeros,
            multiplier_limit,
            add_strategy,
            partition,
        })
    }

    fn add_strategy(&self) -> Result<AddStrategy, ConfigError> {
        let flags = [self.default_add, self.fabric_add, self.dsp_add, self.ram_add];
        let count = flags.iter().filter(|&&f| f).count();
        if count != 1 {
            return Err(ConfigError::AmbiguousAddStrategy { count });
        }
        if self.ram_add {
            return Err(ConfigError::UnsupportedResource(
                "RAM table accumulation is not supported".to_string(),
            ));
        }
        Ok(if self.fabric_add {
            AddStrategy::Fabric
        } else if self.dsp_add {
            AddStrategy::Dsp
        } else {
            AddStrategy::Default
        })
    }
}

// =============================================================================
// 乗算器の割り当て
// =============================================================================

/// 詰め込み後のインデックス範囲を実装先に割り当てる
///
/// `[0, default)` → Default, `[default, default + fabric)` → Fabric, ... の半開区間。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulPartition {
    counts: [usize; 4],
}

impl MulPartition {
    fn new(counts: [usize; 4]) -> Self {
        Self { counts }
    }

    /// 割り当ての合計（オーバーフロー時は None）
    pub fn total(&self) -> Option<usize> {
        self.counts.iter().try_fold(0usize, |acc, &n| acc.checked_add(n))
    }

    /// 実装先ごとの担当数
    pub fn count(&self, resource: MulResource) -> usize {
        self.counts[resource as usize]
    }

    /// 実装先と担当範囲の列（空の範囲を含む）
    pub fn ranges(&self) -> impl Iterator<Item = (MulResource, Range<usize>)> + '_ {
        let mut start = 0;
        MulResource::ALL.into_iter().zip(self.counts).map(move |(resource, n)| {
            let range = start..start + n;
            start += n;
            (resource, range)
        })
    }

    /// インデックス `i` の担当
    pub fn resource_at(&self, i: usize) -> Option<MulResource> {
        self.ranges().find(|(_, range)| range.contains(&i)).map(|(resource, _)| resource)
    }
}

/// 検査済み構成
///
/// 導出値（非ゼロ重み数、乗算器上限、加算方式、乗算器の割り当て）を保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    config: LayerConfig,
    n_nonzeros: usize,
    multiplier_limit: usize,
    add_strategy: AddStrategy,
    partition: MulPartition,
}

impl ValidatedConfig {
    /// `n_in * n_out - n_zeros`
    pub fn n_nonzeros(&self) -> usize {
        self.n_nonzeros
    }

    pub fn n_weights(&self) -> usize {
        self.config.n_in * self.config.n_out
    }

    pub fn multiplier_limit(&self) -> usize {
        self.multiplier_limit
    }

    pub fn add_strategy(&self) -> AddStrategy {
        self.add_strategy
    }

    pub fn partition(&self) -> &MulPartition {
        &self.partition
    }

    pub fn into_inner(self) -> LayerConfig {
        self.config
    }
}

impl Deref for ValidatedConfig {
    type Target = LayerConfig;

    fn deref(&self) -> &LayerConfig {
        &self.config
    }
}

impl TryFrom<LayerConfig> for ValidatedConfig {
    type Error = ConfigError;

    fn try_from(config: LayerConfig) -> Result<Self, ConfigError> {
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> LayerTypes {
        LayerTypes {
            input_t: FixedType::fixed(8, 4),
            result_t: FixedType::fixed(12, 6),
            weight_t: FixedType::fixed(6, 2),
            bias_t: FixedType::fixed(8, 4),
            accum_t: FixedType::fixed(16, 8),
        }
    }

    #[test]
    fn test_default_multiplier_limit() {
        let cfg = LayerConfig::new(4, 3, types()).validate().unwrap();
        assert_eq!(cfg.multiplier_limit(), 12);
        assert_eq!(cfg.n_nonzeros(), 12);

        // ceil(12 / 5) - floor(4 / 5) = 3
        let cfg =
            LayerConfig::new(4, 3, types()).with_reuse_factor(5).heterogeneous(4, [8, 0, 0, 0]);
        assert_eq!(cfg.validate().unwrap().multiplier_limit(), 3);

        // ceil(12 / 2) - floor(5 / 2) = 4
        let cfg =
            LayerConfig::new(4, 3, types()).with_reuse_factor(2).heterogeneous(5, [7, 0, 0, 0]);
        assert_eq!(cfg.validate().unwrap().multiplier_limit(), 4);
    }

    #[test]
    fn test_partition_must_cover_nonzeros() {
        let cfg = LayerConfig::new(4, 3, types()).heterogeneous(2, [4, 3, 2, 0]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PartitionMismatch { n_nonzeros: 10, .. })
        ));

        let cfg = LayerConfig::new(4, 3, types()).heterogeneous(2, [4, 3, 2, 1]);
        let v = cfg.validate().unwrap();
        assert_eq!(v.partition().resource_at(0), Some(MulResource::Default));
        assert_eq!(v.partition().resource_at(4), Some(MulResource::Fabric));
        assert_eq!(v.partition().resource_at(8), Some(MulResource::Dsp));
        assert_eq!(v.partition().resource_at(9), Some(MulResource::Ram));
        assert_eq!(v.partition().resource_at(10), None);
    }

    #[test]
    fn test_partition_ignored_without_heterogeneous() {
        let mut cfg = LayerConfig::new(2, 2, types());
        cfg.dsp_muls = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_add_strategy_flags() {
        let mut cfg = LayerConfig::new(2, 2, types());
        cfg.fabric_add = true;
        assert_eq!(cfg.clone().validate(), Err(ConfigError::AmbiguousAddStrategy { count: 2 }));

        cfg.default_add = false;
        assert_eq!(cfg.clone().validate().unwrap().add_strategy(), AddStrategy::Fabric);

        cfg.fabric_add = false;
        assert_eq!(cfg.clone().validate(), Err(ConfigError::AmbiguousAddStrategy { count: 0 }));

        cfg.ram_add = true;
        assert!(matches!(cfg.validate(), Err(ConfigError::UnsupportedResource(_))));
    }

    #[test]
    fn test_rejects_degenerate_configs() {
        assert!(matches!(
            LayerConfig::new(0, 3, types()).validate(),
            Err(ConfigError::InvalidDimensions { .. })
        ));
        assert_eq!(
            LayerConfig::new(2, 3, types()).with_reuse_factor(0).validate(),
            Err(ConfigError::ZeroReuseFactor)
        );
        assert_eq!(
            LayerConfig::new(2, 3, types()).with_multiplier_limit(0).validate(),
            Err(ConfigError::ZeroMultiplierLimit)
        );
        assert_eq!(
            LayerConfig::new(2, 3, types()).heterogeneous(7, [0, 0, 0, 0]).validate(),
            Err(ConfigError::TooManyZeros {
                n_zeros: 7,
                n_weights: 6
            })
        );

        let mut wide = types();
        wide.accum_t = FixedType::fixed(40, 20);
        assert!(matches!(
            LayerConfig::new(2, 3, wide).validate(),
            Err(ConfigError::TypeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_hints_from_flags() {
        let mut cfg = LayerConfig::new(2, 2, types());
        cfg.dual_port_muls = true;
        cfg.ram_partition_factor_muls = 4;
        let hints = cfg.mul_hints();
        assert!(hints.dual_port);
        assert!(!hints.lut_ram);
        assert_eq!(hints.partition_factor, 4);
        assert_eq!(cfg.add_hints(), RamHints {
            dual_port: false,
            lut_ram: false,
            partition_factor: 1
        });
    }
}
