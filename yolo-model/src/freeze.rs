//! Layer-freezing policy for transfer learning.
//!
//! The policy is a pure function from `(level, backbone_depth, num_layers)`
//! to a per-layer trainability mask, applied to a model body in one pass.

use crate::common::*;

/// Trailing layers kept trainable at [`FreezeLevel::FreezeAllButHead`].
const HEAD_TAIL_LAYERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeLevel {
    /// Level 0: every layer is trainable.
    UnfreezeAll,
    /// Level 1: freeze the pretrained backbone layers only.
    FreezeBackbone,
    /// Level 2: freeze everything except the last three layers.
    FreezeAllButHead,
}

impl Default for FreezeLevel {
    fn default() -> Self {
        Self::FreezeBackbone
    }
}

impl TryFrom<i64> for FreezeLevel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        let level = match value {
            0 => Self::UnfreezeAll,
            1 => Self::FreezeBackbone,
            2 => Self::FreezeAllButHead,
            _ => bail!("invalid freeze level {}, expected 0, 1 or 2", value),
        };
        Ok(level)
    }
}

/// Per-layer trainability under the given freeze level.
///
/// Freezing excludes a layer's parameters from gradient updates; the layer
/// stays in the forward pass.
pub fn trainability_mask(
    level: FreezeLevel,
    backbone_depth: usize,
    num_layers: usize,
) -> Vec<bool> {
    let frozen = match level {
        FreezeLevel::UnfreezeAll => 0,
        FreezeLevel::FreezeBackbone => backbone_depth.min(num_layers),
        FreezeLevel::FreezeAllButHead => num_layers.saturating_sub(HEAD_TAIL_LAYERS),
    };
    (0..num_layers).map(|index| index >= frozen).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_1_freezes_backbone_only() {
        let mask = trainability_mask(FreezeLevel::FreezeBackbone, 185, 200);
        assert_eq!(mask.len(), 200);
        assert!(mask[..185].iter().all(|&trainable| !trainable));
        assert!(mask[185..].iter().all(|&trainable| trainable));
    }

    #[test]
    fn level_2_keeps_last_three_layers() {
        let mask = trainability_mask(FreezeLevel::FreezeAllButHead, 185, 200);
        assert!(mask[..197].iter().all(|&trainable| !trainable));
        assert!(mask[197..].iter().all(|&trainable| trainable));
    }

    #[test]
    fn level_0_unfreezes_everything() {
        let mask = trainability_mask(FreezeLevel::UnfreezeAll, 185, 200);
        assert!(mask.iter().all(|&trainable| trainable));
    }

    #[test]
    fn no_backbone_means_nothing_to_freeze() {
        let mask = trainability_mask(FreezeLevel::FreezeBackbone, 0, 40);
        assert!(mask.iter().all(|&trainable| trainable));
    }

    #[test]
    fn numeric_levels() -> Result<()> {
        assert_eq!(FreezeLevel::try_from(0)?, FreezeLevel::UnfreezeAll);
        assert_eq!(FreezeLevel::try_from(1)?, FreezeLevel::FreezeBackbone);
        assert_eq!(FreezeLevel::try_from(2)?, FreezeLevel::FreezeAllButHead);
        assert!(FreezeLevel::try_from(3).is_err());
        assert!(FreezeLevel::try_from(-1).is_err());
        Ok(())
    }
}
