//! Anchor sets, detection scales and ground-truth tensor shapes.

use crate::common::*;

/// Anchor count that selects the 2-scale tiny network.
const TINY_ANCHOR_COUNT: usize = 6;

const STRIDES_FULL: [i64; 3] = [32, 16, 8];
const STRIDES_TINY: [i64; 2] = [32, 16];

/// The detection scale layout, derived from the anchor count.
///
/// This derivation is the single source of truth for tiny/full mode: exactly
/// six anchors select the 2-scale tiny network, any other count the 3-scale
/// full network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    Full,
    Tiny,
}

impl ScaleMode {
    pub fn from_anchor_count(count: usize) -> Self {
        if count == TINY_ANCHOR_COUNT {
            Self::Tiny
        } else {
            Self::Full
        }
    }

    pub fn is_tiny(&self) -> bool {
        matches!(self, Self::Tiny)
    }

    pub fn scale_count(&self) -> usize {
        match self {
            Self::Full => 3,
            Self::Tiny => 2,
        }
    }

    /// Feature-map stride per scale, coarsest first.
    pub fn strides(&self) -> &'static [i64] {
        match self {
            Self::Full => &STRIDES_FULL,
            Self::Tiny => &STRIDES_TINY,
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Full => "full",
            Self::Tiny => "tiny",
        };
        write!(f, "{}", text)
    }
}

/// The number of anchors assigned to each detection scale.
///
/// The anchor total must be evenly divisible by the scale count; indivisible
/// sets are configuration errors.
pub fn anchors_per_scale(anchors: &[(R64, R64)]) -> Result<usize> {
    ensure!(!anchors.is_empty(), "the anchor set must not be empty");
    let scale_count = ScaleMode::from_anchor_count(anchors.len()).scale_count();
    ensure!(
        anchors.len() % scale_count == 0,
        "anchor count {} is not divisible by the scale count {}",
        anchors.len(),
        scale_count
    );
    Ok(anchors.len() / scale_count)
}

/// Distributes anchors into per-scale groups, coarsest scale first.
///
/// Scale 0 (stride 32) takes the largest anchors, matching the anchor masks
/// `[[6,7,8],[3,4,5],[0,1,2]]` (full) and `[[3,4,5],[0,1,2]]` (tiny).
pub fn anchor_groups(anchors: &[(R64, R64)]) -> Result<Vec<Vec<(R64, R64)>>> {
    let mode = ScaleMode::from_anchor_count(anchors.len());
    let per_scale = anchors_per_scale(anchors)?;

    let groups = (0..mode.scale_count())
        .map(|scale_index| {
            let begin = per_scale * (mode.scale_count() - 1 - scale_index);
            anchors[begin..(begin + per_scale)].to_vec()
        })
        .collect();
    Ok(groups)
}

/// Ground-truth tensor shape per scale, without the batch dimension:
/// `(H / stride, W / stride, anchors_per_scale, num_classes + 5)`.
pub fn ground_truth_shapes(
    input_shape: (i64, i64),
    anchors: &[(R64, R64)],
    num_classes: usize,
) -> Result<Vec<[i64; 4]>> {
    let (height, width) = input_shape;
    ensure!(
        height > 0 && width > 0,
        "input shape ({}, {}) must be positive",
        height,
        width
    );
    ensure!(num_classes > 0, "num_classes must be positive");

    let mode = ScaleMode::from_anchor_count(anchors.len());
    let per_scale = anchors_per_scale(anchors)? as i64;
    let num_outputs = (num_classes + 5) as i64;

    let shapes = mode
        .strides()
        .iter()
        .map(|&stride| [height / stride, width / stride, per_scale, num_outputs])
        .collect();
    Ok(shapes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor_set(count: usize) -> Vec<(R64, R64)> {
        (0..count)
            .map(|index| (r64(10.0 + index as f64), r64(13.0 + index as f64)))
            .collect()
    }

    #[test]
    fn mode_derivation() {
        assert_eq!(ScaleMode::from_anchor_count(6), ScaleMode::Tiny);
        assert_eq!(ScaleMode::from_anchor_count(9), ScaleMode::Full);
        assert_eq!(ScaleMode::from_anchor_count(3), ScaleMode::Full);
        assert_eq!(ScaleMode::Tiny.scale_count(), 2);
        assert_eq!(ScaleMode::Full.scale_count(), 3);
        assert_eq!(ScaleMode::Full.strides(), &[32, 16, 8]);
        assert_eq!(ScaleMode::Tiny.strides(), &[32, 16]);
    }

    #[test]
    fn groups_follow_anchor_masks() -> Result<()> {
        let anchors = anchor_set(9);
        let groups = anchor_groups(&anchors)?;
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], anchors[6..9].to_vec());
        assert_eq!(groups[1], anchors[3..6].to_vec());
        assert_eq!(groups[2], anchors[0..3].to_vec());

        let anchors = anchor_set(6);
        let groups = anchor_groups(&anchors)?;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], anchors[3..6].to_vec());
        assert_eq!(groups[1], anchors[0..3].to_vec());
        Ok(())
    }

    #[test]
    fn indivisible_anchor_count_is_rejected() {
        assert!(anchors_per_scale(&anchor_set(7)).is_err());
        assert!(anchors_per_scale(&anchor_set(0)).is_err());
        assert!(ground_truth_shapes((416, 416), &anchor_set(7), 20).is_err());
    }

    #[test]
    fn ground_truth_shapes_at_416() -> Result<()> {
        let shapes = ground_truth_shapes((416, 416), &anchor_set(9), 20)?;
        assert_eq!(
            shapes,
            vec![[13, 13, 3, 25], [26, 26, 3, 25], [52, 52, 3, 25]]
        );

        let shapes = ground_truth_shapes((416, 416), &anchor_set(6), 20)?;
        assert_eq!(shapes, vec![[13, 13, 3, 25], [26, 26, 3, 25]]);
        Ok(())
    }
}
