//! Backbone families and the architecture registry.
//!
//! Every supported `(backbone, scale mode)` pair maps to a registry entry
//! that carries the pretrained backbone depth, the default weights file and
//! the table builder. [`select`] resolves a pair, builds the body under the
//! given var store and loads the default pretrained weights when present.

use crate::{
    anchors::ScaleMode,
    body::{BlockInit, ModelBody},
    common::*,
    weights,
};

mod darknet;
mod mobilenet;
mod table;
mod vgg16;
mod xception;

/// The supported backbone families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backbone {
    Darknet,
    DarknetLite,
    Mobilenet,
    MobilenetLite,
    Vgg16,
    Xception,
    XceptionLite,
}

impl FromStr for Backbone {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let backbone = match text {
            "darknet" => Self::Darknet,
            "darknet_lite" => Self::DarknetLite,
            "mobilenet" => Self::Mobilenet,
            "mobilenet_lite" => Self::MobilenetLite,
            "vgg16" => Self::Vgg16,
            "xception" => Self::Xception,
            "xception_lite" => Self::XceptionLite,
            _ => bail!("unsupported model type '{}'", text),
        };
        Ok(backbone)
    }
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Darknet => "darknet",
            Self::DarknetLite => "darknet_lite",
            Self::Mobilenet => "mobilenet",
            Self::MobilenetLite => "mobilenet_lite",
            Self::Vgg16 => "vgg16",
            Self::Xception => "xception",
            Self::XceptionLite => "xception_lite",
        };
        write!(f, "{}", text)
    }
}

/// Output-head sizing shared by every table builder.
#[derive(Debug, Clone)]
pub struct BodyInit {
    pub num_anchors_per_scale: usize,
    pub num_classes: usize,
}

impl BodyInit {
    /// Channels of each per-scale prediction convolution:
    /// `anchors_per_scale * (num_classes + 5)`.
    pub fn num_outputs(&self) -> usize {
        self.num_anchors_per_scale * (self.num_classes + 5)
    }
}

/// One registry entry.
pub struct ArchEntry {
    /// Layer count of the pretrained backbone prefix. Zero means the body
    /// trains from scratch and level-1 freezing has nothing to freeze.
    pub backbone_depth: usize,
    /// Default pretrained weights, loaded when the file exists.
    pub pretrained_weights: Option<&'static str>,
    pub build: fn(&BodyInit) -> Vec<BlockInit>,
}

static DARKNET_FULL: ArchEntry = ArchEntry {
    backbone_depth: 185,
    pretrained_weights: Some("model_data/darknet53_weights.ot"),
    build: darknet::full,
};

static DARKNET_TINY: ArchEntry = ArchEntry {
    backbone_depth: 20,
    pretrained_weights: Some("model_data/tiny_yolo_weights.ot"),
    build: darknet::tiny,
};

static DARKNET_LITE_TINY: ArchEntry = ArchEntry {
    backbone_depth: 0,
    pretrained_weights: None,
    build: darknet::tiny_lite,
};

static MOBILENET_FULL: ArchEntry = ArchEntry {
    backbone_depth: 87,
    pretrained_weights: None,
    build: mobilenet::full,
};

static MOBILENET_TINY: ArchEntry = ArchEntry {
    backbone_depth: 87,
    pretrained_weights: None,
    build: mobilenet::tiny,
};

static MOBILENET_LITE_FULL: ArchEntry = ArchEntry {
    backbone_depth: 87,
    pretrained_weights: None,
    build: mobilenet::full_lite,
};

static MOBILENET_LITE_TINY: ArchEntry = ArchEntry {
    backbone_depth: 87,
    pretrained_weights: None,
    build: mobilenet::tiny_lite,
};

static VGG16_FULL: ArchEntry = ArchEntry {
    backbone_depth: 19,
    pretrained_weights: None,
    build: vgg16::full,
};

static VGG16_TINY: ArchEntry = ArchEntry {
    backbone_depth: 19,
    pretrained_weights: None,
    build: vgg16::tiny,
};

static XCEPTION_FULL: ArchEntry = ArchEntry {
    backbone_depth: 132,
    pretrained_weights: None,
    build: xception::full,
};

static XCEPTION_TINY: ArchEntry = ArchEntry {
    backbone_depth: 132,
    pretrained_weights: None,
    build: xception::tiny,
};

static XCEPTION_LITE_FULL: ArchEntry = ArchEntry {
    backbone_depth: 132,
    pretrained_weights: None,
    build: xception::full_lite,
};

static XCEPTION_LITE_TINY: ArchEntry = ArchEntry {
    backbone_depth: 132,
    pretrained_weights: None,
    build: xception::tiny_lite,
};

/// Looks up the registry entry of a `(backbone, mode)` pair. Returns `None`
/// for pairs without a network, such as the full darknet_lite.
pub fn registry(backbone: Backbone, mode: ScaleMode) -> Option<&'static ArchEntry> {
    use Backbone::*;
    use ScaleMode::*;

    let entry = match (backbone, mode) {
        (Darknet, Full) => &DARKNET_FULL,
        (Darknet, Tiny) => &DARKNET_TINY,
        (DarknetLite, Full) => return None,
        (DarknetLite, Tiny) => &DARKNET_LITE_TINY,
        (Mobilenet, Full) => &MOBILENET_FULL,
        (Mobilenet, Tiny) => &MOBILENET_TINY,
        (MobilenetLite, Full) => &MOBILENET_LITE_FULL,
        (MobilenetLite, Tiny) => &MOBILENET_LITE_TINY,
        (Vgg16, Full) => &VGG16_FULL,
        (Vgg16, Tiny) => &VGG16_TINY,
        (Xception, Full) => &XCEPTION_FULL,
        (Xception, Tiny) => &XCEPTION_TINY,
        (XceptionLite, Full) => &XCEPTION_LITE_FULL,
        (XceptionLite, Tiny) => &XCEPTION_LITE_TINY,
    };
    Some(entry)
}

/// Builds the model body of a `(backbone, mode)` pair under the var store
/// and returns it together with the pretrained backbone depth.
pub fn select(
    vs: &mut nn::VarStore,
    backbone: Backbone,
    mode: ScaleMode,
    num_anchors_per_scale: usize,
    num_classes: usize,
) -> Result<(ModelBody, usize)> {
    let entry = registry(backbone, mode).ok_or_else(|| {
        format_err!(
            "backbone '{}' does not support the {} network",
            backbone,
            mode
        )
    })?;

    let init = BodyInit {
        num_anchors_per_scale,
        num_classes,
    };
    let layer_table = (entry.build)(&init);
    let body = ModelBody::from_table(&vs.root(), &layer_table)?;

    if let Some(weights_file) = entry.pretrained_weights {
        if Path::new(weights_file).exists() {
            weights::load_partial(vs, weights_file)?;
        } else {
            warn!(
                "pretrained weights '{}' not found, the backbone starts from random init",
                weights_file
            );
        }
    }

    Ok((body, entry.backbone_depth))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_COMBOS: [(Backbone, ScaleMode, usize); 13] = [
        (Backbone::Darknet, ScaleMode::Full, 185),
        (Backbone::Darknet, ScaleMode::Tiny, 20),
        (Backbone::DarknetLite, ScaleMode::Tiny, 0),
        (Backbone::Mobilenet, ScaleMode::Full, 87),
        (Backbone::Mobilenet, ScaleMode::Tiny, 87),
        (Backbone::MobilenetLite, ScaleMode::Full, 87),
        (Backbone::MobilenetLite, ScaleMode::Tiny, 87),
        (Backbone::Vgg16, ScaleMode::Full, 19),
        (Backbone::Vgg16, ScaleMode::Tiny, 19),
        (Backbone::Xception, ScaleMode::Full, 132),
        (Backbone::Xception, ScaleMode::Tiny, 132),
        (Backbone::XceptionLite, ScaleMode::Full, 132),
        (Backbone::XceptionLite, ScaleMode::Tiny, 132),
    ];

    #[test]
    fn registry_depths() {
        for (backbone, mode, depth) in VALID_COMBOS {
            let entry = registry(backbone, mode)
                .unwrap_or_else(|| panic!("missing entry for {} {}", backbone, mode));
            assert_eq!(entry.backbone_depth, depth, "{} {}", backbone, mode);
        }
        assert!(registry(Backbone::DarknetLite, ScaleMode::Full).is_none());
    }

    #[test]
    fn backbone_depth_indexes_the_table_prefix() {
        // The pretrained prefix must stop before the first head layer.
        let init = BodyInit {
            num_anchors_per_scale: 3,
            num_classes: 20,
        };

        for (backbone, mode, depth) in VALID_COMBOS {
            let entry = registry(backbone, mode).unwrap();
            let layer_table = (entry.build)(&init);
            assert!(
                depth <= layer_table.len(),
                "{} {}: depth {} exceeds table length {}",
                backbone,
                mode,
                depth,
                layer_table.len()
            );
            if depth > 0 {
                assert!(
                    !layer_table[depth - 1].name.starts_with("head_"),
                    "{} {}: layer {} is a head layer",
                    backbone,
                    mode,
                    depth - 1
                );
            }
        }
    }

    #[test]
    fn backbone_names_round_trip() -> Result<()> {
        for (backbone, ..) in VALID_COMBOS {
            assert_eq!(backbone.to_string().parse::<Backbone>()?, backbone);
        }
        assert!("unknown_family".parse::<Backbone>().is_err());
        Ok(())
    }

    #[test]
    fn darknet_full_table_layer_counts() {
        let init = BodyInit {
            num_anchors_per_scale: 3,
            num_classes: 20,
        };
        let layer_table = (DARKNET_FULL.build)(&init);

        // 185 backbone layers, then the head up to the three prediction convs
        assert_eq!(layer_table[0].name, "input");
        assert!(layer_table[184].name.ends_with("_add"));
        assert!(layer_table[185].name.starts_with("head_"));

        let names: Vec<_> = layer_table.iter().map(|init| init.name.as_str()).collect();
        let len = names.len();
        assert_eq!(&names[len - 3..], &["y1", "y2", "y3"]);
    }

    #[test]
    fn tiny_darknet_table_layer_counts() {
        let init = BodyInit {
            num_anchors_per_scale: 3,
            num_classes: 20,
        };
        let layer_table = (DARKNET_TINY.build)(&init);

        // 20 backbone layers end at the stride-16 tap
        assert_eq!(layer_table[19].name, "conv5_act");

        let names: Vec<_> = layer_table.iter().map(|init| init.name.as_str()).collect();
        let len = names.len();
        assert_eq!(&names[len - 2..], &["y1", "y2"]);
    }

    #[test]
    fn mobilenet_backbone_is_87_layers() {
        let init = BodyInit {
            num_anchors_per_scale: 3,
            num_classes: 20,
        };
        let layer_table = (MOBILENET_FULL.build)(&init);
        assert_eq!(layer_table[86].name, "conv_pw_13_relu");
        assert!(layer_table[87].name.starts_with("head_"));
    }

    #[test]
    fn vgg16_backbone_is_19_layers() {
        let init = BodyInit {
            num_anchors_per_scale: 3,
            num_classes: 20,
        };
        let layer_table = (VGG16_FULL.build)(&init);
        assert_eq!(layer_table[18].name, "block5_pool");
        assert!(layer_table[19].name.starts_with("head_"));
    }

    #[test]
    fn xception_backbone_is_132_layers() {
        let init = BodyInit {
            num_anchors_per_scale: 3,
            num_classes: 20,
        };
        let layer_table = (XCEPTION_FULL.build)(&init);
        assert_eq!(layer_table[131].name, "block14_sepconv2_act");
        assert!(layer_table[132].name.starts_with("head_"));
    }

    #[test]
    fn select_rejects_unsupported_pairs() {
        let mut vs = nn::VarStore::new(Device::Cpu);
        let result = select(&mut vs, Backbone::DarknetLite, ScaleMode::Full, 3, 20);
        assert!(result.is_err());
    }

    #[test]
    fn select_builds_a_runnable_tiny_body() -> Result<()> {
        let mut vs = nn::VarStore::new(Device::Cpu);
        let (body, depth) = select(&mut vs, Backbone::DarknetLite, ScaleMode::Tiny, 3, 20)?;
        assert_eq!(depth, 0);
        assert_eq!(body.num_outputs(), 2);

        let xs = Tensor::rand(&[1, 3, 416, 416], (Kind::Float, Device::Cpu));
        let outputs = body.forward_t(&xs, false)?;
        assert_eq!(outputs[0].size(), vec![1, 75, 13, 13]);
        assert_eq!(outputs[1].size(), vec![1, 75, 26, 26]);
        Ok(())
    }
}
