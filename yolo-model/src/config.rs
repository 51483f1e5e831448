//! Training configuration format.

use crate::{
    arch::Backbone, common::*, freeze::FreezeLevel, training::TrainingModelInit,
};

pub use model::*;
pub use training::*;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }

    pub fn training_model_init(&self) -> TrainingModelInit {
        let Self {
            model:
                ModelConfig {
                    backbone,
                    input_shape,
                    ref anchors,
                    num_classes,
                    ref weights_file,
                },
            training:
                TrainingConfig {
                    freeze_level,
                    learning_rate,
                },
        } = *self;

        TrainingModelInit {
            backbone,
            input_shape,
            anchors: anchors.clone(),
            num_classes,
            weights_file: weights_file.clone(),
            freeze_level,
            learning_rate,
        }
    }
}

mod model {
    use super::*;

    /// The model configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelConfig {
        pub backbone: Backbone,
        /// Input (height, width), multiples of 32.
        pub input_shape: (i64, i64),
        /// Anchor (w, h) sizes in pixels.
        pub anchors: Vec<(R64, R64)>,
        pub num_classes: usize,
        /// Extra weights loaded by name after the architecture defaults.
        pub weights_file: Option<PathBuf>,
    }
}

mod training {
    use super::*;

    /// The training configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        #[serde(default)]
        pub freeze_level: FreezeLevel,
        pub learning_rate: R64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_json5_config() -> Result<()> {
        let text = r#"
        {
            model: {
                backbone: "mobilenet",
                input_shape: [416, 416],
                anchors: [
                    [10, 13], [16, 30], [33, 23],
                    [30, 61], [62, 45], [59, 119],
                    [116, 90], [156, 198], [373, 326],
                ],
                num_classes: 80,
                weights_file: null,
            },
            training: {
                // defaults to freezing the backbone
                learning_rate: 0.001,
            },
        }
        "#;

        let config: Config = json5::from_str(text)?;
        assert_eq!(config.model.backbone, Backbone::Mobilenet);
        assert_eq!(config.model.anchors.len(), 9);
        assert_eq!(config.training.freeze_level, FreezeLevel::FreezeBackbone);

        let init = config.training_model_init();
        assert_eq!(init.num_classes, 80);
        assert_eq!(init.learning_rate, r64(0.001));
        Ok(())
    }
}
