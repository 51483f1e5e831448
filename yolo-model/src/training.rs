//! Assembly of a ready-to-train detection model.
//!
//! [`TrainingModelInit`] gathers the architecture choice, anchor set, input
//! shape and transfer-learning options, and builds a [`TrainingModel`] that
//! owns the var store, the body, the loss, the Adam optimizer and the
//! per-term metrics.

use crate::{
    anchors::{self, ScaleMode},
    arch::{self, Backbone},
    body::ModelBody,
    common::*,
    freeze::FreezeLevel,
    loss::{YoloLoss, YoloLossInit, YoloLossOutput},
    weights,
};

/// Metric keys, in the order the loss reports its terms.
pub const METRIC_NAMES: [&str; 4] = ["xy_loss", "wh_loss", "confidence_loss", "class_loss"];

/// The coarsest feature-map stride; input sides must be multiples of it.
const MAX_STRIDE: i64 = 32;

#[derive(Debug, Clone)]
pub struct TrainingModelInit {
    pub backbone: Backbone,
    /// Input (height, width) in pixels, both multiples of 32.
    pub input_shape: (i64, i64),
    /// Anchor (w, h) sizes in pixels. Exactly six anchors select the tiny
    /// 2-scale network.
    pub anchors: Vec<(R64, R64)>,
    pub num_classes: usize,
    /// Extra weights loaded by name on top of the architecture defaults.
    /// Unlike the defaults, a missing file here is an error.
    pub weights_file: Option<PathBuf>,
    pub freeze_level: FreezeLevel,
    pub learning_rate: R64,
}

impl TrainingModelInit {
    pub fn new(
        backbone: Backbone,
        input_shape: (i64, i64),
        anchors: Vec<(R64, R64)>,
        num_classes: usize,
    ) -> Self {
        Self {
            backbone,
            input_shape,
            anchors,
            num_classes,
            weights_file: None,
            freeze_level: FreezeLevel::default(),
            learning_rate: r64(1e-3),
        }
    }

    pub fn build(self, device: Device) -> Result<TrainingModel> {
        let Self {
            backbone,
            input_shape,
            anchors,
            num_classes,
            weights_file,
            freeze_level,
            learning_rate,
        } = self;

        let (height, width) = input_shape;
        ensure!(
            height > 0 && height % MAX_STRIDE == 0 && width > 0 && width % MAX_STRIDE == 0,
            "input shape ({}, {}) must be positive multiples of {}",
            height,
            width,
            MAX_STRIDE
        );
        ensure!(learning_rate.raw() > 0.0, "learning rate must be positive");

        let mode = ScaleMode::from_anchor_count(anchors.len());
        let anchors_per_scale = anchors::anchors_per_scale(&anchors)?;
        let ground_truth_shapes = anchors::ground_truth_shapes(input_shape, &anchors, num_classes)?;

        // a fresh var store per build keeps models independent
        let mut vs = nn::VarStore::new(device);
        let (mut body, backbone_depth) =
            arch::select(&mut vs, backbone, mode, anchors_per_scale, num_classes)?;
        info!(
            "create {} {} model with {} anchors and {} classes",
            backbone,
            mode,
            anchors.len(),
            num_classes
        );

        if let Some(weights_file) = &weights_file {
            weights::load_partial(&mut vs, weights_file)?;
        }

        body.freeze(freeze_level, backbone_depth)?;

        let loss_fn = YoloLossInit::new(anchors, num_classes).build()?;
        let optimizer = nn::Adam::default().build(&vs, learning_rate.raw())?;
        let metrics = METRIC_NAMES
            .iter()
            .map(|&name| (name.to_owned(), 0.0))
            .collect();

        Ok(TrainingModel {
            vs,
            body,
            loss_fn,
            optimizer,
            mode,
            backbone_depth,
            input_shape,
            ground_truth_shapes,
            metrics,
        })
    }
}

#[derive(Getters, CopyGetters)]
pub struct TrainingModel {
    vs: nn::VarStore,
    body: ModelBody,
    loss_fn: YoloLoss,
    optimizer: nn::Optimizer,
    #[getset(get_copy = "pub")]
    mode: ScaleMode,
    #[getset(get_copy = "pub")]
    backbone_depth: usize,
    #[getset(get_copy = "pub")]
    input_shape: (i64, i64),
    /// Per-scale ground-truth shapes without the batch dimension.
    #[getset(get = "pub")]
    ground_truth_shapes: Vec<[i64; 4]>,
    /// Loss terms of the last training step.
    #[getset(get = "pub")]
    metrics: IndexMap<String, f64>,
}

impl TrainingModel {
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn body(&self) -> &ModelBody {
        &self.body
    }

    /// All-background ground truth, one tensor per scale.
    pub fn zero_ground_truth(&self, batch_size: i64) -> Vec<Tensor> {
        let device = self.vs.device();
        self.ground_truth_shapes
            .iter()
            .map(|&[gh, gw, na, no]| {
                Tensor::zeros(&[batch_size, gh, gw, na, no], (Kind::Float, device))
            })
            .collect()
    }

    pub fn forward_t(&self, images: &Tensor, train: bool) -> Result<Vec<Tensor>> {
        self.body.forward_t(images, train)
    }

    /// Runs one optimization step and reports the loss terms.
    pub fn train_step(
        &mut self,
        images: &Tensor,
        ground_truth: &[Tensor],
    ) -> Result<YoloLossOutput> {
        let (batch_size, _c, height, width) = images.size4()?;
        ensure!(
            (height, width) == self.input_shape,
            "image size ({}, {}) does not match the model input shape {:?}",
            height,
            width,
            self.input_shape
        );
        ensure!(
            ground_truth.len() == self.ground_truth_shapes.len(),
            "expect {} ground-truth scales, got {}",
            self.ground_truth_shapes.len(),
            ground_truth.len()
        );
        for (gt, &[gh, gw, na, no]) in izip!(ground_truth, &self.ground_truth_shapes) {
            ensure!(
                gt.size() == [batch_size, gh, gw, na, no],
                "ground truth shape {:?} does not match {:?}",
                gt.size(),
                [batch_size, gh, gw, na, no]
            );
        }

        let predictions = self.body.forward_t(images, true)?;
        let output = self.loss_fn.forward(&predictions, ground_truth)?;
        self.optimizer.backward_step(&output.total_loss);

        let terms = [
            &output.xy_loss,
            &output.wh_loss,
            &output.confidence_loss,
            &output.class_loss,
        ];
        for (&name, term) in izip!(&METRIC_NAMES, terms) {
            self.metrics.insert(name.to_owned(), f64::from(term));
        }

        Ok(output)
    }

    pub fn set_learning_rate(&mut self, learning_rate: R64) {
        self.optimizer.set_lr(learning_rate.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_anchors() -> Vec<(R64, R64)> {
        [
            (10.0, 14.0),
            (23.0, 27.0),
            (37.0, 58.0),
            (81.0, 82.0),
            (135.0, 169.0),
            (344.0, 319.0),
        ]
        .iter()
        .map(|&(w, h)| (r64(w), r64(h)))
        .collect()
    }

    #[test]
    fn rejects_misaligned_input_shape() {
        let init = TrainingModelInit::new(Backbone::DarknetLite, (400, 416), tiny_anchors(), 20);
        assert!(init.build(Device::Cpu).is_err());
    }

    #[test]
    fn rejects_missing_explicit_weights() {
        let init = TrainingModelInit {
            weights_file: Some(PathBuf::from("no/such/weights.ot")),
            ..TrainingModelInit::new(Backbone::DarknetLite, (416, 416), tiny_anchors(), 20)
        };
        assert!(init.build(Device::Cpu).is_err());
    }

    #[test]
    fn builds_a_tiny_model_with_metrics() -> Result<()> {
        let model = TrainingModelInit::new(Backbone::DarknetLite, (416, 416), tiny_anchors(), 20)
            .build(Device::Cpu)?;

        assert_eq!(model.mode(), ScaleMode::Tiny);
        assert_eq!(model.backbone_depth(), 0);
        assert_eq!(
            model.ground_truth_shapes(),
            &vec![[13, 13, 3, 25], [26, 26, 3, 25]]
        );
        assert_eq!(
            model.metrics().keys().map(|name| name.as_str()).collect::<Vec<_>>(),
            METRIC_NAMES.to_vec()
        );

        let ground_truth = model.zero_ground_truth(2);
        assert_eq!(ground_truth.len(), 2);
        assert_eq!(ground_truth[0].size(), vec![2, 13, 13, 3, 25]);
        Ok(())
    }
}
