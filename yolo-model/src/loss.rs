//! The multi-term YOLOv3 training loss.
//!
//! The loss consumes the raw per-scale prediction maps and the matching
//! ground-truth tensors, and reports the total together with its xy, wh,
//! confidence and class terms. Box targets are compared in raw logit space,
//! weighted by `2 - w*h` so small boxes count more, and background cells
//! whose best IoU against any true box exceeds the ignore threshold are
//! excluded from the confidence term.

use crate::{
    anchors::{self, ScaleMode},
    common::*,
};

pub use yolo_loss::*;
pub use yolo_loss_output::*;

mod yolo_loss {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct YoloLossInit {
        pub anchors: Vec<(R64, R64)>,
        pub num_classes: usize,
        pub ignore_thresh: R64,
        pub use_focal_loss: bool,
        pub use_softmax_loss: bool,
        pub focal_loss_gamma: R64,
        pub focal_loss_alpha: R64,
    }

    impl YoloLossInit {
        pub fn new(anchors: Vec<(R64, R64)>, num_classes: usize) -> Self {
            Self {
                anchors,
                num_classes,
                ignore_thresh: r64(0.5),
                use_focal_loss: false,
                use_softmax_loss: false,
                focal_loss_gamma: r64(2.0),
                focal_loss_alpha: r64(0.25),
            }
        }

        pub fn build(self) -> Result<YoloLoss> {
            let Self {
                anchors,
                num_classes,
                ignore_thresh,
                use_focal_loss,
                use_softmax_loss,
                focal_loss_gamma,
                focal_loss_alpha,
            } = self;

            ensure!(num_classes > 0, "num_classes must be positive");
            ensure!(
                (0.0..=1.0).contains(&ignore_thresh.raw()),
                "ignore_thresh {} is out of range [0, 1]",
                ignore_thresh
            );

            let mode = ScaleMode::from_anchor_count(anchors.len());
            let scale_anchors: Vec<Tensor> = anchors::anchor_groups(&anchors)?
                .into_iter()
                .map(|group| {
                    let components: Vec<f32> = group
                        .iter()
                        .flat_map(|&(w, h)| [w.raw() as f32, h.raw() as f32])
                        .collect();
                    Tensor::of_slice(&components)
                        .view([group.len() as i64, 2])
                        .set_requires_grad(false)
                })
                .collect();

            Ok(YoloLoss {
                mode,
                scale_anchors,
                num_classes,
                ignore_thresh,
                use_focal_loss,
                use_softmax_loss,
                focal_loss_gamma,
                focal_loss_alpha,
            })
        }
    }

    #[derive(Debug)]
    pub struct YoloLoss {
        mode: ScaleMode,
        /// Per-scale anchors in pixels, `[num_anchors, 2]` in (w, h) order.
        scale_anchors: Vec<Tensor>,
        num_classes: usize,
        ignore_thresh: R64,
        use_focal_loss: bool,
        use_softmax_loss: bool,
        focal_loss_gamma: R64,
        focal_loss_alpha: R64,
    }

    impl YoloLoss {
        pub fn scale_count(&self) -> usize {
            self.scale_anchors.len()
        }

        /// Computes the loss over all scales.
        ///
        /// `predictions[l]` is the raw body output
        /// `[batch, anchors * (classes + 5), grid_h, grid_w]` and
        /// `ground_truth[l]` the matching
        /// `[batch, grid_h, grid_w, anchors, classes + 5]` target.
        pub fn forward(
            &self,
            predictions: &[Tensor],
            ground_truth: &[Tensor],
        ) -> Result<YoloLossOutput> {
            ensure!(
                predictions.len() == self.scale_count(),
                "expect {} prediction scales, got {}",
                self.scale_count(),
                predictions.len()
            );
            ensure!(
                ground_truth.len() == self.scale_count(),
                "expect {} ground-truth scales, got {}",
                self.scale_count(),
                ground_truth.len()
            );

            let device = predictions[0].device();
            let mut xy_loss = Tensor::zeros(&[], (Kind::Float, device));
            let mut wh_loss = Tensor::zeros(&[], (Kind::Float, device));
            let mut confidence_loss = Tensor::zeros(&[], (Kind::Float, device));
            let mut class_loss = Tensor::zeros(&[], (Kind::Float, device));

            for (scale_index, (pred, gt)) in izip!(predictions, ground_truth).enumerate() {
                let terms = self
                    .scale_loss(scale_index, pred, gt)
                    .with_context(|| format!("at detection scale {}", scale_index))?;
                xy_loss = xy_loss + terms.0;
                wh_loss = wh_loss + terms.1;
                confidence_loss = confidence_loss + terms.2;
                class_loss = class_loss + terms.3;
            }

            let total_loss = &xy_loss + &wh_loss + &confidence_loss + &class_loss;

            Ok(YoloLossOutput {
                total_loss,
                xy_loss,
                wh_loss,
                confidence_loss,
                class_loss,
            })
        }

        fn scale_loss(
            &self,
            scale_index: usize,
            pred: &Tensor,
            gt: &Tensor,
        ) -> Result<(Tensor, Tensor, Tensor, Tensor)> {
            let device = pred.device();
            let anchors = self.scale_anchors[scale_index].to_device(device);
            let num_anchors = anchors.size()[0];
            let num_outputs = (self.num_classes + 5) as i64;
            let stride = self.mode.strides()[scale_index];

            let (batch_size, channels, grid_h, grid_w) = pred.size4()?;
            ensure!(
                channels == num_anchors * num_outputs,
                "prediction has {} channels, expect {} anchors x {} outputs",
                channels,
                num_anchors,
                num_outputs
            );
            ensure!(
                gt.size() == [batch_size, grid_h, grid_w, num_anchors, num_outputs],
                "ground truth shape {:?} does not match prediction grid {}x{}",
                gt.size(),
                grid_h,
                grid_w
            );

            // [batch, grid_h, grid_w, anchors, outputs]
            let pred = pred
                .view([batch_size, num_anchors, num_outputs, grid_h, grid_w])
                .permute(&[0, 3, 4, 1, 2]);

            let grid = grid_offsets(grid_h, grid_w, device);
            let grid_size = Tensor::of_slice(&[grid_w as f32, grid_h as f32]).to_device(device);
            let input_size = Tensor::of_slice(&[(grid_w * stride) as f32, (grid_h * stride) as f32])
                .to_device(device);

            let raw_pred_xy = pred.i((.., .., .., .., 0..2));
            let raw_pred_wh = pred.i((.., .., .., .., 2..4));
            let raw_pred_conf = pred.i((.., .., .., .., 4..5));
            let raw_pred_class = pred.i((.., .., .., .., 5..));

            let object_mask = gt.i((.., .., .., .., 4..5));
            let true_class = gt.i((.., .., .., .., 5..));

            // box targets in raw logit space
            let raw_true_xy = gt.i((.., .., .., .., 0..2)) * &grid_size - &grid;
            let raw_true_wh = (gt.i((.., .., .., .., 2..4)) * &input_size / &anchors).log();
            // mask out the log(0) cells of empty anchors
            let raw_true_wh = raw_true_wh.where_self(
                &object_mask.gt(0.5),
                &Tensor::zeros(&[], (Kind::Float, device)),
            );

            // weigh small boxes more
            let box_loss_scale: Tensor =
                2.0 - gt.i((.., .., .., .., 2..3)) * gt.i((.., .., .., .., 3..4));

            // decoded boxes in normalized image space, for the ignore mask
            let pred_xy = (raw_pred_xy.sigmoid() + &grid) / &grid_size;
            let pred_wh = raw_pred_wh.exp() * &anchors / &input_size;
            let pred_box = Tensor::cat(&[pred_xy, pred_wh], 4);

            let ignore_mask = self.ignore_mask(gt, &object_mask, &pred_box)?;

            let bce = |input: &Tensor, target: &Tensor| -> Tensor {
                input.binary_cross_entropy_with_logits::<Tensor>(
                    target,
                    None,
                    None,
                    Reduction::None,
                )
            };
            let batch_size = batch_size as f64;

            let xy_loss = (&object_mask * &box_loss_scale * bce(&raw_pred_xy, &raw_true_xy))
                .sum(Kind::Float)
                / batch_size;
            let wh_loss = (&object_mask
                * &box_loss_scale
                * (&raw_true_wh - &raw_pred_wh).pow_tensor_scalar(2.0)
                * 0.5)
                .sum(Kind::Float)
                / batch_size;

            let confidence_loss = if self.use_focal_loss {
                let gamma = self.focal_loss_gamma.raw();
                let alpha = self.focal_loss_alpha.raw();
                let input_prob = raw_pred_conf.sigmoid();
                let p_t: Tensor =
                    &object_mask * &input_prob + (1.0 - &object_mask) * (1.0 - &input_prob);
                let alpha_factor: Tensor =
                    &object_mask * alpha + (1.0 - &object_mask) * (1.0 - alpha);
                let modulating_factor = (-&p_t + 1.0).pow_tensor_scalar(gamma);

                (alpha_factor * modulating_factor * bce(&raw_pred_conf, &object_mask))
                    .sum(Kind::Float)
                    / batch_size
            } else {
                let conf_bce = bce(&raw_pred_conf, &object_mask);
                let conf_loss: Tensor =
                    &object_mask * &conf_bce + (1.0 - &object_mask) * &conf_bce * &ignore_mask;
                conf_loss.sum(Kind::Float) / batch_size
            };

            let class_loss = if self.use_softmax_loss {
                let cross_entropy = -(&true_class
                    * raw_pred_class.log_softmax(-1, Kind::Float))
                .sum_dim_intlist(&[-1], true, Kind::Float);
                (&object_mask * cross_entropy).sum(Kind::Float) / batch_size
            } else {
                (&object_mask * bce(&raw_pred_class, &true_class)).sum(Kind::Float) / batch_size
            };

            Ok((xy_loss, wh_loss, confidence_loss, class_loss))
        }

        /// Marks the background cells whose best IoU against every true box
        /// stays below the ignore threshold. Cells above the threshold are
        /// dropped from the background confidence term.
        fn ignore_mask(
            &self,
            gt: &Tensor,
            object_mask: &Tensor,
            pred_box: &Tensor,
        ) -> Result<Tensor> {
            let (batch_size, grid_h, grid_w, num_anchors, _) = gt.size5()?;
            let device = gt.device();

            tch::no_grad(|| -> Result<Tensor> {
                let object_mask_bool = object_mask.gt(0.5);

                let masks: Vec<Tensor> = (0..batch_size)
                    .map(|batch_index| -> Result<Tensor> {
                        let boxes = gt.i((batch_index, .., .., .., 0..4));
                        let mask = object_mask_bool.i((batch_index, .., .., .., ..));
                        let true_boxes = boxes.masked_select(&mask).view([-1, 4]);

                        if true_boxes.size()[0] == 0 {
                            return Ok(Tensor::ones(
                                &[grid_h, grid_w, num_anchors, 1],
                                (Kind::Float, device),
                            ));
                        }

                        let pred = pred_box.i((batch_index, .., .., .., ..));
                        let iou = box_iou(&pred, &true_boxes);
                        let (best_iou, _indexes) = iou.max_dim(-2, false);
                        Ok(best_iou.lt(self.ignore_thresh.raw()).to_kind(Kind::Float))
                    })
                    .try_collect()?;

                Ok(Tensor::stack(&masks, 0))
            })
        }
    }

    /// Cell offsets `[grid_h, grid_w, 1, 2]` in (x, y) order.
    fn grid_offsets(grid_h: i64, grid_w: i64, device: Device) -> Tensor {
        let grids = Tensor::meshgrid(&[
            Tensor::arange(grid_h, (Kind::Float, device)),
            Tensor::arange(grid_w, (Kind::Float, device)),
        ]);
        Tensor::stack(&[grids[1].shallow_clone(), grids[0].shallow_clone()], 2)
            .view([grid_h, grid_w, 1, 2])
            .set_requires_grad(false)
    }

    /// Pairwise IoU between `pred [h, w, a, 4]` and `truth [n, 4]` boxes in
    /// (cx, cy, w, h) form, returning `[h, w, a, n, 1]`.
    fn box_iou(pred: &Tensor, truth: &Tensor) -> Tensor {
        let pred = pred.unsqueeze(-2);
        let pred_xy = pred.narrow(-1, 0, 2);
        let pred_wh = pred.narrow(-1, 2, 2);
        let pred_mins = &pred_xy - &pred_wh / 2.0;
        let pred_maxes = &pred_xy + &pred_wh / 2.0;

        let true_xy = truth.narrow(-1, 0, 2);
        let true_wh = truth.narrow(-1, 2, 2);
        let true_mins = &true_xy - &true_wh / 2.0;
        let true_maxes = &true_xy + &true_wh / 2.0;

        let intersect_mins = pred_mins.maximum(&true_mins);
        let intersect_maxes = pred_maxes.minimum(&true_maxes);
        let intersect_wh = (intersect_maxes - intersect_mins).clamp_min(0.0);
        let intersect_area = intersect_wh.narrow(-1, 0, 1) * intersect_wh.narrow(-1, 1, 1);

        let pred_area = pred_wh.narrow(-1, 0, 1) * pred_wh.narrow(-1, 1, 1);
        let true_area = true_wh.narrow(-1, 0, 1) * true_wh.narrow(-1, 1, 1);

        &intersect_area / (&pred_area + &true_area - &intersect_area + 1e-9)
    }
}

mod yolo_loss_output {
    use super::*;

    /// The loss total and its four terms, all scalar tensors.
    #[derive(Debug, TensorLike)]
    pub struct YoloLossOutput {
        pub total_loss: Tensor,
        pub xy_loss: Tensor,
        pub wh_loss: Tensor,
        pub confidence_loss: Tensor,
        pub class_loss: Tensor,
    }
}
