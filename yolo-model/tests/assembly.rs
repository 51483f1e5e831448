use anyhow::Result;
use noisy_float::prelude::*;
use tch::{Device, Kind, Tensor};
use yolo_model::{
    training::METRIC_NAMES, Backbone, FreezeLevel, ScaleMode, TrainingModel, TrainingModelInit,
};

fn full_anchors() -> Vec<(R64, R64)> {
    [
        (10.0, 13.0),
        (16.0, 30.0),
        (33.0, 23.0),
        (30.0, 61.0),
        (62.0, 45.0),
        (59.0, 119.0),
        (116.0, 90.0),
        (156.0, 198.0),
        (373.0, 326.0),
    ]
    .iter()
    .map(|&(w, h)| (r64(w), r64(h)))
    .collect()
}

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
fn darknet_full_assembly() -> Result<()> {
    let model: TrainingModel =
        TrainingModelInit::new(Backbone::Darknet, (416, 416), full_anchors(), 20)
            .build(Device::Cpu)?;

    assert_eq!(model.mode(), ScaleMode::Full);
    assert_eq!(model.backbone_depth(), 185);
    assert_eq!(
        model.ground_truth_shapes(),
        &vec![[13, 13, 3, 25], [26, 26, 3, 25], [52, 52, 3, 25]]
    );

    // default freeze level keeps the 185 backbone layers out of training
    let flags = model.body().trainable_flags();
    assert!(flags[..185].iter().all(|&trainable| !trainable));
    assert!(flags[185..].iter().all(|&trainable| trainable));

    let images = Tensor::rand(&[1, 3, 416, 416], (Kind::Float, Device::Cpu));
    let predictions = model.forward_t(&images, false)?;
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0].size(), vec![1, 75, 13, 13]);
    assert_eq!(predictions[1].size(), vec![1, 75, 26, 26]);
    assert_eq!(predictions[2].size(), vec![1, 75, 52, 52]);
    Ok(())
}

#[test]
fn six_anchors_select_the_tiny_network() -> Result<()> {
    let model = TrainingModelInit::new(Backbone::Darknet, (416, 416), tiny_anchors(), 20)
        .build(Device::Cpu)?;

    assert_eq!(model.mode(), ScaleMode::Tiny);
    assert_eq!(model.backbone_depth(), 20);
    assert_eq!(
        model.ground_truth_shapes(),
        &vec![[13, 13, 3, 25], [26, 26, 3, 25]]
    );
    Ok(())
}

#[test]
fn freeze_all_but_head_leaves_three_layers() -> Result<()> {
    let init = TrainingModelInit {
        freeze_level: FreezeLevel::FreezeAllButHead,
        ..TrainingModelInit::new(Backbone::DarknetLite, (416, 416), tiny_anchors(), 20)
    };
    let model = init.build(Device::Cpu)?;

    let flags = model.body().trainable_flags();
    let trainable = flags.iter().filter(|&&trainable| trainable).count();
    assert_eq!(trainable, 3);
    assert!(flags[flags.len() - 3..].iter().all(|&trainable| trainable));
    Ok(())
}

#[test]
fn unsupported_combination_is_rejected() {
    let result = TrainingModelInit::new(Backbone::DarknetLite, (416, 416), full_anchors(), 20)
        .build(Device::Cpu);
    assert!(result.is_err());
}

#[test]
fn train_step_updates_metrics() -> Result<()> {
    let mut model =
        TrainingModelInit::new(Backbone::DarknetLite, (320, 320), tiny_anchors(), 4)
            .build(Device::Cpu)?;

    let images = Tensor::rand(&[2, 3, 320, 320], (Kind::Float, Device::Cpu));
    let ground_truth = model.zero_ground_truth(2);
    let output = model.train_step(&images, &ground_truth)?;

    // empty ground truth leaves only the background confidence term
    assert!(f64::from(&output.confidence_loss) > 0.0);
    assert!(f64::from(&output.total_loss).is_finite());

    for &name in METRIC_NAMES.iter() {
        assert!(model.metrics().contains_key(name), "missing metric {}", name);
    }
    assert!(model.metrics()["confidence_loss"] > 0.0);
    Ok(())
}

#[test]
fn every_backbone_builds_its_tiny_network() -> Result<()> {
    for backbone in [
        Backbone::DarknetLite,
        Backbone::Mobilenet,
        Backbone::MobilenetLite,
        Backbone::Vgg16,
    ] {
        let model = TrainingModelInit::new(backbone, (320, 320), tiny_anchors(), 4)
            .build(Device::Cpu)?;
        let images = Tensor::rand(&[1, 3, 320, 320], (Kind::Float, Device::Cpu));
        let predictions = model.forward_t(&images, false)?;
        assert_eq!(predictions.len(), 2, "{}", backbone);
        assert_eq!(predictions[0].size(), vec![1, 27, 10, 10], "{}", backbone);
        assert_eq!(predictions[1].size(), vec![1, 27, 20, 20], "{}", backbone);
    }
    Ok(())
}
