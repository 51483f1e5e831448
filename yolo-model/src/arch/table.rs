//! Shared emitters for layer tables.
//!
//! Backbone modules append entries through these helpers so that the layer
//! counts stay at Keras granularity: a fused convolution is one layer, a
//! batch norm is one layer, an activation is one layer.

use super::BodyInit;
use crate::{
    body::{BlockInit, BlockKind, BlockRef},
    common::*,
};

/// Head convolution flavor. `Lite` swaps every 3x3 head convolution for a
/// depthwise-separable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeadStyle {
    Regular,
    Lite,
}

pub(super) fn by_name(name: &str) -> Vec<BlockRef> {
    vec![BlockRef::Name(name.to_owned())]
}

pub(super) fn push(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: Vec<BlockRef>,
    kind: BlockKind,
) -> String {
    blocks.push(BlockInit {
        name: name.to_owned(),
        from,
        kind,
        export: false,
    });
    name.to_owned()
}

pub(super) fn input(blocks: &mut Vec<BlockInit>) {
    push(blocks, "input", vec![], BlockKind::Input);
}

/// Convolution + batch norm + activation, three layers.
pub(super) fn conv_bn_act(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: Vec<BlockRef>,
    out_c: usize,
    k: usize,
    s: usize,
    padding: Padding,
    activation: Activation,
) -> String {
    push(
        blocks,
        name,
        from,
        BlockKind::Conv {
            out_c,
            k,
            s,
            padding,
            bias: false,
            activation: Activation::Linear,
        },
    );
    push(blocks, &format!("{}_bn", name), vec![], BlockKind::BatchNorm);
    push(
        blocks,
        &format!("{}_act", name),
        vec![],
        BlockKind::Activation(activation),
    )
}

/// The darknet convolution block. Strided blocks pad top-left by one and run
/// a valid convolution, which is the darknet downsampling layout.
pub(super) fn conv_bn_leaky(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: Vec<BlockRef>,
    out_c: usize,
    k: usize,
    s: usize,
) -> String {
    let (from, padding) = if s == 2 {
        push(
            blocks,
            &format!("{}_pad", name),
            from,
            BlockKind::ZeroPad {
                top: 1,
                bottom: 0,
                left: 1,
                right: 0,
            },
        );
        (vec![], Padding::Valid)
    } else {
        (from, Padding::Same)
    };
    conv_bn_act(blocks, name, from, out_c, k, s, padding, Activation::Leaky)
}

/// Separable convolution + batch norm + leaky, the lite counterpart of
/// [`conv_bn_leaky`].
pub(super) fn separable_bn_leaky(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: Vec<BlockRef>,
    out_c: usize,
    k: usize,
) -> String {
    push(blocks, name, from, BlockKind::SeparableConv { out_c, k });
    push(blocks, &format!("{}_bn", name), vec![], BlockKind::BatchNorm);
    push(
        blocks,
        &format!("{}_act", name),
        vec![],
        BlockKind::Activation(Activation::Leaky),
    )
}

fn head_conv3(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: Vec<BlockRef>,
    out_c: usize,
    style: HeadStyle,
) -> String {
    match style {
        HeadStyle::Regular => conv_bn_leaky(blocks, name, from, out_c, 3, 1),
        HeadStyle::Lite => separable_bn_leaky(blocks, name, from, out_c, 3),
    }
}

/// The five-convolution bottleneck stack preceding each prediction branch.
fn bottleneck_stack(
    blocks: &mut Vec<BlockInit>,
    prefix: &str,
    from: Vec<BlockRef>,
    c: usize,
    style: HeadStyle,
) -> String {
    let x = conv_bn_leaky(blocks, &format!("{}_conv1", prefix), from, c, 1, 1);
    let x = head_conv3(blocks, &format!("{}_conv2", prefix), by_name(&x), c * 2, style);
    let x = conv_bn_leaky(blocks, &format!("{}_conv3", prefix), by_name(&x), c, 1, 1);
    let x = head_conv3(blocks, &format!("{}_conv4", prefix), by_name(&x), c * 2, style);
    conv_bn_leaky(blocks, &format!("{}_conv5", prefix), by_name(&x), c, 1, 1)
}

/// The per-scale 1x1 prediction convolution, exported from the body.
pub(super) fn output_conv(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: Vec<BlockRef>,
    num_outputs: usize,
) {
    blocks.push(BlockInit {
        name: name.to_owned(),
        from,
        kind: BlockKind::Conv {
            out_c: num_outputs,
            k: 1,
            s: 1,
            padding: Padding::Same,
            bias: true,
            activation: Activation::Linear,
        },
        export: true,
    });
}

/// The 3-scale feature-pyramid head. `f1`, `f2` and `f3` name the backbone
/// taps at strides 32, 16 and 8. The prediction convolutions are appended
/// last, after every shared layer, so the head tail is always the final
/// three table entries.
pub(super) fn yolo3_head(
    blocks: &mut Vec<BlockInit>,
    init: &BodyInit,
    f1: &str,
    f2: &str,
    f3: &str,
    style: HeadStyle,
) {
    let x1 = bottleneck_stack(blocks, "head_s32", by_name(f1), 512, style);
    let t1 = head_conv3(blocks, "head_s32_tail", by_name(&x1), 1024, style);

    let reduce = conv_bn_leaky(blocks, "head_s16_reduce", by_name(&x1), 256, 1, 1);
    let up = push(
        blocks,
        "head_s16_up",
        by_name(&reduce),
        BlockKind::UpSample { scale: 2 },
    );
    let concat = push(
        blocks,
        "head_s16_concat",
        vec![BlockRef::Name(up), BlockRef::Name(f2.to_owned())],
        BlockKind::Concat,
    );
    let x2 = bottleneck_stack(blocks, "head_s16", by_name(&concat), 256, style);
    let t2 = head_conv3(blocks, "head_s16_tail", by_name(&x2), 512, style);

    let reduce = conv_bn_leaky(blocks, "head_s8_reduce", by_name(&x2), 128, 1, 1);
    let up = push(
        blocks,
        "head_s8_up",
        by_name(&reduce),
        BlockKind::UpSample { scale: 2 },
    );
    let concat = push(
        blocks,
        "head_s8_concat",
        vec![BlockRef::Name(up), BlockRef::Name(f3.to_owned())],
        BlockKind::Concat,
    );
    let x3 = bottleneck_stack(blocks, "head_s8", by_name(&concat), 128, style);
    let t3 = head_conv3(blocks, "head_s8_tail", by_name(&x3), 256, style);

    let num_outputs = init.num_outputs();
    output_conv(blocks, "y1", by_name(&t1), num_outputs);
    output_conv(blocks, "y2", by_name(&t2), num_outputs);
    output_conv(blocks, "y3", by_name(&t3), num_outputs);
}

/// The 2-scale head of the tiny networks. `f1` and `f2` name the backbone
/// taps at strides 32 and 16.
pub(super) fn yolo3_tiny_head(
    blocks: &mut Vec<BlockInit>,
    init: &BodyInit,
    f1: &str,
    f2: &str,
    style: HeadStyle,
) {
    let x1 = conv_bn_leaky(blocks, "head_s32_mid", by_name(f1), 256, 1, 1);
    let t1 = head_conv3(blocks, "head_s32_tail", by_name(&x1), 512, style);

    let reduce = conv_bn_leaky(blocks, "head_s16_reduce", by_name(&x1), 128, 1, 1);
    let up = push(
        blocks,
        "head_s16_up",
        by_name(&reduce),
        BlockKind::UpSample { scale: 2 },
    );
    let concat = push(
        blocks,
        "head_s16_concat",
        vec![BlockRef::Name(up), BlockRef::Name(f2.to_owned())],
        BlockKind::Concat,
    );
    let t2 = head_conv3(blocks, "head_s16_tail", by_name(&concat), 256, style);

    let num_outputs = init.num_outputs();
    output_conv(blocks, "y1", by_name(&t1), num_outputs);
    output_conv(blocks, "y2", by_name(&t2), num_outputs);
}
