//! MobileNetV1 bodies.
//!
//! The 87-layer backbone counts one layer per Keras layer: the padded stem
//! is 4 layers plus its pad, and each depthwise-separable block is 6 layers
//! (depthwise conv, bn, relu6, pointwise conv, bn, relu6), with an extra
//! zero pad in front of the four strided blocks.

use super::{
    table::{self, HeadStyle},
    BodyInit,
};
use crate::{
    body::{BlockInit, BlockKind},
    common::*,
};

/// Pointwise output widths of the 13 depthwise-separable blocks.
const BLOCK_WIDTHS: [usize; 13] = [
    64, 128, 128, 256, 256, 512, 512, 512, 512, 512, 512, 1024, 1024,
];

/// Blocks whose depthwise convolution runs at stride 2.
const STRIDED_BLOCKS: [usize; 4] = [2, 4, 6, 12];

pub(super) fn full(init: &BodyInit) -> Vec<BlockInit> {
    body(init, HeadStyle::Regular, false)
}

pub(super) fn full_lite(init: &BodyInit) -> Vec<BlockInit> {
    body(init, HeadStyle::Lite, false)
}

pub(super) fn tiny(init: &BodyInit) -> Vec<BlockInit> {
    body(init, HeadStyle::Regular, true)
}

pub(super) fn tiny_lite(init: &BodyInit) -> Vec<BlockInit> {
    body(init, HeadStyle::Lite, true)
}

fn body(init: &BodyInit, style: HeadStyle, tiny: bool) -> Vec<BlockInit> {
    let blocks = &mut vec![];
    let (f1, f2, f3) = backbone(blocks);
    if tiny {
        table::yolo3_tiny_head(blocks, init, &f1, &f2, style);
    } else {
        table::yolo3_head(blocks, init, &f1, &f2, &f3, style);
    }
    std::mem::take(blocks)
}

/// Appends the 87-layer backbone and returns the tap names at strides 32, 16
/// and 8.
fn backbone(blocks: &mut Vec<BlockInit>) -> (String, String, String) {
    table::input(blocks);

    // padded stride-2 stem
    table::push(
        blocks,
        "conv1_pad",
        vec![],
        BlockKind::ZeroPad {
            top: 0,
            bottom: 1,
            left: 0,
            right: 1,
        },
    );
    table::conv_bn_act(
        blocks,
        "conv1",
        vec![],
        32,
        3,
        2,
        Padding::Valid,
        Activation::Relu6,
    );

    let mut taps: HashMap<usize, String> = HashMap::new();

    for (index, &out_c) in BLOCK_WIDTHS.iter().enumerate() {
        let block = index + 1;
        let strided = STRIDED_BLOCKS.contains(&block);

        if strided {
            table::push(
                blocks,
                &format!("conv_pad_{}", block),
                vec![],
                BlockKind::ZeroPad {
                    top: 0,
                    bottom: 1,
                    left: 0,
                    right: 1,
                },
            );
        }
        table::push(
            blocks,
            &format!("conv_dw_{}", block),
            vec![],
            BlockKind::DepthwiseConv {
                k: 3,
                s: if strided { 2 } else { 1 },
                padding: if strided { Padding::Valid } else { Padding::Same },
            },
        );
        table::push(
            blocks,
            &format!("conv_dw_{}_bn", block),
            vec![],
            BlockKind::BatchNorm,
        );
        table::push(
            blocks,
            &format!("conv_dw_{}_relu", block),
            vec![],
            BlockKind::Activation(Activation::Relu6),
        );
        table::push(
            blocks,
            &format!("conv_pw_{}", block),
            vec![],
            BlockKind::Conv {
                out_c,
                k: 1,
                s: 1,
                padding: Padding::Same,
                bias: false,
                activation: Activation::Linear,
            },
        );
        table::push(
            blocks,
            &format!("conv_pw_{}_bn", block),
            vec![],
            BlockKind::BatchNorm,
        );
        let relu = table::push(
            blocks,
            &format!("conv_pw_{}_relu", block),
            vec![],
            BlockKind::Activation(Activation::Relu6),
        );
        taps.insert(block, relu);
    }

    // 256 channels at stride 8, 512 at 16, 1024 at 32
    (taps[&13].clone(), taps[&11].clone(), taps[&5].clone())
}
