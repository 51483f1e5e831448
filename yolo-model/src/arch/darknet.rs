//! Darknet53 and tiny darknet bodies.

use super::{
    table::{self, HeadStyle},
    BodyInit,
};
use crate::body::{BlockInit, BlockKind, BlockRef};

/// Residual stage widths and block repeats of darknet53.
const STAGES: [(usize, usize); 5] = [(64, 1), (128, 2), (256, 8), (512, 8), (1024, 4)];

/// Darknet53 backbone (185 layers) with the 3-scale head.
pub(super) fn full(init: &BodyInit) -> Vec<BlockInit> {
    let blocks = &mut vec![];
    table::input(blocks);

    let mut x = table::conv_bn_leaky(blocks, "conv1", vec![], 32, 3, 1);
    let mut taps: Vec<String> = vec![];

    for (stage, &(out_c, repeats)) in STAGES.iter().enumerate() {
        let stage = stage + 1;
        x = table::conv_bn_leaky(
            blocks,
            &format!("s{}_down", stage),
            table::by_name(&x),
            out_c,
            3,
            2,
        );
        for b in 1..=repeats {
            let shortcut = x.clone();
            let y = table::conv_bn_leaky(
                blocks,
                &format!("s{}_b{}_conv1", stage, b),
                table::by_name(&x),
                out_c / 2,
                1,
                1,
            );
            let y = table::conv_bn_leaky(
                blocks,
                &format!("s{}_b{}_conv2", stage, b),
                table::by_name(&y),
                out_c,
                3,
                1,
            );
            x = table::push(
                blocks,
                &format!("s{}_b{}_add", stage, b),
                vec![BlockRef::Name(shortcut), BlockRef::Name(y)],
                BlockKind::Add,
            );
        }
        taps.push(x.clone());
    }

    // taps[2] = 256 channels at stride 8, taps[3] = 512 at 16, taps[4] = 1024 at 32
    table::yolo3_head(blocks, init, &taps[4], &taps[3], &taps[2], HeadStyle::Regular);
    std::mem::take(blocks)
}

/// Tiny darknet backbone (20 layers) with the 2-scale head.
pub(super) fn tiny(init: &BodyInit) -> Vec<BlockInit> {
    tiny_body(init, HeadStyle::Regular)
}

/// Tiny body with separable convolutions throughout. Layer indexes no longer
/// line up with the pretrained tiny weights, so it trains from scratch.
pub(super) fn tiny_lite(init: &BodyInit) -> Vec<BlockInit> {
    tiny_body(init, HeadStyle::Lite)
}

fn tiny_body(init: &BodyInit, style: HeadStyle) -> Vec<BlockInit> {
    let blocks = &mut vec![];
    table::input(blocks);

    let conv = |blocks: &mut Vec<BlockInit>, name: &str, from, out_c| -> String {
        match style {
            HeadStyle::Regular => table::conv_bn_leaky(blocks, name, from, out_c, 3, 1),
            HeadStyle::Lite => table::separable_bn_leaky(blocks, name, from, out_c, 3),
        }
    };
    let pool = |blocks: &mut Vec<BlockInit>, name: &str, s| {
        table::push(blocks, name, vec![], BlockKind::MaxPool { k: 2, s, same: true })
    };

    // The stem convolution stays dense; a separable stem over three input
    // channels saves nothing.
    table::conv_bn_leaky(blocks, "conv1", vec![], 16, 3, 1);
    pool(blocks, "pool1", 2);
    conv(blocks, "conv2", vec![], 32);
    pool(blocks, "pool2", 2);
    conv(blocks, "conv3", vec![], 64);
    pool(blocks, "pool3", 2);
    conv(blocks, "conv4", vec![], 128);
    pool(blocks, "pool4", 2);
    let f2 = conv(blocks, "conv5", vec![], 256);

    pool(blocks, "pool5", 2);
    conv(blocks, "conv6", vec![], 512);
    pool(blocks, "pool6", 1);
    let f1 = conv(blocks, "conv7", vec![], 1024);

    table::yolo3_tiny_head(blocks, init, &f1, &f2, style);
    std::mem::take(blocks)
}
