//! VGG16 bodies.
//!
//! The 19-layer backbone counts fused conv+relu layers and poolings only,
//! matching the Keras `VGG16(include_top=False)` layer list minus the input.

use super::{
    table::{self, HeadStyle},
    BodyInit,
};
use crate::{
    body::{BlockInit, BlockKind},
    common::*,
};

/// (convolutions, width) per block.
const STAGES: [(usize, usize); 5] = [(2, 64), (2, 128), (3, 256), (3, 512), (3, 512)];

pub(super) fn full(init: &BodyInit) -> Vec<BlockInit> {
    let blocks = &mut vec![];
    let (f1, f2, f3) = backbone(blocks);
    table::yolo3_head(blocks, init, &f1, &f2, &f3, HeadStyle::Regular);
    std::mem::take(blocks)
}

pub(super) fn tiny(init: &BodyInit) -> Vec<BlockInit> {
    let blocks = &mut vec![];
    let (f1, f2, _f3) = backbone(blocks);
    table::yolo3_tiny_head(blocks, init, &f1, &f2, HeadStyle::Regular);
    std::mem::take(blocks)
}

fn backbone(blocks: &mut Vec<BlockInit>) -> (String, String, String) {
    table::input(blocks);

    let mut pools: Vec<String> = vec![];
    for (stage, &(convs, out_c)) in STAGES.iter().enumerate() {
        let stage = stage + 1;
        for conv in 1..=convs {
            table::push(
                blocks,
                &format!("block{}_conv{}", stage, conv),
                vec![],
                BlockKind::Conv {
                    out_c,
                    k: 3,
                    s: 1,
                    padding: Padding::Same,
                    bias: true,
                    activation: Activation::Relu,
                },
            );
        }
        let pool = table::push(
            blocks,
            &format!("block{}_pool", stage),
            vec![],
            BlockKind::MaxPool {
                k: 2,
                s: 2,
                same: true,
            },
        );
        pools.push(pool);
    }

    // 512 channels at stride 32, 512 at 16, 256 at 8
    (pools[4].clone(), pools[3].clone(), pools[2].clone())
}
