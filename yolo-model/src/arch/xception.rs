//! Xception bodies.
//!
//! The 132-layer backbone follows the Keras Xception layer list: an unpadded
//! two-convolution stem, three downsampling separable blocks with projection
//! shortcuts, eight identity middle blocks at 728 channels, a final
//! downsampling block to 1024 channels and the 1536/2048 exit separables.

use super::{
    table::{self, HeadStyle},
    BodyInit,
};
use crate::{
    body::{BlockInit, BlockKind, BlockRef},
    common::*,
};

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

fn sepconv(blocks: &mut Vec<BlockInit>, name: &str, from: Vec<BlockRef>, out_c: usize) -> String {
    table::push(blocks, name, from, BlockKind::SeparableConv { out_c, k: 3 });
    table::push(blocks, &format!("{}_bn", name), vec![], BlockKind::BatchNorm)
}

fn relu(blocks: &mut Vec<BlockInit>, name: &str, from: Vec<BlockRef>) -> String {
    table::push(blocks, name, from, BlockKind::Activation(Activation::Relu))
}

/// A downsampling block: two separable convolutions and a strided pool, with
/// a strided 1x1 projection shortcut. `pre_act` is false only for block 2,
/// whose input is already activated.
fn down_block(
    blocks: &mut Vec<BlockInit>,
    name: &str,
    from: String,
    out_c: usize,
    pre_act: bool,
) -> String {
    let mut x = from.clone();
    if pre_act {
        x = relu(blocks, &format!("{}_pre_act", name), table::by_name(&x));
    }
    let x = sepconv(blocks, &format!("{}_sepconv1", name), table::by_name(&x), out_c);
    let x = relu(blocks, &format!("{}_sepconv2_act", name), table::by_name(&x));
    let x = sepconv(blocks, &format!("{}_sepconv2", name), table::by_name(&x), out_c);
    let pool = table::push(
        blocks,
        &format!("{}_pool", name),
        table::by_name(&x),
        BlockKind::MaxPool {
            k: 3,
            s: 2,
            same: true,
        },
    );

    table::push(
        blocks,
        &format!("{}_res_conv", name),
        table::by_name(&from),
        BlockKind::Conv {
            out_c,
            k: 1,
            s: 2,
            padding: Padding::Same,
            bias: false,
            activation: Activation::Linear,
        },
    );
    let res = table::push(
        blocks,
        &format!("{}_res_bn", name),
        vec![],
        BlockKind::BatchNorm,
    );

    table::push(
        blocks,
        &format!("{}_add", name),
        vec![BlockRef::Name(pool), BlockRef::Name(res)],
        BlockKind::Add,
    )
}

/// An identity middle block: three pre-activated separable convolutions at
/// 728 channels.
fn middle_block(blocks: &mut Vec<BlockInit>, name: &str, from: String) -> String {
    let mut x = from.clone();
    for conv in 1..=3 {
        x = relu(
            blocks,
            &format!("{}_sepconv{}_act", name, conv),
            table::by_name(&x),
        );
        x = sepconv(blocks, &format!("{}_sepconv{}", name, conv), table::by_name(&x), 728);
    }
    table::push(
        blocks,
        &format!("{}_add", name),
        vec![BlockRef::Name(from), BlockRef::Name(x)],
        BlockKind::Add,
    )
}

/// Appends the 132-layer backbone and returns the tap names at strides 32,
/// 16 and 8.
fn backbone(blocks: &mut Vec<BlockInit>) -> (String, String, String) {
    table::input(blocks);

    // unpadded stem
    table::conv_bn_act(
        blocks,
        "block1_conv1",
        vec![],
        32,
        3,
        2,
        Padding::Valid,
        Activation::Relu,
    );
    let stem = table::conv_bn_act(
        blocks,
        "block1_conv2",
        vec![],
        64,
        3,
        1,
        Padding::Valid,
        Activation::Relu,
    );

    let x = down_block(blocks, "block2", stem, 128, false);
    let f3 = down_block(blocks, "block3", x, 256, true);
    let mut x = down_block(blocks, "block4", f3.clone(), 728, true);

    for block in 5..=12 {
        x = middle_block(blocks, &format!("block{}", block), x);
    }
    let f2 = x;

    let x = down_block13(blocks, f2.clone());

    // exit separables
    let x = sepconv(blocks, "block14_sepconv1", table::by_name(&x), 1536);
    let x = relu(blocks, "block14_sepconv1_act", table::by_name(&x));
    let x = sepconv(blocks, "block14_sepconv2", table::by_name(&x), 2048);
    let f1 = relu(blocks, "block14_sepconv2_act", table::by_name(&x));

    (f1, f2, f3)
}

/// Block 13 widens mid-block, so it cannot reuse [`down_block`].
fn down_block13(blocks: &mut Vec<BlockInit>, from: String) -> String {
    let x = relu(blocks, "block13_pre_act", table::by_name(&from));
    let x = sepconv(blocks, "block13_sepconv1", table::by_name(&x), 728);
    let x = relu(blocks, "block13_sepconv2_act", table::by_name(&x));
    let x = sepconv(blocks, "block13_sepconv2", table::by_name(&x), 1024);
    let pool = table::push(
        blocks,
        "block13_pool",
        table::by_name(&x),
        BlockKind::MaxPool {
            k: 3,
            s: 2,
            same: true,
        },
    );

    table::push(
        blocks,
        "block13_res_conv",
        table::by_name(&from),
        BlockKind::Conv {
            out_c: 1024,
            k: 1,
            s: 2,
            padding: Padding::Same,
            bias: false,
            activation: Activation::Linear,
        },
    );
    let res = table::push(blocks, "block13_res_bn", vec![], BlockKind::BatchNorm);

    table::push(
        blocks,
        "block13_add",
        vec![BlockRef::Name(pool), BlockRef::Name(res)],
        BlockKind::Add,
    )
}
