use crate::{common::*, conv_2d::Padding};

#[derive(Debug, Clone)]
pub struct DepthwiseConv2DInit {
    pub in_c: usize,
    pub k: usize,
    pub s: usize,
    pub padding: Padding,
    pub bias: bool,
}

impl DepthwiseConv2DInit {
    pub fn new(in_c: usize, k: usize) -> Self {
        Self {
            in_c,
            k,
            s: 1,
            padding: Padding::Same,
            bias: false,
        }
    }

    pub fn build<'p, P>(self, path: P) -> DepthwiseConv2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            in_c,
            k,
            s,
            padding,
            bias,
        } = self;

        let conv = nn::conv2d(
            path,
            in_c as i64,
            in_c as i64,
            k as i64,
            nn::ConvConfig {
                stride: s as i64,
                padding: padding.amount(k),
                groups: in_c as i64,
                bias,
                ..Default::default()
            },
        );

        DepthwiseConv2D { conv }
    }
}

/// A depthwise 2D convolution with channel multiplier 1.
#[derive(Debug)]
pub struct DepthwiseConv2D {
    conv: nn::Conv2D,
}

impl nn::ModuleT for DepthwiseConv2D {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        xs.apply(&self.conv)
    }
}

impl DepthwiseConv2D {
    pub fn trainable_variables(&self) -> Vec<Tensor> {
        let nn::Conv2D { ref ws, ref bs, .. } = self.conv;
        let mut vars = vec![ws.shallow_clone()];
        if let Some(bs) = bs {
            vars.push(bs.shallow_clone());
        }
        vars
    }
}
