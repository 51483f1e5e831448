use crate::{common::*, conv_2d::Padding};

#[derive(Debug, Clone)]
pub struct SeparableConv2DInit {
    pub in_c: usize,
    pub out_c: usize,
    pub k: usize,
    pub s: usize,
    pub padding: Padding,
    pub bias: bool,
}

impl SeparableConv2DInit {
    pub fn new(in_c: usize, out_c: usize, k: usize) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            padding: Padding::Same,
            bias: false,
        }
    }

    pub fn build<'p, P>(self, path: P) -> SeparableConv2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            in_c,
            out_c,
            k,
            s,
            padding,
            bias,
        } = self;

        let depthwise = nn::conv2d(
            path / "depthwise",
            in_c as i64,
            in_c as i64,
            k as i64,
            nn::ConvConfig {
                stride: s as i64,
                padding: padding.amount(k),
                groups: in_c as i64,
                bias: false,
                ..Default::default()
            },
        );
        let pointwise = nn::conv2d(
            path / "pointwise",
            in_c as i64,
            out_c as i64,
            1,
            nn::ConvConfig {
                bias,
                ..Default::default()
            },
        );

        SeparableConv2D {
            depthwise,
            pointwise,
        }
    }
}

/// A depthwise-separable 2D convolution, one layer in the Keras counting.
#[derive(Debug)]
pub struct SeparableConv2D {
    depthwise: nn::Conv2D,
    pointwise: nn::Conv2D,
}

impl nn::ModuleT for SeparableConv2D {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        xs.apply(&self.depthwise).apply(&self.pointwise)
    }
}

impl SeparableConv2D {
    pub fn trainable_variables(&self) -> Vec<Tensor> {
        [&self.depthwise, &self.pointwise]
            .iter()
            .flat_map(|conv| {
                let nn::Conv2D { ref ws, ref bs, .. } = **conv;
                let mut vars = vec![ws.shallow_clone()];
                if let Some(bs) = bs {
                    vars.push(bs.shallow_clone());
                }
                vars
            })
            .collect()
    }
}
