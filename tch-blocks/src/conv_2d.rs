use crate::{activation::Activation, common::*};

/// Keras-style spatial padding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Same,
    Valid,
}

impl Padding {
    pub fn amount(&self, k: usize) -> i64 {
        match self {
            Self::Same => ((k - 1) / 2) as i64,
            Self::Valid => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conv2DInit {
    pub in_c: usize,
    pub out_c: usize,
    pub k: usize,
    pub s: usize,
    pub padding: Padding,
    pub bias: bool,
    pub activation: Activation,
}

impl Conv2DInit {
    pub fn new(in_c: usize, out_c: usize, k: usize) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            padding: Padding::Same,
            bias: true,
            activation: Activation::Linear,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Conv2D
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
            activation,
        } = self;

        let conv = nn::conv2d(
            path,
            in_c as i64,
            out_c as i64,
            k as i64,
            nn::ConvConfig {
                stride: s as i64,
                padding: padding.amount(k),
                bias,
                ..Default::default()
            },
        );

        Conv2D { conv, activation }
    }
}

/// A 2D convolution with an optionally fused activation, matching the Keras
/// `Conv2D(..., activation=...)` layer granularity.
#[derive(Debug)]
pub struct Conv2D {
    conv: nn::Conv2D,
    activation: Activation,
}

impl nn::ModuleT for Conv2D {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        let Self {
            ref conv,
            activation,
        } = *self;
        xs.apply(conv).apply(&activation)
    }
}

impl Conv2D {
    pub fn trainable_variables(&self) -> Vec<Tensor> {
        let nn::Conv2D { ref ws, ref bs, .. } = self.conv;
        let mut vars = vec![ws.shallow_clone()];
        if let Some(bs) = bs {
            vars.push(bs.shallow_clone());
        }
        vars
    }
}
