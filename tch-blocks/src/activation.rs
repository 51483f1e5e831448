use crate::common::*;

/// Pointwise activation functions used by the supported backbones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Relu6,
    Leaky,
    Logistic,
}

impl nn::Module for Activation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        use Activation::*;

        match *self {
            Linear => xs.shallow_clone(),
            Relu => xs.relu(),
            Relu6 => xs.clamp(0.0, 6.0),
            Leaky => leaky(xs),
            Logistic => xs.sigmoid(),
        }
    }
}

/// Leaky ReLU with the darknet slope of 0.1.
pub fn leaky(xs: &Tensor) -> Tensor {
    xs.clamp_min(0.0) + xs.clamp_max(0.0) * 0.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::Module as _, Kind};

    #[test]
    fn leaky_slope() {
        let xs = Tensor::of_slice(&[-10.0f32, 0.0, 3.0]);
        let ys = Activation::Leaky.forward(&xs);
        let expect = Tensor::of_slice(&[-1.0f32, 0.0, 3.0]);
        assert!(bool::from(
            (ys - expect).abs().sum(Kind::Float).le(1e-6)
        ));
    }

    #[test]
    fn relu6_clamps() {
        let xs = Tensor::of_slice(&[-1.0f32, 2.0, 9.0]);
        let ys = Activation::Relu6.forward(&xs);
        let expect = Tensor::of_slice(&[0.0f32, 2.0, 6.0]);
        assert!(bool::from(
            (ys - expect).abs().sum(Kind::Float).le(1e-6)
        ));
    }
}
