use crate::common::*;

#[derive(Debug, Clone)]
pub struct BatchNorm2DInit {
    pub eps: f64,
    pub momentum: f64,
}

impl Default for BatchNorm2DInit {
    fn default() -> Self {
        Self {
            eps: 1e-3,
            momentum: 0.03,
        }
    }
}

impl BatchNorm2DInit {
    pub fn build<'p, P>(self, path: P, out_c: usize) -> BatchNorm2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { eps, momentum } = self;

        let bn = nn::batch_norm2d(
            path,
            out_c as i64,
            nn::BatchNormConfig {
                eps,
                momentum,
                ..Default::default()
            },
        );

        BatchNorm2D { bn }
    }
}

#[derive(Debug)]
pub struct BatchNorm2D {
    bn: nn::BatchNorm,
}

impl nn::ModuleT for BatchNorm2D {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs.apply_t(&self.bn, train)
    }
}

impl BatchNorm2D {
    /// Scale and shift only; running statistics are never gradient-updated.
    pub fn trainable_variables(&self) -> Vec<Tensor> {
        let nn::BatchNorm { ref ws, ref bs, .. } = self.bn;
        vec![ws.shallow_clone(), bs.shallow_clone()]
    }
}
