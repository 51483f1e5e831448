use crate::common::*;

/// Elementwise sum of same-shaped feature maps (residual shortcut).
#[derive(Debug)]
pub struct Sum2D {
    _private: [u8; 0],
}

impl Sum2D {
    pub fn new() -> Self {
        Self { _private: [] }
    }

    pub fn forward(&self, tensors: &[&Tensor]) -> Result<Tensor> {
        let mut iter = tensors.iter();
        let first = iter
            .next()
            .ok_or_else(|| format_err!("empty input is not allowed"))?;
        first.size4()?;
        let output = iter.try_fold(first.shallow_clone(), |acc, tensor| -> Result<_> {
            tensor.size4()?;
            Ok(acc.f_add(tensor)?)
        })?;
        Ok(output)
    }
}
