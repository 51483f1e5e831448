use crate::common::*;

/// Channelwise concatenation of feature maps.
#[derive(Debug)]
pub struct Concat2D {
    _private: [u8; 0],
}

impl Concat2D {
    pub fn new() -> Self {
        Self { _private: [] }
    }

    pub fn forward(&self, tensors: &[&Tensor]) -> Result<Tensor> {
        ensure!(!tensors.is_empty(), "empty input is not allowed");
        tensors
            .iter()
            .try_for_each(|tensor| tensor.size4().map(|_| ()))?;
        let output = Tensor::f_cat(tensors, 1)?;
        Ok(output)
    }
}
