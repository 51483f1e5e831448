use crate::common::*;

/// Zero padding on the spatial dimensions, Keras `ZeroPadding2D` layout.
#[derive(Debug, Clone)]
pub struct ZeroPad2D {
    pub top: i64,
    pub bottom: i64,
    pub left: i64,
    pub right: i64,
}

impl ZeroPad2D {
    pub fn new(top: i64, bottom: i64, left: i64, right: i64) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let Self {
            top,
            bottom,
            left,
            right,
        } = *self;
        xs.size4()?;
        Ok(xs.constant_pad_nd(&[left, right, top, bottom]))
    }
}
