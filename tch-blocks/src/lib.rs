//! Single-purpose neural network blocks on top of [`tch`].
//!
//! Each block mirrors one Keras-granularity layer: a convolution, a batch
//! normalization, an activation, a padding, a pooling, an upsampling, or a
//! merge. Blocks that carry parameters expose their trainable variables so
//! callers can toggle `requires_grad` per layer.

mod common;

pub use activation::*;
pub use batch_norm_2d::*;
pub use concat_2d::*;
pub use conv_2d::*;
pub use depthwise_conv_2d::*;
pub use max_pool_2d::*;
pub use separable_conv_2d::*;
pub use sum_2d::*;
pub use up_sample_2d::*;
pub use zero_pad_2d::*;

mod activation;
mod batch_norm_2d;
mod concat_2d;
mod conv_2d;
mod depthwise_conv_2d;
mod max_pool_2d;
mod separable_conv_2d;
mod sum_2d;
mod up_sample_2d;
mod zero_pad_2d;
