pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use getset::{CopyGetters, Getters};
pub use indexmap::IndexMap;
pub use itertools::{izip, Itertools as _};
pub use log::{info, warn};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::HashMap,
    convert::TryFrom,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
pub use tch::{
    nn::{self, ModuleT as _, OptimizerConfig as _},
    Device, IndexOp, Kind, Reduction, Tensor,
};
pub use tch_blocks::{
    Activation, BatchNorm2D, BatchNorm2DInit, Concat2D, Conv2D, Conv2DInit, DepthwiseConv2D,
    DepthwiseConv2DInit, MaxPool2D, Padding, SeparableConv2D, SeparableConv2DInit, Sum2D,
    UpSample2D, ZeroPad2D,
};
pub use tch_tensor_like::TensorLike;
