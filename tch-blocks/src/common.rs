pub use anyhow::{ensure, format_err, Result};
pub use itertools::Itertools as _;
pub use serde::{Deserialize, Serialize};
pub use std::borrow::Borrow;
pub use tch::{nn, Tensor};
