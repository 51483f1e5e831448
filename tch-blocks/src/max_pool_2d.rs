use crate::common::*;

/// A 2D max pooling supporting the Keras `same` policy.
///
/// `same` pooling replication-pads the borders before a valid pool. For a max
/// window that covers at least one real element this is equivalent to the
/// TensorFlow negative-infinity padding.
#[derive(Debug, Clone)]
pub struct MaxPool2D {
    k: i64,
    s: i64,
    same: bool,
}

impl MaxPool2D {
    pub fn new(k: usize, s: usize, same: bool) -> Self {
        Self {
            k: k as i64,
            s: s as i64,
            same,
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let Self { k, s, same } = *self;
        let (_b, _c, h, w) = xs.size4()?;

        let xs = if same {
            let (top, bottom) = same_padding(h, k, s);
            let (left, right) = same_padding(w, k, s);
            if top + bottom + left + right > 0 {
                xs.replication_pad2d(&[left, right, top, bottom])
            } else {
                xs.shallow_clone()
            }
        } else {
            xs.shallow_clone()
        };

        Ok(xs.max_pool2d(&[k, k], &[s, s], &[0, 0], &[1, 1], false))
    }
}

fn same_padding(size: i64, k: i64, s: i64) -> (i64, i64) {
    let out = (size + s - 1) / s;
    let total = ((out - 1) * s + k - size).max(0);
    (total / 2, total - total / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn same_pooling_keeps_ceil_sizes() -> Result<()> {
        let xs = Tensor::rand(&[1, 3, 207, 207], (Kind::Float, Device::Cpu));
        let out = MaxPool2D::new(3, 2, true).forward(&xs)?;
        assert_eq!(out.size(), vec![1, 3, 104, 104]);

        let xs = Tensor::rand(&[1, 3, 13, 13], (Kind::Float, Device::Cpu));
        let out = MaxPool2D::new(2, 1, true).forward(&xs)?;
        assert_eq!(out.size(), vec![1, 3, 13, 13]);
        Ok(())
    }
}
