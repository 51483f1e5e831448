//! Declarative construction of detection-network bodies.
//!
//! A body is described by an ordered table of [`BlockInit`] entries, one per
//! Keras-granularity layer, and built into a [`ModelBody`] under a var-store
//! path. Layer indexes are stable, so the freeze policy and pretrained
//! backbone-depth constants index real layers.

use crate::{common::*, freeze};

pub use block::*;
pub use model_body::*;

mod block {
    use super::*;

    /// Reference to an earlier table entry.
    #[derive(Debug, Clone)]
    pub enum BlockRef {
        Prev,
        Name(String),
    }

    #[derive(Debug, Clone)]
    pub enum BlockKind {
        Input,
        Conv {
            out_c: usize,
            k: usize,
            s: usize,
            padding: Padding,
            bias: bool,
            activation: Activation,
        },
        DepthwiseConv {
            k: usize,
            s: usize,
            padding: Padding,
        },
        SeparableConv {
            out_c: usize,
            k: usize,
        },
        BatchNorm,
        Activation(Activation),
        ZeroPad {
            top: i64,
            bottom: i64,
            left: i64,
            right: i64,
        },
        MaxPool {
            k: usize,
            s: usize,
            same: bool,
        },
        UpSample {
            scale: usize,
        },
        Add,
        Concat,
    }

    /// One table entry. An empty `from` list wires the entry to the previous
    /// layer; named references must point to earlier entries.
    #[derive(Debug, Clone)]
    pub struct BlockInit {
        pub name: String,
        pub from: Vec<BlockRef>,
        pub kind: BlockKind,
        pub export: bool,
    }

    /// A built block.
    #[derive(Debug)]
    pub enum Block {
        Input,
        Conv(Conv2D),
        DepthwiseConv(DepthwiseConv2D),
        SeparableConv(SeparableConv2D),
        BatchNorm(BatchNorm2D),
        Activation(Activation),
        ZeroPad(ZeroPad2D),
        MaxPool(MaxPool2D),
        UpSample(UpSample2D),
        Add(Sum2D),
        Concat(Concat2D),
    }

    impl Block {
        pub fn forward_t(&self, inputs: &[&Tensor], train: bool) -> Result<Tensor> {
            let single = || -> Result<&Tensor> {
                ensure!(
                    inputs.len() == 1,
                    "block expects exactly one input, got {}",
                    inputs.len()
                );
                Ok(inputs[0])
            };

            let output = match self {
                Self::Input => single()?.shallow_clone(),
                Self::Conv(conv) => conv.forward_t(single()?, train),
                Self::DepthwiseConv(conv) => conv.forward_t(single()?, train),
                Self::SeparableConv(conv) => conv.forward_t(single()?, train),
                Self::BatchNorm(bn) => bn.forward_t(single()?, train),
                Self::Activation(act) => single()?.apply(act),
                Self::ZeroPad(pad) => pad.forward(single()?)?,
                Self::MaxPool(pool) => pool.forward(single()?)?,
                Self::UpSample(up) => up.forward(single()?)?,
                Self::Add(sum) => sum.forward(inputs)?,
                Self::Concat(concat) => concat.forward(inputs)?,
            };
            Ok(output)
        }

        pub fn trainable_variables(&self) -> Vec<Tensor> {
            match self {
                Self::Conv(conv) => conv.trainable_variables(),
                Self::DepthwiseConv(conv) => conv.trainable_variables(),
                Self::SeparableConv(conv) => conv.trainable_variables(),
                Self::BatchNorm(bn) => bn.trainable_variables(),
                _ => vec![],
            }
        }
    }
}

mod model_body {
    use super::*;

    const INPUT_CHANNELS: usize = 3;

    #[derive(Debug, Getters, CopyGetters)]
    pub struct Layer {
        #[getset(get = "pub")]
        pub(crate) name: String,
        pub(crate) block: Block,
        pub(crate) input_indexes: Vec<usize>,
        pub(crate) variables: Vec<Tensor>,
        #[getset(get_copy = "pub")]
        pub(crate) trainable: bool,
    }

    /// An ordered sequence of layers with per-scale exported outputs.
    #[derive(Debug)]
    pub struct ModelBody {
        layers: Vec<Layer>,
        export_indexes: Vec<usize>,
    }

    impl ModelBody {
        pub fn from_table<'p, P>(path: P, table: &[BlockInit]) -> Result<Self>
        where
            P: Borrow<nn::Path<'p>>,
        {
            let path = path.borrow();

            ensure!(
                matches!(table.first(), Some(BlockInit { kind: BlockKind::Input, .. })),
                "the first table entry must be the input layer"
            );

            // name -> index
            let mut name_to_index: HashMap<&str, usize> = HashMap::new();
            for (index, init) in table.iter().enumerate() {
                ensure!(
                    name_to_index.insert(init.name.as_str(), index).is_none(),
                    r#"duplicate layer name "{}""#,
                    init.name
                );
            }

            // resolve wiring and infer channels
            let mut channels: Vec<usize> = Vec::with_capacity(table.len());
            let mut layers: Vec<Layer> = Vec::with_capacity(table.len());
            let mut export_indexes = vec![];

            for (index, init) in table.iter().enumerate() {
                let BlockInit {
                    ref name,
                    ref from,
                    ref kind,
                    export,
                } = *init;

                let input_indexes: Vec<usize> = if let BlockKind::Input = kind {
                    ensure!(index == 0, "only the first entry may be an input layer");
                    vec![]
                } else if from.is_empty() {
                    vec![index - 1]
                } else {
                    from.iter()
                        .map(|block_ref| -> Result<usize> {
                            let src_index = match block_ref {
                                BlockRef::Prev => index - 1,
                                BlockRef::Name(src_name) => *name_to_index
                                    .get(src_name.as_str())
                                    .ok_or_else(|| {
                                        format_err!(r#"undefined layer name "{}""#, src_name)
                                    })?,
                            };
                            ensure!(
                                src_index < index,
                                r#"layer "{}" references a later layer"#,
                                name
                            );
                            Ok(src_index)
                        })
                        .try_collect()?
                };

                let in_c = input_indexes.first().map(|&src| channels[src]);
                let out_c = match *kind {
                    BlockKind::Input => INPUT_CHANNELS,
                    BlockKind::Conv { out_c, .. } | BlockKind::SeparableConv { out_c, .. } => {
                        out_c
                    }
                    BlockKind::Add => {
                        let first = in_c
                            .ok_or_else(|| format_err!(r#"layer "{}" has no input"#, name))?;
                        ensure!(
                            input_indexes.iter().all(|&src| channels[src] == first),
                            r#"add layer "{}" has mismatched input channels"#,
                            name
                        );
                        first
                    }
                    BlockKind::Concat => input_indexes.iter().map(|&src| channels[src]).sum(),
                    _ => in_c.ok_or_else(|| format_err!(r#"layer "{}" has no input"#, name))?,
                };

                let block = Self::build_block(path, name, kind, in_c)?;
                let variables = block.trainable_variables();

                if export {
                    export_indexes.push(index);
                }
                channels.push(out_c);
                layers.push(Layer {
                    name: name.clone(),
                    block,
                    input_indexes,
                    variables,
                    trainable: true,
                });
            }

            ensure!(
                !export_indexes.is_empty(),
                "the table exports no prediction layers"
            );

            Ok(Self {
                layers,
                export_indexes,
            })
        }

        fn build_block(
            path: &nn::Path,
            name: &str,
            kind: &BlockKind,
            in_c: Option<usize>,
        ) -> Result<Block> {
            let in_c = || in_c.ok_or_else(|| format_err!(r#"layer "{}" has no input"#, name));

            let block = match *kind {
                BlockKind::Input => Block::Input,
                BlockKind::Conv {
                    out_c,
                    k,
                    s,
                    padding,
                    bias,
                    activation,
                } => Block::Conv(
                    Conv2DInit {
                        s,
                        padding,
                        bias,
                        activation,
                        ..Conv2DInit::new(in_c()?, out_c, k)
                    }
                    .build(path / name),
                ),
                BlockKind::DepthwiseConv { k, s, padding } => Block::DepthwiseConv(
                    DepthwiseConv2DInit {
                        s,
                        padding,
                        ..DepthwiseConv2DInit::new(in_c()?, k)
                    }
                    .build(path / name),
                ),
                BlockKind::SeparableConv { out_c, k } => Block::SeparableConv(
                    SeparableConv2DInit::new(in_c()?, out_c, k).build(path / name),
                ),
                BlockKind::BatchNorm => Block::BatchNorm(
                    BatchNorm2DInit::default().build(path / name, in_c()?),
                ),
                BlockKind::Activation(activation) => Block::Activation(activation),
                BlockKind::ZeroPad {
                    top,
                    bottom,
                    left,
                    right,
                } => Block::ZeroPad(ZeroPad2D::new(top, bottom, left, right)),
                BlockKind::MaxPool { k, s, same } => Block::MaxPool(MaxPool2D::new(k, s, same)),
                BlockKind::UpSample { scale } => Block::UpSample(UpSample2D::new(scale)),
                BlockKind::Add => Block::Add(Sum2D::new()),
                BlockKind::Concat => Block::Concat(Concat2D::new()),
            };
            Ok(block)
        }

        /// Runs the network and returns one prediction tensor per scale, in
        /// table export order (coarsest scale first).
        pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Vec<Tensor>> {
            let mut outputs: Vec<Tensor> = Vec::with_capacity(self.layers.len());

            for (index, layer) in self.layers.iter().enumerate() {
                let output = if index == 0 {
                    xs.shallow_clone()
                } else {
                    let inputs: Vec<&Tensor> =
                        layer.input_indexes.iter().map(|&src| &outputs[src]).collect();
                    layer
                        .block
                        .forward_t(&inputs, train)
                        .with_context(|| format!(r#"in layer "{}""#, layer.name))?
                };
                outputs.push(output);
            }

            let exported = self
                .export_indexes
                .iter()
                .map(|&index| outputs[index].shallow_clone())
                .collect();
            Ok(exported)
        }

        pub fn num_layers(&self) -> usize {
            self.layers.len()
        }

        pub fn layers(&self) -> &[Layer] {
            &self.layers
        }

        pub fn num_outputs(&self) -> usize {
            self.export_indexes.len()
        }

        pub fn trainable_flags(&self) -> Vec<bool> {
            self.layers.iter().map(|layer| layer.trainable).collect()
        }

        /// Applies a trainability mask in one declarative pass.
        pub fn set_trainability(&mut self, mask: &[bool]) -> Result<()> {
            ensure!(
                mask.len() == self.layers.len(),
                "mask length {} does not match layer count {}",
                mask.len(),
                self.layers.len()
            );

            for (layer, &trainable) in izip!(&mut self.layers, mask) {
                layer.trainable = trainable;
                for var in &layer.variables {
                    let _ = var.set_requires_grad(trainable);
                }
            }
            Ok(())
        }

        /// Computes and applies the trainability mask for a freeze level.
        pub fn freeze(
            &mut self,
            level: freeze::FreezeLevel,
            backbone_depth: usize,
        ) -> Result<()> {
            let mask = freeze::trainability_mask(level, backbone_depth, self.num_layers());
            let frozen = mask.iter().filter(|&&trainable| !trainable).count();
            self.set_trainability(&mask)?;

            if frozen > 0 {
                info!(
                    "freeze the first {} layers of total {} layers",
                    frozen,
                    self.num_layers()
                );
            } else {
                info!("unfreeze all of the {} layers", self.num_layers());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_table() -> Vec<BlockInit> {
        vec![
            BlockInit {
                name: "input".into(),
                from: vec![],
                kind: BlockKind::Input,
                export: false,
            },
            BlockInit {
                name: "conv1".into(),
                from: vec![],
                kind: BlockKind::Conv {
                    out_c: 8,
                    k: 3,
                    s: 1,
                    padding: Padding::Same,
                    bias: false,
                    activation: Activation::Linear,
                },
                export: false,
            },
            BlockInit {
                name: "conv1_bn".into(),
                from: vec![],
                kind: BlockKind::BatchNorm,
                export: false,
            },
            BlockInit {
                name: "conv1_act".into(),
                from: vec![],
                kind: BlockKind::Activation(Activation::Leaky),
                export: false,
            },
            BlockInit {
                name: "shortcut".into(),
                from: vec![BlockRef::Prev, BlockRef::Name("conv1_act".into())],
                kind: BlockKind::Add,
                export: false,
            },
            BlockInit {
                name: "y".into(),
                from: vec![],
                kind: BlockKind::Conv {
                    out_c: 6,
                    k: 1,
                    s: 1,
                    padding: Padding::Same,
                    bias: true,
                    activation: Activation::Linear,
                },
                export: true,
            },
        ]
    }

    #[test]
    fn builds_and_runs_a_table() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let body = ModelBody::from_table(&vs.root(), &simple_table())?;
        assert_eq!(body.num_layers(), 6);
        assert_eq!(body.num_outputs(), 1);

        let xs = Tensor::rand(&[2, 3, 16, 16], (Kind::Float, Device::Cpu));
        let outputs = body.forward_t(&xs, true)?;
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].size(), vec![2, 6, 16, 16]);
        Ok(())
    }

    #[test]
    fn trainability_is_applied_per_layer() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let mut body = ModelBody::from_table(&vs.root(), &simple_table())?;

        let mask = vec![false, false, false, true, true, true];
        body.set_trainability(&mask)?;
        assert_eq!(body.trainable_flags(), mask);

        for (layer, &trainable) in izip!(body.layers(), &mask) {
            for var in &layer.variables {
                assert_eq!(var.requires_grad(), trainable);
            }
        }
        Ok(())
    }

    #[test]
    fn undefined_reference_is_rejected() {
        let vs = nn::VarStore::new(Device::Cpu);
        let mut table = simple_table();
        table[4].from = vec![BlockRef::Name("missing".into())];
        assert!(ModelBody::from_table(&vs.root(), &table).is_err());
    }

    #[test]
    fn table_without_input_is_rejected() {
        let vs = nn::VarStore::new(Device::Cpu);
        let table = simple_table()[1..].to_vec();
        assert!(ModelBody::from_table(&vs.root(), &table).is_err());
    }
}
