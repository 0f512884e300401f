//! Wengert-list tape
//!
//! Every operation evaluates eagerly and appends one node holding its value.
//! Nodes are only ever appended, so creation order is a topological order
//! and the backward sweep can walk node ids downwards.

use super::kernels::{self, ConvGeometry};
use crate::tensor::Tensor;

/// Handle to a node on a [`Tape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        NodeId(index)
    }
}

/// Operation that produced a node.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    Leaf,
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    Affine {
        input: NodeId,
        scale: f64,
        shift: f64,
    },
    Exp(NodeId),
    Sigmoid(NodeId),
    Reshape(NodeId),
    SumAll(NodeId),
    BroadcastScalar(NodeId),
    RowSum(NodeId),
    RowBroadcast(NodeId),
    RowLogSumExp(NodeId),
    ChannelSum(NodeId),
    ChannelBroadcast(NodeId),
    MatMul(NodeId, NodeId),
    Transpose(NodeId),
    Conv2d {
        input: NodeId,
        weight: NodeId,
        geometry: ConvGeometry,
    },
    Conv2dInputGrad {
        grad_output: NodeId,
        weight: NodeId,
        geometry: ConvGeometry,
    },
    Conv2dWeightGrad {
        input: NodeId,
        grad_output: NodeId,
        geometry: ConvGeometry,
    },
}

impl Op {
    pub(crate) fn inputs(&self) -> Vec<NodeId> {
        match *self {
            Op::Leaf => Vec::new(),
            Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::MatMul(a, b) => vec![a, b],
            Op::Affine { input, .. } => vec![input],
            Op::Exp(x)
            | Op::Sigmoid(x)
            | Op::Reshape(x)
            | Op::SumAll(x)
            | Op::BroadcastScalar(x)
            | Op::RowSum(x)
            | Op::RowBroadcast(x)
            | Op::RowLogSumExp(x)
            | Op::ChannelSum(x)
            | Op::ChannelBroadcast(x)
            | Op::Transpose(x) => vec![x],
            Op::Conv2d { input, weight, .. } => vec![input, weight],
            Op::Conv2dInputGrad {
                grad_output,
                weight,
                ..
            } => vec![grad_output, weight],
            Op::Conv2dWeightGrad {
                input, grad_output, ..
            } => vec![input, grad_output],
        }
    }
}

pub(crate) struct Node {
    pub(crate) op: Op,
    pub(crate) value: Tensor,
    pub(crate) requires_grad: bool,
}

/// Recording of a computation for reverse-mode differentiation.
///
/// Gradients computed with [`grad`](super::grad) are recorded on the same
/// tape, so they can be differentiated again.
#[derive(Default)]
pub struct Tape {
    pub(crate) nodes: Vec<Node>,
}

impl Tape {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, op: Op, value: Tensor) -> NodeId {
        let requires_grad = op
            .inputs()
            .iter()
            .any(|input| self.nodes[input.0].requires_grad);
        self.push_with(op, value, requires_grad)
    }

    fn push_with(&mut self, op: Op, value: Tensor, requires_grad: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            op,
            value,
            requires_grad,
        });
        id
    }

    // ----- Leaves -----

    /// Leaf that gradients flow into.
    pub fn variable(&mut self, value: Tensor) -> NodeId {
        self.push_with(Op::Leaf, value, true)
    }

    /// Leaf treated as a constant.
    pub fn constant(&mut self, value: Tensor) -> NodeId {
        self.push_with(Op::Leaf, value, false)
    }

    // ----- Accessors -----

    pub fn value(&self, id: NodeId) -> &Tensor {
        &self.nodes[id.0].value
    }

    pub fn shape(&self, id: NodeId) -> &[usize] {
        self.nodes[id.0].value.shape()
    }

    /// Whether any variable leaf reaches this node.
    pub fn requires_grad(&self, id: NodeId) -> bool {
        self.nodes[id.0].requires_grad
    }

    fn data(&self, id: NodeId) -> &[f64] {
        self.nodes[id.0].value.data()
    }

    fn same_shape(&self, a: NodeId, b: NodeId, op: &str) -> Vec<usize> {
        assert_eq!(
            self.shape(a),
            self.shape(b),
            "{} operands must have the same shape",
            op
        );
        self.shape(a).to_vec()
    }

    fn map(&mut self, op: Op, x: NodeId, f: impl Fn(f64) -> f64) -> NodeId {
        let shape = self.shape(x).to_vec();
        let data = self.data(x).iter().map(|&v| f(v)).collect();
        self.push(op, Tensor::new(shape, data))
    }

    fn zip(&mut self, op: Op, a: NodeId, b: NodeId, name: &str, f: impl Fn(f64, f64) -> f64) -> NodeId {
        let shape = self.same_shape(a, b, name);
        let data = self
            .data(a)
            .iter()
            .zip(self.data(b))
            .map(|(&p, &q)| f(p, q))
            .collect();
        self.push(op, Tensor::new(shape, data))
    }

    // ----- Elementwise -----

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.zip(Op::Add(a, b), a, b, "add", |p, q| p + q)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.zip(Op::Sub(a, b), a, b, "sub", |p, q| p - q)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.zip(Op::Mul(a, b), a, b, "mul", |p, q| p * q)
    }

    /// `scale * x + shift`, elementwise.
    pub fn affine(&mut self, x: NodeId, scale: f64, shift: f64) -> NodeId {
        let op = Op::Affine {
            input: x,
            scale,
            shift,
        };
        self.map(op, x, |v| scale * v + shift)
    }

    pub fn scale(&mut self, x: NodeId, factor: f64) -> NodeId {
        self.affine(x, factor, 0.0)
    }

    pub fn exp(&mut self, x: NodeId) -> NodeId {
        self.map(Op::Exp(x), x, f64::exp)
    }

    pub fn sigmoid(&mut self, x: NodeId) -> NodeId {
        self.map(Op::Sigmoid(x), x, |v| 1.0 / (1.0 + (-v).exp()))
    }

    pub fn square(&mut self, x: NodeId) -> NodeId {
        self.mul(x, x)
    }

    // ----- Shape and reductions -----

    pub fn reshape(&mut self, x: NodeId, shape: Vec<usize>) -> NodeId {
        let value = self.value(x).clone().reshape(shape);
        self.push(Op::Reshape(x), value)
    }

    /// Sum of all elements, shape `[1]`.
    pub fn sum_all(&mut self, x: NodeId) -> NodeId {
        let total = self.data(x).iter().sum();
        self.push(Op::SumAll(x), Tensor::scalar(total))
    }

    /// Expand a single-element tensor to `shape`.
    pub fn broadcast_scalar(&mut self, x: NodeId, shape: Vec<usize>) -> NodeId {
        assert_eq!(self.value(x).numel(), 1, "broadcast_scalar needs one element");
        let value = Tensor::filled(shape, self.value(x).item());
        self.push(Op::BroadcastScalar(x), value)
    }

    fn rows(&self, x: NodeId, name: &str) -> (usize, usize) {
        let shape = self.shape(x);
        assert_eq!(shape.len(), 2, "{} expects a 2D tensor, got {:?}", name, shape);
        (shape[0], shape[1])
    }

    /// `(n, k) -> (n, 1)` row sums.
    pub fn row_sum(&mut self, x: NodeId) -> NodeId {
        let (rows, cols) = self.rows(x, "row_sum");
        let data = self.data(x).chunks_exact(cols).map(|r| r.iter().sum()).collect();
        self.push(Op::RowSum(x), Tensor::new(vec![rows, 1], data))
    }

    /// `(n, 1) -> (n, cols)` by repeating each row value.
    pub fn row_broadcast(&mut self, x: NodeId, cols: usize) -> NodeId {
        let (rows, one) = self.rows(x, "row_broadcast");
        assert_eq!(one, 1, "row_broadcast expects a single column");
        let data = self
            .data(x)
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(cols))
            .collect();
        self.push(Op::RowBroadcast(x), Tensor::new(vec![rows, cols], data))
    }

    /// `(n, k) -> (n, 1)` stable `log(sum(exp(row)))`.
    pub fn row_logsumexp(&mut self, x: NodeId) -> NodeId {
        let (rows, cols) = self.rows(x, "row_logsumexp");
        let data = self
            .data(x)
            .chunks_exact(cols)
            .map(|row| {
                let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let sum: f64 = row.iter().map(|&v| (v - max).exp()).sum();
                max + sum.ln()
            })
            .collect();
        self.push(Op::RowLogSumExp(x), Tensor::new(vec![rows, 1], data))
    }

    /// Sum over every axis except axis 1: `(n, c, ...) -> (c)`.
    pub fn channel_sum(&mut self, x: NodeId) -> NodeId {
        let shape = self.shape(x).to_vec();
        assert!(shape.len() >= 2, "channel_sum expects a batch and channel axis");
        let channels = shape[1];
        let inner: usize = shape[2..].iter().product();
        let mut data = vec![0.0; channels];
        for (idx, &v) in self.data(x).iter().enumerate() {
            data[(idx / inner) % channels] += v;
        }
        self.push(Op::ChannelSum(x), Tensor::new(vec![channels], data))
    }

    /// Expand a per-channel vector `(c)` to `shape = (n, c, ...)`.
    pub fn channel_broadcast(&mut self, x: NodeId, shape: Vec<usize>) -> NodeId {
        assert!(shape.len() >= 2, "channel_broadcast expects a batch and channel axis");
        let channels = shape[1];
        assert_eq!(
            self.shape(x),
            &[channels],
            "channel_broadcast source must have one value per channel"
        );
        let inner: usize = shape[2..].iter().product();
        let numel: usize = shape.iter().product();
        let src = self.data(x);
        let data = (0..numel).map(|idx| src[(idx / inner) % channels]).collect();
        self.push(Op::ChannelBroadcast(x), Tensor::new(shape, data))
    }

    // ----- Linear algebra -----

    /// `(m, k) x (k, n) -> (m, n)`.
    pub fn matmul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let (m, k) = self.rows(a, "matmul");
        let (k2, n) = self.rows(b, "matmul");
        assert_eq!(k, k2, "matmul inner dimensions must agree");
        let data = kernels::matmul(self.data(a), self.data(b), m, k, n);
        self.push(Op::MatMul(a, b), Tensor::new(vec![m, n], data))
    }

    pub fn transpose(&mut self, x: NodeId) -> NodeId {
        let (rows, cols) = self.rows(x, "transpose");
        let data = kernels::transpose(self.data(x), rows, cols);
        self.push(Op::Transpose(x), Tensor::new(vec![cols, rows], data))
    }

    // ----- Convolution -----

    /// 2D convolution of `(n, c, h, w)` with square filters `(o, c, k, k)`.
    pub fn conv2d(&mut self, input: NodeId, weight: NodeId, stride: usize, padding: usize) -> NodeId {
        let x = self.shape(input).to_vec();
        let w = self.shape(weight).to_vec();
        assert_eq!(x.len(), 4, "conv2d input must be (n, c, h, w), got {:?}", x);
        assert_eq!(w.len(), 4, "conv2d weight must be (o, c, k, k), got {:?}", w);
        assert_eq!(x[1], w[1], "conv2d channel mismatch: input {:?}, weight {:?}", x, w);
        assert_eq!(w[2], w[3], "conv2d expects square kernels");
        let geometry = ConvGeometry {
            batch: x[0],
            in_channels: x[1],
            out_channels: w[0],
            kernel_size: w[2],
            stride,
            padding,
            input_height: x[2],
            input_width: x[3],
        };
        let data = kernels::conv2d_forward(&geometry, self.data(input), self.data(weight));
        let op = Op::Conv2d {
            input,
            weight,
            geometry,
        };
        self.push(op, Tensor::new(geometry.output_shape(), data))
    }

    /// Transposed convolution: gradient of a convolution with respect to its input.
    pub fn conv2d_input_grad(&mut self, grad_output: NodeId, weight: NodeId, geometry: ConvGeometry) -> NodeId {
        assert_eq!(self.shape(grad_output), geometry.output_shape().as_slice());
        assert_eq!(self.shape(weight), geometry.weight_shape().as_slice());
        let data = kernels::conv2d_input_grad(&geometry, self.data(grad_output), self.data(weight));
        let op = Op::Conv2dInputGrad {
            grad_output,
            weight,
            geometry,
        };
        self.push(op, Tensor::new(geometry.input_shape(), data))
    }

    /// Gradient of a convolution with respect to its filters.
    pub fn conv2d_weight_grad(&mut self, input: NodeId, grad_output: NodeId, geometry: ConvGeometry) -> NodeId {
        assert_eq!(self.shape(input), geometry.input_shape().as_slice());
        assert_eq!(self.shape(grad_output), geometry.output_shape().as_slice());
        let data = kernels::conv2d_weight_grad(&geometry, self.data(input), self.data(grad_output));
        let op = Op::Conv2dWeightGrad {
            input,
            grad_output,
            geometry,
        };
        self.push(op, Tensor::new(geometry.weight_shape(), data))
    }

    // ----- Composites -----

    /// Row-wise `x - logsumexp(x)` for a `(n, k)` tensor.
    pub fn log_softmax(&mut self, x: NodeId) -> NodeId {
        let cols = self.shape(x)[1];
        let lse = self.row_logsumexp(x);
        let lse = self.row_broadcast(lse, cols);
        self.sub(x, lse)
    }

    /// Row-wise softmax for a `(n, k)` tensor.
    pub fn softmax(&mut self, x: NodeId) -> NodeId {
        let log_probs = self.log_softmax(x);
        self.exp(log_probs)
    }
}
