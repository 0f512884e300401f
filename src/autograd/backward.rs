//! Reverse sweep over the tape.
//!
//! Vector-Jacobian products are recorded with ordinary tape operations, so a
//! gradient returned by [`grad`] is itself a differentiable node. Calling
//! [`grad`] on an expression built from such gradients is the second-order
//! pass the reconstruction objective needs.

use super::tape::{NodeId, Op, Tape};
use crate::tensor::Tensor;

/// Gradient of the scalar `output` with respect to each node in `wrt`.
///
/// Returns one node per entry of `wrt`, in order. Nodes the output does not
/// depend on receive a zero constant. The returned nodes stay connected to
/// every variable that influenced them.
///
/// # Panics
///
/// Panics if `output` holds more than one element.
pub fn grad(tape: &mut Tape, output: NodeId, wrt: &[NodeId]) -> Vec<NodeId> {
    assert_eq!(
        tape.value(output).numel(),
        1,
        "grad() requires a scalar output"
    );

    let count = output.index() + 1;
    let relevant = mark_relevant(tape, count, wrt);

    let mut grads: Vec<Option<NodeId>> = vec![None; count];
    if relevant[output.index()] {
        let seed = Tensor::filled(tape.shape(output).to_vec(), 1.0);
        grads[output.index()] = Some(tape.constant(seed));
    }

    for index in (0..count).rev() {
        if !relevant[index] {
            continue;
        }
        let upstream = match grads[index] {
            Some(g) => g,
            None => continue,
        };
        let op = tape.nodes[index].op;
        let contributions = vjp(tape, op, NodeId::from_index(index), upstream, &relevant);
        for (input, contribution) in contributions {
            let slot = &mut grads[input.index()];
            *slot = Some(match *slot {
                Some(existing) => tape.add(existing, contribution),
                None => contribution,
            });
        }
    }

    wrt.iter()
        .map(|&node| {
            match grads.get(node.index()).copied().flatten() {
                Some(g) => g,
                None => {
                    let zeros = Tensor::zeros(tape.shape(node).to_vec());
                    tape.constant(zeros)
                }
            }
        })
        .collect()
}

/// Nodes lying on a path from a `wrt` node up to the output.
fn mark_relevant(tape: &Tape, count: usize, wrt: &[NodeId]) -> Vec<bool> {
    let mut relevant = vec![false; count];
    for node in wrt {
        if node.index() < count {
            relevant[node.index()] = true;
        }
    }
    for index in 0..count {
        if relevant[index] {
            continue;
        }
        relevant[index] = tape.nodes[index]
            .op
            .inputs()
            .iter()
            .any(|input| relevant[input.index()]);
    }
    relevant
}

/// Contributions of `upstream` (gradient at `out`) to the relevant inputs of `op`.
fn vjp(tape: &mut Tape, op: Op, out: NodeId, upstream: NodeId, relevant: &[bool]) -> Vec<(NodeId, NodeId)> {
    let wanted = |node: NodeId| relevant[node.index()];
    let g = upstream;
    let mut result = Vec::with_capacity(2);

    match op {
        Op::Leaf => {}
        Op::Add(a, b) => {
            if wanted(a) {
                result.push((a, g));
            }
            if wanted(b) {
                result.push((b, g));
            }
        }
        Op::Sub(a, b) => {
            if wanted(a) {
                result.push((a, g));
            }
            if wanted(b) {
                result.push((b, tape.scale(g, -1.0)));
            }
        }
        Op::Mul(a, b) => {
            if wanted(a) {
                result.push((a, tape.mul(g, b)));
            }
            if wanted(b) {
                result.push((b, tape.mul(g, a)));
            }
        }
        Op::Affine { input, scale, .. } => {
            if wanted(input) {
                result.push((input, tape.scale(g, scale)));
            }
        }
        Op::Exp(x) => {
            if wanted(x) {
                result.push((x, tape.mul(g, out)));
            }
        }
        Op::Sigmoid(x) => {
            if wanted(x) {
                // s' = s * (1 - s)
                let one_minus = tape.affine(out, -1.0, 1.0);
                let slope = tape.mul(out, one_minus);
                result.push((x, tape.mul(g, slope)));
            }
        }
        Op::Reshape(x) => {
            if wanted(x) {
                let shape = tape.shape(x).to_vec();
                result.push((x, tape.reshape(g, shape)));
            }
        }
        Op::SumAll(x) => {
            if wanted(x) {
                let shape = tape.shape(x).to_vec();
                result.push((x, tape.broadcast_scalar(g, shape)));
            }
        }
        Op::BroadcastScalar(x) => {
            if wanted(x) {
                let total = tape.sum_all(g);
                let shape = tape.shape(x).to_vec();
                result.push((x, tape.reshape(total, shape)));
            }
        }
        Op::RowSum(x) => {
            if wanted(x) {
                let cols = tape.shape(x)[1];
                result.push((x, tape.row_broadcast(g, cols)));
            }
        }
        Op::RowBroadcast(x) => {
            if wanted(x) {
                result.push((x, tape.row_sum(g)));
            }
        }
        Op::RowLogSumExp(x) => {
            if wanted(x) {
                // d lse / dx = softmax(x) = exp(x - lse)
                let cols = tape.shape(x)[1];
                let lse = tape.row_broadcast(out, cols);
                let shifted = tape.sub(x, lse);
                let probs = tape.exp(shifted);
                let spread = tape.row_broadcast(g, cols);
                result.push((x, tape.mul(spread, probs)));
            }
        }
        Op::ChannelSum(x) => {
            if wanted(x) {
                let shape = tape.shape(x).to_vec();
                result.push((x, tape.channel_broadcast(g, shape)));
            }
        }
        Op::ChannelBroadcast(x) => {
            if wanted(x) {
                result.push((x, tape.channel_sum(g)));
            }
        }
        Op::MatMul(a, b) => {
            if wanted(a) {
                let bt = tape.transpose(b);
                result.push((a, tape.matmul(g, bt)));
            }
            if wanted(b) {
                let at = tape.transpose(a);
                result.push((b, tape.matmul(at, g)));
            }
        }
        Op::Transpose(x) => {
            if wanted(x) {
                result.push((x, tape.transpose(g)));
            }
        }
        Op::Conv2d {
            input,
            weight,
            geometry,
        } => {
            if wanted(input) {
                result.push((input, tape.conv2d_input_grad(g, weight, geometry)));
            }
            if wanted(weight) {
                result.push((weight, tape.conv2d_weight_grad(input, g, geometry)));
            }
        }
        Op::Conv2dInputGrad {
            grad_output,
            weight,
            geometry,
        } => {
            if wanted(grad_output) {
                let forward = tape.conv2d(g, weight, geometry.stride, geometry.padding);
                result.push((grad_output, forward));
            }
            if wanted(weight) {
                result.push((weight, tape.conv2d_weight_grad(g, grad_output, geometry)));
            }
        }
        Op::Conv2dWeightGrad {
            input,
            grad_output,
            geometry,
        } => {
            if wanted(input) {
                result.push((input, tape.conv2d_input_grad(grad_output, g, geometry)));
            }
            if wanted(grad_output) {
                let forward = tape.conv2d(input, g, geometry.stride, geometry.padding);
                result.push((grad_output, forward));
            }
        }
    }

    result
}
