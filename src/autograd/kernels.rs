//! Explicit-loop compute kernels behind the tape operations
//!
//! Convolution is written once as a walk over every (input, weight, output)
//! tap of the trilinear form `sum x[i] * w[k] * y[o]`. Forward convolution,
//! the input gradient and the weight gradient are the three ways of
//! contracting that form, which is what keeps them closed under
//! differentiation.

/// Static description of a 2D convolution.
///
/// Layouts: input `(batch, in_channels, input_height, input_width)`,
/// weight `(out_channels, in_channels, kernel_size, kernel_size)`,
/// output `(batch, out_channels, output_height, output_width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub batch: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub input_height: usize,
    pub input_width: usize,
}

impl ConvGeometry {
    /// Calculated as: (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        (self.input_height + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    /// Calculated as: (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        (self.input_width + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    pub fn input_shape(&self) -> Vec<usize> {
        vec![
            self.batch,
            self.in_channels,
            self.input_height,
            self.input_width,
        ]
    }

    pub fn weight_shape(&self) -> Vec<usize> {
        vec![
            self.out_channels,
            self.in_channels,
            self.kernel_size,
            self.kernel_size,
        ]
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![
            self.batch,
            self.out_channels,
            self.output_height(),
            self.output_width(),
        ]
    }

    /// Visit every valid tap as `(input_index, weight_index, output_index)`.
    ///
    /// Taps that fall into the zero padding are skipped.
    fn for_each_tap<F: FnMut(usize, usize, usize)>(&self, mut f: F) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;

        for b in 0..self.batch {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let out_base = out_base_b + oc * out_spatial;

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * k * k;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let out_idx = out_base + oy * out_w + ox;

                            for ky in 0..k {
                                let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                                if iy < 0 || iy >= self.input_height as isize {
                                    continue;
                                }
                                for kx in 0..k {
                                    let ix =
                                        (ox * self.stride + kx) as isize - self.padding as isize;
                                    if ix < 0 || ix >= self.input_width as isize {
                                        continue;
                                    }
                                    let in_idx =
                                        in_base_c + iy as usize * self.input_width + ix as usize;
                                    f(in_idx, w_base + ky * k + kx, out_idx);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Convolution without bias: `y[o] = sum x[i] * w[k]`.
pub fn conv2d_forward(geometry: &ConvGeometry, input: &[f64], weight: &[f64]) -> Vec<f64> {
    let mut output = vec![0.0; geometry.output_shape().iter().product()];
    geometry.for_each_tap(|i, k, o| output[o] += input[i] * weight[k]);
    output
}

/// Transposed convolution: `dx[i] = sum y[o] * w[k]`.
pub fn conv2d_input_grad(
    geometry: &ConvGeometry,
    grad_output: &[f64],
    weight: &[f64],
) -> Vec<f64> {
    let mut grad_input = vec![0.0; geometry.input_shape().iter().product()];
    geometry.for_each_tap(|i, k, o| grad_input[i] += grad_output[o] * weight[k]);
    grad_input
}

/// Filter gradient: `dw[k] = sum x[i] * y[o]`.
pub fn conv2d_weight_grad(
    geometry: &ConvGeometry,
    input: &[f64],
    grad_output: &[f64],
) -> Vec<f64> {
    let mut grad_weight = vec![0.0; geometry.weight_shape().iter().product()];
    geometry.for_each_tap(|i, k, o| grad_weight[k] += input[i] * grad_output[o]);
    grad_weight
}

/// Row-major matrix product of `(m, k)` and `(k, n)`.
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (p, &a_ip) in row.iter().enumerate() {
            let b_row = &b[p * n..(p + 1) * n];
            for (o, &b_pj) in out_row.iter_mut().zip(b_row.iter()) {
                *o += a_ip * b_pj;
            }
        }
    }
    out
}

/// Transpose of a row-major `(rows, cols)` matrix.
pub fn transpose(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = a[r * cols + c];
        }
    }
    out
}
