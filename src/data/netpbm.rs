//! Netpbm image files
//!
//! Reads plain and raw graymaps and pixmaps (`P2`, `P3`, `P5`, `P6`) into
//! `(C, H, W)` tensors in `[0, 1]`, and writes tensors back as raw `P5`/`P6`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{LeakageError, Result};
use crate::tensor::Tensor;

/// Decode the image at `path` into `channels` channels.
///
/// Gray images expand to three identical channels; color images collapse to
/// one channel by averaging.
///
/// # Errors
///
/// `Io` if the file cannot be read; `Decode` if it is not a well-formed
/// Netpbm image or `channels` is neither 1 nor 3.
pub fn read_netpbm(path: impl AsRef<Path>, channels: usize) -> Result<Tensor> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| LeakageError::io(path, e))?;
    decode_netpbm(&bytes, channels).map_err(|message| LeakageError::decode(path, message))
}

/// Write a `(1, H, W)` tensor as `P5` or a `(3, H, W)` tensor as `P6`,
/// clamping values to `[0, 1]`.
pub fn write_ppm(path: impl AsRef<Path>, image: &Tensor) -> Result<()> {
    let path = path.as_ref();
    let (channels, height, width) = match *image.shape() {
        [c, h, w] if c == 1 || c == 3 => (c, h, w),
        _ => {
            return Err(LeakageError::ShapeMismatch {
                what: "image written to disk",
                expected: vec![3, 0, 0],
                actual: image.shape().to_vec(),
            })
        }
    };

    let magic = if channels == 3 { "P6" } else { "P5" };
    let plane = height * width;
    let data = image.data();
    let mut bytes = Vec::with_capacity(plane * channels);
    for i in 0..plane {
        for c in 0..channels {
            let v = data[c * plane + i];
            let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
            bytes.push((v * 255.0).round() as u8);
        }
    }

    let file = File::create(path).map_err(|e| LeakageError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write!(out, "{}\n{} {}\n255\n", magic, width, height)
        .and_then(|_| out.write_all(&bytes))
        .and_then(|_| out.flush())
        .map_err(|e| LeakageError::io(path, e))
}

/// Cursor over the whitespace-separated header tokens of a Netpbm file.
struct Header<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Header<'a> {
    fn skip_space_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == b'#' {
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn token(&mut self) -> Option<&'a [u8]> {
        self.skip_space_and_comments();
        let bytes = self.bytes;
        let start = self.pos;
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let end = self.pos;
        (end > start).then(|| &bytes[start..end])
    }

    fn number(&mut self, what: &str) -> std::result::Result<usize, String> {
        let token = self.token().ok_or_else(|| format!("missing {}", what))?;
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format!("invalid {} {:?}", what, String::from_utf8_lossy(token)))
    }
}

/// Largest accepted width or height.
const MAX_DIMENSION: usize = 16384;

fn decode_netpbm(bytes: &[u8], channels: usize) -> std::result::Result<Tensor, String> {
    if channels != 1 && channels != 3 {
        return Err(format!("cannot produce {} channels", channels));
    }

    let mut header = Header { bytes, pos: 0 };
    let (file_channels, binary) = match header.token() {
        Some(b"P2") => (1, false),
        Some(b"P3") => (3, false),
        Some(b"P5") => (1, true),
        Some(b"P6") => (3, true),
        _ => return Err("not a P2/P3/P5/P6 Netpbm file".to_string()),
    };
    let width = header.number("width")?;
    let height = header.number("height")?;
    let max_value = header.number("maximum value")?;
    if width == 0 || height == 0 {
        return Err(format!("empty image {}x{}", width, height));
    }
    if max_value == 0 || max_value > 65535 {
        return Err(format!("maximum value {} out of range", max_value));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(format!(
            "image {}x{} exceeds the {} pixel side limit",
            width, height, MAX_DIMENSION
        ));
    }

    let plane = width
        .checked_mul(height)
        .ok_or_else(|| format!("image {}x{} is too large", width, height))?;
    let count = plane
        .checked_mul(file_channels)
        .ok_or_else(|| format!("image {}x{} is too large", width, height))?;
    let samples: Vec<usize> = if binary {
        // Exactly one whitespace byte separates the header from the raster.
        let start = header.pos + 1;
        let wide = max_value > 255;
        let needed = count
            .checked_mul(if wide { 2 } else { 1 })
            .ok_or_else(|| "raster size overflows".to_string())?;
        let end = start
            .checked_add(needed)
            .ok_or_else(|| "raster size overflows".to_string())?;
        let raster = bytes
            .get(start..end)
            .ok_or_else(|| format!("raster is truncated: expected {} bytes", needed))?;
        if wide {
            raster
                .chunks_exact(2)
                .map(|p| ((p[0] as usize) << 8) | p[1] as usize)
                .collect()
        } else {
            raster.iter().map(|&b| b as usize).collect()
        }
    } else {
        (0..count)
            .map(|_| header.number("sample"))
            .collect::<std::result::Result<_, _>>()?
    };
    if let Some(&bad) = samples.iter().find(|&&s| s > max_value) {
        return Err(format!("sample {} exceeds maximum value {}", bad, max_value));
    }

    // Interleaved HWC -> planar CHW.
    let max_value = max_value as f64;
    let mut planar = vec![0.0; plane * file_channels];
    for (i, &s) in samples.iter().enumerate() {
        planar[(i % file_channels) * plane + i / file_channels] = s as f64 / max_value;
    }

    let data = match (file_channels, channels) {
        (a, b) if a == b => planar,
        (1, 3) => planar.repeat(3),
        _ => (0..plane)
            .map(|i| (planar[i] + planar[plane + i] + planar[2 * plane + i]) / 3.0)
            .collect(),
    };
    Ok(Tensor::new(vec![channels, height, width], data))
}
