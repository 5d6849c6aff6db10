// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Filter kernels and precomputed per-axis contribution weights.

use crate::RasterError;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Interpolation filter used for every resampling stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleKernel {
    /// Tent filter, radius 1.
    Bilinear,
    /// Catmull-Rom cubic (a = -0.5), radius 2.
    Bicubic,
    /// Windowed sinc, radius 3.
    #[default]
    Lanczos3,
}

impl ResampleKernel {
    /// Filter radius in source pixels at unit scale.
    pub fn support(self) -> f64 {
        match self {
            ResampleKernel::Bilinear => 1.0,
            ResampleKernel::Bicubic => 2.0,
            ResampleKernel::Lanczos3 => 3.0,
        }
    }

    /// Evaluates the filter at distance `x`.
    pub fn weight(self, x: f64) -> f64 {
        let x = x.abs();
        match self {
            ResampleKernel::Bilinear => {
                if x < 1.0 {
                    1.0 - x
                } else {
                    0.0
                }
            }
            ResampleKernel::Bicubic => {
                const A: f64 = -0.5;
                if x < 1.0 {
                    ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
                } else if x < 2.0 {
                    ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
                } else {
                    0.0
                }
            }
            ResampleKernel::Lanczos3 => {
                if x < 3.0 {
                    sinc(x) * sinc(x / 3.0)
                } else {
                    0.0
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResampleKernel::Bilinear => "bilinear",
            ResampleKernel::Bicubic => "bicubic",
            ResampleKernel::Lanczos3 => "lanczos3",
        }
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

impl fmt::Display for ResampleKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResampleKernel {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" | "linear" => Ok(ResampleKernel::Bilinear),
            "bicubic" | "cubic" => Ok(ResampleKernel::Bicubic),
            "lanczos3" | "lanczos" => Ok(ResampleKernel::Lanczos3),
            _ => Err(RasterError::UnknownKernel(s.to_string())),
        }
    }
}

/// Contribution weights for mapping one axis of length `src_len` onto
/// `dst_len` output samples.
///
/// Output sample `i` reads source samples `start..start + len` of
/// [`AxisWeights::span`], weighted by the returned slice. Weights of each
/// span sum to one. When downsampling, the kernel is stretched by the
/// scale so that every source sample contributes.
#[derive(Debug, Clone)]
pub struct AxisWeights {
    spans: Vec<(u32, u32)>,
    weights: Vec<f32>,
    stride: usize,
}

impl AxisWeights {
    /// Epsilon below which trailing and leading weights are trimmed.
    const TRIM: f64 = 1e-9;

    /// Builds weights for one axis. Either length being zero yields an
    /// empty table.
    pub fn new(src_len: u32, dst_len: u32, kernel: ResampleKernel) -> Self {
        if src_len == 0 || dst_len == 0 {
            return Self { spans: Vec::new(), weights: Vec::new(), stride: 0 };
        }
        let scale = src_len as f64 / dst_len as f64;
        let filter_scale = scale.max(1.0);
        let support = kernel.support() * filter_scale;

        let mut raw: Vec<(u32, Vec<f64>)> = Vec::with_capacity(dst_len as usize);
        for i in 0..dst_len {
            let center = (i as f64 + 0.5) * scale;
            let lo = ((center - support).floor().max(0.0) as u32).min(src_len - 1);
            let hi = ((center + support).ceil() as u32).clamp(lo + 1, src_len);

            let mut ws: Vec<f64> = (lo..hi)
                .map(|j| kernel.weight((j as f64 + 0.5 - center) / filter_scale))
                .collect();

            let mut start = lo;
            while ws.len() > 1 && ws[0].abs() < Self::TRIM {
                ws.remove(0);
                start += 1;
            }
            while ws.len() > 1 && ws[ws.len() - 1].abs() < Self::TRIM {
                ws.pop();
            }

            let sum: f64 = ws.iter().sum();
            if sum.abs() < Self::TRIM {
                // Degenerate span: fall back to the nearest sample.
                let nearest = (center.floor() as u32).min(src_len - 1);
                raw.push((nearest, vec![1.0]));
            } else {
                raw.push((start, ws.iter().map(|w| w / sum).collect()));
            }
        }

        let stride = raw.iter().map(|(_, w)| w.len()).max().unwrap_or(1);
        let mut spans = Vec::with_capacity(raw.len());
        let mut weights = vec![0f32; raw.len() * stride];
        for (i, (start, ws)) in raw.into_iter().enumerate() {
            spans.push((start, ws.len() as u32));
            for (k, w) in ws.into_iter().enumerate() {
                weights[i * stride + k] = w as f32;
            }
        }

        Self { spans, weights, stride }
    }

    /// Number of output samples.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Returns the first contributing source index and the weights for
    /// output sample `i`.
    #[inline]
    pub fn span(&self, i: usize) -> (u32, &[f32]) {
        let (start, len) = self.spans[i];
        let base = i * self.stride;
        (start, &self.weights[base..base + len as usize])
    }

    /// Widest span in source samples.
    pub fn max_span(&self) -> usize {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_at_zero_is_one() {
        for k in [ResampleKernel::Bilinear, ResampleKernel::Bicubic, ResampleKernel::Lanczos3] {
            assert!((k.weight(0.0) - 1.0).abs() < 1e-12);
            assert_eq!(k.weight(k.support()), 0.0);
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Lanczos3".parse::<ResampleKernel>().unwrap(), ResampleKernel::Lanczos3);
        assert_eq!("cubic".parse::<ResampleKernel>().unwrap(), ResampleKernel::Bicubic);
        assert!("nearest".parse::<ResampleKernel>().is_err());
    }

    #[test]
    fn test_weights_normalized() {
        for (src, dst) in [(10u32, 20u32), (20, 10), (7, 11), (1, 5), (100, 101)] {
            let aw = AxisWeights::new(src, dst, ResampleKernel::Lanczos3);
            assert_eq!(aw.len(), dst as usize);
            for i in 0..aw.len() {
                let (start, ws) = aw.span(i);
                assert!(start as usize + ws.len() <= src as usize);
                let sum: f32 = ws.iter().sum();
                assert!((sum - 1.0).abs() < 1e-5, "src={src} dst={dst} i={i} sum={sum}");
            }
        }
    }

    #[test]
    fn test_identity_weights() {
        let aw = AxisWeights::new(8, 8, ResampleKernel::Bicubic);
        for i in 0..8 {
            let (start, ws) = aw.span(i);
            let peak = ws
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| start as usize + k)
                .unwrap();
            assert_eq!(peak, i);
        }
    }

    #[test]
    fn test_downsample_widens_support() {
        let up = AxisWeights::new(100, 200, ResampleKernel::Bilinear);
        let down = AxisWeights::new(100, 25, ResampleKernel::Bilinear);
        assert!(down.max_span() > up.max_span());
    }
}
