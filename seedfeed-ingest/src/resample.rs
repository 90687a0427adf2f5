//! Frequency-domain resampling of a single packet.
//!
//! The packet is transformed with a forward FFT, tapered with a Hann window
//! centred on DC, truncated or zero-padded to the new length and transformed
//! back. Start time is kept; the sample interval becomes `1 / target`.

use std::f64::consts::PI;

use rustfft::{Fft, FftPlanner};
use rustfft::num_complex::Complex;

use crate::packet::WaveformPacket;

/// Rates closer than this are treated as equal.
const RATE_EPSILON: f64 = 1e-9;

/// Largest accepted ratio of target to source rate.
const MAX_UPSAMPLE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResampleError {
    #[error("invalid sample rate {0}")]
    InvalidRate(f64),
    #[error("packet has no samples")]
    Empty,
    #[error("{samples} samples at {source_rate} Hz resample to nothing at {target_rate} Hz")]
    TooShort {
        samples: usize,
        source_rate: f64,
        target_rate: f64,
    },
    #[error("upsampling {source_rate} Hz to {target_rate} Hz exceeds {}x", MAX_UPSAMPLE)]
    TooLong {
        source_rate: f64,
        target_rate: f64,
    },
}

pub struct Resampler {
    target: f64,
    planner: FftPlanner<f64>,
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Resampler {
    pub fn new(target: f64) -> Result<Self, ResampleError> {
        if !target.is_finite() || target <= 0.0 {
            return Err(ResampleError::InvalidRate(target));
        }
        Ok(Self {
            target,
            planner: FftPlanner::new(),
        })
    }

    pub fn target_rate(&self) -> f64 {
        self.target
    }

    pub fn apply(&mut self, packet: &WaveformPacket) -> Result<WaveformPacket, ResampleError> {
        if !packet.delta.is_finite() || packet.delta <= 0.0 {
            return Err(ResampleError::InvalidRate(packet.delta));
        }
        let n = packet.samples.len();
        if n == 0 {
            return Err(ResampleError::Empty);
        }

        let source = packet.sample_rate();
        if (source - self.target).abs() < RATE_EPSILON {
            return Ok(packet.clone());
        }

        if self.target / source > MAX_UPSAMPLE {
            return Err(ResampleError::TooLong {
                source_rate: source,
                target_rate: self.target,
            });
        }
        let num = (n as f64 * self.target / source + RATE_EPSILON).floor() as usize;
        if num == 0 {
            return Err(ResampleError::TooShort {
                samples: n,
                source_rate: source,
                target_rate: self.target,
            });
        }

        let samples = self.resample(&packet.samples, num);
        Ok(WaveformPacket::new(
            packet.key.clone(),
            packet.start,
            1.0 / self.target,
            samples,
        ))
    }

    fn resample(&mut self, input: &[f64], num: usize) -> Vec<f64> {
        let n = input.len();

        let mut spectrum: Vec<Complex<f64>> =
            input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.planner.plan_fft_forward(n).process(&mut spectrum);

        // Half spectrum, tapered. Bin k takes the periodic Hann weight at
        // (k + n/2) mod n, which is 1 at DC and falls to 0 at Nyquist.
        let half = n / 2 + 1;
        let tapered: Vec<Complex<f64>> = spectrum[..half]
            .iter()
            .enumerate()
            .map(|(k, &x)| x * hann(n, (k + n / 2) % n))
            .collect();

        // Rebuild a Hermitian spectrum of the output length.
        let keep = half.min(num / 2 + 1);
        let mut out = vec![Complex::new(0.0, 0.0); num];
        out[0] = Complex::new(tapered[0].re, 0.0);
        for k in 1..keep {
            let mirror = num - k;
            if mirror == k {
                out[k] = Complex::new(tapered[k].re, 0.0);
            } else {
                out[k] = tapered[k];
                out[mirror] = tapered[k].conj();
            }
        }

        self.planner.plan_fft_inverse(num).process(&mut out);
        let scale = 1.0 / n as f64;
        out.iter().map(|c| c.re * scale).collect()
    }
}

fn hann(n: usize, i: usize) -> f64 {
    0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::StreamKey;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn packet(rate: f64, samples: Vec<f64>) -> WaveformPacket {
        WaveformPacket::new(StreamKey::new("AM", "STA1", "00", "EHZ"), t0(), 1.0 / rate, samples)
    }

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() <= tol, "sample {i}: {x} vs {y}");
        }
    }

    #[test]
    fn downsample_constant() {
        let mut r = Resampler::new(10.0).unwrap();
        let out = r.apply(&packet(100.0, vec![5.0; 100])).unwrap();
        assert_eq!(out.samples.len(), 10);
        assert_close(&out.samples, &[5.0; 10], 1e-9);
        assert_eq!(out.sample_rate(), 10.0);
        assert_eq!(out.start, t0());
        assert_eq!(out.key.station, "STA1");
    }

    #[test]
    fn upsample_constant() {
        let mut r = Resampler::new(20.0).unwrap();
        let out = r.apply(&packet(10.0, vec![-3.0; 11])).unwrap();
        assert_eq!(out.samples.len(), 22);
        assert_close(&out.samples, &[-3.0; 22], 1e-9);
    }

    #[test]
    fn output_length_is_floored() {
        let mut r = Resampler::new(40.0).unwrap();
        let out = r.apply(&packet(100.0, vec![1.0; 412])).unwrap();
        // 412 * 40 / 100 = 164.8
        assert_eq!(out.samples.len(), 164);
    }

    #[test]
    fn low_frequency_sine_survives() {
        // 1 Hz over exactly two periods at 100 Hz, down to 20 Hz.
        let input: Vec<f64> = (0..200)
            .map(|i| (2.0 * PI * i as f64 / 100.0).sin())
            .collect();
        let mut r = Resampler::new(20.0).unwrap();
        let out = r.apply(&packet(100.0, input)).unwrap();

        let expected: Vec<f64> = (0..40).map(|i| (2.0 * PI * i as f64 / 20.0).sin()).collect();
        assert_close(&out.samples, &expected, 0.02);
    }

    #[test]
    fn same_rate_is_identity() {
        let mut r = Resampler::new(100.0).unwrap();
        let p = packet(100.0, vec![1.0, 2.0, 3.0]);
        assert_eq!(r.apply(&p).unwrap(), p);
    }

    #[test]
    fn errors() {
        assert!(matches!(Resampler::new(0.0), Err(ResampleError::InvalidRate(_))));
        assert!(matches!(Resampler::new(f64::NAN), Err(ResampleError::InvalidRate(_))));

        let mut r = Resampler::new(1.0).unwrap();
        assert_eq!(r.apply(&packet(100.0, vec![])), Err(ResampleError::Empty));
        assert!(matches!(
            r.apply(&packet(100.0, vec![1.0; 50])),
            Err(ResampleError::TooShort { samples: 50, .. })
        ));

        let mut bad = packet(100.0, vec![1.0]);
        bad.delta = 0.0;
        assert!(matches!(r.apply(&bad), Err(ResampleError::InvalidRate(_))));
    }

    #[test]
    fn output_length_is_bounded() {
        let mut r = Resampler::new(100.0).unwrap();

        let mut slow = packet(1.0, vec![1.0; 10]);
        slow.delta = 1e12;
        assert!(matches!(
            r.apply(&slow),
            Err(ResampleError::TooLong { target_rate: 100.0, .. })
        ));

        let out = r.apply(&packet(0.5, vec![2.0; 4])).unwrap();
        assert_eq!(out.samples.len(), 800);
    }
}
