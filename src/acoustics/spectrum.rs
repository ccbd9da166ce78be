//! Frequency-domain objects: magnitude spectrum, mel-cepstrum and the
//! harmonics-only long-term average spectrum.

use super::AcousticsError;
use super::pitch::PitchTrack;
use super::sound::Sound;
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Forward FFT of a real signal, zero-padded (or truncated) to `n` points.
pub(crate) fn fft(samples: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .take(n)
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(n)
        .collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut buffer);
    buffer
}

/// Unnormalised inverse FFT.
pub(crate) fn inverse_fft(mut buffer: Vec<Complex<f64>>) -> Vec<Complex<f64>> {
    let mut planner = FftPlanner::new();
    planner.plan_fft_inverse(buffer.len()).process(&mut buffer);
    buffer
}

fn hann(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (len - 1) as f64).cos())
        .collect()
}

fn hertz_to_mel(f: f64) -> f64 {
    2595.0 * (1.0 + f / 700.0).log10()
}

/// Magnitude spectrum from 0 Hz to Nyquist.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    df: f64,
    magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn new(df: f64, magnitudes: Vec<f64>) -> Self {
        Self { df, magnitudes }
    }

    /// Unwindowed spectrum of the whole sound.
    pub fn from_sound(sound: &Sound) -> Result<Self, AcousticsError> {
        if sound.num_samples() < 2 {
            return Err(AcousticsError::TooShort {
                needed: 2.0 / sound.sample_rate(),
                available: sound.duration(),
            });
        }
        let n = sound.num_samples().next_power_of_two();
        let bins = fft(sound.samples(), n);
        let magnitudes = bins[..=n / 2].iter().map(|c| c.norm()).collect();
        Ok(Self {
            df: sound.sample_rate() / n as f64,
            magnitudes,
        })
    }

    pub fn df(&self) -> f64 {
        self.df
    }

    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Frequency centroid weighted by `|X|^power`; `None` for a silent spectrum.
    pub fn centre_of_gravity(&self, power: f64) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (k, m) in self.magnitudes.iter().enumerate() {
            let w = m.powf(power);
            weighted += w * k as f64 * self.df;
            total += w;
        }
        (total > 0.0).then(|| weighted / total)
    }
}

/// Per-frame mel-frequency cepstral coefficients `c1..=ck`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cepstrum {
    frames: Vec<Vec<f64>>,
}

const MFCC_WINDOW: f64 = 0.015;
const MFCC_STEP: f64 = 0.005;
const MEL_FIRST_FILTER: f64 = 100.0;
const MEL_FILTER_SPACING: f64 = 100.0;

impl Cepstrum {
    pub fn new(frames: Vec<Vec<f64>>) -> Self {
        Self { frames }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Mean of coefficient `k` (1-based) over all frames.
    pub fn mean_coefficient(&self, k: usize) -> Option<f64> {
        let values: Vec<f64> = self
            .frames
            .iter()
            .filter_map(|f| f.get(k.checked_sub(1)?).copied())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn from_sound(sound: &Sound, coefficients: usize) -> Result<Self, AcousticsError> {
        if coefficients == 0 {
            return Err(AcousticsError::InvalidParameter(
                "mel-cepstrum needs at least one coefficient".to_string(),
            ));
        }
        let sr = sound.sample_rate();
        let win = (MFCC_WINDOW * sr).round() as usize;
        let step = ((MFCC_STEP * sr).round() as usize).max(1);
        if win < 2 || sound.num_samples() < win {
            return Err(AcousticsError::TooShort {
                needed: MFCC_WINDOW,
                available: sound.duration(),
            });
        }

        let n_fft = win.next_power_of_two();
        let df = sr / n_fft as f64;
        let nyquist_mel = hertz_to_mel(sr / 2.0);
        let centres: Vec<f64> = (0..)
            .map(|j| MEL_FIRST_FILTER + j as f64 * MEL_FILTER_SPACING)
            .take_while(|c| c + MEL_FILTER_SPACING <= nyquist_mel)
            .collect();
        if centres.is_empty() {
            return Err(AcousticsError::InvalidParameter(format!(
                "sample rate {sr} Hz too low for a mel filter bank"
            )));
        }
        let bin_mels: Vec<f64> = (0..=n_fft / 2).map(|k| hertz_to_mel(k as f64 * df)).collect();

        let window = hann(win);
        let samples = sound.samples();
        let mut frames = Vec::new();
        let mut start = 0;
        while start + win <= samples.len() {
            let windowed: Vec<f64> = samples[start..start + win]
                .iter()
                .zip(&window)
                .map(|(s, w)| s * w)
                .collect();
            let spectrum = fft(&windowed, n_fft);
            let power: Vec<f64> = spectrum[..=n_fft / 2].iter().map(|c| c.norm_sqr()).collect();

            let filter_db: Vec<f64> = centres
                .iter()
                .map(|&c| {
                    let energy: f64 = bin_mels
                        .iter()
                        .zip(&power)
                        .map(|(m, p)| (1.0 - (m - c).abs() / MEL_FILTER_SPACING).max(0.0) * p)
                        .sum();
                    10.0 * (energy + 1e-30).log10()
                })
                .collect();

            let nf = filter_db.len() as f64;
            let coeffs = (1..=coefficients)
                .map(|k| {
                    filter_db
                        .iter()
                        .enumerate()
                        .map(|(j, p)| p * (PI * k as f64 * (j as f64 + 0.5) / nf).cos())
                        .sum()
                })
                .collect();
            frames.push(coeffs);
            start += step;
        }

        Ok(Self { frames })
    }
}

/// Parameters of the harmonics-only long-term spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicsParams {
    pub max_harmonic: usize,
    pub shortest_period: f64,
    pub longest_period: f64,
    pub max_period_factor: f64,
}

impl Default for HarmonicsParams {
    fn default() -> Self {
        Self {
            max_harmonic: 20,
            shortest_period: 0.0001,
            longest_period: 0.02,
            max_period_factor: 1.3,
        }
    }
}

/// Long-term average spectrum with one bin per harmonic number, in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Ltas {
    values: Vec<Option<f64>>,
}

impl Ltas {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self { values }
    }

    pub fn num_bins(&self) -> usize {
        self.values.len()
    }

    /// Level of harmonic `bin` (1-based).
    pub fn value_in_bin(&self, bin: usize) -> Option<f64> {
        self.values.get(bin.checked_sub(1)?).copied().flatten()
    }

    /// Average the harmonic levels over every usable voiced pitch frame.
    ///
    /// A frame is usable when its period lies within the parameter bounds,
    /// it does not jump by more than `max_period_factor` from the previous
    /// voiced frame, and a three-period window around it fits in the sound.
    pub fn harmonics_only(
        sound: &Sound,
        pitch: &PitchTrack,
        params: &HarmonicsParams,
    ) -> Result<Self, AcousticsError> {
        if params.max_harmonic == 0 {
            return Err(AcousticsError::InvalidParameter(
                "maximum harmonic must be at least 1".to_string(),
            ));
        }
        let sr = sound.sample_rate();
        let nyquist = sr / 2.0;
        let mut power = vec![0.0; params.max_harmonic];
        let mut counts = vec![0usize; params.max_harmonic];
        let mut frames_used = 0usize;
        let mut previous: Option<f64> = None;

        for frame in pitch.frames() {
            let Some(f0) = frame.frequency else {
                previous = None;
                continue;
            };
            let period = 1.0 / f0;
            if period < params.shortest_period || period > params.longest_period {
                previous = None;
                continue;
            }
            let jump = previous.map(|p| (f0 / p).max(p / f0));
            previous = Some(f0);
            if jump.is_some_and(|j| j > params.max_period_factor) {
                continue;
            }

            let from = frame.time - 1.5 * period;
            let to = frame.time + 1.5 * period;
            if from < sound.start_time() || to > sound.end_time() {
                continue;
            }
            let range = sound.index_range(from, to);
            if range.len() < 8 {
                continue;
            }

            let window = hann(range.len());
            let gain: f64 = window.iter().sum();
            let windowed: Vec<f64> = sound.samples()[range]
                .iter()
                .zip(&window)
                .map(|(s, w)| s * w)
                .collect();
            let n_fft = (windowed.len() * 8).next_power_of_two().max(4096);
            let df = sr / n_fft as f64;
            let spectrum = fft(&windowed, n_fft);

            for h in 1..=params.max_harmonic {
                let centre = h as f64 * f0;
                if centre + f0 / 4.0 >= nyquist {
                    break;
                }
                let lo = ((centre - f0 / 4.0) / df).floor().max(0.0) as usize;
                let hi = ((centre + f0 / 4.0) / df).ceil() as usize;
                let peak = spectrum[lo..=hi.min(n_fft / 2)]
                    .iter()
                    .map(|c| (c.norm() / gain).powi(2))
                    .fold(0.0, f64::max);
                power[h - 1] += peak;
                counts[h - 1] += 1;
            }
            frames_used += 1;
        }

        if frames_used == 0 {
            return Err(AcousticsError::NoVoicedFrames);
        }

        let values = power
            .iter()
            .zip(&counts)
            .map(|(&p, &n)| (n > 0 && p > 0.0).then(|| 10.0 * (p / n as f64).log10()))
            .collect();
        Ok(Self { values })
    }
}
