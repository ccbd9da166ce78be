//! Formant tracking by Burg linear prediction.
//!
//! The sound is resampled to twice the maximum formant, pre-emphasised,
//! cut into Gaussian-windowed frames and fitted with an LPC model of order
//! twice the number of formants. Formants are the angles of the complex
//! roots of the prediction polynomial. Poles broader than
//! [`MAX_BANDWIDTH`] model spectral tilt rather than a resonance and are
//! dropped before numbering.

use super::AcousticsError;
use super::sound::Sound;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

const MAX_FORMANTS: usize = 5;
const WINDOW_LENGTH: f64 = 0.025;
const PRE_EMPHASIS_FROM: f64 = 50.0;
/// Formants closer than this to 0 Hz or Nyquist are discarded
const EDGE_MARGIN: f64 = 50.0;
/// Widest pole still counted as a formant, in Hz
pub const MAX_BANDWIDTH: f64 = 500.0;
const ROOT_ITERATIONS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formant {
    pub frequency: f64,
    pub bandwidth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormantFrame {
    pub time: f64,
    /// Ascending by frequency
    pub formants: Vec<Formant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormantTrack {
    frames: Vec<FormantFrame>,
}

impl FormantTrack {
    pub fn new(frames: Vec<FormantFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[FormantFrame] {
        &self.frames
    }

    /// Mean frequency of formant `number` (1-based) over frames centred in
    /// `[from, to]`. Frames lacking that formant are skipped.
    pub fn mean(&self, number: usize, from: f64, to: f64) -> Option<f64> {
        let idx = number.checked_sub(1)?;
        let values: Vec<f64> = self
            .frames
            .iter()
            .filter(|f| f.time >= from && f.time <= to)
            .filter_map(|f| f.formants.get(idx).map(|fm| fm.frequency))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn from_sound(sound: &Sound, max_formant: f64) -> Result<Self, AcousticsError> {
        if max_formant <= 0.0 {
            return Err(AcousticsError::InvalidParameter(format!(
                "maximum formant {max_formant} Hz"
            )));
        }
        let target_rate = 2.0 * max_formant;
        let resampled = if sound.sample_rate() > target_rate {
            sound.resample(target_rate)
        } else {
            sound.clone()
        };
        let emphasised = resampled.pre_emphasis(PRE_EMPHASIS_FROM);

        let sr = emphasised.sample_rate();
        // The Gaussian window is effectively twice the nominal length.
        let window_len = (2.0 * WINDOW_LENGTH * sr).round() as usize;
        let step = ((WINDOW_LENGTH / 4.0 * sr).round() as usize).max(1);
        let order = 2 * MAX_FORMANTS;
        if emphasised.num_samples() < window_len {
            return Err(AcousticsError::TooShort {
                needed: 2.0 * WINDOW_LENGTH,
                available: emphasised.duration(),
            });
        }

        let window = gaussian_window(window_len);
        let samples = emphasised.samples();
        let mut frames = Vec::new();
        let mut start = 0;
        while start + window_len <= samples.len() {
            let windowed: Vec<f64> = samples[start..start + window_len]
                .iter()
                .zip(&window)
                .map(|(s, w)| s * w)
                .collect();
            let time = emphasised.time_at(start) + window_len as f64 / (2.0 * sr);

            let formants = burg(&windowed, order)
                .map(|coeffs| formants_from_roots(&polynomial_roots(&coeffs), sr))
                .unwrap_or_default();
            frames.push(FormantFrame { time, formants });
            start += step;
        }

        Ok(Self { frames })
    }
}

/// Upper-half-plane roots as formants, ascending, at most [`MAX_FORMANTS`].
fn formants_from_roots(roots: &[Complex<f64>], sample_rate: f64) -> Vec<Formant> {
    let nyquist = sample_rate / 2.0;
    let mut formants: Vec<Formant> = roots
        .iter()
        .filter(|z| z.im > 0.0)
        .map(|z| Formant {
            frequency: z.arg() * sample_rate / (2.0 * PI),
            bandwidth: -z.norm().ln() * sample_rate / PI,
        })
        .filter(|f| f.frequency > EDGE_MARGIN && f.frequency < nyquist - EDGE_MARGIN)
        .filter(|f| f.bandwidth < MAX_BANDWIDTH)
        .collect();
    formants.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    formants.truncate(MAX_FORMANTS);
    formants
}

fn gaussian_window(len: usize) -> Vec<f64> {
    let edge = (-12.0f64).exp();
    let mid = (len as f64 - 1.0) / 2.0;
    let denom = (len as f64 + 1.0).powi(2);
    (0..len)
        .map(|i| {
            let x = i as f64 - mid;
            ((-48.0 * x * x / denom).exp() - edge) / (1.0 - edge)
        })
        .collect()
}

/// Burg's method: prediction polynomial `[1, a1, ..., a_order]`.
/// `None` when the frame carries no energy.
pub(crate) fn burg(x: &[f64], order: usize) -> Option<Vec<f64>> {
    let n = x.len();
    if n <= order {
        return None;
    }
    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    let mut f = x.to_vec();
    let mut b = x.to_vec();

    for m in 1..=order {
        let mut num = 0.0;
        let mut den = 0.0;
        for i in m..n {
            num += f[i] * b[i - 1];
            den += f[i] * f[i] + b[i - 1] * b[i - 1];
        }
        if den <= f64::MIN_POSITIVE {
            return if m == 1 { None } else { Some(a) };
        }
        let k = -2.0 * num / den;

        let prev = a.clone();
        for j in 1..=m {
            a[j] = prev[j] + k * prev[m - j];
        }
        for i in (m..n).rev() {
            let fi = f[i];
            f[i] = fi + k * b[i - 1];
            b[i] = b[i - 1] + k * fi;
        }
    }
    Some(a)
}

/// Roots of the monic polynomial `z^p + c1 z^(p-1) + ... + cp` by
/// Durand-Kerner iteration. Roots outside the unit circle are reflected
/// inside, since only stable resonances are formants.
pub(crate) fn polynomial_roots(coeffs: &[f64]) -> Vec<Complex<f64>> {
    let degree = coeffs.len().saturating_sub(1);
    if degree == 0 {
        return Vec::new();
    }
    let eval = |z: Complex<f64>| {
        coeffs
            .iter()
            .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z + c)
    };

    let seed = Complex::new(0.4, 0.9);
    let mut roots: Vec<Complex<f64>> = (0..degree).map(|i| seed.powu(i as u32)).collect();
    for _ in 0..ROOT_ITERATIONS {
        let mut largest_step = 0.0f64;
        for i in 0..degree {
            let zi = roots[i];
            let mut denom = Complex::new(1.0, 0.0);
            for (j, zj) in roots.iter().enumerate() {
                if j != i {
                    denom *= zi - zj;
                }
            }
            if denom.norm() < 1e-300 {
                continue;
            }
            let delta = eval(zi) / denom;
            roots[i] = zi - delta;
            largest_step = largest_step.max(delta.norm());
        }
        if largest_step < 1e-12 {
            break;
        }
    }

    roots
        .into_iter()
        .map(|z| {
            let r = z.norm();
            if r > 1.0 { z / (r * r) } else { z }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Glottal-pulse train filtered through second-order resonators.
    pub(crate) fn synthetic_vowel(
        f0: f64,
        formants: &[(f64, f64)],
        sample_rate: f64,
        duration: f64,
    ) -> Sound {
        let n = (sample_rate * duration) as usize;
        let period = (sample_rate / f0).round() as usize;
        let mut signal: Vec<f64> = (0..n)
            .map(|i| if i % period == 0 { 1.0 } else { 0.0 })
            .collect();
        for &(freq, bw) in formants {
            let r = (-PI * bw / sample_rate).exp();
            let theta = 2.0 * PI * freq / sample_rate;
            let (a1, a2) = (2.0 * r * theta.cos(), -r * r);
            let mut y1 = 0.0;
            let mut y2 = 0.0;
            for s in signal.iter_mut() {
                let y = *s + a1 * y1 + a2 * y2;
                y2 = y1;
                y1 = y;
                *s = y;
            }
        }
        let peak = signal.iter().fold(0.0f64, |m, s| m.max(s.abs()));
        Sound::new(signal.into_iter().map(|s| 0.5 * s / peak).collect(), sample_rate)
    }

    #[test]
    fn test_roots_of_known_polynomial() {
        // (z - 0.5)(z^2 + 0.81) = z^3 - 0.5 z^2 + 0.81 z - 0.405
        let mut roots = polynomial_roots(&[1.0, -0.5, 0.81, -0.405]);
        roots.sort_by(|a, b| a.im.partial_cmp(&b.im).unwrap());
        assert!((roots[0] - Complex::new(0.0, -0.9)).norm() < 1e-9);
        assert!((roots[1] - Complex::new(0.5, 0.0)).norm() < 1e-9);
        assert!((roots[2] - Complex::new(0.0, 0.9)).norm() < 1e-9);
    }

    #[test]
    fn test_roots_are_reflected_inside_unit_circle() {
        // z - 2 has its root reflected to 0.5
        let roots = polynomial_roots(&[1.0, -2.0]);
        assert!((roots[0] - Complex::new(0.5, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_burg_recovers_ar2_resonance() {
        let s = synthetic_vowel(100.0, &[(1000.0, 80.0)], 10000.0, 0.2);
        let coeffs = burg(s.samples(), 2).unwrap();
        let r = (-PI * 80.0 / 10000.0).exp();
        let theta = 2.0 * PI * 1000.0 / 10000.0;
        assert!((coeffs[1] + 2.0 * r * theta.cos()).abs() < 0.05, "{coeffs:?}");
        assert!((coeffs[2] - r * r).abs() < 0.05, "{coeffs:?}");
    }

    #[test]
    fn test_burg_silent_frame() {
        assert!(burg(&[0.0; 200], 10).is_none());
        assert!(burg(&[1.0; 5], 10).is_none());
    }

    #[test]
    fn test_formant_track_of_synthetic_vowel() {
        let s = synthetic_vowel(
            120.0,
            &[(700.0, 80.0), (1200.0, 90.0), (2600.0, 120.0)],
            16000.0,
            0.3,
        );
        let track = FormantTrack::from_sound(&s, 5500.0).unwrap();
        assert!(track.frames().len() > 20);
        let f1 = track.mean(1, 0.0, 0.3).unwrap();
        let f2 = track.mean(2, 0.0, 0.3).unwrap();
        let f3 = track.mean(3, 0.0, 0.3).unwrap();
        assert!((f1 - 700.0).abs() < 120.0, "f1 = {f1}");
        assert!((f2 - 1200.0).abs() < 150.0, "f2 = {f2}");
        assert!((f3 - 2600.0).abs() < 250.0, "f3 = {f3}");
        for frame in track.frames() {
            assert!(frame.formants.iter().all(|f| f.bandwidth < MAX_BANDWIDTH));
        }
    }

    #[test]
    fn test_broad_pole_between_resonances_is_not_numbered() {
        let sr = 11000.0;
        let pole = |freq: f64, bw: f64| {
            Complex::from_polar((-PI * bw / sr).exp(), 2.0 * PI * freq / sr)
        };
        let roots = [
            pole(700.0, 60.0),
            pole(1200.0, 50.0),
            pole(2300.0, 1100.0),
            pole(2600.0, 150.0),
            pole(20.0, 40.0),
            pole(2300.0, 1100.0).conj(),
            pole(5480.0, 100.0),
        ];
        let formants = formants_from_roots(&roots, sr);
        let freqs: Vec<f64> = formants.iter().map(|f| f.frequency).collect();
        assert_eq!(freqs.len(), 3, "{freqs:?}");
        assert!((freqs[0] - 700.0).abs() < 1e-6);
        assert!((freqs[1] - 1200.0).abs() < 1e-6);
        assert!((freqs[2] - 2600.0).abs() < 1e-6);
        assert!((formants[2].bandwidth - 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_ceiling_changes_estimates() {
        let s = synthetic_vowel(
            120.0,
            &[(700.0, 80.0), (1200.0, 90.0), (2600.0, 120.0)],
            16000.0,
            0.3,
        );
        let male = FormantTrack::from_sound(&s, 4500.0).unwrap();
        let female = FormantTrack::from_sound(&s, 5500.0).unwrap();
        let differs = (1..=3).any(|n| {
            let a = male.mean(n, 0.0, 0.3).unwrap();
            let b = female.mean(n, 0.0, 0.3).unwrap();
            (a - b).abs() > 1e-6
        });
        assert!(differs);
    }

    #[test]
    fn test_mean_over_explicit_frames() {
        let frame = |time: f64, freqs: &[f64]| FormantFrame {
            time,
            formants: freqs
                .iter()
                .map(|&frequency| Formant {
                    frequency,
                    bandwidth: 50.0,
                })
                .collect(),
        };
        let track = FormantTrack::new(vec![
            frame(0.1, &[500.0, 1500.0]),
            frame(0.2, &[600.0]),
            frame(0.3, &[700.0, 1700.0]),
        ]);
        assert_eq!(track.mean(1, 0.0, 1.0), Some(600.0));
        assert_eq!(track.mean(2, 0.0, 1.0), Some(1600.0));
        assert_eq!(track.mean(1, 0.15, 0.25), Some(600.0));
        assert_eq!(track.mean(3, 0.0, 1.0), None);
        assert_eq!(track.mean(0, 0.0, 1.0), None);
    }

    #[test]
    fn test_too_short_for_window() {
        let s = Sound::new(vec![0.1; 100], 16000.0);
        assert!(matches!(
            FormantTrack::from_sound(&s, 5500.0),
            Err(AcousticsError::TooShort { .. })
        ));
    }
}
