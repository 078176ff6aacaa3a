//! Spectral kernel design for the Brown-Puckette constant-Q transform.
//!
//! One windowed complex sinusoid per output column is built in the time
//! domain, transformed once, and reduced to a sparse list of frequency-domain
//! coefficients. At evaluation time each column is then a short inner product
//! against the shared input FFT instead of its own windowed transform.

use std::f64::consts::PI;

use rustfft::{num_complex::Complex, Fft};

use crate::error::{try_alloc, Result};
use crate::listener::{BuildEvent, BuildListener};
use crate::{CqtOptions, VIDEO_WIDTH};

/// 16 bins per semitone starting just below E0; column 1919 lands on D#10.
const BASE_FREQ: f64 = 20.051392800492;

/// Base fraction of total absolute coefficient mass that sparsification may
/// discard; scaled by the `coeff_clamp` option.
const COEFF_CLAMP: f32 = 1.0e-4;

/// One retained frequency-domain kernel entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseCoeff {
    pub index: u32,
    pub value: f32,
}

/// Center frequency of output column `k`, in Hz.
pub fn column_frequency(k: usize) -> f64 {
    BASE_FREQ * (k as f64 / 192.0).exp2()
}

/// Design the sparse spectral kernel for every output column.
///
/// `fft` must be a forward plan of the engine's FFT length; `scratch` its
/// inplace scratch buffer. Returns one coefficient list per column, each
/// sorted by ascending coefficient magnitude.
pub(crate) fn design_kernels(
    rate: u32,
    opts: &CqtOptions,
    fft: &dyn Fft<f32>,
    scratch: &mut [Complex<f32>],
    listener: &mut impl BuildListener,
) -> Result<Vec<Vec<SparseCoeff>>> {
    let fft_len = fft.len();
    let max_len = rate as f64 * opts.time_clamp;
    let mut time_buf = try_alloc(fft_len, Complex::new(0.0f32, 0.0), "kernel time buffer")?;
    let mut kernels = Vec::new();
    kernels
        .try_reserve_exact(VIDEO_WIDTH)
        .map_err(|_| crate::CqtError::Resource("kernel table".into()))?;

    listener.on_event(BuildEvent::Started { columns: VIDEO_WIDTH, fft_len });
    let mut num_coeffs = 0;
    for k in 0..VIDEO_WIDTH {
        fill_time_kernel(&mut time_buf, rate as f64, column_frequency(k), max_len, opts.volume);
        fft.process_with_scratch(&mut time_buf, scratch);

        // The time-domain kernel is Hermitian-symmetric about fft_len/2, so
        // the transform is real; the imaginary parts are rounding noise.
        let coeffs = sparsify(&time_buf, opts.coeff_clamp * COEFF_CLAMP)?;
        num_coeffs += coeffs.len();
        kernels.push(coeffs);
        listener.on_event(BuildEvent::ColumnDone { index: k, total: VIDEO_WIDTH });
    }
    listener.on_event(BuildEvent::Finished { fft_len, coefficients: num_coeffs });
    Ok(kernels)
}

/// Fill `buf` with the windowed complex sinusoid for one column.
///
/// The window is Albert H. Nuttall's 4-term "very good sidelobe" window
/// (-93.32 dB peak sidelobe, 18 dB/octave asymptotic decay), coefficients
/// normalized to a0 = 1. The sinusoid and the window cosine are both advanced
/// by phasor rotation, one step in, so the sample at x = 1 already uses the
/// once-advanced phasor.
fn fill_time_kernel(buf: &mut [Complex<f32>], rate: f64, freq: f64, max_len: f64, volume: f64) {
    const A0: f64 = 0.355768;
    const A1: f64 = 0.487396 / A0;
    const A2: f64 = 0.144232 / A0;
    const A3: f64 = 0.012604 / A0;

    let fft_len = buf.len();
    let hlen = fft_len / 2;

    // Desired length for a constant Q of 16 bins/semitone, harmonically
    // clamped so low columns stay inside the FFT window while high columns
    // stay time-accurate.
    let tlen = rate * (24.0 * 16.0) / freq;
    let tlen = tlen * max_len / (tlen + max_len);
    let scale = (1.0 / tlen) * volume * (1.0 / fft_len as f64);

    buf[0] = Complex::new(0.0, 0.0);
    buf[hlen] = Complex::new(((1.0 + A1 + A2 + A3) * scale) as f32, 0.0);

    let (sv_step, cv_step) = (2.0 * PI * freq * (1.0 / rate)).sin_cos();
    let (sw_step, cw_step) = (2.0 * PI * (1.0 / tlen)).sin_cos();
    let (mut sv, mut cv) = (sv_step, cv_step);
    let (mut sw, mut cw) = (sw_step, cw_step);

    let mut x = 1;
    while (x as f64) < 0.5 * tlen {
        let cw2 = cw * cw - sw * sw;
        let sw2 = cw * sw + sw * cw;
        let cw3 = cw * cw2 - sw * sw2;
        let w = (1.0 + A1 * cw + A2 * cw2 + A3 * cw3) * scale;

        // Conjugate pair about the center keeps the transform real.
        buf[hlen + x] = Complex::new((w * cv) as f32, (w * sv) as f32);
        buf[hlen - x] = Complex::new((w * cv) as f32, -(w * sv) as f32);

        let cv_next = cv * cv_step - sv * sv_step;
        sv = sv * cv_step + cv * sv_step;
        cv = cv_next;
        let cw_next = cw * cw_step - sw * sw_step;
        sw = sw * cw_step + cw * sw_step;
        cw = cw_next;
        x += 1;
    }
    for x in x..hlen {
        buf[hlen + x] = Complex::new(0.0, 0.0);
        buf[hlen - x] = Complex::new(0.0, 0.0);
    }
}

/// Reduce a real-valued frequency-domain kernel to its significant entries.
///
/// Coefficients are sorted by ascending magnitude and the largest prefix
/// whose absolute mass stays within `fraction` of the total is discarded;
/// the retained suffix (still in ascending-magnitude order) is returned.
fn sparsify(spectrum: &[Complex<f32>], fraction: f32) -> Result<Vec<SparseCoeff>> {
    let mut sorted: Vec<SparseCoeff> = spectrum
        .iter()
        .enumerate()
        .map(|(i, c)| SparseCoeff { index: i as u32, value: c.re })
        .collect();
    sorted.sort_unstable_by(|a, b| a.value.abs().total_cmp(&b.value.abs()));

    let total: f32 = sorted.iter().map(|c| c.value.abs()).sum();
    let threshold = total * fraction;

    let mut cut = 0;
    let mut partial = 0.0f32;
    for (i, c) in sorted.iter().enumerate() {
        partial += c.value.abs();
        if partial > threshold {
            cut = i;
            break;
        }
    }

    let tail = &sorted[cut..];
    let mut coeffs = Vec::new();
    coeffs
        .try_reserve_exact(tail.len())
        .map_err(|_| crate::CqtError::Resource(format!("sparse kernel ({} entries)", tail.len())))?;
    coeffs.extend_from_slice(tail);
    Ok(coeffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn sparsify_values(values: &[f32], fraction: f32) -> Vec<SparseCoeff> {
        let spectrum: Vec<Complex<f32>> =
            values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        sparsify(&spectrum, fraction).unwrap()
    }

    #[test]
    fn column_frequencies_span_ten_octaves() {
        assert!((column_frequency(0) - 20.051392800492).abs() < 1e-9);
        // 192 bins per octave
        assert!((column_frequency(192) / column_frequency(0) - 2.0).abs() < 1e-12);
        let top = column_frequency(1919);
        assert!(top > 20_000.0 && top < 21_000.0, "top bin at {top} Hz");
    }

    #[test]
    fn sparsify_discards_minimal_prefix() {
        let coeffs = sparsify_values(&[0.1, -0.2, 0.3, 5.0], 0.1);
        // total = 5.6, threshold = 0.56: 0.1 + 0.2 stays below, adding 0.3 exceeds
        assert_eq!(coeffs.len(), 2);
        assert_eq!(coeffs[0], SparseCoeff { index: 2, value: 0.3 });
        assert_eq!(coeffs[1], SparseCoeff { index: 3, value: 5.0 });

        let discarded: f32 = 0.1 + 0.2;
        let total = 5.6;
        assert!(discarded <= 0.1 * total);
        assert!(discarded + 0.3 > 0.1 * total, "suffix must be minimal");
    }

    #[test]
    fn sparsify_keeps_everything_under_tight_tolerance() {
        let coeffs = sparsify_values(&[1.0, 2.0, 3.0], 1e-9);
        assert_eq!(coeffs.len(), 3);
    }

    #[test]
    fn sparsify_output_is_sorted_by_magnitude() {
        let coeffs = sparsify_values(&[4.0, -1.0, 3.0, -2.0, 0.5], 0.05);
        for pair in coeffs.windows(2) {
            assert!(pair[0].value.abs() <= pair[1].value.abs());
        }
    }

    #[test]
    fn time_kernel_transform_is_real() {
        let fft_len = 8192;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);
        let mut scratch = vec![Complex::new(0.0f32, 0.0); fft.get_inplace_scratch_len()];

        let mut buf = vec![Complex::new(0.0f32, 0.0); fft_len];
        let max_len = 44100.0 * 0.17;
        fill_time_kernel(&mut buf, 44100.0, column_frequency(960), max_len, 16.0);
        fft.process_with_scratch(&mut buf, &mut scratch);

        let re_mass: f32 = buf.iter().map(|c| c.re.abs()).sum();
        let im_mass: f32 = buf.iter().map(|c| c.im.abs()).sum();
        assert!(
            im_mass < 1e-3 * re_mass,
            "imaginary mass {im_mass} not negligible against {re_mass}"
        );
    }

    #[test]
    fn window_length_is_harmonically_clamped() {
        // The effective window never reaches the configured maximum, and the
        // top columns are much shorter than the bottom ones.
        let rate = 44100.0;
        let max_len = rate * 0.17;
        let tlen = |k: usize| {
            let t = rate * 384.0 / column_frequency(k);
            t * max_len / (t + max_len)
        };
        assert!(tlen(0) < max_len);
        assert!(tlen(1919) < tlen(0) / 100.0);
    }

    #[test]
    fn designed_kernels_cover_every_column() {
        let fft_len = 8192;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);
        let mut scratch = vec![Complex::new(0.0f32, 0.0); fft.get_inplace_scratch_len()];

        let opts = CqtOptions::default();
        let mut listener = crate::listener::NoOpListener;
        let kernels =
            design_kernels(44100, &opts, fft.as_ref(), &mut scratch, &mut listener).unwrap();

        assert_eq!(kernels.len(), VIDEO_WIDTH);
        for (k, kernel) in kernels.iter().enumerate() {
            assert!(!kernel.is_empty(), "column {k} has an empty kernel");
            assert!(kernel.len() < fft_len, "column {k} kept everything");
            for c in kernel {
                assert!((c.index as usize) < fft_len);
            }
        }
    }
}
