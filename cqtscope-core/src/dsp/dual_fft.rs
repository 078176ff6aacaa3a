//! Two real channels through one complex FFT.
//!
//! The input ring carries left samples in the real part and right samples in
//! the imaginary part of a single complex buffer. One forward transform then
//! yields both channel spectra by symmetry, halving the per-frame FFT cost.

use rustfft::num_complex::Complex;

/// Recover the left and right channel spectra from the transform of a
/// packed stereo buffer.
///
/// With `F` the FFT of `left[n] + i*right[n]`, each output is twice the
/// conjugated DFT of its channel; since the spectral kernels are real and
/// only bin powers are consumed downstream, the conjugation is harmless.
/// Both outputs carry the full Hermitian continuation so kernel entries may
/// index any bin in `[0, N)`.
pub fn unpack_stereo(
    transform: &[Complex<f32>],
    left: &mut [Complex<f32>],
    right: &mut [Complex<f32>],
) {
    let n = transform.len();
    debug_assert_eq!(left.len(), n);
    debug_assert_eq!(right.len(), n);

    // The doubled DC term keeps the amplitude convention of the kernels.
    left[0] = Complex::new(2.0 * transform[0].re, 0.0);
    right[0] = Complex::new(2.0 * transform[0].im, 0.0);

    for x in 1..=n / 2 {
        let a = transform[x];
        let b = transform[n - x];
        let l = Complex::new(a.re + b.re, b.im - a.im);
        let r = Complex::new(a.im + b.im, a.re - b.re);
        left[x] = l;
        left[n - x] = l.conj();
        right[x] = r;
        right[n - x] = r.conj();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    /// Textbook O(n^2) DFT of a real signal, for cross-checking.
    fn naive_dft(signal: &[f32]) -> Vec<Complex<f32>> {
        let n = signal.len();
        (0..n)
            .map(|k| {
                let mut acc = Complex::new(0.0f64, 0.0);
                for (i, &s) in signal.iter().enumerate() {
                    let theta = -2.0 * std::f64::consts::PI * (k * i) as f64 / n as f64;
                    acc += Complex::new(s as f64 * theta.cos(), s as f64 * theta.sin());
                }
                Complex::new(acc.re as f32, acc.im as f32)
            })
            .collect()
    }

    fn test_signals(n: usize) -> (Vec<f32>, Vec<f32>) {
        // Deterministic, aperiodic, and distinct per channel.
        let left: Vec<f32> = (0..n).map(|i| ((i * i + 3) as f32 * 0.37).sin()).collect();
        let right: Vec<f32> = (0..n).map(|i| ((i * 7 + 1) as f32 * 0.11).cos()).collect();
        (left, right)
    }

    #[test]
    fn unpack_recovers_both_channel_spectra() {
        let n = 64;
        let (l_sig, r_sig) = test_signals(n);

        let mut packed: Vec<Complex<f32>> = l_sig
            .iter()
            .zip(&r_sig)
            .map(|(&l, &r)| Complex::new(l, r))
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        planner.plan_fft_forward(n).process(&mut packed);

        let mut left = vec![Complex::new(0.0f32, 0.0); n];
        let mut right = vec![Complex::new(0.0f32, 0.0); n];
        unpack_stereo(&packed, &mut left, &mut right);

        let l_ref = naive_dft(&l_sig);
        let r_ref = naive_dft(&r_sig);
        for x in 0..n {
            let expect_l = Complex::new(2.0 * l_ref[x].re, -2.0 * l_ref[x].im);
            let expect_r = Complex::new(2.0 * r_ref[x].re, -2.0 * r_ref[x].im);
            assert!(
                (left[x] - expect_l).norm() < 1e-3,
                "left bin {x}: {:?} vs {:?}",
                left[x],
                expect_l
            );
            assert!(
                (right[x] - expect_r).norm() < 1e-3,
                "right bin {x}: {:?} vs {:?}",
                right[x],
                expect_r
            );
        }
    }

    #[test]
    fn unpack_output_is_hermitian() {
        let n = 64;
        let (l_sig, r_sig) = test_signals(n);
        let mut packed: Vec<Complex<f32>> = l_sig
            .iter()
            .zip(&r_sig)
            .map(|(&l, &r)| Complex::new(l, r))
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        planner.plan_fft_forward(n).process(&mut packed);

        let mut left = vec![Complex::new(0.0f32, 0.0); n];
        let mut right = vec![Complex::new(0.0f32, 0.0); n];
        unpack_stereo(&packed, &mut left, &mut right);

        assert_eq!(left[0].im, 0.0);
        assert_eq!(right[0].im, 0.0);
        for x in 1..n {
            assert_eq!(left[n - x], left[x].conj());
            assert_eq!(right[n - x], right[x].conj());
        }
    }
}
