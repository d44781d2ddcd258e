//! Time-domain normalized cross-correlation between the ring buffer and a
//! reference waveform, evaluated at every valid offset via FFT convolution.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// References with a standard deviation below this are degenerate (silence
/// or DC) and score a hard zero.
const MIN_REF_STD: f64 = 1e-8;
/// Floor for the local window variance, so near-silent windows cannot blow
/// the score up through division.
const MIN_WINDOW_VAR: f64 = 1e-10;

/// Peak NCC of `reference` slid across `window`. Range is approximately
/// [-1, 1]; values near 1 indicate the reference waveform is present.
///
/// Returns 0.0 when the window is shorter than the reference or the
/// reference is degenerate.
pub fn ncc_peak(window: &[f32], reference: &[f32]) -> f32 {
    let n = reference.len();
    if n == 0 || window.len() < n {
        return 0.0;
    }

    let reference: Vec<f64> = reference.iter().map(|&v| v as f64).collect();
    let ref_mean = reference.iter().sum::<f64>() / n as f64;
    let ref_std = (reference.iter().map(|v| (v - ref_mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    if ref_std < MIN_REF_STD {
        return 0.0;
    }

    let signal: Vec<f64> = window.iter().map(|&v| v as f64).collect();
    let signal_sq: Vec<f64> = signal.iter().map(|v| v * v).collect();
    // Convolving with the time-reversed centered reference gives the
    // sliding dot product at every valid offset.
    let centered_rev: Vec<f64> = reference.iter().rev().map(|v| v - ref_mean).collect();
    let ones = vec![1.0f64; n];

    let mut planner = FftPlanner::<f64>::new();
    let corr = convolve_valid(&signal, &centered_rev, &mut planner);
    let window_sums = convolve_valid(&signal, &ones, &mut planner);
    let window_sq_sums = convolve_valid(&signal_sq, &ones, &mut planner);

    let nf = n as f64;
    let mut best = f64::NEG_INFINITY;
    for k in 0..corr.len() {
        let local_mean = window_sums[k] / nf;
        let local_var = (window_sq_sums[k] / nf - local_mean * local_mean).max(MIN_WINDOW_VAR);
        let ncc = corr[k] / (local_var.sqrt() * ref_std * nf);
        if ncc > best {
            best = ncc;
        }
    }
    best as f32
}

/// Valid-mode linear convolution of `signal` with `kernel` via FFT.
/// Output length is `signal.len() - kernel.len() + 1`.
fn convolve_valid(signal: &[f64], kernel: &[f64], planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let m = signal.len();
    let n = kernel.len();
    debug_assert!(n <= m && n > 0);

    let size = (m + n - 1).next_power_of_two();
    let fft = planner.plan_fft_forward(size);
    let ifft = planner.plan_fft_inverse(size);

    let mut a: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v, 0.0)).collect();
    a.resize(size, Complex::new(0.0, 0.0));
    let mut b: Vec<Complex<f64>> = kernel.iter().map(|&v| Complex::new(v, 0.0)).collect();
    b.resize(size, Complex::new(0.0, 0.0));

    fft.process(&mut a);
    fft.process(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    ifft.process(&mut a);

    let scale = 1.0 / size as f64;
    a[n - 1..m].iter().map(|c| c.re * scale).collect()
}
