use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};
use rand::Rng;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::frame::StereoFrame;

pub const CURVE_SAMPLES: usize = 256;
pub const MAX_DELAY_SECS: f32 = 2.0;
const CONV_BLOCK: usize = 128;

// -- waveshaping --

// tanh(x*a)/tanh(a): unity at the edges, softer knee as `a` grows
pub fn tanh_curve(amount: f32) -> Vec<f32> {
    let norm = amount.tanh();
    (0..CURVE_SAMPLES)
        .map(|i| {
            let x = curve_x(i);
            if norm.abs() < 1e-6 { x } else { (x * amount).tanh() / norm }
        })
        .collect()
}

// (e^kx - e^-kx)/(e^kx + e^-kx) with k = amount*50, which is just tanh(kx);
// tanh stays finite where the exponentials would overflow
pub fn distortion_curve(amount: f32) -> Vec<f32> {
    let k = amount * 50.0;
    (0..CURVE_SAMPLES).map(|i| (k * curve_x(i)).tanh()).collect()
}

fn curve_x(i: usize) -> f32 {
    i as f32 * 2.0 / CURVE_SAMPLES as f32 - 1.0
}

// Input clamped to [-1, 1], linear interpolation between curve points
pub fn shape(curve: &[f32], x: f32) -> f32 {
    match curve.len() {
        0 => x,
        1 => curve[0],
        n => {
            let x = if x.is_nan() { 0.0 } else { x.clamp(-1.0, 1.0) };
            let v = (n - 1) as f32 * (x + 1.0) * 0.5;
            let i = (v.floor() as usize).min(n - 2);
            let frac = v - i as f32;
            curve[i] + (curve[i + 1] - curve[i]) * frac
        }
    }
}

// -- filters --

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    BandPass,
}

pub struct StereoFilter {
    // None when the coefficients can't be built; the node then passes audio through
    stages: Option<(DirectForm2Transposed<f32>, DirectForm2Transposed<f32>)>,
}

impl StereoFilter {
    pub fn new(mode: FilterMode, sample_rate: f32, freq: f32, q: f32) -> Self {
        let kind = match mode {
            FilterMode::LowPass => biquad::Type::LowPass,
            FilterMode::BandPass => biquad::Type::BandPass,
        };
        let freq = freq.clamp(10.0, sample_rate * 0.49);
        let stages = Coefficients::<f32>::from_params(kind, sample_rate.hz(), freq.hz(), q.max(0.01))
            .ok()
            .map(|c| (DirectForm2Transposed::<f32>::new(c), DirectForm2Transposed::<f32>::new(c)));
        Self { stages }
    }

    pub fn process(&mut self, x: StereoFrame) -> StereoFrame {
        match &mut self.stages {
            Some((l, r)) => StereoFrame { left: l.run(x.left), right: r.run(x.right) },
            None => x,
        }
    }
}

// -- delay --

pub struct DelayLine {
    buf: Vec<StereoFrame>,
    write: usize,
    delay: usize, // samples, always >= 1
}

impl DelayLine {
    pub fn new(sample_rate: f32, seconds: f32) -> Self {
        let max = (MAX_DELAY_SECS * sample_rate).ceil().max(1.0) as usize;
        let wanted = (seconds.clamp(0.0, MAX_DELAY_SECS) * sample_rate).round() as usize;
        Self { buf: vec![StereoFrame::zero(); max + 1], write: 0, delay: wanted.clamp(1, max) }
    }

    pub fn delay_samples(&self) -> usize {
        self.delay
    }

    pub fn read(&self) -> StereoFrame {
        let len = self.buf.len();
        self.buf[(self.write + len - self.delay) % len]
    }

    pub fn write(&mut self, x: StereoFrame) {
        self.buf[self.write] = x;
        self.write = (self.write + 1) % self.buf.len();
    }
}

// -- reverb --

// Noise with a quadratic fade, independent per channel
pub fn impulse_response(sample_rate: f32, seconds: f32, rng: &mut impl Rng) -> [Vec<f32>; 2] {
    let len = ((sample_rate * seconds) as usize).max(1);
    std::array::from_fn(|_| {
        (0..len)
            .map(|i| {
                let fade = 1.0 - i as f32 / len as f32;
                rng.gen_range(-1.0f32..1.0) * fade * fade
            })
            .collect()
    })
}

struct ConvChannel {
    partitions: Vec<Vec<Complex<f32>>>, // IR spectra, one per block
    history: Vec<Vec<Complex<f32>>>,    // input spectra, newest at `head`
    head: usize,
    window: Vec<f32>, // previous block ++ current block
    out_block: Vec<f32>,
}

// Uniformly partitioned overlap-save convolution. One block of latency.
pub struct Convolver {
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    channels: [ConvChannel; 2],
    pos: usize,
    time_buf: Vec<f32>,
    spec_buf: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
    scratch_fwd: Vec<Complex<f32>>,
    scratch_inv: Vec<Complex<f32>>,
}

impl Convolver {
    pub fn new(ir: [Vec<f32>; 2]) -> Self {
        let fft_size = CONV_BLOCK * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);
        let mut scratch_fwd = r2c.make_scratch_vec();

        let channels = ir.map(|taps| {
            let mut partitions: Vec<Vec<Complex<f32>>> = taps
                .chunks(CONV_BLOCK)
                .map(|chunk| {
                    let mut padded = vec![0.0; fft_size];
                    padded[..chunk.len()].copy_from_slice(chunk);
                    let mut spectrum = r2c.make_output_vec();
                    if r2c.process_with_scratch(&mut padded, &mut spectrum, &mut scratch_fwd).is_err() {
                        spectrum.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
                    }
                    spectrum
                })
                .collect();
            if partitions.is_empty() {
                partitions.push(r2c.make_output_vec());
            }
            let history = vec![r2c.make_output_vec(); partitions.len()];
            ConvChannel {
                partitions,
                history,
                head: 0,
                window: vec![0.0; fft_size],
                out_block: vec![0.0; CONV_BLOCK],
            }
        });

        Self {
            time_buf: vec![0.0; fft_size],
            spec_buf: r2c.make_output_vec(),
            acc: r2c.make_output_vec(),
            scratch_inv: c2r.make_scratch_vec(),
            scratch_fwd,
            r2c,
            c2r,
            channels,
            pos: 0,
        }
    }

    pub fn process(&mut self, x: StereoFrame) -> StereoFrame {
        let [l, r] = &mut self.channels;
        let y = StereoFrame { left: l.out_block[self.pos], right: r.out_block[self.pos] };
        l.window[CONV_BLOCK + self.pos] = x.left;
        r.window[CONV_BLOCK + self.pos] = x.right;
        self.pos += 1;
        if self.pos == CONV_BLOCK {
            self.pos = 0;
            self.run_block(0);
            self.run_block(1);
        }
        y
    }

    fn run_block(&mut self, channel: usize) {
        let Self { r2c, c2r, channels, time_buf, spec_buf, acc, scratch_fwd, scratch_inv, .. } = self;
        let ch = &mut channels[channel];
        let n = ch.partitions.len();

        time_buf.copy_from_slice(&ch.window);
        ch.window.copy_within(CONV_BLOCK.., 0);
        if r2c.process_with_scratch(time_buf, spec_buf, scratch_fwd).is_err() {
            ch.out_block.fill(0.0);
            return;
        }
        ch.head = (ch.head + n - 1) % n;
        ch.history[ch.head].copy_from_slice(spec_buf);

        acc.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        for (k, h) in ch.partitions.iter().enumerate() {
            let x = &ch.history[(ch.head + k) % n];
            for (a, (x, h)) in acc.iter_mut().zip(x.iter().zip(h)) {
                *a += x * h;
            }
        }
        // c2r rejects non-zero imaginary parts at DC and Nyquist
        if let Some(first) = acc.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = acc.last_mut() {
            last.im = 0.0;
        }

        if c2r.process_with_scratch(acc, time_buf, scratch_inv).is_err() {
            ch.out_block.fill(0.0);
            return;
        }
        let scale = 1.0 / time_buf.len() as f32;
        for (o, t) in ch.out_block.iter_mut().zip(&time_buf[CONV_BLOCK..]) {
            *o = t * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn tanh_curve_is_normalized() {
        let curve = tanh_curve(5.0);
        assert_eq!(curve.len(), CURVE_SAMPLES);
        assert!((curve[0] + 1.0).abs() < 1e-6);
        assert!(curve[128].abs() < 1e-6);
        assert!(curve.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn distortion_curve_is_finite_when_hot() {
        let curve = distortion_curve(1.0);
        assert!(curve.iter().all(|v| v.is_finite() && v.abs() <= 1.0));
        assert!((curve[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn shaper_interpolates_and_clamps() {
        let curve = [-1.0, 0.0, 1.0];
        assert_eq!(shape(&curve, 0.0), 0.0);
        assert!((shape(&curve, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(shape(&curve, 3.0), 1.0);
        assert_eq!(shape(&curve, -3.0), -1.0);
        assert_eq!(shape(&curve, f32::NAN), 0.0);
    }

    #[test]
    fn delay_line_delays_exactly() {
        let mut d = DelayLine::new(1000.0, 0.005);
        assert_eq!(d.delay_samples(), 5);
        let mut out = vec![];
        for i in 0..10 {
            out.push(d.read().left);
            d.write(StereoFrame::mono(if i == 0 { 1.0 } else { 0.0 }));
        }
        assert_eq!(out[5], 1.0);
        assert_eq!(out.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn delay_line_never_drops_below_one_sample() {
        assert_eq!(DelayLine::new(44100.0, 0.0).delay_samples(), 1);
        assert_eq!(DelayLine::new(100.0, 99.0).delay_samples(), 200);
    }

    #[test]
    fn convolver_with_a_shifted_impulse() {
        let mut ir = vec![0.0; 300];
        ir[200] = 0.5;
        let mut conv = Convolver::new([ir.clone(), ir]);
        let mut out = vec![];
        for i in 0..600 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            out.push(conv.process(StereoFrame::mono(x)).left);
        }
        // one block of latency on top of the IR's own offset
        let peak = CONV_BLOCK + 200;
        assert!((out[peak] - 0.5).abs() < 1e-4, "got {}", out[peak]);
        for (i, v) in out.iter().enumerate().filter(|(i, _)| *i != peak) {
            assert!(v.abs() < 1e-4, "leak at {i}: {v}");
        }
    }

    #[test]
    fn impulse_response_fades_out() {
        let mut rng = StdRng::seed_from_u64(2);
        let [l, r] = impulse_response(1000.0, 0.5, &mut rng);
        assert_eq!(l.len(), 500);
        assert_ne!(l, r);
        assert!(l.iter().all(|v| v.abs() <= 1.0));
        assert!(l[499].abs() < 1e-4);
    }

    #[test]
    fn bandpass_stays_finite() {
        let mut f = StereoFilter::new(FilterMode::BandPass, 44100.0, 440.0, 20.0);
        for i in 0..4410 {
            let y = f.process(StereoFrame::mono(if i % 100 == 0 { 1.0 } else { 0.0 }));
            assert!(y.is_finite());
        }
    }
}
