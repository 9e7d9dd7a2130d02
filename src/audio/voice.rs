// One synthesized note. Every engine shares the same macro controls
// (harmonics / timbre / morph / fm / fade / volume); what they mean depends
// on the engine. Output is mono, duplicated to both channels.

use std::f32::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::frame::StereoFrame;
use crate::pipeline::params::{EngineKind, ParamKey, SynthParams};
use crate::pipeline::scale::midi_to_hz;

const ATTACK_SECS: f32 = 0.001;
const HOLD_FRACTION: f32 = 0.7; // envelope holds for 70% of the duration, then ramps down
const HEADROOM: f32 = 0.5;
const HAT_RATIOS: [f32; 6] = [2.0, 3.0, 4.16, 5.43, 6.79, 8.21];
const CHORDS: [&[f32]; 6] = [
    &[0.0, 4.0, 7.0],
    &[0.0, 3.0, 7.0],
    &[0.0, 4.0, 7.0, 11.0],
    &[0.0, 3.0, 7.0, 10.0],
    &[0.0, 5.0, 7.0],
    &[0.0, 7.0, 12.0],
];
const FORMANTS: [(f32, f32); 5] = [(800.0, 1150.0), (400.0, 1600.0), (350.0, 2300.0), (450.0, 800.0), (325.0, 700.0)];

// Chamberlin state-variable filter, enough for formants and resonant noise
#[derive(Clone, Copy, Debug, Default)]
struct Svf {
    low: f32,
    band: f32,
}

impl Svf {
    // returns (low, band, high)
    fn run(&mut self, x: f32, cutoff: f32, res: f32, sample_rate: f32) -> (f32, f32, f32) {
        let f = 2.0 * (PI * cutoff.clamp(20.0, sample_rate * 0.16) / sample_rate).sin();
        let q = 1.0 - res.clamp(0.0, 0.97);
        self.low += f * self.band;
        let high = x - self.low - q * self.band;
        self.band += f * high;
        (self.low, self.band, high)
    }
}

pub struct SynthVoice {
    engine: EngineKind,
    params: SynthParams,
    sample_rate: f32,
    freq: f32,
    duration: f32,
    t: f32,
    phases: [f32; 8],
    fm_phase: f32,
    aux_phase: f32,
    last: f32,
    filters: [Svf; 2],
    string: Vec<f32>,
    string_pos: usize,
    particle_freq: f32,
    rng: StdRng,
}

fn advance(phase: &mut f32, freq: f32, sample_rate: f32) -> f32 {
    let p = *phase;
    *phase = (p + freq / sample_rate).fract();
    p
}

fn sine(p: f32) -> f32 {
    (p * TAU).sin()
}

fn saw(p: f32) -> f32 {
    2.0 * p - 1.0
}

fn square(p: f32, width: f32) -> f32 {
    if p < width { 1.0 } else { -1.0 }
}

fn triangle(p: f32) -> f32 {
    if p < 0.5 { 4.0 * p - 1.0 } else { 3.0 - 4.0 * p }
}

impl SynthVoice {
    pub fn new(engine: EngineKind, params: SynthParams, duration: f32, sample_rate: f32, seed: u64) -> Self {
        let freq = midi_to_hz(params.get(ParamKey::Note));
        let mut rng = StdRng::seed_from_u64(seed);

        // Karplus-Strong needs its delay line primed with a filtered burst
        let string = if engine == EngineKind::String {
            let len = ((sample_rate / freq) as usize).max(2);
            let brightness = params.get(ParamKey::Timbre);
            let mut prev = 0.0f32;
            (0..len)
                .map(|_| {
                    let n: f32 = rng.gen_range(-1.0..1.0);
                    prev += (n - prev) * (0.2 + brightness * 0.8);
                    prev
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            engine,
            params,
            sample_rate,
            freq,
            duration,
            t: 0.0,
            phases: std::array::from_fn(|i| i as f32 * 0.13 % 1.0),
            fm_phase: 0.0,
            aux_phase: 0.0,
            last: 0.0,
            filters: [Svf::default(); 2],
            string,
            string_pos: 0,
            particle_freq: freq,
            rng,
        }
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn is_finished(&self) -> bool {
        self.t >= self.duration
    }

    fn envelope(&self) -> f32 {
        let (t, d) = (self.t, self.duration);
        if t >= d {
            return 0.0;
        }
        let outer = if t < ATTACK_SECS {
            t / ATTACK_SECS
        } else if t < d * HOLD_FRACTION {
            1.0
        } else {
            (d - t) / (d * (1.0 - HOLD_FRACTION))
        };
        outer * (-t / (d * 0.35)).exp()
    }

    pub fn next_frame(&mut self) -> StereoFrame {
        if self.is_finished() {
            return StereoFrame::zero();
        }
        let env = self.envelope();
        let p = |k: ParamKey| self.params.get(k);
        let (fade, volume, fm) = (p(ParamKey::Fade), p(ParamKey::Volume), p(ParamKey::Fm));

        // global pitch modulation from the FM knob (the FM engine uses it as index instead)
        let vibrato = if self.engine == EngineKind::Fm {
            0.0
        } else {
            sine(advance(&mut self.fm_phase, self.freq * 2.0, self.sample_rate)) * fm * 0.02
        };
        let freq = self.freq * (1.0 + vibrato);

        let main = self.render(freq);
        let aux = sine(advance(&mut self.aux_phase, freq, self.sample_rate));
        let out = (main * (1.0 - fade) + aux * fade) * volume * env * HEADROOM;

        self.t += 1.0 / self.sample_rate;
        StereoFrame::mono(if out.is_finite() { out } else { 0.0 })
    }

    fn noise(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }

    fn render(&mut self, freq: f32) -> f32 {
        let sr = self.sample_rate;
        let t = self.t;
        let h = self.params.get(ParamKey::Harmonics);
        let timbre = self.params.get(ParamKey::Timbre);
        let morph = self.params.get(ParamKey::Morph);
        let fm = self.params.get(ParamKey::Fm);

        match self.engine {
            EngineKind::VirtualAnalog => {
                let ph = advance(&mut self.phases[0], freq, sr);
                let raw = saw(ph) * (1.0 - h) + square(ph, 0.5 + (timbre - 0.5) * 0.9) * h;
                (raw * (1.0 + morph * 3.0) * PI * 0.5).sin()
            }
            EngineKind::Waveshaper => {
                let ph = advance(&mut self.phases[0], freq, sr);
                let src = sine(ph) * (1.0 - morph) + triangle(ph) * morph;
                ((src * (1.0 + h * 5.0) + (timbre - 0.5)) * PI * 0.5).sin()
            }
            EngineKind::Fm => {
                let ratio = 0.5 + h * 7.5;
                let index = timbre * 8.0 + fm;
                let pm = advance(&mut self.phases[1], freq * ratio, sr);
                let modulator = (pm * TAU + morph * self.last * PI).sin();
                self.last = modulator;
                let pc = advance(&mut self.phases[0], freq, sr);
                (pc * TAU + index * modulator).sin()
            }
            EngineKind::Granular | EngineKind::Swarm => {
                let count = 2 + (h * 4.0).round() as usize;
                let spread = timbre * 0.03;
                let mut sum = 0.0;
                for i in 0..count {
                    let detune = 1.0 + spread * (i as f32 - count as f32 / 2.0) / count as f32;
                    if self.rng.gen_bool((morph * 0.001) as f64) {
                        self.phases[i] = self.rng.gen_range(0.0..1.0);
                    }
                    let ph = advance(&mut self.phases[i], freq * detune, sr);
                    sum += if self.engine == EngineKind::Granular { sine(ph) } else { saw(ph) };
                }
                sum / count as f32
            }
            EngineKind::Additive => {
                let ph = advance(&mut self.phases[0], freq, sr);
                (1..=8)
                    .map(|k| {
                        let k = k as f32;
                        let amp = k.powf(-(2.0 - timbre * 1.5)) * if k as u32 % 2 == 0 { 1.0 - h } else { 1.0 };
                        amp * sine((ph * k * (1.0 + morph * 0.002 * k)).fract())
                    })
                    .sum::<f32>()
                    * 0.6
            }
            EngineKind::Wavetable => {
                let octave = if h > 0.5 { 2.0 } else { 1.0 };
                let ph = advance(&mut self.phases[0], freq * octave, sr).powf(1.0 + morph * 3.0);
                let shapes = [sine(ph), triangle(ph), saw(ph), square(ph, 0.5)];
                let pos = timbre * 3.0;
                let i = (pos.floor() as usize).min(2);
                let frac = pos - i as f32;
                shapes[i] * (1.0 - frac) + shapes[i + 1] * frac
            }
            EngineKind::Chord => {
                let chord = CHORDS[((h * CHORDS.len() as f32) as usize).min(CHORDS.len() - 1)];
                let mut sum = 0.0;
                for (i, semis) in chord.iter().enumerate() {
                    let inverted = if (i as f32) < timbre * chord.len() as f32 { 12.0 } else { 0.0 };
                    let f = freq * 2.0f32.powf((semis + inverted) / 12.0);
                    let ph = advance(&mut self.phases[i], f, sr);
                    sum += saw(ph) * (1.0 - morph) + square(ph, 0.5) * morph;
                }
                sum / chord.len() as f32
            }
            EngineKind::Vowel => {
                let pos = timbre * (FORMANTS.len() - 1) as f32;
                let i = (pos.floor() as usize).min(FORMANTS.len() - 2);
                let frac = pos - i as f32;
                let shift = 0.7 + h * 0.6;
                let f1 = (FORMANTS[i].0 * (1.0 - frac) + FORMANTS[i + 1].0 * frac) * shift;
                let f2 = (FORMANTS[i].1 * (1.0 - frac) + FORMANTS[i + 1].1 * frac) * shift;
                let src = saw(advance(&mut self.phases[0], freq, sr)) * (1.0 - morph) + self.noise() * morph;
                let (_, b1, _) = self.filters[0].run(src, f1, 0.9, sr);
                let (_, b2, _) = self.filters[1].run(src, f2, 0.9, sr);
                b1 + b2 * 0.6
            }
            EngineKind::Noise => {
                let n = self.noise();
                let cutoff = 100.0 + timbre * timbre * 8000.0;
                let (low, band, high) = self.filters[0].run(n, cutoff, morph, sr);
                // harmonics sweeps lowpass -> bandpass -> highpass
                if h < 0.5 {
                    low * (1.0 - h * 2.0) + band * h * 2.0
                } else {
                    band * (2.0 - h * 2.0) + high * (h * 2.0 - 1.0)
                }
            }
            EngineKind::Particle => {
                let density = h * h * 0.02;
                let impulse = if self.rng.gen_bool(density.clamp(0.0, 1.0) as f64) {
                    if morph > 0.0 {
                        let spread = 1.0 + self.rng.gen_range(-morph..=morph);
                        self.particle_freq = freq * spread.max(0.1);
                    }
                    self.noise().signum()
                } else {
                    0.0
                };
                let cutoff = self.particle_freq * (0.5 + timbre * 2.0);
                let (_, band, _) = self.filters[0].run(impulse, cutoff, 0.95, sr);
                band * 4.0
            }
            EngineKind::String => {
                let len = self.string.len();
                if len < 2 {
                    return 0.0;
                }
                let here = self.string_pos;
                let next = (here + 1) % len;
                let out = self.string[here];
                let loss = 0.999 - morph * 0.01;
                let averaged = (self.string[here] + self.string[next]) * 0.5;
                self.string[here] = (averaged * (1.0 - h * 0.5) + self.string[here] * h * 0.5) * loss;
                self.string_pos = next;
                out
            }
            EngineKind::Modal => {
                let ratios = [1.0, 2.0 + h * 2.2, 3.0 + h * 3.1, 4.5 + h * 5.0];
                let mut sum = 0.0;
                for (k, ratio) in ratios.iter().enumerate() {
                    let ph = advance(&mut self.phases[k], freq * ratio, sr);
                    let weight = timbre.powi(k as i32).max(0.05);
                    let decay = (-t * (k as f32 + 1.0) * (1.0 + morph * 8.0)).exp();
                    sum += sine(ph) * weight * decay;
                }
                let strike = self.noise() * (-t * 400.0).exp() * 0.3;
                sum * 0.5 + strike
            }
            EngineKind::Kick => {
                let sweep = 1.0 + (2.0 + morph * 6.0) * (-t * (20.0 + h * 60.0)).exp();
                let ph = advance(&mut self.phases[0], freq * sweep, sr);
                let body = (sine(ph) * (1.0 + morph * 2.0)).tanh();
                let click = self.noise() * (-t * 300.0).exp() * timbre;
                body + click * 0.5
            }
            EngineKind::Snare => {
                let body_decay = (-t * 30.0 * (1.5 - h)).exp();
                let b1 = sine(advance(&mut self.phases[0], freq, sr));
                let b2 = sine(advance(&mut self.phases[1], freq * 1.47, sr));
                let n = self.noise();
                let (_, _, noise) = self.filters[0].run(n, 1500.0 + timbre * 4000.0, 0.2, sr);
                (b1 * 0.5 + b2 * 0.3) * body_decay * (1.0 - morph * 0.5) + noise * morph * (0.5 + timbre * 0.5)
            }
            EngineKind::HiHat => {
                let mut metal = 0.0;
                for (i, ratio) in HAT_RATIOS.iter().enumerate() {
                    metal += square(advance(&mut self.phases[i], freq * ratio * 0.25, sr), 0.5);
                }
                let src = metal / HAT_RATIOS.len() as f32 * (1.0 - morph) + self.noise() * morph;
                let (_, _, high) = self.filters[0].run(src, 3000.0 + h * 5000.0, timbre * 0.5, sr);
                high
            }
        }
    }
}
