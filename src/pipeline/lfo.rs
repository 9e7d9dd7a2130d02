// Low-frequency modulators for melodic tracks. They are sampled once per
// trigger (not per audio sample) and can either transpose the note or
// perturb one synth parameter.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::params::{EngineKind, ParamKey, SynthParams};

pub const MIN_LFO_RATE: f32 = 0.01;
pub const DEFAULT_LFO_RATE: f32 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LfoWave {
    #[default]
    Sine,
    Triangle,
    RampUp,
    RampDown,
    Square,
    Random,
    ExpUp,
    ExpDown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LfoDestination {
    #[default]
    None,
    Transpose,
    Param(ParamKey),
}

impl TryFrom<String> for LfoDestination {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "none" => Ok(LfoDestination::None),
            "transpose" => Ok(LfoDestination::Transpose),
            other => ParamKey::from_name(other)
                .map(LfoDestination::Param)
                .ok_or_else(|| format!("unknown lfo destination '{other}'")),
        }
    }
}

impl From<LfoDestination> for String {
    fn from(d: LfoDestination) -> Self {
        match d {
            LfoDestination::None => "none".to_string(),
            LfoDestination::Transpose => "transpose".to_string(),
            LfoDestination::Param(key) => key.name().to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lfo {
    pub destination: LfoDestination,
    pub wave: LfoWave,
    pub depth: f32, // 0..1
    pub rate: f32,  // Hz
}

impl Default for Lfo {
    fn default() -> Self {
        Self {
            destination: LfoDestination::None,
            wave: LfoWave::Sine,
            depth: 0.0,
            rate: DEFAULT_LFO_RATE,
        }
    }
}

impl Lfo {
    pub fn is_active(&self) -> bool {
        self.depth > 0.0 && self.destination != LfoDestination::None
    }

    // An unset (zero) rate means the default rate, not the floor
    pub fn effective_rate(&self) -> f32 {
        if self.rate == 0.0 || !self.rate.is_finite() {
            DEFAULT_LFO_RATE
        } else {
            self.rate.max(MIN_LFO_RATE)
        }
    }

    pub fn clamped(self) -> Self {
        let depth = if self.depth.is_nan() { 0.0 } else { self.depth.clamp(0.0, 1.0) };
        let rate = if self.rate.is_finite() { self.rate.max(0.0) } else { DEFAULT_LFO_RATE };
        Self { depth, rate, ..self }
    }

    // Waveform value in [-1, 1] at `time` seconds
    pub fn value_at(&self, time: f64, rng: &mut impl Rng) -> f32 {
        let rate = self.effective_rate() as f64;
        let phase = (time * rate).rem_euclid(1.0) as f32;
        match self.wave {
            LfoWave::Sine => (phase * std::f32::consts::TAU).sin(),
            LfoWave::Triangle => {
                if phase < 0.5 { phase * 4.0 - 1.0 } else { 3.0 - phase * 4.0 }
            }
            LfoWave::RampUp => phase * 2.0 - 1.0,
            LfoWave::RampDown => (1.0 - phase) * 2.0 - 1.0,
            LfoWave::Square => if phase < 0.5 { 1.0 } else { -1.0 },
            LfoWave::Random => rng.gen_range(-1.0..1.0),
            LfoWave::ExpUp => phase * phase * 2.0 - 1.0,
            LfoWave::ExpDown => (1.0 - phase * phase) * 2.0 - 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Modulated {
    pub params: SynthParams,
    pub note_offset: f32, // semitones, not yet rounded
}

// Sum every active LFO into a transpose offset and a perturbed param set
pub fn apply_lfos(
    lfos: &[Lfo],
    engine: EngineKind,
    params: SynthParams,
    time: f64,
    rng: &mut impl Rng,
) -> Modulated {
    let spec = engine.spec();
    let mut out = Modulated { params, note_offset: 0.0 };
    for lfo in lfos.iter().filter(|l| l.is_active()) {
        let value = lfo.value_at(time, rng);
        match lfo.destination {
            LfoDestination::Transpose => out.note_offset += value * lfo.depth * 12.0,
            LfoDestination::Param(key) => {
                let range = spec.param(key).range();
                let next = out.params.get(key) + value * lfo.depth * range * 0.5;
                out.params.set(engine, key, next);
            }
            LfoDestination::None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn lfo(wave: LfoWave) -> Lfo {
        Lfo { destination: LfoDestination::Transpose, wave, depth: 1.0, rate: 1.0 }
    }

    #[test]
    fn waveforms_at_known_phases() {
        let mut rng = StdRng::seed_from_u64(1);
        let eps = 1e-5;
        assert!((lfo(LfoWave::Sine).value_at(0.25, &mut rng) - 1.0).abs() < eps);
        assert!((lfo(LfoWave::Triangle).value_at(0.0, &mut rng) + 1.0).abs() < eps);
        assert!((lfo(LfoWave::Triangle).value_at(0.5, &mut rng) - 1.0).abs() < eps);
        assert!((lfo(LfoWave::RampUp).value_at(0.75, &mut rng) - 0.5).abs() < eps);
        assert!((lfo(LfoWave::RampDown).value_at(0.75, &mut rng) + 0.5).abs() < eps);
        assert_eq!(lfo(LfoWave::Square).value_at(0.2, &mut rng), 1.0);
        assert_eq!(lfo(LfoWave::Square).value_at(0.7, &mut rng), -1.0);
        assert!((lfo(LfoWave::ExpUp).value_at(0.5, &mut rng) + 0.5).abs() < eps);
        assert!((lfo(LfoWave::ExpDown).value_at(0.5, &mut rng) - 0.5).abs() < eps);
    }

    #[test]
    fn every_wave_stays_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let waves = [
            LfoWave::Sine, LfoWave::Triangle, LfoWave::RampUp, LfoWave::RampDown,
            LfoWave::Square, LfoWave::Random, LfoWave::ExpUp, LfoWave::ExpDown,
        ];
        for wave in waves {
            for i in 0..200 {
                let v = lfo(wave).value_at(i as f64 * 0.037, &mut rng);
                assert!((-1.0..=1.0).contains(&v), "{wave:?} -> {v}");
            }
        }
    }

    #[test]
    fn rate_has_a_floor() {
        let mut rng = StdRng::seed_from_u64(1);
        let slow = Lfo { rate: 0.001, ..lfo(LfoWave::RampUp) };
        // at the floor rate of 0.01 Hz, 25 s is a quarter cycle
        assert!((slow.value_at(25.0, &mut rng) + 0.5).abs() < 1e-4);
    }

    #[test]
    fn zero_rate_runs_at_the_default() {
        let mut rng = StdRng::seed_from_u64(1);
        let unset = Lfo { rate: 0.0, ..lfo(LfoWave::RampUp) };
        assert_eq!(unset.effective_rate(), DEFAULT_LFO_RATE);
        // half a cycle at 0.5 Hz
        assert!(unset.value_at(1.0, &mut rng).abs() < 1e-4);
    }

    #[test]
    fn clamped_bounds_depth_and_rate() {
        let wild = Lfo { depth: 50.0, rate: f32::INFINITY, ..lfo(LfoWave::Sine) }.clamped();
        assert_eq!(wild.depth, 1.0);
        assert_eq!(wild.rate, DEFAULT_LFO_RATE);
        let negative = Lfo { depth: f32::NAN, rate: -3.0, ..lfo(LfoWave::Sine) }.clamped();
        assert_eq!(negative.depth, 0.0);
        assert_eq!(negative.rate, 0.0);
    }

    #[test]
    fn transpose_and_param_destinations() {
        let mut rng = StdRng::seed_from_u64(1);
        let engine = EngineKind::VirtualAnalog;
        let base = engine.default_params();
        let lfos = [
            Lfo { destination: LfoDestination::Transpose, wave: LfoWave::Square, depth: 0.5, rate: 1.0 },
            Lfo { destination: LfoDestination::Param(ParamKey::Timbre), wave: LfoWave::Square, depth: 0.2, rate: 1.0 },
            Lfo { destination: LfoDestination::Param(ParamKey::Decay), wave: LfoWave::Square, depth: 0.0, rate: 1.0 },
        ];
        let out = apply_lfos(&lfos, engine, base, 0.1, &mut rng);
        assert!((out.note_offset - 6.0).abs() < 1e-5);
        // timbre 0.5 + 1 * 0.2 * 1.0 * 0.5
        assert!((out.params.get(ParamKey::Timbre) - 0.6).abs() < 1e-5);
        assert_eq!(out.params.get(ParamKey::Decay), base.get(ParamKey::Decay));
    }

    #[test]
    fn param_modulation_is_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let engine = EngineKind::VirtualAnalog;
        let lfos = [Lfo {
            destination: LfoDestination::Param(ParamKey::Fm),
            wave: LfoWave::Square,
            depth: 1.0,
            rate: 1.0,
        }];
        let out = apply_lfos(&lfos, engine, engine.default_params(), 0.7, &mut rng);
        assert_eq!(out.params.get(ParamKey::Fm), 0.0);
    }

    #[test]
    fn destination_wire_names() {
        let d: LfoDestination = serde_json::from_str("\"harmonics\"").unwrap();
        assert_eq!(d, LfoDestination::Param(ParamKey::Harmonics));
        assert_eq!(serde_json::to_string(&LfoDestination::Transpose).unwrap(), "\"transpose\"");
        assert!(serde_json::from_str::<LfoDestination>("\"wobble\"").is_err());
    }
}
