// Morphing: glide a track's live params toward a randomly rolled target.
// The slider position is applied straight into `params`, measured from the
// params as they were when the target was rolled, so sweeping the slider back
// and forth never compounds.

use rand::Rng;

use super::params::{EngineKind, ParamKey, SynthParams};
use super::project::{MorphTarget, Track};

pub const MAX_MORPH: u8 = 100;

// Uniform draw over every param's full range
pub fn random_params(engine: EngineKind, rng: &mut impl Rng) -> SynthParams {
    let spec = engine.spec();
    let mut params = engine.default_params();
    for key in ParamKey::ALL {
        let p = spec.param(key);
        let value = if p.range() > 0.0 { rng.gen_range(p.min..=p.max) } else { p.min };
        params.set(engine, key, value);
    }
    params
}

pub fn interpolate(from: &SynthParams, to: &SynthParams, t: f32) -> SynthParams {
    let mut out = *from;
    for key in ParamKey::ALL {
        let a = from.get(key);
        out = out.with(key, a + (to.get(key) - a) * t);
    }
    out
}

impl Track {
    pub fn generate_morph_target(&mut self, rng: &mut impl Rng) {
        self.morph_target = Some(MorphTarget {
            origin: self.params,
            target: random_params(self.engine, rng),
        });
    }

    pub fn set_morph_amount(&mut self, amount: u8) {
        self.morph_amount = amount.min(MAX_MORPH);
        if let Some(morph) = &self.morph_target {
            let t = self.morph_amount as f32 / MAX_MORPH as f32;
            self.params = interpolate(&morph.origin, &morph.target, t).clamped_to(self.engine);
        }
    }

    // Keep the current blend as the new live sound. No-op without a target or at 0.
    pub fn lock_morph(&mut self) -> bool {
        if self.morph_target.is_none() || self.morph_amount == 0 {
            return false;
        }
        self.morph_target = None;
        self.morph_amount = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_targets_respect_the_schema() {
        let mut rng = StdRng::seed_from_u64(3);
        for engine in EngineKind::ALL {
            let params = random_params(engine, &mut rng);
            for (key, value) in params.iter() {
                let p = engine.spec().param(key);
                assert!(p.min <= value && value <= p.max, "{} {}", engine.id(), key.name());
            }
        }
    }

    #[test]
    fn amount_interpolates_from_origin() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut track = Track::drum("kick", "KICK", EngineKind::Kick);
        let origin = track.params;
        track.generate_morph_target(&mut rng);
        let target = track.morph_target.as_ref().unwrap().target;

        track.set_morph_amount(50);
        track.set_morph_amount(50);
        let mid = origin.get(ParamKey::Timbre)
            + (target.get(ParamKey::Timbre) - origin.get(ParamKey::Timbre)) * 0.5;
        assert!((track.params.get(ParamKey::Timbre) - mid).abs() < 1e-5);

        track.set_morph_amount(100);
        assert!((track.params.get(ParamKey::Decay) - target.get(ParamKey::Decay)).abs() < 1e-5);

        track.set_morph_amount(0);
        assert_eq!(track.params, origin);
    }

    #[test]
    fn lock_keeps_blend_and_clears_target() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut track = Track::drum("snare", "SNARE", EngineKind::Snare);
        assert!(!track.lock_morph());

        track.generate_morph_target(&mut rng);
        assert!(!track.lock_morph()); // amount still 0

        track.set_morph_amount(30);
        let blended = track.params;
        assert!(track.lock_morph());
        assert_eq!(track.params, blended);
        assert_eq!(track.morph_amount, 0);
        assert!(track.morph_target.is_none());
    }

    #[test]
    fn amount_is_capped() {
        let mut track = Track::drum("kick", "KICK", EngineKind::Kick);
        track.set_morph_amount(250);
        assert_eq!(track.morph_amount, 100);
        // no target: params untouched
        assert_eq!(track.params, EngineKind::Kick.default_params());
    }
}
