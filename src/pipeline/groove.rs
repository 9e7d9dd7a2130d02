// Groove library: drum-machine patterns keyed by instrument code ("BD", "SD", ...)
// that can be dropped onto the drum tracks.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::debug;

use super::project::{ProjectState, TrackKind};

pub type GrooveBank = BTreeMap<String, Vec<u8>>; // instrument code -> 16 hits (0|1)

#[derive(Clone, Debug, Deserialize)]
pub struct Groove {
    pub banks: Vec<GrooveBank>,
}

const DRUM_TRACKS: [&str; 6] = ["kick", "snare", "hihat", "tom", "perc", "cymbal"];

pub fn load_library(path: &Path) -> anyhow::Result<Vec<Groove>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading groove library {}", path.display()))?;
    let library: Vec<Groove> = serde_json::from_str(&data).context("parsing groove library")?;
    Ok(library)
}

pub fn track_for_instrument(code: &str, rng: &mut impl Rng) -> &'static str {
    match code {
        "BD" => "kick",
        "SD" => "snare",
        "CH" | "HH" | "OH" => "hihat",
        "LT" | "MT" | "HT" => "tom",
        "RS" | "CB" => "perc",
        "CY" | "RC" | "CR" => "cymbal",
        "CP" => {
            if rng.gen_bool(0.5) { "snare" } else { "perc" }
        }
        _ => DRUM_TRACKS.choose(rng).copied().unwrap_or("kick"),
    }
}

// Pick a random bank from a random groove and write it onto the drum tracks.
// Returns false (and changes nothing) if the library has nothing to offer.
pub fn apply_random(library: &[Groove], state: &mut ProjectState, rng: &mut impl Rng) -> bool {
    let Some(groove) = library.choose(rng) else { return false };
    let Some(bank) = groove.banks.choose(rng) else { return false };
    apply_bank(bank, state, rng);
    true
}

pub fn apply_bank(bank: &GrooveBank, state: &mut ProjectState, rng: &mut impl Rng) {
    for track in state.tracks.iter_mut().filter(|t| t.kind == TrackKind::Drum) {
        track.clear_steps();
    }
    for (code, hits) in bank {
        let id = track_for_instrument(code, rng);
        let Some(track) = state.track_mut(id) else { continue };
        debug!(instrument = %code, track = id, "groove lane");
        for (step, _) in track.steps.iter_mut().zip(hits).filter(|(_, hit)| **hit == 1) {
            step.active = true;
            step.velocity = rng.gen_range(0.7..1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const LIBRARY: &str = r#"[{"banks":[{
        "BD":[1,0,0,0,1,0,0,0,1,0,0,0,1,0,0,0],
        "CH":[0,0,1,0,0,0,1,0,0,0,1,0,0,0,1,0]
    }]}]"#;

    #[test]
    fn known_codes_map_to_fixed_tracks() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(track_for_instrument("BD", &mut rng), "kick");
        assert_eq!(track_for_instrument("OH", &mut rng), "hihat");
        assert_eq!(track_for_instrument("MT", &mut rng), "tom");
        assert_eq!(track_for_instrument("CB", &mut rng), "perc");
        assert_eq!(track_for_instrument("CR", &mut rng), "cymbal");
        for _ in 0..20 {
            assert!(["snare", "perc"].contains(&track_for_instrument("CP", &mut rng)));
            assert!(DRUM_TRACKS.contains(&track_for_instrument("ZZ", &mut rng)));
        }
    }

    #[test]
    fn groove_replaces_drum_grid() {
        let library: Vec<Groove> = serde_json::from_str(LIBRARY).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = ProjectState::default();
        state.track_mut("snare").unwrap().steps[3].active = true;
        state.track_mut("bass").unwrap().steps[3].active = true;

        assert!(apply_random(&library, &mut state, &mut rng));

        let kick: Vec<usize> = active(&state, "kick");
        assert_eq!(kick, [0, 4, 8, 12]);
        assert_eq!(active(&state, "hihat"), [2, 6, 10, 14]);
        assert!(active(&state, "snare").is_empty());
        // melodic tracks are left alone
        assert_eq!(active(&state, "bass"), [3]);

        for step in state.track("kick").unwrap().steps.iter().filter(|s| s.active) {
            assert!((0.7..1.0).contains(&step.velocity));
        }
    }

    #[test]
    fn empty_library_changes_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = ProjectState::default();
        state.track_mut("kick").unwrap().steps[0].active = true;
        let before = state.clone();
        assert!(!apply_random(&[], &mut state, &mut rng));
        assert!(!apply_random(&[Groove { banks: vec![] }], &mut state, &mut rng));
        assert_eq!(state, before);
    }

    fn active(state: &ProjectState, id: &str) -> Vec<usize> {
        let track = state.track(id).unwrap();
        track.steps.iter().enumerate().filter(|(_, s)| s.active).map(|(i, _)| i).collect()
    }
}
