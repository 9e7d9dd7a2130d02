// Versioned JSON snapshots: single pattern, whole bank, full project state.
//
// The wire format keeps one array per step field (steps, velocities,
// stepConditions, stepLocks, stepSlides) keyed by track id. Imports run in two
// phases: decode + validate everything into domain values, then apply. A
// failure in the first phase leaves the caller's state alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::condition::StepCondition;
use super::lfo::Lfo;
use super::params::{EngineKind, FxParams, ParamKey, SynthParams};
use super::pattern_bank::{Pattern, PatternBank, PatternStep};
use super::project::{EngineSnapshot, MorphTarget, ProjectState, TrackKind, clamp_note_index};
use super::scale::Scale;
use crate::shared::{MAX_SYNTH_STEPS, NUM_LFOS, NUM_PATTERNS};

pub const PATTERN_VERSION: &str = "1.0";
pub const STATE_VERSION: &str = "2.0";
const STATE_VERSIONS: [&str; 2] = ["1.0", "2.0"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported version '{0}'")]
    Version(String),

    #[error("track '{track}': {field} has {got} entries, expected {expected}")]
    LengthMismatch { track: String, field: &'static str, got: usize, expected: usize },

    #[error("track '{0}' has no steps")]
    EmptyTrack(String),

    #[error("bank holds {0} patterns, at most {max} fit", max = NUM_PATTERNS)]
    TooManyPatterns(usize),

    #[error("track '{track}' has {got} lfos, at most {max}", max = NUM_LFOS)]
    TooManyLfos { track: String, got: usize },

    #[error("track '{track}' has {got} steps, at most {max}", max = MAX_SYNTH_STEPS)]
    TooManySteps { track: String, got: usize },
}

// -- wire types --

// Params travel as a name -> value object; missing names take the engine default
type ParamsWire = BTreeMap<ParamKey, f32>;

fn params_to_wire(params: &SynthParams) -> ParamsWire {
    params.iter().collect()
}

fn params_from_wire(engine: EngineKind, wire: &ParamsWire) -> SynthParams {
    let mut params = engine.default_params();
    for (&key, &value) in wire {
        params.set(engine, key, value);
    }
    params
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoundWire {
    pub engine: EngineKind,
    pub params: ParamsWire,
    #[serde(default)]
    pub fx: FxParams,
}

impl SoundWire {
    fn from_snapshot(s: &EngineSnapshot) -> Self {
        Self { engine: s.engine, params: params_to_wire(&s.params), fx: s.fx }
    }

    fn to_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            engine: self.engine,
            params: params_from_wire(self.engine, &self.params),
            fx: self.fx.clamped(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPatternWire {
    pub steps: Vec<bool>,
    pub velocities: Vec<f32>,
    pub step_conditions: Vec<StepCondition>,
    pub step_locks: Vec<Option<SoundWire>>,
    pub step_slides: Vec<bool>,
}

impl TrackPatternWire {
    fn from_steps(steps: &[PatternStep]) -> Self {
        Self {
            steps: steps.iter().map(|s| s.active).collect(),
            velocities: steps.iter().map(|s| s.velocity).collect(),
            step_conditions: steps.iter().map(|s| s.condition).collect(),
            step_locks: steps.iter().map(|s| s.lock.as_ref().map(SoundWire::from_snapshot)).collect(),
            step_slides: steps.iter().map(|s| s.slide).collect(),
        }
    }

    fn to_steps(&self, track: &str) -> Result<Vec<PatternStep>, ImportError> {
        let len = self.steps.len();
        if len == 0 {
            return Err(ImportError::EmptyTrack(track.to_string()));
        }
        if len > MAX_SYNTH_STEPS {
            return Err(ImportError::TooManySteps { track: track.to_string(), got: len });
        }
        let check = |field: &'static str, got: usize| {
            if got == len {
                Ok(())
            } else {
                Err(ImportError::LengthMismatch { track: track.to_string(), field, got, expected: len })
            }
        };
        check("velocities", self.velocities.len())?;
        check("stepConditions", self.step_conditions.len())?;
        check("stepLocks", self.step_locks.len())?;
        check("stepSlides", self.step_slides.len())?;

        Ok((0..len)
            .map(|i| PatternStep {
                active: self.steps[i],
                velocity: clamp_velocity(self.velocities[i]),
                condition: self.step_conditions[i],
                lock: self.step_locks[i].as_ref().map(SoundWire::to_snapshot),
                slide: self.step_slides[i],
            })
            .collect())
    }
}

fn clamp_velocity(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

pub type PatternWire = BTreeMap<String, TrackPatternWire>;

fn pattern_to_wire(pattern: &Pattern) -> PatternWire {
    pattern
        .tracks
        .iter()
        .map(|(id, steps)| (id.clone(), TrackPatternWire::from_steps(steps)))
        .collect()
}

fn pattern_from_wire(wire: &PatternWire) -> Result<Pattern, ImportError> {
    let tracks = wire
        .iter()
        .map(|(id, tp)| Ok((id.clone(), tp.to_steps(id)?)))
        .collect::<Result<BTreeMap<_, _>, ImportError>>()?;
    Ok(Pattern { tracks })
}

fn bank_from_wire(wire: &[Option<PatternWire>]) -> Result<[Option<Pattern>; NUM_PATTERNS], ImportError> {
    if wire.len() > NUM_PATTERNS {
        return Err(ImportError::TooManyPatterns(wire.len()));
    }
    let mut slots: [Option<Pattern>; NUM_PATTERNS] = std::array::from_fn(|_| None);
    for (slot, p) in slots.iter_mut().zip(wire) {
        *slot = p.as_ref().map(pattern_from_wire).transpose()?;
    }
    Ok(slots)
}

fn bank_to_wire(bank: &PatternBank) -> Vec<Option<PatternWire>> {
    bank.slots().iter().map(|p| p.as_ref().map(pattern_to_wire)).collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatternExport {
    pub version: String,
    pub pattern: PatternWire,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BankExport {
    pub version: String,
    pub patterns: Vec<Option<PatternWire>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphWire {
    pub engine: EngineKind,
    pub params: ParamsWire,
}

// Every field optional: whatever is missing keeps the current value
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthSettingsWire {
    pub step_count: Option<usize>,
    pub rate_multiplier: Option<f32>,
    pub root_note: Option<i32>,
    pub scale: Option<Scale>,
    pub range_start: Option<i32>,
    pub range_span: Option<i32>,
    pub transpose: Option<i32>,
    pub note_indices: Option<Vec<i32>>,
    pub lfos: Option<Vec<Lfo>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStateWire {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mute: bool,
    pub engine: EngineKind,
    pub params: ParamsWire,
    #[serde(default)]
    pub fx: FxParams,
    #[serde(default)]
    pub normal_state: Option<SoundWire>,
    #[serde(default)]
    pub morph_amount: u8,
    #[serde(default)]
    pub target_params: Option<MorphWire>,
    #[serde(default)]
    pub synth_settings: Option<SynthSettingsWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExport {
    pub version: String,
    pub tempo: f32,
    #[serde(default)]
    pub current_pattern: u8,
    #[serde(rename = "masterFX", default)]
    pub master_fx: FxParams,
    pub tracks: BTreeMap<String, TrackStateWire>,
    // preset files carry the bank and the live grid alongside the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<Option<PatternWire>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternWire>,
}

// -- decoded, validated forms --

#[derive(Clone, Debug, PartialEq)]
struct TrackState {
    id: String,
    name: Option<String>,
    mute: bool,
    sound: EngineSnapshot,
    normal_state: Option<EngineSnapshot>,
    morph_amount: u8,
    morph_target: Option<SynthParams>,
    synth: Option<SynthSettingsWire>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedState {
    tempo: f32,
    current_pattern: u8,
    master_fx: FxParams,
    tracks: Vec<TrackState>,
    bank: Option<[Option<Pattern>; NUM_PATTERNS]>,
    pattern: Option<Pattern>,
}

impl DecodedState {
    pub fn has_bank(&self) -> bool {
        self.bank.is_some()
    }
}

fn check_version(version: &str, accepted: &[&str]) -> Result<(), ImportError> {
    if accepted.contains(&version) {
        Ok(())
    } else {
        Err(ImportError::Version(version.to_string()))
    }
}

// -- pattern / bank --

pub fn export_pattern(pattern: &Pattern) -> PatternExport {
    PatternExport { version: PATTERN_VERSION.to_string(), pattern: pattern_to_wire(pattern) }
}

pub fn decode_pattern(json: &str) -> Result<Pattern, ImportError> {
    let export: PatternExport = serde_json::from_str(json)?;
    check_version(&export.version, &[PATTERN_VERSION])?;
    pattern_from_wire(&export.pattern)
}

pub fn export_bank(bank: &PatternBank) -> BankExport {
    BankExport { version: PATTERN_VERSION.to_string(), patterns: bank_to_wire(bank) }
}

pub fn decode_bank(json: &str) -> Result<[Option<Pattern>; NUM_PATTERNS], ImportError> {
    let export: BankExport = serde_json::from_str(json)?;
    check_version(&export.version, &[PATTERN_VERSION])?;
    bank_from_wire(&export.patterns)
}

// -- full state --

pub fn export_state(state: &ProjectState, bank: Option<&PatternBank>) -> StateExport {
    let tracks = state
        .tracks
        .iter()
        .map(|t| {
            let synth_settings = t.is_synth().then(|| SynthSettingsWire {
                step_count: Some(t.step_count),
                rate_multiplier: Some(t.rate_multiplier),
                root_note: Some(t.synth.root_note),
                scale: Some(t.synth.scale),
                range_start: Some(t.synth.range_start),
                range_span: Some(t.synth.range_span),
                transpose: Some(t.synth.transpose),
                note_indices: Some(t.steps.iter().map(|s| s.note_index).collect()),
                lfos: Some(t.synth.lfos.to_vec()),
            });
            let wire = TrackStateWire {
                name: Some(t.name.clone()),
                mute: t.mute,
                engine: t.engine,
                params: params_to_wire(&t.params),
                fx: t.fx,
                normal_state: t.normal_state.as_ref().map(SoundWire::from_snapshot),
                morph_amount: t.morph_amount,
                target_params: t
                    .morph_target
                    .as_ref()
                    .map(|m| MorphWire { engine: t.engine, params: params_to_wire(&m.target) }),
                synth_settings,
            };
            (t.id.clone(), wire)
        })
        .collect();

    StateExport {
        version: STATE_VERSION.to_string(),
        tempo: state.tempo,
        current_pattern: state.current_pattern,
        master_fx: state.master_fx,
        tracks,
        patterns: bank.map(bank_to_wire),
        pattern: bank.map(|_| pattern_to_wire(&Pattern::capture(state))),
    }
}

pub fn decode_state(json: &str) -> Result<DecodedState, ImportError> {
    let export: StateExport = serde_json::from_str(json)?;
    check_version(&export.version, &STATE_VERSIONS)?;

    let mut tracks = Vec::with_capacity(export.tracks.len());
    for (id, t) in &export.tracks {
        if let Some(lfos) = t.synth_settings.as_ref().and_then(|s| s.lfos.as_ref()) {
            if lfos.len() > NUM_LFOS {
                return Err(ImportError::TooManyLfos { track: id.clone(), got: lfos.len() });
            }
        }
        tracks.push(TrackState {
            id: id.clone(),
            name: t.name.clone(),
            mute: t.mute,
            sound: EngineSnapshot {
                engine: t.engine,
                params: params_from_wire(t.engine, &t.params),
                fx: t.fx.clamped(),
            },
            normal_state: t.normal_state.as_ref().map(SoundWire::to_snapshot),
            morph_amount: t.morph_amount.min(100),
            // a target rolled for another engine can't be blended into this one
            morph_target: t
                .target_params
                .as_ref()
                .filter(|m| m.engine == t.engine)
                .map(|m| params_from_wire(m.engine, &m.params)),
            synth: t.synth_settings.clone(),
        });
    }

    Ok(DecodedState {
        tempo: export.tempo,
        current_pattern: export.current_pattern.min(NUM_PATTERNS as u8 - 1),
        master_fx: export.master_fx.clamped(),
        tracks,
        bank: export.patterns.as_deref().map(bank_from_wire).transpose()?,
        pattern: export.pattern.as_ref().map(pattern_from_wire).transpose()?,
    })
}

// Infallible second phase. Tracks missing from `state` are skipped.
pub fn apply_state(decoded: DecodedState, state: &mut ProjectState, bank: &mut PatternBank) {
    state.set_tempo(decoded.tempo);
    state.current_pattern = decoded.current_pattern;
    state.master_fx = decoded.master_fx;

    for ts in decoded.tracks {
        let Some(track) = state.track_mut(&ts.id) else { continue };
        if let Some(name) = ts.name {
            track.name = name;
        }
        track.mute = ts.mute;
        track.engine = ts.sound.engine;
        track.params = ts.sound.params;
        track.fx = ts.sound.fx;
        track.normal_state = ts.normal_state;
        track.morph_amount = ts.morph_amount;
        track.morph_target = ts
            .morph_target
            .map(|target| MorphTarget { origin: track.params, target });

        let Some(s) = ts.synth.filter(|_| track.kind == TrackKind::Synth) else { continue };
        if let Some(rate) = s.rate_multiplier {
            track.set_rate_multiplier(rate);
        }
        if let Some(root) = s.root_note {
            track.synth.set_root_note(root);
        }
        if let Some(scale) = s.scale {
            track.synth.scale = scale;
        }
        if let Some(start) = s.range_start {
            track.synth.set_range_start(start);
        }
        if let Some(span) = s.range_span {
            track.synth.set_range_span(span);
        }
        if let Some(t) = s.transpose {
            track.synth.set_transpose(t);
        }
        if let Some(indices) = s.note_indices {
            for (step, idx) in track.steps.iter_mut().zip(indices) {
                step.note_index = clamp_note_index(idx);
            }
        }
        if let Some(lfos) = s.lfos {
            for (slot, lfo) in lfos.into_iter().enumerate() {
                track.synth.set_lfo(slot, lfo);
            }
        }
        if let Some(count) = s.step_count {
            track.set_step_count(count);
        }
    }

    if let Some(slots) = decoded.bank {
        bank.replace_all(slots);
    }
    if let Some(pattern) = decoded.pattern {
        pattern.apply(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> ProjectState {
        let mut state = ProjectState::default();
        state.set_tempo(140.0);
        let kick = state.track_mut("kick").unwrap();
        kick.steps[0].active = true;
        kick.steps[2].condition = StepCondition::new(3, 4).unwrap();
        kick.steps[2].active = true;
        kick.steps[2].lock = Some(EngineSnapshot {
            engine: EngineKind::Snare,
            params: EngineKind::Snare.default_params(),
            fx: FxParams::default(),
        });
        let bass = state.track_mut("bass").unwrap();
        bass.synth.scale = Scale::Dorian;
        bass.synth.transpose = 3;
        bass.steps[1].note_index = 4;
        bass.set_step_count(12);
        state
    }

    #[test]
    fn pattern_json_uses_parallel_arrays() {
        let state = sample_state();
        let json = serde_json::to_value(export_pattern(&Pattern::capture(&state))).unwrap();
        assert_eq!(json["version"], "1.0");
        let kick = &json["pattern"]["kick"];
        assert_eq!(kick["steps"].as_array().unwrap().len(), 16);
        assert_eq!(kick["stepConditions"][2], "3:4");
        assert_eq!(kick["stepLocks"][2]["engine"], "plaits_snare");
        assert!(kick["stepLocks"][0].is_null());
    }

    #[test]
    fn pattern_import_round_trips() {
        let state = sample_state();
        let pattern = Pattern::capture(&state);
        let json = serde_json::to_string(&export_pattern(&pattern)).unwrap();
        assert_eq!(decode_pattern(&json).unwrap(), pattern);
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let json = r#"{"version":"1.0","pattern":{"kick":{
            "steps":[true,false],"velocities":[1.0],
            "stepConditions":["1:1","1:1"],"stepLocks":[null,null],"stepSlides":[false,false]}}}"#;
        match decode_pattern(json) {
            Err(ImportError::LengthMismatch { field, got, expected, .. }) => {
                assert_eq!(field, "velocities");
                assert_eq!((got, expected), (1, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let n = 40;
        let wire = serde_json::json!({"version": "1.0", "pattern": {"bass": {
            "steps": vec![true; n], "velocities": vec![1.0; n],
            "stepConditions": vec!["1:1"; n], "stepLocks": vec![serde_json::Value::Null; n],
            "stepSlides": vec![false; n]}}});
        match decode_pattern(&wire.to_string()) {
            Err(ImportError::TooManySteps { track, got }) => assert_eq!((track.as_str(), got), ("bass", 40)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let json = r#"{"version":"3.0","pattern":{}}"#;
        assert!(matches!(decode_pattern(json), Err(ImportError::Version(v)) if v == "3.0"));
        let json = r#"{"version":"2.0","patterns":[]}"#;
        assert!(matches!(decode_bank(json), Err(ImportError::Version(_))));
    }

    #[test]
    fn bad_condition_fails_the_whole_import() {
        let json = r#"{"version":"1.0","pattern":{"kick":{
            "steps":[true],"velocities":[1.0],
            "stepConditions":["5:4"],"stepLocks":[null],"stepSlides":[false]}}}"#;
        assert!(matches!(decode_pattern(json), Err(ImportError::Json(_))));
    }

    #[test]
    fn state_round_trip_keeps_synth_settings() {
        let state = sample_state();
        let json = serde_json::to_string(&export_state(&state, None)).unwrap();

        let mut fresh = ProjectState::default();
        let mut bank = PatternBank::new();
        apply_state(decode_state(&json).unwrap(), &mut fresh, &mut bank);

        assert_eq!(fresh.tempo, 140.0);
        let bass = fresh.track("bass").unwrap();
        assert_eq!(bass.synth.scale, Scale::Dorian);
        assert_eq!(bass.synth.transpose, 3);
        assert_eq!(bass.steps[1].note_index, 4);
        assert_eq!(bass.step_count, 12);
        // the grid is not part of a bare state export
        assert!(!fresh.track("kick").unwrap().steps[0].active);
    }

    #[test]
    fn v1_state_keeps_current_melodic_settings() {
        let mut state = ProjectState::default();
        state.track_mut("lead").unwrap().synth.root_note = 67;
        let json = r#"{"version":"1.0","tempo":100,"masterFX":{},
            "tracks":{"lead":{"mute":true,"engine":"plaits_fm","params":{"note":50}}}}"#;
        let mut bank = PatternBank::new();
        apply_state(decode_state(json).unwrap(), &mut state, &mut bank);

        let lead = state.track("lead").unwrap();
        assert!(lead.mute);
        assert_eq!(lead.engine, EngineKind::Fm);
        assert_eq!(lead.params.get(ParamKey::Note), 50.0);
        assert_eq!(lead.params.get(ParamKey::Decay), EngineKind::Fm.default_params().get(ParamKey::Decay));
        assert_eq!(lead.synth.root_note, 67);
        assert_eq!(state.tempo, 100.0);
    }

    #[test]
    fn unknown_engine_aborts_state_import() {
        let json = r#"{"version":"2.0","tempo":100,
            "tracks":{"kick":{"engine":"plaits_theremin","params":{}}}}"#;
        assert!(decode_state(json).is_err());
    }

    #[test]
    fn out_of_range_values_are_clamped_on_import() {
        let json = r#"{"version":"2.0","tempo":900,"currentPattern":40,"masterFX":{"drive":99},
            "tracks":{"kick":{"engine":"plaits_kick","params":{"note":5},"morphAmount":250}}}"#;
        let mut state = ProjectState::default();
        let mut bank = PatternBank::new();
        apply_state(decode_state(json).unwrap(), &mut state, &mut bank);
        assert_eq!(state.tempo, 300.0);
        assert_eq!(state.current_pattern, 15);
        assert_eq!(state.master_fx.drive, 20.0);
        let kick = state.track("kick").unwrap();
        assert_eq!(kick.params.get(ParamKey::Note), 24.0);
        assert_eq!(kick.morph_amount, 100);
    }

    #[test]
    fn melodic_extremes_are_clamped_on_import() {
        let json = r#"{"version":"2.0","tempo":120,
            "tracks":{"bass":{"engine":"plaits_va","params":{},"synthSettings":{
                "rootNote":-5,"rangeStart":100,"rangeSpan":2147483647,"transpose":2147483647,
                "noteIndices":[2147483647,-9],
                "lfos":[{"destination":"transpose","wave":"sine","depth":50.0,"rate":0.0}]}}}}"#;
        let mut state = ProjectState::default();
        let mut bank = PatternBank::new();
        apply_state(decode_state(json).unwrap(), &mut state, &mut bank);

        let bass = state.track("bass").unwrap();
        assert_eq!(bass.synth.root_note, 0);
        assert_eq!(bass.synth.range_start, 100);
        assert_eq!(bass.synth.range_span, 128);
        assert_eq!(bass.synth.range_end(), 127);
        assert_eq!(bass.synth.transpose, 48);
        assert_eq!(bass.steps[0].note_index, 127);
        assert_eq!(bass.steps[1].note_index, 0);
        assert_eq!(bass.synth.lfos[0].depth, 1.0);
    }
}
