// 16 pattern slots plus a clipboard. A pattern is the step grid of every track
// (active flags, velocities, conditions, locks, slides) and nothing else:
// engine, params and fx stay with the live track.

use std::collections::BTreeMap;

use tracing::debug;

use super::condition::StepCondition;
use super::project::{EngineSnapshot, ProjectState, Step};
use crate::shared::NUM_PATTERNS;

// The slice of a Step that belongs to a pattern
#[derive(Clone, Debug, PartialEq)]
pub struct PatternStep {
    pub active: bool,
    pub velocity: f32,
    pub condition: StepCondition,
    pub lock: Option<EngineSnapshot>,
    pub slide: bool,
}

impl From<&Step> for PatternStep {
    fn from(s: &Step) -> Self {
        Self {
            active: s.active,
            velocity: s.velocity,
            condition: s.condition,
            lock: s.lock.clone(),
            slide: s.slide,
        }
    }
}

// track id -> that track's grid
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    pub tracks: BTreeMap<String, Vec<PatternStep>>,
}

impl Pattern {
    pub fn capture(state: &ProjectState) -> Self {
        Self {
            tracks: state
                .tracks
                .iter()
                .map(|t| (t.id.clone(), t.steps.iter().map(PatternStep::from).collect()))
                .collect(),
        }
    }

    // Write the grid back onto the matching tracks. Unknown track ids are ignored;
    // note indices are melodic settings, not pattern data, so they stay put.
    // A track's step storage never changes size: a shorter grid leaves the tail
    // cleared, a longer one is cut off.
    pub fn apply(&self, state: &mut ProjectState) {
        let blank = PatternStep::from(&Step::default());
        for (id, steps) in &self.tracks {
            let Some(track) = state.track_mut(id) else {
                debug!(track = %id, "pattern names an unknown track, skipping");
                continue;
            };
            if steps.len() != track.max_steps() {
                debug!(track = %id, got = steps.len(), max = track.max_steps(), "pattern length differs from track");
            }
            let padded = steps.iter().chain(std::iter::repeat(&blank));
            for (dst, src) in track.steps.iter_mut().zip(padded) {
                dst.active = src.active;
                dst.velocity = src.velocity;
                dst.condition = src.condition;
                dst.lock = src.lock.clone();
                dst.slide = src.slide;
            }
        }
    }

    pub fn track(&self, id: &str) -> Option<&[PatternStep]> {
        self.tracks.get(id).map(Vec::as_slice)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PatternBank {
    slots: [Option<Pattern>; NUM_PATTERNS],
    clipboard: Option<Pattern>,
}

impl Default for PatternBank {
    fn default() -> Self {
        Self { slots: std::array::from_fn(|_| None), clipboard: None }
    }
}

impl PatternBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, index: usize, state: &ProjectState) -> bool {
        let Some(slot) = self.slots.get_mut(index) else { return false };
        *slot = Some(Pattern::capture(state));
        true
    }

    // false when the slot is empty (or out of range); state is untouched then
    pub fn load(&self, index: usize, state: &mut ProjectState) -> bool {
        match self.get(index) {
            Some(pattern) => {
                pattern.apply(state);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    pub fn has(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&Pattern> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn set(&mut self, index: usize, pattern: Option<Pattern>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = pattern;
        }
    }

    // Copying an empty slot empties the clipboard
    pub fn copy(&mut self, index: usize) {
        self.clipboard = self.get(index).cloned();
    }

    pub fn paste(&mut self, index: usize) -> bool {
        let Some(clip) = self.clipboard.clone() else { return false };
        let Some(slot) = self.slots.get_mut(index) else { return false };
        *slot = Some(clip);
        true
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.is_some()
    }

    pub fn slots(&self) -> &[Option<Pattern>; NUM_PATTERNS] {
        &self.slots
    }

    pub fn replace_all(&mut self, slots: [Option<Pattern>; NUM_PATTERNS]) {
        self.slots = slots;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::params::{EngineKind, ParamKey};

    fn busy_state() -> ProjectState {
        let mut state = ProjectState::default();
        let kick = state.track_mut("kick").unwrap();
        kick.steps[0].active = true;
        kick.steps[0].velocity = 0.5;
        kick.steps[4].active = true;
        kick.steps[4].condition = StepCondition::new(2, 4).unwrap();
        kick.steps[4].slide = true;
        let mut lock = kick.live_snapshot();
        lock.params.set(EngineKind::Kick, ParamKey::Decay, 1.2);
        kick.steps[4].lock = Some(lock);
        state
    }

    #[test]
    fn save_then_load_restores_grid() {
        let mut state = busy_state();
        let mut bank = PatternBank::new();
        assert!(bank.save(2, &state));
        let saved = state.track("kick").unwrap().steps.clone();

        state.track_mut("kick").unwrap().clear_steps();
        state.track_mut("kick").unwrap().clear_locks();
        assert!(bank.load(2, &mut state));
        assert_eq!(state.track("kick").unwrap().steps, saved);
    }

    #[test]
    fn stored_patterns_do_not_alias_live_state() {
        let mut state = busy_state();
        let mut bank = PatternBank::new();
        bank.save(0, &state);

        let kick = state.track_mut("kick").unwrap();
        kick.steps[4].lock.as_mut().unwrap().params.set(EngineKind::Kick, ParamKey::Decay, 0.1);
        kick.steps[0].velocity = 0.1;

        let stored = bank.get(0).unwrap().track("kick").unwrap();
        assert_eq!(stored[0].velocity, 0.5);
        assert_eq!(stored[4].lock.as_ref().unwrap().params.get(ParamKey::Decay), 1.2);
    }

    #[test]
    fn grids_of_another_length_keep_track_storage() {
        let mut state = busy_state();
        state.track_mut("bass").unwrap().steps[1].note_index = 6;
        state.track_mut("bass").unwrap().steps[20].active = true;
        let hit = PatternStep { active: true, velocity: 0.7, condition: StepCondition::default(), lock: None, slide: false };
        let mut pattern = Pattern::default();
        pattern.tracks.insert("kick".into(), vec![hit.clone()]);
        pattern.tracks.insert("bass".into(), vec![hit.clone(), hit]);
        pattern.apply(&mut state);

        let kick = state.track("kick").unwrap();
        assert_eq!(kick.max_steps(), 16);
        assert_eq!(kick.step_count, 16);
        assert!(kick.steps[0].active);
        assert!(!kick.steps[4].active);
        assert!(kick.steps[4].lock.is_none());

        let bass = state.track("bass").unwrap();
        assert_eq!(bass.max_steps(), 32);
        assert!(bass.steps[1].active);
        assert!(!bass.steps[20].active);
        assert_eq!(bass.steps[1].note_index, 6);
    }

    #[test]
    fn loading_an_empty_slot_is_a_no_op() {
        let mut state = busy_state();
        let before = state.clone();
        let bank = PatternBank::new();
        assert!(!bank.load(5, &mut state));
        assert!(!bank.load(99, &mut state));
        assert_eq!(state, before);
    }

    #[test]
    fn copy_paste_and_clear() {
        let state = busy_state();
        let mut bank = PatternBank::new();
        assert!(!bank.paste(1));

        bank.save(0, &state);
        bank.copy(0);
        assert!(bank.paste(7));
        assert_eq!(bank.get(7), bank.get(0));

        bank.clear(0);
        assert!(!bank.has(0));
        assert!(bank.has(7));

        // clipboard survives clearing its source
        assert!(bank.paste(8));
        assert!(bank.has(8));

        bank.copy(3); // empty slot
        assert!(!bank.has_clipboard());
    }

    #[test]
    fn load_keeps_note_indices() {
        let mut state = ProjectState::default();
        let mut bank = PatternBank::new();
        bank.save(0, &state);
        state.track_mut("bass").unwrap().steps[3].note_index = 5;
        bank.load(0, &mut state);
        assert_eq!(state.track("bass").unwrap().steps[3].note_index, 5);
    }
}
