pub mod condition;
pub mod groove;
pub mod lfo;
pub mod morph;
pub mod params;
pub mod pattern_bank;
pub mod persistence;
pub mod project;
pub mod scale;
pub mod sequencer;
pub mod snapshot;
