pub mod audio;
pub mod audio_api;
pub mod middle;
pub mod pipeline;
pub mod shared;

pub use audio_api::{AudioCommand, TriggerParams, VoiceBackend, VoiceHandle};
pub use middle::Middle;
