use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use crate::audio_api::{AudioCommand, TriggerParams, VoiceBackend, VoiceHandle};
use crate::pipeline::params::FxParams;

mod bounce;
mod chain;
mod effect;
mod engine;
mod frame;
mod graph;
mod voice;
mod voice_id;

pub use bounce::write_wav;
pub use chain::{ChainOutput, ChainParts, MASTER_GAIN, MasterBus, build_chain, prepare_chain, wire_chain};
pub use effect::{
    Convolver, DelayLine, FilterMode, StereoFilter, distortion_curve, impulse_response, tanh_curve,
};
pub use engine::{Engine, PreparedVoice, prepare_voice};
pub use frame::StereoFrame;
pub use graph::{AudioGraph, NodeId, NodeKind};
pub use voice::SynthVoice;
pub use voice_id::{VoiceId, next_voice_id};

const COMMAND_QUEUE: usize = 1024;

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    sample_rate: u32,
    rng: StdRng, // voice noise and reverb impulse responses
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) -> bool {
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            Err(e) => {
                warn!("audio command dropped: {e}");
                false
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// Live backend: everything becomes a command for the audio thread. The voice
// id is minted here so the handle comes back without a round trip, and the
// voice and its chain are built here so the audio callback never allocates them.
impl VoiceBackend for AudioHandle {
    fn create_voice(&mut self, params: &TriggerParams) -> Option<VoiceHandle> {
        let id = next_voice_id();
        let voice = prepare_voice(params, self.sample_rate as f32, &mut self.rng);
        let duration = voice.duration;
        self.send(AudioCommand::Trigger { id, voice: Box::new(voice) })
            .then(|| VoiceHandle::new(id, duration))
    }

    fn dispose(&mut self, handle: VoiceHandle) {
        self.send(AudioCommand::Dispose(handle.id));
    }

    fn set_master_fx(&mut self, fx: &FxParams) {
        let parts = prepare_chain(self.sample_rate as f32, fx, &mut self.rng);
        self.send(AudioCommand::SetMasterChain(Box::new(parts)));
    }
}

pub fn start_audio(master_fx: &FxParams) -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(COMMAND_QUEUE);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            // the master chain is built before the first callback can run
            let mut engine = Engine::new(sample_rate);
            engine.initialize(master_fx);

            let output_stream = build_output_stream_f32(&device, &config.into(), rx, engine, channels)?;
            output_stream.play().context("failed to play output stream")?;
            info!(sample_rate, channels, "audio output started");

            Ok(AudioHandle { tx, sample_rate, rng: StdRng::from_entropy(), _output_stream: output_stream })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let err_fn = |err| error!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            // commands land between blocks, so a master rebuild is never half-done mid-block
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }

            if channels == 2 {
                let n_frames = data.len() / 2;
                let frames: &mut [StereoFrame] = unsafe { // casting raw floats to StereoFrames
                    std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut StereoFrame, n_frames)
                };
                engine.render_block(frames);
            } else {
                // mono or surround devices: left/right into the first two channels
                for chunk in data.chunks_mut(channels.max(1)) {
                    let frame = engine.next_frame();
                    for (i, sample) in chunk.iter_mut().enumerate() {
                        *sample = match i {
                            0 if channels == 1 => (frame.left + frame.right) * 0.5,
                            0 => frame.left,
                            1 => frame.right,
                            _ => 0.0,
                        };
                    }
                }
                engine.render_block(&mut []);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
