use std::path::Path;

use anyhow::Context;

use super::frame::StereoFrame;

// Write rendered frames out as a 32-bit float stereo WAV
pub fn write_wav(path: &Path, frames: &[StereoFrame], sample_rate: u32) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for frame in frames {
        // hard clip so a hot master can't write values other tools choke on
        writer.write_sample(frame.left.clamp(-1.0, 1.0))?;
        writer.write_sample(frame.right.clamp(-1.0, 1.0))?;
    }
    writer.finalize().context("finalizing wav")?;
    Ok(())
}
