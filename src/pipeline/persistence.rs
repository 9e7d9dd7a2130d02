// Preset files: full state plus the pattern bank and live grid, as pretty JSON.
// Saved on quit and loaded on startup by the binary.
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use super::pattern_bank::PatternBank;
use super::project::ProjectState;
use super::snapshot;

const STEPPER_DIR: &str = ".stepper";
const PRESET_FILE: &str = "preset.json";

// <project_dir>/.stepper/preset.json
pub fn preset_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(STEPPER_DIR).join(PRESET_FILE)
}

pub fn load_preset(path: &Path, state: &mut ProjectState, bank: &mut PatternBank) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading preset {}", path.display()))?;
    let decoded = snapshot::decode_state(&data)
        .with_context(|| format!("parsing preset {}", path.display()))?;
    snapshot::apply_state(decoded, state, bank);
    info!(path = %path.display(), "preset loaded");
    Ok(())
}

// Save the preset to disk, making the parent dirs if they don't exist already
pub fn save_preset(path: &Path, state: &ProjectState, bank: &PatternBank) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?; // create .stepper/ if needed
    }
    let json = serde_json::to_string_pretty(&snapshot::export_state(state, Some(bank)))?;
    std::fs::write(path, json).with_context(|| format!("writing preset {}", path.display()))?;
    info!(path = %path.display(), "preset saved");
    Ok(())
}
