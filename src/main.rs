use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use stepper::audio::{self, Engine, StereoFrame};
use stepper::middle::Middle;
use stepper::pipeline::groove;
use stepper::pipeline::params::ParamKey;
use stepper::pipeline::pattern_bank::PatternBank;
use stepper::pipeline::persistence;
use stepper::pipeline::project::ProjectState;
use stepper::shared::{BARS_PER_CYCLE, DRUM_STEPS, step_duration_secs};

const TICK_RATE: Duration = Duration::from_millis(5);
const BOUNCE_BLOCK: usize = 128;
const BOUNCE_TAIL_SECS: f64 = 1.5;

#[derive(Parser)]
#[command(name = "stepper")]
#[command(about = "Step-sequencer drum machine", long_about = None)]
struct Cli {
    /// Project directory holding .stepper/preset.json (default: current dir)
    #[arg(short = 'C', long, global = true)]
    project_dir: Option<PathBuf>,

    /// Preset file to load instead of the project's own
    #[arg(short, long, global = true)]
    preset: Option<PathBuf>,

    /// Groove library (JSON) to pull a random drum groove from
    #[arg(short, long, global = true)]
    groove: Option<PathBuf>,

    /// Override the preset's tempo
    #[arg(short, long, global = true)]
    tempo: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play through the default audio device
    Play {
        /// Stop after this many seconds (default: run until killed)
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Write the preset back to the project when done (needs --seconds)
        #[arg(long, requires = "seconds")]
        save: bool,
    },

    /// Render offline to a WAV file
    Bounce {
        /// Output WAV file path
        output: PathBuf,

        /// Number of bars to render (default: one full 4-bar condition cycle)
        #[arg(short, long, default_value_t = BARS_PER_CYCLE as u32)]
        bars: u32,

        /// Sample rate in Hz (default: 44100)
        #[arg(short, long, default_value = "44100")]
        sample_rate: u32,

        /// Seed for every random choice, so bounces are repeatable
        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Write a starter preset into the project directory
    Init {
        /// Overwrite an existing preset
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("no current directory")?,
    };
    let preset_path = cli.preset.clone().unwrap_or_else(|| persistence::preset_file_path(&project_dir));

    match &cli.command {
        Commands::Init { force } => init(&preset_path, *force),
        Commands::Play { seconds, save } => {
            let (state, bank) = load_project(&cli, &preset_path)?;
            play(state, bank, *seconds, save.then_some(preset_path.as_path()))
        }
        Commands::Bounce { output, bars, sample_rate, seed } => {
            let (state, bank) = load_project(&cli, &preset_path)?;
            bounce(state, bank, output, *bars, *sample_rate, *seed)
        }
    }
}

// Preset (if there is one), then CLI overrides on top
fn load_project(cli: &Cli, preset_path: &Path) -> anyhow::Result<(ProjectState, PatternBank)> {
    let mut state = ProjectState::default();
    let mut bank = PatternBank::new();
    if preset_path.exists() {
        persistence::load_preset(preset_path, &mut state, &mut bank)?;
    } else if cli.preset.is_some() {
        anyhow::bail!("preset {} does not exist", preset_path.display());
    } else {
        warn!(path = %preset_path.display(), "no preset, starting from the demo pattern");
        demo_pattern(&mut state);
    }

    if let Some(tempo) = cli.tempo {
        state.set_tempo(tempo);
    }
    if let Some(path) = &cli.groove {
        let library = groove::load_library(path)?;
        let mut rng = rand::thread_rng();
        if !groove::apply_random(&library, &mut state, &mut rng) {
            warn!(path = %path.display(), "groove library is empty");
        }
    }
    Ok((state, bank))
}

fn init(preset_path: &Path, force: bool) -> anyhow::Result<()> {
    if preset_path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", preset_path.display());
    }
    let mut state = ProjectState::default();
    demo_pattern(&mut state);
    let mut bank = PatternBank::new();
    bank.save(0, &state);
    persistence::save_preset(preset_path, &state, &bank)?;
    println!("wrote {}", preset_path.display());
    Ok(())
}

// Something to listen to out of the box: four on the floor, backbeat, offbeat hats, a bassline
fn demo_pattern(state: &mut ProjectState) {
    let hits: [(&str, &[usize]); 4] = [
        ("kick", &[0, 4, 8, 12]),
        ("snare", &[4, 12]),
        ("hihat", &[2, 6, 10, 14]),
        ("bass", &[0, 3, 6, 10, 12]),
    ];
    for (id, steps) in hits {
        let Some(track) = state.track_mut(id) else { continue };
        for &i in steps {
            if let Some(step) = track.steps.get_mut(i) {
                step.active = true;
            }
        }
    }
    if let Some(bass) = state.track_mut("bass") {
        bass.set_param(ParamKey::Decay, 0.2);
        for (step, degree) in bass.steps.iter_mut().zip([0, 0, 0, 2, 0, 0, 4, 0, 0, 0, 3, 0, 1]) {
            step.note_index = degree;
        }
    }
}

fn play(state: ProjectState, bank: PatternBank, seconds: Option<f64>, save_to: Option<&Path>) -> anyhow::Result<()> {
    let mut audio = audio::start_audio(&state.master_fx)?;
    let mut middle = Middle::with_state(state, bank);
    middle.on_tick(|view| {
        if let Some(step) = view.playing_step {
            debug!(step, bar = view.bar + 1, fired = ?view.fired, "step");
        }
    });
    middle.start();
    info!(tempo = middle.state().tempo, "playing");

    let started = Instant::now();
    let mut last_tick = Instant::now();
    while seconds.is_none_or(|limit| started.elapsed().as_secs_f64() < limit) {
        std::thread::sleep(TICK_RATE);
        let elapsed = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();
        middle.tick(elapsed, &mut audio);
    }
    middle.stop();

    if let Some(path) = save_to {
        persistence::save_preset(path, middle.state(), middle.bank())?;
    }
    Ok(())
}

fn bounce(
    state: ProjectState,
    bank: PatternBank,
    output: &Path,
    bars: u32,
    sample_rate: u32,
    seed: u64,
) -> anyhow::Result<()> {
    let mut engine = Engine::with_seed(sample_rate, seed);
    engine.initialize(&state.master_fx);
    let mut middle = Middle::with_seed(state, bank, seed);
    middle.start();

    let pattern_secs = step_duration_secs(middle.state().tempo) * (DRUM_STEPS as u32 * bars) as f64;
    let total = ((pattern_secs + BOUNCE_TAIL_SECS) * sample_rate as f64) as usize;
    let play_frames = (pattern_secs * sample_rate as f64) as usize;
    let block_secs = BOUNCE_BLOCK as f64 / sample_rate as f64;

    let mut frames = vec![StereoFrame::zero(); total];
    for (i, block) in frames.chunks_mut(BOUNCE_BLOCK).enumerate() {
        if i * BOUNCE_BLOCK >= play_frames && middle.state().is_playing {
            middle.stop(); // let the tail ring out
        }
        middle.tick(block_secs, &mut engine);
        engine.render_block(block);
    }

    audio::write_wav(output, &frames, sample_rate)?;
    info!(path = %output.display(), bars, seconds = total as f64 / sample_rate as f64, "bounced");
    Ok(())
}
