// Engine and FX parameter schemas.
//
// Every engine exposes the same eight macro parameters, but each engine
// declares its own ranges and defaults for them. Writes always go through the
// schema so stored values never leave [min, max].

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSpec {
    pub label: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl ParamSpec {
    pub const fn new(label: &'static str, min: f32, max: f32, step: f32, default: f32) -> Self {
        Self { label, min, max, step, default }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    pub fn range(&self) -> f32 {
        self.max - self.min
    }
}

// -- synth parameters --

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKey {
    Note,
    Harmonics,
    Timbre,
    Morph,
    Fm,
    Decay,
    Fade,
    Volume,
}

impl ParamKey {
    pub const ALL: [ParamKey; 8] = [
        ParamKey::Note,
        ParamKey::Harmonics,
        ParamKey::Timbre,
        ParamKey::Morph,
        ParamKey::Fm,
        ParamKey::Decay,
        ParamKey::Fade,
        ParamKey::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamKey::Note => "note",
            ParamKey::Harmonics => "harmonics",
            ParamKey::Timbre => "timbre",
            ParamKey::Morph => "morph",
            ParamKey::Fm => "fm",
            ParamKey::Decay => "decay",
            ParamKey::Fade => "fade",
            ParamKey::Volume => "volume",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

// Named synth parameters of one engine. Only ever built from an EngineSpec,
// so every value has a schema to be clamped against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthParams {
    values: [f32; 8],
}

impl SynthParams {
    pub fn get(&self, key: ParamKey) -> f32 {
        self.values[key.index()]
    }

    // Raw write, used for trigger-time overrides (note, slide decay) that never get stored
    pub fn with(mut self, key: ParamKey, value: f32) -> Self {
        self.values[key.index()] = value;
        self
    }

    // Clamped write against the given engine's schema
    pub fn set(&mut self, engine: EngineKind, key: ParamKey, value: f32) -> f32 {
        let clamped = engine.spec().param(key).clamp(value);
        self.values[key.index()] = clamped;
        clamped
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, f32)> + '_ {
        ParamKey::ALL.into_iter().map(|k| (k, self.get(k)))
    }

    // Re-clamp every value, e.g. after a lock captured under another engine
    pub fn clamped_to(mut self, engine: EngineKind) -> Self {
        let spec = engine.spec();
        for key in ParamKey::ALL {
            self.values[key.index()] = spec.param(key).clamp(self.values[key.index()]);
        }
        self
    }
}

// -- engines --

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    #[serde(rename = "plaits_va")]
    VirtualAnalog,
    #[serde(rename = "plaits_ws")]
    Waveshaper,
    #[serde(rename = "plaits_fm")]
    Fm,
    #[serde(rename = "plaits_grain")]
    Granular,
    #[serde(rename = "plaits_add")]
    Additive,
    #[serde(rename = "plaits_wt")]
    Wavetable,
    #[serde(rename = "plaits_chord")]
    Chord,
    #[serde(rename = "plaits_vowel")]
    Vowel,
    #[serde(rename = "plaits_swarm")]
    Swarm,
    #[serde(rename = "plaits_noise")]
    Noise,
    #[serde(rename = "plaits_particle")]
    Particle,
    #[serde(rename = "plaits_string")]
    String,
    #[serde(rename = "plaits_modal")]
    Modal,
    #[serde(rename = "plaits_kick")]
    Kick,
    #[serde(rename = "plaits_snare")]
    Snare,
    #[serde(rename = "plaits_hihat")]
    HiHat,
}

pub struct EngineSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub model: u8, // synthesis model number handed to the voice backend
    params: [ParamSpec; 8],
}

impl EngineSpec {
    pub fn param(&self, key: ParamKey) -> &ParamSpec {
        &self.params[key.index()]
    }

    pub fn defaults(&self) -> SynthParams {
        SynthParams { values: self.params.map(|p| p.default) }
    }
}

// Every engine shares fm/fade/volume layout; only note, the three macro
// labels/defaults and the decay window differ.
const fn engine(
    id: &'static str,
    name: &'static str,
    model: u8,
    note: (f32, f32, f32),
    macros: [(&'static str, f32); 3],
    decay: (f32, f32, f32),
    volume: f32,
) -> EngineSpec {
    EngineSpec {
        id,
        name,
        model,
        params: [
            ParamSpec::new("Note", note.0, note.1, 1.0, note.2),
            ParamSpec::new(macros[0].0, 0.0, 1.0, 0.01, macros[0].1),
            ParamSpec::new(macros[1].0, 0.0, 1.0, 0.01, macros[1].1),
            ParamSpec::new(macros[2].0, 0.0, 1.0, 0.01, macros[2].1),
            ParamSpec::new("FM Amount", 0.0, 10.0, 0.1, 0.0),
            ParamSpec::new("Decay", decay.0, decay.1, 0.01, decay.2),
            ParamSpec::new("Fade", 0.0, 1.0, 0.01, 0.0),
            ParamSpec::new("Volume", 0.0, 1.0, 0.01, volume),
        ],
    }
}

static VIRTUAL_ANALOG: EngineSpec = engine("plaits_va", "Virtual Analog", 0, (24.0, 96.0, 48.0),
    [("Waveform", 0.5), ("PWM/Sync", 0.5), ("Wavefold", 0.5)], (0.05, 2.0, 0.5), 0.8);
static WAVESHAPER: EngineSpec = engine("plaits_ws", "Waveshaper", 1, (24.0, 96.0, 48.0),
    [("Amount", 0.5), ("Asymmetry", 0.5), ("Shape", 0.5)], (0.05, 2.0, 0.5), 0.8);
static FM: EngineSpec = engine("plaits_fm", "FM Synth", 2, (24.0, 96.0, 48.0),
    [("Ratio", 0.5), ("Index", 0.5), ("Feedback", 0.0)], (0.05, 2.0, 0.5), 0.8);
static GRANULAR: EngineSpec = engine("plaits_grain", "Granular", 3, (24.0, 96.0, 48.0),
    [("Overlap", 0.5), ("Grain Size", 0.5), ("Randomness", 0.5)], (0.1, 2.0, 0.8), 0.8);
static ADDITIVE: EngineSpec = engine("plaits_add", "Additive", 4, (24.0, 96.0, 48.0),
    [("Harmonics", 0.5), ("Brightness", 0.5), ("Detune", 0.0)], (0.05, 2.0, 0.5), 0.8);
static WAVETABLE: EngineSpec = engine("plaits_wt", "Wavetable", 5, (24.0, 96.0, 48.0),
    [("Bank", 0.0), ("Position", 0.5), ("Warp", 0.0)], (0.05, 2.0, 0.5), 0.8);
static CHORD: EngineSpec = engine("plaits_chord", "Chord", 6, (24.0, 96.0, 48.0),
    [("Chord Type", 0.3), ("Inversion", 0.5), ("Waveform", 0.5)], (0.1, 3.0, 0.5), 0.8);
static VOWEL: EngineSpec = engine("plaits_vowel", "Vowel/Speech", 7, (24.0, 96.0, 48.0),
    [("Formant", 0.5), ("Vowel", 0.5), ("Noise", 0.2)], (0.05, 2.0, 0.5), 0.8);
static SWARM: EngineSpec = engine("plaits_swarm", "Swarm", 8, (24.0, 96.0, 48.0),
    [("Density", 0.6), ("Speed", 0.4), ("Chaos", 0.5)], (0.1, 3.0, 0.7), 0.8);
static NOISE: EngineSpec = engine("plaits_noise", "Noise", 9, (24.0, 96.0, 60.0),
    [("Type", 0.5), ("Filter", 0.5), ("Resonance", 0.3)], (0.01, 1.0, 0.1), 0.8);
static PARTICLE: EngineSpec = engine("plaits_particle", "Particle", 10, (24.0, 96.0, 48.0),
    [("Density", 0.6), ("Filter", 0.5), ("Randomness", 0.5)], (0.1, 2.0, 0.6), 0.8);
static STRING: EngineSpec = engine("plaits_string", "String", 11, (24.0, 72.0, 36.0),
    [("Harmonics", 0.5), ("Brightness", 0.6), ("Damping", 0.3)], (0.2, 4.0, 1.5), 0.8);
static MODAL: EngineSpec = engine("plaits_modal", "Modal", 12, (24.0, 96.0, 48.0),
    [("Structure", 0.5), ("Brightness", 0.5), ("Damping", 0.6)], (0.1, 3.0, 1.0), 0.8);
static KICK: EngineSpec = engine("plaits_kick", "Kick Drum", 13, (24.0, 60.0, 36.0),
    [("Tone", 0.5), ("Attack", 0.3), ("Punch", 0.5)], (0.05, 1.5, 0.5), 0.9);
static SNARE: EngineSpec = engine("plaits_snare", "Snare Drum", 14, (40.0, 80.0, 60.0),
    [("Tone", 0.5), ("Snap", 0.6), ("Noise", 0.7)], (0.02, 0.5, 0.15), 0.9);
static HIHAT: EngineSpec = engine("plaits_hihat", "Hi-Hat", 15, (60.0, 96.0, 72.0),
    [("Tone", 0.6), ("Metallic", 0.5), ("Noise", 0.8)], (0.01, 0.3, 0.08), 0.8);

impl EngineKind {
    pub const ALL: [EngineKind; 16] = [
        EngineKind::VirtualAnalog,
        EngineKind::Waveshaper,
        EngineKind::Fm,
        EngineKind::Granular,
        EngineKind::Additive,
        EngineKind::Wavetable,
        EngineKind::Chord,
        EngineKind::Vowel,
        EngineKind::Swarm,
        EngineKind::Noise,
        EngineKind::Particle,
        EngineKind::String,
        EngineKind::Modal,
        EngineKind::Kick,
        EngineKind::Snare,
        EngineKind::HiHat,
    ];

    pub fn spec(self) -> &'static EngineSpec {
        match self {
            EngineKind::VirtualAnalog => &VIRTUAL_ANALOG,
            EngineKind::Waveshaper => &WAVESHAPER,
            EngineKind::Fm => &FM,
            EngineKind::Granular => &GRANULAR,
            EngineKind::Additive => &ADDITIVE,
            EngineKind::Wavetable => &WAVETABLE,
            EngineKind::Chord => &CHORD,
            EngineKind::Vowel => &VOWEL,
            EngineKind::Swarm => &SWARM,
            EngineKind::Noise => &NOISE,
            EngineKind::Particle => &PARTICLE,
            EngineKind::String => &STRING,
            EngineKind::Modal => &MODAL,
            EngineKind::Kick => &KICK,
            EngineKind::Snare => &SNARE,
            EngineKind::HiHat => &HIHAT,
        }
    }

    pub fn id(self) -> &'static str {
        self.spec().id
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.id() == id)
    }

    pub fn model(self) -> u8 {
        self.spec().model
    }

    pub fn default_params(self) -> SynthParams {
        self.spec().defaults()
    }
}

// -- fx --

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FxKey {
    WaspFilter,
    WaspFreq,
    WaspRes,
    WaspDrive,
    Drive,
    Distortion,
    Resonator,
    ResFreq,
    ResDecay,
    Delay,
    DelayTime,
    Reverb,
    ReverbSize,
}

static FX_SPECS: [ParamSpec; 13] = [
    ParamSpec::new("Wasp Mix", 0.0, 1.0, 0.01, 0.0),
    ParamSpec::new("Wasp Freq", 100.0, 8000.0, 10.0, 2000.0),
    ParamSpec::new("Wasp Res", 0.5, 30.0, 0.1, 5.0),
    ParamSpec::new("Wasp Drive", 1.0, 10.0, 0.1, 2.0),
    ParamSpec::new("Drive", 1.0, 20.0, 0.1, 1.0),
    ParamSpec::new("Distortion", 0.0, 1.0, 0.01, 0.0),
    ParamSpec::new("Resonator", 0.0, 1.0, 0.01, 0.0),
    ParamSpec::new("Res Freq", 100.0, 2000.0, 10.0, 440.0),
    ParamSpec::new("Res Decay", 0.05, 2.0, 0.01, 0.3),
    ParamSpec::new("Delay", 0.0, 1.0, 0.01, 0.0),
    ParamSpec::new("Delay Time", 0.05, 1.0, 0.01, 0.25),
    ParamSpec::new("Reverb", 0.0, 1.0, 0.01, 0.0),
    ParamSpec::new("Reverb Size", 0.5, 4.0, 0.1, 2.0),
];

impl FxKey {
    pub const ALL: [FxKey; 13] = [
        FxKey::WaspFilter,
        FxKey::WaspFreq,
        FxKey::WaspRes,
        FxKey::WaspDrive,
        FxKey::Drive,
        FxKey::Distortion,
        FxKey::Resonator,
        FxKey::ResFreq,
        FxKey::ResDecay,
        FxKey::Delay,
        FxKey::DelayTime,
        FxKey::Reverb,
        FxKey::ReverbSize,
    ];

    pub fn spec(self) -> &'static ParamSpec {
        &FX_SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            FxKey::WaspFilter => "waspFilter",
            FxKey::WaspFreq => "waspFreq",
            FxKey::WaspRes => "waspRes",
            FxKey::WaspDrive => "waspDrive",
            FxKey::Drive => "drive",
            FxKey::Distortion => "distortion",
            FxKey::Resonator => "resonator",
            FxKey::ResFreq => "resFreq",
            FxKey::ResDecay => "resDecay",
            FxKey::Delay => "delay",
            FxKey::DelayTime => "delayTime",
            FxKey::Reverb => "reverb",
            FxKey::ReverbSize => "reverbSize",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

// One FX parameter set. Tracks, step locks and the master bus all use it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FxParams {
    pub wasp_filter: f32,
    pub wasp_freq: f32,
    pub wasp_res: f32,
    pub wasp_drive: f32,
    pub drive: f32,
    pub distortion: f32,
    pub resonator: f32,
    pub res_freq: f32,
    pub res_decay: f32,
    pub delay: f32,
    pub delay_time: f32,
    pub reverb: f32,
    pub reverb_size: f32,
}

impl Default for FxParams {
    fn default() -> Self {
        let mut fx = Self {
            wasp_filter: 0.0,
            wasp_freq: 0.0,
            wasp_res: 0.0,
            wasp_drive: 0.0,
            drive: 0.0,
            distortion: 0.0,
            resonator: 0.0,
            res_freq: 0.0,
            res_decay: 0.0,
            delay: 0.0,
            delay_time: 0.0,
            reverb: 0.0,
            reverb_size: 0.0,
        };
        for key in FxKey::ALL {
            *fx.slot(key) = key.spec().default;
        }
        fx
    }
}

impl FxParams {
    fn slot(&mut self, key: FxKey) -> &mut f32 {
        match key {
            FxKey::WaspFilter => &mut self.wasp_filter,
            FxKey::WaspFreq => &mut self.wasp_freq,
            FxKey::WaspRes => &mut self.wasp_res,
            FxKey::WaspDrive => &mut self.wasp_drive,
            FxKey::Drive => &mut self.drive,
            FxKey::Distortion => &mut self.distortion,
            FxKey::Resonator => &mut self.resonator,
            FxKey::ResFreq => &mut self.res_freq,
            FxKey::ResDecay => &mut self.res_decay,
            FxKey::Delay => &mut self.delay,
            FxKey::DelayTime => &mut self.delay_time,
            FxKey::Reverb => &mut self.reverb,
            FxKey::ReverbSize => &mut self.reverb_size,
        }
    }

    pub fn get(&self, key: FxKey) -> f32 {
        match key {
            FxKey::WaspFilter => self.wasp_filter,
            FxKey::WaspFreq => self.wasp_freq,
            FxKey::WaspRes => self.wasp_res,
            FxKey::WaspDrive => self.wasp_drive,
            FxKey::Drive => self.drive,
            FxKey::Distortion => self.distortion,
            FxKey::Resonator => self.resonator,
            FxKey::ResFreq => self.res_freq,
            FxKey::ResDecay => self.res_decay,
            FxKey::Delay => self.delay,
            FxKey::DelayTime => self.delay_time,
            FxKey::Reverb => self.reverb,
            FxKey::ReverbSize => self.reverb_size,
        }
    }

    pub fn set(&mut self, key: FxKey, value: f32) -> f32 {
        let clamped = key.spec().clamp(value);
        *self.slot(key) = clamped;
        clamped
    }

    pub fn clamped(mut self) -> Self {
        for key in FxKey::ALL {
            let v = *self.slot(key);
            *self.slot(key) = key.spec().clamp(v);
        }
        self
    }
}
