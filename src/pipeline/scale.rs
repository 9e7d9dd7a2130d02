// Scales and note helpers for melodic tracks.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    WholeTone,
    Chromatic,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
    HungarianMinor,
    Persian,
    Hirajoshi,
    Insen,
    Kumoi,
    NeapolitanMinor,
}

impl Scale {
    pub const ALL: [Scale; 20] = [
        Scale::Ionian,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Aeolian,
        Scale::Locrian,
        Scale::HarmonicMinor,
        Scale::MelodicMinor,
        Scale::WholeTone,
        Scale::Chromatic,
        Scale::MajorPentatonic,
        Scale::MinorPentatonic,
        Scale::Blues,
        Scale::HungarianMinor,
        Scale::Persian,
        Scale::Hirajoshi,
        Scale::Insen,
        Scale::Kumoi,
        Scale::NeapolitanMinor,
    ];

    pub fn intervals(self) -> &'static [u8] {
        match self {
            Scale::Ionian => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Aeolian => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Scale::WholeTone => &[0, 2, 4, 6, 8, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::MajorPentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::HungarianMinor => &[0, 2, 3, 6, 7, 8, 11],
            Scale::Persian => &[0, 1, 4, 5, 6, 8, 11],
            Scale::Hirajoshi => &[0, 2, 3, 7, 8],
            Scale::Insen => &[0, 1, 5, 7, 10],
            Scale::Kumoi => &[0, 2, 3, 7, 9],
            Scale::NeapolitanMinor => &[0, 1, 3, 5, 7, 8, 11],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Scale::Ionian => "Ionian (Major)",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
            Scale::Aeolian => "Aeolian (Natural Minor)",
            Scale::Locrian => "Locrian",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::MelodicMinor => "Melodic Minor",
            Scale::WholeTone => "Whole Tone",
            Scale::Chromatic => "Chromatic",
            Scale::MajorPentatonic => "Major Pentatonic",
            Scale::MinorPentatonic => "Minor Pentatonic",
            Scale::Blues => "Blues",
            Scale::HungarianMinor => "Hungarian Minor",
            Scale::Persian => "Persian",
            Scale::Hirajoshi => "Hirajoshi",
            Scale::Insen => "Insen",
            Scale::Kumoi => "Kumoi",
            Scale::NeapolitanMinor => "Neapolitan Minor",
        }
    }
}

// Every MIDI note in [start, end] that belongs to the scale rooted at `root`.
// Never empty: an empty window yields just the root.
pub fn scale_notes(root: i32, scale: Scale, start: i32, end: i32) -> Vec<i32> {
    let intervals = scale.intervals();
    let mut notes: Vec<i32> = (start..=end)
        .filter(|note| {
            let relative = (note - root).rem_euclid(12) as u8;
            intervals.contains(&relative)
        })
        .collect();
    if notes.is_empty() {
        notes.push(root);
    }
    notes
}

// Index into a scale list, clamped to its bounds; middle C if the list is empty
pub fn note_at(notes: &[i32], index: i32) -> i32 {
    if notes.is_empty() {
        return 60;
    }
    let clamped = index.clamp(0, notes.len() as i32 - 1);
    notes[clamped as usize]
}

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

pub fn note_name(midi: i32) -> String {
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[midi.rem_euclid(12) as usize], octave)
}

pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_major_over_one_octave() {
        assert_eq!(scale_notes(60, Scale::Ionian, 60, 72), vec![60, 62, 64, 65, 67, 69, 71, 72]);
    }

    #[test]
    fn root_below_window_still_anchors_pitch_classes() {
        // A minor pentatonic, window starting on C
        assert_eq!(scale_notes(57, Scale::MinorPentatonic, 60, 67), vec![60, 62, 64, 67]);
    }

    #[test]
    fn empty_window_falls_back_to_root() {
        assert_eq!(scale_notes(61, Scale::Ionian, 70, 69), vec![61]);
    }

    #[test]
    fn note_lookup_clamps() {
        let notes = [48, 50, 52];
        assert_eq!(note_at(&notes, -4), 48);
        assert_eq!(note_at(&notes, 1), 50);
        assert_eq!(note_at(&notes, 99), 52);
        assert_eq!(note_at(&[], 3), 60);
    }

    #[test]
    fn names_and_frequencies() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(12), "C0");
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-3);
        assert!((midi_to_hz(81.0) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn scale_ids_match_wire_names() {
        assert_eq!(serde_json::to_string(&Scale::HarmonicMinor).unwrap(), "\"harmonic_minor\"");
        let s: Scale = serde_json::from_str("\"neapolitan_minor\"").unwrap();
        assert_eq!(s, Scale::NeapolitanMinor);
        assert_eq!(Scale::ALL.len(), 20);
    }
}
