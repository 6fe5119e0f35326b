//! Named choices in the patch schema.
//!
//! Patches are user-editable JSON, so every named field parses leniently: an
//! unrecognised name is kept verbatim in an `Unknown` variant instead of
//! failing the whole document. Consumers decide what an unknown name means
//! (oscillators render silence, filters pass audio through, and so on), and
//! the name as written survives a serialize/deserialize round trip.

macro_rules! lenient_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
        default = $default:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A name this build does not recognise, kept for round-tripping.
            Unknown(String),
        }

        impl $name {
            /// Every recognised variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn parse(name: &str) -> Self {
                match name {
                    $( $text $(| $alias)* => $name::$variant, )+
                    other => $name::Unknown(other.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $( $name::$variant => $text, )+
                    $name::Unknown(name) => name.as_str(),
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, $name::Unknown(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                Ok($name::parse(&name))
            }
        }
    };
}

lenient_enum! {
    /// Which sound source family drives a voice.
    pub enum EngineMode {
        Classic => "classic",
        Macro => "macro",
        Sampler => "sampler",
    }
    default = Classic;
}

lenient_enum! {
    /// Per-oscillator source when the engine runs in classic mode.
    pub enum OscMode {
        Analog => "analog",
        Macro => "macro",
        Sample => "sample",
    }
    default = Analog;
}

lenient_enum! {
    /// Audio-rate oscillator shapes.
    pub enum Waveform {
        Sine => "sine",
        Square => "square",
        Sawtooth => "sawtooth" | "saw",
        Triangle => "triangle",
        Pulse => "pulse",
        Noise => "noise",
    }
    default = Sawtooth;
}

lenient_enum! {
    /// LFO shapes. `Noise` is sample-and-hold random.
    pub enum LfoWaveform {
        Sine => "sine",
        Triangle => "triangle",
        Square => "square",
        Sawtooth => "sawtooth" | "saw",
        Noise => "noise" | "random",
    }
    default = Sine;
}

lenient_enum! {
    /// Where an LFO's output is routed.
    pub enum LfoDestination {
        Pitch => "pitch",
        Filter => "filter",
        Amp => "amp",
    }
    default = Pitch;
}

lenient_enum! {
    pub enum FilterType {
        Lowpass => "lowpass",
        Highpass => "highpass",
        Bandpass => "bandpass",
        Notch => "notch",
    }
    default = Lowpass;
}

lenient_enum! {
    /// The nine macro oscillator algorithms.
    pub enum MacroModel {
        /// Virtual analog: saw/pulse blend with a detuned partner.
        Va => "va",
        /// Sine/triangle through a wavefolder.
        Fold => "fold",
        /// Karplus-Strong plucked string.
        Pluck => "pluck",
        /// Seven detuned saws.
        Supersaw => "supersaw",
        /// Pulse with an internal width LFO.
        Pwm => "pwm",
        /// Two-operator phase modulation.
        Fm2op => "fm2op",
        /// Morphing scan across four single-cycle tables.
        Wavetable => "wavetable",
        /// Additive partials with adjustable rolloff.
        Harmonic => "harmonic",
        /// Paraphonic chord of sines/saws.
        Chord => "chord",
    }
    default = Va;
}

lenient_enum! {
    pub enum ArpMode {
        Up => "up",
        Down => "down",
        UpDown => "updown",
        Random => "random",
        AsPlayed => "asplayed",
        Sequence => "sequence",
    }
    default = Up;
}

lenient_enum! {
    /// Where the arpeggiator takes its per-step interval set from.
    pub enum ChordSource {
        Preset => "preset",
        Sequencer => "sequencer",
    }
    default = Preset;
}

lenient_enum! {
    pub enum ChordPreset {
        None => "none",
        Power => "power",
        Major => "major",
        Minor => "minor",
        Sus2 => "sus2",
        Sus4 => "sus4",
        Maj7 => "maj7",
        Min7 => "min7",
    }
    default = None;
}

lenient_enum! {
    /// Musical note length of one arpeggiator step.
    pub enum Division {
        Whole => "1/1",
        Half => "1/2",
        Quarter => "1/4",
        Eighth => "1/8",
        Sixteenth => "1/16",
        ThirtySecond => "1/32",
        QuarterTriplet => "1/4t",
        EighthTriplet => "1/8t",
        SixteenthTriplet => "1/16t",
        DottedEighth => "1/8d",
    }
    default = Sixteenth;
}

impl ChordPreset {
    /// Semitone intervals above the root, root included.
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            ChordPreset::None | ChordPreset::Unknown(_) => &[0],
            ChordPreset::Power => &[0, 7],
            ChordPreset::Major => &[0, 4, 7],
            ChordPreset::Minor => &[0, 3, 7],
            ChordPreset::Sus2 => &[0, 2, 7],
            ChordPreset::Sus4 => &[0, 5, 7],
            ChordPreset::Maj7 => &[0, 4, 7, 11],
            ChordPreset::Min7 => &[0, 3, 7, 10],
        }
    }
}

impl Division {
    /// Length in quarter-note beats. Unknown divisions count as sixteenths.
    pub fn beats(&self) -> f64 {
        match self {
            Division::Whole => 4.0,
            Division::Half => 2.0,
            Division::Quarter => 1.0,
            Division::Eighth => 0.5,
            Division::Sixteenth | Division::Unknown(_) => 0.25,
            Division::ThirtySecond => 0.125,
            Division::QuarterTriplet => 2.0 / 3.0,
            Division::EighthTriplet => 1.0 / 3.0,
            Division::SixteenthTriplet => 1.0 / 6.0,
            Division::DottedEighth => 0.75,
        }
    }
}
