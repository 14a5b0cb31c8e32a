//! Line-oriented command console
//!
//! Each input line is one command. Deck commands start with the deck
//! letter (`a play`, `b loop 4`); mixer commands stand alone (`xf -0.5`).

use std::path::PathBuf;

use nexus_audio::{
    AudioCommand, DeckCommand, DeckId, EngineSnapshot, EqBand, GatePattern, GateRate, RollMode,
    HOT_CUE_SLOTS, SAMPLER_PADS,
};
use thiserror::Error;

/// Errors produced while parsing a console line
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Missing {0}")]
    MissingArgument(&'static str),
    #[error("Not a number: {0}")]
    InvalidNumber(String),
    #[error("Unknown gate preset: {0}")]
    UnknownPreset(String),
    #[error("Gate pattern needs 16 steps of 0 or 1: {0}")]
    InvalidPattern(String),
    #[error("Gate rate must be 8, 16 or 32: {0}")]
    InvalidRate(String),
    #[error("Slot {0} out of range")]
    SlotOutOfRange(usize),
}

/// A parsed console line
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    /// Forward straight to the engine
    Engine(AudioCommand),
    /// Decode a file onto a deck
    Load { deck: DeckId, path: PathBuf },
    /// Decode a file onto a sampler pad
    LoadSample {
        deck: DeckId,
        pad: usize,
        path: PathBuf,
    },
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
deck commands (prefix with a or b):
  load <path>  play  pause  stop  toggle  tapestop [secs]  seek <secs>
  pitch <rate>  bpm <bpm>  reverse  sync
  gain <0-2>  eq low|mid|high <db>  filter <0-1, 0.5 = off>  dist <0-1>
  delay <wet> <secs>  noise <0-1>  flange <0-1>  vol <0-1.5>  pan <-1..1>
  loop <beats>  roll <beats> [latch]  unroll <beats>  cue <1-4>  uncue <1-4>
  scratch start|stop|<velocity>
  gate preset <name>  gate bits <16 x 0/1>  gate step <1-16>  gate mix <0-1>  gate rate 8|16|32
  fader <0-1>  send <0-1>  sample <1-4>  sample load <1-4> <path>
mixer commands:
  xf <-1..1>  nudge <delta>  master <0-2>  reverb time <secs>  reverb size <0-1>
other: status  help  quit";

/// Parse one console line
pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = line.trim();
    let (head, rest) = split_word(line);

    match head.to_ascii_lowercase().as_str() {
        "" => Err(ParseError::Empty),
        "q" | "quit" | "exit" => Ok(ConsoleCommand::Quit),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "status" | "st" => Ok(ConsoleCommand::Status),
        "xf" => engine(AudioCommand::SetCrossfader(number(rest, "crossfader position")?)),
        "nudge" => engine(AudioCommand::MoveCrossfader(number(rest, "crossfader delta")?)),
        "master" => engine(AudioCommand::SetMasterVolume(number(rest, "master volume")?)),
        "reverb" => parse_reverb(rest),
        "a" => parse_deck(DeckId::A, rest),
        "b" => parse_deck(DeckId::B, rest),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn parse_reverb(args: &str) -> Result<ConsoleCommand, ParseError> {
    let (what, value) = split_word(args);
    match what {
        "time" => engine(AudioCommand::SetReverbTime(number(value, "reverb time")?)),
        "size" => engine(AudioCommand::SetReverbSize(number(value, "reverb size")?)),
        "" => Err(ParseError::MissingArgument("time or size")),
        other => Err(ParseError::Unknown(format!("reverb {other}"))),
    }
}

fn parse_deck(deck: DeckId, args: &str) -> Result<ConsoleCommand, ParseError> {
    let (verb, rest) = split_word(args);
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "" => return Err(ParseError::MissingArgument("deck command")),
        "load" => {
            let path = unquote(rest);
            if path.is_empty() {
                return Err(ParseError::MissingArgument("path"));
            }
            return Ok(ConsoleCommand::Load {
                deck,
                path: PathBuf::from(path),
            });
        }
        "sync" => return engine(AudioCommand::Sync(deck)),
        "fader" => {
            return engine(AudioCommand::SetChannelVolume(deck, number(rest, "fader level")?))
        }
        "send" => return engine(AudioCommand::SetReverbSend(deck, number(rest, "send level")?)),
        "sample" => return parse_sample(deck, rest),

        "play" => DeckCommand::Play,
        "pause" => DeckCommand::Pause,
        "stop" => DeckCommand::Stop,
        "toggle" => DeckCommand::TogglePlay,
        "tapestop" => {
            let duration = if rest.is_empty() {
                None
            } else {
                Some(number(rest, "tape stop length")?)
            };
            DeckCommand::TapeStop(duration)
        }
        "seek" => DeckCommand::Seek(number(rest, "position")?),
        "pitch" => DeckCommand::SetPitch(number(rest, "playback rate")?),
        "bpm" => DeckCommand::SetBpm(number(rest, "bpm")?),
        "reverse" => DeckCommand::ToggleReverse,

        "gain" => DeckCommand::SetGain(number(rest, "gain")?),
        "eq" => {
            let (band, db) = split_word(rest);
            let band = match band.to_ascii_lowercase().as_str() {
                "low" => EqBand::Low,
                "mid" => EqBand::Mid,
                "high" => EqBand::High,
                "" => return Err(ParseError::MissingArgument("eq band")),
                other => return Err(ParseError::Unknown(format!("eq {other}"))),
            };
            DeckCommand::SetEq(band, number(db, "eq gain")?)
        }
        "filter" => DeckCommand::SetFilter(number(rest, "filter position")?),
        "dist" => DeckCommand::SetDistortion(number(rest, "distortion amount")?),
        "delay" => {
            let (wet, time) = split_word(rest);
            DeckCommand::SetDelay {
                wet: number(wet, "delay wet")?,
                time: number(time, "delay time")?,
            }
        }
        "noise" => DeckCommand::SetNoise(number(rest, "noise level")?),
        "flange" => DeckCommand::SetFlange(number(rest, "flange amount")?),
        "vol" => DeckCommand::SetVolume(number(rest, "volume")?),
        "pan" => DeckCommand::SetPan(number(rest, "pan")?),

        "loop" => DeckCommand::ToggleLoop(number(rest, "beats")?),
        "roll" => {
            let (beats, mode) = split_word(rest);
            let mode = match mode {
                "latch" => RollMode::Latched,
                _ => RollMode::Momentary,
            };
            DeckCommand::RollPress {
                beats: number(beats, "beats")?,
                mode,
            }
        }
        "unroll" => DeckCommand::RollRelease(number(rest, "beats")?),
        "cue" => DeckCommand::TriggerHotCue(slot(rest, HOT_CUE_SLOTS)?),
        "uncue" => DeckCommand::ClearHotCue(slot(rest, HOT_CUE_SLOTS)?),

        "scratch" => match rest {
            "start" => DeckCommand::StartScratch,
            "stop" => DeckCommand::StopScratch,
            velocity => DeckCommand::ScratchMovement(number(velocity, "scratch velocity")?),
        },

        "gate" => parse_gate(rest)?,

        other => return Err(ParseError::Unknown(other.to_string())),
    };
    engine(AudioCommand::Deck(deck, cmd))
}

fn parse_gate(args: &str) -> Result<DeckCommand, ParseError> {
    let (what, value) = split_word(args);
    match what {
        "preset" => GatePattern::preset(value)
            .map(DeckCommand::SetGatePattern)
            .ok_or_else(|| ParseError::UnknownPreset(value.to_string())),
        "bits" => {
            let bits: Vec<u8> = value
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| match c {
                    '0' => Some(0),
                    '1' => Some(1),
                    _ => None,
                })
                .collect::<Option<_>>()
                .ok_or_else(|| ParseError::InvalidPattern(value.to_string()))?;
            GatePattern::from_bits(&bits)
                .map(DeckCommand::SetGatePattern)
                .ok_or_else(|| ParseError::InvalidPattern(value.to_string()))
        }
        "step" => Ok(DeckCommand::ToggleGateStep(slot(value, nexus_audio::GATE_STEPS)?)),
        "mix" => Ok(DeckCommand::SetGateMix(number(value, "gate mix")?)),
        "rate" => value
            .parse::<u32>()
            .ok()
            .and_then(GateRate::from_steps)
            .map(DeckCommand::SetGateRate)
            .ok_or_else(|| ParseError::InvalidRate(value.to_string())),
        "" => Err(ParseError::MissingArgument("gate setting")),
        other => Err(ParseError::Unknown(format!("gate {other}"))),
    }
}

fn parse_sample(deck: DeckId, args: &str) -> Result<ConsoleCommand, ParseError> {
    let (first, rest) = split_word(args);
    if first == "load" {
        let (pad, path) = split_word(rest);
        let pad = slot(pad, SAMPLER_PADS)?;
        let path = unquote(path);
        if path.is_empty() {
            return Err(ParseError::MissingArgument("path"));
        }
        return Ok(ConsoleCommand::LoadSample {
            deck,
            pad,
            path: PathBuf::from(path),
        });
    }
    let pad = slot(first, SAMPLER_PADS)?;
    engine(AudioCommand::TriggerSample { deck, pad })
}

fn engine(cmd: AudioCommand) -> Result<ConsoleCommand, ParseError> {
    Ok(ConsoleCommand::Engine(cmd))
}

/// Split off the first whitespace-delimited word
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn unquote(path: &str) -> &str {
    let path = path.trim();
    if path.len() >= 2
        && ((path.starts_with('\'') && path.ends_with('\''))
            || (path.starts_with('"') && path.ends_with('"')))
    {
        &path[1..path.len() - 1]
    } else {
        path
    }
}

fn number<T: std::str::FromStr>(value: &str, what: &'static str) -> Result<T, ParseError> {
    if value.is_empty() {
        return Err(ParseError::MissingArgument(what));
    }
    value
        .parse()
        .map_err(|_| ParseError::InvalidNumber(value.to_string()))
}

/// One-based slot number to a zero-based index
fn slot(value: &str, count: usize) -> Result<usize, ParseError> {
    let n: usize = number(value, "slot")?;
    if n == 0 || n > count {
        return Err(ParseError::SlotOutOfRange(n));
    }
    Ok(n - 1)
}

/// Multi-line status report for the `status` command
pub fn format_status(snapshot: &EngineSnapshot) -> String {
    let mut lines = Vec::new();
    for deck in [&snapshot.deck_a, &snapshot.deck_b] {
        let name = deck.track_name.as_deref().unwrap_or("-");
        let looping = if deck.loop_state.active {
            format!(" loop {:.3}s", deck.loop_state.length())
        } else {
            String::new()
        };
        let gate = match deck.gate_step {
            Some(step) => format!(" gate {:>2}", step + 1),
            None => String::new(),
        };
        lines.push(format!(
            "{} {:<12} {:>7.2}/{:<7.2} {:>6.1} bpm x{:.3}{}{}{} [{}]",
            deck.id.label(),
            format!("{:?}", deck.playback),
            deck.current_time,
            deck.duration,
            deck.bpm,
            deck.pitch,
            if deck.reversed { " rev" } else { "" },
            looping,
            gate,
            name
        ));
    }
    lines.push(format!(
        "xf {:+.2}  fader {:.2}/{:.2}  send {:.2}/{:.2}  reverb {:.1}s size {:.2}  master {:.2}",
        snapshot.crossfader,
        snapshot.channel_volume[0],
        snapshot.channel_volume[1],
        snapshot.reverb_send[0],
        snapshot.reverb_send[1],
        snapshot.reverb_time,
        snapshot.reverb_size,
        snapshot.master_volume
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck_command(line: &str) -> (DeckId, DeckCommand) {
        match parse_line(line) {
            Ok(ConsoleCommand::Engine(AudioCommand::Deck(deck, cmd))) => (deck, cmd),
            other => panic!("expected a deck command for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_commands() {
        assert!(matches!(parse_line("quit"), Ok(ConsoleCommand::Quit)));
        assert!(matches!(parse_line("  q "), Ok(ConsoleCommand::Quit)));
        assert!(matches!(parse_line("help"), Ok(ConsoleCommand::Help)));
        assert!(matches!(parse_line("status"), Ok(ConsoleCommand::Status)));
        assert_eq!(parse_line("   ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_transport() {
        assert!(matches!(deck_command("a play"), (DeckId::A, DeckCommand::Play)));
        assert!(matches!(deck_command("B pause"), (DeckId::B, DeckCommand::Pause)));
        assert!(matches!(
            deck_command("a tapestop"),
            (DeckId::A, DeckCommand::TapeStop(None))
        ));
        assert!(matches!(
            deck_command("a tapestop 2"),
            (DeckId::A, DeckCommand::TapeStop(Some(d))) if d == 2.0
        ));
        assert!(matches!(
            deck_command("b seek 12.5"),
            (DeckId::B, DeckCommand::Seek(s)) if s == 12.5
        ));
    }

    #[test]
    fn test_load_path() {
        match parse_line("a load \"/music/my track.flac\"") {
            Ok(ConsoleCommand::Load { deck, path }) => {
                assert_eq!(deck, DeckId::A);
                assert_eq!(path, PathBuf::from("/music/my track.flac"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse_line("b load").unwrap_err(),
            ParseError::MissingArgument("path")
        );
    }

    #[test]
    fn test_mixer() {
        assert!(matches!(
            parse_line("xf -0.3"),
            Ok(ConsoleCommand::Engine(AudioCommand::SetCrossfader(v))) if v == -0.3
        ));
        assert!(matches!(
            parse_line("reverb time 4"),
            Ok(ConsoleCommand::Engine(AudioCommand::SetReverbTime(v))) if v == 4.0
        ));
        assert!(matches!(
            parse_line("b send 0.5"),
            Ok(ConsoleCommand::Engine(AudioCommand::SetReverbSend(DeckId::B, v))) if v == 0.5
        ));
        assert!(matches!(
            parse_line("a sync"),
            Ok(ConsoleCommand::Engine(AudioCommand::Sync(DeckId::A)))
        ));
    }

    #[test]
    fn test_chain_controls() {
        assert!(matches!(
            deck_command("a eq low -12"),
            (DeckId::A, DeckCommand::SetEq(EqBand::Low, db)) if db == -12.0
        ));
        assert!(matches!(
            deck_command("a delay 0.4 0.375"),
            (_, DeckCommand::SetDelay { wet, time }) if wet == 0.4 && time == 0.375
        ));
        assert_eq!(
            parse_line("a eq").unwrap_err(),
            ParseError::MissingArgument("eq band")
        );
        assert_eq!(
            parse_line("a gain loud").unwrap_err(),
            ParseError::InvalidNumber("loud".to_string())
        );
    }

    #[test]
    fn test_filter_knob_is_unit_range() {
        assert!(HELP.contains("filter <0-1, 0.5 = off>"));
        assert!(matches!(
            deck_command("a filter 0.5"),
            (_, DeckCommand::SetFilter(v)) if v == 0.5
        ));
        let (lp, hp) = nexus_audio::filter_cutoffs(0.5);
        assert!(lp >= 20000.0 && hp < 20.0);
    }

    #[test]
    fn test_loops_and_cues() {
        assert!(matches!(
            deck_command("a loop 4"),
            (_, DeckCommand::ToggleLoop(b)) if b == 4.0
        ));
        assert!(matches!(
            deck_command("a roll 0.25 latch"),
            (_, DeckCommand::RollPress { beats, mode: RollMode::Latched }) if beats == 0.25
        ));
        assert!(matches!(
            deck_command("a roll 0.5"),
            (_, DeckCommand::RollPress { mode: RollMode::Momentary, .. })
        ));
        assert!(matches!(deck_command("b cue 1"), (_, DeckCommand::TriggerHotCue(0))));
        assert_eq!(
            parse_line("b cue 5").unwrap_err(),
            ParseError::SlotOutOfRange(5)
        );
    }

    #[test]
    fn test_gate() {
        let (_, cmd) = deck_command("a gate preset chopper");
        let DeckCommand::SetGatePattern(pattern) = cmd else {
            panic!("expected a pattern");
        };
        assert_eq!(Some(pattern), GatePattern::preset("CHOPPER"));

        let (_, cmd) = deck_command("a gate bits 1000 1000 1000 1000");
        let DeckCommand::SetGatePattern(pattern) = cmd else {
            panic!("expected a pattern");
        };
        assert_eq!(Some(pattern), GatePattern::preset("PEAK"));

        assert!(matches!(
            deck_command("b gate rate 32"),
            (_, DeckCommand::SetGateRate(GateRate::ThirtySecond))
        ));
        assert!(matches!(deck_command("b gate step 16"), (_, DeckCommand::ToggleGateStep(15))));
        assert_eq!(
            parse_line("a gate rate 12").unwrap_err(),
            ParseError::InvalidRate("12".to_string())
        );
        assert_eq!(
            parse_line("a gate preset polka").unwrap_err(),
            ParseError::UnknownPreset("polka".to_string())
        );
        assert!(matches!(
            parse_line("a gate bits 1012"),
            Err(ParseError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_sampler() {
        assert!(matches!(
            parse_line("b sample 2"),
            Ok(ConsoleCommand::Engine(AudioCommand::TriggerSample { deck: DeckId::B, pad: 1 }))
        ));
        match parse_line("a sample load 4 horn.wav") {
            Ok(ConsoleCommand::LoadSample { deck, pad, path }) => {
                assert_eq!(deck, DeckId::A);
                assert_eq!(pad, 3);
                assert_eq!(path, PathBuf::from("horn.wav"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_scratch() {
        assert!(matches!(deck_command("a scratch start"), (_, DeckCommand::StartScratch)));
        assert!(matches!(
            deck_command("a scratch -1.5"),
            (_, DeckCommand::ScratchMovement(v)) if v == -1.5
        ));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(
            parse_line("c play").unwrap_err(),
            ParseError::Unknown("c".to_string())
        );
        assert_eq!(
            parse_line("a moonwalk").unwrap_err(),
            ParseError::Unknown("moonwalk".to_string())
        );
    }
}
