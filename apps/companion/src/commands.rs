//! Interactive commands read from stdin

use std::str::FromStr;

use thiserror::Error;

use resonance_session_sync::RemoteJoinPreference;

pub const HELP: &str = "\
commands:
  play | pause | next | prev
  seek <secs>        seek to an absolute position
  seekpct <0-100>    seek to a percentage of the track
  vol <0-1>          set volume
  mute | unmute
  ff | rw            skip 10 seconds forward or back
  load <id> <secs>   queue a track of the given length and play it
  join | leave       control the playing device, or stop controlling it
  takeover           move playback to this device
  release            stop being the audio device
  prefer <always|ask|never>
  status | logout | help";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{0} needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid {name}: {value}")]
    InvalidArgument { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Next,
    Prev,
    Seek(f64),
    SeekPercent(f64),
    Volume(f64),
    Mute(bool),
    Forward,
    Rewind,
    Load { id: String, duration: f64 },
    Join,
    Leave,
    Takeover,
    Release,
    Prefer(RemoteJoinPreference),
    Status,
    Logout,
    Help,
}

fn number(name: &'static str, raw: Option<&str>) -> Result<f64, CommandError> {
    let raw = raw.ok_or(CommandError::MissingArgument(name))?;
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| CommandError::InvalidArgument {
            name,
            value: raw.to_string(),
        })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::Unknown(String::new()));
        };
        let arg = words.next();

        let command = match name.to_lowercase().as_str() {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "next" => Self::Next,
            "prev" => Self::Prev,
            "seek" => Self::Seek(number("seek", arg)?),
            "seekpct" => {
                let percent = number("seekpct", arg)?;
                if !(0.0..=100.0).contains(&percent) {
                    return Err(CommandError::InvalidArgument {
                        name: "seekpct",
                        value: percent.to_string(),
                    });
                }
                Self::SeekPercent(percent)
            }
            "vol" => {
                let volume = number("vol", arg)?;
                if !(0.0..=1.0).contains(&volume) {
                    return Err(CommandError::InvalidArgument {
                        name: "vol",
                        value: volume.to_string(),
                    });
                }
                Self::Volume(volume)
            }
            "mute" => Self::Mute(true),
            "unmute" => Self::Mute(false),
            "ff" => Self::Forward,
            "rw" => Self::Rewind,
            "load" => {
                let id = arg.ok_or(CommandError::MissingArgument("load"))?;
                let duration = number("duration", words.next())?;
                if duration <= 0.0 {
                    return Err(CommandError::InvalidArgument {
                        name: "duration",
                        value: duration.to_string(),
                    });
                }
                Self::Load {
                    id: id.to_string(),
                    duration,
                }
            }
            "join" => Self::Join,
            "leave" => Self::Leave,
            "takeover" => Self::Takeover,
            "release" => Self::Release,
            "prefer" => {
                let raw = arg.ok_or(CommandError::MissingArgument("prefer"))?;
                let preference =
                    raw.parse()
                        .map_err(|_| CommandError::InvalidArgument {
                            name: "preference",
                            value: raw.to_string(),
                        })?;
                Self::Prefer(preference)
            }
            "status" => Self::Status,
            "logout" => Self::Logout,
            "help" | "?" => Self::Help,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}
