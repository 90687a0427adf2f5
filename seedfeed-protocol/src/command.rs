use crate::error::{ProtocolError, Result};
use crate::sequence::SequenceNumber;

/// Detail level requested with `INFO`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InfoLevel {
    Id,
    Stations,
    Streams,
}

impl InfoLevel {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ID" => Ok(Self::Id),
            "STATIONS" => Ok(Self::Stations),
            "STREAMS" => Ok(Self::Streams),
            _ => Err(ProtocolError::InvalidInfoLevel(s.to_owned())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Stations => "STATIONS",
            Self::Streams => "STREAMS",
        }
    }
}

impl std::fmt::Display for InfoLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-to-server SeedLink v3 commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Hello,
    Station { station: String, network: String },
    Select { pattern: String },
    Data { sequence: Option<SequenceNumber> },
    End,
    Bye,
    Info { level: InfoLevel },
}

impl Command {
    /// Parse a command from a text line.
    ///
    /// Used by the server side of tests; the trailing `\r\n` is optional.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let mut parts = line.split_whitespace();
        let keyword = parts
            .next()
            .ok_or_else(|| ProtocolError::InvalidCommand("empty command".into()))?;

        let cmd = match keyword.to_uppercase().as_str() {
            "HELLO" => Self::Hello,
            "STATION" => {
                let station = parts.next();
                let network = parts.next();
                match (station, network) {
                    (Some(sta), Some(net)) => Self::Station {
                        station: sta.to_owned(),
                        network: net.to_owned(),
                    },
                    _ => {
                        return Err(ProtocolError::InvalidCommand(
                            "STATION requires 'STA NET'".into(),
                        ));
                    }
                }
            }
            "SELECT" => {
                let pattern = parts.next().ok_or_else(|| {
                    ProtocolError::InvalidCommand("SELECT requires a pattern".into())
                })?;
                Self::Select {
                    pattern: pattern.to_owned(),
                }
            }
            "DATA" => Self::Data {
                sequence: parts.next().map(SequenceNumber::from_hex).transpose()?,
            },
            "END" => Self::End,
            "BYE" => Self::Bye,
            "INFO" => {
                let level = parts
                    .next()
                    .ok_or_else(|| ProtocolError::InvalidCommand("INFO requires a level".into()))?;
                Self::Info {
                    level: InfoLevel::parse(level)?,
                }
            }
            _ => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "unknown command: {keyword:?}"
                )));
            }
        };

        if parts.next().is_some() {
            return Err(ProtocolError::InvalidCommand(format!(
                "{keyword}: unexpected extra arguments"
            )));
        }
        Ok(cmd)
    }

    /// Serialize to wire bytes, including the trailing `\r\n`.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self.format_line()).into_bytes()
    }

    /// Whether the server answers this command with an `OK`/`ERROR` line.
    ///
    /// In v3, `END` starts streaming and `BYE`/`INFO`/`HELLO` have their own replies.
    pub fn expects_ok(&self) -> bool {
        matches!(
            self,
            Self::Station { .. } | Self::Select { .. } | Self::Data { .. }
        )
    }

    fn format_line(&self) -> String {
        match self {
            Self::Hello => "HELLO".into(),
            Self::Station { station, network } => format!("STATION {station} {network}"),
            Self::Select { pattern } => format!("SELECT {pattern}"),
            Self::Data { sequence } => match sequence {
                Some(seq) => format!("DATA {}", seq.to_hex()),
                None => "DATA".into(),
            },
            Self::End => "END".into(),
            Self::Bye => "BYE".into(),
            Self::Info { level } => format!("INFO {}", level.as_str()),
        }
    }
}
