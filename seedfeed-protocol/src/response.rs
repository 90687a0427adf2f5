use crate::error::{ProtocolError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error { description: String },
    Hello {
        software: String,
        version: String,
        organization: String,
    },
    End,
}

impl Response {
    /// Parse a single-line response: OK, ERROR, END.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line.eq_ignore_ascii_case("OK") {
            return Ok(Self::Ok);
        }
        if line.eq_ignore_ascii_case("END") {
            return Ok(Self::End);
        }
        if line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("ERROR")) {
            return Ok(Self::Error {
                description: line.get(5..).unwrap_or_default().trim().to_owned(),
            });
        }

        Err(ProtocolError::InvalidResponse(format!(
            "unrecognized response: {line:?}"
        )))
    }

    /// Parse the two-line HELLO response.
    ///
    /// Line 1: `"SeedLink v3.1 (2020.075)"`, line 2: the organization.
    pub fn parse_hello(line1: &str, line2: &str) -> Result<Self> {
        let line1 = line1.trim_end_matches('\n').trim_end_matches('\r');
        let line2 = line2.trim_end_matches('\n').trim_end_matches('\r');

        // Capability list after "::" is not used by v3 clients
        let main_part = match line1.find("::") {
            Some(idx) => &line1[..idx],
            None => line1,
        };

        let mut parts = main_part.split_whitespace();
        let software = parts
            .next()
            .ok_or_else(|| ProtocolError::InvalidResponse("empty HELLO response".into()))?
            .to_owned();
        let version = parts.next().unwrap_or_default().to_owned();

        Ok(Self::Hello {
            software,
            version,
            organization: line2.to_owned(),
        })
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ok => b"OK\r\n".to_vec(),
            Self::Error { description } if description.is_empty() => b"ERROR\r\n".to_vec(),
            Self::Error { description } => format!("ERROR {description}\r\n").into_bytes(),
            Self::Hello {
                software,
                version,
                organization,
            } => format!("{software} {version}\r\n{organization}\r\n").into_bytes(),
            Self::End => b"END\r\n".to_vec(),
        }
    }
}
