use std::time::Duration;

use seedfeed_protocol::Command;
use seedfeed_protocol::frame::{self, RawFrame};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};

/// Either a frame or a text line, whichever the server sent next.
pub enum Incoming {
    Frame(Vec<u8>),
    Line(String),
}

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    read_timeout: Duration,
}

impl Connection {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                addr: addr.to_owned(),
                after: connect_timeout,
            })?
            .map_err(ClientError::Io)?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            read_timeout,
        })
    }

    pub async fn send_command(&mut self, cmd: &Command) -> Result<()> {
        trace!(?cmd, "sending");
        self.writer
            .write_all(&cmd.to_bytes())
            .await
            .map_err(ClientError::Io)?;
        self.writer.flush().await.map_err(ClientError::Io)?;
        Ok(())
    }

    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(self.read_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.read_timeout, "read timeout");
                ClientError::ReadTimeout(self.read_timeout)
            })?
            .map_err(ClientError::Io)?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }
        Ok(line)
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let read = tokio::time::timeout(self.read_timeout, self.reader.read_exact(buf))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.read_timeout, "read timeout");
                ClientError::ReadTimeout(self.read_timeout)
            })?;
        match read {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ClientError::Disconnected)
            }
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    /// Read one 520-byte frame.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; frame::FRAME_LEN];
        self.read_exact(&mut buf).await?;
        frame::parse(&buf)?;
        Ok(buf)
    }

    /// Read a frame, or a text line if the server answered with one instead
    /// (`ERROR` in reply to INFO).
    pub async fn read_frame_or_line(&mut self) -> Result<Incoming> {
        let mut peek = [0u8; 2];
        self.read_exact(&mut peek).await?;

        if &peek == frame::SIGNATURE {
            let mut buf = vec![0u8; frame::FRAME_LEN];
            buf[0..2].copy_from_slice(&peek);
            self.read_exact(&mut buf[2..]).await?;
            frame::parse(&buf)?;
            Ok(Incoming::Frame(buf))
        } else {
            let rest = self.read_line().await?;
            Ok(Incoming::Line(format!(
                "{}{rest}",
                String::from_utf8_lossy(&peek)
            )))
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(ClientError::Io)?;
        Ok(())
    }
}

/// Parse a buffer already validated by [`Connection::read_frame`].
pub fn parse_frame(buf: &[u8]) -> Result<RawFrame<'_>> {
    Ok(frame::parse(buf)?)
}
