//! In-process SeedLink v3 server for tests.
//!
//! Answers HELLO, INFO STREAMS, STATION, SELECT and DATA, then streams the
//! configured frames after END. Every connection gets the same frames.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use seedfeed_protocol::catalog::{self, CatalogStation};
use seedfeed_protocol::{Command, InfoLevel, MseedRecord, SequenceNumber, frame, mseed};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub hello_line1: String,
    pub hello_line2: String,
    pub catalog: Vec<CatalogStation>,
    pub frames: Vec<Vec<u8>>,
    /// Close the socket once all frames are written.
    pub close_after_stream: bool,
    /// Reply `ERROR` to INFO requests.
    pub info_unavailable: bool,
    /// Stations answered with `ERROR` on STATION.
    pub rejected_stations: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            hello_line1: "SeedLink v3.1 (2020.075)".to_owned(),
            hello_line2: "Mock Server".to_owned(),
            catalog: Vec::new(),
            frames: Vec::new(),
            close_after_stream: false,
            info_unavailable: false,
            rejected_stations: Vec::new(),
        }
    }
}

impl MockConfig {
    pub fn with_frames(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }
}

/// Wrap a record into a data frame.
pub fn data_frame(sequence: u64, record: &MseedRecord) -> Vec<u8> {
    let payload = mseed::encode(record).expect("record fits one 512-byte frame");
    frame::write(SequenceNumber::new(sequence), &payload).expect("payload is 512 bytes")
}

/// Data frame whose record carries `text` under the identity of `header`,
/// as servers send log channels.
pub fn text_frame(sequence: u64, header: &MseedRecord, text: &str) -> Vec<u8> {
    let payload = mseed::encode_ascii(header, text.as_bytes()).expect("text fits a record");
    frame::write(SequenceNumber::new(sequence), &payload).expect("payload is 512 bytes")
}

/// Split `text` into INFO frames of ASCII records.
pub fn info_frames(text: &str) -> Vec<Vec<u8>> {
    let header = MseedRecord::new().with_nslc("", "INFO", "", "");
    let chunks: Vec<&[u8]> = text.as_bytes().chunks(mseed::ASCII_CAPACITY).collect();
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let payload = mseed::encode_ascii(&header, chunk).expect("chunk fits a record");
            frame::write_info(i + 1 < chunks.len(), &payload).expect("payload is 512 bytes")
        })
        .collect()
}

pub struct MockServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&commands);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, config.clone(), Arc::clone(&log)));
            }
        });

        Self { addr, commands }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Command lines received so far, across all connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

async fn handle_connection(stream: TcpStream, config: MockConfig, log: Arc<Mutex<Vec<String>>>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = line.trim().to_owned();
        log.lock().unwrap().push(trimmed.clone());

        let reply: Vec<Vec<u8>> = match Command::parse(&trimmed) {
            Ok(Command::Hello) => vec![
                format!("{}\r\n{}\r\n", config.hello_line1, config.hello_line2).into_bytes(),
            ],
            Ok(Command::Info { .. }) if config.info_unavailable => vec![b"ERROR\r\n".to_vec()],
            Ok(Command::Info {
                level: InfoLevel::Streams,
            }) => info_frames(&catalog::to_streams_xml(&config.catalog)),
            Ok(Command::Info { .. }) => info_frames("<?xml version=\"1.0\"?>\n<seedlink/>\n"),
            Ok(Command::Station { station, .. }) if config.rejected_stations.contains(&station) => {
                vec![b"ERROR\r\n".to_vec()]
            }
            Ok(Command::Station { .. } | Command::Select { .. } | Command::Data { .. }) => {
                vec![b"OK\r\n".to_vec()]
            }
            Ok(Command::End) => {
                if !write_all(&mut write_half, &config.frames).await {
                    break;
                }
                if config.close_after_stream {
                    break;
                }
                continue;
            }
            Ok(Command::Bye) => {
                let _ = write_half.shutdown().await;
                break;
            }
            Err(_) => vec![b"ERROR\r\n".to_vec()],
        };

        if !write_all(&mut write_half, &reply).await {
            break;
        }
    }
}

async fn write_all(w: &mut OwnedWriteHalf, chunks: &[Vec<u8>]) -> bool {
    for chunk in chunks {
        if w.write_all(chunk).await.is_err() {
            return false;
        }
    }
    w.flush().await.is_ok()
}
