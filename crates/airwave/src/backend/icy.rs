//! ICY stream reader
//!
//! Connects to Icecast/Shoutcast (or plain HTTP) streams, strips ICY
//! in-band metadata and exposes the audio bytes through `Read`.
//!
//! There is no reconnection: when the network drops, the reader ends
//! and the owning handle reports a runtime failure.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::config::network::{CONNECT_TIMEOUT_SECS, USER_AGENT};
use crate::error::BackendError;

const AUDIO_CHANNEL_BOUND: usize = 32;
const CHUNK_SIZE: usize = 8192;
const STOP_POLL: Duration = Duration::from_millis(250);

/// Headers parsed from an ICY stream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyHeaders {
    pub metaint: usize,
    pub station_name: Option<String>,
    pub content_type: Option<String>,
    pub bitrate: Option<u32>,
}

/// Audio byte reader fed by a background network thread
pub struct IcyReader {
    current_chunk: Vec<u8>,
    chunk_pos: usize,
    receiver: Receiver<Vec<u8>>,
    stop_flag: Arc<AtomicBool>,
    _handle: Option<JoinHandle<()>>,
    pub headers: IcyHeaders,
}

impl IcyReader {
    /// Connect and start the background reader.
    ///
    /// Blocks until the response headers arrive. Returns the reader and a
    /// channel of stream titles, deduplicated.
    pub fn connect(
        url: &str,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<(Self, Receiver<String>), BackendError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(None)
            .build()?;

        let response = client.get(url).header("Icy-MetaData", "1").send()?;

        if !response.status().is_success() {
            return Err(BackendError::Stream(format!("HTTP {}", response.status())));
        }

        let headers = parse_icy_headers(response.headers());
        let metaint = headers.metaint;

        let (audio_tx, audio_rx) = bounded::<Vec<u8>>(AUDIO_CHANNEL_BOUND);
        let (title_tx, title_rx) = unbounded::<String>();

        let stop_clone = stop_flag.clone();
        let handle = thread::Builder::new()
            .name("icy-reader".to_string())
            .spawn(move || {
                read_icy_stream(response, metaint, title_tx, audio_tx, stop_clone);
            })?;

        Ok((
            Self {
                current_chunk: Vec::new(),
                chunk_pos: 0,
                receiver: audio_rx,
                stop_flag,
                _handle: Some(handle),
                headers,
            },
            title_rx,
        ))
    }

    /// Reader over a test channel (bypasses HTTP)
    #[cfg(test)]
    pub fn from_channel(receiver: Receiver<Vec<u8>>, stop_flag: Arc<AtomicBool>) -> Self {
        Self {
            current_chunk: Vec::new(),
            chunk_pos: 0,
            receiver,
            stop_flag,
            _handle: None,
            headers: IcyHeaders::default(),
        }
    }

    fn ended(msg: &str) -> io::Error {
        io::Error::new(io::ErrorKind::UnexpectedEof, msg.to_string())
    }
}

impl Read for IcyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let remaining = self.current_chunk.len() - self.chunk_pos;
            if remaining > 0 {
                let n = buf.len().min(remaining);
                buf[..n].copy_from_slice(&self.current_chunk[self.chunk_pos..self.chunk_pos + n]);
                self.chunk_pos += n;
                return Ok(n);
            }

            if self.stop_flag.load(Ordering::Relaxed) {
                return Err(Self::ended("stream stopped"));
            }

            match self.receiver.try_recv() {
                Ok(chunk) => {
                    self.current_chunk = chunk;
                    self.chunk_pos = 0;
                    continue;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Err(Self::ended("stream ended")),
            }

            // Wake periodically so a stop is honoured even on a silent socket
            match self.receiver.recv_timeout(STOP_POLL) {
                Ok(chunk) => {
                    self.current_chunk = chunk;
                    self.chunk_pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(Self::ended("stream ended")),
            }
        }
    }
}

impl Drop for IcyReader {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

fn parse_icy_headers(headers: &reqwest::header::HeaderMap) -> IcyHeaders {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    IcyHeaders {
        metaint: text("icy-metaint")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0),
        station_name: text("icy-name"),
        content_type: text("content-type"),
        bitrate: text("icy-br").and_then(|v| v.split(',').next()?.trim().parse::<u32>().ok()),
    }
}

/// Splits an ICY byte stream into audio chunks and metadata titles
struct IcyDemuxer {
    metaint: usize,
    bytes_until_meta: usize,
    last_title: String,
}

enum Demuxed {
    Audio(usize),
    Title(Option<String>),
}

impl IcyDemuxer {
    fn new(metaint: usize) -> Self {
        Self {
            metaint,
            bytes_until_meta: metaint,
            last_title: String::new(),
        }
    }

    /// Pull the next unit from `reader`; audio bytes land in `buf[..n]`
    fn next<R: Read>(&mut self, reader: &mut R, buf: &mut [u8]) -> io::Result<Demuxed> {
        if self.metaint == 0 || self.bytes_until_meta > 0 {
            let limit = if self.metaint == 0 {
                buf.len()
            } else {
                buf.len().min(self.bytes_until_meta)
            };
            let n = reader.read(&mut buf[..limit])?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "server closed"));
            }
            if self.metaint > 0 {
                self.bytes_until_meta -= n;
            }
            return Ok(Demuxed::Audio(n));
        }

        let mut len_byte = [0u8; 1];
        reader.read_exact(&mut len_byte)?;
        self.bytes_until_meta = self.metaint;

        let meta_len = len_byte[0] as usize * 16;
        if meta_len == 0 {
            return Ok(Demuxed::Title(None));
        }
        let mut meta_buf = vec![0u8; meta_len];
        reader.read_exact(&mut meta_buf)?;

        match extract_icy_title(&meta_buf) {
            Some(title) if title != self.last_title => {
                self.last_title = title.clone();
                Ok(Demuxed::Title(Some(title)))
            }
            _ => Ok(Demuxed::Title(None)),
        }
    }
}

fn read_icy_stream<R: Read>(
    mut response: R,
    metaint: usize,
    title_tx: Sender<String>,
    audio_tx: Sender<Vec<u8>>,
    stop_flag: Arc<AtomicBool>,
) {
    let mut demuxer = IcyDemuxer::new(metaint);
    let mut chunk = vec![0u8; CHUNK_SIZE];

    while !stop_flag.load(Ordering::SeqCst) {
        match demuxer.next(&mut response, &mut chunk) {
            Ok(Demuxed::Audio(n)) => {
                if audio_tx.send(chunk[..n].to_vec()).is_err() {
                    return;
                }
            }
            Ok(Demuxed::Title(Some(title))) => {
                let _ = title_tx.send(title);
            }
            Ok(Demuxed::Title(None)) => {}
            Err(e) => {
                tracing::debug!(error = %e, "icy stream ended");
                return;
            }
        }
    }
}

/// Parse ICY metadata string to extract the StreamTitle value.
///
/// Format: `StreamTitle='Artist - Song';StreamUrl='...';`
pub fn parse_icy_metadata(metadata: &str) -> Option<String> {
    let start = metadata.find("StreamTitle='")? + "StreamTitle='".len();
    let rest = &metadata[start..];
    let end = rest.find("';").or_else(|| rest.rfind('\''))?;
    let title = rest[..end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Extract the title from a raw, null-padded metadata block
pub fn extract_icy_title(raw_block: &[u8]) -> Option<String> {
    let end = raw_block.iter().rposition(|&b| b != 0)? + 1;
    let meta_str = String::from_utf8_lossy(&raw_block[..end]);
    parse_icy_metadata(&meta_str)
}

/// Detect a symphonia format hint from content-type and/or URL extension
pub fn detect_format_hint(url: &str, content_type: Option<&str>) -> Option<String> {
    if let Some(ct) = content_type {
        let ct = ct.to_lowercase();
        let by_type = [
            ("audio/mpeg", "mp3"),
            ("audio/mp3", "mp3"),
            ("audio/aac", "aac"),
            ("audio/aacp", "aac"),
            ("audio/ogg", "ogg"),
            ("application/ogg", "ogg"),
            ("audio/flac", "flac"),
            ("audio/wav", "wav"),
            ("audio/x-wav", "wav"),
        ];
        if let Some((_, hint)) = by_type.iter().find(|(prefix, _)| ct.contains(prefix)) {
            return Some(hint.to_string());
        }
    }

    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;
    match ext {
        "mp3" => Some("mp3".to_string()),
        "aac" | "adts" => Some("aac".to_string()),
        "ogg" | "oga" => Some("ogg".to_string()),
        "flac" => Some("flac".to_string()),
        "m4a" | "mp4" => Some("mp4".to_string()),
        "wav" => Some("wav".to_string()),
        _ => None,
    }
}
