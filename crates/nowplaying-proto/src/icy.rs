//! ICY in-band metadata framing.
//!
//! An ICY body repeats `[metaint audio bytes][1 length byte][length * 16
//! metadata bytes]`.  We only ever want the first metadata block, so the
//! parser skips audio without keeping it and buffers just the block itself.
//! Chunks coming off the socket can split a frame anywhere.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::HeaderMap;

use crate::error::FetchError;

/// Request header announcing that we can handle in-band metadata
/// (`Icy-MetaData: 1`).  Header names go out lower-cased.
pub const METADATA_REQUEST_HEADER: &str = "icy-metadata";
pub const METAINT_HEADER: &str = "icy-metaint";

/// Metadata length byte is in units of 16 bytes.
const LENGTH_UNIT: usize = 16;

/// Outcome of feeding one chunk to a [`FrameParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    NeedMore,
    /// First metadata block decoded; the value of `StreamTitle` (may be empty).
    Title(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Audio { remaining: usize },
    Length,
    Metadata { len: usize },
    Done,
}

/// Incremental parser for the first ICY frame of a stream.
#[derive(Debug)]
pub struct FrameParser {
    metaint: usize,
    /// Most bytes the first frame may span: audio, length byte and an
    /// `overflow`-sized block.
    limit: usize,
    received: usize,
    state: FrameState,
    block: Vec<u8>,
}

impl FrameParser {
    pub fn new(metaint: usize, overflow: usize) -> Self {
        Self {
            metaint,
            limit: metaint.saturating_add(1).saturating_add(overflow),
            received: 0,
            state: FrameState::Audio { remaining: metaint },
            block: Vec::new(),
        }
    }

    /// Feed the next body chunk.  Bytes after the first metadata block are
    /// ignored; once a title or an error is returned the parser is finished.
    pub fn push(&mut self, mut chunk: &[u8]) -> Result<Progress, FetchError> {
        self.received += chunk.len();

        while !chunk.is_empty() {
            match self.state {
                FrameState::Audio { remaining } => {
                    let skip = remaining.min(chunk.len());
                    chunk = &chunk[skip..];
                    self.state = if skip == remaining {
                        FrameState::Length
                    } else {
                        FrameState::Audio {
                            remaining: remaining - skip,
                        }
                    };
                }
                FrameState::Length => {
                    let len = chunk[0] as usize * LENGTH_UNIT;
                    chunk = &chunk[1..];
                    if len == 0 {
                        self.state = FrameState::Done;
                        return Err(FetchError::EmptyMetadata);
                    }
                    let needed = self.metaint + 1 + len;
                    if needed > self.limit {
                        self.state = FrameState::Done;
                        return Err(FetchError::ByteLimit {
                            needed,
                            limit: self.limit,
                        });
                    }
                    self.block.reserve_exact(len);
                    self.state = FrameState::Metadata { len };
                }
                FrameState::Metadata { len } => {
                    let take = (len - self.block.len()).min(chunk.len());
                    self.block.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    if self.block.len() == len {
                        self.state = FrameState::Done;
                        return extract_stream_title(&self.block)
                            .map(Progress::Title)
                            .ok_or(FetchError::NoStreamTitle);
                    }
                }
                FrameState::Done => break,
            }
        }

        Ok(Progress::NeedMore)
    }

    /// Bytes pushed so far, including any ignored tail.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Bytes currently held in memory.
    pub fn buffered(&self) -> usize {
        self.block.len()
    }
}

/// Parse `icy-metaint`.  Anything but a positive decimal integer means the
/// stream has no in-band metadata.
pub fn parse_metaint(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(METAINT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

/// Pull the first `StreamTitle='...'` value out of a metadata block.
pub fn extract_stream_title(block: &[u8]) -> Option<String> {
    static STREAM_TITLE: OnceLock<Regex> = OnceLock::new();
    let re = STREAM_TITLE.get_or_init(|| {
        Regex::new(r"StreamTitle='([^']*)'").expect("StreamTitle pattern is valid")
    });

    let text = String::from_utf8_lossy(block);
    re.captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
