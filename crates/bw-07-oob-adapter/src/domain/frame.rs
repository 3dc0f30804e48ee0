//! Frames of the command protocol.
//!
//! ```text
//! <cmd4> <len10> <seq10>\n
//! (kv <key> <len>\n<bytes>\n)*
//! (ro <ronum> <len>\n<bytes>\n)*
//! (po <dotted>:<int> <len>\n<bytes>\n)*
//! end\n
//! ```
//!
//! `len10` counts the bytes after the header line, `end\n` included.

use super::command::Command;
use super::errors::FrameError;
use bw_01_objects::{PayloadObject, RoutingObject};
use shared_types::{
    parse_duration, ponum_from_dot_form, ponum_to_dot_form, BwError, BwResult, StatusCode,
};
use std::time::Duration;

/// Length of `cmd4 len10 seq10\n`.
pub const FRAME_HEADER_LEN: usize = 27;

/// Largest seqno the header can carry.
pub const MAX_SEQNO: u32 = 0x7fff_ffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw four-character code; unknown codes still parse.
    pub cmd: String,
    pub seqno: u32,
    pub headers: Vec<(String, Vec<u8>)>,
    pub routing_objects: Vec<(u8, Vec<u8>)>,
    pub payload_objects: Vec<PayloadObject>,
}

fn malformed(msg: impl Into<String>) -> BwError {
    BwError::new(StatusCode::MalformedOOBCommand, msg)
}

impl Frame {
    pub fn new(cmd: Command, seqno: u32) -> Self {
        Self {
            cmd: cmd.code().to_string(),
            seqno,
            headers: Vec::new(),
            routing_objects: Vec::new(),
            payload_objects: Vec::new(),
        }
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_code(&self.cmd)
    }

    // =========================================================================
    // Building
    // =========================================================================

    pub fn header(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.add_header(key, value);
        self
    }

    pub fn add_header(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.headers.push((key.to_string(), value.into()));
    }

    pub fn add_routing_object(&mut self, ro: &RoutingObject) {
        self.routing_objects.push((ro.ro_num(), ro.content()));
    }

    pub fn add_payload_object(&mut self, po: PayloadObject) {
        self.payload_objects.push(po);
    }

    /// Wire form, header line included.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (k, v) in &self.headers {
            body.extend_from_slice(format!("kv {k} {}\n", v.len()).as_bytes());
            body.extend_from_slice(v);
            body.push(b'\n');
        }
        for (ronum, content) in &self.routing_objects {
            body.extend_from_slice(format!("ro {ronum} {}\n", content.len()).as_bytes());
            body.extend_from_slice(content);
            body.push(b'\n');
        }
        for po in &self.payload_objects {
            body.extend_from_slice(
                format!("po {}:{} {}\n", po.dot_form(), po.ponum, po.content.len()).as_bytes(),
            );
            body.extend_from_slice(&po.content);
            body.push(b'\n');
        }
        body.extend_from_slice(b"end\n");

        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
        out.extend_from_slice(
            format!("{:<4} {:010} {:010}\n", self.cmd, body.len(), self.seqno).as_bytes(),
        );
        out.extend_from_slice(&body);
        out
    }

    // =========================================================================
    // Header access
    // =========================================================================

    pub fn first(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn text(&self, key: &str) -> BwResult<Option<&str>> {
        self.first(key)
            .map(|v| {
                std::str::from_utf8(v).map_err(|_| malformed(format!("header {key} is not UTF-8")))
            })
            .transpose()
    }

    pub fn require_text(&self, key: &str) -> BwResult<&str> {
        self.text(key)?
            .ok_or_else(|| malformed(format!("missing header {key}")))
    }

    pub fn flag(&self, key: &str, default: bool) -> BwResult<bool> {
        match self.text(key)? {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(malformed(format!("header {key}: bad bool {other:?}"))),
        }
    }

    pub fn number<T: std::str::FromStr>(&self, key: &str) -> BwResult<Option<T>> {
        self.text(key)?
            .map(|s| {
                s.trim()
                    .parse()
                    .map_err(|_| malformed(format!("header {key}: bad number {s:?}")))
            })
            .transpose()
    }

    pub fn duration(&self, key: &str) -> BwResult<Option<Duration>> {
        match self.text(key)? {
            Some(s) => parse_duration(s),
            None => Ok(None),
        }
    }

    /// First payload object with number `ponum`.
    pub fn payload(&self, ponum: u32) -> Option<&PayloadObject> {
        self.payload_objects.iter().find(|po| po.ponum == ponum)
    }

    pub fn require_payload(&self, ponum: u32) -> BwResult<&PayloadObject> {
        self.payload(ponum).ok_or_else(|| {
            malformed(format!("missing payload object {}", ponum_to_dot_form(ponum)))
        })
    }
}

/// Parse the 27-byte header line into `(cmd, len, seqno)`.
pub(crate) fn parse_header(hdr: &[u8]) -> Result<(String, usize, u32), FrameError> {
    if hdr.len() != FRAME_HEADER_LEN || hdr[4] != b' ' || hdr[15] != b' ' || hdr[26] != b'\n' {
        return Err(FrameError::header("layout is not `cmd4 len10 seq10`"));
    }
    let cmd = std::str::from_utf8(&hdr[..4])
        .ok()
        .filter(|c| c.bytes().all(|b| b.is_ascii_graphic()))
        .ok_or_else(|| FrameError::header("command is not ASCII"))?;
    let len = digits(&hdr[5..15]).ok_or_else(|| FrameError::header("length is not decimal"))?;
    let seq = digits(&hdr[16..26]).ok_or_else(|| FrameError::header("seqno is not decimal"))?;
    let seq = u32::try_from(seq)
        .ok()
        .filter(|s| *s <= MAX_SEQNO)
        .ok_or_else(|| FrameError::header("seqno out of range"))?;
    Ok((cmd.to_string(), len as usize, seq))
}

fn digits(b: &[u8]) -> Option<u64> {
    if !b.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(b).ok()?.parse().ok()
}

/// Parse the `<dotted>:<int>` token of a `po` line. Either half may be
/// missing or come first; when both are present they must agree.
pub(crate) fn parse_po_token(tok: &str) -> Result<u32, FrameError> {
    let (a, b) = tok
        .split_once(':')
        .ok_or_else(|| FrameError::line(format!("po type {tok:?} has no ':'")))?;
    let mut dotted = None;
    let mut int = None;
    for half in [a, b] {
        if half.is_empty() {
            continue;
        }
        if half.contains('.') {
            let v = ponum_from_dot_form(half)
                .map_err(|_| FrameError::line(format!("bad dotted PO type {half:?}")))?;
            dotted = Some(v);
        } else {
            let v: u32 = half
                .parse()
                .map_err(|_| FrameError::line(format!("bad numeric PO type {half:?}")))?;
            int = Some(v);
        }
    }
    match (dotted, int) {
        (Some(d), Some(i)) if d != i => Err(FrameError::line(format!(
            "PO type halves disagree in {tok:?}"
        ))),
        (Some(v), _) | (None, Some(v)) => Ok(v),
        (None, None) => Err(FrameError::line("empty PO type")),
    }
}
