//! Async frame codec.
//!
//! The reader never reads past the length a frame declares, so a lying
//! length cannot make it swallow the next frame.

use crate::domain::frame::{parse_header, parse_po_token};
use crate::domain::{Frame, FrameError, FRAME_HEADER_LEN};
use bw_01_objects::PayloadObject;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default cap on a single frame's body.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub struct FrameReader<R> {
    reader: R,
    max_frame_bytes: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            max_frame_bytes,
        }
    }

    /// Next frame, or `None` on a clean end of stream between frames.
    pub async fn read_next(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.reader.fill_buf().await?.is_empty() {
            return Ok(None);
        }
        let mut hdr = [0u8; FRAME_HEADER_LEN];
        self.reader.read_exact(&mut hdr).await?;
        let (cmd, declared, seqno) = parse_header(&hdr)?;
        if declared > self.max_frame_bytes {
            return Err(FrameError::FrameTooLarge {
                max_frame_bytes: self.max_frame_bytes,
                got_bytes: declared,
            });
        }

        let mut frame = Frame {
            cmd,
            seqno,
            headers: Vec::new(),
            routing_objects: Vec::new(),
            payload_objects: Vec::new(),
        };
        let mut body = (&mut self.reader).take(declared as u64);
        let mut line = Vec::with_capacity(64);
        loop {
            line.clear();
            body.read_until(b'\n', &mut line).await?;
            if line.last() != Some(&b'\n') {
                if body.limit() == 0 {
                    return Err(FrameError::LengthExceeded { declared });
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "frame truncated",
                )
                .into());
            }
            if line == b"end\n" {
                return Ok(Some(frame));
            }

            let text = std::str::from_utf8(&line[..line.len() - 1])
                .map_err(|_| FrameError::line("line is not UTF-8"))?;
            let tok: Vec<&str> = text.split(' ').collect();
            let [kind, id, len] = tok[..] else {
                return Err(FrameError::line(format!("expected 3 tokens in {text:?}")));
            };
            let len: usize = len
                .parse()
                .map_err(|_| FrameError::line(format!("bad length in {text:?}")))?;
            if len as u64 >= body.limit() {
                return Err(FrameError::LengthExceeded { declared });
            }
            let mut content = vec![0u8; len];
            body.read_exact(&mut content).await?;
            let mut nl = [0u8; 1];
            body.read_exact(&mut nl).await?;
            if nl[0] != b'\n' {
                return Err(FrameError::line("block not followed by newline"));
            }

            match kind {
                "kv" => frame.headers.push((id.to_string(), content)),
                "ro" => {
                    let ronum: u8 = id
                        .parse()
                        .map_err(|_| FrameError::line(format!("bad RO number {id:?}")))?;
                    frame.routing_objects.push((ronum, content));
                }
                "po" => {
                    let ponum = parse_po_token(id)?;
                    frame.payload_objects.push(PayloadObject::new(ponum, content));
                }
                other => return Err(FrameError::line(format!("unknown line kind {other:?}"))),
            }
        }
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<usize, FrameError> {
        let bytes = frame.encode();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(bytes.len())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
