//! Wire protocol between the shell and its preview worker: JSON messages
//! framed with a `Content-Length` header over the worker's stdin/stdout.

use std::io::{self, BufRead, Read, Write};

use serde::{Deserialize, Serialize};

use crate::config::{PreviewConfig, RewriteConfig};
use crate::lang::Value;

/// Shell -> worker. Pushes and evaluation requests share one ordered
/// channel, so a push issued before a request is always applied before
/// that request runs.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Configure {
        rewrite: RewriteConfig,
        preview: PreviewConfig,
    },
    NsPush {
        name: String,
        value: Value,
    },
    NsDelete {
        name: String,
    },
    /// `wants_reply=false` with `allow_assignment=true` is the
    /// commit-replay form: it keeps the mirror aligned with real
    /// assignments and produces no preview.
    Eval {
        seq: u64,
        text: String,
        allow_assignment: bool,
        wants_reply: bool,
    },
}

/// Worker -> shell. `rendered` is `None` when the evaluation produced no
/// preview (error, interrupt, or unevaluable input).
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Preview { seq: u64, rendered: Option<String> },
}

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, msg: &T) -> io::Result<()> {
    let json = serde_json::to_string(msg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write!(w, "Content-Length: {}\r\n\r\n{}", json.len(), json)?;
    w.flush()
}

/// Read one framed message. `Ok(None)` means the peer closed the stream.
pub fn read_frame<R: BufRead, T: for<'de> Deserialize<'de>>(
    r: &mut R,
) -> io::Result<Option<T>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if r.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("Content-Length:") {
            content_length = Some(rest.trim().parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "bad Content-Length header")
            })?);
        }
    }
    let len = content_length
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length"))?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(
            &mut buf,
            &WorkerRequest::Eval {
                seq: 7,
                text: "1+1".into(),
                allow_assignment: false,
                wants_reply: true,
            },
        )
        .expect("write");

        let mut reader = BufReader::new(buf.as_slice());
        let msg: WorkerRequest = read_frame(&mut reader).expect("read").expect("present");
        match msg {
            WorkerRequest::Eval {
                seq,
                text,
                allow_assignment,
                wants_reply,
            } => {
                assert_eq!(seq, 7);
                assert_eq!(text, "1+1");
                assert!(!allow_assignment);
                assert!(wants_reply);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn eof_is_none() {
        let mut reader = BufReader::new(&[][..]);
        let msg: Option<WorkerReply> = read_frame(&mut reader).expect("read");
        assert!(msg.is_none(), "empty stream should read as closed");
    }
}
