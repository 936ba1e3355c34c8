//! Framing for lifecycle requests and responses.
//!
//! All integers are big-endian.
//!
//! ```text
//! request  = op:u8 argc:u32 payload_len:u32 { len:u32 utf8[len] } * argc
//! response = status:i32 message_len:u32 utf8[message_len]
//! ```
//!
//! `payload_len` must equal the sum of `4 + len` over all arguments.

use std::io::{ErrorKind, Read, Write};

use rc_common::constants::{MAX_REQUEST_PAYLOAD, MAX_RESPONSE_MESSAGE};
use rc_common::error::ChannelError;
use rc_common::types::{CommandLine, LifecycleOperation, Status};

/// Size of the fixed request header.
pub const REQUEST_HEADER_LEN: usize = 9;

/// Size of the fixed response header.
pub const RESPONSE_HEADER_LEN: usize = 8;

type Result<T> = std::result::Result<T, ChannelError>;

/// A lifecycle command sent from a controller to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Operation to perform.
    pub operation: LifecycleOperation,
    /// Operation arguments (the command line for CREATE and EXEC).
    pub arguments: Vec<String>,
}

impl Request {
    /// Request without arguments.
    #[must_use]
    pub const fn bare(operation: LifecycleOperation) -> Self {
        Self {
            operation,
            arguments: Vec::new(),
        }
    }

    /// Request carrying a command line.
    #[must_use]
    pub fn with_command(operation: LifecycleOperation, command: &CommandLine) -> Self {
        Self {
            operation,
            arguments: command.args().to_vec(),
        }
    }

    /// Arguments interpreted as a command line.
    #[must_use]
    pub fn command(&self) -> CommandLine {
        CommandLine::new(self.arguments.clone())
    }

    /// Serializes the request into one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Oversized`] if the payload exceeds the limit.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_len: usize = self.arguments.iter().map(|a| 4 + a.len()).sum();
        let payload_len = checked_len(payload_len, MAX_REQUEST_PAYLOAD)?;
        let argc = checked_len(self.arguments.len(), MAX_REQUEST_PAYLOAD)?;

        let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload_len as usize);
        frame.push(self.operation.code());
        frame.extend_from_slice(&argc.to_be_bytes());
        frame.extend_from_slice(&payload_len.to_be_bytes());
        for arg in &self.arguments {
            frame.extend_from_slice(&checked_len(arg.len(), MAX_REQUEST_PAYLOAD)?.to_be_bytes());
            frame.extend_from_slice(arg.as_bytes());
        }
        Ok(frame)
    }
}

/// The supervisor's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Outcome of the request.
    pub status: Status,
    /// Human-readable detail.
    pub message: String,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }

    /// Response reporting `error`.
    #[must_use]
    pub fn from_error(error: &rc_common::error::RcError) -> Self {
        Self {
            status: error.status(),
            message: error.to_string(),
        }
    }

    /// Serializes the response into one frame, truncating an overlong message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut end = self.message.len().min(MAX_RESPONSE_MESSAGE as usize);
        while !self.message.is_char_boundary(end) {
            end -= 1;
        }
        let message = &self.message.as_bytes()[..end];

        let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + message.len());
        frame.extend_from_slice(&self.status.code().to_be_bytes());
        #[allow(clippy::cast_possible_truncation)]
        frame.extend_from_slice(&(message.len() as u32).to_be_bytes());
        frame.extend_from_slice(message);
        frame
    }
}

fn checked_len(len: usize, limit: u32) -> Result<u32> {
    match u32::try_from(len) {
        Ok(len) if len <= limit => Ok(len),
        _ => Err(ChannelError::Oversized {
            length: u32::try_from(len).unwrap_or(u32::MAX),
            limit,
        }),
    }
}

/// Reads until `buf` is full or the peer closes, returning the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ChannelError::Timeout);
            }
            Err(e) => return Err(ChannelError::Io(e)),
        }
    }
    Ok(filled)
}

/// Reads a header; `Ok(None)` means the peer closed before sending anything.
fn read_header<R: Read, const N: usize>(reader: &mut R) -> Result<Option<[u8; N]>> {
    let mut header = [0_u8; N];
    match fill(reader, &mut header)? {
        0 => Ok(None),
        n if n < N => Err(ChannelError::Truncated {
            expected: N,
            received: n,
        }),
        _ => Ok(Some(header)),
    }
}

fn read_body<R: Read>(reader: &mut R, len: u32) -> Result<Vec<u8>> {
    let mut body = vec![0_u8; len as usize];
    let received = fill(reader, &mut body)?;
    if received < body.len() {
        return Err(ChannelError::Truncated {
            expected: body.len(),
            received,
        });
    }
    Ok(body)
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut word = [0_u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(word)
}

fn malformed(reason: impl Into<String>) -> ChannelError {
    ChannelError::Malformed {
        reason: reason.into(),
    }
}

/// Reads one request frame.
///
/// # Errors
///
/// - [`ChannelError::Closed`] if the peer closed before the header.
/// - [`ChannelError::Truncated`] if the peer closed mid-frame.
/// - [`ChannelError::UnknownOperation`], [`ChannelError::Oversized`] or
///   [`ChannelError::Malformed`] for invalid frames.
/// - [`ChannelError::Timeout`] if a read timeout elapsed.
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let header: [u8; REQUEST_HEADER_LEN] = read_header(reader)?.ok_or(ChannelError::Closed)?;
    let argc = be_u32(&header[1..5]);
    let payload_len = be_u32(&header[5..9]);
    if payload_len > MAX_REQUEST_PAYLOAD {
        return Err(ChannelError::Oversized {
            length: payload_len,
            limit: MAX_REQUEST_PAYLOAD,
        });
    }
    if u64::from(argc) * 4 > u64::from(payload_len) {
        return Err(malformed(format!(
            "{argc} arguments cannot fit in {payload_len} payload bytes"
        )));
    }
    let payload = read_body(reader, payload_len)?;
    // Validate the operation only after the frame has been consumed, so a
    // bad code does not leave unread payload behind.
    let operation = LifecycleOperation::from_code(header[0])?;

    let mut arguments = Vec::with_capacity(argc as usize);
    let mut rest = payload.as_slice();
    for index in 0..argc {
        if rest.len() < 4 {
            return Err(malformed(format!("argument {index} length is missing")));
        }
        let len = be_u32(rest) as usize;
        rest = &rest[4..];
        if rest.len() < len {
            return Err(malformed(format!("argument {index} overruns the payload")));
        }
        let (arg, tail) = rest.split_at(len);
        let arg = std::str::from_utf8(arg)
            .map_err(|_| malformed(format!("argument {index} is not valid UTF-8")))?;
        arguments.push(arg.to_owned());
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(malformed(format!("{} trailing payload bytes", rest.len())));
    }
    Ok(Request {
        operation,
        arguments,
    })
}

/// Reads one response frame; `Ok(None)` means the peer hung up without answering.
///
/// # Errors
///
/// Returns [`ChannelError`] for truncated, oversized, or invalid frames and
/// for timeouts.
pub fn read_response<R: Read>(reader: &mut R) -> Result<Option<Response>> {
    let Some(header) = read_header::<_, RESPONSE_HEADER_LEN>(reader)? else {
        return Ok(None);
    };
    let mut code = [0_u8; 4];
    code.copy_from_slice(&header[..4]);
    let status = Status::from_code(i32::from_be_bytes(code))?;
    let message_len = be_u32(&header[4..8]);
    if message_len > MAX_RESPONSE_MESSAGE {
        return Err(ChannelError::Oversized {
            length: message_len,
            limit: MAX_RESPONSE_MESSAGE,
        });
    }
    let body = read_body(reader, message_len)?;
    let message =
        String::from_utf8(body).map_err(|_| malformed("response message is not valid UTF-8"))?;
    Ok(Some(Response { status, message }))
}

/// Writes one request frame.
///
/// # Errors
///
/// Returns [`ChannelError`] if the request is too large or the write fails.
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&request.encode()?)?;
    writer.flush()?;
    Ok(())
}

/// Writes one response frame.
///
/// # Errors
///
/// Returns [`ChannelError::Io`] if the write fails.
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&response.encode())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn exec_request() -> Request {
        Request {
            operation: LifecycleOperation::Exec,
            arguments: vec!["ps".into(), "aux".into()],
        }
    }

    #[test]
    fn request_frame_layout_matches_protocol() {
        let frame = exec_request().encode().expect("encode");
        assert_eq!(frame[0], 2);
        assert_eq!(&frame[1..5], &2_u32.to_be_bytes());
        assert_eq!(&frame[5..9], &13_u32.to_be_bytes());
        assert_eq!(&frame[9..13], &2_u32.to_be_bytes());
        assert_eq!(&frame[13..15], b"ps");
        assert_eq!(frame.len(), REQUEST_HEADER_LEN + 13);
    }

    #[test]
    fn request_survives_the_wire() {
        let mut wire = Vec::new();
        write_request(&mut wire, &exec_request()).expect("write");
        let decoded = read_request(&mut Cursor::new(wire)).expect("read");
        assert_eq!(decoded, exec_request());
    }

    #[test]
    fn empty_stream_is_closed_not_truncated() {
        let err = read_request(&mut Cursor::new(Vec::new())).expect_err("no data");
        assert!(matches!(err, ChannelError::Closed));
    }

    #[test]
    fn partial_header_is_truncated() {
        let err = read_request(&mut Cursor::new(vec![1, 0, 0])).expect_err("short header");
        assert!(matches!(
            err,
            ChannelError::Truncated {
                expected: REQUEST_HEADER_LEN,
                received: 3
            }
        ));
    }

    #[test]
    fn partial_payload_is_truncated() {
        let mut frame = exec_request().encode().expect("encode");
        frame.truncate(frame.len() - 1);
        let err = read_request(&mut Cursor::new(frame)).expect_err("short payload");
        assert!(matches!(err, ChannelError::Truncated { expected: 13, received: 12 }));
    }

    #[test]
    fn oversized_payload_is_rejected_before_reading() {
        let mut frame = vec![0_u8];
        frame.extend_from_slice(&1_u32.to_be_bytes());
        frame.extend_from_slice(&(MAX_REQUEST_PAYLOAD + 1).to_be_bytes());
        let err = read_request(&mut Cursor::new(frame)).expect_err("too big");
        assert!(matches!(err, ChannelError::Oversized { .. }));
    }

    #[test]
    fn unknown_operation_is_reported() {
        let mut frame = Request::bare(LifecycleOperation::Start).encode().expect("encode");
        frame[0] = 9;
        let err = read_request(&mut Cursor::new(frame)).expect_err("bad op");
        assert!(matches!(err, ChannelError::UnknownOperation(9)));
    }

    #[test]
    fn inconsistent_payload_length_is_malformed() {
        let mut frame = exec_request().encode().expect("encode");
        // Claim one argument while two are present.
        frame[1..5].copy_from_slice(&1_u32.to_be_bytes());
        let err = read_request(&mut Cursor::new(frame)).expect_err("trailing bytes");
        assert!(matches!(err, ChannelError::Malformed { .. }));
    }

    #[test]
    fn response_carries_status_and_message() {
        let mut wire = Vec::new();
        let response = Response::from_error(&rc_common::error::RcError::DuplicateInit);
        write_response(&mut wire, &response).expect("write");
        assert_eq!(&wire[..4], &1_i32.to_be_bytes());
        let decoded = read_response(&mut Cursor::new(wire)).expect("read");
        assert_eq!(decoded, Some(response));
    }

    #[test]
    fn hangup_without_response_is_none() {
        let decoded = read_response(&mut Cursor::new(Vec::new())).expect("read");
        assert_eq!(decoded, None);
    }

    #[test]
    fn overlong_message_is_cut_on_a_char_boundary() {
        let response = Response::ok("é".repeat(MAX_RESPONSE_MESSAGE as usize));
        let frame = response.encode();
        let decoded = read_response(&mut Cursor::new(frame))
            .expect("read")
            .expect("response");
        assert!(decoded.message.len() <= MAX_RESPONSE_MESSAGE as usize);
        assert!(decoded.message.chars().all(|c| c == 'é'));
    }
}
