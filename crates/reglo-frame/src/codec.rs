use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::Address;
use crate::command::{CommandFrame, Mnemonic, Scope, MNEMONIC_TABLE};
use crate::error::{FrameError, Result};

/// Terminator of every host-to-pump command.
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Terminator of pump-to-host data lines.
pub const LINE_TERMINATOR: &[u8; 2] = b"\r\n";

/// Longest unterminated line accepted before the buffer is declared garbage.
pub const DEFAULT_MAX_LINE: usize = 128;

/// Outcome carried by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `*`: command executed.
    Success,
    /// `#`: command not executed.
    Failure,
    /// `+`: positive answer (e.g. channel running).
    Yes,
    /// `-`: negative answer (e.g. channel stopped).
    No,
    /// A data line.
    Data,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'*' => Some(Self::Success),
            b'#' => Some(Self::Failure),
            b'+' => Some(Self::Yes),
            b'-' => Some(Self::No),
            _ => None,
        }
    }

    /// Wire byte for single-byte statuses.
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Self::Success => Some(b'*'),
            Self::Failure => Some(b'#'),
            Self::Yes => Some(b'+'),
            Self::No => Some(b'-'),
            Self::Data => None,
        }
    }
}

/// What a command expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// One status byte.
    Status,
    /// A CR LF terminated line, or a bare `#` when the pump refuses.
    Line,
}

/// A structurally valid response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    /// Line payload with surrounding whitespace removed. Empty for status bytes.
    pub text: String,
    /// Bytes consumed from the wire.
    pub raw_len: usize,
}

impl Response {
    /// Split the line into exactly `count` whitespace-separated fields,
    /// splitting from the right so the first field may contain spaces.
    ///
    /// Returns `None` when the line has fewer fields than requested.
    pub fn fields(&self, count: usize) -> Option<Vec<&str>> {
        if count == 0 {
            return None;
        }
        let mut fields = Vec::with_capacity(count);
        let mut rest = self.text.trim();
        for _ in 1..count {
            let split = rest.rfind(|c: char| c.is_ascii_whitespace())?;
            fields.push(&rest[split + 1..]);
            rest = rest[..split].trim_end();
        }
        if rest.is_empty() {
            return None;
        }
        fields.push(rest);
        fields.reverse();
        Some(fields)
    }
}

/// A command recovered from wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub address: Address,
    pub mnemonic: Mnemonic,
    /// Parameters exactly as they appeared on the wire.
    pub params: String,
}

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// pump command:    ┌──────────┬──────────┬────────┬────┐
///                  │ pump (1) │ mnemonic │ params │ CR │
///                  └──────────┴──────────┴────────┴────┘
/// channel command: ┌─────────────┬──────────┬──────────┬────────┬────┐
///                  │ channel (1) │ mnemonic │ pump (1) │ params │ CR │
///                  └─────────────┴──────────┴──────────┴────────┴────┘
/// ```
///
/// Nothing is written to `dst` when the command is invalid.
pub fn encode_command(frame: &CommandFrame, dst: &mut BytesMut) -> Result<()> {
    let address = frame.address();
    let mnemonic = frame.mnemonic();
    address.validate()?;

    match (mnemonic.scope(), address) {
        (Scope::Pump, Address::Pump(_)) | (Scope::Channel, Address::Channel { .. }) => {}
        _ => {
            return Err(FrameError::ScopeMismatch {
                mnemonic: mnemonic.as_str(),
                address: address.to_string(),
            })
        }
    }

    let params = frame.rendered_params()?;
    let params_expected = match mnemonic {
        Mnemonic::SetTubingDiameter => Some(true),
        Mnemonic::TubingDiameter => Some(false),
        _ => None,
    };
    if let Some(expected) = params_expected {
        if params.is_empty() == expected {
            return Err(FrameError::InvalidParameter {
                mnemonic: mnemonic.as_str(),
                reason: "tubing diameter set/query mismatch".to_string(),
            });
        }
    }

    dst.reserve(mnemonic.as_str().len() + params.len() + 3);
    dst.put_u8(b'0' + address.leading());
    dst.put_slice(mnemonic.as_str().as_bytes());
    if let Address::Channel { pump, .. } = address {
        dst.put_u8(b'0' + pump);
    }
    dst.put_slice(params.as_bytes());
    dst.put_u8(COMMAND_TERMINATOR);
    Ok(())
}

/// Decode a command, as the pump would see it.
///
/// Returns `Ok(None)` if the terminator has not arrived yet.
/// On success, consumes the command bytes from the buffer.
pub fn decode_command(src: &mut BytesMut) -> Result<Option<ParsedCommand>> {
    let Some(end) = src.iter().position(|&b| b == COMMAND_TERMINATOR) else {
        if src.len() > DEFAULT_MAX_LINE {
            return Err(invalid_command(&src[..], "command too long"));
        }
        return Ok(None);
    };

    let body = &src[..end];
    if body.iter().any(|&b| !is_printable(b)) {
        return Err(invalid_command(&src[..=end], "non-printable byte in command"));
    }
    let text: String = body.iter().map(|&b| b as char).collect();

    let lead = body
        .first()
        .copied()
        .and_then(address_digit)
        .ok_or_else(|| invalid_command(&src[..=end], "missing address"))?;
    let rest = &text[1..];

    let (wire, mnemonic) = MNEMONIC_TABLE
        .iter()
        .find(|(wire, _)| rest.starts_with(wire))
        .copied()
        .ok_or_else(|| invalid_command(&src[..=end], "unknown mnemonic"))?;
    let rest = &rest[wire.len()..];

    let (address, params) = match mnemonic.scope() {
        Scope::Pump => (Address::Pump(lead), rest),
        Scope::Channel => {
            let pump = rest
                .bytes()
                .next()
                .and_then(address_digit)
                .ok_or_else(|| invalid_command(&src[..=end], "missing pump address"))?;
            (
                Address::Channel {
                    pump,
                    channel: lead,
                },
                &rest[1..],
            )
        }
    };

    let mnemonic = match mnemonic {
        Mnemonic::TubingDiameter if !params.is_empty() => Mnemonic::SetTubingDiameter,
        other => other,
    };
    let parsed = ParsedCommand {
        address,
        mnemonic,
        params: params.to_string(),
    };

    src.advance(end + 1);
    Ok(Some(parsed))
}

/// Encode a single-byte status reply.
pub fn encode_status(status: Status, dst: &mut BytesMut) -> Result<()> {
    let byte = status.as_byte().ok_or_else(|| FrameError::InvalidParameter {
        mnemonic: "status",
        reason: "data status has no single-byte form".to_string(),
    })?;
    dst.put_u8(byte);
    Ok(())
}

/// Encode a data line reply.
pub fn encode_line(text: &str, dst: &mut BytesMut) -> Result<()> {
    if text.bytes().any(|b| !is_printable(b)) {
        return Err(FrameError::InvalidParameter {
            mnemonic: "line",
            reason: "non-printable character in line".to_string(),
        });
    }
    dst.reserve(text.len() + LINE_TERMINATOR.len());
    dst.put_slice(text.as_bytes());
    dst.put_slice(LINE_TERMINATOR);
    Ok(())
}

/// Decode a response of the expected shape from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete response yet.
/// On success, consumes the response bytes from the buffer. On failure the
/// buffer is left untouched and the error carries its contents.
pub fn decode_response(
    src: &mut BytesMut,
    shape: ResponseShape,
    max_line: usize,
) -> Result<Option<Response>> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };

    match shape {
        ResponseShape::Status => {
            let status = Status::from_byte(first)
                .ok_or_else(|| invalid_response(&src[..], "unexpected status byte"))?;
            src.advance(1);
            Ok(Some(Response {
                status,
                text: String::new(),
                raw_len: 1,
            }))
        }
        ResponseShape::Line if first == b'#' => {
            src.advance(1);
            Ok(Some(Response {
                status: Status::Failure,
                text: String::new(),
                raw_len: 1,
            }))
        }
        ResponseShape::Line => decode_line(src, max_line),
    }
}

fn decode_line(src: &mut BytesMut, max_line: usize) -> Result<Option<Response>> {
    let mut end = None;
    for (i, &byte) in src.iter().enumerate() {
        match byte {
            b'\r' => match src.get(i + 1) {
                Some(b'\n') => {
                    end = Some(i);
                    break;
                }
                Some(_) => return Err(invalid_response(&src[..], "carriage return without line feed")),
                None => break,
            },
            b'\n' => return Err(invalid_response(&src[..], "line feed without carriage return")),
            b if is_printable(b) || b == b'\t' => {}
            _ => return Err(invalid_response(&src[..], "non-printable byte in response")),
        }
    }

    let Some(end) = end else {
        if src.len() > max_line {
            return Err(invalid_response(&src[..], "response line too long"));
        }
        return Ok(None);
    };
    if end > max_line {
        return Err(invalid_response(&src[..], "response line too long"));
    }

    let raw_len = end + LINE_TERMINATOR.len();
    let line = src.split_to(raw_len);
    let text: String = line[..end].iter().map(|&b| b as char).collect();

    Ok(Some(Response {
        status: Status::Data,
        text: text.trim().to_string(),
        raw_len,
    }))
}

fn is_printable(byte: u8) -> bool {
    (0x20..0x7F).contains(&byte)
}

fn address_digit(byte: u8) -> Option<u8> {
    match byte {
        b'1'..=b'9' => Some(byte - b'0'),
        _ => None,
    }
}

fn invalid_response(raw: &[u8], reason: &'static str) -> FrameError {
    FrameError::InvalidResponse {
        raw: Bytes::copy_from_slice(raw),
        reason,
    }
}

fn invalid_command(raw: &[u8], reason: &'static str) -> FrameError {
    FrameError::InvalidCommand {
        raw: Bytes::copy_from_slice(raw),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Param;

    fn encoded(frame: &CommandFrame) -> Vec<u8> {
        frame.encode().unwrap().to_vec()
    }

    #[test]
    fn pump_command_layout() {
        let frame = CommandFrame::new(Address::pump(1), Mnemonic::SerialNumber);
        assert_eq!(encoded(&frame), b"1xS\r");

        let frame = CommandFrame::new(Address::pump(1), Mnemonic::EnableChannelAddressing)
            .with_param(Param::Number(1));
        assert_eq!(encoded(&frame), b"1~1\r");
    }

    #[test]
    fn channel_command_repeats_pump_address() {
        let frame = CommandFrame::new(Address::channel(1, 3), Mnemonic::Clockwise);
        assert_eq!(encoded(&frame), b"3J1\r");

        let frame = CommandFrame::new(Address::channel(1, 2), Mnemonic::SetTubingDiameter)
            .with_param(Param::Digits {
                value: 152,
                width: 4,
            });
        assert_eq!(encoded(&frame), b"2++10152\r");

        let frame = CommandFrame::new(Address::channel(1, 4), Mnemonic::SetVolume)
            .with_param(Param::Type2(2.5e-3));
        assert_eq!(encoded(&frame), b"4vv12500-3\r");
    }

    #[test]
    fn encode_is_deterministic() {
        let frame = CommandFrame::new(Address::channel(1, 1), Mnemonic::SetFlowRate)
            .with_param(Param::Type2(1.5));
        assert_eq!(frame.encode().unwrap(), frame.encode().unwrap());
    }

    #[test]
    fn encode_rejects_scope_mismatch_without_writing() {
        let mut buf = BytesMut::new();
        let frame = CommandFrame::new(Address::pump(1), Mnemonic::Start);
        assert!(matches!(
            encode_command(&frame, &mut buf),
            Err(FrameError::ScopeMismatch { mnemonic: "H", .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_rejects_tubing_set_without_value() {
        let frame = CommandFrame::new(Address::channel(1, 1), Mnemonic::SetTubingDiameter);
        assert!(frame.encode().is_err());
    }

    #[test]
    fn command_roundtrip_recovers_logical_fields() {
        let frames = vec![
            CommandFrame::new(Address::pump(1), Mnemonic::ChannelCount),
            CommandFrame::new(Address::pump(2), Mnemonic::PumpInfo),
            CommandFrame::new(Address::pump(1), Mnemonic::DisplayText)
                .with_param(Param::Text("Hello pump".to_string())),
            CommandFrame::new(Address::channel(1, 2), Mnemonic::TubingDiameter),
            CommandFrame::new(Address::channel(1, 2), Mnemonic::SetTubingDiameter).with_param(
                Param::Digits {
                    value: 25,
                    width: 4,
                },
            ),
            CommandFrame::new(Address::channel(1, 1), Mnemonic::SpeedFromFlowRate)
                .with_param(Param::Number(1)),
            CommandFrame::new(Address::channel(3, 4), Mnemonic::Odometer),
            CommandFrame::new(Address::channel(1, 3), Mnemonic::SetFlowRate)
                .with_param(Param::Type2(12.5)),
            CommandFrame::new(Address::channel(1, 1), Mnemonic::RunState),
        ];

        for frame in frames {
            let mut wire = BytesMut::from(&encoded(&frame)[..]);
            let parsed = decode_command(&mut wire).unwrap().unwrap();
            assert_eq!(parsed.address, frame.address(), "{frame}");
            assert_eq!(parsed.mnemonic, frame.mnemonic(), "{frame}");
            assert_eq!(parsed.params, frame.rendered_params().unwrap(), "{frame}");
            assert!(wire.is_empty());
        }
    }

    #[test]
    fn decode_command_incomplete_and_invalid() {
        let mut partial = BytesMut::from(&b"1xS"[..]);
        assert!(decode_command(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 3);

        let mut unknown = BytesMut::from(&b"1Q1\r"[..]);
        assert!(matches!(
            decode_command(&mut unknown),
            Err(FrameError::InvalidCommand {
                reason: "unknown mnemonic",
                ..
            })
        ));

        let mut no_address = BytesMut::from(&b"xS\r"[..]);
        assert!(decode_command(&mut no_address).is_err());
    }

    #[test]
    fn decode_status_bytes() {
        for (byte, status) in [
            (b'*', Status::Success),
            (b'#', Status::Failure),
            (b'+', Status::Yes),
            (b'-', Status::No),
        ] {
            let mut buf = BytesMut::from(&[byte][..]);
            let response = decode_response(&mut buf, ResponseShape::Status, DEFAULT_MAX_LINE)
                .unwrap()
                .unwrap();
            assert_eq!(response.status, status);
            assert_eq!(response.raw_len, 1);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn decode_unknown_status_byte_is_invalid() {
        let mut buf = BytesMut::from(&b"?"[..]);
        let err = decode_response(&mut buf, ResponseShape::Status, DEFAULT_MAX_LINE).unwrap_err();
        assert_eq!(err.raw().map(|raw| raw.as_ref()), Some(&b"?"[..]));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn decode_line_waits_for_terminator() {
        let mut buf = BytesMut::from(&b"REGLO ICC 0208"[..]);
        assert!(decode_response(&mut buf, ResponseShape::Line, DEFAULT_MAX_LINE)
            .unwrap()
            .is_none());

        buf.extend_from_slice(b" 306\r");
        assert!(decode_response(&mut buf, ResponseShape::Line, DEFAULT_MAX_LINE)
            .unwrap()
            .is_none());

        buf.extend_from_slice(b"\n");
        let response = decode_response(&mut buf, ResponseShape::Line, DEFAULT_MAX_LINE)
            .unwrap()
            .unwrap();
        assert_eq!(response.status, Status::Data);
        assert_eq!(response.text, "REGLO ICC 0208 306");
        assert_eq!(response.raw_len, 20);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_line_refusal_is_failure_status() {
        let mut buf = BytesMut::from(&b"#"[..]);
        let response = decode_response(&mut buf, ResponseShape::Line, DEFAULT_MAX_LINE)
            .unwrap()
            .unwrap();
        assert_eq!(response.status, Status::Failure);
    }

    #[test]
    fn decode_line_too_long() {
        let mut buf = BytesMut::from(&[b'7'; DEFAULT_MAX_LINE + 1][..]);
        assert!(matches!(
            decode_response(&mut buf, ResponseShape::Line, DEFAULT_MAX_LINE),
            Err(FrameError::InvalidResponse {
                reason: "response line too long",
                ..
            })
        ));
    }

    #[test]
    fn flipping_high_bit_of_any_byte_is_detected() {
        let mut valid = BytesMut::new();
        encode_line("1.52 mm", &mut valid).unwrap();

        for index in 0..valid.len() {
            let mut corrupted = valid.clone();
            corrupted[index] ^= 0x80;
            let result = decode_response(&mut corrupted, ResponseShape::Line, DEFAULT_MAX_LINE);
            assert!(
                matches!(result, Err(FrameError::InvalidResponse { .. })),
                "corruption at byte {index} not detected: {result:?}"
            );
        }

        for status in [Status::Success, Status::Failure, Status::Yes, Status::No] {
            let mut buf = BytesMut::new();
            encode_status(status, &mut buf).unwrap();
            buf[0] ^= 0x80;
            assert!(decode_response(&mut buf, ResponseShape::Status, DEFAULT_MAX_LINE).is_err());
        }
    }

    #[test]
    fn damaged_terminator_is_detected() {
        let mut swapped = BytesMut::from(&b"42\n\r"[..]);
        assert!(decode_response(&mut swapped, ResponseShape::Line, DEFAULT_MAX_LINE).is_err());

        let mut replaced = BytesMut::from(&b"42\rx"[..]);
        assert!(decode_response(&mut replaced, ResponseShape::Line, DEFAULT_MAX_LINE).is_err());
    }

    #[test]
    fn fields_split_from_the_right() {
        let response = Response {
            status: Status::Data,
            text: "REGLO ICC 0208 306".to_string(),
            raw_len: 20,
        };
        assert_eq!(
            response.fields(3).unwrap(),
            vec!["REGLO ICC", "0208", "306"]
        );
        assert_eq!(response.fields(1).unwrap(), vec!["REGLO ICC 0208 306"]);

        let short = Response {
            status: Status::Data,
            text: "1.52".to_string(),
            raw_len: 6,
        };
        assert!(short.fields(2).is_none());
        assert!(short.fields(0).is_none());
    }

    #[test]
    fn encode_line_rejects_control_characters() {
        let mut buf = BytesMut::new();
        assert!(encode_line("a\rb", &mut buf).is_err());
        assert!(encode_status(Status::Data, &mut buf).is_err());
        assert!(buf.is_empty());
    }
}
