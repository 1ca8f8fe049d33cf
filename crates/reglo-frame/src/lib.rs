//! ASCII command/response framing for the Reglo ICC serial protocol.
//!
//! Every command is a single line:
//! - A one-digit address (pump or channel)
//! - A command mnemonic
//! - For channel commands, the pump address repeated
//! - Parameters, then a carriage return
//!
//! Responses are either a single status byte (`*`, `#`, `+`, `-`) or a
//! printable ASCII line terminated by CR LF. The protocol carries no
//! checksum, so structure is validated strictly: anything that is not a
//! known status byte or a clean terminated line is rejected.

pub mod address;
pub mod codec;
pub mod command;
pub mod error;
pub mod reader;

pub use address::{Address, MAX_ADDRESS};
pub use codec::{
    decode_command, decode_response, encode_command, encode_line, encode_status, ParsedCommand,
    Response, ResponseShape, Status, COMMAND_TERMINATOR, DEFAULT_MAX_LINE, LINE_TERMINATOR,
};
pub use command::{format_type2, CommandFrame, Mnemonic, Param, Scope};
pub use error::{FrameError, Result};
pub use reader::ResponseBuffer;
