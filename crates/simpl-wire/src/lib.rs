//! Framing for SIMPL surrogate links.
//!
//! Every message on a TCP or serial link is a fixed 48-byte textual header
//! (`token`, `nbytes`, `ybytes`, `remote id`, each a 12-byte ASCII decimal)
//! followed by `nbytes` of payload. The same layout is used on both media.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod token;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FIELD_WIDTH, HEADER_SIZE};
pub use error::{Result, WireError};
pub use message::{
    decode_proxy_body, decode_token_body, encode_proxy_body, encode_token_body, NameLocateReply,
    NameLocateRequest, NAME_SLOT,
};
pub use reader::FrameReader;
pub use token::Token;
pub use writer::FrameWriter;
