//! Wire protocol: request parsing and response framing.

pub(crate) mod codec;

pub use codec::{Request, Response, encode_reply, encode_status, parse_request, parse_response};
