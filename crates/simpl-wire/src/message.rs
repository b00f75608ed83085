//! Fixed-layout message bodies exchanged during a surrogate session.

use bytes::{Bytes, BytesMut};

use crate::codec::{parse_field, parse_text, put_field, put_text, FIELD_WIDTH};
use crate::error::{Result, WireError};

/// Host and name slots hold up to 100 bytes plus a terminating NUL.
pub const NAME_SLOT: usize = 101;

/// Result value of a failed name locate.
pub const LOCATE_FAILED: i64 = -1;

/// Body of a `NAME_LOCATE` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameLocateRequest {
    /// Host the requester addressed (informational on the far side).
    pub host: String,
    /// Name to resolve on the far side.
    pub name: String,
    /// Largest message the requester will exchange over the session.
    pub max_size: usize,
}

impl NameLocateRequest {
    pub const SIZE: usize = 2 * NAME_SLOT + FIELD_WIDTH;

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        put_text(&mut buf, "host", &self.host, NAME_SLOT)?;
        put_text(&mut buf, "name", &self.name, NAME_SLOT)?;
        put_field(
            &mut buf,
            "max_size",
            i64::try_from(self.max_size).unwrap_or(i64::MAX),
        )?;
        Ok(buf.freeze())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        check_len("NAME_LOCATE", body, Self::SIZE)?;
        let host = parse_text("host", &body[..NAME_SLOT])?;
        let name = parse_text("name", &body[NAME_SLOT..2 * NAME_SLOT])?;
        let max_size = parse_field("max_size", &body[2 * NAME_SLOT..])?;
        let max_size = usize::try_from(max_size).map_err(|_| WireError::InvalidField {
            field: "max_size",
            raw: max_size.to_string(),
        })?;
        Ok(Self {
            host,
            name,
            max_size,
        })
    }
}

/// Body of the answer to a `NAME_LOCATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameLocateReply {
    /// Session id of the far-side session, or `None` when the name was not
    /// found or the session was refused.
    pub session: Option<u32>,
}

impl NameLocateReply {
    pub const SIZE: usize = 2 * FIELD_WIDTH;

    pub fn found(session: u32) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn not_found() -> Self {
        Self { session: None }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        let (result, id) = match self.session {
            Some(id) => (i64::from(id), i64::from(id)),
            None => (LOCATE_FAILED, 0),
        };
        put_field(&mut buf, "result", result)?;
        put_field(&mut buf, "id", id)?;
        Ok(buf.freeze())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        check_len("NAME_LOCATE reply", body, Self::SIZE)?;
        let result = parse_field("result", &body[..FIELD_WIDTH])?;
        if result < 0 {
            return Ok(Self::not_found());
        }
        let id = parse_field("id", &body[FIELD_WIDTH..])?;
        let id = u32::try_from(id).map_err(|_| WireError::InvalidField {
            field: "id",
            raw: id.to_string(),
        })?;
        Ok(Self::found(id))
    }
}

/// Encode a proxy value as a `PROXY` body.
pub fn encode_proxy_body(value: u32) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(FIELD_WIDTH);
    put_field(&mut buf, "proxy", i64::from(value))?;
    Ok(buf.freeze())
}

/// Decode a `PROXY` body.
pub fn decode_proxy_body(body: &[u8]) -> Result<u32> {
    check_len("PROXY", body, FIELD_WIDTH)?;
    let value = parse_field("proxy", body)?;
    u32::try_from(value).map_err(|_| WireError::InvalidField {
        field: "proxy",
        raw: value.to_string(),
    })
}

/// Encode a bare token as a single field, the body of a local request.
pub fn encode_token_body(code: i64) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(FIELD_WIDTH);
    put_field(&mut buf, "token", code)?;
    Ok(buf.freeze())
}

/// Decode a single-field token body.
pub fn decode_token_body(body: &[u8]) -> Result<i64> {
    if body.len() < FIELD_WIDTH {
        return Err(WireError::BodyLength {
            kind: "token",
            expected: FIELD_WIDTH,
            actual: body.len(),
        });
    }
    parse_field("token", &body[..FIELD_WIDTH])
}

fn check_len(kind: &'static str, body: &[u8], expected: usize) -> Result<()> {
    if body.len() != expected {
        return Err(WireError::BodyLength {
            kind,
            expected,
            actual: body.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_locate_request_layout() {
        let request = NameLocateRequest {
            host: "10.0.0.2".into(),
            name: "receiver".into(),
            max_size: 4096,
        };
        let body = request.encode().unwrap();
        assert_eq!(body.len(), NameLocateRequest::SIZE);
        assert_eq!(&body[..9], b"10.0.0.2\0");
        assert_eq!(&body[NAME_SLOT..NAME_SLOT + 9], b"receiver\0");
        assert_eq!(NameLocateRequest::decode(&body).unwrap(), request);
    }

    #[test]
    fn test_name_locate_request_rejects_long_name() {
        let request = NameLocateRequest {
            host: String::new(),
            name: "n".repeat(NAME_SLOT),
            max_size: 1,
        };
        assert!(matches!(
            request.encode(),
            Err(WireError::FieldOverflow { field: "name", .. })
        ));
    }

    #[test]
    fn test_name_locate_request_wrong_length() {
        let err = NameLocateRequest::decode(b"short").unwrap_err();
        assert!(matches!(err, WireError::BodyLength { actual: 5, .. }));
    }

    #[test]
    fn test_name_locate_reply_found_and_not_found() {
        let found = NameLocateReply::found(812).encode().unwrap();
        assert_eq!(NameLocateReply::decode(&found).unwrap().session, Some(812));

        let missing = NameLocateReply::not_found().encode().unwrap();
        assert_eq!(&missing[..3], b"-1\0");
        assert_eq!(NameLocateReply::decode(&missing).unwrap().session, None);
    }

    #[test]
    fn test_proxy_body() {
        let body = encode_proxy_body(0x7FFF_FFF1).unwrap();
        assert_eq!(body.len(), FIELD_WIDTH);
        assert_eq!(decode_proxy_body(&body).unwrap(), 0x7FFF_FFF1);
        assert!(decode_proxy_body(b"-3\0\0\0\0\0\0\0\0\0\0").is_err());
    }

    #[test]
    fn test_token_body() {
        let body = encode_token_body(8).unwrap();
        assert_eq!(decode_token_body(&body).unwrap(), 8);
        assert!(decode_token_body(b"8").is_err());
    }
}
