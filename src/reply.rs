//! RESP reply values and their wire encoding (spec §6's frame table).

use bytes::{BufMut, Bytes, BytesMut};

/// A single RESP frame the engine can return to a connection. Nested
/// arrays hold more `Reply` values, mirroring the wire's recursive shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Status(&'static str),
    SimpleString(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Nil,
    Array(Vec<Reply>),
    NilArray,
}

impl Reply {
    pub fn bulk(bytes: impl Into<Bytes>) -> Self {
        Reply::Bulk(bytes.into())
    }

    pub fn ok() -> Self {
        Reply::Status("OK")
    }

    /// Encodes this reply as RESP2 bytes onto `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Reply::Status(text) => {
                out.put_u8(b'+');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::SimpleString(text) => {
                out.put_u8(b'+');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error(text) => {
                out.put_u8(b'-');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(value) => {
                out.put_u8(b':');
                out.extend_from_slice(value.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(bytes) => {
                out.put_u8(b'$');
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
            Reply::NilArray => out.extend_from_slice(b"*-1\r\n"),
            Reply::Array(items) => {
                out.put_u8(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

impl From<i64> for Reply {
    fn from(value: i64) -> Self {
        Reply::Integer(value)
    }
}

impl From<usize> for Reply {
    fn from(value: usize) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        Reply::Integer(value as i64)
    }
}

impl From<bool> for Reply {
    fn from(value: bool) -> Self {
        Reply::Integer(i64::from(value))
    }
}

impl From<&'static str> for Reply {
    fn from(value: &'static str) -> Self {
        Reply::Status(value)
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Bulk(Bytes::from(value.into_bytes()))
    }
}

impl From<Vec<u8>> for Reply {
    fn from(value: Vec<u8>) -> Self {
        Reply::Bulk(Bytes::from(value))
    }
}

impl From<Bytes> for Reply {
    fn from(value: Bytes) -> Self {
        Reply::Bulk(value)
    }
}

impl From<Option<Bytes>> for Reply {
    fn from(value: Option<Bytes>) -> Self {
        match value {
            Some(bytes) => Reply::Bulk(bytes),
            None => Reply::Nil,
        }
    }
}

impl<T> From<Vec<T>> for Reply
where
    Reply: From<T>,
{
    fn from(values: Vec<T>) -> Self {
        Reply::Array(values.into_iter().map(Reply::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(reply: &Reply) -> Vec<u8> {
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn status() {
        assert_eq!(encoded(&Reply::ok()), b"+OK\r\n");
    }

    #[test]
    fn error() {
        assert_eq!(
            encoded(&Reply::Error("ERR boom".into())),
            b"-ERR boom\r\n"
        );
    }

    #[test]
    fn integer() {
        assert_eq!(encoded(&Reply::Integer(-5)), b":-5\r\n");
    }

    #[test]
    fn bulk() {
        assert_eq!(
            encoded(&Reply::bulk(Bytes::from_static(b"hi"))),
            b"$2\r\nhi\r\n"
        );
    }

    #[test]
    fn nil() {
        assert_eq!(encoded(&Reply::Nil), b"$-1\r\n");
    }

    #[test]
    fn nil_array() {
        assert_eq!(encoded(&Reply::NilArray), b"*-1\r\n");
    }

    #[test]
    fn empty_array() {
        assert_eq!(encoded(&Reply::Array(vec![])), b"*0\r\n");
    }

    #[test]
    fn nested_array() {
        let reply = Reply::Array(vec![Reply::Integer(1), Reply::bulk(Bytes::from_static(b"x"))]);
        assert_eq!(
            encoded(&reply),
            b"*2\r\n:1\r\n$1\r\nx\r\n".to_vec().as_slice()
        );
    }
}
