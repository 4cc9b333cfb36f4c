//! The TCP server and RESP request decoder: the ambient shell around
//! [`crate::Engine`] (module doc, spec §1/§5). One `tokio::sync::Mutex<Engine>`
//! is shared across connections, matching spec §5's "mutex-guarded engine
//! façade" — at most one command body runs at a time, so command handlers
//! never need their own synchronization.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::reply::Reply;
use crate::Engine;

/// A bound listener wrapping the shared engine. Cloning is cheap; every
/// accepted connection gets its own task over the same `Arc<Mutex<Engine>>`.
#[derive(Clone)]
pub struct Server {
    engine: Arc<Mutex<Engine>>,
}

impl Default for Server {
    fn default() -> Self {
        Server { engine: Arc::new(Mutex::new(Engine::new())) }
    }
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `addr` and serves connections until the process is asked to
    /// stop. Each accepted socket is handled on its own task; a bind
    /// failure is returned to the caller rather than panicking.
    pub async fn run(&self, addr: SocketAddr) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::info!(%peer, "accepted connection");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(error) = server.handle(stream, peer).await {
                    tracing::debug!(%peer, %error, "connection closed with error");
                }
            });
        }
    }

    /// Runs one connection to completion: registers it with the engine,
    /// pumps RESP requests in, pumps replies (both direct responses and
    /// pub/sub pushes) out, and tears down engine-owned state on exit.
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        stream.set_nodelay(true).ok();
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = RequestReader::new(reader);

        let (sender, mut receiver) = mpsc::unbounded_channel::<Reply>();
        let id = self.engine.lock().await.connect(sender);

        let mut out = BytesMut::new();
        let result = loop {
            tokio::select! {
                biased;
                pushed = receiver.recv() => {
                    let Some(reply) = pushed else { break Ok(()) };
                    reply.encode(&mut out);
                    if let Err(error) = writer.write_all(&out).await {
                        break Err(error);
                    }
                    out.clear();
                }
                request = reader.next_request() => {
                    match request {
                        Ok(Some(argv)) => {
                            let reply = self.engine.lock().await.dispatch(id, argv);
                            if let Some(reply) = reply {
                                reply.encode(&mut out);
                                if let Err(error) = writer.write_all(&out).await {
                                    break Err(error);
                                }
                                out.clear();
                            }
                        }
                        Ok(None) => break Ok(()),
                        Err(error) => {
                            let reply = Reply::Error(format!("ERR Protocol error: {error}"));
                            reply.encode(&mut out);
                            let _ = writer.write_all(&out).await;
                            break Ok(());
                        }
                    }
                }
            }
        };

        self.engine.lock().await.disconnect(id);
        tracing::info!(%peer, "connection closed");
        result
    }
}

/// Reasons a byte stream fails to parse as a RESP request (spec §6's
/// wire grammar). These become a `-ERR Protocol error` reply, not a
/// panic: a malformed client is disconnected, never allowed to wedge
/// the server.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid multibulk length")]
    InvalidMultibulkLength,
    #[error("invalid bulk length")]
    InvalidBulkLength,
    #[error("expected '$', got '{0}'")]
    ExpectedBulkString(char),
    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Buffers bytes off an `AsyncRead` and decodes RESP requests from it:
/// either the multibulk array form (`*N\r\n$len\r\n...`) real clients
/// send, or a single inline command line (space-separated, no leading
/// `*`) the way `redis-cli`'s raw mode and quick manual tests do.
struct RequestReader<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    fn new(reader: R) -> Self {
        RequestReader { reader, buffer: BytesMut::with_capacity(4096) }
    }

    /// Returns the next fully-decoded command, `Ok(None)` on a clean EOF
    /// between requests, or `Err` on a malformed frame or I/O failure.
    async fn next_request(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        loop {
            if let Some(argv) = self.try_parse()? {
                return Ok(Some(argv));
            }
            let read = self.reader.read_buf(&mut self.buffer).await?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-request",
                )));
            }
        }
    }

    /// Attempts to decode one request from `self.buffer` without
    /// blocking; returns `Ok(None)` when more bytes are needed, leaving
    /// the buffer untouched.
    fn try_parse(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if self.buffer[0] == b'*' {
            self.try_parse_multibulk()
        } else {
            self.try_parse_inline()
        }
    }

    fn try_parse_multibulk(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        let Some(line_end) = find_crlf(&self.buffer) else { return Ok(None) };
        let count: i64 = parse_line_i64(&self.buffer[1..line_end])
            .ok_or(ProtocolError::InvalidMultibulkLength)?;
        if count <= 0 {
            let _ = self.buffer.split_to(line_end + 2);
            return Ok(Some(Vec::new()));
        }
        #[allow(clippy::cast_sign_loss)]
        let count = count as usize;

        let mut cursor = line_end + 2;
        let mut argv = Vec::with_capacity(count);
        for _ in 0..count {
            if cursor >= self.buffer.len() {
                return Ok(None);
            }
            if self.buffer[cursor] != b'$' {
                return Err(ProtocolError::ExpectedBulkString(self.buffer[cursor] as char));
            }
            let Some(rel) = find_crlf(&self.buffer[cursor..]) else { return Ok(None) };
            let bulk_line_end = cursor + rel;
            let len: i64 = parse_line_i64(&self.buffer[cursor + 1..bulk_line_end])
                .ok_or(ProtocolError::InvalidBulkLength)?;
            if len < 0 {
                return Err(ProtocolError::InvalidBulkLength);
            }
            #[allow(clippy::cast_sign_loss)]
            let len = len as usize;
            let data_start = bulk_line_end + 2;
            let data_end = data_start + len;
            if self.buffer.len() < data_end + 2 {
                return Ok(None);
            }
            argv.push(Bytes::copy_from_slice(&self.buffer[data_start..data_end]));
            cursor = data_end + 2;
        }
        let _ = self.buffer.split_to(cursor);
        Ok(Some(argv))
    }

    /// Inline commands are whitespace-split with minimal quoting support,
    /// enough for interactive/manual testing; real clients use multibulk.
    fn try_parse_inline(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        let Some((line, consumed)) = find_crlf_or_lf(&self.buffer) else {
            if self.buffer.len() > 64 * 1024 {
                return Err(ProtocolError::UnbalancedQuotes);
            }
            return Ok(None);
        };
        let argv = split_inline(&self.buffer[..line])?;
        let _ = self.buffer.split_to(consumed);
        Ok(Some(argv))
    }
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\r\n")
}

/// Returns `(line_len, bytes_consumed)`, accepting a bare `\n` the way
/// redis-cli's inline protocol does.
fn find_crlf_or_lf(buffer: &[u8]) -> Option<(usize, usize)> {
    for (i, byte) in buffer.iter().enumerate() {
        if *byte == b'\n' {
            let line = if i > 0 && buffer[i - 1] == b'\r' { i - 1 } else { i };
            return Some((line, i + 1));
        }
    }
    None
}

fn parse_line_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn split_inline(line: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
    let text = String::from_utf8_lossy(line);
    let mut argv = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut word = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(c) => word.push(c),
                    None => return Err(ProtocolError::UnbalancedQuotes),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        argv.push(Bytes::from(word.into_bytes()));
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn requests_from(data: &[u8]) -> Vec<Vec<Bytes>> {
        let mut reader = RequestReader::new(Cursor::new(data.to_vec()));
        let mut out = Vec::new();
        while let Some(argv) = reader.next_request().await.unwrap() {
            out.push(argv);
        }
        out
    }

    #[tokio::test]
    async fn decodes_multibulk_request() {
        let requests = requests_from(b"*2\r\n$3\r\nGET\r\n$1\r\nx\r\n").await;
        assert_eq!(requests, vec![vec![Bytes::from_static(b"GET"), Bytes::from_static(b"x")]]);
    }

    #[tokio::test]
    async fn decodes_multiple_pipelined_requests() {
        let requests = requests_from(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n").await;
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn decodes_inline_command() {
        let requests = requests_from(b"get x\r\n").await;
        assert_eq!(requests, vec![vec![Bytes::from_static(b"get"), Bytes::from_static(b"x")]]);
    }

    #[tokio::test]
    async fn decodes_quoted_inline_argument() {
        let requests = requests_from(b"set x \"hello world\"\n").await;
        assert_eq!(
            requests,
            vec![vec![
                Bytes::from_static(b"set"),
                Bytes::from_static(b"x"),
                Bytes::from_static(b"hello world"),
            ]]
        );
    }

    #[tokio::test]
    async fn rejects_non_dollar_after_multibulk_header() {
        let mut reader = RequestReader::new(Cursor::new(b"*1\r\n:5\r\n".to_vec()));
        let error = reader.next_request().await.unwrap_err();
        assert!(matches!(error, ProtocolError::ExpectedBulkString(':')));
    }
}
