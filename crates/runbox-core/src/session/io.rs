use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};

/// Default cap on a single prompt answer.
const MAX_LINE: usize = 4096;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const INTERRUPT: u8 = 0x03;
const END_OF_TRANSMISSION: u8 = 0x04;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(String),

    #[error("line longer than {max} bytes")]
    LineTooLong { max: usize },
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

/// Interactive byte stream with line helpers and a peer identity.
///
/// After the prompts the same value is handed to the attacher as a raw stream, so any
/// input buffered by the line helpers must still be readable through `AsyncRead`.
#[async_trait]
pub trait SessionIo: AsyncRead + AsyncWrite + Send + Unpin {
    /// Client identity used as admission origin (usually the peer address).
    fn peer(&self) -> &str;

    /// Next line without its terminator. `None` on EOF.
    async fn read_line(&mut self) -> Result<Option<String>, SessionError>;

    /// Write `line` followed by a line break.
    async fn write_line(&mut self, line: &str) -> Result<(), SessionError>;

    /// Write `prompt` without a line break and read the answer.
    async fn prompt(&mut self, prompt: &str) -> Result<Option<String>, SessionError> {
        self.write_all(prompt.as_bytes()).await?;
        self.write_all(b" ").await?;
        self.flush().await?;
        self.read_line().await
    }
}

/// [`SessionIo`] over any buffered byte stream (TCP socket, duplex pipe, ...).
pub struct LineSession<S> {
    inner: BufReader<S>,
    peer: String,
    max_line: usize,
    echo: bool,
}

impl<S> LineSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            inner: BufReader::new(stream),
            peer: peer.into(),
            max_line: MAX_LINE,
            echo: false,
        }
    }

    pub fn with_max_line(mut self, max: usize) -> Self {
        self.max_line = max;
        self
    }

    /// Echo typed bytes back and edit the line like a terminal.
    ///
    /// For clients on a pseudo terminal, which send raw keystrokes without local echo.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    async fn read_echoed(&mut self) -> Result<Option<String>, SessionError> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            if self.inner.read(&mut byte).await? == 0 {
                return Ok((!line.is_empty()).then(|| String::from_utf8_lossy(&line).into_owned()));
            }
            match byte[0] {
                b'\r' | b'\n' => {
                    self.inner.write_all(b"\r\n").await?;
                    self.inner.flush().await?;
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                BACKSPACE | DELETE => {
                    if line.pop().is_some() {
                        self.inner.write_all(b"\x08 \x08").await?;
                    }
                }
                INTERRUPT | END_OF_TRANSMISSION => {
                    self.inner.write_all(b"\r\n").await?;
                    self.inner.flush().await?;
                    return Ok(None);
                }
                b => {
                    if line.len() >= self.max_line {
                        return Err(SessionError::LineTooLong { max: self.max_line });
                    }
                    line.push(b);
                    self.inner.write_all(&[b]).await?;
                }
            }
            self.inner.flush().await?;
        }
    }
}

#[async_trait]
impl<S> SessionIo for LineSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        if self.echo {
            return self.read_echoed().await;
        }
        let mut line = String::new();
        let limit = self.max_line as u64 + 1;
        let n = (&mut self.inner).take(limit).read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') && line.len() > self.max_line {
            return Err(SessionError::LineTooLong { max: self.max_line });
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        Ok(Some(trimmed.to_string()))
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\r\n").await?;
        self.inner.flush().await?;
        Ok(())
    }
}

impl<S> AsyncRead for LineSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for LineSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
