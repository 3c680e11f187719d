use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{FrameError, Result};
use crate::header::{Header, MAX_FRAME_SIZE};
use crate::version::is_known_version;

/// Writes complete, already-encoded frames to an async stream.
///
/// Each write is checked against its own header so a malformed encoding never
/// reaches the socket.
pub struct FrameWriter<T> {
    inner: T,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Validate and write one frame, then flush.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let header = Header::parse(frame)?;
        if !is_known_version(header.version) {
            return Err(FrameError::UnsupportedVersion(header.version));
        }
        if header.length as usize != frame.len() {
            return Err(FrameError::LengthMismatch {
                declared: header.length as usize,
                actual: frame.len(),
            });
        }

        self.inner.write_all(frame).await.map_err(map_write_err)?;
        self.inner.flush().await.map_err(map_write_err)?;
        Ok(())
    }

    /// Shut down the write direction.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn map_write_err(err: std::io::Error) -> FrameError {
    match err.kind() {
        std::io::ErrorKind::WriteZero | std::io::ErrorKind::BrokenPipe => {
            FrameError::ConnectionClosed
        }
        _ => FrameError::Io(err),
    }
}
