//! Request body duplication.
//!
//! Signature verification needs the whole body, and so does the handler
//! that runs afterwards. [`BodyCloner`] drains the inbound stream once into
//! storage it owns and hands back two independent readers over the same
//! bytes. Small bodies stay in memory; larger ones spill to a temp file.
//!
//! The storage lives in a [`ClonedBody`] guard. Dropping the guard, or
//! calling [`ClonedBody::cleanup`], releases it exactly once.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use axum::body::{Body, Bytes, HttpBody as _};
use axum::extract::Request;
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::config::AuthConfig;
use crate::error::InfrastructureError;
use crate::signature::body_digest;

const TEMP_PREFIX: &str = "policy-guard-body";

/// Copies request bodies so they can be read twice.
#[derive(Debug, Clone)]
pub struct BodyCloner {
    spill_threshold: usize,
    temp_dir: Option<PathBuf>,
}

impl BodyCloner {
    /// Creates a cloner that keeps up to `spill_threshold` bytes in memory.
    pub fn new(spill_threshold: usize, temp_dir: Option<PathBuf>) -> Self {
        Self {
            spill_threshold,
            temp_dir,
        }
    }

    /// Creates a cloner from the middleware configuration.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.spill_threshold, config.temp_dir.clone())
    }

    /// Drains the body of `request` and re-attaches an identical copy.
    ///
    /// A request whose body is known to be empty is returned untouched
    /// together with an empty guard; no storage is allocated. Every other
    /// body is duplicated whatever the method, so a body attached to a GET
    /// is covered by the signature like any other.
    ///
    /// # Errors
    ///
    /// Fails if the inbound stream errors or the temp file cannot be
    /// created or written. Partially written temp files are removed.
    pub async fn clone_request(
        &self,
        request: Request,
    ) -> Result<(Request, ClonedBody), InfrastructureError> {
        if request.body().size_hint().exact() == Some(0) {
            return Ok((request, ClonedBody::empty()));
        }

        let (parts, body) = request.into_parts();
        let storage = self.drain(body).await?;
        let downstream = storage.downstream_body()?;
        tracing::trace!(bytes = storage.len(), spilled = storage.is_disk(), "request body duplicated");

        Ok((Request::from_parts(parts, downstream), ClonedBody::new(storage)))
    }

    async fn drain(&self, body: Body) -> Result<Storage, InfrastructureError> {
        let mut stream = body.into_data_stream();
        let mut buffer = Vec::new();
        let mut spilled: Option<Spill> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            match spilled.as_mut() {
                Some(spill) => spill.write(&chunk).await?,
                None => {
                    buffer.extend_from_slice(&chunk);
                    if buffer.len() > self.spill_threshold {
                        let mut spill = Spill::create(self.temp_file()?)?;
                        spill.write(&buffer).await?;
                        spilled = Some(spill);
                        buffer = Vec::new();
                    }
                }
            }
        }

        match spilled {
            Some(spill) => spill.finish().await,
            None => Ok(Storage::Memory(Bytes::from(buffer))),
        }
    }

    fn temp_file(&self) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

/// Temp file being filled. Writes go through tokio so they leave the
/// executor threads; the `NamedTempFile` keeps ownership of the path.
struct Spill {
    file: NamedTempFile,
    writer: tokio::fs::File,
    len: u64,
}

impl Spill {
    fn create(file: NamedTempFile) -> io::Result<Self> {
        let writer = tokio::fs::File::from_std(file.as_file().try_clone()?);
        Ok(Self { file, writer, len: 0 })
    }

    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self) -> Result<Storage, InfrastructureError> {
        self.writer.flush().await?;
        Ok(Storage::Disk {
            file: self.file,
            len: self.len,
        })
    }
}

enum Storage {
    Empty,
    Memory(Bytes),
    Disk { file: NamedTempFile, len: u64 },
}

impl Storage {
    fn len(&self) -> u64 {
        match self {
            Storage::Empty => 0,
            Storage::Memory(bytes) => bytes.len() as u64,
            Storage::Disk { len, .. } => *len,
        }
    }

    fn is_disk(&self) -> bool {
        matches!(self, Storage::Disk { .. })
    }

    fn downstream_body(&self) -> io::Result<Body> {
        match self {
            Storage::Empty => Ok(Body::empty()),
            Storage::Memory(bytes) => Ok(Body::from(bytes.clone())),
            Storage::Disk { file, .. } => {
                let handle = tokio::fs::File::from_std(file.reopen()?);
                Ok(Body::from_stream(ReaderStream::new(handle)))
            }
        }
    }
}

/// Owner of one duplicated body.
///
/// Releases its storage on [`cleanup`](Self::cleanup) or on drop, whichever
/// comes first. A failed temp file removal is logged and otherwise ignored.
pub struct ClonedBody {
    storage: Option<Storage>,
}

impl ClonedBody {
    fn new(storage: Storage) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    /// A guard over zero bytes that owns no storage.
    pub fn empty() -> Self {
        Self::new(Storage::Empty)
    }

    /// Number of duplicated bytes.
    pub fn len(&self) -> u64 {
        self.storage.as_ref().map_or(0, Storage::len)
    }

    /// Whether the duplicated body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing temp file, if the body spilled to disk.
    pub fn spill_path(&self) -> Option<&Path> {
        match self.storage.as_ref() {
            Some(Storage::Disk { file, .. }) => Some(file.path()),
            _ => None,
        }
    }

    /// Opens a fresh reader positioned at the first byte.
    ///
    /// # Errors
    ///
    /// Fails if a spilled body's temp file cannot be reopened.
    pub fn reader(&self) -> io::Result<BodyReader> {
        let inner = match self.storage.as_ref() {
            None | Some(Storage::Empty) => ReaderInner::Memory(Cursor::new(Bytes::new())),
            Some(Storage::Memory(bytes)) => ReaderInner::Memory(Cursor::new(bytes.clone())),
            Some(Storage::Disk { file, .. }) => ReaderInner::Disk(file.reopen()?),
        };
        Ok(BodyReader { inner })
    }

    /// SHA-256 of the duplicated bytes.
    ///
    /// A spilled body is hashed on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Fails if a spilled body cannot be reopened or read.
    pub async fn digest(&self) -> io::Result<[u8; 32]> {
        match self.storage.as_ref() {
            Some(Storage::Disk { file, .. }) => {
                let reader = file.reopen()?;
                tokio::task::spawn_blocking(move || body_digest(reader))
                    .await
                    .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?
            }
            _ => body_digest(self.reader()?),
        }
    }

    /// Releases the storage now.
    pub fn cleanup(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(Storage::Disk { file, .. }) = self.storage.take() {
            let path = file.path().to_path_buf();
            if let Err(error) = file.close() {
                tracing::warn!(%error, tmp_file = %path.display(), "unable to remove body temp file");
            }
        }
    }
}

impl Drop for ClonedBody {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ClonedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClonedBody")
            .field("len", &self.len())
            .field("spill_path", &self.spill_path())
            .finish()
    }
}

/// Sequential reader over a duplicated body.
pub struct BodyReader {
    inner: ReaderInner,
}

enum ReaderInner {
    Memory(Cursor<Bytes>),
    Disk(File),
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ReaderInner::Memory(cursor) => cursor.read(buf),
            ReaderInner::Disk(file) => file.read(buf),
        }
    }
}
