//! File uploads sent as `multipart/form-data`.
//!
//! The source stream is read again for every attempt. Seekable sources are
//! rewound to the position they had before the first attempt; forward-only
//! sources cannot be replayed, so a retry fails with
//! [`MemoryApiError::StreamNotSeekable`].

use std::{fmt, io::SeekFrom};

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::{MemoryApiError, Result};

/// Form field name of the file part.
pub const FILE_FIELD: &str = "file";

trait SeekableStream: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableStream for T {}

enum UploadSource {
    Seekable {
        reader: Box<dyn SeekableStream>,
        start: Option<u64>,
    },
    ForwardOnly(Box<dyn AsyncRead + Send + Unpin>),
}

/// A file plus optional form fields, sent with
/// [`MemoryApiClient::send_multipart`](crate::MemoryApiClient::send_multipart).
pub struct FileUpload {
    source: UploadSource,
    file_name: String,
    content_type: String,
    fields: Vec<(String, String)>,
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("seekable", &self.is_seekable())
            .field("fields", &self.fields)
            .finish()
    }
}

impl FileUpload {
    /// Upload from a source that can be rewound between attempts
    /// (`tokio::fs::File`, `std::io::Cursor`, ...).
    pub fn seekable<R>(
        reader: R,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self
    where
        R: AsyncRead + AsyncSeek + Send + Unpin + 'static,
    {
        Self::with_source(
            UploadSource::Seekable {
                reader: Box::new(reader),
                start: None,
            },
            file_name,
            content_type,
        )
    }

    /// Upload from a stream that can only be read once. Such uploads are
    /// never retried.
    pub fn forward_only<R>(
        reader: R,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_source(
            UploadSource::ForwardOnly(Box::new(reader)),
            file_name,
            content_type,
        )
    }

    fn with_source(
        source: UploadSource,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            source,
            file_name: file_name.into(),
            content_type: content_type.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a text field, sent before the file part.
    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self.source, UploadSource::Seekable { .. })
    }

    /// Reads the source to its end and snapshots the form for one attempt.
    pub(crate) async fn encode(&mut self) -> Result<MultipartBody> {
        if let Err(err) = Part::bytes(Vec::new()).mime_str(&self.content_type) {
            return Err(MemoryApiError::InvalidRequest(format!(
                "invalid upload content type '{}': {err}",
                self.content_type
            )));
        }

        let mut contents = Vec::new();
        match &mut self.source {
            UploadSource::Seekable { reader, start } => {
                if start.is_none() {
                    *start = Some(reader.stream_position().await?);
                }
                reader.read_to_end(&mut contents).await?;
            }
            UploadSource::ForwardOnly(reader) => {
                reader.read_to_end(&mut contents).await?;
            }
        }
        Ok(MultipartBody {
            fields: self.fields.clone(),
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            contents: Bytes::from(contents),
        })
    }

    /// Repositions the source for another attempt.
    pub(crate) async fn rewind(&mut self) -> Result<()> {
        match &mut self.source {
            UploadSource::Seekable { reader, start } => {
                if let Some(start) = *start {
                    reader.seek(SeekFrom::Start(start)).await?;
                }
                Ok(())
            }
            UploadSource::ForwardOnly(_) => Err(MemoryApiError::StreamNotSeekable),
        }
    }
}

/// Form contents of one upload attempt: text fields followed by the file
/// part named [`FILE_FIELD`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub file_name: String,
    pub content_type: String,
    pub contents: Bytes,
}

impl MultipartBody {
    /// Builds the `reqwest` form. Boundary and part headers are generated by
    /// `reqwest`.
    pub fn to_form(&self) -> std::result::Result<Form, reqwest::Error> {
        let file = Part::bytes(self.contents.to_vec())
            .file_name(self.file_name.clone())
            .mime_str(&self.content_type)?;
        let form = self
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        Ok(form.part(FILE_FIELD, file))
    }
}
