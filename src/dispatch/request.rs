//! Dispatch request and receipt types.

use std::path::PathBuf;

use crate::address::{CanonicalAddress, ChatId};

/// Media type used when neither the uploader nor the file name tells us.
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// A file staged on disk by the upload layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Location of the transient copy.
    pub path: PathBuf,
    /// Name shown to the recipient.
    pub file_name: String,
    /// Media type declared by the uploader.
    pub declared_type: Option<String>,
}

impl Attachment {
    pub fn new(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            declared_type: None,
        }
    }

    pub fn with_declared_type(mut self, media_type: impl Into<String>) -> Self {
        self.declared_type = Some(media_type.into());
        self
    }

    /// Declared type, else guessed from the file name, else
    /// [`FALLBACK_MEDIA_TYPE`].
    pub fn media_type(&self) -> String {
        if let Some(declared) = self.declared_type.as_deref().filter(|t| !t.trim().is_empty()) {
            return declared.to_string();
        }
        mime_guess::from_path(&self.file_name)
            .first_raw()
            .unwrap_or(FALLBACK_MEDIA_TYPE)
            .to_string()
    }
}

/// One caller-submitted message.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    /// Raw destination phone number.
    pub destination: Option<String>,
    /// Text body, used as caption when an attachment is present.
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
}

impl SendRequest {
    pub fn text(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: Some(destination.into()),
            body: Some(body.into()),
            attachment: None,
        }
    }

    pub fn document(destination: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            destination: Some(destination.into()),
            body: None,
            attachment: Some(attachment),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub normalized: CanonicalAddress,
    /// Display name of the attachment, if one was sent.
    pub file_name: Option<String>,
}

/// Legacy invoice delivery request.
#[derive(Debug, Clone, Default)]
pub struct InvoiceRequest {
    pub mobile_number: Option<String>,
    pub invoice: Option<Attachment>,
}

/// Outcome of a successful invoice delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReceipt {
    pub chat_id: ChatId,
}
