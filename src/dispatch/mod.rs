//! Outbound dispatch pipeline.
//!
//! Validates a send request, resolves its destination, checks that the
//! session is ready and hands the message to the transport.

mod pipeline;
mod request;

pub use pipeline::{Dispatcher, INVOICE_CAPTION};
pub use request::{
    Attachment, InvoiceReceipt, InvoiceRequest, SendReceipt, SendRequest, FALLBACK_MEDIA_TYPE,
};
