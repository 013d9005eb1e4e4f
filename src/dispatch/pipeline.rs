//! Send pipeline.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::request::{Attachment, InvoiceReceipt, InvoiceRequest, SendReceipt, SendRequest};
use crate::address::{normalize_with, CanonicalAddress, ChatId, NumberingPlan};
use crate::error::{DispatchError, DispatchKind};
use crate::session::SessionManager;
use crate::transport::{MediaPayload, Transport};

/// Caption attached to every invoice.
pub const INVOICE_CAPTION: &str = "Here is your invoice. Thank you for your business!";

/// Default limit on a single transport send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns send requests into transport calls.
///
/// Requests may run concurrently; each one only reads session readiness
/// before calling the transport.
pub struct Dispatcher {
    session: Arc<SessionManager>,
    plan: NumberingPlan,
    send_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            plan: NumberingPlan::default(),
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
        }
    }

    /// Limit each transport call to `timeout`; `None` waits forever.
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Send a text message or a document.
    ///
    /// A sent attachment's transient file is deleted. One the transport
    /// failed to send is left in place for inspection. A request rejected
    /// before reaching the transport has its file deleted.
    pub async fn send(&self, request: SendRequest) -> Result<SendReceipt, DispatchError> {
        let (normalized, transport) = match self.admit(request.destination.as_deref()) {
            Ok(admitted) => admitted,
            Err(e) => {
                if let Some(attachment) = &request.attachment {
                    discard(&attachment.path).await;
                }
                return Err(e);
            }
        };
        let chat_id = normalized.chat_id();

        match request.attachment {
            Some(attachment) => {
                let caption = request.body.as_deref().filter(|b| !b.is_empty());
                info!(
                    "Sending document {} to {} (caption: {:?})",
                    attachment.file_name, chat_id, caption
                );

                let outcome = match load(&attachment).await {
                    Ok(media) => {
                        debug!("Prepared {} ({} bytes)", media.mime_type, media.data.len());
                        self.invoke(transport.send_document(&chat_id, media, caption))
                            .await
                    }
                    Err(detail) => Err(detail),
                };

                if let Err(detail) = outcome {
                    warn!(
                        "Failed to send document to {}: {} (kept {})",
                        chat_id,
                        detail,
                        attachment.path.display()
                    );
                    return Err(DispatchError::DispatchFailed {
                        kind: DispatchKind::Attachment,
                        detail,
                        normalized: normalized.to_string(),
                    });
                }

                discard(&attachment.path).await;
                info!("Document sent to {}", chat_id);
                Ok(SendReceipt {
                    normalized,
                    file_name: Some(attachment.file_name),
                })
            }
            None => {
                let body = request.body.as_deref().unwrap_or_default();
                info!("Sending text message to {}", chat_id);

                if let Err(detail) = self.invoke(transport.send_text(&chat_id, body)).await {
                    warn!("Failed to send message to {}: {}", chat_id, detail);
                    return Err(DispatchError::DispatchFailed {
                        kind: DispatchKind::Message,
                        detail,
                        normalized: normalized.to_string(),
                    });
                }

                info!("Message sent to {}", chat_id);
                Ok(SendReceipt {
                    normalized,
                    file_name: None,
                })
            }
        }
    }

    /// Deliver an invoice document.
    ///
    /// The destination only has non-digits stripped; no numbering plan is
    /// applied. The uploaded file is removed whether or not the send
    /// succeeds.
    pub async fn send_invoice(&self, request: InvoiceRequest) -> Result<InvoiceReceipt, DispatchError> {
        let InvoiceRequest {
            mobile_number,
            invoice,
        } = request;

        let Some(mobile) = mobile_number.as_deref().filter(|m| !m.trim().is_empty()) else {
            if let Some(invoice) = &invoice {
                discard(&invoice.path).await;
            }
            return Err(DispatchError::MissingDestination);
        };
        let invoice = invoice.ok_or(DispatchError::MissingFile)?;

        let chat_id = ChatId::from_raw_digits(mobile);
        info!("Attempting to send invoice to {}", chat_id);

        let transport = match self.session.ready_transport() {
            Ok(transport) => transport,
            Err(_) => {
                warn!("Session not ready, rejecting invoice to {}", chat_id);
                discard(&invoice.path).await;
                return Err(DispatchError::SessionNotReady { challenge: None });
            }
        };

        let outcome = match load(&invoice).await {
            Ok(media) => {
                self.invoke(transport.send_document(&chat_id, media, Some(INVOICE_CAPTION)))
                    .await
            }
            Err(detail) => Err(detail),
        };

        discard(&invoice.path).await;

        match outcome {
            Ok(()) => {
                info!("Invoice sent to {}", chat_id);
                Ok(InvoiceReceipt { chat_id })
            }
            Err(detail) => {
                warn!("Failed to send invoice to {}: {}", chat_id, detail);
                Err(DispatchError::DispatchFailed {
                    kind: DispatchKind::Invoice,
                    detail,
                    normalized: chat_id.to_string(),
                })
            }
        }
    }

    /// Check the destination and take the ready transport.
    fn admit(
        &self,
        destination: Option<&str>,
    ) -> Result<(CanonicalAddress, Arc<dyn Transport>), DispatchError> {
        let destination = destination
            .filter(|d| !d.trim().is_empty())
            .ok_or(DispatchError::MissingDestination)?;

        let normalized = normalize_with(&self.plan, destination)?;

        let transport = self.session.ready_transport().map_err(|challenge| {
            warn!(
                "Session not ready, rejecting send to {} (challenge pending: {})",
                normalized.chat_id(),
                challenge.is_some()
            );
            DispatchError::SessionNotReady { challenge }
        })?;

        Ok((normalized, transport))
    }

    /// Run a transport call under the configured timeout.
    async fn invoke<F>(&self, call: F) -> Result<(), String>
    where
        F: Future<Output = crate::Result<()>>,
    {
        match self.send_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("transport did not respond within {:?}", limit)),
            },
            None => call.await.map_err(|e| e.to_string()),
        }
    }
}

async fn load(attachment: &Attachment) -> Result<MediaPayload, String> {
    let data = tokio::fs::read(&attachment.path)
        .await
        .map_err(|e| format!("failed to read {}: {}", attachment.path.display(), e))?;
    Ok(MediaPayload::new(
        attachment.media_type(),
        attachment.file_name.clone(),
        data,
    ))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBroadcaster;
    use crate::session::{CredentialStore, Identity, PairingChallenge, RecoveryPolicy, SessionState};
    use crate::transport::{ScriptedConnector, SentMessage, TransportEvent};
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    struct Fixture {
        connector: ScriptedConnector,
        session: Arc<SessionManager>,
        dir: TempDir,
    }

    impl Fixture {
        async fn new(script: Vec<TransportEvent>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let connector = ScriptedConnector::new().with_script(script);
            let session = SessionManager::start(
                Arc::new(connector.clone()),
                CredentialStore::new(dir.path().join("session")),
                Arc::new(EventBroadcaster::new()),
                RecoveryPolicy::default(),
            );
            session.initialize().await.unwrap();
            Self {
                connector,
                session,
                dir,
            }
        }

        async fn ready() -> Self {
            let fixture = Self::new(vec![TransportEvent::Ready {
                identity: Some(Identity::new("94770000000@c.us")),
            }])
            .await;
            fixture.wait_for(SessionState::Ready).await;
            fixture
        }

        async fn wait_for(&self, state: SessionState) {
            for _ in 0..200 {
                if self.session.state() == state {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("session never reached {:?}", state);
        }

        fn dispatcher(&self) -> Dispatcher {
            Dispatcher::new(Arc::clone(&self.session))
        }

        fn upload(&self, name: &str, bytes: &[u8]) -> Attachment {
            let path = self.dir.path().join(format!("upload-{}", name));
            std::fs::write(&path, bytes).unwrap();
            Attachment::new(path, name)
        }
    }

    #[tokio::test]
    async fn test_not_ready_never_touches_transport() {
        let fixture = Fixture::new(vec![TransportEvent::PairingChallenge(PairingChallenge::new(
            "2@abc",
        ))])
        .await;
        fixture.wait_for(SessionState::Pairing).await;

        let err = fixture
            .dispatcher()
            .send(SendRequest::text("0771234567", "hi"))
            .await
            .unwrap_err();

        match err {
            DispatchError::SessionNotReady { challenge } => {
                assert_eq!(challenge, Some(PairingChallenge::new("2@abc")));
            }
            other => panic!("expected SessionNotReady, got {:?}", other),
        }
        assert_eq!(fixture.connector.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_not_ready_without_challenge() {
        let fixture = Fixture::new(vec![]).await;
        let err = fixture
            .dispatcher()
            .send(SendRequest::text("0771234567", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SessionNotReady { challenge: None }));
    }

    #[tokio::test]
    async fn test_address_checked_before_readiness() {
        let fixture = Fixture::new(vec![]).await;
        let err = fixture
            .dispatcher()
            .send(SendRequest::text("12345", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddressFormat { .. }));
    }

    #[tokio::test]
    async fn test_missing_destination() {
        let fixture = Fixture::ready().await;
        let err = fixture
            .dispatcher()
            .send(SendRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingDestination));
    }

    #[tokio::test]
    async fn test_text_message_sent() {
        let fixture = Fixture::ready().await;

        let receipt = assert_ok!(
            fixture
                .dispatcher()
                .send(SendRequest::text("0771234567", "hi"))
                .await
        );

        assert_eq!(receipt.normalized.as_str(), "94771234567");
        assert!(receipt.file_name.is_none());
        assert_eq!(
            fixture.connector.sent(),
            vec![SentMessage::Text {
                to: ChatId::from_digits("94771234567"),
                body: "hi".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_document_sent_and_upload_removed() {
        let fixture = Fixture::ready().await;
        let attachment = fixture.upload("invoice.pdf", b"%PDF-1.4");
        let path = attachment.path.clone();

        let receipt = fixture
            .dispatcher()
            .send(SendRequest::document("0771234567", attachment))
            .await
            .unwrap();

        assert_eq!(receipt.file_name.as_deref(), Some("invoice.pdf"));
        assert!(!path.exists());

        let sent = fixture.connector.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            SentMessage::Document { to, media, caption } => {
                assert_eq!(to.as_str(), "94771234567@s.whatsapp.net");
                assert_eq!(media.mime_type, "application/pdf");
                assert_eq!(media.file_name, "invoice.pdf");
                assert_eq!(media.data, b"%PDF-1.4");
                assert!(caption.is_none());
            }
            other => panic!("expected document, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_document_caption() {
        let fixture = Fixture::ready().await;
        let attachment = fixture.upload("a.txt", b"x");

        fixture
            .dispatcher()
            .send(SendRequest::document("771234567", attachment).with_body("see attached"))
            .await
            .unwrap();

        match &fixture.connector.sent()[0] {
            SentMessage::Document { caption, .. } => {
                assert_eq!(caption.as_deref(), Some("see attached"));
            }
            other => panic!("expected document, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_document_keeps_upload() {
        let fixture = Fixture::ready().await;
        fixture.connector.fail_sends(Some("media upload rejected"));
        let attachment = fixture.upload("invoice.pdf", b"%PDF");
        let path = attachment.path.clone();

        let err = fixture
            .dispatcher()
            .send(SendRequest::document("0771234567", attachment))
            .await
            .unwrap_err();

        match err {
            DispatchError::DispatchFailed {
                kind,
                detail,
                normalized,
            } => {
                assert_eq!(kind, DispatchKind::Attachment);
                assert!(detail.contains("media upload rejected"));
                assert_eq!(normalized, "94771234567");
            }
            other => panic!("expected DispatchFailed, got {:?}", other),
        }
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unreadable_attachment_fails() {
        let fixture = Fixture::ready().await;
        let attachment = Attachment::new(fixture.dir.path().join("missing"), "gone.pdf");

        let err = fixture
            .dispatcher()
            .send(SendRequest::document("0771234567", attachment))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DispatchFailed { .. }));
        assert_eq!(fixture.connector.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let fixture = Fixture::ready().await;
        fixture.connector.hang_sends(true);

        let err = fixture
            .dispatcher()
            .with_send_timeout(Some(Duration::from_millis(50)))
            .send(SendRequest::text("0771234567", "hi"))
            .await
            .unwrap_err();

        match err {
            DispatchError::DispatchFailed { kind, detail, .. } => {
                assert_eq!(kind, DispatchKind::Message);
                assert!(detail.contains("did not respond"));
            }
            other => panic!("expected DispatchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_sends() {
        let fixture = Fixture::ready().await;
        let dispatcher = Arc::new(fixture.dispatcher());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher
                        .send(SendRequest::text("0771234567", format!("msg {}", i)))
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(fixture.connector.sent().len(), 10);
    }

    #[tokio::test]
    async fn test_invoice_uses_raw_digits() {
        let fixture = Fixture::ready().await;
        let invoice = fixture.upload("inv-42.pdf", b"%PDF");
        let path = invoice.path.clone();

        let receipt = fixture
            .dispatcher()
            .send_invoice(InvoiceRequest {
                mobile_number: Some("077 123 4567".into()),
                invoice: Some(invoice),
            })
            .await
            .unwrap();

        assert_eq!(receipt.chat_id.as_str(), "0771234567@s.whatsapp.net");
        assert!(!path.exists());
        match &fixture.connector.sent()[0] {
            SentMessage::Document { caption, .. } => {
                assert_eq!(caption.as_deref(), Some(INVOICE_CAPTION));
            }
            other => panic!("expected document, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoice_failure_removes_upload() {
        let fixture = Fixture::ready().await;
        fixture.connector.fail_sends(Some("nope"));
        let invoice = fixture.upload("inv.pdf", b"%PDF");
        let path = invoice.path.clone();

        let err = fixture
            .dispatcher()
            .send_invoice(InvoiceRequest {
                mobile_number: Some("94771234567".into()),
                invoice: Some(invoice),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::DispatchFailed {
                kind: DispatchKind::Invoice,
                ..
            }
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejected_document_removes_upload() {
        let fixture = Fixture::new(vec![TransportEvent::PairingChallenge(PairingChallenge::new(
            "2@abc",
        ))])
        .await;
        fixture.wait_for(SessionState::Pairing).await;
        let dispatcher = fixture.dispatcher();

        let not_ready = fixture.upload("a.pdf", b"%PDF");
        let not_ready_path = not_ready.path.clone();
        let err = dispatcher
            .send(SendRequest::document("0771234567", not_ready))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SessionNotReady { .. }));
        assert!(!not_ready_path.exists());

        let invalid = fixture.upload("b.pdf", b"%PDF");
        let invalid_path = invalid.path.clone();
        let err = dispatcher
            .send(SendRequest::document("12345", invalid))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddressFormat { .. }));
        assert!(!invalid_path.exists());

        let unaddressed = fixture.upload("c.pdf", b"%PDF");
        let unaddressed_path = unaddressed.path.clone();
        let err = dispatcher
            .send(SendRequest {
                attachment: Some(unaddressed),
                ..SendRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingDestination));
        assert!(!unaddressed_path.exists());
        assert_eq!(fixture.connector.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_rejected_invoice_removes_upload() {
        let fixture = Fixture::new(vec![]).await;
        let dispatcher = fixture.dispatcher();

        let not_ready = fixture.upload("inv-1.pdf", b"%PDF");
        let not_ready_path = not_ready.path.clone();
        let err = dispatcher
            .send_invoice(InvoiceRequest {
                mobile_number: Some("0771234567".into()),
                invoice: Some(not_ready),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SessionNotReady { .. }));
        assert!(!not_ready_path.exists());

        let unaddressed = fixture.upload("inv-2.pdf", b"%PDF");
        let unaddressed_path = unaddressed.path.clone();
        let err = dispatcher
            .send_invoice(InvoiceRequest {
                mobile_number: Some("  ".into()),
                invoice: Some(unaddressed),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingDestination));
        assert!(!unaddressed_path.exists());
    }

    #[tokio::test]
    async fn test_invoice_requires_number_and_file() {
        let fixture = Fixture::ready().await;
        let dispatcher = fixture.dispatcher();

        let err = dispatcher
            .send_invoice(InvoiceRequest {
                mobile_number: Some("0771234567".into()),
                invoice: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingFile));

        let err = dispatcher
            .send_invoice(InvoiceRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingDestination));
    }
}
