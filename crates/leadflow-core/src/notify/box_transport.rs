//! Object-safe dynamic dispatch wrappers for the transport traits.
//!
//! Same blanket-impl pattern for both channels:
//! 1. An object-safe `*Dyn` trait with boxed futures
//! 2. A blanket impl of it for every concrete transport
//! 3. A `Box*` wrapper that delegates to the trait object

use std::future::Future;
use std::pin::Pin;

use super::{EmailTransport, SmsTransport, TransportError};

type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// Object-safe version of [`EmailTransport`].
pub trait EmailTransportDyn: Send + Sync {
    fn name(&self) -> &str;

    fn send_boxed<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> SendFuture<'a>;
}

impl<T: EmailTransport> EmailTransportDyn for T {
    fn name(&self) -> &str {
        EmailTransport::name(self)
    }

    fn send_boxed<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> SendFuture<'a> {
        Box::pin(self.send(to, subject, body))
    }
}

/// Type-erased email transport for runtime transport selection.
pub struct BoxEmailTransport {
    inner: Box<dyn EmailTransportDyn + Send + Sync>,
}

impl BoxEmailTransport {
    pub fn new<T: EmailTransport + 'static>(transport: T) -> Self {
        Self {
            inner: Box::new(transport),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        self.inner.send_boxed(to, subject, body).await
    }
}

// ---------------------------------------------------------------------------
// SMS
// ---------------------------------------------------------------------------

/// Object-safe version of [`SmsTransport`].
pub trait SmsTransportDyn: Send + Sync {
    fn name(&self) -> &str;

    fn send_boxed<'a>(&'a self, to: &'a str, body: &'a str) -> SendFuture<'a>;
}

impl<T: SmsTransport> SmsTransportDyn for T {
    fn name(&self) -> &str {
        SmsTransport::name(self)
    }

    fn send_boxed<'a>(&'a self, to: &'a str, body: &'a str) -> SendFuture<'a> {
        Box::pin(self.send(to, body))
    }
}

/// Type-erased SMS transport for runtime transport selection.
pub struct BoxSmsTransport {
    inner: Box<dyn SmsTransportDyn + Send + Sync>,
}

impl BoxSmsTransport {
    pub fn new<T: SmsTransport + 'static>(transport: T) -> Self {
        Self {
            inner: Box::new(transport),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        self.inner.send_boxed(to, body).await
    }
}
