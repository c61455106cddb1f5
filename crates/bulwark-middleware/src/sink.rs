//! Destinations for access-log records.
//!
//! The logging stage serializes each [`LogRecord`](crate::stages::logging::LogRecord)
//! to JSON and hands the string to a [`LogSink`]. Delivery runs on a
//! spawned task; a failure is logged and counted, never surfaced to the
//! client.
//!
//! | Sink | Destination |
//! |------|-------------|
//! | [`TracingSink`] | `tracing` event on the `bulwark::access` target |
//! | [`HttpSink`] | JSON `POST` to a collector URL (feature `http-sink`) |
//! | [`ChannelSink`] | tokio channel, for embedding and tests |

use crate::error::SinkError;
use crate::middleware::BoxFuture;
use tokio::sync::mpsc;

/// Target used by [`TracingSink`].
pub const ACCESS_LOG_TARGET: &str = "bulwark::access";

/// A destination for serialized log records.
pub trait LogSink: Send + Sync + 'static {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Delivers one JSON record.
    ///
    /// The returned future must not borrow `self`; it is driven on a
    /// spawned task.
    fn send_log(&self, record: String) -> BoxFuture<'static, Result<(), SinkError>>;
}

/// Emits records as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn send_log(&self, record: String) -> BoxFuture<'static, Result<(), SinkError>> {
        Box::pin(async move {
            tracing::info!(target: ACCESS_LOG_TARGET, record = %record, "access");
            Ok(())
        })
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn send_log(&self, _record: String) -> BoxFuture<'static, Result<(), SinkError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Sends records into a tokio channel.
///
/// # Example
///
/// ```
/// use bulwark_middleware::sink::{ChannelSink, LogSink};
///
/// # tokio_test::block_on(async {
/// let (sink, mut rx) = ChannelSink::new(8);
/// sink.send_log("{}".to_string()).await.unwrap();
/// assert_eq!(rx.recv().await.as_deref(), Some("{}"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver for its records.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn send_log(&self, record: String) -> BoxFuture<'static, Result<(), SinkError>> {
        let tx = self.tx.clone();
        Box::pin(async move { tx.send(record).await.map_err(|_| SinkError::ChannelClosed) })
    }
}

#[cfg(feature = "http-sink")]
pub use http_sink::HttpSink;

#[cfg(feature = "http-sink")]
mod http_sink {
    use super::LogSink;
    use crate::error::SinkError;
    use crate::middleware::BoxFuture;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::Client;
    use std::time::Duration;

    /// Default request timeout for [`HttpSink`].
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// POSTs each record as JSON to a collector.
    #[derive(Debug, Clone)]
    pub struct HttpSink {
        client: Client,
        url: String,
    }

    impl HttpSink {
        /// Creates a sink for `url` with the default timeout.
        pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
            Self::with_timeout(url, DEFAULT_TIMEOUT)
        }

        /// Creates a sink for `url` with a request timeout.
        pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                url: url.into(),
            })
        }

        /// Returns the collector URL.
        #[must_use]
        pub fn url(&self) -> &str {
            &self.url
        }
    }

    impl LogSink for HttpSink {
        fn name(&self) -> &'static str {
            "http"
        }

        fn send_log(&self, record: String) -> BoxFuture<'static, Result<(), SinkError>> {
            let request = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, "application/json")
                .body(record);

            Box::pin(async move {
                let response = request.send().await?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(SinkError::Rejected {
                        status: status.as_u16(),
                    })
                }
            })
        }
    }
}
