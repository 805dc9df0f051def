//! JSON-lines request handling.
//!
//! Each request names a preset and carries the raw request headers. The
//! handler derives the caller identifier, runs the check and answers with the
//! decision plus, when limited, the rejection body an HTTP layer would send.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::error::{RateLimitError, Result};
use crate::identity::{truncate_for_log, ProxyHeaders};
use crate::ratelimit::{Clock, Decision, RateLimiter, Rejection};

/// A single check request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Name of the preset protecting the operation
    pub preset: String,
    /// Request headers by name
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// The answer to a [`CheckRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Identifier the request was counted under
    pub identifier: String,
    /// Preset applied
    pub preset: String,
    /// The limiter's decision
    pub decision: Decision,
    /// Body for a "too many requests" response, present only when limited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

/// Turns check requests into limiter decisions.
pub struct RequestHandler<C: Clock> {
    rate_limiter: Arc<RateLimiter<C>>,
}

impl<C: Clock> RequestHandler<C> {
    /// Create a handler over the given limiter.
    pub fn new(rate_limiter: Arc<RateLimiter<C>>) -> Self {
        Self { rate_limiter }
    }

    /// Process one request.
    #[instrument(skip(self, request), fields(preset = %request.preset))]
    pub fn handle(&self, request: &CheckRequest) -> Result<CheckResponse> {
        if request.preset.is_empty() {
            warn!("Received check request with empty preset");
            return Err(RateLimitError::InvalidRequest("preset is required".to_string()));
        }

        let config = self.rate_limiter.preset(&request.preset)?;
        let identifier = ProxyHeaders::from_pairs(&request.headers).client_identifier();
        let decision = self.rate_limiter.check(&identifier, &config);
        let rejection = decision.rejection(self.rate_limiter.now_ms());

        if decision.limited {
            warn!(
                client_id = %truncate_for_log(&identifier),
                preset = %request.preset,
                reset_time = decision.reset_time,
                "Rate limit exceeded"
            );
        } else {
            debug!(
                client_id = %truncate_for_log(&identifier),
                remaining = decision.remaining,
                "Request admitted"
            );
        }

        Ok(CheckResponse {
            identifier,
            preset: request.preset.clone(),
            decision,
            rejection,
        })
    }

    /// Process one JSON-encoded request and encode the response.
    pub fn handle_line(&self, line: &str) -> Result<String> {
        let request: CheckRequest = serde_json::from_str(line)?;
        let response = self.handle(&request)?;
        Ok(serde_json::to_string(&response)?)
    }
}

/// Lines buffered between the reader thread and the consumer.
const LINE_BUFFER: usize = 64;

/// Read lines from `reader` on a dedicated OS thread.
///
/// The thread is detached from the runtime, so a read parked on an open pipe
/// never holds up runtime shutdown. It exits at EOF, on a read error, or once
/// the returned stream is dropped and the next line arrives.
pub fn spawn_line_reader<R>(reader: R) -> ReceiverStream<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);

    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
        debug!("Line reader finished");
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use std::io::{Cursor, Read};
    use std::time::{Duration, Instant};
    use tokio_stream::StreamExt;

    /// A reader whose reads never return, like stdin on an idle pipe.
    struct StalledReader;

    impl Read for StalledReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                std::thread::park();
            }
        }
    }

    fn handler() -> (Arc<ManualClock>, RequestHandler<Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        (clock, RequestHandler::new(limiter))
    }

    fn request(preset: &str, headers: &[(&str, &str)]) -> CheckRequest {
        CheckRequest {
            preset: preset.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_empty_preset_rejected() {
        let (_clock, handler) = handler();
        let result = handler.handle(&request("", &[]));
        assert!(matches!(result, Err(RateLimitError::InvalidRequest(_))));
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let (_clock, handler) = handler();
        let result = handler.handle(&request("upload", &[]));
        assert!(matches!(result, Err(RateLimitError::UnknownPreset(_))));
    }

    #[test]
    fn test_valid_request_admitted() {
        let (_clock, handler) = handler();
        let response = handler
            .handle(&request("login", &[("X-Forwarded-For", "1.2.3.4, 5.6.6.7")]))
            .unwrap();

        assert_eq!(response.identifier, "1.2.3.4");
        assert!(!response.decision.limited);
        assert_eq!(response.decision.remaining, 4);
        assert_eq!(response.decision.reset_time, 900_000);
        assert_eq!(response.rejection, None);
    }

    #[test]
    fn test_limited_request_carries_rejection() {
        let (clock, handler) = handler();
        let req = request("registration", &[("x-real-ip", "7.7.7.7")]);

        for _ in 0..5 {
            assert!(!handler.handle(&req).unwrap().decision.limited);
        }

        clock.set(600_000);
        let response = handler.handle(&req).unwrap();
        assert!(response.decision.limited);

        let rejection = response.rejection.unwrap();
        assert_eq!(rejection.status, 429);
        assert_eq!(rejection.retry_after_secs, 3_000);
    }

    #[test]
    fn test_headerless_requests_share_unknown_bucket() {
        let (_clock, handler) = handler();
        handler.handle(&request("feedback", &[])).unwrap();
        let response = handler.handle(&request("feedback", &[])).unwrap();

        assert_eq!(response.identifier, "unknown");
        assert_eq!(response.decision.remaining, 8);
    }

    #[test]
    fn test_handle_line_round_trip() {
        let (_clock, handler) = handler();
        let line = r#"{"preset":"api","headers":{"Authorization":"Bearer abc123"}}"#;

        let output = handler.handle_line(line).unwrap();
        let response: CheckResponse = serde_json::from_str(&output).unwrap();
        assert_eq!(response.identifier, "user:abc123");
        assert_eq!(response.decision.remaining, 99);
        assert!(!output.contains("rejection"));
    }

    #[test]
    fn test_handle_line_malformed_json() {
        let (_clock, handler) = handler();
        let result = handler.handle_line("{not json");
        assert!(matches!(result, Err(RateLimitError::Json(_))));
    }

    #[tokio::test]
    async fn test_line_reader_yields_lines_then_ends() {
        let input = Cursor::new("{\"preset\":\"api\"}\n\nsecond\n");
        let lines: Vec<String> = spawn_line_reader(input)
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["{\"preset\":\"api\"}", "", "second"]);
    }

    #[test]
    fn test_runtime_shutdown_not_blocked_by_stalled_reader() {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        runtime.block_on(async {
            let mut lines = spawn_line_reader(std::io::BufReader::new(StalledReader));
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
            shutdown_tx.send(()).unwrap();

            tokio::select! {
                _ = lines.next() => panic!("stalled reader produced a line"),
                _ = shutdown_rx => {}
            }
        });

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
