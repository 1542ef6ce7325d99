//! Connection probing and the probe retry engine
//!
//! A probe validates reachability and handshake correctness before the
//! connection is trusted for real traffic. The engine drives probes with
//! exponential backoff and, in automatic mode, falls back from SSE to
//! streamable HTTP exactly once when the remote side turns out to speak the
//! other flavor.

use crate::error::{Error, Result};
use crate::headers::HeaderSet;
use crate::options::{BridgeOptions, TransportChoice};
use crate::remote::{Connector, ErrorClass, RemoteError, RemoteService};
use crate::transport::{build_descriptor, TransportKind};

/// One probe: open a session, enumerate capabilities, close the session
///
/// An empty capability list is a success; the probe validates the handshake,
/// not content. No retries happen here; every failure surfaces unmodified.
pub async fn probe(service: &dyn RemoteService) -> std::result::Result<(), RemoteError> {
    service.open().await?;
    let listed = service.list_capabilities().await;
    let closed = service.close().await;
    listed?;
    closed
}

/// Where the engine stands while establishing a connection
///
/// Transient by design: discarded on success, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeState {
    pub kind: TransportKind,
    /// 1-indexed attempt number on the current transport
    pub attempt: u32,
    /// Whether the one-shot transport switch has already happened
    pub switched: bool,
}

/// The transition taken after a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    /// Wait, then probe the same transport again
    Retry { next_attempt: u32 },
    /// Fall back to streamable HTTP and restart the attempt counter
    SwitchTransport,
    /// Surface the failure; the bridge cannot be built
    Fail,
}

/// Decide the next step after a probe failure
///
/// Non-transient failures fail immediately regardless of remaining attempts.
/// The transport switch fires only on exhaustion, only in automatic mode,
/// only for the protocol-flavor error, and only once.
pub fn next_step(
    state: &ProbeState,
    selector: TransportChoice,
    attempts: u32,
    error: &RemoteError,
) -> ProbeStep {
    if !error.is_transient() {
        return ProbeStep::Fail;
    }
    if state.attempt < attempts {
        return ProbeStep::Retry {
            next_attempt: state.attempt + 1,
        };
    }
    let fallback_eligible =
        selector.is_auto() && !state.switched && error.class() == ErrorClass::RemoteProtocol;
    if fallback_eligible {
        ProbeStep::SwitchTransport
    } else {
        ProbeStep::Fail
    }
}

/// Drives repeated probes until a connection is validated or the build fails
pub struct ProbeRetryEngine<'a, C: Connector> {
    options: &'a BridgeOptions,
    connector: &'a C,
    headers: HeaderSet,
}

impl<'a, C: Connector> ProbeRetryEngine<'a, C> {
    pub fn new(options: &'a BridgeOptions, connector: &'a C, headers: HeaderSet) -> Self {
        Self {
            options,
            connector,
            headers,
        }
    }

    /// Establish a validated connection handle
    ///
    /// The returned session is closed; the caller reopens it on first real
    /// use. Each attempt opens and closes its own fresh session.
    pub async fn establish(&self) -> Result<Box<dyn RemoteService>> {
        let attempts = self.options.probe_retry.attempts.max(1);
        let mut state = ProbeState {
            kind: self.options.transport.initial_kind(),
            attempt: 1,
            switched: false,
        };

        loop {
            let descriptor = build_descriptor(self.options, self.headers.clone(), state.kind)?;
            let service = self
                .connector
                .connect(&descriptor)
                .await
                .map_err(|source| Error::ProbeFatal { source })?;

            let error = match probe(service.as_ref()).await {
                Ok(()) => {
                    if state.attempt > 1 || state.switched {
                        tracing::info!(
                            attempt = state.attempt,
                            kind = %state.kind,
                            "probe succeeded"
                        );
                    }
                    return Ok(service);
                }
                Err(error) => error,
            };

            match next_step(&state, self.options.transport, attempts, &error) {
                ProbeStep::Retry { next_attempt } => {
                    let wait = self.options.probe_retry.backoff.wait_for_attempt(state.attempt);
                    tracing::warn!(
                        attempt = state.attempt,
                        attempts,
                        kind = %state.kind,
                        wait_secs = wait.as_secs_f64(),
                        error = %error,
                        "probe failed; retrying"
                    );
                    tokio::time::sleep(wait).await;
                    state.attempt = next_attempt;
                }
                ProbeStep::SwitchTransport => {
                    tracing::warn!(
                        error = %error,
                        "probe exhausted on sse; falling back to streamable-http"
                    );
                    state = ProbeState {
                        kind: TransportKind::StreamableHttp,
                        attempt: 1,
                        switched: true,
                    };
                }
                ProbeStep::Fail => {
                    return Err(if error.is_transient() {
                        tracing::error!(
                            attempts,
                            kind = %state.kind,
                            error = %error,
                            "probe attempts exhausted"
                        );
                        Error::ProbeExhausted {
                            kind: state.kind,
                            attempts,
                            source: error,
                        }
                    } else {
                        tracing::error!(error = %error, "unexpected probe error");
                        Error::ProbeFatal { source: error }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::options::RetrySettings;
    use crate::remote::{Capability, RemoteRequest};
    use crate::transport::TransportDescriptor;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn transient(kind: &str) -> RemoteError {
        match kind {
            "connect-timeout" => RemoteError::ConnectTimeout("test".into()),
            "read-timeout" => RemoteError::ReadTimeout("test".into()),
            "protocol" => RemoteError::Protocol("test".into()),
            other => panic!("unknown test error kind {other}"),
        }
    }

    // -- pure transition table --

    fn state(kind: TransportKind, attempt: u32, switched: bool) -> ProbeState {
        ProbeState {
            kind,
            attempt,
            switched,
        }
    }

    #[test]
    fn test_transient_failure_retries_while_attempts_remain() {
        let step = next_step(
            &state(TransportKind::Sse, 1, false),
            TransportChoice::Sse,
            3,
            &transient("connect-timeout"),
        );
        assert_eq!(step, ProbeStep::Retry { next_attempt: 2 });
    }

    #[test]
    fn test_exhaustion_without_auto_is_fatal() {
        let step = next_step(
            &state(TransportKind::Sse, 3, false),
            TransportChoice::Sse,
            3,
            &transient("connect-timeout"),
        );
        assert_eq!(step, ProbeStep::Fail);
    }

    #[test]
    fn test_exhaustion_with_auto_and_protocol_error_switches() {
        let step = next_step(
            &state(TransportKind::Sse, 3, false),
            TransportChoice::Auto,
            3,
            &transient("protocol"),
        );
        assert_eq!(step, ProbeStep::SwitchTransport);
    }

    #[test]
    fn test_auto_with_non_protocol_error_does_not_switch() {
        let step = next_step(
            &state(TransportKind::Sse, 3, false),
            TransportChoice::Auto,
            3,
            &transient("read-timeout"),
        );
        assert_eq!(step, ProbeStep::Fail);
    }

    #[test]
    fn test_switch_never_happens_twice() {
        let step = next_step(
            &state(TransportKind::StreamableHttp, 3, true),
            TransportChoice::Auto,
            3,
            &transient("protocol"),
        );
        assert_eq!(step, ProbeStep::Fail);
    }

    #[test]
    fn test_non_transient_fails_immediately() {
        let error = RemoteError::Application {
            code: -32601,
            message: "method not found".into(),
        };
        let step = next_step(
            &state(TransportKind::Sse, 1, false),
            TransportChoice::Auto,
            5,
            &error,
        );
        assert_eq!(step, ProbeStep::Fail);
    }

    // -- engine behavior with a scripted connector --

    struct ScriptedService {
        outcome: Option<RemoteError>,
        opens: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RemoteService for ScriptedService {
        async fn open(&self) -> std::result::Result<(), RemoteError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> std::result::Result<(), RemoteError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn list_capabilities(&self) -> std::result::Result<Vec<Capability>, RemoteError> {
            match &self.outcome {
                None => Ok(Vec::new()),
                Some(error) => Err(clone_error(error)),
            }
        }

        async fn invoke(&self, _request: RemoteRequest) -> std::result::Result<Value, RemoteError> {
            Ok(Value::Null)
        }
    }

    fn clone_error(error: &RemoteError) -> RemoteError {
        match error {
            RemoteError::ConnectTimeout(m) => RemoteError::ConnectTimeout(m.clone()),
            RemoteError::ReadTimeout(m) => RemoteError::ReadTimeout(m.clone()),
            RemoteError::Protocol(m) => RemoteError::Protocol(m.clone()),
            RemoteError::Application { code, message } => RemoteError::Application {
                code: *code,
                message: message.clone(),
            },
            other => panic!("unsupported scripted error {other:?}"),
        }
    }

    /// Hands out services failing per script; `None` entries succeed.
    struct ScriptedConnector {
        script: Mutex<Vec<Option<RemoteError>>>,
        kinds_seen: Mutex<Vec<TransportKind>>,
        opens: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Option<RemoteError>>) -> Self {
            Self {
                script: Mutex::new(script),
                kinds_seen: Mutex::new(Vec::new()),
                opens: Arc::new(AtomicU32::new(0)),
                closes: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            descriptor: &TransportDescriptor,
        ) -> std::result::Result<Box<dyn RemoteService>, RemoteError> {
            self.kinds_seen.lock().unwrap().push(descriptor.kind);
            let outcome = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    None
                } else {
                    script.remove(0)
                }
            };
            Ok(Box::new(ScriptedService {
                outcome,
                opens: self.opens.clone(),
                closes: self.closes.clone(),
            }))
        }
    }

    fn fast_options(attempts: u32, transport: TransportChoice) -> BridgeOptions {
        BridgeOptions {
            url: Some("https://example.com/sse".to_string()),
            probe_retry: RetrySettings::new(attempts, BackoffPolicy::new(0.0)),
            transport,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_probe_success() {
        let connector = ScriptedConnector::new(vec![None]);
        let options = fast_options(3, TransportChoice::Sse);
        let engine = ProbeRetryEngine::new(&options, &connector, HeaderSet::new());
        engine.establish().await.unwrap();
        assert_eq!(connector.kinds_seen.lock().unwrap().as_slice(), &[TransportKind::Sse]);
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let connector = ScriptedConnector::new(vec![
            Some(transient("connect-timeout")),
            Some(transient("read-timeout")),
            None,
        ]);
        let options = fast_options(3, TransportChoice::Sse);
        let engine = ProbeRetryEngine::new(&options, &connector, HeaderSet::new());
        engine.establish().await.unwrap();
        assert_eq!(connector.kinds_seen.lock().unwrap().len(), 3);
        // every probe attempt opened and closed its own session
        assert_eq!(connector.opens.load(Ordering::SeqCst), 3);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_without_auto_is_probe_exhausted() {
        let connector = ScriptedConnector::new(vec![
            Some(transient("connect-timeout")),
            Some(transient("connect-timeout")),
            Some(transient("connect-timeout")),
        ]);
        let options = fast_options(3, TransportChoice::Sse);
        let engine = ProbeRetryEngine::new(&options, &connector, HeaderSet::new());
        let error = engine.establish().await.err().unwrap();
        assert!(matches!(error, Error::ProbeExhausted { attempts: 3, .. }));
        assert_eq!(connector.kinds_seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_auto_switches_once_then_fails() {
        let connector = ScriptedConnector::new(vec![
            Some(transient("protocol")),
            Some(transient("protocol")),
            Some(transient("protocol")),
            Some(transient("protocol")),
        ]);
        let options = fast_options(2, TransportChoice::Auto);
        let engine = ProbeRetryEngine::new(&options, &connector, HeaderSet::new());
        let error = engine.establish().await.err().unwrap();
        assert!(matches!(
            error,
            Error::ProbeExhausted {
                kind: TransportKind::StreamableHttp,
                ..
            }
        ));
        assert_eq!(
            connector.kinds_seen.lock().unwrap().as_slice(),
            &[
                TransportKind::Sse,
                TransportKind::Sse,
                TransportKind::StreamableHttp,
                TransportKind::StreamableHttp,
            ]
        );
    }

    #[tokio::test]
    async fn test_auto_switch_then_success_on_fallback() {
        let connector =
            ScriptedConnector::new(vec![Some(transient("protocol")), None]);
        let options = fast_options(1, TransportChoice::Auto);
        let engine = ProbeRetryEngine::new(&options, &connector, HeaderSet::new());
        engine.establish().await.unwrap();
        assert_eq!(
            connector.kinds_seen.lock().unwrap().as_slice(),
            &[TransportKind::Sse, TransportKind::StreamableHttp]
        );
    }

    #[tokio::test]
    async fn test_non_transient_fatal_despite_remaining_attempts() {
        let connector = ScriptedConnector::new(vec![Some(RemoteError::Application {
            code: -32601,
            message: "unsupported".into(),
        })]);
        let options = fast_options(5, TransportChoice::Auto);
        let engine = ProbeRetryEngine::new(&options, &connector, HeaderSet::new());
        let error = engine.establish().await.err().unwrap();
        assert!(matches!(error, Error::ProbeFatal { .. }));
        assert_eq!(connector.kinds_seen.lock().unwrap().len(), 1);
    }
}
