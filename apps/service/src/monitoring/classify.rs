//! Transport failure classification.
//!
//! A failed request is reduced to one [`ProbeError`] code. Structured information
//! from the error chain (reqwest timeout flag, `io::ErrorKind`) is used first; the
//! rendered chain text only fills in what the HTTP stack does not expose as a type,
//! most notably resolver failures. A connect-phase timeout on an `https` URL is
//! told apart from a plain TCP timeout by retrying the TCP connect alone.
//!
//! Precedence when several signals apply:
//! TLS handshake timeout > DNS failure > connection refused > timeout > exception.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;

use super::types::ProbeError;

const DNS_HINTS: [&str; 6] = [
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "temporary failure in name resolution",
    "nodename nor servname provided",
    "no such host",
];

/// Failure categories observed while walking an error chain
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportSignals {
    pub tls_handshake_timeout: bool,
    pub dns_failure: bool,
    pub connection_refused: bool,
    pub timeout: bool,
}

impl TransportSignals {
    /// Collect signals from an error and all of its sources
    pub fn from_chain(error: &(dyn StdError + 'static)) -> Self {
        let mut signals = Self::default();
        let mut handshake = false;
        let mut current = Some(error);

        while let Some(cause) = current {
            if let Some(io_error) = cause.downcast_ref::<io::Error>() {
                match io_error.kind() {
                    io::ErrorKind::ConnectionRefused => signals.connection_refused = true,
                    io::ErrorKind::TimedOut => signals.timeout = true,
                    _ => {}
                }
            }

            let text = cause.to_string().to_lowercase();
            handshake |= text.contains("handshake");
            signals.dns_failure |= DNS_HINTS.iter().any(|hint| text.contains(hint));
            signals.connection_refused |= text.contains("connection refused");
            signals.timeout |= text.contains("timed out");

            current = cause.source();
        }

        signals.tls_handshake_timeout = handshake && signals.timeout;
        signals
    }

    /// Pick the single code for these signals, falling back to an exception carrying `message`
    pub fn classify(self, message: &str) -> ProbeError {
        if self.tls_handshake_timeout {
            ProbeError::TlsHandshakeTimeout
        } else if self.dns_failure {
            ProbeError::DnsResolutionFailed
        } else if self.connection_refused {
            ProbeError::ConnectionRefused
        } else if self.timeout {
            ProbeError::RequestTimeout
        } else {
            ProbeError::exception(message)
        }
    }
}

/// Classify a failed HTTP request
pub fn classify_transport(error: &reqwest::Error) -> ProbeError {
    let rendered = render_chain(error);
    let mut signals = TransportSignals::from_chain(error);

    if error.is_timeout() {
        signals.timeout = true;
        signals.tls_handshake_timeout |= rendered.to_lowercase().contains("handshake");
    }

    signals.classify(&rendered)
}

/// Classify a failed HTTP request made with a `connect_timeout` budget.
///
/// reqwest reports a stalled TLS handshake only as a connect timeout. When the same
/// host still accepts a bare TCP connection within the budget, the stall was the
/// handshake.
pub async fn classify_request_failure(error: &reqwest::Error, connect_timeout: Duration) -> ProbeError {
    let classified = classify_transport(error);
    if classified != ProbeError::RequestTimeout || !error.is_connect() {
        return classified;
    }

    match error.url().filter(|url| url.scheme() == "https") {
        Some(url) if tcp_connects(url, connect_timeout).await => ProbeError::TlsHandshakeTimeout,
        _ => classified,
    }
}

async fn tcp_connects(url: &reqwest::Url, timeout: Duration) -> bool {
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    matches!(tokio::time::timeout(timeout, TcpStream::connect((host, port))).await, Ok(Ok(_)))
}

/// Render an error and its sources as `outer: inner: root`
pub fn render_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();

    while let Some(cause) = current {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        current = cause.source();
    }

    rendered
}

/// Choose the most useful error among several failed attempts.
///
/// A DNS failure wins wherever it occurred, then a TLS handshake timeout, then a
/// request timeout; otherwise the first error encountered.
pub fn most_informative(errors: &[ProbeError]) -> Option<ProbeError> {
    let preferred = [
        ProbeError::DnsResolutionFailed,
        ProbeError::TlsHandshakeTimeout,
        ProbeError::RequestTimeout,
    ];

    preferred
        .into_iter()
        .find(|wanted| errors.contains(wanted))
        .or_else(|| errors.first().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    /// Minimal error with an optional source, standing in for the HTTP stack's wrappers
    #[derive(Debug)]
    struct Wrapped {
        message: &'static str,
        source: Option<Box<dyn StdError + 'static>>,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source.as_deref()
        }
    }

    fn wrap(message: &'static str, source: impl StdError + 'static) -> Wrapped {
        Wrapped { message, source: Some(Box::new(source)) }
    }

    fn leaf(message: &'static str) -> Wrapped {
        Wrapped { message, source: None }
    }

    fn classify(error: &Wrapped) -> ProbeError {
        TransportSignals::from_chain(error).classify(&render_chain(error))
    }

    #[test]
    fn test_refused_from_io_kind() {
        let error = wrap(
            "error sending request",
            wrap("tcp connect error", io::Error::from(io::ErrorKind::ConnectionRefused)),
        );
        assert_eq!(classify(&error), ProbeError::ConnectionRefused);
    }

    #[test]
    fn test_timeout_from_io_kind() {
        let error = wrap("error sending request", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(classify(&error), ProbeError::RequestTimeout);
    }

    #[test]
    fn test_dns_from_resolver_text() {
        let error = wrap(
            "error sending request",
            wrap(
                "dns error",
                io::Error::other("failed to lookup address information: Name or service not known"),
            ),
        );
        assert_eq!(classify(&error), ProbeError::DnsResolutionFailed);

        let error = leaf("Temporary failure in name resolution");
        assert_eq!(classify(&error), ProbeError::DnsResolutionFailed);
    }

    #[test]
    fn test_tls_handshake_timeout_beats_everything() {
        let error = wrap(
            "the handshake operation timed out",
            wrap("dns error", io::Error::from(io::ErrorKind::ConnectionRefused)),
        );
        assert_eq!(classify(&error), ProbeError::TlsHandshakeTimeout);
    }

    #[test]
    fn test_dns_beats_refused_and_timeout() {
        let error = wrap("request timed out", wrap("Connection refused", leaf("dns error")));
        assert_eq!(classify(&error), ProbeError::DnsResolutionFailed);
    }

    #[test]
    fn test_refused_beats_timeout() {
        let error = wrap("operation timed out", leaf("Connection refused"));
        assert_eq!(classify(&error), ProbeError::ConnectionRefused);
    }

    #[test]
    fn test_handshake_without_timeout_is_exception() {
        let error = leaf("tls handshake failure: bad certificate");
        assert_eq!(
            classify(&error),
            ProbeError::Exception("tls handshake failure: bad certificate".into())
        );
    }

    #[test]
    fn test_unknown_failure_keeps_rendered_chain() {
        let error = wrap("builder error", leaf("relative URL without a base"));
        assert_eq!(
            classify(&error),
            ProbeError::Exception("builder error: relative URL without a base".into())
        );
    }

    #[test]
    fn test_most_informative_prefers_dns_regardless_of_order() {
        let dns = ProbeError::DnsResolutionFailed;
        let tls = ProbeError::TlsHandshakeTimeout;
        let other = ProbeError::exception("boom");

        for attempts in [
            vec![dns.clone(), tls.clone(), other.clone()],
            vec![other.clone(), tls.clone(), dns.clone()],
            vec![tls.clone(), other.clone(), dns.clone()],
        ] {
            assert_eq!(most_informative(&attempts), Some(dns.clone()));
        }
    }

    #[test]
    fn test_most_informative_fallbacks() {
        assert_eq!(
            most_informative(&[
                ProbeError::ConnectionRefused,
                ProbeError::RequestTimeout,
                ProbeError::TlsHandshakeTimeout,
            ]),
            Some(ProbeError::TlsHandshakeTimeout)
        );
        assert_eq!(
            most_informative(&[ProbeError::ConnectionRefused, ProbeError::RequestTimeout]),
            Some(ProbeError::RequestTimeout)
        );
        assert_eq!(
            most_informative(&[ProbeError::exception("first"), ProbeError::ConnectionRefused]),
            Some(ProbeError::exception("first"))
        );
        assert_eq!(most_informative(&[]), None);
    }

    #[tokio::test]
    async fn test_refused_connection_against_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let error = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/status"))
            .send()
            .await
            .unwrap_err();

        assert_eq!(classify_transport(&error), ProbeError::ConnectionRefused);
    }
}
