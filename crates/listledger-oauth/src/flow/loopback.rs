//! Loopback HTTP listener for the `OAuth2` redirect.
//!
//! A desktop-class client cannot receive an HTTPS redirect, so the
//! authorization server is pointed at `http://127.0.0.1:<port>/<path>`
//! and this listener accepts exactly one connection, answers it with a
//! static HTML page, and hands the query parameters back to the flow.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Query parameters delivered by the authorization server redirect.
///
/// The same payload can arrive through an externally delivered deep link;
/// both paths feed [`crate::LoginFlow::complete`].
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// Authorization code (empty when the server reported an error).
    pub code: String,
    /// Returned CSRF state.
    pub state: String,
    /// Error code reported by the authorization server, if any.
    pub error: Option<String>,
}

const SUCCESS_BODY: &str =
    "<html><body><h3>Login complete</h3><p>You can return to listledger.</p></body></html>";
const FAILURE_BODY: &str =
    "<html><body><h3>Login failed</h3><p>callback path mismatch</p></body></html>";

/// Waits for the single redirect request on `host:port`.
///
/// Exactly one connection is serviced and the listener is torn down
/// afterward regardless of outcome. Dropping the returned future closes
/// the socket, so an abandoned attempt frees the port for the next one.
///
/// # Errors
///
/// - [`Error::Timeout`] when no connection arrives within `timeout`
/// - [`Error::CallbackRejected`] when the one request did not target
///   `expected_path`
/// - [`Error::Io`] for any other socket fault
pub async fn await_callback(
    host: &str,
    port: u16,
    expected_path: &str,
    timeout: Duration,
) -> Result<CallbackParams> {
    let listener = TcpListener::bind((host, port)).await?;
    debug!(host, port, expected_path, "loopback listener bound");

    let (stream, peer) = tokio::time::timeout(timeout, listener.accept())
        .await
        .map_err(|_| Error::Timeout(timeout.as_secs()))??;
    debug!(%peer, "loopback connection accepted");

    serve_one(stream, host, port, expected_path).await
}

async fn serve_one(
    stream: TcpStream,
    host: &str,
    port: u16,
    expected_path: &str,
) -> Result<CallbackParams> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    loop {
        let mut header = String::new();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header.trim().is_empty() {
            break;
        }
    }

    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();
    let request_url = Url::parse(&format!("http://{host}:{port}{target}"));
    let path_ok = request_url
        .as_ref()
        .is_ok_and(|u| u.path() == expected_path);

    let body = if path_ok { SUCCESS_BODY } else { FAILURE_BODY };
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    if !path_ok {
        warn!(%target, expected_path, "loopback request did not match callback path");
        return Err(Error::CallbackRejected(format!(
            "unexpected request target {target:?}"
        )));
    }

    // Url::parse succeeded if path_ok is true.
    let url = request_url?;
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = value.into_owned(),
            "state" => params.state = value.into_owned(),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}
