//! HTTP transport: ranged GETs streamed to disk.
//!
//! One [`reqwest::Client`] is built per pool (or per standalone
//! [`FileTransfer`](super::FileTransfer)) and reused across transfers for
//! connection pooling. Credentials are applied preemptively per request via
//! basic auth, never through any process-wide state.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use url::Url;

use super::credentials::Credentials;
use super::engine::ProgressCallback;
use super::error::TransferError;

/// Builds the HTTP client used for every transfer sharing one configuration.
///
/// `timeout` bounds both the connect phase and each body read.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, TransferError> {
    Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| TransferError::config(format!("failed to build HTTP client: {e}")))
}

/// Resolves the remote file size with a one-byte ranged GET.
///
/// A 206 (or 416) answer carries the total in `Content-Range`; servers
/// without range support answer 200 and the total is taken from
/// `Content-Length` without reading the body. `None` when the server does
/// not report a size either way.
pub(crate) async fn probe_size(
    client: &Client,
    url: &Url,
    credentials: Option<&Credentials>,
) -> Result<Option<u64>, TransferError> {
    let request = apply_auth(client.get(url.clone()), credentials).header(RANGE, "bytes=0-0");
    let response = request
        .send()
        .await
        .map_err(|e| map_send_error(url.as_str(), e))?;

    let status = response.status();
    if status == StatusCode::PARTIAL_CONTENT || status == StatusCode::RANGE_NOT_SATISFIABLE {
        Ok(content_range_total(&response))
    } else if status.is_success() {
        Ok(response.content_length())
    } else {
        Err(map_status(url.as_str(), status))
    }
}

/// Streams the remote body into `dest` starting at `offset`.
///
/// `offset` zero truncates/creates the destination; a non-zero offset sends
/// `Range: bytes=<offset>-` and appends. A server that ignores the range
/// request and replays the whole body (200 instead of 206) restarts the
/// file from scratch rather than appending duplicate bytes.
///
/// Returns the total number of bytes present locally after the call.
pub(crate) async fn fetch(
    client: &Client,
    url: &Url,
    credentials: Option<&Credentials>,
    dest: &Path,
    offset: u64,
    progress: Option<&ProgressCallback>,
) -> Result<u64, TransferError> {
    let mut request = apply_auth(client.get(url.clone()), credentials);
    if offset > 0 {
        request = request.header(RANGE, format!("bytes={offset}-"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_send_error(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        if offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            // The server has nothing past our offset; the file is complete.
            debug!(url = %url, offset, "requested range unsatisfiable; treating as complete");
            return Ok(offset);
        }
        return Err(map_status(url.as_str(), status));
    }

    let resumed = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
    let (file, mut transferred) = if resumed {
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(dest)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        (file, offset)
    } else {
        if offset > 0 {
            warn!(url = %url, offset, "server ignored range request; restarting from scratch");
        }
        let file = File::create(dest)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        (file, 0)
    };

    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    while let Some(next) = stream.next().await {
        let chunk = next.map_err(|e| map_send_error(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        transferred += chunk.len() as u64;
        if let Some(progress) = progress {
            progress(transferred);
        }
    }

    // Ensure all data is flushed to disk before reporting completion.
    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(dest, e))?;

    Ok(transferred)
}

/// Applies preemptive basic auth scoped to this single request.
fn apply_auth(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(credentials) => request.basic_auth(credentials.username(), Some(credentials.password())),
        None => request,
    }
}

/// Maps a send/stream error to the transfer taxonomy.
fn map_send_error(url: &str, error: reqwest::Error) -> TransferError {
    if error.is_timeout() {
        TransferError::timeout(url)
    } else {
        TransferError::network(url, error)
    }
}

/// Maps a non-success HTTP status to the transfer taxonomy.
fn map_status(url: &str, status: StatusCode) -> TransferError {
    match status.as_u16() {
        404 | 410 => TransferError::not_found(url, status.as_u16()),
        401 | 403 | 407 => TransferError::auth_required(url, status.as_u16()),
        code => TransferError::http_status(url, code),
    }
}

/// Extracts the total length from a `Content-Range` header
/// (`bytes 0-0/12345` or `bytes */12345`).
fn content_range_total(response: &Response) -> Option<u64> {
    let value = response.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    parse_content_range_total(value)
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    let total = value.rsplit('/').next()?.trim();
    total.parse().ok()
}
