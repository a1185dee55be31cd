//! FTP transport: `REST`/`RETR` transfers through a blocking session.
//!
//! `suppaftp` exposes a synchronous control/data connection, so every FTP
//! operation runs under [`tokio::task::spawn_blocking`]. Each call opens a
//! fresh authenticated session (anonymous login when no credentials are
//! given), `CWD`s into the remote directory, switches to binary mode and
//! streams the file in fixed-size chunks.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use suppaftp::FtpStream;
use suppaftp::Status;
use suppaftp::types::{FileType, FtpError};
use tracing::debug;
use url::Url;

use super::credentials::Credentials;
use super::engine::ProgressCallback;
use super::error::TransferError;
use super::filename;

/// FTP control-connection port when the URL does not name one.
const DEFAULT_PORT: u16 = 21;

/// Protocol-agnostic streaming buffer size.
const CHUNK_SIZE: usize = 8 * 1024;

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASS: &str = "anonymous@";

/// Resolves the remote file size via `SIZE`.
///
/// `None` when the server refuses or does not implement `SIZE`.
pub(crate) async fn probe_size(
    url: &Url,
    credentials: Option<&Credentials>,
    timeout: Duration,
) -> Result<Option<u64>, TransferError> {
    let url = url.clone();
    let credentials = credentials.cloned();
    let url_text = url.to_string();
    tokio::task::spawn_blocking(move || probe_size_blocking(&url, credentials.as_ref(), timeout))
        .await
        .map_err(|e| TransferError::network(url_text, e))?
}

/// Streams the remote file into `dest` starting at `offset`.
///
/// A non-zero offset issues `REST <offset>` before `RETR` and appends to
/// the existing file. Returns the total number of bytes present locally
/// after the call.
pub(crate) async fn fetch(
    url: &Url,
    credentials: Option<&Credentials>,
    dest: &Path,
    offset: u64,
    timeout: Duration,
    progress: Option<ProgressCallback>,
) -> Result<u64, TransferError> {
    let url = url.clone();
    let credentials = credentials.cloned();
    let dest = dest.to_path_buf();
    let url_text = url.to_string();
    tokio::task::spawn_blocking(move || {
        fetch_blocking(&url, credentials.as_ref(), &dest, offset, timeout, progress)
    })
    .await
    .map_err(|e| TransferError::network(url_text, e))?
}

fn probe_size_blocking(
    url: &Url,
    credentials: Option<&Credentials>,
    timeout: Duration,
) -> Result<Option<u64>, TransferError> {
    let name = filename_for(url)?;
    let mut session = open_session(url, credentials, timeout)?;
    let size = match session.size(&name) {
        Ok(size) => Some(size as u64),
        Err(FtpError::UnexpectedResponse(response))
            if response.status == Status::FileUnavailable =>
        {
            return Err(TransferError::not_found(url.as_str(), 550));
        }
        // SIZE is an extension; treat refusal as "unknown".
        Err(FtpError::UnexpectedResponse(_)) => None,
        Err(error) => return Err(map_ftp_error(url.as_str(), error)),
    };
    let _ = session.quit();
    Ok(size)
}

fn fetch_blocking(
    url: &Url,
    credentials: Option<&Credentials>,
    dest: &Path,
    offset: u64,
    timeout: Duration,
    progress: Option<ProgressCallback>,
) -> Result<u64, TransferError> {
    let name = filename_for(url)?;
    let mut session = open_session(url, credentials, timeout)?;

    if offset > 0 {
        let rest = usize::try_from(offset)
            .map_err(|_| TransferError::config("resume offset exceeds platform address size"))?;
        session
            .resume_transfer(rest)
            .map_err(|e| map_ftp_error(url.as_str(), e))?;
        debug!(url = %url, offset, "issued REST before RETR");
    }

    let mut data = session
        .retr_as_stream(&name)
        .map_err(|e| map_ftp_error(url.as_str(), e))?;

    let file = if offset > 0 {
        std::fs::OpenOptions::new().append(true).open(dest)
    } else {
        File::create(dest)
    }
    .map_err(|e| TransferError::io(dest, e))?;
    let mut writer = BufWriter::new(file);

    let mut transferred = offset;
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = data
            .read(&mut buffer)
            .map_err(|e| map_read_error(url.as_str(), e))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|e| TransferError::io(dest, e))?;
        transferred += read as u64;
        if let Some(progress) = &progress {
            progress(transferred);
        }
    }

    writer
        .flush()
        .map_err(|e| TransferError::io(dest, e))?;
    session
        .finalize_retr_stream(data)
        .map_err(|e| map_ftp_error(url.as_str(), e))?;
    let _ = session.quit();

    Ok(transferred)
}

/// Connects, authenticates, `CWD`s into the remote directory and switches
/// to binary transfer mode.
fn open_session(
    url: &Url,
    credentials: Option<&Credentials>,
    timeout: Duration,
) -> Result<FtpStream, TransferError> {
    let address = resolve_address(url)?;
    let mut session = FtpStream::connect_timeout(address, timeout)
        .map_err(|e| map_ftp_error(url.as_str(), e))?;
    session
        .get_ref()
        .set_read_timeout(Some(timeout))
        .map_err(|e| TransferError::network(url.as_str(), e))?;

    match credentials {
        Some(credentials) => session.login(credentials.username(), credentials.password()),
        None => session.login(ANONYMOUS_USER, ANONYMOUS_PASS),
    }
    .map_err(|e| map_ftp_error(url.as_str(), e))?;

    if let Some(directory) = filename::remote_directory(url) {
        session
            .cwd(&directory)
            .map_err(|e| map_ftp_error(url.as_str(), e))?;
    }

    session
        .transfer_type(FileType::Binary)
        .map_err(|e| map_ftp_error(url.as_str(), e))?;

    Ok(session)
}

fn resolve_address(url: &Url) -> Result<SocketAddr, TransferError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransferError::invalid_url(url.as_str()))?;
    let port = url.port().unwrap_or(DEFAULT_PORT);
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TransferError::network(url.as_str(), e))?
        .next()
        .ok_or_else(|| {
            TransferError::network(
                url.as_str(),
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "hostname resolved to no addresses",
                ),
            )
        })
}

fn filename_for(url: &Url) -> Result<String, TransferError> {
    filename::filename_from_url(url).ok_or_else(|| TransferError::invalid_url(url.as_str()))
}

/// Maps a control-connection error to the transfer taxonomy.
fn map_ftp_error(url: &str, error: FtpError) -> TransferError {
    if let FtpError::UnexpectedResponse(response) = &error {
        match response.status {
            Status::FileUnavailable => return TransferError::not_found(url, 550),
            Status::NotLoggedIn => return TransferError::auth_required(url, 530),
            _ => {}
        }
    }
    if let FtpError::ConnectionError(io_error) = &error
        && is_timeout_kind(io_error.kind())
    {
        return TransferError::timeout(url);
    }
    TransferError::network(url, error)
}

/// Maps a data-connection read error to the transfer taxonomy.
fn map_read_error(url: &str, error: std::io::Error) -> TransferError {
    if is_timeout_kind(error.kind()) {
        TransferError::timeout(url)
    } else {
        TransferError::network(url, error)
    }
}

// Read timeouts surface as WouldBlock on Unix sockets.
fn is_timeout_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}
