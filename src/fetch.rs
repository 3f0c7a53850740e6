//! [`fetch::get`](get)

use std::{future::Future, io, sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use rustls::pki_types::ServerName;
use tokio::{net::TcpStream, io::{AsyncRead, AsyncWriteExt, AsyncReadExt}};
use tokio_rustls::{rustls, TlsConnector};

use crate::wkd::WkdUrl;

/// TLS connector, validating against the webpki roots.
static CONNECTOR: Lazy<TlsConnector> = Lazy::new(|| {
	let mut root_store = rustls::RootCertStore::empty();
	root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
	let client_config = rustls::ClientConfig::builder()
		.with_root_certificates(root_store)
		.with_no_client_auth();
	TlsConnector::from(Arc::new(client_config))
});

/// Request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
	/// Bound on a whole request: connect, handshake, and read.
	pub timeout: Duration,
	/// Bound on the raw response size, headers included.
	pub max_response: usize,
}

impl Default for Limits {
	fn default() -> Self {
		Self { timeout: Duration::from_secs(10), max_response: 1 << 20 }
	}
}

/// A complete HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
	pub status: u16,
	raw: Vec<u8>,
	body: usize,
}

impl Response {
	/// Splits a raw response.
	pub fn from_raw(raw: Vec<u8>) -> Result<Self, ErrorProcess> {
		let (status, body) = process_status(&raw)?;
		Ok(Self { status, raw, body })
	}

	pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

	pub fn body(&self) -> &[u8] { &self.raw[self.body..] }

	pub fn into_body(mut self) -> Vec<u8> {
		self.raw.drain(..self.body);
		self.raw
	}
}

/// Carries WKD requests.
pub trait Transport {
	fn get(&self, url: &WkdUrl, limits: &Limits) -> impl Future<Output = Result<Response, ErrorFetch>>;
}

/// [`get`] over TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Https;

impl Transport for Https {
	fn get(&self, url: &WkdUrl, limits: &Limits) -> impl Future<Output = Result<Response, ErrorFetch>> { get(url, limits) }
}

/// Performs an HTTPS `GET` on the URL.
///
/// HTTP/1.0 is used so the body arrives unchunked and ends with the connection.
pub async fn get(url: &WkdUrl, limits: &Limits) -> Result<Response, ErrorFetch> {
	let raw = bounded(limits.timeout, get_raw(url, limits.max_response)).await?;
	Ok(Response::from_raw(raw)?)
}

/// Fails a request with [`ErrorFetch::Timeout`] once `timeout` elapses.
async fn bounded<T>(timeout: Duration, request: impl Future<Output = Result<T, ErrorFetch>>) -> Result<T, ErrorFetch> {
	tokio::time::timeout(timeout, request).await.map_err(|_| ErrorFetch::Timeout(timeout))?
}

async fn get_raw(url: &WkdUrl, max_response: usize) -> Result<Vec<u8>, ErrorFetch> {
	let server_name = ServerName::try_from(url.host.clone()).map_err(|_| ErrorFetch::ServerName(url.host.clone()))?;
	let stream = TcpStream::connect((url.host.as_str(), 443)).await.map_err(ErrorFetch::Connect)?;
	let mut stream = CONNECTOR.connect(server_name, stream).await.map_err(ErrorFetch::Tls)?;
	let request = format!(
		"GET {} HTTP/1.0\r\nHost: {}\r\nAccept: application/octet-stream\r\nUser-Agent: {}/{}\r\nConnection: close\r\n\r\n",
		url.path, url.host, env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"),
	);
	stream.write_all(request.as_bytes()).await.map_err(ErrorFetch::RequestWrite)?;
	read_response(&mut stream, max_response).await
}

/// Reads until the connection ends, or fails past `max_response` bytes.
async fn read_response(stream: &mut (impl AsyncRead + Unpin), max_response: usize) -> Result<Vec<u8>, ErrorFetch> {
	let mut response = Vec::with_capacity(8 << 10);
	let mut chunk = [0u8; 8 << 10];
	loop {
		match stream.read(&mut chunk).await {
			Ok(0) => break,
			Ok(n) => {
				response.extend_from_slice(&chunk[..n]);
				if response.len() > max_response { return Err(ErrorFetch::TooLarge(max_response)); }
			},
			// Servers commonly close without a TLS close_notify once the body is sent.
			Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !response.is_empty() => break,
			Err(e) => return Err(ErrorFetch::ResponseRead(e)),
		}
	}
	Ok(response)
}

/// Error when fetching a URL.
#[derive(Debug, thiserror::Error)]
pub enum ErrorFetch {
	#[error("invalid DNS name '{0}'")]
	ServerName(String),
	#[error("TCP connection error: {0}")]
	Connect(io::Error),
	#[error("TLS connection error: {0}")]
	Tls(io::Error),
	#[error("failed to write request: {0}")]
	RequestWrite(io::Error),
	#[error("failed to read response: {0}")]
	ResponseRead(io::Error),
	#[error("response exceeds {0} bytes")]
	TooLarge(usize),
	#[error("timed out after {0:?}")]
	Timeout(Duration),
	#[error("HTTP process error: {0}")]
	Process(#[from] ErrorProcess),
}

/// Yields a tuple of the status code, and the [`body`] index.
pub fn process_status(response: &[u8]) -> Result<(u16, usize), ErrorProcess> {
	if !response.starts_with(b"HTTP/") { return Err(ErrorProcess::StatusLine); }
	let line_end = memchr::memchr(b'\n', response).ok_or(ErrorProcess::StatusLine)?;
	let line = &response[..line_end];
	let code = memchr::memchr(b' ', line).ok_or(ErrorProcess::StatusLine)? + 1;
	let digits = line[code..].iter().take_while(|c| c.is_ascii_digit()).count();
	if digits != 3 { return Err(ErrorProcess::StatusLine); }
	let status = atoi::atoi(&line[code..code + digits]).ok_or(ErrorProcess::StatusLine)?;
	let body = body(response).ok_or(ErrorProcess::Body)?;
	Ok((status, body))
}

/// Gets the body index of an HTTP response.
pub fn body(response: &[u8]) -> Option<usize> {
	use memchr::memmem;
	let crlfcrlf = b"\r\n\r\n";
	memmem::find(response, crlfcrlf).map(|n| n + crlfcrlf.len())
}

/// Error when processing a response.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorProcess {
	#[error("malformed status line")]
	StatusLine,
	#[error("couldn't find response body")]
	Body,
}
