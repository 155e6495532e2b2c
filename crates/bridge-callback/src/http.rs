//! HTTP/1.1 mínimo para el servidor de callbacks.
//!
//! Una petición por conexión (`Connection: close`), cuerpo delimitado por
//! `Content-Length`. Es lo único que emite el cliente HTTP del hijo.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
pub enum HttpError {
    Malformed(String),
    TooLarge(usize),
    Io(std::io::Error),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Malformed(m) => write!(f, "malformed request: {m}"),
            HttpError::TooLarge(n) => write!(f, "request body of {n} bytes exceeds {MAX_BODY_BYTES}"),
            HttpError::Io(e) => write!(f, "i/o: {e}"),
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(e: std::io::Error) -> Self {
        HttpError::Io(e)
    }
}

pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<HttpRequest, HttpError> {
    let mut head_bytes = 0usize;
    let request_line = read_head_line(reader, &mut head_bytes).await?;
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v)) => (m.to_string(), t.to_string(), v),
        _ => return Err(HttpError::Malformed(format!("bad request line '{request_line}'"))),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported version {version}")));
    }

    let mut headers = Vec::new();
    loop {
        let line = read_head_line(reader, &mut head_bytes).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')
                                .ok_or_else(|| HttpError::Malformed(format!("bad header line '{line}'")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut req = HttpRequest { method,
                                path: target.split('?').next().unwrap_or_default().to_string(),
                                headers,
                                body: Vec::new() };
    if req.header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        return Err(HttpError::Malformed("chunked transfer encoding is not supported".into()));
    }
    let len = match req.header("content-length") {
        Some(v) => v.parse::<usize>()
                    .map_err(|_| HttpError::Malformed(format!("bad content-length '{v}'")))?,
        None => 0,
    };
    if len > MAX_BODY_BYTES {
        return Err(HttpError::TooLarge(len));
    }
    req.body = vec![0u8; len];
    reader.read_exact(&mut req.body).await?;
    Ok(req)
}

async fn read_head_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>, used: &mut usize) -> Result<String, HttpError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(HttpError::Malformed("connection closed before end of headers".into()));
    }
    *used += n;
    if *used > MAX_HEAD_BYTES {
        return Err(HttpError::Malformed("request head too large".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

pub async fn write_json<W: AsyncWrite + Unpin>(writer: &mut W, status: u16, body: &Value) -> std::io::Result<()> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let head = format!("HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                       reason_phrase(status),
                       payload.len());
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}
