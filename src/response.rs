use crate::error::OrderServiceError;
use crate::request::OrderRequest;
use bytes::Bytes;
use http::{Response, StatusCode};
use log::info;
use tokio::io::{AsyncWrite, AsyncWriteExt};
#[cfg(feature = "trace")]
use tracing::instrument;

/// Sent with every response, in this order.
pub const ENVELOPE_HEADERS: [(&str, &str); 5] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type, Authorization"),
    ("Connection", "close"),
];

/// Every routed body goes out as `200 OK`, matched or not.
pub fn json_response(body: Bytes) -> Response<Bytes> {
    Response::new(body)
}

#[cfg_attr(feature = "trace", instrument(level = "trace", skip_all))]
pub async fn send_response<S>(
    socket: &mut S,
    response: Response<Bytes>,
) -> Result<(), OrderServiceError>
where
    S: AsyncWrite + Unpin,
{
    let (parts, body) = response.into_parts();

    // Estimate capacity to reduce reallocations
    let mut resp_bytes = Vec::with_capacity(256 + body.len());
    resp_bytes.extend_from_slice(b"HTTP/1.1 ");
    let mut itoa_buf = itoa::Buffer::new();
    resp_bytes.extend_from_slice(itoa_buf.format(parts.status.as_u16()).as_bytes());
    resp_bytes.extend_from_slice(b" ");
    resp_bytes.extend_from_slice(parts.status.canonical_reason().unwrap_or("").as_bytes());
    resp_bytes.extend_from_slice(b"\r\n");

    for (key, value) in ENVELOPE_HEADERS.iter() {
        resp_bytes.extend_from_slice(key.as_bytes());
        resp_bytes.extend_from_slice(b": ");
        resp_bytes.extend_from_slice(value.as_bytes());
        resp_bytes.extend_from_slice(b"\r\n");
    }

    resp_bytes.extend_from_slice(b"\r\n");
    resp_bytes.extend_from_slice(&body);

    socket.write_all(&resp_bytes).await?;
    socket.flush().await?;

    Ok(())
}

/// Responses are always `200 OK`, so that is what gets logged.
pub fn log_request_response(request: &OrderRequest) {
    info!(
        "Request: {} {} {}",
        request.method,
        request.path,
        StatusCode::OK.as_u16()
    );
}
