use crate::error::OrderServiceError;
use crate::order::Order;
use crate::router::RouteRequest;
use bytes::BytesMut;
use http::header::CONTENT_LENGTH;
use http::Method;
use httparse::Status;
use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
#[cfg(feature = "trace")]
use tracing::instrument;

pub const MAX_REQUEST_LINE: usize = 8 * 1024;
pub const MAX_HEAD_SIZE: usize = 16 * 1024;
pub const MAX_BODY_SIZE: usize = 64 * 1024;
const HEADERS_CAPACITY: usize = 32;

/// What the front-end knows about a request: the request line, plus the JSON
/// body when the request is a `POST` to the order collection.
#[derive(Debug)]
pub struct OrderRequest {
    /// Raw method token. Routing never rejects a method, so it is not validated.
    pub method: String,
    pub path: String,
    pub payload: Option<Order>,
}

impl OrderRequest {
    pub fn as_route(&self) -> RouteRequest<'_> {
        RouteRequest::new(&self.method, &self.path).with_payload(self.payload.as_ref())
    }

    fn wants_payload(&self) -> bool {
        self.method == Method::POST.as_str() && (self.path == "/orders" || self.path == "/orders/")
    }
}

#[cfg_attr(feature = "trace", instrument(level = "trace", skip_all))]
pub async fn read_request<R>(reader: &mut R) -> Result<OrderRequest, OrderServiceError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_request_line(reader).await?;
    let mut request = parse_request_line(&line)?;
    if request.wants_payload() {
        request.payload = read_payload(reader).await?;
    }
    Ok(request)
}

/// Reads one CRLF- or LF-terminated line. Bytes that are not UTF-8 are replaced
/// rather than refused.
pub async fn read_request_line<R>(reader: &mut R) -> Result<String, OrderServiceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::with_capacity(128);
    let n = (&mut *reader)
        .take(MAX_REQUEST_LINE as u64)
        .read_until(b'\n', &mut raw)
        .await?;
    if n == MAX_REQUEST_LINE && !raw.ends_with(b"\n") {
        return Err(OrderServiceError::RequestLineTooLong);
    }
    let line = String::from_utf8_lossy(&raw);
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(OrderServiceError::EmptyRequest);
    }
    Ok(trimmed.to_string())
}

/// Splits `METHOD PATH VERSION` on single spaces. The version is ignored.
pub fn parse_request_line(line: &str) -> Result<OrderRequest, OrderServiceError> {
    let mut parts = line.split(' ');
    let method = parts.next().unwrap_or_default();
    let path = match parts.next() {
        Some(path) => path,
        None => {
            return Err(OrderServiceError::IncompleteRequestLine {
                line: line.to_string(),
            })
        }
    };
    Ok(OrderRequest {
        method: method.to_string(),
        path: path.to_string(),
        payload: None,
    })
}

// Reads the rest of the head, then `Content-Length` bytes of body. A body that is
// missing or not an order yields `None`.
async fn read_payload<R>(reader: &mut R) -> Result<Option<Order>, OrderServiceError>
where
    R: AsyncBufRead + Unpin,
{
    let head = match read_head(reader).await? {
        Some(head) => head,
        None => return Ok(None),
    };

    let mut headers = [httparse::EMPTY_HEADER; HEADERS_CAPACITY];
    let content_length = match httparse::parse_headers(&head, &mut headers)? {
        Status::Complete((_, headers)) => headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()))
            .map(|h| String::from_utf8_lossy(h.value).trim().parse::<usize>())
            .transpose()?
            .unwrap_or(0),
        Status::Partial => return Ok(None),
    };
    if content_length == 0 {
        return Ok(None);
    }
    if content_length > MAX_BODY_SIZE {
        return Err(OrderServiceError::PayloadTooLarge {
            length: content_length,
        });
    }

    let mut body = BytesMut::zeroed(content_length);
    reader.read_exact(&mut body).await?;
    match serde_json::from_slice::<Order>(&body) {
        Ok(order) => Ok(Some(order)),
        Err(err) => {
            debug!("Ignoring request body: {}", err);
            Ok(None)
        }
    }
}

// Header lines up to and including the blank line. `None` when the peer hangs up first.
async fn read_head<R>(reader: &mut R) -> Result<Option<Vec<u8>>, OrderServiceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    loop {
        let start = head.len();
        let limit = (MAX_HEAD_SIZE - start) as u64;
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut head).await?;
        if n == 0 {
            return Ok(None);
        }
        let line = &head[start..];
        if line == b"\r\n" || line == b"\n" {
            return Ok(Some(head));
        }
        if head.len() >= MAX_HEAD_SIZE {
            return Err(OrderServiceError::HeadTooLarge);
        }
    }
}
