use crate::error::OrderServiceError;
use crate::request::read_request;
use crate::response::{json_response, log_request_response, send_response};
use crate::router::route;
use log::{debug, error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::time::timeout;
#[cfg(feature = "trace")]
use tracing::instrument;

pub const PORT: u16 = 8080;
/// Deadline for receiving the request line (and a POST body, when one is read).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);
const MAX_DRAIN: usize = 64 * 1024;

pub struct OrderServer {
    listener: TcpListener,
}

impl OrderServer {
    #[cfg_attr(feature = "trace", instrument(level = "trace", skip_all))]
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, OrderServiceError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(OrderServer { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, OrderServiceError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` resolves. Every connection gets its own
    /// task; tasks already running are left to finish after the listener is dropped.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), OrderServiceError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(async move {
                            if let Err(err) = connection_process(stream).await {
                                if err.is_silent() {
                                    debug!("Closed {} without response: {}", addr, err);
                                } else {
                                    error!("Error: {} ({})", err, addr);
                                }
                            }
                        });
                    }
                    // Transient (e.g. out of file descriptors); keep serving.
                    Err(err) => error!("Accept error: {}", err),
                }
            }
        }
    }
}

#[cfg_attr(feature = "trace", instrument(level = "trace", skip_all))]
pub async fn connection_process<S>(stream: S) -> Result<(), OrderServiceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let request = timeout(REQUEST_TIMEOUT, read_request(&mut reader))
        .await
        .map_err(|err| OrderServiceError::ReadTimeout {
            details: err.to_string(),
        })??;

    let body = route(&request.as_route())?;

    let socket = reader.get_mut();
    send_response(socket, json_response(body)).await?;
    log_request_response(&request);
    socket.shutdown().await?;

    // Unread headers or body left in the receive buffer turn the close into a reset,
    // which can discard the response on the client side.
    let drained = drain_unread(&mut reader).await;
    if drained > 0 {
        debug!("Discarded {} unread request bytes", drained);
    }
    Ok(())
}

async fn drain_unread<R>(reader: &mut R) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut drained = 0;
    while drained < MAX_DRAIN {
        match timeout(DRAIN_TIMEOUT, reader.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => drained += n,
            _ => break,
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use crate::error::OrderServiceError;
    use crate::server::{connection_process, drain_unread, OrderServer};
    use chrono::{DateTime, Utc};
    use std::error::Error;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, Duration};

    const ORDERS_BODY: &str = r#"[{"id":1,"orderNumber":"ORD-001","total":150.00,"status":"PENDING"},{"id":2,"orderNumber":"ORD-002","total":299.99,"status":"COMPLETED"},{"id":3,"orderNumber":"ORD-003","total":75.50,"status":"SHIPPED"}]"#;
    const HEAD: &str = "HTTP/1.1 200 OK\r\n\
        Content-Type: application/json\r\n\
        Access-Control-Allow-Origin: *\r\n\
        Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
        Access-Control-Allow-Headers: Content-Type, Authorization\r\n\
        Connection: close\r\n\
        \r\n";

    async fn start() -> Result<(SocketAddr, oneshot::Sender<()>), Box<dyn Error>> {
        let server = OrderServer::bind("127.0.0.1:0").await?;
        let addr = server.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async move {
            let _ = rx.await;
        }));
        Ok((addr, tx))
    }

    async fn exchange(addr: SocketAddr, request: &str) -> Result<String, Box<dyn Error>> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(request.as_bytes()).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(String::from_utf8(response)?)
    }

    fn body(response: &str) -> Result<&str, Box<dyn Error>> {
        let body = response.strip_prefix(HEAD).ok_or("unexpected status line or headers")?;
        Ok(body)
    }

    #[tokio::test]
    async fn test_scenarios() -> Result<(), Box<dyn Error>> {
        let (addr, _shutdown) = start().await?;

        let response = exchange(addr, "GET /orders/ HTTP/1.1\r\nHost: localhost\r\n\r\n").await?;
        assert_eq!(body(&response)?, ORDERS_BODY);

        let response = exchange(addr, "GET /orders HTTP/1.1\r\n\r\n").await?;
        assert_eq!(body(&response)?, ORDERS_BODY);

        let response = exchange(addr, "GET /orders/42 HTTP/1.1\r\n\r\n").await?;
        assert_eq!(
            body(&response)?,
            r#"{"id":42,"orderNumber":"ORD-042","total":99.99,"status":"PENDING"}"#
        );

        let response = exchange(addr, "DELETE /anything HTTP/1.1\r\n\r\n").await?;
        assert_eq!(
            body(&response)?,
            r#"{"message":"Order Service is running","service":"order-service"}"#
        );

        let response = exchange(addr, "GET /orders/abc HTTP/1.1\r\n\r\n").await?;
        assert_eq!(
            body(&response)?,
            r#"{"message":"Order Service is running","service":"order-service"}"#
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_health_over_tcp() -> Result<(), Box<dyn Error>> {
        let (addr, _shutdown) = start().await?;
        let response = exchange(addr, "GET /health HTTP/1.1\r\n\r\n").await?;
        let health = body(&response)?;

        let prefix = r#"{"status":"healthy","service":"order-service","timestamp":""#;
        let stamp = health
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix("\"}"))
            .ok_or("unexpected health body")?;
        assert!(stamp
            .chars()
            .all(|c| c.is_ascii_digit() || "T:.-Z".contains(c)));
        let parsed = DateTime::parse_from_rfc3339(stamp)?.with_timezone(&Utc);
        assert!(parsed <= Utc::now());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_request_line_writes_nothing() -> Result<(), Box<dyn Error>> {
        let (addr, _shutdown) = start().await?;
        assert_eq!(exchange(addr, "\r\n").await?, "");

        let mut stream = TcpStream::connect(addr).await?;
        stream.shutdown().await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        assert!(response.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_post_creates_order() -> Result<(), Box<dyn Error>> {
        let (addr, _shutdown) = start().await?;
        let payload = r#"{"total":19.90,"status":"PENDING"}"#;
        let request = format!(
            "POST /orders HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            payload.len(),
            payload
        );
        let response = exchange(addr, &request).await?;
        let value: serde_json::Value = serde_json::from_str(body(&response)?)?;
        let id = value["id"].as_i64().ok_or("id missing")?;
        assert!(id > 0);
        assert_eq!(value["orderNumber"].as_str(), Some(format!("ORD-{}", id).as_str()));
        assert_eq!(value["total"].to_string(), "19.90");
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_clients() -> Result<(), Box<dyn Error>> {
        let (addr, _shutdown) = start().await?;
        let mut handles = Vec::new();
        for n in 1..=32i64 {
            handles.push(tokio::spawn(async move {
                exchange(addr, &format!("GET /orders/{} HTTP/1.1\r\n\r\n", n))
                    .await
                    .map_err(|e| e.to_string())
                    .map(|response| (n, response))
            }));
        }
        for handle in handles {
            let (n, response) = handle.await??;
            assert_eq!(
                body(&response)?,
                format!(
                    r#"{{"id":{},"orderNumber":"ORD-{:03}","total":99.99,"status":"PENDING"}}"#,
                    n, n
                )
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() -> Result<(), Box<dyn Error>> {
        let server = OrderServer::bind("127.0.0.1:0").await?;
        let addr = server.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let run = tokio::spawn(server.run_until(async move {
            let _ = rx.await;
        }));
        let _ = tx.send(());
        run.await??;
        assert!(TcpStream::connect(addr).await.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_client_times_out() {
        let (_client, server) = tokio::io::duplex(1024);
        let result = connection_process(server).await;
        assert!(matches!(result, Err(OrderServiceError::ReadTimeout { .. })));
    }

    #[tokio::test]
    async fn test_connection_over_duplex() -> Result<(), Box<dyn Error>> {
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(connection_process(server));
        client.write_all(b"PUT /orders HTTP/1.1\r\n\r\n").await?;
        let mut response = Vec::new();
        client.read_to_end(&mut response).await?;
        task.await??;
        assert_eq!(body(&String::from_utf8(response)?)?, ORDERS_BODY);
        Ok(())
    }

    async fn duplex_exchange(request: &[u8]) -> Result<String, Box<dyn Error>> {
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(connection_process(server));
        client.write_all(request).await?;
        let mut response = Vec::new();
        client.read_to_end(&mut response).await?;
        drop(client);
        task.await??;
        Ok(String::from_utf8(response)?)
    }

    #[tokio::test]
    async fn test_any_request_line_is_answered() -> Result<(), Box<dyn Error>> {
        const FALLBACK_BODY: &str =
            r#"{"message":"Order Service is running","service":"order-service"}"#;
        let cases: [(&[u8], &str); 6] = [
            (b"G@T /orders HTTP/1.1\r\n\r\n", ORDERS_BODY),
            (b" /orders HTTP/1.1\r\n\r\n", ORDERS_BODY),
            (b"get /orders/ HTTP/1.1\r\n\r\n", ORDERS_BODY),
            (b"PURGE /somewhere HTTP/1.1\r\n\r\n", FALLBACK_BODY),
            (b"GET /orders/\xff HTTP/1.1\r\n\r\n", FALLBACK_BODY),
            (b"\xfe\xff /orders HTTP/1.1\r\n\r\n", ORDERS_BODY),
        ];
        for (request, expected) in cases {
            let response = duplex_exchange(request).await?;
            assert_eq!(body(&response)?, expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_headers_in_later_segment() -> Result<(), Box<dyn Error>> {
        let (addr, _shutdown) = start().await?;
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(b"GET /orders HTTP/1.1\r\n").await?;
        sleep(Duration::from_millis(50)).await;
        let headers = format!("X-Padding: {}\r\n\r\n", "p".repeat(8 * 1024));
        // The server may already be done with the connection.
        let _ = stream.write_all(headers.as_bytes()).await;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        assert_eq!(body(&String::from_utf8(response)?)?, ORDERS_BODY);
        Ok(())
    }

    #[tokio::test]
    async fn test_drain_unread() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let _ = client.write_all(b"Host: localhost\r\n\r\n").await;
        drop(client);
        assert_eq!(drain_unread(&mut server).await, 19);
    }
}
