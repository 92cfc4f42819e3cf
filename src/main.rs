use crate::router::SERVICE_NAME;
use crate::server::{OrderServer, PORT};
use log::{debug, error, info};
use std::net::{Ipv4Addr, SocketAddr};

mod error;
mod fixtures;
mod order;
mod request;
mod response;
mod router;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("info"))
        .try_init();

    #[cfg(feature = "trace")]
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .try_init();

    raise_fd_limit();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, PORT));
    let server = match OrderServer::bind(addr).await {
        Ok(server) => server,
        Err(err) => {
            error!("Error starting {} on port {}: {}", SERVICE_NAME, PORT, err);
            std::process::exit(1);
        }
    };
    info!("Starting {} on port {}", SERVICE_NAME, PORT);
    info!(
        "Order Service is running on port {}",
        server.local_addr()?.port()
    );

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Error waiting for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

// One socket per in-flight request and no cap on concurrency.
fn raise_fd_limit() {
    match fdlimit::raise_fd_limit() {
        Ok(fdlimit::Outcome::LimitRaised { from, to }) => {
            debug!("Raised open file limit from {} to {}", from, to);
        }
        Ok(fdlimit::Outcome::Unsupported) => {
            debug!("Raising open file limit is not supported on this platform");
        }
        Err(err) => {
            error!("Failed to raise open file limit: {}", err);
        }
    }
}

#[cfg(test)]
pub fn only_in_debug() {
    let _ = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
