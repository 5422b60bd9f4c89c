//! Raw TCP forwarding between fixed address pairs.
use std::{io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use eyre::{Report, Result, WrapErr, eyre};
use tokio::{
    io::copy_bidirectional,
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{config::models::TcpProxyConfig, metrics, utils::process::Process};

/// Pause after a failed accept, so persistent errors such as fd exhaustion do not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[async_trait]
trait Acceptor: Send + Sync + 'static {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

struct BoundRoute {
    listener: TcpListener,
    src: String,
    dst: String,
}

/// Set of bound TCP routes, each forwarding accepted connections to its destination.
pub struct TcpRouteProxy {
    routes: Vec<BoundRoute>,
}

impl TcpRouteProxy {
    /// Bind every source address. Fails on the first address that cannot be bound.
    pub async fn bind(configs: &[TcpProxyConfig]) -> Result<Self> {
        let mut routes = Vec::with_capacity(configs.len());
        for config in configs {
            let listener = TcpListener::bind(&config.src_address)
                .await
                .wrap_err_with(|| format!("failed to bind tcp proxy on {}", config.src_address))?;
            routes.push(BoundRoute {
                listener,
                src: config.src_address.clone(),
                dst: config.dst_address.clone(),
            });
        }
        Ok(Self { routes })
    }

    /// Addresses actually bound, in configuration order.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.routes
            .iter()
            .map(|route| route.listener.local_addr())
            .collect()
    }

    /// Forward connections until `cancel` fires, then wait for every forwarder.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut loops = JoinSet::new();
        for route in self.routes {
            tracing::info!(src = %route.src, dst = %route.dst, "tcp proxy listening");
            loops.spawn(accept_loop(route.listener, route.src, route.dst, cancel.clone()));
        }

        let mut errors = Vec::new();
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(eyre!(e).wrap_err("tcp accept loop aborted")),
            }
        }
        combine(errors)
    }
}

async fn accept_loop<A: Acceptor>(
    listener: A,
    src: String,
    dst: String,
    cancel: CancellationToken,
) -> Result<()> {
    let mut forwarders = JoinSet::new();
    let mut errors = Vec::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((inbound, peer)) => {
                    metrics::increment_tcp_connections(&src);
                    tracing::debug!(src = %src, dst = %dst, peer = %peer, "tcp connection accepted");
                    forwarders.spawn(forward(inbound, dst.clone(), cancel.clone()));
                }
                Err(e) => {
                    tracing::warn!(src = %src, error = %e, "tcp accept failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            },
            Some(joined) = forwarders.join_next(), if !forwarders.is_empty() => {
                if let Err(e) = joined {
                    errors.push(eyre!(e).wrap_err(format!("tcp forwarder for {src} aborted")));
                }
            }
        }
    }

    drop(listener);
    tracing::info!(src = %src, "tcp proxy listener closed");

    while let Some(joined) = forwarders.join_next().await {
        if let Err(e) = joined {
            errors.push(eyre!(e).wrap_err(format!("tcp forwarder for {src} aborted")));
        }
    }
    combine(errors)
}

async fn forward(mut inbound: TcpStream, dst: String, cancel: CancellationToken) {
    let mut outbound = match TcpStream::connect(&dst).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(dst = %dst, error = %e, "tcp proxy failed to reach destination");
            return;
        }
    };

    tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(dst = %dst, "tcp connection closed by shutdown");
        }
        copied = copy_bidirectional(&mut inbound, &mut outbound) => match copied {
            Ok((sent, received)) => {
                tracing::debug!(dst = %dst, sent, received, "tcp connection finished");
            }
            Err(e) => tracing::debug!(dst = %dst, error = %e, "tcp connection ended with error"),
        },
    }
}

fn combine(mut errors: Vec<Report>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        n => {
            let details = errors
                .iter()
                .map(|e| format!("{e:#}"))
                .collect::<Vec<_>>()
                .join("; ");
            Err(eyre!("{n} tcp proxy errors: {details}"))
        }
    }
}

/// Hub process running every configured TCP route.
pub struct TcpProxyProcess {
    routes: Vec<TcpProxyConfig>,
    shutdown: CancellationToken,
}

impl TcpProxyProcess {
    pub fn new(routes: Vec<TcpProxyConfig>) -> Self {
        Self {
            routes,
            shutdown: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Process for TcpProxyProcess {
    fn name(&self) -> &str {
        "tcp-proxy"
    }

    async fn start(&self) -> Result<()> {
        let proxy = TcpRouteProxy::bind(&self.routes).await?;
        proxy.run(self.shutdown.child_token()).await
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}
