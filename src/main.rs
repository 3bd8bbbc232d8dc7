//! Process bootstrap.
//!
//! This is deliberately thin (spec §1 names CLI/daemon bootstrap, config
//! parsing, and the transport listeners as external collaborators): it
//! wires the zone engine, the store, and the two transports together and
//! gets out of the way. The engineering weight lives in [`realmd::zone`]
//! and [`realmd::registry`].

use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_authors, crate_version};
use realmd::config::{self, Config};
use realmd::ledger::{FakeLedger, LedgerAdaptor};
use realmd::metrics::MetricsCollection;
use realmd::resolver::{DgramUpstreamResolver, UpstreamResolver};
use realmd::signature::{AlwaysValid, SignatureVerifier};
use realmd::store::Store;
use realmd::{dns, log::Logger, Registry};
use tokio::net::{TcpListener, UdpSocket};

fn main() -> ExitCode {
    let cmd = clap::Command::new("realmd")
        .version(crate_version!())
        .author(crate_authors!())
        .next_line_help(true)
        .arg(
            clap::Arg::new("config")
                .long("config")
                .short('c')
                .default_value("realmd.toml")
                .help("Path to the TOML configuration file"),
        )
        .arg(
            clap::Arg::new("check_config")
                .long("check-config")
                .action(clap::ArgAction::SetTrue)
                .help("Parse the configuration and exit"),
        );
    let matches = cmd.get_matches();

    let config_path = matches.get_one::<String>("config").expect("has a default");
    let source = match std::fs::read_to_string(config_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("couldn't read {config_path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let config = match config::parse(&source) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("couldn't parse {config_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    if matches.get_flag("check_config") {
        return ExitCode::SUCCESS;
    }

    if let Err(err) = Logger::launch(&config.logging) {
        eprintln!("couldn't start logging: {err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("couldn't start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "realmd exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), String> {
    let store = Store::open(&config.realm.database).await.map_err(|e| e.to_string())?;

    // The ledger and the signature verifier are both named in spec §1 as
    // external collaborators, consumed only through their trait interfaces
    // (`LedgerAdaptor`, `SignatureVerifier`). Neither a chain RPC client nor
    // a real cryptographic verifier is in scope here; wiring either in is a
    // matter of swapping the `Arc<dyn ...>` constructed below.
    let ledger: Arc<dyn LedgerAdaptor> = Arc::new(FakeLedger::new());
    let resolver: Arc<dyn UpstreamResolver> = Arc::new(DgramUpstreamResolver::new());
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(AlwaysValid);
    let metrics = Arc::new(MetricsCollection::new());

    let registry = Arc::new(Registry::new(&config, store, resolver, ledger.clone(), verifier, metrics.clone()));
    registry.start().await;

    let http_listen = config.http.listen.clone();
    let dns_listen = config.dns.listen.clone();
    let max_payload_size = config.dns.max_payload_size;

    let http_task = tokio::spawn(serve_http(registry.clone(), metrics.clone(), http_listen));
    let udp_task = tokio::spawn(serve_udp(registry.clone(), dns_listen.clone(), max_payload_size));
    let tcp_task = tokio::spawn(serve_tcp(registry.clone(), dns_listen, max_payload_size));
    let ledger_task = tokio::spawn(poll_ledger(registry.clone(), ledger));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
        result = http_task => log_join(result, "http server"),
        result = udp_task => log_join(result, "udp listener"),
        result = tcp_task => log_join(result, "tcp listener"),
        result = ledger_task => log_join(result, "ledger poll loop"),
    }

    Ok(())
}

fn log_join(result: Result<Result<(), String>, tokio::task::JoinError>, task: &str) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(task, %err, "task exited with an error"),
        Err(err) => tracing::error!(task, %err, "task panicked"),
    }
}

async fn serve_http(registry: Arc<Registry>, metrics: Arc<MetricsCollection>, listen: String) -> Result<(), String> {
    let app = realmd::api::router(registry).merge(metrics_router(metrics));
    let listener = tokio::net::TcpListener::bind(&listen).await.map_err(|e| e.to_string())?;
    tracing::info!(%listen, "application API listening");
    axum::serve(listener, app).await.map_err(|e| e.to_string())
}

fn metrics_router(metrics: Arc<MetricsCollection>) -> axum::Router {
    async fn handler(
        axum::extract::State(metrics): axum::extract::State<Arc<MetricsCollection>>,
    ) -> Result<String, axum::http::StatusCode> {
        metrics.render().map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    axum::Router::new()
        .route("/metrics", axum::routing::get(handler))
        .with_state(metrics)
}

/// Serve DNS queries over UDP, per spec §4.5 (no EDNS means a 512-byte
/// payload ceiling; truncated replies set `TC` rather than growing past
/// what was negotiated).
async fn serve_udp(registry: Arc<Registry>, listen: String, max_payload_size: u16) -> Result<(), String> {
    let socket = Arc::new(UdpSocket::bind(&listen).await.map_err(|e| e.to_string())?);
    tracing::info!(%listen, "DNS (udp) listening");
    let mut buf = vec![0u8; 65535];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await.map_err(|e| e.to_string())?;
        let raw = buf[..n].to_vec();
        let registry = registry.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            if let Some(reply) = dns::answer_message(&registry, &raw, peer.ip(), false, max_payload_size).await {
                let _ = socket.send_to(&reply, peer).await;
            }
        });
    }
}

/// Serve DNS queries (and AXFR) over TCP, each message length-prefixed per
/// RFC 1035 §4.2.2.
async fn serve_tcp(registry: Arc<Registry>, listen: String, max_payload_size: u16) -> Result<(), String> {
    let listener = TcpListener::bind(&listen).await.map_err(|e| e.to_string())?;
    tracing::info!(%listen, "DNS (tcp) listening");
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| e.to_string())?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_tcp_connection(&registry, stream, peer.ip(), max_payload_size).await {
                tracing::debug!(%err, %peer, "DNS tcp connection ended");
            }
        });
    }
}

async fn serve_tcp_connection(
    registry: &Registry,
    mut stream: tokio::net::TcpStream,
    peer: IpAddr,
    max_payload_size: u16,
) -> Result<(), String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut raw = vec![0u8; len];
        stream.read_exact(&mut raw).await.map_err(|e| e.to_string())?;

        let Some(reply) = dns::answer_message(registry, &raw, peer, true, max_payload_size).await else {
            return Ok(());
        };
        let len = (reply.len() as u16).to_be_bytes();
        stream.write_all(&len).await.map_err(|e| e.to_string())?;
        stream.write_all(&reply).await.map_err(|e| e.to_string())?;
    }
}

/// Poll the ledger for new blocks and invoke `onAcceptedBlock` (spec §4.3)
/// once per newly observed height. A real deployment would drive this from
/// a chain subscription instead of polling; polling is the simplest thing
/// that satisfies the same contract against the narrow `LedgerAdaptor`
/// interface this crate actually depends on.
async fn poll_ledger(registry: Arc<Registry>, ledger: Arc<dyn LedgerAdaptor>) -> Result<(), String> {
    let mut last_height = ledger.height().await.map_err(|e| e.to_string())?;
    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let height = match ledger.height().await {
            Ok(height) => height,
            Err(err) => {
                tracing::warn!(%err, "ledger height poll failed");
                continue;
            }
        };
        if height > last_height {
            last_height = height;
            registry.on_accepted_block().await;
        }
    }
}
