use anyhow::Context;
use quicd::worker::BoringSessionFactory;
use quicd::{config, netio, runtime, telemetry, tls, worker};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;
    telemetry::init_logging()?;

    info!(
        host = %config.host,
        port = config.port,
        idle_timeout = ?config.idle_timeout,
        "Configuration loaded successfully"
    );

    let ssl_ctx = tls::create_ssl_context(&config.private_key_file, &config.certificate_file)
        .with_context(|| "failed to create TLS context")?;

    let addrs = config
        .bind_addrs()
        .with_context(|| format!("failed to resolve {}:{}", config.host, config.port))?;
    let std_socket = netio::bind_first(&addrs)
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

    let tokio_runtime = runtime::create_runtime().with_context(|| "failed to create tokio runtime")?;

    tokio_runtime.block_on(async {
        let socket = tokio::net::UdpSocket::from_std(std_socket)
            .with_context(|| "failed to register UDP socket")?;
        info!(local_addr = %socket.local_addr()?, "listening");

        worker::run(socket, BoringSessionFactory::new(ssl_ctx), &config).await
    })?;

    info!("quicd shutdown complete");
    Ok(())
}
