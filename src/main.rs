use std::net::SocketAddr;
use std::process::exit;
use std::sync::atomic::Ordering::Relaxed;

use emberdb::config::Config;
use emberdb::eventloop::{EventLoop, SHUTDOWN_REQUESTED};
use emberdb::server::Server;

fn main() {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = SocketAddr::new(config.bind, config.port);
    let mut event_loop = EventLoop::bind(addr).unwrap_or_else(|err| {
        tracing::error!(%err, %addr, "failed to bind");
        exit(1);
    });

    let mut server = Server::new(config);
    tracing::info!(port = server.config.port, role = server.role(), "emberdb-server ready to accept connections");

    install_signal_handlers();

    if let Err(err) = event_loop.run(&mut server) {
        tracing::error!(%err, "event loop exited with error");
        exit(1);
    }
    tracing::info!("shutting down");
}

/// Installs SIGTERM/SIGINT handlers that flip `SHUTDOWN_REQUESTED`
/// instead of calling `exit` directly, so the event loop can unwind and
/// flush pending writes before the process exits.
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
    }
}

extern "C" fn handle_signal(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Relaxed);
}
