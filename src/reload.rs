//! The live-reload broadcast channel.
//!
//! A plain-TCP websocket endpoint: one thread accepts browser connections,
//! another broadcasts a `"reload"` message on demand, dropping broken pipes
//! and capping how many idle connections are retained. The channel lives for
//! the duration of the `develop` process; there is no explicit teardown.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use tungstenite::WebSocket;

use crate::error::ReloadError;

/// Retain at most this many idle browser connections.
const MAX_CLIENTS: usize = 10;

/// Handle to a running live-reload channel. Cloning is cheap; any clone can
/// trigger a broadcast.
#[derive(Clone)]
pub struct ReloadHandle {
    tx: Sender<()>,
    port: u16,
}

impl ReloadHandle {
    /// Tell every connected browser to refresh.
    pub fn notify(&self) {
        // The broadcast thread outlives every handle.
        self.tx.send(()).ok();
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Bind the websocket endpoint and spawn the accept and broadcast threads.
/// Falls back to an ephemeral port when the configured one is taken.
pub fn start(port: u16) -> Result<ReloadHandle, ReloadError> {
    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0").map_err(ReloadError::Bind)?,
    };
    let port = listener.local_addr().map_err(ReloadError::Bind)?.port();

    let clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>> = Arc::new(Mutex::new(vec![]));

    spawn_acceptor(listener, clients.clone());
    let tx = spawn_broadcaster(clients);

    tracing::info!(port, "live-reload channel listening");
    Ok(ReloadHandle { tx, port })
}

fn spawn_acceptor(listener: TcpListener, clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>) {
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            match tungstenite::accept(stream) {
                Ok(socket) => clients.lock().unwrap().push(socket),
                Err(err) => tracing::warn!(%err, "websocket handshake failed"),
            }
        }
    });
}

fn spawn_broadcaster(clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>) -> Sender<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        while rx.recv().is_ok() {
            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send("reload".into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "live-reload send failed");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}
