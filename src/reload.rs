//! Live reload runs as two threads sharing the list of open sockets:
//!
//! 1. **Acceptor**: takes incoming TCP connections, upgrades them with
//!    `tungstenite` and keeps the socket.
//! 2. **Broadcaster**: waits for a [`ReloadKind`] on a channel and writes its
//!    message to every socket, dropping the ones that are gone.
//!
//! Pages get a small client script (see [`LiveReload::script`]) which opens
//! the socket and either swaps stylesheets on `css` or reloads the page on
//! `reload`.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tungstenite::WebSocket;

use crate::core::{Reload, ReloadKind};

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Keep at most this many sockets, older tabs are closed first.
const MAX_CLIENTS: usize = 10;

/// The live-reload socket server.
pub struct LiveReload {
    port: u16,
    clients: Clients,
    tx: Sender<ReloadKind>,
}

impl LiveReload {
    /// Binds `127.0.0.1:1337`, or any free port when that one is taken, and
    /// starts serving.
    pub fn start() -> std::io::Result<Self> {
        let listener = reserve_port()?;
        Self::with_listener(listener)
    }

    pub fn with_listener(listener: TcpListener) -> std::io::Result<Self> {
        let port = listener.local_addr()?.port();
        let clients = Clients::default();

        let _thread_i = new_thread_ws_incoming(listener, clients.clone());
        let (tx, _thread_o) = new_thread_ws_reload(clients.clone());

        tracing::info!(port, "live reload socket listening");
        Ok(Self { port, clients, tx })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of browser tabs currently connected.
    pub fn clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The client script injected into served pages.
    pub fn script(&self) -> String {
        let port = self.port;
        format!(
            r#"<script>
(() => {{
    const socket = new WebSocket(`ws://${{location.hostname}}:{port}`);
    socket.addEventListener("message", event => {{
        if (event.data === "{css}") {{
            for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {{
                const url = new URL(link.href);
                url.searchParams.set("v", Date.now());
                link.href = url.toString();
            }}
        }} else {{
            window.location.reload();
        }}
    }});
}})();
</script>"#,
            css = ReloadKind::Css.message(),
        )
    }
}

impl Reload for LiveReload {
    fn signal(&self, kind: ReloadKind) {
        if self.tx.send(kind).is_err() {
            tracing::warn!("live reload broadcaster is gone");
        }
    }
}

fn reserve_port() -> std::io::Result<TcpListener> {
    match TcpListener::bind("127.0.0.1:1337") {
        Ok(sock) => Ok(sock),
        Err(_) => TcpListener::bind("127.0.0.1:0"),
    }
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("live reload connection failed: {e}");
                    continue;
                }
            };

            match tungstenite::accept(stream) {
                Ok(socket) => {
                    tracing::debug!("live reload client connected");
                    clients
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(socket);
                }
                Err(e) => tracing::warn!("live reload handshake failed: {e}"),
            }
        }
    })
}

fn new_thread_ws_reload(clients: Clients) -> (Sender<ReloadKind>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<ReloadKind>();

    let thread = std::thread::spawn(move || {
        while let Ok(kind) = rx.recv() {
            let mut clients = clients.lock().unwrap_or_else(PoisonError::into_inner);
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                if let Err(e) = socket.send(kind.message().into()) {
                    tracing::debug!("dropping live reload client: {e}");
                    broken.push(i);
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

            tracing::debug!(message = kind.message(), clients = clients.len(), "signalled");
        }
    });

    (tx, thread)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn start() -> LiveReload {
        LiveReload::with_listener(TcpListener::bind("127.0.0.1:0").unwrap()).unwrap()
    }

    fn wait_for(what: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if what() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_broadcast_messages() {
        let live = start();
        let (mut client, _) = tungstenite::connect(format!("ws://127.0.0.1:{}", live.port())).unwrap();
        assert!(wait_for(|| live.clients() == 1));

        live.signal(ReloadKind::Css);
        live.signal(ReloadKind::Full);

        assert_eq!(client.read().unwrap().to_text().unwrap(), "css");
        assert_eq!(client.read().unwrap().to_text().unwrap(), "reload");
    }

    #[test]
    fn test_gone_clients_are_dropped() {
        let live = start();
        let (client, _) = tungstenite::connect(format!("ws://127.0.0.1:{}", live.port())).unwrap();
        assert!(wait_for(|| live.clients() == 1));
        drop(client);

        assert!(wait_for(|| {
            live.signal(ReloadKind::Full);
            live.clients() == 0
        }));
    }

    #[test]
    fn test_script_knows_port_and_messages() {
        let live = start();
        let script = live.script();

        assert!(script.starts_with("<script>"));
        assert!(script.contains(&format!(":{}`", live.port())));
        assert!(script.contains(r#"event.data === "css""#));
    }
}
