//! Local HTTP server serving database bytes for download tests.

use axum::{extract::State, http::StatusCode, Router};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

#[derive(Default)]
struct Served {
    body: Mutex<Option<Vec<u8>>>,
    hits: AtomicUsize,
}

/// Serves the current body at every path; no body means `404`.
pub struct DatabaseServer {
    addr: SocketAddr,
    served: Arc<Served>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl DatabaseServer {
    pub fn start(body: Option<&[u8]>) -> Self {
        let served = Arc::new(Served::default());
        *served.body.lock() = body.map(<[u8]>::to_vec);

        let app = Router::new()
            .fallback(serve_body)
            .with_state(Arc::clone(&served));

        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();
                tokio::select! {
                    _ = axum::serve(listener, app) => {}
                    _ = shutdown_rx => {}
                }
            });
        });

        Self {
            addr: addr_rx.recv().unwrap(),
            served,
            _shutdown: shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    pub fn set_body(&self, body: Option<&[u8]>) {
        *self.served.body.lock() = body.map(<[u8]>::to_vec);
    }

    pub fn hits(&self) -> usize {
        self.served.hits.load(Ordering::SeqCst)
    }
}

async fn serve_body(State(served): State<Arc<Served>>) -> Result<Vec<u8>, StatusCode> {
    served.hits.fetch_add(1, Ordering::SeqCst);
    served.body.lock().clone().ok_or(StatusCode::NOT_FOUND)
}
