//! HTTP control plane: `POST`/`GET /switch/<N>` and `GET /status`
//! (spec.md §4.7), served by a dedicated single-threaded Tokio runtime on
//! its own OS thread so the rest of the switcher stays plain `std::thread`.
//!
//! Modeled directly on the WHEP signaling endpoint's start/stop shape: a
//! runtime spun up in `spawn`, a shutdown signal raced against `serve` in
//! `tokio::select!`, and the runtime joined on `stop`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::arbiter::SwitchReason;
use crate::switcher::Switcher;

pub struct ControlPlane {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ControlPlane {
    pub fn spawn(switcher: Arc<Switcher>) -> std::io::Result<Self> {
        let port = switcher.config().control_port;
        let weak = Arc::downgrade(&switcher);
        drop(switcher);

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::io::Result<()>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = std::thread::Builder::new()
            .name("mswitch-control".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let addr = SocketAddr::from(([0, 0, 0, 0], port));
                    let listener = match TcpListener::bind(addr).await {
                        Ok(listener) => {
                            let _ = ready_tx.send(Ok(()));
                            listener
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };
                    info!("control plane listening on {addr}");
                    serve(listener, weak, shutdown_rx).await;
                    info!("control plane stopped");
                });
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "control plane thread exited before binding",
                ))
            }
        }
    }

    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn serve(listener: TcpListener, switcher: Weak<Switcher>, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!("control plane accept error: {err}");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let switcher = Weak::clone(&switcher);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, Weak::clone(&switcher)));
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        warn!("control plane connection error: {err}");
                    }
                });
            }
        }
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    switcher: Weak<Switcher>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let Some(switcher) = switcher.upgrade() else {
        return Ok(json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": "switcher closed" }),
        ));
    };

    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if let Some(rest) = path.strip_prefix("/switch/") {
        if method != Method::POST && method != Method::GET {
            return Ok(json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "method not allowed" }),
            ));
        }
        return Ok(match rest.parse::<i64>() {
            Ok(index) => match switcher.switch_to(index, SwitchReason::Manual) {
                Ok(()) => {
                    info!("control plane: switched to source {index}");
                    json_response(StatusCode::OK, json!({ "status": "ok", "source": index.to_string() }))
                }
                Err(err) => {
                    warn!("control plane: rejected switch request: {err}");
                    json_response(StatusCode::BAD_REQUEST, json!({ "error": "invalid source" }))
                }
            },
            Err(_) => json_response(StatusCode::BAD_REQUEST, json!({ "error": "invalid source" })),
        });
    }

    if path == "/status" && method == Method::GET {
        let status = switcher.snapshot();
        return Ok(json_response(StatusCode::OK, json!(status)));
    }

    Ok(json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" })))
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let bytes = match serde_json::to_vec(&body) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("failed to serialize control plane response: {err}");
            b"{}".to_vec()
        }
    };
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
