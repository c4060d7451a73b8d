use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::uri::PathAndQuery;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::{Code, Request, Response, Status, Streaming};
use tower::Service;
use tracing::{error, info};

use crate::codec::PassThrough;
use crate::config::DestinationTable;
use crate::resolver::RegionResolver;
use crate::routing;

/// Metadata key carrying the raw region value for gRPC requests.
pub const METADATA_REGION_KEY: &str = "poly-route-region";

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>;

/// Transparent reverse proxy for gRPC streams.
///
/// The forwarder accepts every service/method name: it is a tower service
/// that runs the same streaming handler for any request path, with the
/// pass-through codec installed on both the inbound and the outbound side
/// so message payloads are never parsed. Each RPC is mirrored onto a fresh
/// backend connection chosen from the region and the full method name.
#[derive(Clone)]
pub struct GrpcForwarder {
    destinations: Arc<DestinationTable>,
    resolver: Arc<RegionResolver>,
}

impl GrpcForwarder {
    pub fn new(destinations: DestinationTable, resolver: Arc<RegionResolver>) -> Self {
        GrpcForwarder {
            destinations: Arc::new(destinations),
            resolver,
        }
    }

    /// An axum router that hands every request to this forwarder. This is
    /// what the outer process mounts on its gRPC listener.
    pub fn router(self) -> axum::Router {
        axum::Router::new().fallback_service(self)
    }

    /// One proxied RPC: route, dial, then mirror both directions.
    async fn proxy(
        &self,
        method: String,
        request: Request<Streaming<Bytes>>,
    ) -> Result<Response<ByteStream>, Status> {
        if method.is_empty() || !method.starts_with('/') {
            return Err(Status::internal("cannot get method from stream"));
        }

        // The backend sees exactly what the caller sent, region key
        // included.
        let metadata = request.metadata().clone();

        let region = metadata
            .get(METADATA_REGION_KEY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if region.is_empty() {
            return Err(Status::internal(format!(
                "no region found in metadata, set {METADATA_REGION_KEY}"
            )));
        }

        let resolved = self
            .resolver
            .resolve(&region)
            .await
            .map_err(|err| Status::internal(err.to_string()))?;

        let backend = match routing::find_backend(&self.destinations, &method, &resolved) {
            Some(backend) => backend,
            None => {
                return Err(Status::internal(format!(
                    "no backend for method {method} region {region}"
                )));
            }
        };

        forward_stream(backend, method, metadata, request.into_inner()).await
    }
}

/// Open a stream to the backend and pump bytes in both directions until
/// each side closes.
async fn forward_stream(
    backend: String,
    method: String,
    metadata: MetadataMap,
    mut inbound: Streaming<Bytes>,
) -> Result<Response<ByteStream>, Status> {
    info!(backend = %backend, method = %method, "forwarding gRPC request");

    // Wildcard destinations may carry a joined method path; only the
    // authority part is dialed, the stream is opened on the inbound method.
    let authority = backend.split('/').next().unwrap_or(backend.as_str());
    let channel = Channel::from_shared(format!("http://{authority}"))
        .map_err(|e| Status::internal(format!("invalid backend address {authority}: {e}")))?
        .connect()
        .await
        .map_err(|e| Status::unavailable(format!("dial backend {authority}: {e}")))?;

    let path: PathAndQuery = method
        .parse()
        .map_err(|_| Status::internal(format!("invalid method path: {method}")))?;

    // Pump: inbound caller -> backend. Each received message is handed to
    // the outbound request stream one at a time; dropping the sender
    // half-closes the backend send side, which happens exactly when the
    // caller half-closes or fails. The terminal outcome goes to the
    // single-slot channel consumed by the coordinator below.
    let (msg_tx, msg_rx) = mpsc::channel::<Bytes>(1);
    let (caller_tx, mut caller_rx) = mpsc::channel::<Result<(), Status>>(1);
    tokio::spawn(async move {
        let outcome = loop {
            match inbound.message().await {
                Ok(Some(msg)) => {
                    if msg_tx.send(msg).await.is_err() {
                        // The backend stream went away; the coordinator
                        // already decided how the RPC ends.
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(status) => break Err(status),
            }
        };
        let _ = caller_tx.send(outcome).await;
    });

    // The stream is opened as bidirectional regardless of the actual RPC
    // shape; with an opaque codec every shape pumps the same way.
    let mut client = tonic::client::Grpc::new(channel);
    client
        .ready()
        .await
        .map_err(|e| Status::unavailable(format!("backend not ready: {e}")))?;

    let mut outbound = Request::new(ReceiverStream::new(msg_rx));
    *outbound.metadata_mut() = metadata;

    let response = client.streaming(outbound, path, PassThrough).await?;
    let (headers, mut backend_stream, _) = response.into_parts();

    // Pump backend -> inbound caller, fused with the coordinator: the loop
    // consumes exactly two termination signals, one per direction, and
    // applies an asymmetric policy. Caller EOF half-closes the backend
    // (already done by the pump above) while the proxy keeps relaying;
    // backend EOF mirrors the backend trailers and completes the RPC;
    // a caller failure aborts the backend call.
    let output = async_stream::stream! {
        let mut caller_done = false;
        loop {
            tokio::select! {
                outcome = caller_rx.recv(), if !caller_done => {
                    caller_done = true;
                    if let Some(Err(status)) = outcome {
                        error!(error = %status, "failed proxying server -> client");
                        yield Err(Status::internal(format!(
                            "failed proxying server -> client: {status}"
                        )));
                        return;
                    }
                }
                received = backend_stream.message() => {
                    match received {
                        Ok(Some(msg)) => yield Ok(msg),
                        Ok(None) => {
                            match backend_stream.trailers().await {
                                Ok(Some(trailers)) => {
                                    let trailers = filter_transport_trailers(&trailers);
                                    if !trailers.is_empty() {
                                        // An OK status carrying the backend's
                                        // trailer metadata ends the stream.
                                        yield Err(Status::with_metadata(Code::Ok, "", trailers));
                                    }
                                }
                                Ok(None) => {}
                                Err(status) => yield Err(status),
                            }
                            return;
                        }
                        Err(status) => {
                            // The backend's terminal status, trailers
                            // included, travels to the caller verbatim.
                            yield Err(status);
                            return;
                        }
                    }
                }
            }
        }
    };

    let mut response = Response::new(Box::pin(output) as ByteStream);
    *response.metadata_mut() = headers;
    Ok(response)
}

/// Drop trailer keys owned by the gRPC transport itself; the terminal
/// status re-emits those, so copying them across would duplicate them.
fn filter_transport_trailers(md: &MetadataMap) -> MetadataMap {
    let mut filtered = MetadataMap::new();
    for kv in md.iter() {
        match kv {
            tonic::metadata::KeyAndValueRef::Ascii(key, value) => {
                let k = key.as_str();
                if k == "grpc-status" || k == "grpc-message" {
                    continue;
                }
                filtered.append(key.clone(), value.clone());
            }
            tonic::metadata::KeyAndValueRef::Binary(key, value) => {
                if key.as_str() == "grpc-status-details-bin" {
                    continue;
                }
                filtered.append_bin(key.clone(), value.clone());
            }
        }
    }
    filtered
}

/// Per-call adapter between the tonic server machinery and the forwarder.
struct ProxyCall {
    forwarder: GrpcForwarder,
    method: String,
}

impl tonic::server::StreamingService<Bytes> for ProxyCall {
    type Response = Bytes;
    type ResponseStream = ByteStream;
    type Future = BoxFuture<Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<Streaming<Bytes>>) -> Self::Future {
        let forwarder = self.forwarder.clone();
        let method = self.method.clone();
        Box::pin(async move { forwarder.proxy(method, request).await })
    }
}

impl<B> Service<http::Request<B>> for GrpcForwarder
where
    B: http_body::Body + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let forwarder = self.clone();
        Box::pin(async move {
            let method = req.uri().path().to_owned();
            let svc = ProxyCall { forwarder, method };
            let mut grpc = tonic::server::Grpc::new(PassThrough);
            Ok(grpc.streaming(svc, req).await)
        })
    }
}
