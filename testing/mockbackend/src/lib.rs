//! Mock backends used by the poly-route test suites and runnable as a
//! standalone binary for local demos.

pub mod pb {
    tonic::include_proto!("mockserver.v1");
}

pub mod grpc {
    use std::pin::Pin;

    use tokio::sync::mpsc;
    use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
    use tonic::{Request, Response, Status, Streaming};

    use crate::pb;
    use crate::pb::mock_service_server::{MockService, MockServiceServer};

    /// Resource id that makes [`MockServer::invoke`] fail with a status
    /// carrying custom metadata, so status and trailer propagation can be
    /// asserted through a proxy.
    pub const FAILING_RESOURCE_ID: &str = "fail";

    type ResponseStream = Pin<Box<dyn Stream<Item = Result<pb::ReadResponse, Status>> + Send>>;

    /// Implements every method of [`pb::mock_service_server::MockService`],
    /// tagging responses with the server's name so tests can tell backends
    /// apart.
    pub struct MockServer {
        name: String,
    }

    impl MockServer {
        pub fn new(name: impl Into<String>) -> Self {
            MockServer { name: name.into() }
        }
    }

    /// Convenience constructor for mounting the mock on a tonic server.
    pub fn service(name: impl Into<String>) -> MockServiceServer<MockServer> {
        MockServiceServer::new(MockServer::new(name))
    }

    #[tonic::async_trait]
    impl MockService for MockServer {
        async fn invoke(
            &self,
            request: Request<pb::ReadRequest>,
        ) -> Result<Response<pb::ReadResponse>, Status> {
            let seen_region = request.metadata().get("poly-route-region").cloned();
            let req = request.into_inner();
            if req.resource_id == FAILING_RESOURCE_ID {
                let mut status = Status::invalid_argument("invoke failed on purpose");
                status
                    .metadata_mut()
                    .insert("mock-backend", self.name.parse().map_err(|_| {
                        Status::internal("backend name is not a valid metadata value")
                    })?);
                return Err(status);
            }
            let mut response = Response::new(pb::ReadResponse {
                data: format!("[{}] Response for {}", self.name, req.resource_id),
            });
            // Surfacing the region key lets callers verify that request
            // metadata made it through unchanged.
            if let Some(region) = seen_region {
                response.metadata_mut().insert("mock-seen-region", region);
            }
            Ok(response)
        }

        type ServerStreamStream = ResponseStream;

        async fn server_stream(
            &self,
            request: Request<pb::ReadRequest>,
        ) -> Result<Response<Self::ServerStreamStream>, Status> {
            let req = request.into_inner();
            let name = self.name.clone();
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                for i in 0..5 {
                    let resp = pb::ReadResponse {
                        data: format!("[{}] {} response #{}", name, req.resource_id, i),
                    };
                    if tx.send(Ok(resp)).await.is_err() {
                        return;
                    }
                }
            });
            Ok(Response::new(
                Box::pin(ReceiverStream::new(rx)) as Self::ServerStreamStream
            ))
        }

        async fn client_stream(
            &self,
            request: Request<Streaming<pb::ReadRequest>>,
        ) -> Result<Response<pb::ReadResponse>, Status> {
            let mut stream = request.into_inner();
            let mut combined = String::new();
            while let Some(msg) = stream.next().await {
                combined.push_str(&msg?.resource_id);
                combined.push(';');
            }
            Ok(Response::new(pb::ReadResponse {
                data: format!("[{}] {combined}", self.name),
            }))
        }

        type BiDirectionalStreamStream = ResponseStream;

        async fn bi_directional_stream(
            &self,
            request: Request<Streaming<pb::ReadRequest>>,
        ) -> Result<Response<Self::BiDirectionalStreamStream>, Status> {
            let mut in_stream = request.into_inner();
            let name = self.name.clone();
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                while let Some(result) = in_stream.next().await {
                    let out = match result {
                        Ok(req) => Ok(pb::ReadResponse {
                            data: format!("[{}] Stream response for {}", name, req.resource_id),
                        }),
                        Err(e) => Err(e),
                    };
                    if tx.send(out).await.is_err() {
                        return;
                    }
                }
            });
            Ok(Response::new(
                Box::pin(ReceiverStream::new(rx)) as Self::BiDirectionalStreamStream
            ))
        }
    }
}

pub mod http {
    use axum::extract::Request;
    use axum::response::IntoResponse;
    use axum::Router;
    use serde_json::json;

    /// A backend answering any method on any path with a JSON body that
    /// identifies the backend, its bound address and the request line.
    pub fn backend_router(name: &str, addr: &str) -> Router {
        let name = name.to_owned();
        let addr = addr.to_owned();
        Router::new().fallback(move |req: Request| {
            let name = name.clone();
            let addr = addr.clone();
            async move {
                axum::Json(json!({
                    "backend": name,
                    "addr": addr,
                    "path": format!("{}{}", req.method(), req.uri().path()),
                }))
                .into_response()
            }
        })
    }

    /// A region lookup service: `GET /userinfo?user_id=X` answers
    /// `{"country": "X"}`, echoing the query parameter back as the country.
    pub fn region_lookup_router() -> Router {
        Router::new().route(
            "/userinfo",
            axum::routing::get(
                |axum::extract::Query(params): axum::extract::Query<
                    std::collections::HashMap<String, String>,
                >| async move {
                    let user_id = params.get("user_id").cloned().unwrap_or_default();
                    axum::Json(json!({ "country": user_id }))
                },
            ),
        )
    }
}
