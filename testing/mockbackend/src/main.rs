use clap::Parser;
use tonic::transport::Server;

#[derive(Parser, Debug)]
#[command(
    name = "mockbackend",
    about = "Mock HTTP and gRPC backends for poly-route verification"
)]
struct Cli {
    /// Port for the mock HTTP backend (0 for ephemeral, omit to disable)
    #[arg(long = "http-port")]
    http_port: Option<u16>,

    /// Port for the mock gRPC backend (0 for ephemeral, omit to disable)
    #[arg(long = "grpc-port")]
    grpc_port: Option<u16>,

    /// Port for the region lookup endpoint (0 for ephemeral, omit to disable)
    #[arg(long = "lookup-port")]
    lookup_port: Option<u16>,

    /// Name the backends embed in their responses
    #[arg(short = 'n', long = "name", default_value = "mock")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut servers = tokio::task::JoinSet::new();

    if let Some(port) = cli.http_port {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        println!("mock http backend listening on {addr}");
        let router = mockbackend::http::backend_router(&cli.name, &addr.to_string());
        servers.spawn(async move { axum::serve(listener, router).await });
    }

    if let Some(port) = cli.lookup_port {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        println!("region lookup listening on {}", listener.local_addr()?);
        let router = mockbackend::http::region_lookup_router();
        servers.spawn(async move { axum::serve(listener, router).await });
    }

    if let Some(port) = cli.grpc_port {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        println!("mock grpc backend listening on {}", listener.local_addr()?);
        let service = mockbackend::grpc::service(cli.name.clone());
        servers.spawn(async move {
            Server::builder()
                .add_service(service)
                .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await
                .map_err(std::io::Error::other)
        });
    }

    while let Some(result) = servers.join_next().await {
        result??;
    }

    Ok(())
}
