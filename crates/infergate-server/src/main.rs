mod cli;
mod engines;
mod grpc;
mod registry;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, ServeArgs};
use infergate_proto::infergate::v1::inference_adapter_server::InferenceAdapterServer;
use infergate_runtime::InferenceServicer;
use tokio_util::sync::CancellationToken;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing_subscriber::EnvFilter;

use grpc::GrpcSvc;
use registry::EngineRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Engines => {
            for name in EngineRegistry::builtin().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log).context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = EngineRegistry::builtin().load(&args.engine)?;
    let servicer = InferenceServicer::new(engine, args.servicer_config())
        .context("engine cannot serve the configured operation")?;

    let shutdown = CancellationToken::new();
    let svc = GrpcSvc::new(Arc::new(servicer), shutdown.clone());

    let addr: SocketAddr = args.grpc_addr.parse().context("invalid grpc address")?;
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(infergate_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .map_err(|e| anyhow::anyhow!("reflection build failed: {e}"))?;

    tracing::info!(%addr, engine = %args.engine, "infergated gRPC listening");
    tonic::transport::Server::builder()
        .add_service(InferenceAdapterServer::new(svc))
        .add_service(reflection)
        .serve_with_shutdown(addr, async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = ?e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
