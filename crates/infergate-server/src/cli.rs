use clap::{Args, Parser, Subcommand};
use infergate_core::{TensorBackend, DEFAULT_PREDICT_OP};
use infergate_runtime::{ServicerConfig, StreamErrorPolicy};

#[derive(Parser, Debug)]
#[command(name = "infergated", version, about = "infergate inference adapter daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gRPC adapter
    Serve(ServeArgs),
    /// List the built-in engines
    Engines,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address for gRPC
    #[arg(long, env = "INFERGATE_GRPC_ADDR", default_value = "0.0.0.0:50051")]
    pub grpc_addr: String,

    /// Log filter (RUST_LOG syntax)
    #[arg(long, env = "INFERGATE_LOG", default_value = "info")]
    pub log: String,

    /// Built-in engine to serve
    #[arg(long, env = "INFERGATE_ENGINE", default_value = "echo")]
    pub engine: String,

    /// Engine operation every call dispatches to
    #[arg(long, env = "INFERGATE_PREDICT_OP", default_value = DEFAULT_PREDICT_OP)]
    pub predict_op: String,

    /// Tensor representation handed to the engine (native or ndarray)
    #[arg(long, env = "INFERGATE_TENSOR_BACKEND", default_value = "native")]
    pub tensor_backend: TensorBackend,

    /// What a stream does when one item fails (terminate or respond)
    #[arg(long, env = "INFERGATE_STREAM_ERRORS", default_value = "terminate")]
    pub stream_errors: StreamErrorPolicy,
}

impl ServeArgs {
    pub fn servicer_config(&self) -> ServicerConfig {
        ServicerConfig::default()
            .with_predict_op(self.predict_op.clone())
            .with_tensor_backend(self.tensor_backend)
            .with_stream_errors(self.stream_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["infergated", "serve"]).expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.grpc_addr, "0.0.0.0:50051");
        assert_eq!(args.servicer_config(), ServicerConfig::default());
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::try_parse_from([
            "infergated",
            "serve",
            "--engine",
            "mean",
            "--predict-op",
            "forward",
            "--tensor-backend",
            "ndarray",
            "--stream-errors",
            "respond",
        ])
        .expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.engine, "mean");
        let config = args.servicer_config();
        assert_eq!(config.predict_op, "forward");
        assert_eq!(config.tensor_backend, TensorBackend::Ndarray);
        assert_eq!(config.stream_errors, StreamErrorPolicy::Respond);

        assert!(Cli::try_parse_from(["infergated", "serve", "--tensor-backend", "torch"]).is_err());
    }
}
