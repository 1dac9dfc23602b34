use std::io;

use llmjson_mcp::McpServer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries protocol frames only
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn main() -> io::Result<()> {
    init_tracing();

    let mode = std::env::var("LLMJSON_MCPD_TRANSPORT").unwrap_or_else(|_| "stdio".to_string());
    let server =
        McpServer::new().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    match mode.as_str() {
        "stdio" => {
            info!("llmjson-mcpd serving on stdio");
            server.serve_stdio()
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "LLMJSON_MCPD_TRANSPORT must be stdio",
        )),
    }
}
