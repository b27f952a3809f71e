mod extension;
mod host;
mod io;
mod logging;
mod lsp;
mod session;
mod workspace_editor;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use extension::{activate, deactivate};
use host::{ExtensionHost, TerminalHost};
use logging::{LogConfig, init_logging};
use session::config::{DEFAULT_SERVER_COMMAND, parse_tcp_address};
use session::selector::file_uri;
use session::{SessionConfig, SessionConfigBuilder, SessionConfigError, TextDocument, TransportConfig};

use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// CLI arguments for the Beef language client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Spawn this language server executable, BeefLsp if no PATH is given
    /// (overrides BEEF_LSP_PATH env var)
    #[arg(
        long,
        value_name = "PATH",
        conflicts_with = "tcp",
        num_args = 0..=1,
        default_missing_value = DEFAULT_SERVER_COMMAND
    )]
    command: Option<String>,

    /// Argument passed to the spawned server (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Dial the language server at HOST:PORT (overrides BEEF_LSP_TCP env var)
    #[arg(long, value_name = "HOST:PORT")]
    tcp: Option<String>,

    /// Workspace root sent to the server (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Timeout in seconds for initialize and shutdown requests
    #[arg(long, value_name = "SECS")]
    request_timeout: Option<u64>,

    /// Document to open once the session starts (repeatable)
    #[arg(long, value_name = "FILE")]
    open: Vec<PathBuf>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides BEEF_LSP_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Priority: CLI flag > environment > dial 127.0.0.1:5556
fn resolve_transport(
    command: Option<String>,
    tcp: Option<String>,
) -> Result<TransportConfig, SessionConfigError> {
    match (command, tcp) {
        (Some(_), Some(_)) => Err(SessionConfigError::ConflictingTransport),
        (Some(command), None) => Ok(TransportConfig::spawn(command)),
        (None, Some(address)) => {
            let (host, port) = parse_tcp_address(&address)?;
            Ok(TransportConfig::dial(host, port))
        }
        (None, None) => Ok(TransportConfig::from_env()?.unwrap_or_default()),
    }
}

fn build_session_config(
    transport: TransportConfig,
    server_args: Vec<String>,
    project_root: PathBuf,
    request_timeout: Option<u64>,
) -> Result<SessionConfig, SessionConfigError> {
    let mut builder = SessionConfigBuilder::new()
        .transport(transport.clone())
        .root_uri(file_uri(&project_root)?);

    if let Some(secs) = request_timeout {
        builder = builder.request_timeout(Duration::from_secs(secs));
    }

    if let TransportConfig::Spawn { .. } = transport {
        builder = builder.working_directory(&project_root);
        for arg in server_args {
            builder = builder.arg(arg);
        }
    } else if !server_args.is_empty() {
        warn!("Ignoring --arg values: they only apply when spawning the server");
    }

    builder.build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level, args.log_file);

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let project_root = match args.root.map_or_else(std::env::current_dir, std::path::absolute) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Failed to resolve workspace root: {e}");
            std::process::exit(1);
        }
    };

    let config = match resolve_transport(args.command, args.tcp)
        .and_then(|transport| {
            build_session_config(
                transport,
                args.args,
                project_root.clone(),
                args.request_timeout,
            )
        })
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Starting Beef language client for {} via {}",
        project_root.display(),
        config.transport.describe()
    );

    let host = TerminalHost::new();
    let extension = activate(&host, config).await?;

    let mut opened = Vec::new();
    for path in &args.open {
        if let Some(view_type) = host.custom_editors().resolve(path) {
            info!("{} is handled by custom editor {}", path.display(), view_type);
            continue;
        }
        match TextDocument::from_file(path).await {
            Ok(document) => {
                let uri = document.uri.clone();
                match extension.open_document(document).await {
                    Ok(true) => {
                        info!("Opened {}", path.display());
                        opened.push(uri);
                    }
                    Ok(false) => warn!("Not a Beef source file, skipped: {}", path.display()),
                    Err(e) => error!("Failed to open {}: {}", path.display(), e),
                }
            }
            Err(e) => error!("Failed to read {}: {}", path.display(), e),
        }
    }

    info!("Press Ctrl-C to stop");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let signal = tokio::select! {
        ready = extension.session().ready() => {
            if ready.is_ok() {
                info!("Beef language server is ready");
            }
            ctrl_c.await
        }
        signal = &mut ctrl_c => signal,
    };
    if let Err(e) = signal {
        error!("Failed to listen for Ctrl-C: {}", e);
    }

    for uri in &opened {
        if let Err(e) = extension.close_document(uri).await {
            warn!("Failed to close {}: {}", uri, e);
        }
    }

    deactivate(extension).await;
    Ok(())
}
