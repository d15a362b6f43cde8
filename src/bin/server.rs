//! Durandal MCP server binary
//!
//! Run with no arguments to serve MCP over stdio; see --help for flags.

use clap::Parser;

use durandal::cli::{self, Args};
use durandal::config::Config;
use durandal::mcp::McpServer;
use durandal::server::DurandalHandler;
use durandal::storage::Store;
use durandal::{logging, selftest, update};

fn main() -> anyhow::Result<()> {
    // Unknown flags are dropped, not errors: `--v` starts the server.
    let (argv, dropped) = cli::sanitize_args(std::env::args().collect());
    for arg in &dropped {
        eprintln!("warning: ignoring unknown argument '{}'", arg);
    }
    let args = Args::parse_from(&argv);

    if args.version {
        println!("{}", cli::version_string());
        return Ok(());
    }

    let mut config = Config::from_env();
    if args.debug {
        config.debug = true;
    }
    if args.verbose {
        config.verbose = true;
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(level);
    }
    if let Some(path) = args.log_file {
        config.log_file = Some(path);
    }

    logging::init(&config)?;

    if args.test {
        std::process::exit(selftest::run_self_test());
    }

    // A store that cannot open at startup is fatal: one logged error, exit 1.
    let store = match Store::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                database_path = config.database_path.as_str(),
                error = %e,
                hint = e.hint(),
                "failed to open store"
            );
            std::process::exit(1);
        }
    };

    update::spawn_check(&config.update);

    let handler = DurandalHandler::new(store.clone(), &config);
    let server = McpServer::new(handler, config.server.clone());

    // Signal watcher: request shutdown, let in-flight requests drain within
    // the grace period, then terminate.
    let state = server.state();
    let grace = config.server.shutdown_grace;
    let signal_store = store.clone();
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "failed to start signal watcher");
                return;
            }
        };
        runtime.block_on(async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut term =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("sigterm handler");
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
        });

        tracing::info!("shutdown signal received");
        state.request_shutdown();
        if !state.await_drain(grace) {
            tracing::warn!("forcing termination with requests in flight");
        }
        signal_store.close();
        std::process::exit(0);
    });

    tracing::info!(
        version = durandal::VERSION,
        database_path = config.database_path.as_str(),
        "durandal-mcp server starting on stdio"
    );
    server.run()?;
    store.close();

    Ok(())
}
