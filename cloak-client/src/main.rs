mod commands;

use std::sync::Arc;

use cloak_core::connectivity::ConnectivityWatcher;
use cloak_core::directory::{HttpDirectory, KeyDirectoryClient};
use cloak_core::{
    CipherEngine, ClientConfig, KeyVault, MessageDispatcher, MessageLog, Session, SessionHandle,
    WebSocketTransport,
};
use commands::Command;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Console logs go to stderr; with a log dir, a daily file too.
fn init_tracing(config: &ClientConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cloak-client.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    let config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let _log_guard = init_tracing(&config);

    let cipher = CipherEngine::new();
    if !cipher.is_supported() {
        error!("No secure random source available");
        std::process::exit(1);
    }

    let store = match config.key_store.open() {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open key store");
            std::process::exit(1);
        }
    };

    let directory = match HttpDirectory::new(&config.directory_url, config.auth_token.clone()) {
        Ok(directory) => Arc::new(KeyDirectoryClient::new(Arc::new(directory))),
        Err(e) => {
            error!(error = %e, "Failed to create directory client");
            std::process::exit(1);
        }
    };

    let transport = Arc::new(WebSocketTransport::new(config.transport_options()));
    let (feed_tx, mut feed_rx) = mpsc::unbounded_channel();

    let dispatcher = MessageDispatcher::new(
        KeyVault::new(store, &config.username),
        Arc::new(cipher),
        directory.clone(),
        transport.clone(),
    )
    .with_log(MessageLog::with_feed(feed_tx));

    let (session, handle) = Session::new(dispatcher, ConnectivityWatcher::new(directory));
    let session_task = tokio::spawn(session.run());

    handle.forward_inbound(transport.connect(&config.username));

    tokio::spawn(async move {
        while let Some(message) = feed_rx.recv().await {
            println!("{}", commands::render(&message));
        }
    });

    info!(username = %config.username, "Type /help for commands");
    read_commands(&handle).await;

    transport.disconnect();
    let _ = handle.shutdown();
    if let Err(e) = session_task.await {
        error!(error = %e, "Session task failed");
    }
}

async fn read_commands(handle: &SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };

        let Some(command) = commands::parse(&line) else {
            continue;
        };

        match command {
            Command::Broadcast(body) => report_send(handle.send(&body, None).await),
            Command::Direct { recipient, body } => {
                report_send(handle.send(&body, Some(&recipient)).await)
            }
            Command::Peers => {
                if handle.request_peers().is_err() {
                    break;
                }
            }
            Command::Who | Command::Keys => match handle.status().await {
                Ok(status) if command == Command::Who => {
                    println!("online: {}", status.online.join(", "));
                    println!("peers: {}", status.peers.join(", "));
                    println!("messages: {}  cached keys: {}", status.messages, status.cached_keys);
                }
                Ok(status) => {
                    println!("identity: {}", status.identity);
                    println!("keys: {}", status.readiness);
                    if let Some(fingerprint) = status.fingerprint {
                        println!("fingerprint: {}", fingerprint);
                    }
                }
                Err(_) => break,
            },
            Command::ResetKeys => match handle.reset_keys().await {
                Ok(()) => println!("New key pair published"),
                Err(e) => println!("Key reset failed: {}", e),
            },
            Command::Forget(username) => {
                if handle.forget(&username).is_err() {
                    break;
                }
            }
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => break,
            Command::Usage(usage) => println!("usage: {}", usage),
            Command::Unknown(name) => println!("unknown command {} (try /help)", name),
        }
    }
}

fn report_send(result: Result<cloak_core::SendOutcome, cloak_core::error::DispatchError>) {
    match result {
        Ok(outcome) => {
            if let Some(warning) = outcome.warning {
                warn!(recipient = %warning.recipient, "Direct message sent unencrypted");
                println!("warning: {}", warning);
            }
        }
        Err(e) => println!("not sent: {}", e),
    }
}
