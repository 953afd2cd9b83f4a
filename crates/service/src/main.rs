//! `axond` — serve the agent, or talk to a running instance.
//!
//! Exit codes: 0 success, 1 connectivity/protocol failure, 2 config error.

use anyhow::Context;
use clap::{Parser, Subcommand};

use axon_service::{api, bootstrap};

#[derive(Parser)]
#[command(name = "axond", about = "Local cognitive agent runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent service.
    Serve,
    /// Interactive chat against a running service.
    Chat {
        /// Service base URL.
        #[arg(long, default_value = "http://127.0.0.1:8700")]
        url: String,
        /// Reuse an existing session id.
        #[arg(long)]
        session: Option<String>,
    },
    /// List recent sessions from a running service.
    Sessions {
        #[arg(long, default_value = "http://127.0.0.1:8700")]
        url: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    // The client subcommands report every failure as exit 1; `serve` keeps
    // its own return code so config errors can exit 2.
    let code = match cli.command {
        Command::Serve => runtime.block_on(serve()),
        Command::Chat { url, session } => exit_code(runtime.block_on(chat(url, session))),
        Command::Sessions { url, limit } => exit_code(runtime.block_on(sessions(url, limit))),
    };
    std::process::exit(code);
}

fn exit_code(result: anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

async fn serve() -> i32 {
    let settings = bootstrap::load_settings();
    bootstrap::init_tracing(&settings);

    let host = settings.service_host.clone();
    let port = settings.service_port;

    let state = match bootstrap::build_state(settings).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return 2;
        }
    };

    let app = api::router(state.clone());
    let addr = format!("{host}:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {addr}: {e}");
            return 1;
        }
    };
    tracing::info!(%addr, "service listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    bootstrap::shutdown(&state).await;

    match serve_result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("server error: {e}");
            1
        }
    }
}

async fn chat(url: String, session: Option<String>) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut session_id = session;

    let mut editor = rustyline::DefaultEditor::new().context("terminal setup failed")?;

    println!("axon chat — ctrl-d to exit");
    loop {
        let line = match editor.readline("you> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Eof)
            | Err(rustyline::error::ReadlineError::Interrupted) => return Ok(()),
            Err(e) => return Err(e).context("input error"),
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(message);

        let mut request = client
            .post(format!("{url}/chat"))
            .query(&[("message", message)]);
        if let Some(id) = &session_id {
            request = request.query(&[("session_id", id.as_str())]);
        }

        let response = request.send().await.context("service unreachable")?;
        anyhow::ensure!(
            response.status().is_success(),
            "service error: {}",
            response.status()
        );
        let body: serde_json::Value = response.json().await.context("protocol error")?;

        if session_id.is_none() {
            session_id = body
                .get("session_id")
                .and_then(serde_json::Value::as_str)
                .map(String::from);
        }
        println!(
            "axon> {}",
            body.get("response").and_then(serde_json::Value::as_str).unwrap_or("")
        );
    }
}

async fn sessions(url: String, limit: usize) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{url}/sessions"))
        .query(&[("limit", limit)])
        .send()
        .await
        .context("service unreachable")?;
    let body: serde_json::Value = response.json().await.context("protocol error")?;

    let empty = Vec::new();
    let sessions = body
        .get("sessions")
        .and_then(serde_json::Value::as_array)
        .unwrap_or(&empty);
    for session in sessions {
        println!(
            "{}  {}  {} message(s), last active {}",
            session.get("session_id").and_then(serde_json::Value::as_str).unwrap_or("?"),
            session.get("channel").and_then(serde_json::Value::as_str).unwrap_or("?"),
            session
                .get("messages")
                .and_then(serde_json::Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
            session
                .get("last_active_at")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?"),
        );
    }
    Ok(())
}
