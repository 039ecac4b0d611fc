//! WebSocket protocol server
//!
//! One TCP listener serves two surfaces: a plain-HTTP `GET /health` probe
//! and the WebSocket upgrade everything else uses. Each connection is
//! multiplexed: direct replies echo the caller's `request_id`, and any
//! number of task update streams can run concurrently on one socket.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use steward_core::approval::{ApprovalDecision, ApprovalManager};
use steward_core::card::AgentCard;
use steward_core::config::Config;
use steward_core::llm::HttpLlmClient;
use steward_core::manager::TaskManager;
use steward_core::protocol::{ClientEnvelope, ClientMessage, ServerEnvelope, ServerEvent};
use steward_core::router::TaskRouter;
use steward_core::session::DirSessionProvider;
use steward_core::task::{RunnerKind, TaskEvent};
use steward_core::StewardError;

pub struct AppState {
    pub manager: TaskManager,
    pub approvals: ApprovalManager,
    pub router: TaskRouter,
    pub card: AgentCard,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = Arc::new(
            HttpLlmClient::new(config.llm.clone()).context("failed to build LLM client")?,
        );
        let approvals =
            ApprovalManager::new(config.approvals.on_timeout, config.approvals.timeout());
        let manager = TaskManager::new(
            Arc::new(DirSessionProvider::new(config.sessions.root_dir())),
            approvals.clone(),
            config.approvals.policy(),
        );
        Ok(Self {
            manager,
            approvals,
            router: TaskRouter::with_defaults(llm, config.agent.max_iterations),
            card: AgentCard::for_this_server(env!("CARGO_PKG_VERSION")),
        })
    }
}

pub async fn start_server(config: Config) -> Result<()> {
    let addr = format!("127.0.0.1:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "steward server listening");

    let state = Arc::new(AppState::from_config(&config)?);

    let accept_loop = async {
        loop {
            let (stream, peer) = listener.accept().await.context("accept failed")?;
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    tracing::debug!(%peer, error = %e, "connection closed with error");
                }
            });
        }
    };

    tokio::select! {
        result = accept_loop => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}

const HEALTH_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
content-type: application/json\r\n\
content-length: 15\r\n\
connection: close\r\n\r\n\
{\"status\":\"ok\"}";

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) -> Result<()> {
    // A WebSocket upgrade is also an HTTP GET, so route on the request path
    // before handing the socket to the handshake.
    let mut head = [0u8; 256];
    let n = stream.peek(&mut head).await?;
    if String::from_utf8_lossy(&head[..n]).starts_with("GET /health") {
        stream.write_all(HEALTH_RESPONSE.as_bytes()).await?;
        stream.shutdown().await?;
        return Ok(());
    }

    let ws_stream = accept_async(stream).await.context("websocket handshake failed")?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEnvelope>();

    // Forward outbound envelopes to the socket
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode server envelope"),
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientEnvelope>(text.as_str()) {
            Ok(envelope) => {
                handle_client_message(envelope.request_id, envelope.message, &state, &tx).await;
            }
            Err(e) => {
                let _ = tx.send(ServerEnvelope::push(ServerEvent::Error {
                    code: "malformed_frame".to_string(),
                    message: e.to_string(),
                }));
            }
        }
    }

    send_task.abort();
    Ok(())
}

async fn handle_client_message(
    request_id: Option<String>,
    msg: ClientMessage,
    state: &Arc<AppState>,
    tx: &mpsc::UnboundedSender<ServerEnvelope>,
) {
    let event = match msg {
        ClientMessage::SubmitTask { prompt, runner } => {
            submit_task(&prompt, runner.as_deref(), state).await
        }
        ClientMessage::GetTask { task_id } => match state.manager.get(task_id) {
            Some(task) => Ok(ServerEvent::Task { task }),
            None => Err(StewardError::TaskNotFound { id: task_id }),
        },
        ClientMessage::CancelTask { task_id } => state
            .manager
            .cancel(task_id)
            .map(|_| ServerEvent::TaskCancelled { task_id }),
        ClientMessage::StreamTaskUpdates { task_id } => {
            tokio::spawn(stream_task_updates(
                task_id,
                request_id.clone(),
                state.manager.clone(),
                tx.clone(),
            ));
            return;
        }
        ClientMessage::ApproveRequest { approval_id } => state
            .approvals
            .resolve(approval_id, ApprovalDecision::Approve)
            .map(|_| ServerEvent::ApprovalResolved { approval_id }),
        ClientMessage::DenyRequest { approval_id, reason } => state
            .approvals
            .resolve(approval_id, ApprovalDecision::Deny { reason })
            .map(|_| ServerEvent::ApprovalResolved { approval_id }),
        ClientMessage::ModifyRequest { approval_id, parameters } => state
            .approvals
            .resolve(approval_id, ApprovalDecision::Modify { parameters })
            .map(|_| ServerEvent::ApprovalResolved { approval_id }),
        ClientMessage::ResolveAllMatching { tool, decision } => {
            let count = state.approvals.resolve_all_matching(&tool, decision);
            Ok(ServerEvent::ApprovalsResolved { count })
        }
        ClientMessage::ListApprovals => Ok(ServerEvent::Approvals {
            approvals: state.approvals.list(),
        }),
        ClientMessage::GetAgentCard => Ok(ServerEvent::AgentCard {
            card: state.card.clone(),
        }),
    };

    let event = event.unwrap_or_else(|e| ServerEvent::error(&e));
    let _ = tx.send(ServerEnvelope::reply(request_id, event));
}

async fn submit_task(
    prompt: &str,
    runner: Option<&str>,
    state: &Arc<AppState>,
) -> std::result::Result<ServerEvent, StewardError> {
    let runner = match runner {
        Some(name) => RunnerKind::from_str(name)?,
        None => RunnerKind::Interactive,
    };
    let factory = state.router.route(runner)?;
    let task = state.manager.submit(prompt, factory).await?;
    Ok(ServerEvent::TaskSubmitted { task })
}

/// Snapshot-then-follow: subscribe first so no transition is lost between
/// the snapshot and the live tail, then forward this task's events until a
/// terminal state change. Events already reflected in the snapshot are
/// dropped by comparing against its `last_event_seq`.
async fn stream_task_updates(
    task_id: Uuid,
    request_id: Option<String>,
    manager: TaskManager,
    tx: mpsc::UnboundedSender<ServerEnvelope>,
) {
    let mut events = manager.subscribe_stream();

    let Some(task) = manager.get(task_id) else {
        let _ = tx.send(ServerEnvelope::reply(
            request_id,
            ServerEvent::error(&StewardError::TaskNotFound { id: task_id }),
        ));
        return;
    };
    let already_terminal = task.state.is_terminal();
    let last_seen = task.last_event_seq;
    let _ = tx.send(ServerEnvelope::reply(request_id, ServerEvent::Task { task }));

    if !already_terminal {
        while let Some(item) = events.next().await {
            match item {
                Ok(update) if update.task_id == task_id && update.seq > last_seen => {
                    let finished = matches!(
                        update.event,
                        TaskEvent::StateChanged { to, .. } if to.is_terminal()
                    );
                    let send = tx.send(ServerEnvelope::push(ServerEvent::TaskUpdate {
                        task_id,
                        seq: update.seq,
                        event: update.event,
                    }));
                    if finished || send.is_err() {
                        break;
                    }
                }
                Ok(_) => continue,
                // A lagged subscriber skips ahead; the terminal event may have
                // been dropped, so re-check the snapshot.
                Err(e) => {
                    tracing::warn!(%task_id, error = %e, "task update stream lagged");
                    if manager.get(task_id).map(|t| t.state.is_terminal()).unwrap_or(true) {
                        break;
                    }
                }
            }
        }
    }

    let _ = tx.send(ServerEnvelope::push(ServerEvent::StreamClosed { task_id }));
}
