use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{context, path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::categories::{Catalog, Category, Selection};
use crate::chat::ChatContext;
use crate::constants;
use crate::markdown;
use crate::oracle::Oracle;
use crate::prompt::PromptBuilder;
use crate::session::{Role, Session};

/// Events sent by the browser over the WebSocket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Select {
        main: String,
        #[serde(default)]
        sub: Option<String>,
    },
    Reset,
    Submit {
        text: String,
    },
}

/// Events pushed to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Render(PageView),
}

/// Everything the page needs to redraw itself after one interaction.
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub heading: String,
    pub caption: String,
    pub selection: Selection,
    pub subcategories: Vec<&'static str>,
    pub transcript_html: String,
    /// A reply is being generated for the last user message.
    pub pending: bool,
    pub error: Option<String>,
}

/// Message entries carry rendered HTML; error entries carry plain text.
#[derive(Serialize)]
struct TranscriptEntry<'a> {
    kind: &'static str,
    role: &'static str,
    avatar: &'static str,
    content: Cow<'a, str>,
}

fn message_entry(role: Role, content: &str) -> TranscriptEntry<'_> {
    let (role, avatar) = match role {
        Role::User => ("user", "👤"),
        Role::Assistant => ("assistant", "🔮"),
    };
    TranscriptEntry {
        kind: "message",
        role,
        avatar,
        content: Cow::Owned(markdown::to_html(content)),
    }
}

fn transcript_entries<'a>(session: &'a Session, pending: Option<&'a str>) -> Vec<TranscriptEntry<'a>> {
    let mut entries = Vec::with_capacity(session.messages().len() + 2);
    for (idx, message) in session.messages().iter().enumerate() {
        entries.push(message_entry(message.role, &message.content));
        for note in session.annotations().iter().filter(|a| a.after == idx) {
            entries.push(TranscriptEntry {
                kind: "error",
                role: "assistant",
                avatar: "⚠️",
                content: Cow::Borrowed(&note.text),
            });
        }
    }
    if let Some(text) = pending {
        entries.push(message_entry(Role::User, text));
        entries.push(TranscriptEntry {
            kind: "pending",
            role: "assistant",
            avatar: "🔮",
            content: Cow::Borrowed(""),
        });
    }
    entries
}

/// Renders the current state of `ctx`; `pending` is a user message still awaiting its reply.
pub fn render_view(templates: &AutoReloader, ctx: &ChatContext, pending: Option<&str>) -> Result<PageView> {
    let selection = ctx.selector().current_selection();
    let entries = ctx
        .manager()
        .session()
        .map(|s| transcript_entries(s, pending))
        .unwrap_or_default();

    let env = templates.acquire_env().context("Failed to load templates")?;
    let transcript_html = env
        .get_template("transcript.html")
        .and_then(|tmpl| tmpl.render(context! { entries => entries }))
        .context("Failed to render transcript")?;

    Ok(PageView {
        heading: format!("🔮 {}", selection.sub),
        caption: ctx.caption(),
        subcategories: ctx.selector().current_subcategories().to_vec(),
        selection,
        transcript_html,
        pending: pending.is_some(),
        error: ctx.error().map(str::to_string),
    })
}

/// Runs one interaction against `ctx`, pushing every render to `tx`.
pub async fn process_event(
    ctx: &mut ChatContext,
    event: ClientEvent,
    templates: &AutoReloader,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<()> {
    debug!(?event, "Processing client event");
    ctx.clear_error();
    let pending = match event {
        ClientEvent::Select { main, sub } => {
            let _ = ctx.select(&main, sub.as_deref());
            None
        }
        ClientEvent::Reset => {
            ctx.reset();
            None
        }
        ClientEvent::Submit { text } => (!text.trim().is_empty()).then_some(text),
    };

    // Errors are kept on the context and shown on the page.
    let _ = ctx.refresh().await;

    if let Some(text) = pending {
        if ctx.manager().is_live() {
            send(tx, render_view(templates, ctx, Some(&text))?);
            let _ = ctx.submit(&text).await;
        }
    }
    send(tx, render_view(templates, ctx, None)?);
    Ok(())
}

fn send(tx: &mpsc::UnboundedSender<ServerEvent>, view: PageView) {
    if tx.send(ServerEvent::Render(view)).is_err() {
        warn!("Render dropped: connection already closed");
    }
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptBuilder>,
    catalog: Catalog,
}

impl AppState {
    pub fn new(templates: AutoReloader, oracle: Arc<dyn Oracle>, prompts: PromptBuilder, catalog: Catalog) -> Self {
        Self {
            templates: Arc::new(templates),
            oracle,
            prompts: Arc::new(prompts),
            catalog,
        }
    }

    fn new_context(&self) -> ChatContext {
        ChatContext::new(self.catalog, Arc::clone(&self.oracle), Arc::clone(&self.prompts))
    }
}

// Minijinja Environment setup
pub fn create_minijinja_env(template_dir: impl AsRef<Path>) -> AutoReloader {
    let template_dir: PathBuf = template_dir.as_ref().to_path_buf();
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&template_dir));
        // Watch the templates directory for changes
        notifier.watch_path(&template_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let selection = state.catalog.default_selection();
    let subcategories = state.catalog.subcategories(&selection.main).unwrap_or(&[]);

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(context! {
                    title => constants::PAGE_TITLE,
                    categories => state.catalog.categories(),
                    selection => selection,
                    subcategories => subcategories,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn categories_handler(State(state): State<AppState>) -> Json<&'static [Category]> {
    Json(state.catalog.categories())
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Each connection owns its own ChatContext for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        warn!("WebSocket client disconnected or send error. Closing connection.");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize server event: {}", e),
            }
        }
    });

    let mut ctx = state.new_context();
    let _ = ctx.refresh().await;
    match render_view(&state.templates, &ctx, None) {
        Ok(view) => send(&tx, view),
        Err(e) => error!("Initial render failed: {:?}", e),
    }

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if let Err(e) = process_event(&mut ctx, event, &state.templates, &tx).await {
                        error!("Failed to process client event: {:?}", e);
                    }
                }
                Err(e) => warn!("Ignoring malformed client message: {}", e),
            },
            Message::Binary(_) => {
                warn!("Received unexpected binary message from client");
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    info!("WebSocket connection closed");
}

pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    // Serve static files from the configured directory
    let static_files_service = ServeDir::new(static_dir.as_ref()).not_found_service(tower::service_fn(|_req: axum::extract::Request| async {
        Ok::<Response, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/categories", get(categories_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, state: AppState, static_dir: PathBuf) -> Result<()> {
    let app = router(state, static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
