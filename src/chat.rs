// Per-user chat state shared by the web UI and the terminal chat.
// Each connection owns one ChatContext; nothing here is shared between users.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::categories::{Catalog, CategoryError, CategorySelector, Selection};
use crate::oracle::Oracle;
use crate::prompt::{self, PromptBuilder};
use crate::session::{Role, SessionError, SessionManager};

pub struct ChatContext {
    selector: CategorySelector,
    manager: SessionManager,
    refreshed_at: DateTime<Local>,
    /// Page-level failure from the last cycle (bad selection, session could not be opened).
    error: Option<String>,
}

impl ChatContext {
    pub fn new(catalog: Catalog, oracle: Arc<dyn Oracle>, prompts: Arc<PromptBuilder>) -> Self {
        Self {
            selector: CategorySelector::new(catalog),
            manager: SessionManager::new(oracle, prompts),
            refreshed_at: Local::now(),
            error: None,
        }
    }

    pub fn selector(&self) -> &CategorySelector {
        &self.selector
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn refreshed_at(&self) -> DateTime<Local> {
        self.refreshed_at
    }

    /// `기준 시각: ... | 상담가: 지천명`
    pub fn caption(&self) -> String {
        format!(
            "기준 시각: {} | 상담가: {}",
            prompt::format_timestamp(&self.refreshed_at),
            crate::constants::COUNSELOR_NAME
        )
    }

    /// One reconciliation pass: reads the selection and makes sure the
    /// session matches it.
    pub async fn refresh(&mut self) -> Result<(), SessionError> {
        self.refresh_at(Local::now()).await
    }

    pub async fn refresh_at(&mut self, now: DateTime<Local>) -> Result<(), SessionError> {
        self.refreshed_at = now;
        let selection = self.selector.current_selection();
        match self.manager.ensure_session(&selection, now).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Forgets the previous cycle's page error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn select(&mut self, main: &str, sub: Option<&str>) -> Result<Selection, CategoryError> {
        self.selector.select(main, sub).inspect_err(|e| {
            warn!(error = %e, "Rejected category selection");
            self.error = Some(e.to_string());
        })
    }

    pub fn reset(&mut self) {
        self.manager.reset();
    }

    pub async fn submit(&mut self, text: &str) -> Result<String, SessionError> {
        self.manager.submit(text).await
    }
}

/// Interactive consultation on stdin/stdout.
///
/// `/reset` starts over, `/quit` or end of input leaves. A consultation that
/// cannot be opened is reported and retried on the next line.
pub async fn run_terminal_chat(mut ctx: ChatContext, main: &str, sub: Option<&str>) -> Result<()> {
    ctx.select(main, sub).context("Invalid category selection")?;
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut printed = 0;
    loop {
        open_and_print(&mut ctx, &mut stdout, &mut printed).await?;

        stdout.write_all("👤 > ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let text = line.trim();
        match text {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                ctx.reset();
                printed = 0;
                continue;
            }
            _ => {}
        }

        if !ctx.manager().is_live() && !open_and_print(&mut ctx, &mut stdout, &mut printed).await? {
            continue;
        }
        if let Err(e) = ctx.submit(text).await {
            stdout.write_all(format!("⚠️  {e}\n\n").as_bytes()).await?;
        }
        // The user's line is already on screen.
        if let Some(session) = ctx.manager().session() {
            printed = printed.max(session.messages().len().saturating_sub(1));
        }
    }

    info!("Terminal chat finished");
    Ok(())
}

/// Reconciles and prints whatever the user has not seen yet. Returns whether a
/// consultation is open.
async fn open_and_print(ctx: &mut ChatContext, stdout: &mut tokio::io::Stdout, printed: &mut usize) -> Result<bool> {
    if let Err(e) = ctx.refresh().await {
        *printed = 0;
        stdout.write_all(format!("⚠️  {e}\n\n").as_bytes()).await?;
        return Ok(false);
    }
    let Some(session) = ctx.manager().session() else {
        return Ok(false);
    };
    if *printed == 0 {
        let heading = format!("🔮 {}\n{}\n\n", session.selected(), ctx.caption());
        stdout.write_all(heading.as_bytes()).await?;
    }
    for message in &session.messages()[*printed..] {
        if message.role == Role::Assistant {
            stdout.write_all(format!("🔮 {}\n\n", message.content).as_bytes()).await?;
        }
    }
    *printed = session.messages().len();
    Ok(true)
}
