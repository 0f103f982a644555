// src/services/notifier.rs

//! Change notification rendering and delivery.
//!
//! One notification per run, rendered as a markdown issue. Delivery goes
//! to the log, a file, or a GitHub issue.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{ChangeKind, ChangeRecord, DocumentDescriptor, NotifierConfig, NotifierKind};
use crate::storage::local::write_atomic;

/// A rendered notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Delivery channel for a run's notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Verify credentials before the run touches any document.
    ///
    /// `AppError::Auth` aborts the run; other errors are only logged.
    async fn preflight(&self) -> Result<()> {
        Ok(())
    }

    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Render the notification for a batch of NEW/CHANGED records.
pub fn render_notification(
    config: &NotifierConfig,
    changes: &[ChangeRecord],
    documents: &HashMap<&str, &DocumentDescriptor>,
    now: DateTime<Utc>,
) -> Notification {
    let mut body = String::new();
    let _ = writeln!(body, "## Document Changes Detected\n");
    let _ = writeln!(
        body,
        "**Detection Time:** {}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(body, "**Total Changes:** {}\n", changes.len());

    for record in changes {
        let doc = documents.get(record.document_id.as_str());
        let name = doc.map(|d| d.display_name()).unwrap_or(record.document_id.as_str());
        let kind = match record.kind {
            ChangeKind::New => "New",
            ChangeKind::Changed => "Updated",
            ChangeKind::Unchanged => "Unchanged",
            ChangeKind::Ambiguous => "Unverified",
        };

        let _ = writeln!(body, "### {kind}: {name}");
        if let Some(doc) = doc {
            let _ = writeln!(body, "- **URL:** {}", doc.url);
            if !doc.category.is_empty() {
                let _ = writeln!(body, "- **Category:** {}", doc.category);
            }
        }
        if let Some(fp) = &record.current {
            let _ = writeln!(
                body,
                "- **Last Modified:** {}",
                fp.validators.last_modified.as_deref().unwrap_or("Unknown")
            );
            let _ = writeln!(body, "- **File Size:** {} bytes", fp.size);
            let _ = writeln!(body, "- **Content Hash:** `{}...`", fp.short_hash());
        }
        if let Some(prev) = &record.previous {
            let _ = writeln!(body, "- **Previous Hash:** `{}...`", prev.short_hash());
        }
        body.push('\n');
    }

    body.push_str(
        "## Next Steps\n\
         - [ ] Review document changes\n\
         - [ ] Update training materials if needed\n\
         - [ ] Check compliance requirements\n\
         - [ ] Notify relevant stakeholders\n\
         \n\
         ---\n\
         *This issue was automatically created by docwatch.*\n",
    );

    Notification {
        title: format!("{} - {}", config.title, now.format("%Y-%m-%d")),
        body,
        labels: config.labels.clone(),
    }
}

/// Writes the notification to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        log::info!("{}", notification.title);
        for line in notification.body.lines() {
            log::info!("    {}", line);
        }
        Ok(())
    }
}

/// Writes the notification as a markdown file for a later step to pick up.
pub struct FileNotifier {
    path: PathBuf,
}

impl FileNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    fn name(&self) -> &str {
        "file"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut content = format!("# {}\n\n", notification.title);
        if !notification.labels.is_empty() {
            let _ = writeln!(content, "Labels: {}\n", notification.labels.join(", "));
        }
        content.push_str(&notification.body);

        write_atomic(&self.path, content.as_bytes())
            .await
            .map_err(|e| AppError::Notify(format!("{}: {e}", self.path.display())))?;
        log::info!("Notification written to {}", self.path.display());
        Ok(())
    }
}

/// Opens a GitHub issue through the REST API.
pub struct GithubIssueNotifier {
    client: Client,
    api_base: String,
    repository: String,
    token: String,
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

impl GithubIssueNotifier {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
        }
    }

    /// Build from config, reading the token from the configured env var.
    pub fn from_config(config: &NotifierConfig, client: Client) -> Result<Self> {
        let repository = config
            .repository
            .clone()
            .ok_or_else(|| AppError::config("notifier.repository is not set"))?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::Auth(format!("{} is not set", config.token_env)))?;
        Ok(Self::new(client, &config.api_base, repository, token))
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}", self.api_base, self.repository)
    }
}

fn auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

#[async_trait]
impl Notifier for GithubIssueNotifier {
    fn name(&self) -> &str {
        "github"
    }

    async fn preflight(&self) -> Result<()> {
        let response = self
            .client
            .get(self.repo_url())
            .header(ACCEPT, "application/vnd.github+json")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("preflight request failed: {e}")))?;

        let status = response.status();
        if auth_failure(status) || status == StatusCode::NOT_FOUND {
            return Err(AppError::Auth(format!(
                "cannot access {} with the configured token ({})",
                self.repository, status
            )));
        }
        if !status.is_success() {
            return Err(AppError::Notify(format!("preflight returned {status}")));
        }
        Ok(())
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let payload = IssueRequest {
            title: &notification.title,
            body: &notification.body,
            labels: &notification.labels,
        };
        let response = self
            .client
            .post(format!("{}/issues", self.repo_url()))
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("issue request failed: {e}")))?;

        let status = response.status();
        if auth_failure(status) {
            return Err(AppError::Auth(format!("GitHub rejected the token ({status})")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!("issue creation returned {status}: {detail}")));
        }

        let created: serde_json::Value = response.json().await.unwrap_or_default();
        match created.get("html_url").and_then(|u| u.as_str()) {
            Some(url) => log::info!("Created issue: {}", url),
            None => log::info!("Created issue in {}", self.repository),
        }
        Ok(())
    }
}

/// Construct the notifier selected in configuration.
///
/// Relative file paths resolve against `base_dir`.
pub fn build_notifier(
    config: &NotifierConfig,
    base_dir: &std::path::Path,
    client: Client,
) -> Result<Box<dyn Notifier>> {
    Ok(match config.kind {
        NotifierKind::Log => Box::new(LogNotifier),
        NotifierKind::File => Box::new(FileNotifier::new(base_dir.join(&config.output_path))),
        NotifierKind::Github => Box::new(GithubIssueNotifier::from_config(config, client)?),
    })
}
