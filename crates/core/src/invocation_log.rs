use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::invocation::UserId;
use crate::errors::QueryBotError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationLogEntry {
    pub logged_at: DateTime<Utc>,
    pub user_id: UserId,
    pub display_name: String,
}

impl InvocationLogEntry {
    pub fn new(
        logged_at: DateTime<Utc>,
        user_id: UserId,
        display_name: impl Into<String>,
    ) -> Self {
        Self { logged_at, user_id, display_name: display_name.into() }
    }

    /// One newline-terminated line: `<rfc3339 timestamp> <display name>`.
    pub fn to_line(&self) -> String {
        let name: String = self
            .display_name
            .chars()
            .map(|ch| if ch.is_control() { ' ' } else { ch })
            .collect();
        format!("{} {}\n", self.logged_at.to_rfc3339_opts(SecondsFormat::Millis, true), name.trim())
    }
}

#[async_trait]
pub trait InvocationLog: Send + Sync {
    async fn record(&self, entry: &InvocationLogEntry) -> Result<(), QueryBotError>;
}

/// Appends entries to a flat text file and mirrors each one as a `tracing` event.
#[derive(Clone, Debug)]
pub struct FileInvocationLog {
    path: Arc<PathBuf>,
}

impl FileInvocationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: Arc::new(path.into()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InvocationLog for FileInvocationLog {
    async fn record(&self, entry: &InvocationLogEntry) -> Result<(), QueryBotError> {
        let path = Arc::clone(&self.path);
        let line = entry.to_line();

        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|error| QueryBotError::Persistence(error.to_string()))??;

        info!(
            event_name = "querybot.invocation.logged",
            user_id = %entry.user_id.as_str(),
            display_name = %entry.display_name,
            logged_at = %entry.logged_at.to_rfc3339(),
            "slash command invocation logged"
        );
        Ok(())
    }
}

// The whole line goes out in one write on an O_APPEND handle so concurrent
// writers never interleave within a line.
fn append_line(path: &Path, line: &str) -> Result<(), QueryBotError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            QueryBotError::Persistence(format!("{}: {error}", parent.display()))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|error| QueryBotError::Persistence(format!("{}: {error}", path.display())))?;
    file.write_all(line.as_bytes())
        .map_err(|error| QueryBotError::Persistence(format!("{}: {error}", path.display())))
}

#[derive(Clone, Default)]
pub struct InMemoryInvocationLog {
    entries: Arc<Mutex<Vec<InvocationLogEntry>>>,
}

impl InMemoryInvocationLog {
    pub fn entries(&self) -> Vec<InvocationLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl InvocationLog for InMemoryInvocationLog {
    async fn record(&self, entry: &InvocationLogEntry) -> Result<(), QueryBotError> {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::{FileInvocationLog, InvocationLog, InvocationLogEntry};
    use crate::domain::invocation::UserId;
    use crate::errors::QueryBotError;

    fn entry(name: &str, second: u32) -> InvocationLogEntry {
        InvocationLogEntry::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, second).single().expect("timestamp"),
            UserId(format!("U-{name}")),
            name,
        )
    }

    #[test]
    fn line_starts_with_timestamp_and_ends_with_display_name() {
        assert_eq!(entry("Ada Lovelace", 53).to_line(), "2026-03-14T09:26:53.000Z Ada Lovelace\n");
    }

    #[test]
    fn control_characters_in_display_name_cannot_break_the_line() {
        let line = entry("evil\nname\r", 0).to_line();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with("evil name\n"));
    }

    #[tokio::test]
    async fn file_log_appends_and_creates_parent_directories() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("invocations.log");
        let log = FileInvocationLog::new(&path);

        log.record(&entry("first", 1)).await.expect("first append");
        log.record(&entry("second", 2)).await.expect("second append");

        let contents = fs::read_to_string(&path).expect("log file");
        assert_eq!(
            contents,
            "2026-03-14T09:26:01.000Z first\n2026-03-14T09:26:02.000Z second\n"
        );
    }

    #[tokio::test]
    async fn concurrent_appends_produce_whole_distinct_lines() {
        let dir = TempDir::new().expect("tempdir");
        let log = FileInvocationLog::new(dir.path().join("invocations.log"));

        let mut tasks = Vec::new();
        for index in 0..32u32 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                log.record(&entry(&format!("user-{index}"), index % 60)).await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("append");
        }

        let contents = fs::read_to_string(log.path()).expect("log file");
        let mut lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 32);
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len(), 32, "every invocation should produce its own line");
        for index in 0..32u32 {
            let suffix = format!(" user-{index}");
            assert_eq!(lines.iter().filter(|line| line.ends_with(&suffix)).count(), 1);
        }
    }

    #[tokio::test]
    async fn unwritable_path_maps_to_persistence_error() {
        let dir = TempDir::new().expect("tempdir");
        let log = FileInvocationLog::new(dir.path());

        let error = log.record(&entry("nobody", 0)).await.expect_err("directory is not a file");
        assert!(matches!(error, QueryBotError::Persistence(_)));
    }
}
