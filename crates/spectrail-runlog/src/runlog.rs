//! Durable, append-only run log backed by SQLite, bridged to async call sites via
//! `tokio::task::spawn_blocking` the same way the corpus's SQLite session store does: a
//! single `Arc<Mutex<Connection>>`, pragmas applied once at construction, grouped writes
//! wrapped in `unchecked_transaction()`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use spectrail_core::{Error, Result};
use uuid::Uuid;

use crate::models::{Artifact, MessageRow, Project, Run, Task, ToolCallRow};
use crate::schema::DDL;

#[derive(Clone)]
pub struct RunLog {
    conn: Arc<Mutex<Connection>>,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn pg(e: rusqlite::Error) -> Error {
    Error::PersistenceError(e.to_string())
}

impl RunLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(pg)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(pg)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(pg)?;
        conn.execute_batch(DDL).map_err(pg)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| Error::PersistenceError(format!("lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| Error::PersistenceError(format!("blocking task join failed: {e}")))?
    }

    // ---- minimal external-entity constructors (§3 expansion note) ----

    pub async fn create_project(&self, name: impl Into<String>, repo_path: impl Into<String>) -> Result<Project> {
        let project = Project { id: new_id(), name: name.into(), repo_path: repo_path.into(), created_at: now() };
        let row = project.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO projects (id, name, repo_path, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.name, row.repo_path, row.created_at],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(project)
    }

    pub async fn create_task(
        &self,
        project_id: impl Into<String>,
        title: impl Into<String>,
        mode: impl Into<String>,
        status: impl Into<String>,
    ) -> Result<Task> {
        let task =
            Task { id: new_id(), project_id: project_id.into(), title: title.into(), mode: mode.into(), status: status.into() };
        let row = task.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, project_id, title, mode, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.id, row.project_id, row.title, row.mode, row.status],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(task)
    }

    pub async fn get_project(&self, project_id: impl Into<String>) -> Result<Project> {
        let project_id = project_id.into();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, name, repo_path, created_at FROM projects WHERE id = ?1",
                params![project_id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        repo_path: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::RepoUnavailable(format!("no such project: {project_id}"))
                }
                e => pg(e),
            })
        })
        .await
    }

    pub async fn get_task(&self, task_id: impl Into<String>) -> Result<Task> {
        let task_id = task_id.into();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, project_id, title, mode, status FROM tasks WHERE id = ?1",
                params![task_id],
                |row| {
                    Ok(Task {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        title: row.get(2)?,
                        mode: row.get(3)?,
                        status: row.get(4)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::PersistenceError(format!("no such task: {task_id}"))
                }
                e => pg(e),
            })
        })
        .await
    }

    // ---- run lifecycle ----

    pub async fn open_run(
        &self,
        task_id: impl Into<String>,
        run_type: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Run> {
        let run = Run {
            id: new_id(),
            task_id: task_id.into(),
            phase_id: None,
            run_type: run_type.into(),
            provider: provider.into(),
            model: model.into(),
            started_at: now(),
            ended_at: None,
        };
        let row = run.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO runs (id, task_id, phase_id, run_type, provider, model, started_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
                params![row.id, row.task_id, row.phase_id, row.run_type, row.provider, row.model, row.started_at],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(run)
    }

    /// Sets `ended_at`. Idempotent-ish in practice but not called twice by AgentLoop; an
    /// already-closed run is left untouched rather than erroring, since a late double-close
    /// (e.g. from a cancellation race) shouldn't itself abort cleanup.
    pub async fn close_run(&self, run_id: impl Into<String>) -> Result<()> {
        let run_id = run_id.into();
        let ended_at = now();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE runs SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
                params![ended_at, run_id],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await
    }

    fn ensure_open(conn: &Connection, run_id: &str) -> Result<()> {
        let ended_at: Option<String> = conn
            .query_row("SELECT ended_at FROM runs WHERE id = ?1", params![run_id], |row| row.get(0))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::PersistenceError(format!("no such run: {run_id}"))
                }
                e => pg(e),
            })?;
        if ended_at.is_some() {
            return Err(Error::PersistenceError(format!("run {run_id} is closed")));
        }
        Ok(())
    }

    // ---- append-only writes ----

    pub async fn append_message(
        &self,
        run_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<MessageRow> {
        let row = MessageRow {
            id: new_id(),
            run_id: run_id.into(),
            role: role.into(),
            content: content.into(),
            created_at: now(),
        };
        let insert = row.clone();
        self.blocking(move |conn| {
            Self::ensure_open(conn, &insert.run_id)?;
            conn.execute(
                "INSERT INTO messages (id, run_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![insert.id, insert.run_id, insert.role, insert.content, insert.created_at],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(row)
    }

    pub async fn append_tool_call(
        &self,
        run_id: impl Into<String>,
        name: impl Into<String>,
        args_json: impl Into<String>,
        result_json: impl Into<String>,
    ) -> Result<ToolCallRow> {
        let row = ToolCallRow {
            id: new_id(),
            run_id: run_id.into(),
            name: name.into(),
            args_json: args_json.into(),
            result_json: result_json.into(),
            created_at: now(),
        };
        let insert = row.clone();
        self.blocking(move |conn| {
            Self::ensure_open(conn, &insert.run_id)?;
            conn.execute(
                "INSERT INTO tool_calls (id, run_id, name, args_json, result_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![insert.id, insert.run_id, insert.name, insert.args_json, insert.result_json, insert.created_at],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(row)
    }

    /// Groups one assistant message with the tool-call rows and tool-result messages it
    /// spawned into a single transaction (§3 invariant 3 / §4.6: "a crash mid-step leaves
    /// either all or none of that step's rows visible").
    pub async fn append_step(
        &self,
        run_id: impl Into<String>,
        assistant_content: impl Into<String>,
        tool_results: Vec<(ToolCallRow, MessageRow)>,
    ) -> Result<MessageRow> {
        let run_id = run_id.into();
        let assistant = MessageRow {
            id: new_id(),
            run_id: run_id.clone(),
            role: "assistant".to_string(),
            content: assistant_content.into(),
            created_at: now(),
        };
        let insert = assistant.clone();
        self.blocking(move |conn| {
            Self::ensure_open(conn, &insert.run_id)?;
            let tx = conn.unchecked_transaction().map_err(pg)?;
            tx.execute(
                "INSERT INTO messages (id, run_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![insert.id, insert.run_id, insert.role, insert.content, insert.created_at],
            )
            .map_err(pg)?;
            for (call, result_message) in &tool_results {
                tx.execute(
                    "INSERT INTO tool_calls (id, run_id, name, args_json, result_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![call.id, call.run_id, call.name, call.args_json, call.result_json, call.created_at],
                )
                .map_err(pg)?;
                tx.execute(
                    "INSERT INTO messages (id, run_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        result_message.id,
                        result_message.run_id,
                        result_message.role,
                        result_message.content,
                        result_message.created_at
                    ],
                )
                .map_err(pg)?;
            }
            tx.commit().map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(assistant)
    }

    /// Upsert by `(task_id, kind)`: a new snapshot replaces the previous row's content while
    /// keeping the same primary key (§3 invariant 4 — "the id may be reused, but `created_at`
    /// advances").
    pub async fn upsert_artifact(
        &self,
        task_id: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Artifact> {
        let task_id = task_id.into();
        let kind = kind.into();
        let content = content.into();
        let created_at = now();

        let existing_id: Option<String> = {
            let conn = Arc::clone(&self.conn);
            let tid = task_id.clone();
            let k = kind.clone();
            tokio::task::spawn_blocking(move || {
                let guard = conn.lock().unwrap();
                guard
                    .query_row(
                        "SELECT id FROM artifacts WHERE task_id = ?1 AND kind = ?2",
                        params![tid, k],
                        |row| row.get(0),
                    )
                    .ok()
            })
            .await
            .map_err(|e| Error::PersistenceError(format!("blocking task join failed: {e}")))?
        };

        let id = existing_id.unwrap_or_else(new_id);
        let artifact =
            Artifact { id: id.clone(), task_id: task_id.clone(), phase_id: None, kind: kind.clone(), content: content.clone(), created_at: created_at.clone(), pinned: false };
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO artifacts (id, task_id, phase_id, kind, content, created_at, pinned)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5, 0)
                 ON CONFLICT(task_id, kind) DO UPDATE SET content = excluded.content, created_at = excluded.created_at",
                params![id, task_id, kind, content, created_at],
            )
            .map_err(pg)?;
            Ok(())
        })
        .await?;
        Ok(artifact)
    }

    // ---- read queries ----

    pub async fn list_messages(&self, run_id: impl Into<String>) -> Result<Vec<MessageRow>> {
        let run_id = run_id.into();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, run_id, role, content, created_at FROM messages WHERE run_id = ?1 ORDER BY created_at ASC, id ASC")
                .map_err(pg)?;
            let rows = stmt
                .query_map(params![run_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })
                .map_err(pg)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(pg)?;
            Ok(rows)
        })
        .await
    }

    pub async fn list_tool_calls(&self, run_id: impl Into<String>) -> Result<Vec<ToolCallRow>> {
        let run_id = run_id.into();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, run_id, name, args_json, result_json, created_at FROM tool_calls
                     WHERE run_id = ?1 ORDER BY created_at ASC, id ASC",
                )
                .map_err(pg)?;
            let rows = stmt
                .query_map(params![run_id], |row| {
                    Ok(ToolCallRow {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        name: row.get(2)?,
                        args_json: row.get(3)?,
                        result_json: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })
                .map_err(pg)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(pg)?;
            Ok(rows)
        })
        .await
    }

    pub async fn list_artifacts(&self, task_id: impl Into<String>) -> Result<Vec<Artifact>> {
        let task_id = task_id.into();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, task_id, phase_id, kind, content, created_at, pinned FROM artifacts
                     WHERE task_id = ?1 ORDER BY created_at ASC",
                )
                .map_err(pg)?;
            let rows = stmt
                .query_map(params![task_id], |row| {
                    Ok(Artifact {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        phase_id: row.get(2)?,
                        kind: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                        pinned: row.get::<_, i64>(6)? != 0,
                    })
                })
                .map_err(pg)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(pg)?;
            Ok(rows)
        })
        .await
    }

    // ---- settings ----

    /// Upserts every pair in `pairs` inside a single transaction: either all of them land or
    /// none do (§8 testable property 5 — "either all pairs are persisted or none").
    pub async fn bulk_upsert_settings(&self, pairs: Vec<(String, String)>) -> Result<()> {
        let updated_at = now();
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction().map_err(pg)?;
            for (key, value) in &pairs {
                tx.execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )
                .map_err(pg)?;
            }
            tx.commit().map_err(pg)?;
            Ok(())
        })
        .await
    }

    /// Reads the full settings table as a flat map, the shape `Settings::from_map` expects.
    pub async fn get_settings_map(&self) -> Result<std::collections::HashMap<String, String>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings").map_err(pg)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(pg)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(pg)?;
            Ok(rows.into_iter().collect())
        })
        .await
    }

    pub async fn get_run(&self, run_id: impl Into<String>) -> Result<Run> {
        let run_id = run_id.into();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, task_id, phase_id, run_type, provider, model, started_at, ended_at FROM runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(Run {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        phase_id: row.get(2)?,
                        run_type: row.get(3)?,
                        provider: row.get(4)?,
                        model: row.get(5)?,
                        started_at: row.get(6)?,
                        ended_at: row.get(7)?,
                    })
                },
            )
            .map_err(pg)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (RunLog, Task) {
        let log = RunLog::in_memory().unwrap();
        let project = log.create_project("demo", "/repo").await.unwrap();
        let task = log.create_task(&project.id, "do the thing", "plan", "active").await.unwrap();
        (log, task)
    }

    #[tokio::test]
    async fn open_then_close_run_sets_ended_at() {
        let (log, task) = seeded().await;
        let run = log.open_run(&task.id, "plan", "openai", "gpt-4o").await.unwrap();
        assert!(run.ended_at.is_none());
        log.close_run(&run.id).await.unwrap();
        let reloaded = log.get_run(&run.id).await.unwrap();
        assert!(reloaded.ended_at.is_some());
    }

    #[tokio::test]
    async fn append_message_rejects_closed_run() {
        let (log, task) = seeded().await;
        let run = log.open_run(&task.id, "plan", "openai", "gpt-4o").await.unwrap();
        log.close_run(&run.id).await.unwrap();
        let err = log.append_message(&run.id, "user", "hi").await.unwrap_err();
        assert!(matches!(err, Error::PersistenceError(_)));
    }

    #[tokio::test]
    async fn messages_are_ordered_by_creation() {
        let (log, task) = seeded().await;
        let run = log.open_run(&task.id, "plan", "openai", "gpt-4o").await.unwrap();
        log.append_message(&run.id, "system", "sys").await.unwrap();
        log.append_message(&run.id, "user", "go").await.unwrap();
        let messages = log.list_messages(&run.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }

    #[tokio::test]
    async fn append_step_groups_assistant_and_tool_rows() {
        let (log, task) = seeded().await;
        let run = log.open_run(&task.id, "plan", "openai", "gpt-4o").await.unwrap();

        let call = ToolCallRow {
            id: "call-1".to_string(),
            run_id: run.id.clone(),
            name: "list_files".to_string(),
            args_json: "{}".to_string(),
            result_json: "{\"files\":[]}".to_string(),
            created_at: now(),
        };
        let result_message = MessageRow {
            id: "msg-result".to_string(),
            run_id: run.id.clone(),
            role: "tool".to_string(),
            content: "{\"files\":[]}".to_string(),
            created_at: now(),
        };

        log.append_step(&run.id, "calling list_files", vec![(call, result_message)]).await.unwrap();

        let messages = log.list_messages(&run.id).await.unwrap();
        let tool_calls = log.list_tool_calls(&run.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "assistant");
        assert_eq!(messages[1].role, "tool");
        assert_eq!(tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn upsert_artifact_replaces_previous_content_for_same_kind() {
        let (log, task) = seeded().await;
        let first = log.upsert_artifact(&task.id, "plan_md", "v1").await.unwrap();
        let second = log.upsert_artifact(&task.id, "plan_md", "v2").await.unwrap();
        assert_eq!(first.id, second.id);

        let artifacts = log.list_artifacts(&task.id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].content, "v2");
    }

    #[tokio::test]
    async fn upsert_artifact_keeps_distinct_kinds_separate() {
        let (log, task) = seeded().await;
        log.upsert_artifact(&task.id, "plan_md", "plan").await.unwrap();
        log.upsert_artifact(&task.id, "notes", "notes").await.unwrap();
        let artifacts = log.list_artifacts(&task.id).await.unwrap();
        assert_eq!(artifacts.len(), 2);
    }

    #[tokio::test]
    async fn unknown_run_on_append_message_is_persistence_error() {
        let log = RunLog::in_memory().unwrap();
        let err = log.append_message("no-such-run", "user", "hi").await.unwrap_err();
        assert!(matches!(err, Error::PersistenceError(_)));
    }

    #[tokio::test]
    async fn bulk_upsert_settings_persists_all_pairs() {
        let log = RunLog::in_memory().unwrap();
        log.bulk_upsert_settings(vec![
            ("model".to_string(), "gpt-4o".to_string()),
            ("temperature".to_string(), "0.2".to_string()),
        ])
        .await
        .unwrap();
        let map = log.get_settings_map().await.unwrap();
        assert_eq!(map.get("model").unwrap(), "gpt-4o");
        assert_eq!(map.get("temperature").unwrap(), "0.2");
    }

    #[tokio::test]
    async fn bulk_upsert_settings_overwrites_existing_keys() {
        let log = RunLog::in_memory().unwrap();
        log.bulk_upsert_settings(vec![("model".to_string(), "gpt-4o".to_string())]).await.unwrap();
        log.bulk_upsert_settings(vec![("model".to_string(), "gpt-4o-mini".to_string())]).await.unwrap();
        let map = log.get_settings_map().await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("model").unwrap(), "gpt-4o-mini");
    }
}
