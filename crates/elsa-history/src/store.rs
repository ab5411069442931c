// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::debug;

use crate::Journal;

/// Stores conversation journals in a per-user cache directory.
///
/// File names encode `<conversationId>---<agentName>---<yyyymmdd-HHMMSS>.json`.
/// A purely numeric conversation identifier is reserved for pick-by-recency:
/// `1` is the most recently modified journal.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The standard per-user history location.
    pub fn default_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::cache_dir()
            .context("no cache directory available")?
            .join("elsa/history"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive a fresh journal path for a new conversation.
    pub fn new_conversation_path(&self, conversation_id: &str, agent_name: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        self.dir
            .join(format!("{conversation_id}---{agent_name}---{stamp}.json"))
    }

    /// Locate an existing journal.  Numeric identifiers select by recency
    /// (1-based, most recent first); anything else matches the filename's
    /// conversation-id prefix literally.
    pub fn locate(&self, conversation_id: &str) -> anyhow::Result<PathBuf> {
        let mut entries = self.journal_files()?;
        if entries.is_empty() {
            bail!("no conversation history in {}", self.dir.display());
        }

        if let Ok(n) = conversation_id.parse::<usize>() {
            if n == 0 {
                bail!("conversation index is 1-based");
            }
            entries.sort_by(|a, b| b.1.cmp(&a.1));
            return match entries.into_iter().nth(n - 1) {
                Some((path, _)) => Ok(path),
                None => bail!("no conversation at index {n}"),
            };
        }

        let prefix = format!("{conversation_id}---");
        entries
            .into_iter()
            .map(|(path, _)| path)
            .find(|p| {
                p.file_name()
                    .map(|f| f.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .with_context(|| format!("no conversation matching '{conversation_id}'"))
    }

    /// Read and parse a journal.  Missing fields default to empty.
    pub fn load(&self, path: &Path) -> anyhow::Result<Journal> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Rewrite the whole journal.  The write goes to a sibling temp file
    /// followed by a rename, so a reader never observes a torn file.
    pub fn save(&self, path: &Path, journal: &Journal) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let text = serde_json::to_string_pretty(journal).context("serializing journal")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("replacing {}", path.display()))?;
        debug!(path = %path.display(), messages = journal.messages.len(), "journal saved");
        Ok(())
    }

    /// All `.json` journal files with their modification times.
    fn journal_files(&self) -> anyhow::Result<Vec<(PathBuf, std::time::SystemTime)>> {
        let mut files = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Ok(files),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, mtime));
            }
        }
        Ok(files)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
