//! Cached, file-backed knowledge base.

use crate::error::KnowledgeError;
use crate::record::KnownIssueRecord;
use rootcause::prelude::Report;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Read-through cache over the known-issues file.
///
/// The file is parsed on the first lookup and kept for the life of the
/// value. [`KnowledgeBase::reload`] and [`KnowledgeBase::invalidate`] are
/// the only ways to pick up edits to the file.
#[derive(Debug)]
pub struct KnowledgeBase {
    path: PathBuf,
    cache: RwLock<Option<Arc<Vec<KnownIssueRecord>>>>,
}

impl KnowledgeBase {
    /// Creates a knowledge base backed by `path`. Nothing is read yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// Creates a knowledge base that is already loaded with `records`.
    #[must_use]
    pub fn with_records(path: impl Into<PathBuf>, records: Vec<KnownIssueRecord>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(Some(Arc::new(records))),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns all records in file order, loading the file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub async fn records(&self) -> Result<Arc<Vec<KnownIssueRecord>>, Report<KnowledgeError>> {
        if let Some(records) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(records));
        }

        let mut cache = self.cache.write().await;
        if let Some(records) = cache.as_ref() {
            return Ok(Arc::clone(records));
        }
        let records = Arc::new(load(&self.path).await?);
        *cache = Some(Arc::clone(&records));
        Ok(records)
    }

    /// Returns every record with a keyword equal to one of `candidates`,
    /// ignoring case, in file order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn lookup(
        &self,
        candidates: &[String],
    ) -> Result<Vec<KnownIssueRecord>, Report<KnowledgeError>> {
        let records = self.records().await?;
        let matches: Vec<_> = records
            .iter()
            .filter(|record| record.matches_any(candidates))
            .cloned()
            .collect();
        debug!(matches = matches.len(), "knowledge base lookup");
        Ok(matches)
    }

    /// Returns the first matching record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub async fn first_match(
        &self,
        candidates: &[String],
    ) -> Result<Option<KnownIssueRecord>, Report<KnowledgeError>> {
        Ok(self.lookup(candidates).await?.into_iter().next())
    }

    /// Re-reads the file, replacing the cache only if the read succeeds.
    ///
    /// Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub async fn reload(&self) -> Result<usize, Report<KnowledgeError>> {
        let records = load(&self.path).await?;
        let count = records.len();
        *self.cache.write().await = Some(Arc::new(records));
        info!(path = %self.path.display(), records = count, "knowledge base reloaded");
        Ok(count)
    }

    /// Drops the cache; the next lookup reads the file again.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

async fn load(path: &Path) -> Result<Vec<KnownIssueRecord>, Report<KnowledgeError>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KnowledgeError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            KnowledgeError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    let records: Vec<KnownIssueRecord> =
        serde_json::from_str(&content).map_err(|e| KnowledgeError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    info!(path = %path.display(), records = records.len(), "knowledge base loaded");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ISSUES: &str = r#"[
        {
            "problema": "Conta bloqueada",
            "keywords": ["bloqueada", "senha"],
            "solucao": "Desbloquear e enviar reset",
            "taxa_sucesso": 0.9,
            "tools_required": ["UnlockAccount", "SendEmail"]
        },
        {
            "problema": "Senha expirada",
            "keywords": ["senha", "expirada"],
            "taxa_sucesso": 0.8,
            "tools_required": ["SendEmail"]
        },
        {
            "problema": "VPN instável",
            "keywords": ["vpn"],
            "prazo_resolucao": "04:00:00"
        }
    ]"#;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[tokio::test]
    async fn lookup_returns_matches_in_file_order() {
        let file = write_file(ISSUES);
        let kb = KnowledgeBase::new(file.path());

        let matches = kb.lookup(&keywords(&["SENHA"])).await.expect("lookup");
        let titles: Vec<_> = matches.iter().map(|r| r.problem.as_str()).collect();
        assert_eq!(titles, vec!["Conta bloqueada", "Senha expirada"]);
    }

    #[tokio::test]
    async fn first_match_takes_earliest_record() {
        let file = write_file(ISSUES);
        let kb = KnowledgeBase::new(file.path());

        let first = kb
            .first_match(&keywords(&["expirada", "bloqueada"]))
            .await
            .expect("lookup")
            .expect("match");
        assert_eq!(first.problem, "Conta bloqueada");
        assert_eq!(first.tools_required, vec!["UnlockAccount", "SendEmail"]);
    }

    #[tokio::test]
    async fn no_candidates_match_nothing() {
        let file = write_file(ISSUES);
        let kb = KnowledgeBase::new(file.path());
        assert!(kb.lookup(&keywords(&["impressora"])).await.expect("lookup").is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let kb = KnowledgeBase::new(dir.path().join("know_issues.json"));

        let err = kb.lookup(&keywords(&["senha"])).await.expect_err("missing");
        assert!(matches!(err.current_context(), KnowledgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_file_is_rejected() {
        let file = write_file("{ not json");
        let kb = KnowledgeBase::new(file.path());

        let err = kb.lookup(&keywords(&["senha"])).await.expect_err("malformed");
        assert!(matches!(err.current_context(), KnowledgeError::Malformed { .. }));
    }

    #[tokio::test]
    async fn cache_survives_file_changes_until_reload() {
        let file = write_file(ISSUES);
        let kb = KnowledgeBase::new(file.path());
        assert_eq!(kb.records().await.expect("load").len(), 3);

        std::fs::write(file.path(), "[]").expect("rewrite");

        assert_eq!(kb.records().await.expect("cached").len(), 3);
        assert_eq!(kb.reload().await.expect("reload"), 0);
        assert!(kb.records().await.expect("reloaded").is_empty());
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_cache() {
        let file = write_file(ISSUES);
        let kb = KnowledgeBase::new(file.path());
        kb.records().await.expect("load");

        std::fs::write(file.path(), "oops").expect("rewrite");

        assert!(kb.reload().await.is_err());
        assert_eq!(kb.records().await.expect("cached").len(), 3);
    }

    #[tokio::test]
    async fn invalidate_forces_reread() {
        let file = write_file(ISSUES);
        let kb = KnowledgeBase::new(file.path());
        kb.records().await.expect("load");

        drop(file);
        kb.invalidate().await;

        let err = kb.records().await.expect_err("file gone");
        assert!(matches!(err.current_context(), KnowledgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn preloaded_records_skip_the_file() {
        let kb = KnowledgeBase::with_records(
            "does-not-exist.json",
            vec![KnownIssueRecord::new("Impressora offline", keywords(&["impressora"]))],
        );
        let first = kb
            .first_match(&keywords(&["Impressora"]))
            .await
            .expect("lookup");
        assert_eq!(first.map(|r| r.problem), Some("Impressora offline".to_string()));
    }
}
