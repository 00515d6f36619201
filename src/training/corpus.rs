//! Gathering labelled documents for a training run.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::document::Document;
use crate::error::TrainError;
use crate::mail::MailSource;

/// Fetch up to `per_label_limit` documents for each category from the mail
/// source. A category that cannot be listed aborts the run; categories that
/// simply have no mail are logged and skipped.
pub async fn collect_from_source(
    source: &dyn MailSource,
    categories: &[String],
    per_label_limit: usize,
) -> Result<Vec<Document>, TrainError> {
    if categories.is_empty() {
        return Err(TrainError::InvalidConfig(
            "no categories configured (set INBOX_SORTER_CATEGORIES)".into(),
        ));
    }

    let mut seen = HashSet::new();
    let mut documents = Vec::new();
    for category in categories {
        if !seen.insert(category.as_str()) {
            warn!(category = %category, "Duplicate category ignored");
            continue;
        }
        let batch = source
            .list_documents_by_category(category, per_label_limit)
            .await?;
        if batch.is_empty() {
            warn!(category = %category, "No documents found for category");
        } else {
            info!(category = %category, count = batch.len(), "Collected documents");
        }
        // The source labels documents by the category it was asked for,
        // but force it so a misbehaving adapter cannot smuggle in others.
        documents.extend(
            batch
                .into_iter()
                .map(|doc| Document::labeled(doc.text, category.as_str())),
        );
    }

    if documents.is_empty() {
        return Err(TrainError::NoTrainingData(
            "mail source returned no documents for any category".into(),
        ));
    }
    Ok(documents)
}

/// Read a JSON Lines file of `{"text": ..., "label": ...}` records. Blank
/// lines are skipped; a malformed line is an error naming its line number.
pub fn load_jsonl(path: &Path) -> Result<Vec<Document>, TrainError> {
    let file = std::fs::File::open(path)
        .map_err(|e| TrainError::Corpus(format!("{}: {e}", path.display())))?;

    let mut documents = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line).map_err(|e| {
            TrainError::Corpus(format!("{}:{}: {e}", path.display(), index + 1))
        })?;
        documents.push(doc);
    }
    info!(path = %path.display(), count = documents.len(), "Loaded corpus file");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SourceError;

    struct StubSource {
        by_category: HashMap<String, Vec<String>>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl StubSource {
        fn new(entries: &[(&str, &[&str])]) -> Self {
            Self {
                by_category: entries
                    .iter()
                    .map(|(c, texts)| (c.to_string(), texts.iter().map(|t| t.to_string()).collect()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MailSource for StubSource {
        async fn list_documents_by_category(
            &self,
            category: &str,
            max_count: usize,
        ) -> Result<Vec<Document>, SourceError> {
            self.calls
                .lock()
                .unwrap()
                .push((category.to_string(), max_count));
            if category == "Broken" {
                return Err(SourceError::Request {
                    provider: "stub".into(),
                    reason: "down".into(),
                });
            }
            Ok(self
                .by_category
                .get(category)
                .map(|texts| {
                    texts
                        .iter()
                        .take(max_count)
                        .map(|t| Document::labeled(t.clone(), "wrong"))
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn get_document_content(&self, id: &str) -> Result<String, SourceError> {
            Err(SourceError::NotFound { id: id.into() })
        }

        async fn list_new_items_since(&self, _checkpoint: &str) -> Result<Vec<String>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn collects_each_category_with_limit() {
        let source = StubSource::new(&[
            ("Promotions", &["sale today", "buy now", "deal"]),
            ("Work", &["standup notes"]),
        ]);
        let docs = collect_from_source(&source, &names(&["Promotions", "Work"]), 2)
            .await
            .unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].label.as_deref(), Some("Promotions"));
        assert_eq!(docs[2].label.as_deref(), Some("Work"));
        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("Promotions".into(), 2), ("Work".into(), 2)]);
    }

    #[tokio::test]
    async fn duplicate_categories_are_fetched_once() {
        let source = StubSource::new(&[("Work", &["a", "b"])]);
        let docs = collect_from_source(&source, &names(&["Work", "Work"]), 10)
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_mailbox_is_no_training_data() {
        let source = StubSource::new(&[]);
        let err = collect_from_source(&source, &names(&["Work"]), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainError::NoTrainingData(_)));
    }

    #[tokio::test]
    async fn no_categories_is_rejected() {
        let source = StubSource::new(&[]);
        let err = collect_from_source(&source, &[], 10).await.unwrap_err();
        assert!(matches!(err, TrainError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn source_failure_aborts() {
        let source = StubSource::new(&[("Work", &["a"])]);
        let err = collect_from_source(&source, &names(&["Work", "Broken"]), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainError::Source(_)));
    }

    #[test]
    fn jsonl_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "cheap flights", "label": "Promotions"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"text": "no label here"}}"#).unwrap();

        let docs = load_jsonl(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].label.as_deref(), Some("Promotions"));
        assert_eq!(docs[1].label, None);
    }

    #[test]
    fn jsonl_reports_bad_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "ok", "label": "A"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        match load_jsonl(file.path()).unwrap_err() {
            TrainError::Corpus(msg) => assert!(msg.contains(":2:"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn jsonl_missing_file_is_corpus_error() {
        let err = load_jsonl(Path::new("/nonexistent/corpus.jsonl")).unwrap_err();
        assert!(matches!(err, TrainError::Corpus(_)));
    }
}
