//! Documents: the unit of training and classification.

use serde::{Deserialize, Serialize};

/// A short text (subject + body) with an optional category.
///
/// Training documents always carry a label. Documents arriving for
/// classification do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Document {
    /// A labelled training document.
    pub fn labeled(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: Some(label.into()),
        }
    }

    /// A document awaiting classification.
    pub fn unlabeled(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlabeled_omits_label_field() {
        let json = serde_json::to_string(&Document::unlabeled("hi")).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);
    }

    #[test]
    fn label_defaults_to_none() {
        let doc: Document = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(doc.label, None);
    }
}
