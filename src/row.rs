use std::sync::Arc;

use tracing::debug;

use crate::check::{Classify, Label};
use crate::extract::{extract_first, UrlCandidate};
use crate::table::Row;

/// A non-compliant row: the original record plus what was found and why.
#[derive(Debug, Clone)]
pub struct AnnotatedRow {
    pub row: Row,
    /// `None` only when the row's task failed before a link could be recovered.
    pub url: Option<UrlCandidate>,
    pub label: Label,
}

/// Everything the row processor can conclude about one row.
#[derive(Debug, Clone)]
pub enum RowOutcome {
    NoLink,
    Compliant { url: UrlCandidate },
    NonCompliant(AnnotatedRow),
}

impl RowOutcome {
    pub fn into_annotated(self) -> Option<AnnotatedRow> {
        match self {
            RowOutcome::NonCompliant(a) => Some(a),
            _ => None,
        }
    }
}

/// First link found scanning fields in schema order.
pub fn detect_url(row: &Row) -> Option<UrlCandidate> {
    extract_first(row.cells()).map(|(_, url)| url)
}

pub struct RowProcessor<C> {
    classifier: Arc<C>,
}

impl<C> Clone for RowProcessor<C> {
    fn clone(&self) -> Self {
        RowProcessor {
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<C: Classify> RowProcessor<C> {
    pub fn new(classifier: C) -> Self {
        RowProcessor {
            classifier: Arc::new(classifier),
        }
    }

    pub fn from_shared(classifier: Arc<C>) -> Self {
        RowProcessor { classifier }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub async fn inspect(&self, row: &Row) -> RowOutcome {
        let Some(url) = detect_url(row) else {
            debug!(row = row.index(), "no link found");
            return RowOutcome::NoLink;
        };

        let label = self.classifier.classify(&url).await;
        if label.is_compliant() {
            RowOutcome::Compliant { url }
        } else {
            RowOutcome::NonCompliant(AnnotatedRow {
                row: row.clone(),
                url: Some(url),
                label,
            })
        }
    }

    /// `Some` only for rows whose link is not operational.
    pub async fn process(&self, row: &Row) -> Option<AnnotatedRow> {
        self.inspect(row).await.into_annotated()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::table::Table;
    use std::collections::HashMap;

    /// Labels by exact URL; anything unknown is operational.
    pub(crate) struct MapClassifier(pub HashMap<String, Label>);

    impl MapClassifier {
        pub(crate) fn of(pairs: &[(&str, Label)]) -> Self {
            MapClassifier(pairs.iter().map(|(u, l)| (u.to_string(), *l)).collect())
        }
    }

    impl Classify for MapClassifier {
        async fn classify(&self, url: &UrlCandidate) -> Label {
            self.0.get(url.as_str()).copied().unwrap_or(Label::Operational)
        }
    }

    fn table() -> Table {
        Table::from((
            ["name", "notes", "link"],
            vec![
                ["no link", "just text", ""],
                ["ok", "", "https://ok.cl/doc"],
                ["broken", "", "https://broken.cl/x"],
                ["first wins", "<a href=\"https://broken.cl/x\">a</a>", "https://ok.cl/doc"],
            ],
        ))
    }

    fn processor() -> RowProcessor<MapClassifier> {
        RowProcessor::new(MapClassifier::of(&[("https://broken.cl/x", Label::NotFound)]))
    }

    #[tokio::test]
    async fn no_link_means_no_annotation() {
        let t = table();
        let p = processor();
        assert!(matches!(p.inspect(&t.rows()[0]).await, RowOutcome::NoLink));
        assert!(p.process(&t.rows()[0]).await.is_none());
    }

    #[tokio::test]
    async fn operational_rows_are_dropped() {
        let t = table();
        let outcome = processor().inspect(&t.rows()[1]).await;
        assert!(matches!(outcome, RowOutcome::Compliant { ref url } if url.as_str() == "https://ok.cl/doc"));
        assert!(outcome.into_annotated().is_none());
    }

    #[tokio::test]
    async fn non_compliant_rows_keep_original_fields() {
        let t = table();
        let a = processor().process(&t.rows()[2]).await.unwrap();
        assert_eq!(a.label, Label::NotFound);
        assert_eq!(a.url.unwrap().as_str(), "https://broken.cl/x");
        assert_eq!(a.row.index(), 2);
        assert_eq!(a.row.get("name"), Some("broken"));
    }

    #[tokio::test]
    async fn first_field_with_a_link_wins() {
        let t = table();
        let a = processor().process(&t.rows()[3]).await.unwrap();
        assert_eq!(a.url.unwrap().as_str(), "https://broken.cl/x");
    }
}
