//! Study-material tagging daemon: attachments in, catalog records out.

use std::sync::Arc;

use async_trait::async_trait;
use beze_shared::{unix_now, AttachmentToParse, StudyMaterial};
use beze_store::StudyMaterialRepository;
use tracing::{debug, info};

use crate::collaborators::AttachmentClassifier;
use crate::daemon::{Enricher, Outcome};
use crate::error::EnrichmentError;
use crate::retry::RetryPolicy;

pub struct StudyMaterialEnricher {
    classifier: Arc<dyn AttachmentClassifier>,
    materials: Arc<dyn StudyMaterialRepository>,
    retry: RetryPolicy,
}

impl StudyMaterialEnricher {
    pub fn new(
        classifier: Arc<dyn AttachmentClassifier>,
        materials: Arc<dyn StudyMaterialRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            classifier,
            materials,
            retry,
        }
    }
}

#[async_trait]
impl Enricher for StudyMaterialEnricher {
    type Input = AttachmentToParse;

    fn name(&self) -> &'static str {
        "studymateriald"
    }

    async fn enrich(&self, unit: AttachmentToParse) -> Result<Outcome, EnrichmentError> {
        if unit.filename.trim().is_empty() {
            return Err(EnrichmentError::InvalidInput("attachment has no filename".into()));
        }

        let classifier = &self.classifier;
        let unit_ref = &unit;
        let parsed = self
            .retry
            .run("attachment-tagger", move || classifier.classify(unit_ref))
            .await?;

        let derived = match parsed.study_material {
            Some(derived) if parsed.is_study_material => derived,
            _ => {
                debug!(filename = %unit.filename, "Attachment is not study material");
                return Ok(Outcome::Skipped);
            }
        };

        let name = if derived.name.trim().is_empty() {
            unit.filename.clone()
        } else {
            derived.name
        };
        let material = StudyMaterial::new(name, unit.filename, derived.tags, unit.author_id, unix_now());
        self.materials.insert_study_material(&material).await?;

        info!(
            study_material = %material.id,
            filename = %material.filename,
            author_id = %material.author_id,
            tags = material.tags.len(),
            "Study material catalogued"
        );
        Ok(Outcome::Persisted(material))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beze_shared::collaborators::{DerivedStudyMaterial, ParsedAttachment};
    use beze_shared::UserId;
    use beze_store::SqliteStore;
    use std::time::Duration;

    struct FixedClassifier(ParsedAttachment);

    #[async_trait]
    impl AttachmentClassifier for FixedClassifier {
        async fn classify(&self, _unit: &AttachmentToParse) -> Result<ParsedAttachment, EnrichmentError> {
            Ok(self.0.clone())
        }
    }

    fn enricher(store: &SqliteStore, answer: ParsedAttachment) -> StudyMaterialEnricher {
        StudyMaterialEnricher::new(
            Arc::new(FixedClassifier(answer)),
            Arc::new(store.clone()),
            RetryPolicy::new(1, Duration::from_secs(5)),
        )
    }

    fn unit() -> AttachmentToParse {
        AttachmentToParse::new("notes.pdf", UserId::from("alice"), "my notes", vec![])
    }

    #[tokio::test]
    async fn positive_classification_is_persisted() {
        let store = SqliteStore::open_in_memory().unwrap();
        let answer = ParsedAttachment {
            is_study_material: true,
            study_material: Some(DerivedStudyMaterial {
                name: "Biology notes".into(),
                tags: vec!["biology".into()],
            }),
        };

        let outcome = enricher(&store, answer).enrich(unit()).await.unwrap();
        let Outcome::Persisted(material) = outcome else {
            panic!("expected a stored record");
        };
        assert_eq!(material.filename, "notes.pdf");
        assert_eq!(material.author_id, UserId::from("alice"));

        let listed = store.list_by_author(&UserId::from("alice")).await.unwrap();
        assert_eq!(listed, vec![material]);
    }

    #[tokio::test]
    async fn negative_classification_stores_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let outcome = enricher(&store, ParsedAttachment::default())
            .enrich(unit())
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped));
        assert!(store.list_by_author(&UserId::from("alice")).await.unwrap().is_empty());
    }
}
