//! Knowledge retrieval: lore/rules documents injected into stage prompts.

use std::sync::Arc;

use crate::infrastructure::ports::KnowledgeRepo;
use loreforge_domain::WorldModule;

/// Which pipeline stage the documents are for. Documents may target one
/// audience, both, or leave the field unset (treated as both).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Brain,
    Voice,
}

impl Audience {
    fn matches(&self, target_model: Option<&str>) -> bool {
        match target_model {
            None | Some("both") => true,
            Some("brain") => matches!(self, Self::Brain),
            Some("voice") => matches!(self, Self::Voice),
            // Unknown targets never match rather than leaking into prompts.
            Some(_) => false,
        }
    }
}

/// Rough average document cost used to turn a token budget into a
/// document count.
const AVG_DOC_TOKENS: usize = 400;

/// How many documents a token budget affords, at least one.
pub fn docs_for_budget(budget_tokens: usize) -> usize {
    (budget_tokens / AVG_DOC_TOKENS).max(1)
}

pub struct KnowledgeRetriever {
    repo: Arc<dyn KnowledgeRepo>,
}

impl KnowledgeRetriever {
    pub fn new(repo: Arc<dyn KnowledgeRepo>) -> Self {
        Self { repo }
    }

    /// Fetch formatted knowledge strings for one world and audience.
    ///
    /// Filter: (module is `global` or matches) and (audience matches) and
    /// enabled. Sorted ascending by content length and truncated to
    /// `max_docs`: shorter documents first bounds worst-case prompt size
    /// while still injecting some context. Retrieval errors log and yield
    /// no documents; lore is never worth failing a turn over.
    pub async fn fetch(
        &self,
        world: WorldModule,
        audience: Audience,
        max_docs: usize,
    ) -> Vec<String> {
        let docs = match self.repo.list_enabled().await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "Knowledge fetch failed, continuing without lore");
                return Vec::new();
            }
        };

        let mut selected: Vec<_> = docs
            .into_iter()
            .filter(|doc| doc.world_module == "global" || doc.world_module == world.as_str())
            .filter(|doc| audience.matches(doc.target_model.as_deref()))
            .collect();

        selected.sort_by_key(|doc| doc.content.len());
        selected.truncate(max_docs);

        selected
            .into_iter()
            .map(|doc| format!("[{}: {}]\n{}", doc.category.to_uppercase(), doc.name, doc.content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{KnowledgeDoc, MockKnowledgeRepo, RepoError};
    use loreforge_domain::DocumentId;

    fn doc(name: &str, world: &str, target: Option<&str>, content: &str) -> KnowledgeDoc {
        KnowledgeDoc {
            id: DocumentId::new(),
            name: name.to_string(),
            world_module: world.to_string(),
            category: "Lore".to_string(),
            content: content.to_string(),
            target_model: target.map(str::to_string),
            enabled: true,
        }
    }

    fn retriever_with(docs: Vec<KnowledgeDoc>) -> KnowledgeRetriever {
        let mut repo = MockKnowledgeRepo::new();
        repo.expect_list_enabled().returning(move || Ok(docs.clone()));
        KnowledgeRetriever::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn test_module_and_audience_filter() {
        let retriever = retriever_with(vec![
            doc("Everywhere", "global", None, "applies to all worlds"),
            doc("Vale lore", "classic", Some("both"), "classic only"),
            doc("Wasteland", "outworlder", None, "wrong world"),
            doc("Mechanics", "classic", Some("brain"), "brain only"),
        ]);

        let results = retriever.fetch(WorldModule::Classic, Audience::Voice, 10).await;

        let joined = results.join("\n");
        assert!(joined.contains("applies to all worlds"));
        assert!(joined.contains("classic only"));
        assert!(!joined.contains("wrong world"));
        assert!(!joined.contains("brain only"));
    }

    #[tokio::test]
    async fn test_shortest_first_and_truncation() {
        let retriever = retriever_with(vec![
            doc("Long", "global", None, &"x".repeat(500)),
            doc("Short", "global", None, "tiny"),
            doc("Medium", "global", None, &"y".repeat(100)),
        ]);

        let results = retriever.fetch(WorldModule::Essence, Audience::Brain, 2).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].contains("Short"));
        assert!(results[1].contains("Medium"));
    }

    #[tokio::test]
    async fn test_formatting() {
        let retriever = retriever_with(vec![doc("Sealed Vale", "global", None, "The Vale fell.")]);

        let results = retriever.fetch(WorldModule::Classic, Audience::Brain, 1).await;

        assert_eq!(results[0], "[LORE: Sealed Vale]\nThe Vale fell.");
    }

    #[tokio::test]
    async fn test_store_error_yields_empty() {
        let mut repo = MockKnowledgeRepo::new();
        repo.expect_list_enabled()
            .returning(|| Err(RepoError::Database("offline".to_string())));
        let retriever = KnowledgeRetriever::new(Arc::new(repo));

        let results = retriever.fetch(WorldModule::Classic, Audience::Voice, 5).await;

        assert!(results.is_empty());
    }

    #[test]
    fn test_budget_to_doc_count() {
        assert_eq!(docs_for_budget(2000), 5);
        // A tiny budget still affords one document.
        assert_eq!(docs_for_budget(50), 1);
    }
}
