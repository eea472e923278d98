//! Final Synthesis
//!
//! The closing LLM call over the full accumulated conversation. No tools are
//! offered; the answer streams to the client token by token as `text-delta`
//! events. Column metadata from the catalog enriches the system prompt but
//! its absence is never fatal.

use std::sync::Arc;

use tabletalk_core::{
    ActiveFilters, ColumnProfile, DatasetCatalog, DatasetDescriptor, EventSink,
};
use tabletalk_llm::{LlmProvider, LlmRequestOptions, Message, ToolCallMode};
use tokio_util::sync::CancellationToken;

use crate::services::prompts;
use crate::services::step_executor::stream_turn;
use crate::utils::AppResult;

async fn gather_profiles(
    catalog: &Arc<dyn DatasetCatalog>,
    datasets: &[DatasetDescriptor],
) -> Vec<(String, Vec<ColumnProfile>)> {
    let mut profiles = Vec::new();
    for dataset in datasets {
        match catalog.column_profiles(&dataset.id).await {
            Ok(columns) if !columns.is_empty() => profiles.push((dataset.name.clone(), columns)),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(dataset = %dataset.id, error = %e, "column profile lookup failed");
            }
        }
    }
    profiles
}

/// Stream the final answer over the accumulated conversation.
pub async fn synthesize(
    provider: &Arc<dyn LlmProvider>,
    conversation: &[Message],
    datasets: &[DatasetDescriptor],
    filters: &ActiveFilters,
    catalog: &Arc<dyn DatasetCatalog>,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AppResult<()> {
    let profiles = gather_profiles(catalog, datasets).await;
    let system = prompts::synthesis_system(datasets, filters, &profiles);
    let options = LlmRequestOptions {
        tool_call_mode: ToolCallMode::None,
        ..Default::default()
    };
    stream_turn(
        provider,
        conversation.to_vec(),
        system,
        Vec::new(),
        options,
        sink,
        cancel,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::FixedCatalog;
    use tabletalk_core::StreamEvent;
    use tabletalk_llm::MockProvider;

    fn datasets() -> Vec<DatasetDescriptor> {
        vec![DatasetDescriptor {
            id: "ds-1".to_string(),
            name: "Sales".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_synthesis_streams_without_tools() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text("Revenue grew 12% month over month.");
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let catalog: Arc<dyn DatasetCatalog> = Arc::new(FixedCatalog::empty());
        let (sink, mut rx) = EventSink::channel(32);

        synthesize(
            &provider,
            &[Message::user("how is revenue?")],
            &datasets(),
            &ActiveFilters::new(),
            &catalog,
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(sink);

        let calls = mock.calls();
        assert!(calls[0].tool_names.is_empty());
        assert_eq!(
            calls[0].options.tool_call_mode,
            tabletalk_llm::ToolCallMode::None
        );
        assert!(calls[0].streaming);

        let mut text = String::new();
        while let Some(event) = rx.recv().await {
            if let StreamEvent::TextDelta { delta } = event {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "Revenue grew 12% month over month.");
    }

    #[tokio::test]
    async fn test_catalog_failure_is_not_fatal() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text("answer");
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let catalog: Arc<dyn DatasetCatalog> = Arc::new(FixedCatalog {
            profiles: Vec::new(),
            fail: true,
        });
        let (sink, _rx) = EventSink::channel(32);

        let result = synthesize(
            &provider,
            &[Message::user("q")],
            &datasets(),
            &ActiveFilters::new(),
            &catalog,
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_profiles_reach_the_system_prompt() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text("answer");
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let catalog: Arc<dyn DatasetCatalog> = Arc::new(FixedCatalog {
            profiles: vec![ColumnProfile {
                name: "revenue".to_string(),
                inferred_type: "number".to_string(),
                null_ratio: 0.0,
                unique_values: 42,
                sample_values: vec![],
            }],
            fail: false,
        });
        let (sink, _rx) = EventSink::channel(32);

        synthesize(
            &provider,
            &[Message::user("q")],
            &datasets(),
            &ActiveFilters::new(),
            &catalog,
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let system = mock.calls()[0].system.clone().unwrap();
        assert!(system.contains("revenue"));
        assert!(system.contains("Sales"));
    }
}
