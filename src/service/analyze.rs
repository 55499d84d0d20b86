use super::state::{DuplicateGroup, LibraryStatus};
use super::{LibraryService, ServiceError};
use crate::ai::{
    duplicate_check_prompt, parse_duplicate_verdicts, AiSettings, CompletionOptions,
    DuplicateVerdict,
};
use crate::library::TrackMetadata;
use crate::server::metrics;
use std::collections::HashSet;
use tracing::{info, warn};

const DEFAULT_REASON: &str = "AI judged duplicate";

/// Turns a verdict into a confirmed group, ignoring verdicts that deny the
/// duplicate or point at a group that doesn't exist.
pub fn confirmed_group(
    candidates: &[Vec<TrackMetadata>],
    verdict: &DuplicateVerdict,
) -> Option<(usize, DuplicateGroup)> {
    if !verdict.is_duplicate {
        return None;
    }
    let index = usize::try_from(verdict.group_id).ok()?;
    let files = candidates.get(index)?;

    let recommended_keep = verdict
        .best_file
        .and_then(|best| usize::try_from(best).ok())
        .and_then(|best| files.get(best))
        .map(|track| track.path.clone());
    let reason = verdict
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    Some((
        index,
        DuplicateGroup {
            files: files.clone(),
            reason,
            recommended_keep,
        },
    ))
}

impl LibraryService {
    /// Asks the model which candidate groups really are duplicates.
    pub fn start_analysis(&self) -> Result<(), ServiceError> {
        let settings = self.settings.get();
        if !settings.has_key() {
            return Err(ServiceError::NoApiKey);
        }

        {
            let mut state = self.state();
            if state.status.is_busy() {
                return Err(ServiceError::Busy);
            }
            state.status = LibraryStatus::Analyzing;
            state.results.clear();
            let total = state.candidates.len();
            state.set_progress(0, total, "Starting AI analysis...");
        }

        let service = self.clone();
        let handle = tokio::spawn(async move {
            service.run_analysis(settings.ai()).await;
        });
        self.supervise("Analysis", handle);
        Ok(())
    }

    async fn run_analysis(&self, ai: AiSettings) {
        let provider = match self.providers.create(&ai) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Cannot start analysis: {}", e);
                self.activity_log.add(format!("Analysis failed: {}", e));
                self.state().fail(format!("AI provider unavailable: {}", e));
                return;
            }
        };

        let candidates = self.state().candidates.clone();
        let total = candidates.len();
        self.activity_log.add(format!(
            "Analysis started: {} candidate groups with {}",
            total,
            provider.model()
        ));

        let options = CompletionOptions::with_timeout(self.options.ai_timeout);
        let batch_size = self.options.ai_batch_size.max(1);
        let mut seen = HashSet::new();

        for (batch_index, start) in (0..total).step_by(batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.options.ai_batch_delay).await;
            }
            let end = (start + batch_size).min(total);
            let groups: Vec<(usize, &[TrackMetadata])> = (start..end)
                .map(|index| (index, candidates[index].as_slice()))
                .collect();
            let prompt = duplicate_check_prompt(&groups);

            let answer = provider
                .complete_json(&prompt, &options)
                .await
                .and_then(|text| parse_duplicate_verdicts(&text));

            match answer {
                Ok(verdicts) => {
                    metrics::record_ai_request("duplicate_check", "success");
                    let confirmed: Vec<DuplicateGroup> = verdicts
                        .iter()
                        .filter_map(|verdict| confirmed_group(&candidates, verdict))
                        .filter(|(index, _)| seen.insert(*index))
                        .map(|(_, group)| group)
                        .collect();
                    self.state().results.extend(confirmed);
                }
                Err(e) => {
                    metrics::record_ai_request("duplicate_check", e.kind());
                    warn!("AI batch {}..{} failed: {}", start, end, e);
                    self.activity_log
                        .add(format!("AI batch {}-{} failed: {}", start, end, e));
                }
            }

            self.state()
                .set_progress(end, total, format!("Analyzed {}/{} groups", end, total));
        }

        let found = {
            let mut state = self.state();
            let found = state.results.len();
            state.status = LibraryStatus::Done;
            state.set_progress(
                total,
                total,
                format!("Analysis complete: {} duplicate groups", found),
            );
            found
        };
        metrics::record_duplicate_groups("confirmed", found);
        info!("Analysis confirmed {} of {} groups", found, total);
        self.activity_log
            .add(format!("Analysis complete: {} duplicate groups", found));
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{ActivityLog, ServiceOptions};
    use super::*;
    use crate::ai::{AiSettings, LlmError, LlmProvider, ProviderFactory};
    use std::sync::Arc;

    fn verdict(group_id: i64, is_duplicate: bool, best_file: Option<i64>) -> DuplicateVerdict {
        DuplicateVerdict {
            group_id,
            is_duplicate,
            reason: None,
            best_file,
        }
    }

    fn candidates() -> Vec<Vec<TrackMetadata>> {
        (0..4)
            .map(|i| {
                vec![
                    track(&format!("/m/{}a.mp3", i), "Artist", "Song"),
                    track(&format!("/m/{}b.flac", i), "Artist", "Song"),
                ]
            })
            .collect()
    }

    #[test]
    fn confirmed_group_validates_verdicts() {
        let candidates = candidates();

        let (index, group) = confirmed_group(&candidates, &verdict(1, true, Some(1))).unwrap();
        assert_eq!(index, 1);
        assert_eq!(group.reason, DEFAULT_REASON);
        assert_eq!(group.recommended_keep.as_deref(), Some("/m/1b.flac"));

        let (_, group) = confirmed_group(&candidates, &verdict(0, true, Some(7))).unwrap();
        assert!(group.recommended_keep.is_none());

        assert!(confirmed_group(&candidates, &verdict(1, false, None)).is_none());
        assert!(confirmed_group(&candidates, &verdict(4, true, None)).is_none());
        assert!(confirmed_group(&candidates, &verdict(-1, true, None)).is_none());
    }

    #[tokio::test]
    async fn analysis_requires_key() {
        let env = service_with(vec![]);
        assert!(matches!(
            env.service.start_analysis(),
            Err(ServiceError::NoApiKey)
        ));
    }

    #[tokio::test]
    async fn analysis_batches_and_skips_failures() {
        let env = service_with(vec![
            Ok(r#"{"results": [
                {"group_id": 0, "is_duplicate": true, "reason": "same song", "best_file": 1},
                {"group_id": 1, "is_duplicate": false},
                {"group_id": 0, "is_duplicate": true},
                {"group_id": 99, "is_duplicate": true}
            ]}"#
            .to_string()),
            Err(LlmError::RateLimited),
        ]);
        env.service
            .settings()
            .update(|s| s.api_key = "key".to_string())
            .unwrap();
        env.service.state().candidates = candidates();

        env.service.start_analysis().unwrap();
        let status = wait_idle(&env.service).await;

        assert_eq!(status.status, LibraryStatus::Done);
        assert_eq!(status.results_count, 1);
        assert_eq!(status.progress, 4);
        assert_eq!(status.message, "Analysis complete: 1 duplicate groups");

        let results = env.service.results();
        assert_eq!(results[0].reason, "same song");
        assert_eq!(results[0].recommended_keep.as_deref(), Some("/m/0b.flac"));

        // 4 groups in batches of 3
        let prompts = env.provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("\"group_id\":2"));
        assert!(prompts[1].contains("\"group_id\":3"));

        assert!(env
            .service
            .activity_log()
            .entries()
            .iter()
            .any(|e| e.contains("AI batch 3-4 failed")));
    }

    struct PanickingProvider;

    #[async_trait::async_trait]
    impl LlmProvider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }

        fn model(&self) -> &str {
            "panicking-model"
        }

        async fn complete_json(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, LlmError> {
            panic!("provider blew up");
        }

        async fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec![])
        }
    }

    struct PanickingFactory;

    impl ProviderFactory for PanickingFactory {
        fn create(&self, _settings: &AiSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
            Ok(Arc::new(PanickingProvider))
        }
    }

    #[tokio::test]
    async fn panicking_analysis_releases_the_library() {
        let env = service_with(vec![]);
        env.service
            .settings()
            .update(|s| s.api_key = "key".to_string())
            .unwrap();
        let service = LibraryService::new(
            ServiceOptions::default(),
            env.service.store().clone(),
            env.service.settings().clone(),
            Arc::new(PanickingFactory),
            Arc::new(ActivityLog::default()),
        );
        service.state().candidates = candidates();

        service.start_analysis().unwrap();
        let mut status = service.status();
        for _ in 0..200 {
            status = service.status();
            if status.status == LibraryStatus::Error {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(status.status, LibraryStatus::Error);
        assert!(service
            .activity_log()
            .entries()
            .iter()
            .any(|e| e.contains("Analysis failed: task aborted")));
        assert!(service.start_scan(None, Default::default()).is_ok());
    }

    #[tokio::test]
    async fn analysis_refused_while_scanning() {
        let env = service_with(vec![]);
        env.service
            .settings()
            .update(|s| s.api_key = "key".to_string())
            .unwrap();
        env.service.state().status = LibraryStatus::Scanning;
        assert!(matches!(
            env.service.start_analysis(),
            Err(ServiceError::Busy)
        ));
    }
}
