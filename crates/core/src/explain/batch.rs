use crate::domain::batch::{BatchCapacityError, BatchResult, FailureDetail, FailureReason};
use crate::domain::explanation::Explanation;
use crate::domain::forecast::ForecastRecord;
use crate::explain::fallback::fallback_explanation;
use crate::explain::generator::ExplanationGenerator;
use crate::explain::quality::quality_issue;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const BATCH_TASK_FAILED: &str = "Batch processing error";

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_batch_rows: usize,
    pub sub_batch_size: usize,
    /// Sleep between sub-batches to stay under upstream rate limits.
    pub sub_batch_pause: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_rows: 100,
            sub_batch_size: 10,
            sub_batch_pause: Duration::from_millis(500),
        }
    }
}

impl BatchOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("EXPLAIN_MAX_BATCH_ROWS") {
            if let Ok(n) = s.parse::<usize>() {
                out.max_batch_rows = n.max(1);
            }
        }

        if let Ok(s) = std::env::var("EXPLAIN_SUB_BATCH_SIZE") {
            if let Ok(n) = s.parse::<usize>() {
                out.sub_batch_size = n.max(1);
            }
        }

        if let Ok(s) = std::env::var("EXPLAIN_SUB_BATCH_PAUSE_MS") {
            if let Ok(n) = s.parse::<u64>() {
                out.sub_batch_pause = Duration::from_millis(n);
            }
        }

        out
    }
}

pub struct BatchOrchestrator {
    generator: Arc<ExplanationGenerator>,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(generator: Arc<ExplanationGenerator>, options: BatchOptions) -> Self {
        Self { generator, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn check_capacity(&self, rows: usize) -> Result<(), BatchCapacityError> {
        if rows == 0 {
            return Err(BatchCapacityError::Empty);
        }
        if rows > self.options.max_batch_rows {
            return Err(BatchCapacityError::TooMany {
                limit: self.options.max_batch_rows,
                got: rows,
            });
        }
        Ok(())
    }

    pub async fn explain_batch(
        &self,
        records: Vec<ForecastRecord>,
    ) -> Result<BatchResult, BatchCapacityError> {
        self.explain_batch_until(records, std::future::pending()).await
    }

    /// Explains `records` in fixed-size sub-batches until done or until `cancel`
    /// resolves. Cancellation is observed between sub-batches; records not yet
    /// started are reported as cancelled failures.
    pub async fn explain_batch_until<F>(
        &self,
        records: Vec<ForecastRecord>,
        cancel: F,
    ) -> Result<BatchResult, BatchCapacityError>
    where
        F: Future<Output = ()> + Send,
    {
        self.check_capacity(records.len())?;

        let started = Instant::now();
        let batch_id = Uuid::new_v4();
        let total = records.len();
        let size = self.options.sub_batch_size.max(1);

        tracing::info!(%batch_id, total, sub_batch_size = size, "batch started");

        let mut explanations: Vec<Explanation> = Vec::with_capacity(total);
        let mut failures: Vec<FailureDetail> = Vec::new();
        let mut cancelled = false;

        tokio::pin!(cancel);

        for (chunk_no, chunk) in records.chunks(size).enumerate() {
            let offset = chunk_no * size;
            let pause = if chunk_no == 0 {
                Duration::ZERO
            } else {
                self.options.sub_batch_pause
            };

            let proceed = tokio::select! {
                biased;
                _ = &mut cancel => false,
                _ = tokio::time::sleep(pause) => true,
            };
            if !proceed {
                cancelled = true;
                failures.extend(records[offset..].iter().enumerate().map(|(i, r)| FailureDetail {
                    index: offset + i,
                    sku_id: r.sku_id.clone(),
                    store_id: r.store_id.clone(),
                    reason: FailureReason::Cancelled,
                }));
                tracing::warn!(
                    %batch_id,
                    processed = offset,
                    remaining = total - offset,
                    "batch cancelled"
                );
                break;
            }

            let handles = chunk.iter().cloned().map(|record| {
                let generator = self.generator.clone();
                tokio::spawn(async move { generator.explain(&record).await })
            });
            let outcomes = futures::future::join_all(handles).await;

            let mut rejected = 0usize;
            for (i, (record, outcome)) in chunk.iter().zip(outcomes).enumerate() {
                let index = offset + i;
                let explanation = match outcome {
                    Ok(explanation) => explanation,
                    Err(err) => {
                        tracing::error!(
                            %batch_id,
                            index,
                            sku_id = %record.sku_id,
                            error = %err,
                            "explanation task failed"
                        );
                        fallback_explanation(record, BATCH_TASK_FAILED)
                    }
                };

                if let Some(issue) = quality_issue(&explanation) {
                    tracing::warn!(%batch_id, index, sku_id = %record.sku_id, %issue, "explanation rejected");
                    rejected += 1;
                    failures.push(FailureDetail {
                        index,
                        sku_id: record.sku_id.clone(),
                        store_id: record.store_id.clone(),
                        reason: FailureReason::ValidationFailed,
                    });
                } else {
                    explanations.push(explanation);
                }
            }

            tracing::info!(
                %batch_id,
                sub_batch = chunk_no + 1,
                records = chunk.len(),
                rejected,
                "sub-batch done"
            );
        }

        let result = BatchResult::new(
            batch_id,
            total,
            explanations,
            failures,
            started.elapsed().as_secs_f64(),
            cancelled,
        );

        tracing::info!(
            %batch_id,
            successful = result.summary.successful,
            failed = result.summary.failed,
            ai_generated = result.summary.ai_generated,
            rule_based = result.summary.rule_based,
            secs = result.summary.processing_time_seconds,
            "batch finished"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::stubs::StaticContext;
    use crate::domain::explanation::{ExplanationType, TopInfluencer};
    use crate::domain::forecast::fixtures::record;
    use crate::explain::stubs::{answer, prompt_sku, ScriptedClient};

    fn orchestrator(client: ScriptedClient) -> BatchOrchestrator {
        shared_orchestrator(Arc::new(client))
    }

    fn shared_orchestrator(client: Arc<ScriptedClient>) -> BatchOrchestrator {
        let generator = ExplanationGenerator::new(client, Arc::new(StaticContext::default()));
        BatchOrchestrator::new(Arc::new(generator), BatchOptions::default())
    }

    fn records(n: usize) -> Vec<ForecastRecord> {
        (0..n).map(|i| record(&format!("SKU{i}"))).collect()
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_batches() {
        let o = orchestrator(ScriptedClient::new(|_| Ok(answer("promotion", 0.8))));
        assert_eq!(
            o.explain_batch(Vec::new()).await.unwrap_err(),
            BatchCapacityError::Empty
        );
        assert_eq!(
            o.explain_batch(records(101)).await.unwrap_err(),
            BatchCapacityError::TooMany {
                limit: 100,
                got: 101
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_preserves_input_order() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(answer("promotion", 0.8))));
        let o = shared_orchestrator(client.clone());
        let res = o.explain_batch(records(100)).await.unwrap();

        assert_eq!(client.calls(), 100);
        assert_eq!(res.summary.total_requested, 100);
        assert_eq!(res.summary.successful, 100);
        assert_eq!(res.summary.ai_generated, 100);
        assert_eq!(res.summary.success_rate, 100.0);
        assert!(!res.summary.cancelled);
        for (i, exp) in res.explanations.iter().enumerate() {
            assert_eq!(exp.sku_id, format!("SKU{i}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn low_quality_answers_become_failures() {
        let o = orchestrator(ScriptedClient::new(|prompt| {
            if prompt_sku(prompt).as_deref() == Some("SKU1") {
                Ok(answer("unknown", 0.9))
            } else {
                Ok(answer("weather", 0.6))
            }
        }));
        let res = o.explain_batch(records(3)).await.unwrap();

        assert_eq!(res.summary.successful, 2);
        assert_eq!(res.summary.failed, 1);
        assert_eq!(res.failures[0].index, 1);
        assert_eq!(res.failures[0].sku_id, "SKU1");
        assert_eq!(res.failures[0].reason, FailureReason::ValidationFailed);
        assert_eq!(res.summary.success_rate, 66.67);
    }

    #[tokio::test(start_paused = true)]
    async fn model_failures_are_counted_as_rule_based() {
        let o = orchestrator(ScriptedClient::new(|prompt| {
            if prompt_sku(prompt).as_deref() == Some("SKU0") {
                anyhow::bail!("service unavailable")
            }
            Ok(answer("event", 0.7))
        }));
        let res = o.explain_batch(records(2)).await.unwrap();

        assert_eq!(res.summary.successful, 2);
        assert_eq!(res.summary.rule_based, 1);
        assert_eq!(res.summary.ai_generated, 1);
        assert_eq!(res.explanations[0].explanation_type, ExplanationType::RuleBased);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_yields_fallback() {
        let o = orchestrator(ScriptedClient::new(|prompt| {
            if prompt_sku(prompt).as_deref() == Some("SKU2") {
                panic!("boom");
            }
            Ok(answer("promotion", 0.8))
        }));
        let res = o.explain_batch(records(4)).await.unwrap();

        assert_eq!(res.summary.successful, 4);
        let exp = &res.explanations[2];
        assert_eq!(exp.sku_id, "SKU2");
        assert_eq!(exp.explanation_type, ExplanationType::RuleBased);
        assert_eq!(exp.top_influencer, TopInfluencer::Unknown);
        assert!(exp.narrative_explanation.ends_with("Note: Batch processing error"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_keeps_finished_sub_batches() {
        let client = ScriptedClient::new(|_| Ok(answer("holiday", 0.7)));
        let o = orchestrator(client);

        // Sub-batches start at 0ms, 500ms and 1000ms; cancel lands in between.
        let cancel = tokio::time::sleep(Duration::from_millis(700));
        let res = o.explain_batch_until(records(25), cancel).await.unwrap();

        assert!(res.summary.cancelled);
        assert_eq!(res.summary.successful, 20);
        assert_eq!(res.summary.failed, 5);
        assert!(res
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::Cancelled));
        assert_eq!(res.failures[0].index, 20);
        assert_eq!(res.summary.success_rate, 80.0);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_batches_are_paced() {
        let o = orchestrator(ScriptedClient::new(|_| Ok(answer("promotion", 0.8))));
        let before = tokio::time::Instant::now();
        o.explain_batch(records(30)).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn capacity_check_bounds() {
        let o = orchestrator(ScriptedClient::new(|_| Ok(String::new())));
        assert!(o.check_capacity(1).is_ok());
        assert!(o.check_capacity(100).is_ok());
        assert!(o.check_capacity(0).is_err());
        assert!(o.check_capacity(101).is_err());
    }
}
