//! Pipeline orchestration for ETL operations

use super::{ExportArtifact, Extraction, Extractor, LoadSession, Loader, Transformer};
use crate::error::{PipelineError, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_BATCH_SIZE: usize = 100;

/// ETL Pipeline that orchestrates Extract, Transform, and Load operations
///
/// Items are pulled lazily from the extractor, handed to the transformer in
/// batches of `batch_size`, and written to the loader session batch by batch.
/// The session is committed only after the source is exhausted without error.
///
/// # Type Parameters
/// - `E`: Extractor type
/// - `T`: Transformer type (must transform from E::Item)
/// - `L`: Loader type (must load T::Output)
///
/// # Example
/// ```no_run
/// use tablepipe::etl::{IdentityTransformer, Pipeline};
/// use tablepipe::database::TableReader;
/// use tablepipe::storage::DelimitedFileWriter;
///
/// # async fn example(pool: sqlx::AnyPool) -> tablepipe::Result<()> {
/// let pipeline = Pipeline::new(
///     TableReader::table(pool, "shipments")?,
///     IdentityTransformer::new(),
///     DelimitedFileWriter::new("/data", "shipments"),
/// );
///
/// let artifact = pipeline.run().await?;
/// println!("Wrote {} rows to {}", artifact.row_count, artifact.location);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<E, T, L> {
    extractor: E,
    transformer: T,
    loader: L,
    batch_size: usize,
    cancel: CancellationToken,
}

impl<E, T, L> Pipeline<E, T, L>
where
    E: Extractor,
    T: Transformer<Input = E::Item>,
    L: Loader<Item = T::Output>,
{
    /// Create a new pipeline
    pub fn new(extractor: E, transformer: T, loader: L) -> Self {
        Self {
            extractor,
            transformer,
            loader,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of items handed to the transformer at once (default: 100)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stop consuming the source as soon as `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the complete ETL pipeline
    ///
    /// Steps:
    /// 1. Start extraction and capture the schema
    /// 2. Open a loader session for that schema
    /// 3. Transform and load items batch by batch
    /// 4. Commit the session
    ///
    /// Returns the artifact produced by the loader
    ///
    /// # Errors
    /// Returns an error if any stage fails or the run is cancelled. Nothing is
    /// committed in that case.
    pub async fn run(&self) -> Result<ExportArtifact> {
        log::info!("Starting ETL pipeline");

        log::debug!("Extracting from source...");
        let Extraction { schema, mut items } = self.extractor.extract().await?;
        log::debug!("Captured columns [{}]", schema);

        let mut session = self.loader.begin(Arc::clone(&schema)).await?;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut extracted = 0usize;
        let mut loaded = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                next = items.next() => next,
            };

            match next {
                Some(item) => {
                    batch.push(item?);
                    extracted += 1;
                    if batch.len() >= self.batch_size {
                        loaded += self.flush(&mut session, &mut batch).await?;
                    }
                }
                None => break,
            }
        }

        if !batch.is_empty() {
            loaded += self.flush(&mut session, &mut batch).await?;
        }
        log::info!("Extracted {} items, loaded {}", extracted, loaded);

        if extracted == 0 {
            log::warn!("No items extracted, committing empty output");
        }

        // The row stream may hold a source connection; release it before committing
        drop(items);

        log::debug!("Committing to destination...");
        let artifact = session.commit().await?;
        log::info!(
            "Committed {} rows ({} bytes) to {}",
            artifact.row_count,
            artifact.byte_size,
            artifact.location
        );

        Ok(artifact)
    }

    async fn flush(&self, session: &mut L::Session, batch: &mut Vec<E::Item>) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let items = std::mem::replace(batch, Vec::with_capacity(self.batch_size));
        log::debug!("Transforming {} items...", items.len());
        let transformed = self.transformer.transform_many(items).await?;
        let loaded = session.load(transformed).await?;

        // A source that is always ready would otherwise starve timers and
        // cancellation on the same worker
        tokio::task::yield_now().await;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::IdentityTransformer;
    use crate::record::Schema;
    use std::sync::Mutex;

    struct MockExtractor(Vec<Result<i32>>);

    impl MockExtractor {
        fn ok(items: Vec<i32>) -> Self {
            Self(items.into_iter().map(Ok).collect())
        }
    }

    impl Extractor for MockExtractor {
        type Item = i32;

        async fn extract(&self) -> Result<Extraction<'_, Self::Item>> {
            let items = self
                .0
                .iter()
                .map(|item| match item {
                    Ok(n) => Ok(*n),
                    Err(e) => Err(PipelineError::read(e)),
                })
                .collect::<Vec<_>>();
            Ok(Extraction {
                schema: Arc::new(Schema::new(vec!["n".into()])),
                items: futures::stream::iter(items).boxed(),
            })
        }
    }

    struct DoubleTransformer {
        batches: Mutex<Vec<usize>>,
    }

    impl DoubleTransformer {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transformer for DoubleTransformer {
        type Input = i32;
        type Output = i32;

        async fn transform(&self, input: Self::Input) -> Result<Self::Output> {
            Ok(input * 2)
        }

        async fn transform_many(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>> {
            self.batches.lock().unwrap().push(inputs.len());
            Ok(inputs.into_iter().map(|n| n * 2).collect())
        }
    }

    #[derive(Default, Clone)]
    struct SumLoader {
        sum: Arc<Mutex<i32>>,
        committed: Arc<Mutex<bool>>,
    }

    struct SumSession {
        loader: SumLoader,
        pending: i32,
        count: u64,
    }

    impl Loader for SumLoader {
        type Item = i32;
        type Session = SumSession;

        async fn begin(&self, _schema: Arc<Schema>) -> Result<Self::Session> {
            Ok(SumSession {
                loader: self.clone(),
                pending: 0,
                count: 0,
            })
        }
    }

    impl LoadSession for SumSession {
        type Item = i32;

        async fn load(&mut self, items: Vec<Self::Item>) -> Result<usize> {
            self.pending += items.iter().sum::<i32>();
            self.count += items.len() as u64;
            Ok(items.len())
        }

        async fn commit(self) -> Result<ExportArtifact> {
            *self.loader.sum.lock().unwrap() = self.pending;
            *self.loader.committed.lock().unwrap() = true;
            Ok(ExportArtifact {
                location: "memory".into(),
                row_count: self.count,
                byte_size: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_pipeline() {
        let loader = SumLoader::default();
        let pipeline = Pipeline::new(
            MockExtractor::ok(vec![1, 2, 3]),
            DoubleTransformer::new(),
            loader.clone(),
        );

        let artifact = pipeline.run().await.unwrap();
        assert_eq!(artifact.row_count, 3);
        assert_eq!(*loader.sum.lock().unwrap(), 12); // (1+2+3)*2 = 12
    }

    #[tokio::test]
    async fn test_empty_pipeline_still_commits() {
        let loader = SumLoader::default();
        let pipeline = Pipeline::new(
            MockExtractor::ok(vec![]),
            IdentityTransformer::new(),
            loader.clone(),
        );

        let artifact = pipeline.run().await.unwrap();
        assert_eq!(artifact.row_count, 0);
        assert!(*loader.committed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_batches() {
        let loader = SumLoader::default();
        let pipeline = Pipeline::new(
            MockExtractor::ok(vec![1, 2, 3, 4, 5]),
            DoubleTransformer::new(),
            loader,
        )
        .with_batch_size(2);

        pipeline.run().await.unwrap();
        assert_eq!(*pipeline.transformer.batches.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_read_error_skips_commit() {
        let loader = SumLoader::default();
        let pipeline = Pipeline::new(
            MockExtractor(vec![Ok(1), Err(PipelineError::read("connection reset"))]),
            IdentityTransformer::new(),
            loader.clone(),
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Read(_)));
        assert!(!*loader.committed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let loader = SumLoader::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let pipeline = Pipeline::new(
            MockExtractor::ok(vec![1, 2, 3]),
            IdentityTransformer::new(),
            loader.clone(),
        )
        .with_cancellation(cancel);

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(!*loader.committed.lock().unwrap());
    }
}
