use parking_lot::Mutex;

/// Write models waiting for the next bulk commit.
#[derive(Debug)]
pub(crate) struct BulkBuffer<M> {
    ops: Mutex<Vec<M>>,
    max_ops: usize,
}

impl<M> BulkBuffer<M> {
    pub(crate) const fn new(max_ops: usize) -> Self {
        Self { ops: Mutex::new(Vec::new()), max_ops }
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.lock().len()
    }

    /// Appends `models`, returning whether the buffer reached its limit.
    pub(crate) fn push(&self, models: impl IntoIterator<Item = M>) -> bool {
        let mut ops = self.ops.lock();
        ops.extend(models);
        ops.len() >= self.max_ops
    }

    /// Hands every buffered model to `write`.
    ///
    /// The buffer is empty afterwards whatever `write` returns. `None` when nothing was buffered.
    pub(crate) async fn drain_into<R, E, F, Fut>(&self, write: F) -> Result<Option<R>, E>
    where
        F: FnOnce(Vec<M>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let models = std::mem::take(&mut *self.ops.lock());
        if models.is_empty() {
            return Ok(None);
        }
        write(models).await.map(Some)
    }
}
