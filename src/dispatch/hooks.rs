use crate::models::queue::QueueItem;

/// Called once after every successful send, before contact recording and
/// before the item is removed from the queue.
pub trait ProcessedHook: Send + Sync {
    fn on_processed(&self, item: &QueueItem);
}

pub struct NoopHook;

impl ProcessedHook for NoopHook {
    fn on_processed(&self, _item: &QueueItem) {}
}

/// Adapts a closure into a [`ProcessedHook`].
pub struct FnHook<F>(pub F);

impl<F> ProcessedHook for FnHook<F>
where
    F: Fn(&QueueItem) + Send + Sync,
{
    fn on_processed(&self, item: &QueueItem) {
        (self.0)(item)
    }
}
