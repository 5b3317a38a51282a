//! Aggregates the completion of several writes into a single outcome.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use once_cell::sync::OnceCell;

use crate::{
    channel::WritePromise,
    error::{TransportError, WriteResult},
};

type Callback = Box<dyn FnOnce(WriteResult) + Send + 'static>;

struct Shared {
    // Outstanding promises, plus one held by the combiner until `finish`.
    pending: AtomicUsize,
    cause: OnceCell<TransportError>,
    callback: Mutex<Option<Callback>>,
}

impl Shared {
    fn arrive(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let callback = self
                .callback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(callback) = callback {
                callback(match self.cause.get() {
                    Some(cause) => Err(cause.clone()),
                    None => Ok(()),
                });
            }
        }
    }
}

/// Combines the promises of a batch of writes into one callback.
///
/// Each [`add`](PromiseCombiner::add) hands out a promise for one write. After every write was issued,
/// [`finish`](PromiseCombiner::finish) registers the callback, which then runs exactly once when the last promise
/// completes. The callback succeeds only if every write succeeded, otherwise it receives the first reported failure.
///
/// # Example
///
/// ```
/// use flowconn::combiner::PromiseCombiner;
///
/// let mut combiner = PromiseCombiner::new();
/// let first = combiner.add();
/// let second = combiner.add();
/// combiner.finish(|res| assert!(res.is_ok()));
///
/// first.succeed();
/// second.succeed();
/// ```
pub struct PromiseCombiner {
    shared: Arc<Shared>,
    added: usize,
}

impl PromiseCombiner {
    /// Creates an empty combiner.
    pub fn new() -> Self {
        PromiseCombiner {
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(1),
                cause: OnceCell::new(),
                callback: Mutex::new(None),
            }),
            added: 0,
        }
    }

    /// Returns a promise to attach to one more write.
    pub fn add(&mut self) -> WritePromise {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.added += 1;
        let shared = self.shared.clone();
        WritePromise::new(move |res| {
            if let Err(err) = res {
                let _ = shared.cause.set(err);
            }
            shared.arrive();
        })
    }

    /// Number of promises handed out so far.
    pub fn len(&self) -> usize {
        self.added
    }

    /// Returns `true` if no promise was handed out.
    pub fn is_empty(&self) -> bool {
        self.added == 0
    }

    /// Registers the aggregate callback.
    ///
    /// Runs `callback` immediately if every added promise already completed, or if none was added.
    pub fn finish<F>(self, callback: F)
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        *self
            .shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
        self.shared.arrive();
    }
}

impl Default for PromiseCombiner {
    fn default() -> Self {
        PromiseCombiner::new()
    }
}

impl fmt::Debug for PromiseCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseCombiner")
            .field("added", &self.added)
            .field("pending", &self.shared.pending.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting() -> (
        Arc<AtomicUsize>,
        Arc<Mutex<Option<WriteResult>>>,
        impl FnOnce(WriteResult) + Send + 'static,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = Arc::new(Mutex::new(None));
        let callback = {
            let calls = calls.clone();
            let outcome = outcome.clone();
            move |res: WriteResult| {
                calls.fetch_add(1, Ordering::SeqCst);
                *outcome.lock().unwrap() = Some(res);
            }
        };
        (calls, outcome, callback)
    }

    #[test]
    fn empty_batch_succeeds_on_finish() {
        let (calls, outcome, callback) = counting();
        PromiseCombiner::new().finish(callback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(*outcome.lock().unwrap(), Some(Ok(()))));
    }

    #[test]
    fn waits_for_every_promise() {
        let (calls, outcome, callback) = counting();
        let mut combiner = PromiseCombiner::new();
        let promises: Vec<_> = (0..3).map(|_| combiner.add()).collect();
        assert_eq!(combiner.len(), 3);
        combiner.finish(callback);

        let mut promises = promises.into_iter();
        promises.next().unwrap().succeed();
        promises.next().unwrap().succeed();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        promises.next().unwrap().succeed();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(*outcome.lock().unwrap(), Some(Ok(()))));
    }

    #[test]
    fn completions_before_finish_do_not_fire() {
        let (calls, outcome, callback) = counting();
        let mut combiner = PromiseCombiner::new();
        combiner.add().succeed();
        combiner.add().fail(TransportError::ChannelClosed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        combiner.finish(callback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            *outcome.lock().unwrap(),
            Some(Err(TransportError::ChannelClosed))
        ));
    }

    #[test]
    fn first_failure_wins() {
        let (calls, outcome, callback) = counting();
        let mut combiner = PromiseCombiner::new();
        let a = combiner.add();
        let b = combiner.add();
        let c = combiner.add();
        combiner.finish(callback);

        b.fail(TransportError::Other("first".into()));
        a.succeed();
        c.fail(TransportError::Abandoned);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match &*outcome.lock().unwrap() {
            Some(Err(TransportError::Other(msg))) => assert_eq!(msg, "first"),
            other => panic!("unexpected outcome: {other:?}"),
        };
    }
}
