#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use flowconn::{
    error::{ConnectionError, TransportError, WriteResult},
    event_loop::EventLoop,
    message::{Append, WireMessage},
    metrics::{MetricNotifier, NoOpMetricNotifier},
    Channel, ClientConnection, FlowHandler, WritePromise,
};
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn append(event_number: i64, len: usize) -> Append {
    Append::new(
        "scope/stream/0",
        Uuid::nil(),
        event_number,
        vec![event_number as u8; len],
    )
}

/// How the mock channel completes the promises it is handed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Complete every write successfully as soon as it is written.
    Succeed,
    /// Keep promises until the test completes them.
    Hold,
}

#[derive(Debug)]
pub struct MockChannel {
    event_loop: EventLoop,
    completion: Mutex<Completion>,
    written: Mutex<Vec<WireMessage>>,
    held: Mutex<VecDeque<WritePromise>>,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    exceptions: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new(completion: Completion) -> Arc<Self> {
        Arc::new(MockChannel {
            event_loop: EventLoop::spawn("mock-channel"),
            completion: Mutex::new(completion),
            written: Mutex::new(Vec::new()),
            held: Mutex::new(VecDeque::new()),
            flushes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            exceptions: Mutex::new(Vec::new()),
        })
    }

    pub fn writes(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    pub fn written_appends(&self) -> Vec<i64> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .filter_map(|msg| msg.as_append().map(|append| append.event_number))
            .collect()
    }

    pub fn written_types(&self) -> Vec<&'static str> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(WireMessage::message_type)
            .collect()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.exceptions.lock().unwrap().clone()
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Completes the oldest held write.
    pub fn complete_next(&self, result: WriteResult) {
        let promise = self
            .held
            .lock()
            .unwrap()
            .pop_front()
            .expect("no held write to complete");
        promise.complete(result);
    }

    pub fn fail_next(&self, err: TransportError) {
        self.complete_next(Err(err));
    }

    pub async fn wait_for_writes(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.writes() < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} writes, saw {}", self.writes()));
    }
}

impl Channel for MockChannel {
    fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    fn write(&self, message: WireMessage, promise: WritePromise) {
        self.written.lock().unwrap().push(message);
        let completion = *self.completion.lock().unwrap();
        match completion {
            Completion::Succeed => promise.succeed(),
            Completion::Hold => self.held.lock().unwrap().push_back(promise),
        }
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn fire_exception_caught(&self, error: &ConnectionError) {
        self.exceptions.lock().unwrap().push(error.to_string());
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub records: Mutex<Vec<(&'static str, Vec<(&'static str, String)>, Duration)>>,
}

impl MetricNotifier for RecordingNotifier {
    fn update_success_metric(
        &self,
        metric: &'static str,
        tags: &[(&'static str, String)],
        elapsed: Duration,
    ) {
        self.records
            .lock()
            .unwrap()
            .push((metric, tags.to_vec(), elapsed));
    }
}

pub struct MockFlow {
    channel: Option<Arc<MockChannel>>,
    notifier: Arc<dyn MetricNotifier>,
    pub recent_messages: AtomicUsize,
    pub channel_requests: AtomicUsize,
    pub closed_flows: Mutex<Vec<u32>>,
}

impl MockFlow {
    pub fn new(channel: Arc<MockChannel>) -> Arc<Self> {
        Self::build(Some(channel), Arc::new(NoOpMetricNotifier))
    }

    pub fn with_notifier(channel: Arc<MockChannel>, notifier: Arc<dyn MetricNotifier>) -> Arc<Self> {
        Self::build(Some(channel), notifier)
    }

    /// A flow whose connection was never established.
    pub fn disconnected() -> Arc<Self> {
        Self::build(None, Arc::new(NoOpMetricNotifier))
    }

    fn build(channel: Option<Arc<MockChannel>>, notifier: Arc<dyn MetricNotifier>) -> Arc<Self> {
        Arc::new(MockFlow {
            channel,
            notifier,
            recent_messages: AtomicUsize::new(0),
            channel_requests: AtomicUsize::new(0),
            closed_flows: Mutex::new(Vec::new()),
        })
    }

    pub fn recent_messages(&self) -> usize {
        self.recent_messages.load(Ordering::SeqCst)
    }

    pub fn channel_requests(&self) -> usize {
        self.channel_requests.load(Ordering::SeqCst)
    }

    pub fn closed_flows(&self) -> Vec<u32> {
        self.closed_flows.lock().unwrap().clone()
    }
}

impl FlowHandler for MockFlow {
    fn channel(&self) -> Result<Arc<dyn Channel>, ConnectionError> {
        self.channel_requests.fetch_add(1, Ordering::SeqCst);
        match &self.channel {
            Some(channel) => Ok(channel.clone() as Arc<dyn Channel>),
            None => Err(ConnectionError::NotEstablished {
                connection_name: "mock".to_string(),
            }),
        }
    }

    fn set_recent_message(&self) {
        self.recent_messages.fetch_add(1, Ordering::SeqCst);
    }

    fn metric_notifier(&self) -> Arc<dyn MetricNotifier> {
        self.notifier.clone()
    }

    fn close_flow(&self, connection: &ClientConnection) {
        self.closed_flows.lock().unwrap().push(connection.flow_id());
    }
}
