#![allow(unused)]
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tracing::Level;

use wms_realtime_core::{
    ChangeTransport, ChannelHandle, InvalidationPredicate, QueryCache, RealtimeConfig, RealtimeManager, TransportError, TransportSink,
};
use wms_realtime_proto::{CacheDomain, ChangeEvent, ChannelStatus, EventKind, Topic};

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init(); }

/// One call to `open`, with the sink the manager handed over
#[derive(Clone)]
pub struct Opened {
    pub channel: String,
    pub topics: Vec<Topic>,
    pub sink: TransportSink,
}

impl Opened {
    pub fn subscribed(&self) { self.sink.status(ChannelStatus::Subscribed); }
    pub fn fail(&self) { self.sink.status(ChannelStatus::ChannelError("connection reset".to_string())); }
    pub fn change(&self, topic: Topic, kind: EventKind) { self.sink.change(ChangeEvent::new(topic, kind)); }
}

/// Transport that never touches the network; tests play the server side through the recorded sinks
#[derive(Default)]
pub struct ScriptedTransport {
    opened: Mutex<Vec<Opened>>,
    refusals: Mutex<VecDeque<TransportError>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Make the next `open` fail synchronously
    pub fn refuse_next(&self, error: TransportError) { self.refusals.lock().unwrap().push_back(error); }

    pub fn open_count(&self) -> usize { self.opened.lock().unwrap().len() }

    pub fn close_count(&self) -> usize { self.closed.load(Ordering::SeqCst) }

    pub fn opened(&self, index: usize) -> Opened { self.opened.lock().unwrap()[index].clone() }

    pub fn last(&self) -> Opened { self.opened.lock().unwrap().last().cloned().expect("nothing opened yet") }
}

impl ChangeTransport for ScriptedTransport {
    fn open(&self, channel: &str, topics: &[Topic], sink: TransportSink) -> Result<Box<dyn ChannelHandle>, TransportError> {
        if let Some(error) = self.refusals.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.opened.lock().unwrap().push(Opened { channel: channel.to_string(), topics: topics.to_vec(), sink });
        Ok(Box::new(ScriptedChannel { closed: self.closed.clone(), done: AtomicBool::new(false) }))
    }
}

struct ScriptedChannel {
    closed: Arc<AtomicUsize>,
    done: AtomicBool,
}

impl ChannelHandle for ScriptedChannel {
    fn close(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Query cache that remembers which domains it was told to drop
#[derive(Default)]
pub struct RecordingCache {
    invalidated: Mutex<Vec<CacheDomain>>,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn take(&self) -> Vec<CacheDomain> { std::mem::take(&mut *self.invalidated.lock().unwrap()) }
}

impl QueryCache for RecordingCache {
    fn invalidate(&self, predicate: &InvalidationPredicate) { self.invalidated.lock().unwrap().push(predicate.domain); }
}

pub fn manager(config: RealtimeConfig) -> (RealtimeManager, Arc<ScriptedTransport>) {
    let transport = ScriptedTransport::new();
    let manager = RealtimeManager::new(config, transport.clone());
    (manager, transport)
}
