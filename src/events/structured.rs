use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Pool lifecycle events: endpoint inventory and status changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PoolEvent {
    EndpointStatusChanged {
        id: String,
        previous: String,
        current: String,
    },
    EndpointsReloaded {
        count: usize,
    },
    SelectionExhausted {
        domain: String,
        strategy: String,
    },
    ModelSwapped {
        version: u64,
        samples: usize,
    },
}

/// Ban classification events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClassifierEvent {
    BanDetected {
        endpoint: String,
        domain: String,
        category: String,
        confidence: f64,
    },
}

/// Per-(endpoint, domain) recovery state machine events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RecoveryEvent {
    PairDegraded {
        endpoint: String,
        domain: String,
        consecutive_failures: u32,
    },
    PairCoolingDown {
        endpoint: String,
        domain: String,
        deadline_ms: i64,
        cooldown_count: u32,
    },
    PairRetired {
        endpoint: String,
        domain: String,
        cooldown_count: u32,
    },
    PairRecovered {
        endpoint: String,
        domain: String,
    },
}

/// Unified top-level event enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    Pool(PoolEvent),
    Classifier(ClassifierEvent),
    Recovery(RecoveryEvent),
}

/// Minimal event bus capability.
pub trait EventBus: Send + Sync + 'static {
    fn publish(&self, evt: Event);
}

// Marker trait so the global bus can be downcast in tests.
pub trait EventBusAny: EventBus + Any {}
impl<T: EventBus + Any> EventBusAny for T {}

/// In-memory event bus for tests and development.
#[derive(Clone, Default)]
pub struct MemoryEventBus {
    inner: Arc<Mutex<Vec<Event>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_all(&self) -> Vec<Event> {
        if let Ok(mut g) = self.inner.lock() {
            let out = g.clone();
            g.clear();
            out
        } else {
            Vec::new()
        }
    }

    pub fn snapshot(&self) -> Vec<Event> {
        if let Ok(g) = self.inner.lock() {
            g.clone()
        } else {
            Vec::new()
        }
    }
}

impl EventBus for MemoryEventBus {
    fn publish(&self, evt: Event) {
        if let Ok(mut g) = self.inner.lock() {
            g.push(evt);
        }
    }
}

static GLOBAL_BUS: OnceCell<Arc<dyn EventBusAny>> = OnceCell::new();

pub fn set_global_event_bus(bus: Arc<dyn EventBusAny>) -> Result<(), &'static str> {
    GLOBAL_BUS.set(bus).map_err(|_| "global event bus already set")
}

pub fn publish_global(evt: Event) {
    // Thread-local override first, so integration tests can capture events
    // without touching the process-wide bus.
    if let Some(bus) = TEST_OVERRIDE_BUS.with(|cell| cell.borrow().clone()) {
        bus.publish(evt.clone());
    }
    if let Some(bus) = GLOBAL_BUS.get() {
        bus.publish(evt);
    }
}

/// If the global bus is a MemoryEventBus, return a clone sharing its storage.
pub fn get_global_memory_bus() -> Option<MemoryEventBus> {
    GLOBAL_BUS.get().and_then(|b| {
        let any_ref = b.as_ref() as &dyn Any;
        any_ref.downcast_ref::<MemoryEventBus>().cloned()
    })
}

thread_local! {
    static TEST_OVERRIDE_BUS: std::cell::RefCell<Option<Arc<dyn EventBusAny>>> =
        const { std::cell::RefCell::new(None) };
}

pub fn set_test_event_bus(bus: Arc<dyn EventBusAny>) {
    TEST_OVERRIDE_BUS.with(|cell| *cell.borrow_mut() = Some(bus));
}

pub fn clear_test_event_bus() {
    TEST_OVERRIDE_BUS.with(|cell| *cell.borrow_mut() = None);
}
