pub mod structured;

pub use structured::{
    ClassifierEvent, Event, EventBus, MemoryEventBus, PoolEvent, RecoveryEvent,
};
