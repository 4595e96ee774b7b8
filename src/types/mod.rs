pub use self::{
    decoded_event::{DecodedEvent, EventCatalog, EventPayload, LogMeta},
    event_kind::EventKind,
};

pub mod contract;
mod decoded_event;
mod event_kind;
