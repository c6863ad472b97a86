//! Generic event view over pool-backed objects.
//!
//! An [`Event`] is a tagged variant keyed by [`EventType`] and
//! [`EventSubtype`]. Buffers are the only kind defined here; the enum is
//! `#[non_exhaustive]` so further kinds can be added as new variants.
//!
//! # Example
//!
//! ```rust
//! use blockpool::event::{Event, EventSubtype, EventType};
//! use blockpool::Buffer;
//!
//! let event = Buffer::INVALID.to_event();
//! assert_eq!(event.event_type(), EventType::Buffer);
//! assert_eq!(event.types(), (EventType::Buffer, EventSubtype::None));
//! assert_eq!(event.to_u64(), Event::INVALID.to_u64());
//! ```

use crate::buffer::Buffer;
use std::fmt;

/// Kind of payload an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventType {
    /// A plain buffer from a buffer pool.
    Buffer = 1,
}

/// Refinement of an [`EventType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventSubtype {
    /// No subtype.
    #[default]
    None = 0,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Buffer => write!(f, "buffer"),
        }
    }
}

impl fmt::Display for EventSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSubtype::None => write!(f, "none"),
        }
    }
}

/// A typed, read-only view of a pool object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Event {
    /// A buffer event.
    Buffer(Buffer),
}

impl Event {
    /// The reserved invalid event.
    pub const INVALID: Event = Event::Buffer(Buffer::INVALID);

    /// Type tag of the event.
    #[inline]
    pub const fn event_type(&self) -> EventType {
        match self {
            Event::Buffer(_) => EventType::Buffer,
        }
    }

    /// Subtype tag of the event.
    #[inline]
    pub const fn subtype(&self) -> EventSubtype {
        match self {
            Event::Buffer(_) => EventSubtype::None,
        }
    }

    /// Type and subtype together.
    #[inline]
    pub const fn types(&self) -> (EventType, EventSubtype) {
        (self.event_type(), self.subtype())
    }

    /// Buffer carried by the event.
    #[inline]
    pub const fn to_buffer(self) -> Buffer {
        match self {
            Event::Buffer(buffer) => buffer,
        }
    }

    /// Returns true for [`Event::INVALID`].
    #[inline]
    pub const fn is_invalid(&self) -> bool {
        match self {
            Event::Buffer(buffer) => buffer.is_invalid(),
        }
    }

    /// Numeric identity, following the same contract as [`Buffer::to_u64`].
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        match self {
            Event::Buffer(buffer) => buffer.to_u64(),
        }
    }
}

impl From<Buffer> for Event {
    fn from(buffer: Buffer) -> Self {
        Event::Buffer(buffer)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ty, subtype) = self.types();
        match self {
            Event::Buffer(buffer) => write!(f, "event:{ty}/{subtype} {buffer}"),
        }
    }
}
