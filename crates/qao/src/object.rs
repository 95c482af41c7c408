//! The object trait, its fixed event sequence, and the construction guard
//! that keeps user code from bypassing the scheduler's factory.

use crate::error::QaoError;
use crate::handle::NonOwningHandle;
use crate::runtime::RuntimeRef;

/// The twelve fixed per-step event callbacks, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Event {
    PreUpdate = 0,
    BeginUpdate,
    Update1,
    Update2,
    EndUpdate,
    PostUpdate,
    PreDraw,
    Draw1,
    Draw2,
    DrawGui,
    PostDraw,
    Display,
}

/// All twelve events, in fixed dispatch order.
pub const EVENT_ORDER: [Event; 12] = [
    Event::PreUpdate,
    Event::BeginUpdate,
    Event::Update1,
    Event::Update2,
    Event::EndUpdate,
    Event::PostUpdate,
    Event::PreDraw,
    Event::Draw1,
    Event::Draw2,
    Event::DrawGui,
    Event::PostDraw,
    Event::Display,
];

bitflags::bitflags! {
    /// A caller-provided mask of which events a given `Runtime::step` invocation
    /// should dispatch. Defaults to all twelve.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u16 {
        const PRE_UPDATE   = 1 << 0;
        const BEGIN_UPDATE = 1 << 1;
        const UPDATE_1     = 1 << 2;
        const UPDATE_2     = 1 << 3;
        const END_UPDATE   = 1 << 4;
        const POST_UPDATE  = 1 << 5;
        const PRE_DRAW     = 1 << 6;
        const DRAW_1       = 1 << 7;
        const DRAW_2       = 1 << 8;
        const DRAW_GUI     = 1 << 9;
        const POST_DRAW    = 1 << 10;
        const DISPLAY      = 1 << 11;
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::all()
    }
}

impl Event {
    pub(crate) fn mask_bit(self) -> EventMask {
        match self {
            Event::PreUpdate => EventMask::PRE_UPDATE,
            Event::BeginUpdate => EventMask::BEGIN_UPDATE,
            Event::Update1 => EventMask::UPDATE_1,
            Event::Update2 => EventMask::UPDATE_2,
            Event::EndUpdate => EventMask::END_UPDATE,
            Event::PostUpdate => EventMask::POST_UPDATE,
            Event::PreDraw => EventMask::PRE_DRAW,
            Event::Draw1 => EventMask::DRAW_1,
            Event::Draw2 => EventMask::DRAW_2,
            Event::DrawGui => EventMask::DRAW_GUI,
            Event::PostDraw => EventMask::POST_DRAW,
            Event::Display => EventMask::DISPLAY,
        }
    }
}

/// A witness type that only [`crate::runtime::Runtime::create`] can produce.
/// Its constructor is private to this crate, so user code cannot instantiate
/// a `QaoObject` implementation without going through the factory.
pub struct InstantiationGuard {
    _private: (),
}

impl InstantiationGuard {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Implemented by every object kind that wants to live inside a [`crate::Runtime`].
///
/// Instances are never constructed directly by user code: they are always
/// created through [`crate::Runtime::create`], which threads an
/// [`InstantiationGuard`] through the type's constructor.
pub trait QaoObject: std::any::Any {
    /// A short, dynamic type tag used for diagnostics and downcasting by kind.
    fn type_name(&self) -> &'static str;

    /// Diagnostic name, mutable at will by the object or its owner.
    fn name(&self) -> &str;

    /// Sets the diagnostic name.
    fn set_name(&mut self, name: String);

    /// Called once, right after construction, before attachment.
    fn set_up(&mut self) -> Result<(), QaoError> {
        Ok(())
    }

    /// Called once the object has been attached to a runtime.
    fn did_attach(&mut self, _self_handle: NonOwningHandle) {}

    /// Called once, right before the object is detached from its runtime.
    fn will_detach(&mut self, _self_handle: NonOwningHandle) {}

    /// Called once, right before the object is freed.
    fn tear_down(&mut self) {}

    /// One of the twelve fixed per-step callbacks. The default implementation
    /// is a no-op; concrete object kinds override only the events they care about.
    fn on_event(&mut self, _event: Event, _runtime: &RuntimeRef, _self_handle: NonOwningHandle) {}

    /// Upcast helper for downcasting through `dyn QaoObject`.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable upcast helper for downcasting through `dyn QaoObject`.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
