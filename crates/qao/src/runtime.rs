//! The scheduler: owns objects, keeps them in priority order, and drives
//! the fixed twelve-event step sequence.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{instrument, trace};

use crate::error::QaoError;
use crate::handle::{Handle, NonOwningHandle};
use crate::id::ObjectId;
use crate::object::{Event, EventMask, InstantiationGuard, QaoObject, EVENT_ORDER};
use crate::orderer::{order_key, OrderKey, Orderer};

struct Slot {
    serial: u32,
    object: Option<Box<dyn QaoObject>>,
    priority: i32,
    token: u64,
    attached: bool,
    /// Set when a destroy was requested for an object currently checked out
    /// of its slot by the dispatch loop (i.e. self-detach/self-destroy).
    pending_free: bool,
}

pub(crate) struct RuntimeInner {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    ordered: Orderer,
    next_token: u64,
    step_ordinal: i64,
}

pub(crate) type RuntimeInnerCell = RefCell<RuntimeInner>;

impl RuntimeInner {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            ordered: Orderer::default(),
            next_token: 0,
            step_ordinal: 0,
        }
    }

    fn allocate_slot(&mut self, object: Box<dyn QaoObject>) -> ObjectId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.attached = false;
            slot.pending_free = false;
            ObjectId::new(index, slot.serial)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                serial: 1,
                object: Some(object),
                priority: 0,
                token: 0,
                attached: false,
                pending_free: false,
            });
            ObjectId::new(index, 1)
        }
    }

    fn order_key_of(&self, index: u32) -> OrderKey {
        let slot = &self.slots[index as usize];
        order_key(slot.priority, slot.token)
    }

    fn attach(&mut self, id: ObjectId, priority: i32) {
        let index = id.index;
        self.next_token += 1;
        let token = self.next_token;
        {
            let slot = &mut self.slots[index as usize];
            slot.priority = priority;
            slot.token = token;
            slot.attached = true;
        }
        self.ordered.insert(order_key(priority, token), index);
    }

    /// Detaches `id` from the ordered set (if attached) without destroying
    /// the stored object, returning whether it was attached.
    fn detach_index(&mut self, index: u32) -> bool {
        let slot = &mut self.slots[index as usize];
        if !slot.attached {
            return false;
        }
        let key = order_key(slot.priority, slot.token);
        slot.attached = false;
        self.ordered.remove(key);
        true
    }

    pub(crate) fn destroy_object(&mut self, id: ObjectId) {
        let idx = id.index as usize;
        let Some(slot) = self.slots.get_mut(idx) else {
            return;
        };
        if slot.serial != id.serial {
            return; // stale id; already recycled.
        }
        if slot.object.is_none() {
            // Checked out by the dispatch loop (self-destroy mid-callback).
            self.detach_index(id.index);
            self.slots[idx].pending_free = true;
            return;
        }
        self.detach_index(id.index);
        let mut obj = slot.object.take().unwrap();
        obj.will_detach(NonOwningHandle::new(id));
        obj.tear_down();
        let slot = &mut self.slots[idx];
        slot.serial = slot.serial.wrapping_add(1).max(1);
        self.free_list.push(id.index);
    }

    fn set_priority(&mut self, id: ObjectId, new_priority: i32) -> Result<(), QaoError> {
        let idx = id.index as usize;
        let slot = self
            .slots
            .get_mut(idx)
            .filter(|s| s.serial == id.serial)
            .ok_or(QaoError::NotAttached(id))?;
        if !slot.attached {
            slot.priority = new_priority;
            return Ok(());
        }
        let old_key = order_key(slot.priority, slot.token);
        self.next_token += 1;
        let new_token = self.next_token;
        slot.priority = new_priority;
        slot.token = new_token;
        self.ordered.remove(old_key);
        self.ordered.insert(order_key(new_priority, new_token), id.index);
        Ok(())
    }

    pub(crate) fn object_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub(crate) fn attached_count(&self) -> usize {
        self.ordered.len()
    }
}

/// A cheap, cloneable reference to a [`Runtime`], handed to objects during
/// event dispatch so they can create further objects, resolve handles, or
/// otherwise call back into the scheduler.
#[derive(Clone)]
pub struct RuntimeRef {
    inner: Rc<RuntimeInnerCell>,
}

impl RuntimeRef {
    fn weak(&self) -> Weak<RuntimeInnerCell> {
        Rc::downgrade(&self.inner)
    }

    /// Constructs a new object via its private-constructor factory protocol.
    ///
    /// `ctor` receives an [`InstantiationGuard`] that only this method can
    /// produce, so objects cannot be instantiated outside the factory.
    /// `priority` and `attach` control whether the object joins the
    /// scheduler's ordered set immediately.
    #[instrument(skip(self, ctor), fields(attach = attach))]
    pub fn create<T, F>(&self, attach: bool, priority: i32, ctor: F) -> Result<Handle, QaoError>
    where
        T: QaoObject + 'static,
        F: FnOnce(InstantiationGuard) -> T,
    {
        let mut object = Box::new(ctor(InstantiationGuard::new()));
        object
            .set_up()
            .map_err(|e| QaoError::ConstructionFailed(format!("{e:?}")))?;

        let id = self.inner.borrow_mut().allocate_slot(object);

        if attach {
            self.inner.borrow_mut().attach(id, priority);
            if let Some(slot) = self.inner.borrow_mut().slots.get_mut(id.index as usize) {
                if let Some(obj) = slot.object.as_mut() {
                    obj.did_attach(NonOwningHandle::new(id));
                }
            }
            trace!(?id, priority, "object attached");
            Ok(Handle::non_owning(self.weak(), id))
        } else {
            trace!(?id, "object constructed standalone");
            Ok(Handle::owning(self.weak(), id))
        }
    }

    /// Detaches the named object from the scheduler (no-op if not attached
    /// or unknown), returning an owning handle to it.
    pub fn detach_object(&self, id: ObjectId) -> Handle {
        self.inner.borrow_mut().detach_index(id.index);
        Handle::owning(self.weak(), id)
    }

    /// Re-prioritizes an attached (or standalone) object.
    pub fn set_priority(&self, id: ObjectId, new_priority: i32) -> Result<(), QaoError> {
        self.inner.borrow_mut().set_priority(id, new_priority)
    }

    /// Runs `f` with shared access to the object named by `id`, if live.
    pub fn with_object<R>(&self, id: ObjectId, f: impl FnOnce(&dyn QaoObject) -> R) -> Option<R> {
        let inner = self.inner.borrow();
        let slot = inner.slots.get(id.index as usize)?;
        if slot.serial != id.serial {
            return None;
        }
        slot.object.as_deref().map(f)
    }

    /// Runs `f` with mutable access to the object named by `id`, if live.
    pub fn with_object_mut<R>(&self, id: ObjectId, f: impl FnOnce(&mut dyn QaoObject) -> R) -> Option<R> {
        let mut inner = self.inner.borrow_mut();
        let slot = inner.slots.get_mut(id.index as usize)?;
        if slot.serial != id.serial {
            return None;
        }
        slot.object.as_deref_mut().map(f)
    }

    pub fn object_count(&self) -> usize {
        self.inner.borrow().object_count()
    }

    pub fn attached_count(&self) -> usize {
        self.inner.borrow().attached_count()
    }

    pub fn step_ordinal(&self) -> i64 {
        self.inner.borrow().step_ordinal
    }
}

/// The top-level scheduler. Single-threaded, cooperative: every object and
/// every event callback runs on whichever thread owns this `Runtime`.
pub struct Runtime {
    inner: Rc<RuntimeInnerCell>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RuntimeInner::new())),
        }
    }

    /// A cloneable reference usable from inside event callbacks.
    pub fn handle_ref(&self) -> RuntimeRef {
        RuntimeRef {
            inner: self.inner.clone(),
        }
    }

    pub fn create<T, F>(&self, attach: bool, priority: i32, ctor: F) -> Result<Handle, QaoError>
    where
        T: QaoObject + 'static,
        F: FnOnce(InstantiationGuard) -> T,
    {
        self.handle_ref().create(attach, priority, ctor)
    }

    pub fn object_count(&self) -> usize {
        self.inner.borrow().object_count()
    }

    pub fn attached_count(&self) -> usize {
        self.inner.borrow().attached_count()
    }

    pub fn step_ordinal(&self) -> i64 {
        self.inner.borrow().step_ordinal
    }

    /// Runs one event, in priority order, against a point-in-time snapshot
    /// of the ordered set. Each object is briefly checked out of its slot
    /// (so its callback can freely call back into the runtime, including to
    /// create new objects or destroy itself) and then either restored or,
    /// if it was destroyed mid-callback, torn down.
    fn dispatch_event(&self, event: Event) {
        let snapshot = self.inner.borrow().ordered.snapshot();
        let rt_ref = self.handle_ref();

        for (key, index) in snapshot {
            let checked_out = {
                let inner = self.inner.borrow();
                if !inner.ordered.contains_at(key, index) {
                    // Detached, destroyed, or reprioritized since the snapshot was taken.
                    continue;
                }
                inner.slots[index as usize].serial
            };

            let mut object = {
                let mut inner = self.inner.borrow_mut();
                match inner.slots[index as usize].object.take() {
                    Some(obj) => obj,
                    None => continue, // already checked out (shouldn't happen: single-threaded)
                }
            };

            let id = ObjectId::new(index, checked_out);
            object.on_event(event, &rt_ref, NonOwningHandle::new(id));

            let mut inner = self.inner.borrow_mut();
            let slot = &mut inner.slots[index as usize];
            if slot.pending_free {
                object.tear_down();
                slot.pending_free = false;
                slot.serial = slot.serial.wrapping_add(1).max(1);
                inner.free_list.push(index);
            } else {
                slot.object = Some(object);
            }
        }
    }

    /// Dispatches every event selected by `mask`, in fixed order, and bumps
    /// the step ordinal once the whole pass completes.
    #[instrument(skip(self))]
    pub fn step(&self, mask: EventMask) {
        for &event in EVENT_ORDER.iter() {
            if mask.contains(event.mask_bit()) {
                self.dispatch_event(event);
            }
        }
        self.inner.borrow_mut().step_ordinal += 1;
        trace!(step = self.step_ordinal(), "scheduler step complete");
    }

    /// Convenience: runs a full step with every event enabled.
    pub fn step_all(&self) {
        self.step(EventMask::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::NonOwningHandle as NOH;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    struct SimpleActor {
        log: StdRc<StdRefCell<Vec<i32>>>,
        tag: i32,
        name: String,
    }

    impl QaoObject for SimpleActor {
        fn type_name(&self) -> &'static str {
            "SimpleActor"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn set_name(&mut self, name: String) {
            self.name = name;
        }
        fn on_event(&mut self, event: Event, _runtime: &RuntimeRef, _self_handle: NOH) {
            if event == Event::Update1 {
                self.log.borrow_mut().push(self.tag);
            }
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    struct SelfDetacher {
        log: StdRc<StdRefCell<Vec<i32>>>,
        tag: i32,
        name: String,
    }

    impl QaoObject for SelfDetacher {
        fn type_name(&self) -> &'static str {
            "SelfDetacher"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn set_name(&mut self, name: String) {
            self.name = name;
        }
        fn on_event(&mut self, event: Event, runtime: &RuntimeRef, self_handle: NOH) {
            if event == Event::Update1 {
                self.log.borrow_mut().push(self.tag);
                // Detaching returns an owning handle; dropping it tears the
                // object down immediately, even mid-callback.
                drop(runtime.detach_object(self_handle.id()));
            }
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn objects_run_in_priority_order_regardless_of_creation_order() {
        let rt = Runtime::new();
        let log = StdRc::new(StdRefCell::new(Vec::new()));

        let l1 = log.clone();
        rt.create(true, 60, move |_g| SimpleActor {
            log: l1,
            tag: 60,
            name: "c".into(),
        })
        .unwrap();
        let l2 = log.clone();
        rt.create(true, 80, move |_g| SimpleActor {
            log: l2,
            tag: 80,
            name: "a".into(),
        })
        .unwrap();
        let l3 = log.clone();
        rt.create(true, 70, move |_g| SimpleActor {
            log: l3,
            tag: 70,
            name: "b".into(),
        })
        .unwrap();

        rt.step_all();
        assert_eq!(*log.borrow(), vec![80, 70, 60]);
    }

    #[test]
    fn self_detach_during_callback_is_safe() {
        let rt = Runtime::new();
        let log = StdRc::new(StdRefCell::new(Vec::new()));

        for tag in [3, 2, 1] {
            let l = log.clone();
            rt.create(true, tag, move |_g| SelfDetacher {
                log: l,
                tag,
                name: format!("detacher-{tag}"),
            })
            .unwrap();
        }
        let l0 = log.clone();
        rt.create(true, -1000, move |_g| SimpleActor {
            log: l0,
            tag: 0,
            name: "control".into(),
        })
        .unwrap();

        assert_eq!(rt.object_count(), 4);
        rt.step_all();
        assert_eq!(rt.object_count(), 1);
        assert_eq!(*log.borrow(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn reprioritizing_preserves_total_order() {
        let rt = Runtime::new();
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let l1 = log.clone();
        let h1 = rt
            .create(true, 10, move |_g| SimpleActor {
                log: l1,
                tag: 10,
                name: "x".into(),
            })
            .unwrap();
        let l2 = log.clone();
        rt.create(true, 20, move |_g| SimpleActor {
            log: l2,
            tag: 20,
            name: "y".into(),
        })
        .unwrap();

        rt.handle_ref().set_priority(h1.id(), 30).unwrap();
        rt.step_all();
        assert_eq!(*log.borrow(), vec![10, 20]);
    }
}
