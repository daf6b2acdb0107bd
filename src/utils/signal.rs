//! Event sources and revocable subscriptions
//!
//! A [`Signal`] is the delivery list of one event source. Listeners are held
//! weakly by the list; the only strong reference lives in the
//! [`Subscription`] returned on registration. Dropping the subscription
//! therefore both unlinks it and makes any in-flight snapshot of the list
//! skip it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use log::error;

type Callback<E> = RefCell<dyn FnMut(&E)>;

struct Slot<E> {
    id: usize,
    callback: Weak<Callback<E>>,
}

struct SignalInner<E> {
    slots: RefCell<Vec<Slot<E>>>,
    next_id: Cell<usize>,
    emitting: Cell<bool>,
    pending: RefCell<VecDeque<E>>,
}

trait Detach {
    fn detach(&self, id: usize);
}

impl<E> Detach for SignalInner<E> {
    fn detach(&self, id: usize) {
        self.slots.borrow_mut().retain(|slot| slot.id != id);
    }
}

/// An event source delivering payloads of type `E` to its subscribers
pub struct Signal<E> {
    inner: Rc<SignalInner<E>>,
}

impl<E: 'static> Signal<E> {
    /// Create a signal with an empty delivery list
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SignalInner {
                slots: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                emitting: Cell::new(false),
                pending: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Register an ownerless callback
    ///
    /// The callback stays on the delivery list for as long as the returned
    /// [`Subscription`] is alive.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn connect<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&E) + 'static,
    {
        let callback: Rc<Callback<E>> = Rc::new(RefCell::new(callback));
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let mut slots = self.inner.slots.borrow_mut();
        slots.retain(|slot| slot.callback.strong_count() > 0);
        slots.push(Slot {
            id,
            callback: Rc::downgrade(&callback),
        });
        drop(slots);

        let source: Weak<dyn Detach> = Rc::downgrade(&self.inner) as Weak<dyn Detach>;
        Subscription {
            id,
            source,
            _callback: Box::new(callback),
        }
    }

    /// Deliver `event` to every live subscriber, in registration order
    ///
    /// Emitting the same signal again from inside one of its callbacks
    /// queues the nested event; it is delivered after the current one and
    /// before the outermost call returns.
    pub fn emit(&self, event: E) {
        if self.inner.emitting.get() {
            self.inner.pending.borrow_mut().push_back(event);
            return;
        }

        let _guard = EmitGuard::enter(&self.inner.emitting);
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let callbacks: Vec<Weak<Callback<E>>> = self
                .inner
                .slots
                .borrow()
                .iter()
                .map(|slot| slot.callback.clone())
                .collect();

            for callback in callbacks {
                // Subscriptions dropped by an earlier callback no longer upgrade.
                let Some(callback) = callback.upgrade() else {
                    continue;
                };
                match callback.try_borrow_mut() {
                    Ok(mut callback) => (&mut *callback)(&event),
                    Err(_) => error!("Skipping a listener that is already running"),
                };
            }

            next = self.inner.pending.borrow_mut().pop_front();
        }
    }

    /// Number of subscriptions currently attached
    pub fn listener_count(&self) -> usize {
        self.inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.callback.strong_count() > 0)
            .count()
    }
}

impl<E: 'static> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.inner.slots.borrow().len())
            .finish_non_exhaustive()
    }
}

struct EmitGuard<'a>(&'a Cell<bool>);

impl<'a> EmitGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for EmitGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A callback bound to one [`Signal`]
///
/// Not `Clone`: each subscription is one entry on one delivery list, and
/// dropping it removes that entry.
#[must_use = "dropping the subscription unregisters the callback"]
pub struct Subscription {
    id: usize,
    source: Weak<dyn Detach>,
    _callback: Box<dyn Any>,
}

impl Subscription {
    /// Bind `handler` to `source`, delivering to `owner`
    ///
    /// The owner is held weakly next to the handler. Events arriving after
    /// the owner is gone are skipped. An event that would re-enter an owner
    /// that is already borrowed is a bug: debug builds panic, release builds
    /// log and drop it.
    pub fn bind<O, E, F>(owner: &Weak<RefCell<O>>, source: &Signal<E>, mut handler: F) -> Self
    where
        O: 'static,
        E: 'static,
        F: FnMut(&mut O, &E) + 'static,
    {
        let owner = owner.clone();
        source.connect(move |event| {
            let Some(owner) = owner.upgrade() else {
                return;
            };
            let borrowed = owner.try_borrow_mut();
            debug_assert!(
                borrowed.is_ok(),
                "event delivered while its owner was borrowed"
            );
            match borrowed {
                Ok(mut owner) => handler(&mut *owner, event),
                Err(_) => error!("Dropping an event delivered while its owner was borrowed"),
            };
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.detach(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &(self.source.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_in_registration_order() {
        let signal = Signal::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let log = log.clone();
            signal.connect(move |v| log.borrow_mut().push(("first", *v)))
        };
        let second = {
            let log = log.clone();
            signal.connect(move |v| log.borrow_mut().push(("second", *v)))
        };

        signal.emit(7);
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
        assert_eq!(signal.listener_count(), 2);

        drop(first);
        drop(second);
        assert_eq!(signal.listener_count(), 0);
    }

    #[test]
    fn test_dropped_subscription_not_invoked() {
        let signal = Signal::<()>::new();
        let hits = Rc::new(Cell::new(0));

        let sub = {
            let hits = hits.clone();
            signal.connect(move |_| hits.set(hits.get() + 1))
        };
        signal.emit(());
        drop(sub);
        signal.emit(());

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_drop_during_delivery_skips_later_listener() {
        let signal = Signal::<()>::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let victim_hits = Rc::new(Cell::new(0));

        let _killer = {
            let victim = victim.clone();
            signal.connect(move |_| {
                victim.borrow_mut().take();
            })
        };
        *victim.borrow_mut() = Some({
            let victim_hits = victim_hits.clone();
            signal.connect(move |_| victim_hits.set(victim_hits.get() + 1))
        });

        signal.emit(());
        assert_eq!(victim_hits.get(), 0);
        assert_eq!(signal.listener_count(), 1);
    }

    #[test]
    fn test_reentrant_emit_is_queued() {
        let signal = Signal::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _sub = {
            let seen = seen.clone();
            let again = Signal {
                inner: signal.inner.clone(),
            };
            signal.connect(move |v| {
                seen.borrow_mut().push(*v);
                if *v == 1 {
                    again.emit(2);
                    // the nested event has not been delivered yet
                    assert_eq!(seen.borrow().len(), 1);
                }
            })
        };

        signal.emit(1);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_bind_delivers_to_owner() {
        struct Counter {
            total: i32,
        }

        let owner = Rc::new(RefCell::new(Counter { total: 0 }));
        let signal = Signal::<i32>::new();
        let _sub = Subscription::bind(&Rc::downgrade(&owner), &signal, |counter: &mut Counter, v| {
            counter.total += *v
        });

        signal.emit(3);
        signal.emit(4);
        assert_eq!(owner.borrow().total, 7);
    }

    #[test]
    fn test_bind_skips_dead_owner() {
        let owner = Rc::new(RefCell::new(0u32));
        let weak = Rc::downgrade(&owner);
        let signal = Signal::<()>::new();
        let _sub = Subscription::bind(&weak, &signal, |count: &mut u32, _| *count += 1);

        drop(owner);
        signal.emit(());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "owner was borrowed")]
    fn test_bind_to_borrowed_owner_panics() {
        let owner = Rc::new(RefCell::new(0u32));
        let signal = Signal::<()>::new();
        let _sub = Subscription::bind(&Rc::downgrade(&owner), &signal, |count: &mut u32, _| {
            *count += 1
        });

        let _held = owner.borrow();
        signal.emit(());
    }

    #[test]
    fn test_subscription_outlives_signal() {
        let signal = Signal::<()>::new();
        let sub = signal.connect(|_| {});
        drop(signal);
        drop(sub);
    }
}
