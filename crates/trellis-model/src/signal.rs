//! Per-instance signal hub.
//!
//! Every model instance owns a [`SignalHub`]: an ordered subscriber table
//! keyed by event name. The declared-event set is fixed at instance
//! construction from the schema (built-in events, one `<prop>-changed` per
//! property, plus custom declarations); subscribing to or emitting a name
//! outside that set is a configuration error and fails fast.
//!
//! # Emission semantics
//!
//! - Handlers run synchronously, on the caller's thread, in subscription
//!   order.
//! - Emission snapshots the subscriber list first: unsubscribing during an
//!   emit pass does not affect handlers already scheduled for that pass,
//!   and a handler subscribed mid-pass first runs on the next emit.
//! - Re-entrant emission (a handler triggering another emit on the same or
//!   a different hub) is supported; the hub lock is never held while a
//!   handler runs.
//! - Handlers are fallible. Emission stops at the first handler error and
//!   propagates it to the emitter — this is how a failing recompute deep in
//!   a dependency cascade reaches the caller of the triggering `set`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ModelError, SignalError};
use crate::logging::targets;
use crate::value::Value;

/// A subscribed handler: positional arguments in, unit or error out.
pub(crate) type Handler = Arc<dyn Fn(&[Value]) -> Result<(), ModelError> + Send + Sync>;

/// A stable identifier for one subscription, used to unsubscribe.
///
/// IDs are unique per hub and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Slot {
    id: SubscriptionId,
    handler: Handler,
}

struct Event {
    arity: usize,
    // Insertion order is the delivery order.
    slots: Vec<Slot>,
}

struct HubState {
    next_id: u64,
    events: HashMap<String, Event>,
    // Which event each live subscription belongs to.
    index: HashMap<SubscriptionId, String>,
}

/// The named-event registry of a single model instance.
pub(crate) struct SignalHub {
    state: Mutex<HubState>,
}

impl SignalHub {
    /// Create a hub with the given declared events and their arities.
    pub(crate) fn new(declared: impl IntoIterator<Item = (String, usize)>) -> Self {
        let events = declared
            .into_iter()
            .map(|(name, arity)| {
                (
                    name,
                    Event {
                        arity,
                        slots: Vec::new(),
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(HubState {
                next_id: 0,
                events,
                index: HashMap::new(),
            }),
        }
    }

    /// Subscribe a handler to a declared event.
    pub(crate) fn subscribe(&self, name: &str, handler: Handler) -> Result<SubscriptionId, SignalError> {
        let mut state = self.state.lock();
        if !state.events.contains_key(name) {
            return Err(SignalError::UnknownSignal {
                name: name.to_string(),
            });
        }
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.index.insert(id, name.to_string());
        state
            .events
            .get_mut(name)
            .expect("event presence checked above")
            .slots
            .push(Slot { id, handler });
        tracing::trace!(target: targets::SIGNAL, signal = name, ?id, "subscribed");
        Ok(id)
    }

    /// Remove a subscription. Takes effect for subsequent emits only; an
    /// emit pass already in progress still delivers to its snapshot.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SignalError> {
        let mut state = self.state.lock();
        let name = state
            .index
            .remove(&id)
            .ok_or(SignalError::StaleSubscription)?;
        if let Some(event) = state.events.get_mut(&name) {
            event.slots.retain(|slot| slot.id != id);
        }
        tracing::trace!(target: targets::SIGNAL, signal = name.as_str(), ?id, "unsubscribed");
        Ok(())
    }

    /// Emit a declared event, invoking all currently-subscribed handlers
    /// in subscription order.
    pub(crate) fn emit(&self, name: &str, args: &[Value]) -> Result<(), ModelError> {
        let snapshot: Vec<Handler> = {
            let state = self.state.lock();
            let event = state
                .events
                .get(name)
                .ok_or_else(|| SignalError::UnknownSignal {
                    name: name.to_string(),
                })?;
            if event.arity != args.len() {
                return Err(ModelError::Signal(SignalError::ArityMismatch {
                    signal: name.to_string(),
                    expected: event.arity,
                    got: args.len(),
                }));
            }
            event.slots.iter().map(|slot| slot.handler.clone()).collect()
        };

        tracing::trace!(
            target: targets::SIGNAL,
            signal = name,
            subscriber_count = snapshot.len(),
            "emitting signal"
        );

        for handler in snapshot {
            handler(args)?;
        }
        Ok(())
    }

    /// Number of live subscriptions across all events.
    pub(crate) fn subscription_count(&self) -> usize {
        self.state.lock().index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn hub() -> SignalHub {
        SignalHub::new([("ping".to_string(), 1), ("pong".to_string(), 0)])
    }

    #[test]
    fn test_subscribe_emit_in_order() {
        let hub = hub();
        let received = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let received = received.clone();
            hub.subscribe(
                "ping",
                Arc::new(move |args| {
                    received.lock().push((tag, args[0].clone()));
                    Ok(())
                }),
            )
            .unwrap();
        }

        hub.emit("ping", &[Value::from(7i64)]).unwrap();

        let got = received.lock();
        assert_eq!(
            *got,
            vec![
                ("a", Value::from(7i64)),
                ("b", Value::from(7i64)),
                ("c", Value::from(7i64)),
            ]
        );
    }

    #[test]
    fn test_unknown_signal_fails_fast() {
        let hub = hub();
        let err = hub.subscribe("nope", Arc::new(|_| Ok(()))).unwrap_err();
        assert!(matches!(err, SignalError::UnknownSignal { .. }));

        let err = hub.emit("nope", &[]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Signal(SignalError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn test_arity_mismatch_fails_fast() {
        let hub = hub();
        let err = hub.emit("ping", &[]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Signal(SignalError::ArityMismatch {
                expected: 1,
                got: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = hub();
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        let id = hub
            .subscribe(
                "pong",
                Arc::new(move |_| {
                    *count_clone.lock() += 1;
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(hub.subscription_count(), 1);
        hub.emit("pong", &[]).unwrap();
        hub.unsubscribe(id).unwrap();
        assert_eq!(hub.subscription_count(), 0);
        hub.emit("pong", &[]).unwrap();

        assert_eq!(*count.lock(), 1);
        assert!(matches!(
            hub.unsubscribe(id),
            Err(SignalError::StaleSubscription)
        ));
    }

    #[test]
    fn test_unsubscribe_during_emit_keeps_snapshot() {
        let hub = Arc::new(hub());
        let second_ran = Arc::new(Mutex::new(false));

        // First handler removes the second mid-pass; the second must still
        // run this pass because it was scheduled at snapshot time.
        let removed_id = Arc::new(Mutex::new(None::<SubscriptionId>));

        let hub_clone = hub.clone();
        let removed_clone = removed_id.clone();
        hub.subscribe(
            "pong",
            Arc::new(move |_| {
                if let Some(id) = removed_clone.lock().take() {
                    hub_clone.unsubscribe(id).unwrap();
                }
                Ok(())
            }),
        )
        .unwrap();

        let second_clone = second_ran.clone();
        let id = hub
            .subscribe(
                "pong",
                Arc::new(move |_| {
                    *second_clone.lock() = true;
                    Ok(())
                }),
            )
            .unwrap();
        *removed_id.lock() = Some(id);

        hub.emit("pong", &[]).unwrap();
        assert!(*second_ran.lock());

        // Removed for subsequent passes.
        *second_ran.lock() = false;
        hub.emit("pong", &[]).unwrap();
        assert!(!*second_ran.lock());
    }

    #[test]
    fn test_reentrant_emit() {
        let hub = Arc::new(SignalHub::new([
            ("outer".to_string(), 0),
            ("inner".to_string(), 0),
        ]));
        let order = Arc::new(Mutex::new(Vec::new()));

        let hub_clone = hub.clone();
        let order_clone = order.clone();
        hub.subscribe(
            "outer",
            Arc::new(move |_| {
                order_clone.lock().push("outer");
                hub_clone.emit("inner", &[])
            }),
        )
        .unwrap();

        let order_clone = order.clone();
        hub.subscribe(
            "inner",
            Arc::new(move |_| {
                order_clone.lock().push("inner");
                Ok(())
            }),
        )
        .unwrap();

        hub.emit("outer", &[]).unwrap();
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_handler_error_stops_pass() {
        let hub = hub();
        let later_ran = Arc::new(Mutex::new(false));

        hub.subscribe("pong", Arc::new(|_| Err(ModelError::generator("boom"))))
            .unwrap();
        let later_clone = later_ran.clone();
        hub.subscribe(
            "pong",
            Arc::new(move |_| {
                *later_clone.lock() = true;
                Ok(())
            }),
        )
        .unwrap();

        let err = hub.emit("pong", &[]).unwrap_err();
        assert!(matches!(err, ModelError::Generator { .. }));
        assert!(!*later_ran.lock());
    }
}
