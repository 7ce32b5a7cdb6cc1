//! Event buffers handed to systems through their context.

use std::any::Any;
use std::fmt;

/// A collaborator passed to every system as `ctx.events`.
///
/// The scheduler never clears it; a system or the caller decides when a
/// frame's events are consumed.
pub trait EventBus: Any {
    /// Discard every buffered event.
    fn clear(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn EventBus {
    pub fn downcast_ref<T: EventBus>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: EventBus>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

/// Append-only list of events of one type.
pub struct EventQueue<E> {
    events: Vec<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E: 'static> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, event: E) {
        self.events.push(event);
    }

    /// Events in the order they were sent.
    pub fn iter(&self) -> impl Iterator<Item = &E> + '_ {
        self.events.iter()
    }

    /// Take every buffered event, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E: 'static> EventBus for EventQueue<E> {
    fn clear(&mut self) {
        self.events.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<E: fmt::Debug> fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.events).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Hit {
        Wall,
        Floor,
    }

    #[test]
    fn send_iter_drain() {
        let mut queue = EventQueue::new();
        queue.send(Hit::Wall);
        queue.send(Hit::Floor);
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.iter().cloned().collect::<Vec<_>>(),
            vec![Hit::Wall, Hit::Floor]
        );
        assert_eq!(queue.drain(), vec![Hit::Wall, Hit::Floor]);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_through_trait_object() {
        let mut queue = EventQueue::new();
        queue.send(Hit::Wall);
        let bus: &mut dyn EventBus = &mut queue;
        bus.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn downcast_to_concrete_queue() {
        let mut boxed: Box<dyn EventBus> = Box::new(EventQueue::<Hit>::new());
        boxed
            .downcast_mut::<EventQueue<Hit>>()
            .unwrap()
            .send(Hit::Floor);
        assert!(boxed.downcast_ref::<EventQueue<u32>>().is_none());
        assert_eq!(boxed.downcast_ref::<EventQueue<Hit>>().unwrap().len(), 1);
    }
}
