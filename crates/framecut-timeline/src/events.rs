//! Typed change notifications for external observers.
//!
//! The renderer, property panels, and job systems subscribe here instead of
//! wiring into framework signals. Events are plain data; observers must not
//! mutate the timeline re-entrantly (single-threaded cooperative model).

use uuid::Uuid;

/// Which aspect of the selection changed. Carried by
/// [`ChangeEvent::SelectionChanged`] so listeners can react selectively;
/// rapid successive changes are accumulated and delivered once per flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionAspect {
    Clips,
    Track,
    Multitrack,
    CurrentTrack,
}

/// A structural or bookkeeping change in the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    ClipInserted {
        track: usize,
        index: usize,
    },
    ClipRemoved {
        track: usize,
    },
    ClipMoved {
        from_track: usize,
        to_track: usize,
        clip: Uuid,
    },
    ClipResized {
        track: usize,
        clip: Uuid,
    },
    /// Attribute change (fade, gain, producer swap) with no structural effect.
    ClipChanged {
        track: usize,
        clip: Uuid,
    },
    TrackAdded {
        index: usize,
    },
    TrackRemoved {
        index: usize,
    },
    TrackMoved {
        from: usize,
        to: usize,
    },
    /// Track flag or name change (lock, mute, hide, composite, rename).
    TrackChanged {
        index: usize,
    },
    DurationChanged {
        duration: i64,
    },
    SelectionChanged {
        aspects: Vec<SelectionAspect>,
    },
    GroupChanged {
        group: Uuid,
    },
    MarkerChanged,
    /// The whole model was replaced (deserialize).
    ModelReloaded,
}

/// Observer interface for timeline changes.
pub trait TimelineObserver {
    fn on_change(&mut self, event: &ChangeEvent);
}

/// Registry of observers, notified in registration order.
#[derive(Default)]
pub struct Observers {
    listeners: Vec<Box<dyn TimelineObserver>>,
}

impl Observers {
    pub fn add(&mut self, observer: Box<dyn TimelineObserver>) {
        self.listeners.push(observer);
    }

    pub fn emit(&mut self, event: &ChangeEvent) {
        for listener in &mut self.listeners {
            listener.on_change(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<ChangeEvent>>>);

    impl TimelineObserver for Recorder {
        fn on_change(&mut self, event: &ChangeEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn test_observers_receive_events() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::default();
        observers.add(Box::new(Recorder(log.clone())));

        observers.emit(&ChangeEvent::MarkerChanged);
        observers.emit(&ChangeEvent::DurationChanged { duration: 42 });

        let events = log.borrow();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ChangeEvent::DurationChanged { duration: 42 });
    }
}
