//! Slot registry: one pre-allocated render target per expected unit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::obs;
use crate::observer::SessionObserver;
use crate::record::ResultRecord;

/// Display state of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    Waiting,
    Rendered { record: ResultRecord },
    Errored { message: String },
}

/// Render target for a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub unit_id: u64,
    #[serde(flatten)]
    pub state: SlotState,
}

impl Slot {
    fn waiting(unit_id: u64) -> Self {
        Slot {
            unit_id,
            state: SlotState::Waiting,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, SlotState::Waiting)
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self.state, SlotState::Rendered { .. })
    }

    /// The record shown in this slot, if rendered.
    pub fn record(&self) -> Option<&ResultRecord> {
        match &self.state {
            SlotState::Rendered { record } => Some(record),
            _ => None,
        }
    }
}

/// What happened to a render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Slot was waiting or errored and now shows the record.
    Rendered,
    /// Slot already showed a record; it now shows the new one.
    Replaced,
    /// No slot exists for the unit id.
    UnknownUnit,
}

impl RenderOutcome {
    pub fn is_applied(self) -> bool {
        !matches!(self, RenderOutcome::UnknownUnit)
    }
}

/// Ordered slot sequence for one session, ids `1..=len`.
pub struct SlotRegistry {
    slots: Vec<Slot>,
    observer: Arc<dyn SessionObserver>,
}

impl SlotRegistry {
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            slots: Vec::new(),
            observer,
        }
    }

    /// Drop every existing slot and create `count` waiting ones.
    pub fn initialize(&mut self, count: u64) {
        self.slots.clear();
        self.slots.extend((1..=count).map(Slot::waiting));
        self.observer.slots_initialized(count);
    }

    /// Show `record` in the slot for `unit_id`.
    ///
    /// An unknown unit id is a protocol violation: it is logged and reported as
    /// a status line, and the caller gets [`RenderOutcome::UnknownUnit`].
    pub fn render(&mut self, unit_id: u64, record: ResultRecord) -> RenderOutcome {
        let Some(slot) = slot_index(unit_id).and_then(|i| self.slots.get_mut(i)) else {
            obs::emit_unknown_unit(unit_id, self.len());
            self.observer.status(&format!(
                "Could not display results for iteration {unit_id}."
            ));
            return RenderOutcome::UnknownUnit;
        };

        let outcome = if slot.is_rendered() {
            RenderOutcome::Replaced
        } else {
            RenderOutcome::Rendered
        };
        self.observer.slot_rendered(unit_id, &record);
        slot.state = SlotState::Rendered { record };
        outcome
    }

    /// Show an error message in the slot for `unit_id`.
    pub fn render_error(&mut self, unit_id: u64, message: &str) -> RenderOutcome {
        let Some(slot) = slot_index(unit_id).and_then(|i| self.slots.get_mut(i)) else {
            obs::emit_unknown_unit(unit_id, self.len());
            return RenderOutcome::UnknownUnit;
        };

        let outcome = if slot.is_waiting() {
            RenderOutcome::Rendered
        } else {
            RenderOutcome::Replaced
        };
        slot.state = SlotState::Errored {
            message: message.to_string(),
        };
        self.observer.slot_errored(unit_id, message);
        outcome
    }

    pub fn get(&self, unit_id: u64) -> Option<&Slot> {
        self.slots.get(slot_index(unit_id)?)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> u64 {
        self.slots.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots currently showing a record.
    pub fn rendered_count(&self) -> u64 {
        self.slots.iter().filter(|s| s.is_rendered()).count() as u64
    }
}

fn slot_index(unit_id: u64) -> Option<usize> {
    usize::try_from(unit_id.checked_sub(1)?).ok()
}

impl std::fmt::Debug for SlotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Observation, RecordingObserver};

    fn record(unit_id: u64, description: &str) -> ResultRecord {
        ResultRecord {
            unit_id,
            payload_url: format!("/static/images/{unit_id}.png"),
            description: description.to_string(),
            revised_prompt: None,
            timestamp: None,
        }
    }

    fn registry() -> (SlotRegistry, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        (SlotRegistry::new(observer.clone()), observer)
    }

    #[test]
    fn test_initialize_creates_waiting_slots_in_order() {
        let (mut slots, observer) = registry();
        slots.initialize(4);

        assert_eq!(slots.len(), 4);
        let ids: Vec<u64> = slots.slots().iter().map(|s| s.unit_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(slots.slots().iter().all(Slot::is_waiting));
        assert_eq!(observer.observations(), vec![Observation::SlotsInitialized(4)]);
    }

    #[test]
    fn test_initialize_replaces_previous_slots() {
        let (mut slots, _observer) = registry();
        slots.initialize(5);
        slots.render(2, record(2, "old"));

        slots.initialize(2);
        assert_eq!(slots.len(), 2);
        assert!(slots.slots().iter().all(Slot::is_waiting));
    }

    #[test]
    fn test_render_then_rerender_last_write_wins() {
        let (mut slots, _observer) = registry();
        slots.initialize(2);

        assert_eq!(slots.render(1, record(1, "first")), RenderOutcome::Rendered);
        assert_eq!(slots.render(1, record(1, "second")), RenderOutcome::Replaced);

        assert_eq!(slots.len(), 2);
        assert_eq!(slots.get(1).unwrap().record().unwrap().description, "second");
        assert_eq!(slots.rendered_count(), 1);
    }

    #[test]
    fn test_unknown_unit_reports_status() {
        let (mut slots, observer) = registry();
        slots.initialize(2);

        assert_eq!(slots.render(3, record(3, "x")), RenderOutcome::UnknownUnit);
        assert_eq!(slots.render(0, record(0, "x")), RenderOutcome::UnknownUnit);
        assert!(slots.slots().iter().all(Slot::is_waiting));
        assert_eq!(
            observer.statuses(),
            vec![
                "Could not display results for iteration 3.".to_string(),
                "Could not display results for iteration 0.".to_string(),
            ]
        );
    }

    #[test]
    fn test_render_error() {
        let (mut slots, observer) = registry();
        slots.initialize(1);

        assert_eq!(slots.render_error(1, "generation failed"), RenderOutcome::Rendered);
        assert_eq!(
            slots.get(1).unwrap().state,
            SlotState::Errored {
                message: "generation failed".to_string()
            }
        );
        assert!(observer
            .observations()
            .contains(&Observation::SlotErrored(1, "generation failed".to_string())));

        // a late record still lands
        assert_eq!(slots.render(1, record(1, "recovered")), RenderOutcome::Rendered);
        assert_eq!(slots.render_error(7, "nope"), RenderOutcome::UnknownUnit);
    }
}
