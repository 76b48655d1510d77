use std::mem;
use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::config::ActionConfig;
use crate::event::{EventBus, EventPayload, Subscription};
use crate::handle::{ActionSpecHandle, ActiveActionHandle, ActorInfo, InstanceId, PredictionKey, TaskId};
use crate::phase::{PhaseCondition, PhaseInfo};
use crate::tag::{Tag, TagStackContainer};

use super::ActionTemplate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, strum::Display, strum::AsRefStr)]
pub enum Lifecycle {
    #[default]
    Inactive,
    Executing,
    Ending,
    Ended,
}

/// Routing targets on an instance's task-event bus.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TaskBusHandler {
    /// Evaluate the transition rules installed at phase entry `counter`.
    PhaseTransition { counter: u32 },
    /// Copy one payload value into the instance payload.
    ResultStore {
        source_key: String,
        destination_key: String,
    },
    /// Surface the event to the host as a notification.
    Observe,
}

/// A transition rule installed for the current phase.
#[derive(Debug)]
pub(crate) struct ActiveRule {
    pub event_tag: Tag,
    pub next_phase: Tag,
    pub conditions: Vec<PhaseCondition>,
    pub _subscription: Subscription,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u32);

/// Handle to something spawned by a `SpawnResource` behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnedResource {
    pub id: ResourceId,
    pub kind: String,
    pub destroy_with_action: bool,
}

/// Runtime state of one action execution (predicted, authoritative, or
/// observed).
///
/// Everything this instance acquires (tags, tasks, view modes, spawned
/// resources) is recorded here so it can be released by this instance alone,
/// or moved wholesale to an authoritative counterpart during rehome.
#[derive(Debug)]
pub struct ActionInstance {
    pub(crate) id: InstanceId,
    pub(crate) template: Arc<ActionTemplate>,
    pub(crate) spec: ActionSpecHandle,
    pub(crate) active: ActiveActionHandle,
    pub(crate) key: PredictionKey,
    pub(crate) actor: ActorInfo,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) phase: Option<Tag>,
    pub(crate) phase_counter: u32,
    pub(crate) transitioning: bool,
    pub(crate) pending_next_phase: Option<Tag>,
    pub(crate) transitions_this_step: u32,
    pub(crate) active_rules: Vec<ActiveRule>,
    pub(crate) movement_watch: Option<Subscription>,
    pub(crate) task_bus: EventBus<TaskBusHandler>,
    pub(crate) result_stores: Vec<Subscription>,
    pub(crate) tasks: Vec<TaskId>,
    pub(crate) granted_tags: TagStackContainer,
    pub(crate) view_modes: ArrayVec<String, { ActionConfig::MAX_VIEW_MODES }>,
    pub(crate) spawned: Vec<SpawnedResource>,
    pub(crate) payload: EventPayload,
    pub(crate) being_rehomed: bool,
    pub(crate) cancelled: bool,
}

impl ActionInstance {
    pub(crate) fn new(
        id: InstanceId,
        template: Arc<ActionTemplate>,
        spec: ActionSpecHandle,
        actor: ActorInfo,
    ) -> Self {
        Self {
            id,
            template,
            spec,
            active: ActiveActionHandle::INVALID,
            key: PredictionKey::NONE,
            actor,
            lifecycle: Lifecycle::Inactive,
            phase: None,
            phase_counter: 0,
            transitioning: false,
            pending_next_phase: None,
            transitions_this_step: 0,
            active_rules: Vec::new(),
            movement_watch: None,
            task_bus: EventBus::new(),
            result_stores: Vec::new(),
            tasks: Vec::new(),
            granted_tags: TagStackContainer::new(),
            view_modes: ArrayVec::new(),
            spawned: Vec::new(),
            payload: EventPayload::new(),
            being_rehomed: false,
            cancelled: false,
        }
    }

    /// Readies a (possibly reused) instance for a new execution.
    pub(crate) fn prepare(&mut self, active: ActiveActionHandle, key: PredictionKey) {
        self.active = active;
        self.key = key;
        self.lifecycle = Lifecycle::Executing;
        self.phase = None;
        self.transitioning = false;
        self.pending_next_phase = None;
        self.transitions_this_step = 0;
        self.being_rehomed = false;
        self.cancelled = false;
    }

    /// Moves transient runtime state out of `predicted`.
    ///
    /// The granted-tag ledger is swapped rather than merged; the caller is
    /// responsible for repointing the moved tasks.
    pub(crate) fn transfer_state_from(&mut self, predicted: &mut ActionInstance) {
        self.tasks = mem::take(&mut predicted.tasks);
        self.view_modes = mem::take(&mut predicted.view_modes);
        mem::swap(&mut self.granted_tags, &mut predicted.granted_tags);
        self.spawned = mem::take(&mut predicted.spawned);
        self.payload = mem::take(&mut predicted.payload);
        self.phase = predicted.phase.clone();
        self.phase_counter = predicted.phase_counter;
        self.lifecycle = Lifecycle::Executing;
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn template(&self) -> &Arc<ActionTemplate> {
        &self.template
    }

    pub fn spec(&self) -> ActionSpecHandle {
        self.spec
    }

    pub fn active(&self) -> ActiveActionHandle {
        self.active
    }

    pub fn key(&self) -> PredictionKey {
        self.key
    }

    pub fn actor(&self) -> ActorInfo {
        self.actor
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_executing(&self) -> bool {
        self.lifecycle == Lifecycle::Executing
    }

    pub fn phase(&self) -> Option<&Tag> {
        self.phase.as_ref()
    }

    pub fn phase_counter(&self) -> u32 {
        self.phase_counter
    }

    pub fn phase_info(&self) -> PhaseInfo {
        PhaseInfo {
            phase: self.phase.clone(),
            counter: self.phase_counter,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn granted_tags(&self) -> &TagStackContainer {
        &self.granted_tags
    }

    pub fn view_modes(&self) -> &[String] {
        &self.view_modes
    }

    pub fn spawned(&self) -> &[SpawnedResource] {
        &self.spawned
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn is_being_rehomed(&self) -> bool {
        self.being_rehomed
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn installed_rule_count(&self) -> usize {
        self.active_rules.len()
    }
}
