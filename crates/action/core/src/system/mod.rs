//! Per-entity action system.
//!
//! [`ActionSystem`] owns everything one entity needs to run actions: granted
//! specs, active executions and their runtime instances, attributes, tags,
//! active effects, cooldowns, tasks, timers, and the gameplay event bus.
//!
//! The logic is split by concern across submodules that all extend the same
//! type:
//!
//! - [`registry`]: grant, revoke, cancel, end bookkeeping
//! - [`activation`]: precondition checks and the authoritative execute path
//! - [`prediction`]: client prediction keys, confirmation, rehome
//! - [`effects`]: the effect application pipeline and cooldown adjustments
//! - [`input`]: pressed/held/released input processing
//! - [`events`]: gameplay and task event routing
//! - [`mirror`]: client application of replicated state
//! - `crate::phase::machine`: phase entry, exit, transitions, termination
//! - `crate::task::runner`: task start, completion, rehome
//!
//! # Design Principles
//!
//! - **Ids, not references**: Instances and tasks are looked up by id every
//!   time; a stale id is a silent no-op
//! - **Collect, then dispatch**: Bus handlers are collected before any of them
//!   runs, so handlers may freely mutate the system
//! - **Outbox for everything external**: Cross-entity effects, broadcasts, and
//!   network messages are queued as [`WorldRequest`]s and drained by the world

mod activation;
mod effects;
mod events;
mod input;
mod mirror;
mod notify;
mod prediction;
mod registry;

pub use notify::Notification;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::action::{ActionInstance, ActionSpec, ActionTemplate, ActiveAction};
use crate::attribute::AttributeStore;
use crate::config::ActionConfig;
use crate::content::ContentLibrary;
use crate::cooldown::CooldownTracker;
use crate::effect::{ActiveEffectState, ActiveEffectsContainer, EffectSpec};
use crate::event::{EventBus, EventPayload};
use crate::handle::{
    ActionSpecHandle, ActiveActionHandle, ActiveEffectHandle, ActorInfo, EntityHandle, EntityId,
    InstanceId, PredictionKey, TaskId,
};
use crate::replication::{NetMessage, Outgoing, Recipient};
use crate::rng::PcgRng;
use crate::tag::{OwnedTags, Tag, TagRelationshipMapping, TagStackChange};
use crate::task::Task;
use crate::timer::{TimerEvent, TimerQueue};

/// Network role of one entity in one world.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NetRole {
    /// Server copy; the only role that mutates replicated state.
    #[default]
    Authority,
    /// Client copy of the locally controlled entity; predicts.
    AutonomousProxy,
    /// Client copy of someone else's entity; observes only.
    SimulatedProxy,
}

impl NetRole {
    pub fn is_authority(self) -> bool {
        self == Self::Authority
    }

    pub fn is_locally_controlled(self) -> bool {
        self == Self::AutonomousProxy
    }
}

/// Routing targets on the entity-wide gameplay bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GameplayHandler {
    /// Transition rule installed at phase entry `counter`.
    PhaseTransition { instance: InstanceId, counter: u32 },
    MovementInterrupt { instance: InstanceId, counter: u32 },
    Task(TaskId),
    /// Surface the event to the host as a notification.
    Observe,
}

/// Routing targets on the input bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InputHandler {
    Pressed(TaskId),
    Released(TaskId),
}

/// Work an action system hands back to its world.
#[derive(Clone, Debug)]
pub(crate) enum WorldRequest {
    ApplyEffect { target: EntityId, spec: EffectSpec },
    /// `None` fans out to every registered entity.
    GameplayEvent {
        target: Option<EntityId>,
        tag: Tag,
        payload: EventPayload,
    },
    Send(Outgoing),
}

/// An active action plus the local instance running it, if any.
#[derive(Debug)]
pub(crate) struct ActiveEntry {
    pub action: ActiveAction,
    pub instance: Option<InstanceId>,
}

/// A prediction awaiting server confirmation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingPrediction {
    pub spec: ActionSpecHandle,
    /// `None` for server-only actions, which never run locally first.
    pub instance: Option<InstanceId>,
}

/// One entity's action, effect, and cooldown state.
#[derive(Debug)]
pub struct ActionSystem {
    entity: EntityId,
    handle: EntityHandle,
    role: NetRole,
    pub(crate) config: ActionConfig,
    pub(crate) content: ContentLibrary,
    pub(crate) mapping: Arc<TagRelationshipMapping>,
    pub(crate) now: f32,
    pub(crate) rng: PcgRng,

    pub(crate) attributes: AttributeStore,
    pub(crate) tags: OwnedTags,

    pub(crate) specs: Vec<ActionSpec>,
    pub(crate) active: BTreeMap<ActiveActionHandle, ActiveEntry>,
    pub(crate) instances: BTreeMap<InstanceId, ActionInstance>,
    pub(crate) owner_instances: BTreeMap<ActionSpecHandle, InstanceId>,
    next_instance: u32,
    pub(crate) event_triggers: BTreeMap<Tag, Vec<ActionSpecHandle>>,

    next_prediction_key: u32,
    pub(crate) pending_specs: BTreeSet<ActionSpecHandle>,
    pub(crate) pending_predictions: BTreeMap<PredictionKey, PendingPrediction>,

    pub(crate) input_pressed: Vec<ActionSpecHandle>,
    pub(crate) input_held: BTreeSet<ActionSpecHandle>,
    pub(crate) input_released: Vec<ActionSpecHandle>,
    pub(crate) input_bus: EventBus<InputHandler>,

    pub(crate) effects: ActiveEffectsContainer,
    pub(crate) replicated_effects: BTreeMap<ActiveEffectHandle, ActiveEffectState>,
    pub(crate) effect_nonce: u64,
    pub(crate) cooldowns: CooldownTracker,

    pub(crate) gameplay_bus: EventBus<GameplayHandler>,
    pub(crate) timers: TimerQueue,
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    next_task: u32,
    pub(crate) next_resource: u32,
    pub(crate) moving: bool,

    pub(crate) outbox: Vec<WorldRequest>,
    notifications: Vec<Notification>,
}

impl ActionSystem {
    pub fn new(
        entity: EntityId,
        handle: EntityHandle,
        role: NetRole,
        content: ContentLibrary,
        config: ActionConfig,
    ) -> Self {
        Self {
            entity,
            handle,
            role,
            mapping: content.mapping(),
            content,
            config,
            now: 0.0,
            rng: PcgRng,
            attributes: AttributeStore::with_default_sets(),
            tags: OwnedTags::new(),
            specs: Vec::new(),
            active: BTreeMap::new(),
            instances: BTreeMap::new(),
            owner_instances: BTreeMap::new(),
            next_instance: 0,
            event_triggers: BTreeMap::new(),
            next_prediction_key: 0,
            pending_specs: BTreeSet::new(),
            pending_predictions: BTreeMap::new(),
            input_pressed: Vec::new(),
            input_held: BTreeSet::new(),
            input_released: Vec::new(),
            input_bus: EventBus::new(),
            effects: ActiveEffectsContainer::new(),
            replicated_effects: BTreeMap::new(),
            effect_nonce: 0,
            cooldowns: CooldownTracker::new(),
            gameplay_bus: EventBus::new(),
            timers: TimerQueue::new(),
            tasks: BTreeMap::new(),
            next_task: 0,
            next_resource: 0,
            moving: false,
            outbox: Vec::new(),
            notifications: Vec::new(),
        }
    }

    // ========================================================================
    // Identity & clock
    // ========================================================================

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn entity_handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn actor_info(&self) -> ActorInfo {
        ActorInfo::from_owner(self.handle)
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: f32) {
        self.now = now;
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    pub fn content(&self) -> &ContentLibrary {
        &self.content
    }

    pub fn set_tag_relationship_mapping(&mut self, mapping: Arc<TagRelationshipMapping>) {
        self.mapping = mapping;
    }

    pub fn tag_relationship_mapping(&self) -> &TagRelationshipMapping {
        &self.mapping
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn tags(&self) -> &OwnedTags {
        &self.tags
    }

    pub fn specs(&self) -> &[ActionSpec] {
        &self.specs
    }

    pub fn find_spec(&self, handle: ActionSpecHandle) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.handle == handle)
    }

    pub(crate) fn find_spec_mut(&mut self, handle: ActionSpecHandle) -> Option<&mut ActionSpec> {
        self.specs.iter_mut().find(|s| s.handle == handle)
    }

    pub fn find_spec_by_template(&self, template: &str) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.template.as_str() == template)
    }

    pub fn find_spec_by_input(&self, input: &Tag) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.input_tag == *input)
    }

    pub fn active_actions(&self) -> impl Iterator<Item = &ActiveAction> {
        self.active.values().map(|entry| &entry.action)
    }

    pub fn active_action(&self, handle: ActiveActionHandle) -> Option<&ActiveAction> {
        self.active.get(&handle).map(|entry| &entry.action)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ActionInstance> {
        self.instances.values()
    }

    pub fn instance(&self, id: InstanceId) -> Option<&ActionInstance> {
        self.instances.get(&id)
    }

    /// Instance bound to an active handle.
    pub fn instance_for(&self, handle: ActiveActionHandle) -> Option<&ActionInstance> {
        let id = self.active.get(&handle)?.instance?;
        self.instances.get(&id)
    }

    /// Executing instances of a spec, in creation order.
    pub fn executing_instances_of(&self, spec: ActionSpecHandle) -> Vec<InstanceId> {
        self.instances
            .values()
            .filter(|i| i.spec == spec && i.is_executing())
            .map(|i| i.id)
            .collect()
    }

    pub fn effects(&self) -> &ActiveEffectsContainer {
        &self.effects
    }

    /// Effects as mirrored from the authority (non-authoritative peers).
    pub fn replicated_effects(&self) -> impl Iterator<Item = &ActiveEffectState> {
        self.replicated_effects.values()
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn cooldown_time_remaining(&self, tag: &Tag) -> f32 {
        self.cooldowns.time_remaining(tag, self.now)
    }

    pub fn cooldown_duration(&self, tag: &Tag) -> f32 {
        self.cooldowns.duration(tag)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_prediction_pending(&self, spec: ActionSpecHandle) -> bool {
        self.pending_specs.contains(&spec)
    }

    pub fn pending_prediction_count(&self) -> usize {
        self.pending_predictions.len()
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Attribute access for setup code and tests.
    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    // ========================================================================
    // Notifications & outbox
    // ========================================================================

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub(crate) fn take_requests(&mut self) -> Vec<WorldRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn send(&mut self, recipient: Recipient, message: NetMessage) {
        tracing::trace!(
            target: "action::registry",
            entity = %self.entity,
            message = message.kind(),
            "queued message"
        );
        self.outbox
            .push(WorldRequest::Send(Outgoing { recipient, message }));
    }

    // ========================================================================
    // Tags
    // ========================================================================

    /// Adds loose stacks on the owner. Authority only; proxies take their
    /// loose tags from replication.
    pub fn add_tag(&mut self, tag: &Tag, count: i32) {
        if !self.refuse_loose_tag_write(tag) {
            let change = self.tags.add_replicated(tag, count);
            self.notify_tag_change(change);
        }
    }

    pub fn remove_tag(&mut self, tag: &Tag, count: i32) {
        if !self.refuse_loose_tag_write(tag) {
            let change = self.tags.remove_replicated(tag, count);
            self.notify_tag_change(change);
        }
    }

    fn refuse_loose_tag_write(&self, tag: &Tag) -> bool {
        if self.role.is_authority() {
            return false;
        }
        tracing::warn!(
            target: "action::registry",
            entity = %self.entity,
            tag = %tag,
            "loose tags are written by the authority only"
        );
        true
    }

    /// Stacks held by an instance running on this peer; never replicated.
    pub(crate) fn add_local_tag(&mut self, tag: &Tag, count: i32) {
        let change = self.tags.add_local(tag, count);
        self.notify_tag_change(change);
    }

    pub(crate) fn remove_local_tag(&mut self, tag: &Tag, count: i32) {
        let change = self.tags.remove_local(tag, count);
        self.notify_tag_change(change);
    }

    pub(crate) fn notify_tag_change(&mut self, change: Option<TagStackChange>) {
        if let Some(change) = change {
            self.notify(Notification::TagChanged(change));
        }
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.has_tag(tag)
    }

    /// Replicated plus locally granted stacks.
    pub fn tag_count(&self, tag: &Tag) -> i32 {
        self.tags.count(tag)
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub(crate) fn allocate_instance(
        &mut self,
        template: Arc<ActionTemplate>,
        spec: ActionSpecHandle,
    ) -> InstanceId {
        self.next_instance += 1;
        let id = InstanceId(self.next_instance);
        let instance = ActionInstance::new(id, template, spec, self.actor_info());
        self.instances.insert(id, instance);
        id
    }

    pub(crate) fn allocate_task_id(&mut self) -> TaskId {
        self.next_task += 1;
        TaskId(self.next_task)
    }

    pub(crate) fn template_of(&self, spec: &ActionSpec) -> Option<Arc<ActionTemplate>> {
        self.content.action(&spec.template)
    }

    /// Resets the per-step transition budget of every instance.
    pub(crate) fn begin_step(&mut self) {
        for instance in self.instances.values_mut() {
            instance.transitions_this_step = 0;
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn next_timer_at(&self) -> Option<f32> {
        self.timers.peek().map(|(_, at)| at)
    }

    /// Fires the earliest timer due at or before `until`, stamping the clock
    /// at its fire time. Returns whether a timer fired.
    pub(crate) fn fire_next_timer(&mut self, until: f32) -> bool {
        let Some((fire_at, event)) = self.timers.pop_due(until) else {
            return false;
        };
        self.now = fire_at;
        match event {
            TimerEvent::EffectExpired(handle) => self.on_effect_expired(handle),
            TimerEvent::EffectPeriod(handle) => self.on_periodic_tick(handle),
            TimerEvent::Task(task) => self.on_task_timer(task),
        }
        true
    }
}
