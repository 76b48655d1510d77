use crate::event::{EventPayload, PayloadValue, keys};
use crate::handle::{InstanceId, TaskId};
use crate::system::{ActionSystem, GameplayHandler, InputHandler};
use crate::tag::{Tag, names};
use crate::timer::TimerEvent;

use super::{Task, TaskSpec, TaskState};

impl ActionSystem {
    /// Starts a task owned by `owner`. Returns `None` unless the owner is executing.
    pub(crate) fn start_task(&mut self, owner: InstanceId, spec: TaskSpec) -> Option<TaskId> {
        let instance = self.instances.get(&owner)?;
        if !instance.is_executing() {
            tracing::trace!(target: "action::phase", task = spec.name(), "owner not executing; task not started");
            return None;
        }
        let spec_input = self
            .find_spec(instance.spec)
            .map(|s| s.input_tag.clone())
            .unwrap_or_default();

        let id = self.allocate_task_id();
        let mut task = Task::new(id, owner, spec);
        task.state = TaskState::Executing;
        task.started_at = self.now;

        if let TaskSpec::PlayTimeline { notifies, .. } = &mut task.spec {
            notifies.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        match &task.spec {
            TaskSpec::WaitDelay(seconds) | TaskSpec::WaitPhaseDelay(seconds) => {
                let fire_at = self.now + seconds.max(0.0);
                task.timer = Some(self.timers.schedule(fire_at, TimerEvent::Task(id)));
            }
            TaskSpec::WaitGameplayEvent(tag) => {
                task.subscription = Some(
                    self.gameplay_bus
                        .subscribe(tag.clone(), GameplayHandler::Task(id)),
                );
            }
            TaskSpec::WaitInputPress(tag) => {
                let tag = tag.clone().unwrap_or_else(|| spec_input.clone());
                task.subscription = Some(self.input_bus.subscribe(tag, InputHandler::Pressed(id)));
            }
            TaskSpec::WaitInputRelease(tag) => {
                let tag = tag.clone().unwrap_or_else(|| spec_input.clone());
                task.subscription = Some(self.input_bus.subscribe(tag, InputHandler::Released(id)));
            }
            TaskSpec::PlayTimeline { .. } => {
                if let Some(offset) = task.next_timeline_checkpoint() {
                    let fire_at = self.now + offset.max(0.0);
                    task.timer = Some(self.timers.schedule(fire_at, TimerEvent::Task(id)));
                }
            }
            TaskSpec::External { .. } => {}
        }

        tracing::debug!(
            target: "action::phase",
            task = task.spec.name(),
            id = id.0,
            owner = owner.0,
            "task started"
        );
        self.tasks.insert(id, task);
        if let Some(instance) = self.instances.get_mut(&owner) {
            instance.tasks.push(id);
        }
        Some(id)
    }

    /// Stops a task without posting anything. Idempotent.
    pub(crate) fn end_task(&mut self, id: TaskId, cancelled: bool) {
        let Some(mut task) = self.tasks.remove(&id) else {
            return;
        };
        task.state = TaskState::Ending;
        if let Some(timer) = task.timer.take() {
            self.timers.cancel(timer);
        }
        task.subscription = None;
        task.state = TaskState::Ended;
        if let Some(instance) = self.instances.get_mut(&task.owner) {
            instance.tasks.retain(|t| *t != id);
        }
        tracing::trace!(
            target: "action::phase",
            task = task.spec.name(),
            id = id.0,
            cancelled,
            "task ended"
        );
    }

    /// Ends a task and posts its completion event to the owner.
    fn finish_task(&mut self, id: TaskId, event: &str, payload: EventPayload) {
        let Some(owner) = self.tasks.get(&id).map(|t| t.owner) else {
            return;
        };
        self.end_task(id, false);
        self.post_task_event(owner, &names::tag(event), &payload);
    }

    /// Cancels a running task, e.g. an external collaborator task.
    pub fn cancel_task(&mut self, id: TaskId) {
        self.end_task(id, true);
    }

    /// Completes an external task: ends it and posts `event` to its owner.
    pub fn complete_task(&mut self, id: TaskId, event: &Tag, payload: EventPayload) {
        let Some(owner) = self.tasks.get(&id).map(|t| t.owner) else {
            return;
        };
        self.end_task(id, false);
        self.post_task_event(owner, event, &payload);
    }

    /// Repoints a task at a new owning instance.
    pub(crate) fn rehome_task(&mut self, id: TaskId, new_owner: InstanceId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            tracing::trace!(
                target: "action::prediction",
                task = task.spec.name(),
                from = task.owner.0,
                to = new_owner.0,
                "task rehomed"
            );
            task.owner = new_owner;
        }
    }

    // ========================================================================
    // Wakeups
    // ========================================================================

    pub(crate) fn on_task_timer(&mut self, id: TaskId) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        task.timer = None;
        let event = match task.spec {
            TaskSpec::WaitDelay(_) => names::TASK_DELAY_FINISHED,
            TaskSpec::WaitPhaseDelay(_) => names::TASK_PHASE_DELAY_FINISHED,
            TaskSpec::PlayTimeline { .. } => {
                self.advance_timeline(id);
                return;
            }
            _ => return,
        };
        self.finish_task(id, event, EventPayload::new());
    }

    fn advance_timeline(&mut self, id: TaskId) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        let TaskSpec::PlayTimeline { duration, notifies } = &task.spec else {
            return;
        };
        let next = notifies
            .get(task.next_notify)
            .filter(|notify| notify.time <= *duration)
            .map(|notify| notify.name.clone());
        let Some(name) = next else {
            self.finish_task(id, names::TASK_MONTAGE_ENDED, EventPayload::new());
            return;
        };

        task.next_notify += 1;
        let owner = task.owner;
        if let Some(offset) = task.next_timeline_checkpoint() {
            let fire_at = task.started_at + offset;
            task.timer = Some(self.timers.schedule(fire_at, TimerEvent::Task(id)));
        }
        let payload = EventPayload::new().with(keys::NOTIFY_NAME, PayloadValue::Text(name));
        self.post_task_event(owner, &names::tag(names::TASK_MONTAGE_NOTIFY_BEGIN), &payload);
    }

    pub(crate) fn on_task_gameplay_event(&mut self, id: TaskId, payload: &EventPayload) {
        if self.tasks.get(&id).is_some_and(Task::is_running) {
            self.finish_task(id, names::TASK_GAMEPLAY_EVENT_RECEIVED, payload.clone());
        }
    }

    pub(crate) fn on_task_input(&mut self, id: TaskId, pressed: bool) {
        if !self.tasks.get(&id).is_some_and(Task::is_running) {
            return;
        }
        let event = if pressed {
            names::TASK_INPUT_PRESSED
        } else {
            names::TASK_INPUT_RELEASED
        };
        self.finish_task(id, event, EventPayload::new());
    }
}

#[cfg(test)]
mod tests {
    use crate::action::ActionTemplate;
    use crate::phase::{BehaviorKind, PhaseBehavior, PhaseCondition, PhaseData, TransitionKind};
    use crate::system::Notification;
    use crate::tag::Tag;
    use crate::task::{TaskSpec, TimelineNotify};
    use crate::test_utils::authority_world;

    fn timeline_template() -> ActionTemplate {
        ActionTemplate::new("Swing")
            .phase_data(
                PhaseData::new("Phase.Action.Windup")
                    .on_enter(PhaseBehavior::all(BehaviorKind::RunTask(TaskSpec::PlayTimeline {
                        duration: 1.0,
                        notifies: vec![
                            TimelineNotify {
                                name: "Recover".into(),
                                time: 0.8,
                            },
                            TimelineNotify {
                                name: "Hit".into(),
                                time: 0.3,
                            },
                        ],
                    })))
                    .transition(
                        TransitionKind::OnTaskEvent {
                            tag: Tag::new("Task.Event.Montage.NotifyBegin"),
                            conditions: vec![PhaseCondition::NotifyNameEquals("Hit".into())],
                        },
                        "Phase.Action.Strike",
                    ),
            )
            .phase_data(
                PhaseData::new("Phase.Action.Strike")
                    .transition(TransitionKind::OnDurationEnd(0.5), "Phase.Action.End"),
            )
            .phase_data(PhaseData::new("Phase.Action.End"))
    }

    #[test]
    fn timeline_notifies_drive_conditional_transitions() {
        let (mut world, entity, spec) = authority_world(timeline_template());
        world.system_mut(entity).unwrap().try_activate(spec).unwrap();

        world.advance(0.31);
        let phases: Vec<_> = world
            .system_mut(entity)
            .unwrap()
            .drain_notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::PhaseEntered { phase, .. } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![Tag::new("Phase.Action.Windup"), Tag::new("Phase.Action.Strike")]
        );

        // The timeline keeps running across the phase change and ends on its own.
        world.advance(1.0);
        let system = world.system(entity).unwrap();
        assert_eq!(system.task_count(), 0);
        assert_eq!(system.active_actions().count(), 0);
    }

    #[test]
    fn movement_interrupts_an_interruptible_timeline() {
        let template = ActionTemplate::new("Channel")
            .phase_data(
                PhaseData::new("Phase.Action.Channel")
                    .interruptible_by_movement()
                    .on_enter(PhaseBehavior::all(BehaviorKind::RunTask(TaskSpec::PlayTimeline {
                        duration: 5.0,
                        notifies: Vec::new(),
                    })))
                    .transition(
                        TransitionKind::OnTaskEvent {
                            tag: Tag::new("Task.Event.Montage.Interrupted"),
                            conditions: Vec::new(),
                        },
                        "Phase.Action.End",
                    ),
            )
            .phase_data(PhaseData::new("Phase.Action.End"));
        let (mut world, entity, spec) = authority_world(template);
        world.system_mut(entity).unwrap().try_activate(spec).unwrap();
        world.advance(0.5);

        world.set_moving(entity, true).unwrap();
        let system = world.system(entity).unwrap();
        assert_eq!(system.active_actions().count(), 0);
        assert_eq!(system.task_count(), 0);
    }
}
