//! Input handling: pressed/held/released bookkeeping and per-tick processing.

use crate::action::ActivationPolicy;
use crate::handle::ActionSpecHandle;
use crate::replication::{NetMessage, Recipient};
use crate::tag::Tag;

use super::{ActionSystem, InputHandler};

impl ActionSystem {
    fn specs_bound_to(&self, input: &Tag) -> Vec<ActionSpecHandle> {
        self.specs
            .iter()
            .filter(|spec| spec.dynamic_tags.has_tag_exact(input))
            .map(|spec| spec.handle)
            .collect()
    }

    /// Marks every spec bound to `input` as pressed and held.
    pub fn input_pressed(&mut self, input: &Tag) {
        for handle in self.specs_bound_to(input) {
            if !self.input_pressed.contains(&handle) {
                self.input_pressed.push(handle);
            }
            self.input_held.insert(handle);
        }
    }

    /// Marks every spec bound to `input` as released.
    pub fn input_released(&mut self, input: &Tag) {
        for handle in self.specs_bound_to(input) {
            if !self.input_released.contains(&handle) {
                self.input_released.push(handle);
            }
            self.input_held.remove(&handle);
        }
    }

    /// Consumes this tick's input. Runs once per tick, before timers.
    pub fn process_input(&mut self) {
        let held: Vec<_> = self.input_held.iter().copied().collect();
        for handle in held {
            if self.activation_policy_of(handle) == Some(ActivationPolicy::WhileInputActive)
                && !self.is_spec_running(handle)
            {
                self.activate_from_input(handle);
            }
        }

        for handle in std::mem::take(&mut self.input_pressed) {
            if self.is_spec_running(handle) {
                self.dispatch_input(handle, true);
            } else if self.activation_policy_of(handle) == Some(ActivationPolicy::OnInputTriggered) {
                self.activate_from_input(handle);
            }
        }

        for handle in std::mem::take(&mut self.input_released) {
            if self.is_spec_running(handle) {
                self.dispatch_input(handle, false);
            }
        }
    }

    fn activate_from_input(&mut self, handle: ActionSpecHandle) {
        if let Err(err) = self.try_activate(handle) {
            tracing::debug!(target: "action::registry", spec = %handle, error = %err, "input activation failed");
        }
    }

    /// Forwards an input edge of a running spec to its tasks (and, when
    /// locally controlled, to the server).
    fn dispatch_input(&mut self, handle: ActionSpecHandle, pressed: bool) {
        let Some(input) = self.find_spec(handle).map(|spec| spec.input_tag.clone()) else {
            return;
        };
        if self.role().is_locally_controlled() {
            let entity = self.entity();
            self.send(
                Recipient::Server,
                NetMessage::InputEvent {
                    entity,
                    spec: handle,
                    pressed,
                },
            );
        }
        self.route_input(&input, pressed);
    }

    fn route_input(&mut self, input: &Tag, pressed: bool) {
        for handler in self.input_bus.handlers(input) {
            match handler {
                InputHandler::Pressed(task) if pressed => self.on_task_input(task, true),
                InputHandler::Released(task) if !pressed => self.on_task_input(task, false),
                _ => {}
            }
        }
    }

    /// An input edge forwarded by the owning client.
    pub(crate) fn on_remote_input(&mut self, handle: ActionSpecHandle, pressed: bool) {
        let Some(input) = self.find_spec(handle).map(|spec| spec.input_tag.clone()) else {
            tracing::warn!(target: "action::registry", spec = %handle, "input for unknown spec");
            return;
        };
        self.route_input(&input, pressed);
    }
}
