mod common;

use action_core::effect::StackingPolicy;
use action_core::task::TaskSpec;
use action_core::{
    ActionConfig, ActionTemplate, Attribute, BehaviorKind, ContentLibrary, EffectTemplate,
    EntityId, EventPayload, ModifierOp, NetRole, Notification, PhaseBehavior, PhaseData,
    ScalableFloat, Tag, TagSet, TransitionKind, World,
};

use common::{PLAYER, PRIMARY, cooldown_effect, with_cooldown};

fn server_with(content: ContentLibrary) -> World {
    let mut world = World::new(content, ActionConfig::default());
    world.spawn(PLAYER, NetRole::Authority).unwrap();
    world
}

fn grant(world: &mut World, template: &str) -> action_core::ActionSpecHandle {
    world
        .system_mut(PLAYER)
        .unwrap()
        .grant(&template.into(), Tag::new(PRIMARY), 1)
        .unwrap()
}

#[test]
fn tags_return_to_baseline_after_every_execution_ends() {
    let shield = Tag::new("State.Buff.Shield");
    let mut template = ActionTemplate::new("Shield")
        .phase_data(
            PhaseData::new("Phase.Action.Raise")
                .on_enter(PhaseBehavior::all(BehaviorKind::AddTags(TagSet::single(shield.clone()))))
                .on_enter(PhaseBehavior::all(BehaviorKind::RunTask(TaskSpec::WaitDelay(3.0))))
                .transition(TransitionKind::OnDurationEnd(0.5), "Phase.Action.Hold"),
        )
        .phase_data(
            PhaseData::new("Phase.Action.Hold")
                .on_enter(PhaseBehavior::all(BehaviorKind::AddTags(TagSet::single(shield.clone()))))
                .transition(TransitionKind::OnDurationEnd(0.5), "Phase.Action.Done"),
        )
        .phase_data(PhaseData::new("Phase.Action.Done"));
    template.identifier_tag = Some(Tag::new("Action.Id.Shield"));
    let mut world = server_with(ContentLibrary::builder().action(template).build());
    let spec = grant(&mut world, "Shield");
    world.system_mut(PLAYER).unwrap().add_tag(&shield, 1);

    // Natural end, cancel in the first phase, cancel in the second phase.
    for cancel_after in [None, Some(0.2), Some(0.7)] {
        world.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();
        match cancel_after {
            Some(dt) => {
                world.advance(dt);
                world.system_mut(PLAYER).unwrap().cancel_spec(spec);
            }
            None => world.advance(2.0),
        }
        let system = world.system(PLAYER).unwrap();
        assert_eq!(system.active_actions().count(), 0);
        assert_eq!(system.tag_count(&shield), 1);
        assert_eq!(system.tag_count(&Tag::new("Action.Id.Shield")), 0);
        assert_eq!(system.task_count(), 0);
    }
}

#[test]
fn ending_twice_is_the_same_as_ending_once() {
    let template = ActionTemplate::new("Hold").phase_data(
        PhaseData::new("Phase.Action.Hold")
            .on_enter(PhaseBehavior::all(BehaviorKind::AddTags(TagSet::from_iter(["State.Holding"]))))
            .transition(TransitionKind::Manual, "Phase.Action.Done"),
    );
    let mut world = server_with(ContentLibrary::builder().action(template).build());
    let spec = grant(&mut world, "Hold");
    let system = world.system_mut(PLAYER).unwrap();
    system.try_activate(spec).unwrap();
    let active = system.active_actions().next().unwrap().handle;
    system.drain_notifications();

    system.end_active(active);
    system.end_active(active);
    system.cancel_active(active);

    let ended = system
        .drain_notifications()
        .into_iter()
        .filter(|n| matches!(n, Notification::ActionEnded { .. }))
        .count();
    assert_eq!(ended, 1);
    assert_eq!(system.find_spec(spec).unwrap().activation_count, 0);
    assert_eq!(system.tag_count(&Tag::new("State.Holding")), 0);
    world.flush();
    let notices = world
        .take_outgoing()
        .into_iter()
        .filter(|out| matches!(out.message, action_core::NetMessage::NotifyEnded { .. }))
        .count();
    assert_eq!(notices, 1);
}

#[test]
fn terminal_phase_does_not_depend_on_event_order() {
    let template = ActionTemplate::new("Combo")
        .phase_data(PhaseData::new("Phase.Action.A").transition(
            TransitionKind::OnGameplayEvent(Tag::new("Event.Combo.First")),
            "Phase.Action.B",
        ))
        .phase_data(PhaseData::new("Phase.Action.B").transition(
            TransitionKind::OnGameplayEvent(Tag::new("Event.Combo.Second")),
            "Phase.Action.C",
        ))
        .phase_data(PhaseData::new("Phase.Action.C").transition(TransitionKind::Manual, "Phase.Action.D"));
    let content = ContentLibrary::builder().action(template).build();

    let run = |events: &[&str]| {
        let mut world = server_with(content.clone());
        let spec = grant(&mut world, "Combo");
        world.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();
        for event in events {
            world.send_gameplay_event(Some(PLAYER), &Tag::new(*event), &EventPayload::new());
        }
        let system = world.system(PLAYER).unwrap();
        let active = system.active_actions().next().unwrap().handle;
        system.instance_for(active).unwrap().phase().cloned()
    };

    let ordered = run(&["Event.Combo.First", "Event.Combo.Second"]);
    let shuffled = run(&[
        "Event.Combo.Second",
        "Event.Combo.First",
        "Event.Combo.First",
        "Event.Combo.Second",
        "Event.Combo.Second",
    ]);
    assert_eq!(ordered, Some(Tag::new("Phase.Action.C")));
    assert_eq!(shuffled, ordered);
}

#[test]
fn cooldown_remaining_never_increases_and_hits_zero_at_end() {
    let template = with_cooldown(
        ActionTemplate::new("Primary").phase_data(PhaseData::new("Phase.Action.Fire")),
        "Cooldown.Primary",
        2.0,
    );
    let content = ContentLibrary::builder()
        .action(template)
        .effect(cooldown_effect("Cooldown.Primary"))
        .build();
    let mut world = server_with(content);
    let spec = grant(&mut world, "Primary");
    world.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();

    let tag = Tag::new("Action.Cooldown.Primary");
    let mut last = world.system(PLAYER).unwrap().cooldown_time_remaining(&tag);
    assert_eq!(last, 2.0);
    for _ in 0..10 {
        world.advance(0.25);
        let remaining = world.system(PLAYER).unwrap().cooldown_time_remaining(&tag);
        assert!(remaining <= last);
        last = remaining;
    }
    assert_eq!(last, 0.0);
    assert!(!world.system(PLAYER).unwrap().has_tag(&tag));
}

#[test]
fn replace_stacking_caps_at_three_and_refreshes_expiry() {
    let slow = EffectTemplate::timed("Slow", ScalableFloat::Static(5.0))
        .modifier(Attribute::MoveSpeed, ModifierOp::Multiply, ScalableFloat::Static(0.9))
        .stacking(StackingPolicy::Replace, 3);
    let mut world = server_with(ContentLibrary::builder().effect(slow).build());
    let target = EntityId(2);
    world.spawn(target, NetRole::Authority).unwrap();

    let apply = |world: &mut World| {
        let spec = world
            .system(PLAYER)
            .unwrap()
            .make_outgoing_spec(&"Slow".into(), 1)
            .unwrap();
        world.apply_effect(target, spec).unwrap()
    };

    let handle = apply(&mut world).unwrap();
    world.advance(0.1);
    apply(&mut world);
    world.advance(0.1);
    assert_eq!(apply(&mut world), Some(handle));

    let effect = world.system(target).unwrap().effects().get(handle).unwrap();
    assert_eq!(effect.stacks, 3);
    let end = effect.end_time.unwrap();
    assert!((end - 5.2).abs() < 1e-4);

    apply(&mut world);
    assert_eq!(world.system(target).unwrap().effects().get(handle).unwrap().stacks, 3);
}
