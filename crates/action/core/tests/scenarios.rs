mod common;

use action_core::tag::names;
use action_core::task::TaskSpec;
use action_core::{
    ActionTemplate, BehaviorKind, ContentLibrary, NetMessage, Notification, PhaseBehavior,
    PhaseData, PredictionKey, Tag, TagSet, TransitionKind,
};

use common::{PLAYER, Session, cooldown_effect, with_cooldown};

fn primary_content() -> ContentLibrary {
    let mut template = with_cooldown(
        ActionTemplate::new("Primary").phase_data(PhaseData::new("Phase.Action.Fire")),
        "Cooldown.Primary",
        4.0,
    );
    template.identifier_tag = Some(Tag::new("Action.Id.Primary"));
    ContentLibrary::builder()
        .action(template)
        .effect(cooldown_effect("Cooldown.Primary"))
        .build()
}

#[test]
fn primary_fire_starts_a_replicated_cooldown() {
    let mut session = Session::new(primary_content());
    let spec = session.grant("Primary");
    let cooldown = Tag::new("Action.Cooldown.Primary");

    session.client.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();
    session.sync();

    let server = session.server.system(PLAYER).unwrap();
    let entry = server.cooldowns().entry(&cooldown).unwrap();
    assert_eq!(entry.duration, 4.0);
    assert_eq!(server.cooldown_time_remaining(&cooldown), 4.0);
    assert!(server.has_tag(&cooldown));

    let client = session.client.system(PLAYER).unwrap();
    assert_eq!(client.cooldown_time_remaining(&cooldown), 4.0);
    let mirrored = session
        .client
        .drain_notifications()
        .into_iter()
        .any(|(_, n)| matches!(n, Notification::CooldownAdded(entry) if entry.tag == cooldown));
    assert!(mirrored);

    // A second press inside the window is refused locally.
    assert!(session.client.system_mut(PLAYER).unwrap().try_activate(spec).is_err());

    session.step(4.0);
    assert_eq!(session.server.system(PLAYER).unwrap().cooldown_time_remaining(&cooldown), 0.0);
    assert_eq!(session.client.system(PLAYER).unwrap().cooldown_time_remaining(&cooldown), 0.0);
    assert!(!session.client.system(PLAYER).unwrap().has_tag(&cooldown));
}

#[test]
fn rejected_prediction_rolls_back_on_the_client() {
    let mut session = Session::new(primary_content());
    let spec = session.grant("Primary");
    let client = session.client.system_mut(PLAYER).unwrap();
    for _ in 0..6 {
        client.create_prediction_key();
    }
    session
        .server
        .system_mut(PLAYER)
        .unwrap()
        .add_tag(&names::tag(names::STATE_DEAD), 1);

    session.client.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();
    let up = session.client_to_server();
    assert_eq!(
        up,
        vec![NetMessage::Execute {
            entity: PLAYER,
            spec,
            key: PredictionKey(7),
        }]
    );
    for message in up {
        session.server.receive(message).unwrap();
    }

    let down = session.server_to_client();
    assert!(down.iter().any(|m| matches!(
        m,
        NetMessage::NotifyFailed { reasons, .. } if reasons.has_tag(&names::tag(names::FAIL_IS_DEAD))
    )));
    assert!(down.contains(&NetMessage::Confirm {
        entity: PLAYER,
        key: PredictionKey(7),
        success: false,
    }));
    for message in down {
        session.client.receive(message).unwrap();
    }
    session.sync();

    let client = session.client.system_mut(PLAYER).unwrap();
    assert_eq!(client.pending_prediction_count(), 0);
    assert!(!client.is_prediction_pending(spec));
    assert_eq!(client.instances().count(), 0);
    assert_eq!(client.tag_count(&Tag::new("Action.Id.Primary")), 0);
    assert_eq!(client.cooldown_time_remaining(&Tag::new("Action.Cooldown.Primary")), 0.0);
    let notifications = client.drain_notifications();
    assert!(notifications.contains(&Notification::PredictionRejected {
        spec,
        key: PredictionKey(7),
    }));
    assert!(session.server.system(PLAYER).unwrap().active_actions().next().is_none());
}

#[test]
fn predicted_tasks_move_to_the_authoritative_execution_once() {
    let template = ActionTemplate::new("Channel").phase_data(
        PhaseData::new("Phase.Action.Channel")
            .on_enter(PhaseBehavior::all(BehaviorKind::RunTask(TaskSpec::WaitDelay(2.0))))
            .transition(TransitionKind::OnDurationEnd(3.0), "Phase.Action.Done"),
    );
    let mut session = Session::new(ContentLibrary::builder().action(template).build());
    let spec = session.grant("Channel");

    session.client.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();
    session.sync();

    let authoritative = session
        .server
        .system(PLAYER)
        .unwrap()
        .active_actions()
        .next()
        .unwrap()
        .handle;

    let client = session.client.system(PLAYER).unwrap();
    let instances: Vec<_> = client.instances().collect();
    assert_eq!(instances.len(), 1);
    let instance = instances[0];
    assert_eq!(instance.active(), authoritative);
    assert_eq!(instance.tasks().len(), 1);
    assert_eq!(client.task_count(), 1);
    for task in instance.tasks() {
        assert_eq!(client.task(*task).unwrap().owner, instance.id());
    }
    assert_eq!(client.pending_prediction_count(), 0);

    let rehomed = session
        .client
        .drain_notifications()
        .into_iter()
        .filter(|(_, n)| matches!(n, Notification::Rehomed { .. }))
        .count();
    assert_eq!(rehomed, 1);

    // Further replication must not rehome again.
    session.step(0.5);
    let again = session
        .client
        .drain_notifications()
        .into_iter()
        .filter(|(_, n)| matches!(n, Notification::Rehomed { .. }))
        .count();
    assert_eq!(again, 0);

    session.step(3.0);
    assert_eq!(session.client.system(PLAYER).unwrap().task_count(), 0);
    assert_eq!(session.server.system(PLAYER).unwrap().task_count(), 0);
}

#[test]
fn rehomed_prediction_runs_its_phase_exit() {
    let template = ActionTemplate::new("Aim").phase_data(
        PhaseData::new("Phase.Action.Aim")
            .on_enter(PhaseBehavior::all(BehaviorKind::AddTags(TagSet::from_iter(["State.Aiming"]))))
            .on_exit(PhaseBehavior::all(BehaviorKind::ExecuteCue {
                tag: Tag::new("Cue.Aim.Lowered"),
                magnitude: 1.0,
            }))
            .transition(TransitionKind::Manual, "Phase.Action.Done"),
    );
    let mut session = Session::new(ContentLibrary::builder().action(template).build());
    let spec = session.grant("Aim");
    let aiming = Tag::new("State.Aiming");
    let lowered = |notifications: Vec<(action_core::EntityId, Notification)>| {
        notifications
            .into_iter()
            .filter(|(_, n)| matches!(n, Notification::CueExecuted { tag, .. } if tag.as_str() == "Cue.Aim.Lowered"))
            .count()
    };
    session.client.drain_notifications();

    session.client.system_mut(PLAYER).unwrap().try_activate(spec).unwrap();
    session.sync();

    // The retired predicted instance exits; its tags moved with the rest.
    assert_eq!(lowered(session.client.drain_notifications()), 1);
    let client = session.client.system(PLAYER).unwrap();
    assert_eq!(client.instances().count(), 1);
    assert_eq!(client.tag_count(&aiming), 1);

    let active = session
        .server
        .system(PLAYER)
        .unwrap()
        .active_actions()
        .next()
        .unwrap()
        .handle;
    session.server.system_mut(PLAYER).unwrap().end_active(active);
    session.sync();

    assert_eq!(lowered(session.client.drain_notifications()), 1);
    assert_eq!(session.client.system(PLAYER).unwrap().tag_count(&aiming), 0);
    assert_eq!(session.server.system(PLAYER).unwrap().tag_count(&aiming), 0);
}
