use std::time::Duration;

use action_core::tag::names;
use action_core::{ConnectionId, EntityId, Notification, Tag};
use runtime::{Event, InputIntent, Runtime, ScriptedInputProvider, Topic};
use tokio::sync::broadcast;

const ALICE: ConnectionId = ConnectionId(1);
const BOB: ConnectionId = ConnectionId(2);
const PRIMARY_INPUT: &str = "Input.Action.Primary";

async fn session(clients: u32) -> Runtime {
    Runtime::builder()
        .content(action_content::builtin_library().unwrap())
        .client_count(clients)
        .tick_interval(Duration::from_millis(10))
        .grant_to_all("Primary", PRIMARY_INPUT, 1)
        .build()
        .await
        .unwrap()
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn startup_grants_replicate_to_the_owning_client() {
    let runtime = session(2).await;
    let handle = runtime.handle();

    assert_eq!(handle.player(ALICE).unwrap(), EntityId(1));
    assert_eq!(handle.player(BOB).unwrap(), EntityId(2));
    for client in [ALICE, BOB] {
        let player = handle.player(client).unwrap();
        let server = handle.server_snapshot(player).await.unwrap().unwrap();
        let mirrored = handle.client_snapshot(client, player).await.unwrap().unwrap();
        assert_eq!(mirrored.specs.len(), 1);
        assert_eq!(mirrored.specs[0].handle, server.specs[0].handle);
    }

    drop(handle);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn predicted_activation_runs_on_both_peers() {
    let runtime = session(1).await;
    let handle = runtime.handle();
    let mut cooldowns = handle.subscribe(Topic::Cooldown);
    let cooldown = Tag::new("Action.Cooldown.Primary");

    let spec = handle.activate(ALICE, "Primary").await.unwrap();
    handle.settle().await.unwrap();

    let server = handle.server_snapshot(EntityId(1)).await.unwrap().unwrap();
    assert_eq!(server.active.len(), 1);
    assert_eq!(server.active[0].spec.handle, spec);
    let entry = server.cooldowns.iter().find(|c| c.tag == cooldown).unwrap();
    assert_eq!(entry.duration, 1.0);

    let client = handle.client_snapshot(ALICE, EntityId(1)).await.unwrap().unwrap();
    assert_eq!(client.active.len(), 1);
    assert!(client.cooldowns.iter().any(|c| c.tag == cooldown));

    // Both peers announce the cooldown.
    let added = drain(&mut cooldowns)
        .into_iter()
        .filter(|event| {
            matches!(event, Event::Cooldown(e) if matches!(&e.notification, Notification::CooldownAdded(c) if c.tag == cooldown))
        })
        .count();
    assert!(added >= 2);

    // Wind-up, strike and recover take 0.4s; the cooldown takes 1s.
    handle.step(0.5).await.unwrap();
    let server = handle.server_snapshot(EntityId(1)).await.unwrap().unwrap();
    assert!(server.active.is_empty());
    handle.step(0.6).await.unwrap();
    let client = handle.client_snapshot(ALICE, EntityId(1)).await.unwrap().unwrap();
    assert!(client.active.is_empty());
    assert!(client.cooldowns.is_empty());

    drop(handle);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn replicated_state_blocks_activation_on_the_client() {
    let runtime = session(1).await;
    let handle = runtime.handle();

    handle
        .add_tag(EntityId(1), names::tag(names::STATE_DEAD), 1)
        .await
        .unwrap();
    handle.settle().await.unwrap();
    let mut network = handle.subscribe(Topic::Network);

    let err = handle.activate(ALICE, "Primary").await.unwrap_err();
    assert!(matches!(err, runtime::RuntimeError::Activation(_)));
    handle.settle().await.unwrap();

    let sent_execute = drain(&mut network)
        .into_iter()
        .any(|event| matches!(event, Event::Network(n) if n.kind == "execute"));
    assert!(!sent_execute);
    let server = handle.server_snapshot(EntityId(1)).await.unwrap().unwrap();
    assert!(server.active.is_empty());
    let client = handle.client_snapshot(ALICE, EntityId(1)).await.unwrap().unwrap();
    assert!(!client.tags.iter().any(|t| t.tag == Tag::new("Action.Id.Primary") && t.count > 0));

    drop(handle);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_clients_are_refused() {
    let runtime = session(1).await;
    let handle = runtime.handle();
    let err = handle.press(ConnectionId(9), Tag::new(PRIMARY_INPUT)).await.unwrap_err();
    assert!(matches!(err, runtime::RuntimeError::UnknownClient(ConnectionId(9))));
    drop(handle);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn scripted_input_drives_ticks() {
    let script = ScriptedInputProvider::new()
        .at(0, ALICE, InputIntent::Press(Tag::new(PRIMARY_INPUT)))
        .at(1, ALICE, InputIntent::Release(Tag::new(PRIMARY_INPUT)));
    let mut runtime = session(2).await;
    runtime.set_input_provider(script);
    let mut network = runtime.subscribe(Topic::Network);

    runtime.run(3).await.unwrap();
    assert_eq!(runtime.tick(), 3);

    let events = drain(&mut network);
    assert!(events.iter().any(|event| matches!(event, Event::Network(n) if n.kind == "execute")));

    let handle = runtime.handle();
    let server = handle.server_snapshot(EntityId(1)).await.unwrap().unwrap();
    assert!(server.cooldowns.iter().any(|c| c.tag == Tag::new("Action.Cooldown.Primary")));
    let idle = handle.server_snapshot(EntityId(2)).await.unwrap().unwrap();
    assert!(idle.cooldowns.is_empty());

    drop(handle);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn builder_rejects_an_empty_session() {
    let result = Runtime::builder().client_count(0).build().await;
    assert!(matches!(result, Err(runtime::RuntimeError::InvalidConfig(_))));
}
