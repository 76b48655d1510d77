//! Scripted demo session and its JSON summary.
use std::collections::BTreeMap;
use std::path::Path;

use action_core::{ActionConfig, ConnectionId, ContentLibrary, EntityId, Tag};
use action_content::ContentFactory;
use anyhow::{Context, Result};
use runtime::{
    Event, InputIntent, Runtime, RuntimeHandle, ScriptedInputProvider, Topic,
};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::CliConfig;

const LOADOUT: [(&str, &str); 3] = [
    ("Primary", "Input.Action.Primary"),
    ("Dash", "Input.Action.Dash"),
    ("Channel", "Input.Action.Channel"),
];

#[derive(Debug, Default, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub ticks: u64,
    pub server_time: f32,
    pub clients: u32,
    pub events: EventCounts,
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Default, Serialize)]
pub struct EventCounts {
    pub action: usize,
    pub effect: usize,
    pub cooldown: usize,
    pub network_frames: usize,
    pub network_bytes: usize,
    /// Events missed because a subscriber fell behind.
    pub lagged: u64,
    pub by_peer: BTreeMap<String, usize>,
}

impl EventCounts {
    fn record(&mut self, event: &Event) {
        let peer = match event {
            Event::Action(e) => {
                self.action += 1;
                e.peer
            }
            Event::Effect(e) => {
                self.effect += 1;
                e.peer
            }
            Event::Cooldown(e) => {
                self.cooldown += 1;
                e.peer
            }
            Event::Network(n) => {
                self.network_frames += 1;
                self.network_bytes += n.bytes;
                n.peer
            }
        };
        *self.by_peer.entry(peer.to_string()).or_default() += 1;
    }

    fn merge(&mut self, other: EventCounts) {
        self.action += other.action;
        self.effect += other.effect;
        self.cooldown += other.cooldown;
        self.network_frames += other.network_frames;
        self.network_bytes += other.network_bytes;
        self.lagged += other.lagged;
        for (peer, count) in other.by_peer {
            *self.by_peer.entry(peer).or_default() += count;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayerSummary {
    pub entity: u32,
    pub owner: u32,
    pub granted: Vec<String>,
    pub activations: BTreeMap<String, u32>,
    pub active: usize,
    pub cooldowns: BTreeMap<String, f32>,
    pub tags: BTreeMap<String, i32>,
    pub attributes: BTreeMap<String, f32>,
    /// Whether the owning client's view agrees with the server on active actions.
    pub client_in_sync: bool,
}

/// Loads content from `data_dir`, or the embedded sample data.
pub fn load_content(data_dir: Option<&Path>) -> Result<(ContentLibrary, ActionConfig)> {
    match data_dir {
        Some(dir) => {
            let factory = ContentFactory::new(dir);
            Ok((factory.load_library()?, factory.load_config()?))
        }
        None => Ok((
            action_content::builtin_library()?,
            action_content::builtin_config()?,
        )),
    }
}

/// Input script: the first client fires, dashes, then gets interrupted by
/// movement; the last client channels and releases.
pub fn script(clients: u32) -> ScriptedInputProvider {
    let first = ConnectionId(1);
    let last = ConnectionId(clients.max(1));
    let press = |input: &str| InputIntent::Press(Tag::new(input));
    let release = |input: &str| InputIntent::Release(Tag::new(input));
    let channel_start = if last == first { 40 } else { 2 };

    ScriptedInputProvider::new()
        .at(0, first, press("Input.Action.Primary"))
        .at(1, first, release("Input.Action.Primary"))
        .at(6, first, press("Input.Action.Dash"))
        .at(7, first, release("Input.Action.Dash"))
        .at(26, first, press("Input.Action.Primary"))
        .at(27, first, release("Input.Action.Primary"))
        .at(27, first, InputIntent::SetMoving(true))
        .at(30, first, InputIntent::SetMoving(false))
        .at(channel_start, last, press("Input.Action.Channel"))
        .at(channel_start + 18, last, release("Input.Action.Channel"))
}

fn count_events(mut rx: broadcast::Receiver<Event>) -> JoinHandle<EventCounts> {
    tokio::spawn(async move {
        let mut counts = EventCounts::default();
        loop {
            match rx.recv().await {
                Ok(event) => counts.record(&event),
                Err(RecvError::Lagged(missed)) => counts.lagged += missed,
                Err(RecvError::Closed) => break,
            }
        }
        counts
    })
}

pub async fn run(config: &CliConfig, session_id: String) -> Result<SessionSummary> {
    let (content, action_config) = load_content(config.data_dir.as_deref())?;

    let mut builder = Runtime::builder()
        .content(content)
        .action_config(action_config)
        .client_count(config.client_count)
        .tick_interval(config.tick_interval)
        .input_provider(script(config.client_count));
    for (template, input) in LOADOUT {
        builder = builder.grant_to_all(template, input, 1);
    }
    let mut runtime = builder.build().await.context("starting session")?;

    let counters: Vec<_> = Topic::ALL
        .into_iter()
        .map(|topic| count_events(runtime.subscribe(topic)))
        .collect();

    let handle = runtime.handle();
    let players: Vec<(ConnectionId, EntityId)> = handle
        .clients()
        .map(|client| handle.player(client).map(|player| (client, player)))
        .collect::<runtime::Result<_>>()?;
    if let (Some(&(_, target)), Some(&(_, source))) = (players.first(), players.last()) {
        handle.apply_effect(source, target, "Debuff.Slow", 1).await?;
        handle.apply_effect(source, target, "Damage.Burn", 1).await?;
    }

    tracing::info!(target: "runtime::session", session = %session_id, ticks = config.ticks, "running demo");
    runtime.run(config.ticks).await?;
    let server_time = handle.step(0.0).await?;

    let mut summaries = Vec::with_capacity(players.len());
    for &(client, player) in &players {
        summaries.push(summarize(&handle, client, player, server_time).await?);
    }

    let ticks = runtime.tick();
    drop(handle);
    runtime.shutdown().await?;

    let mut events = EventCounts::default();
    for counter in counters {
        events.merge(counter.await.context("event counter")?);
    }

    Ok(SessionSummary {
        session_id,
        ticks,
        server_time,
        clients: config.client_count,
        events,
        players: summaries,
    })
}

async fn summarize(
    handle: &RuntimeHandle,
    client: ConnectionId,
    player: EntityId,
    now: f32,
) -> Result<PlayerSummary> {
    let server = handle
        .server_snapshot(player)
        .await?
        .with_context(|| format!("{player} missing on the server"))?;
    let mirrored = handle
        .client_snapshot(client, player)
        .await?
        .with_context(|| format!("{player} missing on {client}"))?;

    let mut server_active: Vec<_> = server.active.iter().map(|a| a.handle).collect();
    let mut client_active: Vec<_> = mirrored.active.iter().map(|a| a.handle).collect();
    server_active.sort();
    client_active.sort();

    Ok(PlayerSummary {
        entity: player.0,
        owner: client.0,
        granted: server.specs.iter().map(|s| s.template.to_string()).collect(),
        activations: server
            .specs
            .iter()
            .map(|s| (s.template.to_string(), s.activation_count))
            .collect(),
        active: server.active.len(),
        cooldowns: server
            .cooldowns
            .iter()
            .map(|c| (c.tag.to_string(), c.time_remaining(now)))
            .collect(),
        tags: server
            .tags
            .iter()
            .filter(|t| t.count != 0)
            .map(|t| (t.tag.to_string(), t.count))
            .collect(),
        attributes: server
            .attributes
            .iter()
            .map(|a| (a.attribute.to_string(), a.data.current))
            .collect(),
        client_in_sync: server_active == client_active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_covers_every_client() {
        let script = script(3);
        assert_eq!(script.last_tick(), Some(30));
    }

    #[test]
    fn single_client_channels_after_its_other_inputs() {
        let script = script(1);
        assert_eq!(script.last_tick(), Some(58));
    }

    #[test]
    fn embedded_content_loads() {
        let (content, config) = load_content(None).unwrap();
        assert!(content.validate().is_ok());
        assert_eq!(config, ActionConfig::default());
    }

    #[test]
    fn event_counts_merge_by_peer() {
        let mut total = EventCounts::default();
        let mut part = EventCounts::default();
        part.action = 2;
        part.by_peer.insert("server".into(), 2);
        total.merge(part);
        let mut part = EventCounts::default();
        part.network_bytes = 40;
        part.by_peer.insert("server".into(), 1);
        total.merge(part);
        assert_eq!(total.action, 2);
        assert_eq!(total.network_bytes, 40);
        assert_eq!(total.by_peer["server"], 3);
    }
}
