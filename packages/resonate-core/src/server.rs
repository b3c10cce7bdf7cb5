//! Top-level server (§4.7): accepts client proxies, dispatches group
//! commands, and tears down membership on close.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::client_proxy::ClientProxy;
use crate::codec::{GroupListEntry, GroupListPayload, ServerMessage};
use crate::events::{BroadcastEvent, BroadcastEventBridge, ClientProxyEvent, GroupCommand};
use crate::group::Group;
use crate::model::ServerInfo;

pub struct Server {
    server_info: ServerInfo,
    groups: DashMap<String, Arc<Group>>,
    clients: DashMap<String, Arc<ClientProxy>>,
    event_bridge: Arc<BroadcastEventBridge>,
}

impl Server {
    pub fn new(server_info: ServerInfo, event_bridge: Arc<BroadcastEventBridge>) -> Self {
        Self {
            server_info,
            groups: DashMap::new(),
            clients: DashMap::new(),
            event_bridge,
        }
    }

    /// Creates (or returns the existing) group with `group_id`.
    pub fn add_group(&self, group_id: impl Into<String>) -> Arc<Group> {
        let group_id = group_id.into();
        self.groups
            .entry(group_id.clone())
            .or_insert_with(|| Arc::new(Group::new(group_id, Arc::clone(&self.event_bridge) as _)))
            .clone()
    }

    pub fn group(&self, group_id: &str) -> Option<Arc<Group>> {
        self.groups.get(group_id).map(|g| Arc::clone(g.value()))
    }

    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.groups.iter().map(|g| Arc::clone(g.value())).collect()
    }

    pub fn client(&self, client_id: &str) -> Option<Arc<ClientProxy>> {
        self.clients.get(client_id).map(|c| Arc::clone(c.value()))
    }

    /// Accepts a newly connected client: sends `source/hello` and records it.
    pub fn accept(&self, client: Arc<ClientProxy>) {
        let _ = client.send(&ServerMessage::SourceHello {
            payload: self.server_info.clone(),
        });
        self.clients.insert(client.client_id().to_string(), client);
    }

    /// Removes `client_id` from every group it currently belongs to.
    /// §3: a client belongs to at most one group at a time, so this must run
    /// before adding it to a new one as well as on an explicit unjoin.
    fn leave_all_groups(&self, client_id: &str) {
        for group in self.groups() {
            if group.contains(client_id) {
                group.remove_client(client_id);
            }
        }
    }

    fn handle_group_command(&self, client_id: &str, command: GroupCommand) {
        match command {
            GroupCommand::Join(payload) => match self.group(&payload.group_id) {
                Some(group) => {
                    if let Some(client) = self.client(client_id) {
                        self.leave_all_groups(client_id);
                        group.add_client(client);
                    }
                }
                None => {
                    log::warn!("[Server] join requested for unknown group {}", payload.group_id);
                }
            },
            GroupCommand::Unjoin => {
                self.leave_all_groups(client_id);
            }
            GroupCommand::GetList => {
                if let Some(client) = self.client(client_id) {
                    let groups = self
                        .groups()
                        .into_iter()
                        .map(|g| GroupListEntry {
                            group_id: g.group_id().to_string(),
                            state: g.state(),
                        })
                        .collect();
                    let _ = client.send(&ServerMessage::GroupList {
                        payload: GroupListPayload { groups },
                    });
                }
            }
        }
    }

    /// Removes `client_id` from every group and forgets it entirely.
    pub fn handle_close(&self, client_id: &str) {
        for group in self.groups() {
            group.remove_client(client_id);
        }
        self.clients.remove(client_id);
    }

    /// Ends every active session across every group. Groups with no active
    /// session are left alone; `end_session`'s error there is expected, not
    /// a shutdown failure.
    pub fn stop(&self) {
        for group in self.groups() {
            let _ = group.end_session();
        }
    }

    /// Spawns the background task that dispatches `close` and
    /// `group-command` events observed on the shared event bus. The server
    /// itself never touches the transport; this task is the only consumer
    /// of those two event variants.
    pub fn spawn_dispatch_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let server = Arc::clone(self);
        let mut rx = self.event_bridge.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(BroadcastEvent::ClientProxy(ClientProxyEvent::Close { client_id })) => {
                        server.handle_close(&client_id);
                    }
                    Ok(BroadcastEvent::ClientProxy(ClientProxyEvent::GroupCommand { client_id, command })) => {
                        server.handle_group_command(&client_id, command);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("[Server] event dispatch lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::GroupState;
    use tokio::sync::mpsc;

    fn server() -> Server {
        Server::new(
            ServerInfo {
                id: "srv1".into(),
                name: "Test Server".into(),
            },
            Arc::new(BroadcastEventBridge::new(64)),
        )
    }

    fn client() -> Arc<ClientProxy> {
        let (tx, _rx) = mpsc::channel(16);
        Arc::new(ClientProxy::new(tx, Arc::new(crate::events::NoopEventEmitter)))
    }

    #[test]
    fn join_adds_client_to_known_group() {
        let server = server();
        server.add_group("living-room");
        let client = client();
        let id = client.client_id().to_string();
        server.accept(client);

        server.handle_group_command(
            &id,
            GroupCommand::Join(crate::codec::GroupJoinPayload {
                group_id: "living-room".into(),
            }),
        );

        assert!(server.group("living-room").unwrap().contains(&id));
    }

    #[test]
    fn joining_a_second_group_leaves_the_first() {
        let server = server();
        server.add_group("living-room");
        server.add_group("kitchen");
        let client = client();
        let id = client.client_id().to_string();
        server.accept(client);

        server.handle_group_command(
            &id,
            GroupCommand::Join(crate::codec::GroupJoinPayload {
                group_id: "living-room".into(),
            }),
        );
        server.handle_group_command(
            &id,
            GroupCommand::Join(crate::codec::GroupJoinPayload {
                group_id: "kitchen".into(),
            }),
        );

        assert!(!server.group("living-room").unwrap().contains(&id));
        assert!(server.group("kitchen").unwrap().contains(&id));
    }

    #[test]
    fn join_to_unknown_group_is_a_no_op() {
        let server = server();
        let client = client();
        let id = client.client_id().to_string();
        server.accept(client);

        server.handle_group_command(
            &id,
            GroupCommand::Join(crate::codec::GroupJoinPayload {
                group_id: "nonexistent".into(),
            }),
        );

        assert!(server.groups().is_empty());
    }

    #[test]
    fn close_removes_client_from_all_groups() {
        let server = server();
        let group = server.add_group("living-room");
        let client = client();
        let id = client.client_id().to_string();
        group.add_client(client);

        server.handle_close(&id);
        assert!(!group.contains(&id));
    }

    #[test]
    fn list_reports_playing_state_for_active_sessions() {
        let server = server();
        let group = server.add_group("living-room");
        group.start_session("pcm", 48000, 2, 16).unwrap();
        let entries: Vec<GroupListEntry> = server
            .groups()
            .into_iter()
            .map(|g| GroupListEntry {
                group_id: g.group_id().to_string(),
                state: g.state(),
            })
            .collect();
        assert_eq!(entries[0].state, GroupState::Playing);
    }
}
