use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::inspector::PortInspector;

#[derive(Debug, Default)]
struct State {
    owners: HashMap<u16, Vec<u32>>,
    alive: HashSet<u32>,
    stubborn: HashSet<u32>,
    interrupted: Vec<u32>,
    killed_ports: Vec<u16>,
    blunt: bool,
    enumeration_error: Option<String>,
}

/// Scripted port table. Owners exit on interrupt unless marked stubborn.
#[derive(Debug, Default, Clone)]
pub(crate) struct MockPortInspector {
    state: Arc<Mutex<State>>,
}

impl MockPortInspector {
    pub fn with_owners(self, port: u16, pids: &[u32]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.owners.insert(port, pids.to_vec());
            state.alive.extend(pids);
        }
        self
    }

    pub fn stubborn(self, pid: u32) -> Self {
        self.state.lock().unwrap().stubborn.insert(pid);
        self
    }

    pub fn blunt(self) -> Self {
        self.state.lock().unwrap().blunt = true;
        self
    }

    pub fn failing_enumeration(self, message: &str) -> Self {
        self.state.lock().unwrap().enumeration_error = Some(message.to_owned());
        self
    }

    pub fn interrupted(&self) -> Vec<u32> {
        self.state.lock().unwrap().interrupted.clone()
    }

    pub fn killed_ports(&self) -> Vec<u16> {
        self.state.lock().unwrap().killed_ports.clone()
    }
}

#[async_trait]
impl PortInspector for MockPortInspector {
    async fn owners(&self, port: u16) -> Result<Vec<u32>, String> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.enumeration_error {
            return Err(err.clone());
        }
        Ok(state
            .owners
            .get(&port)
            .map(|pids| {
                pids.iter()
                    .copied()
                    .filter(|pid| state.alive.contains(pid))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn interrupt(&self, pid: u32) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.interrupted.push(pid);
        if !state.stubborn.contains(&pid) {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains(&pid)
    }

    async fn kill_port(&self, port: u16) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.killed_ports.push(port);
        if let Some(pids) = state.owners.get(&port).cloned() {
            for pid in pids {
                state.alive.remove(&pid);
            }
        }
        Ok(())
    }

    fn blunt_only(&self) -> bool {
        self.state.lock().unwrap().blunt
    }
}
