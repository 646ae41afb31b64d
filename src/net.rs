use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::Message;
use uuid::Uuid;

use crate::control::{Key, KeyCommand};
use crate::error::{Result, SimError};
use crate::sim::Simulation;
use crate::state::TelemetryHub;

/// Inbound client message. Vehicles are addressed by index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Motors { vehicle: usize, right: f32, left: f32 },
    Velocity { vehicle: usize, pulse_width: f32 },
    Stop { vehicle: usize },
    Key { vehicle: usize, code: u32, pressed: bool },
    Reset { vehicle: usize },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { session: String, vehicles: usize },
    Pong,
    Error { message: String },
}

impl ServerMessage {
    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Apply one command to the simulation. `Ok(Some(_))` is a direct reply.
pub fn dispatch(sim: &mut Simulation, command: ClientCommand) -> Result<Option<ServerMessage>> {
    match command {
        ClientCommand::Ping => return Ok(Some(ServerMessage::Pong)),
        ClientCommand::Motors { vehicle, right, left } => {
            sim.vehicle_mut(vehicle)?.set_motor_speeds(right, left)?;
        }
        ClientCommand::Velocity { vehicle, pulse_width } => {
            let id = sim.vehicle(vehicle)?.id();
            sim.set_motor_velocity(id, pulse_width)?;
        }
        ClientCommand::Stop { vehicle } => {
            sim.vehicle_mut(vehicle)?.stop();
        }
        ClientCommand::Key { vehicle, code, pressed } => {
            let key = Key::from_key_code(code).ok_or(SimError::UnknownKey(code))?;
            sim.vehicle_mut(vehicle)?.apply_key(KeyCommand { key, pressed })?;
        }
        ClientCommand::Reset { vehicle } => {
            let id = sim.vehicle(vehicle)?.id();
            sim.reset_vehicle(id)?;
        }
    }
    Ok(None)
}

/// Parse and dispatch a text frame; the reply, if any, is already serialized.
pub fn handle_text(sim: &mut Simulation, text: &str) -> Option<String> {
    let reply = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => match dispatch(sim, command) {
            Ok(reply) => reply,
            Err(e) => Some(ServerMessage::Error { message: e.to_string() }),
        },
        Err(e) => {
            debug!(error = %e, "malformed client message");
            Some(ServerMessage::Error { message: format!("malformed message: {e}") })
        }
    };
    reply.and_then(|r| r.to_json())
}

pub async fn start_websocket_server(
    addr: SocketAddr,
    sim: Arc<Mutex<Simulation>>,
    hub: Arc<Mutex<TelemetryHub>>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("websocket listening on ws://{addr}");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        tokio::spawn(handle_connection(raw, peer, Arc::clone(&sim), Arc::clone(&hub)));
    }
}

async fn handle_connection(
    raw: TcpStream,
    peer: SocketAddr,
    sim: Arc<Mutex<Simulation>>,
    hub: Arc<Mutex<TelemetryHub>>,
) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let session = Uuid::new_v4();

    // ---- outgoing channel + send loop ----
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    hub.lock().await.register_client(session, tx.clone());

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    info!(%session, %peer, "client connected");

    let vehicles = sim.lock().await.vehicle_count();
    let welcome = ServerMessage::Welcome { session: session.to_string(), vehicles };
    if let Some(json) = welcome.to_json() {
        let _ = tx.send(json);
    }

    // ---- receive loop ----
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_text() else { continue };
        if !msg.is_text() {
            continue;
        }

        let reply = {
            let mut sim = sim.lock().await;
            handle_text(&mut sim, text)
        };
        if let Some(json) = reply {
            let _ = tx.send(json);
        }
    }

    hub.lock().await.remove_client(session);
    info!(%session, "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WorldConfig, ZUMO};
    use crate::control::{DriveState, IDLE_BRAKE_FORCE, STOP_BRAKE_FORCE};
    use crate::vehicle::Spawn;

    fn sim_with_vehicle() -> Simulation {
        let mut sim = Simulation::new(&WorldConfig::default());
        sim.physics.add_ground();
        sim.add_vehicle(&ZUMO, &Spawn::at(0.0, 0.8, 0.0)).unwrap();
        sim
    }

    #[test]
    fn parses_tagged_commands() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"motors","vehicle":0,"right":10,"left":-4.5}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Motors { vehicle: 0, right: 10.0, left: -4.5 });

        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"key","vehicle":1,"code":38,"pressed":true}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Key { vehicle: 1, code: 38, pressed: true });

        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Ping);

        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"fly","vehicle":0}"#).is_err());
    }

    #[test]
    fn motors_command_reaches_the_vehicle() {
        let mut sim = sim_with_vehicle();
        let reply = handle_text(&mut sim, r#"{"type":"motors","vehicle":0,"right":8,"left":8}"#);
        assert!(reply.is_none());
        assert_eq!(sim.vehicle(0).unwrap().drive_state(), DriveState::Forward);

        handle_text(&mut sim, r#"{"type":"stop","vehicle":0}"#);
        assert!(sim.vehicle(0).unwrap().wheels.iter().all(|w| w.brake == STOP_BRAKE_FORCE));
    }

    #[test]
    fn unknown_vehicle_index_is_reported_to_the_client() {
        let mut sim = sim_with_vehicle();
        let reply = handle_text(&mut sim, r#"{"type":"stop","vehicle":3}"#).unwrap();

        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["type"], "error");
        assert!(v["message"].as_str().unwrap().contains("index 3"));
        // vehicle 0 untouched
        assert_eq!(sim.vehicle(0).unwrap().drive_state(), DriveState::Idle);
    }

    #[test]
    fn bad_key_code_and_garbage_get_errors() {
        let mut sim = sim_with_vehicle();
        let reply = handle_text(&mut sim, r#"{"type":"key","vehicle":0,"code":65,"pressed":true}"#).unwrap();
        assert!(reply.contains("unsupported key code 65"));

        let reply = handle_text(&mut sim, "not json").unwrap();
        assert!(reply.contains("\"type\":\"error\""));
    }

    #[test]
    fn ping_gets_pong() {
        let mut sim = sim_with_vehicle();
        assert_eq!(handle_text(&mut sim, r#"{"type":"ping"}"#).unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn velocity_and_reset_commands() {
        let mut sim = sim_with_vehicle();
        handle_text(&mut sim, r#"{"type":"velocity","vehicle":0,"pulse_width":400}"#);
        let v = sim.vehicle(0).unwrap().chassis_body(&sim.physics).unwrap().linvel().z;
        assert!((v - 6.5).abs() < 1e-4);

        handle_text(&mut sim, r#"{"type":"reset","vehicle":0}"#);
        let v = sim.vehicle(0).unwrap().chassis_body(&sim.physics).unwrap().linvel().z;
        assert_eq!(v, 0.0);
    }

    #[test]
    fn motors_after_velocity_in_one_tick_get_an_error() {
        let mut sim = sim_with_vehicle();
        handle_text(&mut sim, r#"{"type":"velocity","vehicle":0,"pulse_width":400}"#);

        let reply = handle_text(&mut sim, r#"{"type":"motors","vehicle":0,"right":8,"left":8}"#).unwrap();
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["type"], "error");
        assert!(v["message"].as_str().unwrap().contains("engine-force command rejected"));

        let reply = handle_text(&mut sim, r#"{"type":"key","vehicle":0,"code":38,"pressed":true}"#);
        assert!(reply.unwrap().contains("\"type\":\"error\""));

        // stopping the motors is always accepted
        let reply = handle_text(&mut sim, r#"{"type":"motors","vehicle":0,"right":0,"left":0}"#);
        assert!(reply.is_none());
        assert!(sim.vehicle(0).unwrap().wheels.iter().all(|w| w.brake == IDLE_BRAKE_FORCE));

        // the override ends with the tick
        sim.step(1.0 / 60.0);
        let reply = handle_text(&mut sim, r#"{"type":"motors","vehicle":0,"right":8,"left":8}"#);
        assert!(reply.is_none());
    }
}
