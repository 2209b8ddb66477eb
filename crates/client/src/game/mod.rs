//! One client frame: network in, prediction, network out, presentation.

use std::io;
use std::time::Instant;

use hopper::{Pose, ServerPacket, Transport};

use crate::net::{ClientConfig, InterpolationEngine, NetworkClient, NetworkEvent};
use crate::player::{ButtonAction, ControlMode, InputState, LocalPlayer, MouseButton};
use crate::scene::{ObjectHandle, Presentation};

pub const PLAYER_OBJECT: &str = "player";

pub struct ClientGame<T: Transport, P: Presentation> {
    network: NetworkClient<T>,
    player: LocalPlayer,
    remote: InterpolationEngine,
    scene: P,
    player_handle: ObjectHandle,
    frames: u64,
    corrections: u64,
}

impl<T: Transport, P: Presentation> ClientGame<T, P> {
    pub fn new(network: NetworkClient<T>, mut scene: P) -> Self {
        let player = LocalPlayer::new();
        let player_handle = scene.create_entity(PLAYER_OBJECT, player.position(), player.rotation());
        let remote = InterpolationEngine::new(network.config().tick_period);

        Self {
            network,
            player,
            remote,
            scene,
            player_handle,
            frames: 0,
            corrections: 0,
        }
    }

    pub fn network(&self) -> &NetworkClient<T> {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkClient<T> {
        &mut self.network
    }

    pub fn player(&self) -> &LocalPlayer {
        &self.player
    }

    pub fn remote(&self) -> &InterpolationEngine {
        &self.remote
    }

    pub fn scene(&self) -> &P {
        &self.scene
    }

    pub fn config(&self) -> &ClientConfig {
        self.network.config()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    pub fn handle_button(&mut self, button: MouseButton, action: ButtonAction) -> ControlMode {
        self.player.handle_button(button, action)
    }

    /// Runs one frame of `dt` seconds ending at `now`.
    pub fn frame(&mut self, input: &InputState, dt: f32, now: Instant) -> io::Result<()> {
        for event in self.network.poll()? {
            self.dispatch(event, now);
        }

        self.player.apply_input(input, dt);
        for event in self.player.update(dt) {
            if let Err(err) = self.network.send_event(&event, now) {
                log::warn!("Failed to send {event:?}: {err}");
            }
        }
        if self.network.is_connected()
            && let Err(err) = self.network.flush(now)
        {
            log::warn!("Failed to flush held-back updates: {err}");
        }

        self.scene
            .set_transform(self.player_handle, self.player.position(), self.player.rotation());
        self.remote.update(&mut self.scene, now);
        self.frames += 1;
        Ok(())
    }

    fn dispatch(&mut self, event: NetworkEvent, now: Instant) {
        let packet = match event {
            NetworkEvent::Packet(packet) => packet,
            NetworkEvent::Disconnected => {
                self.remote.clear(&mut self.scene);
                return;
            }
        };

        match packet {
            ServerPacket::Welcome {
                assigned_id,
                entities,
            } => {
                self.remote.set_local_id(assigned_id);
                for entity in entities {
                    self.remote
                        .spawn(&mut self.scene, entity.id, entity.pose, now);
                }
            }
            ServerPacket::NewEntity { id } => {
                self.remote
                    .spawn(&mut self.scene, id, Pose::default(), now);
            }
            ServerPacket::DelEntity { id } => {
                self.remote.despawn(&mut self.scene, id);
            }
            ServerPacket::EntityChanges { entities } => {
                if entities.is_empty() {
                    log::warn!("Received an empty entity update");
                }
                for entity in entities {
                    self.remote
                        .apply_update(&self.scene, entity.id, entity.pose, now);
                }
            }
            ServerPacket::PositionCorrection {
                position,
                jump_fall,
            } => {
                log::debug!("Correction to {position} ({jump_fall:?})");
                self.corrections += 1;
                self.network.discard_pending();
                self.player.apply_correction(position, jump_fall);
            }
        }
    }
}
