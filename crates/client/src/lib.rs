pub mod bot;
pub mod game;
pub mod net;
pub mod player;
pub mod scene;

pub use bot::ScriptedInput;
pub use game::{ClientGame, PLAYER_OBJECT};
pub use net::{ClientConfig, ConnectionState, NetworkClient, NetworkEvent};
pub use player::{InputState, LocalPlayer, PlayerEvent};
pub use scene::{ObjectHandle, Presentation, SceneGraph};
