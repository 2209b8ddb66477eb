mod controller;
mod input;
mod mode;

pub use controller::{LocalPlayer, MOUSE_SENSITIVITY, PlayerEvent};
pub use input::InputState;
pub use mode::{ButtonAction, ControlMode, MouseButton};
