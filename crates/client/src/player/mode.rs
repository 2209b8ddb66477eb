/// How mouse and keyboard drive the character and the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlMode {
    /// Free cursor; the camera stays put.
    #[default]
    Cursor,
    /// Left button held: the mouse orbits the camera.
    Look,
    /// Right button held: the mouse turns the character.
    Control,
    /// Both buttons held: turn and run forward.
    OneHand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAction {
    Press,
    Release,
}

use ButtonAction::{Press, Release};
use ControlMode::{Control, Cursor, Look, OneHand};
use MouseButton::{Left, Right};

const TRANSITIONS: [(ControlMode, MouseButton, ButtonAction, ControlMode); 8] = [
    (Cursor, Left, Press, Look),
    (Cursor, Right, Press, Control),
    (Look, Right, Press, OneHand),
    (Control, Left, Press, OneHand),
    (Look, Left, Release, Cursor),
    (OneHand, Left, Release, Control),
    (Control, Right, Release, Cursor),
    (OneHand, Right, Release, Look),
];

impl ControlMode {
    /// Next mode after a button edge. Unlisted combinations keep the mode.
    pub fn transition(self, button: MouseButton, action: ButtonAction) -> ControlMode {
        TRANSITIONS
            .iter()
            .find(|(from, b, a, _)| *from == self && *b == button && *a == action)
            .map_or(self, |&(_, _, _, to)| to)
    }

    /// Sideways keys strafe instead of spinning the character.
    pub fn strafes(self) -> bool {
        matches!(self, Control | OneHand)
    }

    pub fn runs_forward(self) -> bool {
        self == OneHand
    }

    pub fn mouse_turns_character(self) -> bool {
        matches!(self, Control | OneHand)
    }

    pub fn mouse_orbits_camera(self) -> bool {
        self == Look
    }

    pub fn shows_cursor(self) -> bool {
        self == Cursor
    }
}
