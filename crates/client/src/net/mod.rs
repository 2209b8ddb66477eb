mod client;
mod config;
mod interpolation;
mod outgoing;

pub use client::{ConnectionState, NetworkClient, NetworkEvent};
pub use config::ClientConfig;
pub use interpolation::{
    FramePose, InterpolationEngine, InterpolationStats, NetworkEntity, frame_pose, interpolate,
};
pub use outgoing::{OutgoingChannel, RateLimiter};
