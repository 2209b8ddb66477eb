use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use hopper::{DEFAULT_PORT, UdpConfig, UdpTransport};
use hopper_client::{
    ClientConfig, ClientGame, ConnectionState, InputState, NetworkClient, SceneGraph, ScriptedInput,
};

#[derive(Parser)]
#[command(name = "hopper-client")]
#[command(about = "Headless Hopper client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1", help = "Server host")]
    host: IpAddr,

    #[arg(short, long, default_value_t = DEFAULT_PORT, help = "Server port")]
    port: u16,

    #[arg(long, help = "Drive the player with scripted input")]
    bot: bool,

    #[arg(long, help = "Exit after this many frames")]
    frames: Option<u64>,

    #[arg(
        long,
        default_value_t = 100,
        help = "Server tick period in ms, must match the server's --tick-ms"
    )]
    tick_ms: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = SocketAddr::new(args.host, args.port);
    if args.tick_ms == 0 {
        anyhow::bail!("--tick-ms must be non-zero");
    }
    let config = ClientConfig {
        tick_period: Duration::from_millis(args.tick_ms),
        ..Default::default()
    };

    let (transport, server_peer) = UdpTransport::connect(server, UdpConfig::default())?;
    log::info!("Connecting to {server}");

    let frame_duration = config.frame_duration();
    let status_every = u64::from(config.frame_rate.max(1));
    let network = NetworkClient::new(transport, server_peer, config);
    let mut game = ClientGame::new(network, SceneGraph::new());
    let mut bot = ScriptedInput::new();
    let mut warned_overdue = false;

    loop {
        let started = hopper::time::now();
        if args.frames.is_some_and(|limit| game.frames() >= limit) {
            break;
        }

        let input = if args.bot {
            bot.next_input()
        } else {
            InputState::default()
        };
        game.frame(&input, frame_duration.as_secs_f32(), started)?;

        if game.network().is_overdue() && !warned_overdue {
            log::warn!("No welcome from {server} yet");
            warned_overdue = true;
        }
        if game.network().state() == ConnectionState::Disconnected {
            log::info!("Disconnected, exiting");
            break;
        }

        if game.frames() % status_every == 0 {
            let player = game.player();
            let remote = game.remote().stats();
            log::info!(
                "pos={:.2} yaw={:.2} remote={} (interp {}, held {}) rtt={:?}",
                player.position(),
                player.rotation(),
                remote.tracked,
                remote.interpolated,
                remote.held,
                game.network().round_trip_time(),
            );
        }

        let spent = hopper::time::elapsed_since(started);
        std::thread::sleep(hopper::time::remaining(frame_duration, spent));
    }

    game.network_mut().disconnect();
    // Give the disconnect datagrams a moment to leave.
    std::thread::sleep(Duration::from_millis(50));
    Ok(())
}
