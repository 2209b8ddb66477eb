use std::io;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use hopper::{MAX_ENTITIES, UdpConfig, UdpTransport};
use hopper_server::tui::{self, TuiState};
use hopper_server::{GameServer, ServerConfig};

#[derive(Parser)]
#[command(name = "hopper-server")]
#[command(about = "Hopper authoritative game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(short, long, default_value_t = hopper::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 100, help = "Simulation tick period in ms")]
    tick_ms: u64,

    #[arg(long, default_value_t = MAX_ENTITIES, help = "Entity slots, at most the protocol limit")]
    max_entities: usize,

    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServerConfig::new(Duration::from_millis(args.tick_ms), args.max_entities);
    config.validate()?;
    let transport = UdpTransport::bind((args.bind, args.port), UdpConfig::default())?;
    let mut server = GameServer::new(transport, config);

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Server started on {}", server.local_addr()?);
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer<UdpTransport>) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!("Server started on {}", server.local_addr()?));

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            tui_state.log_event(&event);
        }

        // Keys are read after the tick, so the loop stays near tick rate.
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        running.store(false, Ordering::SeqCst);
                    }
                    KeyCode::Tab => tui_state.next_tab(),
                    KeyCode::BackTab => tui_state.prev_tab(),
                    KeyCode::PageUp => tui_state.scroll_up(),
                    KeyCode::PageDown => tui_state.scroll_down(),
                    KeyCode::End => tui_state.scroll_to_bottom(),
                    _ => {}
                }
            }
        }

        let stats = server.stats();
        let entities = server.entity_infos();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &entities);
        })?;
    }

    tui_state.log_warn("Shutting down...");
    server.shutdown_connections();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
