mod session;
mod ui;

use bounce::message::BallState;
use session::{Endpoint, Event, Session};
use std::sync::Arc;
use tokio::sync::mpsc;
use ui::{StatusSink, TermSink};

fn init_logging() {
    const LOG_ENV: &str = "RUST_LOG";
    use std::str::FromStr;
    use tracing::Level;
    use tracing_subscriber::EnvFilter;

    let filter = std::env::var(LOG_ENV)
        .map(|env| {
            EnvFilter::from_str(env.to_uppercase().as_str())
                .unwrap_or_else(|err| panic!("invalid `{}` environment variable {}", LOG_ENV, err))
        })
        .unwrap_or(EnvFilter::default().add_directive(Level::INFO.into()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| String::from("localhost"));
    let port = args.next().unwrap_or_else(|| bounce::PORT.to_string());
    if !ui::can_request(&host, &port) {
        eprintln!("usage: bounce-client [host] [port]");
        std::process::exit(2);
    }
    let endpoint = Endpoint::new(host, port.parse::<u16>()?);

    let sink = Arc::new(TermSink::new());
    let (session, events) = match Session::connect(&endpoint, sink.clone()).await {
        Ok(connected) => connected,
        Err(err) => {
            if let Some(text) = err.user_message() {
                sink.status(&text);
            }
            sink.set_request_enabled(true);
            return Err(err.into());
        }
    };

    let run_task = {
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(err) = session.run().await {
                tracing::error!(%err, "session ended");
            }
        })
    };

    let event_task = {
        let session = session.clone();
        tokio::spawn(async move { print_events(session, events).await })
    };

    let input_task = {
        let sink = sink.clone();
        tokio::spawn(async move { read_input(session, sink).await.unwrap() })
    };

    tokio::select! {
        value = run_task => value.unwrap(),
        value = event_task => value.unwrap(),
        value = input_task => value.unwrap(),
    };
    Ok(())
}

async fn print_events(session: Session, mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            Event::BallReady => tracing::info!("ball ready"),
            Event::WallsReady => {
                for wall in session.walls() {
                    tracing::info!(%wall, "wall ready");
                }
            }
        }
    }
}

async fn read_input(
    session: Session,
    sink: Arc<TermSink>,
) -> Result<(), Box<dyn std::error::Error>> {
    let term = console::Term::stdout();
    loop {
        let line = term.read_line()?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("walls") => {
                if !sink.request_enabled() {
                    term.write_line("request pending, try again once a frame arrives")?;
                    continue;
                }
                for wall in session.walls() {
                    term.write_line(&wall)?;
                }
            }
            Some("ball") => {
                let numbers: Vec<f64> = words.filter_map(|word| word.parse().ok()).collect();
                if numbers.len() != 6 {
                    term.write_line("usage: ball <x> <y> <vx> <vy> <ax> <ay>")?;
                    continue;
                }
                let ball = BallState {
                    position: (numbers[0], numbers[1]),
                    velocity: (numbers[2], numbers[3]),
                    acceleration: (numbers[4], numbers[5]),
                };
                session.send_ball(&ball).await?;
            }
            Some("quit") => std::process::exit(0),
            _ => {
                term.write_line("commands: walls, ball <x y vx vy ax ay>, quit")?;
            }
        }
    }
}
