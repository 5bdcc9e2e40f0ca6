use std::io;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;

use assistant_session::AssistantSession;
use assistant_session_mock::MockSession;
use coder_relay::{
    init_tracing, CoderRelay, ConnectionMonitor, ConnectionState, ConsoleSink, Dispatcher,
    InputGate, NoticeLevel, RelayConfig, StderrConsole,
};
use coder_relay_server::{run_console, serve, spawn_stdin_reader, ConsoleExit, PeerRegistry};
use tokio::net::TcpListener;

fn main() -> io::Result<()> {
    let config = RelayConfig::from_env();
    init_tracing(&config.log_filter);

    let dispatcher = Dispatcher::spawn()?;
    let dispatcher_handle = dispatcher.handle();

    let peers = Arc::new(PeerRegistry::default());
    let connection = ConnectionState::default();
    let session: Arc<dyn AssistantSession> = Arc::new(MockSession::default());
    let relay = Arc::new(CoderRelay::new(
        Some(dispatcher_handle.clone()),
        Arc::clone(&peers) as _,
        connection.clone(),
        session,
    ));

    let listener = StdTcpListener::bind(config.listen_addr())?;
    listener.set_nonblocking(true)?;
    {
        let peers = Arc::clone(&peers);
        let relay = Arc::clone(&relay);
        dispatcher_handle.spawn(async move {
            match TcpListener::from_std(listener) {
                Ok(listener) => serve(listener, peers, relay).await,
                Err(error) => tracing::warn!(%error, "failed to register listener"),
            }
        });
    }

    let console: Arc<dyn ConsoleSink> = Arc::new(StderrConsole);
    console.notice(
        NoticeLevel::Info,
        &format!("Listening for front-ends at {}", config.server_uri),
    );

    let monitor = ConnectionMonitor::spawn(
        Arc::clone(&peers) as _,
        connection.clone(),
        Arc::clone(&console),
        config.server_uri.clone(),
        config.monitor_interval,
    )?;
    let gate = InputGate::new(
        connection,
        Arc::clone(&console),
        config.server_uri.clone(),
        config.console_poll,
    );
    let _interrupt_guard = gate.install_interrupt_handler()?;
    let lines = spawn_stdin_reader()?;

    let exit = run_console(&gate, &relay, console.as_ref(), &lines);
    if exit == ConsoleExit::InputClosed {
        console.notice(NoticeLevel::Info, "Input closed, exiting...");
    }

    if relay.executor().active_run().is_some() {
        let _ = relay.cancel();
    }
    monitor.stop();
    dispatcher.shutdown();
    Ok(())
}
