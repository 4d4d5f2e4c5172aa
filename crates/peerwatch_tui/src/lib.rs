use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use peerwatch_core::{
    short_peer_id, Clipboard, Direction as TransferDirection, Fault, NotificationKind,
    PeerClient, PeerwatchError, Result, SendProgressMap, Snapshot, SystemClipboard,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Peers,
    Messages,
    Files,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Peers => Focus::Messages,
            Focus::Messages => Focus::Files,
            Focus::Files => Focus::Peers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Connect,
    Message,
    FilePath,
}

impl Prompt {
    fn label(self) -> &'static str {
        match self {
            Prompt::Connect => "Connect to",
            Prompt::Message => "Message",
            Prompt::FilePath => "File to send",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub prompt: Prompt,
    pub buffer: String,
}

/// Something the key handler wants done against the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(String),
    Broadcast(String),
    SelectFile(Option<PathBuf>),
    Send(String),
    Download(String),
    CopyAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStatus {
    Connecting,
    Connected { peer_count: usize },
    Error(String),
}

impl AppStatus {
    /// `synced` is whether any read from the node has succeeded yet. An empty
    /// node never changes the snapshot, so the revision can't stand in for it.
    pub fn of(snapshot: &Snapshot, synced: bool) -> Self {
        if let Some(fault) = &snapshot.connectivity_fault {
            return AppStatus::Error(fault.message().to_string());
        }
        if !synced {
            return AppStatus::Connecting;
        }
        AppStatus::Connected {
            peer_count: snapshot.peers.len(),
        }
    }
}

pub struct App {
    pub client: Arc<PeerClient>,
    pub should_quit: bool,
    pub focus: Focus,
    pub peer_index: usize,
    pub file_index: usize,
    pub input: Option<Input>,
    pub clipboard: Option<Arc<dyn Clipboard>>,
}

impl App {
    pub fn new(client: Arc<PeerClient>) -> Self {
        Self {
            client,
            should_quit: false,
            focus: Focus::Peers,
            peer_index: 0,
            file_index: 0,
            input: None,
            clipboard: None,
        }
    }

    /// Attach the system clipboard. Without one, copying the address is
    /// reported as a failed action.
    pub fn with_system_clipboard(mut self) -> Self {
        match SystemClipboard::new() {
            Ok(clipboard) => self.clipboard = Some(Arc::new(clipboard)),
            Err(e) => warn!("Clipboard unavailable: {}", e),
        }
        self
    }

    /// Update UI state for one key press. Work against the node is returned
    /// rather than performed so the caller decides how to run it.
    pub fn handle_key(&mut self, code: KeyCode, snapshot: &Snapshot) -> Option<Command> {
        if self.input.is_some() {
            return self.handle_input(code);
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::Up => self.move_selection(-1, snapshot),
            KeyCode::Down => self.move_selection(1, snapshot),
            KeyCode::Char('c') => self.open_prompt(Prompt::Connect, String::new()),
            KeyCode::Char('m') => self.open_prompt(Prompt::Message, String::new()),
            KeyCode::Char('f') => {
                let current = self
                    .client
                    .selected_file()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                self.open_prompt(Prompt::FilePath, current);
            }
            KeyCode::Char('s') => {
                let peer = snapshot.peers.get(self.peer_index)?;
                return Some(Command::Send(peer.id.clone()));
            }
            KeyCode::Char('y') => {
                let addr = snapshot.local_addr.clone()?;
                return Some(Command::CopyAddress(addr));
            }
            KeyCode::Enter if self.focus == Focus::Files => {
                let file = snapshot.files.get(self.file_index)?;
                return Some(Command::Download(file.name.clone()));
            }
            _ => {}
        }
        None
    }

    fn handle_input(&mut self, code: KeyCode) -> Option<Command> {
        match code {
            KeyCode::Esc => self.input = None,
            KeyCode::Backspace => {
                if let Some(input) = self.input.as_mut() {
                    input.buffer.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(input) = self.input.as_mut() {
                    input.buffer.push(c);
                }
            }
            KeyCode::Enter => {
                let Input { prompt, buffer } = self.input.take()?;
                return Some(match prompt {
                    Prompt::Connect => Command::Connect(buffer),
                    Prompt::Message => Command::Broadcast(buffer),
                    Prompt::FilePath => {
                        let path = buffer.trim();
                        Command::SelectFile((!path.is_empty()).then(|| PathBuf::from(path)))
                    }
                });
            }
            _ => {}
        }
        None
    }

    fn open_prompt(&mut self, prompt: Prompt, buffer: String) {
        self.input = Some(Input { prompt, buffer });
    }

    fn move_selection(&mut self, delta: isize, snapshot: &Snapshot) {
        let (index, len) = match self.focus {
            Focus::Peers => (&mut self.peer_index, snapshot.peers.len()),
            Focus::Files => (&mut self.file_index, snapshot.files.len()),
            Focus::Messages => return,
        };
        if len == 0 {
            *index = 0;
            return;
        }
        *index = index.saturating_add_signed(delta).min(len - 1);
    }

    // Lists shrink between polls; keep selections in range.
    fn clamp_selection(&mut self, snapshot: &Snapshot) {
        self.peer_index = self.peer_index.min(snapshot.peers.len().saturating_sub(1));
        self.file_index = self.file_index.min(snapshot.files.len().saturating_sub(1));
    }

    fn dispatch(&self, command: Command) {
        let client = Arc::clone(&self.client);
        match command {
            Command::SelectFile(path) => client.select_file(path),
            Command::Connect(addr) => {
                tokio::spawn(async move {
                    if let Err(e) = client.connect(&addr).await {
                        debug!("Connect from UI failed: {}", e);
                    }
                });
            }
            Command::Broadcast(message) => {
                tokio::spawn(async move {
                    if let Err(e) = client.broadcast(&message).await {
                        debug!("Broadcast from UI failed: {}", e);
                    }
                });
            }
            Command::Send(peer_id) => {
                if !client.tracker().can_send(&peer_id) {
                    debug!("Send to {} ignored, upload in progress", peer_id);
                    return;
                }
                tokio::spawn(async move {
                    if let Err(e) = client.send_selected(&peer_id).await {
                        debug!("Send from UI failed: {}", e);
                    }
                });
            }
            Command::Download(name) => {
                tokio::spawn(async move {
                    if let Err(e) = client.download(&name, None).await {
                        debug!("Download from UI failed: {}", e);
                    }
                });
            }
            Command::CopyAddress(addr) => {
                let clipboard = self.clipboard.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.copy_address(&addr, clipboard.as_deref()).await {
                        debug!("Copy from UI failed: {}", e);
                    }
                });
            }
        }
    }
}

pub async fn run_tui(app: App) -> Result<()> {
    enable_raw_mode()
        .map_err(|e| PeerwatchError::Other(format!("Failed to enable raw mode: {}", e)))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .map_err(|e| PeerwatchError::Other(format!("Failed to setup terminal: {}", e)))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)
        .map_err(|e| PeerwatchError::Other(format!("Failed to create terminal: {}", e)))?;

    let res = run_app(&mut terminal, app).await;

    disable_raw_mode()
        .map_err(|e| PeerwatchError::Other(format!("Failed to disable raw mode: {}", e)))?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .map_err(|e| PeerwatchError::Other(format!("Failed to cleanup terminal: {}", e)))?;
    terminal
        .show_cursor()
        .map_err(|e| PeerwatchError::Other(format!("Failed to show cursor: {}", e)))?;

    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let poller = app.client.start_polling();

    loop {
        let snapshot = app.client.snapshot();
        app.clamp_selection(&snapshot);
        let sends = app.client.tracker().progress();

        terminal
            .draw(|f| draw_ui(f, &app, &snapshot, &sends))
            .map_err(|e| PeerwatchError::Other(format!("Failed to draw: {}", e)))?;

        if event::poll(std::time::Duration::from_millis(100))
            .map_err(|e| PeerwatchError::Other(format!("Failed to poll events: {}", e)))?
        {
            if let Event::Key(key) = event::read()
                .map_err(|e| PeerwatchError::Other(format!("Failed to read event: {}", e)))?
            {
                if key.kind == KeyEventKind::Press {
                    if let Some(command) = app.handle_key(key.code, &snapshot) {
                        app.dispatch(command);
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
        tokio::task::yield_now().await;
    }

    poller.stop().await;
    Ok(())
}

fn draw_ui(f: &mut Frame<'_>, app: &App, snapshot: &Snapshot, sends: &SendProgressMap) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(8),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(f.size());

    draw_header(f, chunks[0], app, snapshot);
    draw_main_content(f, chunks[1], app, snapshot, sends);
    draw_notification(f, chunks[2], app, snapshot);
    draw_footer(f, chunks[3], app);
}

fn draw_header(f: &mut Frame<'_>, area: Rect, app: &App, snapshot: &Snapshot) {
    let last_synced = app.client.reconciler().last_synced();
    let (status_text, status_color) = match AppStatus::of(snapshot, last_synced.is_some()) {
        AppStatus::Connecting => ("Connecting...".to_string(), Color::Yellow),
        AppStatus::Connected { peer_count } => {
            (format!("Connected ({} peers)", peer_count), Color::Green)
        }
        AppStatus::Error(err) => (err, Color::Red),
    };
    let synced = last_synced
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "never".to_string());
    let backend = app
        .client
        .location()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let header = Paragraph::new(vec![
        Line::from(vec![
            Span::raw("Node: "),
            Span::styled(
                snapshot.local_addr.as_deref().unwrap_or("Loading..."),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled(
                status_text,
                Style::default()
                    .fg(status_color)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  backend {}  last sync {}", backend, synced),
                Style::default().fg(Color::Gray),
            ),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Peerwatch"));

    f.render_widget(header, area);
}

fn draw_main_content(
    f: &mut Frame<'_>,
    area: Rect,
    app: &App,
    snapshot: &Snapshot,
    sends: &SendProgressMap,
) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(columns[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(columns[1]);

    draw_peers(f, left[0], app, snapshot, sends);
    draw_transfers(f, left[1], snapshot);
    draw_messages(f, right[0], app, snapshot);
    draw_files(f, right[1], app, snapshot);
}

fn pane(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn draw_peers(
    f: &mut Frame<'_>,
    area: Rect,
    app: &App,
    snapshot: &Snapshot,
    sends: &SendProgressMap,
) {
    let items: Vec<ListItem> = snapshot
        .peers
        .iter()
        .map(|peer| {
            let mut lines = vec![Line::from(vec![
                Span::styled("●", Style::default().fg(Color::Green)),
                Span::raw(" "),
                Span::raw(short_peer_id(&peer.id)),
            ])];
            for addr in &peer.addresses {
                lines.push(Line::from(Span::styled(
                    format!("  {}", addr),
                    Style::default().fg(Color::Gray),
                )));
            }
            if let Some(send) = sends.get(&peer.id) {
                lines.push(Line::from(Span::styled(
                    format!("  {}: {}", send.file_name, send_label(send.percent)),
                    Style::default().fg(Color::Yellow),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(pane("Peers", app.focus == Focus::Peers))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if !snapshot.peers.is_empty() {
        state.select(Some(app.peer_index));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_transfers(f: &mut Frame<'_>, area: Rect, snapshot: &Snapshot) {
    let items: Vec<ListItem> = snapshot
        .transfers
        .values()
        .map(|t| {
            let arrow = match t.direction {
                TransferDirection::Sending => "→",
                TransferDirection::Receiving => "←",
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} {} ", arrow, t.key)),
                Span::styled(short_peer_id(&t.peer), Style::default().fg(Color::Gray)),
                Span::raw(format!(" {:.1}%", t.percent)),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Transfers"));
    f.render_widget(list, area);
}

fn draw_messages(f: &mut Frame<'_>, area: Rect, app: &App, snapshot: &Snapshot) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = snapshot.messages.len().saturating_sub(visible);
    let lines: Vec<Line> = snapshot
        .messages
        .iter()
        .skip(skip)
        .map(|msg| {
            let (author, color) = message_author(snapshot, &msg.from);
            Line::from(vec![
                Span::styled(
                    format!("{}: ", author),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(msg.content.as_str()),
            ])
        })
        .collect();

    let messages = Paragraph::new(lines)
        .block(pane("Messages", app.focus == Focus::Messages))
        .wrap(Wrap { trim: false });
    f.render_widget(messages, area);
}

fn draw_files(f: &mut Frame<'_>, area: Rect, app: &App, snapshot: &Snapshot) {
    let items: Vec<ListItem> = snapshot
        .files
        .iter()
        .map(|file| {
            let mut lines = vec![Line::from(vec![
                Span::raw(file.name.as_str()),
                Span::styled(
                    format!(" ({})", format_size(file.size)),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(
                    format!(" from {}", short_peer_id(&file.from)),
                    Style::default().fg(Color::Gray),
                ),
            ])];
            if let Some(percent) = receive_percent(snapshot, &file.name) {
                lines.push(Line::from(Span::styled(
                    format!("  Downloading file... Receiving: {:.1}%", percent),
                    Style::default().fg(Color::Yellow),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(pane("Files", app.focus == Focus::Files))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if !snapshot.files.is_empty() {
        state.select(Some(app.file_index));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_notification(f: &mut Frame<'_>, area: Rect, app: &App, snapshot: &Snapshot) {
    let line = if let Some(fault) = &snapshot.action_fault {
        Line::from(Span::styled(
            fault_text(fault),
            Style::default().fg(Color::Red),
        ))
    } else if let Some(notification) = app.client.notifications().current() {
        let color = match notification.kind {
            NotificationKind::Success => Color::Green,
            NotificationKind::Info => Color::Cyan,
        };
        Line::from(Span::styled(notification.message, Style::default().fg(color)))
    } else {
        Line::from("")
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, app: &App) {
    let text = match &app.input {
        Some(input) => format!("{}: {}_", input.prompt.label(), input.buffer),
        None => {
            let file = app
                .client
                .selected_file()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "none".to_string());
            format!(
                "q quit  Tab focus  ↑/↓ select  c connect  m message  f file ({})  s send  Enter download  y copy addr",
                file
            )
        }
    };
    let footer =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Controls"));

    f.render_widget(footer, area);
}

/// Label for our own upload to a peer.
pub fn send_label(percent: f64) -> String {
    if percent >= 100.0 {
        "Complete".to_string()
    } else {
        format!("Uploading file... Sending: {:.1}%", percent)
    }
}

pub fn message_author(snapshot: &Snapshot, from: &str) -> (String, Color) {
    if snapshot.is_local(from) {
        ("You".to_string(), Color::Cyan)
    } else {
        (short_peer_id(from), Color::Magenta)
    }
}

/// Progress of a file still arriving, if any.
pub fn receive_percent(snapshot: &Snapshot, name: &str) -> Option<f64> {
    snapshot
        .transfers
        .get(name)
        .filter(|t| t.direction == TransferDirection::Receiving && t.percent < 100.0)
        .map(|t| t.percent)
}

pub fn format_size(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

fn fault_text(fault: &Fault) -> String {
    match fault {
        Fault::Action { action, message } => format!("{} failed: {}", action, message),
        other => other.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerwatch_core::{
        FileRecord, MockNodeApi, Peer, PeerwatchConfig, TransferProgress,
    };

    fn app() -> App {
        let client = PeerClient::new(PeerwatchConfig::default(), Arc::new(MockNodeApi::default()));
        App::new(Arc::new(client))
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            revision: 3,
            local_addr: Some("/ip4/127.0.0.1/tcp/4001/p2p/QmSelf".to_string()),
            peers: vec![
                Peer {
                    id: "QmAAAAAAAAAAAAAA".to_string(),
                    addresses: vec![],
                },
                Peer {
                    id: "QmBBBBBBBBBBBBBB".to_string(),
                    addresses: vec![],
                },
            ],
            files: vec![FileRecord {
                name: "report.pdf".to_string(),
                from: "QmAAAAAAAAAAAAAA".to_string(),
                size: 2048,
            }],
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_prompt_submits_command() {
        let mut app = app();
        let snapshot = snapshot();

        assert_eq!(app.handle_key(KeyCode::Char('m'), &snapshot), None);
        for c in "hi".chars() {
            app.handle_key(KeyCode::Char(c), &snapshot);
        }
        app.handle_key(KeyCode::Char('!'), &snapshot);
        app.handle_key(KeyCode::Backspace, &snapshot);

        assert_eq!(
            app.handle_key(KeyCode::Enter, &snapshot),
            Some(Command::Broadcast("hi".to_string()))
        );
        assert!(app.input.is_none());
        assert!(!app.should_quit);
    }

    #[test]
    fn test_q_types_into_prompt_instead_of_quitting() {
        let mut app = app();
        let snapshot = snapshot();

        app.handle_key(KeyCode::Char('c'), &snapshot);
        app.handle_key(KeyCode::Char('q'), &snapshot);
        assert!(!app.should_quit);
        assert_eq!(app.input.as_ref().map(|i| i.buffer.as_str()), Some("q"));

        app.handle_key(KeyCode::Esc, &snapshot);
        assert!(app.input.is_none());
        app.handle_key(KeyCode::Char('q'), &snapshot);
        assert!(app.should_quit);
    }

    #[test]
    fn test_selection_and_send() {
        let mut app = app();
        let snapshot = snapshot();

        app.handle_key(KeyCode::Down, &snapshot);
        app.handle_key(KeyCode::Down, &snapshot);
        assert_eq!(app.peer_index, 1);
        assert_eq!(
            app.handle_key(KeyCode::Char('s'), &snapshot),
            Some(Command::Send("QmBBBBBBBBBBBBBB".to_string()))
        );

        app.handle_key(KeyCode::Up, &snapshot);
        app.handle_key(KeyCode::Up, &snapshot);
        assert_eq!(app.peer_index, 0);
    }

    #[test]
    fn test_enter_downloads_only_in_files_pane() {
        let mut app = app();
        let snapshot = snapshot();

        assert_eq!(app.handle_key(KeyCode::Enter, &snapshot), None);
        app.handle_key(KeyCode::Tab, &snapshot);
        app.handle_key(KeyCode::Tab, &snapshot);
        assert_eq!(app.focus, Focus::Files);
        assert_eq!(
            app.handle_key(KeyCode::Enter, &snapshot),
            Some(Command::Download("report.pdf".to_string()))
        );
    }

    #[test]
    fn test_blank_file_path_clears_selection() {
        let mut app = app();
        let snapshot = snapshot();

        app.handle_key(KeyCode::Char('f'), &snapshot);
        app.handle_key(KeyCode::Char(' '), &snapshot);
        assert_eq!(
            app.handle_key(KeyCode::Enter, &snapshot),
            Some(Command::SelectFile(None))
        );
    }

    #[test]
    fn test_clamp_after_list_shrinks() {
        let mut app = app();
        app.peer_index = 5;
        app.file_index = 2;
        app.clamp_selection(&Snapshot::default());
        assert_eq!((app.peer_index, app.file_index), (0, 0));
    }

    #[test]
    fn test_copy_address_key() {
        let mut app = app();
        assert_eq!(
            app.handle_key(KeyCode::Char('y'), &snapshot()),
            Some(Command::CopyAddress(
                "/ip4/127.0.0.1/tcp/4001/p2p/QmSelf".to_string()
            ))
        );
        assert_eq!(app.handle_key(KeyCode::Char('y'), &Snapshot::default()), None);
        assert!(app.clipboard.is_none());
    }

    #[test]
    fn test_status() {
        assert_eq!(
            AppStatus::of(&Snapshot::default(), false),
            AppStatus::Connecting
        );
        assert_eq!(
            AppStatus::of(&snapshot(), true),
            AppStatus::Connected { peer_count: 2 }
        );
        let failing = Snapshot {
            connectivity_fault: Some(Fault::Connectivity("down".to_string())),
            ..snapshot()
        };
        assert_eq!(
            AppStatus::of(&failing, true),
            AppStatus::Error("down".to_string())
        );
    }

    #[test]
    fn test_empty_node_is_connected_once_synced() {
        let app = app();
        app.client.reconciler().apply_peers(Vec::new());

        let snapshot = app.client.snapshot();
        assert_eq!(snapshot.revision, 0);
        assert_eq!(
            AppStatus::of(&snapshot, app.client.reconciler().last_synced().is_some()),
            AppStatus::Connected { peer_count: 0 }
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(send_label(42.5), "Uploading file... Sending: 42.5%");
        assert_eq!(send_label(100.0), "Complete");
        assert_eq!(format_size(2048), "2.00 KB");

        let snapshot = snapshot();
        assert_eq!(message_author(&snapshot, "QmSelf").0, "You");
        assert_eq!(
            message_author(&snapshot, "QmAAAAAAAAAAAAAA").0,
            "QmAAAA...AAAA"
        );
    }

    #[test]
    fn test_receive_percent_ignores_outbound() {
        let mut snapshot = snapshot();
        snapshot.transfers.insert(
            "report.pdf".to_string(),
            TransferProgress {
                key: "report.pdf".to_string(),
                percent: 30.0,
                direction: TransferDirection::Receiving,
                peer: "QmAAAAAAAAAAAAAA".to_string(),
            },
        );
        snapshot.transfers.insert(
            "mine.txt".to_string(),
            TransferProgress {
                key: "mine.txt".to_string(),
                percent: 30.0,
                direction: TransferDirection::Sending,
                peer: "QmSelf".to_string(),
            },
        );
        assert_eq!(receive_percent(&snapshot, "report.pdf"), Some(30.0));
        assert_eq!(receive_percent(&snapshot, "mine.txt"), None);
    }
}
