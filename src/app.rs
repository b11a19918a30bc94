use anyhow::Result;
use chrono::{NaiveDate, Utc};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::feed::{BackfillRequest, FeedView, Message, MessageSyncEngine, ScrollPaginator, Viewport};
use crate::relay::{
    AddressResolver, CsvRelayDirectory, HttpRelayNode, Identity, IdentityResolver,
    ConnectionState, LocalIdentityResolver, RelayConnector, RelayDirectory, RelayNode,
};

const PAGE_SCROLL: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    /// Why the last connection attempt gave up, if it did.
    pub connection_error: Option<String>,
    pub input_mode: InputMode,
    pub input: String,
    pub cursor_position: usize,
    pub scroll_offset: u32,
    pub status_messages: Vec<String>,

    pub view: FeedView,
    pub paginator: ScrollPaginator,
    pub engine: MessageSyncEngine,
    /// Echoes the node did not sign; they live here until the next reload.
    outbox: Vec<Message>,
    viewport: Viewport,

    resolver: AddressResolver,
    connector: RelayConnector,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let node = Arc::new(HttpRelayNode::new(&config.node_url)?);
        let directory = Arc::new(CsvRelayDirectory::new(config.directory_url.clone()));
        Self::with_collaborators(config, node, directory, Arc::new(LocalIdentityResolver::new()))
            .await
    }

    pub async fn with_collaborators(
        config: &Config,
        node: Arc<dyn RelayNode>,
        directory: Arc<dyn RelayDirectory>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        let connector = RelayConnector::new(node.clone())
            .with_retry_policy(config.connect_attempts, config.retry_delay());
        let paginator = ScrollPaginator::new(Utc::now()).with_limits(
            config.backfill_rounds,
            config.backfill_step(),
            config.scroll_threshold,
        );
        let view = FeedView {
            sort_by_newest: config.sort_by_newest,
            date: None,
        };

        // the node's key is local state, readable before any relay is up
        let mut startup = vec![format!("librx v{}", env!("CARGO_PKG_VERSION"))];
        let public_key = match node.public_key().await {
            Ok(key) => key,
            Err(e) => {
                startup.push(format!("Could not read node identity: {:#}", e));
                String::new()
            }
        };
        let author = Identity::resolve(identities.as_ref(), &public_key).await;
        startup.push(format!("Posting as {}", author.alias));

        let mut app = Self {
            should_quit: false,
            connection_error: None,
            input_mode: InputMode::Normal,
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,
            status_messages: Vec::new(),

            view,
            paginator,
            engine: MessageSyncEngine::new(node, identities, author, config.community.clone()),
            outbox: Vec::new(),
            viewport: Viewport::default(),

            resolver: AddressResolver::new(directory),
            connector,
        };

        for line in startup {
            app.add_status_message(line);
        }
        app.connect().await;
        app.reload().await;
        Ok(app)
    }

    pub async fn handle_input(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Key(key) => self.handle_key_event(key).await?,
            Event::Resize(_, _) => self.paginator.viewport_resized(),
            _ => {}
        }
        Ok(())
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('r') {
            self.reload().await;
            return Ok(());
        }

        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Char('i') => {
                    self.input_mode = InputMode::Editing;
                }
                KeyCode::Up => self.scroll_up(1).await,
                KeyCode::Down => self.scroll_down(1).await,
                KeyCode::PageUp => self.scroll_up(PAGE_SCROLL).await,
                KeyCode::PageDown => self.scroll_down(PAGE_SCROLL).await,
                _ => {}
            },
            InputMode::Editing => match key.code {
                KeyCode::Enter => {
                    self.submit_input().await?;
                    self.input.clear();
                    self.cursor_position = 0;
                    self.input_mode = InputMode::Normal;
                }
                KeyCode::Char(c) => {
                    self.input.insert(self.cursor_position, c);
                    self.cursor_position += c.len_utf8();
                }
                KeyCode::Backspace => {
                    if let Some(c) = self.input[..self.cursor_position].chars().next_back() {
                        self.cursor_position -= c.len_utf8();
                        self.input.remove(self.cursor_position);
                    }
                }
                KeyCode::Delete => {
                    if self.cursor_position < self.input.len() {
                        self.input.remove(self.cursor_position);
                    }
                }
                KeyCode::Left => {
                    if let Some(c) = self.input[..self.cursor_position].chars().next_back() {
                        self.cursor_position -= c.len_utf8();
                    }
                }
                KeyCode::Right => {
                    if let Some(c) = self.input[self.cursor_position..].chars().next() {
                        self.cursor_position += c.len_utf8();
                    }
                }
                KeyCode::Home => {
                    self.cursor_position = 0;
                }
                KeyCode::End => {
                    self.cursor_position = self.input.len();
                }
                KeyCode::Esc => {
                    self.input.clear();
                    self.cursor_position = 0;
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            },
        }
        Ok(())
    }

    async fn submit_input(&mut self) -> Result<()> {
        let input = self.input.trim().to_string();
        if input.is_empty() {
            return Ok(());
        }

        if input.starts_with('/') {
            self.handle_command(&input).await?;
        } else {
            self.send_message(&input).await;
        }

        Ok(())
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<()> {
        let parts: Vec<&str> = input[1..].split_whitespace().collect();
        if parts.is_empty() {
            return Ok(());
        }

        match parts[0].to_lowercase().as_str() {
            "join" | "j" => {
                if parts.len() != 2 {
                    self.add_status_message("Usage: /join <community>".to_string());
                    return Ok(());
                }
                self.join_community(parts[1]).await;
            }
            "reload" | "r" => {
                self.reload().await;
            }
            "connect" => {
                self.connect().await;
            }
            "sort" => {
                self.view.sort_by_newest = !self.view.sort_by_newest;
                self.scroll_offset = 0;
                self.add_status_message(format!(
                    "Sorting {} first",
                    if self.view.sort_by_newest { "newest" } else { "oldest" }
                ));
            }
            "date" => match parts.get(1) {
                Some(&"clear") => {
                    self.view.date = None;
                    self.add_status_message("Date filter cleared".to_string());
                }
                Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(date) => {
                        self.view.date = Some(date);
                        self.scroll_offset = 0;
                        self.add_status_message(format!("Showing messages from {}", date));
                    }
                    Err(_) => {
                        self.add_status_message(format!("Invalid date: {}", raw));
                    }
                },
                None => {
                    self.add_status_message("Usage: /date <YYYY-MM-DD|clear>".to_string());
                }
            },
            "help" | "h" | "commands" => {
                self.show_help();
            }
            "quit" | "q" | "exit" => {
                self.should_quit = true;
            }
            _ => {
                self.add_status_message(format!(
                    "Unknown command: {}. Type /help for available commands.",
                    parts[0]
                ));
            }
        }

        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connector.state()
    }

    /// Resolve relay addresses and drive the connector until it settles.
    /// Coming back from a failed connection reloads the feed.
    pub async fn connect(&mut self) {
        let recovering = self.connector.state() == ConnectionState::Failed;
        let addresses = self.resolver.resolve().await;
        if addresses.is_empty() {
            self.add_status_message("No relay addresses available".to_string());
        }

        let result = self.connector.ensure_connected(&addresses).await;
        match result.error() {
            None => {
                self.connection_error = None;
                self.add_status_message(format!(
                    "Connected after {} attempt(s)",
                    result.attempts
                ));
                if recovering {
                    self.reload().await;
                }
            }
            Some(e) => {
                self.connection_error = Some(e.to_string());
                self.add_status_message(e.to_string());
            }
        }
    }

    /// Drop everything shown and start again from the newest page.
    pub async fn reload(&mut self) {
        let now = Utc::now();
        self.paginator.reset(now);
        self.outbox.clear();
        self.scroll_offset = 0;

        let fetched = self.engine.fetch_and_merge(now, true).await;
        self.add_status_message(format!("Loaded {} message(s)", fetched.len()));
    }

    async fn join_community(&mut self, community_id: &str) {
        self.paginator.reset(Utc::now());
        self.outbox.clear();
        self.scroll_offset = 0;

        let fetched = self.engine.switch_community(community_id).await;
        self.add_status_message(format!(
            "Joined community #{} ({} message(s))",
            community_id,
            fetched.len()
        ));
    }

    pub async fn send_message(&mut self, content: &str) {
        let echo = self.engine.send(content).await;
        self.add_status_message(format!("Message {}", echo.status.label()));
        if echo.signature.is_empty() {
            self.outbox.push(echo);
        }
    }

    fn show_help(&mut self) {
        let help_text = [
            "librx commands:",
            "/join <community> - Switch to another community feed",
            "/reload - Reload the feed from the newest page",
            "/connect - Retry the relay connection",
            "/sort - Toggle newest/oldest first",
            "/date <YYYY-MM-DD|clear> - Only show one day",
            "/help - Show this help",
            "/quit - Exit",
            "",
            "Keyboard:",
            "i=input mode, Esc=normal mode, q=quit (normal mode)",
            "Up/Down=scroll, Page Up/Down=fast scroll, Ctrl+R=reload",
        ];

        for line in help_text {
            self.add_status_message(line.to_string());
        }
    }

    pub fn add_status_message(&mut self, message: String) {
        info!(target: "librx::status", "{}", message);
        self.status_messages.push(format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            message
        ));

        if self.status_messages.len() > 1000 {
            self.status_messages.remove(0);
        }
    }

    pub async fn on_tick(&mut self) -> Result<()> {
        let cached = self.engine.feed().len();
        if let Some(request) = self.paginator.poll_viewport(self.paging_viewport(), cached) {
            self.backfill(request).await;
        }
        Ok(())
    }

    /// Everything to display, cached and unsigned, in view order.
    pub fn feed(&self) -> Vec<Message> {
        let mut messages = self.engine.feed().snapshot();
        messages.extend(self.outbox.iter().cloned());
        self.view.apply(messages)
    }

    pub fn cached_count(&self) -> usize {
        self.engine.feed().len()
    }

    /// Layout result from the last draw.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }

    async fn scroll_up(&mut self, rows: u32) {
        self.scroll_offset = self.scroll_offset.saturating_sub(rows);
        self.after_scroll().await;
    }

    async fn scroll_down(&mut self, rows: u32) {
        self.scroll_offset = self.scroll_offset.saturating_add(rows).min(self.max_scroll());
        self.after_scroll().await;
    }

    async fn after_scroll(&mut self) {
        if let Some(request) = self.paginator.on_scroll(self.paging_viewport()) {
            self.backfill(request).await;
        }
    }

    async fn backfill(&mut self, request: BackfillRequest) {
        self.engine.fetch_and_merge(request.anchor, false).await;
        self.paginator.finish(self.engine.feed().len());
    }

    fn max_scroll(&self) -> u32 {
        self.viewport
            .content_height
            .saturating_sub(self.viewport.viewport_height)
    }

    /// The viewport as seen from the end where older messages sit.
    fn paging_viewport(&self) -> Viewport {
        let mut viewport = self.viewport;
        viewport.scroll_offset = if self.view.sort_by_newest {
            self.scroll_offset
        } else {
            // oldest first: older history is above the top edge
            viewport
                .content_height
                .saturating_sub(viewport.viewport_height.saturating_add(self.scroll_offset))
        };
        viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FillState, MessageStatus};
    use crate::relay::testing::{record, FakeDirectory, FakeIdentity, FakeNode};
    use crate::relay::SubmitReply;

    fn config() -> Config {
        Config {
            connect_attempts: 2,
            retry_delay_ms: 0,
            ..Config::default()
        }
    }

    async fn app_with(node: Arc<FakeNode>) -> App {
        let directory = Arc::new(FakeDirectory(Ok(vec!["/ip4/10.0.0.1/tcp/4001".into()])));
        App::with_collaborators(&config(), node, directory, Arc::new(FakeIdentity::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn startup_connects_and_loads_newest_first() {
        let node = Arc::new(
            FakeNode::new()
                .with_statuses(&["online"])
                .with_pages(vec![Ok(vec![record("a", 1_000), record("b", 2_000)])]),
        );
        let app = app_with(node.clone()).await;

        assert_eq!(app.connection_state(), ConnectionState::Connected);
        assert_eq!(app.engine.author().alias, "alias-pk-self");
        let feed: Vec<String> = app.feed().into_iter().map(|m| m.signature).collect();
        assert_eq!(feed, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn exhausted_connection_is_reported() {
        let node = Arc::new(FakeNode::new());
        let app = app_with(node.clone()).await;

        assert_eq!(node.connects(), 2);
        assert_eq!(app.connection_state(), ConnectionState::Failed);
        assert!(app.connection_error.is_some());
    }

    #[tokio::test]
    async fn reconnecting_after_failure_loads_the_newest_page() {
        // two failed startup attempts probe four times; /connect then finds it online
        let node = Arc::new(
            FakeNode::new()
                .with_statuses(&["offline", "offline", "offline", "offline", "online"])
                .with_pages(vec![
                    Err(anyhow::anyhow!("no relay")),
                    Ok(vec![record("newest", 5_000)]),
                ]),
        );
        let mut app = app_with(node.clone()).await;
        assert_eq!(app.connection_state(), ConnectionState::Failed);
        assert_eq!(app.cached_count(), 0);

        app.handle_command("/connect").await.unwrap();

        assert_eq!(app.connection_state(), ConnectionState::Connected);
        assert!(app.connection_error.is_none());
        assert_eq!(node.fetches(), 2);
        assert_eq!(app.cached_count(), 1);
        assert_eq!(app.paginator.last_anchor(), node.anchors.lock()[1]);
    }

    #[tokio::test]
    async fn reconnecting_while_connected_does_not_reload() {
        let node = Arc::new(FakeNode::new().with_statuses(&["online", "online"]));
        let mut app = app_with(node.clone()).await;
        let before = node.fetches();

        app.handle_command("/connect").await.unwrap();
        assert_eq!(node.fetches(), before);
    }

    #[tokio::test]
    async fn unsigned_echo_stays_until_reload() {
        let node = Arc::new(
            FakeNode::new()
                .with_statuses(&["online"])
                .with_reply(Ok(SubmitReply::Ack("timeout".into()))),
        );
        let mut app = app_with(node).await;

        app.send_message("hello").await;
        let feed = app.feed();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].status, MessageStatus::Pending);
        assert_eq!(app.cached_count(), 0);

        app.reload().await;
        assert!(app.feed().is_empty());
    }

    #[tokio::test]
    async fn sort_and_date_commands_change_the_view() {
        let node = Arc::new(FakeNode::new().with_statuses(&["online"]));
        let mut app = app_with(node).await;

        app.handle_command("/sort").await.unwrap();
        assert!(!app.view.sort_by_newest);

        app.handle_command("/date 2024-06-01").await.unwrap();
        assert_eq!(app.view.date, NaiveDate::from_ymd_opt(2024, 6, 1));

        app.handle_command("/date yesterday").await.unwrap();
        assert_eq!(app.view.date, NaiveDate::from_ymd_opt(2024, 6, 1));

        app.handle_command("/date clear").await.unwrap();
        assert_eq!(app.view.date, None);
    }

    #[tokio::test]
    async fn ctrl_r_reloads() {
        let node = Arc::new(FakeNode::new().with_statuses(&["online"]));
        let mut app = app_with(node.clone()).await;
        let before = node.fetches();

        let key = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        app.handle_input(Event::Key(key)).await.unwrap();
        assert_eq!(node.fetches(), before + 1);
    }

    #[tokio::test]
    async fn underfilled_viewport_backfills_on_tick() {
        let node = Arc::new(FakeNode::new().with_statuses(&["online"]).endless());
        let mut app = app_with(node.clone()).await;
        assert_eq!(app.cached_count(), 1);

        app.set_viewport(Viewport {
            content_height: 2,
            viewport_height: 30,
            scroll_offset: 0,
        });
        app.on_tick().await.unwrap();

        assert_eq!(app.cached_count(), 2);
        assert!(matches!(app.paginator.fill_state(), FillState::Filling { .. }));
    }
}
