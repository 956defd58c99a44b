#![allow(dead_code)]

//! A scripted, in-process stand-in for the portal.
//!
//! Pages are trees of [`Node`]s keyed by URL. A node answers to the exact
//! selector strings listed for it, so tests build pages with the same
//! selector constants the scraper uses. Clicks and Enter presses can
//! navigate; `fail_on` makes a URL fail to load.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use royaltybook::browser::{Driver, Element};
use royaltybook::config::{PortalConfig, TimeoutConfig};
use royaltybook::credentials::PortalCredentials;
use royaltybook::models::{InvoiceId, StatementId};
use royaltybook::scrape::grid::columns;
use royaltybook::scrape::portal::{invoice_summary_url, statement_url};
use royaltybook::scrape::selectors;
use royaltybook::scrape::ScrapeSettings;

pub const BASE: &str = "https://app.energylink.com";
pub const LOGIN_URL: &str = "https://login.auth.enverus.com/u/login?state=abc";
pub const PASSWORD_URL: &str = "https://login.auth.enverus.com/u/login/password?state=abc";
pub const MFA_URL: &str = "https://login.auth.enverus.com/u/mfa-sms-challenge?state=abc";

pub fn root_url() -> String {
    PortalConfig::default().root_url()
}

pub fn dashboard_url() -> String {
    PortalConfig::default().dashboard_url()
}

pub fn grid_page_prefix() -> String {
    format!("{}?page=", dashboard_url())
}

pub fn grid_page_url(page: u32) -> String {
    format!("{}{page}", grid_page_prefix())
}

pub fn summary_url(invoice_id: i64) -> String {
    invoice_summary_url(&PortalConfig::default(), InvoiceId::new(invoice_id))
}

pub fn statement_page_url(statement_id: i64) -> String {
    statement_url(&PortalConfig::default(), StatementId::new(statement_id))
}

pub fn test_credentials() -> PortalCredentials {
    PortalCredentials::new("owner@example.com", "hunter2")
}

pub fn test_settings(debug: bool) -> ScrapeSettings {
    ScrapeSettings {
        portal: PortalConfig::default(),
        timeouts: TimeoutConfig::immediate(),
        debug,
        ..ScrapeSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Page model
// ---------------------------------------------------------------------------

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone)]
pub enum Action {
    Navigate(String),
    /// Navigate to the prefix followed by the element's current value.
    NavigateWithValue(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    id: usize,
    selectors: Vec<String>,
    text: String,
    attrs: HashMap<String, String>,
    value: String,
    visible: bool,
    children: Vec<Node>,
    on_click: Option<Action>,
    on_enter: Option<Action>,
}

impl Node {
    pub fn new(selectors: &[&str]) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            text: String::new(),
            attrs: HashMap::new(),
            value: String::new(),
            visible: true,
            children: Vec::new(),
            on_click: None,
            on_enter: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn on_click(mut self, action: Action) -> Self {
        self.on_click = Some(action);
        self
    }

    pub fn on_enter(mut self, action: Action) -> Self {
        self.on_enter = Some(action);
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

fn collect(nodes: &[Node], selector: &str, out: &mut Vec<Node>) {
    for node in nodes {
        if node.matches(selector) {
            out.push(node.clone());
        }
        collect(&node.children, selector, out);
    }
}

#[derive(Debug, Default, Clone)]
struct Page {
    body: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Default)]
struct State {
    url: String,
    pages: HashMap<String, Page>,
    redirects: HashMap<String, String>,
    failing: HashSet<String>,
    values: HashMap<usize, String>,
    visits: Vec<String>,
    filled: Vec<String>,
    mfa_completion: Option<String>,
    late: HashMap<String, (u32, Vec<Node>)>,
}

impl State {
    fn navigate(&mut self, url: &str) {
        let mut url = url.to_string();
        for _ in 0..5 {
            match self.redirects.get(&url) {
                Some(next) => url = next.clone(),
                None => break,
            }
        }
        self.url = url;
    }

    fn run(&mut self, action: &Action, node: &Node) {
        match action {
            Action::Navigate(url) => self.navigate(url),
            Action::NavigateWithValue(prefix) => {
                let value = self.value_of(node);
                self.navigate(&format!("{prefix}{value}"));
            }
        }
    }

    fn value_of(&self, node: &Node) -> String {
        self.values
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| node.value.clone())
    }

    fn count_query(&mut self) {
        let url = self.url.clone();
        let Some((remaining, _)) = self.late.get_mut(&url) else {
            return;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            if let Some((_, nodes)) = self.late.remove(&url) {
                self.pages.entry(url).or_default().nodes.extend(nodes);
            }
        }
    }

    fn current_page(&self) -> Page {
        self.pages.get(&self.url).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<State>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake driver lock poisoned")
    }

    pub fn page(self, url: impl Into<String>, nodes: Vec<Node>) -> Self {
        self.lock()
            .pages
            .entry(url.into())
            .or_default()
            .nodes
            .extend(nodes);
        self
    }

    pub fn body_text(self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.lock().pages.entry(url.into()).or_default().body = text.into();
        self
    }

    pub fn redirect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.lock().redirects.insert(from.into(), to.into());
        self
    }

    pub fn fail_on(self, url: impl Into<String>) -> Self {
        self.lock().failing.insert(url.into());
        self
    }

    /// Append `nodes` to the page at `url` once the driver has been queried
    /// `after_queries` times on it, like content that finishes loading late.
    pub fn render_late(self, url: impl Into<String>, after_queries: u32, nodes: Vec<Node>) -> Self {
        self.lock().late.insert(url.into(), (after_queries, nodes));
        self
    }

    /// The next `wait_for_url` that is not already satisfied lands on `url`,
    /// as if a human finished MFA in the window.
    pub fn complete_mfa_to(self, url: impl Into<String>) -> Self {
        self.lock().mfa_completion = Some(url.into());
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.lock().visits.clone()
    }

    pub fn filled(&self) -> Vec<String> {
        self.lock().filled.clone()
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    fn element(&self, node: Node) -> FakeElement {
        FakeElement {
            node,
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Element = FakeElement;

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.lock();
        state.visits.push(url.to_string());
        if state.failing.contains(url) {
            anyhow::bail!("net::ERR_CONNECTION_RESET at {url}");
        }
        state.navigate(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<FakeElement>> {
        let page = {
            let mut state = self.lock();
            state.count_query();
            state.current_page()
        };
        let mut found = Vec::new();
        collect(&page.nodes, selector, &mut found);
        Ok(found.into_iter().map(|n| self.element(n)).collect())
    }

    async fn wait_for_visible(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Option<FakeElement>> {
        Ok(self
            .query_all(selector)
            .await?
            .into_iter()
            .find(|e| e.node.visible))
    }

    async fn wait_for_text(&self, text: &str, _timeout: Duration) -> Result<bool> {
        Ok(self.lock().current_page().body.contains(text))
    }

    async fn wait_for_url(&self, fragment: &str, _timeout: Duration) -> Result<bool> {
        let mut state = self.lock();
        if state.url.contains(fragment) {
            return Ok(true);
        }
        if let Some(url) = state.mfa_completion.take() {
            state.navigate(&url);
        }
        Ok(state.url.contains(fragment))
    }
}

pub struct FakeElement {
    node: Node,
    state: Arc<Mutex<State>>,
}

impl FakeElement {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake driver lock poisoned")
    }
}

#[async_trait]
impl Element for FakeElement {
    async fn text(&self) -> Result<String> {
        Ok(self.node.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.node.attrs.get(name).cloned())
    }

    async fn value(&self) -> Result<String> {
        Ok(self.lock().value_of(&self.node))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Self>> {
        let mut found = Vec::new();
        collect(&self.node.children, selector, &mut found);
        Ok(found
            .into_iter()
            .map(|node| FakeElement {
                node,
                state: self.state.clone(),
            })
            .collect())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(self.node.visible)
    }

    async fn click(&self) -> Result<()> {
        if let Some(action) = &self.node.on_click {
            self.lock().run(action, &self.node);
        }
        Ok(())
    }

    async fn fill(&self, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.values.insert(self.node.id, value.to_string());
        state.filled.push(value.to_string());
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        if key == "Enter" {
            if let Some(action) = &self.node.on_enter {
                self.lock().run(action, &self.node);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page builders
// ---------------------------------------------------------------------------

/// Landing page whose sign-in link leads to the identity provider.
pub fn landing_page() -> Vec<Node> {
    vec![Node::new(&[selectors::LINK])
        .text("SIGN IN")
        .on_click(Action::Navigate(LOGIN_URL.to_string()))]
}

/// Username step; Continue goes to the password step.
pub fn username_page() -> Vec<Node> {
    vec![
        Node::new(&[selectors::USERNAME_INPUT]),
        Node::new(&[selectors::BUTTON, selectors::SUBMIT_BUTTON])
            .text("Continue")
            .on_click(Action::Navigate(PASSWORD_URL.to_string())),
    ]
}

/// Password step; submitting goes to `next`.
pub fn password_page(next: &str) -> Vec<Node> {
    vec![
        Node::new(&[selectors::PASSWORD_INPUT]),
        Node::new(&[selectors::BUTTON, selectors::SUBMIT_BUTTON])
            .text("Continue")
            .on_click(Action::Navigate(next.to_string())),
    ]
}

/// Full login: landing, username, password, then `after_password`.
pub fn with_login(driver: FakeDriver, after_password: &str) -> FakeDriver {
    driver
        .page(root_url(), landing_page())
        .page(LOGIN_URL, username_page())
        .page(PASSWORD_URL, password_page(after_password))
}

/// Browser profile already holds a session: the root lands on the dashboard.
pub fn with_session(driver: FakeDriver) -> FakeDriver {
    driver.redirect(root_url(), dashboard_url())
}

/// Dashboard with the invoice tab leading to grid page 1.
pub fn dashboard_page() -> Vec<Node> {
    vec![
        Node::new(&[selectors::TAB]).text("Wells"),
        Node::new(&[selectors::TAB])
            .text("Invoices / Checks")
            .on_click(Action::Navigate(grid_page_url(1))),
    ]
}

#[derive(Debug, Clone)]
pub struct GridRow {
    pub row_id: String,
    pub operator: String,
    pub check: String,
    pub total: String,
}

impl GridRow {
    pub fn new(row_id: impl Into<String>, operator: &str, total: &str) -> Self {
        let row_id = row_id.into();
        Self {
            check: format!("CHK-{row_id}\n01/15/2025"),
            row_id,
            operator: operator.to_string(),
            total: total.to_string(),
        }
    }
}

fn grid_cell(col: &str, text: &str) -> Node {
    Node::new(&[selectors::grid_cell(col).as_str()]).text(text)
}

fn grid_row_node(row: &GridRow) -> Node {
    let status_cell = Node::new(&[
        selectors::grid_cell(columns::STATUS).as_str(),
        selectors::grid_row_with_column(columns::STATUS).as_str(),
    ])
    .text("Paid");

    Node::new(&[selectors::GRID_ROW])
        .attr(selectors::GRID_ROW_ID_ATTR, row.row_id.clone())
        .children([
            grid_cell(columns::DOC_TYPE, "Revenue"),
            grid_cell(columns::OPERATOR, &row.operator),
            grid_cell(columns::OWNER_NUMBER, "000123"),
            grid_cell(columns::INVOICE, &row.check),
            grid_cell(columns::ACCOUNTING, "12/2024\n01/20/2025"),
            status_cell,
            grid_cell(columns::TOTAL, &row.total),
        ])
}

/// One page of the invoice grid, plus a decoy grid without a status column.
pub fn grid_page(rows: &[GridRow], page: u32, total_pages: u32) -> Vec<Node> {
    let decoy = Node::new(&[selectors::GRID_CONTAINER]).child(
        Node::new(&[selectors::GRID_ROW])
            .attr(selectors::GRID_ROW_ID_ATTR, "555")
            .child(grid_cell(columns::OPERATOR, "Decoy Operator")),
    );
    let grid =
        Node::new(&[selectors::GRID_CONTAINER]).children(rows.iter().map(grid_row_node));
    let pagination = Node::new(&[selectors::PAGINATION])
        .text(format!("1 to {} of {}\nPage  of {total_pages}", rows.len(), rows.len()))
        .child(
            Node::new(&[selectors::PAGE_INPUT])
                .value(page.to_string())
                .on_enter(Action::NavigateWithValue(grid_page_prefix())),
        );
    let hidden_pagination = Node::new(&[selectors::PAGINATION])
        .hidden()
        .text("Page of 99");

    vec![decoy, grid, hidden_pagination, pagination]
}

/// A `tr` of plain cells.
pub fn table_row(cells: &[&str]) -> Node {
    Node::new(&[selectors::TABLE_ROW])
        .text(cells.join("\t"))
        .children(cells.iter().map(|c| Node::new(&[selectors::TABLE_CELL]).text(*c)))
}

/// A property row linking to its statement.
pub fn property_row(statement_id: i64, cost_center: &str, description: &str, total: &str) -> Node {
    let link = Node::new(&[selectors::STATEMENT_LINK, selectors::LINK]).attr(
        "href",
        format!("/Statement/StatementSummary.aspx?StatementId={statement_id}&Context=Inbound"),
    );
    let cells = [
        "",
        cost_center,
        description,
        "TX",
        "Reeves",
        total,
        "(10.00)",
        "(5.00)",
        total,
    ];
    table_row(&cells).child(link)
}

/// Invoice summary page: financial header plus property rows.
pub fn summary_page(total: &str, properties: Vec<Node>) -> Vec<Node> {
    let mut nodes = vec![
        table_row(&["Check Number", "CHK-SUMMARY"]),
        table_row(&["Revenue", "$1,000.00"]),
        table_row(&["Tax", "(10.00)"]),
        table_row(&["Deductions", "(5.00)"]),
        table_row(&["Total", total]),
    ];
    nodes.extend(properties);
    nodes
}

/// A statement line item row.
pub fn line_item(code: &str, owner_value: &str) -> Node {
    table_row(&[
        code,
        "ROYALTY",
        "11/2024",
        "1.0340",
        "1,200.00",
        "2.50",
        "3,000.00",
        "6.25000000 %",
        "100.00000000 %",
        "75.00",
        owner_value,
    ])
}

/// Statement page with a header table and a detail table.
pub fn statement_page(rows: Vec<Node>) -> Vec<Node> {
    let header = Node::new(&[selectors::TABLE])
        .text("Operator\tDevon")
        .child(table_row(&["Operator", "Devon"]));
    let detail = Node::new(&[selectors::TABLE])
        .text("Code\tType Desc\tROYALTY")
        .child(table_row(&["Code", "Type Desc", "Prod Date"]))
        .children(rows);
    vec![header, detail]
}
