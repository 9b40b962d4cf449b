// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use salesdesk_app::{
    Controller, DateFilter, FailureKind, FetchOutcome, FetchTicket, FilterPatch, OptionCatalog,
    OptionEntry, OptionSource, QueryService, RequestId, SearchField, Sort, SortDirection,
    TableResult, UserOptionsKey, parse_day,
};
use salesdesk_http::Client;
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

#[derive(Debug)]
pub enum RuntimeEvent {
    Input(String),
    InputClosed,
    Fetched {
        request_id: RequestId,
        outcome: FetchOutcome,
    },
}

/// Runs each fetch on its own worker thread and reports back over the
/// runtime channel.
pub struct HttpDispatcher {
    client: Client,
    tx: Sender<RuntimeEvent>,
}

impl HttpDispatcher {
    pub fn new(client: Client, tx: Sender<RuntimeEvent>) -> Self {
        Self { client, tx }
    }
}

impl QueryService for HttpDispatcher {
    fn dispatch(&mut self, endpoint: &str, ticket: &FetchTicket) -> Result<()> {
        let client = self.client.clone();
        let sender = self.tx.clone();
        let endpoint = endpoint.to_owned();
        let ticket = ticket.clone();
        thread::Builder::new()
            .name(format!("fetch-{}", ticket.request_id.get()))
            .spawn(move || {
                let outcome = client.fetch_table(&endpoint, &ticket.params);
                let _ = sender.send(RuntimeEvent::Fetched {
                    request_id: ticket.request_id,
                    outcome,
                });
            })
            .context("spawn fetch worker")?;
        Ok(())
    }
}

pub fn spawn_input_reader(tx: Sender<RuntimeEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(RuntimeEvent::Input(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(RuntimeEvent::InputClosed);
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Patch(FilterPatch),
    Reset,
    Options(String),
    Users,
    Help,
    Quit,
}

/// Parses one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map(|(head, rest)| (head, rest.trim()))
        .unwrap_or((line, ""));

    let command = match head {
        "search" | "/" => Command::Patch(FilterPatch::SearchText(rest.to_owned())),
        "field" => {
            let field = SearchField::parse(rest).ok_or_else(|| {
                anyhow!("unknown search field {rest:?}; use one of: text, transaction, card, user")
            })?;
            Command::Patch(FilterPatch::SearchField(field))
        }
        "filter" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: filter <key> <value>"))?;
            Command::Patch(FilterPatch::categorical(key, value.trim()))
        }
        "date" => Command::Patch(FilterPatch::Date(parse_date_args(rest)?)),
        "nodate" => Command::Patch(FilterPatch::Date(DateFilter::None)),
        "page" => Command::Patch(FilterPatch::Page(parse_number("page", rest)?)),
        "size" => Command::Patch(FilterPatch::PageSize(parse_number("size", rest)?)),
        "sort" => {
            let mut parts = rest.split_whitespace();
            let column = parts
                .next()
                .ok_or_else(|| anyhow!("usage: sort <column> [asc|desc]"))?;
            let direction = match parts.next() {
                Some(raw) => SortDirection::parse(raw)
                    .ok_or_else(|| anyhow!("sort direction must be asc or desc, got {raw:?}"))?,
                None => SortDirection::Asc,
            };
            Command::Patch(FilterPatch::Sort(Sort {
                column: column.to_owned(),
                direction,
            }))
        }
        "reset" => Command::Reset,
        "options" => {
            if rest.is_empty() {
                bail!("usage: options <kind>");
            }
            Command::Options(rest.to_owned())
        }
        "users" => Command::Users,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        unknown => bail!("unknown command {unknown:?}; type `help` to list commands"),
    };
    Ok(Some(command))
}

fn parse_date_args(rest: &str) -> Result<DateFilter> {
    let mut parts = rest.split_whitespace();
    let first = parts
        .next()
        .ok_or_else(|| anyhow!("usage: date <YYYY-MM-DD> [YYYY-MM-DD | ..]"))?;
    let from = parse_date_arg(first)?;
    Ok(match parts.next() {
        None => DateFilter::Single(from),
        Some("..") => DateFilter::range(from, None),
        Some(raw) => DateFilter::range(from, Some(parse_date_arg(raw)?)),
    })
}

fn parse_date_arg(raw: &str) -> Result<time::Date> {
    parse_day(raw).ok_or_else(|| anyhow!("dates use YYYY-MM-DD, got {raw:?}"))
}

fn parse_number(command: &str, raw: &str) -> Result<u32> {
    raw.parse()
        .with_context(|| format!("usage: {command} <number>, got {raw:?}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
enum Notice {
    Rows(TableResult),
    Failed(FailureKind),
}

/// One table screen: the controller plus the option lists it shows.
pub struct Session<S, O> {
    controller: Controller<S>,
    options: O,
    catalog: OptionCatalog,
    notices: Rc<RefCell<Vec<Notice>>>,
}

impl<S: QueryService, O: OptionSource> Session<S, O> {
    pub fn new(mut controller: Controller<S>, options: O) -> Self {
        let notices = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&notices);
        controller.on_result(move |result| sink.borrow_mut().push(Notice::Rows(result.clone())));
        let sink = Rc::clone(&notices);
        controller.on_error(move |failure| sink.borrow_mut().push(Notice::Failed(failure.clone())));
        Self {
            controller,
            options,
            catalog: OptionCatalog::new(),
            notices,
        }
    }

    pub fn controller(&self) -> &Controller<S> {
        &self.controller
    }

    pub fn start(&mut self) {
        self.controller.trigger_fetch();
    }

    pub fn handle_command<W: Write>(
        &mut self,
        command: Command,
        now: Instant,
        out: &mut W,
    ) -> Result<Flow> {
        match command {
            Command::Patch(patch) => {
                if let Err(error) = self.controller.update_filter_at(patch, now) {
                    writeln!(out, "error: {error:#}")?;
                }
            }
            Command::Reset => self.controller.reset(),
            Command::Options(kind) => match self.catalog.list(&mut self.options, &kind) {
                Ok(entries) => write_options(out, &kind, entries)?,
                Err(error) => writeln!(out, "error: {error:#}")?,
            },
            Command::Users => {
                let key = UserOptionsKey::from_filter(self.controller.filter());
                match self.catalog.users(&mut self.options, &key) {
                    Ok(entries) => write_options(out, "users", entries)?,
                    Err(error) => writeln!(out, "error: {error:#}")?,
                }
            }
            Command::Help => print_commands(out)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn handle_fetched(&mut self, request_id: RequestId, outcome: FetchOutcome) {
        self.controller.complete(request_id, outcome);
    }

    pub fn poll(&mut self, now: Instant) {
        self.controller.poll_at(now);
    }

    /// Prints queued results and failures. An expired session ends the run.
    pub fn render_notices<W: Write>(&mut self, out: &mut W) -> Result<Flow> {
        let notices: Vec<Notice> = self.notices.borrow_mut().drain(..).collect();
        for notice in notices {
            match notice {
                Notice::Rows(result) => self.write_rows(out, &result)?,
                Notice::Failed(FailureKind::Unauthorized) => {
                    writeln!(out, "session expired; sign in again and restart salesdesk")?;
                    return Ok(Flow::Quit);
                }
                Notice::Failed(failure) if failure.is_soft() => {
                    writeln!(out, "warning: {failure}")?;
                }
                Notice::Failed(failure) => writeln!(out, "error: {failure}")?,
            }
        }
        Ok(Flow::Continue)
    }

    pub fn shutdown(&mut self) {
        self.controller.dispose();
    }

    fn write_rows<W: Write>(&self, out: &mut W, result: &TableResult) -> Result<()> {
        let filter = self.controller.filter();
        writeln!(
            out,
            "{}: {} of {} rows, page {}/{}",
            self.controller.config().name(),
            result.records.len(),
            result.total_count,
            filter.page(),
            result.page_count(filter.page_size()).max(1)
        )?;
        for record in &result.records {
            writeln!(out, "  {record}")?;
        }
        Ok(())
    }
}

fn write_options<W: Write>(out: &mut W, kind: &str, entries: &[OptionEntry]) -> Result<()> {
    writeln!(out, "{kind}: {} options", entries.len())?;
    for entry in entries {
        if entry.value == entry.label {
            writeln!(out, "  {}", entry.value)?;
        } else {
            writeln!(out, "  {} ({})", entry.label, entry.value)?;
        }
    }
    Ok(())
}

fn print_commands<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "commands:")?;
    writeln!(out, "  search <text>                   Search (applied after typing settles)")?;
    writeln!(out, "  field <text|transaction|card|user>")?;
    writeln!(out, "  filter <key> <value>            Set a dropdown filter (`all` clears it)")?;
    writeln!(out, "  date <from> [<to> | ..]         Single day, range, or open range")?;
    writeln!(out, "  nodate                          Clear the date filter")?;
    writeln!(out, "  page <n> | size <n>")?;
    writeln!(out, "  sort <column> [asc|desc]")?;
    writeln!(out, "  options <kind> | users          Show dropdown choices")?;
    writeln!(out, "  reset | help | quit")?;
    Ok(())
}

/// Drives a session until `quit`, end of input, or an expired session.
pub fn run_loop<S, O, W>(
    session: &mut Session<S, O>,
    rx: &Receiver<RuntimeEvent>,
    out: &mut W,
) -> Result<()>
where
    S: QueryService,
    O: OptionSource,
    W: Write,
{
    session.start();
    loop {
        if session.render_notices(out)? == Flow::Quit {
            break;
        }
        out.flush().context("flush output")?;

        let event = match session.controller().next_deadline() {
            Some(deadline) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            },
        };

        let now = Instant::now();
        match event {
            None => {}
            Some(RuntimeEvent::Input(line)) => {
                debug!("[INPUT] {line:?}");
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if session.handle_command(command, now, out)? == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => writeln!(out, "error: {error:#}")?,
                }
            }
            Some(RuntimeEvent::InputClosed) => break,
            Some(RuntimeEvent::Fetched {
                request_id,
                outcome,
            }) => session.handle_fetched(request_id, outcome),
        }
        session.poll(now);
    }
    session.shutdown();
    out.flush().context("flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Command, Flow, RuntimeEvent, Session, parse_command, run_loop};
    use anyhow::{Result, bail};
    use salesdesk_app::{
        Controller, DateFilter, FailureKind, FilterPatch, OptionEntry, OptionSource, PayloadShape,
        RequestId, SearchField, SortDirection, TableConfig, UserOptionsKey,
    };
    use salesdesk_testkit::{RowFaker, ScriptedService, fixture_date, payload};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct StaticOptions {
        calls: usize,
    }

    impl OptionSource for StaticOptions {
        fn fetch_options(&mut self, kind: &str) -> Result<Vec<OptionEntry>> {
            self.calls += 1;
            if kind == "broken" {
                bail!("options service unavailable");
            }
            Ok(vec![
                OptionEntry::new("acme", "Acme Supply"),
                OptionEntry::new("QS", "QS"),
            ])
        }

        fn fetch_users(&mut self, key: &UserOptionsKey) -> Result<Vec<OptionEntry>> {
            self.calls += 1;
            Ok(vec![OptionEntry::new(format!("{}-rep", key.company), "Rep")])
        }
    }

    fn session(table: TableConfig) -> Session<ScriptedService, StaticOptions> {
        let controller = Controller::new(table, ScriptedService::new())
            .with_debounce(Duration::from_millis(200));
        Session::new(controller, StaticOptions::default())
    }

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).expect("output is UTF-8")
    }

    #[test]
    fn commands_parse_into_patches() -> Result<()> {
        assert_eq!(
            parse_command("search  acme corp ")?,
            Some(Command::Patch(FilterPatch::SearchText("acme corp".to_owned())))
        );
        assert_eq!(
            parse_command("field transaction")?,
            Some(Command::Patch(FilterPatch::SearchField(
                SearchField::TransactionId
            )))
        );
        assert_eq!(
            parse_command("filter vendor Acme Supply")?,
            Some(Command::Patch(FilterPatch::categorical("vendor", "Acme Supply")))
        );
        assert_eq!(
            parse_command("date 2025-06-30")?,
            Some(Command::Patch(FilterPatch::Date(DateFilter::Single(
                fixture_date()
            ))))
        );
        assert_eq!(
            parse_command("date 2025-06-30 ..")?,
            Some(Command::Patch(FilterPatch::Date(DateFilter::range(
                fixture_date(),
                None
            ))))
        );
        let Some(Command::Patch(FilterPatch::Sort(sort))) = parse_command("sort amount desc")?
        else {
            panic!("sort command expected");
        };
        assert_eq!(sort.column, "amount");
        assert_eq!(sort.direction, SortDirection::Desc);
        assert_eq!(parse_command("   ")?, None);
        assert_eq!(parse_command("quit")?, Some(Command::Quit));
        Ok(())
    }

    #[test]
    fn bad_commands_explain_usage() {
        for (line, expected) in [
            ("fly", "unknown command"),
            ("page two", "usage: page"),
            ("filter vendor", "usage: filter"),
            ("date 30/06/2025", "YYYY-MM-DD"),
            ("field email", "unknown search field"),
            ("sort amount sideways", "asc or desc"),
        ] {
            let error = parse_command(line).expect_err("invalid command");
            assert!(format!("{error:#}").contains(expected), "{line}: {error:#}");
        }
    }

    #[test]
    fn invalid_patch_is_reported_and_session_continues() -> Result<()> {
        let mut session = session(TableConfig::expenses());
        let mut out = Vec::new();
        let flow = session.handle_command(
            Command::Patch(FilterPatch::SearchField(SearchField::Card)),
            Instant::now(),
            &mut out,
        )?;
        assert_eq!(flow, Flow::Continue);
        assert!(output(out).contains("does not support searching by card"));
        Ok(())
    }

    #[test]
    fn option_lists_are_cached_between_commands() -> Result<()> {
        let mut session = session(TableConfig::sales());
        let mut out = Vec::new();
        let now = Instant::now();
        session.handle_command(Command::Options("vendor".to_owned()), now, &mut out)?;
        session.handle_command(Command::Options("vendor".to_owned()), now, &mut out)?;
        session.handle_command(Command::Users, now, &mut out)?;
        session.handle_command(Command::Options("broken".to_owned()), now, &mut out)?;

        let text = output(out);
        assert!(text.contains("Acme Supply (acme)"));
        assert!(text.contains("QS-rep"));
        assert!(text.contains("options service unavailable"));
        assert_eq!(session.options.calls, 3);
        Ok(())
    }

    #[test]
    fn loop_renders_rows_and_stops_on_expired_session() -> Result<()> {
        let rows = RowFaker::new(5).rows("leads", 2);
        let (tx, rx) = mpsc::channel();
        tx.send(RuntimeEvent::Fetched {
            request_id: RequestId::new(1),
            outcome: Ok(payload(PayloadShape::DataArray, &rows, 60)),
        })?;
        tx.send(RuntimeEvent::Input("page 2".to_owned()))?;
        tx.send(RuntimeEvent::Fetched {
            request_id: RequestId::new(2),
            outcome: Err(FailureKind::Unauthorized),
        })?;
        tx.send(RuntimeEvent::Input("page 3".to_owned()))?;

        let mut session = session(TableConfig::leads());
        let mut out = Vec::new();
        run_loop(&mut session, &rx, &mut out)?;

        let text = output(out);
        assert!(text.contains("leads: 2 of 60 rows, page 1/3"), "{text}");
        assert!(text.contains("session expired"), "{text}");
        assert!(session.controller().is_disposed());

        let sent: Vec<u32> = session
            .controller()
            .service()
            .tickets()
            .map(|ticket| ticket.params.page)
            .collect();
        assert_eq!(sent, vec![1, 2], "nothing is sent after the session expires");
        Ok(())
    }

    #[test]
    fn loop_reports_failures_and_ends_with_input() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        tx.send(RuntimeEvent::Fetched {
            request_id: RequestId::new(1),
            outcome: Err(FailureKind::server(502, "upstream down")),
        })?;
        tx.send(RuntimeEvent::Input("filter company Harbor".to_owned()))?;
        tx.send(RuntimeEvent::Fetched {
            request_id: RequestId::new(2),
            outcome: Ok("not a payload".to_owned()),
        })?;
        tx.send(RuntimeEvent::InputClosed)?;

        let mut session = session(TableConfig::expenses());
        let mut out = Vec::new();
        run_loop(&mut session, &rx, &mut out)?;

        let text = output(out);
        assert!(text.contains("error: server error (502): upstream down"), "{text}");
        assert!(text.contains("warning: response matched no known payload shape"), "{text}");
        assert_eq!(session.controller().service().len(), 2);
        Ok(())
    }

    #[test]
    fn typed_search_is_applied_after_the_debounce_window() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        tx.send(RuntimeEvent::Fetched {
            request_id: RequestId::new(1),
            outcome: Ok("[]".to_owned()),
        })?;
        tx.send(RuntimeEvent::Input("search a".to_owned()))?;
        tx.send(RuntimeEvent::Input("search acme".to_owned()))?;
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(600));
            let _ = tx.send(RuntimeEvent::InputClosed);
        });

        let mut session = session(TableConfig::leads());
        let mut out = Vec::new();
        run_loop(&mut session, &rx, &mut out)?;
        closer.join().expect("closer thread should join");

        let texts: Vec<String> = session
            .controller()
            .service()
            .tickets()
            .map(|ticket| ticket.params.text.clone())
            .collect();
        assert_eq!(texts, vec![String::new(), "acme".to_owned()]);
        Ok(())
    }
}
