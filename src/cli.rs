use crate::{
    camera::{FrameSource, LineCamera, TextDecoder},
    catalog::Catalog,
    clock::Clock,
    config::Config,
    i18n::Language,
    journal::Journal,
    lifecycle::{Countdown, CountdownPanel, PanelAction},
    navigation::{Navigator, Page},
    scanner::{Camera, QrScanner, ScanStatus},
    session::SessionContext,
};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_WATCH_SECS: u64 = 10;

pub struct Context {
    pub config: Config,
    pub data_dir: PathBuf,
    pub clock: Arc<dyn Clock>,
    pub catalog: Catalog,
    pub session: RefCell<SessionContext>,
    pub navigator: RefCell<Navigator>,
    pub lang: RefCell<Language>,
    pub journal: RefCell<Option<Journal>>,
}

pub fn run_once(ctx: &Context, line: &str) -> Result<()> {
    handle_line(ctx, line);
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = ctx.data_dir.join("history.txt");
    let _ = rl.load_history(&history);

    println!("goti - type /help for commands, /exit to quit");
    show_status(&ctx);

    loop {
        let prompt = format!("goti:{}> ", ctx.navigator.borrow().current().as_str());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                if handle_line(&ctx, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history) {
        tracing::debug!(error = %e, "could not save history");
    }
    Ok(())
}

/// Returns true when the REPL should exit
fn handle_line(ctx: &Context, line: &str) -> bool {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line);
    let (cmd, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    let args = match shell_words::split(rest) {
        Ok(args) => args,
        Err(e) => {
            println!("Could not parse arguments: {}", e);
            return false;
        }
    };
    handle_command(ctx, cmd, &args)
}

fn handle_command(ctx: &Context, cmd: &str, args: &[String]) -> bool {
    match cmd {
        "exit" | "quit" => return true,
        "help" => print_help(),
        "status" | "home" => {
            ctx.navigator.borrow_mut().navigate(Page::Home, signed_in(ctx));
            show_status(ctx);
        }
        "watch" => {
            let secs = match args.first() {
                Some(s) => match s.parse::<u64>() {
                    Ok(secs) => secs,
                    Err(_) => {
                        println!("Usage: /watch [seconds]");
                        return false;
                    }
                },
                None => DEFAULT_WATCH_SECS,
            };
            watch_countdown(ctx, Duration::from_secs(secs));
        }
        "action" => handle_action_command(ctx, args),
        "page" => handle_page_command(ctx, args),
        "packages" => {
            ctx.navigator
                .borrow_mut()
                .navigate(Page::Packages, signed_in(ctx));
            show_packages(ctx);
        }
        "buy" => handle_buy_command(ctx, args),
        "login" => handle_login_command(ctx, args),
        "logout" | "disconnect" => {
            if ctx.session.borrow_mut().logout() {
                with_journal(ctx, |j| j.logout());
                println!("Disconnected.");
            } else {
                println!("Not signed in.");
            }
            ctx.navigator.borrow_mut().navigate(Page::Home, false);
        }
        "profile" => handle_profile_command(ctx, args),
        "admin" => handle_admin_command(ctx, args),
        "scan" => handle_scan_command(ctx, args),
        "lang" => {
            let mut lang = ctx.lang.borrow_mut();
            *lang = match args.first() {
                Some(s) => match Language::from_str(s) {
                    Some(l) => l,
                    None => {
                        println!("Unknown language: {}. Use en or bn", s);
                        return false;
                    }
                },
                None => lang.toggle(),
            };
            println!("Language: {}", lang.as_str());
        }
        _ => println!("Unknown command: /{}. Try /help", cmd),
    }
    false
}

fn print_help() {
    println!("Commands:");
    println!("  /exit                              - quit");
    println!("  /help                              - show commands");
    println!("  /status                            - show the active package panel");
    println!("  /watch [secs]                      - live countdown (default {}s)", DEFAULT_WATCH_SECS);
    println!("  /action <n>                        - follow a panel action");
    println!("  /page [name]                       - show or change page (home|packages|auth|profile|scan)");
    println!("  /lang [en|bn]                      - toggle or set language");
    println!("Account:");
    println!("  /login <name> <email> [phone]      - sign in (starts the trial package)");
    println!("  /logout                            - disconnect and forget the session");
    println!("  /profile [name <n>|email <e>]      - show or edit the profile");
    println!("Packages:");
    println!("  /packages                          - list packages");
    println!("  /buy <id>                          - purchase a package");
    println!("Connect:");
    println!("  /scan [frames-file]                - scan a node QR code (stdin if no file)");
    println!("Maintenance:");
    println!("  /admin inject <name> <value> <mins|hours|days>");
}

fn signed_in(ctx: &Context) -> bool {
    ctx.session.borrow().is_signed_in()
}

fn with_journal(ctx: &Context, f: impl FnOnce(&mut Journal) -> Result<()>) {
    if let Some(journal) = ctx.journal.borrow_mut().as_mut() {
        if let Err(e) = f(journal) {
            tracing::warn!(error = %e, "failed to write journal");
        }
    }
}

fn current_countdown(ctx: &Context) -> Countdown {
    let session = ctx.session.borrow();
    Countdown::compute(
        session.user(),
        session.now_ms(),
        ctx.config.warning_threshold_secs(),
    )
}

fn show_status(ctx: &Context) {
    let lang = *ctx.lang.borrow();
    let countdown = current_countdown(ctx);
    match &countdown.package {
        None => {
            println!("{}", countdown.status.label(lang));
            println!("  Purchase a plan to establish connection");
        }
        Some(package) => {
            println!("Live connection: {}", package);
            println!("  Status:         {}", countdown.status.label(lang));
            println!("  Time remaining: {}", countdown.formatted());
            if let Some(expiry) = ctx
                .session
                .borrow()
                .user()
                .and_then(|u| u.expiry_timestamp)
                .and_then(chrono::DateTime::from_timestamp_millis)
            {
                println!(
                    "  Expires:        {}",
                    expiry.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    for (i, action) in PanelAction::for_status(countdown.status).iter().enumerate() {
        println!("  [{}] {}", i + 1, action.label(lang));
    }
}

fn watch_countdown(ctx: &Context, duration: Duration) {
    let lang = *ctx.lang.borrow();
    let mut panel = CountdownPanel::new(
        Arc::clone(&ctx.clock),
        ctx.config.timing.tick(),
        ctx.config.warning_threshold_secs(),
    )
    .with_listener(move |c: &Countdown| {
        let mut out = std::io::stdout();
        let _ = write!(
            out,
            "\r{}  {}  {:<12}",
            c.package.as_deref().unwrap_or("-"),
            c.formatted(),
            c.status.label(lang)
        );
        let _ = out.flush();
    });

    panel.sync(ctx.session.borrow().user());
    if panel.is_ticking() {
        std::thread::sleep(duration);
    }
    panel.unmount();
    println!();

    let last = panel.current();
    if last.package.is_some() && last.is_expired() {
        println!("Package expired. Renew from /packages");
    }
    for (i, action) in panel.actions().iter().enumerate() {
        println!("  [{}] {}", i + 1, action.label(lang));
    }
}

fn handle_action_command(ctx: &Context, args: &[String]) {
    let actions = PanelAction::for_status(current_countdown(ctx).status);
    let choice = args
        .first()
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| actions.get(i));
    match choice {
        Some(action) => {
            let shown = ctx
                .navigator
                .borrow_mut()
                .navigate(action.target(), signed_in(ctx));
            announce_page(ctx, shown);
        }
        None => println!("Usage: /action <1..{}>", actions.len()),
    }
}

fn handle_page_command(ctx: &Context, args: &[String]) {
    match args.first() {
        None => println!("Page: {}", ctx.navigator.borrow().current().as_str()),
        Some(name) => match Page::from_str(name) {
            Some(Page::Scan) => handle_scan_command(ctx, &[]),
            Some(page) => {
                let shown = ctx.navigator.borrow_mut().navigate(page, signed_in(ctx));
                announce_page(ctx, shown);
            }
            None => println!("Unknown page: {}", name),
        },
    }
}

fn announce_page(ctx: &Context, page: Page) {
    match page {
        Page::Home => show_status(ctx),
        Page::Packages => show_packages(ctx),
        Page::Auth => println!("Sign in with /login <name> <email> [phone]"),
        Page::Profile => show_profile(ctx),
        Page::Scan => println!("Use /scan [frames-file] to scan a node"),
    }
}

fn show_packages(ctx: &Context) {
    println!("Packages:");
    for p in ctx.catalog.list() {
        println!(
            "  {:<10} {:<18} {:>5} BDT  {}",
            p.id,
            p.name,
            p.price_bdt,
            p.duration_label()
        );
    }
    println!("Buy with /buy <id>");
}

fn handle_buy_command(ctx: &Context, args: &[String]) {
    let Some(id) = args.first() else {
        println!("Usage: /buy <id>");
        return;
    };
    let Some(package) = ctx.catalog.get(id) else {
        println!("Unknown package: {}. Use /packages to list.", id);
        return;
    };
    if !signed_in(ctx) {
        ctx.navigator.borrow_mut().navigate(Page::Auth, false);
        println!("Sign in first with /login <name> <email> [phone]");
        return;
    }

    println!("Processing payment for {}...", package.name);
    let result = ctx
        .session
        .borrow_mut()
        .purchase(package)
        .map(|u| u.expiry_timestamp);
    match result {
        Ok(expiry) => {
            with_journal(ctx, |j| j.purchase(&package.id, expiry));
            ctx.navigator.borrow_mut().navigate(Page::Home, true);
            show_status(ctx);
        }
        Err(e) => println!("Purchase failed: {}", e),
    }
}

fn handle_login_command(ctx: &Context, args: &[String]) {
    if args.len() < 2 {
        println!("Usage: /login <name> <email> [phone]");
        return;
    }
    let phone = args.get(2).map(String::as_str).unwrap_or("");

    println!("Establishing secure tunnel...");
    let result = ctx
        .session
        .borrow_mut()
        .login(&args[0], &args[1], phone)
        .map(|u| (u.name.clone(), u.active_package.clone(), u.expiry_timestamp));
    match result {
        Ok((name, package, expiry)) => {
            with_journal(ctx, |j| j.login(&name, package.as_deref(), expiry));
            ctx.navigator.borrow_mut().navigate(Page::Home, true);
            println!("Welcome, {}.", name);
            show_status(ctx);
        }
        Err(e) => println!("Login failed: {}", e),
    }
}

fn show_profile(ctx: &Context) {
    let session = ctx.session.borrow();
    let Some(user) = session.user() else {
        println!("Not signed in.");
        return;
    };
    println!("Connected ID: {}", user.name);
    println!("  Email:  {}", user.email);
    println!("  Phone:  {}", user.phone);
    println!(
        "  Active: {}",
        user.active_package.as_deref().unwrap_or("Offline")
    );
}

fn handle_profile_command(ctx: &Context, args: &[String]) {
    let shown = ctx
        .navigator
        .borrow_mut()
        .navigate(Page::Profile, signed_in(ctx));
    if shown != Page::Profile {
        announce_page(ctx, shown);
        return;
    }

    let result = match (args.first().map(String::as_str), args.get(1)) {
        (None, _) => {
            show_profile(ctx);
            return;
        }
        (Some("name"), Some(name)) => ctx
            .session
            .borrow_mut()
            .update_profile(Some(name.as_str()), None)
            .map(|_| ()),
        (Some("email"), Some(email)) => ctx
            .session
            .borrow_mut()
            .update_profile(None, Some(email.as_str()))
            .map(|_| ()),
        _ => {
            println!("Usage: /profile [name <name>|email <email>]");
            return;
        }
    };
    match result {
        Ok(()) => show_profile(ctx),
        Err(e) => println!("Profile not saved: {}", e),
    }
}

fn handle_admin_command(ctx: &Context, args: &[String]) {
    if args.first().map(String::as_str) != Some("inject") || args.len() != 4 {
        println!("Usage: /admin inject <name> <value> <mins|hours|days>");
        return;
    }
    if !signed_in(ctx) {
        println!("Sign in first with /login <name> <email> [phone]");
        return;
    }

    let (name, value, unit) = (&args[1], &args[2], &args[3]);
    let result = ctx
        .session
        .borrow_mut()
        .manual_override(name, value, unit)
        .map(|u| u.expiry_timestamp);
    match result {
        Ok(expiry) => {
            with_journal(ctx, |j| j.manual_override(name, expiry, None));
            println!("Override applied.");
            show_status(ctx);
        }
        Err(e) => {
            let reason = e.to_string();
            with_journal(ctx, |j| j.manual_override(name, None, Some(&reason)));
            println!("Override rejected: {}", reason);
        }
    }
}

fn handle_scan_command(ctx: &Context, args: &[String]) {
    let shown = ctx
        .navigator
        .borrow_mut()
        .navigate(Page::Scan, signed_in(ctx));
    if shown != Page::Scan {
        announce_page(ctx, shown);
        return;
    }

    let camera = match args.first() {
        Some(path) => LineCamera::new(FrameSource::File(PathBuf::from(path))),
        None => {
            println!("Reading frames from stdin, one code per line (Ctrl-D to close)");
            LineCamera::new(FrameSource::Stdin).closing_on_eof(true)
        }
    };
    let (outcome, payload) = scan_with(ctx, &camera);

    with_journal(ctx, |j| j.scan(outcome.as_str(), payload.as_deref()));
    ctx.navigator.borrow_mut().navigate(Page::Home, signed_in(ctx));
}

/// Outcome of a finished scan as written to the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanOutcome {
    Success,
    Error,
    Closed,
}

impl ScanOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

/// Run one scan to its end and return the outcome with any accepted payload
fn scan_with(ctx: &Context, camera: &dyn Camera) -> (ScanOutcome, Option<String>) {
    let lang = *ctx.lang.borrow();
    let mut scanner = QrScanner::new(
        lang,
        Arc::clone(&ctx.clock),
        ctx.config.timing.connect_delay(),
        ctx.config.timing.frame_interval(),
    );

    let status = scanner.select_camera(camera);
    tracing::debug!(mode = ?scanner.mode(), status = status.as_str(), "camera selected");
    if status == ScanStatus::Scanning {
        println!("Scanning...");
        scanner.run(&TextDecoder);
    }

    let outcome = match scanner.status() {
        ScanStatus::Success => {
            println!(
                "Authenticated: {}",
                scanner.payload().unwrap_or_default()
            );
            ScanOutcome::Success
        }
        ScanStatus::Error => {
            println!("{}", scanner.error_message().unwrap_or("Scan failed."));
            ScanOutcome::Error
        }
        _ => {
            println!("Scanner closed.");
            ScanOutcome::Closed
        }
    };
    let payload = scanner.payload().map(str::to_string);

    scanner.close();
    (outcome, payload)
}
