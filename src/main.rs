//! drona - terminal client for the UPSC mentor
//!
//! USAGE:
//!   drona [--local]                 # interactive conversation
//!   drona ask "<question>" [--local] # one-shot question
//!   drona history                   # print the stored conversation
//!   drona clear                     # forget the stored conversation
//!   drona doctor                    # check config, storage, server
//!   drona config set <key> <value>  # non-interactive config

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use drona::{
    backend::{ChatBackend, LocalBackend, RemoteBackend},
    config::{self, Config},
    conversation::ConversationStore,
    logging, markdown,
    orchestrator::{user_line, RequestOrchestrator, Session, SubmitOutcome, GREETING},
    render::RenderScheduler,
    storage::FileStorage,
    terminal::TerminalDisplay,
    turn::{Role, Turn},
};

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug)]
enum Command {
    Interactive { local: bool },
    Ask { question: String, local: bool },
    History,
    Clear,
    Doctor,
    ConfigSet { key: String, value: String },
    Help,
}

fn parse_args() -> Command {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse(&args)
}

fn parse(args: &[String]) -> Command {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Command::Help;
    }
    let local = args.iter().any(|a| a == "--local" || a == "-l");

    match args.first().map(|s| s.as_str()) {
        None => Command::Interactive { local },
        Some("history") => Command::History,
        Some("clear") => Command::Clear,
        Some("doctor") => Command::Doctor,
        Some("config") if args.get(1).map(|s| s.as_str()) == Some("set") => Command::ConfigSet {
            key: args.get(2).cloned().unwrap_or_default(),
            value: args.get(3).cloned().unwrap_or_default(),
        },
        Some("ask") => {
            let question = args[1..]
                .iter()
                .filter(|a| !a.starts_with('-'))
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            if question.is_empty() {
                Command::Help
            } else {
                Command::Ask { question, local }
            }
        }
        Some(s) if s.starts_with('-') => Command::Interactive { local },
        Some(_) => Command::Help,
    }
}

fn print_help() {
    println!(r#"drona - UPSC mentor in your terminal (Gemini powered, Firebase cached)

USAGE:
    drona [--local]                 # interactive conversation
    drona ask "<question>" [--local] # one-shot question
    drona history                   # print the stored conversation
    drona clear                     # forget the stored conversation
    drona doctor                    # check config, storage, server
    drona config set <key> <value>  # set config value

FLAGS:
    -l, --local             Run the pipeline in-process instead of calling the server
    -h, --help              Show this help

CONFIG:
    ~/.config/drona/config.json     Keys, model, personas, server URL
    ~/.local/state/drona/           Stored conversation

ENVIRONMENT:
    GEMINI_API_KEY                  Generation service key (--local, drona-api)
    FIREBASE_DB_URL                 Answer cache; unset runs uncached
    DRONA_SERVER_URL                drona-api address (default http://localhost:3000)
    RUST_LOG                        Log filter (default drona=warn)

COMMANDS (interactive mode):
    /image <path>   Attach an image to the next message
    /topic <n>      Ask about suggested topic n
    /history        Print the conversation
    /clear          Start over
    /quit           Leave
"#);
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init_tracing(logging::CLIENT_FILTER);

    match parse_args() {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Doctor => run_doctor().await,
        Command::ConfigSet { key, value } => run_config_set(&key, &value),
        Command::History => run_history(),
        Command::Clear => run_clear(),
        Command::Ask { question, local } => run_ask(&question, local).await,
        Command::Interactive { local } => run_interactive(local).await,
    }
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

fn backend(cfg: &Config, local: bool) -> Arc<dyn ChatBackend> {
    if local {
        Arc::new(LocalBackend::from_config(cfg))
    } else {
        Arc::new(RemoteBackend::from_config(cfg))
    }
}

fn orchestrator(cfg: &Config, local: bool) -> RequestOrchestrator<TerminalDisplay> {
    RequestOrchestrator::new(
        backend(cfg, local),
        RenderScheduler::new(TerminalDisplay::stdout()),
    )
}

async fn run_doctor() -> Result<()> {
    println!("drona doctor\n");

    let cfg = Config::load_with_env()?;
    let mark = |ok: bool| if ok { "✓" } else { "✗" };

    println!("[{}] Config: {}", mark(config::config_path()?.exists()), config::config_path()?.display());
    println!(
        "[{}] Gemini key: {}",
        mark(cfg.gemini_api_key.is_some()),
        if cfg.gemini_api_key.is_some() { "configured" } else { "missing (needed for --local)" }
    );
    println!(
        "[{}] Answer cache: {}",
        mark(cfg.firebase_url.is_some()),
        cfg.firebase_url.as_deref().unwrap_or("disabled")
    );
    let topics = cfg.search_api_key.is_some() && cfg.search_cx.is_some();
    println!(
        "[{}] Topic search: {}",
        mark(topics),
        if topics { "configured" } else { "fallback topics only" }
    );

    let storage = FileStorage::open_default();
    println!(
        "[{}] Storage: {}",
        mark(storage.is_ok()),
        config::state_dir()?.display()
    );
    if let Ok(storage) = storage {
        let store = ConversationStore::open(storage);
        println!("    {} stored turns", store.len());
    }

    let remote = RemoteBackend::from_config(&cfg);
    print!("[?] Server {}: checking...", remote.base_url());
    std::io::stdout().flush()?;
    match remote.ping().await {
        Ok(()) => println!("\r[✓] Server {}: reachable         ", remote.base_url()),
        Err(e) => println!("\r[✗] Server {}: {:#}", remote.base_url(), e),
    }

    Ok(())
}

fn run_config_set(key: &str, value: &str) -> Result<()> {
    if key.is_empty() {
        anyhow::bail!("Usage: drona config set <key> <value>");
    }
    let mut cfg = Config::load()?;
    cfg.set(key, value)?;
    cfg.save()?;
    println!("{} saved to {}", key, config::config_path()?.display());
    Ok(())
}

fn print_turns(turns: &[Turn]) {
    for turn in turns {
        match turn.role() {
            Role::User => println!("{}", user_line(turn)),
            Role::Assistant => println!("{}\n", markdown::render(&turn.text())),
        }
    }
}

fn run_history() -> Result<()> {
    let store = ConversationStore::open(FileStorage::open_default()?);
    if store.is_empty() {
        println!("No stored conversation.");
    }
    print_turns(store.all());
    Ok(())
}

fn run_clear() -> Result<()> {
    let mut store = ConversationStore::new(FileStorage::open_default()?);
    store.clear();
    println!("Conversation cleared.");
    Ok(())
}

async fn run_ask(question: &str, local: bool) -> Result<()> {
    let cfg = Config::load_with_env()?;
    let mut session = Session::open(FileStorage::open_default()?);
    let mut orchestrator = orchestrator(&cfg, local);

    let submission = orchestrator.submit(&mut session, question).await;
    if let Some(render) = submission.render {
        render.finished().await;
    }
    match submission.outcome {
        SubmitOutcome::Failed { message } => anyhow::bail!("{}", message),
        _ => Ok(()),
    }
}

enum Input<'a> {
    Message(&'a str),
    Image(&'a str),
    Topic(&'a str),
    History,
    Clear,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "image" | "img" => Input::Image(rest.trim()),
        "topic" => Input::Topic(rest.trim()),
        "history" => Input::History,
        "clear" => Input::Clear,
        "quit" | "exit" | "q" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

async fn run_interactive(local: bool) -> Result<()> {
    let cfg = Config::load_with_env()?;
    let mut session = Session::open(FileStorage::open_default()?);
    let mut orchestrator = orchestrator(&cfg, local);

    orchestrator.restore(&session);

    let topics = orchestrator.backend().topics().await.topics;
    println!("\nSuggested topics:");
    for (i, topic) in topics.iter().enumerate() {
        println!("  {}. {}", i + 1, topic);
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let attached = session.pending_images();
        if attached > 0 {
            print!("[{} image{}] ", attached, if attached == 1 { "" } else { "s" });
        }
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let text = match parse_input(&line) {
            Input::Quit => break,
            Input::Clear => {
                session.clear();
                orchestrator.renderer().notice(GREETING);
                continue;
            }
            Input::History => {
                print_turns(session.turns());
                continue;
            }
            Input::Image(path) => {
                match session.attach(Path::new(path)) {
                    Ok(n) => println!("Attached {} ({} pending)", path, n),
                    Err(e) => eprintln!("{}", e),
                }
                continue;
            }
            Input::Unknown(name) => {
                eprintln!("Unknown command /{}. Try /image, /topic, /history, /clear, /quit", name);
                continue;
            }
            Input::Topic(n) => match n.parse::<usize>().ok().and_then(|i| topics.get(i.wrapping_sub(1))) {
                Some(topic) => topic.clone(),
                None => {
                    eprintln!("Pick a topic between 1 and {}", topics.len());
                    continue;
                }
            },
            Input::Message(text) => text.to_string(),
        };

        let submission = orchestrator.submit(&mut session, &text).await;
        if let Some(render) = submission.render {
            render.finished().await;
        }
    }

    Ok(())
}
