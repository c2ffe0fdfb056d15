//! User Story Integration Tests
//!
//! These tests trace complete user workflows with logging to verify
//! the system behaves correctly from the user's perspective.
//!
//! Each test represents a real user story:
//! - "As an aspirant, I want to..."
//! - Tests verify the expected output/behavior
//! - Logs are captured for debugging

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use drona::{
    backend::LocalBackend,
    cache::{CacheError, CacheLookup, CacheStore, MemoryStore, ResponseCache},
    conversation::CONVERSATION_KEY,
    gateway::{GenerationError, Generator},
    key::derive_key,
    orchestrator::{RequestOrchestrator, Session, SubmitOutcome, GREETING},
    persona::PersonaPolicy,
    pipeline::ChatService,
    render::{Display, RenderScheduler, RenderState},
    storage::{FileStorage, LocalStorage, MemoryStorage},
    trending::TrendingService,
    turn::Role,
};

/// Test helper to capture and display trace logs
struct TestTracer {
    name: String,
    logs: Vec<String>,
}

impl TestTracer {
    fn new(name: &str) -> Self {
        eprintln!("\n╔═══════════════════════════════════════════════════════════════");
        eprintln!("║ USER STORY: {}", name);
        eprintln!("╚═══════════════════════════════════════════════════════════════\n");
        Self {
            name: name.to_string(),
            logs: vec![],
        }
    }

    fn step(&mut self, description: &str) {
        let msg = format!("  → {}", description);
        eprintln!("{}", msg);
        self.logs.push(msg);
    }

    fn expect(&mut self, condition: bool, description: &str) {
        let status = if condition { "✓" } else { "✗" };
        let msg = format!("    {} {}", status, description);
        eprintln!("{}", msg);
        self.logs.push(msg);
        assert!(condition, "FAILED: {}", description);
    }

    fn done(&self) {
        eprintln!("\n  ══════════════════════════════════════════════════════");
        eprintln!("  ✓ Story completed: {} ({} checks)", self.name, self.logs.len());
        eprintln!();
    }
}

// ═══════════════════════════════════════════════════════════════
// FAKES
// ═══════════════════════════════════════════════════════════════

/// Generation service answering from a script
#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn with(replies: &[&str]) -> Arc<Self> {
        let s = Self::default();
        for r in replies {
            s.replies.lock().unwrap().push_back(Ok(r.to_string()));
        }
        Arc::new(s)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for Scripted {
    async fn generate(&self, _turns: &[drona::turn::Turn], _system: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

/// Shared store that counts every access
#[derive(Default)]
struct SharedStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

#[async_trait]
impl CacheStore for SharedStore {
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(path, value).await
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shown {
    Reset,
    Raw(String),
    Formatted(String),
    Notice(String),
}

#[derive(Clone, Default)]
struct Screen {
    log: Arc<Mutex<Vec<Shown>>>,
}

impl Screen {
    fn raw_chunks(&self) -> usize {
        self.log.lock().unwrap().iter().filter(|s| matches!(s, Shown::Raw(_))).count()
    }

    fn visible(&self) -> String {
        let mut shown = String::new();
        for s in self.log.lock().unwrap().iter() {
            match s {
                Shown::Reset => shown.clear(),
                Shown::Raw(chunk) => shown.push_str(chunk),
                Shown::Formatted(text) => shown = text.clone(),
                Shown::Notice(_) => {}
            }
        }
        shown
    }

    fn notices(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Shown::Notice(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Display for Screen {
    fn reset(&mut self) {
        self.log.lock().unwrap().push(Shown::Reset);
    }

    fn append_raw(&mut self, chunk: &str) {
        self.log.lock().unwrap().push(Shown::Raw(chunk.to_string()));
    }

    fn scroll_to_latest(&mut self) {}

    fn show_formatted(&mut self, formatted: &str) {
        self.log.lock().unwrap().push(Shown::Formatted(formatted.to_string()));
    }

    fn notice(&mut self, text: &str) {
        self.log.lock().unwrap().push(Shown::Notice(text.to_string()));
    }
}

fn unformatted(s: &str) -> String {
    s.to_string()
}

struct World {
    generator: Arc<Scripted>,
    store: Arc<SharedStore>,
    backend: Arc<LocalBackend>,
}

impl World {
    fn new(generator: Arc<Scripted>) -> Self {
        let store = Arc::new(SharedStore::default());
        let chat = ChatService::new(
            Some(generator.clone()),
            Some(ResponseCache::new(store.clone())),
            PersonaPolicy::default(),
        );
        let backend = Arc::new(LocalBackend::new(
            Arc::new(chat),
            Arc::new(TrendingService::new(None, None)),
        ));
        Self {
            generator,
            store,
            backend,
        }
    }

    /// A fresh client: its own screen, its own renderer
    fn client(&self) -> (RequestOrchestrator<Screen>, Screen) {
        let screen = Screen::default();
        let renderer = RenderScheduler::new(screen.clone()).with_formatter(unformatted);
        (RequestOrchestrator::new(self.backend.clone(), renderer), screen)
    }
}

async fn let_writes_land() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ═══════════════════════════════════════════════════════════════
// STORY: First and second asker of the same question
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn story_first_asker_gets_a_fresh_answer() {
    let mut t = TestTracer::new("First asker of 'What is federalism?' gets a generated answer");
    let world = World::new(Scripted::with(&["Federalism divides power between the Union and States."]));
    let storage = MemoryStorage::new();

    t.step("Given an empty conversation and an empty cache");
    let (mut client, screen) = world.client();
    let mut session = Session::open(storage.clone());
    client.restore(&session);
    t.expect(screen.notices() == vec![GREETING.to_string()], "Greeting shown for an empty conversation");

    t.step("When the aspirant asks 'What is federalism?'");
    let submission = client.submit(&mut session, "What is federalism?").await;

    t.expect(
        matches!(submission.outcome, SubmitOutcome::Answered { from_cache: false, .. }),
        "Answer was generated, not cached",
    );
    t.expect(world.generator.calls() == 1, "Generation service called once");

    t.step("And the reveal runs to completion");
    let state = submission.render.unwrap().finished().await;
    t.expect(state == RenderState::Finalized, "Render finalized");
    t.expect(screen.raw_chunks() > 1, "Answer was revealed chunk by chunk");
    t.expect(
        screen.visible() == "Federalism divides power between the Union and States.",
        "Final text is the whole answer",
    );

    t.step("Then the answer is written through to the shared cache");
    let_writes_land().await;
    let record = world
        .store
        .inner
        .get("drona_chat_cache/whatisfederalism")
        .await
        .unwrap();
    t.expect(record.is_some(), "Entry exists under the derived key");
    let record = record.unwrap();
    t.expect(record["query"] == "What is federalism?", "Entry keeps the source query");
    t.expect(record["type"] == "auto", "Entry is tagged auto");

    t.step("And both turns are persisted locally");
    let stored = storage.get_item(CONVERSATION_KEY).unwrap().unwrap();
    let turns: serde_json::Value = serde_json::from_str(&stored).unwrap();
    t.expect(turns.as_array().map(|a| a.len()) == Some(2), "Two turns stored");
    t.expect(turns[0]["role"] == "user" && turns[1]["role"] == "model", "Roles are user then model");

    t.done();
}

#[tokio::test(start_paused = true)]
async fn story_second_asker_gets_the_cached_answer() {
    let mut t = TestTracer::new("Second asker with different casing is served from cache");
    let world = World::new(Scripted::with(&["Federalism divides power."]));

    t.step("Given someone already asked 'What is federalism?'");
    let (mut first, _) = world.client();
    let mut first_session = Session::open(MemoryStorage::new());
    first.submit(&mut first_session, "What is federalism?").await;
    let_writes_land().await;

    t.step("When another aspirant asks 'what is FEDERALISM'");
    let (mut second, screen) = world.client();
    let storage = MemoryStorage::new();
    let mut session = Session::open(storage.clone());
    let submission = second.submit(&mut session, "what is FEDERALISM").await;

    t.expect(
        submission.outcome
            == SubmitOutcome::Answered {
                text: "Federalism divides power.".into(),
                from_cache: true,
            },
        "Same answer, flagged as cached",
    );
    t.expect(world.generator.calls() == 1, "Generation service not called again");
    t.expect(
        submission.render.unwrap().state() == RenderState::Finalized,
        "Cached answer rendered at once",
    );
    t.expect(screen.raw_chunks() == 0, "No incremental reveal for a cached answer");

    t.step("Then the second conversation holds both turns");
    let reopened = Session::open(storage);
    t.expect(reopened.turns().len() == 2, "User and assistant turns persisted");
    t.expect(reopened.turns()[1].role() == Role::Assistant, "Second turn is the answer");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Images never touch the cache
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn story_image_question_bypasses_cache() {
    let mut t = TestTracer::new("A question with an image is never cached");
    let world = World::new(Scripted::with(&["This map shows the Deccan plateau.", "Again."]));
    let dir = tempfile::TempDir::new().unwrap();
    let image = dir.path().join("map.png");
    std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();

    t.step("Given an aspirant attaches a map");
    let (mut client, _) = world.client();
    let mut session = Session::open(MemoryStorage::new());
    session.attach(&image).unwrap();
    t.expect(session.pending_images() == 1, "One image pending");

    t.step("When they ask about it twice");
    client.submit(&mut session, "What is shown here?").await;
    session.attach(&image).unwrap();
    let second = client.submit(&mut session, "What is shown here?").await;
    let_writes_land().await;

    t.expect(
        matches!(second.outcome, SubmitOutcome::Answered { from_cache: false, .. }),
        "Second answer generated again",
    );
    t.expect(world.generator.calls() == 2, "Generation service called both times");
    t.expect(world.store.reads.load(Ordering::SeqCst) == 0, "Cache never read");
    t.expect(world.store.writes.load(Ordering::SeqCst) == 0, "Cache never written");
    t.expect(session.turns()[0].has_image(), "Image kept in the stored turn");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Conversation survives a restart
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn story_conversation_survives_restart() {
    let mut t = TestTracer::new("Conversation is restored after a restart");
    let dir = tempfile::TempDir::new().unwrap();
    let world = World::new(Scripted::with(&["Art 280 sets up the Finance Commission."]));

    t.step("Given an aspirant asked one question");
    {
        let (mut client, _) = world.client();
        let mut session = Session::open(FileStorage::new(dir.path()).unwrap());
        let submission = client.submit(&mut session, "Explain Art 280").await;
        submission.render.unwrap().finished().await;
    }

    t.step("When the client starts again over the same storage");
    let (mut client, screen) = world.client();
    let session = Session::open(FileStorage::new(dir.path()).unwrap());
    t.expect(session.turns().len() == 2, "Two turns rehydrated");

    client.restore(&session);
    t.expect(screen.raw_chunks() == 0, "History replayed without animation");
    t.expect(
        screen.visible() == "Art 280 sets up the Finance Commission.",
        "Answer shown formatted",
    );
    t.expect(
        screen.notices() == vec!["› Explain Art 280".to_string()],
        "Question shown, no greeting",
    );

    t.step("And clearing wipes the stored copy");
    let mut session = session;
    session.clear();
    let again = Session::open(FileStorage::new(dir.path()).unwrap());
    t.expect(again.turns().is_empty(), "Nothing left after clear");

    t.done();
}

#[tokio::test(start_paused = true)]
async fn story_corrupted_storage_recovers() {
    let mut t = TestTracer::new("Corrupted local conversation is discarded");
    let mut storage = MemoryStorage::new();

    t.step("Given the stored record has an unknown role");
    storage
        .set_item(CONVERSATION_KEY, r#"[{"role":"system","parts":[{"text":"x"}]}]"#)
        .unwrap();

    t.step("When the client starts");
    let world = World::new(Scripted::with(&[]));
    let (mut client, screen) = world.client();
    let session = Session::open(storage.clone());
    client.restore(&session);

    t.expect(session.turns().is_empty(), "Conversation starts empty");
    t.expect(storage.get_item(CONVERSATION_KEY).unwrap().is_none(), "Corrupt record deleted");
    t.expect(screen.notices() == vec![GREETING.to_string()], "Greeting shown");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Answers, freshness, rendering
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn story_new_answer_replaces_running_reveal() {
    let mut t = TestTracer::new("A new answer replaces one still being revealed");
    let world = World::new(Scripted::with(&[
        "A long answer about cooperative and competitive federalism.",
        "Short one.",
    ]));
    let (mut client, screen) = world.client();
    let mut session = Session::open(MemoryStorage::new());

    t.step("Given an answer is halfway through its reveal");
    let first = client.submit(&mut session, "Tell me about federalism").await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    t.expect(screen.raw_chunks() > 0, "Reveal has started");

    t.step("When a second answer arrives");
    let second = client.submit(&mut session, "And briefly?").await;

    t.expect(first.render.unwrap().finished().await == RenderState::Superseded, "First job superseded");
    t.expect(second.render.unwrap().finished().await == RenderState::Finalized, "Second job finalized");
    tokio::time::sleep(Duration::from_secs(2)).await;
    t.expect(screen.visible() == "Short one.", "Only the second answer is visible");

    t.done();
}

#[tokio::test]
async fn story_cached_answers_expire_after_a_week() {
    let mut t = TestTracer::new("Cached answers are served for seven days");
    let cache = ResponseCache::new(Arc::new(MemoryStore::new()));
    let key = derive_key("What is federalism?");

    t.step("Given an answer cached now");
    cache.set(&key, "Shared rule.", "What is federalism?").await.unwrap();
    let now = Utc::now();

    t.expect(
        cache.get_at(&key, now + chrono::Duration::hours(1)).await == CacheLookup::Hit("Shared rule.".into()),
        "One hour later it is a hit",
    );
    t.expect(
        cache.get_at(&key, now + chrono::Duration::days(8)).await == CacheLookup::Stale("Shared rule.".into()),
        "Eight days later it is stale",
    );
    t.expect(
        cache.get_at("somethingelse", now).await == CacheLookup::Miss,
        "Unknown key is a miss",
    );

    t.done();
}

#[test]
fn story_keys_ignore_case_and_punctuation() {
    let mut t = TestTracer::new("Equivalent questions share one key");

    t.expect(derive_key("What is federalism?") == "whatisfederalism", "Punctuation and spaces dropped");
    t.expect(
        derive_key("WHAT IS FEDERALISM") == derive_key("what is federalism!!"),
        "Case and punctuation ignored",
    );
    t.expect(derive_key("???") == derive_key("!!!"), "Symbol-only questions collide on the empty key");

    t.step("Given two questions sharing their first 50 letters");
    let prefix = "a".repeat(50);
    t.expect(
        derive_key(&format!("{}b", prefix)) == derive_key(&format!("{}c", prefix)),
        "Keys are truncated to 50 characters",
    );

    t.done();
}
