//! Client side of a submission
//!
//! Builds the user turn from input text and pending images, records it,
//! sends the whole conversation to a [`ChatBackend`], records the answer and
//! hands it to the [`RenderScheduler`]. Cached answers appear at once; fresh
//! ones are revealed incrementally. A failure records nothing further and
//! shows an apology that is never persisted.
//!
//! `submit` takes `&mut Session`, so one conversation has at most one
//! submission in flight.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::attachments::{AttachmentError, PendingImages};
use crate::backend::ChatBackend;
use crate::conversation::ConversationStore;
use crate::pipeline::ChatRequest;
use crate::render::{Display, RenderHandle, RenderScheduler};
use crate::storage::LocalStorage;
use crate::turn::{Role, Segment, Turn};

pub const GREETING: &str = "Ready to conquer UPSC? Let's begin.";

pub const APOLOGY: &str = "I apologize, but I am unable to connect to the server right now. \
                           Please check your connection.";

/// Query type sent with every submission unless changed
pub const DEFAULT_QUERY_TYPE: &str = "academic";

// ═══════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════

/// One conversation and what is queued for its next submission
pub struct Session<S: LocalStorage> {
    id: Uuid,
    conversation: ConversationStore<S>,
    pending: PendingImages,
    query_type: Option<String>,
}

impl<S: LocalStorage> Session<S> {
    /// Open a session over `storage`, loading the stored conversation
    pub fn open(storage: S) -> Self {
        let conversation = ConversationStore::open(storage);
        let id = Uuid::new_v4();
        info!(session = %id, turns = conversation.len(), "session opened");
        Self {
            id,
            conversation,
            pending: PendingImages::new(),
            query_type: Some(DEFAULT_QUERY_TYPE.to_string()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn turns(&self) -> &[Turn] {
        self.conversation.all()
    }

    pub fn with_query_type(mut self, query_type: Option<String>) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn query_type(&self) -> Option<&str> {
        self.query_type.as_deref()
    }

    /// Queue an image for the next submission; returns how many are queued
    pub fn attach(&mut self, path: &Path) -> Result<usize, AttachmentError> {
        self.pending.attach(path)
    }

    pub fn pending_images(&self) -> usize {
        self.pending.len()
    }

    /// Forget the conversation, stored copy included
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.pending.clear();
    }
}

// ═══════════════════════════════════════════════════════════════
// SUBMISSION
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered { text: String, from_cache: bool },
    /// Nothing recorded for the assistant; the apology was shown
    Failed { message: String },
    /// No text and no images
    Ignored,
}

pub struct Submission {
    pub outcome: SubmitOutcome,
    /// Render of the answer or apology
    pub render: Option<RenderHandle>,
}

pub struct RequestOrchestrator<D: Display> {
    backend: Arc<dyn ChatBackend>,
    renderer: RenderScheduler<D>,
}

impl<D: Display> RequestOrchestrator<D> {
    pub fn new(backend: Arc<dyn ChatBackend>, renderer: RenderScheduler<D>) -> Self {
        Self { backend, renderer }
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn renderer(&mut self) -> &mut RenderScheduler<D> {
        &mut self.renderer
    }

    /// Show a stored conversation without animation, or the greeting if empty
    pub fn restore<S: LocalStorage>(&mut self, session: &Session<S>) {
        if session.turns().is_empty() {
            self.renderer.notice(GREETING);
            return;
        }
        for turn in session.turns() {
            match turn.role() {
                Role::User => self.renderer.notice(&user_line(turn)),
                Role::Assistant => {
                    self.renderer.play(&turn.text(), false);
                }
            }
        }
    }

    pub async fn submit<S: LocalStorage>(
        &mut self,
        session: &mut Session<S>,
        input: &str,
    ) -> Submission {
        let text = input.trim();
        if text.is_empty() && session.pending.is_empty() {
            return Submission {
                outcome: SubmitOutcome::Ignored,
                render: None,
            };
        }

        let mut segments = Vec::new();
        if !text.is_empty() {
            segments.push(Segment::text(text));
        }
        segments.extend(session.pending.take());
        let turn = match Turn::new(Role::User, segments) {
            Ok(turn) => turn,
            Err(_) => {
                return Submission {
                    outcome: SubmitOutcome::Ignored,
                    render: None,
                }
            }
        };
        let has_image = turn.has_image();
        session.conversation.append(turn);

        let request = ChatRequest {
            contents: session.conversation.all().to_vec(),
            query_type: session.query_type.clone(),
        };

        match self.backend.send(&request).await {
            Ok(reply) => {
                info!(
                    session = %session.id,
                    from_cache = reply.from_cache,
                    has_image,
                    chars = reply.text.len(),
                    "answer received"
                );
                session.conversation.append(Turn::assistant_text(reply.text.as_str()));
                let render = self.renderer.play(&reply.text, !reply.from_cache);
                Submission {
                    outcome: SubmitOutcome::Answered {
                        text: reply.text,
                        from_cache: reply.from_cache,
                    },
                    render: Some(render),
                }
            }
            Err(e) => {
                warn!(session = %session.id, error = %e, "submission failed");
                let render = self.renderer.play(APOLOGY, false);
                Submission {
                    outcome: SubmitOutcome::Failed {
                        message: e.to_string(),
                    },
                    render: Some(render),
                }
            }
        }
    }
}

/// How a replayed user turn is printed
pub fn user_line(turn: &Turn) -> String {
    let images = turn.segments().iter().filter(|s| s.is_image()).count();
    let mut line = format!("› {}", turn.text());
    if images > 0 {
        line.push_str(&format!(" [{} image{}]", images, if images == 1 { "" } else { "s" }));
    }
    line
}
