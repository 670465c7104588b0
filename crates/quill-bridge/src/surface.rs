//! The capability surface: the exhaustive, fixed vocabulary the untrusted
//! side is permitted to speak.
//!
//! Descriptors are built once at startup and never change. Adding an
//! operation means adding a channel constant, a descriptor here, and a
//! forwarding arm in the dispatcher. Nothing is registered dynamically.

use std::collections::HashMap;

use crate::admission::DEFAULT_CEILING;
use crate::schema::{FieldKind, FieldRule, Schema};

/// Channel names, as the untrusted side spells them.
pub mod channel {
    pub const SEND_CHAT_MESSAGE: &str = "sendChatMessage";
    pub const RUN_AGENT_TASK: &str = "runAgentTask";
    pub const START_CHAT_STREAM: &str = "startChatStream";
    pub const STOP_CHAT_STREAM: &str = "stopChatStream";
    pub const LIST_MODELS: &str = "listModels";

    pub const GET_KNOWLEDGE_STATUS: &str = "getKnowledgeStatus";
    pub const QUERY_KNOWLEDGE: &str = "queryKnowledge";
    pub const INGEST_KNOWLEDGE_DOCUMENT: &str = "ingestKnowledgeDocument";

    pub const GET_SETTING: &str = "getSetting";
    pub const SET_SETTING: &str = "setSetting";

    pub const READ_FILE: &str = "readFile";
    pub const WRITE_FILE: &str = "writeFile";
    pub const LIST_DIRECTORY: &str = "listDirectory";
    pub const CREATE_DIRECTORY: &str = "createDirectory";
    pub const DELETE_FILE: &str = "deleteFile";

    pub const RUN_SHELL_COMMAND: &str = "runShellCommand";

    pub const GET_RATE_LIMIT_SNAPSHOT: &str = "getRateLimitSnapshot";
    pub const LOG_CLIENT_ERROR: &str = "logClientError";
}

/// Push-style event channels reachable via `subscribe`.
pub const EVENT_CHANNELS: &[&str] = &[quill_types::CHAT_STREAM_CHANNEL];

// Payload bounds shared across schemas.
const MAX_IDENTIFIER: usize = 100;
const MAX_MESSAGE: usize = 2000;
const MAX_PROMPT: usize = 5000;
const MAX_HISTORY_ENTRY: usize = 5000;
const MAX_HISTORY_ITEMS: usize = 100;
const MAX_TOOLS: usize = 10;
const MAX_PATH: usize = 500;
const MAX_FILE_CONTENT: usize = 1_000_000;
const MAX_COMMAND: usize = 2000;
const MAX_SETTING_BYTES: usize = 16_384;

const PROVIDERS: &[&str] = &["openai", "anthropic", "ollama"];
const ROLES: &[&str] = &["system", "user", "assistant"];

pub struct OperationDescriptor {
    pub name: &'static str,
    pub rate_limit_key: &'static str,
    pub ceiling: u32,
    pub schema: Schema,
}

impl OperationDescriptor {
    fn new(name: &'static str, schema: Schema) -> Self {
        Self {
            name,
            rate_limit_key: name,
            ceiling: DEFAULT_CEILING,
            schema,
        }
    }

    fn rate_limited(mut self, key: &'static str, ceiling: u32) -> Self {
        self.rate_limit_key = key;
        self.ceiling = ceiling;
        self
    }
}

pub struct CapabilitySurface {
    descriptors: HashMap<&'static str, OperationDescriptor>,
}

impl CapabilitySurface {
    /// The production surface. Intentionally data-heavy: every bound the
    /// bridge enforces is written down here, in one place.
    pub fn standard() -> Self {
        let mut descriptors = Vec::new();

        descriptors.push(
            OperationDescriptor::new(
                channel::SEND_CHAT_MESSAGE,
                Schema::object(vec![
                    FieldRule::required("message", str_field(1, MAX_MESSAGE)),
                    FieldRule::required("model", str_field(1, MAX_IDENTIFIER)),
                    FieldRule::optional("provider", FieldKind::OneOf(PROVIDERS)),
                    FieldRule::optional("history", history_field()),
                    FieldRule::optional("maxTokens", FieldKind::Uint { min: 1, max: 32_768 }),
                ]),
            )
            .rate_limited("chat", 5),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::RUN_AGENT_TASK,
                Schema::object(vec![
                    FieldRule::required("prompt", str_field(1, MAX_PROMPT)),
                    FieldRule::required("model", str_field(1, MAX_IDENTIFIER)),
                    FieldRule::optional("provider", FieldKind::OneOf(PROVIDERS)),
                    FieldRule::optional(
                        "tools",
                        FieldKind::Array {
                            max_items: MAX_TOOLS,
                            item: Box::new(str_field(1, MAX_IDENTIFIER)),
                        },
                    ),
                    FieldRule::required("maxSteps", FieldKind::Uint { min: 1, max: 10 }),
                ]),
            )
            .rate_limited("chat", 5),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::START_CHAT_STREAM,
                Schema::object(vec![
                    FieldRule::required("streamId", str_field(1, MAX_IDENTIFIER)),
                    FieldRule::required("message", str_field(1, MAX_MESSAGE)),
                    FieldRule::required("model", str_field(1, MAX_IDENTIFIER)),
                    FieldRule::optional("provider", FieldKind::OneOf(PROVIDERS)),
                    FieldRule::optional("history", history_field()),
                ]),
            )
            .rate_limited("chat", 5),
        );

        descriptors.push(OperationDescriptor::new(
            channel::STOP_CHAT_STREAM,
            Schema::object(vec![FieldRule::required(
                "streamId",
                str_field(1, MAX_IDENTIFIER),
            )]),
        ));

        descriptors.push(OperationDescriptor::new(
            channel::LIST_MODELS,
            Schema::object(vec![FieldRule::optional(
                "provider",
                FieldKind::OneOf(PROVIDERS),
            )]),
        ));

        descriptors.push(
            OperationDescriptor::new(channel::GET_KNOWLEDGE_STATUS, Schema::empty())
                .rate_limited("knowledge", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::QUERY_KNOWLEDGE,
                Schema::object(vec![
                    FieldRule::required("query", str_field(1, MAX_MESSAGE)),
                    FieldRule::optional("limit", FieldKind::Uint { min: 1, max: 50 }),
                ]),
            )
            .rate_limited("knowledge", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::INGEST_KNOWLEDGE_DOCUMENT,
                Schema::object(vec![FieldRule::required(
                    "filePath",
                    str_field(1, MAX_PATH),
                )]),
            )
            .rate_limited("knowledge", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::GET_SETTING,
                Schema::object(vec![FieldRule::required(
                    "key",
                    str_field(1, MAX_IDENTIFIER),
                )]),
            )
            .rate_limited("settings", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::SET_SETTING,
                Schema::object(vec![
                    FieldRule::required("key", str_field(1, MAX_IDENTIFIER)),
                    FieldRule::required(
                        "value",
                        FieldKind::Json {
                            max_bytes: MAX_SETTING_BYTES,
                        },
                    ),
                ]),
            )
            .rate_limited("settings", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::READ_FILE,
                Schema::object(vec![FieldRule::required(
                    "filePath",
                    str_field(1, MAX_PATH),
                )]),
            )
            .rate_limited("fs", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::WRITE_FILE,
                Schema::object(vec![
                    FieldRule::required("filePath", str_field(1, MAX_PATH)),
                    FieldRule::required("content", str_field(0, MAX_FILE_CONTENT)),
                ]),
            )
            .rate_limited("fs", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::LIST_DIRECTORY,
                Schema::object(vec![FieldRule::required("dirPath", str_field(1, MAX_PATH))]),
            )
            .rate_limited("fs", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::CREATE_DIRECTORY,
                Schema::object(vec![FieldRule::required("dirPath", str_field(1, MAX_PATH))]),
            )
            .rate_limited("fs", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::DELETE_FILE,
                Schema::object(vec![FieldRule::required(
                    "filePath",
                    str_field(1, MAX_PATH),
                )]),
            )
            .rate_limited("fs", DEFAULT_CEILING),
        );

        descriptors.push(
            OperationDescriptor::new(
                channel::RUN_SHELL_COMMAND,
                Schema::object(vec![
                    FieldRule::required("command", str_field(1, MAX_COMMAND)),
                    FieldRule::optional(
                        "timeoutMs",
                        FieldKind::Uint {
                            min: 1_000,
                            max: 300_000,
                        },
                    ),
                ]),
            )
            .rate_limited("shell", 5),
        );

        // Diagnostics consume quota like everything else; an introspection
        // channel must not become an amplification vector.
        descriptors.push(OperationDescriptor::new(
            channel::GET_RATE_LIMIT_SNAPSHOT,
            Schema::empty(),
        ));

        descriptors.push(OperationDescriptor::new(
            channel::LOG_CLIENT_ERROR,
            Schema::object(vec![
                FieldRule::required("message", str_field(1, MAX_MESSAGE)),
                FieldRule::optional("context", str_field(1, MAX_IDENTIFIER)),
            ]),
        ));

        Self {
            descriptors: descriptors.into_iter().map(|d| (d.name, d)).collect(),
        }
    }

    pub fn descriptor(&self, channel: &str) -> Option<&OperationDescriptor> {
        self.descriptors.get(channel)
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.descriptors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn str_field(min: usize, max: usize) -> FieldKind {
    FieldKind::Str { min, max }
}

fn history_field() -> FieldKind {
    FieldKind::Array {
        max_items: MAX_HISTORY_ITEMS,
        item: Box::new(FieldKind::Object(vec![
            FieldRule::required("role", FieldKind::OneOf(ROLES)),
            FieldRule::required("content", str_field(1, MAX_HISTORY_ENTRY)),
        ])),
    }
}
