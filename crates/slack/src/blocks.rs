use std::collections::HashSet;

use querybot_core::{ChannelId, QueryBotError};
use serde::Serialize;
use thiserror::Error;

pub const QUERY_MODAL_CALLBACK_ID: &str = "query_modal";
pub const QUERY_BLOCK_ID: &str = "query_block";
pub const QUERY_ACTION_ID: &str = "query_input";

// Block Kit limits for modal views.
const MAX_TITLE_CHARS: usize = 24;
const MAX_BUTTON_CHARS: usize = 24;
const MAX_CALLBACK_ID_CHARS: usize = 255;
const MAX_BLOCK_ID_CHARS: usize = 255;
const MAX_PRIVATE_METADATA_CHARS: usize = 3000;
const MAX_LABEL_CHARS: usize = 2000;
const MAX_SECTION_TEXT_CHARS: usize = 3000;
const CODE_FENCE: &str = "```";
const MAX_INPUT_LENGTH: u32 = 3000;
const MAX_MODAL_BLOCKS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "plain_text_input")]
pub struct PlainTextInput {
    pub action_id: String,
    pub multiline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl PlainTextInput {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            multiline: false,
            placeholder: None,
            initial_value: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(TextObject::plain(placeholder));
        self
    }

    pub fn initial_value(mut self, value: impl Into<String>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    pub fn length(mut self, min_length: u32, max_length: u32) -> Self {
        self.min_length = Some(min_length);
        self.max_length = Some(max_length);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        block_id: String,
        text: TextObject,
    },
    Context {
        block_id: String,
        elements: Vec<TextObject>,
    },
    Input {
        block_id: String,
        label: TextObject,
        element: PlainTextInput,
        optional: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<TextObject>,
    },
}

impl Block {
    pub fn block_id(&self) -> &str {
        match self {
            Self::Section { block_id, .. }
            | Self::Context { block_id, .. }
            | Self::Input { block_id, .. } => block_id,
        }
    }
}

/// Chat message payload: fallback `text` plus Block Kit `blocks`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        match self.text {
            Some(TextObject::PlainText { text }) => {
                TextObject::plain(truncate_chars(&text, MAX_SECTION_TEXT_CHARS))
            }
            Some(TextObject::Mrkdwn { text }) => {
                TextObject::mrkdwn(truncate_chars(&text, MAX_SECTION_TEXT_CHARS))
            }
            None => TextObject::plain(""),
        }
    }
}

/// Cuts `text` to at most `max` characters, marking the cut with an ellipsis.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "modal")]
pub struct ModalView {
    pub callback_id: String,
    pub title: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_metadata: Option<String>,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ViewBuildError {
    #[error("modal field `{0}` is required")]
    MissingField(&'static str),
    #[error("modal field `{field}` exceeds {max} characters")]
    TooLong { field: String, max: usize },
    #[error("modal has input blocks but no submit label")]
    MissingSubmit,
    #[error("duplicate block_id `{0}`")]
    DuplicateBlockId(String),
    #[error("input `{0}` has an invalid length range")]
    InvalidLengthRange(String),
    #[error("modal has more than {0} blocks")]
    TooManyBlocks(usize),
}

impl From<ViewBuildError> for QueryBotError {
    fn from(error: ViewBuildError) -> Self {
        QueryBotError::Validation(error.to_string())
    }
}

pub struct ModalBuilder {
    callback_id: String,
    title: Option<String>,
    submit: Option<String>,
    close: Option<String>,
    private_metadata: Option<String>,
    blocks: Vec<Block>,
}

impl ModalBuilder {
    pub fn new(callback_id: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            title: None,
            submit: None,
            close: None,
            private_metadata: None,
            blocks: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn submit(mut self, label: impl Into<String>) -> Self {
        self.submit = Some(label.into());
        self
    }

    pub fn close(mut self, label: impl Into<String>) -> Self {
        self.close = Some(label.into());
        self
    }

    pub fn private_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.private_metadata = Some(metadata.into());
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn input(
        mut self,
        block_id: impl Into<String>,
        label: impl Into<String>,
        element: PlainTextInput,
    ) -> Self {
        self.blocks.push(Block::Input {
            block_id: block_id.into(),
            label: TextObject::plain(label),
            element,
            optional: false,
            hint: None,
        });
        self
    }

    pub fn optional_input(
        mut self,
        block_id: impl Into<String>,
        label: impl Into<String>,
        element: PlainTextInput,
    ) -> Self {
        self.blocks.push(Block::Input {
            block_id: block_id.into(),
            label: TextObject::plain(label),
            element,
            optional: true,
            hint: None,
        });
        self
    }

    pub fn build(self) -> Result<ModalView, ViewBuildError> {
        let callback_id = required("callback_id", Some(self.callback_id))?;
        ensure_len("callback_id", &callback_id, MAX_CALLBACK_ID_CHARS)?;

        let title = required("title", self.title)?;
        ensure_len("title", &title, MAX_TITLE_CHARS)?;

        let has_inputs = self.blocks.iter().any(|block| matches!(block, Block::Input { .. }));
        let submit = match self.submit {
            Some(label) => Some(required("submit", Some(label))?),
            None if has_inputs => return Err(ViewBuildError::MissingSubmit),
            None => None,
        };
        if let Some(label) = &submit {
            ensure_len("submit", label, MAX_BUTTON_CHARS)?;
        }
        if let Some(label) = &self.close {
            ensure_len("close", label, MAX_BUTTON_CHARS)?;
        }
        if let Some(metadata) = &self.private_metadata {
            ensure_len("private_metadata", metadata, MAX_PRIVATE_METADATA_CHARS)?;
        }

        if self.blocks.len() > MAX_MODAL_BLOCKS {
            return Err(ViewBuildError::TooManyBlocks(MAX_MODAL_BLOCKS));
        }
        let mut seen = HashSet::new();
        for block in &self.blocks {
            validate_block(block)?;
            if !seen.insert(block.block_id()) {
                return Err(ViewBuildError::DuplicateBlockId(block.block_id().to_owned()));
            }
        }

        Ok(ModalView {
            callback_id,
            title: TextObject::plain(title),
            submit: submit.map(TextObject::plain),
            close: self.close.map(TextObject::plain),
            private_metadata: self.private_metadata,
            blocks: self.blocks,
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ViewBuildError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ViewBuildError::MissingField(field)),
    }
}

fn ensure_len(field: &str, value: &str, max: usize) -> Result<(), ViewBuildError> {
    if value.chars().count() > max {
        return Err(ViewBuildError::TooLong { field: field.to_owned(), max });
    }
    Ok(())
}

fn validate_block(block: &Block) -> Result<(), ViewBuildError> {
    let block_id = block.block_id();
    if block_id.trim().is_empty() {
        return Err(ViewBuildError::MissingField("block_id"));
    }
    ensure_len("block_id", block_id, MAX_BLOCK_ID_CHARS)?;

    if let Block::Input { label, element, .. } = block {
        if label.text().trim().is_empty() {
            return Err(ViewBuildError::MissingField("label"));
        }
        ensure_len("label", label.text(), MAX_LABEL_CHARS)?;
        if element.action_id.trim().is_empty() {
            return Err(ViewBuildError::MissingField("action_id"));
        }

        let min = element.min_length.unwrap_or(0);
        let max = element.max_length.unwrap_or(MAX_INPUT_LENGTH);
        if min > max || max > MAX_INPUT_LENGTH {
            return Err(ViewBuildError::InvalidLengthRange(element.action_id.clone()));
        }
    }

    Ok(())
}

/// The form shown after the slash command. The originating channel rides along
/// in `private_metadata` so submissions can be traced back to it.
pub fn query_modal(origin_channel: &ChannelId) -> Result<ModalView, ViewBuildError> {
    ModalBuilder::new(QUERY_MODAL_CALLBACK_ID)
        .title("Run a query")
        .submit("Submit")
        .close("Cancel")
        .private_metadata(origin_channel.as_str())
        .input(
            QUERY_BLOCK_ID,
            "Query",
            PlainTextInput::new(QUERY_ACTION_ID)
                .multiline(true)
                .placeholder("SELECT ...")
                .length(1, MAX_INPUT_LENGTH),
        )
        .build()
}

pub fn submission_confirmation(display_name: &str, query: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Hi {display_name}, your query was received."))
        .section("query.confirmation.summary.v1", |section| {
            section.mrkdwn(format!("Hi {display_name}, your query was received:"));
        })
        .section("query.confirmation.query.v1", |section| {
            let room = MAX_SECTION_TEXT_CHARS - 2 * CODE_FENCE.len();
            section.mrkdwn(format!("{CODE_FENCE}{}{CODE_FENCE}", truncate_chars(query, room)));
        })
        .build()
}

pub fn error_message(error: &QueryBotError, correlation_id: &str) -> MessageTemplate {
    let summary = error.user_message();
    MessageBuilder::new(summary.clone())
        .section("query.error.summary.v1", |section| {
            section.mrkdwn(summary);
        })
        .context("query.error.context.v1", |context| {
            context.plain(format!("Error kind: {}", error.kind().as_str()));
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn unhandled_error_message(detail: &str, correlation_id: &str) -> MessageTemplate {
    let summary = format!(":warning: Something went wrong handling that request. Error: {detail}");
    MessageBuilder::new(summary.clone())
        .section("query.unhandled.summary.v1", |section| {
            section.mrkdwn(summary);
        })
        .context("query.unhandled.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}
