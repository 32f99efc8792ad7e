//! Contract between the synchronizer and the live tree it mirrors.
//!
//! A live tree is anything that can hand out node handles, report each
//! node's native kind, and remember the identity record that was stamped
//! on it by an earlier walk. The record side-table belongs to the host:
//! the mirror table inside a `Document` is cleared on every walk, so id
//! stability across walks comes entirely from `LiveTree::record`.

use crate::dom::{DocumentTypeData, NodeType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicI32, Ordering};

/// Node kind as written in a serialized identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RecordKind {
    Document,
    DocumentType,
    Element,
    Text,
    CDataSection,
    Comment,
}

impl From<RecordKind> for u8 {
    fn from(kind: RecordKind) -> u8 {
        match kind {
            RecordKind::Document => 0,
            RecordKind::DocumentType => 1,
            RecordKind::Element => 2,
            RecordKind::Text => 3,
            RecordKind::CDataSection => 4,
            RecordKind::Comment => 5,
        }
    }
}

impl TryFrom<u8> for RecordKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => RecordKind::Document,
            1 => RecordKind::DocumentType,
            2 => RecordKind::Element,
            3 => RecordKind::Text,
            4 => RecordKind::CDataSection,
            5 => RecordKind::Comment,
            other => return Err(format!("unknown record kind {other}")),
        })
    }
}

impl From<NodeType> for RecordKind {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Document => RecordKind::Document,
            NodeType::DocumentType => RecordKind::DocumentType,
            NodeType::Element => RecordKind::Element,
            NodeType::Text => RecordKind::Text,
            NodeType::CDataSection => RecordKind::CDataSection,
            NodeType::Comment => RecordKind::Comment,
        }
    }
}

/// Identity record attached to a recorded node: `{id, type, textContent?, rootId?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: i32,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<i32>,
}

impl NodeRecord {
    pub fn new(id: i32, kind: RecordKind) -> Self {
        Self {
            id,
            kind,
            text_content: None,
            root_id: None,
        }
    }
}

/// Maps the live environment's native node-kind constants onto the
/// variants this crate mirrors. Fragments, processing instructions,
/// attributes and entity nodes have no mapping.
pub fn node_type_from_native(native: u16) -> Option<NodeType> {
    match native {
        1 => Some(NodeType::Element),
        3 => Some(NodeType::Text),
        4 => Some(NodeType::CDataSection),
        8 => Some(NodeType::Comment),
        9 => Some(NodeType::Document),
        10 => Some(NodeType::DocumentType),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    pub paused: bool,
    pub current_time: f64,
}

impl Default for MediaState {
    fn default() -> Self {
        MediaState {
            paused: true,
            current_time: 0.0,
        }
    }
}

/// Read access to a live document plus the ambient identity side-table.
///
/// Only the structural methods are required; the runtime-state queries
/// default to "nothing to capture" so that hosts without form controls,
/// canvases or media can skip them.
pub trait LiveTree {
    type Handle: Copy + Eq + Hash + fmt::Debug;

    fn root(&self) -> Self::Handle;
    /// Native node-kind constant (1 = element, 3 = text, 9 = document, ...).
    fn native_node_type(&self, node: Self::Handle) -> u16;
    fn parent(&self, node: Self::Handle) -> Option<Self::Handle>;
    fn child_nodes(&self, node: Self::Handle) -> Vec<Self::Handle>;
    fn tag_name(&self, node: Self::Handle) -> Option<String>;
    fn attributes(&self, node: Self::Handle) -> Vec<(String, String)>;
    fn text_content(&self, node: Self::Handle) -> Option<String>;
    fn doctype(&self, node: Self::Handle) -> Option<DocumentTypeData>;

    fn record(&self, node: Self::Handle) -> Option<NodeRecord>;
    fn stamp(&mut self, node: Self::Handle, record: NodeRecord);

    /// True for form elements even when their reported tag name is shadowed.
    fn is_form_element(&self, _node: Self::Handle) -> bool {
        false
    }

    /// Current value of an `input`, `textarea` or `select`.
    fn value(&self, _node: Self::Handle) -> Option<String> {
        None
    }

    fn checked(&self, _node: Self::Handle) -> bool {
        false
    }

    fn selected(&self, _node: Self::Handle) -> bool {
        false
    }

    fn canvas_data_url(&self, _node: Self::Handle) -> Option<String> {
        None
    }

    fn media_state(&self, _node: Self::Handle) -> Option<MediaState> {
        None
    }

    /// `(scroll_left, scroll_top)`.
    fn scroll_offset(&self, _node: Self::Handle) -> (f64, f64) {
        (0.0, 0.0)
    }

    /// Content document of an iframe, when the host can reach it.
    fn content_document(&self, _node: Self::Handle) -> Option<Self::Handle> {
        None
    }
}

/// Source of ids for nodes that arrive without a record.
///
/// Generated ids are negative and strictly decreasing.
pub trait IdSource: fmt::Debug {
    fn next_id(&mut self) -> i32;
}

static PROCESS_NEXT_ID: AtomicI32 = AtomicI32::new(-1);

/// Process-wide counter shared by every document.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessIds;

impl IdSource for ProcessIds {
    fn next_id(&mut self) -> i32 {
        PROCESS_NEXT_ID.fetch_sub(1, Ordering::Relaxed)
    }
}

/// Counter private to one document.
#[derive(Debug, Clone)]
pub struct LocalIds {
    next: i32,
}

impl Default for LocalIds {
    fn default() -> Self {
        LocalIds { next: -1 }
    }
}

impl IdSource for LocalIds {
    fn next_id(&mut self) -> i32 {
        let id = self.next;
        self.next -= 1;
        id
    }
}
