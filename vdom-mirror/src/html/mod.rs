//! In-memory live tree.
//!
//! `LiveDocument` stands in for a browser document: it is built from markup
//! with `html5gum` (or node by node), carries the runtime state a browser
//! exposes (control values, canvas pixels, media playback, scroll offsets,
//! iframe content) and owns the identity side-table that keeps ids stable
//! across synchronization walks.
//!
//! Tree construction is deliberately small: implicit closing of `p`, `li`,
//! `td`/`th` and `tr`, void elements, and raw text inside `<script>` and
//! `<style>`. No `html`/`head`/`body` elements are synthesized.

use crate::dom::DocumentTypeData;
use crate::live::{LiveTree, MediaState, NodeRecord};
use generational_arena::{Arena, Index};
use html5gum::{Token, Tokenizer};
use std::collections::HashMap;
use string_cache::DefaultAtom;

pub type LiveKey = Index;

pub const ELEMENT_NODE: u16 = 1;
pub const TEXT_NODE: u16 = 3;
pub const CDATA_SECTION_NODE: u16 = 4;
pub const PROCESSING_INSTRUCTION_NODE: u16 = 7;
pub const COMMENT_NODE: u16 = 8;
pub const DOCUMENT_NODE: u16 = 9;
pub const DOCUMENT_TYPE_NODE: u16 = 10;

#[derive(Debug, Clone, Default)]
pub struct ControlState {
    pub value: Option<String>,
    pub checked: bool,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct LiveNode {
    pub native_type: u16,
    pub tag_name: Option<DefaultAtom>,
    /// Overrides the reported tag name, the way a named form control can
    /// shadow `form.tagName`.
    pub reported_tag_name: Option<String>,
    pub attributes: Vec<(DefaultAtom, String)>,
    pub text: Option<String>,
    pub doctype: Option<DocumentTypeData>,
    pub control: ControlState,
    pub canvas_data_url: Option<String>,
    pub media: Option<MediaState>,
    pub scroll: (f64, f64),
    pub content_document: Option<LiveKey>,
    parent: Option<LiveKey>,
    children: Vec<LiveKey>,
}

impl LiveNode {
    fn new(native_type: u16) -> Self {
        LiveNode {
            native_type,
            tag_name: None,
            reported_tag_name: None,
            attributes: Vec::new(),
            text: None,
            doctype: None,
            control: ControlState::default(),
            canvas_data_url: None,
            media: None,
            scroll: (0.0, 0.0),
            content_document: None,
            parent: None,
            children: Vec::new(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v.as_str())
    }

    fn is_tag(&self, tag: &str) -> bool {
        self.tag_name.as_deref() == Some(tag)
    }
}

#[derive(Debug)]
pub struct LiveDocument {
    pub nodes: Arena<LiveNode>,
    root: LiveKey,
    records: HashMap<LiveKey, NodeRecord>,
}

impl Default for LiveDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveDocument {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = nodes.insert(LiveNode::new(DOCUMENT_NODE));
        LiveDocument {
            nodes,
            root,
            records: HashMap::new(),
        }
    }

    pub fn root_key(&self) -> LiveKey {
        self.root
    }

    /// Parses markup into a fresh live document.
    pub fn parse(html: &str) -> Self {
        let mut doc = LiveDocument::new();
        let root = doc.root;
        doc.parse_into(root, html);
        doc
    }

    /// Parses markup and appends the resulting nodes under `parent`.
    pub fn parse_into(&mut self, parent: LiveKey, html: &str) {
        let mut current_parent = parent;
        let mut inside_raw_tag: Option<DefaultAtom> = None;

        for token in Tokenizer::new(html).infallible() {
            match token {
                Token::StartTag(tag) => {
                    let tag_name_str = std::str::from_utf8(&tag.name).unwrap_or("");
                    let tag_name = DefaultAtom::from(tag_name_str.to_ascii_lowercase());

                    if inside_raw_tag.is_some() {
                        let mut raw = format!("<{tag_name_str}");
                        for (k, v) in tag.attributes.iter() {
                            let k_str = std::str::from_utf8(k).unwrap_or("");
                            let v_str = std::str::from_utf8(v).unwrap_or("");
                            raw.push_str(&format!(" {k_str}=\"{v_str}\""));
                        }
                        raw.push_str(if tag.self_closing { "/>" } else { ">" });
                        self.push_text(current_parent, &raw);
                        continue;
                    }

                    if &*tag_name == "style" || &*tag_name == "script" {
                        inside_raw_tag = Some(tag_name.clone());
                    }

                    current_parent = self.close_implied(current_parent, parent, &tag_name);

                    let node = self.create_element(&tag_name);
                    for (key, value) in tag.attributes {
                        if let (Ok(k_str), Ok(v_str)) =
                            (std::str::from_utf8(&key), std::str::from_utf8(&value))
                        {
                            self.set_attribute(node, k_str, v_str);
                        }
                    }
                    self.append(current_parent, node);

                    if !is_void(&tag_name) && !tag.self_closing {
                        current_parent = node;
                    }
                }
                Token::EndTag(tag) => {
                    let tag_name_str = std::str::from_utf8(&tag.name).unwrap_or("");
                    let tag_name = DefaultAtom::from(tag_name_str.to_ascii_lowercase());

                    if let Some(raw) = &inside_raw_tag {
                        if *raw != tag_name {
                            self.push_text(current_parent, &format!("</{tag_name_str}>"));
                            continue;
                        }
                        inside_raw_tag = None;
                    }

                    let mut cursor = Some(current_parent);
                    while let Some(key) = cursor {
                        if key == parent {
                            break;
                        }
                        if self.nodes.get(key).is_some_and(|n| n.is_tag(&tag_name)) {
                            current_parent = self.parent_of(key).unwrap_or(parent);
                            break;
                        }
                        cursor = self.parent_of(key);
                    }
                }
                Token::String(s) => {
                    let text = std::str::from_utf8(&s).unwrap_or("");
                    if text.is_empty() {
                        continue;
                    }
                    let at_document_level = self
                        .nodes
                        .get(current_parent)
                        .is_some_and(|n| n.native_type == DOCUMENT_NODE);
                    if at_document_level && text.trim().is_empty() {
                        continue;
                    }
                    self.push_text(current_parent, text);
                }
                Token::Comment(s) => {
                    let text = String::from_utf8_lossy(&s).into_owned();
                    let node = self.create_comment(&text);
                    self.append(current_parent, node);
                }
                Token::Doctype(doctype) => {
                    let data = DocumentTypeData {
                        name: String::from_utf8_lossy(&doctype.name).into_owned(),
                        public_id: doctype
                            .public_identifier
                            .as_ref()
                            .map(|s| String::from_utf8_lossy(s).into_owned())
                            .unwrap_or_default(),
                        system_id: doctype
                            .system_identifier
                            .as_ref()
                            .map(|s| String::from_utf8_lossy(s).into_owned())
                            .unwrap_or_default(),
                    };
                    let node = self.create_doctype(data);
                    self.append(current_parent, node);
                }
                Token::Error(_) => {}
            }
        }
    }

    /// Walks up from `current` to find an element implicitly closed by
    /// `tag_name`, stopping at block boundaries. Returns the new insertion
    /// parent.
    fn close_implied(&self, current: LiveKey, scope: LiveKey, tag_name: &str) -> LiveKey {
        let mut check = current;
        while check != scope {
            let Some(node) = self.nodes.get(check) else { break };
            let Some(open) = node.tag_name.as_deref() else { break };
            let closes = match tag_name {
                "li" => open == "li",
                "td" | "th" => open == "td" || open == "th",
                "tr" => open == "tr",
                "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" | "table" => {
                    open == "p"
                }
                "option" => open == "option",
                _ => false,
            };
            if closes {
                return self.parent_of(check).unwrap_or(scope);
            }
            if matches!(open, "div" | "body" | "td" | "th" | "table" | "select") {
                break;
            }
            match self.parent_of(check) {
                Some(parent) => check = parent,
                None => break,
            }
        }
        current
    }

    fn push_text(&mut self, parent: LiveKey, text: &str) {
        if let Some(&last) = self.nodes.get(parent).and_then(|p| p.children.last()) {
            if let Some(node) = self.nodes.get_mut(last) {
                if node.native_type == TEXT_NODE {
                    node.text.get_or_insert_with(String::new).push_str(text);
                    return;
                }
            }
        }
        let node = self.create_text(text);
        self.append(parent, node);
    }

    // ---------------------------------------------------------------------
    // Construction and mutation
    // ---------------------------------------------------------------------

    /// A node of an arbitrary native kind, detached.
    pub fn create_node(&mut self, native_type: u16) -> LiveKey {
        self.nodes.insert(LiveNode::new(native_type))
    }

    pub fn create_element(&mut self, tag_name: &str) -> LiveKey {
        let mut node = LiveNode::new(ELEMENT_NODE);
        node.tag_name = Some(DefaultAtom::from(tag_name.to_ascii_lowercase()));
        self.nodes.insert(node)
    }

    pub fn create_text(&mut self, text: &str) -> LiveKey {
        let mut node = LiveNode::new(TEXT_NODE);
        node.text = Some(text.to_owned());
        self.nodes.insert(node)
    }

    pub fn create_comment(&mut self, text: &str) -> LiveKey {
        let mut node = LiveNode::new(COMMENT_NODE);
        node.text = Some(text.to_owned());
        self.nodes.insert(node)
    }

    pub fn create_cdata(&mut self, text: &str) -> LiveKey {
        let mut node = LiveNode::new(CDATA_SECTION_NODE);
        node.text = Some(text.to_owned());
        self.nodes.insert(node)
    }

    pub fn create_doctype(&mut self, doctype: DocumentTypeData) -> LiveKey {
        let mut node = LiveNode::new(DOCUMENT_TYPE_NODE);
        node.doctype = Some(doctype);
        self.nodes.insert(node)
    }

    /// A detached document root, usable as an iframe's content document.
    pub fn create_document(&mut self) -> LiveKey {
        self.create_node(DOCUMENT_NODE)
    }

    pub fn append(&mut self, parent: LiveKey, child: LiveKey) {
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    pub fn remove(&mut self, child: LiveKey) {
        self.detach(child);
    }

    fn detach(&mut self, child: LiveKey) {
        let Some(parent) = self.nodes.get_mut(child).and_then(|c| c.parent.take()) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|&c| c != child);
        }
    }

    pub fn parent_of(&self, node: LiveKey) -> Option<LiveKey> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    pub fn children_of(&self, node: LiveKey) -> &[LiveKey] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_attribute(&mut self, node: LiveKey, name: &str, value: &str) {
        let Some(n) = self.nodes.get_mut(node) else { return };
        match n.attributes.iter_mut().find(|(k, _)| &**k == name) {
            Some(entry) => entry.1 = value.to_owned(),
            None => n.attributes.push((DefaultAtom::from(name), value.to_owned())),
        }
    }

    pub fn set_text(&mut self, node: LiveKey, text: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.text = Some(text.to_owned());
        }
    }

    pub fn set_value(&mut self, node: LiveKey, value: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.control.value = Some(value.to_owned());
        }
    }

    pub fn set_checked(&mut self, node: LiveKey, checked: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.control.checked = checked;
        }
    }

    pub fn set_selected(&mut self, node: LiveKey, selected: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.control.selected = selected;
        }
    }

    pub fn set_canvas_data_url(&mut self, node: LiveKey, data_url: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.canvas_data_url = Some(data_url.to_owned());
        }
    }

    pub fn set_media_state(&mut self, node: LiveKey, state: MediaState) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.media = Some(state);
        }
    }

    pub fn set_scroll(&mut self, node: LiveKey, left: f64, top: f64) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.scroll = (left, top);
        }
    }

    pub fn set_content_document(&mut self, iframe: LiveKey, document: LiveKey) {
        if let Some(n) = self.nodes.get_mut(iframe) {
            n.content_document = Some(document);
        }
    }

    pub fn set_reported_tag_name(&mut self, node: LiveKey, name: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.reported_tag_name = Some(name.to_owned());
        }
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// Every node under `scope` (inclusive) in document order.
    pub fn descendants(&self, scope: LiveKey) -> Vec<LiveKey> {
        let mut out = Vec::new();
        let mut stack = vec![scope];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else { continue };
            out.push(key);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn find_by_tag(&self, tag_name: &str) -> Option<LiveKey> {
        self.descendants(self.root)
            .into_iter()
            .find(|&k| self.nodes.get(k).is_some_and(|n| n.is_tag(tag_name)))
    }

    pub fn find_by_id(&self, id: &str) -> Option<LiveKey> {
        self.descendants(self.root)
            .into_iter()
            .find(|&k| self.nodes.get(k).and_then(|n| n.attribute("id")) == Some(id))
    }

    /// Forgets every stamped identity record.
    pub fn clear_records(&mut self) {
        self.records.clear();
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The selected option of `select`, or its first option when none is
    /// selected.
    fn selected_option(&self, select: LiveKey) -> Option<LiveKey> {
        let options: Vec<LiveKey> = self
            .descendants(select)
            .into_iter()
            .filter(|&k| self.nodes.get(k).is_some_and(|n| n.is_tag("option")))
            .collect();
        options
            .iter()
            .copied()
            .find(|&k| self.nodes.get(k).is_some_and(|n| n.control.selected))
            .or_else(|| options.first().copied())
    }

    fn owning_select(&self, option: LiveKey) -> Option<LiveKey> {
        let parent = self.parent_of(option)?;
        let node = self.nodes.get(parent)?;
        if node.is_tag("select") {
            return Some(parent);
        }
        if node.is_tag("optgroup") {
            let grandparent = self.parent_of(parent)?;
            return self
                .nodes
                .get(grandparent)
                .is_some_and(|n| n.is_tag("select"))
                .then_some(grandparent);
        }
        None
    }

    fn select_value(&self, select: LiveKey) -> Option<String> {
        self.selected_option(select).map(|o| self.option_value(o))
    }

    /// An option's `value` attribute, else its trimmed text.
    fn option_value(&self, option: LiveKey) -> String {
        if let Some(value) = self.nodes.get(option).and_then(|n| n.attribute("value")) {
            return value.to_owned();
        }
        self.descendants(option)
            .into_iter()
            .filter_map(|k| self.nodes.get(k))
            .filter(|n| n.native_type == TEXT_NODE)
            .filter_map(|n| n.text.as_deref())
            .collect::<String>()
            .trim()
            .to_owned()
    }
}

fn is_void(tag_name: &str) -> bool {
    matches!(
        tag_name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    )
}

impl LiveTree for LiveDocument {
    type Handle = LiveKey;

    fn root(&self) -> LiveKey {
        self.root
    }

    fn native_node_type(&self, node: LiveKey) -> u16 {
        self.nodes.get(node).map(|n| n.native_type).unwrap_or(0)
    }

    fn parent(&self, node: LiveKey) -> Option<LiveKey> {
        self.parent_of(node)
    }

    fn child_nodes(&self, node: LiveKey) -> Vec<LiveKey> {
        self.children_of(node).to_vec()
    }

    /// Reported in upper case, as browsers do for HTML elements.
    fn tag_name(&self, node: LiveKey) -> Option<String> {
        let n = self.nodes.get(node)?;
        if let Some(reported) = &n.reported_tag_name {
            return Some(reported.clone());
        }
        n.tag_name.as_ref().map(|t| (**t).to_ascii_uppercase())
    }

    fn attributes(&self, node: LiveKey) -> Vec<(String, String)> {
        self.nodes
            .get(node)
            .map(|n| {
                n.attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn text_content(&self, node: LiveKey) -> Option<String> {
        self.nodes.get(node).and_then(|n| n.text.clone())
    }

    fn doctype(&self, node: LiveKey) -> Option<DocumentTypeData> {
        self.nodes.get(node).and_then(|n| n.doctype.clone())
    }

    fn record(&self, node: LiveKey) -> Option<NodeRecord> {
        self.records.get(&node).cloned()
    }

    fn stamp(&mut self, node: LiveKey, record: NodeRecord) {
        self.records.insert(node, record);
    }

    fn is_form_element(&self, node: LiveKey) -> bool {
        self.nodes.get(node).is_some_and(|n| n.is_tag("form"))
    }

    fn value(&self, node: LiveKey) -> Option<String> {
        let n = self.nodes.get(node)?;
        if let Some(value) = &n.control.value {
            return Some(value.clone());
        }
        if n.is_tag("select") {
            return self.select_value(node);
        }
        n.attribute("value").map(str::to_owned)
    }

    fn checked(&self, node: LiveKey) -> bool {
        self.nodes.get(node).is_some_and(|n| n.control.checked)
    }

    /// The first option of a select counts as selected until another is.
    fn selected(&self, node: LiveKey) -> bool {
        let Some(n) = self.nodes.get(node) else { return false };
        n.control.selected
            || (n.is_tag("option")
                && self
                    .owning_select(node)
                    .is_some_and(|select| self.selected_option(select) == Some(node)))
    }

    fn canvas_data_url(&self, node: LiveKey) -> Option<String> {
        self.nodes.get(node).and_then(|n| n.canvas_data_url.clone())
    }

    fn media_state(&self, node: LiveKey) -> Option<MediaState> {
        self.nodes.get(node).and_then(|n| n.media)
    }

    fn scroll_offset(&self, node: LiveKey) -> (f64, f64) {
        self.nodes.get(node).map(|n| n.scroll).unwrap_or((0.0, 0.0))
    }

    fn content_document(&self, node: LiveKey) -> Option<LiveKey> {
        self.nodes.get(node).and_then(|n| n.content_document)
    }
}
