//! Arena-backed virtual document.
//!
//! All nodes of a `Document` live in one `generational_arena::Arena` and
//! are linked as an intrusive sibling list with a parent back-reference.
//! A `NodeKey` is only meaningful for the document that issued it; an
//! iframe's content document has its own arena.
//!
//! The mutation contract mirrors a browser tree: leaf nodes reject
//! children, the document keeps at most one element and one doctype
//! child, `insert_before` requires a current child as reference, and
//! `remove_child` on a non-child is a no-op. Every check runs before the
//! tree is touched.

mod element;

pub use element::{
    AttrValue, Attributes, CANVAS_DATA_URL_ATTR, ElementData, ElementKind, ElementVariant,
    IframeData, ImageData, MediaData, ScrollToOptions, ShadowRootMode, Window, element_kind_for,
    valid_tag_name,
};

use crate::css::{self, CssProperties, StyleView};
use crate::error::{DomError, DomResult};
use crate::live::{IdSource, NodeRecord, ProcessIds};
use crate::mirror::Mirror;
use generational_arena::{Arena, Index};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

pub type NodeKey = Index;

/// Node discriminant, derived from the variant. Values match the DOM's
/// `nodeType` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum NodeType {
    Element,
    Text,
    CDataSection,
    Comment,
    Document,
    DocumentType,
}

impl From<NodeType> for u16 {
    fn from(node_type: NodeType) -> u16 {
        match node_type {
            NodeType::Element => 1,
            NodeType::Text => 3,
            NodeType::CDataSection => 4,
            NodeType::Comment => 8,
            NodeType::Document => 9,
            NodeType::DocumentType => 10,
        }
    }
}

impl TryFrom<u16> for NodeType {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        crate::live::node_type_from_native(value).ok_or_else(|| format!("unknown node type {value}"))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeType::Element => "element",
            NodeType::Text => "text",
            NodeType::CDataSection => "cdata-section",
            NodeType::Comment => "comment",
            NodeType::Document => "document",
            NodeType::DocumentType => "doctype",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeData {
    pub name: String,
    pub public_id: String,
    pub system_id: String,
}

#[derive(Debug)]
pub enum NodeData {
    Document,
    DocumentType(DocumentTypeData),
    Element(ElementData),
    Text(String),
    Comment(String),
    CDataSection(String),
}

#[derive(Debug)]
pub struct Node {
    /// External id from the node's record, or a generated negative id.
    pub id: i32,
    /// Identity record the node was built from, if it came from a live tree.
    pub record: Option<NodeRecord>,
    pub data: NodeData,
    parent: Option<NodeKey>,
    first_child: Option<NodeKey>,
    last_child: Option<NodeKey>,
    prev_sibling: Option<NodeKey>,
    next_sibling: Option<NodeKey>,
}

impl Node {
    fn new(id: i32, record: Option<NodeRecord>, data: NodeData) -> Self {
        Node {
            id,
            record,
            data,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.data {
            NodeData::Document => NodeType::Document,
            NodeData::DocumentType(_) => NodeType::DocumentType,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
            NodeData::CDataSection(_) => NodeType::CDataSection,
        }
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Payload of a text, comment or CDATA node.
    pub fn character_data(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(s) | NodeData::Comment(s) | NodeData::CDataSection(s) => Some(s),
            _ => None,
        }
    }

    fn accepts_children(&self) -> bool {
        matches!(self.data, NodeData::Document | NodeData::Element(_))
    }
}

pub struct Children<'a> {
    document: &'a Document,
    next: Option<NodeKey>,
}

impl Iterator for Children<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let current = self.next?;
        self.next = self.document.nodes.get(current).and_then(|n| n.next_sibling);
        Some(current)
    }
}

/// Serializable view of a subtree as a flat node list in document order.
/// `nodes[0]` is the subtree root; links are positions in `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    pub fn root(&self) -> Option<&NodeSnapshot> {
        self.nodes.first()
    }

    /// The `n`th child of the node at `position`.
    pub fn child(&self, position: usize, n: usize) -> Option<&NodeSnapshot> {
        let index = *self.nodes.get(position)?.children.get(n)?;
        self.nodes.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: i32,
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, AttrValue)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctype: Option<DocumentTypeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_document: Option<Box<TreeSnapshot>>,
}

#[derive(Debug)]
pub struct Document {
    nodes: Arena<Node>,
    root: NodeKey,
    mirror: Mirror,
    window: Window,
    ids: Box<dyn IdSource>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_id_source(Box::new(ProcessIds))
    }

    pub fn with_id_source(mut ids: Box<dyn IdSource>) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.insert(Node::new(ids.next_id(), None, NodeData::Document));
        Document {
            nodes,
            root,
            mirror: Mirror::new(),
            window: Window::default(),
            ids,
        }
    }

    /// Key of the document node itself.
    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut Mirror {
        &mut self.mirror
    }

    pub fn next_id(&mut self) -> i32 {
        self.ids.next_id()
    }

    /// Number of live arena slots, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    fn get(&self, key: NodeKey) -> DomResult<&Node> {
        self.nodes.get(key).ok_or(DomError::UnknownNode(key))
    }

    fn get_mut(&mut self, key: NodeKey) -> DomResult<&mut Node> {
        self.nodes.get_mut(key).ok_or(DomError::UnknownNode(key))
    }

    pub fn element(&self, key: NodeKey) -> Option<&ElementData> {
        self.nodes.get(key).and_then(Node::as_element)
    }

    pub fn element_mut(&mut self, key: NodeKey) -> Option<&mut ElementData> {
        self.nodes.get_mut(key).and_then(Node::as_element_mut)
    }

    fn element_for(&mut self, key: NodeKey, operation: &'static str) -> DomResult<&mut ElementData> {
        let node = self.get_mut(key)?;
        let node_type = node.node_type();
        node.as_element_mut()
            .ok_or(DomError::Unsupported { operation, node_type })
    }

    pub fn node_type(&self, key: NodeKey) -> Option<NodeType> {
        self.nodes.get(key).map(Node::node_type)
    }

    pub fn node_id(&self, key: NodeKey) -> Option<i32> {
        self.nodes.get(key).map(|n| n.id)
    }

    pub fn record(&self, key: NodeKey) -> Option<&NodeRecord> {
        self.nodes.get(key).and_then(|n| n.record.as_ref())
    }

    // ---------------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------------

    pub fn parent_node(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(|n| n.parent)
    }

    /// The parent, only when it is an element.
    pub fn parent_element(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent_node(key)?;
        self.element(parent).map(|_| parent)
    }

    pub fn first_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(|n| n.first_child)
    }

    pub fn last_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(|n| n.last_child)
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(|n| n.next_sibling)
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key).and_then(|n| n.prev_sibling)
    }

    pub fn children(&self, key: NodeKey) -> Children<'_> {
        Children {
            document: self,
            next: self.first_child(key),
        }
    }

    pub fn child_nodes(&self, key: NodeKey) -> Vec<NodeKey> {
        self.children(key).collect()
    }

    /// Next node after `current` in document order, staying inside `scope`.
    fn next_in_scope(&self, current: NodeKey, scope: NodeKey) -> Option<NodeKey> {
        if let Some(child) = self.first_child(current) {
            return Some(child);
        }
        let mut node = current;
        loop {
            if node == scope {
                return None;
            }
            if let Some(next) = self.next_sibling(node) {
                return Some(next);
            }
            node = self.parent_node(node)?;
        }
    }

    /// `scope` followed by all of its descendants in document order.
    pub fn descendants(&self, scope: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if !self.nodes.contains(scope) {
            return out;
        }
        let mut cursor = Some(scope);
        while let Some(key) = cursor {
            out.push(key);
            cursor = self.next_in_scope(key, scope);
        }
        out
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut cursor = Some(node);
        while let Some(key) = cursor {
            if key == ancestor {
                return true;
            }
            cursor = self.parent_node(key);
        }
        false
    }

    /// Always fails: containment checks are not modelled.
    pub fn contains(&self, _node: NodeKey, _other: NodeKey) -> DomResult<bool> {
        Err(DomError::NotImplemented {
            operation: "contains",
        })
    }

    // ---------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------

    fn check_insert(
        &self,
        parent: NodeKey,
        child: NodeKey,
        operation: &'static str,
    ) -> DomResult<()> {
        let parent_node = self.get(parent)?;
        let child_type = self.get(child)?.node_type();
        let parent_type = parent_node.node_type();

        if !parent_node.accepts_children() {
            return Err(DomError::Unsupported {
                operation,
                node_type: parent_type,
            });
        }
        if child_type == NodeType::Document {
            return Err(DomError::HierarchyRequest {
                reason: "a document cannot be inserted as a child",
            });
        }
        // A childless node can only be an inclusive ancestor of itself.
        let may_contain_parent = child == parent || self.first_child(child).is_some();
        if may_contain_parent && self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest {
                reason: "a node cannot be inserted into itself or its descendants",
            });
        }
        if parent_type == NodeType::Document
            && matches!(child_type, NodeType::Element | NodeType::DocumentType)
        {
            let duplicate = self
                .children(parent)
                .any(|c| c != child && self.node_type(c) == Some(child_type));
            if duplicate {
                return Err(DomError::DuplicateRoot {
                    node_type: child_type,
                });
            }
        }
        Ok(())
    }

    /// Unlinks `child` from its parent, if any. Returns the old parent.
    fn detach(&mut self, child: NodeKey) -> Option<NodeKey> {
        let node = self.nodes.get_mut(child)?;
        let parent = node.parent.take()?;
        let prev = node.prev_sibling.take();
        let next = node.next_sibling.take();

        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(prev_node) => prev_node.next_sibling = next,
            None => {
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.first_child = next;
                }
            }
        }
        match next.and_then(|n| self.nodes.get_mut(n)) {
            Some(next_node) => next_node.prev_sibling = prev,
            None => {
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.last_child = prev;
                }
            }
        }
        Some(parent)
    }

    /// Links a detached `child` under `parent`, before `reference` or last.
    fn link(&mut self, parent: NodeKey, child: NodeKey, reference: Option<NodeKey>) {
        let prev = match reference {
            Some(r) => self.previous_sibling(r),
            None => self.last_child(parent),
        };

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = reference;
        }
        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(prev_node) => prev_node.next_sibling = Some(child),
            None => {
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.first_child = Some(child);
                }
            }
        }
        match reference.and_then(|r| self.nodes.get_mut(r)) {
            Some(ref_node) => ref_node.prev_sibling = Some(child),
            None => {
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.last_child = Some(child);
                }
            }
        }
    }

    /// Appends `child` as the last child of `parent`, moving it out of its
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> DomResult<NodeKey> {
        self.check_insert(parent, child, "appendChild")?;
        self.detach(child);
        self.link(parent, child, None);
        trace!(?parent, ?child, "appended child");
        Ok(child)
    }

    /// Inserts `child` immediately before `reference`; `None` appends.
    pub fn insert_before(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        reference: Option<NodeKey>,
    ) -> DomResult<NodeKey> {
        let Some(reference) = reference else {
            return self.append_child(parent, child);
        };
        self.check_insert(parent, child, "insertBefore")?;
        if self.parent_node(reference) != Some(parent) {
            return Err(DomError::ReferenceNotFound);
        }
        if child == reference {
            return Ok(child);
        }
        self.detach(child);
        self.link(parent, child, Some(reference));
        trace!(?parent, ?child, ?reference, "inserted child");
        Ok(child)
    }

    /// Detaches `child` if it is a child of `parent`. Returns whether
    /// anything was removed; a non-child is left alone.
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> bool {
        if self.parent_node(child) != Some(parent) {
            return false;
        }
        self.detach(child);
        true
    }

    /// Detaches `key` and frees it together with all of its descendants,
    /// dropping their mirror registrations.
    pub fn destroy_subtree(&mut self, key: NodeKey) -> DomResult<()> {
        if key == self.root {
            return Err(DomError::HierarchyRequest {
                reason: "the document node cannot be destroyed",
            });
        }
        self.get(key)?;
        self.detach(key);
        for node in self.descendants(key) {
            if let Some(removed) = self.nodes.remove(node) {
                if self.mirror.lookup(removed.id) == Some(node) {
                    self.mirror.unregister(removed.id);
                }
            }
        }
        Ok(())
    }

    /// Drops every node except the document node and clears the mirror.
    pub fn reset_tree(&mut self) {
        let root = self.root;
        self.mirror.clear();
        self.nodes.retain(|key, _| key == root);
        if let Some(node) = self.nodes.get_mut(root) {
            node.first_child = None;
            node.last_child = None;
        }
    }

    // ---------------------------------------------------------------------
    // Text
    // ---------------------------------------------------------------------

    /// Payload of a character-data node, or the concatenated text of all
    /// descendant text and CDATA nodes of an element. `None` for the
    /// document and doctype nodes.
    pub fn text_content(&self, key: NodeKey) -> Option<String> {
        let node = self.nodes.get(key)?;
        match &node.data {
            NodeData::Text(s) | NodeData::Comment(s) | NodeData::CDataSection(s) => {
                Some(s.clone())
            }
            NodeData::Element(_) => {
                let mut out = String::new();
                for d in self.descendants(key) {
                    if let Some(NodeData::Text(s) | NodeData::CDataSection(s)) =
                        self.nodes.get(d).map(|n| &n.data)
                    {
                        out.push_str(s);
                    }
                }
                Some(out)
            }
            NodeData::Document | NodeData::DocumentType(_) => None,
        }
    }

    /// Replaces a character-data payload, or replaces all children of an
    /// element with a single text node. No effect on document or doctype.
    pub fn set_text_content(&mut self, key: NodeKey, text: &str) -> DomResult<()> {
        match self.get(key)?.node_type() {
            NodeType::Element => {
                for child in self.child_nodes(key) {
                    self.detach(child);
                }
                if !text.is_empty() {
                    let text_node = self.create_text_node(text);
                    self.link(key, text_node, None);
                }
            }
            NodeType::Text | NodeType::Comment | NodeType::CDataSection => {
                if let Some(
                    NodeData::Text(s) | NodeData::Comment(s) | NodeData::CDataSection(s),
                ) = self.nodes.get_mut(key).map(|n| &mut n.data)
                {
                    *s = text.to_owned();
                }
            }
            NodeType::Document | NodeType::DocumentType => {}
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Element operations
    // ---------------------------------------------------------------------

    pub fn get_attribute(&self, key: NodeKey, name: &str) -> Option<&AttrValue> {
        self.element(key).and_then(|e| e.attributes.get(name))
    }

    pub fn set_attribute(
        &mut self,
        key: NodeKey,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> DomResult<()> {
        self.element_for(key, "setAttribute")?
            .attributes
            .set(name, value);
        Ok(())
    }

    /// The namespace is ignored; the attribute lands in the same flat map.
    pub fn set_attribute_ns(
        &mut self,
        key: NodeKey,
        _namespace: Option<&str>,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> DomResult<()> {
        self.element_for(key, "setAttributeNS")?
            .attributes
            .set(name, value);
        Ok(())
    }

    pub fn remove_attribute(&mut self, key: NodeKey, name: &str) -> DomResult<Option<AttrValue>> {
        Ok(self.element_for(key, "removeAttribute")?.attributes.remove(name))
    }

    pub fn class_list(&self, key: NodeKey) -> Vec<String> {
        match self.get_attribute(key, "class") {
            Some(value) => value
                .to_string()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn add_class(&mut self, key: NodeKey, class: &str) -> DomResult<()> {
        let mut classes = self.class_list(key);
        let element = self.element_for(key, "classList.add")?;
        if classes.iter().any(|c| c == class) {
            return Ok(());
        }
        classes.push(class.to_owned());
        element.attributes.set("class", classes.join(" "));
        Ok(())
    }

    pub fn remove_class(&mut self, key: NodeKey, class: &str) -> DomResult<()> {
        let classes = self.class_list(key);
        let element = self.element_for(key, "classList.remove")?;
        if !classes.iter().any(|c| c == class) {
            return Ok(());
        }
        let kept: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
        element.attributes.set("class", kept.join(" "));
        Ok(())
    }

    /// Parsed projection of the `style` attribute.
    pub fn style(&self, key: NodeKey) -> DomResult<CssProperties> {
        let node = self.get(key)?;
        let element = node.as_element().ok_or(DomError::Unsupported {
            operation: "style",
            node_type: node.node_type(),
        })?;
        Ok(css::read_style(&element.attributes))
    }

    /// Write-through style view; every mutation rewrites the `style` attribute.
    pub fn style_mut(&mut self, key: NodeKey) -> DomResult<StyleView<'_>> {
        let element = self.element_for(key, "style")?;
        Ok(StyleView::new(&mut element.attributes))
    }

    /// An open shadow root makes the element its own shadow root; any other
    /// mode clears it.
    pub fn attach_shadow(&mut self, key: NodeKey, mode: ShadowRootMode) -> DomResult<NodeKey> {
        let element = self.element_for(key, "attachShadow")?;
        element.shadow_root = match mode {
            ShadowRootMode::Open => Some(key),
            ShadowRootMode::Closed => None,
        };
        Ok(key)
    }

    pub fn shadow_root(&self, key: NodeKey) -> Option<NodeKey> {
        self.element(key).and_then(|e| e.shadow_root)
    }

    /// Elements named `tag_name` (or all elements for `*`) within `scope`,
    /// including `scope` itself, in document order.
    pub fn get_elements_by_tag_name(&self, scope: NodeKey, tag_name: &str) -> Vec<NodeKey> {
        let any = tag_name == "*";
        let mut out = Vec::new();
        let mut cursor = self.nodes.contains(scope).then_some(scope);
        while let Some(key) = cursor {
            if let Some(element) = self.element(key) {
                if any || element.has_tag(tag_name) {
                    out.push(key);
                }
            }
            cursor = self.next_in_scope(key, scope);
        }
        out
    }

    pub fn play(&mut self, key: NodeKey) -> DomResult<()> {
        self.media_for(key, "play")?.play();
        Ok(())
    }

    pub fn pause(&mut self, key: NodeKey) -> DomResult<()> {
        self.media_for(key, "pause")?.pause();
        Ok(())
    }

    fn media_for(&mut self, key: NodeKey, operation: &'static str) -> DomResult<&mut MediaData> {
        self.element_for(key, operation)?
            .media_mut()
            .ok_or(DomError::Unsupported {
                operation,
                node_type: NodeType::Element,
            })
    }

    // ---------------------------------------------------------------------
    // Document views
    // ---------------------------------------------------------------------

    /// The `html` element child of the document node.
    pub fn document_element(&self) -> Option<NodeKey> {
        self.children(self.root)
            .find(|&c| self.element(c).is_some_and(|e| e.has_tag("html")))
    }

    pub fn head(&self) -> Option<NodeKey> {
        self.document_child_tagged("head")
    }

    pub fn body(&self) -> Option<NodeKey> {
        self.document_child_tagged("body")
    }

    fn document_child_tagged(&self, tag_name: &str) -> Option<NodeKey> {
        let html = self.document_element()?;
        self.children(html)
            .find(|&c| self.element(c).is_some_and(|e| e.has_tag(tag_name)))
    }

    pub fn doctype(&self) -> Option<NodeKey> {
        self.children(self.root)
            .find(|&c| self.node_type(c) == Some(NodeType::DocumentType))
    }

    // ---------------------------------------------------------------------
    // Factories. These only allocate detached nodes.
    // ---------------------------------------------------------------------

    pub(crate) fn insert_node(
        &mut self,
        id: i32,
        record: Option<NodeRecord>,
        data: NodeData,
    ) -> NodeKey {
        self.nodes.insert(Node::new(id, record, data))
    }

    fn create(&mut self, data: NodeData) -> NodeKey {
        let id = self.ids.next_id();
        self.insert_node(id, None, data)
    }

    pub fn create_element(&mut self, tag_name: &str) -> NodeKey {
        let tag = tag_name.to_ascii_lowercase();
        self.create(NodeData::Element(ElementData::new(&tag)))
    }

    /// The namespace is ignored.
    pub fn create_element_ns(&mut self, _namespace: Option<&str>, qualified_name: &str) -> NodeKey {
        self.create_element(qualified_name)
    }

    pub fn create_text_node(&mut self, data: &str) -> NodeKey {
        self.create(NodeData::Text(data.to_owned()))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeKey {
        self.create(NodeData::Comment(data.to_owned()))
    }

    pub fn create_cdata_section(&mut self, data: &str) -> NodeKey {
        self.create(NodeData::CDataSection(data.to_owned()))
    }

    pub fn create_document_type(&mut self, name: &str, public_id: &str, system_id: &str) -> NodeKey {
        self.create(NodeData::DocumentType(DocumentTypeData {
            name: name.to_owned(),
            public_id: public_id.to_owned(),
            system_id: system_id.to_owned(),
        }))
    }

    /// A new, empty document. The calling document is not touched.
    pub fn create_document(&self) -> Document {
        Document::new()
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> TreeSnapshot {
        self.snapshot_node(self.root).unwrap_or_default()
    }

    /// Flattens the subtree at `scope` in document order. Built with the
    /// same iterative walk as `descendants`, so depth is unbounded.
    pub fn snapshot_node(&self, scope: NodeKey) -> Option<TreeSnapshot> {
        self.nodes.get(scope)?;
        let order = self.descendants(scope);
        let positions: HashMap<NodeKey, usize> =
            order.iter().enumerate().map(|(i, &k)| (k, i)).collect();

        let mut nodes = Vec::with_capacity(order.len());
        for &key in &order {
            let Some(node) = self.nodes.get(key) else { continue };
            let mut snapshot = NodeSnapshot {
                id: node.id,
                node_type: node.node_type(),
                tag_name: None,
                attributes: Vec::new(),
                text: node.character_data().map(str::to_owned),
                doctype: None,
                parent: if key == scope {
                    None
                } else {
                    node.parent.and_then(|p| positions.get(&p).copied())
                },
                children: self
                    .children(key)
                    .filter_map(|c| positions.get(&c).copied())
                    .collect(),
                content_document: None,
            };
            match &node.data {
                NodeData::Element(element) => {
                    snapshot.tag_name = Some(element.tag_name.to_string());
                    snapshot.attributes = element
                        .attributes
                        .iter()
                        .map(|(k, v)| (k.to_owned(), v.clone()))
                        .collect();
                    if let Some(iframe) = element.iframe() {
                        snapshot.content_document =
                            Some(Box::new(iframe.content_document.snapshot()));
                    }
                }
                NodeData::DocumentType(doctype) => snapshot.doctype = Some(doctype.clone()),
                _ => {}
            }
            nodes.push(snapshot);
        }
        Some(TreeSnapshot { nodes })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}
