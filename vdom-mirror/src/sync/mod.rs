//! Rebuilds a virtual `Document` from a live tree.
//!
//! Each walk is a full, destructive rebuild: the mirror table and every
//! node except the document node are dropped first. Live nodes without an
//! identity record are given a fresh negative id, which is stamped back
//! onto the live side so the next walk sees the same id. The walk is
//! pre-order with an explicit stack; every node is attached by looking up
//! its live parent's id in the mirror, so parents are always mapped before
//! their children.

use crate::dom::{
    AttrValue, CANVAS_DATA_URL_ATTR, Document, ElementData, NodeData, NodeKey, NodeType,
};
use crate::error::SyncError;
use crate::live::{LiveTree, NodeRecord, node_type_from_native};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, instrument, trace, warn};

/// Which pieces of runtime state a walk captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// Values of text-like controls, `checked` flags and selected options.
    pub capture_form_values: bool,
    /// Canvas pixels as a data URL under `rr_dataURL`.
    pub capture_canvas: bool,
    /// Playback position and paused state of audio/video.
    pub capture_media: bool,
    pub capture_scroll: bool,
    /// Mirror iframe content into the iframe's nested document.
    pub sync_iframes: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            capture_form_values: true,
            capture_canvas: true,
            capture_media: true,
            capture_scroll: true,
            sync_iframes: true,
        }
    }
}

impl SyncOptions {
    /// Tree shape, ids and markup attributes only.
    pub fn structure_only() -> Self {
        Self {
            capture_form_values: false,
            capture_canvas: false,
            capture_media: false,
            capture_scroll: false,
            sync_iframes: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub visited: usize,
    pub created: usize,
    pub reused: usize,
    pub skipped: usize,
}

impl SyncStats {
    fn absorb(&mut self, other: SyncStats) {
        self.visited += other.visited;
        self.created += other.created;
        self.reused += other.reused;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Rebuilds `doc` from the whole live tree.
    pub fn sync<T: LiveTree>(&self, doc: &mut Document, live: &mut T) -> Result<SyncStats, SyncError> {
        let root = live.root();
        self.sync_from(doc, live, root)
    }

    /// Rebuilds `doc` from the live subtree at `root`. A document root maps
    /// onto the virtual document node; any other root is attached under it.
    #[instrument(skip_all, fields(root = ?root))]
    pub fn sync_from<T: LiveTree>(
        &self,
        doc: &mut Document,
        live: &mut T,
        root: T::Handle,
    ) -> Result<SyncStats, SyncError> {
        doc.reset_tree();
        info!("starting synchronization walk");

        let mut stats = SyncStats::default();
        let mut stack: SmallVec<[T::Handle; 32]> = SmallVec::new();
        stack.push(root);

        while let Some(live_node) = stack.pop() {
            stats.visited += 1;
            let native = live.native_node_type(live_node);
            let Some(node_type) = node_type_from_native(native) else {
                debug!(native, "skipping live node with unmapped kind");
                stats.skipped += 1;
                continue;
            };
            let is_walk_root = live_node == root;
            if node_type == NodeType::Document && !is_walk_root {
                warn!("skipping nested document node outside an iframe");
                stats.skipped += 1;
                continue;
            }

            let record = identify(doc, live, live_node, node_type);
            let key = self.resolve(doc, live, live_node, node_type, &record, &mut stats)?;
            if let Some(node) = doc.node_mut(key) {
                node.id = record.id;
                node.record = Some(record.clone());
            }
            self.capture(doc, live, live_node, key);

            doc.mirror_mut().register(record.id, key);
            attach(doc, live, live_node, key, is_walk_root)?;

            if node_type == NodeType::Element && self.options.sync_iframes {
                if let Some(content) = live.content_document(live_node) {
                    if let Some(iframe) = doc.element_mut(key).and_then(ElementData::iframe_mut) {
                        let nested = self.sync_from(&mut iframe.content_document, live, content)?;
                        stats.absorb(nested);
                    }
                }
            }

            if matches!(node_type, NodeType::Document | NodeType::Element) {
                stack.extend(live.child_nodes(live_node).into_iter().rev());
            }
        }

        info!(
            visited = stats.visited,
            created = stats.created,
            reused = stats.reused,
            skipped = stats.skipped,
            "synchronization walk complete"
        );
        Ok(stats)
    }

    /// Reuses the mirrored node for `record.id` when its kind and tag still
    /// match; otherwise the stale node is destroyed and a new one built.
    fn resolve<T: LiveTree>(
        &self,
        doc: &mut Document,
        live: &T,
        live_node: T::Handle,
        node_type: NodeType,
        record: &NodeRecord,
        stats: &mut SyncStats,
    ) -> Result<NodeKey, SyncError> {
        if node_type == NodeType::Document {
            stats.created += 1;
            return Ok(doc.root());
        }

        let tag_name = (node_type == NodeType::Element).then(|| resolve_tag_name(live, live_node));
        if let Some(existing) = doc.mirror().lookup(record.id) {
            let same_tag = match (&tag_name, doc.element(existing)) {
                (Some(tag_name), Some(element)) => &*element.tag_name == tag_name.as_str(),
                _ => true,
            };
            if doc.node_type(existing) == Some(node_type) && same_tag {
                if let Some(parent) = doc.parent_node(existing) {
                    doc.remove_child(parent, existing);
                }
                for child in doc.child_nodes(existing) {
                    doc.remove_child(existing, child);
                }
                refresh_payload(doc, live, live_node, existing);
                trace!(id = record.id, "reusing mirrored node");
                stats.reused += 1;
                return Ok(existing);
            }
            warn!(id = record.id, %node_type, "mirrored node no longer matches the live node; rebuilding it");
            if existing != doc.root() {
                doc.destroy_subtree(existing)?;
            }
        }

        let data = match node_type {
            NodeType::Element => {
                NodeData::Element(ElementData::new(tag_name.as_deref().unwrap_or_default()))
            }
            NodeType::Text => NodeData::Text(live.text_content(live_node).unwrap_or_default()),
            NodeType::CDataSection => {
                NodeData::CDataSection(live.text_content(live_node).unwrap_or_default())
            }
            NodeType::Comment => NodeData::Comment(live.text_content(live_node).unwrap_or_default()),
            NodeType::DocumentType => {
                NodeData::DocumentType(live.doctype(live_node).unwrap_or_default())
            }
            NodeType::Document => NodeData::Document,
        };
        trace!(id = record.id, %node_type, "creating node");
        stats.created += 1;
        Ok(doc.insert_node(record.id, Some(record.clone()), data))
    }

    /// Copies attributes and the runtime state enabled in the options.
    fn capture<T: LiveTree>(&self, doc: &mut Document, live: &T, live_node: T::Handle, key: NodeKey) {
        let Some(element) = doc.element_mut(key) else {
            return;
        };

        element.attributes.clear();
        for (name, value) in live.attributes(live_node) {
            element.attributes.set(&name, value);
        }

        let tag_name = element.tag_name.clone();
        match &*tag_name {
            "input" | "textarea" | "select" if self.options.capture_form_values => {
                let value = live.value(live_node).unwrap_or_default();
                let submits_value = element
                    .attributes
                    .get("type")
                    .map(|t| t.to_string().to_ascii_lowercase())
                    .is_some_and(|t| matches!(t.as_str(), "radio" | "checkbox" | "submit" | "button"));
                if submits_value && !value.is_empty() {
                    element.attributes.set("value", value);
                } else if live.checked(live_node) {
                    element.attributes.set("checked", true);
                }
            }
            "option" if self.options.capture_form_values => {
                let option_value = option_value(live, live_node);
                let select_value = owning_select(live, live_node).and_then(|s| live.value(s));
                if select_value.is_some_and(|v| v == option_value) {
                    element
                        .attributes
                        .set("selected", AttrValue::Bool(live.selected(live_node)));
                }
            }
            "canvas" if self.options.capture_canvas => {
                if let Some(data_url) = live.canvas_data_url(live_node) {
                    element.attributes.set(CANVAS_DATA_URL_ATTR, data_url);
                }
            }
            "audio" | "video" if self.options.capture_media => {
                if let (Some(state), Some(media)) = (live.media_state(live_node), element.media_mut()) {
                    media.paused = state.paused;
                    media.current_time = state.current_time;
                }
            }
            _ => {}
        }

        if self.options.capture_scroll {
            let (left, top) = live.scroll_offset(live_node);
            element.scroll_left = left;
            element.scroll_top = top;
        }

        element.refresh_source_fields();
    }
}

/// Returns the node's identity record, stamping a freshly generated one
/// onto the live node if it has none.
fn identify<T: LiveTree>(
    doc: &mut Document,
    live: &mut T,
    live_node: T::Handle,
    node_type: NodeType,
) -> NodeRecord {
    if let Some(record) = live.record(live_node) {
        return record;
    }
    let mut record = NodeRecord::new(doc.next_id(), node_type.into());
    if node_type != NodeType::Document {
        record.root_id = doc.node_id(doc.root());
    }
    live.stamp(live_node, record.clone());
    record
}

fn attach<T: LiveTree>(
    doc: &mut Document,
    live: &T,
    live_node: T::Handle,
    key: NodeKey,
    is_walk_root: bool,
) -> Result<(), SyncError> {
    if key == doc.root() {
        return Ok(());
    }
    let parent = if is_walk_root {
        doc.root()
    } else {
        live.parent(live_node)
            .and_then(|p| live.record(p))
            .and_then(|r| doc.mirror().lookup(r.id))
            .ok_or_else(|| SyncError::UnmappedParent {
                id: doc.node_id(key).unwrap_or_default(),
            })?
    };
    doc.append_child(parent, key)?;
    Ok(())
}

/// Updates the character data of a reused leaf node.
fn refresh_payload<T: LiveTree>(doc: &mut Document, live: &T, live_node: T::Handle, key: NodeKey) {
    let Some(node) = doc.node_mut(key) else { return };
    match &mut node.data {
        NodeData::Text(s) | NodeData::Comment(s) | NodeData::CDataSection(s) => {
            *s = live.text_content(live_node).unwrap_or_default();
        }
        NodeData::DocumentType(doctype) => {
            if let Some(fresh) = live.doctype(live_node) {
                *doctype = fresh;
            }
        }
        NodeData::Element(_) | NodeData::Document => {}
    }
}

/// Form elements always mirror as `form`; other names are validated.
fn resolve_tag_name<T: LiveTree>(live: &T, live_node: T::Handle) -> String {
    if live.is_form_element(live_node) {
        return "form".to_owned();
    }
    crate::dom::valid_tag_name(&live.tag_name(live_node).unwrap_or_default())
}

fn is_live_tag<T: LiveTree>(live: &T, node: T::Handle, tag_name: &str) -> bool {
    live.tag_name(node)
        .is_some_and(|t| t.eq_ignore_ascii_case(tag_name))
}

/// The `select` an option belongs to, directly or through an `optgroup`.
fn owning_select<T: LiveTree>(live: &T, option: T::Handle) -> Option<T::Handle> {
    let parent = live.parent(option)?;
    if is_live_tag(live, parent, "select") {
        return Some(parent);
    }
    if is_live_tag(live, parent, "optgroup") {
        let grandparent = live.parent(parent)?;
        if is_live_tag(live, grandparent, "select") {
            return Some(grandparent);
        }
    }
    None
}

/// An option's value: its `value` attribute, or its text.
fn option_value<T: LiveTree>(live: &T, option: T::Handle) -> String {
    if let Some((_, value)) = live
        .attributes(option)
        .into_iter()
        .find(|(name, _)| name == "value")
    {
        return value;
    }
    live.child_nodes(option)
        .into_iter()
        .filter_map(|c| live.text_content(c))
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Builds a new document from the whole live tree with default options.
pub fn build_from_dom<T: LiveTree>(live: &mut T) -> Result<Document, SyncError> {
    let mut doc = Document::new();
    Synchronizer::default().sync(&mut doc, live)?;
    Ok(doc)
}

impl Document {
    /// Rebuilds this document from the whole live tree with default options.
    pub fn build_from_dom<T: LiveTree>(&mut self, live: &mut T) -> Result<SyncStats, SyncError> {
        Synchronizer::default().sync(self, live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{LiveDocument, PROCESSING_INSTRUCTION_NODE};
    use crate::live::{LocalIds, MediaState, RecordKind};

    fn local_doc() -> Document {
        Document::with_id_source(Box::new(LocalIds::default()))
    }

    fn attr(doc: &Document, key: NodeKey, name: &str) -> Option<AttrValue> {
        doc.get_attribute(key, name).cloned()
    }

    fn only(doc: &Document, tag: &str) -> NodeKey {
        let found = doc.get_elements_by_tag_name(doc.root(), tag);
        assert_eq!(found.len(), 1, "expected one <{tag}>");
        found[0]
    }

    #[test]
    fn unrecorded_nodes_get_decreasing_negative_ids() {
        let mut live = LiveDocument::parse("<html><head></head><body><p>a</p><p>b</p></body></html>");
        let mut doc = local_doc();
        let stats = Synchronizer::default().sync(&mut doc, &mut live).unwrap();

        assert_eq!(stats.created, stats.visited);
        assert_eq!(live.record_count(), stats.visited);

        let ids: Vec<i32> = doc
            .descendants(doc.root())
            .into_iter()
            .map(|k| doc.node_id(k).unwrap())
            .collect();
        assert!(ids.iter().all(|&id| id < 0));
        assert!(ids.windows(2).all(|w| w[1] < w[0]), "ids: {ids:?}");
    }

    #[test]
    fn existing_records_are_reused() {
        let mut live = LiveDocument::parse("<html><body></body></html>");
        let body = live.find_by_tag("body").unwrap();
        live.stamp(body, NodeRecord::new(42, RecordKind::Element));

        let doc = build_from_dom(&mut live).unwrap();
        let virtual_body = doc.body().unwrap();
        assert_eq!(doc.node_id(virtual_body), Some(42));
        assert_eq!(doc.mirror().lookup(42), Some(virtual_body));
        assert_eq!(doc.record(virtual_body).map(|r| r.id), Some(42));
    }

    #[test]
    fn repeated_walks_produce_identical_trees() {
        let mut live = LiveDocument::parse(
            r#"<!DOCTYPE html><html><head><title>t</title></head><body class="x"><div id="a">hi<!--c--></div></body></html>"#,
        );
        let mut doc = local_doc();
        let sync = Synchronizer::default();

        sync.sync(&mut doc, &mut live).unwrap();
        let first = doc.snapshot();
        let second_stats = sync.sync(&mut doc, &mut live).unwrap();
        let second = doc.snapshot();

        assert_eq!(first, second);
        assert_eq!(second_stats.skipped, 0);
        assert_eq!(doc.len(), second_stats.visited);
    }

    #[test]
    fn duplicate_ids_within_a_walk_reuse_the_mirrored_node() {
        let mut live = LiveDocument::parse("<html><body><p>x</p><p>y</p></body></html>");
        let body = live.find_by_tag("body").unwrap();
        let paragraphs = live.children_of(body).to_vec();
        for &p in &paragraphs {
            live.stamp(p, NodeRecord::new(7, RecordKind::Element));
        }

        let mut doc = local_doc();
        let stats = Synchronizer::default().sync(&mut doc, &mut live).unwrap();
        assert_eq!(stats.reused, 1);

        let virtual_body = doc.body().unwrap();
        let children = doc.child_nodes(virtual_body);
        assert_eq!(children.len(), 1);
        assert_eq!(doc.text_content(children[0]).as_deref(), Some("y"));
    }

    #[test]
    fn unmapped_kinds_are_skipped() {
        let mut live = LiveDocument::parse("<html><body></body></html>");
        let body = live.find_by_tag("body").unwrap();
        let pi = live.create_node(PROCESSING_INSTRUCTION_NODE);
        live.append(body, pi);

        let mut doc = local_doc();
        let stats = Synchronizer::default().sync(&mut doc, &mut live).unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(doc.child_nodes(doc.body().unwrap()).is_empty());
    }

    #[test]
    fn missing_parent_mapping_fails_loudly() {
        let live = LiveDocument::parse("<html><body><div></div></body></html>");
        let mut doc = local_doc();
        let mut broken = BrokenParent { inner: live };
        let err = Synchronizer::default().sync(&mut doc, &mut broken).unwrap_err();
        assert!(matches!(err, SyncError::UnmappedParent { .. }));
    }

    /// Loses the parent link of everything below the document element.
    struct BrokenParent {
        inner: LiveDocument,
    }

    impl LiveTree for BrokenParent {
        type Handle = crate::html::LiveKey;

        fn root(&self) -> Self::Handle {
            self.inner.root()
        }
        fn native_node_type(&self, node: Self::Handle) -> u16 {
            self.inner.native_node_type(node)
        }
        fn parent(&self, node: Self::Handle) -> Option<Self::Handle> {
            self.inner.parent(node).filter(|&p| p == self.inner.root())
        }
        fn child_nodes(&self, node: Self::Handle) -> Vec<Self::Handle> {
            self.inner.child_nodes(node)
        }
        fn tag_name(&self, node: Self::Handle) -> Option<String> {
            self.inner.tag_name(node)
        }
        fn attributes(&self, node: Self::Handle) -> Vec<(String, String)> {
            self.inner.attributes(node)
        }
        fn text_content(&self, node: Self::Handle) -> Option<String> {
            self.inner.text_content(node)
        }
        fn doctype(&self, node: Self::Handle) -> Option<crate::dom::DocumentTypeData> {
            self.inner.doctype(node)
        }
        fn record(&self, node: Self::Handle) -> Option<NodeRecord> {
            self.inner.record(node)
        }
        fn stamp(&mut self, node: Self::Handle, record: NodeRecord) {
            self.inner.stamp(node, record)
        }
    }

    #[test]
    fn form_controls_capture_values_and_flags() {
        let mut live = LiveDocument::parse(
            r#"<html><body>
                <input id="r" type="radio" value="on-value">
                <input id="c" type="checkbox">
                <input id="t" type="text">
                <select id="s"><option value="a">A</option><option value="b">B</option></select>
            </body></html>"#,
        );
        let checkbox = live.find_by_id("c").unwrap();
        let text = live.find_by_id("t").unwrap();
        live.set_checked(checkbox, true);
        live.set_value(text, "typed");
        let select = live.find_by_id("s").unwrap();
        let options = live.children_of(select).to_vec();
        live.set_selected(options[1], true);

        let doc = build_from_dom(&mut live).unwrap();
        let find = |id: &str| {
            doc.get_elements_by_tag_name(doc.root(), "*")
                .into_iter()
                .find(|&k| doc.get_attribute(k, "id") == Some(&AttrValue::from(id)))
                .unwrap()
        };

        assert_eq!(attr(&doc, find("r"), "value"), Some(AttrValue::from("on-value")));
        assert_eq!(attr(&doc, find("c"), "checked"), Some(AttrValue::Bool(true)));
        let virtual_text = find("t");
        assert_eq!(attr(&doc, virtual_text, "value"), None);
        assert_eq!(attr(&doc, virtual_text, "checked"), None);

        let virtual_options = doc.get_elements_by_tag_name(doc.root(), "option");
        assert_eq!(attr(&doc, virtual_options[0], "selected"), None);
        assert_eq!(attr(&doc, virtual_options[1], "selected"), Some(AttrValue::Bool(true)));
    }

    #[test]
    fn canvas_media_and_scroll_state_are_captured() {
        let mut live = LiveDocument::parse(
            "<html><body><canvas></canvas><video></video><div></div></body></html>",
        );
        let canvas = live.find_by_tag("canvas").unwrap();
        let video = live.find_by_tag("video").unwrap();
        let div = live.find_by_tag("div").unwrap();
        live.set_canvas_data_url(canvas, "data:image/png;base64,AAAA");
        live.set_media_state(
            video,
            MediaState {
                paused: false,
                current_time: 12.5,
            },
        );
        live.set_scroll(div, 3.0, 40.0);

        let doc = build_from_dom(&mut live).unwrap();
        let canvas = only(&doc, "canvas");
        assert_eq!(
            attr(&doc, canvas, CANVAS_DATA_URL_ATTR),
            Some(AttrValue::from("data:image/png;base64,AAAA"))
        );
        let media = doc.element(only(&doc, "video")).unwrap().media().unwrap();
        assert!(!media.paused);
        assert_eq!(media.current_time, 12.5);
        let div = doc.element(only(&doc, "div")).unwrap();
        assert_eq!((div.scroll_left, div.scroll_top), (3.0, 40.0));
    }

    #[test]
    fn structure_only_skips_runtime_state() {
        let mut live = LiveDocument::parse("<html><body><canvas></canvas><input type=checkbox></body></html>");
        let canvas = live.find_by_tag("canvas").unwrap();
        let input = live.find_by_tag("input").unwrap();
        live.set_canvas_data_url(canvas, "data:,");
        live.set_checked(input, true);

        let mut doc = local_doc();
        Synchronizer::new(SyncOptions::structure_only())
            .sync(&mut doc, &mut live)
            .unwrap();
        assert_eq!(attr(&doc, only(&doc, "canvas"), CANVAS_DATA_URL_ATTR), None);
        assert_eq!(attr(&doc, only(&doc, "input"), "checked"), None);
    }

    #[test]
    fn element_variants_follow_tag_dispatch() {
        let mut live = LiveDocument::parse(
            r#"<html><body><img src="a.png" width="10" height="5"><audio></audio><iframe src="/f"></iframe></body></html>"#,
        );
        let doc = build_from_dom(&mut live).unwrap();

        let img = doc.element(only(&doc, "img")).unwrap().image().unwrap();
        assert_eq!((img.src.as_str(), img.width, img.height), ("a.png", 10, 5));
        assert!(doc.element(only(&doc, "audio")).unwrap().media().is_some());
        let iframe = doc.element(only(&doc, "iframe")).unwrap().iframe().unwrap();
        assert_eq!(iframe.src, "/f");
    }

    #[test]
    fn iframe_content_is_mirrored_into_nested_document() {
        let mut live = LiveDocument::parse("<html><body><iframe></iframe></body></html>");
        let iframe = live.find_by_tag("iframe").unwrap();
        let content = live.create_document();
        live.parse_into(content, "<html><body><span>inner</span></body></html>");
        live.set_content_document(iframe, content);

        let doc = build_from_dom(&mut live).unwrap();
        let iframe = doc.element(only(&doc, "iframe")).unwrap().iframe().unwrap();
        let nested = &iframe.content_document;
        let spans = nested.get_elements_by_tag_name(nested.root(), "span");
        assert_eq!(spans.len(), 1);
        assert_eq!(nested.text_content(spans[0]).as_deref(), Some("inner"));
        assert!(doc.get_elements_by_tag_name(doc.root(), "span").is_empty());
    }

    #[test]
    fn form_tag_is_reported_as_form() {
        let mut live = LiveDocument::parse("<html><body><form></form></body></html>");
        let form = live.find_by_tag("form").unwrap();
        live.set_reported_tag_name(form, "[object HTMLInputElement]");

        let doc = build_from_dom(&mut live).unwrap();
        assert_eq!(doc.get_elements_by_tag_name(doc.root(), "form").len(), 1);
    }

    #[test]
    fn option_without_value_matches_by_text() {
        let mut live = LiveDocument::parse("<html><body><select><option>A<option>B</select></body></html>");
        let select = live.find_by_tag("select").unwrap();
        let options = live.children_of(select).to_vec();
        live.set_selected(options[1], true);

        let doc = build_from_dom(&mut live).unwrap();
        let virtual_options = doc.get_elements_by_tag_name(doc.root(), "option");
        assert_eq!(virtual_options.len(), 2);
        assert_eq!(attr(&doc, virtual_options[0], "selected"), None);
        assert_eq!(attr(&doc, virtual_options[1], "selected"), Some(AttrValue::Bool(true)));
    }

    #[test]
    fn cdata_sections_are_mirrored() {
        let mut live = LiveDocument::parse("<html><body></body></html>");
        let body = live.find_by_tag("body").unwrap();
        let cdata = live.create_cdata("x < y");
        live.append(body, cdata);

        let doc = build_from_dom(&mut live).unwrap();
        let children = doc.child_nodes(doc.body().unwrap());
        assert_eq!(children.len(), 1);
        assert_eq!(doc.node_type(children[0]), Some(NodeType::CDataSection));
        assert_eq!(doc.text_content(children[0]).as_deref(), Some("x < y"));
    }

    #[test]
    fn reused_text_node_takes_the_latest_payload() {
        let mut live = LiveDocument::parse("<html><body><p>old</p><p>new</p></body></html>");
        let body = live.find_by_tag("body").unwrap();
        let paragraphs = live.children_of(body).to_vec();
        let first_text = live.children_of(paragraphs[0])[0];
        let second_text = live.children_of(paragraphs[1])[0];
        live.stamp(first_text, NodeRecord::new(11, RecordKind::Text));
        live.stamp(second_text, NodeRecord::new(11, RecordKind::Text));
        live.set_text(second_text, "fresh");

        let mut doc = local_doc();
        let stats = Synchronizer::default().sync(&mut doc, &mut live).unwrap();
        assert_eq!(stats.reused, 1);

        let text = doc.mirror().lookup(11).unwrap();
        assert_eq!(doc.text_content(text).as_deref(), Some("fresh"));
        let virtual_paragraphs = doc.get_elements_by_tag_name(doc.root(), "p");
        assert_eq!(doc.text_content(virtual_paragraphs[0]).as_deref(), Some(""));
        assert_eq!(doc.child_nodes(virtual_paragraphs[1]), vec![text]);
    }

    #[test]
    fn shared_id_with_a_different_tag_builds_a_new_element() {
        let mut live = LiveDocument::parse("<html><body><div>a</div><span>b</span></body></html>");
        let div = live.find_by_tag("div").unwrap();
        let span = live.find_by_tag("span").unwrap();
        live.stamp(div, NodeRecord::new(7, RecordKind::Element));
        live.stamp(span, NodeRecord::new(7, RecordKind::Element));

        let mut doc = local_doc();
        let stats = Synchronizer::default().sync(&mut doc, &mut live).unwrap();
        assert_eq!(stats.reused, 0);

        let mirrored = doc.mirror().lookup(7).unwrap();
        assert!(doc.element(mirrored).unwrap().has_tag("span"));
        assert_eq!(doc.text_content(mirrored).as_deref(), Some("b"));
        assert!(doc.get_elements_by_tag_name(doc.root(), "div").is_empty());
    }

    #[test]
    fn second_live_document_element_is_rejected() {
        let mut live = LiveDocument::parse("<html></html><html></html>");
        let mut doc = local_doc();
        let err = Synchronizer::default().sync(&mut doc, &mut live).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Dom(crate::error::DomError::DuplicateRoot { .. })
        ));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: SyncOptions = serde_json::from_str(r#"{"captureCanvas": false}"#).unwrap();
        assert!(!options.capture_canvas);
        assert!(options.capture_media);
        assert!(options.sync_iframes);
    }
}
