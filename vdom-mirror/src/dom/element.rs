//! Element state: attributes, tag-specific payloads and the window record.

use super::{Document, NodeKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use string_cache::DefaultAtom;

/// Attribute key under which a canvas pixel snapshot is stored as a data URL.
pub const CANVAS_DATA_URL_ATTR: &str = "rr_dataURL";

/// An attribute value. Captured runtime state (`checked`, `selected`) is
/// stored as booleans; markup attributes are strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Number(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Number(n) => write!(f, "{n}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Insertion-ordered attribute map with interned names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(DefaultAtom, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| &**k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((DefaultAtom::from(name), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let pos = self.entries.iter().position(|(k, _)| &**k == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Plain,
    Image,
    Media,
    Iframe,
}

static ELEMENT_KINDS: phf::Map<&'static str, ElementKind> = phf::phf_map! {
    "audio" => ElementKind::Media,
    "video" => ElementKind::Media,
    "iframe" => ElementKind::Iframe,
    "img" => ElementKind::Image,
};

/// Picks the payload variant for a lowercased tag name.
pub fn element_kind_for(tag_name: &str) -> ElementKind {
    ELEMENT_KINDS
        .get(tag_name)
        .copied()
        .unwrap_or(ElementKind::Plain)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageData {
    pub src: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaData {
    pub paused: bool,
    pub current_time: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub looping: bool,
}

impl Default for MediaData {
    fn default() -> Self {
        MediaData {
            paused: true,
            current_time: 0.0,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            looping: false,
        }
    }
}

impl MediaData {
    pub fn play(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }
}

/// An iframe exclusively owns the document and window of its content.
#[derive(Debug)]
pub struct IframeData {
    pub src: String,
    pub width: u32,
    pub height: u32,
    pub content_document: Box<Document>,
    pub content_window: Window,
}

impl IframeData {
    pub fn new() -> Self {
        IframeData {
            src: String::new(),
            width: 0,
            height: 0,
            content_document: Box::new(Document::new()),
            content_window: Window::default(),
        }
    }
}

impl Default for IframeData {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum ElementVariant {
    Plain,
    Image(ImageData),
    Media(MediaData),
    Iframe(Box<IframeData>),
}

impl ElementVariant {
    pub fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Plain => ElementVariant::Plain,
            ElementKind::Image => ElementVariant::Image(ImageData::default()),
            ElementKind::Media => ElementVariant::Media(MediaData::default()),
            ElementKind::Iframe => ElementVariant::Iframe(Box::new(IframeData::new())),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ElementVariant::Plain => ElementKind::Plain,
            ElementVariant::Image(_) => ElementKind::Image,
            ElementVariant::Media(_) => ElementKind::Media,
            ElementVariant::Iframe(_) => ElementKind::Iframe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowRootMode {
    Open,
    Closed,
}

#[derive(Debug)]
pub struct ElementData {
    pub tag_name: DefaultAtom,
    pub attributes: Attributes,
    pub scroll_left: f64,
    pub scroll_top: f64,
    /// Points back at the element itself when an open shadow root is attached.
    pub shadow_root: Option<NodeKey>,
    pub variant: ElementVariant,
}

impl ElementData {
    /// Builds an element for an already lowercased tag name.
    pub fn new(tag_name: &str) -> Self {
        ElementData {
            tag_name: DefaultAtom::from(tag_name),
            attributes: Attributes::new(),
            scroll_left: 0.0,
            scroll_top: 0.0,
            shadow_root: None,
            variant: ElementVariant::for_kind(element_kind_for(tag_name)),
        }
    }

    pub fn has_tag(&self, tag_name: &str) -> bool {
        (*self.tag_name).eq_ignore_ascii_case(tag_name)
    }

    pub fn kind(&self) -> ElementKind {
        self.variant.kind()
    }

    pub fn media(&self) -> Option<&MediaData> {
        match &self.variant {
            ElementVariant::Media(media) => Some(media),
            _ => None,
        }
    }

    pub fn media_mut(&mut self) -> Option<&mut MediaData> {
        match &mut self.variant {
            ElementVariant::Media(media) => Some(media),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<&ImageData> {
        match &self.variant {
            ElementVariant::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn iframe(&self) -> Option<&IframeData> {
        match &self.variant {
            ElementVariant::Iframe(iframe) => Some(iframe),
            _ => None,
        }
    }

    pub fn iframe_mut(&mut self) -> Option<&mut IframeData> {
        match &mut self.variant {
            ElementVariant::Iframe(iframe) => Some(iframe),
            _ => None,
        }
    }

    /// Copies `src`, `width` and `height` from the attributes into an
    /// image or iframe payload.
    pub fn refresh_source_fields(&mut self) {
        let src = self
            .attributes
            .get("src")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let width = dimension(self.attributes.get("width"));
        let height = dimension(self.attributes.get("height"));
        match &mut self.variant {
            ElementVariant::Image(image) => {
                image.src = src;
                image.width = width;
                image.height = height;
            }
            ElementVariant::Iframe(iframe) => {
                iframe.src = src;
                iframe.width = width;
                iframe.height = height;
            }
            ElementVariant::Plain | ElementVariant::Media(_) => {}
        }
    }
}

fn dimension(value: Option<&AttrValue>) -> u32 {
    match value {
        Some(AttrValue::Number(n)) if *n >= 0.0 => *n as u32,
        Some(AttrValue::Str(s)) => s.trim().trim_end_matches("px").parse().unwrap_or(0),
        _ => 0,
    }
}

/// Returns the tag to mirror for a live tag name: lowercased and trimmed,
/// or `div` when it contains characters outside `[a-z0-9-_:]`.
pub fn valid_tag_name(raw: &str) -> String {
    let tag = raw.trim().to_ascii_lowercase();
    let valid = !tag.is_empty()
        && tag
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b':'));
    if valid { tag } else { "div".to_owned() }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollToOptions {
    pub left: Option<f64>,
    pub top: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub scroll_left: f64,
    pub scroll_top: f64,
}

impl Window {
    /// Applies a scroll request; absent coordinates keep their value.
    pub fn scroll_to(&mut self, options: ScrollToOptions) {
        if let Some(left) = options.left {
            self.scroll_left = left;
        }
        if let Some(top) = options.top {
            self.scroll_top = top;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_dispatch_selects_payload() {
        assert_eq!(element_kind_for("video"), ElementKind::Media);
        assert_eq!(element_kind_for("audio"), ElementKind::Media);
        assert_eq!(element_kind_for("iframe"), ElementKind::Iframe);
        assert_eq!(element_kind_for("img"), ElementKind::Image);
        assert_eq!(element_kind_for("div"), ElementKind::Plain);
        assert_eq!(ElementData::new("video").kind(), ElementKind::Media);
    }

    #[test]
    fn tag_match_ignores_ascii_case() {
        let element = ElementData::new("div");
        assert!(element.has_tag("div"));
        assert!(element.has_tag("DIV"));
        assert!(!element.has_tag("span"));
    }

    #[test]
    fn attributes_keep_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("id", "a");
        attrs.set("class", "x");
        attrs.set("id", "b");
        attrs.set("checked", true);
        let names: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["id", "class", "checked"]);
        assert_eq!(attrs.get("id"), Some(&AttrValue::from("b")));
        assert_eq!(attrs.remove("class"), Some(AttrValue::from("x")));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn invalid_tag_names_become_div() {
        assert_eq!(valid_tag_name(" DIV "), "div");
        assert_eq!(valid_tag_name("my-widget"), "my-widget");
        assert_eq!(valid_tag_name("svg:rect"), "svg:rect");
        assert_eq!(valid_tag_name("bad tag"), "div");
        assert_eq!(valid_tag_name("a$"), "div");
    }

    #[test]
    fn image_fields_follow_attributes() {
        let mut img = ElementData::new("img");
        img.attributes.set("src", "/a.png");
        img.attributes.set("width", "40");
        img.attributes.set("height", "20px");
        img.refresh_source_fields();
        let image = img.image().unwrap();
        assert_eq!(image.src, "/a.png");
        assert_eq!((image.width, image.height), (40, 20));
    }

    #[test]
    fn window_scroll_to_updates_given_axes() {
        let mut window = Window::default();
        window.scroll_to(ScrollToOptions {
            left: Some(10.0),
            top: None,
        });
        window.scroll_to(ScrollToOptions {
            left: None,
            top: Some(5.0),
        });
        assert_eq!(window.scroll_left, 10.0);
        assert_eq!(window.scroll_top, 5.0);
    }

    #[test]
    fn media_play_and_pause() {
        let mut media = MediaData::default();
        assert!(media.paused);
        media.play();
        assert!(!media.paused);
        media.pause();
        assert!(media.paused);
    }
}
