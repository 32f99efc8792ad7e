//! Style projection over the `style` attribute.
//!
//! The attribute text is the only stored form. Reading style parses it into
//! a `CssProperties` map keyed by camel-cased property names; `StyleView`
//! writes every change straight back into the attribute. Declarations are
//! tokenized with `cssparser`'s `DeclarationParser` so that values keep
//! their original text, including `;` inside `url(...)` or quoted strings.

use crate::dom::{AttrValue, Attributes};
use cssparser::{
    AtRuleParser, DeclarationParser, ParserState, QualifiedRuleParser, RuleBodyItemParser,
    RuleBodyParser,
};
use cssparser::{Parser, ParserInput};
use serde::{Deserialize, Serialize};

pub const STYLE_ATTRIBUTE: &str = "style";

/// Ordered property map produced by `parse_css_text`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssProperties {
    entries: Vec<(String, String)>,
}

impl CssProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a property up by either its camel-case or its hyphenated name.
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = camelize(name);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a property, keeping its position if it already exists.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = camelize(name);
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = camelize(name);
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct DeclarationText;

impl<'i> DeclarationParser<'i> for DeclarationText {
    type Declaration = (String, String);
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: cssparser::CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &ParserState,
    ) -> Result<(String, String), cssparser::ParseError<'i, ()>> {
        let start = input.position();
        while input.next_including_whitespace_and_comments().is_ok() {}
        let value = input.slice_from(start).trim();
        if value.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok((name.as_ref().trim().to_owned(), value.to_owned()))
    }
}

impl<'i> AtRuleParser<'i> for DeclarationText {
    type Prelude = ();
    type AtRule = (String, String);
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationText {
    type Prelude = ();
    type QualifiedRule = (String, String);
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, (String, String), ()> for DeclarationText {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

/// Parses inline declaration text into a property map. Invalid
/// declarations are dropped; a later duplicate overrides an earlier one.
pub fn parse_css_text(css_text: &str) -> CssProperties {
    let mut properties = CssProperties::new();
    if css_text.trim().is_empty() {
        return properties;
    }

    let mut input = ParserInput::new(css_text);
    let mut parser = Parser::new(&mut input);
    let mut declarations = DeclarationText;
    for (name, value) in RuleBodyParser::new(&mut parser, &mut declarations).flatten() {
        properties.set(&name, value);
    }
    properties
}

/// Serializes a property map as `name: value;` pairs joined by spaces.
pub fn to_css_text(properties: &CssProperties) -> String {
    let mut out = String::new();
    for (name, value) in properties.iter() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&hyphenate(name));
        out.push_str(": ");
        out.push_str(value);
        out.push(';');
    }
    out
}

fn is_custom_property(name: &str) -> bool {
    name.len() > 2
        && name.starts_with("--")
        && name[2..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// `background-color` -> `backgroundColor`, `-webkit-box` -> `WebkitBox`.
/// Custom properties (`--x-y`) are returned unchanged.
pub fn camelize(name: &str) -> String {
    let name = name.trim();
    if is_custom_property(name) {
        return name.to_owned();
    }
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' {
            if let Some(next) = chars.peek().copied() {
                if next.is_ascii_lowercase() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Inverse of `camelize`: `backgroundColor` -> `background-color`,
/// `WebkitBox` -> `-webkit-box`.
pub fn hyphenate(name: &str) -> String {
    if is_custom_property(name) {
        return name.to_owned();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Reads the projection of an attribute map. Missing or empty `style`
/// yields an empty map.
pub fn read_style(attributes: &Attributes) -> CssProperties {
    match attributes.get(STYLE_ATTRIBUTE) {
        Some(value) => parse_css_text(&value.to_string()),
        None => CssProperties::new(),
    }
}

/// Mutable style view over one element's attributes.
///
/// The parsed map lives only as long as the view; each mutation
/// re-serializes it into the `style` attribute immediately.
#[derive(Debug)]
pub struct StyleView<'a> {
    attributes: &'a mut Attributes,
    properties: CssProperties,
}

impl<'a> StyleView<'a> {
    pub fn new(attributes: &'a mut Attributes) -> Self {
        let properties = read_style(attributes);
        StyleView {
            attributes,
            properties,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &CssProperties {
        &self.properties
    }

    /// An empty value deletes the property.
    pub fn set_property(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.properties.remove(name);
        } else {
            self.properties.set(name, value);
        }
        self.write_back();
    }

    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        let removed = self.properties.remove(name);
        self.write_back();
        removed
    }

    fn write_back(&mut self) {
        let text = to_css_text(&self.properties);
        self.attributes.set(STYLE_ATTRIBUTE, AttrValue::Str(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_camelizes_declarations() {
        let props = parse_css_text("background-color: red; margin-top : 4px;color:blue");
        assert_eq!(props.len(), 3);
        assert_eq!(props.get("backgroundColor"), Some("red"));
        assert_eq!(props.get("margin-top"), Some("4px"));
        assert_eq!(props.get("color"), Some("blue"));
    }

    #[test]
    fn keeps_semicolons_inside_functions_and_strings() {
        let props = parse_css_text(
            "background-image: url(data:image/png;base64,AAAA); content: 'a;b'; width: 1px",
        );
        assert_eq!(
            props.get("backgroundImage"),
            Some("url(data:image/png;base64,AAAA)")
        );
        assert_eq!(props.get("content"), Some("'a;b'"));
        assert_eq!(props.get("width"), Some("1px"));
    }

    #[test]
    fn custom_properties_keep_their_name() {
        let props = parse_css_text("--main-color: #fff;");
        assert_eq!(props.get("--main-color"), Some("#fff"));
        assert_eq!(to_css_text(&props), "--main-color: #fff;");
    }

    #[test]
    fn vendor_prefixes_survive_a_round_trip() {
        assert_eq!(camelize("-webkit-transition"), "WebkitTransition");
        assert_eq!(hyphenate("WebkitTransition"), "-webkit-transition");
        let props = parse_css_text("-webkit-transition: all 1s;");
        assert_eq!(parse_css_text(&to_css_text(&props)), props);
    }

    #[test]
    fn serialize_then_parse_is_identity() {
        let inputs = [
            "display: flex; flex-direction: row; width: 100px;",
            "color: rgb(1, 2, 3); font-family: \"Helvetica Neue\", sans-serif",
            "transform: translate(10px, 20px) !important",
            "",
        ];
        for input in inputs {
            let props = parse_css_text(input);
            assert_eq!(parse_css_text(&to_css_text(&props)), props, "input: {input}");
        }
    }

    #[test]
    fn invalid_declarations_are_dropped() {
        let props = parse_css_text("color: ; : red; width: 2px; garbage");
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("width"), Some("2px"));
    }

    #[test]
    fn style_view_writes_through() {
        let mut attributes = Attributes::new();
        {
            let mut style = StyleView::new(&mut attributes);
            style.set_property("background-color", "red");
        }
        assert_eq!(
            attributes.get(STYLE_ATTRIBUTE).map(|v| v.to_string()),
            Some("background-color: red;".to_string())
        );
        assert_eq!(read_style(&attributes).get("backgroundColor"), Some("red"));

        {
            let mut style = StyleView::new(&mut attributes);
            style.set_property("color", "blue");
            style.set_property("backgroundColor", "");
        }
        assert_eq!(
            attributes.get(STYLE_ATTRIBUTE).map(|v| v.to_string()),
            Some("color: blue;".to_string())
        );
    }

    #[test]
    fn remove_property_reports_old_value() {
        let mut attributes = Attributes::new();
        attributes.set(STYLE_ATTRIBUTE, AttrValue::from("width: 1px; height: 2px;"));
        let mut style = StyleView::new(&mut attributes);
        assert_eq!(style.remove_property("width"), Some("1px".to_string()));
        assert_eq!(style.remove_property("width"), None);
        assert_eq!(style.get("height"), Some("2px"));
        drop(style);
        assert_eq!(
            attributes.get(STYLE_ATTRIBUTE).map(|v| v.to_string()),
            Some("height: 2px;".to_string())
        );
    }
}
