//! A microformats2 parser covering what's needed to describe a linking page.
//!
//! Supports `h-*` root classes, `p-`, `u-`, `dt-` and `e-` properties, nested items and the
//! implied `name`, `url` and `photo` properties. Backwards-compatible (mf1) class names, `value`
//! class patterns and `rel` collection are not implemented.

use std::collections::HashMap;

use derive_more::From;
use reqwest::Url;
use scraper::{ElementRef, Html};

/// A property value: either plain text or a nested item.
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Item(Box<Item>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Root class names, e.g. `h-entry`.
    pub types: Vec<String>,
    pub properties: HashMap<String, Vec<PropertyValue>>,

    /// For items nested as a property value: the plain-text meaning of the property.
    pub value: Option<String>,

    /// Items found inside this one that aren't property values.
    pub children: Vec<Item>,
}

impl Item {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn has_type(&self, ty: &str) -> bool {
        self.types.iter().any(|t| t == ty)
    }

    /// The first plain-text value of the property.
    pub fn first_text(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)?
            .iter()
            .find_map(|value| match value {
                PropertyValue::Text(s) => Some(s.as_str()),
                PropertyValue::Item(_) => None,
            })
    }

    /// Nested items stored under the property.
    pub fn items(&self, property: &str) -> impl Iterator<Item = &Item> {
        self.properties
            .get(property)
            .into_iter()
            .flatten()
            .filter_map(|value| match value {
                PropertyValue::Item(item) => Some(&**item),
                PropertyValue::Text(_) => None,
            })
    }

    pub fn push(&mut self, property: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties
            .entry(property.into())
            .or_default()
            .push(value.into());
    }
}

impl From<Item> for PropertyValue {
    fn from(item: Item) -> Self {
        Self::Item(Box::new(item))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub items: Vec<Item>,
}

pub fn parse(html: &str, base: &Url) -> Document {
    let html = Html::parse_document(html);
    let mut root = Builder::default();
    walk(html.root_element(), base, &mut root);

    Document {
        items: root.item.children,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    Url,
    DateTime,
    Embedded,
}

struct Classes {
    types: Vec<String>,
    properties: Vec<(Kind, String)>,
}

impl Classes {
    fn of(element: ElementRef<'_>) -> Self {
        let mut types = vec![];
        let mut properties = vec![];

        for class in element.value().classes() {
            if let Some(name) = mf2_name(class, "h-") {
                types.push(format!("h-{name}"));
                continue;
            }

            let property = [
                ("p-", Kind::Plain),
                ("u-", Kind::Url),
                ("dt-", Kind::DateTime),
                ("e-", Kind::Embedded),
            ]
            .into_iter()
            .find_map(|(prefix, kind)| Some((kind, mf2_name(class, prefix)?.to_owned())));

            if let Some(property) = property {
                properties.push(property);
            }
        }

        Self { types, properties }
    }
}

fn mf2_name<'a>(class: &'a str, prefix: &str) -> Option<&'a str> {
    let name = class.strip_prefix(prefix)?;
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    valid.then_some(name)
}

#[derive(Default)]
struct Builder {
    item: Item,
    has_text_properties: bool,
    has_url_property: bool,
    has_photo_property: bool,
    has_nested: bool,
}

impl Builder {
    fn push(&mut self, kind: Kind, name: String, value: PropertyValue) {
        match kind {
            Kind::Plain | Kind::Embedded => self.has_text_properties = true,
            Kind::Url | Kind::DateTime => {}
        }

        if name == "url" {
            self.has_url_property = true;
        }

        if name == "photo" {
            self.has_photo_property = true;
        }

        self.item.push(name, value);
    }
}

fn walk(parent: ElementRef<'_>, base: &Url, host: &mut Builder) {
    for element in parent.children().filter_map(ElementRef::wrap) {
        let Classes { types, properties } = Classes::of(element);

        if !types.is_empty() {
            host.has_nested = true;
            let item = parse_item(element, base, types);

            if properties.is_empty() {
                host.item.children.push(item);
                continue;
            }

            for (kind, name) in properties {
                let mut nested = item.clone();
                nested.value = Some(match kind {
                    Kind::Plain => nested
                        .first_text("name")
                        .map(String::from)
                        .unwrap_or_else(|| text_value(element)),
                    Kind::Url => nested
                        .first_text("url")
                        .map(String::from)
                        .unwrap_or_else(|| url_value(element, base)),
                    Kind::DateTime => datetime_value(element),
                    Kind::Embedded => text_value(element),
                });

                host.push(kind, name, nested.into());
            }

            continue;
        }

        for (kind, name) in properties {
            let value = match kind {
                Kind::Plain => plain_value(element),
                Kind::Url => url_value(element, base),
                Kind::DateTime => datetime_value(element),
                Kind::Embedded => text_value(element),
            };

            host.push(kind, name, value.into());
        }

        walk(element, base, host);
    }
}

fn parse_item(element: ElementRef<'_>, base: &Url, types: Vec<String>) -> Item {
    let mut builder = Builder {
        item: Item::new(types),
        ..Default::default()
    };
    walk(element, base, &mut builder);

    if !builder.has_text_properties && !builder.has_nested {
        builder.item.push("name", implied_name(element));
    }

    if !builder.has_url_property {
        if let Some(url) = implied_url(element, base) {
            builder.item.push("url", url);
        }
    }

    if !builder.has_photo_property {
        if let Some(photo) = implied_photo(element, base) {
            builder.item.push("photo", photo);
        }
    }

    builder.item
}

fn attr<'a>(element: ElementRef<'a>, tags: &[&str], attr: &str) -> Option<&'a str> {
    let element = element.value();

    tags.contains(&element.name())
        .then(|| element.attr(attr))
        .flatten()
}

fn text_value(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(String::from)
        .unwrap_or_else(|_| href.into())
}

fn plain_value(element: ElementRef<'_>) -> String {
    attr(element, &["abbr", "link"], "title")
        .or_else(|| attr(element, &["data", "input"], "value"))
        .or_else(|| attr(element, &["img", "area"], "alt"))
        .map(String::from)
        .unwrap_or_else(|| text_value(element))
}

fn url_value(element: ElementRef<'_>, base: &Url) -> String {
    attr(element, &["a", "area", "link"], "href")
        .or_else(|| attr(element, &["img", "audio", "video", "source", "iframe"], "src"))
        .or_else(|| attr(element, &["video"], "poster"))
        .or_else(|| attr(element, &["object"], "data"))
        .map(|href| resolve(base, href))
        .or_else(|| attr(element, &["abbr"], "title").map(String::from))
        .or_else(|| attr(element, &["data", "input"], "value").map(String::from))
        .unwrap_or_else(|| text_value(element))
}

fn datetime_value(element: ElementRef<'_>) -> String {
    attr(element, &["time", "ins", "del"], "datetime")
        .or_else(|| attr(element, &["abbr"], "title"))
        .or_else(|| attr(element, &["data", "input"], "value"))
        .map(String::from)
        .unwrap_or_else(|| text_value(element))
}

fn implied_name(element: ElementRef<'_>) -> String {
    attr(element, &["img", "area"], "alt")
        .or_else(|| attr(element, &["abbr"], "title"))
        .map(String::from)
        .unwrap_or_else(|| text_value(element))
}

fn implied_url(element: ElementRef<'_>, base: &Url) -> Option<String> {
    if let Some(href) = attr(element, &["a", "area"], "href") {
        return Some(resolve(base, href));
    }

    only_child(element, &["a", "area"])
        .and_then(|child| attr(child, &["a", "area"], "href"))
        .map(|href| resolve(base, href))
}

fn implied_photo(element: ElementRef<'_>, base: &Url) -> Option<String> {
    if let Some(src) = attr(element, &["img"], "src") {
        return Some(resolve(base, src));
    }

    only_child(element, &["img"])
        .and_then(|child| attr(child, &["img"], "src"))
        .map(|src| resolve(base, src))
}

/// The element's single child element, if it has exactly one and it's one of `tags`.
fn only_child<'a>(element: ElementRef<'a>, tags: &[&str]) -> Option<ElementRef<'a>> {
    let mut children = element.children().filter_map(ElementRef::wrap);
    let child = children.next()?;

    (children.next().is_none() && tags.contains(&child.value().name())).then_some(child)
}
