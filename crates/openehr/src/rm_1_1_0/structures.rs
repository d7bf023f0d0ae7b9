//! RM 1.1.0 data structures: items, item structures and event histories.

use crate::node::rm_node;
use crate::rm_1_1_0::common::Locatable;
use crate::rm_1_1_0::constants::{EVENT_MATH_FUNCTION_CODES, NULL_FLAVOUR_CODES};
use crate::rm_1_1_0::data_types::{DataValue, DvCodedText, DvDateTime, DvDuration, TextValue};
use crate::union::rm_union;
use serde::{Deserialize, Serialize};

/// RM `ELEMENT`: a leaf holding one data value, or the reason it is missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<DataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_flavour: Option<DvCodedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_reason: Option<TextValue>,
}

impl Element {
    pub fn new(archetype_node_id: &str, name: impl Into<TextValue>) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::new(archetype_node_id, name),
            value: None,
            null_flavour: None,
            null_reason: None,
        }
    }

    /// An element carrying `value`.
    pub fn with_value(
        archetype_node_id: &str,
        name: impl Into<TextValue>,
        value: impl Into<DataValue>,
    ) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new(archetype_node_id, name)
        }
    }

    /// Returns `true` if the element records a missing value.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

rm_node! {
    Element => "ELEMENT";
    flatten [locatable];
    children [value, null_flavour, null_reason];
    check |node, c| {
        match (&node.value, &node.null_flavour) {
            (None, None) => c.fail(
                "",
                "either value or null_flavour is required",
                "Record the value, or say why it is missing with null_flavour",
            ),
            (Some(_), Some(_)) => c.fail(
                "null_flavour",
                "null_flavour must be absent when value is present",
                "Remove null_flavour or the value",
            ),
            _ => {}
        }
        if let Some(flavour) = &node.null_flavour {
            flavour.check_openehr(c, "null_flavour", NULL_FLAVOUR_CODES);
        }
        if node.null_reason.is_some() && node.value.is_some() {
            c.fail(
                "null_reason",
                "null_reason is only allowed on a null element",
                "Remove null_reason",
            );
        }
    }
}

/// RM `CLUSTER`: a group of items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub items: Vec<Item>,
}

impl Cluster {
    pub fn new(archetype_node_id: &str, name: impl Into<TextValue>, items: Vec<Item>) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::new(archetype_node_id, name),
            items,
        }
    }
}

rm_node! {
    Cluster => "CLUSTER";
    flatten [locatable];
    children [items];
    check |node, c| {
        c.non_empty("items", &node.items);
    }
}

rm_union! {
    /// RM `ITEM`.
    pub enum Item => "ITEM", default Element {
        Cluster(Cluster),
        Element(Element),
    }
}

/// RM `ITEM_SINGLE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSingle {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub item: Element,
}

rm_node! {
    ItemSingle => "ITEM_SINGLE";
    flatten [locatable];
    children [item];
}

/// RM `ITEM_LIST`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Element>>,
}

rm_node! {
    ItemList => "ITEM_LIST";
    flatten [locatable];
    children [items];
}

/// RM `ITEM_TABLE`: rows are clusters whose elements are the columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemTable {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Cluster>>,
}

rm_node! {
    ItemTable => "ITEM_TABLE";
    flatten [locatable];
    children [rows];
    check |node, c| {
        let Some(rows) = &node.rows else {
            return;
        };
        if rows
            .iter()
            .any(|row| row.items.iter().any(|cell| cell.get::<Element>().is_none()))
        {
            c.fail(
                "rows",
                "every table cell must be an ELEMENT",
                "Flatten nested clusters into columns",
            );
        }
        if let Some(first) = rows.first() {
            let columns = first.items.len();
            if rows.iter().any(|row| row.items.len() != columns) {
                c.fail(
                    "rows",
                    format!("every row must have {columns} columns"),
                    "Give each row the same number of cells",
                );
            }
        }
    }
}

/// RM `ITEM_TREE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemTree {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
}

impl ItemTree {
    pub fn new(archetype_node_id: &str, name: impl Into<TextValue>, items: Vec<Item>) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::new(archetype_node_id, name),
            items: Some(items),
        }
    }
}

rm_node! {
    ItemTree => "ITEM_TREE";
    flatten [locatable];
    children [items];
}

rm_union! {
    /// RM `ITEM_STRUCTURE`.
    pub enum ItemStructure => "ITEM_STRUCTURE", default ItemTree {
        ItemSingle(ItemSingle),
        ItemList(ItemList),
        ItemTable(ItemTable),
        ItemTree(ItemTree),
    }
}

/// RM `HISTORY`: a time series of events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub origin: DvDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<DvDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<DvDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
}

impl History {
    pub fn new(archetype_node_id: &str, name: impl Into<TextValue>, origin: DvDateTime) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::new(archetype_node_id, name),
            origin,
            period: None,
            duration: None,
            summary: None,
            events: None,
        }
    }

    /// Returns `true` if events are recorded at a fixed period.
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }
}

rm_node! {
    History => "HISTORY";
    flatten [locatable];
    children [origin, period, duration, summary, events];
    check |node, c| {
        if node.events.is_none() && node.summary.is_none() {
            c.fail(
                "",
                "either events or summary is required",
                "Record at least one event or a summary",
            );
        }
        c.non_empty_when_present("events", &node.events);
    }
}

/// RM `POINT_EVENT`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointEvent {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub time: DvDateTime,
    pub data: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ItemStructure>,
}

impl PointEvent {
    pub fn new(
        archetype_node_id: &str,
        name: impl Into<TextValue>,
        time: DvDateTime,
        data: impl Into<ItemStructure>,
    ) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::new(archetype_node_id, name),
            time,
            data: data.into(),
            state: None,
        }
    }
}

rm_node! {
    PointEvent => "POINT_EVENT";
    flatten [locatable];
    children [time, data, state];
}

/// RM `INTERVAL_EVENT`: an event summarising samples over `width`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntervalEvent {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub time: DvDateTime,
    pub data: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ItemStructure>,
    pub width: DvDuration,
    pub math_function: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<i64>,
}

rm_node! {
    IntervalEvent => "INTERVAL_EVENT";
    flatten [locatable];
    children [time, data, state, width, math_function];
    check |node, c| {
        node.math_function
            .check_openehr(c, "math_function", EVENT_MATH_FUNCTION_CODES);
        if let Some(count) = node.sample_count {
            c.at_least("sample_count", count, 0);
        }
    }
}

rm_union! {
    /// RM `EVENT`.
    pub enum Event => "EVENT", default PointEvent {
        PointEvent(PointEvent),
        IntervalEvent(IntervalEvent),
    }
}
