//! openEHR Reference Model codec and validator.
//!
//! This crate translates between the self-describing JSON (and YAML) form of openEHR RM 1.1.0
//! data and typed Rust trees, and checks those trees against the structural and lexical
//! constraints of the RM.
//!
//! - Polymorphic slots are family enums decoded by peeking `_type` first (see [`union`]).
//! - [`canonicalize`] stamps every node with its authoritative `_type`.
//! - [`validate`] walks a tree and reports every [`Violation`] with a `$`-rooted path.
//!
//! Terminology lookups are delegated to an [`openehr_terminology::Terminology`]
//! implementation; the built-in code tables are used unless a [`Codec`] is given others.
//!
//! Storage layers bind decoded attributes through [`ToBind`]: an absent optional binds as
//! [`BindValue::Null`], and whole nodes bind as their JSON encoding with [`bind_json`].

pub mod canonical;
pub mod config;
pub mod discriminator;
pub mod error;
pub mod lexical;
pub mod node;
pub mod optional;
pub mod registry;
pub mod rm_1_1_0;
pub mod union;
pub mod validation;

pub use config::{max_depth_from_env_value, CodecConfig, DEFAULT_MAX_DEPTH, MAX_DEPTH_ENV};
pub use discriminator::{extract_discriminator, peek_discriminator, TYPE_FIELD};
pub use error::{
    CanonicalizeError, ConfigError, DecodeError, EncodeError, OpenEhrError, OpenEhrResult,
};
pub use node::{Node, RmType};
pub use optional::{bind_json, BindValue, ToBind};
pub use union::{Family, Member};
pub use validation::{ValidationReport, Validator, Violation};

use config::ROOT_PATH;
use node::{Step, Trail, Visitor};
use once_cell::sync::Lazy;
use openehr_terminology::{CodeTables, Terminology};
use registry::member_path;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Decode, encode, canonicalise and validate RM trees under one configuration.
#[derive(Clone)]
pub struct Codec {
    config: CodecConfig,
    terminology: Arc<dyn Terminology>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl Codec {
    /// A codec validating against the built-in code tables.
    pub fn new(config: CodecConfig) -> Self {
        Self::with_terminology(config, Arc::new(CodeTables::builtin()))
    }

    pub fn with_terminology(config: CodecConfig, terminology: Arc<dyn Terminology>) -> Self {
        Self {
            config,
            terminology,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn terminology(&self) -> &dyn Terminology {
        self.terminology.as_ref()
    }

    fn check_depth(&self, depth: usize) -> Result<(), DecodeError> {
        let limit = self.config.max_depth();
        if depth > limit {
            tracing::warn!(depth, limit, "decode refused: maximum depth exceeded");
            return Err(DecodeError::MaxDepthExceeded { limit, depth });
        }
        Ok(())
    }

    /// Decode JSON bytes into `T` (a concrete RM type or a family enum).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MaxDepthExceeded`] before any typed decoding if the input nests
    /// deeper than the configured limit, [`DecodeError::Json`] for malformed JSON and
    /// [`DecodeError::Schema`] (with the failing path) if the document does not fit `T`.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + RmType,
    {
        self.check_depth(discriminator::json_depth(bytes))?;

        union::with_stack(|| {
            let mut deserializer = serde_json::Deserializer::from_slice(bytes);
            let decoded = serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
                let path = member_path(&err.path().to_string());
                let inner = err.into_inner();
                if inner.is_syntax() || inner.is_eof() || inner.is_io() {
                    DecodeError::Json(inner)
                } else {
                    DecodeError::Schema {
                        model: T::TYPE_NAME,
                        path,
                        message: inner.to_string(),
                    }
                }
            })?;
            deserializer.end()?;
            Ok(decoded)
        })
    }

    /// Decode JSON bytes into family `F`, peeking `_type` before decoding the payload.
    ///
    /// An unrecognised `_type` is not an error: it yields the family's `Unknown` member.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MaxDepthExceeded`] for over-deep input,
    /// [`DecodeError::Discriminator`] if the input is not an object with a string `_type` (or
    /// none), and [`DecodeError::Variant`] if the payload does not fit the resolved member.
    pub fn decode_union<F: Family>(&self, bytes: &[u8]) -> Result<F, DecodeError> {
        self.check_depth(discriminator::json_depth(bytes))?;
        union::with_stack(|| union::from_slice(bytes))
    }

    /// Decode an already-parsed JSON value into `T`.
    ///
    /// # Errors
    ///
    /// As [`Codec::decode`], except that syntax errors cannot occur.
    pub fn decode_value<T>(&self, value: Value) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + RmType,
    {
        self.check_depth(discriminator::value_depth(&value))?;
        union::with_stack(|| {
            serde_path_to_error::deserialize(value).map_err(|err| DecodeError::Schema {
                model: T::TYPE_NAME,
                path: member_path(&err.path().to_string()),
                message: err.into_inner().to_string(),
            })
        })
    }

    /// Decode a family member from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// As [`Codec::decode_union`].
    pub fn decode_union_value<F: Family>(&self, value: Value) -> Result<F, DecodeError> {
        self.check_depth(discriminator::value_depth(&value))?;
        union::with_stack(|| union::from_json_value(value))
    }

    /// Check that `node` can be encoded faithfully.
    fn guard(&self, node: &dyn Node) -> Result<(), EncodeError> {
        let mut guard = EncodeGuard {
            trail: Trail::new(ROOT_PATH),
            max_depth: self.config.max_depth(),
            error: None,
        };
        guard.node(node);
        match guard.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Encode `node` as JSON.
    ///
    /// The tree is encoded as it is: `_type` members are written only where they are stored.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownVariant`] if the tree holds an unrecognised family member,
    /// [`EncodeError::Mistagged`] if a family member would decode back as a different member,
    /// and [`EncodeError::MaxDepthExceeded`] if the tree nests deeper than the limit.
    pub fn encode<T: Node + Serialize>(&self, node: &T) -> Result<Vec<u8>, EncodeError> {
        self.guard(node)?;
        Ok(union::with_stack(|| serde_json::to_vec(node))?)
    }

    /// Canonicalise `node` in place, then encode it as JSON.
    ///
    /// # Errors
    ///
    /// Returns the canonicaliser's or the encoder's error.
    pub fn encode_canonical<T: Node + Serialize>(&self, node: &mut T) -> OpenEhrResult<Vec<u8>> {
        self.canonicalize(node)?;
        Ok(self.encode(node)?)
    }

    /// Stamp every reachable node with its authoritative `_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalizeError::MaxDepthExceeded`] if the tree nests deeper than the limit.
    pub fn canonicalize(&self, node: &mut dyn Node) -> Result<(), CanonicalizeError> {
        canonical::canonicalize_node(node, self.config.max_depth())
    }

    /// Every violation in `node`, in depth-first order.
    pub fn validate(&self, node: &dyn Node) -> Vec<Violation> {
        Validator::new(self.terminology(), &self.config).validate(node)
    }

    pub fn report(&self, node: &dyn Node) -> ValidationReport {
        self.validate(node).into()
    }

    /// Read `T` from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Yaml`] for malformed YAML, [`DecodeError::MaxDepthExceeded`] for
    /// over-deep documents and [`DecodeError::Schema`] (with the failing path) if the document
    /// does not fit `T`.
    pub fn read_yaml<T>(&self, yaml: &str) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + RmType,
    {
        let value: Value = serde_yaml::from_str(yaml)?;
        self.decode_value(value)
    }

    /// Write `node` as YAML.
    ///
    /// # Errors
    ///
    /// As [`Codec::encode`].
    pub fn write_yaml<T: Node + Serialize>(&self, node: &T) -> Result<String, EncodeError> {
        self.guard(node)?;
        Ok(union::with_stack(|| serde_yaml::to_string(node))?)
    }
}

/// Pre-encode walk rejecting trees whose JSON form would not decode back to the same tree.
struct EncodeGuard {
    trail: Trail,
    max_depth: usize,
    error: Option<EncodeError>,
}

impl EncodeGuard {
    fn node(&mut self, node: &dyn Node) {
        if self.trail.depth() > self.max_depth {
            tracing::warn!(
                path = self.trail.path(),
                limit = self.max_depth,
                "encode refused: maximum depth exceeded"
            );
            self.error = Some(EncodeError::MaxDepthExceeded {
                limit: self.max_depth,
                path: self.trail.path().to_owned(),
            });
            return;
        }

        if let Some((family, tag)) = node.unknown_member() {
            self.error = Some(EncodeError::UnknownVariant {
                family,
                type_tag: tag.to_owned(),
                path: self.trail.path().to_owned(),
            });
            return;
        }

        if let Some((family, wire_tag)) = node.wire_discriminator() {
            if wire_tag != node.type_name() {
                self.error = Some(EncodeError::Mistagged {
                    family,
                    type_name: node.type_name(),
                    wire_tag: wire_tag.to_owned(),
                    path: self.trail.path().to_owned(),
                });
                return;
            }
        }

        node.visit_children(self);
    }
}

impl Visitor for EncodeGuard {
    fn visit(&mut self, step: Step, node: &dyn Node) {
        if self.error.is_some() {
            return;
        }
        let mark = self.trail.enter(step);
        self.node(node);
        self.trail.leave(step, mark);
    }
}

static DEFAULT_CODEC: Lazy<Codec> = Lazy::new(Codec::default);

/// [`Codec::decode`] with the default configuration.
pub fn decode<T: DeserializeOwned + RmType>(bytes: &[u8]) -> Result<T, DecodeError> {
    DEFAULT_CODEC.decode(bytes)
}

/// [`Codec::decode_union`] with the default configuration.
pub fn decode_union<F: Family>(bytes: &[u8]) -> Result<F, DecodeError> {
    DEFAULT_CODEC.decode_union(bytes)
}

/// [`Codec::decode_value`] with the default configuration.
pub fn decode_value<T: DeserializeOwned + RmType>(value: Value) -> Result<T, DecodeError> {
    DEFAULT_CODEC.decode_value(value)
}

/// [`Codec::encode`] with the default configuration.
pub fn encode<T: Node + Serialize>(node: &T) -> Result<Vec<u8>, EncodeError> {
    DEFAULT_CODEC.encode(node)
}

/// [`Codec::encode_canonical`] with the default configuration.
pub fn encode_canonical<T: Node + Serialize>(node: &mut T) -> OpenEhrResult<Vec<u8>> {
    DEFAULT_CODEC.encode_canonical(node)
}

/// [`Codec::canonicalize`] with the default configuration.
pub fn canonicalize(node: &mut dyn Node) -> Result<(), CanonicalizeError> {
    DEFAULT_CODEC.canonicalize(node)
}

/// [`Codec::validate`] with the default configuration and built-in code tables.
pub fn validate(node: &dyn Node) -> Vec<Violation> {
    DEFAULT_CODEC.validate(node)
}

/// [`Codec::read_yaml`] with the default configuration.
pub fn read_yaml<T: DeserializeOwned + RmType>(yaml: &str) -> Result<T, DecodeError> {
    DEFAULT_CODEC.read_yaml(yaml)
}

/// [`Codec::write_yaml`] with the default configuration.
pub fn write_yaml<T: Node + Serialize>(node: &T) -> Result<String, EncodeError> {
    DEFAULT_CODEC.write_yaml(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rm_1_1_0::common::PartyIdentified;
    use crate::rm_1_1_0::data_types::{
        CodePhrase, DataValue, DvCodedText, DvDateTime, DvMultimedia, DvQuantity, DvText,
    };
    use crate::rm_1_1_0::ehr::{Composition, ContentItem, EhrStatus, SubjectReference};
    use crate::rm_1_1_0::identifiers::{HierObjectId, ObjectRef, ObjectVersionId};
    use crate::rm_1_1_0::structures::{Cluster, Element, Item, ItemStructure, ItemTree};
    use serde_json::json;

    fn composition() -> Composition {
        let device = Cluster::new(
            "at0020",
            "Device",
            vec![Item::from(Element::with_value(
                "at0021",
                "Cuff size",
                DvCodedText::new("Adult", "local", "at0022"),
            ))],
        );
        let data = ItemTree::new(
            "at0001",
            "Tree",
            vec![
                Item::from(Element::with_value("at0004", "Systolic", DvQuantity::new(120.0, "mm[Hg]"))),
                Item::from(device),
            ],
        );
        let section = rm_1_1_0::ehr::Section {
            type_tag: None,
            locatable: rm_1_1_0::common::Locatable::archetype_root(
                "openEHR-EHR-SECTION.adhoc.v1",
                "Vital signs",
            ),
            items: None,
        };
        let admin = rm_1_1_0::ehr::AdminEntry {
            type_tag: None,
            locatable: rm_1_1_0::common::Locatable::archetype_root(
                "openEHR-EHR-ADMIN_ENTRY.admission.v1",
                "Admission",
            ),
            entry: rm_1_1_0::ehr::EntryFields::new("en"),
            data: ItemStructure::from(data),
        };

        let mut composition = Composition::new(
            "openEHR-EHR-COMPOSITION.encounter.v1",
            "Encounter",
            "en",
            "GB",
            DvCodedText::openehr("event", "433"),
            PartyIdentified::named("Dr Jones"),
        );
        composition.content = Some(vec![ContentItem::from(section), ContentItem::from(admin)]);
        composition
    }

    #[test]
    fn canonical_round_trip() {
        let mut original = composition();
        let bytes = encode_canonical(&mut original).expect("encode");
        let decoded: Composition = decode(&bytes).expect("decode");
        assert_eq!(decoded, original);
        assert!(validate(&decoded).is_empty());

        let mut again = decoded.clone();
        canonicalize(&mut again).expect("canonicalize");
        assert_eq!(again, decoded);
    }

    #[test]
    fn discriminators_survive_the_wire() {
        let mut original = composition();
        let bytes = encode_canonical(&mut original).expect("encode");
        let wire: Value = serde_json::from_slice(&bytes).expect("json");

        assert_eq!(wire["_type"], "COMPOSITION");
        assert_eq!(wire["composer"]["_type"], "PARTY_IDENTIFIED");
        assert_eq!(wire["content"][1]["_type"], "ADMIN_ENTRY");
        assert_eq!(wire["content"][1]["data"]["items"][0]["value"]["_type"], "DV_QUANTITY");
        assert_eq!(wire["content"][1]["data"]["items"][1]["_type"], "CLUSTER");
        assert_eq!(
            wire["content"][1]["data"]["items"][1]["items"][0]["value"]["_type"],
            "DV_CODED_TEXT"
        );
    }

    #[test]
    fn encode_refuses_members_that_would_change_shape() {
        let element = Element::with_value("at0004", "Systolic", DvQuantity::new(120.0, "mm[Hg]"));
        match encode(&element) {
            Err(EncodeError::Mistagged {
                family,
                type_name,
                wire_tag,
                path,
            }) => {
                assert_eq!(family, "DATA_VALUE");
                assert_eq!(type_name, "DV_QUANTITY");
                assert_eq!(wire_tag, "DV_TEXT");
                assert_eq!(path, "$.value");
            }
            other => panic!("expected Mistagged, got {other:?}"),
        }

        // Default members need no tag.
        let plain = Element::with_value("at0005", "Comment", DvText::new("ok"));
        let wire: Value = serde_json::from_slice(&encode(&plain).expect("encode")).expect("json");
        assert_eq!(wire, json!({
            "archetype_node_id": "at0005",
            "name": {"value": "Comment"},
            "value": {"value": "ok"}
        }));
    }

    #[test]
    fn unknown_members_decode_validate_and_refuse_to_encode() {
        let bytes = br#"{
            "_type": "ELEMENT",
            "archetype_node_id": "at0004",
            "name": {"value": "Genome"},
            "value": {"_type": "DV_GENOME", "sequence": "GATTACA"}
        }"#;
        let element: Element = decode(bytes).expect("decode");
        assert_eq!(element.value, Some(DataValue::Unknown("DV_GENOME".into())));

        let violations = validate(&element);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.value");
        assert!(violations[0].message.contains("DATA_VALUE"));

        match encode(&element) {
            Err(EncodeError::UnknownVariant { family, type_tag, path }) => {
                assert_eq!((family, type_tag.as_str(), path.as_str()), ("DATA_VALUE", "DV_GENOME", "$.value"));
            }
            other => panic!("expected UnknownVariant, got {other:?}"),
        }
    }

    #[test]
    fn decode_union_applies_default_and_reports_member_errors() {
        let item: Item = decode_union(br#"{"archetype_node_id": "at0001", "name": {"value": "x"}, "value": {"value": "y"}}"#)
            .expect("decode");
        assert_eq!(item.kind(), Some("ELEMENT"));

        let err = decode_union::<Item>(br#"{"_type": "CLUSTER", "archetype_node_id": "at0001", "name": {"value": "x"}, "items": 3}"#)
            .expect_err("bad items");
        match err {
            DecodeError::Variant { family, type_tag, .. } => {
                assert_eq!((family, type_tag), ("ITEM", "CLUSTER"));
            }
            other => panic!("expected Variant, got {other:?}"),
        }

        assert!(matches!(
            decode_union::<Item>(b"[1, 2]"),
            Err(DecodeError::Discriminator(_))
        ));
    }

    #[test]
    fn nested_violation_paths_follow_the_wire() {
        let tree: ItemStructure = decode_value(json!({
            "_type": "ITEM_TREE",
            "archetype_node_id": "at0001",
            "name": {"value": "Tree"},
            "items": [{
                "_type": "CLUSTER",
                "archetype_node_id": "at0002",
                "name": {"value": "Device"},
                "items": [{
                    "archetype_node_id": "at0003",
                    "name": {"value": "Serial"},
                    "value": {"_type": "DV_QUANTITY", "magnitude": 1, "units": " "}
                }]
            }]
        }))
        .expect("decode");

        let violations = validate(&tree);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.items[0].items[0].value.units");
        assert_eq!(violations[0].model, "DV_QUANTITY");
    }

    #[test]
    fn reference_target_and_identifier_must_agree() {
        let reference = ObjectRef::new(
            "local",
            "EHR",
            ObjectVersionId::new("8849182c-82ad-4088-a07f-48ead4180515::example.org::1"),
        );
        assert_eq!(validate(&reference).len(), 1);
        assert!(validate(&ObjectRef::new("local", "EHR", HierObjectId::generate())).is_empty());
    }

    #[test]
    fn absent_optionals_are_omitted_and_stay_absent() {
        let text = DvText::new("hello");
        let bytes = encode(&text).expect("encode");
        assert_eq!(bytes, br#"{"value":"hello"}"#);
        let decoded: DvText = decode(&bytes).expect("decode");
        assert_eq!(decoded.formatting, None);

        let decoded: DvText = decode(br#"{"value": "hello", "formatting": null}"#).expect("decode");
        assert_eq!(decoded.formatting, None);

        let decoded: DvText = decode(br#"{"value": "hello", "formatting": ""}"#).expect("decode");
        assert_eq!(decoded.formatting.as_deref(), Some(""));
        assert_eq!(encode(&decoded).expect("encode"), br#"{"value":"hello","formatting":""}"#);
    }

    #[test]
    fn decoded_attributes_bind_for_storage() {
        let quantity: DvQuantity =
            decode(br#"{"magnitude": 72.5, "units": "kg", "units_system": null}"#).expect("decode");
        assert_eq!(quantity.magnitude.to_bind(), BindValue::Real(72.5));
        assert_eq!(quantity.units.to_bind(), BindValue::Text("kg".into()));
        assert_eq!(quantity.precision.to_bind(), BindValue::Null);
        assert_eq!(quantity.units_system.to_bind(), BindValue::Null);
        assert_eq!(
            bind_json(&quantity),
            BindValue::Json(json!({"magnitude": 72.5, "units": "kg"}))
        );

        let element: Element = decode(
            br#"{"archetype_node_id": "at0004", "name": {"value": "Genome"}, "value": {"_type": "DV_GENOME"}}"#,
        )
        .expect("decode");
        assert_eq!(bind_json(&element), BindValue::Null);
    }

    #[test]
    fn schema_mismatch_names_the_path() {
        let err = decode::<Composition>(br#"{"archetype_node_id": "x", "name": {"value": "y"}, "language": 5}"#)
            .expect_err("bad language");
        match err {
            DecodeError::Schema { model, path, .. } => {
                assert_eq!(model, "COMPOSITION");
                assert_eq!(path, "$.language");
            }
            other => panic!("expected Schema, got {other:?}"),
        }
        assert!(matches!(decode::<DvText>(b"{\"value\": "), Err(DecodeError::Json(_))));
    }

    fn thumbnail_chain(length: usize) -> DvMultimedia {
        let mut media = DvMultimedia::referenced("https://example.org/0.png", "image/png", 1);
        for index in 1..=length {
            let mut outer =
                DvMultimedia::referenced(&format!("https://example.org/{index}.png"), "image/png", 1);
            outer.thumbnail = Some(Box::new(media));
            media = outer;
        }
        media
    }

    #[test]
    fn depth_bound_holds_everywhere() {
        let mut media = thumbnail_chain(70);

        let mut json = json!({"media_type": {"terminology_id": {"value": "IANA_media-types"}, "code_string": "image/png"}, "size": 1, "data": "AA=="});
        for _ in 0..70 {
            json = json!({"media_type": {"terminology_id": {"value": "IANA_media-types"}, "code_string": "image/png"}, "size": 1, "data": "AA==", "thumbnail": json});
        }
        let bytes = serde_json::to_vec(&json).expect("json");
        assert!(matches!(
            decode::<DvMultimedia>(&bytes),
            Err(DecodeError::MaxDepthExceeded { limit: DEFAULT_MAX_DEPTH, .. })
        ));
        assert!(matches!(
            decode_value::<DvMultimedia>(json),
            Err(DecodeError::MaxDepthExceeded { .. })
        ));

        assert!(matches!(encode(&media), Err(EncodeError::MaxDepthExceeded { limit: 64, .. })));
        assert!(matches!(
            canonicalize(&mut media),
            Err(CanonicalizeError::MaxDepthExceeded { limit: 64, .. })
        ));

        let violations = validate(&media);
        assert!(!violations.is_empty());
        assert!(violations
            .iter()
            .all(|v| v.message.starts_with("maximum depth exceeded")));

        let shallow = thumbnail_chain(3);
        assert!(encode(&shallow).is_ok());
        assert!(validate(&shallow).is_empty());
    }

    /// A CLUSTER nested `clusters` times around one ELEMENT; its JSON depth is
    /// `2 * clusters + 2`.
    fn cluster_chain(clusters: usize) -> Value {
        let mut item = json!({
            "archetype_node_id": "at0100",
            "name": {"value": "Reading"},
            "value": {"value": "steady"}
        });
        for index in 0..clusters {
            item = json!({
                "_type": "CLUSTER",
                "archetype_node_id": format!("at{:04}", index + 1),
                "name": {"value": "Group"},
                "items": [item]
            });
        }
        item
    }

    /// A SECTION nested `sections` times; its JSON depth is `2 * sections`.
    fn section_chain(sections: usize) -> Value {
        let leaf = || {
            json!({
                "_type": "SECTION",
                "archetype_node_id": "openEHR-EHR-SECTION.adhoc.v1",
                "name": {"value": "Notes"}
            })
        };
        let mut section = leaf();
        for _ in 1..sections {
            let mut outer = leaf();
            outer["items"] = json!([section]);
            section = outer;
        }
        section
    }

    fn on_small_stack<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(f)
            .expect("spawn")
            .join()
            .expect("join")
    }

    #[test]
    fn nested_clusters_at_the_depth_limit() {
        on_small_stack(|| {
            let chain = cluster_chain(31);
            assert_eq!(discriminator::value_depth(&chain), DEFAULT_MAX_DEPTH);
            let bytes = serde_json::to_vec(&chain).expect("json");

            let mut item: Item = decode_union(&bytes).expect("decode at the limit");
            assert_eq!(decode::<Item>(&bytes).expect("decode"), item);
            assert_eq!(decode_value::<Item>(chain).expect("decode"), item);
            assert!(validate(&item).is_empty());

            canonicalize(&mut item).expect("canonicalize");
            let encoded = encode(&item).expect("encode");
            assert_eq!(decode::<Item>(&encoded).expect("decode"), item);

            let strict = Codec::new(CodecConfig::new(DEFAULT_MAX_DEPTH - 1).expect("config"));
            assert!(matches!(
                strict.decode::<Item>(&bytes),
                Err(DecodeError::MaxDepthExceeded { depth: 64, limit: 63 })
            ));
            assert!(matches!(
                strict.encode(&item),
                Err(EncodeError::MaxDepthExceeded { limit: 63, .. })
            ));
            assert!(strict
                .validate(&item)
                .iter()
                .any(|v| v.message.starts_with("maximum depth exceeded")));
            assert!(matches!(
                strict.canonicalize(&mut item),
                Err(CanonicalizeError::MaxDepthExceeded { limit: 63, .. })
            ));
        });
    }

    #[test]
    fn nested_sections_at_the_depth_limit() {
        on_small_stack(|| {
            let chain = section_chain(32);
            assert_eq!(discriminator::value_depth(&chain), DEFAULT_MAX_DEPTH);
            let bytes = serde_json::to_vec(&chain).expect("json");

            let mut content: ContentItem = decode_union(&bytes).expect("decode at the limit");
            assert_eq!(content.kind(), Some("SECTION"));
            canonicalize(&mut content).expect("canonicalize");
            let encoded = encode(&content).expect("encode");
            assert_eq!(decode::<ContentItem>(&encoded).expect("decode"), content);

            let deeper = serde_json::to_vec(&section_chain(33)).expect("json");
            assert!(matches!(
                decode::<ContentItem>(&deeper),
                Err(DecodeError::MaxDepthExceeded { depth: 66, limit: 64 })
            ));
        });
    }

    #[test]
    fn widest_depth_limit_decodes_on_a_small_stack() {
        on_small_stack(|| {
            let codec = Codec::new(CodecConfig::new(100).expect("config"));
            let bytes = serde_json::to_vec(&cluster_chain(49)).expect("json");
            let item: Item = codec.decode(&bytes).expect("decode");
            assert!(codec.validate(&item).is_empty());
        });
    }

    #[test]
    fn codec_config_limits_depth() {
        let codec = Codec::new(CodecConfig::new(2).expect("config"));
        let err = codec
            .decode::<DvText>(br#"{"value": "x", "mappings": [{"match": "="}]}"#)
            .expect_err("too deep");
        assert!(matches!(err, DecodeError::MaxDepthExceeded { limit: 2, depth: 3 }));
    }

    #[test]
    fn custom_terminology_is_consulted() {
        let mut tables = CodeTables::default();
        tables.add_charset("UTF-8").expect("charset");
        let codec = Codec::with_terminology(CodecConfig::default(), Arc::new(tables));

        let mut text = DvText::new("hello");
        text.language = Some(CodePhrase::new(openehr_terminology::ids::ISO_639_1, "en"));
        assert!(validate(&text).is_empty());
        let report = codec.report(&text);
        assert!(!report.is_valid());
        assert_eq!(report.at("$.language").count(), 1);
    }

    #[test]
    fn yaml_round_trip_and_schema_errors() {
        let subject = SubjectReference {
            namespace: "vpr://example.org/mpi".into(),
            id: uuid::Uuid::new_v4(),
        };
        let mut status = EhrStatus::init(Some(&subject));
        canonicalize(&mut status).expect("canonicalize");

        let yaml = write_yaml(&status).expect("write");
        assert!(yaml.contains("_type: EHR_STATUS"));
        let read: EhrStatus = read_yaml(&yaml).expect("read");
        assert_eq!(read, status);

        let broken = yaml.replace("is_queryable: true", "is_queryable: maybe");
        match read_yaml::<EhrStatus>(&broken) {
            Err(DecodeError::Schema { model, path, .. }) => {
                assert_eq!(model, "EHR_STATUS");
                assert_eq!(path, "$.is_queryable");
            }
            other => panic!("expected Schema, got {other:?}"),
        }

        assert!(matches!(
            read_yaml::<EhrStatus>("name: [unclosed"),
            Err(DecodeError::Yaml(_))
        ));
    }

    #[test]
    fn registries_list_members_in_order() {
        let registry = <rm_1_1_0::common::PartyProxy as Family>::registry();
        assert_eq!(registry.family(), "PARTY_PROXY");
        assert_eq!(registry.default_member(), "PARTY_SELF");
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["PARTY_SELF", "PARTY_IDENTIFIED", "PARTY_RELATED"]
        );
        assert!(registry.contains("PARTY_RELATED"));
        assert!(registry.resolve(Some("PARTY_UNKNOWN")).is_none());
        assert_eq!(registry.resolve(None).map(|v| v.name()), Some("PARTY_SELF"));

        let content = <ContentItem as Family>::registry();
        assert_eq!(content.names().count(), 7);
        assert!(content.contains("GENERIC_ENTRY"));
        assert!(!content.contains("CARE_ENTRY"));

        let object_ids = <rm_1_1_0::identifiers::ObjectId as Family>::registry();
        assert_eq!(object_ids.names().count(), 6);
        assert!(object_ids.contains("TERMINOLOGY_ID"));
    }

    #[test]
    fn date_time_values_round_trip() {
        let mut element = Element::with_value("at0007", "Taken", DvDateTime::new("2024-03-01T10:30:00Z"));
        let bytes = encode_canonical(&mut element).expect("encode");
        let decoded: Item = decode_union(&bytes).expect("decode");
        assert_eq!(decoded.get::<Element>(), Some(&element));
    }
}
