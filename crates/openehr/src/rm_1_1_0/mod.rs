//! openEHR Reference Model (RM) 1.1.0.
//!
//! Each RM type is a serde struct mirroring its JSON form plus an `rm_node!` descriptor.
//! Abstract RM classes used as slot types are family enums declared with `rm_union!`.

pub mod change_control;
pub mod common;
pub mod constants;
pub mod data_types;
pub mod demographic;
pub mod ehr;
pub mod identifiers;
pub mod structures;
