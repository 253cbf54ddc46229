//! Stackwright: declarative infrastructure synthesis for serverless apps.
//!
//! Reads a project file and an OpenAPI document, and for one stage emits a
//! deterministic resource graph of named stacks for a deployment tool.

pub mod apidef;
pub mod cli;
pub mod core;
pub mod provenance;
pub mod stacks;
