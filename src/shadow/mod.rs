//! Shadow data structures and serialization.

pub mod types;

pub use types::{
    ExpectedFinalState, ShadowConfig, ShadowExperimental, ShadowFileSource, ShadowGeneral,
    ShadowGraph, ShadowHost, ShadowNetwork, ShadowProcess,
};
