pub mod catalog;
pub mod combine;
pub mod config;
pub mod consts;
pub mod error;
pub mod frame;
pub mod identity;
pub mod io;
pub mod policy;
pub mod stack;
pub mod synth;
