//! Command-line front ends for clipfinder

pub mod output;
