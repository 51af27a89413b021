//! Text surfaces that produce `ProjectionSpec`s.

pub mod yaml;
